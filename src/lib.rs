pub mod arena;
pub mod bplus;
pub mod btree;
pub mod capacity;
pub mod config;
pub mod error;
pub mod index;
pub mod shape;
pub mod shell;

pub use arena::{NodeArena, NodeId, TreeNode};
pub use bplus::{BPlusNode, BPlusTree, InternalNode, LeafNode};
pub use btree::{BTree, Node};
pub use capacity::Capacity;
pub use config::{ConfigError, ConfigResult, DEFAULT_DEGREE, TreeConfig, Variant};
pub use error::{TreeError, TreeResult};
pub use index::OrderedIndex;
pub use shape::NodeShape;
pub use shell::{Command, Flow, LoadReport, Shell, ShellError, ShellResult};
