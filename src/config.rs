use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::bplus::BPlusTree;
use crate::btree::BTree;
use crate::error::{TreeError, TreeResult};
use crate::index::OrderedIndex;

/// Branching degree used when neither the config file nor the CLI set one
pub const DEFAULT_DEGREE: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which tree family to build
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Entries live in every node
    Classic,
    /// Entries live in linked leaves, internal nodes only route
    #[default]
    #[serde(alias = "bplustree", alias = "b+")]
    #[value(name = "bplus", alias = "b+")]
    BPlus,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Classic => write!(f, "classic"),
            Variant::BPlus => write!(f, "bplus"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub degree: usize,
    pub variant: Variant,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            degree: DEFAULT_DEGREE,
            variant: Variant::default(),
        }
    }
}

impl TreeConfig {
    pub fn new(degree: usize, variant: Variant) -> Self {
        Self { degree, variant }
    }

    /// Read a JSON config; fields it leaves out keep their defaults
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: TreeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(&self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> TreeResult<()> {
        if self.degree < 2 {
            return Err(TreeError::InvalidDegree(self.degree));
        }
        Ok(())
    }

    /// Build an empty tree of the configured variant and degree
    pub fn build<K, V>(&self) -> TreeResult<Box<dyn OrderedIndex<K, V>>>
    where
        K: Ord + Clone + 'static,
        V: Clone + 'static,
    {
        Ok(match self.variant {
            Variant::Classic => Box::new(BTree::new(self.degree)?),
            Variant::BPlus => Box::new(BPlusTree::new(self.degree)?),
        })
    }
}
