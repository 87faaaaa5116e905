//! Node storage shared by both tree variants
//!
//! Nodes live in a slab addressed by [`NodeId`]. The arena is the only owner
//! of node storage; parent pointers, child lists and leaf-chain links are
//! plain ids and never keep a node alive on their own.

use std::ops::{Index, IndexMut};

use crate::capacity::Capacity;

/// Node identifier (index into node storage)
pub type NodeId = usize;

/// Structural view of a tree node used by the shared navigation helpers
pub trait TreeNode {
    /// Number of keys currently stored
    fn key_count(&self) -> usize;

    /// Child ids, empty for a leaf
    fn children(&self) -> &[NodeId];

    fn parent(&self) -> Option<NodeId>;

    fn set_parent(&mut self, parent: Option<NodeId>);

    fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }

    fn is_full(&self, cap: &Capacity) -> bool {
        self.key_count() == cap.max_keys
    }

    /// Holds more keys than allowed; only seen between an insert and its split
    fn is_overflown(&self, cap: &Capacity) -> bool {
        self.key_count() > cap.max_keys
    }

    fn is_underflown(&self, cap: &Capacity) -> bool {
        self.key_count() < cap.min_keys
    }

    fn is_min_full(&self, cap: &Capacity) -> bool {
        self.key_count() == cap.min_keys
    }

    /// Exactly one key above the minimum
    fn is_min_one_full(&self, cap: &Capacity) -> bool {
        self.key_count() == cap.min_keys + 1
    }

    /// Can give one key to a sibling without underflowing
    fn can_lend(&self, cap: &Capacity) -> bool {
        self.key_count() > cap.min_keys
    }
}

/// Slab of nodes with a free list for recycling released slots
#[derive(Debug, Clone)]
pub struct NodeArena<N> {
    nodes: Vec<Option<N>>,
    free_list: Vec<NodeId>,
}

impl<N> NodeArena<N> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Store a node, returning its id
    pub fn allocate(&mut self, node: N) -> NodeId {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            let id = self.nodes.len();
            self.nodes.push(Some(node));
            id
        }
    }

    /// Release a node, handing back its contents
    pub fn free(&mut self, id: NodeId) -> N {
        let node = self
            .nodes
            .get_mut(id)
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("node {id} freed twice or never allocated"));
        self.free_list.push(id);
        node
    }

    pub fn get(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id).and_then(|n| n.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(id).and_then(|n| n.as_mut())
    }

    /// Number of allocated nodes
    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
    }

    /// Borrow two distinct nodes mutably at once
    pub fn pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut N, &mut N) {
        assert_ne!(a, b, "pair_mut needs two distinct nodes");

        let (lo, hi) = (a.min(b), a.max(b));
        let (head, tail) = self.nodes.split_at_mut(hi);
        let low = head[lo]
            .as_mut()
            .unwrap_or_else(|| panic!("node {lo} is not allocated"));
        let high = tail[0]
            .as_mut()
            .unwrap_or_else(|| panic!("node {hi} is not allocated"));

        if a < b { (low, high) } else { (high, low) }
    }
}

impl<N> Default for NodeArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> Index<NodeId> for NodeArena<N> {
    type Output = N;

    fn index(&self, id: NodeId) -> &N {
        self.get(id)
            .unwrap_or_else(|| panic!("node {id} is not allocated"))
    }
}

impl<N> IndexMut<NodeId> for NodeArena<N> {
    fn index_mut(&mut self, id: NodeId) -> &mut N {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("node {id} is not allocated"))
    }
}

impl<N: TreeNode> NodeArena<N> {
    /// Position of `id` among its parent's children, `None` for a root
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self[id].parent()?;
        let pos = self[parent]
            .children()
            .iter()
            .position(|&child| child == id)
            .unwrap_or_else(|| panic!("node {id} is missing from parent {parent}"));
        Some(pos)
    }

    pub fn left_sibling(&self, id: NodeId) -> Option<NodeId> {
        let pos = self.index_in_parent(id)?;
        let parent = self[id].parent()?;
        pos.checked_sub(1).map(|left| self[parent].children()[left])
    }

    pub fn right_sibling(&self, id: NodeId) -> Option<NodeId> {
        let pos = self.index_in_parent(id)?;
        let parent = self[id].parent()?;
        self[parent].children().get(pos + 1).copied()
    }

    pub fn has_left_sibling(&self, id: NodeId) -> bool {
        self.left_sibling(id).is_some()
    }

    pub fn has_right_sibling(&self, id: NodeId) -> bool {
        self.right_sibling(id).is_some()
    }

    /// Point every child of `id` back at `id`
    pub fn adopt_children(&mut self, id: NodeId) {
        let children = self[id].children().to_vec();
        for child in children {
            self[child].set_parent(Some(id));
        }
    }

    /// Distance from `id` up to the root
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self[current].parent() {
            depth += 1;
            current = parent;
        }
        depth
    }
}
