//! B+ Tree implementation
//!
//! This module provides a B+ tree over any ordered key type. It supports:
//! - Unique keys with values stored only in leaves
//! - Range queries (via linked leaf nodes)
//! - Forward and backward scans over the doubly linked leaf chain
//!
//! Internal nodes hold copies of leaf keys as separators. A leaf split copies
//! the new right leaf's first key up; an internal split moves its middle key
//! up. Deletes only ever touch leaves and repair underflow by borrowing from
//! or joining with a sibling.
//!
//! With degree 2 leaves still hold an entry each but internal nodes may be
//! keyless. A keyless internal node always sits over a child that holds a
//! key and next to a sibling that holds one.

mod iter;
mod node;
#[cfg(test)]
mod tests;

pub use iter::{Iter, LeafChain};
pub use node::{BPlusNode, InternalNode, LeafNode};

use tracing::{debug, trace};

use crate::arena::{NodeArena, NodeId, TreeNode};
use crate::capacity::Capacity;
use crate::error::{TreeError, TreeResult};
use crate::index::OrderedIndex;
use crate::shape::NodeShape;

/// B+ Tree data structure
///
/// Degree `D` means:
/// - Internal nodes have at most `D` children
/// - Every node holds at most `D - 1` keys
/// - Nodes other than the root hold at least `ceil(D/2) - 1` keys
#[derive(Debug, Clone)]
pub struct BPlusTree<K, V> {
    /// Root node ID (None if tree is empty)
    root: Option<NodeId>,

    capacity: Capacity,

    /// Node storage
    nodes: NodeArena<BPlusNode<K, V>>,

    /// Total number of entries in the tree
    entry_count: usize,
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Create a new empty B+ tree with the given maximum branching degree
    ///
    /// # Arguments
    /// * `max_branching_degree` - The tree degree (must be >= 2)
    ///
    /// # Returns
    /// * `Ok(BPlusTree)` - A new empty B+ tree
    /// * `Err(TreeError)` - If the degree is invalid
    pub fn new(max_branching_degree: usize) -> TreeResult<Self> {
        Ok(Self {
            root: None,
            capacity: Capacity::new(max_branching_degree)?,
            nodes: NodeArena::new(),
            entry_count: 0,
        })
    }

    /// Get the tree degree
    pub fn degree(&self) -> usize {
        self.capacity.degree()
    }

    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Get number of entries in the tree
    pub fn len(&self) -> usize {
        self.entry_count
    }

    /// Get tree height (1 for single leaf, 2+ for internal nodes)
    pub fn height(&self) -> usize {
        match self.root {
            None => 0,
            Some(root_id) => {
                let mut height = 1;
                let mut current = root_id;

                while let BPlusNode::Internal(node) = &self.nodes[current] {
                    current = node.children[0];
                    height += 1;
                }

                height
            }
        }
    }

    /// Distinct keys a tree of `levels` levels can hold; only leaves count
    pub fn capacity_for_height(&self, levels: usize) -> usize {
        self.capacity.bplus_keys_for_height(levels)
    }

    // ========== Node Management ==========

    /// Get a reference to a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&BPlusNode<K, V>> {
        self.nodes.get(id)
    }

    /// Get the root node ID
    pub fn root_node_id(&self) -> Option<NodeId> {
        self.root
    }

    /// Get the total number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes.live_count()
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.nodes.clear();
        self.entry_count = 0;
    }

    fn leaf(&self, id: NodeId) -> &LeafNode<K, V> {
        self.nodes[id]
            .as_leaf()
            .unwrap_or_else(|| panic!("node {id} is not a leaf"))
    }

    fn leaf_mut(&mut self, id: NodeId) -> &mut LeafNode<K, V> {
        self.nodes[id]
            .as_leaf_mut()
            .unwrap_or_else(|| panic!("node {id} is not a leaf"))
    }

    fn internal_mut(&mut self, id: NodeId) -> &mut InternalNode<K> {
        self.nodes[id]
            .as_internal_mut()
            .unwrap_or_else(|| panic!("node {id} is not an internal node"))
    }

    /// Leftmost leaf, reached through `children[0]` at every level
    pub fn first_leaf_id(&self) -> Option<NodeId> {
        let mut current = self.root?;
        while let BPlusNode::Internal(node) = &self.nodes[current] {
            current = node.children[0];
        }
        Some(current)
    }

    /// Rightmost leaf
    pub fn last_leaf_id(&self) -> Option<NodeId> {
        let mut current = self.root?;
        while let BPlusNode::Internal(node) = &self.nodes[current] {
            current = *node.children.last()?;
        }
        Some(current)
    }

    // ========== Search Operations ==========

    /// Search for a key; internal matches are only routers, so this always
    /// descends to a leaf
    pub fn search(&self, key: &K) -> Option<&V> {
        let found = self
            .find_leaf(key)
            .and_then(|leaf_id| self.leaf(leaf_id).search(key));
        trace!(hit = found.is_some(), "search");
        found
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.search(key).is_some()
    }

    /// Find the leaf node that should contain the given key
    fn find_leaf(&self, key: &K) -> Option<NodeId> {
        let mut current = self.root?;

        loop {
            match &self.nodes[current] {
                BPlusNode::Leaf(_) => return Some(current),
                BPlusNode::Internal(node) => {
                    let child_idx = node.find_child_index(key);
                    current = node.children[child_idx];
                }
            }
        }
    }

    // ========== Insert Operations ==========

    /// Insert a key-value pair into the tree; an existing key is rejected
    /// and leaves the tree unchanged
    pub fn insert(&mut self, key: K, value: V) -> TreeResult<()> {
        let Some(leaf_id) = self.find_leaf(&key) else {
            // Create first leaf as root
            let leaf = LeafNode::with_entries(vec![key], vec![value]);
            let leaf_id = self.nodes.allocate(BPlusNode::Leaf(leaf));
            self.root = Some(leaf_id);
            self.entry_count = 1;
            trace!(leaf = leaf_id, "insert into empty tree");
            return Ok(());
        };

        self.leaf_mut(leaf_id).insert(key, value).inspect_err(|_| {
            trace!(leaf = leaf_id, "insert rejected duplicate key");
        })?;
        self.entry_count += 1;
        trace!(leaf = leaf_id, "insert");

        self.split_upward(leaf_id);
        Ok(())
    }

    /// Split overflown nodes from `id` towards the root
    fn split_upward(&mut self, mut id: NodeId) {
        while self.nodes[id].is_overflown(&self.capacity) {
            if self.capacity.min_keys == 0 && self.lend_to_keyless_sibling(id) {
                return;
            }

            let (separator, sibling_id) = if self.nodes[id].is_leaf() {
                self.split_leaf(id)
            } else {
                self.split_internal(id)
            };

            let Some(parent) = self.nodes[id].parent() else {
                // Split the root - create new root
                let new_root = InternalNode::new(vec![separator], vec![id, sibling_id]);
                let new_root_id = self.nodes.allocate(BPlusNode::Internal(new_root));
                self.nodes.adopt_children(new_root_id);
                self.root = Some(new_root_id);
                debug!(root = new_root_id, height = self.height(), "grew new root");
                return;
            };

            let pos = self
                .nodes
                .index_in_parent(id)
                .unwrap_or_else(|| unreachable!("node {id} has a parent"));
            self.internal_mut(parent)
                .insert_separator(pos, separator, sibling_id);
            self.nodes[sibling_id].set_parent(Some(parent));
            id = parent;
        }
    }

    /// Shift one separator of the overflown internal `id` into a keyless
    /// sibling instead of splitting
    fn lend_to_keyless_sibling(&mut self, id: NodeId) -> bool {
        if self.nodes[id].is_leaf() {
            return false;
        }
        let (Some(parent), Some(pos)) = (self.nodes[id].parent(), self.nodes.index_in_parent(id))
        else {
            return false;
        };

        if let Some(left) = self.nodes.left_sibling(id).filter(|&l| self.is_keyless(l)) {
            self.rotate_left(parent, pos - 1, left, id);
            return true;
        }
        if let Some(right) = self.nodes.right_sibling(id).filter(|&r| self.is_keyless(r)) {
            self.rotate_right(parent, pos + 1, id, right);
            return true;
        }
        false
    }

    fn is_keyless(&self, id: NodeId) -> bool {
        self.nodes[id].key_count() == 0
    }

    /// Split an overflowing leaf node, splicing the new leaf into the chain
    /// right after it. Returns the separator copy and the new leaf.
    fn split_leaf(&mut self, leaf_id: NodeId) -> (K, NodeId) {
        let cap = self.capacity;
        let leaf = self.leaf_mut(leaf_id);
        let mut right = leaf.split(&cap);
        let old_next = leaf.next;

        let separator = match right.min_key() {
            Some(key) => key.clone(),
            None => unreachable!("split leaves the right leaf non-empty"),
        };
        right.prev = Some(leaf_id);
        right.next = old_next;

        // Link the new leaf
        let right_id = self.nodes.allocate(BPlusNode::Leaf(right));
        self.leaf_mut(leaf_id).next = Some(right_id);
        if let Some(next) = old_next {
            self.leaf_mut(next).prev = Some(right_id);
        }

        debug!(leaf = leaf_id, sibling = right_id, "split leaf");
        (separator, right_id)
    }

    /// Split an overflowing internal node, moving its middle key up
    ///
    /// With degree 2 one half is left keyless. It is the right half when the
    /// first child is keyless already, the left half otherwise.
    fn split_internal(&mut self, node_id: NodeId) -> (K, NodeId) {
        let cap = self.capacity;
        let first_child_keyless = self.nodes[node_id]
            .children()
            .first()
            .is_some_and(|&child| self.is_keyless(child));

        let node = self.internal_mut(node_id);
        let (separator, right) = if cap.min_keys == 0 && first_child_keyless {
            node.split_keyless_right()
        } else {
            let right = node.split(&cap);
            (node.take_key_to_promote(&cap), right)
        };

        let right_id = self.nodes.allocate(BPlusNode::Internal(right));
        self.nodes.adopt_children(right_id);

        debug!(node = node_id, sibling = right_id, "split internal node");
        (separator, right_id)
    }

    // ========== Delete Operations ==========

    /// Delete the entry with the given key
    /// Returns true if an entry was deleted
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    /// Delete the entry with the given key, handing back its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let leaf_id = self.find_leaf(key)?;
        let Some(value) = self.leaf_mut(leaf_id).remove(key) else {
            trace!(leaf = leaf_id, "delete missed");
            return None;
        };

        self.entry_count -= 1;
        trace!(leaf = leaf_id, "delete");

        // Handle underflow
        self.rebalance(leaf_id);
        Some(value)
    }

    /// Leaves never drop below one entry, even when `min_keys` is zero
    fn leaf_min_keys(&self) -> usize {
        self.capacity.min_keys.max(1)
    }

    fn is_deficient(&self, id: NodeId) -> bool {
        match &self.nodes[id] {
            BPlusNode::Leaf(leaf) => leaf.len() < self.leaf_min_keys(),
            BPlusNode::Internal(node) => {
                node.children.is_empty() || node.keys.len() < self.capacity.min_keys
            }
        }
    }

    fn can_lend(&self, id: NodeId) -> bool {
        match &self.nodes[id] {
            BPlusNode::Leaf(leaf) => leaf.len() > self.leaf_min_keys(),
            BPlusNode::Internal(node) => node.keys.len() > self.capacity.min_keys,
        }
    }

    /// Restore minimum occupancy from `id` upwards
    fn rebalance(&mut self, mut id: NodeId) {
        loop {
            let (Some(parent), Some(pos)) = (self.nodes[id].parent(), self.nodes.index_in_parent(id))
            else {
                self.collapse_root();
                return;
            };

            if !self.is_deficient(id) {
                if self.capacity.min_keys == 0 {
                    self.repair_keyless(id);
                }
                return;
            }

            let is_leaf = self.nodes[id].is_leaf();
            let left = self.nodes.left_sibling(id);
            let right = self.nodes.right_sibling(id);

            // Only reachable with degree 2, where internal nodes may hold a single child
            let childless = !is_leaf && self.nodes[id].children().is_empty();
            if childless || (left.is_none() && right.is_none()) {
                self.prune(parent, pos, id);
                id = parent;
                continue;
            }

            if let Some(left) = left.filter(|&l| self.can_lend(l)) {
                if is_leaf {
                    self.borrow_from_left_leaf(parent, pos, left, id);
                } else {
                    self.rotate_right(parent, pos, left, id);
                }
                return;
            }
            if let Some(right) = right.filter(|&r| self.can_lend(r)) {
                if is_leaf {
                    self.borrow_from_right_leaf(parent, pos, id, right);
                } else {
                    self.rotate_left(parent, pos, id, right);
                }
                return;
            }

            let (left, right, separator) = match (left, right) {
                (_, Some(right)) => (id, right, pos),
                (Some(left), None) => (left, id, pos - 1),
                (None, None) => unreachable!("sibling-less nodes are pruned"),
            };
            if is_leaf {
                self.join_leaves(parent, separator, left, right);
            } else {
                self.join_internal(parent, separator, left, right);
            }

            id = parent;
        }
    }

    /// Degree-2 repair of internal nodes left keyless by a join or a prune
    ///
    /// Two keyless siblings join into one keyless node a level up. A keyless
    /// node under a keyless parent is fixed through the parent's sibling.
    fn repair_keyless(&mut self, mut id: NodeId) {
        while let Some(parent) = self.nodes[id].parent() {
            if !self.is_keyless(id) {
                break;
            }

            if self.is_keyless(parent) {
                match self.restructure_keyless_chain(parent, id) {
                    Some(next) => id = next,
                    None => break,
                }
                continue;
            }

            let (left, right) = {
                let children = self.nodes[parent].children();
                (children[0], children[1])
            };
            if !(self.is_keyless(left) && self.is_keyless(right)) {
                break;
            }
            self.join_internal(parent, 0, left, right);
            id = parent;
        }

        self.collapse_root();
    }

    /// Fix the keyless internal `id` whose parent is keyless too
    ///
    /// The parent's sibling holds one key. If both of its children hold keys
    /// one of them rotates over and the repair stops. Otherwise the parent
    /// level joins and the grandparent, now keyless, is returned.
    fn restructure_keyless_chain(&mut self, parent: NodeId, id: NodeId) -> Option<NodeId> {
        let grand = self.nodes[parent].parent()?;
        let parent_pos = self.nodes.index_in_parent(parent)?;
        let uncle = self.nodes[grand].children()[1 - parent_pos];

        let (first, second) = {
            let children = self.nodes[uncle].children();
            (children[0], children[1])
        };
        let (near, far) = if parent_pos == 0 {
            (first, second)
        } else {
            (second, first)
        };
        let (near_keyless, far_keyless) = (self.is_keyless(near), self.is_keyless(far));

        if parent_pos == 0 {
            if !near_keyless && !far_keyless {
                self.rotate_left(grand, 0, parent, uncle);
                return None;
            }
            // parent: two separators over [id, near, far]
            self.join_internal(grand, 0, parent, uncle);
            if near_keyless {
                self.join_internal(parent, 0, id, near);
            } else {
                self.rotate_left(parent, 0, id, near);
                self.join_internal(parent, 1, near, far);
            }
        } else {
            if !near_keyless && !far_keyless {
                self.rotate_right(grand, 1, uncle, parent);
                return None;
            }
            // uncle: two separators over [far, near, id]
            self.join_internal(grand, 0, uncle, parent);
            if near_keyless {
                self.join_internal(uncle, 1, near, id);
            } else {
                self.rotate_right(uncle, 2, near, id);
                self.join_internal(uncle, 0, far, near);
            }
        }

        debug!(node = id, grandparent = grand, "restructured keyless chain");
        Some(grand)
    }

    /// Drop an empty node together with one adjacent separator of its parent
    fn prune(&mut self, parent: NodeId, pos: usize, id: NodeId) {
        assert_eq!(
            self.nodes[id].key_count(),
            0,
            "pruning node {id} that still holds keys"
        );

        if let BPlusNode::Leaf(leaf) = self.nodes.free(id) {
            if let Some(prev) = leaf.prev {
                self.leaf_mut(prev).next = leaf.next;
            }
            if let Some(next) = leaf.next {
                self.leaf_mut(next).prev = leaf.prev;
            }
        }

        let node = self.internal_mut(parent);
        if node.keys.is_empty() {
            node.children.clear();
        } else if pos > 0 {
            node.remove_separator(pos - 1);
        } else {
            node.pop_first();
        }
        debug!(node = id, parent, "pruned empty node");
    }

    /// Borrow the left sibling's last entry; the separator becomes our new first key
    fn borrow_from_left_leaf(&mut self, parent: NodeId, pos: usize, left: NodeId, leaf_id: NodeId) {
        let (key, value) = self.leaf_mut(left).pop_last();
        let separator = key.clone();
        self.leaf_mut(leaf_id).push_front(key, value);
        self.internal_mut(parent).replace_key(pos - 1, separator);
        debug!(leaf = leaf_id, donor = left, "borrowed from left leaf");
    }

    /// Borrow the right sibling's first entry; its next key becomes the separator
    fn borrow_from_right_leaf(
        &mut self,
        parent: NodeId,
        pos: usize,
        leaf_id: NodeId,
        right: NodeId,
    ) {
        let (key, value) = self.leaf_mut(right).pop_first();
        self.leaf_mut(leaf_id).push_back(key, value);
        if let Some(separator) = self.leaf(right).min_key().cloned() {
            self.internal_mut(parent).replace_key(pos, separator);
        }
        debug!(leaf = leaf_id, donor = right, "borrowed from right leaf");
    }

    /// Rotate through the parent: left's last child and separator move over
    fn rotate_right(&mut self, parent: NodeId, pos: usize, left: NodeId, node_id: NodeId) {
        let (key, child) = self.internal_mut(left).pop_last();
        let separator = self.internal_mut(parent).replace_key(pos - 1, key);
        self.internal_mut(node_id).push_front(separator, child);
        self.nodes[child].set_parent(Some(node_id));
        debug!(node = node_id, donor = left, "rotated right");
    }

    /// Rotate through the parent: right's first child and separator move over
    fn rotate_left(&mut self, parent: NodeId, pos: usize, node_id: NodeId, right: NodeId) {
        let (key, child) = self.internal_mut(right).pop_first();
        let separator = self.internal_mut(parent).replace_key(pos, key);
        self.internal_mut(node_id).push_back(separator, child);
        self.nodes[child].set_parent(Some(node_id));
        debug!(node = node_id, donor = right, "rotated left");
    }

    /// Merge `right` into `left`; the separator between them is dropped
    fn join_leaves(&mut self, parent: NodeId, separator: usize, left: NodeId, right: NodeId) {
        let (_, removed) = self.internal_mut(parent).remove_separator(separator);
        debug_assert_eq!(removed, right);

        let BPlusNode::Leaf(right_leaf) = self.nodes.free(right) else {
            panic!("node {right} is not a leaf");
        };
        let next = right_leaf.next;
        self.leaf_mut(left).absorb(right_leaf);
        if let Some(next) = next {
            self.leaf_mut(next).prev = Some(left);
        }
        debug!(leaf = left, merged = right, "joined leaves");
    }

    /// Merge `right` into `left`, pulling the separator down between them
    fn join_internal(&mut self, parent: NodeId, separator: usize, left: NodeId, right: NodeId) {
        let (key, removed) = self.internal_mut(parent).remove_separator(separator);
        debug_assert_eq!(removed, right);

        let BPlusNode::Internal(right_node) = self.nodes.free(right) else {
            panic!("node {right} is not an internal node");
        };
        self.internal_mut(left).absorb(key, right_node);
        self.nodes.adopt_children(left);
        debug!(node = left, merged = right, "joined internal nodes");
    }

    /// An empty root leaf empties the tree; a keyless internal root hands
    /// over to its only child
    fn collapse_root(&mut self) {
        while let Some(root) = self.root {
            let child = match &self.nodes[root] {
                BPlusNode::Leaf(leaf) if leaf.is_empty() => None,
                BPlusNode::Internal(node) if node.keys.is_empty() => node.children.first().copied(),
                _ => return,
            };

            self.nodes.free(root);
            self.root = child;
            match child {
                Some(child) => {
                    self.nodes[child].set_parent(None);
                    debug!(root = child, "collapsed root");
                }
                None => debug!("tree emptied"),
            }
        }
    }

    // ========== Iterators ==========

    /// Iterate over all entries in key order by walking the leaf chain
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(
            &self.nodes,
            self.first_leaf_id(),
            self.last_leaf_id(),
            self.entry_count,
        )
    }

    /// Walk the leaves through their `next` links
    pub fn leaves(&self) -> LeafChain<'_, K, V> {
        LeafChain::new(&self.nodes, self.first_leaf_id())
    }

    /// Keys of every leaf in chain order
    pub fn leaf_keys(&self) -> Vec<Vec<K>> {
        self.leaves().map(|leaf| leaf.keys.clone()).collect()
    }

    /// Structural snapshot of the whole tree
    pub fn shape(&self) -> Option<NodeShape<K>> {
        self.root.map(|root| self.shape_of(root))
    }

    fn shape_of(&self, id: NodeId) -> NodeShape<K> {
        match &self.nodes[id] {
            BPlusNode::Leaf(leaf) => NodeShape::leaf(leaf.keys.clone()),
            BPlusNode::Internal(node) => NodeShape::internal(
                node.keys.clone(),
                node.children
                    .iter()
                    .map(|&child| self.shape_of(child))
                    .collect(),
            ),
        }
    }

    // ========== Verification ==========

    /// Check every structural invariant, including the leaf chain
    pub fn check_invariants(&self) -> TreeResult<()> {
        let Some(root) = self.root else {
            if self.entry_count != 0 || self.nodes.live_count() != 0 {
                return Err(TreeError::InvalidState(format!(
                    "empty tree still counts {} entries and {} nodes",
                    self.entry_count,
                    self.nodes.live_count()
                )));
            }
            return Ok(());
        };

        let root_node = self
            .nodes
            .get(root)
            .ok_or_else(|| TreeError::InvalidState(format!("root {root} is not allocated")))?;
        if root_node.parent().is_some() {
            return Err(TreeError::InvalidState(format!("root {root} has a parent")));
        }
        if root_node.key_count() == 0 {
            return Err(TreeError::InvalidState(format!("root {root} holds no keys")));
        }

        let mut walk = Walk::default();
        self.check_node(root, None, None, 0, &mut walk)?;

        if walk.entries != self.entry_count {
            return Err(TreeError::InvalidState(format!(
                "found {} entries, expected {}",
                walk.entries, self.entry_count
            )));
        }
        if walk.nodes != self.nodes.live_count() {
            return Err(TreeError::InvalidState(format!(
                "reached {} nodes but {} are allocated",
                walk.nodes,
                self.nodes.live_count()
            )));
        }

        self.check_leaf_chain(&walk.leaves)
    }

    fn check_node(
        &self,
        id: NodeId,
        lower: Option<&K>,
        upper: Option<&K>,
        depth: usize,
        walk: &mut Walk,
    ) -> TreeResult<()> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| TreeError::InvalidState(format!("node {id} is not allocated")))?;
        walk.nodes += 1;

        let keys = node.keys();
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(TreeError::InvalidState(format!(
                "keys of node {id} are not strictly increasing"
            )));
        }

        let min_keys = if node.is_leaf() {
            self.leaf_min_keys()
        } else {
            self.capacity.min_keys
        };
        let is_root = node.parent().is_none();
        if keys.len() > self.capacity.max_keys || (!is_root && keys.len() < min_keys) {
            return Err(TreeError::InvalidState(format!(
                "node {id} holds {} keys, allowed {min_keys}..={}",
                keys.len(),
                self.capacity.max_keys
            )));
        }

        match node {
            BPlusNode::Leaf(leaf) => {
                // Leaf keys lie in [lower, upper)
                let too_low = matches!((lower, leaf.min_key()), (Some(bound), Some(first)) if first < bound);
                let too_high = matches!((upper, leaf.max_key()), (Some(bound), Some(last)) if last >= bound);
                if too_low || too_high {
                    return Err(TreeError::InvalidState(format!(
                        "keys of leaf {id} fall outside the parent separators"
                    )));
                }
                if leaf.values.len() != leaf.keys.len() {
                    return Err(TreeError::InvalidState(format!(
                        "leaf {id} has {} keys but {} values",
                        leaf.keys.len(),
                        leaf.values.len()
                    )));
                }

                walk.entries += leaf.len();
                walk.leaves.push(id);
                match walk.leaf_depth {
                    Some(expected) if expected != depth => Err(TreeError::InvalidState(format!(
                        "leaf {id} at depth {depth}, other leaves at depth {expected}"
                    ))),
                    _ => {
                        walk.leaf_depth = Some(depth);
                        Ok(())
                    }
                }
            }
            BPlusNode::Internal(internal) => {
                // Stale separators are fine as long as they still route correctly
                let too_low = matches!((lower, internal.keys.first()), (Some(bound), Some(first)) if first < bound);
                let too_high = matches!((upper, internal.keys.last()), (Some(bound), Some(last)) if last > bound);
                if too_low || too_high {
                    return Err(TreeError::InvalidState(format!(
                        "separators of node {id} fall outside the parent separators"
                    )));
                }
                if internal.children.len() != internal.keys.len() + 1 {
                    return Err(TreeError::InvalidState(format!(
                        "node {id} has {} keys but {} children",
                        internal.keys.len(),
                        internal.children.len()
                    )));
                }
                let keyed_child = |&child: &NodeId| self.nodes.get(child).is_some_and(|c| c.key_count() > 0);
                if self.capacity.min_keys == 0 && !internal.children.iter().any(keyed_child) {
                    return Err(TreeError::InvalidState(format!(
                        "every child of node {id} is keyless"
                    )));
                }

                for (i, &child) in internal.children.iter().enumerate() {
                    let child_parent = self.nodes.get(child).and_then(|c| c.parent());
                    if child_parent != Some(id) {
                        return Err(TreeError::InvalidState(format!(
                            "child {child} of node {id} points at parent {child_parent:?}"
                        )));
                    }

                    let child_lower = if i == 0 {
                        lower
                    } else {
                        internal.keys.get(i - 1)
                    };
                    let child_upper = if i == internal.keys.len() {
                        upper
                    } else {
                        internal.keys.get(i)
                    };
                    self.check_node(child, child_lower, child_upper, depth + 1, walk)?;
                }
                Ok(())
            }
        }
    }

    /// The chain must list exactly the leaves found by descent, in order,
    /// with matching back links
    fn check_leaf_chain(&self, leaves: &[NodeId]) -> TreeResult<()> {
        let mut expected_prev = None;
        let mut current = leaves.first().copied();

        for (i, &leaf_id) in leaves.iter().enumerate() {
            if current != Some(leaf_id) {
                return Err(TreeError::InvalidState(format!(
                    "leaf chain reaches {current:?} where leaf {leaf_id} (position {i}) belongs"
                )));
            }

            let leaf = self.leaf(leaf_id);
            if leaf.prev != expected_prev {
                return Err(TreeError::InvalidState(format!(
                    "leaf {leaf_id} links back to {:?}, expected {expected_prev:?}",
                    leaf.prev
                )));
            }

            expected_prev = Some(leaf_id);
            current = leaf.next;
        }

        if current.is_some() {
            return Err(TreeError::InvalidState(format!(
                "leaf chain continues past the last leaf into {current:?}"
            )));
        }
        Ok(())
    }
}

impl<K: Ord + Clone, V: Clone> BPlusTree<K, V> {
    /// All entries in key order, read from the leaf chain
    pub fn sorted_entries(&self) -> Vec<(K, V)> {
        self.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Range search: return all entries where lower <= key <= upper
    pub fn range_search(&self, lower: &K, upper: &K) -> Vec<(K, V)> {
        let mut results = Vec::new();

        if lower > upper {
            return results;
        }

        // Find the leaf containing the lower bound
        let mut current_id = self.find_leaf(lower);

        // Scan through leaf nodes
        while let Some(id) = current_id {
            let leaf = self.leaf(id);

            // Collect entries in range
            for (k, v) in leaf.entries() {
                if k > upper {
                    return results;
                }
                if k >= lower {
                    results.push((k.clone(), v.clone()));
                }
            }

            current_id = leaf.next;
        }

        results
    }
}

/// Running totals gathered while checking invariants
#[derive(Debug, Default)]
struct Walk {
    entries: usize,
    nodes: usize,
    leaf_depth: Option<usize>,
    leaves: Vec<NodeId>,
}

impl<K: Ord + Clone, V: Clone> OrderedIndex<K, V> for BPlusTree<K, V> {
    fn insert(&mut self, key: K, value: V) -> TreeResult<()> {
        BPlusTree::insert(self, key, value)
    }

    fn delete(&mut self, key: &K) -> bool {
        BPlusTree::delete(self, key)
    }

    fn search(&self, key: &K) -> Option<&V> {
        BPlusTree::search(self, key)
    }

    fn sorted_entries(&self) -> Vec<(K, V)> {
        BPlusTree::sorted_entries(self)
    }

    fn range_search(&self, lower: &K, upper: &K) -> Vec<(K, V)> {
        BPlusTree::range_search(self, lower, upper)
    }

    fn leaf_keys(&self) -> Vec<Vec<K>> {
        BPlusTree::leaf_keys(self)
    }

    fn capacity_for_height(&self, levels: usize) -> usize {
        BPlusTree::capacity_for_height(self, levels)
    }

    fn len(&self) -> usize {
        BPlusTree::len(self)
    }

    fn height(&self) -> usize {
        BPlusTree::height(self)
    }

    fn degree(&self) -> usize {
        BPlusTree::degree(self)
    }

    fn node_count(&self) -> usize {
        BPlusTree::node_count(self)
    }

    fn shape(&self) -> Option<NodeShape<K>> {
        BPlusTree::shape(self)
    }

    fn check_invariants(&self) -> TreeResult<()> {
        BPlusTree::check_invariants(self)
    }

    fn clear(&mut self) {
        BPlusTree::clear(self)
    }

    fn variant_name(&self) -> &'static str {
        "bplus"
    }
}
