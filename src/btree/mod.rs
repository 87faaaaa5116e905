//! Classic B-Tree
//!
//! Every node stores values alongside its keys, so a search may stop at an
//! internal node. Inserts split overflown nodes bottom-up, promoting the
//! middle key; deletes always end at a leaf (internal keys are first swapped
//! with their in-order predecessor) and repair underflow by rotating through
//! the parent or joining with a sibling.
//!
//! Degree 2 allows keyless nodes below the root. There every keyless node
//! must sit over a child that holds a key and next to a sibling that holds
//! one, which keeps the height within about `1.44 log2(n)`.

mod iter;
mod node;

pub use iter::Iter;
pub use node::Node;

use tracing::{debug, trace};

use crate::arena::{NodeArena, NodeId, TreeNode};
use crate::capacity::Capacity;
use crate::error::{TreeError, TreeResult};
use crate::index::OrderedIndex;
use crate::shape::NodeShape;

/// Classic B-Tree keyed by `K`
///
/// Degree `D` means:
/// - nodes have at most `D` children and `D - 1` keys
/// - nodes other than the root have at least `ceil(D/2) - 1` keys
#[derive(Debug, Clone)]
pub struct BTree<K, V> {
    /// Root node ID (None if tree is empty)
    root: Option<NodeId>,

    capacity: Capacity,

    /// Node storage
    nodes: NodeArena<Node<K, V>>,

    /// Total number of entries in the tree
    entry_count: usize,
}

impl<K: Ord, V> BTree<K, V> {
    /// Create an empty tree with the given maximum branching degree (must be >= 2)
    pub fn new(max_branching_degree: usize) -> TreeResult<Self> {
        Ok(Self {
            root: None,
            capacity: Capacity::new(max_branching_degree)?,
            nodes: NodeArena::new(),
            entry_count: 0,
        })
    }

    pub fn degree(&self) -> usize {
        self.capacity.degree()
    }

    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn len(&self) -> usize {
        self.entry_count
    }

    /// Get tree height (1 for single leaf, 2+ once the root has split)
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(id) = current {
            height += 1;
            current = self.nodes[id].child(0);
        }
        height
    }

    pub fn node_count(&self) -> usize {
        self.nodes.live_count()
    }

    pub fn root_node_id(&self) -> Option<NodeId> {
        self.root
    }

    /// Get a reference to a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&Node<K, V>> {
        self.nodes.get(id)
    }

    /// Maximum number of keys a tree of `levels` levels can hold: `D^levels - 1`
    pub fn capacity_for_height(&self, levels: usize) -> usize {
        self.capacity.classic_keys_for_height(levels)
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.nodes.clear();
        self.entry_count = 0;
    }

    // ========== Search Operations ==========

    pub fn search(&self, key: &K) -> Option<&V> {
        let found = self
            .locate(key)
            .map(|(id, idx)| &self.nodes[id].values[idx]);
        trace!(hit = found.is_some(), "search");
        found
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.locate(key).is_some()
    }

    /// Find the node and slot holding `key`
    fn locate(&self, key: &K) -> Option<(NodeId, usize)> {
        let mut current = self.root?;

        loop {
            let node = &self.nodes[current];
            match node.find_key(key) {
                Ok(idx) => return Some((current, idx)),
                Err(_) if node.is_leaf() => return None,
                Err(pos) => current = node.children[pos],
            }
        }
    }

    /// Descend to the leaf that would receive `key`
    fn find_insert_leaf(&self, key: &K, root: NodeId) -> TreeResult<NodeId> {
        let mut current = root;

        loop {
            let node = &self.nodes[current];
            match node.find_key(key) {
                Ok(_) => return Err(TreeError::DuplicateKey),
                Err(_) if node.is_leaf() => return Ok(current),
                Err(pos) => current = node.children[pos],
            }
        }
    }

    // ========== Insert Operations ==========

    /// Insert a key-value pair; an existing key is rejected without changes
    pub fn insert(&mut self, key: K, value: V) -> TreeResult<()> {
        let Some(root) = self.root else {
            // Create first leaf as root
            let leaf_id = self.nodes.allocate(Node::with_entry(key, value));
            self.root = Some(leaf_id);
            self.entry_count = 1;
            trace!(leaf = leaf_id, "insert into empty tree");
            return Ok(());
        };

        let leaf_id = self.find_insert_leaf(&key, root).inspect_err(|_| {
            trace!("insert rejected duplicate key");
        })?;
        self.nodes[leaf_id].insert_key(key, value)?;
        self.entry_count += 1;
        trace!(leaf = leaf_id, "insert");

        self.split_upward(leaf_id);
        Ok(())
    }

    /// Split overflown nodes from `id` towards the root
    fn split_upward(&mut self, mut id: NodeId) {
        let keyless_allowed = self.capacity.min_keys == 0;

        while self.nodes[id].is_overflown(&self.capacity) {
            if keyless_allowed && self.lend_to_keyless_sibling(id) {
                return;
            }

            let first_child_keyless = self.nodes[id]
                .child(0)
                .is_some_and(|child| self.is_keyless(child));
            let (key, value, sibling) = if keyless_allowed && first_child_keyless {
                self.nodes[id].split_keyless_right()
            } else {
                let sibling = self.nodes[id].split(&self.capacity);
                let (key, value) = self.nodes[id].take_key_to_promote(&self.capacity);
                (key, value, sibling)
            };
            let sibling_id = self.nodes.allocate(sibling);
            self.nodes.adopt_children(sibling_id);
            debug!(node = id, sibling = sibling_id, "split overflown node");

            let Some(parent) = self.nodes[id].parent else {
                let root = Node::with_entries(vec![key], vec![value], vec![id, sibling_id]);
                let root_id = self.nodes.allocate(root);
                self.nodes.adopt_children(root_id);
                self.root = Some(root_id);
                debug!(root = root_id, height = self.height(), "grew new root");
                return;
            };

            let pos = self
                .nodes
                .index_in_parent(id)
                .unwrap_or_else(|| unreachable!("node {id} has a parent"));
            self.nodes[parent].insert_separator(pos, key, value, sibling_id);
            self.nodes[sibling_id].parent = Some(parent);
            id = parent;
        }
    }

    /// Shift one key of the overflown `id` into a keyless sibling instead of splitting
    fn lend_to_keyless_sibling(&mut self, id: NodeId) -> bool {
        let (Some(parent), Some(pos)) = (self.nodes[id].parent, self.nodes.index_in_parent(id))
        else {
            return false;
        };

        if let Some(left) = self.nodes.left_sibling(id).filter(|&l| self.is_keyless(l)) {
            self.rotate_left(parent, pos - 1, left, id);
            return true;
        }
        if let Some(right) = self.nodes.right_sibling(id).filter(|&r| self.is_keyless(r)) {
            self.rotate_right(parent, pos, id, right);
            return true;
        }
        false
    }

    fn is_keyless(&self, id: NodeId) -> bool {
        self.nodes[id].keys.is_empty()
    }

    // ========== Delete Operations ==========

    /// Delete `key`, returning true if it was present
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    /// Delete `key`, handing back its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let Some((id, idx)) = self.locate(key) else {
            trace!("delete missed");
            return None;
        };

        let (_, value) = self.remove_entry(id, idx);
        self.entry_count -= 1;
        trace!(node = id, "delete");
        Some(value)
    }

    /// Remove the entry at `(id, idx)` and repair the tree
    ///
    /// An internal entry first trades places with its in-order predecessor
    /// (successor when the left subtree is keyless), so the actual removal
    /// happens further down. At least one side always holds a key: no node
    /// sits over keyless children only.
    fn remove_entry(&mut self, id: NodeId, idx: usize) -> (K, V) {
        if self.nodes[id].is_leaf() {
            let entry = self.nodes[id].remove_key(idx);
            self.rebalance(id);
            return entry;
        }

        let (left, right) = {
            let node = &self.nodes[id];
            (node.children[idx], node.children[idx + 1])
        };

        match self.last_entry(left).or_else(|| self.first_entry(right)) {
            Some((holder, holder_idx)) => {
                let (node, other) = self.nodes.pair_mut(id, holder);
                node.swap_entry(idx, other, holder_idx);
                self.remove_entry(holder, holder_idx)
            }
            None => unreachable!("both subtrees around key {idx} of node {id} are keyless"),
        }
    }

    /// Position of the largest key in the subtree under `id`
    fn last_entry(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let node = &self.nodes[id];
        if let Some(&last) = node.children.last() {
            if let Some(found) = self.last_entry(last) {
                return Some(found);
            }
        }
        node.keys.len().checked_sub(1).map(|idx| (id, idx))
    }

    /// Position of the smallest key in the subtree under `id`
    fn first_entry(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let node = &self.nodes[id];
        if let Some(&first) = node.children.first() {
            if let Some(found) = self.first_entry(first) {
                return Some(found);
            }
        }
        (!node.keys.is_empty()).then_some((id, 0))
    }

    /// Restore minimum occupancy from `id` upwards
    fn rebalance(&mut self, mut id: NodeId) {
        if self.capacity.min_keys == 0 {
            self.repair_keyless(id);
            return;
        }

        loop {
            let (Some(parent), Some(pos)) = (self.nodes[id].parent, self.nodes.index_in_parent(id))
            else {
                self.collapse_root();
                return;
            };

            if !self.nodes[id].is_underflown(&self.capacity) {
                return;
            }

            let left = self.nodes.left_sibling(id);
            let right = self.nodes.right_sibling(id);

            if let Some(left) = left.filter(|&l| self.nodes[l].can_lend(&self.capacity)) {
                self.rotate_right(parent, pos - 1, left, id);
                return;
            }
            if let Some(right) = right.filter(|&r| self.nodes[r].can_lend(&self.capacity)) {
                self.rotate_left(parent, pos, id, right);
                return;
            }

            match (left, right) {
                (_, Some(right)) => self.join(parent, pos, id, right),
                (Some(left), None) => self.join(parent, pos - 1, left, id),
                (None, None) => panic!("underflown node {id} has no siblings"),
            }

            id = parent;
        }
    }

    /// Degree-2 repair after `id` lost its last key
    ///
    /// Two keyless siblings join into one keyless node a level up. A keyless
    /// node under a keyless parent is fixed through the parent's sibling.
    fn repair_keyless(&mut self, mut id: NodeId) {
        while let Some(parent) = self.nodes[id].parent {
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
                let children = &self.nodes[parent].children;
                (children[0], children[1])
            };
            if !(self.is_keyless(left) && self.is_keyless(right)) {
                break;
            }
            self.join(parent, 0, left, right);
            id = parent;
        }

        self.collapse_root();
    }

    /// Fix the keyless `id` whose parent is keyless too
    ///
    /// The parent's sibling holds one key. If both of its children hold keys
    /// one of them rotates over and the repair stops. Otherwise the parent
    /// level joins and the grandparent, now keyless, is returned to continue
    /// from.
    fn restructure_keyless_chain(&mut self, parent: NodeId, id: NodeId) -> Option<NodeId> {
        let grand = self.nodes[parent].parent?;
        let parent_pos = self.nodes.index_in_parent(parent)?;
        let uncle = self.nodes[grand].children[1 - parent_pos];

        let (first, second) = {
            let children = &self.nodes[uncle].children;
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
            // parent: two keys over [id, near, far]
            self.join(grand, 0, parent, uncle);
            if near_keyless {
                self.join(parent, 0, id, near);
            } else {
                self.rotate_left(parent, 0, id, near);
                self.join(parent, 1, near, far);
            }
        } else {
            if !near_keyless && !far_keyless {
                self.rotate_right(grand, 0, uncle, parent);
                return None;
            }
            // uncle: two keys over [far, near, id]
            self.join(grand, 0, uncle, parent);
            if near_keyless {
                self.join(uncle, 1, near, id);
            } else {
                self.rotate_right(uncle, 1, near, id);
                self.join(uncle, 0, far, near);
            }
        }

        debug!(node = id, grandparent = grand, "restructured keyless chain");
        Some(grand)
    }

    /// Move the left sibling's largest key up and the separator down into `id`
    fn rotate_right(&mut self, parent: NodeId, separator: usize, left: NodeId, id: NodeId) {
        let (key, value, child) = self.nodes[left].pop_last();
        let (key, value) = self.nodes[parent].replace_entry(separator, key, value);
        self.nodes[id].push_front(key, value, child);
        if let Some(child) = child {
            self.nodes[child].parent = Some(id);
        }
        debug!(node = id, donor = left, "rotated right");
    }

    /// Move the right sibling's smallest key up and the separator down into `id`
    fn rotate_left(&mut self, parent: NodeId, separator: usize, id: NodeId, right: NodeId) {
        let (key, value, child) = self.nodes[right].pop_first();
        let (key, value) = self.nodes[parent].replace_entry(separator, key, value);
        self.nodes[id].push_back(key, value, child);
        if let Some(child) = child {
            self.nodes[child].parent = Some(id);
        }
        debug!(node = id, donor = right, "rotated left");
    }

    /// Merge `right` and the separator between them into `left`
    fn join(&mut self, parent: NodeId, separator: usize, left: NodeId, right: NodeId) {
        let (key, value, removed) = self.nodes[parent].remove_separator(separator);
        debug_assert_eq!(removed, right);

        let right_node = self.nodes.free(right);
        self.nodes[left].absorb(key, value, right_node);
        self.nodes.adopt_children(left);
        debug!(node = left, merged = right, "joined siblings");
    }

    /// Drop keyless roots: an empty leaf empties the tree, a keyless internal
    /// root hands over to its only child
    fn collapse_root(&mut self) {
        while let Some(root) = self.root {
            let node = &self.nodes[root];
            if !node.keys.is_empty() {
                return;
            }

            let child = node.child(0);
            self.nodes.free(root);
            match child {
                Some(child) => {
                    self.nodes[child].parent = None;
                    self.root = Some(child);
                    debug!(root = child, "collapsed root");
                }
                None => {
                    self.root = None;
                    debug!("tree emptied");
                }
            }
        }
    }

    // ========== Traversal ==========

    /// Iterate over all entries in key order
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.nodes, self.root, self.entry_count)
    }

    /// Node ids of every leaf, left to right
    fn leaf_ids(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut pending: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = pending.pop() {
            let node = &self.nodes[id];
            if node.is_leaf() {
                leaves.push(id);
            } else {
                pending.extend(node.children.iter().rev());
            }
        }
        leaves
    }

    // ========== Verification ==========

    /// Check every structural invariant, reporting the first violation
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
        if root_node.parent.is_some() {
            return Err(TreeError::InvalidState(format!("root {root} has a parent")));
        }
        if root_node.keys.is_empty() {
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
        Ok(())
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
        walk.entries += node.keys.len();

        if node.keys.len() != node.values.len() {
            return Err(TreeError::InvalidState(format!(
                "node {id} has {} keys but {} values",
                node.keys.len(),
                node.values.len()
            )));
        }
        if node.keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(TreeError::InvalidState(format!(
                "keys of node {id} are not strictly increasing"
            )));
        }

        let too_low = matches!((lower, node.keys.first()), (Some(bound), Some(first)) if first <= bound);
        let too_high = matches!((upper, node.keys.last()), (Some(bound), Some(last)) if last >= bound);
        if too_low || too_high {
            return Err(TreeError::InvalidState(format!(
                "keys of node {id} fall outside the parent separators"
            )));
        }

        let is_root = node.parent.is_none();
        if node.keys.len() > self.capacity.max_keys
            || (!is_root && node.keys.len() < self.capacity.min_keys)
        {
            return Err(TreeError::InvalidState(format!(
                "node {id} holds {} keys, allowed {}..={}",
                node.keys.len(),
                self.capacity.min_keys,
                self.capacity.max_keys
            )));
        }

        if node.is_leaf() {
            return match walk.leaf_depth {
                Some(expected) if expected != depth => Err(TreeError::InvalidState(format!(
                    "leaf {id} at depth {depth}, other leaves at depth {expected}"
                ))),
                _ => {
                    walk.leaf_depth = Some(depth);
                    Ok(())
                }
            };
        }

        if node.children.len() != node.keys.len() + 1 {
            return Err(TreeError::InvalidState(format!(
                "node {id} has {} keys but {} children",
                node.keys.len(),
                node.children.len()
            )));
        }

        let keyed_child = |&child: &NodeId| self.nodes.get(child).is_some_and(|c| !c.keys.is_empty());
        if self.capacity.min_keys == 0 && !node.children.iter().any(keyed_child) {
            return Err(TreeError::InvalidState(format!(
                "every child of node {id} is keyless"
            )));
        }

        for (i, &child) in node.children.iter().enumerate() {
            let child_parent = self.nodes.get(child).and_then(|c| c.parent);
            if child_parent != Some(id) {
                return Err(TreeError::InvalidState(format!(
                    "child {child} of node {id} points at parent {child_parent:?}"
                )));
            }

            let child_lower = if i == 0 { lower } else { node.keys.get(i - 1) };
            let child_upper = if i == node.keys.len() {
                upper
            } else {
                node.keys.get(i)
            };
            self.check_node(child, child_lower, child_upper, depth + 1, walk)?;
        }

        Ok(())
    }
}

impl<K: Ord + Clone, V: Clone> BTree<K, V> {
    /// All entries in key order
    pub fn sorted_entries(&self) -> Vec<(K, V)> {
        self.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Range search: return all entries where lower <= key <= upper
    pub fn range_search(&self, lower: &K, upper: &K) -> Vec<(K, V)> {
        if lower > upper {
            return Vec::new();
        }

        self.iter()
            .skip_while(|(k, _)| *k < lower)
            .take_while(|(k, _)| *k <= upper)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Keys of every leaf, left to right
    pub fn leaf_keys(&self) -> Vec<Vec<K>> {
        self.leaf_ids()
            .into_iter()
            .map(|id| self.nodes[id].keys.clone())
            .collect()
    }

    /// Structural snapshot of the whole tree
    pub fn shape(&self) -> Option<NodeShape<K>> {
        self.root.map(|root| self.shape_of(root))
    }

    fn shape_of(&self, id: NodeId) -> NodeShape<K> {
        let node = &self.nodes[id];
        NodeShape::internal(
            node.keys.clone(),
            node.children
                .iter()
                .map(|&child| self.shape_of(child))
                .collect(),
        )
    }
}

/// Running totals gathered while checking invariants
#[derive(Debug, Default)]
struct Walk {
    entries: usize,
    nodes: usize,
    leaf_depth: Option<usize>,
}

impl<K: Ord + Clone, V: Clone> OrderedIndex<K, V> for BTree<K, V> {
    fn insert(&mut self, key: K, value: V) -> TreeResult<()> {
        BTree::insert(self, key, value)
    }

    fn delete(&mut self, key: &K) -> bool {
        BTree::delete(self, key)
    }

    fn search(&self, key: &K) -> Option<&V> {
        BTree::search(self, key)
    }

    fn sorted_entries(&self) -> Vec<(K, V)> {
        BTree::sorted_entries(self)
    }

    fn range_search(&self, lower: &K, upper: &K) -> Vec<(K, V)> {
        BTree::range_search(self, lower, upper)
    }

    fn leaf_keys(&self) -> Vec<Vec<K>> {
        BTree::leaf_keys(self)
    }

    fn capacity_for_height(&self, levels: usize) -> usize {
        BTree::capacity_for_height(self, levels)
    }

    fn len(&self) -> usize {
        BTree::len(self)
    }

    fn height(&self) -> usize {
        BTree::height(self)
    }

    fn degree(&self) -> usize {
        BTree::degree(self)
    }

    fn node_count(&self) -> usize {
        BTree::node_count(self)
    }

    fn shape(&self) -> Option<NodeShape<K>> {
        BTree::shape(self)
    }

    fn check_invariants(&self) -> TreeResult<()> {
        BTree::check_invariants(self)
    }

    fn clear(&mut self) {
        BTree::clear(self)
    }

    fn variant_name(&self) -> &'static str {
        "classic"
    }
}
