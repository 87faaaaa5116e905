use std::mem;

use crate::arena::{NodeId, TreeNode};
use crate::capacity::Capacity;
use crate::error::{TreeError, TreeResult};

/// Internal node: stores separator keys and child pointers
///
/// In this B+ tree variant:
/// - every key in children[i] is < keys[i]
/// - every key in children[i + 1] is >= keys[i]
/// - children.len() == keys.len() + 1
#[derive(Debug, Clone)]
pub struct InternalNode<K> {
    /// Separator keys (copies of leaf keys, no payload)
    pub keys: Vec<K>,
    /// Child node IDs
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl<K> InternalNode<K> {
    /// Create a new internal node with given keys and children
    pub fn new(keys: Vec<K>, children: Vec<NodeId>) -> Self {
        debug_assert_eq!(keys.len() + 1, children.len());
        Self {
            keys,
            children,
            parent: None,
        }
    }

    /// Number of children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check if node is empty
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Insert a separator and the child to its right after a child split
    pub fn insert_separator(&mut self, pos: usize, key: K, right: NodeId) {
        self.keys.insert(pos, key);
        self.children.insert(pos + 1, right);
    }

    /// Remove the separator at `pos` and the child to its right
    pub fn remove_separator(&mut self, pos: usize) -> (K, NodeId) {
        (self.keys.remove(pos), self.children.remove(pos + 1))
    }

    /// Update the key at a given position, returning the old one
    pub fn replace_key(&mut self, index: usize, key: K) -> K {
        mem::replace(&mut self.keys[index], key)
    }

    /// Split an overflown internal node.
    ///
    /// Keeps `keys[..=min_keys]` and `children[..=min_keys]`; the last kept
    /// key is the one to promote.
    pub fn split(&mut self, cap: &Capacity) -> InternalNode<K> {
        assert!(
            self.keys.len() > cap.max_keys,
            "split on an internal node holding {} keys (max {})",
            self.keys.len(),
            cap.max_keys
        );

        let keep = cap.min_keys + 1;
        InternalNode {
            keys: self.keys.split_off(keep),
            children: self.children.split_off(keep),
            parent: self.parent,
        }
    }

    /// Detach the separator left behind by [`InternalNode::split`]; it moves up
    pub fn take_key_to_promote(&mut self, cap: &Capacity) -> K {
        assert_eq!(
            self.keys.len(),
            cap.min_keys + 1,
            "no key to promote at this key count"
        );
        match self.keys.pop() {
            Some(key) => key,
            None => unreachable!("key count checked above"),
        }
    }

    /// Degree-2 split of an overflown node whose first child is keyless
    ///
    /// This node keeps its first key and first two children. The second key
    /// is returned for promotion and the sibling is keyless over the last child.
    pub fn split_keyless_right(&mut self) -> (K, InternalNode<K>) {
        assert!(
            self.keys.len() == 2 && self.children.len() == 3,
            "split_keyless_right on an internal node holding {} keys and {} children",
            self.keys.len(),
            self.children.len()
        );

        let sibling = InternalNode {
            keys: Vec::new(),
            children: self.children.split_off(2),
            parent: self.parent,
        };
        match self.keys.pop() {
            Some(key) => (key, sibling),
            None => unreachable!("key count checked above"),
        }
    }

    /// Take the last separator and child
    pub fn pop_last(&mut self) -> (K, NodeId) {
        match (self.keys.pop(), self.children.pop()) {
            (Some(key), Some(child)) => (key, child),
            _ => panic!("pop_last on an internal node without keys"),
        }
    }

    /// Take the first separator and child
    pub fn pop_first(&mut self) -> (K, NodeId) {
        assert!(!self.keys.is_empty(), "pop_first on an internal node without keys");
        (self.keys.remove(0), self.children.remove(0))
    }

    pub fn push_front(&mut self, key: K, child: NodeId) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    pub fn push_back(&mut self, key: K, child: NodeId) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Join: pull the parent separator down and append `right`
    pub fn absorb(&mut self, separator: K, right: InternalNode<K>) {
        self.keys.push(separator);
        self.keys.extend(right.keys);
        self.children.extend(right.children);
    }
}

impl<K: Ord> InternalNode<K> {
    /// Find the child index for a given key: the number of separators <= key
    pub fn find_child_index(&self, key: &K) -> usize {
        self.keys.partition_point(|separator| separator <= key)
    }
}

/// Leaf node: stores key-value pairs, linked to both neighbouring leaves
#[derive(Debug, Clone)]
pub struct LeafNode<K, V> {
    /// Keys (sorted, unique)
    pub keys: Vec<K>,
    /// Values corresponding to keys
    pub values: Vec<V>,
    pub parent: Option<NodeId>,
    /// Link to next leaf for range queries
    pub next: Option<NodeId>,
    /// Link to previous leaf for reverse scans
    pub prev: Option<NodeId>,
}

impl<K, V> LeafNode<K, V> {
    /// Create a new empty leaf node
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            parent: None,
            next: None,
            prev: None,
        }
    }

    /// Create a leaf node with given entries
    pub fn with_entries(keys: Vec<K>, values: Vec<V>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        Self {
            keys,
            values,
            parent: None,
            next: None,
            prev: None,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if leaf is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Get the maximum key in this leaf
    pub fn max_key(&self) -> Option<&K> {
        self.keys.last()
    }

    /// Get the minimum key in this leaf
    pub fn min_key(&self) -> Option<&K> {
        self.keys.first()
    }

    /// Entries of this leaf in key order
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// Split this leaf node, returning the new right sibling
    ///
    /// This node keeps the first `ceil(len / 2)` entries; the right
    /// sibling's first key is the separator to copy into the parent. Chain
    /// links are left for the caller, which knows the node ids.
    pub fn split(&mut self, cap: &Capacity) -> LeafNode<K, V> {
        assert!(
            self.keys.len() > cap.max_keys,
            "split on a leaf holding {} keys (max {})",
            self.keys.len(),
            cap.max_keys
        );

        let mid = self.keys.len().div_ceil(2);
        let mut right =
            LeafNode::with_entries(self.keys.split_off(mid), self.values.split_off(mid));
        right.parent = self.parent;
        right
    }

    pub fn pop_last(&mut self) -> (K, V) {
        match (self.keys.pop(), self.values.pop()) {
            (Some(key), Some(value)) => (key, value),
            _ => panic!("pop_last on an empty leaf"),
        }
    }

    pub fn pop_first(&mut self) -> (K, V) {
        assert!(!self.keys.is_empty(), "pop_first on an empty leaf");
        (self.keys.remove(0), self.values.remove(0))
    }

    pub fn push_front(&mut self, key: K, value: V) {
        self.keys.insert(0, key);
        self.values.insert(0, value);
    }

    pub fn push_back(&mut self, key: K, value: V) {
        self.keys.push(key);
        self.values.push(value);
    }

    /// Join: append all of `right` and take over its forward link
    pub fn absorb(&mut self, right: LeafNode<K, V>) {
        self.keys.extend(right.keys);
        self.values.extend(right.values);
        self.next = right.next;
    }
}

impl<K: Ord, V> LeafNode<K, V> {
    /// Insert a key-value pair in sorted order; duplicates are rejected
    pub fn insert(&mut self, key: K, value: V) -> TreeResult<usize> {
        match self.keys.binary_search(&key) {
            Ok(_) => Err(TreeError::DuplicateKey),
            Err(pos) => {
                self.keys.insert(pos, key);
                self.values.insert(pos, value);
                Ok(pos)
            }
        }
    }

    /// Search for a key
    pub fn search(&self, key: &K) -> Option<&V> {
        let idx = self.keys.binary_search(key).ok()?;
        Some(&self.values[idx])
    }

    /// Delete the entry with the given key, returning its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.keys.binary_search(key).ok()?;
        self.keys.remove(idx);
        Some(self.values.remove(idx))
    }
}

impl<K, V> Default for LeafNode<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// B+ tree node (either internal or leaf)
#[derive(Debug, Clone)]
pub enum BPlusNode<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

impl<K, V> BPlusNode<K, V> {
    /// Check if this is an internal node
    pub fn is_internal(&self) -> bool {
        matches!(self, BPlusNode::Internal(_))
    }

    /// Get the keys of this node (separators for internal nodes)
    pub fn keys(&self) -> &[K] {
        match self {
            BPlusNode::Internal(node) => &node.keys,
            BPlusNode::Leaf(node) => &node.keys,
        }
    }

    /// Get as internal node reference
    pub fn as_internal(&self) -> Option<&InternalNode<K>> {
        match self {
            BPlusNode::Internal(node) => Some(node),
            BPlusNode::Leaf(_) => None,
        }
    }

    /// Get as internal node mutable reference
    pub fn as_internal_mut(&mut self) -> Option<&mut InternalNode<K>> {
        match self {
            BPlusNode::Internal(node) => Some(node),
            BPlusNode::Leaf(_) => None,
        }
    }

    /// Get as leaf node reference
    pub fn as_leaf(&self) -> Option<&LeafNode<K, V>> {
        match self {
            BPlusNode::Internal(_) => None,
            BPlusNode::Leaf(node) => Some(node),
        }
    }

    /// Get as leaf node mutable reference
    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafNode<K, V>> {
        match self {
            BPlusNode::Internal(_) => None,
            BPlusNode::Leaf(node) => Some(node),
        }
    }
}

impl<K, V> TreeNode for BPlusNode<K, V> {
    fn key_count(&self) -> usize {
        self.keys().len()
    }

    fn children(&self) -> &[NodeId] {
        match self {
            BPlusNode::Internal(node) => &node.children,
            BPlusNode::Leaf(_) => &[],
        }
    }

    fn parent(&self) -> Option<NodeId> {
        match self {
            BPlusNode::Internal(node) => node.parent,
            BPlusNode::Leaf(node) => node.parent,
        }
    }

    fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            BPlusNode::Internal(node) => node.parent = parent,
            BPlusNode::Leaf(node) => node.parent = parent,
        }
    }

    fn is_leaf(&self) -> bool {
        matches!(self, BPlusNode::Leaf(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(keys: &[i64]) -> LeafNode<i64, u32> {
        let mut leaf = LeafNode::new();
        for &k in keys {
            leaf.insert(k, k as u32 * 10).unwrap();
        }
        leaf
    }

    #[test]
    fn test_leaf_node_insert() {
        let leaf = leaf(&[5, 3, 7]);

        assert_eq!(leaf.len(), 3);
        assert_eq!(leaf.keys, vec![3, 5, 7]);
        assert_eq!(leaf.values, vec![30, 50, 70]);
    }

    #[test]
    fn test_leaf_node_rejects_duplicate() {
        let mut leaf = leaf(&[3, 5, 7]);

        assert_eq!(leaf.insert(5, 0), Err(TreeError::DuplicateKey));
        assert_eq!(leaf.search(&5), Some(&50));
        assert_eq!(leaf.len(), 3);
    }

    #[test]
    fn test_leaf_node_search() {
        let leaf = leaf(&[3, 5, 7]);

        assert_eq!(leaf.search(&5), Some(&50));
        assert_eq!(leaf.search(&4), None);
        assert_eq!(leaf.search(&10), None);
    }

    #[test]
    fn test_leaf_node_remove() {
        let mut leaf = leaf(&[3, 5, 7]);

        assert_eq!(leaf.remove(&5), Some(50));
        assert_eq!(leaf.len(), 2);
        assert_eq!(leaf.search(&5), None);

        assert_eq!(leaf.remove(&5), None); // Already deleted
    }

    #[test]
    fn test_leaf_node_split() {
        let cap = Capacity::new(6).unwrap();
        let mut leaf = leaf(&[0, 1, 2, 3, 4, 5]);
        leaf.parent = Some(4);

        let right = leaf.split(&cap);

        assert_eq!(leaf.keys, vec![0, 1, 2]);
        assert_eq!(right.keys, vec![3, 4, 5]);
        assert_eq!(right.values, vec![30, 40, 50]);
        assert_eq!(leaf.max_key(), Some(&2));
        assert_eq!(right.min_key(), Some(&3));
        assert_eq!(right.parent, Some(4));
    }

    #[test]
    fn test_leaf_split_halves_are_balanced() {
        for degree in 2..10 {
            let cap = Capacity::new(degree).unwrap();
            let keys: Vec<i64> = (0..degree as i64).collect();
            let mut leaf = leaf(&keys);

            let right = leaf.split(&cap);

            assert!(right.len() >= cap.min_keys.max(1), "degree {degree}");
            assert!(leaf.len() - right.len() <= 1, "degree {degree}");
        }
    }

    #[test]
    fn test_leaf_split_degree_two() {
        let cap = Capacity::new(2).unwrap();
        let mut leaf = leaf(&[1, 2]);

        let right = leaf.split(&cap);

        assert_eq!(leaf.keys, vec![1]);
        assert_eq!(right.keys, vec![2]);
    }

    #[test]
    fn test_leaf_absorb_takes_next_link() {
        let mut left = leaf(&[1, 2]);
        let mut right = leaf(&[3, 4]);
        right.next = Some(9);

        left.absorb(right);

        assert_eq!(left.keys, vec![1, 2, 3, 4]);
        assert_eq!(left.next, Some(9));
    }

    #[test]
    fn test_internal_node_find_child() {
        let node = InternalNode::new(vec![3, 7, 12], vec![0, 1, 2, 3]);

        assert_eq!(node.find_child_index(&1), 0); // < 3, go to child 0
        assert_eq!(node.find_child_index(&3), 1); // == 3, separator lives on the right
        assert_eq!(node.find_child_index(&5), 1);
        assert_eq!(node.find_child_index(&7), 2);
        assert_eq!(node.find_child_index(&10), 2);
        assert_eq!(node.find_child_index(&15), 3); // > all, go to last child
    }

    #[test]
    fn test_internal_node_insert_separator() {
        let mut node = InternalNode::new(vec![3, 12], vec![0, 2, 3]);

        node.insert_separator(1, 7, 1);

        assert_eq!(node.keys, vec![3, 7, 12]);
        assert_eq!(node.children, vec![0, 2, 1, 3]);
        assert_eq!(node.len(), 4);
    }

    #[test]
    fn test_internal_node_split() {
        let cap = Capacity::new(3).unwrap();
        let mut node = InternalNode::new(vec![10, 20, 30], vec![0, 1, 2, 3]);

        let right = node.split(&cap);
        let promoted = node.take_key_to_promote(&cap);

        assert_eq!(promoted, 20);
        assert_eq!(node.keys, vec![10]);
        assert_eq!(node.children, vec![0, 1]);
        assert_eq!(right.keys, vec![30]);
        assert_eq!(right.children, vec![2, 3]);
    }

    #[test]
    fn test_internal_split_keyless_right() {
        let mut node = InternalNode::new(vec![10, 20], vec![0, 1, 2]);

        let (promoted, sibling) = node.split_keyless_right();

        assert_eq!(promoted, 20);
        assert_eq!(node.keys, vec![10]);
        assert_eq!(node.children, vec![0, 1]);
        assert!(sibling.keys.is_empty());
        assert_eq!(sibling.children, vec![2]);
    }

    #[test]
    #[should_panic(expected = "split on an internal node")]
    fn test_internal_split_requires_overflow() {
        let cap = Capacity::new(4).unwrap();
        let mut node = InternalNode::new(vec![10, 20], vec![0, 1, 2]);
        node.split(&cap);
    }

    #[test]
    fn test_node_kind_accessors() {
        let mut node: BPlusNode<i64, u32> = BPlusNode::Leaf(leaf(&[1]));

        assert!(node.is_leaf());
        assert!(!node.is_internal());
        assert!(node.as_internal().is_none());
        assert_eq!(node.children(), &[] as &[NodeId]);
        node.set_parent(Some(3));
        assert_eq!(node.parent(), Some(3));
        assert_eq!(node.as_leaf_mut().map(|l| l.len()), Some(1));
    }
}
