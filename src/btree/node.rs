use std::mem;

use crate::arena::{NodeId, TreeNode};
use crate::capacity::Capacity;
use crate::error::{TreeError, TreeResult};

/// Classic B-Tree node: every key carries its value, internal or not
///
/// - keys are strictly increasing and `values[i]` belongs to `keys[i]`
/// - an internal node has `keys.len() + 1` children, a leaf has none
#[derive(Debug, Clone)]
pub struct Node<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) values: Vec<V>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl<K, V> Node<K, V> {
    /// Create an empty leaf
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    /// Create a leaf holding a single pair
    pub fn with_entry(key: K, value: V) -> Self {
        Self {
            keys: vec![key],
            values: vec![value],
            children: Vec::new(),
            parent: None,
        }
    }

    /// Create a node from already ordered parts
    pub fn with_entries(keys: Vec<K>, values: Vec<V>, children: Vec<NodeId>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        debug_assert!(children.is_empty() || children.len() == keys.len() + 1);
        Self {
            keys,
            values,
            children,
            parent: None,
        }
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn key(&self, index: usize) -> Option<&K> {
        self.keys.get(index)
    }

    pub fn child(&self, index: usize) -> Option<NodeId> {
        self.children.get(index).copied()
    }

    /// Insert a separator with its right-hand child at `pos`
    pub fn insert_separator(&mut self, pos: usize, key: K, value: V, right: NodeId) {
        assert!(!self.children.is_empty(), "insert_separator on a leaf");
        self.keys.insert(pos, key);
        self.values.insert(pos, value);
        self.children.insert(pos + 1, right);
    }

    /// Remove the separator at `pos` together with its right-hand child
    pub fn remove_separator(&mut self, pos: usize) -> (K, V, NodeId) {
        assert!(!self.children.is_empty(), "remove_separator on a leaf");
        let key = self.keys.remove(pos);
        let value = self.values.remove(pos);
        let child = self.children.remove(pos + 1);
        (key, value, child)
    }

    /// Remove the entry at `index` from a leaf
    pub fn remove_key(&mut self, index: usize) -> (K, V) {
        assert!(self.children.is_empty(), "remove_key on an internal node");
        (self.keys.remove(index), self.values.remove(index))
    }

    /// Put a new entry at `index`, returning the one it displaced
    pub fn replace_entry(&mut self, index: usize, key: K, value: V) -> (K, V) {
        (
            mem::replace(&mut self.keys[index], key),
            mem::replace(&mut self.values[index], value),
        )
    }

    /// Exchange the entry at `index` with `other`'s entry at `other_index`
    pub fn swap_entry(&mut self, index: usize, other: &mut Node<K, V>, other_index: usize) {
        mem::swap(&mut self.keys[index], &mut other.keys[other_index]);
        mem::swap(&mut self.values[index], &mut other.values[other_index]);
    }

    /// Split an overflown node.
    ///
    /// This node keeps `keys[..=min_keys]` (the last of which is the key to
    /// promote) and the first `min_keys + 1` children; the returned sibling
    /// takes everything after. Moved children still point at this node until
    /// the caller re-parents them.
    pub fn split(&mut self, cap: &Capacity) -> Node<K, V> {
        assert!(
            self.keys.len() > cap.max_keys,
            "split on a node holding {} keys (max {})",
            self.keys.len(),
            cap.max_keys
        );

        let keep = cap.min_keys + 1;
        let children = if self.children.is_empty() {
            Vec::new()
        } else {
            self.children.split_off(keep)
        };

        Node {
            keys: self.keys.split_off(keep),
            values: self.values.split_off(keep),
            children,
            parent: self.parent,
        }
    }

    /// Degree-2 split of an overflown internal node whose first child is keyless.
    ///
    /// This node keeps its first key and first two children, the second key
    /// is handed back for promotion and the new sibling is left keyless over
    /// the last child alone.
    pub fn split_keyless_right(&mut self) -> (K, V, Node<K, V>) {
        assert!(
            self.keys.len() == 2 && self.children.len() == 3,
            "split_keyless_right on a node holding {} keys and {} children",
            self.keys.len(),
            self.children.len()
        );

        let children = self.children.split_off(2);
        let sibling = Node {
            keys: Vec::new(),
            values: Vec::new(),
            children,
            parent: self.parent,
        };
        match (self.keys.pop(), self.values.pop()) {
            (Some(key), Some(value)) => (key, value, sibling),
            _ => unreachable!("key count checked above"),
        }
    }

    /// Detach the middle key left behind by [`Node::split`]
    pub fn take_key_to_promote(&mut self, cap: &Capacity) -> (K, V) {
        assert_eq!(
            self.keys.len(),
            cap.min_keys + 1,
            "no key to promote at this key count"
        );

        match (self.keys.pop(), self.values.pop()) {
            (Some(key), Some(value)) => (key, value),
            _ => unreachable!("key count checked above"),
        }
    }

    /// Take the largest entry and, for an internal node, the last child
    pub fn pop_last(&mut self) -> (K, V, Option<NodeId>) {
        assert!(!self.keys.is_empty(), "pop_last on an empty node");
        let child = self.children.pop();
        match (self.keys.pop(), self.values.pop()) {
            (Some(key), Some(value)) => (key, value, child),
            _ => unreachable!("node checked non-empty"),
        }
    }

    /// Take the smallest entry and, for an internal node, the first child
    pub fn pop_first(&mut self) -> (K, V, Option<NodeId>) {
        assert!(!self.keys.is_empty(), "pop_first on an empty node");
        let child = if self.children.is_empty() {
            None
        } else {
            Some(self.children.remove(0))
        };
        (self.keys.remove(0), self.values.remove(0), child)
    }

    pub fn push_front(&mut self, key: K, value: V, child: Option<NodeId>) {
        self.keys.insert(0, key);
        self.values.insert(0, value);
        if let Some(child) = child {
            self.children.insert(0, child);
        }
    }

    pub fn push_back(&mut self, key: K, value: V, child: Option<NodeId>) {
        self.keys.push(key);
        self.values.push(value);
        if let Some(child) = child {
            self.children.push(child);
        }
    }

    /// Join: append the separator and all of `right`'s contents
    pub fn absorb(&mut self, key: K, value: V, right: Node<K, V>) {
        self.keys.push(key);
        self.values.push(value);
        self.keys.extend(right.keys);
        self.values.extend(right.values);
        self.children.extend(right.children);
    }
}

impl<K: Ord, V> Node<K, V> {
    /// Binary search for `key`: `Ok(index)` if present, else `Err(child slot)`
    pub fn find_key(&self, key: &K) -> Result<usize, usize> {
        self.keys.binary_search(key)
    }

    /// Insert keeping key order; a duplicate leaves the node untouched
    pub fn insert_key(&mut self, key: K, value: V) -> TreeResult<usize> {
        match self.find_key(&key) {
            Ok(_) => Err(TreeError::DuplicateKey),
            Err(pos) => {
                self.keys.insert(pos, key);
                self.values.insert(pos, value);
                Ok(pos)
            }
        }
    }
}

impl<K, V> Default for Node<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TreeNode for Node<K, V> {
    fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn children(&self) -> &[NodeId] {
        &self.children
    }

    fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }
}
