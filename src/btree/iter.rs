use std::iter::FusedIterator;

use crate::arena::{NodeArena, NodeId};

use super::Node;

/// In-order iterator over a [`super::BTree`]
///
/// Keeps the path from the root as a stack of `(node, next key index)`;
/// after yielding key `i` of an internal node it descends the left spine of
/// child `i + 1`.
pub struct Iter<'a, K, V> {
    nodes: &'a NodeArena<Node<K, V>>,
    stack: Vec<(NodeId, usize)>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(super) fn new(nodes: &'a NodeArena<Node<K, V>>, root: Option<NodeId>, len: usize) -> Self {
        let mut iter = Self {
            nodes,
            stack: Vec::new(),
            remaining: len,
        };
        if let Some(root) = root {
            iter.descend_left(root);
        }
        iter
    }

    fn descend_left(&mut self, mut id: NodeId) {
        loop {
            self.stack.push((id, 0));
            match self.nodes[id].child(0) {
                Some(child) => id = child,
                None => break,
            }
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = self.nodes;

        while let Some(&(id, idx)) = self.stack.last() {
            let node = &nodes[id];
            if idx < node.keys.len() {
                if let Some(top) = self.stack.last_mut() {
                    top.1 += 1;
                }
                if let Some(child) = node.child(idx + 1) {
                    self.descend_left(child);
                }
                self.remaining = self.remaining.saturating_sub(1);
                return Some((&node.keys[idx], &node.values[idx]));
            }
            self.stack.pop();
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}
