use std::iter::FusedIterator;

use crate::arena::{NodeArena, NodeId};

use super::{BPlusNode, LeafNode};

fn leaf_at<K, V>(nodes: &NodeArena<BPlusNode<K, V>>, id: NodeId) -> &LeafNode<K, V> {
    nodes[id]
        .as_leaf()
        .unwrap_or_else(|| panic!("leaf chain reached non-leaf node {id}"))
}

/// Double-ended iterator over the entries of a [`super::BPlusTree`]
///
/// The front cursor walks `next` links and the back cursor walks `prev`
/// links. `remaining` stops both once they meet.
pub struct Iter<'a, K, V> {
    nodes: &'a NodeArena<BPlusNode<K, V>>,
    /// Leaf and index of the next entry from the front
    front: Option<(NodeId, usize)>,
    /// Leaf and one-past index of the next entry from the back
    back: Option<(NodeId, usize)>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(super) fn new(
        nodes: &'a NodeArena<BPlusNode<K, V>>,
        first: Option<NodeId>,
        last: Option<NodeId>,
        len: usize,
    ) -> Self {
        Self {
            nodes,
            front: first.map(|id| (id, 0)),
            back: last.map(|id| (id, leaf_at(nodes, id).len())),
            remaining: len,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let nodes = self.nodes;

        while let Some((id, idx)) = self.front {
            let leaf = leaf_at(nodes, id);
            if idx < leaf.len() {
                self.front = Some((id, idx + 1));
                self.remaining -= 1;
                return Some((&leaf.keys[idx], &leaf.values[idx]));
            }
            self.front = leaf.next.map(|next| (next, 0));
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let nodes = self.nodes;

        while let Some((id, end)) = self.back {
            let leaf = leaf_at(nodes, id);
            if end > 0 {
                self.back = Some((id, end - 1));
                self.remaining -= 1;
                return Some((&leaf.keys[end - 1], &leaf.values[end - 1]));
            }
            self.back = leaf
                .prev
                .map(|prev| (prev, leaf_at(nodes, prev).len()));
        }

        None
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Iterator over the leaves of a [`super::BPlusTree`] in chain order
pub struct LeafChain<'a, K, V> {
    nodes: &'a NodeArena<BPlusNode<K, V>>,
    current: Option<NodeId>,
}

impl<'a, K, V> LeafChain<'a, K, V> {
    pub(super) fn new(nodes: &'a NodeArena<BPlusNode<K, V>>, first: Option<NodeId>) -> Self {
        Self {
            nodes,
            current: first,
        }
    }
}

impl<'a, K, V> Iterator for LeafChain<'a, K, V> {
    type Item = &'a LeafNode<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let leaf = leaf_at(self.nodes, self.current?);
        self.current = leaf.next;
        Some(leaf)
    }
}

impl<K, V> FusedIterator for LeafChain<'_, K, V> {}
