use serde::Serialize;

/// Snapshot of a subtree: the keys of one node plus its children, recursively
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeShape<K> {
    pub keys: Vec<K>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeShape<K>>,
}

impl<K> NodeShape<K> {
    pub fn leaf(keys: Vec<K>) -> Self {
        Self {
            keys,
            children: Vec::new(),
        }
    }

    pub fn internal(keys: Vec<K>, children: Vec<NodeShape<K>>) -> Self {
        Self { keys, children }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Levels below and including this node
    pub fn height(&self) -> usize {
        1 + self.children.first().map_or(0, NodeShape::height)
    }
}
