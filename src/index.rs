use crate::error::TreeResult;
use crate::shape::NodeShape;

/// Operations shared by the classic B-Tree and the B+Tree
///
/// Lets callers pick a variant at runtime (see [`crate::TreeConfig::build`]).
pub trait OrderedIndex<K, V> {
    /// Insert a new pair; an existing key is rejected and leaves the tree unchanged
    fn insert(&mut self, key: K, value: V) -> TreeResult<()>;

    /// Remove a key, returning true if it was present
    fn delete(&mut self, key: &K) -> bool;

    fn search(&self, key: &K) -> Option<&V>;

    /// All entries in ascending key order
    fn sorted_entries(&self) -> Vec<(K, V)>;

    /// Entries with `lower <= key <= upper`
    fn range_search(&self, lower: &K, upper: &K) -> Vec<(K, V)>;

    /// Keys of every leaf, left to right
    fn leaf_keys(&self) -> Vec<Vec<K>>;

    /// Maximum number of keys a tree of the given height can represent
    fn capacity_for_height(&self, levels: usize) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 0 for an empty tree, 1 for a single leaf
    fn height(&self) -> usize;

    fn degree(&self) -> usize;

    fn node_count(&self) -> usize;

    fn shape(&self) -> Option<NodeShape<K>>;

    /// Verify every structural invariant, reporting the first violation
    fn check_invariants(&self) -> TreeResult<()>;

    fn clear(&mut self);

    /// Short variant label for display
    fn variant_name(&self) -> &'static str;
}
