use super::*;

fn val(key: i64) -> String {
    format!("value-{}", key)
}

fn tree_with(degree: usize, keys: &[i64]) -> BPlusTree<i64, String> {
    let mut tree = BPlusTree::new(degree).unwrap();
    for &key in keys {
        tree.insert(key, val(key)).unwrap();
    }
    tree.check_invariants().unwrap();
    tree
}

fn leaf(keys: &[i64]) -> NodeShape<i64> {
    NodeShape::leaf(keys.to_vec())
}

fn keys_of(tree: &BPlusTree<i64, String>) -> Vec<i64> {
    tree.iter().map(|(k, _)| *k).collect()
}

#[test]
fn test_new_tree() {
    let tree: BPlusTree<i64, String> = BPlusTree::new(4).unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.degree(), 4);
    assert_eq!(tree.first_leaf_id(), None);
    assert_eq!(tree.iter().next(), None);
    tree.check_invariants().unwrap();
}

#[test]
fn test_invalid_degree() {
    assert_eq!(
        BPlusTree::<i64, String>::new(1).unwrap_err(),
        TreeError::InvalidDegree(1)
    );
    assert!(BPlusTree::<i64, String>::new(0).is_err());
    assert!(BPlusTree::<i64, String>::new(2).is_ok());
}

#[test]
fn test_single_insert_and_search() {
    let tree = tree_with(4, &[42]);

    assert!(!tree.is_empty());
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.search(&42), Some(&val(42)));
    assert_eq!(tree.search(&41), None);
}

#[test]
fn test_multiple_inserts_no_split() {
    // Degree 4 means max 3 entries per leaf
    let tree = tree_with(4, &[10, 20, 30]);

    assert_eq!(tree.len(), 3);
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.shape(), Some(leaf(&[10, 20, 30])));
}

#[test]
fn test_leaf_split_copies_separator() {
    let tree = tree_with(3, &[10, 20, 30]);

    assert_eq!(
        tree.shape(),
        Some(NodeShape::internal(vec![30], vec![leaf(&[10, 20]), leaf(&[30])]))
    );
    assert_eq!(tree.height(), 2);

    // 30 lives in the root as a router and in the leaf as an entry
    assert_eq!(tree.search(&30), Some(&val(30)));
    assert_eq!(tree.leaf_keys(), vec![vec![10, 20], vec![30]]);
}

#[test]
fn test_internal_split_moves_separator() {
    let tree = tree_with(3, &[10, 20, 30, 40, 50, 60, 70]);

    assert_eq!(
        tree.shape(),
        Some(NodeShape::internal(
            vec![50],
            vec![
                NodeShape::internal(vec![30], vec![leaf(&[10, 20]), leaf(&[30, 40])]),
                NodeShape::internal(vec![70], vec![leaf(&[50, 60]), leaf(&[70])]),
            ]
        ))
    );
    assert_eq!(tree.height(), 3);
    assert_eq!(tree.node_count(), 7);
}

#[test]
fn test_multiple_splits() {
    let tree = tree_with(4, &(0..20).map(|i| i * 10).collect::<Vec<_>>());

    assert_eq!(tree.len(), 20);
    assert!(tree.height() >= 2);

    // All entries should be searchable
    for i in 0..20 {
        assert_eq!(tree.search(&(i * 10)), Some(&val(i * 10)));
    }
}

#[test]
fn test_duplicate_rejected_without_change() {
    let mut tree = tree_with(3, &[10, 20, 30, 40, 50]);
    let shape = tree.shape();

    // 30 is both a root separator and a leaf entry
    assert_eq!(
        tree.insert(30, "other".to_string()),
        Err(TreeError::DuplicateKey)
    );
    assert_eq!(
        tree.insert(50, "other".to_string()),
        Err(TreeError::DuplicateKey)
    );

    assert_eq!(tree.len(), 5);
    assert_eq!(tree.shape(), shape);
    assert_eq!(tree.search(&30), Some(&val(30)));
    tree.check_invariants().unwrap();
}

#[test]
fn test_round_trip_sorted_entries() {
    // 37 is coprime with 101, so this visits every key once in scrambled order
    let keys: Vec<i64> = (0..101).map(|i| (i * 37) % 101).collect();
    let tree = tree_with(4, &keys);

    let entries = tree.sorted_entries();
    assert_eq!(entries.len(), 101);
    for (i, (key, value)) in entries.into_iter().enumerate() {
        assert_eq!(key, i as i64);
        assert_eq!(value, val(key));
    }
}

#[test]
fn test_ascending_load_half_fills_leaves() {
    let tree = tree_with(4, &(0..30).collect::<Vec<_>>());

    let leaves = tree.leaf_keys();
    let (last, rest) = leaves.split_last().unwrap();
    assert!(rest.iter().all(|keys| keys.len() == 2));
    assert!(!last.is_empty());
    assert_eq!(leaves.concat(), (0..30).collect::<Vec<_>>());
}

#[test]
fn test_reverse_iteration() {
    let tree = tree_with(3, &(0..40).collect::<Vec<_>>());

    let backwards: Vec<i64> = tree.iter().rev().map(|(k, _)| *k).collect();
    assert_eq!(backwards, (0..40).rev().collect::<Vec<_>>());
}

#[test]
fn test_iterator_ends_meet() {
    let tree = tree_with(4, &(0..10).collect::<Vec<_>>());
    let mut iter = tree.iter();

    assert_eq!(iter.len(), 10);
    assert_eq!(iter.next().map(|(k, _)| *k), Some(0));
    assert_eq!(iter.next_back().map(|(k, _)| *k), Some(9));
    assert_eq!(iter.len(), 8);

    let middle: Vec<i64> = iter.by_ref().map(|(k, _)| *k).collect();
    assert_eq!(middle, (1..9).collect::<Vec<_>>());
    assert_eq!(iter.next(), None);
    assert_eq!(iter.next_back(), None);
}

#[test]
fn test_leaf_chain_links() {
    let tree = tree_with(3, &(0..25).collect::<Vec<_>>());

    let leaves: Vec<&LeafNode<i64, String>> = tree.leaves().collect();
    assert!(leaves.len() > 1);
    assert!(leaves[0].prev.is_none());
    assert!(leaves[leaves.len() - 1].next.is_none());

    let chained: Vec<i64> = tree.leaf_keys().into_iter().flatten().collect();
    assert_eq!(chained, (0..25).collect::<Vec<_>>());

    let first = tree.first_leaf_id().unwrap();
    let last = tree.last_leaf_id().unwrap();
    assert_ne!(first, last);
    assert_eq!(tree.get_node(last).and_then(|n| n.as_leaf()).unwrap().next, None);
}

#[test]
fn test_range_search() {
    let tree = tree_with(4, &(0..10).map(|i| i * 10).collect::<Vec<_>>());

    let results = tree.range_search(&25, &55);
    assert_eq!(results, vec![(30, val(30)), (40, val(40)), (50, val(50))]);

    // Bounds are inclusive and may cross leaves
    let results = tree.range_search(&0, &90);
    assert_eq!(results.len(), 10);
}

#[test]
fn test_range_search_empty() {
    let tree = tree_with(4, &(0..10).map(|i| i * 10).collect::<Vec<_>>());

    // Range with no entries
    assert!(tree.range_search(&100, &200).is_empty());
    assert!(tree.range_search(&41, &49).is_empty());

    // Reversed range
    assert!(tree.range_search(&50, &20).is_empty());
}

#[test]
fn test_delete_single() {
    let mut tree = tree_with(4, &[10, 20, 30]);

    assert!(tree.delete(&20));
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.search(&20), None);
    assert_eq!(tree.search(&10), Some(&val(10)));
    assert_eq!(tree.search(&30), Some(&val(30)));
}

#[test]
fn test_delete_not_found() {
    let mut tree = tree_with(4, &[10]);

    assert!(!tree.delete(&20));
    assert_eq!(tree.len(), 1);

    let mut empty: BPlusTree<i64, String> = BPlusTree::new(4).unwrap();
    assert!(!empty.delete(&1));
}

#[test]
fn test_delete_joins_up_to_root() {
    let mut tree = tree_with(3, &[10, 20, 30, 40, 50, 60, 70]);
    assert_eq!(tree.height(), 3);

    // The first delete borrows 60, the second joins the last two leaves
    // and then the two internal nodes
    assert!(tree.delete(&70));
    tree.check_invariants().unwrap();
    assert!(tree.delete(&60));
    tree.check_invariants().unwrap();

    assert_eq!(
        tree.shape(),
        Some(NodeShape::internal(
            vec![30, 50],
            vec![leaf(&[10, 20]), leaf(&[30, 40]), leaf(&[50])]
        ))
    );
    assert_eq!(keys_of(&tree), vec![10, 20, 30, 40, 50]);
    assert_eq!(tree.height(), 2);
}

#[test]
fn test_delete_borrows_from_left_leaf() {
    let mut tree = tree_with(3, &[10, 20, 30, 5]);
    assert!(tree.delete(&20));
    tree.check_invariants().unwrap();

    assert_eq!(
        tree.shape(),
        Some(NodeShape::internal(
            vec![10, 30],
            vec![leaf(&[5]), leaf(&[10]), leaf(&[30])]
        ))
    );
}

#[test]
fn test_delete_borrows_from_right_leaf() {
    let mut tree = tree_with(3, &[10, 20, 30, 40]);

    assert_eq!(tree.remove(&10), Some(val(10)));
    assert_eq!(tree.remove(&20), Some(val(20)));
    tree.check_invariants().unwrap();

    assert_eq!(
        tree.shape(),
        Some(NodeShape::internal(vec![40], vec![leaf(&[30]), leaf(&[40])]))
    );
}

#[test]
fn test_stale_separator_still_routes() {
    let mut tree = tree_with(4, &[1, 2, 3, 4]);
    assert_eq!(
        tree.shape(),
        Some(NodeShape::internal(vec![3], vec![leaf(&[1, 2]), leaf(&[3, 4])]))
    );

    assert!(tree.delete(&3));
    tree.check_invariants().unwrap();
    assert_eq!(tree.get_node(tree.root_node_id().unwrap()).unwrap().keys(), &[3]);
    assert_eq!(tree.search(&3), None);
    assert_eq!(tree.search(&4), Some(&val(4)));

    tree.insert(3, val(3)).unwrap();
    tree.check_invariants().unwrap();
    assert_eq!(tree.leaf_keys(), vec![vec![1, 2], vec![3, 4]]);
}

#[test]
fn test_delete_until_empty() {
    let mut tree = tree_with(4, &(1..=100).collect::<Vec<_>>());
    assert!(tree.height() >= 3);

    for key in 1..=100 {
        assert!(tree.delete(&key));
        tree.check_invariants().unwrap();
    }

    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.node_count(), 0);
    assert_eq!(tree.leaves().count(), 0);

    tree.insert(7, val(7)).unwrap();
    assert_eq!(tree.search(&7), Some(&val(7)));
}

#[test]
fn test_delete_from_the_back() {
    let mut tree = tree_with(5, &(0..60).collect::<Vec<_>>());

    for key in (0..60).rev() {
        assert!(tree.delete(&key));
        tree.check_invariants().unwrap();
        assert_eq!(tree.iter().rev().next().map(|(k, _)| *k), (key > 0).then(|| key - 1));
    }
    assert!(tree.is_empty());
}

#[test]
fn test_stress_insert_delete() {
    for degree in [3, 4, 5, 8] {
        let keys: Vec<i64> = (0..200).map(|i| (i * 73) % 200).collect();
        let mut tree = tree_with(degree, &keys);

        for key in (0..200).step_by(2) {
            assert!(tree.delete(&key));
            tree.check_invariants().unwrap();
        }

        assert_eq!(tree.len(), 100);
        for key in 0..200 {
            let expected = (key % 2 == 1).then(|| val(key));
            assert_eq!(tree.search(&key).cloned(), expected, "degree {degree}, key {key}");
        }
    }
}

#[test]
fn test_degree_two() {
    let mut tree = tree_with(2, &(1..=20).collect::<Vec<_>>());
    assert_eq!(tree.len(), 20);
    assert!(tree.leaves().all(|leaf| leaf.len() == 1));

    for key in (2..=20).step_by(2) {
        assert!(tree.delete(&key));
        tree.check_invariants().unwrap();
    }
    assert_eq!(keys_of(&tree), (1..=20).step_by(2).collect::<Vec<_>>());

    for key in (1..=20).step_by(2) {
        assert!(tree.delete(&key));
        tree.check_invariants().unwrap();
    }
    assert!(tree.is_empty());
    assert_eq!(tree.node_count(), 0);
}

#[test]
fn test_degree_two_scrambled() {
    let keys: Vec<i64> = (0..50).map(|i| (i * 17) % 50).collect();
    let mut tree = tree_with(2, &keys);

    for &key in keys.iter().rev() {
        assert!(tree.delete(&key));
        tree.check_invariants().unwrap();
    }
    assert!(tree.is_empty());
}

#[test]
fn test_degree_two_lends_to_keyless_sibling() {
    let mut tree = tree_with(2, &[1, 2, 3, 4]);

    // 4 overflows the right node, which shifts a separator left
    assert_eq!(
        tree.shape(),
        Some(NodeShape::internal(
            vec![3],
            vec![
                NodeShape::internal(vec![2], vec![leaf(&[1]), leaf(&[2])]),
                NodeShape::internal(vec![4], vec![leaf(&[3]), leaf(&[4])]),
            ]
        ))
    );

    assert!(tree.delete(&4));
    tree.check_invariants().unwrap();
    assert!(tree.delete(&3));
    tree.check_invariants().unwrap();
    assert_eq!(
        tree.shape(),
        Some(NodeShape::internal(vec![2], vec![leaf(&[1]), leaf(&[2])]))
    );
    assert_eq!(tree.leaf_keys(), vec![vec![1], vec![2]]);
}

#[test]
fn test_degree_two_sequential_loads_stay_shallow() {
    let ascending: Vec<i64> = (0..1024).collect();
    let descending: Vec<i64> = ascending.iter().rev().copied().collect();

    for keys in [ascending, descending] {
        let mut tree = tree_with(2, &keys);
        assert!(tree.height() <= 22, "height {} for 1024 keys", tree.height());
        assert!(tree.node_count() <= 3 * 1024, "{} nodes for 1024 keys", tree.node_count());

        for key in &keys[..1000] {
            assert!(tree.delete(key));
        }
        tree.check_invariants().unwrap();
        assert!(tree.height() <= 2 * 24usize.ilog2() as usize + 2);
        assert!(tree.node_count() <= 3 * 24);
        assert_eq!(tree.leaf_keys().len(), 24);
    }
}

#[test]
fn test_capacity_for_height() {
    let tree: BPlusTree<i64, String> = BPlusTree::new(3).unwrap();
    assert_eq!(tree.capacity_for_height(0), 0);
    assert_eq!(tree.capacity_for_height(1), 2);
    assert_eq!(tree.capacity_for_height(2), 6);
    assert_eq!(tree.capacity_for_height(3), 18);
}

#[test]
fn test_len_within_capacity_of_height() {
    for count in [1, 2, 3, 6, 7, 18, 19, 100] {
        let tree = tree_with(3, &(0..count).collect::<Vec<_>>());
        assert!(tree.len() <= tree.capacity_for_height(tree.height()));
    }
}

#[test]
fn test_string_keys() {
    let mut tree = BPlusTree::new(3).unwrap();
    for word in ["pear", "apple", "fig", "kiwi", "banana", "cherry"] {
        tree.insert(word.to_string(), word.len()).unwrap();
    }
    tree.check_invariants().unwrap();

    let words: Vec<&str> = tree.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(words, vec!["apple", "banana", "cherry", "fig", "kiwi", "pear"]);
    assert!(tree.delete(&"fig".to_string()));
    assert_eq!(tree.search(&"kiwi".to_string()), Some(&4));
    tree.check_invariants().unwrap();
}

#[test]
fn test_clear() {
    let mut tree = tree_with(4, &(0..50).collect::<Vec<_>>());
    tree.clear();

    assert!(tree.is_empty());
    assert_eq!(tree.node_count(), 0);
    assert_eq!(tree.iter().count(), 0);
    tree.check_invariants().unwrap();
}

#[test]
fn test_check_invariants_catches_broken_chain() {
    let mut tree = tree_with(3, &[10, 20, 30, 40]);
    let first = tree.first_leaf_id().unwrap();
    tree.leaf_mut(first).next = None;

    assert!(matches!(
        tree.check_invariants(),
        Err(TreeError::InvalidState(_))
    ));
}
