//! Universal invariants (spec.md §8): property tests driven directly against
//! the record store and each index kind, independent of the SQL front end.

use proptest::collection::vec as pvec;
use proptest::prelude::*;
use relfile::index::{AvlIndex, HashIndex, RTreeIndex};
use relfile::point::Point;
use relfile::schema::{Attribute, IndexKind, TableSchema};
use relfile::store::RecordStore;
use relfile::table::TableManager;
use relfile::value::{DataType, Value};
use std::collections::HashSet;
use tempfile::tempdir;

fn int_schema() -> TableSchema {
    TableSchema {
        table_name: "t".into(),
        attributes: vec![
            Attribute { name: "id".into(), data_type: DataType::Int, is_key: true, index: Some(IndexKind::Hash) },
            Attribute { name: "tag".into(), data_type: DataType::Varchar(16), is_key: false, index: None },
        ],
        primary_key: Some("id".into()),
    }
}

fn no_lookup(_: u32) -> relfile::RelResult<Value> {
    unreachable!("lookup should not be needed for a non-key attribute")
}

proptest! {
    /// 1. Record retrievability: every active record, once inserted, is
    /// returned unchanged by `get` until it is deleted.
    #[test]
    fn record_retrievability(ids in pvec(any::<i32>(), 1..30)) {
        let dir = tempdir().unwrap();
        let schema = int_schema();
        let mut store = RecordStore::open(dir.path().join("t.bin"), &schema).unwrap();
        let mut numbers = Vec::new();
        for id in &ids {
            let n = store.insert(&[Some(Value::Int(*id)), Some(Value::Str("x".into()))]).unwrap();
            numbers.push(n);
        }
        for (id, n) in ids.iter().zip(&numbers) {
            let row = store.get(*n).unwrap().unwrap();
            prop_assert_eq!(row[0].clone(), Value::Int(*id));
        }
    }

    /// 2. Index membership consistency: every record inserted into an AVL or
    /// hash index is found by an exact search on its own key, and a deleted
    /// record is no longer found.
    #[test]
    fn avl_index_membership_consistency(keys in pvec(any::<i32>(), 1..40)) {
        let dir = tempdir().unwrap();
        let mut idx = AvlIndex::open(dir.path().join("i.bin"), DataType::Int, false).unwrap();
        for (rn, k) in keys.iter().enumerate() {
            idx.insert(&Value::Int(*k), rn as u32 + 1).unwrap();
        }
        for (rn, k) in keys.iter().enumerate() {
            let found = idx.search_exact(&Value::Int(*k)).unwrap();
            prop_assert!(found.contains(&(rn as u32 + 1)));
        }
        let (rn0, k0) = (1u32, keys[0]);
        idx.delete(&Value::Int(k0), rn0).unwrap();
        let found = idx.search_exact(&Value::Int(k0)).unwrap();
        prop_assert!(!found.contains(&rn0));
    }

    #[test]
    fn hash_index_membership_consistency(keys in pvec(any::<i32>(), 1..40)) {
        let dir = tempdir().unwrap();
        let mut idx = HashIndex::open(dir.path().join("d.bin"), dir.path().join("b.bin"), false).unwrap();
        for (rn, k) in keys.iter().enumerate() {
            idx.insert(&Value::Int(*k), rn as u32 + 1, &mut no_lookup).unwrap();
        }
        for (rn, k) in keys.iter().enumerate() {
            let found = idx.search_exact(&Value::Int(*k), &mut no_lookup).unwrap();
            prop_assert!(found.contains(&(rn as u32 + 1)));
        }
    }

    /// 3. The hash directory is always a power of two in size, and no
    /// bucket's local depth exceeds the current global depth.
    #[test]
    fn hash_directory_depth_invariant(keys in pvec(any::<i32>(), 1..200)) {
        let dir = tempdir().unwrap();
        let mut idx = HashIndex::open(dir.path().join("d.bin"), dir.path().join("b.bin"), false).unwrap();
        for (rn, k) in keys.iter().enumerate() {
            idx.insert(&Value::Int(*k), rn as u32 + 1, &mut no_lookup).unwrap();
        }
        let global = idx.global_depth();
        prop_assert!((1u64 << global) >= 1);
        for local in idx.local_depths().unwrap() {
            prop_assert!(local <= global);
        }
    }

    /// 4. Every AVL node's balance factor stays in {-1, 0, 1}, and an in-order
    /// traversal of its keys is non-decreasing.
    #[test]
    fn avl_balance_and_ordering(keys in pvec(any::<i32>(), 1..200)) {
        let dir = tempdir().unwrap();
        let mut idx = AvlIndex::open(dir.path().join("i.bin"), DataType::Int, false).unwrap();
        for (rn, k) in keys.iter().enumerate() {
            idx.insert(&Value::Int(*k), rn as u32 + 1).unwrap();
        }
        for bf in idx.balance_factors().unwrap() {
            prop_assert!((-1..=1).contains(&bf));
        }
        let ordered = idx.in_order_keys().unwrap();
        let ints: Vec<i32> = ordered.into_iter().map(|v| match v { Value::Int(i) => i, _ => unreachable!() }).collect();
        for pair in ints.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
    }

    /// 5. R-tree RADIUS and KNN results match a brute-force scan of the same
    /// points.
    #[test]
    fn rtree_radius_and_knn_match_brute_force(
        points in pvec((-100.0f64..100.0, -100.0f64..100.0), 1..60),
        cx in -100.0f64..100.0,
        cy in -100.0f64..100.0,
        r in 0.0f64..50.0,
    ) {
        let dir = tempdir().unwrap();
        let mut idx = RTreeIndex::open(dir.path().join("r.json"), false).unwrap();
        let center = Point::new(cx, cy);
        for (i, &(x, y)) in points.iter().enumerate() {
            idx.insert(Point::new(x, y), i as u32 + 1).unwrap();
        }

        let mut expected_radius: Vec<u32> = points
            .iter()
            .enumerate()
            .filter(|(_, &(x, y))| Point::new(x, y).is_in_circle(center, r))
            .map(|(i, _)| i as u32 + 1)
            .collect();
        expected_radius.sort_unstable();
        let mut got_radius = idx.search_radius(center, r);
        got_radius.sort_unstable();
        prop_assert_eq!(got_radius, expected_radius);

        let k = 3.min(points.len());
        let mut by_distance: Vec<(f64, u32)> = points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| (Point::new(x, y).distance_to(center), i as u32 + 1))
            .collect();
        by_distance.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));
        let expected_knn: Vec<u32> = by_distance.into_iter().take(k).map(|(_, rn)| rn).collect();
        let got_knn = idx.search_knn(center, k);
        prop_assert_eq!(got_knn, expected_knn);
    }

    /// 6. Packing then unpacking a record through the store reproduces the
    /// exact values that were inserted, for every supported data type.
    #[test]
    fn pack_unpack_roundtrip(i in any::<i32>(), f in -1.0e9f64..1.0e9, b in any::<bool>(), s in "[a-zA-Z0-9]{0,10}", x in -1.0e6f64..1.0e6, y in -1.0e6f64..1.0e6) {
        let dir = tempdir().unwrap();
        let schema = TableSchema {
            table_name: "t".into(),
            attributes: vec![
                Attribute { name: "a".into(), data_type: DataType::Int, is_key: false, index: None },
                Attribute { name: "b".into(), data_type: DataType::Float, is_key: false, index: None },
                Attribute { name: "c".into(), data_type: DataType::Bool, is_key: false, index: None },
                Attribute { name: "d".into(), data_type: DataType::Varchar(10), is_key: false, index: None },
                Attribute { name: "e".into(), data_type: DataType::Point, is_key: false, index: None },
            ],
            primary_key: None,
        };
        let mut store = RecordStore::open(dir.path().join("t.bin"), &schema).unwrap();
        let n = store
            .insert(&[
                Some(Value::Int(i)),
                Some(Value::Float(f)),
                Some(Value::Bool(b)),
                Some(Value::Str(s.clone())),
                Some(Value::Point(Point::new(x, y))),
            ])
            .unwrap();
        let row = store.get(n).unwrap().unwrap();
        prop_assert_eq!(row[0].clone(), Value::Int(i));
        prop_assert_eq!(row[1].clone(), Value::Float(f));
        prop_assert_eq!(row[2].clone(), Value::Bool(b));
        prop_assert_eq!(row[3].clone(), Value::Str(s));
        prop_assert_eq!(row[4].clone(), Value::Point(Point::new(x, y)));
    }

    /// 7. The free list contains exactly the deleted slots: after deleting a
    /// random subset of inserted records, the free-list chain (as a set)
    /// matches the complement of the active record numbers.
    #[test]
    fn free_list_matches_deleted_slots(
        ids in pvec(any::<i32>(), 2..30),
        delete_mask in pvec(any::<bool>(), 2..30),
    ) {
        let dir = tempdir().unwrap();
        let schema = int_schema();
        let mut store = RecordStore::open(dir.path().join("t.bin"), &schema).unwrap();
        let n = ids.len().min(delete_mask.len());
        let mut numbers = Vec::new();
        for id in ids.iter().take(n) {
            numbers.push(store.insert(&[Some(Value::Int(*id)), Some(Value::Str("x".into()))]).unwrap());
        }

        let mut deleted = HashSet::new();
        for (i, &should_delete) in delete_mask.iter().take(n).enumerate() {
            if should_delete {
                store.delete(numbers[i]).unwrap();
                deleted.insert(numbers[i]);
            }
        }

        let free_set: HashSet<u32> = store.free_list_chain().unwrap().into_iter().collect();
        prop_assert_eq!(free_set, deleted.clone());

        let active_set: HashSet<u32> = store.get_active_record_numbers().unwrap().into_iter().collect();
        let all: HashSet<u32> = numbers.iter().copied().collect();
        let expected_active: HashSet<u32> = all.difference(&deleted).copied().collect();
        prop_assert_eq!(active_set, expected_active);
    }

    /// 8. Primary-key uniqueness: inserting a second row with an already-active
    /// key value is rejected, regardless of which secondary values accompany it.
    #[test]
    fn primary_key_uniqueness(id in any::<i32>(), tag_a in "[a-z]{1,8}", tag_b in "[a-z]{1,8}") {
        let dir = tempdir().unwrap();
        let schema = int_schema();
        let mut manager = TableManager::open(dir.path(), schema).unwrap();
        manager.insert(&[Some(Value::Int(id)), Some(Value::Str(tag_a))]).unwrap();
        let second = manager.insert(&[Some(Value::Int(id)), Some(Value::Str(tag_b))]);
        prop_assert!(second.is_err());
    }
}
