//! Integration tests for the open-addressing hash tables
//!
//! Checks `LinearHash` and `LinearMap` against `std` collections as oracles.

use std::collections::{HashMap, HashSet};

use fixpoint_foundation::{ErrorKind, LinearHash, LinearMap, hash_of};
use proptest::prelude::*;

fn add(table: &mut LinearHash<String>, s: &str) -> bool {
    table.add_verbose(hash_of(s), s.to_string(), |a, b| a == b)
}

fn contains(table: &LinearHash<String>, s: &str) -> bool {
    table.contains(hash_of(s), |e| e == s)
}

// =============================================================================
// LinearHash
// =============================================================================

#[test]
fn set_semantics_with_owned_keys() {
    let mut table = LinearHash::new();
    assert!(add(&mut table, "alpha"));
    assert!(!add(&mut table, "alpha"));
    assert!(add(&mut table, "beta"));
    assert_eq!(table.len(), 2);
    assert!(contains(&table, "alpha"));
    assert!(!contains(&table, "gamma"));
}

#[test]
fn table_grows_then_shrinks_back() {
    let mut table = LinearHash::new();
    let initial = table.capacity();
    for i in 0..1_000 {
        add(&mut table, &i.to_string());
    }
    let grown = table.capacity();
    assert!(grown >= 1_000);
    assert!(grown.is_power_of_two());

    for i in 0..990 {
        let key = i.to_string();
        assert!(table.remove(hash_of(key.as_str()), |e| *e == key).is_some());
    }
    assert_eq!(table.len(), 10);
    assert!(table.capacity() < grown);
    assert!(table.capacity() >= initial);
    for i in 990..1_000 {
        assert!(contains(&table, &i.to_string()));
    }
}

#[test]
fn delete_where_reports_count() {
    let mut table = LinearHash::new();
    for i in 0u64..100 {
        table.add_silent(hash_of(&i), i, |a, b| a == b);
    }
    assert_eq!(table.delete_where(|v| v % 2 == 0), 50);
    assert_eq!(table.len(), 50);
    assert!(table.iter().all(|v| v % 2 == 1));
}

#[test]
fn cursor_removal_keeps_remaining_elements() {
    let mut table = LinearHash::new();
    for i in 0u64..64 {
        table.add_silent(hash_of(&i), i, |a, b| a == b);
    }
    {
        let mut cursor = table.cursor();
        while let Some(value) = cursor.next_entry() {
            if *value >= 8 {
                cursor.remove_current();
            }
        }
    }
    let mut left: Vec<u64> = table.iter().copied().collect();
    left.sort_unstable();
    assert_eq!(left, (0..8).collect::<Vec<_>>());
}

#[test]
fn impossible_capacity_is_an_error() {
    let err = LinearHash::<u64>::try_with_capacity(usize::MAX / 2).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::CapacityExceeded { .. }));
}

// =============================================================================
// LinearMap
// =============================================================================

#[test]
fn map_insert_replace_remove() {
    let mut map = LinearMap::new();
    assert_eq!(map.insert("a", 1), None);
    assert_eq!(map.insert("a", 2), Some(1));
    *map.get_or_insert_with("b", || 10) += 1;
    assert_eq!(map.get(&"b"), Some(&11));
    assert_eq!(map.remove(&"a"), Some(2));
    assert!(!map.contains_key(&"a"));
    assert_eq!(map.len(), 1);
}

#[test]
fn map_iter_mut_updates_values() {
    let mut map = LinearMap::new();
    for i in 0..10 {
        map.insert(i, i);
    }
    for (_, v) in map.iter_mut() {
        *v *= 10;
    }
    assert_eq!(map.get(&7), Some(&70));
    assert_eq!(map.values().sum::<i32>(), 450);
}

// =============================================================================
// Oracle Properties
// =============================================================================

#[derive(Clone, Debug)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    Retain(u16),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u16..512, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        3 => (0u16..512).prop_map(Op::Remove),
        1 => (1u16..8).prop_map(Op::Retain),
    ]
}

proptest! {
    #[test]
    fn map_matches_hashmap(ops in prop::collection::vec(op(), 0..600)) {
        let mut map = LinearMap::new();
        let mut oracle = HashMap::new();
        for op in ops {
            match op {
                Op::Insert(k, v) => prop_assert_eq!(map.insert(k, v), oracle.insert(k, v)),
                Op::Remove(k) => prop_assert_eq!(map.remove(&k), oracle.remove(&k)),
                Op::Retain(m) => {
                    let removed = map.delete_where(|k, _| k % m == 0);
                    let before = oracle.len();
                    oracle.retain(|k, _| k % m != 0);
                    prop_assert_eq!(removed, before - oracle.len());
                }
            }
            prop_assert_eq!(map.len(), oracle.len());
        }
        for (k, v) in &oracle {
            prop_assert_eq!(map.get(k), Some(v));
        }
    }

    #[test]
    fn colliding_hashes_match_hashset(keys in prop::collection::vec(0u32..200, 0..300)) {
        // Every element shares a handful of hash codes
        let mut table = LinearHash::new();
        let mut oracle = HashSet::new();
        for k in keys {
            let added = table.add_verbose(u64::from(k % 4), k, |a, b| a == b);
            prop_assert_eq!(added, oracle.insert(k));
        }
        prop_assert_eq!(table.len(), oracle.len());
        for k in &oracle {
            prop_assert!(table.contains(u64::from(k % 4), |e| e == k));
        }
    }
}
