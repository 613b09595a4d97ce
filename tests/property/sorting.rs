// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Sort Normalization

use proptest::prelude::*;
use serde_json::{json, Value};
use std::cmp::Ordering;

use cim_ssot::sorting::{compare_values, sort_by_key, sort_relationships};
use cim_ssot::{Adapter, Diff, DiffFlags, SyncObject};

use crate::fixtures::*;

// ============================================================================
// Strategies
// ============================================================================

fn tag_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,8}", 0..12)
}

/// The same names twice, the second copy shuffled
fn names_and_permutation() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    tag_names().prop_flat_map(|names| {
        let shuffled = Just(names.clone()).prop_shuffle();
        (Just(names), shuffled)
    })
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ]
}

fn tag_entries(names: &[String]) -> Vec<Value> {
    names.iter().map(|name| json!({ "name": name })).collect()
}

fn device_adapter(name: &str, tags: &[String]) -> Adapter {
    let mut adapter = Adapter::new(name, vec!["device".to_string()], vec![device_spec(), interface_spec()])
        .expect("Fixture adapter must build");
    let object = SyncObject::from_parameters(
        &device_spec(),
        params(json!({
            "name": "edge01",
            "location__name": "DC1",
            "tags": tag_entries(tags),
        })),
    )
    .expect("Fixture device must build");
    adapter.add(object).expect("Fixture device must be unique");
    adapter
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Two orderings of the same entries sort to identical lists
    #[test]
    fn prop_sorted_permutations_compare_equal((names, shuffled) in names_and_permutation()) {
        let mut left = tag_entries(&names);
        let mut right = tag_entries(&shuffled);
        sort_by_key(&mut left, "name");
        sort_by_key(&mut right, "name");
        prop_assert_eq!(left, right);
    }

    /// Sorting an already sorted list changes nothing
    #[test]
    fn prop_sort_is_idempotent(names in tag_names()) {
        let mut once = tag_entries(&names);
        sort_by_key(&mut once, "name");
        let mut twice = once.clone();
        sort_by_key(&mut twice, "name");
        prop_assert_eq!(once, twice);
    }

    /// The value order is a total order
    #[test]
    fn prop_compare_values_is_antisymmetric(a in scalar(), b in scalar()) {
        prop_assert_eq!(compare_values(&a, &b), compare_values(&b, &a).reverse());
        prop_assert_eq!(compare_values(&a, &a), Ordering::Equal);
    }

    /// Adapters holding the same tags in different orders do not diff
    #[test]
    fn prop_normalized_adapters_do_not_diff((names, shuffled) in names_and_permutation()) {
        let mut source = device_adapter("source", &names);
        let mut target = device_adapter("target", &shuffled);
        sort_relationships(&mut source, &mut target);

        let diff = Diff::compute(&source, &target, DiffFlags::default()).unwrap();
        prop_assert!(!diff.has_diffs());
    }
}
