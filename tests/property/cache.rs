// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Cache Idempotence

use proptest::prelude::*;
use serde_json::json;

use cim_ssot::OrmCache;

use crate::fixtures::*;

proptest! {
    /// Only the first lookup reads the store; every later one is a hit
    #[test]
    fn prop_repeated_lookups_read_once(calls in 1usize..25, planned in any::<bool>()) {
        let store = dcim_store();
        let name = if planned { "Planned" } else { "Active" };
        let parameters = params(json!({ "name": name }));

        let mut cache = OrmCache::new();
        let first = cache.get_or_fetch(&store, &status(), &parameters).unwrap();
        for _ in 1..calls {
            let again = cache.get_or_fetch(&store, &status(), &parameters).unwrap();
            prop_assert_eq!(&again, &first);
        }

        prop_assert_eq!(store.reads(), 1);
        prop_assert_eq!(cache.hits(&status()), (calls - 1) as u64);
        prop_assert_eq!(cache.len(), 1);
    }

    /// Misses are never cached, so each one queries again
    #[test]
    fn prop_failed_lookups_always_query(calls in 1usize..10) {
        let store = dcim_store();
        let parameters = params(json!({ "name": "Retired" }));

        let mut cache = OrmCache::new();
        for _ in 0..calls {
            let err = cache.get_or_fetch(&store, &status(), &parameters).unwrap_err();
            prop_assert!(err.is_not_found());
        }

        prop_assert_eq!(store.reads(), calls as u64);
        prop_assert_eq!(cache.total_hits(), 0);
        prop_assert!(cache.is_empty());
    }
}
