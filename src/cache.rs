// Copyright (c) 2025 - Cowboy AI, Inc.
//! ORM Lookup Cache
//!
//! Memoizes "get exactly one record matching these parameters" lookups for the
//! duration of one synchronization run. Loading a few thousand devices would
//! otherwise resolve the same status, role and location records over and over.
//!
//! # Semantics
//!
//! - Entries are keyed by record type plus the (order-independent) parameter set
//! - A miss performs exactly one backing-store query and stores the result
//! - A hit increments the per-type hit counter and performs no query
//! - Failed lookups (not found, multiple found) are never cached
//! - Nothing is invalidated mid-run except by explicit request
//!
//! The cache is plain mutable state without locking. Create one per run (or
//! pass the same instance to a source and a target adapter explicitly when they
//! must share lookups); never share one between concurrent runs.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::errors::SyncResult;
use crate::store::{BackingStore, Parameters, Record, RecordRef, RecordType};

/// Canonical, hashable form of a parameter set
type CacheKey = Vec<(String, String)>;

fn cache_key(parameters: &Parameters) -> CacheKey {
    parameters
        .iter()
        .map(|(name, value)| (name.clone(), value.to_string()))
        .collect()
}

/// Per-run memo of single-record lookups
#[derive(Debug, Default)]
pub struct OrmCache {
    entries: HashMap<RecordType, HashMap<CacheKey, Record>>,
    hits: HashMap<RecordType, u64>,
}

impl OrmCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the single record matching `parameters`, querying only on a miss
    pub fn get_or_fetch<S>(
        &mut self,
        store: &S,
        record_type: &RecordType,
        parameters: &Parameters,
    ) -> SyncResult<Record>
    where
        S: BackingStore + ?Sized,
    {
        let key = cache_key(parameters);
        if let Some(record) = self
            .entries
            .get(record_type)
            .and_then(|entries| entries.get(&key))
        {
            *self.hits.entry(record_type.clone()).or_insert(0) += 1;
            return Ok(record.clone());
        }

        debug!(
            "Cache miss for {} {}",
            record_type,
            crate::store::describe_parameters(parameters)
        );
        let record = store.get(record_type, parameters)?;
        self.entries
            .entry(record_type.clone())
            .or_default()
            .insert(key, record.clone());
        Ok(record)
    }

    /// Clear every cached entry, optionally resetting the hit counters
    pub fn invalidate(&mut self, zero_out_hits: bool) {
        self.entries.clear();
        if zero_out_hits {
            self.hits.clear();
        }
    }

    /// Number of cache hits recorded for a record type
    pub fn hits(&self, record_type: &RecordType) -> u64 {
        self.hits.get(record_type).copied().unwrap_or(0)
    }

    /// Number of cache hits across every record type
    pub fn total_hits(&self) -> u64 {
        self.hits.values().sum()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace cached copies of a record after it was saved
    ///
    /// Entries keyed by the old field values are dropped, since the saved
    /// record may no longer match them; the record stays reachable by id.
    pub fn refresh(&mut self, record: &Record) {
        self.evict(&record.to_ref());
        let mut by_id = Parameters::new();
        by_id.insert("id".to_string(), Value::String(record.id.to_string()));
        self.entries
            .entry(record.record_type.clone())
            .or_default()
            .insert(cache_key(&by_id), record.clone());
    }

    /// Drop every cached entry pointing at a record
    pub fn evict(&mut self, record: &RecordRef) {
        if let Some(entries) = self.entries.get_mut(&record.record_type) {
            entries.retain(|_, cached| cached.id != record.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldKind, InMemoryStore, RecordSchema};
    use serde_json::json;

    fn status() -> RecordType {
        RecordType::new("extras", "status")
    }

    fn store_with_statuses(names: &[&str]) -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.register_schema(
            RecordSchema::new(status())
                .field_kind("name", FieldKind::required_scalar())
                .field_kind("color", FieldKind::scalar()),
        );
        for name in names {
            store
                .save(Record::new(status()).with_value("name", *name).with_value("color", "green"))
                .unwrap();
        }
        store.reset_reads();
        store
    }

    fn by_name(name: &str) -> Parameters {
        let mut parameters = Parameters::new();
        parameters.insert("name".to_string(), json!(name));
        parameters
    }

    #[test]
    fn test_repeated_lookups_query_once() {
        let store = store_with_statuses(&["Active"]);
        let mut cache = OrmCache::new();

        let first = cache.get_or_fetch(&store, &status(), &by_name("Active")).unwrap();
        let second = cache.get_or_fetch(&store, &status(), &by_name("Active")).unwrap();
        let third = cache.get_or_fetch(&store, &status(), &by_name("Active")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.id, third.id);
        assert_eq!(store.reads(), 1);
        assert_eq!(cache.hits(&status()), 2);
    }

    #[test]
    fn test_failed_lookups_are_not_cached() {
        let mut store = store_with_statuses(&[]);
        let mut cache = OrmCache::new();

        let err = cache
            .get_or_fetch(&store, &status(), &by_name("Active"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(cache.is_empty());

        store
            .save(Record::new(status()).with_value("name", "Active"))
            .unwrap();
        assert!(cache.get_or_fetch(&store, &status(), &by_name("Active")).is_ok());
    }

    #[test]
    fn test_multiple_matches_propagate() {
        let store = store_with_statuses(&["Active", "Planned"]);
        let mut cache = OrmCache::new();
        let mut parameters = Parameters::new();
        parameters.insert("color".to_string(), json!("green"));

        let err = cache.get_or_fetch(&store, &status(), &parameters).unwrap_err();
        assert!(matches!(err, crate::errors::SyncError::MultipleFound { .. }));
    }

    #[test]
    fn test_invalidate_forces_a_new_query() {
        let store = store_with_statuses(&["Active"]);
        let mut cache = OrmCache::new();

        cache.get_or_fetch(&store, &status(), &by_name("Active")).unwrap();
        cache.get_or_fetch(&store, &status(), &by_name("Active")).unwrap();
        cache.invalidate(false);
        assert_eq!(cache.hits(&status()), 1);

        cache.get_or_fetch(&store, &status(), &by_name("Active")).unwrap();
        assert_eq!(store.reads(), 2);

        cache.invalidate(true);
        assert_eq!(cache.total_hits(), 0);
    }

    #[test]
    fn test_refresh_drops_stale_parameter_keys() {
        let mut store = store_with_statuses(&["Active"]);
        let mut cache = OrmCache::new();

        let mut record = cache.get_or_fetch(&store, &status(), &by_name("Active")).unwrap();
        record.values.insert("name".to_string(), json!("Retired"));
        let saved = store.save(record).unwrap();
        cache.refresh(&saved);

        let mut by_id = Parameters::new();
        by_id.insert("id".to_string(), json!(saved.id.to_string()));
        let reads_before = store.reads();
        let cached = cache.get_or_fetch(&store, &status(), &by_id).unwrap();
        assert_eq!(cached.str_value("name"), Some("Retired"));
        assert_eq!(store.reads(), reads_before);

        assert!(cache
            .get_or_fetch(&store, &status(), &by_name("Active"))
            .unwrap_err()
            .is_not_found());
    }
}
