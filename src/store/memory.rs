// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-Memory Backing Store
//!
//! A complete [`BackingStore`] kept in process memory. It enforces the same
//! rules a relational source of truth would:
//!
//! - Saves are validated (unknown fields, required fields, foreign-key targets,
//!   unique-together constraints, custom-field support)
//! - Deletes are refused while a foreign key still references the record;
//!   many-to-many memberships and relationship associations are cascaded
//! - [`BackingStore::atomic`] snapshots the tables and restores them on error
//!
//! Every query is counted so callers can verify how many round trips a
//! synchronization performed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::schema::{builtin, FieldKind, RecordSchema};
use super::{BackingStore, Parameters, Record, RecordRef, RecordType, PATH_SEPARATOR};
use crate::errors::{SyncError, SyncResult};
use crate::relationship::RelationshipKind;

/// Serializable image of a store: schemas plus every record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub schemas: Vec<RecordSchema>,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// Reference backing store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    schemas: BTreeMap<RecordType, RecordSchema>,
    tables: BTreeMap<RecordType, Vec<Record>>,
    reads: AtomicU64,
}

impl InMemoryStore {
    /// Create a store holding only the built-in record types
    pub fn new() -> Self {
        let mut store = Self::bare();
        for record_type in builtin::schemas().into_iter().map(|s| s.record_type) {
            store.ensure_content_type(&record_type);
        }
        store
    }

    fn bare() -> Self {
        let mut store = Self::default();
        for schema in builtin::schemas() {
            store.install_schema(schema);
        }
        store
    }

    /// Rebuild a store from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> SyncResult<Self> {
        let mut store = Self::bare();
        for schema in snapshot.schemas {
            store.install_schema(schema);
        }
        for record in snapshot.records {
            let table = store.tables.get_mut(&record.record_type).ok_or_else(|| {
                SyncError::Configuration(format!(
                    "Snapshot record {} has no schema",
                    record.to_ref()
                ))
            })?;
            match table.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => table.push(record),
            }
        }
        let record_types: Vec<RecordType> = store.schemas.keys().cloned().collect();
        for record_type in record_types {
            store.ensure_content_type(&record_type);
        }
        Ok(store)
    }

    /// Export schemas and records
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            schemas: self.schemas.values().cloned().collect(),
            records: self.tables.values().flatten().cloned().collect(),
        }
    }

    /// Register a record type and its content-type entry
    pub fn register_schema(&mut self, schema: RecordSchema) -> Record {
        let record_type = schema.record_type.clone();
        self.install_schema(schema);
        self.ensure_content_type(&record_type)
    }

    fn install_schema(&mut self, schema: RecordSchema) {
        self.tables.entry(schema.record_type.clone()).or_default();
        self.schemas.insert(schema.record_type.clone(), schema);
    }

    fn ensure_content_type(&mut self, record_type: &RecordType) -> Record {
        if let Some(existing) = self.content_type_record(record_type) {
            return existing;
        }
        let record = Record::new(builtin::content_type())
            .with_value("app_label", record_type.app_label.clone())
            .with_value("model", record_type.model.clone());
        self.tables
            .entry(builtin::content_type())
            .or_default()
            .push(record.clone());
        record
    }

    /// Content-type record for a registered type
    pub fn content_type_record(&self, record_type: &RecordType) -> Option<Record> {
        self.tables.get(&builtin::content_type()).and_then(|table| {
            table
                .iter()
                .find(|ct| {
                    ct.str_value("app_label") == Some(record_type.app_label.as_str())
                        && ct.str_value("model") == Some(record_type.model.as_str())
                })
                .cloned()
        })
    }

    /// Define a custom relationship between two registered record types
    pub fn define_relationship(
        &mut self,
        label: &str,
        kind: RelationshipKind,
        source: &RecordType,
        destination: &RecordType,
    ) -> SyncResult<Record> {
        let source_ct = self.require_content_type(source)?;
        let destination_ct = self.require_content_type(destination)?;
        let relationship = Record::new(builtin::relationship())
            .with_value("label", label)
            .with_value("type", kind.as_str())
            .with_relation("source_type", &source_ct)
            .with_relation("destination_type", &destination_ct);
        self.save(relationship)
    }

    /// Associate two records through a custom relationship
    pub fn associate(
        &mut self,
        label: &str,
        source: &Record,
        destination: &Record,
    ) -> SyncResult<Record> {
        let mut parameters = Parameters::new();
        parameters.insert("label".to_string(), Value::from(label));
        let relationship = self.get(&builtin::relationship(), &parameters)?;
        let source_ct = self.require_content_type(&source.record_type)?;
        let destination_ct = self.require_content_type(&destination.record_type)?;
        let association = Record::new(builtin::relationship_association())
            .with_relation("relationship", &relationship)
            .with_relation("source_type", &source_ct)
            .with_value("source_id", source.id.to_string())
            .with_relation("destination_type", &destination_ct)
            .with_value("destination_id", destination.id.to_string());
        self.save(association)
    }

    fn require_content_type(&self, record_type: &RecordType) -> SyncResult<Record> {
        self.content_type_record(record_type)
            .ok_or_else(|| SyncError::UnknownContentType {
                app_label: record_type.app_label.clone(),
                model: record_type.model.clone(),
            })
    }

    /// Number of queries served so far
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Reset the query counter
    pub fn reset_reads(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    /// Number of stored records of a type
    pub fn count(&self, record_type: &RecordType) -> usize {
        self.tables.get(record_type).map(Vec::len).unwrap_or(0)
    }

    fn table(&self, record_type: &RecordType) -> SyncResult<&Vec<Record>> {
        self.tables.get(record_type).ok_or_else(|| {
            SyncError::Configuration(format!("Unknown record type {}", record_type))
        })
    }

    fn find(&self, record: &RecordRef) -> Option<&Record> {
        self.tables
            .get(&record.record_type)
            .and_then(|table| table.iter().find(|r| r.id == record.id))
    }

    /// Resolve a (possibly dotted) lookup path against a record
    fn resolve<'a>(&'a self, record: &'a Record, path: &str) -> SyncResult<Value> {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let mut current = record;

        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();
            if *segment == "id" && last {
                return Ok(Value::String(current.id.to_string()));
            }

            let schema = self.schema(&current.record_type)?;
            match schema.field(segment) {
                Some(FieldKind::Scalar { .. }) if last => return Ok(current.value(segment)),
                Some(kind) if kind.is_relation() => match current.relations.get(*segment) {
                    None => return Ok(Value::Null),
                    Some(target) if last => return Ok(Value::String(target.id.to_string())),
                    Some(target) => {
                        current = self.find(target).ok_or_else(|| SyncError::NotFound {
                            record_type: target.record_type.clone(),
                            parameters: format!("{{id={}}}", target.id),
                        })?;
                    }
                },
                _ => {
                    return Err(SyncError::Configuration(format!(
                        "Cannot look up '{}' on {}",
                        path, record.record_type
                    )))
                }
            }
        }

        Ok(Value::Null)
    }

    fn matches(&self, record: &Record, parameters: &Parameters) -> SyncResult<bool> {
        for (path, expected) in parameters {
            if self.resolve(record, path)? != *expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn validate(&self, record: &Record) -> SyncResult<()> {
        let schema = self.schema(&record.record_type)?;
        let invalid = |message: String| SyncError::Validation {
            record_type: record.record_type.to_string(),
            message,
        };

        for field in record.values.keys() {
            if !matches!(schema.field(field), Some(FieldKind::Scalar { .. })) {
                return Err(invalid(format!("unknown field '{}'", field)));
            }
        }

        for (field, target) in &record.relations {
            match schema.field(field) {
                Some(FieldKind::ForeignKey { target: expected, .. })
                    if *expected != target.record_type =>
                {
                    return Err(invalid(format!(
                        "'{}' must reference {}, got {}",
                        field, expected, target.record_type
                    )));
                }
                Some(kind) if kind.is_relation() => {}
                _ => return Err(invalid(format!("unknown foreign key '{}'", field))),
            }
            if self.find(target).is_none() {
                return Err(invalid(format!("'{}' references missing {}", field, target)));
            }
        }

        for (field, targets) in &record.many {
            let Some(FieldKind::ManyToMany { target: expected }) = schema.field(field) else {
                return Err(invalid(format!("unknown many-to-many field '{}'", field)));
            };
            for target in targets {
                if target.record_type != *expected || self.find(target).is_none() {
                    return Err(invalid(format!("'{}' references missing {}", field, target)));
                }
            }
        }

        for (field, kind) in &schema.fields {
            let missing = match kind {
                FieldKind::Scalar { required: true } => record.value(field).is_null(),
                FieldKind::ForeignKey { required: true, .. }
                | FieldKind::GenericForeignKey { required: true } => {
                    !record.relations.contains_key(field)
                }
                _ => false,
            };
            if missing {
                return Err(invalid(format!("'{}' is required", field)));
            }
        }

        if record.custom_field_data.is_some() && !schema.custom_fields {
            return Err(invalid("record type does not support custom fields".to_string()));
        }

        for group in &schema.unique_together {
            let mut key = Parameters::new();
            for field in group {
                key.insert(field.clone(), self.resolve(record, field)?);
            }
            if key.values().any(Value::is_null) {
                continue;
            }
            for other in self.table(&record.record_type)? {
                if other.id != record.id && self.matches(other, &key)? {
                    return Err(invalid(format!(
                        "a record with {} already exists",
                        super::describe_parameters(&key)
                    )));
                }
            }
        }

        Ok(())
    }

    fn referenced_by(&self, record: &RecordRef) -> Option<RecordRef> {
        self.tables
            .values()
            .flatten()
            .find(|other| other.relations.values().any(|target| target == record))
            .map(Record::to_ref)
    }
}

impl BackingStore for InMemoryStore {
    fn schema(&self, record_type: &RecordType) -> SyncResult<&RecordSchema> {
        self.schemas.get(record_type).ok_or_else(|| {
            SyncError::Configuration(format!("Unknown record type {}", record_type))
        })
    }

    fn all(&self, record_type: &RecordType) -> SyncResult<Vec<Record>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.table(record_type)?.clone())
    }

    fn filter(&self, record_type: &RecordType, parameters: &Parameters) -> SyncResult<Vec<Record>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut matched = Vec::new();
        for record in self.table(record_type)? {
            if self.matches(record, parameters)? {
                matched.push(record.clone());
            }
        }
        Ok(matched)
    }

    fn save(&mut self, mut record: Record) -> SyncResult<Record> {
        self.validate(&record)?;
        if self.schema(&record.record_type)?.custom_fields && record.custom_field_data.is_none() {
            record.custom_field_data = Some(Map::new());
        }

        let table = self.tables.entry(record.record_type.clone()).or_default();
        match table.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => table.push(record.clone()),
        }
        debug!("Saved {}", record.to_ref());
        Ok(record)
    }

    fn set_many(&mut self, record: &RecordRef, field: &str, related: &[RecordRef]) -> SyncResult<()> {
        if self.find(record).is_none() {
            return Err(SyncError::NotFound {
                record_type: record.record_type.clone(),
                parameters: format!("{{id={}}}", record.id),
            });
        }
        for target in related {
            if self.find(target).is_none() {
                return Err(SyncError::Validation {
                    record_type: record.record_type.to_string(),
                    message: format!("'{}' references missing {}", field, target),
                });
            }
        }

        match self.schema(&record.record_type)?.field(field).cloned() {
            Some(FieldKind::ManyToMany { target }) => {
                if let Some(wrong) = related.iter().find(|r| r.record_type != target) {
                    return Err(SyncError::Validation {
                        record_type: record.record_type.to_string(),
                        message: format!("'{}' must reference {}, got {}", field, target, wrong),
                    });
                }
                if let Some(owner) = self
                    .tables
                    .get_mut(&record.record_type)
                    .and_then(|table| table.iter_mut().find(|r| r.id == record.id))
                {
                    owner.many.insert(field.to_string(), related.to_vec());
                }
                Ok(())
            }
            Some(FieldKind::OneToMany { target, via }) => {
                let via_required = self
                    .schema(&target)?
                    .field(&via)
                    .map(FieldKind::is_required)
                    .unwrap_or(false);
                let table = self.tables.entry(target.clone()).or_default();
                for candidate in table.iter_mut() {
                    let declared = related.iter().any(|r| r.id == candidate.id);
                    let points_here = candidate.relations.get(&via) == Some(record);
                    if declared {
                        candidate.relations.insert(via.clone(), record.clone());
                    } else if points_here {
                        if via_required {
                            return Err(SyncError::Validation {
                                record_type: target.to_string(),
                                message: format!("'{}' is required", via),
                            });
                        }
                        candidate.relations.remove(&via);
                    }
                }
                Ok(())
            }
            _ => Err(SyncError::Configuration(format!(
                "{} has no to-many field '{}'",
                record.record_type, field
            ))),
        }
    }

    fn delete(&mut self, record: &RecordRef) -> SyncResult<()> {
        if self.find(record).is_none() {
            return Err(SyncError::NotFound {
                record_type: record.record_type.clone(),
                parameters: format!("{{id={}}}", record.id),
            });
        }
        if let Some(referenced_by) = self.referenced_by(record) {
            return Err(SyncError::Protected {
                record: record.clone(),
                referenced_by,
            });
        }

        let id = Value::String(record.id.to_string());
        if let Some(associations) = self.tables.get_mut(&builtin::relationship_association()) {
            associations.retain(|a| a.value("source_id") != id && a.value("destination_id") != id);
        }
        for other in self.tables.values_mut().flatten() {
            for members in other.many.values_mut() {
                members.retain(|member| member != record);
            }
        }
        if let Some(table) = self.tables.get_mut(&record.record_type) {
            table.retain(|r| r.id != record.id);
        }
        debug!("Deleted {}", record);
        Ok(())
    }

    fn atomic<T, F>(&mut self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&mut Self) -> SyncResult<T>,
    {
        let checkpoint = self.tables.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                debug!("Rolling back transaction: {}", err);
                self.tables = checkpoint;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status() -> RecordType {
        RecordType::new("extras", "status")
    }

    fn device() -> RecordType {
        RecordType::new("dcim", "device")
    }

    fn interface() -> RecordType {
        RecordType::new("dcim", "interface")
    }

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.register_schema(
            RecordSchema::new(status())
                .field_kind("name", FieldKind::required_scalar())
                .unique(&["name"]),
        );
        store.register_schema(
            RecordSchema::new(device())
                .field_kind("name", FieldKind::required_scalar())
                .field_kind("status", FieldKind::required_foreign_key(status()))
                .field_kind(
                    "interfaces",
                    FieldKind::OneToMany {
                        target: interface(),
                        via: "device".to_string(),
                    },
                ),
        );
        store.register_schema(
            RecordSchema::new(interface())
                .field_kind("name", FieldKind::required_scalar())
                .field_kind("device", FieldKind::foreign_key(device())),
        );
        store
    }

    fn params(pairs: &[(&str, Value)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_save_rejects_missing_required_field() {
        let mut store = store();
        let err = store.save(Record::new(status())).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }

    #[test]
    fn test_save_rejects_duplicate_unique_value() {
        let mut store = store();
        store
            .save(Record::new(status()).with_value("name", "Active"))
            .unwrap();
        let err = store
            .save(Record::new(status()).with_value("name", "Active"))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_filter_traverses_foreign_keys() {
        let mut store = store();
        let active = store
            .save(Record::new(status()).with_value("name", "Active"))
            .unwrap();
        store
            .save(
                Record::new(device())
                    .with_value("name", "edge01")
                    .with_relation("status", &active),
            )
            .unwrap();

        let found = store
            .get(&device(), &params(&[("status__name", json!("Active"))]))
            .unwrap();
        assert_eq!(found.str_value("name"), Some("edge01"));

        let missing = store.get(&device(), &params(&[("status__name", json!("Planned"))]));
        assert!(missing.unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_reports_multiple_matches() {
        let mut store = store();
        let active = store
            .save(Record::new(status()).with_value("name", "Active"))
            .unwrap();
        for name in ["edge01", "edge02"] {
            store
                .save(
                    Record::new(device())
                        .with_value("name", name)
                        .with_relation("status", &active),
                )
                .unwrap();
        }

        let err = store
            .get(&device(), &params(&[("status__name", json!("Active"))]))
            .unwrap_err();
        assert!(matches!(err, SyncError::MultipleFound { .. }));
    }

    #[test]
    fn test_delete_is_refused_while_referenced() {
        let mut store = store();
        let active = store
            .save(Record::new(status()).with_value("name", "Active"))
            .unwrap();
        store
            .save(
                Record::new(device())
                    .with_value("name", "edge01")
                    .with_relation("status", &active),
            )
            .unwrap();

        let err = store.delete(&active.to_ref()).unwrap_err();
        assert!(matches!(err, SyncError::Protected { .. }));
        assert_eq!(store.count(&status()), 1);
    }

    #[test]
    fn test_atomic_rolls_back_on_error() {
        let mut store = store();
        let result: SyncResult<()> = store.atomic(|store| {
            store.save(Record::new(status()).with_value("name", "Active"))?;
            store.save(Record::new(status()))?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(store.count(&status()), 0);
    }

    #[test]
    fn test_set_many_rewrites_one_to_many_reverse_keys() {
        let mut store = store();
        let active = store
            .save(Record::new(status()).with_value("name", "Active"))
            .unwrap();
        let edge = store
            .save(
                Record::new(device())
                    .with_value("name", "edge01")
                    .with_relation("status", &active),
            )
            .unwrap();
        let eth0 = store
            .save(
                Record::new(interface())
                    .with_value("name", "eth0")
                    .with_relation("device", &edge),
            )
            .unwrap();
        let eth1 = store
            .save(Record::new(interface()).with_value("name", "eth1"))
            .unwrap();

        store
            .set_many(&edge.to_ref(), "interfaces", &[eth1.to_ref()])
            .unwrap();

        let names: Vec<String> = store
            .related(&edge, "interfaces")
            .unwrap()
            .iter()
            .filter_map(|r| r.str_value("name").map(str::to_string))
            .collect();
        assert_eq!(names, vec!["eth1".to_string()]);
        assert!(store
            .get_by_ref(&eth0.to_ref())
            .unwrap()
            .relations
            .get("device")
            .is_none());
    }

    #[test]
    fn test_snapshot_round_trip_keeps_content_types_unique() {
        let mut store = store();
        store
            .save(Record::new(status()).with_value("name", "Active"))
            .unwrap();

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let restored = InMemoryStore::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(restored.count(&status()), 1);
        assert_eq!(
            restored.count(&builtin::content_type()),
            store.count(&builtin::content_type())
        );
    }
}
