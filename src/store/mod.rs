// Copyright (c) 2025 - Cowboy AI, Inc.

//! Backing Store Contract
//!
//! The synchronization core never talks to a database directly. It consumes
//! the [`BackingStore`] trait, which any relational source of truth (NetBox,
//! Nautobot, a CMDB) can implement:
//!
//! - **Record access**: fetch all records of a type, filter by a parameter set,
//!   and get exactly one record (with distinct not-found / multiple-found errors)
//! - **Validated save**: schema and business-rule validation before persisting
//! - **Custom fields**: an optional per-record map independent of native columns
//! - **Content types**: `(app_label, model)` names every record type, so generic
//!   relations can be resolved in both directions
//!
//! Parameter keys may be dotted paths (`location__name`) that traverse foreign
//! keys, the same lookup convention the models use for their attributes.
//!
//! [`InMemoryStore`] is the reference implementation used by the tests and the
//! `ssot-sync` runner.

pub mod memory;
pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{SyncError, SyncResult};

pub use memory::{InMemoryStore, StoreSnapshot};
pub use schema::{builtin, FieldKind, RecordSchema};

/// Separator between segments of a lookup path (`device__location__name`)
pub const PATH_SEPARATOR: &str = "__";

/// Backing-store assigned primary key
pub type RecordId = Uuid;

/// Lookup parameters: field name (or dotted path) to expected value
pub type Parameters = BTreeMap<String, Value>;

/// Render parameters for error messages and logs
pub fn describe_parameters(parameters: &Parameters) -> String {
    let pairs: Vec<String> = parameters
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}

/// Content type of a record: `(app_label, model)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordType {
    pub app_label: String,
    pub model: String,
}

impl RecordType {
    /// Create a record type from its app label and model name
    pub fn new(app_label: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model)
    }
}

impl FromStr for RecordType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((app_label, model)) if !app_label.is_empty() && !model.is_empty() => {
                Ok(Self::new(app_label, model))
            }
            _ => Err(SyncError::Configuration(format!(
                "Record type '{}' must be written as app_label.model",
                s
            ))),
        }
    }
}

impl TryFrom<String> for RecordType {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.to_string()
    }
}

/// Typed pointer to a backing record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub id: RecordId,
}

impl RecordRef {
    pub fn new(record_type: RecordType, id: RecordId) -> Self {
        Self { record_type, id }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_type, self.id)
    }
}

/// One row of the backing store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,

    #[serde(rename = "type")]
    pub record_type: RecordType,

    /// Native scalar columns
    #[serde(default)]
    pub values: BTreeMap<String, Value>,

    /// Foreign keys (absent means null)
    #[serde(default)]
    pub relations: BTreeMap<String, RecordRef>,

    /// Native many-to-many collections
    #[serde(default)]
    pub many: BTreeMap<String, Vec<RecordRef>>,

    /// Dynamic custom-field store, `None` when the type has no custom fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_field_data: Option<Map<String, Value>>,
}

impl Record {
    /// Create an empty, unsaved record with a fresh primary key
    pub fn new(record_type: RecordType) -> Self {
        Self {
            id: Uuid::now_v7(),
            record_type,
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
            many: BTreeMap::new(),
            custom_field_data: None,
        }
    }

    /// Builder-style scalar assignment
    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Builder-style foreign key assignment
    pub fn with_relation(mut self, field: impl Into<String>, target: &Record) -> Self {
        self.relations.insert(field.into(), target.to_ref());
        self
    }

    /// Builder-style many-to-many assignment
    pub fn with_many(mut self, field: impl Into<String>, targets: &[&Record]) -> Self {
        self.many
            .insert(field.into(), targets.iter().map(|r| r.to_ref()).collect());
        self
    }

    /// Builder-style custom field assignment
    pub fn with_custom_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_field_data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn to_ref(&self) -> RecordRef {
        RecordRef::new(self.record_type.clone(), self.id)
    }

    /// Scalar value of a field, `Null` when unset
    pub fn value(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Scalar value of a field as a string slice
    pub fn str_value(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }
}

/// Capability contract the synchronization core consumes from its host
///
/// Read methods take `&self`; writes take `&mut self`. Implementations are
/// not expected to be shared across concurrent synchronization runs.
pub trait BackingStore {
    /// Schema of a record type
    fn schema(&self, record_type: &RecordType) -> SyncResult<&RecordSchema>;

    /// Every record of a type, in storage order
    fn all(&self, record_type: &RecordType) -> SyncResult<Vec<Record>>;

    /// Records of a type matching every parameter
    fn filter(&self, record_type: &RecordType, parameters: &Parameters) -> SyncResult<Vec<Record>>;

    /// Exactly one record matching the parameters
    fn get(&self, record_type: &RecordType, parameters: &Parameters) -> SyncResult<Record> {
        let mut matches = self.filter(record_type, parameters)?;
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(SyncError::NotFound {
                record_type: record_type.clone(),
                parameters: describe_parameters(parameters),
            }),
            _ => Err(SyncError::MultipleFound {
                record_type: record_type.clone(),
                parameters: describe_parameters(parameters),
            }),
        }
    }

    /// Fetch a record by typed reference
    fn get_by_ref(&self, record: &RecordRef) -> SyncResult<Record> {
        let mut parameters = Parameters::new();
        parameters.insert("id".to_string(), Value::String(record.id.to_string()));
        self.get(&record.record_type, &parameters)
    }

    /// Records reachable through a native to-many field of `record`
    fn related(&self, record: &Record, field: &str) -> SyncResult<Vec<Record>> {
        match self.schema(&record.record_type)?.field(field) {
            Some(FieldKind::ManyToMany { .. }) => record
                .many
                .get(field)
                .map(|refs| {
                    refs.iter()
                        .map(|r| self.get_by_ref(r))
                        .collect::<SyncResult<Vec<_>>>()
                })
                .unwrap_or_else(|| Ok(Vec::new())),
            Some(FieldKind::OneToMany { target, via }) => {
                let mut parameters = Parameters::new();
                parameters.insert(via.clone(), Value::String(record.id.to_string()));
                self.filter(target, &parameters)
            }
            _ => Err(SyncError::Configuration(format!(
                "{} has no to-many field '{}'",
                record.record_type, field
            ))),
        }
    }

    /// Reverse content-type lookup: the `(app_label, model)` of a record
    fn content_type_of(&self, record: &Record) -> RecordType {
        record.record_type.clone()
    }

    /// Validate and persist a record (insert or replace by id)
    fn save(&mut self, record: Record) -> SyncResult<Record>;

    /// Replace the members of a native to-many collection
    fn set_many(&mut self, record: &RecordRef, field: &str, related: &[RecordRef]) -> SyncResult<()>;

    /// Delete a record, refusing with [`SyncError::Protected`] if still referenced
    fn delete(&mut self, record: &RecordRef) -> SyncResult<()>;

    /// Run `f` as one transaction, rolling back every write if it fails
    fn atomic<T, F>(&mut self, f: F) -> SyncResult<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> SyncResult<T>;
}
