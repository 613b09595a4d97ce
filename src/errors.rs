// Copyright (c) 2025 - Cowboy AI, Inc.

//! Error types for synchronization operations

use thiserror::Error;

use crate::store::{RecordRef, RecordType};

/// Errors that can occur while loading, diffing or applying a synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// A model or attribute is declared inconsistently with its annotations
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No backing record matched a lookup
    #[error("No {record_type} matches {parameters}")]
    NotFound {
        record_type: RecordType,
        parameters: String,
    },

    /// More than one backing record matched a lookup expecting exactly one
    #[error("Multiple {record_type} records match {parameters}")]
    MultipleFound {
        record_type: RecordType,
        parameters: String,
    },

    /// A stored value does not have the type the attribute declares
    #[error("Attribute '{attribute}' expected {expected}, found {found}")]
    TypeMismatch {
        attribute: String,
        expected: String,
        found: String,
    },

    /// Schema or business-rule validation rejected a value or a save
    #[error("Validation failed for {record_type}: {message}")]
    Validation {
        record_type: String,
        message: String,
    },

    /// A one-to-one custom relationship has more than one association
    #[error("Relationship '{label}' has multiple associations for {record}")]
    MultipleAssociations { label: String, record: RecordRef },

    /// A one-to-many custom relationship resolved to more than one object
    #[error("Relationship '{label}' resolved {count} related objects for {record}, expected at most one")]
    Cardinality {
        label: String,
        record: RecordRef,
        count: usize,
    },

    /// The content-type registry has no entry for a generic relation target
    #[error("Unknown content type {app_label}.{model}")]
    UnknownContentType { app_label: String, model: String },

    /// An adapter already holds an object with the same identifiers
    #[error("Object {kind} '{key}' already exists")]
    ObjectAlreadyExists { kind: String, key: String },

    /// An adapter holds no object with the given identifiers
    #[error("Object {kind} '{key}' not found")]
    ObjectNotFound { kind: String, key: String },

    /// A delete was refused because the record is still referenced
    #[error("{record} is still referenced by {referenced_by}")]
    Protected {
        record: RecordRef,
        referenced_by: RecordRef,
    },

    /// A field value could not be resolved to backing records during a write
    #[error("Unable to resolve '{field}' with {parameters}: {source}")]
    FieldResolution {
        field: String,
        parameters: String,
        #[source]
        source: Box<SyncError>,
    },

    /// Creating an object in the backing store failed
    #[error("Failed to create {kind} '{key}': {source}")]
    ObjectNotCreated {
        kind: String,
        key: String,
        #[source]
        source: Box<SyncError>,
    },

    /// Updating an object in the backing store failed
    #[error("Failed to update {kind} '{key}': {source}")]
    ObjectNotUpdated {
        kind: String,
        key: String,
        #[source]
        source: Box<SyncError>,
    },

    /// Deleting an object from the backing store failed
    #[error("Failed to delete {kind} '{key}': {source}")]
    ObjectNotDeleted {
        kind: String,
        key: String,
        #[source]
        source: Box<SyncError>,
    },

    /// A child was skipped because its parent could not be synchronized
    #[error("Skipped because parent {kind} '{key}' failed to synchronize")]
    ParentNotSynced { kind: String, key: String },

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Whether this is a "no matching record" lookup failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }

    /// Whether this error belongs to the create/update/delete family
    pub fn is_crud(&self) -> bool {
        matches!(
            self,
            SyncError::FieldResolution { .. }
                | SyncError::ObjectNotCreated { .. }
                | SyncError::ObjectNotUpdated { .. }
                | SyncError::ObjectNotDeleted { .. }
        )
    }

    /// Walk wrapped CRUD errors down to the original low-level cause
    pub fn root_cause(&self) -> &SyncError {
        match self {
            SyncError::FieldResolution { source, .. }
            | SyncError::ObjectNotCreated { source, .. }
            | SyncError::ObjectNotUpdated { source, .. }
            | SyncError::ObjectNotDeleted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn field_resolution(
        field: impl Into<String>,
        parameters: &crate::store::Parameters,
        source: SyncError,
    ) -> Self {
        SyncError::FieldResolution {
            field: field.into(),
            parameters: crate::store::describe_parameters(parameters),
            source: Box::new(source),
        }
    }
}
