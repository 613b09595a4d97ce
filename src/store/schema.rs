// Copyright (c) 2025 - Cowboy AI, Inc.
//! Record Schemas
//!
//! Describes the native fields of each backing record type. The attribute
//! factory inspects these to decide how an attribute is loaded (a plain column,
//! a foreign key hop, or a to-many collection), and the reference store uses
//! them to validate saves.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::RecordType;

/// Kind of a native field on a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Plain column
    Scalar {
        #[serde(default)]
        required: bool,
    },

    /// Foreign key to one concrete record type
    ForeignKey {
        target: RecordType,
        #[serde(default)]
        required: bool,
    },

    /// Foreign key to any record type (content type + id)
    GenericForeignKey {
        #[serde(default)]
        required: bool,
    },

    /// Many-to-many collection stored on this record
    ManyToMany { target: RecordType },

    /// Reverse side of the `via` foreign key on `target`
    OneToMany { target: RecordType, via: String },
}

impl FieldKind {
    pub fn scalar() -> Self {
        FieldKind::Scalar { required: false }
    }

    pub fn required_scalar() -> Self {
        FieldKind::Scalar { required: true }
    }

    pub fn foreign_key(target: RecordType) -> Self {
        FieldKind::ForeignKey {
            target,
            required: false,
        }
    }

    pub fn required_foreign_key(target: RecordType) -> Self {
        FieldKind::ForeignKey {
            target,
            required: true,
        }
    }

    /// Whether this field yields a collection of related records
    pub fn is_many(&self) -> bool {
        matches!(
            self,
            FieldKind::ManyToMany { .. } | FieldKind::OneToMany { .. }
        )
    }

    /// Whether this field points at exactly zero or one related record
    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            FieldKind::ForeignKey { .. } | FieldKind::GenericForeignKey { .. }
        )
    }

    pub fn is_required(&self) -> bool {
        match self {
            FieldKind::Scalar { required }
            | FieldKind::ForeignKey { required, .. }
            | FieldKind::GenericForeignKey { required } => *required,
            FieldKind::ManyToMany { .. } | FieldKind::OneToMany { .. } => false,
        }
    }
}

/// Native field layout of one record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub record_type: RecordType,

    #[serde(default)]
    pub fields: BTreeMap<String, FieldKind>,

    /// Whether records of this type carry a custom-field store
    #[serde(default)]
    pub custom_fields: bool,

    /// Groups of fields whose combined values must be unique
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
}

impl RecordSchema {
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            fields: BTreeMap::new(),
            custom_fields: false,
            unique_together: Vec::new(),
        }
    }

    pub fn field_kind(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    pub fn with_custom_fields(mut self) -> Self {
        self.custom_fields = true;
        self
    }

    pub fn unique(mut self, fields: &[&str]) -> Self {
        self.unique_together
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldKind> {
        self.fields.get(name)
    }
}

/// Record types every store provides
pub mod builtin {
    use super::*;

    /// Content-type registry entries
    pub fn content_type() -> RecordType {
        RecordType::new("contenttypes", "contenttype")
    }

    /// Custom relationship definitions
    pub fn relationship() -> RecordType {
        RecordType::new("extras", "relationship")
    }

    /// One edge of a custom relationship
    pub fn relationship_association() -> RecordType {
        RecordType::new("extras", "relationshipassociation")
    }

    pub fn content_type_schema() -> RecordSchema {
        RecordSchema::new(content_type())
            .field_kind("app_label", FieldKind::required_scalar())
            .field_kind("model", FieldKind::required_scalar())
            .unique(&["app_label", "model"])
    }

    pub fn relationship_schema() -> RecordSchema {
        RecordSchema::new(relationship())
            .field_kind("label", FieldKind::required_scalar())
            .field_kind("type", FieldKind::required_scalar())
            .field_kind(
                "source_type",
                FieldKind::required_foreign_key(content_type()),
            )
            .field_kind(
                "destination_type",
                FieldKind::required_foreign_key(content_type()),
            )
            .unique(&["label"])
    }

    pub fn relationship_association_schema() -> RecordSchema {
        RecordSchema::new(relationship_association())
            .field_kind(
                "relationship",
                FieldKind::required_foreign_key(relationship()),
            )
            .field_kind(
                "source_type",
                FieldKind::required_foreign_key(content_type()),
            )
            .field_kind("source_id", FieldKind::required_scalar())
            .field_kind(
                "destination_type",
                FieldKind::required_foreign_key(content_type()),
            )
            .field_kind("destination_id", FieldKind::required_scalar())
            .unique(&["relationship", "source_id", "destination_id"])
    }

    pub fn schemas() -> Vec<RecordSchema> {
        vec![
            content_type_schema(),
            relationship_schema(),
            relationship_association_schema(),
        ]
    }
}
