// Copyright (c) 2025 - Cowboy AI, Inc.
//! Attribute Interfaces
//!
//! Every model attribute is bound to exactly one interface that knows how to
//! load its value from a backing record. The interface is chosen once, when a
//! model is registered, from three facts: the attribute's sidecar markers,
//! whether its name is a dotted path, and whether it names a native to-many
//! field. See [`AttributeKind::classify`] for the precedence.

mod custom;
mod native;

pub use custom::{CustomFieldAttribute, CustomForeignKeyAttribute, CustomManyRelationshipAttribute};
pub use native::{ForeignKeyAttribute, ManyRelationshipAttribute, StandardAttribute};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::OrmCache;
use crate::errors::{SyncError, SyncResult};
use crate::model::Annotation;
use crate::store::{BackingStore, FieldKind, Record, RecordSchema, PATH_SEPARATOR};

/// The six ways an attribute can be backed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Standard,
    ForeignKey,
    CustomField,
    CustomForeignKey,
    ManyRelationship,
    CustomManyRelationship,
}

impl AttributeKind {
    /// Pick the interface kind for an attribute
    ///
    /// First match wins: custom-field marker, dotted name with a custom
    /// relationship marker, dotted name, custom relationship marker, native
    /// to-many field, plain column.
    pub fn classify(
        custom_field: bool,
        custom_relationship: bool,
        dotted: bool,
        native_many: bool,
    ) -> Self {
        if custom_field {
            AttributeKind::CustomField
        } else if dotted && custom_relationship {
            AttributeKind::CustomForeignKey
        } else if dotted {
            AttributeKind::ForeignKey
        } else if custom_relationship {
            AttributeKind::CustomManyRelationship
        } else if native_many {
            AttributeKind::ManyRelationship
        } else {
            AttributeKind::Standard
        }
    }
}

/// Loader bound to one model attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInterface {
    Standard(StandardAttribute),
    ForeignKey(ForeignKeyAttribute),
    CustomField(CustomFieldAttribute),
    CustomForeignKey(CustomForeignKeyAttribute),
    ManyRelationship(ManyRelationshipAttribute),
    CustomManyRelationship(CustomManyRelationshipAttribute),
}

impl AttributeInterface {
    /// Build the interface for `name` on records described by `schema`
    pub fn resolve(name: &str, annotation: &Annotation, schema: &RecordSchema) -> SyncResult<Self> {
        let dotted = name.contains(PATH_SEPARATOR);
        let native_many = schema.field(name).map(FieldKind::is_many).unwrap_or(false);
        let kind = AttributeKind::classify(
            annotation.custom_field.is_some(),
            annotation.custom_relationship.is_some(),
            dotted,
            native_many,
        );

        match kind {
            AttributeKind::CustomField => {
                if !schema.custom_fields {
                    return Err(SyncError::Configuration(format!(
                        "'{}' is a custom field but {} has no custom fields",
                        name, schema.record_type
                    )));
                }
                CustomFieldAttribute::new(name, annotation).map(Self::CustomField)
            }
            AttributeKind::CustomForeignKey => {
                CustomForeignKeyAttribute::new(name, annotation).map(Self::CustomForeignKey)
            }
            AttributeKind::ForeignKey => {
                ForeignKeyAttribute::new(name, schema).map(Self::ForeignKey)
            }
            AttributeKind::CustomManyRelationship => {
                CustomManyRelationshipAttribute::new(name, annotation)
                    .map(Self::CustomManyRelationship)
            }
            AttributeKind::ManyRelationship => {
                ManyRelationshipAttribute::new(name, annotation).map(Self::ManyRelationship)
            }
            AttributeKind::Standard => {
                StandardAttribute::new(name, annotation, schema).map(Self::Standard)
            }
        }
    }

    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeInterface::Standard(_) => AttributeKind::Standard,
            AttributeInterface::ForeignKey(_) => AttributeKind::ForeignKey,
            AttributeInterface::CustomField(_) => AttributeKind::CustomField,
            AttributeInterface::CustomForeignKey(_) => AttributeKind::CustomForeignKey,
            AttributeInterface::ManyRelationship(_) => AttributeKind::ManyRelationship,
            AttributeInterface::CustomManyRelationship(_) => AttributeKind::CustomManyRelationship,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AttributeInterface::Standard(a) => &a.name,
            AttributeInterface::ForeignKey(a) => &a.name,
            AttributeInterface::CustomField(a) => &a.name,
            AttributeInterface::CustomForeignKey(a) => &a.name,
            AttributeInterface::ManyRelationship(a) => &a.name,
            AttributeInterface::CustomManyRelationship(a) => &a.name,
        }
    }

    /// Load this attribute's value from a backing record
    pub fn load<S>(&self, store: &S, cache: &mut OrmCache, record: &Record) -> SyncResult<Value>
    where
        S: BackingStore + ?Sized,
    {
        match self {
            AttributeInterface::Standard(a) => a.load(store, record),
            AttributeInterface::ForeignKey(a) => a.load(store, record),
            AttributeInterface::CustomField(a) => Ok(a.load(record)),
            AttributeInterface::CustomForeignKey(a) => a.load(store, cache, record),
            AttributeInterface::ManyRelationship(a) => a.load(store, record),
            AttributeInterface::CustomManyRelationship(a) => a.load(store, cache, record),
        }
    }
}
