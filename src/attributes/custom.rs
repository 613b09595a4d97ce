// Copyright (c) 2025 - Cowboy AI, Inc.
//! Attributes backed by custom fields and custom relationships

use serde_json::Value;

use super::native::{reduce, split_path, walk_path};
use crate::cache::OrmCache;
use crate::errors::{SyncError, SyncResult};
use crate::model::{Annotation, CustomRelationshipMarker, Shape};
use crate::relationship::{RelationshipDefinition, RelationshipSide};
use crate::store::{builtin, BackingStore, Record};

fn relationship_marker<'a>(name: &str, annotation: &'a Annotation) -> SyncResult<&'a CustomRelationshipMarker> {
    let marker = annotation.custom_relationship.as_ref().ok_or_else(|| {
        SyncError::Configuration(format!("'{}' has no custom relationship marker", name))
    })?;
    if marker.label.is_empty() {
        return Err(SyncError::Configuration(format!(
            "'{}' has an empty relationship label",
            name
        )));
    }
    Ok(marker)
}

/// Value kept in the record's custom-field store under `key`
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFieldAttribute {
    pub name: String,
    pub key: String,
}

impl CustomFieldAttribute {
    pub fn new(name: &str, annotation: &Annotation) -> SyncResult<Self> {
        let key = annotation
            .custom_field
            .as_ref()
            .map(|marker| marker.key.clone())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                SyncError::Configuration(format!("Custom field '{}' has no key", name))
            })?;
        Ok(Self {
            name: name.to_string(),
            key,
        })
    }

    pub fn load(&self, record: &Record) -> Value {
        record
            .custom_field_data
            .as_ref()
            .and_then(|data| data.get(&self.key))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// One peer reached through a custom relationship association
#[derive(Debug, Clone, PartialEq)]
pub struct CustomForeignKeyAttribute {
    pub name: String,
    pub label: String,
    pub side: RelationshipSide,
    /// Path walked from the peer record
    pub remaining: Vec<String>,
}

impl CustomForeignKeyAttribute {
    pub fn new(name: &str, annotation: &Annotation) -> SyncResult<Self> {
        let marker = relationship_marker(name, annotation)?;
        let segments = split_path(name);
        if segments.len() < 2 || segments.iter().any(String::is_empty) {
            return Err(SyncError::Configuration(format!(
                "'{}' is not a dotted relationship path",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            label: marker.label.clone(),
            side: marker.side,
            remaining: segments[1..].to_vec(),
        })
    }

    pub fn load<S>(&self, store: &S, cache: &mut OrmCache, record: &Record) -> SyncResult<Value>
    where
        S: BackingStore + ?Sized,
    {
        let definition = RelationshipDefinition::lookup(store, cache, &self.label)?;
        let parameters = definition.association_parameters(self.side, record.id);

        let association = match cache.get_or_fetch(store, &builtin::relationship_association(), &parameters) {
            Ok(association) => association,
            Err(SyncError::NotFound { .. }) => return Ok(Value::Null),
            Err(SyncError::MultipleFound { .. }) => {
                return Err(SyncError::MultipleAssociations {
                    label: self.label.clone(),
                    record: record.to_ref(),
                })
            }
            Err(err) => return Err(err),
        };

        let peer = store.get_by_ref(&definition.peer_of(&association, self.side)?)?;
        walk_path(store, &peer, &self.remaining)
    }
}

/// Every peer reached through a custom relationship, reduced to a shape
#[derive(Debug, Clone, PartialEq)]
pub struct CustomManyRelationshipAttribute {
    pub name: String,
    pub label: String,
    pub side: RelationshipSide,
    pub shape: Shape,
}

impl CustomManyRelationshipAttribute {
    pub fn new(name: &str, annotation: &Annotation) -> SyncResult<Self> {
        let marker = relationship_marker(name, annotation)?;
        let shape = annotation.ty.shape().cloned().ok_or_else(|| {
            SyncError::Configuration(format!(
                "Relationship attribute '{}' must be annotated with a shape or a list of shapes",
                name
            ))
        })?;
        Ok(Self {
            name: name.to_string(),
            label: marker.label.clone(),
            side: marker.side,
            shape,
        })
    }

    pub fn load<S>(&self, store: &S, cache: &mut OrmCache, record: &Record) -> SyncResult<Value>
    where
        S: BackingStore + ?Sized,
    {
        let definition = RelationshipDefinition::lookup(store, cache, &self.label)?;
        let parameters = definition.association_parameters(self.side, record.id);

        let mut related = Vec::new();
        for association in store.filter(&builtin::relationship_association(), &parameters)? {
            let peer = store.get_by_ref(&definition.peer_of(&association, self.side)?)?;
            if let Some(entry) = reduce(store, &self.shape, &peer)? {
                related.push(entry);
            }
        }

        if !definition.is_single_valued(self.side) {
            return Ok(Value::Array(related));
        }
        match related.len() {
            0 => Ok(Value::Null),
            1 => Ok(related.remove(0)),
            count => Err(SyncError::Cardinality {
                label: self.label.clone(),
                record: record.to_ref(),
                count,
            }),
        }
    }
}
