// Copyright (c) 2025 - Cowboy AI, Inc.
//! Custom Relationships
//!
//! A custom relationship links two record types without a native foreign key
//! column. Each edge is its own association record carrying the relationship,
//! both endpoint content types and both endpoint ids. A model attribute
//! declares which side of the relationship its record occupies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::cache::OrmCache;
use crate::content_type;
use crate::errors::{SyncError, SyncResult};
use crate::store::{builtin, BackingStore, Parameters, Record, RecordId, RecordRef, RecordType};

/// Cardinality of a custom relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    OneToOne,
    OneToMany,
    ManyToMany,
    SymmetricOneToOne,
    SymmetricManyToMany,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::OneToOne => "one-to-one",
            RelationshipKind::OneToMany => "one-to-many",
            RelationshipKind::ManyToMany => "many-to-many",
            RelationshipKind::SymmetricOneToOne => "symmetric-one-to-one",
            RelationshipKind::SymmetricManyToMany => "symmetric-many-to-many",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-to-one" => Ok(RelationshipKind::OneToOne),
            "one-to-many" => Ok(RelationshipKind::OneToMany),
            "many-to-many" => Ok(RelationshipKind::ManyToMany),
            "symmetric-one-to-one" => Ok(RelationshipKind::SymmetricOneToOne),
            "symmetric-many-to-many" => Ok(RelationshipKind::SymmetricManyToMany),
            other => Err(SyncError::Configuration(format!(
                "Unknown relationship type '{}'",
                other
            ))),
        }
    }
}

/// Which end of a relationship a model's record sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipSide {
    Source,
    Destination,
}

impl RelationshipSide {
    /// Association column holding the id of the record on this side
    pub fn id_field(&self) -> &'static str {
        match self {
            RelationshipSide::Source => "source_id",
            RelationshipSide::Destination => "destination_id",
        }
    }

    pub fn peer(&self) -> Self {
        match self {
            RelationshipSide::Source => RelationshipSide::Destination,
            RelationshipSide::Destination => RelationshipSide::Source,
        }
    }
}

/// A relationship definition with both endpoint types resolved
#[derive(Debug, Clone)]
pub struct RelationshipDefinition {
    pub label: String,
    pub kind: RelationshipKind,
    pub record: Record,
    pub source_type: RecordType,
    pub destination_type: RecordType,
}

impl RelationshipDefinition {
    /// Look up a relationship by label through the cache
    pub fn lookup<S>(store: &S, cache: &mut OrmCache, label: &str) -> SyncResult<Self>
    where
        S: BackingStore + ?Sized,
    {
        let mut parameters = Parameters::new();
        parameters.insert("label".to_string(), Value::from(label));
        let record = cache.get_or_fetch(store, &builtin::relationship(), &parameters)?;

        let kind = record
            .str_value("type")
            .ok_or_else(|| {
                SyncError::Configuration(format!("Relationship '{}' has no type", label))
            })?
            .parse()?;
        let source_type = Self::endpoint(store, cache, &record, "source_type")?;
        let destination_type = Self::endpoint(store, cache, &record, "destination_type")?;

        Ok(Self {
            label: label.to_string(),
            kind,
            record,
            source_type,
            destination_type,
        })
    }

    fn endpoint<S>(
        store: &S,
        cache: &mut OrmCache,
        record: &Record,
        field: &str,
    ) -> SyncResult<RecordType>
    where
        S: BackingStore + ?Sized,
    {
        let content_type = record.relations.get(field).ok_or_else(|| {
            SyncError::Configuration(format!("Relationship {} has no {}", record.id, field))
        })?;
        content_type::by_id(store, cache, content_type.id)
    }

    /// Record type sitting on `side`
    pub fn side_type(&self, side: RelationshipSide) -> &RecordType {
        match side {
            RelationshipSide::Source => &self.source_type,
            RelationshipSide::Destination => &self.destination_type,
        }
    }

    /// Record type on the opposite end from `side`
    pub fn peer_type(&self, side: RelationshipSide) -> &RecordType {
        self.side_type(side.peer())
    }

    /// Whether the records on `side` relate to at most one peer
    pub fn is_single_valued(&self, side: RelationshipSide) -> bool {
        self.kind == RelationshipKind::OneToMany && side == RelationshipSide::Destination
    }

    /// Parameters selecting every association of `id` on `side`
    pub fn association_parameters(&self, side: RelationshipSide, id: RecordId) -> Parameters {
        let mut parameters = Parameters::new();
        parameters.insert(
            "relationship".to_string(),
            Value::String(self.record.id.to_string()),
        );
        for field in ["source_type", "destination_type"] {
            if let Some(content_type) = self.record.relations.get(field) {
                parameters.insert(
                    field.to_string(),
                    Value::String(content_type.id.to_string()),
                );
            }
        }
        parameters.insert(side.id_field().to_string(), Value::String(id.to_string()));
        parameters
    }

    /// Build a new association row between `id` on `side` and `peer`
    pub fn new_association(&self, side: RelationshipSide, id: RecordId, peer: RecordId) -> SyncResult<Record> {
        let mut association = Record::new(builtin::relationship_association())
            .with_relation("relationship", &self.record)
            .with_value(side.id_field(), id.to_string())
            .with_value(side.peer().id_field(), peer.to_string());
        for field in ["source_type", "destination_type"] {
            let content_type = self.record.relations.get(field).ok_or_else(|| {
                SyncError::Configuration(format!("Relationship '{}' has no {}", self.label, field))
            })?;
            association
                .relations
                .insert(field.to_string(), content_type.clone());
        }
        Ok(association)
    }

    /// Reference to the record on the far side of an association
    pub fn peer_of(&self, association: &Record, side: RelationshipSide) -> SyncResult<RecordRef> {
        let peer = side.peer();
        let raw = association.str_value(peer.id_field()).ok_or_else(|| {
            SyncError::Configuration(format!(
                "Association {} has no {}",
                association.id,
                peer.id_field()
            ))
        })?;
        let id = Uuid::parse_str(raw).map_err(|e| {
            SyncError::Configuration(format!("Association {} has malformed id: {}", association.id, e))
        })?;
        Ok(RecordRef::new(self.side_type(peer).clone(), id))
    }
}
