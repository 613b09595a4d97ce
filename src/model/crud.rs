// Copyright (c) 2025 - Cowboy AI, Inc.
//! Writing objects back to the backing store
//!
//! Create and update share one write path. Every parameter is classified
//! into a bucket first; native foreign keys are resolved before the record
//! is saved, custom relationship associations and native to-many collections
//! after, since they reference the saved record's id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::registry::SyncModel;
use super::CustomRelationshipMarker;
use crate::cache::OrmCache;
use crate::content_type;
use crate::errors::{SyncError, SyncResult};
use crate::relationship::RelationshipDefinition;
use crate::store::{
    builtin, describe_parameters, BackingStore, FieldKind, Parameters, Record, RecordId, RecordRef,
    RecordType, PATH_SEPARATOR,
};

/// A custom relationship whose peer did not exist yet when its record was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredRelationship {
    pub kind: String,
    pub key: String,
    pub record: RecordRef,
    /// The original attribute values for this relationship
    pub parameters: Parameters,
}

/// Outcome of a successful create or update
#[derive(Debug, Clone)]
pub struct Applied {
    pub record: Record,
    pub deferred: Vec<DeferredRelationship>,
}

struct ForeignKeyBucket {
    /// `None` for generic foreign keys, resolved from `app_label`/`model`
    related: Option<RecordType>,
    parameters: Parameters,
}

struct CustomForeignKeyBucket {
    marker: CustomRelationshipMarker,
    parameters: Parameters,
    /// Attribute values that filled this bucket
    source: Parameters,
}

struct CustomToMany {
    field: String,
    marker: CustomRelationshipMarker,
    targets: Vec<RecordRef>,
}

#[derive(Default)]
struct WritePlan {
    foreign_keys: BTreeMap<String, ForeignKeyBucket>,
    custom_foreign_keys: BTreeMap<String, CustomForeignKeyBucket>,
    custom_to_many: Vec<CustomToMany>,
    many: Vec<(String, Vec<RecordRef>)>,
    unresolved: Vec<Parameters>,
}

fn entry_parameters(field: &str, entry: &Value) -> SyncResult<Parameters> {
    match entry {
        Value::Object(map) => Ok(map.clone().into_iter().collect()),
        other => Err(SyncError::Validation {
            record_type: field.to_string(),
            message: format!("expected an object of lookup parameters, got {}", other),
        }),
    }
}

fn entries<'a>(field: &str, value: &'a Value) -> SyncResult<&'a [Value]> {
    match value {
        Value::Array(entries) => Ok(entries),
        Value::Null => Ok(&[][..]),
        other => Err(SyncError::Validation {
            record_type: field.to_string(),
            message: format!("expected a list, got {}", other),
        }),
    }
}

fn id_parameters(id: RecordId) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert("id".to_string(), Value::String(id.to_string()));
    parameters
}

impl SyncModel {
    /// Create a new backing record from merged identifiers and attributes
    pub fn create<S>(
        &self,
        store: &mut S,
        cache: &mut OrmCache,
        parameters: Parameters,
        defer_unresolved: bool,
    ) -> SyncResult<Applied>
    where
        S: BackingStore,
    {
        let key = self.key_of(&parameters);
        let record = Record::new(self.spec().record_type.clone());
        self.write(store, cache, record, parameters, &key, defer_unresolved)
            .map_err(|source| SyncError::ObjectNotCreated {
                kind: self.kind().to_string(),
                key,
                source: Box::new(source),
            })
    }

    /// Apply changed attributes to the record with primary key `pk`
    pub fn update<S>(
        &self,
        store: &mut S,
        cache: &mut OrmCache,
        pk: RecordId,
        key: &str,
        attributes: Parameters,
        defer_unresolved: bool,
    ) -> SyncResult<Applied>
    where
        S: BackingStore,
    {
        cache
            .get_or_fetch(&*store, &self.spec().record_type, &id_parameters(pk))
            .and_then(|record| self.write(store, cache, record, attributes, key, defer_unresolved))
            .map_err(|source| SyncError::ObjectNotUpdated {
                kind: self.kind().to_string(),
                key: key.to_string(),
                source: Box::new(source),
            })
    }

    /// Delete the record with primary key `pk`
    pub fn delete<S>(&self, store: &mut S, cache: &mut OrmCache, pk: RecordId, key: &str) -> SyncResult<()>
    where
        S: BackingStore,
    {
        cache
            .get_or_fetch(&*store, &self.spec().record_type, &id_parameters(pk))
            .and_then(|record| {
                let target = record.to_ref();
                store.delete(&target)?;
                cache.evict(&target);
                debug!("Deleted {}", target);
                Ok(())
            })
            .map_err(|source| SyncError::ObjectNotDeleted {
                kind: self.kind().to_string(),
                key: key.to_string(),
                source: Box::new(source),
            })
    }

    /// Retry a relationship assignment that could not be resolved earlier
    pub fn assign_deferred<S>(
        &self,
        store: &mut S,
        cache: &mut OrmCache,
        deferred: &DeferredRelationship,
    ) -> SyncResult<()>
    where
        S: BackingStore,
    {
        let record = store.get_by_ref(&deferred.record)?;
        let mut scratch = record.clone();
        let mut plan = WritePlan::default();
        for (field, value) in deferred.parameters.clone() {
            self.classify(&*store, cache, &mut scratch, &mut plan, field, value, false)?;
        }
        self.assign_relationships(store, cache, &record, &mut plan, false)
    }

    fn write<S>(
        &self,
        store: &mut S,
        cache: &mut OrmCache,
        mut record: Record,
        parameters: Parameters,
        key: &str,
        defer_unresolved: bool,
    ) -> SyncResult<Applied>
    where
        S: BackingStore,
    {
        let mut plan = WritePlan::default();
        for (field, value) in parameters {
            self.classify(&*store, cache, &mut record, &mut plan, field, value, defer_unresolved)?;
        }

        let foreign_keys = std::mem::take(&mut plan.foreign_keys);
        resolve_foreign_keys(&*store, cache, &mut record, foreign_keys)?;

        let mut saved = store.save(record)?;
        cache.refresh(&saved);

        self.assign_relationships(store, cache, &saved, &mut plan, defer_unresolved)?;

        if !plan.many.is_empty() {
            for (field, related) in &plan.many {
                store.set_many(&saved.to_ref(), field, related)?;
            }
            saved = store.get_by_ref(&saved.to_ref())?;
            cache.refresh(&saved);
        }

        let deferred = plan
            .unresolved
            .into_iter()
            .map(|parameters| DeferredRelationship {
                kind: self.kind().to_string(),
                key: key.to_string(),
                record: saved.to_ref(),
                parameters,
            })
            .collect();

        Ok(Applied {
            record: saved,
            deferred,
        })
    }

    /// Route one parameter into the record or into a deferred bucket
    #[allow(clippy::too_many_arguments)]
    fn classify<S>(
        &self,
        store: &S,
        cache: &mut OrmCache,
        record: &mut Record,
        plan: &mut WritePlan,
        field: String,
        value: Value,
        defer_unresolved: bool,
    ) -> SyncResult<()>
    where
        S: BackingStore + ?Sized,
    {
        let annotation = self.spec().annotation(&field)?;

        if let Some(marker) = &annotation.custom_field {
            record
                .custom_field_data
                .get_or_insert_with(Map::new)
                .insert(marker.key.clone(), value);
            return Ok(());
        }

        let path = field
            .split_once(PATH_SEPARATOR)
            .map(|(head, rest)| (head.to_string(), rest.to_string()));

        match (&annotation.custom_relationship, path) {
            (Some(marker), Some((head, rest))) => {
                let bucket = plan
                    .custom_foreign_keys
                    .entry(head)
                    .or_insert_with(|| CustomForeignKeyBucket {
                        marker: marker.clone(),
                        parameters: Parameters::new(),
                        source: Parameters::new(),
                    });
                bucket.parameters.insert(rest, value.clone());
                bucket.source.insert(field, value);
            }
            (None, Some((head, rest))) => {
                let related = match store.schema(&self.spec().record_type)?.field(&head) {
                    Some(FieldKind::ForeignKey { target, .. }) => Some(target.clone()),
                    Some(FieldKind::GenericForeignKey { .. }) => None,
                    _ => {
                        return Err(SyncError::Configuration(format!(
                            "'{}' on {} is not a foreign key",
                            head,
                            self.spec().record_type
                        )))
                    }
                };
                plan.foreign_keys
                    .entry(head)
                    .or_insert_with(|| ForeignKeyBucket {
                        related,
                        parameters: Parameters::new(),
                    })
                    .parameters
                    .insert(rest, value);
            }
            (Some(marker), None) => {
                self.classify_custom_to_many(store, cache, plan, field, marker, value, defer_unresolved)?;
            }
            (None, None) => match store.schema(&self.spec().record_type)?.field(&field) {
                Some(FieldKind::ManyToMany { target }) | Some(FieldKind::OneToMany { target, .. }) => {
                    let mut related = Vec::new();
                    for entry in entries(&field, &value)? {
                        let parameters = entry_parameters(&field, entry)?;
                        let resolved = cache
                            .get_or_fetch(store, target, &parameters)
                            .map_err(|e| SyncError::field_resolution(&field, &parameters, e))?;
                        related.push(resolved.to_ref());
                    }
                    plan.many.push((field, related));
                }
                Some(FieldKind::Scalar { .. }) => {
                    record.values.insert(field, value);
                }
                _ => {
                    return Err(SyncError::Configuration(format!(
                        "{} has no writable field '{}'",
                        self.spec().record_type,
                        field
                    )))
                }
            },
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_custom_to_many<S>(
        &self,
        store: &S,
        cache: &mut OrmCache,
        plan: &mut WritePlan,
        field: String,
        marker: &CustomRelationshipMarker,
        value: Value,
        defer_unresolved: bool,
    ) -> SyncResult<()>
    where
        S: BackingStore + ?Sized,
    {
        let definition = RelationshipDefinition::lookup(store, cache, &marker.label)?;

        if definition.is_single_valued(marker.side) {
            let parameters = match &value {
                Value::Null => Parameters::new(),
                entry => entry_parameters(&field, entry)?,
            };
            let mut source = Parameters::new();
            source.insert(field.clone(), value);
            plan.custom_foreign_keys.insert(
                field,
                CustomForeignKeyBucket {
                    marker: marker.clone(),
                    parameters,
                    source,
                },
            );
            return Ok(());
        }

        let peer_type = definition.peer_type(marker.side);
        let mut targets = Vec::new();
        for entry in entries(&field, &value)? {
            let parameters = entry_parameters(&field, entry)?;
            match cache.get_or_fetch(store, peer_type, &parameters) {
                Ok(target) => targets.push(target.to_ref()),
                Err(err) if defer_unresolved && err.is_not_found() => {
                    debug!("Deferring '{}': {}", field, err);
                    let mut source = Parameters::new();
                    source.insert(field, value.clone());
                    plan.unresolved.push(source);
                    return Ok(());
                }
                Err(err) => return Err(SyncError::field_resolution(&field, &parameters, err)),
            }
        }
        plan.custom_to_many.push(CustomToMany {
            field,
            marker: marker.clone(),
            targets,
        });
        Ok(())
    }

    /// Write custom relationship associations for a saved record
    fn assign_relationships<S>(
        &self,
        store: &mut S,
        cache: &mut OrmCache,
        saved: &Record,
        plan: &mut WritePlan,
        defer_unresolved: bool,
    ) -> SyncResult<()>
    where
        S: BackingStore,
    {
        for (field, bucket) in std::mem::take(&mut plan.custom_foreign_keys) {
            let assigned = assign_custom_foreign_key(store, cache, saved, &bucket, defer_unresolved)
                .map_err(|e| SyncError::field_resolution(&field, &bucket.parameters, e))?;
            if !assigned {
                debug!("Deferring '{}' on {}", field, saved.to_ref());
                plan.unresolved.push(bucket.source);
            }
        }

        for to_many in std::mem::take(&mut plan.custom_to_many) {
            replace_associations(store, cache, saved, &to_many.marker, &to_many.targets).map_err(|e| {
                SyncError::FieldResolution {
                    field: to_many.field.clone(),
                    parameters: format!("{} targets", to_many.targets.len()),
                    source: Box::new(e),
                }
            })?;
        }
        Ok(())
    }
}

/// Resolve every native foreign key bucket onto the unsaved record
fn resolve_foreign_keys<S>(
    store: &S,
    cache: &mut OrmCache,
    record: &mut Record,
    buckets: BTreeMap<String, ForeignKeyBucket>,
) -> SyncResult<()>
where
    S: BackingStore + ?Sized,
{
    for (field, mut bucket) in buckets {
        let generic = match bucket.related.take() {
            Some(related) => Ok(related),
            None => Err((
                bucket.parameters.remove("app_label"),
                bucket.parameters.remove("model"),
            )),
        };

        if bucket.parameters.values().all(Value::is_null) {
            record.relations.remove(&field);
            continue;
        }

        let related = match generic {
            Ok(related) => related,
            Err((app_label, model)) => {
                match (
                    app_label.as_ref().and_then(Value::as_str),
                    model.as_ref().and_then(Value::as_str),
                ) {
                    (Some(app_label), Some(model)) => content_type::lookup(store, cache, app_label, model)
                        .map_err(|e| SyncError::field_resolution(&field, &bucket.parameters, e))?,
                    _ => {
                        return Err(SyncError::Configuration(format!(
                            "Generic foreign key '{}' needs app_label and model",
                            field
                        )))
                    }
                }
            }
        };

        let target = cache
            .get_or_fetch(store, &related, &bucket.parameters)
            .map_err(|e| SyncError::field_resolution(&field, &bucket.parameters, e))?;
        record.relations.insert(field, target.to_ref());
    }
    Ok(())
}

/// Point the to-one association of `saved` at the peer described by `bucket`
///
/// Returns `false` when the peer does not exist yet and deferral is allowed.
fn assign_custom_foreign_key<S>(
    store: &mut S,
    cache: &mut OrmCache,
    saved: &Record,
    bucket: &CustomForeignKeyBucket,
    defer_unresolved: bool,
) -> SyncResult<bool>
where
    S: BackingStore,
{
    let definition = RelationshipDefinition::lookup(&*store, cache, &bucket.marker.label)?;
    let side = bucket.marker.side;
    let parameters = definition.association_parameters(side, saved.id);
    let mut existing = store.filter(&builtin::relationship_association(), &parameters)?;

    if bucket.parameters.values().all(Value::is_null) {
        for association in existing {
            let target = association.to_ref();
            store.delete(&target)?;
            cache.evict(&target);
        }
        return Ok(true);
    }

    if existing.len() > 1 {
        return Err(SyncError::MultipleAssociations {
            label: definition.label.clone(),
            record: saved.to_ref(),
        });
    }

    let peer = match cache.get_or_fetch(&*store, definition.peer_type(side), &bucket.parameters) {
        Ok(peer) => peer,
        Err(err) if defer_unresolved && err.is_not_found() => return Ok(false),
        Err(err) => return Err(err),
    };

    let mut association = match existing.pop() {
        Some(association) => association,
        None => definition.new_association(side, saved.id, peer.id)?,
    };
    association.values.insert(
        side.peer().id_field().to_string(),
        Value::String(peer.id.to_string()),
    );
    let association = store.save(association)?;
    cache.refresh(&association);
    Ok(true)
}

/// Make the associations of `saved` exactly equal to `targets`
///
/// Resolve, upsert every declared target, then delete whatever else remains.
fn replace_associations<S>(
    store: &mut S,
    cache: &mut OrmCache,
    saved: &Record,
    marker: &CustomRelationshipMarker,
    targets: &[RecordRef],
) -> SyncResult<()>
where
    S: BackingStore,
{
    let definition = RelationshipDefinition::lookup(&*store, cache, &marker.label)?;
    let side = marker.side;
    let parameters = definition.association_parameters(side, saved.id);
    let association_type = builtin::relationship_association();

    let mut kept = HashSet::new();
    for target in targets {
        let mut exact = parameters.clone();
        exact.insert(
            side.peer().id_field().to_string(),
            Value::String(target.id.to_string()),
        );
        let association = match store.filter(&association_type, &exact)?.into_iter().next() {
            Some(association) => association,
            None => store.save(definition.new_association(side, saved.id, target.id)?)?,
        };
        kept.insert(association.id);
    }

    for stale in store.filter(&association_type, &parameters)? {
        if kept.contains(&stale.id) {
            continue;
        }
        let target = stale.to_ref();
        store.delete(&target)?;
        cache.evict(&target);
    }

    debug!(
        "Relationship '{}' on {} now has {} associations ({})",
        marker.label,
        saved.to_ref(),
        kept.len(),
        describe_parameters(&parameters)
    );
    Ok(())
}
