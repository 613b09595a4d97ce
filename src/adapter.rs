// Copyright (c) 2025 - Cowboy AI, Inc.
//! Adapter Graph Builder
//!
//! An [`Adapter`] holds one side of a synchronization: every [`SyncObject`]
//! loaded from (or declared by) that side, registered once per kind under its
//! unique id. Children are stored in their own kind's registry and linked from
//! their parent by unique id.
//!
//! A source integration fills an adapter with [`Adapter::add`]; the target
//! side is loaded from a backing store with [`Adapter::load`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::cache::OrmCache;
use crate::errors::{SyncError, SyncResult};
use crate::model::{ModelRegistry, ModelSpec, SyncModel, SyncObject};
use crate::store::{BackingStore, Record, RecordId};

/// How a load reacts to a record that fails to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Abort the whole load
    #[default]
    Strict,
    /// Log, record the failure and skip the object
    Permissive,
}

/// A record skipped by a permissive load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub kind: String,
    pub record: RecordId,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
struct KindObjects {
    order: Vec<String>,
    objects: HashMap<String, SyncObject>,
}

/// One side's in-memory object graph
#[derive(Debug, Clone)]
pub struct Adapter {
    name: String,
    top_level: Vec<String>,
    specs: BTreeMap<String, ModelSpec>,
    objects: BTreeMap<String, KindObjects>,
    load_policy: LoadPolicy,
    load_failures: Vec<LoadFailure>,
}

impl Adapter {
    /// Create an empty adapter for the given kinds
    pub fn new(name: impl Into<String>, top_level: Vec<String>, specs: Vec<ModelSpec>) -> SyncResult<Self> {
        let specs: BTreeMap<String, ModelSpec> = specs
            .into_iter()
            .map(|spec| (spec.kind.clone(), spec))
            .collect();
        for kind in top_level
            .iter()
            .chain(specs.values().flat_map(|spec| spec.children.keys()))
        {
            if !specs.contains_key(kind) {
                return Err(SyncError::Configuration(format!(
                    "Adapter declares '{}' without a model",
                    kind
                )));
            }
        }

        Ok(Self {
            name: name.into(),
            top_level,
            specs,
            objects: BTreeMap::new(),
            load_policy: LoadPolicy::Strict,
            load_failures: Vec::new(),
        })
    }

    /// Create an empty adapter declaring every model of a registry
    pub fn for_registry(name: impl Into<String>, registry: &ModelRegistry) -> Self {
        Self {
            name: name.into(),
            top_level: registry.top_level().to_vec(),
            specs: registry
                .models()
                .map(|model| (model.kind().to_string(), model.spec().clone()))
                .collect(),
            objects: BTreeMap::new(),
            load_policy: LoadPolicy::Strict,
            load_failures: Vec::new(),
        }
    }

    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn top_level(&self) -> &[String] {
        &self.top_level
    }

    pub fn spec(&self, kind: &str) -> SyncResult<&ModelSpec> {
        self.specs
            .get(kind)
            .ok_or_else(|| SyncError::Configuration(format!("{} has no model '{}'", self.name, kind)))
    }

    pub fn specs(&self) -> impl Iterator<Item = &ModelSpec> {
        self.specs.values()
    }

    /// Register an object; its unique id must be new for its kind
    pub fn add(&mut self, object: SyncObject) -> SyncResult<()> {
        self.spec(&object.kind)?;
        let entry = self.objects.entry(object.kind.clone()).or_default();
        if entry.objects.contains_key(&object.unique_id) {
            return Err(SyncError::ObjectAlreadyExists {
                kind: object.kind,
                key: object.unique_id,
            });
        }
        entry.order.push(object.unique_id.clone());
        entry.objects.insert(object.unique_id.clone(), object);
        Ok(())
    }

    /// Register `child` and link it under its parent
    pub fn add_child(&mut self, parent_kind: &str, parent_id: &str, child: SyncObject) -> SyncResult<()> {
        if self.get(parent_kind, parent_id).is_none() {
            return Err(SyncError::ObjectNotFound {
                kind: parent_kind.to_string(),
                key: parent_id.to_string(),
            });
        }
        let kind = child.kind.clone();
        let uid = child.unique_id.clone();
        self.add(child)?;
        self.link_child(parent_kind, parent_id, &kind, &uid);
        Ok(())
    }

    pub(crate) fn link_child(&mut self, parent_kind: &str, parent_id: &str, kind: &str, uid: &str) {
        if let Some(parent) = self.get_mut(parent_kind, parent_id) {
            let children = parent.children.entry(kind.to_string()).or_default();
            if !children.iter().any(|c| c == uid) {
                children.push(uid.to_string());
            }
        }
    }

    pub fn get(&self, kind: &str, unique_id: &str) -> Option<&SyncObject> {
        self.objects.get(kind).and_then(|k| k.objects.get(unique_id))
    }

    pub fn get_mut(&mut self, kind: &str, unique_id: &str) -> Option<&mut SyncObject> {
        self.objects
            .get_mut(kind)
            .and_then(|k| k.objects.get_mut(unique_id))
    }

    /// Remove an object and unlink it from any parent
    pub fn remove(&mut self, kind: &str, unique_id: &str) -> Option<SyncObject> {
        let entry = self.objects.get_mut(kind)?;
        let removed = entry.objects.remove(unique_id)?;
        entry.order.retain(|uid| uid != unique_id);
        for objects in self.objects.values_mut() {
            for parent in objects.objects.values_mut() {
                if let Some(children) = parent.children.get_mut(kind) {
                    children.retain(|uid| uid != unique_id);
                }
            }
        }
        Some(removed)
    }

    /// Objects of one kind, in registration order
    pub fn objects<'a>(&'a self, kind: &str) -> impl Iterator<Item = &'a SyncObject> + 'a {
        self.objects
            .get(kind)
            .into_iter()
            .flat_map(|k| k.order.iter().filter_map(move |uid| k.objects.get(uid)))
    }

    pub(crate) fn objects_mut<'a>(&'a mut self, kind: &str) -> impl Iterator<Item = &'a mut SyncObject> + 'a {
        self.objects
            .get_mut(kind)
            .into_iter()
            .flat_map(|k| k.objects.values_mut())
    }

    /// Unique ids of one kind, in registration order
    pub fn ids(&self, kind: &str) -> &[String] {
        self.objects
            .get(kind)
            .map(|k| k.order.as_slice())
            .unwrap_or(&[])
    }

    /// Total number of registered objects
    pub fn len(&self) -> usize {
        self.objects.values().map(|k| k.objects.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn load_failures(&self) -> &[LoadFailure] {
        &self.load_failures
    }

    /// Populate the graph from a backing store
    ///
    /// Each top-level kind loads every record of its type (or those matching
    /// the model's scope), then recurses into declared children.
    pub fn load<S>(&mut self, registry: &ModelRegistry, store: &S, cache: &mut OrmCache) -> SyncResult<()>
    where
        S: BackingStore + ?Sized,
    {
        for kind in registry.top_level() {
            let model = registry.get(kind)?;
            let spec = model.spec();
            let records = if spec.scope.is_empty() {
                store.all(&spec.record_type)?
            } else {
                store.filter(&spec.record_type, &spec.scope)?
            };

            info!("Loading {} {} records into {}", records.len(), kind, self.name);
            for record in &records {
                self.guarded(kind, record, |adapter| {
                    adapter.load_record(registry, model, store, cache, record)
                })?;
            }
        }

        if !self.load_failures.is_empty() {
            warn!(
                "{} skipped {} records that failed to load",
                self.name,
                self.load_failures.len()
            );
        }
        Ok(())
    }

    fn load_record<S>(
        &mut self,
        registry: &ModelRegistry,
        model: &SyncModel,
        store: &S,
        cache: &mut OrmCache,
        record: &Record,
    ) -> SyncResult<String>
    where
        S: BackingStore + ?Sized,
    {
        let mut object = model.load(store, cache, record)?;

        for (child_kind, field) in &model.spec().children {
            let child_model = registry.get(child_kind)?;
            for child_record in store.related(record, field)? {
                let loaded = self.guarded(child_kind, &child_record, |adapter| {
                    adapter.load_record(registry, child_model, store, cache, &child_record)
                })?;
                if let Some(uid) = loaded {
                    object.children.entry(child_kind.clone()).or_default().push(uid);
                }
            }
        }

        let uid = object.unique_id.clone();
        self.add(object)?;
        debug!("Loaded {} '{}'", model.kind(), uid);
        Ok(uid)
    }

    fn guarded<F>(&mut self, kind: &str, record: &Record, load: F) -> SyncResult<Option<String>>
    where
        F: FnOnce(&mut Self) -> SyncResult<String>,
    {
        match load(self) {
            Ok(uid) => Ok(Some(uid)),
            Err(err) if self.load_policy == LoadPolicy::Permissive => {
                warn!("Skipping {} {}: {}", kind, record.id, err);
                self.load_failures.push(LoadFailure {
                    kind: kind.to_string(),
                    record: record.id,
                    error: err.to_string(),
                });
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Annotation;
    use crate::store::{Parameters, RecordType};
    use serde_json::json;

    fn status_spec() -> ModelSpec {
        ModelSpec::new("status", RecordType::new("extras", "status")).identifier("name", Annotation::string())
    }

    fn status(name: &str) -> SyncObject {
        let mut identifiers = Parameters::new();
        identifiers.insert("name".to_string(), json!(name));
        SyncObject::new(&status_spec(), identifiers, Parameters::new()).unwrap()
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut adapter = Adapter::new("source", vec!["status".into()], vec![status_spec()]).unwrap();
        adapter.add(status("Active")).unwrap();
        adapter.add(status("Planned")).unwrap();

        let err = adapter.add(status("Active")).unwrap_err();
        assert!(matches!(err, SyncError::ObjectAlreadyExists { .. }));
        assert_eq!(adapter.ids("status").to_vec(), vec!["Active", "Planned"]);
        assert_eq!(adapter.len(), 2);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut adapter = Adapter::new("source", vec!["status".into()], vec![status_spec()]).unwrap();
        for name in ["Active", "Planned", "Retired"] {
            adapter.add(status(name)).unwrap();
        }

        assert!(adapter.remove("status", "Planned").is_some());
        assert!(adapter.remove("status", "Planned").is_none());
        let names: Vec<&str> = adapter.objects("status").map(|o| o.unique_id.as_str()).collect();
        assert_eq!(names, vec!["Active", "Retired"]);
    }

    #[test]
    fn test_unknown_kinds_are_rejected() {
        assert!(Adapter::new("source", vec!["device".into()], vec![status_spec()]).is_err());

        let mut adapter = Adapter::new("source", vec![], vec![status_spec()]).unwrap();
        let mut stray = status("Active");
        stray.kind = "device".to_string();
        assert!(adapter.add(stray).is_err());
    }
}
