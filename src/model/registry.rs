// Copyright (c) 2025 - Cowboy AI, Inc.
//! Model registration
//!
//! Registering a [`ModelSpec`] against a backing store validates the
//! declaration and binds an [`AttributeInterface`] to every attribute. Nothing
//! is re-dispatched when records are loaded afterwards.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{ModelSpec, SyncObject};
use crate::attributes::AttributeInterface;
use crate::cache::OrmCache;
use crate::errors::{SyncError, SyncResult};
use crate::store::{BackingStore, Parameters, Record};

/// A validated model with its attribute interfaces bound
#[derive(Debug, Clone)]
pub struct SyncModel {
    spec: ModelSpec,
    interfaces: Vec<(String, AttributeInterface)>,
}

impl SyncModel {
    /// Validate `spec` against the store's schema and bind its interfaces
    pub fn register<S>(spec: ModelSpec, store: &S) -> SyncResult<Self>
    where
        S: BackingStore + ?Sized,
    {
        let schema = store.schema(&spec.record_type)?;
        let invalid = |message: String| SyncError::Configuration(format!("{}: {}", spec.kind, message));

        if spec.identifiers.is_empty() {
            return Err(invalid("at least one identifier is required".to_string()));
        }

        let mut seen = BTreeSet::new();
        for name in spec.field_names() {
            if !seen.insert(name.as_str()) {
                return Err(invalid(format!("'{}' is declared twice", name)));
            }
        }

        for (name, annotation) in &spec.annotations {
            if !seen.contains(name.as_str()) {
                return Err(invalid(format!("annotation for undeclared attribute '{}'", name)));
            }
            if let Some(shape) = annotation.ty.shape() {
                if shape.fields.iter().filter(|f| f.sort_key).count() > 1 {
                    return Err(invalid(format!(
                        "shape '{}' declares more than one sort key",
                        shape.name
                    )));
                }
            }
        }

        for (child, field) in &spec.children {
            match schema.field(field) {
                Some(kind) if kind.is_many() => {}
                _ => {
                    return Err(invalid(format!(
                        "child '{}' needs a to-many field '{}' on {}",
                        child, field, spec.record_type
                    )))
                }
            }
        }

        let mut interfaces = Vec::new();
        for name in spec.field_names() {
            let interface = AttributeInterface::resolve(name, spec.annotation(name)?, schema)?;
            debug!("Bound {}.{} to {:?}", spec.kind, name, interface.kind());
            interfaces.push((name.clone(), interface));
        }

        Ok(Self { spec, interfaces })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn kind(&self) -> &str {
        &self.spec.kind
    }

    pub fn interface(&self, name: &str) -> Option<&AttributeInterface> {
        self.interfaces
            .iter()
            .find(|(attribute, _)| attribute == name)
            .map(|(_, interface)| interface)
    }

    /// Build an object from a backing record
    pub fn load<S>(&self, store: &S, cache: &mut OrmCache, record: &Record) -> SyncResult<SyncObject>
    where
        S: BackingStore + ?Sized,
    {
        let mut identifiers = Parameters::new();
        let mut attributes = Parameters::new();

        for (name, interface) in &self.interfaces {
            let value = interface.load(store, cache, record)?;
            self.spec
                .annotation(name)?
                .validate(&self.spec.kind, name, &value)?;
            if self.spec.is_identifier(name) {
                identifiers.insert(name.clone(), value);
            } else {
                attributes.insert(name.clone(), value);
            }
        }

        Ok(SyncObject::new(&self.spec, identifiers, attributes)?.with_pk(record.id))
    }

    /// Natural key of a parameter set, for error reporting
    pub fn key_of(&self, parameters: &Parameters) -> String {
        self.spec.unique_id(parameters)
    }
}

/// Every model taking part in a run, plus the top-level load order
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    top_level: Vec<String>,
    models: BTreeMap<String, SyncModel>,
}

impl ModelRegistry {
    /// Register `specs`; `top_level` lists the kinds loaded directly, in order
    pub fn register<S>(top_level: Vec<String>, specs: Vec<ModelSpec>, store: &S) -> SyncResult<Self>
    where
        S: BackingStore + ?Sized,
    {
        let mut models = BTreeMap::new();
        for spec in specs {
            let kind = spec.kind.clone();
            let model = SyncModel::register(spec, store)?;
            if models.insert(kind.clone(), model).is_some() {
                return Err(SyncError::Configuration(format!(
                    "Model '{}' is registered twice",
                    kind
                )));
            }
        }

        for kind in &top_level {
            if !models.contains_key(kind) {
                return Err(SyncError::Configuration(format!(
                    "Top-level kind '{}' has no model",
                    kind
                )));
            }
        }

        for model in models.values() {
            for child in model.spec().children.keys() {
                if !models.contains_key(child) {
                    return Err(SyncError::Configuration(format!(
                        "{} declares child '{}' which has no model",
                        model.kind(),
                        child
                    )));
                }
                if top_level.contains(child) {
                    return Err(SyncError::Configuration(format!(
                        "'{}' cannot be both top-level and a child of {}",
                        child,
                        model.kind()
                    )));
                }
            }
        }

        Ok(Self { top_level, models })
    }

    pub fn top_level(&self) -> &[String] {
        &self.top_level
    }

    pub fn get(&self, kind: &str) -> SyncResult<&SyncModel> {
        self.models
            .get(kind)
            .ok_or_else(|| SyncError::Configuration(format!("No model registered for '{}'", kind)))
    }

    pub fn models(&self) -> impl Iterator<Item = &SyncModel> {
        self.models.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Annotation, ScalarKind};
    use crate::store::{FieldKind, InMemoryStore, RecordSchema, RecordType};
    use serde_json::json;

    fn status() -> RecordType {
        RecordType::new("extras", "status")
    }

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.register_schema(
            RecordSchema::new(status())
                .field_kind("name", FieldKind::required_scalar())
                .field_kind("color", FieldKind::scalar()),
        );
        store
    }

    #[test]
    fn test_register_and_load() {
        let mut store = store();
        let active = store
            .save(Record::new(status()).with_value("name", "Active").with_value("color", "green"))
            .unwrap();

        let spec = ModelSpec::new("status", status())
            .identifier("name", Annotation::string())
            .attribute("color", Annotation::optional(ScalarKind::String));
        let registry = ModelRegistry::register(vec!["status".into()], vec![spec], &store).unwrap();

        let mut cache = OrmCache::new();
        let object = registry
            .get("status")
            .unwrap()
            .load(&store, &mut cache, &active)
            .unwrap();

        assert_eq!(object.unique_id, "Active");
        assert_eq!(object.attributes["color"], json!("green"));
        assert_eq!(object.pk, Some(active.id));
    }

    #[test]
    fn test_load_rejects_null_required_value() {
        let mut store = store();
        let unnamed = store
            .save(Record::new(status()).with_value("name", "x").with_value("color", json!(null)))
            .unwrap();
        let spec = ModelSpec::new("status", status())
            .identifier("name", Annotation::string())
            .attribute("color", Annotation::string());
        let model = SyncModel::register(spec, &store).unwrap();

        let err = model.load(&store, &mut OrmCache::new(), &unnamed).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }

    #[test]
    fn test_registry_rejects_bad_declarations() {
        let store = store();
        let base = || ModelSpec::new("status", status()).identifier("name", Annotation::string());

        assert!(ModelRegistry::register(vec!["status".into(), "role".into()], vec![base()], &store).is_err());
        assert!(ModelRegistry::register(vec![], vec![base(), base()], &store).is_err());

        let mut unannotated = base();
        unannotated.attributes.push("color".into());
        assert!(SyncModel::register(unannotated, &store).is_err());

        let childless = base().child("label", "labels");
        assert!(SyncModel::register(childless, &store).is_err());
    }
}
