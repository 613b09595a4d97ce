// Copyright (c) 2025 - Cowboy AI, Inc.
//! Attributes backed by native columns and relations

use serde_json::{Map, Value};

use crate::errors::{SyncError, SyncResult};
use crate::model::{value_type_name, Annotation, ScalarKind, Shape, TypeAnnotation};
use crate::store::{BackingStore, FieldKind, Record, RecordSchema, PATH_SEPARATOR};

/// Follow a dotted path from `record`, one foreign key per hop
///
/// A null foreign key on any intermediate hop yields `Null`. A terminal
/// `app_label` or `model` that is not a native field resolves through the
/// record's content type.
pub(crate) fn walk_path<S>(store: &S, record: &Record, segments: &[String]) -> SyncResult<Value>
where
    S: BackingStore + ?Sized,
{
    let Some((last, hops)) = segments.split_last() else {
        return Err(SyncError::Configuration("Empty attribute path".to_string()));
    };

    let mut current = record.clone();
    for hop in hops {
        let is_relation = store
            .schema(&current.record_type)?
            .field(hop)
            .map(FieldKind::is_relation)
            .unwrap_or(false);
        if !is_relation {
            return Err(SyncError::Configuration(format!(
                "'{}' on {} is not a foreign key",
                hop, current.record_type
            )));
        }
        match current.relations.get(hop.as_str()).cloned() {
            Some(target) => current = store.get_by_ref(&target)?,
            None => return Ok(Value::Null),
        }
    }

    terminal_value(store, &current, last)
}

fn terminal_value<S>(store: &S, record: &Record, field: &str) -> SyncResult<Value>
where
    S: BackingStore + ?Sized,
{
    if field == "id" {
        return Ok(Value::String(record.id.to_string()));
    }

    match store.schema(&record.record_type)?.field(field) {
        Some(FieldKind::Scalar { .. }) => Ok(record.value(field)),
        Some(kind) if kind.is_relation() => Ok(record
            .relations
            .get(field)
            .map(|target| Value::String(target.id.to_string()))
            .unwrap_or(Value::Null)),
        Some(_) => Err(SyncError::Configuration(format!(
            "'{}' on {} is a to-many field",
            field, record.record_type
        ))),
        None => match field {
            "app_label" => Ok(Value::String(store.content_type_of(record).app_label)),
            "model" => Ok(Value::String(store.content_type_of(record).model)),
            _ => Err(SyncError::Configuration(format!(
                "{} has no field '{}'",
                record.record_type, field
            ))),
        },
    }
}

/// Reduce a related record to the whitelisted fields of `shape`
///
/// Returns `None` when every field is null.
pub(crate) fn reduce<S>(store: &S, shape: &Shape, record: &Record) -> SyncResult<Option<Value>>
where
    S: BackingStore + ?Sized,
{
    let mut reduced = Map::new();
    for field in &shape.fields {
        let segments = split_path(&field.name);
        reduced.insert(field.name.clone(), walk_path(store, record, &segments)?);
    }

    if reduced.values().all(Value::is_null) {
        Ok(None)
    } else {
        Ok(Some(Value::Object(reduced)))
    }
}

pub(crate) fn split_path(name: &str) -> Vec<String> {
    name.split(PATH_SEPARATOR).map(str::to_string).collect()
}

/// Native scalar column, loaded verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct StandardAttribute {
    pub name: String,
    pub kind: ScalarKind,
}

impl StandardAttribute {
    pub fn new(name: &str, annotation: &Annotation, schema: &RecordSchema) -> SyncResult<Self> {
        let TypeAnnotation::Scalar { scalar, .. } = annotation.ty else {
            return Err(SyncError::Configuration(format!(
                "'{}' on {} must be annotated with a scalar type",
                name, schema.record_type
            )));
        };
        match schema.field(name) {
            Some(kind) if !kind.is_many() => {}
            None if name == "id" => {}
            _ => {
                return Err(SyncError::Configuration(format!(
                    "{} has no column '{}'",
                    schema.record_type, name
                )))
            }
        }
        Ok(Self {
            name: name.to_string(),
            kind: scalar,
        })
    }

    pub fn load<S>(&self, store: &S, record: &Record) -> SyncResult<Value>
    where
        S: BackingStore + ?Sized,
    {
        let value = terminal_value(store, record, &self.name)?;
        if !value.is_null() && !self.kind.matches(&value) {
            return Err(SyncError::TypeMismatch {
                attribute: self.name.clone(),
                expected: self.kind.as_str().to_string(),
                found: value_type_name(&value).to_string(),
            });
        }
        Ok(value)
    }
}

/// Dotted path across native foreign keys (`location__parent__name`)
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyAttribute {
    pub name: String,
    pub segments: Vec<String>,
}

impl ForeignKeyAttribute {
    pub fn new(name: &str, schema: &RecordSchema) -> SyncResult<Self> {
        let segments = split_path(name);
        if segments.len() < 2 || segments.iter().any(String::is_empty) {
            return Err(SyncError::Configuration(format!(
                "'{}' is not a dotted foreign key path",
                name
            )));
        }
        if !schema
            .field(&segments[0])
            .map(FieldKind::is_relation)
            .unwrap_or(false)
        {
            return Err(SyncError::Configuration(format!(
                "'{}' on {} is not a foreign key",
                segments[0], schema.record_type
            )));
        }
        Ok(Self {
            name: name.to_string(),
            segments,
        })
    }

    pub fn load<S>(&self, store: &S, record: &Record) -> SyncResult<Value>
    where
        S: BackingStore + ?Sized,
    {
        walk_path(store, record, &self.segments)
    }
}

/// Native many-to-many or one-to-many collection, reduced to a shape
#[derive(Debug, Clone, PartialEq)]
pub struct ManyRelationshipAttribute {
    pub name: String,
    pub shape: Shape,
}

impl ManyRelationshipAttribute {
    pub fn new(name: &str, annotation: &Annotation) -> SyncResult<Self> {
        match &annotation.ty {
            TypeAnnotation::List { shape } => Ok(Self {
                name: name.to_string(),
                shape: shape.clone(),
            }),
            _ => Err(SyncError::Configuration(format!(
                "'{}' is a to-many field and must be annotated as a list",
                name
            ))),
        }
    }

    pub fn load<S>(&self, store: &S, record: &Record) -> SyncResult<Value>
    where
        S: BackingStore + ?Sized,
    {
        let mut entries = Vec::new();
        for related in store.related(record, &self.name)? {
            if let Some(entry) = reduce(store, &self.shape, &related)? {
                entries.push(entry);
            }
        }
        Ok(Value::Array(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, RecordType};
    use serde_json::json;

    fn region() -> RecordType {
        RecordType::new("dcim", "region")
    }

    fn location() -> RecordType {
        RecordType::new("dcim", "location")
    }

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.register_schema(
            RecordSchema::new(region())
                .field_kind("name", FieldKind::required_scalar())
                .field_kind("parent", FieldKind::foreign_key(region())),
        );
        store.register_schema(
            RecordSchema::new(location())
                .field_kind("name", FieldKind::required_scalar())
                .field_kind("region", FieldKind::foreign_key(region())),
        );
        store
    }

    fn path(name: &str) -> Vec<String> {
        split_path(name)
    }

    #[test]
    fn test_walk_path_follows_chain() {
        let mut store = store();
        let europe = store.save(Record::new(region()).with_value("name", "Europe")).unwrap();
        let germany = store
            .save(Record::new(region()).with_value("name", "Germany").with_relation("parent", &europe))
            .unwrap();
        let fra = store
            .save(Record::new(location()).with_value("name", "FRA1").with_relation("region", &germany))
            .unwrap();

        assert_eq!(walk_path(&store, &fra, &path("region__name")).unwrap(), json!("Germany"));
        assert_eq!(
            walk_path(&store, &fra, &path("region__parent__name")).unwrap(),
            json!("Europe")
        );
        assert_eq!(
            walk_path(&store, &fra, &path("region__app_label")).unwrap(),
            json!("dcim")
        );
        assert!(walk_path(&store, &fra, &path("region__color")).is_err());
    }

    #[test]
    fn test_walk_path_short_circuits_on_null_hop() {
        let mut store = store();
        let orphan = store.save(Record::new(location()).with_value("name", "LAB")).unwrap();

        assert_eq!(walk_path(&store, &orphan, &path("region__name")).unwrap(), Value::Null);
        assert_eq!(
            walk_path(&store, &orphan, &path("region__parent__parent__name")).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_standard_attribute_rejects_wrong_type() {
        let mut store = store();
        let schema = store.schema(&location()).unwrap().clone();
        let odd = store.save(Record::new(location()).with_value("name", 42)).unwrap();

        let attribute = StandardAttribute::new("name", &Annotation::string(), &schema).unwrap();
        assert!(matches!(
            attribute.load(&store, &odd),
            Err(SyncError::TypeMismatch { .. })
        ));
    }
}
