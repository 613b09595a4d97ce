// Copyright (c) 2025 - Cowboy AI, Inc.
//! Synchronizable Models
//!
//! A [`ModelSpec`] declares one entity kind taking part in a synchronization:
//! which backing record type it maps to, which attributes identify it, which
//! attributes are compared, and which child kinds hang off it.
//!
//! Each attribute carries an [`Annotation`]: its value type plus optional
//! sidecar markers. The markers (and the shape of the attribute name) decide
//! how the value is loaded from and written to the backing store:
//!
//! | Attribute                                  | Loaded from                       |
//! |--------------------------------------------|-----------------------------------|
//! | `name`                                     | native column                     |
//! | `role__name`                               | foreign key chain                 |
//! | `tags` (native to-many field)              | related records, reduced to shape |
//! | with [`CustomFieldMarker`]                 | custom-field store                |
//! | `vrf__name` with [`CustomRelationshipMarker`] | custom relationship, one peer  |
//! | `prefixes` with [`CustomRelationshipMarker`]  | custom relationship, all peers |
//!
//! # Example
//!
//! ```rust
//! use cim_ssot::model::{Annotation, ModelSpec, ScalarKind, Shape};
//! use cim_ssot::store::RecordType;
//!
//! let device = ModelSpec::new("device", RecordType::new("dcim", "device"))
//!     .identifier("name", Annotation::string())
//!     .identifier("location__name", Annotation::string())
//!     .attribute("role__name", Annotation::optional(ScalarKind::String))
//!     .attribute(
//!         "tags",
//!         Annotation::list(Shape::new("tag").sort_field("name", ScalarKind::String)),
//!     );
//!
//! assert_eq!(device.identifiers, vec!["name", "location__name"]);
//! ```

pub mod crud;
pub mod registry;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::{SyncError, SyncResult};
use crate::relationship::RelationshipSide;
use crate::store::{Parameters, RecordId, RecordType};

pub use crud::{Applied, DeferredRelationship};
pub use registry::{ModelRegistry, SyncModel};

/// Primitive value types an attribute or shape field can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    #[default]
    Json,
}

impl ScalarKind {
    /// Whether a non-null value has this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ScalarKind::String => value.is_string(),
            ScalarKind::Integer => value.is_i64() || value.is_u64(),
            ScalarKind::Float => value.is_number(),
            ScalarKind::Boolean => value.is_boolean(),
            ScalarKind::Uuid => value.as_str().map(|s| Uuid::parse_str(s).is_ok()).unwrap_or(false),
            ScalarKind::Json => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Integer => "integer",
            ScalarKind::Float => "float",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Uuid => "uuid",
            ScalarKind::Json => "json",
        }
    }
}

/// Name of a JSON value's runtime type, for error messages
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// One whitelisted field of a [`Shape`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeField {
    pub name: String,
    #[serde(default)]
    pub kind: ScalarKind,
    /// Lists of this shape are ordered by this field before diffing
    #[serde(default)]
    pub sort_key: bool,
}

/// Typed-dict descriptor: the fields carried for each related record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub name: String,
    pub fields: Vec<ShapeField>,
}

impl Shape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.fields.push(ShapeField {
            name: name.into(),
            kind,
            sort_key: false,
        });
        self
    }

    /// Add a field and mark it as the sort key
    pub fn sort_field(mut self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.fields.push(ShapeField {
            name: name.into(),
            kind,
            sort_key: true,
        });
        self
    }

    /// The designated sort key, if any
    pub fn sort_key(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.sort_key)
            .map(|f| f.name.as_str())
    }

    fn validate_entry(&self, attribute: &str, entry: &Value) -> SyncResult<()> {
        let Value::Object(map) = entry else {
            return Err(SyncError::TypeMismatch {
                attribute: attribute.to_string(),
                expected: format!("{} object", self.name),
                found: value_type_name(entry).to_string(),
            });
        };
        for (key, value) in map {
            let field = self.fields.iter().find(|f| f.name == *key).ok_or_else(|| {
                SyncError::TypeMismatch {
                    attribute: attribute.to_string(),
                    expected: format!("{} fields", self.name),
                    found: format!("unknown field '{}'", key),
                }
            })?;
            if !value.is_null() && !field.kind.matches(value) {
                return Err(SyncError::TypeMismatch {
                    attribute: format!("{}.{}", attribute, key),
                    expected: field.kind.as_str().to_string(),
                    found: value_type_name(value).to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Declared value type of an attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeAnnotation {
    /// A single primitive value
    Scalar {
        scalar: ScalarKind,
        #[serde(default)]
        optional: bool,
    },
    /// A single related object reduced to a shape
    Shape {
        shape: Shape,
        #[serde(default)]
        optional: bool,
    },
    /// A collection of related objects reduced to a shape
    List { shape: Shape },
}

impl TypeAnnotation {
    /// The shape carried by object-valued annotations
    pub fn shape(&self) -> Option<&Shape> {
        match self {
            TypeAnnotation::Scalar { .. } => None,
            TypeAnnotation::Shape { shape, .. } | TypeAnnotation::List { shape } => Some(shape),
        }
    }
}

/// Marks an attribute as stored in the custom-field store under `key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldMarker {
    pub key: String,
}

/// Marks an attribute as backed by the custom relationship `label`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRelationshipMarker {
    pub label: String,
    pub side: RelationshipSide,
}

/// Type annotation plus sidecar markers for one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub ty: TypeAnnotation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_field: Option<CustomFieldMarker>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_relationship: Option<CustomRelationshipMarker>,
}

impl Annotation {
    fn of(ty: TypeAnnotation) -> Self {
        Self {
            ty,
            custom_field: None,
            custom_relationship: None,
        }
    }

    /// Required primitive value
    pub fn scalar(kind: ScalarKind) -> Self {
        Self::of(TypeAnnotation::Scalar {
            scalar: kind,
            optional: false,
        })
    }

    /// Nullable primitive value
    pub fn optional(kind: ScalarKind) -> Self {
        Self::of(TypeAnnotation::Scalar {
            scalar: kind,
            optional: true,
        })
    }

    pub fn string() -> Self {
        Self::scalar(ScalarKind::String)
    }

    /// Collection of related objects
    pub fn list(shape: Shape) -> Self {
        Self::of(TypeAnnotation::List { shape })
    }

    /// Single, nullable related object
    pub fn shape(shape: Shape) -> Self {
        Self::of(TypeAnnotation::Shape {
            shape,
            optional: true,
        })
    }

    pub fn custom_field(mut self, key: impl Into<String>) -> Self {
        self.custom_field = Some(CustomFieldMarker { key: key.into() });
        self
    }

    pub fn custom_relationship(mut self, label: impl Into<String>, side: RelationshipSide) -> Self {
        self.custom_relationship = Some(CustomRelationshipMarker {
            label: label.into(),
            side,
        });
        self
    }

    /// Value an attribute takes when a source omits it
    pub fn default_value(&self) -> Value {
        match self.ty {
            TypeAnnotation::List { .. } => Value::Array(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Check a loaded or declared value against this annotation
    pub fn validate(&self, kind: &str, attribute: &str, value: &Value) -> SyncResult<()> {
        let required = |optional: bool| -> SyncResult<()> {
            if value.is_null() && !optional {
                return Err(SyncError::Validation {
                    record_type: kind.to_string(),
                    message: format!("'{}' is required", attribute),
                });
            }
            Ok(())
        };

        match &self.ty {
            TypeAnnotation::Scalar { scalar, optional } => {
                required(*optional)?;
                if !value.is_null() && !scalar.matches(value) {
                    return Err(SyncError::TypeMismatch {
                        attribute: attribute.to_string(),
                        expected: scalar.as_str().to_string(),
                        found: value_type_name(value).to_string(),
                    });
                }
                Ok(())
            }
            TypeAnnotation::Shape { shape, optional } => {
                required(*optional)?;
                if value.is_null() {
                    return Ok(());
                }
                shape.validate_entry(attribute, value)
            }
            TypeAnnotation::List { shape } => {
                let Value::Array(entries) = value else {
                    return Err(SyncError::TypeMismatch {
                        attribute: attribute.to_string(),
                        expected: format!("list of {}", shape.name),
                        found: value_type_name(value).to_string(),
                    });
                };
                entries
                    .iter()
                    .try_for_each(|entry| shape.validate_entry(attribute, entry))
            }
        }
    }
}

/// Declaration of one synchronizable entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub kind: String,
    pub record_type: RecordType,

    /// Natural key, in order
    #[serde(default)]
    pub identifiers: Vec<String>,

    /// Compared, non-identifying attributes
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Child kind -> to-many field on the backing record yielding its records
    #[serde(default)]
    pub children: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, Annotation>,

    /// Filter applied instead of loading every record of the type
    #[serde(default)]
    pub scope: Parameters,
}

impl ModelSpec {
    pub fn new(kind: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            kind: kind.into(),
            record_type,
            identifiers: Vec::new(),
            attributes: Vec::new(),
            children: BTreeMap::new(),
            annotations: BTreeMap::new(),
            scope: Parameters::new(),
        }
    }

    pub fn identifier(mut self, name: impl Into<String>, annotation: Annotation) -> Self {
        let name = name.into();
        self.identifiers.push(name.clone());
        self.annotations.insert(name, annotation);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, annotation: Annotation) -> Self {
        let name = name.into();
        self.attributes.push(name.clone());
        self.annotations.insert(name, annotation);
        self
    }

    pub fn child(mut self, kind: impl Into<String>, field: impl Into<String>) -> Self {
        self.children.insert(kind.into(), field.into());
        self
    }

    pub fn scoped(mut self, scope: Parameters) -> Self {
        self.scope = scope;
        self
    }

    pub fn annotation(&self, name: &str) -> SyncResult<&Annotation> {
        self.annotations.get(name).ok_or_else(|| {
            SyncError::Configuration(format!("{} has no annotation for '{}'", self.kind, name))
        })
    }

    /// Identifiers followed by attributes
    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.identifiers.iter().chain(self.attributes.iter())
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.identifiers.iter().any(|i| i == name)
    }

    /// Unique id of an object: identifier values joined in declaration order
    ///
    /// Underscores and backslashes inside a value are escaped with a
    /// backslash, so the `__` separator only ever appears between values.
    pub fn unique_id(&self, identifiers: &Parameters) -> String {
        self.identifiers
            .iter()
            .map(|name| match identifiers.get(name) {
                Some(Value::String(s)) => escape_key_part(s),
                Some(other) => escape_key_part(&other.to_string()),
                None => Value::Null.to_string(),
            })
            .collect::<Vec<_>>()
            .join(crate::store::PATH_SEPARATOR)
    }
}

fn escape_key_part(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '_' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// One object in an adapter's in-memory graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncObject {
    pub kind: String,
    pub unique_id: String,
    pub identifiers: Parameters,
    pub attributes: Parameters,

    /// Child kind -> unique ids of child objects
    #[serde(default)]
    pub children: BTreeMap<String, Vec<String>>,

    /// Primary key of the backing record, never compared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<RecordId>,
}

impl SyncObject {
    /// Build an object, filling omitted attributes with their defaults
    pub fn new(spec: &ModelSpec, identifiers: Parameters, mut attributes: Parameters) -> SyncResult<Self> {
        for name in &spec.identifiers {
            if !identifiers.contains_key(name) {
                return Err(SyncError::Validation {
                    record_type: spec.kind.clone(),
                    message: format!("identifier '{}' is missing", name),
                });
            }
        }
        if let Some(unknown) = identifiers.keys().find(|k| !spec.is_identifier(k)) {
            return Err(SyncError::Configuration(format!(
                "'{}' is not an identifier of {}",
                unknown, spec.kind
            )));
        }
        if let Some(unknown) = attributes.keys().find(|k| !spec.attributes.contains(k)) {
            return Err(SyncError::Configuration(format!(
                "'{}' is not an attribute of {}",
                unknown, spec.kind
            )));
        }
        for name in &spec.attributes {
            if !attributes.contains_key(name) {
                attributes.insert(name.clone(), spec.annotation(name)?.default_value());
            }
        }

        Ok(Self {
            kind: spec.kind.clone(),
            unique_id: spec.unique_id(&identifiers),
            identifiers,
            attributes,
            children: BTreeMap::new(),
            pk: None,
        })
    }

    /// Build an object from one merged parameter map
    pub fn from_parameters(spec: &ModelSpec, parameters: Parameters) -> SyncResult<Self> {
        let (identifiers, attributes) = parameters
            .into_iter()
            .partition(|(name, _)| spec.is_identifier(name));
        Self::new(spec, identifiers, attributes)
    }

    pub fn with_pk(mut self, pk: RecordId) -> Self {
        self.pk = Some(pk);
        self
    }

    /// Identifiers and attributes as one parameter map
    pub fn parameters(&self) -> Parameters {
        let mut parameters = self.identifiers.clone();
        parameters.extend(self.attributes.clone());
        parameters
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.identifiers
            .get(name)
            .or_else(|| self.attributes.get(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self.identifiers.get_mut(name) {
            Some(value) => Some(value),
            None => self.attributes.get_mut(name),
        }
    }
}
