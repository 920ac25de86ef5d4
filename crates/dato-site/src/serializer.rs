//! JSON:API request document construction.
//!
//! Which payload fields are attributes and which are relationships is read from the
//! link's request schema (`data.attributes` and `data.relationships`), never from the
//! resource type.

use crate::Result;
use dato_core::Error;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Payload keys that describe the document, not the resource's fields.
const RESERVED_KEYS: &[&str] = &["id", "type"];

/// How a relationship field is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipShape {
    /// Resource type of the referenced entities
    pub target_type: String,
    /// Whether the relationship holds a list of references
    pub collection: bool,
}

/// Field layout a request schema declares for the resource object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestShape {
    /// Type identifier the schema pins for `data.type`, if any
    pub resource_type: Option<String>,
    /// Declared attribute names
    pub attributes: BTreeSet<String>,
    /// Attributes that must be present on create
    pub required: BTreeSet<String>,
    /// Declared relationships by name
    pub relationships: BTreeMap<String, RelationshipShape>,
}

impl RequestShape {
    /// Read the shape from a request schema.
    #[must_use]
    pub fn from_schema(schema: &Value) -> Self {
        let data = schema.pointer("/properties/data");

        let resource_type = data
            .and_then(|data| data.pointer("/properties/type"))
            .and_then(type_identifier);

        let attributes_schema = data.and_then(|data| data.pointer("/properties/attributes"));
        let attributes = attributes_schema
            .and_then(|attrs| attrs.get("properties"))
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();
        let required = attributes_schema
            .and_then(|attrs| attrs.get("required"))
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let relationships = data
            .and_then(|data| data.pointer("/properties/relationships/properties"))
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| (name.clone(), relationship_shape(name, schema)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            resource_type,
            attributes,
            required,
            relationships,
        }
    }
}

fn relationship_shape(name: &str, schema: &Value) -> RelationshipShape {
    let data = schema.pointer("/properties/data").unwrap_or(&Value::Null);
    let (collection, reference) = match non_null_variant(data) {
        Some(variant) if declares_array(variant) => {
            (true, variant.get("items").unwrap_or(&Value::Null))
        }
        Some(variant) => (false, variant),
        None => (false, &Value::Null),
    };

    let target_type = non_null_variant(reference)
        .and_then(|reference| reference.pointer("/properties/type"))
        .and_then(type_identifier)
        .unwrap_or_else(|| name.to_string());

    RelationshipShape {
        target_type,
        collection,
    }
}

/// First `anyOf`/`oneOf` alternative that is not `{"type": "null"}`, or the schema itself.
fn non_null_variant(schema: &Value) -> Option<&Value> {
    for key in ["anyOf", "oneOf"] {
        if let Some(variants) = schema.get(key).and_then(Value::as_array) {
            return variants
                .iter()
                .find(|variant| variant.get("type").and_then(Value::as_str) != Some("null"));
        }
    }
    Some(schema)
}

fn declares_array(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(kind)) => kind == "array",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "array"),
        _ => schema.get("items").is_some(),
    }
}

/// Type identifier pinned by a `type` property schema (`enum`, `const`, `^name$`).
fn type_identifier(schema: &Value) -> Option<String> {
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
        .and_then(Value::as_str)
    {
        return Some(first.to_string());
    }
    if let Some(constant) = schema.get("const").and_then(Value::as_str) {
        return Some(constant.to_string());
    }
    schema
        .get("pattern")
        .and_then(Value::as_str)
        .and_then(|pattern| pattern.strip_prefix('^'))
        .and_then(|pattern| pattern.strip_suffix('$'))
        .filter(|name| name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .map(str::to_string)
}

/// What a request document asks the API to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent<'a> {
    /// Create a resource; required attributes must be present
    Create,
    /// Change an existing resource, embedding its id when the URL named one
    Update(Option<&'a str>),
}

impl<'a> Intent<'a> {
    const fn resource_id(self) -> Option<&'a str> {
        match self {
            Self::Create => None,
            Self::Update(id) => id,
        }
    }
}

/// Builds JSON:API request documents for one link.
#[derive(Debug, Clone)]
pub struct JsonApiSerializer {
    resource_type: String,
    shape: RequestShape,
}

impl JsonApiSerializer {
    /// Prepare a serializer for `resource_type` using the link's request schema.
    #[must_use]
    pub fn new(resource_type: &str, request_schema: &Value) -> Self {
        let shape = RequestShape::from_schema(request_schema);
        Self {
            resource_type: shape
                .resource_type
                .clone()
                .unwrap_or_else(|| resource_type.to_string()),
            shape,
        }
    }

    /// The shape derived from the request schema.
    #[must_use]
    pub fn shape(&self) -> &RequestShape {
        &self.shape
    }

    /// Serialize `payload`; the document carries an `id` only for an update that names one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the payload is not an object, names a field the
    /// schema does not declare, omits a required attribute on create, or gives a
    /// relationship a value of the wrong shape.
    pub fn serialize(&self, payload: &Value, intent: Intent<'_>) -> Result<Value> {
        let fields = payload.as_object().ok_or_else(|| {
            Error::Serialization(format!(
                "`{}` payload must be an object, got `{payload}`",
                self.resource_type
            ))
        })?;

        let mut attributes = Map::new();
        let mut relationships = Map::new();

        for (key, value) in fields {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Some(relationship) = self.shape.relationships.get(key) {
                relationships.insert(key.clone(), self.relationship(key, relationship, value)?);
            } else if self.shape.attributes.contains(key) {
                attributes.insert(key.clone(), value.clone());
            } else {
                return Err(Error::Serialization(format!(
                    "field `{key}` is not declared by the `{}` request schema",
                    self.resource_type
                )));
            }
        }

        if intent == Intent::Create {
            let missing: Vec<&str> = self
                .shape
                .required
                .iter()
                .filter(|name| !attributes.contains_key(*name))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(Error::Serialization(format!(
                    "`{}` is missing required attributes: {}",
                    self.resource_type,
                    missing.join(", ")
                )));
            }
        }

        let mut data = Map::new();
        data.insert("type".to_string(), Value::String(self.resource_type.clone()));
        if let Some(id) = intent.resource_id() {
            data.insert("id".to_string(), Value::String(id.to_string()));
        }
        if !attributes.is_empty() {
            data.insert("attributes".to_string(), Value::Object(attributes));
        }
        if !relationships.is_empty() {
            data.insert("relationships".to_string(), Value::Object(relationships));
        }

        Ok(json!({ "data": data }))
    }

    fn relationship(&self, name: &str, shape: &RelationshipShape, value: &Value) -> Result<Value> {
        let data = match (value, shape.collection) {
            (Value::Null, _) => Value::Null,
            (Value::Array(ids), true) => ids
                .iter()
                .map(|id| self.reference(name, &shape.target_type, id))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)?,
            (Value::Array(_), false) => {
                return Err(Error::Serialization(format!(
                    "relationship `{name}` of `{}` takes a single reference, got a list",
                    self.resource_type
                )));
            }
            (_, true) => {
                return Err(Error::Serialization(format!(
                    "relationship `{name}` of `{}` takes a list of references, got `{value}`",
                    self.resource_type
                )));
            }
            (single, false) => self.reference(name, &shape.target_type, single)?,
        };

        Ok(json!({ "data": data }))
    }

    fn reference(&self, name: &str, target_type: &str, value: &Value) -> Result<Value> {
        let (kind, id) = match value {
            Value::String(id) => (target_type.to_string(), id.clone()),
            Value::Number(id) => (target_type.to_string(), id.to_string()),
            Value::Object(object) => {
                let id = match object.get("id") {
                    Some(Value::String(id)) => id.clone(),
                    Some(Value::Number(id)) => id.to_string(),
                    _ => {
                        return Err(Error::Serialization(format!(
                            "reference in `{name}` of `{}` has no id",
                            self.resource_type
                        )));
                    }
                };
                let kind = object
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or(target_type)
                    .to_string();
                (kind, id)
            }
            other => {
                return Err(Error::Serialization(format!(
                    "invalid reference `{other}` in `{name}` of `{}`",
                    self.resource_type
                )));
            }
        };

        Ok(json!({ "type": kind, "id": id }))
    }
}
