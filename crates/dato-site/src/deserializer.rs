//! JSON:API response flattening.

use crate::Result;
use dato_core::Error;
use serde_json::{Map, Value};
use std::collections::HashMap;

type IncludedIndex<'a> = HashMap<(&'a str, String), &'a Value>;

/// Turns JSON:API response documents into plain objects.
///
/// Each resource becomes `{ "id", "type", ...attributes, ...relationships, "meta"? }`.
/// A relationship is replaced by the referenced id, or by the flattened side-loaded entity
/// when `included` carries it. Side-loaded entities are resolved one level deep.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonApiDeserializer;

impl JsonApiDeserializer {
    /// Create a deserializer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Flatten a response document.
    ///
    /// An empty response (`null`) deserializes to `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] when the document has no `data` key, `data` is
    /// neither an object, an array nor `null`, `included` is not an array, or a resource
    /// lacks its `id` or `type`.
    pub fn deserialize(&self, response: &Value) -> Result<Value> {
        let document = match response {
            Value::Null => return Ok(Value::Null),
            Value::Object(document) => document,
            other => {
                return Err(Error::Deserialization(format!(
                    "response is not a JSON:API document: `{other}`"
                )));
            }
        };

        let data = document.get("data").ok_or_else(|| {
            Error::Deserialization("response document has no `data` key".to_string())
        })?;

        let index = match document.get("included") {
            None | Some(Value::Null) => IncludedIndex::new(),
            Some(Value::Array(included)) => index_included(included)?,
            Some(_) => {
                return Err(Error::Deserialization(
                    "`included` must be an array".to_string(),
                ));
            }
        };

        match data {
            Value::Null => Ok(Value::Null),
            Value::Object(_) => flatten(data, Some(&index)),
            Value::Array(resources) => resources
                .iter()
                .map(|resource| flatten(resource, Some(&index)))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Err(Error::Deserialization(format!(
                "`data` must be an object, an array or null, got `{other}`"
            ))),
        }
    }
}

fn identity(resource: &Value) -> Result<(&str, String)> {
    let kind = resource
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Deserialization(format!("resource has no `type`: {resource}")))?;
    let id = match resource.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => {
            return Err(Error::Deserialization(format!(
                "resource has no `id`: {resource}"
            )));
        }
    };
    Ok((kind, id))
}

fn index_included(included: &[Value]) -> Result<IncludedIndex<'_>> {
    let mut index = IncludedIndex::with_capacity(included.len());
    for entity in included {
        let (kind, id) = identity(entity)?;
        index.entry((kind, id)).or_insert(entity);
    }
    Ok(index)
}

fn flatten(resource: &Value, index: Option<&IncludedIndex<'_>>) -> Result<Value> {
    let (kind, id) = identity(resource)?;

    let mut object = Map::new();
    object.insert("id".to_string(), Value::String(id));
    object.insert("type".to_string(), Value::String(kind.to_string()));

    if let Some(attributes) = resource.get("attributes").and_then(Value::as_object) {
        for (name, value) in attributes {
            if name != "id" && name != "type" {
                object.insert(name.clone(), value.clone());
            }
        }
    }

    if let Some(relationships) = resource.get("relationships").and_then(Value::as_object) {
        for (name, relationship) in relationships {
            let Some(data) = relationship.get("data") else {
                continue;
            };
            let value = match data {
                Value::Null => Value::Null,
                Value::Array(references) => references
                    .iter()
                    .map(|reference| resolve(reference, index))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)?,
                reference => resolve(reference, index)?,
            };
            object.insert(name.clone(), value);
        }
    }

    if let Some(meta) = resource.get("meta").filter(|meta| meta.is_object()) {
        object.insert("meta".to_string(), meta.clone());
    }

    Ok(Value::Object(object))
}

fn resolve(reference: &Value, index: Option<&IncludedIndex<'_>>) -> Result<Value> {
    let (kind, id) = identity(reference)?;
    match index.and_then(|index| index.get(&(kind, id.clone()))) {
        Some(entity) => flatten(entity, None),
        None => Ok(Value::String(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_single_resource() {
        let response = json!({
            "data": {
                "type": "item",
                "id": "42",
                "attributes": {"title": "Hello", "position": 1},
                "relationships": {
                    "item_type": {"data": {"type": "item_type", "id": "7"}},
                    "tags": {"data": [{"type": "tag", "id": "1"}]},
                    "creator": {"data": null},
                    "versions": {"links": {"related": "/items/42/versions"}}
                },
                "meta": {"status": "published"}
            }
        });

        let item = JsonApiDeserializer::new().deserialize(&response).unwrap();
        assert_eq!(
            item,
            json!({
                "id": "42",
                "type": "item",
                "title": "Hello",
                "position": 1,
                "item_type": "7",
                "tags": ["1"],
                "creator": null,
                "meta": {"status": "published"}
            })
        );
    }

    #[test]
    fn resolves_relationships_against_included() {
        let response = json!({
            "data": [
                {
                    "type": "item",
                    "id": "1",
                    "relationships": {"item_type": {"data": {"type": "item_type", "id": "7"}}}
                },
                {
                    "type": "item",
                    "id": "2",
                    "relationships": {"item_type": {"data": {"type": "item_type", "id": "8"}}}
                }
            ],
            "included": [{
                "type": "item_type",
                "id": "7",
                "attributes": {"api_key": "article"},
                "relationships": {"fields": {"data": [{"type": "field", "id": "99"}]}}
            }]
        });

        let items = JsonApiDeserializer::new().deserialize(&response).unwrap();
        assert_eq!(
            items[0]["item_type"],
            json!({"id": "7", "type": "item_type", "api_key": "article", "fields": ["99"]})
        );
        assert_eq!(items[1]["item_type"], json!("8"));
    }

    #[test]
    fn null_data_and_empty_response() {
        let deserializer = JsonApiDeserializer::new();
        assert_eq!(deserializer.deserialize(&json!({"data": null})).unwrap(), Value::Null);
        assert_eq!(deserializer.deserialize(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn missing_data_is_an_error() {
        let err = JsonApiDeserializer::new()
            .deserialize(&json!({"errors": []}))
            .unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn resource_without_identity_is_an_error() {
        let deserializer = JsonApiDeserializer::new();
        assert!(deserializer
            .deserialize(&json!({"data": {"type": "item"}}))
            .is_err());
        assert!(deserializer
            .deserialize(&json!({"data": {"id": "1"}}))
            .is_err());
        assert!(deserializer
            .deserialize(&json!({"data": "item"}))
            .is_err());
    }

    #[test]
    fn numeric_ids_become_strings() {
        let item = JsonApiDeserializer::new()
            .deserialize(&json!({"data": {"type": "item", "id": 5}}))
            .unwrap();
        assert_eq!(item["id"], json!("5"));
    }
}
