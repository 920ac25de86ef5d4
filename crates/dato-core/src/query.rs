//! Builder for HTTP query parameters.
//!
//! Besides the plain key/value helpers, [`QueryParams::from_value`] flattens a JSON
//! object into the bracketed keys JSON:API endpoints expect (`filter[type]=article`,
//! `page[limit]=100`, `include=item_types,item_types.fields`).

use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt::Display;

/// Ordered collection of query parameter pairs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Create a new, empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Flatten a JSON object into query pairs.
    ///
    /// `null` is treated as an empty query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if `value` is neither an object nor `null`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut params = Self::new();
        match value {
            Value::Null => {}
            Value::Object(map) => {
                for (key, value) in map {
                    params.flatten(key.clone(), value);
                }
            }
            other => {
                return Err(Error::ValidationError(format!(
                    "query parameters must be an object, got `{other}`"
                )));
            }
        }
        Ok(params)
    }

    fn flatten(&mut self, key: String, value: &Value) {
        match value {
            Value::Null => {}
            Value::Object(map) => {
                for (inner, value) in map {
                    self.flatten(format!("{key}[{inner}]"), value);
                }
            }
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(scalar_to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                self.pairs.push((key, joined));
            }
            scalar => self.pairs.push((key, scalar_to_string(scalar))),
        }
    }

    /// Append a required key/value pair.
    pub fn push<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Display,
    {
        self.pairs.push((key.into(), value.to_string()));
    }

    /// Replace every existing pair for `key` with a single pair.
    ///
    /// The pair keeps the position of the first occurrence, or is appended.
    pub fn set<T>(&mut self, key: &str, value: T)
    where
        T: Display,
    {
        let value = value.to_string();
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.pairs[index].1 = value;
                let mut seen = false;
                self.pairs.retain(|(k, _)| {
                    if k != key {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    /// Merge `other` over this set; keys in `other` replace existing ones.
    pub fn merge(&mut self, other: Self) {
        for (key, value) in other.pairs {
            self.set(&key, value);
        }
    }

    /// Value of the first pair for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Borrow the collected pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Returns true if no parameters have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::QueryParams;
    use crate::Error;
    use serde_json::json;

    #[test]
    fn from_value_flattens_nested_keys() {
        let params = QueryParams::from_value(&json!({
            "filter": { "type": "article", "fields": { "title": { "eq": "Hi" } } },
            "version": "published",
            "page": { "limit": 30 },
            "nested": true
        }))
        .unwrap();

        assert_eq!(
            params.pairs().to_vec(),
            vec![
                ("filter[type]".to_string(), "article".to_string()),
                ("filter[fields][title][eq]".to_string(), "Hi".to_string()),
                ("version".to_string(), "published".to_string()),
                ("page[limit]".to_string(), "30".to_string()),
                ("nested".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn from_value_joins_arrays_and_skips_nulls() {
        let params = QueryParams::from_value(&json!({
            "include": ["item_types", "item_types.fields"],
            "ids": [1, 2, 3],
            "missing": null
        }))
        .unwrap();

        assert_eq!(params.get("include"), Some("item_types,item_types.fields"));
        assert_eq!(params.get("ids"), Some("1,2,3"));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn from_value_null_is_empty() {
        assert!(QueryParams::from_value(&json!(null)).unwrap().is_empty());
    }

    #[test]
    fn from_value_rejects_scalars() {
        let err = QueryParams::from_value(&json!("published")).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn set_replaces_existing_keys() {
        let mut params = QueryParams::new();
        params.push("page[limit]", 5);
        params.push("version", "latest");
        params.push("page[limit]", 7);
        params.set("page[limit]", 100);

        assert_eq!(
            params.pairs().to_vec(),
            vec![
                ("page[limit]".to_string(), "100".to_string()),
                ("version".to_string(), "latest".to_string()),
            ]
        );
    }

    #[test]
    fn merge_overrides_base_values() {
        let mut base = QueryParams::from_value(&json!({"version": "published", "a": 1})).unwrap();
        base.merge(QueryParams::from_value(&json!({"version": "latest"})).unwrap());

        assert_eq!(base.get("version"), Some("latest"));
        assert_eq!(base.get("a"), Some("1"));
    }
}
