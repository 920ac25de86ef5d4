//! Hyper-schema loading and per-resource link tables.
//!
//! A hyper-schema document lists, for every resource type under `definitions`, the
//! operations ("links") the API exposes: a relation name, an HTTP method, a URL template
//! and an optional request-body schema. [`HyperSchema`] parses the whole document once;
//! each resource type becomes an immutable [`ResourceSchema`] with its links indexed by
//! operation name.

use crate::Result;
use dato_core::{Error, HttpMethod};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Relation names that are exposed under a friendlier operation name.
///
/// Every other relation name is used verbatim.
pub const OPERATION_NAMES: &[(&str, &str)] = &[("instances", "all"), ("self", "find")];

/// Request-schema property that marks a collection endpoint as paginated.
pub const PAGE_LIMIT_PARAM: &str = "page[limit]";

/// Map a link relation to the operation name callers use.
#[must_use]
pub fn operation_name(rel: &str) -> &str {
    OPERATION_NAMES
        .iter()
        .find(|(known, _)| *known == rel)
        .map_or(rel, |(_, name)| *name)
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"\{\([^)]*?definitions(?:%2F|/)(?P<definition>[^%/)]+)(?:%2F|/)definitions(?:%2F|/)identity\)\}",
            r"|\{(?P<variable>[A-Za-z_][A-Za-z0-9_]*)\}",
        ))
        .unwrap_or_else(|err| panic!("invalid placeholder pattern: {err}"))
    })
}

/// An identity slot in a link's URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    token: String,
    reference: String,
    start: usize,
    end: usize,
}

impl Placeholder {
    /// The literal template text that gets replaced.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Referenced resource type (`{(#/definitions/item/definitions/identity)}` → `item`)
    /// or variable name (`{id}` → `id`).
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

/// Scan a URL template for identity placeholders, left to right.
#[must_use]
pub fn scan_placeholders(href: &str) -> Vec<Placeholder> {
    placeholder_pattern()
        .captures_iter(href)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let reference = caps
                .name("definition")
                .or_else(|| caps.name("variable"))?
                .as_str()
                .to_string();
            Some(Placeholder {
                token: whole.as_str().to_string(),
                reference,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// One operation declared by a resource's hyper-schema.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDescriptor {
    rel: String,
    operation_name: String,
    href: String,
    method: HttpMethod,
    request_schema: Option<Value>,
    placeholders: Vec<Placeholder>,
}

impl LinkDescriptor {
    /// Build a link from its parts.
    #[must_use]
    pub fn new(
        rel: impl Into<String>,
        href: impl Into<String>,
        method: HttpMethod,
        request_schema: Option<Value>,
    ) -> Self {
        let rel = rel.into();
        let href = href.into();
        Self {
            operation_name: operation_name(&rel).to_string(),
            placeholders: scan_placeholders(&href),
            rel,
            href,
            method,
            request_schema,
        }
    }

    /// Parse a link object (`rel`, `href`, `method`, optional `schema`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] when a required key is missing or the method is
    /// not one of GET, POST, PUT, DELETE.
    pub fn from_value(value: &Value) -> Result<Self> {
        let field = |key: &str| {
            value.get(key).and_then(Value::as_str).ok_or_else(|| {
                Error::InvalidSchema(format!("link is missing string field `{key}`: {value}"))
            })
        };

        let rel = field("rel")?;
        let href = field("href")?;
        let method = HttpMethod::from_str(field("method")?)?;
        let request_schema = value.get("schema").filter(|s| !s.is_null()).cloned();

        Ok(Self::new(rel, href, method, request_schema))
    }

    /// Relation name as declared by the schema.
    #[must_use]
    pub fn rel(&self) -> &str {
        &self.rel
    }

    /// Operation name the link is invoked by.
    #[must_use]
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// URL template.
    #[must_use]
    pub fn href(&self) -> &str {
        &self.href
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Request-body schema, if the link declares one.
    #[must_use]
    pub fn request_schema(&self) -> Option<&Value> {
        self.request_schema.as_ref()
    }

    /// Identity placeholders in template order.
    #[must_use]
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Minimum number of positional arguments an invocation must supply.
    #[must_use]
    pub fn required_args(&self) -> usize {
        let body = usize::from(self.request_schema.is_some() && self.method != HttpMethod::Get);
        self.placeholders.len() + body
    }

    /// Whether the request schema declares the `page[limit]` parameter.
    #[must_use]
    pub fn is_paginated(&self) -> bool {
        self.request_schema
            .as_ref()
            .and_then(|schema| schema.get("properties"))
            .and_then(Value::as_object)
            .is_some_and(|properties| properties.contains_key(PAGE_LIMIT_PARAM))
    }

    /// Substitute `ids` into the template, the i-th id replacing the i-th placeholder.
    ///
    /// Placeholders without a matching id are left untouched.
    #[must_use]
    pub fn expand(&self, ids: &[String]) -> String {
        let mut url = String::with_capacity(self.href.len());
        let mut cursor = 0;
        for (placeholder, id) in self.placeholders.iter().zip(ids) {
            url.push_str(&self.href[cursor..placeholder.start]);
            url.push_str(id);
            cursor = placeholder.end;
        }
        url.push_str(&self.href[cursor..]);
        url
    }
}

/// Link table for a single resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    resource_type: String,
    links: Vec<LinkDescriptor>,
    by_operation: HashMap<String, usize>,
}

impl ResourceSchema {
    /// Build a link table; the first link wins when two share an operation name.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, links: Vec<LinkDescriptor>) -> Self {
        let mut by_operation = HashMap::with_capacity(links.len());
        for (index, link) in links.iter().enumerate() {
            by_operation
                .entry(link.operation_name.clone())
                .or_insert(index);
        }

        Self {
            resource_type: resource_type.into(),
            links,
            by_operation,
        }
    }

    /// Parse a resource definition carrying a `links` array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if `links` is missing or any link is malformed.
    pub fn from_value(resource_type: impl Into<String>, definition: &Value) -> Result<Self> {
        let resource_type = resource_type.into();
        let links = definition
            .get("links")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::InvalidSchema(format!("`{resource_type}` has no `links` array"))
            })?
            .iter()
            .map(LinkDescriptor::from_value)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(resource_type, links))
    }

    /// Resource type name.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Links in declaration order.
    #[must_use]
    pub fn links(&self) -> &[LinkDescriptor] {
        &self.links
    }

    /// Link an operation name resolves to.
    #[must_use]
    pub fn link(&self, operation: &str) -> Option<&LinkDescriptor> {
        self.by_operation
            .get(operation)
            .and_then(|index| self.links.get(*index))
    }

    /// Whether `operation` resolves to a link.
    #[must_use]
    pub fn supports(&self, operation: &str) -> bool {
        self.by_operation.contains_key(operation)
    }

    /// Every operation name this resource answers to.
    #[must_use]
    pub fn supported_operations(&self) -> BTreeSet<String> {
        self.by_operation.keys().cloned().collect()
    }

    /// Whether the resource exposes a collection (`instances`) link.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.links.iter().any(|link| link.rel == "instances")
    }
}

/// A parsed hyper-schema document.
#[derive(Debug, Clone, Default)]
pub struct HyperSchema {
    resources: BTreeMap<String, Arc<ResourceSchema>>,
    namespaces: BTreeMap<String, String>,
}

impl HyperSchema {
    /// Parse a hyper-schema document.
    ///
    /// Every entry under `definitions` that declares `links` becomes a resource type.
    /// Local `$ref`s inside link definitions are expanded against the document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if `definitions` is missing, a local `$ref`
    /// does not resolve, or a link is malformed.
    pub fn from_value(document: &Value) -> Result<Self> {
        let definitions = document
            .get("definitions")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::InvalidSchema("document has no `definitions`".to_string()))?;

        let mut resources = BTreeMap::new();
        let mut namespaces = BTreeMap::new();

        for (resource_type, definition) in definitions {
            let Some(links) = definition.get("links") else {
                continue;
            };
            let mut stack = Vec::new();
            let links = expand_refs(links, document, &mut stack)?;
            let mut definition = Map::new();
            definition.insert("links".to_string(), links);

            let resource = ResourceSchema::from_value(resource_type, &Value::Object(definition))?;
            let namespace = namespace_for(&resource);
            match namespaces.entry(namespace) {
                Entry::Vacant(entry) => {
                    entry.insert(resource_type.clone());
                }
                Entry::Occupied(entry) => {
                    warn!(
                        namespace = %entry.key(),
                        kept = %entry.get(),
                        shadowed = %resource_type,
                        "Namespace claimed by two resource types"
                    );
                }
            }
            resources.insert(resource_type.clone(), Arc::new(resource));
        }

        Ok(Self {
            resources,
            namespaces,
        })
    }

    /// Look up a resource type.
    #[must_use]
    pub fn resource(&self, resource_type: &str) -> Option<Arc<ResourceSchema>> {
        self.resources.get(resource_type).cloned()
    }

    /// Look up a resource by namespace (`items`, `site`).
    #[must_use]
    pub fn resource_for_namespace(&self, namespace: &str) -> Option<Arc<ResourceSchema>> {
        self.namespaces
            .get(namespace)
            .and_then(|resource_type| self.resource(resource_type))
    }

    /// Resource type names, sorted.
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Namespaces, sorted.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Namespace a resource type is exposed under.
    ///
    /// `None` for unknown types and for a type whose namespace an earlier definition claimed.
    #[must_use]
    pub fn namespace(&self, resource_type: &str) -> Option<String> {
        let namespace = namespace_for(self.resources.get(resource_type)?);
        (self.namespaces.get(&namespace)? == resource_type).then_some(namespace)
    }
}

impl FromStr for HyperSchema {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(s)
            .map_err(|err| Error::InvalidSchema(format!("document is not JSON: {err}")))?;
        Self::from_value(&document)
    }
}

fn namespace_for(resource: &ResourceSchema) -> String {
    if resource.is_collection() {
        pluralize(resource.resource_type())
    } else {
        resource.resource_type().to_string()
    }
}

/// English plural of a snake_case resource name (`item_type` → `item_types`).
#[must_use]
pub fn pluralize(word: &str) -> String {
    let ends_with_consonant_y = word.ends_with('y')
        && !word
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'));

    if ends_with_consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
    {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

fn expand_refs(value: &Value, root: &Value, stack: &mut Vec<String>) -> Result<Value> {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if let Some(pointer) = reference.strip_prefix('#') {
                    // Cyclic references stay as `$ref` objects.
                    if stack.iter().any(|seen| seen == pointer) {
                        return Ok(value.clone());
                    }
                    let target = root.pointer(pointer).ok_or_else(|| {
                        Error::InvalidSchema(format!("unresolvable reference `{reference}`"))
                    })?;
                    stack.push(pointer.to_string());
                    let expanded = expand_refs(target, root, stack);
                    stack.pop();
                    return expanded;
                }
            }

            let mut expanded = Map::with_capacity(map.len());
            for (key, value) in map {
                expanded.insert(key.clone(), expand_refs(value, root, stack)?);
            }
            Ok(Value::Object(expanded))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| expand_refs(item, root, stack))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}
