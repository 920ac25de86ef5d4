//! Schema-driven operation dispatch for a single resource type.
//!
//! A [`Repo`] turns an operation name plus positional arguments into one HTTP call (or one
//! call per page) by interpreting the resource's link table:
//!
//! 1. resolve the link whose operation name matches,
//! 2. check the caller supplied one argument per identity placeholder, plus the payload
//!    when the link takes a body,
//! 3. substitute the ids into the URL template left to right,
//! 4. build the body (POST/PUT) or query (GET) and call the transport, paginating when
//!    asked to,
//! 5. flatten the JSON:API response unless raw output was requested.

use crate::deserializer::JsonApiDeserializer;
use crate::paginator::Paginator;
use crate::schema::{LinkDescriptor, ResourceSchema};
use crate::serializer::{Intent, JsonApiSerializer};
use crate::Result;
use dato_core::client::DEFAULT_PAGE_SIZE;
use dato_core::query::QueryParams;
use dato_core::{Error, HttpMethod, Request, Transport};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-call options, kept apart from the positional id/payload arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    /// Query parameters for GET operations, merged over a positional query argument
    pub query: Option<Value>,
    /// Fetch every page of a paginated collection
    pub all_pages: bool,
    /// Flatten the JSON:API response (`false` returns the raw body)
    pub deserialize_response: bool,
}

impl InvokeOptions {
    /// Defaults: no query, first page only, deserialized response.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            query: None,
            all_pages: false,
            deserialize_response: true,
        }
    }

    /// Set the query parameters.
    #[must_use]
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Fetch every page of paginated collections.
    #[must_use]
    pub const fn all_pages(mut self, all_pages: bool) -> Self {
        self.all_pages = all_pages;
        self
    }

    /// Choose whether to flatten the response.
    #[must_use]
    pub const fn deserialize_response(mut self, deserialize: bool) -> Self {
        self.deserialize_response = deserialize;
        self
    }

    /// Return the raw response body.
    #[must_use]
    pub const fn raw(self) -> Self {
        self.deserialize_response(false)
    }
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Dynamic client for one resource type.
///
/// Holds no per-call state; clones share the transport and the link table.
#[derive(Clone)]
pub struct Repo {
    transport: Arc<dyn Transport>,
    schema: Arc<ResourceSchema>,
    page_size: usize,
}

impl Repo {
    /// Create a repo over `schema` that issues requests through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, schema: Arc<ResourceSchema>) -> Self {
        Self {
            transport,
            schema,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the page size used when fetching all pages (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Resource type this repo dispatches for.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.schema.resource_type()
    }

    /// The link table.
    #[must_use]
    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Whether the resource supports `operation`.
    #[must_use]
    pub fn supports(&self, operation: &str) -> bool {
        self.schema.supports(operation)
    }

    /// Every operation name the resource supports.
    #[must_use]
    pub fn supported_operations(&self) -> BTreeSet<String> {
        self.schema.supported_operations()
    }

    /// Invoke `operation` with positional `args` (ids in template order, then the payload
    /// for operations that take a body, or a query object for GET).
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedOperation`] if no link is named `operation`
    /// - [`Error::Arity`] if fewer arguments than the link requires are given
    /// - [`Error::Serialization`] if an id or the payload cannot be encoded
    /// - [`Error::Deserialization`] if the response is not a JSON:API document
    /// - any transport error, unchanged
    pub async fn invoke(
        &self,
        operation: &str,
        args: &[Value],
        options: &InvokeOptions,
    ) -> Result<Value> {
        let result = self.dispatch(operation, args, options).await;
        if let Err(err) = &result {
            warn!(
                resource_type = %self.resource_type(),
                operation,
                code = err.error_code(),
                error = %err,
                "Operation failed"
            );
        }
        result
    }

    /// Invoke `operation` and deserialize the result into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`Repo::invoke`], plus [`Error::Deserialization`] if the result does not
    /// fit `T`.
    pub async fn invoke_as<T>(
        &self,
        operation: &str,
        args: &[Value],
        options: &InvokeOptions,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = self.invoke(operation, args, options).await?;
        serde_json::from_value(value).map_err(|err| {
            Error::Deserialization(format!(
                "`{}.{operation}` result does not match the requested type: {err}",
                self.resource_type()
            ))
        })
    }

    /// Invoke the collection operation (`instances` link).
    ///
    /// # Errors
    ///
    /// Same as [`Repo::invoke`].
    pub async fn all(&self, options: &InvokeOptions) -> Result<Value> {
        self.invoke("all", &[], options).await
    }

    /// Invoke the single-resource operation (`self` link) for `id`.
    ///
    /// # Errors
    ///
    /// Same as [`Repo::invoke`].
    pub async fn find(&self, id: impl fmt::Display, options: &InvokeOptions) -> Result<Value> {
        self.invoke("find", &[Value::String(id.to_string())], options)
            .await
    }

    async fn dispatch(
        &self,
        operation: &str,
        args: &[Value],
        options: &InvokeOptions,
    ) -> Result<Value> {
        let link = self.resolve(operation)?;

        let expected = link.required_args();
        if args.len() < expected {
            return Err(Error::Arity {
                resource_type: self.resource_type().to_string(),
                operation: operation.to_string(),
                given: args.len(),
                expected,
            });
        }

        let mut remaining = args.iter();
        let ids = link
            .placeholders()
            .iter()
            .zip(remaining.by_ref())
            .map(|(placeholder, arg)| self.id_argument(operation, placeholder.reference(), arg))
            .collect::<Result<Vec<_>>>()?;
        let path = link.expand(&ids);

        debug!(
            resource_type = %self.resource_type(),
            operation,
            method = %link.method(),
            path = %path,
            "Dispatching operation"
        );

        let response = match link.method() {
            method @ (HttpMethod::Post | HttpMethod::Put) => {
                let body = match link.request_schema() {
                    Some(request_schema) => {
                        let payload = remaining.next().unwrap_or(&Value::Null);
                        let intent = if method == HttpMethod::Put {
                            Intent::Update(ids.last().map(String::as_str))
                        } else {
                            Intent::Create
                        };
                        JsonApiSerializer::new(self.resource_type(), request_schema)
                            .serialize(payload, intent)?
                    }
                    None => Value::Object(Map::new()),
                };
                self.transport
                    .request(Request::new(method, path).with_body(body))
                    .await?
            }
            HttpMethod::Delete => self.transport.request(Request::delete(path)).await?,
            HttpMethod::Get => {
                let mut query = match remaining.next() {
                    Some(positional) => QueryParams::from_value(positional)?,
                    None => QueryParams::new(),
                };
                if let Some(extra) = &options.query {
                    query.merge(QueryParams::from_value(extra)?);
                }

                if options.all_pages && link.is_paginated() {
                    Paginator::new(self.transport.as_ref(), path, query)
                        .with_page_size(self.page_size)
                        .fetch_all()
                        .await?
                } else {
                    self.transport.request(Request::get(path, query)).await?
                }
            }
        };

        if options.deserialize_response {
            JsonApiDeserializer::new().deserialize(&response)
        } else {
            Ok(response)
        }
    }

    fn resolve(&self, operation: &str) -> Result<&LinkDescriptor> {
        self.schema
            .link(operation)
            .ok_or_else(|| Error::UnsupportedOperation {
                resource_type: self.resource_type().to_string(),
                operation: operation.to_string(),
                available: self.supported_operations().into_iter().collect(),
            })
    }

    fn id_argument(&self, operation: &str, reference: &str, arg: &Value) -> Result<String> {
        match arg {
            Value::String(id) => Ok(id.clone()),
            Value::Number(id) => Ok(id.to_string()),
            Value::Bool(flag) => Ok(flag.to_string()),
            other => Err(Error::Serialization(format!(
                "`{}.{operation}` expects an id for `{reference}`, got `{other}`",
                self.resource_type()
            ))),
        }
    }
}

impl fmt::Debug for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repo")
            .field("resource_type", &self.resource_type())
            .field("operations", &self.supported_operations())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}
