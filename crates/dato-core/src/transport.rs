//! Transport abstraction.
//!
//! Every client in the workspace issues its calls through [`Transport`]. The contract is
//! deliberately narrow: a method, a path relative to the API root, optional query
//! parameters and an optional JSON body go in, a parsed JSON body comes out. Headers,
//! credentials, retries and status translation stay inside the implementation.

use crate::error::{Error, Result};
use crate::query::QueryParams;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP methods a hyper-schema link may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a transport may re-send this method after a transient failure.
    ///
    /// POST and PUT are sent once: a lost response may still have applied the write.
    #[must_use]
    pub const fn is_retry_safe(self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::InvalidSchema(format!("unsupported HTTP method `{s}`"))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the API root (leading slash optional)
    pub path: String,
    /// Query string parameters
    pub query: QueryParams,
    /// JSON body
    pub body: Option<Value>,
}

impl Request {
    /// Create a request without query or body.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: QueryParams::new(),
            body: None,
        }
    }

    /// GET with query parameters.
    #[must_use]
    pub fn get(path: impl Into<String>, query: QueryParams) -> Self {
        Self::new(HttpMethod::Get, path).with_query(query)
    }

    /// POST with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    /// PUT with a JSON body.
    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    /// DELETE.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Replace the query parameters.
    #[must_use]
    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// The request/response seam between clients and the network.
///
/// Implementations return the parsed response body, or `Value::Null` when the response
/// has none. Errors must come from the transport family of [`Error`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request and return the parsed JSON response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API answers with a non-success status.
    async fn request(&self, request: Request) -> Result<Value>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn request(&self, request: Request) -> Result<Value> {
        (**self).request(request).await
    }
}
