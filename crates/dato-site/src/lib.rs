//! Schema-driven client for the DatoCMS Site API.
//!
//! Operations are not hand-written: the API's hyper-schema is parsed into per-resource
//! link tables and every call is dispatched by name at runtime. Request payloads are
//! wrapped into JSON:API documents and responses are flattened back into plain objects.

#![deny(missing_docs)]

pub mod client;
pub mod deserializer;
pub mod paginator;
pub mod repo;
pub mod schema;
pub mod serializer;

pub use client::{HttpTransport, HttpTransportBuilder, SiteClient};
pub use deserializer::JsonApiDeserializer;
pub use paginator::Paginator;
pub use repo::{InvokeOptions, Repo};
pub use schema::{HyperSchema, LinkDescriptor, ResourceSchema};
pub use serializer::{Intent, JsonApiSerializer};

/// Convenient result alias that reuses the shared DatoCMS error type.
pub type Result<T> = dato_core::Result<T>;
