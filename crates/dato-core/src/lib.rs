//! # dato-core
//!
//! Core types and utilities for working with the DatoCMS APIs.
//!
//! This crate provides the error taxonomy, client configuration, HTTP tuning and the
//! transport abstraction shared by the schema-driven clients.
//!
//! ## Modules
//!
//! - [`error`] - Error types and HTTP status code mapping
//! - [`config`] - Configuration structures for DatoCMS clients
//! - [`client`] - HTTP client tuning and retry policy
//! - [`query`] - JSON:API style query-string flattening
//! - [`transport`] - The request/response seam every client talks through

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod transport;

// Re-export commonly used types
pub use error::{Error, Result};
pub use transport::{HttpMethod, Request, Transport};
