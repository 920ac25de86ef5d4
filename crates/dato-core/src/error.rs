//! Error types for DatoCMS operations.
//!
//! This module provides the error type shared by every DatoCMS client crate. Dispatch
//! failures (unknown operations, missing arguments, payloads the schema rejects) live next
//! to the transport family, which the HTTP layer produces and everything above it
//! propagates untouched.

use thiserror::Error;

/// Main error type for DatoCMS operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The resource schema declares no link for the requested operation
    #[error(
        "`{resource_type}` does not support `{operation}` (available: {})",
        .available.join(", ")
    )]
    UnsupportedOperation {
        /// Resource type the call was made against
        resource_type: String,
        /// Requested operation name
        operation: String,
        /// Operation names the resource does support, sorted
        available: Vec<String>,
    },

    /// Too few positional arguments for the resolved link
    #[error(
        "wrong number of arguments for `{resource_type}.{operation}` (given {given}, expected {expected})"
    )]
    Arity {
        /// Resource type the call was made against
        resource_type: String,
        /// Requested operation name
        operation: String,
        /// Number of positional arguments supplied
        given: usize,
        /// Minimum number of positional arguments required
        expected: usize,
    },

    /// Payload could not be turned into a JSON:API request document
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Response body is not a valid JSON:API document
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Hyper-schema document is malformed
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Operation timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// API is unavailable or overloaded
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials missing or rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success response
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body returned by the API
        message: String,
    },

    /// Invalid endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Specialized result type for DatoCMS operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code, attached to failure logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            Self::Arity { .. } => "ARITY_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",
            Self::InvalidSchema(_) => "INVALID_SCHEMA",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::HttpError(_) => "HTTP_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Api { .. } => "API_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
        }
    }

    /// Returns true if a transport may re-send the request that produced this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::ServiceUnavailable(_) | Self::HttpError(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::ServiceUnavailable(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}
