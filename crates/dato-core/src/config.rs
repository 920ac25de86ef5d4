//! Configuration structures for DatoCMS clients.
//!
//! This module provides the configuration used to build transports for the DatoCMS
//! APIs, including credentials, request defaults and validation.

use crate::client::DEFAULT_PAGE_SIZE;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Public Site API endpoint.
pub const DEFAULT_SITE_API_URL: &str = "https://site-api.datocms.com";

/// Configuration for a DatoCMS client instance.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct DatoClientConfig {
    /// API base URL
    #[validate(url)]
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API token sent as a bearer credential
    #[serde(default, skip_serializing)]
    pub api_token: Option<String>,

    /// Value of the `X-Api-Version` header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of retry attempts
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Records requested per page when fetching every page of a collection
    #[validate(range(min = 1, max = 500))]
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Additional headers sent with every request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_headers: BTreeMap<String, String>,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,
}

fn default_base_url() -> String {
    DEFAULT_SITE_API_URL.to_string()
}

fn default_api_version() -> String {
    "3".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

const fn default_tls_verify() -> bool {
    true
}

impl DatoClientConfig {
    /// Create a new client configuration for the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            base_url: base_url.into(),
            ..Self::default()
        };

        config
            .validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;

        Ok(config)
    }

    /// Set the API token.
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Set the `X-Api-Version` header value.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set maximum retry attempts.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the page size used when fetching all pages.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse the base URL.
    ///
    /// A trailing slash is appended when missing so that relative paths join below it.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn parse_base_url(&self) -> Result<Url, Error> {
        let mut raw = self.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| Error::ConfigError(format!("Invalid base URL: {e}")))
    }
}

impl Default for DatoClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
            extra_headers: BTreeMap::new(),
            tls_verify: default_tls_verify(),
        }
    }
}

impl fmt::Debug for DatoClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatoClientConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_version", &self.api_version)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("page_size", &self.page_size)
            .field("extra_headers", &self.extra_headers)
            .field("tls_verify", &self.tls_verify)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = DatoClientConfig::new("https://site-api.example.com").unwrap();
        assert_eq!(config.base_url, "https://site-api.example.com");
        assert!(config.api_token.is_none());
        assert_eq!(config.api_version, "3");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.tls_verify);
    }

    #[test]
    fn test_config_invalid_url() {
        let result = DatoClientConfig::new("not a url");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_config_builder() {
        let config = DatoClientConfig::new("https://site-api.example.com")
            .unwrap()
            .with_api_token("secret")
            .with_api_version("2")
            .with_timeout(60)
            .with_max_retries(5)
            .with_page_size(25)
            .with_header("X-Reason", "dump")
            .with_tls_verify(false);

        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.api_version, "2");
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.page_size, 25);
        assert_eq!(
            config.extra_headers.get("X-Reason").map(String::as_str),
            Some("dump")
        );
        assert!(!config.tls_verify);
    }

    #[test]
    fn test_parse_base_url_appends_slash() {
        let config = DatoClientConfig::new("https://example.com/api").unwrap();
        let url = config.parse_base_url().unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/");
        assert_eq!(
            url.join("items").unwrap().as_str(),
            "https://example.com/api/items"
        );
    }

    #[test]
    fn test_config_serialization_skips_token() {
        let config = DatoClientConfig::default().with_api_token("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("extra_headers"));
    }

    #[test]
    fn test_config_deserialization_defaults() {
        let config: DatoClientConfig =
            serde_json::from_str(r#"{"api_token": "abc", "page_size": 10}"#).unwrap();
        assert_eq!(config.base_url, DEFAULT_SITE_API_URL);
        assert_eq!(config.api_token.as_deref(), Some("abc"));
        assert_eq!(config.page_size, 10);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = DatoClientConfig::default().with_api_token("super-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_config_validation_ranges() {
        let config = DatoClientConfig::default().with_timeout(0);
        assert!(config.validate().is_err());

        let config = DatoClientConfig::default().with_max_retries(11);
        assert!(config.validate().is_err());

        let config = DatoClientConfig::default().with_page_size(0);
        assert!(config.validate().is_err());

        assert!(DatoClientConfig::default().validate().is_ok());
    }
}
