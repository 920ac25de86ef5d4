//! HTTP transport for the Site API and the schema-bound client facade.

use crate::repo::Repo;
use crate::schema::HyperSchema;
use crate::Result;
use async_trait::async_trait;
use dato_core::client::{ClientConfig, RetryPolicy};
use dato_core::config::DatoClientConfig;
use dato_core::query::QueryParams;
use dato_core::{Error, HttpMethod, Request, Transport};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

const USER_AGENT: &str = concat!("dato-site/", env!("CARGO_PKG_VERSION"));
const JSON_API_MEDIA_TYPE: &str = "application/json";

/// Path of the hyper-schema document, relative to the API root.
pub const HYPERSCHEMA_PATH: &str = "docs/site-api-hyperschema.json";

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    config: DatoClientConfig,
    http_config: ClientConfig,
}

impl HttpTransportBuilder {
    /// Create a new builder from a [`DatoClientConfig`].
    #[must_use]
    pub fn new(config: DatoClientConfig) -> Self {
        Self {
            config,
            http_config: ClientConfig::new(),
        }
    }

    /// Override the HTTP client configuration used when building the transport.
    #[must_use]
    pub fn with_http_config(mut self, http_config: ClientConfig) -> Self {
        self.http_config = http_config;
        self
    }

    /// Finalise the builder and create the [`HttpTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the base URL, the API version or an extra header
    /// is invalid, or the HTTP client cannot be built.
    ///
    /// The request timeout comes from [`DatoClientConfig::timeout`] and the retry count
    /// from `max_retries`; the HTTP config supplies backoff, pooling and logging.
    pub fn build(self) -> Result<HttpTransport> {
        let base_url = self.config.parse_base_url()?;
        let default_headers = self.default_headers()?;

        let http_config = self.http_config;
        let retry_policy = http_config
            .retry_policy
            .with_max_retries(self.config.max_retries);

        let mut builder = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .default_headers(default_headers)
            .timeout(self.config.timeout())
            .pool_idle_timeout(http_config.pool_idle_timeout)
            .pool_max_idle_per_host(http_config.pool_max_idle_per_host)
            .connect_timeout(Duration::from_secs(10));

        if !self.config.tls_verify {
            warn!("TLS verification disabled for Site API transport");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|err| {
            Error::ConfigError(format!("Failed to build Site API HTTP client: {err}"))
        })?;

        Ok(HttpTransport {
            http,
            base_url,
            api_token: self.config.api_token.map(SecretString::from),
            retry_policy,
            enable_logging: http_config.enable_logging,
        })
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_API_MEDIA_TYPE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_API_MEDIA_TYPE));
        headers.insert(
            "x-api-version",
            header_value("X-Api-Version", &self.config.api_version)?,
        );

        for (name, value) in &self.config.extra_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                Error::ConfigError(format!("Invalid header name `{name}`: {err}"))
            })?;
            headers.insert(header_name, header_value(name, value)?);
        }

        Ok(headers)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| Error::ConfigError(format!("Invalid value for header `{name}`: {err}")))
}

/// [`Transport`] over HTTPS with bearer authentication.
///
/// GET and DELETE requests are re-sent on transient failures; POST and PUT are sent once.
pub struct HttpTransport {
    http: Client,
    base_url: Url,
    api_token: Option<SecretString>,
    retry_policy: RetryPolicy,
    enable_logging: bool,
}

impl HttpTransport {
    /// Construct a transport directly from the configuration.
    ///
    /// # Errors
    ///
    /// See [`HttpTransportBuilder::build`].
    pub fn from_config(config: &DatoClientConfig) -> Result<Self> {
        HttpTransportBuilder::new(config.clone()).build()
    }

    /// Start a builder pre-populated with the provided configuration.
    #[must_use]
    pub fn builder(config: DatoClientConfig) -> HttpTransportBuilder {
        HttpTransportBuilder::new(config)
    }

    /// API root every request path is joined onto.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| {
                Error::InvalidEndpoint(format!("Invalid Site API path `{path}`: {err}"))
            })
    }

    async fn send_once(&self, request: &Request, url: &Url) -> Result<Value> {
        let mut builder = self
            .http
            .request(to_method(request.method), url.clone())
            .query(request.query.pairs());

        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status_to_error(status, message));
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|err| {
            Error::Deserialization(format!(
                "Failed to parse Site API response for `{}`: {err}",
                request.path
            ))
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: Request) -> Result<Value> {
        let url = self.build_url(&request.path)?;
        let mut attempt = 0;

        loop {
            if self.enable_logging {
                debug!(
                    method = %request.method,
                    path = %request.path,
                    query = ?request.query.pairs(),
                    attempt,
                    "Sending Site API request"
                );
            }

            let error = match self.send_once(&request, &url).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && request.method.is_retry_safe() => err,
                Err(err) => return Err(err),
            };

            attempt += 1;
            if attempt > self.retry_policy.max_retries {
                return Err(error);
            }

            let delay = self.retry_policy.delay_for_attempt(attempt);
            warn!(
                method = %request.method,
                path = %request.path,
                attempt,
                ?delay,
                error = %error,
                "Retrying Site API request"
            );
            if delay > Duration::ZERO {
                sleep(delay).await;
            }
        }
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn map_status_to_error(status: StatusCode, text: String) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(text),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Unauthorized(format!("Site API rejected the credentials: {text}"))
        }
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => {
            Error::ServiceUnavailable(format!("Site API temporarily unavailable: {text}"))
        }
        status if status.is_server_error() => {
            Error::ServiceUnavailable(format!("Site API server error {status}: {text}"))
        }
        status => Error::Api {
            status: status.as_u16(),
            message: text,
        },
    }
}

/// Site API client bound to a parsed hyper-schema.
///
/// Hands out one [`Repo`] per namespace; every repo shares the same transport.
#[derive(Clone)]
pub struct SiteClient {
    transport: Arc<dyn Transport>,
    schema: Arc<HyperSchema>,
    page_size: usize,
}

impl SiteClient {
    /// Create a client from an existing transport and schema.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, schema: HyperSchema) -> Self {
        Self {
            transport,
            schema: Arc::new(schema),
            page_size: dato_core::client::DEFAULT_PAGE_SIZE,
        }
    }

    /// Fetch the hyper-schema through `transport` and bind a client to it.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the download fails, or [`Error::InvalidSchema`] if
    /// the document cannot be parsed.
    pub async fn load(transport: Arc<dyn Transport>) -> Result<Self> {
        let document = transport
            .request(Request::get(HYPERSCHEMA_PATH, QueryParams::new()))
            .await?;
        let schema = HyperSchema::from_value(&document)?;
        info!(
            resources = schema.resource_types().count(),
            "Loaded Site API hyper-schema"
        );
        Ok(Self::new(transport, schema))
    }

    /// Build an [`HttpTransport`] from `config`, then fetch the hyper-schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for an invalid configuration, otherwise as
    /// [`SiteClient::load`].
    pub async fn connect(config: &DatoClientConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        info!(base_url = %transport.base_url(), "Connecting to Site API");
        Ok(Self::load(Arc::new(transport))
            .await?
            .with_page_size(config.page_size))
    }

    /// Override the page size used by repos when fetching every page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Repo for the resource exposed under `namespace` (`items`, `item_types`, `site`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no resource uses that namespace.
    pub fn repo(&self, namespace: &str) -> Result<Repo> {
        let schema = self
            .schema
            .resource_for_namespace(namespace)
            .ok_or_else(|| Error::NotFound(format!("no Site API namespace `{namespace}`")))?;
        Ok(Repo::new(Arc::clone(&self.transport), schema).with_page_size(self.page_size))
    }

    /// Namespaces, sorted.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.schema.namespaces()
    }

    /// The parsed hyper-schema.
    #[must_use]
    pub fn schema(&self) -> &HyperSchema {
        &self.schema
    }

    /// Issue a raw request through the shared transport.
    ///
    /// # Errors
    ///
    /// Returns the transport error unchanged.
    pub async fn request(&self, request: Request) -> Result<Value> {
        self.transport.request(request).await
    }
}

impl fmt::Debug for SiteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteClient")
            .field("namespaces", &self.namespaces().collect::<Vec<_>>())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_transport(server: &MockServer) -> HttpTransport {
        let config = DatoClientConfig::new(server.uri())
            .unwrap()
            .with_api_token("secret-token")
            .with_header("X-Environment", "sandbox");
        let policy = RetryPolicy::new().with_initial_delay(Duration::ZERO);
        HttpTransportBuilder::new(config)
            .with_http_config(ClientConfig::new().with_retry_policy(policy))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn sends_auth_and_default_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site"))
            .and(header("authorization", "Bearer secret-token"))
            .and(header("accept", "application/json"))
            .and(header("x-api-version", "3"))
            .and(header("x-environment", "sandbox"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"type": "site", "id": "1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = test_transport(&server)
            .request(Request::get("/site", QueryParams::new()))
            .await
            .unwrap();
        assert_eq!(body["data"]["id"], json!("1"));
    }

    #[tokio::test]
    async fn sends_flattened_query_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("filter[type]", "article"))
            .and(query_param("page[limit]", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(body_json(json!({"data": {"type": "item"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": {"type": "item", "id": "2"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = test_transport(&server);
        let query = QueryParams::from_value(&json!({
            "filter": {"type": "article"},
            "page": {"limit": 10}
        }))
        .unwrap();
        transport.request(Request::get("items", query)).await.unwrap();

        let created = transport
            .request(Request::post("/items", json!({"data": {"type": "item"}})))
            .await
            .unwrap();
        assert_eq!(created["data"]["id"], json!("2"));
    }

    #[tokio::test]
    async fn maps_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/404"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items/401"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/items/422"))
            .respond_with(ResponseTemplate::new(422).set_body_string("INVALID_FIELD"))
            .mount(&server)
            .await;

        let transport = test_transport(&server);

        let err = transport
            .request(Request::get("/items/404", QueryParams::new()))
            .await
            .unwrap_err();
        assert_eq!(err, Error::NotFound("missing".to_string()));

        let err = transport
            .request(Request::get("/items/401", QueryParams::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let err = transport
            .request(Request::put("/items/422", json!({})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::Api {
                status: 422,
                message: "INVALID_FIELD".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn retries_unavailable_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/site"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
            .expect(1)
            .mount(&server)
            .await;

        let body = test_transport(&server)
            .request(Request::get("/site", QueryParams::new()))
            .await
            .unwrap();
        assert_eq!(body, json!({"data": null}));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site"))
            .respond_with(ResponseTemplate::new(502).set_body_string("gateway"))
            .expect(4)
            .mount(&server)
            .await;

        let err = test_transport(&server)
            .request(Request::get("/site", QueryParams::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn writes_are_sent_once_on_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/items/1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = test_transport(&server);
        let err = transport
            .request(Request::post("/items", json!({"data": {"type": "item"}})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));

        let err = transport
            .request(Request::put("/items/1", json!({"data": {"type": "item"}})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn deletes_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/items/1"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/items/1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let body = test_transport(&server)
            .request(Request::delete("/items/1"))
            .await
            .unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/items/1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_transport(&server)
            .request(Request::delete("/items/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/items/1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let body = test_transport(&server)
            .request(Request::delete("/items/1"))
            .await
            .unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn malformed_body_is_deserialization_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = test_transport(&server)
            .request(Request::get("/site", QueryParams::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn rejects_invalid_extra_headers() {
        let config = DatoClientConfig::default().with_header("bad header", "x");
        let err = HttpTransport::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn debug_redacts_token() {
        let config = DatoClientConfig::default().with_api_token("super-secret");
        let transport = HttpTransport::from_config(&config).unwrap();
        let rendered = format!("{transport:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn unknown_namespace_is_not_found() {
        let schema: HyperSchema = r#"{"definitions": {"site": {"links": [
            {"rel": "self", "href": "/site", "method": "GET"}
        ]}}}"#
            .parse()
            .unwrap();
        let server = MockServer::start().await;
        let client = SiteClient::new(Arc::new(test_transport(&server)), schema);

        assert_eq!(client.namespaces().collect::<Vec<_>>(), vec!["site"]);
        assert!(client.repo("site").is_ok());
        let err = client.repo("uploads").unwrap_err();
        assert!(matches!(err, Error::NotFound(message) if message.contains("uploads")));
    }
}
