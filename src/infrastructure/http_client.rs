//! HTTP client for catalog fetching
//!
//! This module provides the transport seam used by the item fetcher and its
//! reqwest-backed implementation. The client never follows redirects (a
//! redirect is a signal the fetcher has to see) and classifies transport
//! failures so the fetcher can map them onto the error taxonomy.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::config::{ApiConfig, ExtraHeader};

/// Transport-level failure, before any HTTP status was received
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("server disconnected: {0}")]
    ServerDisconnected(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("client error: {0}")]
    Client(String),
}

/// One GET request as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Minimal response view the fetcher works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogResponse {
    pub status: u16,
    pub content_type: String,
    pub location: Option<String>,
    /// Empty for non-2xx responses; the body is only read on success
    pub body: String,
}

impl CatalogResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("application/json")
    }

    /// Canonical reason phrase for the status, e.g. "Service Unavailable"
    pub fn reason(&self) -> String {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
            .to_string()
    }
}

/// Transport used by the item fetcher
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    async fn get(&self, request: &CatalogRequest) -> Result<CatalogResponse, TransportError>;
}

/// Opens one transport (and its connection pool) per batch
pub trait TransportFactory: Send + Sync {
    fn open(&self, pool_size: usize) -> Result<Arc<dyn CatalogTransport>, TransportError>;
}

/// Rotating request header set
#[derive(Debug, Clone)]
pub struct HeaderProfile {
    user_agents: Vec<String>,
    accept: String,
    accept_language: String,
    referer: String,
    extra: Option<ExtraHeader>,
}

impl HeaderProfile {
    pub fn from_api_config(api: &ApiConfig) -> Self {
        Self {
            user_agents: api
                .user_agents
                .iter()
                .filter(|ua| !ua.trim().is_empty())
                .cloned()
                .collect(),
            accept: api.accept.clone(),
            accept_language: api.accept_language.clone(),
            referer: api.referer.clone(),
            extra: api.extra_header.clone(),
        }
    }

    /// Headers for one request, with a User-Agent picked at random from the pool
    pub fn pick(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(5);
        if !self.user_agents.is_empty() {
            let ua = &self.user_agents[fastrand::usize(..self.user_agents.len())];
            headers.push(("User-Agent".to_string(), ua.clone()));
        }
        headers.push(("Accept".to_string(), self.accept.clone()));
        headers.push(("Accept-Language".to_string(), self.accept_language.clone()));
        headers.push(("Referer".to_string(), self.referer.clone()));
        if let Some(extra) = &self.extra {
            headers.push((extra.name.clone(), extra.value.clone()));
        }
        headers
    }
}

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout covering connect, send and body read
    pub timeout: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
}

/// reqwest-backed catalog transport
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn with_config(config: &HttpClientConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Client(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Client(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Client(format!("invalid header value for '{name}': {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl CatalogTransport for HttpClient {
    async fn get(&self, request: &CatalogRequest) -> Result<CatalogResponse, TransportError> {
        debug!("🌐 HTTP GET: {}", request.url);

        let response = self
            .client
            .get(&request.url)
            .headers(Self::header_map(&request.headers)?)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let header_text = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header_text(CONTENT_TYPE).unwrap_or_default();
        let location = header_text(LOCATION);

        let body = if response.status().is_success() {
            response.text().await.map_err(classify_reqwest_error)?
        } else {
            String::new()
        };

        Ok(CatalogResponse {
            status,
            content_type,
            location,
            body,
        })
    }
}

/// Builds an [`HttpClient`] per batch so its pool is dropped with the batch
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
}

impl HttpClientFactory {
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl TransportFactory for HttpClientFactory {
    fn open(&self, pool_size: usize) -> Result<Arc<dyn CatalogTransport>, TransportError> {
        let config = HttpClientConfig {
            timeout: self.timeout,
            pool_max_idle_per_host: pool_size,
        };
        info!("🔌 Opening HTTP client (pool {} per host, timeout {:?})", pool_size, self.timeout);
        Ok(Arc::new(HttpClient::with_config(&config)?))
    }
}

/// Map a reqwest error onto the transport taxonomy
pub fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout;
    }

    let chain = error_chain_text(&error);

    if looks_disconnected(&error, &chain) {
        return TransportError::ServerDisconnected(chain);
    }

    if error.is_connect() || has_io_kind(&error, is_connection_io_kind) {
        return TransportError::Connection(chain);
    }

    TransportError::Client(format!("{error:?}"))
}

fn error_chain_text(error: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

fn looks_disconnected(error: &reqwest::Error, chain: &str) -> bool {
    let lowered = chain.to_lowercase();
    lowered.contains("connection closed before message completed")
        || lowered.contains("incomplete message")
        || has_io_kind(error, |kind| kind == std::io::ErrorKind::UnexpectedEof)
}

fn is_connection_io_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

fn has_io_kind(error: &(dyn StdError + 'static), predicate: impl Fn(std::io::ErrorKind) -> bool) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if predicate(io.kind()) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
