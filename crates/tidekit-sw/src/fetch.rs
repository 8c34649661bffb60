//! Requests, responses, and the network transport seam.
//!
//! The core never performs network I/O itself; it goes through the
//! [`Fetcher`] trait, which a host backs with its real transport. Cache
//! keys are the normalized request URL: path plus query, fragment dropped.
//! Same-origin keying by path keeps runtime keys aligned with the
//! root-relative URLs a precache manifest carries.

use hashbrown::HashMap;
use thiserror::Error;
use tidekit_store::StoredResponse;
use url::Url;

/// Request destination type, as reported by the host's request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Style,
    Script,
    Worker,
    Image,
    Font,
    Document,
    Other,
}

/// An intercepted HTTP-like request. The core treats it as opaque beyond
/// method, URL, and destination.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method ("GET", "POST", ...).
    pub method: String,

    /// Request URL.
    pub url: Url,

    /// Destination type.
    pub destination: Destination,

    /// Request headers.
    pub headers: HashMap<String, String>,

    /// Request body.
    pub body: Vec<u8>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url, destination: Destination) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            destination,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST".to_string(),
            url,
            destination: Destination::Other,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Normalized cache key for this request: path plus query.
    pub fn cache_key(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// Whether this is a mutating (POST) request.
    pub fn is_mutating(&self) -> bool {
        self.method == "POST"
    }
}

/// Where a handled response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh from the network.
    Network,
    /// Served from a cache entry for this exact request.
    Cache,
    /// Served from the designated offline shell document.
    OfflineShell,
    /// The request was queued for background replay.
    Queued,
    /// An explicit failure response synthesized by the dispatcher.
    Error,
}

/// A response handed back to the host's request pipeline.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Where the response came from.
    pub source: ResponseSource,
}

impl Response {
    /// Create a network response.
    pub fn network(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    /// Rehydrate a response from a cache entry.
    pub fn from_stored(entry: &StoredResponse, source: ResponseSource) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            source,
        }
    }

    /// "Queued for retry" acknowledgement (202 Accepted).
    pub fn queued(entry_id: u64) -> Self {
        let mut headers = HashMap::new();
        headers.insert("x-tidekit-queued".to_string(), entry_id.to_string());
        Self {
            status: 202,
            headers,
            body: Vec::new(),
            source: ResponseSource::Queued,
        }
    }

    /// Explicit failure response (503 Service Unavailable).
    pub fn error(message: &str) -> Self {
        Self {
            status: 503,
            headers: HashMap::new(),
            body: message.as_bytes().to_vec(),
            source: ResponseSource::Error,
        }
    }

    /// Check if the status is a success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert into a cache entry.
    pub fn to_stored(&self, stored_at_ms: u64) -> StoredResponse {
        StoredResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            revision: None,
            stored_at_ms,
        }
    }
}

/// Transport-level fetch errors.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),
}

/// The network transport seam.
///
/// Implementations perform one fetch attempt and report non-success
/// statuses as [`FetchError::Status`]. Timeouts are owned by the caller,
/// which races the returned future against its own deadline.
#[allow(async_fn_in_trait)]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
