use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::request::RequestDescriptor;

/// Status, headers and body of one completed exchange
///
/// Produced by a [`Transport`]; the client classifies and decodes it and
/// never hands it to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

impl RawResponse {
    /// A response with the given status, no headers and an empty body
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header (names are stored lower-case)
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Replaces the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// HTTP status code
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers keyed by lower-case name
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Looks up a header case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Raw body bytes
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Why a transport exchange produced no response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Nothing arrived within the descriptor's timeout
    Timeout,
    /// The endpoint could not be reached
    Connection,
    /// Any other transport-level failure
    Unknown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Unknown => "unknown",
        })
    }
}

/// A transport exchange that failed before a response was received
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport {reason} failure: {message}")]
pub struct TransportFailure {
    reason: FailureReason,
    message: String,
}

impl TransportFailure {
    /// Creates a failure with an explicit reason
    #[must_use]
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// The exchange exceeded its timeout
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Timeout, message)
    }

    /// The endpoint could not be reached
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Connection, message)
    }

    /// Any other failure
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Unknown, message)
    }

    /// Failure reason
    #[must_use]
    pub const fn reason(&self) -> FailureReason {
        self.reason
    }

    /// Human-readable description
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Performs exactly one network exchange for a descriptor
///
/// Implementations must give up with [`FailureReason::Timeout`] once
/// [`RequestDescriptor::timeout`] elapses, and must be safe to call
/// concurrently. The token is cancelled when the caller abandons the call;
/// implementations should stop promptly when it fires.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Executes the request described by `descriptor`
    async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportFailure>;
}

/// [`Transport`] backed by a [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    /// Creates a transport with a 5 second connect timeout
    ///
    /// The per-request timeout comes from each descriptor.
    ///
    /// # Panics
    ///
    /// Panics if the reqwest client cannot be built.
    #[must_use]
    pub fn new() -> Self {
        Self::with_http_client(
            reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .build()
                .expect("reqwest client"),
        )
    }

    /// Wraps an existing reqwest client (proxies, TLS settings, pooling)
    #[must_use]
    pub const fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn exchange(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<RawResponse, TransportFailure> {
        let mut request = self
            .http
            .request(descriptor.method().into(), descriptor.url().clone())
            .query(descriptor.query())
            .timeout(descriptor.timeout());
        for (name, value) in descriptor.headers() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = descriptor.body() {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_owned())
                    .or_insert_with(|| value.to_owned());
            }
        }
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        trace!(status, bytes = body.len(), "received response");
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportFailure> {
        let timeout = descriptor.timeout();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportFailure::unknown("request cancelled")),
            outcome = tokio::time::timeout(timeout, self.exchange(descriptor)) => {
                outcome.unwrap_or_else(|_| {
                    Err(TransportFailure::timeout(format!(
                        "no response within {}ms",
                        timeout.as_millis()
                    )))
                })
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        TransportFailure::timeout(e.to_string())
    } else if e.is_connect() {
        TransportFailure::connection(e.to_string())
    } else {
        TransportFailure::unknown(e.to_string())
    }
}
