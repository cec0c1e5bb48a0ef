use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Closed taxonomy of failure kinds a call can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request could not be built (bad verb, empty path, bad header, ...)
    InvalidRequest,
    /// The endpoint could not be reached (DNS, connection refused, reset)
    NetworkUnreachable,
    /// No response arrived within the request timeout
    Timeout,
    /// The endpoint answered with a 4xx status other than 429
    ClientError,
    /// The endpoint answered with a 5xx status
    ServerError,
    /// The endpoint answered with 429 Too Many Requests
    RateLimited,
    /// A 2xx body could not be decoded into the expected type
    DecodeError,
    /// Anything the classifier has no better bucket for
    Unknown,
    /// The caller cancelled the operation
    Cancelled,
}

impl ErrorKind {
    /// Whether failures of this kind are transient and worth retrying
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::NetworkUnreachable | Self::ServerError | Self::RateLimited
        )
    }

    /// Stable snake-case name, suitable for logs and metrics labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::NetworkUnreachable => "network_unreachable",
            Self::Timeout => "timeout",
            Self::ClientError => "client_error",
            Self::ServerError => "server_error",
            Self::RateLimited => "rate_limited",
            Self::DecodeError => "decode_error",
            Self::Unknown => "unknown",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reduced to exactly one [`ErrorKind`] plus diagnostic detail
///
/// Carries enough context (kind, message, status, retry hint, attempt count)
/// for a caller to log or display a diagnosis without knowing how the retry
/// loop ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    retry_after: Option<Duration>,
    attempts: u32,
}

impl ClassifiedError {
    /// Creates an error of the given kind
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
            attempts: 0,
        }
    }

    /// Shorthand for an [`ErrorKind::InvalidRequest`] error
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Shorthand for an [`ErrorKind::Cancelled`] error after `attempts` transport calls
    #[must_use]
    pub fn cancelled(attempts: u32) -> Self {
        Self::new(ErrorKind::Cancelled, "request cancelled by caller").with_attempts(attempts)
    }

    /// Attaches the HTTP status code that produced this error
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches a server-provided retry-after hint
    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Records how many transport invocations were made before giving up
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// The classified kind
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable description
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status code, when the failure came from a response
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Server-provided retry-after hint, when present
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Number of transport invocations made for the call
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the retry policy may recover this error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_transient()
    }
}
