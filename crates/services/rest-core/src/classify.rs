//! Maps transport outcomes onto the [`ErrorKind`] taxonomy.
//!
//! The mapping is total: every [`RawResponse`] or [`TransportFailure`] yields
//! either [`Classification::Success`] (the body goes on to decoding) or
//! exactly one [`ClassifiedError`].

use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ClassifiedError, ErrorKind};
use crate::transport::{FailureReason, RawResponse, TransportFailure};

/// Longest retry-after hint honoured
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Longest body excerpt copied into error messages
const MAX_SNIPPET: usize = 400;

/// Result of classifying one transport outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// 2xx: the body should be decoded
    Success,
    /// Anything else
    Failure(ClassifiedError),
}

/// Classifies a transport outcome
#[must_use]
pub fn classify(outcome: &Result<RawResponse, TransportFailure>) -> Classification {
    match outcome {
        Ok(response) => classify_response(response),
        Err(failure) => Classification::Failure(classify_failure(failure)),
    }
}

/// Classifies a failed exchange
#[must_use]
pub fn classify_failure(failure: &TransportFailure) -> ClassifiedError {
    let kind = match failure.reason() {
        FailureReason::Timeout => ErrorKind::Timeout,
        FailureReason::Connection => ErrorKind::NetworkUnreachable,
        FailureReason::Unknown => ErrorKind::Unknown,
    };
    ClassifiedError::new(kind, failure.message())
}

/// Classifies a completed exchange by its status code
#[must_use]
pub fn classify_response(response: &RawResponse) -> Classification {
    let status = response.status();
    let Some(kind) = kind_for_status(status) else {
        return Classification::Success;
    };

    let retry_after = if kind == ErrorKind::RateLimited {
        parse_retry_after(response)
    } else {
        None
    };

    let error = ClassifiedError::new(kind, error_message(response))
        .with_status(status)
        .with_retry_after(retry_after);
    Classification::Failure(error)
}

/// Error kind for a status code, or `None` for 2xx
#[must_use]
pub const fn kind_for_status(status: u16) -> Option<ErrorKind> {
    match status {
        200..=299 => None,
        429 => Some(ErrorKind::RateLimited),
        400..=499 => Some(ErrorKind::ClientError),
        500..=599 => Some(ErrorKind::ServerError),
        _ => Some(ErrorKind::Unknown),
    }
}

/// Reads the server's retry hint
///
/// Checks `retry-after-ms` (milliseconds) first, then `retry-after` as
/// delta-seconds or an HTTP-date. Hints are capped at [`MAX_RETRY_AFTER`];
/// malformed or past values yield `None`.
#[must_use]
pub fn parse_retry_after(response: &RawResponse) -> Option<Duration> {
    if let Some(ms) = response
        .header("retry-after-ms")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_millis(ms).min(MAX_RETRY_AFTER));
    }

    let value = response.header("retry-after")?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER));
    }

    let at = httpdate::parse_http_date(value).ok()?;
    at.duration_since(SystemTime::now())
        .ok()
        .map(|d| d.min(MAX_RETRY_AFTER))
}

/// Decodes a 2xx body as JSON into `T`
///
/// A blank body decodes as `null`, so `()` and `Option<_>` accept
/// `204 No Content`.
///
/// # Errors
///
/// Returns a [`ErrorKind::DecodeError`] carrying the serde error and a body excerpt.
pub fn decode<T: DeserializeOwned>(response: &RawResponse) -> Result<T, ClassifiedError> {
    let body = response.body();
    let input: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &body[..]
    };
    serde_json::from_slice(input).map_err(|e| {
        ClassifiedError::new(
            ErrorKind::DecodeError,
            format!("failed to decode response body: {e}: {}", snippet(body)),
        )
        .with_status(response.status())
    })
}

fn error_message(response: &RawResponse) -> String {
    let status = response.status();
    let detail = body_detail(response.body()).or_else(|| {
        http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .map(str::to_owned)
    });
    match detail {
        Some(detail) => format!("HTTP {status}: {detail}"),
        None => format!("HTTP {status}"),
    }
}

/// Pulls a message out of common JSON error shapes, else a plain-text excerpt
fn body_detail(body: &[u8]) -> Option<String> {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        let found = value
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| value.pointer("/error/message").and_then(Value::as_str))
            .or_else(|| value.get("error").and_then(Value::as_str));
        if let Some(message) = found {
            return Some(message.to_owned());
        }
    }
    let text = snippet(body);
    (!text.is_empty()).then_some(text)
}

fn snippet(body: &[u8]) -> String {
    let end = body.len().min(MAX_SNIPPET);
    String::from_utf8_lossy(&body[..end]).trim().to_owned()
}
