use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderName, HeaderValue};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::error::ClassifiedError;

const CONTENT_TYPE_JSON: &str = "application/json";

/// HTTP verbs the client core accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Every accepted verb
    pub const ALL: [Self; 5] = [Self::Get, Self::Post, Self::Put, Self::Patch, Self::Delete];

    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Parses a verb case-insensitively
    ///
    /// # Errors
    ///
    /// Returns an `InvalidRequest` error for any verb outside [`Method::ALL`].
    pub fn parse(raw: &str) -> Result<Self, ClassifiedError> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                ClassifiedError::invalid_request(format!("unsupported HTTP method: {trimmed:?}"))
            })
    }
}

impl FromStr for Method {
    type Err = ClassifiedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Per-call overrides merged over the client configuration
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    body_error: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// Empty options: every value comes from the client configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a query parameter
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a header, replacing a default header of the same name
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets an opaque request body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self.body_error = None;
        self
    }

    /// Serializes `body` as JSON and sets `content-type: application/json`
    ///
    /// An encoding failure is reported as `InvalidRequest` when the request
    /// is built.
    #[must_use]
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_vec(body) {
            Ok(encoded) => {
                self.body = Some(Bytes::from(encoded));
                self.body_error = None;
            }
            Err(e) => {
                self.body = None;
                self.body_error = Some(e.to_string());
            }
        }
        if !self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            self.headers
                .push(("content-type".into(), CONTENT_TYPE_JSON.into()));
        }
        self
    }

    /// Overrides the configured timeout for this call
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the configured retry bound for this call
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Attaches a token that aborts the call when cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The cancellation token, if one was attached
    #[must_use]
    pub const fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }
}

/// Immutable description of exactly one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    url: Url,
    query: Vec<(String, String)>,
    headers: BTreeMap<String, String>,
    body: Option<Bytes>,
    timeout: Duration,
    max_retries: u32,
}

impl RequestDescriptor {
    /// Assembles a descriptor from the configuration, a verb, a relative path
    /// and per-call overrides.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidRequest` error when the verb is not accepted, the
    /// path is empty, the resulting URL does not parse, a header is not a
    /// legal HTTP header, the timeout is zero, or the JSON body failed to
    /// encode.
    pub fn build<C: Config + ?Sized>(
        config: &C,
        method: &str,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Self, ClassifiedError> {
        let method = Method::parse(method)?;

        if path.trim().is_empty() {
            return Err(ClassifiedError::invalid_request(
                "request path must not be empty",
            ));
        }

        let raw_url = config.url(path);
        let url = Url::parse(&raw_url).map_err(|e| {
            ClassifiedError::invalid_request(format!("invalid request URL {raw_url:?}: {e}"))
        })?;

        let mut headers = BTreeMap::new();
        let defaults = config.headers()?;
        let overrides = options
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()));
        for (name, value) in defaults
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .chain(overrides)
        {
            let (name, value) = validate_header(name, value)?;
            headers.insert(name, value);
        }

        let query = config
            .query()
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .chain(options.query.iter().cloned())
            .collect();

        if let Some(reason) = &options.body_error {
            return Err(ClassifiedError::invalid_request(format!(
                "failed to encode JSON body: {reason}"
            )));
        }

        let timeout = options.timeout.unwrap_or_else(|| config.timeout());
        if timeout.is_zero() {
            return Err(ClassifiedError::invalid_request(
                "request timeout must be greater than zero",
            ));
        }

        Ok(Self {
            method,
            path: path.to_owned(),
            url,
            query,
            headers,
            body: options.body.clone(),
            timeout,
            max_retries: options.max_retries.unwrap_or_else(|| config.max_retries()),
        })
    }

    /// The verb
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The relative path as supplied by the caller
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Absolute URL (base address joined with the path), without query
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Query parameters in the order they were supplied
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Headers keyed by lower-case name
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

    /// Request body, if any
    #[must_use]
    pub const fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Upper bound for a single transport exchange
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retries allowed after the first attempt
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

fn validate_header(name: &str, value: &str) -> Result<(String, String), ClassifiedError> {
    let header = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| ClassifiedError::invalid_request(format!("invalid header name {name:?}")))?;
    // never echo the value
    HeaderValue::from_str(value).map_err(|_| {
        ClassifiedError::invalid_request(format!("invalid value for header {}", header.as_str()))
    })?;
    Ok((header.as_str().to_owned(), value.to_owned()))
}
