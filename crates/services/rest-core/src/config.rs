use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ClassifiedError;
use crate::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, RetryPolicy};

/// Default base address
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Environment variable for the base address
pub const ENV_BASE_URL: &str = "REST_CORE_BASE_URL";
/// Environment variable for the bearer token
pub const ENV_API_TOKEN: &str = "REST_CORE_API_TOKEN";
/// Environment variable for the default timeout, in milliseconds
pub const ENV_TIMEOUT_MS: &str = "REST_CORE_TIMEOUT_MS";
/// Environment variable for the default retry bound
pub const ENV_MAX_RETRIES: &str = "REST_CORE_MAX_RETRIES";
/// Environment variable for the backoff base delay, in milliseconds
pub const ENV_BACKOFF_BASE_MS: &str = "REST_CORE_BACKOFF_BASE_MS";
/// Environment variable for the backoff cap, in milliseconds
pub const ENV_BACKOFF_MAX_MS: &str = "REST_CORE_BACKOFF_MAX_MS";

const HDR_AUTHORIZATION: &str = "authorization";

/// Configuration for the client core
///
/// Debug output automatically redacts the bearer token via [`SecretString`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    base_url: String,
    headers: BTreeMap<String, String>,
    bearer_token: Option<SecretString>,
    timeout: Duration,
    max_retries: u32,
    retry_policy: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let base_url = env_trimmed(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let bearer_token = env_trimmed(ENV_API_TOKEN).map(SecretString::from);
        let timeout = env_parsed::<u64>(ENV_TIMEOUT_MS)
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_TIMEOUT, Duration::from_millis);
        let max_retries = env_parsed(ENV_MAX_RETRIES).unwrap_or(DEFAULT_MAX_RETRIES);
        let base_delay =
            env_parsed(ENV_BACKOFF_BASE_MS).map_or(DEFAULT_BASE_DELAY, Duration::from_millis);
        let max_delay =
            env_parsed(ENV_BACKOFF_MAX_MS).map_or(DEFAULT_MAX_DELAY, Duration::from_millis);

        Self {
            base_url,
            headers: BTreeMap::new(),
            bearer_token,
            timeout,
            max_retries,
            retry_policy: RetryPolicy::new(base_delay, max_delay),
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration with default settings
    ///
    /// Attempts to read from environment variables:
    /// - `REST_CORE_BASE_URL` for the base address (defaults to `http://localhost:8080`)
    /// - `REST_CORE_API_TOKEN` for an optional bearer token
    /// - `REST_CORE_TIMEOUT_MS` for the default timeout (defaults to 10000)
    /// - `REST_CORE_MAX_RETRIES` for the default retry bound (defaults to 3)
    /// - `REST_CORE_BACKOFF_BASE_MS` / `REST_CORE_BACKOFF_MAX_MS` for backoff (500 / 8000)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base address
    #[must_use]
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into();
        self
    }

    /// Adds a header sent with every request
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().trim().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets a bearer token sent as `authorization: Bearer <token>`
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(SecretString::from(token.into()));
        self
    }

    /// Sets the default per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default number of retries after the first attempt
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff base delay and cap, keeping the jitter ratio
    #[must_use]
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.retry_policy = RetryPolicy::new(base_delay, max_delay)
            .with_jitter_ratio(self.retry_policy.jitter_ratio());
        self
    }

    /// Replaces the retry policy
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Returns the configured base address
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a bearer token is configured
    #[must_use]
    pub fn has_bearer_token(&self) -> bool {
        self.bearer_token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().trim().is_empty())
    }
}

/// Configuration trait for the client
///
/// Implement this trait to supply base address, default headers and defaults
/// from somewhere other than [`ClientConfig`].
pub trait Config: Send + Sync {
    /// Constructs the absolute URL for a relative path
    fn url(&self, path: &str) -> String;

    /// Returns headers to include in every request
    ///
    /// # Errors
    ///
    /// Returns an `InvalidRequest` error if a header value cannot be produced.
    fn headers(&self) -> Result<BTreeMap<String, String>, ClassifiedError>;

    /// Returns query parameters to include in every request
    fn query(&self) -> Vec<(&str, &str)>;

    /// Default per-request timeout
    fn timeout(&self) -> Duration;

    /// Default number of retries after the first attempt
    fn max_retries(&self) -> u32;

    /// Backoff policy applied between attempts
    fn retry_policy(&self) -> RetryPolicy;
}

impl Config for ClientConfig {
    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim().trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn headers(&self) -> Result<BTreeMap<String, String>, ClassifiedError> {
        let mut h = self.headers.clone();

        if let Some(secret) = &self.bearer_token {
            let token = secret.expose_secret().trim();
            if token.chars().any(char::is_control) {
                return Err(ClassifiedError::invalid_request(
                    "Invalid bearer token value",
                ));
            }
            if !token.is_empty() {
                h.insert(HDR_AUTHORIZATION.into(), format!("Bearer {token}"));
            }
        }

        Ok(h)
    }

    fn query(&self) -> Vec<(&str, &str)> {
        vec![]
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }
}

fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    env_trimmed(key).and_then(|v| v.parse().ok())
}
