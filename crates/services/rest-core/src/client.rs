use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, field, instrument, warn};

use crate::classify::{Classification, classify_failure, classify_response, decode};
use crate::config::{ClientConfig, Config};
use crate::error::ClassifiedError;
use crate::request::{Method, RequestDescriptor, RequestOptions};
use crate::result::ApiResult;
use crate::retry::{RetryPolicy, RetryState};
use crate::transport::{ReqwestTransport, Transport};

/// Request/response client
///
/// The client is generic over a [`Config`] implementation that provides the
/// base address, default headers and retry defaults. Cloning is cheap; the
/// transport is shared.
#[derive(Debug, Clone)]
pub struct Client<C: Config = ClientConfig> {
    transport: Arc<dyn Transport>,
    config: C,
    policy: RetryPolicy,
}

impl Client<ClientConfig> {
    /// Creates a new client with default configuration
    ///
    /// Uses environment variables for configuration:
    /// - `REST_CORE_BASE_URL` for the base address
    /// - `REST_CORE_API_TOKEN` for an optional bearer token
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new())
    }
}

impl<C: Config + Default> Default for Client<C> {
    fn default() -> Self {
        Self::with_config(C::default())
    }
}

impl<C: Config> Client<C> {
    /// Creates a new client with the given configuration over a
    /// [`ReqwestTransport`].
    ///
    /// # Panics
    ///
    /// Panics if the reqwest client cannot be built.
    #[must_use]
    pub fn with_config(config: C) -> Self {
        Self::with_transport(config, ReqwestTransport::new())
    }

    /// Creates a client over a custom transport
    #[must_use]
    pub fn with_transport(config: C, transport: impl Transport + 'static) -> Self {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    /// Creates a client over a transport shared with other clients
    #[must_use]
    pub fn with_shared_transport(config: C, transport: Arc<dyn Transport>) -> Self {
        let policy = config.retry_policy();
        Self {
            transport,
            config,
            policy,
        }
    }

    /// Replaces the backoff configuration for retry logic
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns a reference to the client's configuration
    #[must_use]
    pub const fn config(&self) -> &C {
        &self.config
    }

    /// Returns the retry policy in effect
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Issues a `GET`
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::Get.as_str(), path, options).await
    }

    /// Issues a `POST`
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::Post.as_str(), path, options).await
    }

    /// Issues a `PUT`
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::Put.as_str(), path, options).await
    }

    /// Issues a `PATCH`
    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::Patch.as_str(), path, options).await
    }

    /// Issues a `DELETE`
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::Delete.as_str(), path, options).await
    }

    /// Issues a request with a verb given as a string
    ///
    /// Unsupported verbs, empty paths and malformed headers resolve to
    /// `InvalidRequest` without touching the transport. Transient failures
    /// are retried up to the descriptor's retry bound. Firing the token in
    /// `options` resolves the call to `Cancelled`; so does dropping the
    /// returned future, which also signals the transport.
    #[instrument(skip_all, fields(method = %method, path = %path, url = field::Empty))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let descriptor = match RequestDescriptor::build(&self.config, method, path, &options) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                debug!(kind = %error.kind(), "rejected request: {}", error.message());
                return ApiResult::failure(error);
            }
        };
        Span::current().record("url", field::display(descriptor.url()));

        let cancel = options
            .cancellation()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let _abandon = cancel.clone().drop_guard();

        self.execute(&descriptor, &cancel).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> ApiResult<T> {
        let mut state = RetryState::new();

        loop {
            if cancel.is_cancelled() {
                return cancelled(state.attempt());
            }

            let attempts = state.attempt().saturating_add(1);
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return cancelled(attempts),
                outcome = self.transport.execute(descriptor, cancel) => outcome,
            };

            let error = match outcome {
                Ok(response) => match classify_response(&response) {
                    Classification::Success => {
                        return decode(&response)
                            .map_err(|e| {
                                debug!(attempts, "failed to decode response: {}", e.message());
                                e.with_attempts(attempts)
                            })
                            .into();
                    }
                    Classification::Failure(error) => error,
                },
                Err(failure) => classify_failure(&failure),
            }
            .with_attempts(attempts);

            let decision = self
                .policy
                .should_retry(&error, &state, descriptor.max_retries());
            if !decision.retry {
                debug!(attempts, kind = %error.kind(), "request failed: {}", error.message());
                return ApiResult::failure(error);
            }

            warn!(
                attempt = attempts,
                kind = %error.kind(),
                delay_ms = u64::try_from(decision.delay.as_millis()).unwrap_or(u64::MAX),
                "retrying request: {}",
                error.message()
            );
            state.advance(error);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return cancelled(attempts),
                () = tokio::time::sleep(decision.delay) => {}
            }
        }
    }
}

fn cancelled<T>(attempts: u32) -> ApiResult<T> {
    debug!(attempts, "request cancelled");
    ApiResult::failure(ClassifiedError::cancelled(attempts))
}
