use std::time::Duration;

use rand::Rng;

use crate::error::{ClassifiedError, ErrorKind};

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
/// Default cap on the exponential backoff
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);
/// Default jitter, as a fraction of the computed backoff
pub const DEFAULT_JITTER_RATIO: f64 = 0.2;

const MAX_EXPONENT: u32 = 16;

/// Capped exponential backoff with additive jitter
///
/// Configured with:
/// - Base delay: 500ms
/// - Max delay: 8s
/// - Jitter: up to 20% of the computed delay
///
/// Delay for a given zero-based `attempt`:
///
/// ```text
/// backoff = min(base * 2^attempt, max)
/// delay   = min(backoff + uniform(0 ..= jitter_ratio * backoff), max)
/// ```
///
/// Delays therefore never decrease from one attempt to the next and never
/// exceed `max`.
///
/// A rate-limited error with a retry-after hint waits for
/// `max(delay, hint)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

/// Outcome of [`RetryPolicy::should_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether another attempt should be made
    pub retry: bool,
    /// How long to wait first; zero when `retry` is false
    pub delay: Duration,
}

impl RetryDecision {
    /// Do not retry
    #[must_use]
    pub const fn stop() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
        }
    }

    /// Retry after `delay`
    #[must_use]
    pub const fn after(delay: Duration) -> Self {
        Self { retry: true, delay }
    }
}

/// Progress of one call through the retry loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    last_error: Option<ClassifiedError>,
}

impl RetryState {
    /// State before the first attempt
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempt: 0,
            last_error: None,
        }
    }

    /// State positioned at a zero-based attempt, with no recorded error
    #[must_use]
    pub const fn at_attempt(attempt: u32) -> Self {
        Self {
            attempt,
            last_error: None,
        }
    }

    /// Zero-based index of the current attempt
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Error that ended the previous attempt
    #[must_use]
    pub const fn last_error(&self) -> Option<&ClassifiedError> {
        self.last_error.as_ref()
    }

    /// Records a failed attempt and moves to the next one
    pub(crate) fn advance(&mut self, error: ClassifiedError) {
        self.last_error = Some(error);
        self.attempt = self.attempt.saturating_add(1);
    }
}

impl RetryPolicy {
    /// Creates a policy with the default jitter ratio
    #[must_use]
    pub const fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }

    /// Replaces the jitter ratio (clamped to `0.0..=1.0`)
    #[must_use]
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        self
    }

    /// Delay before the first retry
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Cap on the exponential backoff
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Jitter as a fraction of the computed backoff
    #[must_use]
    pub const fn jitter_ratio(&self) -> f64 {
        self.jitter_ratio
    }

    /// Un-jittered backoff for a zero-based attempt
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_EXPONENT);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Decides whether the call should be attempted again
    ///
    /// Only timeouts, unreachable networks, server errors and rate limits are
    /// retried, and only while `state.attempt() < max_retries`.
    #[must_use]
    pub fn should_retry(
        &self,
        error: &ClassifiedError,
        state: &RetryState,
        max_retries: u32,
    ) -> RetryDecision {
        if !error.kind().is_transient() || state.attempt() >= max_retries {
            return RetryDecision::stop();
        }

        let backoff = self.backoff(state.attempt());
        let mut delay = (backoff + self.jitter(backoff)).min(self.max_delay);

        if error.kind() == ErrorKind::RateLimited
            && let Some(hint) = error.retry_after()
        {
            delay = delay.max(hint);
        }

        RetryDecision::after(delay)
    }

    fn jitter(&self, backoff: Duration) -> Duration {
        let max_ms = (backoff.as_millis() as f64 * self.jitter_ratio) as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
