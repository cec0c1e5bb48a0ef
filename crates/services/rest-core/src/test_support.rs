//! Test-only utilities: environment guards and a scripted transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::request::RequestDescriptor;
use crate::transport::{RawResponse, Transport, TransportFailure};

/// RAII guard for temporarily setting an environment variable.
///
/// The variable is automatically restored to its previous state (or removed if it
/// was not set) when the guard is dropped.
pub struct EnvGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvGuard {
    /// Set an environment variable temporarily.
    ///
    /// Callers must hold `#[serial(env)]`; see the SAFETY notes below.
    #[must_use]
    pub fn set(key: &'static str, val: &str) -> Self {
        let prev = std::env::var(key).ok();
        // SAFETY: env tests run under #[serial(env)], so no other thread reads
        // or writes the environment concurrently.
        unsafe { std::env::set_var(key, val) };
        Self { key, prev }
    }

    /// Remove an environment variable temporarily.
    #[must_use]
    pub fn remove(key: &'static str) -> Self {
        let prev = std::env::var(key).ok();
        // SAFETY: as in `set`.
        unsafe { std::env::remove_var(key) };
        Self { key, prev }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            // SAFETY: as in `set`; the guard drops inside the serialized test.
            Some(v) => unsafe { std::env::set_var(self.key, v) },
            // SAFETY: as in `set`.
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

type Outcome = Result<RawResponse, TransportFailure>;

/// [`Transport`] that replays a fixed script of outcomes
///
/// Each call pops the next outcome; once the script is exhausted every call
/// fails with [`TransportFailure::unknown`]. Calls, their start instants and
/// the descriptors they received are recorded for assertions.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    latency: Duration,
    calls: AtomicUsize,
    started: Mutex<Vec<Instant>>,
    seen: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedTransport {
    /// An empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an outcome
    #[must_use]
    pub fn push(self, outcome: Outcome) -> Self {
        lock(&self.script).push_back(outcome);
        self
    }

    /// Appends a response
    #[must_use]
    pub fn respond(self, response: RawResponse) -> Self {
        self.push(Ok(response))
    }

    /// Appends a transport failure
    #[must_use]
    pub fn fail(self, failure: TransportFailure) -> Self {
        self.push(Err(failure))
    }

    /// Appends the same response `times` times
    #[must_use]
    pub fn repeat(self, response: RawResponse, times: usize) -> Self {
        (0..times).fold(self, |t, _| t.respond(response.clone()))
    }

    /// Delays every outcome by `latency`
    ///
    /// A latency at or beyond the descriptor's timeout yields a timeout
    /// failure; a fired token yields an unknown failure.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of calls made so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Instant at which each call started
    #[must_use]
    pub fn call_times(&self) -> Vec<Instant> {
        lock(&self.started).clone()
    }

    /// Gaps between consecutive call starts
    #[must_use]
    pub fn gaps(&self) -> Vec<Duration> {
        self.call_times()
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect()
    }

    /// Descriptors received, in call order
    #[must_use]
    pub fn descriptors(&self) -> Vec<RequestDescriptor> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.started).push(Instant::now());
        lock(&self.seen).push(descriptor.clone());
        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::unknown("script exhausted")));

        if self.latency.is_zero() {
            return outcome;
        }
        if self.latency >= descriptor.timeout() {
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(TransportFailure::unknown("request cancelled"));
                }
                () = tokio::time::sleep(descriptor.timeout()) => {}
            }
            return Err(TransportFailure::timeout("scripted latency exceeded timeout"));
        }
        tokio::select! {
            () = cancel.cancelled() => Err(TransportFailure::unknown("request cancelled")),
            () = tokio::time::sleep(self.latency) => outcome,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
