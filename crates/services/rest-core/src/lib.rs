#![deny(clippy::all)]
#![deny(missing_docs)]

//! Async request/response client core with error classification, retries and
//! cancellation.
//!
//! Every call resolves to an [`ApiResult`]: either the decoded payload or a
//! [`ClassifiedError`] whose [`ErrorKind`] tells the caller what went wrong.
//! Timeouts, unreachable networks, 5xx and 429 responses are retried with
//! capped exponential backoff and jitter; everything else surfaces at once.
//!
//! ```no_run
//! use rest_core::prelude::*;
//!
//! # async fn run() {
//! #[derive(serde::Deserialize)]
//! struct User {
//!     id: u64,
//! }
//!
//! let client = Client::with_config(ClientConfig::new().with_base_url("https://api.example.com"));
//! match client.get::<User>("/users/1", RequestOptions::new()).await {
//!     ApiResult::Ok { value } => println!("user {}", value.id),
//!     ApiResult::Err { error } => eprintln!("{} after {} attempts", error, error.attempts()),
//! }
//! # }
//! ```

/// Error classification of transport outcomes
pub mod classify;
/// Client orchestration and the retry loop
pub mod client;
/// Configuration types for the client
pub mod config;
/// Error types
pub mod error;
/// Request descriptors and per-call options
pub mod request;
/// The tagged result returned by every call
pub mod result;
/// Retry policy and backoff
pub mod retry;
/// Test support utilities (for use in tests)
#[doc(hidden)]
pub mod test_support;
/// Transport port and the reqwest adapter
pub mod transport;

pub use crate::client::Client;
pub use crate::config::{ClientConfig, Config};
pub use crate::error::{ClassifiedError, ErrorKind};
pub use crate::request::{Method, RequestDescriptor, RequestOptions};
pub use crate::result::ApiResult;
pub use crate::retry::{RetryDecision, RetryPolicy, RetryState};
pub use crate::transport::{
    FailureReason, RawResponse, ReqwestTransport, Transport, TransportFailure,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ApiResult, ClassifiedError, Client, ClientConfig, Config, ErrorKind, RequestOptions,
        RetryPolicy,
    };
    pub use tokio_util::sync::CancellationToken;
}
