#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # paylike-client
//!
//! Async client for the Paylike tokenization and payment APIs.
//!
//! Every call runs through a retry engine: transient failures (timeouts, rate limits, server
//! and network errors) are retried on a schedule, well-formed API rejections are returned
//! immediately, and every attempt leaves a structured log trail tagged with a per-call
//! correlation id.
//!
//! ## Features
//!
//! - **Retry engine** driven by an injectable [`Clock`], so schedules are testable in virtual time
//! - **Default policy** with the 0 / 100 ms / 2 s / 10 s schedule and server `Retry-After` hints
//! - **Custom policies** from a builder ([`RetryPolicy::builder`]) or any closure
//! - **Pluggable transport**: HTTP via `reqwest` (feature `http`), closures or tower services
//! - **Log sinks** for `tracing`, memory, JSON lines and broadcast streams
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paylike_client::{CallOptions, Client, RetryDecision};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::builder().client_id("rs-c-1").build()?;
//!
//! let token = client.tokenize("pcn", "4100000000000000").await?;
//!
//! // Give up after the second failure.
//! let opts = CallOptions::new().retry_after(|_err: &paylike_client::RequestError, attempts: u32| {
//!     if attempts < 2 { RetryDecision::after_millis(250) } else { RetryDecision::Decline }
//! });
//! let code = client.tokenize_with("pcsc", "111", opts).await?;
//! # let _ = (token, code);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod jitter;
pub mod policy;
pub mod prelude;
pub mod retry;
pub mod sleeper;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use client::{Client, Payments, API_VERSION, PAYMENTS_PATH};
pub use clock::{Clock, ManualClock, TimerCallback, TimerHandle, TokioClock};
pub use config::{
    CallOptions, ClientBuilder, ClientSettings, ConfigError, Hosts, DEFAULT_API_HOST,
    DEFAULT_CLIENT_ID, DEFAULT_TIMEOUT, DEFAULT_VAULT_HOST,
};
pub use error::{ErrorSummary, RequestError, ResponseError, Retryable};
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use jitter::Jitter;
pub use policy::{default_backoff, never, RetryPolicy, RetryPolicyBuilder, DEFAULT_MAX_RETRIES};
pub use retry::{retry, Retrier, RetryAfter, RetryDecision, RetryLayer, RetryService, RetryState};
pub use sleeper::{sleep, Delay, TimerCleared};
pub use telemetry::{
    next_correlation_id, JsonLinesSink, LogEntry, LogRecord, LogSink, Logger, MemorySink,
    MulticastSink, NullSink, StreamingSink, TracingSink,
};
pub use transport::{
    transport_fn, Endpoint, Event, FnTransport, RequestOptions, ServiceTransport, Transport,
    TransportCall,
};
