//! Convenient re-exports for common client types.
pub use crate::{
    backoff::{Backoff, BackoffError},
    client::Client,
    clock::{Clock, ManualClock, TokioClock},
    config::{CallOptions, ClientBuilder, Hosts},
    error::{RequestError, ResponseError, Retryable},
    jitter::Jitter,
    policy::{RetryPolicy, RetryPolicyBuilder},
    retry::{RetryAfter, RetryDecision, RetryLayer},
    telemetry::{LogEntry, LogRecord, LogSink, MemorySink, TracingSink},
    transport::{transport_fn, Endpoint, Transport},
};
