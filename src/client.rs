//! Request orchestrator.
//!
//! A [`Client`] turns a logical API call into a retried sequence of transport attempts:
//!
//! 1. allocate a correlation id and bind the log sink to it,
//! 2. run the attempt under the [`Retrier`], asking the retry policy after each failure,
//! 3. log a `request failed` entry carrying the policy's decision before acting on it,
//! 4. hand back the first event, or the last error unchanged.
//!
//! ```rust,no_run
//! use paylike_client::Client;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::builder().build()?;
//! let token = client.tokenize("pcn", "4100000000000000").await?;
//! println!("{token}");
//! # Ok(())
//! # }
//! ```

use crate::clock::Clock;
use crate::config::{CallOptions, ClientBuilder, Hosts};
use crate::error::{ErrorSummary, RequestError};
use crate::retry::{RetryAfter, RetryDecision, Retrier};
use crate::telemetry::{LogEntry, LogSink, Logger};
use crate::transport::{Endpoint, Event, RequestOptions, Transport};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// API version sent with every request.
pub const API_VERSION: u32 = 1;

/// Path used by `payments().create` when no challenge path is given.
pub const PAYMENTS_PATH: &str = "/payments";

/// Construction-time values that [`CallOptions`] may override.
#[derive(Clone)]
pub(crate) struct Defaults {
    pub(crate) client_id: String,
    pub(crate) timeout: Duration,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) retry_after: Arc<dyn RetryAfter<RequestError>>,
    pub(crate) log: Arc<dyn LogSink>,
}

/// Client for the tokenization and payment APIs.
///
/// Cheap to clone; clones share the transport, clock and sinks.
#[derive(Clone)]
pub struct Client {
    hosts: Hosts,
    defaults: Defaults,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(hosts: Hosts, defaults: Defaults, transport: Arc<dyn Transport>) -> Self {
        Self { hosts, defaults, transport }
    }

    pub fn hosts(&self) -> &Hosts {
        &self.hosts
    }

    pub fn client_id(&self) -> &str {
        &self.defaults.client_id
    }

    pub fn timeout(&self) -> Duration {
        self.defaults.timeout
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.defaults.clock
    }

    /// Exchange a raw card number (`"pcn"`) or security code (`"pcsc"`) for a token.
    pub async fn tokenize(&self, kind: &str, value: &str) -> Result<Event, RequestError> {
        self.tokenize_with(kind, value, CallOptions::default()).await
    }

    pub async fn tokenize_with(
        &self,
        kind: &str,
        value: &str,
        opts: CallOptions,
    ) -> Result<Event, RequestError> {
        let hosts = opts.hosts.as_ref().unwrap_or(&self.hosts);
        let endpoint = Endpoint::new(hosts.vault.clone());
        let data = serde_json::json!({ "type": kind, "value": value });
        self.first(endpoint, data, opts).await
    }

    /// Payment operations.
    pub fn payments(&self) -> Payments<'_> {
        Payments { client: self }
    }

    /// Send `data` to `endpoint` under the retry policy and return the first response event.
    ///
    /// Every log entry produced by this call, across all attempts, carries the same correlation
    /// id. The error of the last attempt is returned unchanged.
    pub async fn first(
        &self,
        endpoint: Endpoint,
        data: Value,
        opts: CallOptions,
    ) -> Result<Event, RequestError> {
        let CallOptions { timeout, retry_after, log, client_id, hosts: _, clock: call_clock } = opts;
        let log = Logger::create(log.unwrap_or_else(|| Arc::clone(&self.defaults.log)));
        let policy = retry_after.unwrap_or_else(|| Arc::clone(&self.defaults.retry_after));
        let clock = Arc::clone(&self.defaults.clock);
        let options = RequestOptions {
            version: API_VERSION,
            data,
            timeout: timeout.unwrap_or(self.defaults.timeout),
            client_id: client_id.unwrap_or_else(|| self.defaults.client_id.clone()),
            log: log.clone(),
            clock: call_clock.unwrap_or_else(|| Arc::clone(&clock)),
        };

        let logged_policy = |err: &RequestError, attempts: u32| -> RetryDecision {
            let decision = policy.retry_after(err, attempts);
            log.log(LogEntry::RequestFailed {
                attempts,
                retry_after: decision,
                err: ErrorSummary::from(err),
            });
            decision
        };

        let transport = &self.transport;
        let endpoint = &endpoint;
        let span = tracing::debug_span!("request", id = log.id(), endpoint = %endpoint);
        let result = Retrier::new(clock)
            .run(move || transport.first(endpoint, options.clone()), &logged_policy)
            .instrument(span)
            .await;

        if let Err(err) = &result {
            tracing::warn!(id = log.id(), endpoint = %endpoint, error = %err, "request failed");
        }
        result
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("hosts", &self.hosts)
            .field("client_id", &self.defaults.client_id)
            .field("timeout", &self.defaults.timeout)
            .field("clock", &self.defaults.clock)
            .finish_non_exhaustive()
    }
}

/// Payment operations, obtained from [`Client::payments`].
#[derive(Debug, Clone, Copy)]
pub struct Payments<'a> {
    client: &'a Client,
}

impl Payments<'_> {
    /// Create a payment.
    ///
    /// `hints` accumulated from earlier challenge rounds are sent alongside the payment.
    /// `challenge_path` replaces the default `/payments` path when answering a challenge.
    pub async fn create(
        &self,
        payment: Map<String, Value>,
        hints: Vec<Value>,
        challenge_path: Option<&str>,
    ) -> Result<Event, RequestError> {
        self.create_with(payment, hints, challenge_path, CallOptions::default()).await
    }

    pub async fn create_with(
        &self,
        payment: Map<String, Value>,
        hints: Vec<Value>,
        challenge_path: Option<&str>,
        opts: CallOptions,
    ) -> Result<Event, RequestError> {
        let hosts = opts.hosts.as_ref().unwrap_or(&self.client.hosts);
        let path = challenge_path.unwrap_or(PAYMENTS_PATH);
        let endpoint = Endpoint::new(format!("{}{}", hosts.api, path));

        let mut data = payment;
        data.insert("hints".to_owned(), Value::Array(hints));
        self.client.first(endpoint, Value::Object(data), opts).await
    }
}
