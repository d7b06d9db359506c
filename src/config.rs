//! Client configuration.
//!
//! Construction-time defaults are set on [`ClientBuilder`]; [`CallOptions`] overrides them for a
//! single call. Call-site options always win.
//!
//! Recognized options: `hosts`, `client_id`, `timeout`, `clock`, `retry_after`, `log`,
//! `transport`. Plain values can also come from a [`ClientSettings`] document:
//!
//! ```rust
//! use paylike_client::ClientSettings;
//!
//! let settings: ClientSettings = serde_json::from_str(
//!     r#"{"hosts": {"api": "b.example.test", "vault": "vault.example.test"}, "timeout_ms": 5000}"#,
//! ).unwrap();
//! assert_eq!(settings.client_id, "rs-c-1");
//! ```

use crate::client::{Client, Defaults};
use crate::clock::{Clock, TokioClock};
use crate::error::RequestError;
use crate::policy::RetryPolicy;
use crate::retry::RetryAfter;
use crate::telemetry::{LogSink, TracingSink};
use crate::transport::Transport;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Client identifier sent with every request unless overridden.
pub const DEFAULT_CLIENT_ID: &str = "rs-c-1";
/// Per-attempt timeout unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_API_HOST: &str = "b.paylike.io";
pub const DEFAULT_VAULT_HOST: &str = "vault.paylike.io";

/// API hosts, without scheme.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Hosts {
    /// Payment API host.
    pub api: String,
    /// Tokenization (vault) host.
    pub vault: String,
}

impl Default for Hosts {
    fn default() -> Self {
        Self { api: DEFAULT_API_HOST.to_owned(), vault: DEFAULT_VAULT_HOST.to_owned() }
    }
}

/// Serializable subset of the client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    pub hosts: Hosts,
    pub client_id: String,
    pub timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            hosts: Hosts::default(),
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Errors produced while building a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} host must not be empty")]
    EmptyHost(&'static str),
    #[error("client id must not be empty")]
    EmptyClientId,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("no transport configured (enable the `http` feature or call `transport`)")]
    MissingTransport,
}

/// Per-call overrides.
#[derive(Clone, Default)]
pub struct CallOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_after: Option<Arc<dyn RetryAfter<RequestError>>>,
    pub(crate) log: Option<Arc<dyn LogSink>>,
    pub(crate) client_id: Option<String>,
    pub(crate) hosts: Option<Hosts>,
    pub(crate) clock: Option<Arc<dyn Clock>>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_after<P>(mut self, policy: P) -> Self
    where
        P: RetryAfter<RequestError> + 'static,
    {
        self.retry_after = Some(Arc::new(policy));
        self
    }

    pub fn log<S>(mut self, sink: S) -> Self
    where
        S: LogSink + 'static,
    {
        self.log = Some(Arc::new(sink));
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn hosts(mut self, hosts: Hosts) -> Self {
        self.hosts = Some(hosts);
        self
    }

    /// Clock handed to the transport for this call's attempt timeouts. Retry waits keep using
    /// the client's clock.
    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("timeout", &self.timeout)
            .field("retry_after", &self.retry_after.as_ref().map(|_| "<policy>"))
            .field("log", &self.log.as_ref().map(|_| "<sink>"))
            .field("client_id", &self.client_id)
            .field("hosts", &self.hosts)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    hosts: Hosts,
    client_id: String,
    timeout: Duration,
    clock: Option<Arc<dyn Clock>>,
    retry_after: Option<Arc<dyn RetryAfter<RequestError>>>,
    log: Option<Arc<dyn LogSink>>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            hosts: Hosts::default(),
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            clock: None,
            retry_after: None,
            log: None,
            transport: None,
        }
    }

    /// Apply plain values from a settings document.
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.hosts = settings.hosts;
        self.client_id = settings.client_id;
        self.timeout = Duration::from_millis(settings.timeout_ms);
        self
    }

    pub fn hosts(mut self, hosts: Hosts) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Replace the default retry policy.
    pub fn retry_after<P>(mut self, policy: P) -> Self
    where
        P: RetryAfter<RequestError> + 'static,
    {
        self.retry_after = Some(Arc::new(policy));
        self
    }

    pub fn log<S>(mut self, sink: S) -> Self
    where
        S: LogSink + 'static,
    {
        self.log = Some(Arc::new(sink));
        self
    }

    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn build(self) -> Result<Client, ConfigError> {
        if self.hosts.api.is_empty() {
            return Err(ConfigError::EmptyHost("api"));
        }
        if self.hosts.vault.is_empty() {
            return Err(ConfigError::EmptyHost("vault"));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::EmptyClientId);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };
        let defaults = Defaults {
            client_id: self.client_id,
            timeout: self.timeout,
            clock: self.clock.unwrap_or_else(|| Arc::new(TokioClock::new())),
            retry_after: self
                .retry_after
                .unwrap_or_else(|| Arc::new(RetryPolicy::<RequestError>::default())),
            log: self.log.unwrap_or_else(|| Arc::new(TracingSink)),
        };
        Ok(Client::from_parts(self.hosts, defaults, transport))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
fn default_transport() -> Result<Arc<dyn Transport>, ConfigError> {
    Ok(Arc::new(crate::http::HttpTransport::new()))
}

#[cfg(not(feature = "http"))]
fn default_transport() -> Result<Arc<dyn Transport>, ConfigError> {
    Err(ConfigError::MissingTransport)
}
