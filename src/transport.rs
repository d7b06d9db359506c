//! Transport seam.
//!
//! The client never performs I/O itself. Each attempt is exactly one call to
//! [`Transport::first`], which sends one request and resolves with the first event of the
//! response. Implementations are expected to log `request`, `response`, `aborted` and
//! `closing stream` entries through the [`Logger`] they are handed.
//!
//! Besides [`HttpTransport`](crate::HttpTransport), any closure ([`transport_fn`]) or tower service
//! ([`ServiceTransport`]) can act as a transport, which is how tests script responses.

use crate::clock::Clock;
use crate::error::RequestError;
use crate::telemetry::Logger;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_service::Service;

/// First event of a successful response. `Null` when the response had no body.
pub type Event = serde_json::Value;

/// Host and path of an API endpoint, without scheme (`vault.paylike.io`,
/// `b.paylike.io/payments`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(endpoint: &str) -> Self {
        Self::new(endpoint)
    }
}

/// Everything a transport needs for one attempt.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// API version sent as `Accept-Version`.
    pub version: u32,
    /// JSON body.
    pub data: serde_json::Value,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Client identifier sent as `X-Client`.
    pub client_id: String,
    /// Logger bound to the call's correlation id.
    pub log: Logger,
    /// Clock for the attempt timeout.
    pub clock: Arc<dyn Clock>,
}

/// Performs one request attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn first(&self, endpoint: &Endpoint, options: RequestOptions)
        -> Result<Event, RequestError>;
}

/// Transport backed by a closure.
#[derive(Clone)]
pub struct FnTransport<F> {
    f: F,
}

impl<F> fmt::Debug for FnTransport<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransport").finish_non_exhaustive()
    }
}

/// Wrap `f` as a [`Transport`].
pub fn transport_fn<F, Fut>(f: F) -> FnTransport<F>
where
    F: Fn(Endpoint, RequestOptions) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Event, RequestError>> + Send,
{
    FnTransport { f }
}

#[async_trait]
impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(Endpoint, RequestOptions) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Event, RequestError>> + Send,
{
    async fn first(
        &self,
        endpoint: &Endpoint,
        options: RequestOptions,
    ) -> Result<Event, RequestError> {
        (self.f)(endpoint.clone(), options).await
    }
}

/// Request handed to a [`ServiceTransport`]'s inner service.
#[derive(Debug, Clone)]
pub struct TransportCall {
    pub endpoint: Endpoint,
    pub options: RequestOptions,
}

/// Adapts a tower service into a [`Transport`]. The service is cloned per attempt.
#[derive(Debug, Clone)]
pub struct ServiceTransport<S> {
    inner: S,
}

impl<S> ServiceTransport<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> Transport for ServiceTransport<S>
where
    S: Service<TransportCall, Response = Event, Error = RequestError> + Clone + Send + Sync,
    S::Future: Send,
{
    async fn first(
        &self,
        endpoint: &Endpoint,
        options: RequestOptions,
    ) -> Result<Event, RequestError> {
        let mut svc = self.inner.clone();
        futures::future::poll_fn(|cx| svc.poll_ready(cx)).await?;
        svc.call(TransportCall { endpoint: endpoint.clone(), options }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::telemetry::NullSink;
    use serde_json::json;

    fn options() -> RequestOptions {
        RequestOptions {
            version: 1,
            data: json!({"type": "pcn", "value": "4100000000000000"}),
            timeout: Duration::from_secs(10),
            client_id: "rs-c-1".into(),
            log: Logger::new(0, Arc::new(NullSink)),
            clock: Arc::new(ManualClock::default()),
        }
    }

    #[tokio::test]
    async fn closure_transport_sees_endpoint_and_options() {
        let transport = transport_fn(|endpoint: Endpoint, options: RequestOptions| async move {
            Ok(json!({"endpoint": endpoint.as_str(), "version": options.version}))
        });
        let event = transport.first(&Endpoint::new("vault.paylike.io"), options()).await;
        assert_eq!(event, Ok(json!({"endpoint": "vault.paylike.io", "version": 1})));
    }

    #[tokio::test]
    async fn tower_service_transport() {
        let svc = tower::service_fn(|call: TransportCall| async move {
            if call.endpoint.as_str().ends_with("/payments") {
                Ok(json!({"authorizationId": "abc"}))
            } else {
                Err(RequestError::Network("unreachable".into()))
            }
        });
        let transport = ServiceTransport::new(svc);

        let ok = transport.first(&Endpoint::new("b.paylike.io/payments"), options()).await;
        assert_eq!(ok, Ok(json!({"authorizationId": "abc"})));
        let err = transport.first(&Endpoint::new("elsewhere"), options()).await;
        assert_eq!(err, Err(RequestError::Network("unreachable".into())));
    }
}
