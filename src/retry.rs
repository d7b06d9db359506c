//! Retry engine.
//!
//! Drives a fallible async operation until it succeeds or a policy declines to retry.
//!
//! Semantics:
//! - The operation is invoked once per attempt; attempts never overlap.
//! - Attempts are numbered from 1. After the n-th failure the policy is asked
//!   [`RetryAfter::retry_after`]`(&err, n)`.
//! - [`RetryDecision::Decline`] ends the sequence with that exact error (no wrapping).
//! - [`RetryDecision::After`] waits on the injected [`Clock`] and tries again with `n + 1`.
//! - The loop is iterative; long sequences do not grow the stack.
//!
//! Dropping the returned future cancels the sequence and clears any pending timer.
//!
//! Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use paylike_client::{Retrier, RetryDecision, TokioClock};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let retrier = Retrier::new(Arc::new(TokioClock::new()));
//! let policy = |_err: &std::io::Error, attempts: u32| {
//!     if attempts < 3 { RetryDecision::after_millis(10) } else { RetryDecision::Decline }
//! };
//! let result: Result<(), std::io::Error> = retrier
//!     .run(|| async { Err(std::io::Error::other("flaky")) }, &policy)
//!     .await;
//! assert!(result.is_err());
//! # });
//! ```

use crate::clock::Clock;
use crate::sleeper::Delay;
use futures::future::BoxFuture;
use serde::{Serialize, Serializer};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;

/// Answer of a retry policy for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Give up and propagate the error.
    Decline,
    /// Try again after this delay (whole milliseconds).
    After(Duration),
}

impl RetryDecision {
    /// Retry after `millis` milliseconds.
    pub fn after_millis(millis: u64) -> Self {
        RetryDecision::After(Duration::from_millis(millis))
    }

    /// Interpret a signed millisecond count; negative values decline.
    pub fn from_millis_i64(millis: i64) -> Self {
        u64::try_from(millis).map_or(RetryDecision::Decline, Self::after_millis)
    }

    /// Interpret a floating-point millisecond count.
    ///
    /// Only finite, non-negative whole numbers retry; NaN, infinities, negative and fractional
    /// values decline.
    pub fn from_millis_f64(millis: f64) -> Self {
        if millis.is_finite() && millis >= 0.0 && millis.fract() == 0.0 && millis <= u64::MAX as f64
        {
            Self::after_millis(millis as u64)
        } else {
            RetryDecision::Decline
        }
    }

    /// Delay before the next attempt, if retrying.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            RetryDecision::After(delay) => Some(*delay),
            RetryDecision::Decline => None,
        }
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::After(_))
    }
}

impl From<Option<Duration>> for RetryDecision {
    fn from(delay: Option<Duration>) -> Self {
        delay.map_or(RetryDecision::Decline, RetryDecision::After)
    }
}

impl fmt::Display for RetryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryDecision::Decline => write!(f, "false"),
            RetryDecision::After(delay) => write!(f, "{}", delay.as_millis()),
        }
    }
}

/// Serialized as `false` or the delay in milliseconds.
impl Serialize for RetryDecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RetryDecision::Decline => serializer.serialize_bool(false),
            RetryDecision::After(delay) => {
                serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
            }
        }
    }
}

/// Decides, per failed attempt, whether and when to retry.
///
/// Any `Fn(&E, u32) -> RetryDecision` closure is a policy.
pub trait RetryAfter<E>: Send + Sync {
    /// `attempts` is the 1-based number of the attempt that just failed.
    fn retry_after(&self, err: &E, attempts: u32) -> RetryDecision;
}

impl<E, F> RetryAfter<E> for F
where
    F: Fn(&E, u32) -> RetryDecision + Send + Sync,
{
    fn retry_after(&self, err: &E, attempts: u32) -> RetryDecision {
        self(err, attempts)
    }
}

/// Lifecycle of one retry sequence, reported in `tracing` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting,
    Waiting,
    Success,
    Failed,
}

/// Runs operations under a retry policy, waiting on an injected clock.
#[derive(Debug, Clone)]
pub struct Retrier {
    clock: Arc<dyn Clock>,
}

impl Retrier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Clock used for the waits between attempts.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Execute `operation` until it succeeds or `policy` declines.
    pub async fn run<T, E, Fut, Op, P>(&self, mut operation: Op, policy: &P) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: RetryAfter<E> + ?Sized,
    {
        let mut attempts: u32 = 1;
        tracing::trace!(state = ?RetryState::Idle, "retry sequence started");

        loop {
            tracing::trace!(attempts, state = ?RetryState::Attempting, "attempt started");
            let err = match operation().await {
                Ok(value) => {
                    tracing::trace!(attempts, state = ?RetryState::Success, "attempt succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            let delay = match policy.retry_after(&err, attempts) {
                RetryDecision::After(delay) => delay,
                RetryDecision::Decline => {
                    tracing::debug!(attempts, state = ?RetryState::Failed, "retry declined");
                    return Err(err);
                }
            };

            tracing::debug!(
                attempts,
                delay_ms = delay.as_millis() as u64,
                state = ?RetryState::Waiting,
                "retry scheduled"
            );
            if Delay::new(Arc::clone(&self.clock), delay).await.is_err() {
                tracing::debug!(attempts, state = ?RetryState::Failed, "retry timer cleared");
                return Err(err);
            }
            attempts = attempts.saturating_add(1);
        }
    }
}

/// One-shot form of [`Retrier::run`].
pub async fn retry<T, E, Fut, Op, P>(
    clock: Arc<dyn Clock>,
    operation: Op,
    policy: &P,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryAfter<E> + ?Sized,
{
    Retrier::new(clock).run(operation, policy).await
}

/// Tower layer retrying the wrapped service with a [`Retrier`].
pub struct RetryLayer<P> {
    retrier: Retrier,
    policy: Arc<P>,
}

impl<P> RetryLayer<P> {
    pub fn new(clock: Arc<dyn Clock>, policy: P) -> Self {
        Self { retrier: Retrier::new(clock), policy: Arc::new(policy) }
    }
}

impl<P> Clone for RetryLayer<P> {
    fn clone(&self) -> Self {
        Self { retrier: self.retrier.clone(), policy: Arc::clone(&self.policy) }
    }
}

impl<P> fmt::Debug for RetryLayer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryLayer")
            .field("retrier", &self.retrier)
            .field("policy", &"<policy>")
            .finish()
    }
}

impl<S, P> Layer<S> for RetryLayer<P> {
    type Service = RetryService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService { inner, layer: self.clone() }
    }
}

/// Retry service produced by [`RetryLayer`]. Errors are returned unchanged.
#[derive(Clone)]
pub struct RetryService<S, P> {
    inner: S,
    layer: RetryLayer<P>,
}

impl<S, P, Request> Service<Request> for RetryService<S, P>
where
    Request: Clone + Send + 'static,
    S: Service<Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    P: RetryAfter<S::Error> + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Use the instance that was driven to readiness for the first attempt.
        let clone = self.inner.clone();
        let mut first = Some(std::mem::replace(&mut self.inner, clone));
        let inner = self.inner.clone();
        let layer = self.layer.clone();
        Box::pin(async move {
            layer
                .retrier
                .run(
                    move || {
                        let ready = first.take();
                        let mut svc = inner.clone();
                        let req = req.clone();
                        async move {
                            match ready {
                                Some(mut svc) => svc.call(req).await,
                                None => {
                                    futures::future::poll_fn(|cx| svc.poll_ready(cx)).await?;
                                    svc.call(req).await
                                }
                            }
                        }
                    },
                    &*layer.policy,
                )
                .await
        })
    }
}
