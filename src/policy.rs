//! Retry policies for request errors.
//!
//! [`RetryPolicy::default`] is the client's default policy:
//! - decline once more than 10 attempts have failed (10 retries, 11 calls in total);
//! - decline final errors (well-formed rejections) immediately;
//! - honor a server-suggested delay exactly;
//! - otherwise wait 0 ms, 100 ms, 2 s, then 10 s for every further retry.
//!
//! The builder tunes each of those knobs for custom policies.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use paylike_client::{Backoff, Jitter, RequestError, RetryPolicy};
//!
//! let policy = RetryPolicy::<RequestError>::builder()
//!     .max_retries(3)
//!     .backoff(Backoff::exponential(Duration::from_millis(200)))
//!     .with_jitter(Jitter::equal())
//!     .build();
//! ```

use crate::backoff::Backoff;
use crate::error::Retryable;
use crate::jitter::Jitter;
use crate::retry::{RetryAfter, RetryDecision};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Retries allowed by the default policy after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default schedule: 0 ms, 100 ms, 2 s, then 10 s.
pub fn default_backoff() -> Backoff {
    Backoff::stepped(
        [Duration::ZERO, Duration::from_millis(100), Duration::from_millis(2000)],
        Duration::from_millis(10_000),
    )
}

/// Retry policy combining a retry ceiling, backoff, jitter and an optional predicate.
pub struct RetryPolicy<E> {
    max_retries: u32,
    backoff: Backoff,
    jitter: Jitter,
    honor_retry_after: bool,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            backoff: self.backoff.clone(),
            jitter: self.jitter,
            honor_retry_after: self.honor_retry_after,
            should_retry: Arc::clone(&self.should_retry),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("honor_retry_after", &self.honor_retry_after)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl<E: Retryable> RetryPolicy<E> {
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }
}

impl<E: Retryable> Default for RetryPolicy<E> {
    fn default() -> Self {
        RetryPolicyBuilder::new().build()
    }
}

impl<E> RetryAfter<E> for RetryPolicy<E>
where
    E: Retryable + Send + Sync,
{
    fn retry_after(&self, err: &E, attempts: u32) -> RetryDecision {
        if attempts > self.max_retries || err.is_final() || !(self.should_retry)(err) {
            return RetryDecision::Decline;
        }
        if self.honor_retry_after {
            if let Some(hint) = err.retry_after_hint() {
                return RetryDecision::After(hint);
            }
        }
        RetryDecision::After(self.jitter.apply(self.backoff.delay(attempts)))
    }
}

/// Builder for [`RetryPolicy`]. Starts from the default policy.
pub struct RetryPolicyBuilder<E> {
    max_retries: u32,
    backoff: Backoff,
    jitter: Jitter,
    honor_retry_after: bool,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
}

impl<E: Retryable> RetryPolicyBuilder<E> {
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: default_backoff(),
            jitter: Jitter::None,
            honor_retry_after: true,
            should_retry: Arc::new(|_| true),
        }
    }

    /// Retries allowed after the initial attempt. `0` disables retrying.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether a server-suggested delay replaces the backoff schedule. On by default.
    pub fn honor_retry_after(mut self, honor: bool) -> Self {
        self.honor_retry_after = honor;
        self
    }

    /// Extra predicate for non-final errors. Final errors are declined regardless.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn build(self) -> RetryPolicy<E> {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.backoff,
            jitter: self.jitter,
            honor_retry_after: self.honor_retry_after,
            should_retry: self.should_retry,
        }
    }
}

impl<E: Retryable> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Policy that never retries.
pub fn never<E>() -> impl RetryAfter<E> + Clone {
    |_: &E, _: u32| RetryDecision::Decline
}
