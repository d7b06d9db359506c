//! Waiting on a [`Clock`](crate::Clock) from async code.
//!
//! [`Delay`] turns a callback-based timer into a future. Dropping the future before it resolves
//! clears the timer, so a cancelled call leaves nothing scheduled behind it.

use crate::clock::{Clock, TimerHandle};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// The timer was cleared before it fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timer cleared before it fired")]
pub struct TimerCleared;

/// Future resolving once a clock timer fires.
#[derive(Debug)]
pub struct Delay {
    fired: oneshot::Receiver<()>,
    clock: Arc<dyn Clock>,
    handle: Option<TimerHandle>,
}

impl Delay {
    /// Schedule a timer on `clock` and wait for it.
    pub fn new(clock: Arc<dyn Clock>, duration: Duration) -> Self {
        let (tx, fired) = oneshot::channel();
        let handle = clock.set_timeout(
            duration,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        Self { fired, clock, handle: Some(handle) }
    }
}

impl Future for Delay {
    type Output = Result<(), TimerCleared>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let result = match Pin::new(&mut this.fired).poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };
        this.handle = None;
        Poll::Ready(result.map_err(|_| TimerCleared))
    }
}

impl Drop for Delay {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.clock.clear_timeout(handle);
        }
    }
}

/// Wait `duration` on `clock`.
pub async fn sleep(clock: Arc<dyn Clock>, duration: Duration) -> Result<(), TimerCleared> {
    Delay::new(clock, duration).await
}
