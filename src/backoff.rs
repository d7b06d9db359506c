//! Backoff schedules for retry policies.
//!
//! A schedule maps the number of the attempt that just failed (1-based) to the delay before the
//! next one. Four shapes are provided:
//! - `constant`: the same delay after every failure.
//! - `linear`: `base * attempt`.
//! - `exponential`: `base * 2^(attempt - 1)`.
//! - `stepped`: an explicit table, with a fallback once the table runs out. The client's default
//!   schedule is `stepped([0ms, 100ms, 2s], 10s)`.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use paylike_client::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100))
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(6), Duration::from_secs(2)); // capped
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("with_max is only valid for linear or exponential backoff")]
    MaxNotSupported,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Schedule {
    Constant(Duration),
    Linear { base: Duration, max: Option<Duration> },
    Exponential { base: Duration, max: Option<Duration> },
    Stepped { steps: Arc<[Duration]>, then: Duration },
}

/// Delay schedule indexed by failed-attempt number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    schedule: Schedule,
}

impl Backoff {
    /// Same delay after every failure.
    pub fn constant(delay: Duration) -> Self {
        Self { schedule: Schedule::Constant(delay) }
    }

    /// Delay grows by `base` per failure.
    pub fn linear(base: Duration) -> Self {
        Self { schedule: Schedule::Linear { base, max: None } }
    }

    /// Delay doubles per failure, starting at `base`.
    pub fn exponential(base: Duration) -> Self {
        Self { schedule: Schedule::Exponential { base, max: None } }
    }

    /// `steps[n - 1]` after the n-th failure, `then` once the table is exhausted.
    pub fn stepped(steps: impl Into<Vec<Duration>>, then: Duration) -> Self {
        let steps: Vec<Duration> = steps.into();
        Self { schedule: Schedule::Stepped { steps: steps.into(), then } }
    }

    /// Cap a linear or exponential schedule.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.schedule {
            Schedule::Linear { base, max: existing }
            | Schedule::Exponential { base, max: existing } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            Schedule::Constant(_) | Schedule::Stepped { .. } => Err(BackoffError::MaxNotSupported),
        }
    }

    /// Delay after the `attempt`-th failure. `attempt` is 1-based; `0` is treated as `1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match &self.schedule {
            Schedule::Constant(delay) => *delay,
            Schedule::Linear { base, max } => {
                let linear = base.checked_mul(attempt).unwrap_or(MAX_BACKOFF);
                max.map_or(linear, |m| linear.min(m))
            }
            Schedule::Exponential { base, max } => {
                let multiplier = 2u128.saturating_pow(attempt - 1);
                let nanos = base.as_nanos().saturating_mul(multiplier);
                let exp = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
                max.map_or(exp, |m| exp.min(m))
            }
            Schedule::Stepped { steps, then } => {
                steps.get((attempt - 1) as usize).copied().unwrap_or(*then)
            }
        };
        delay.min(MAX_BACKOFF)
    }
}

impl fmt::Display for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schedule {
            Schedule::Constant(d) => write!(f, "constant({:?})", d),
            Schedule::Linear { base, .. } => write!(f, "linear({:?})", base),
            Schedule::Exponential { base, .. } => write!(f, "exponential({:?})", base),
            Schedule::Stepped { steps, then } => write!(f, "stepped({:?}, then {:?})", steps, then),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn stepped_follows_table_then_fallback() {
        let backoff = Backoff::stepped([ms(0), ms(100), ms(2000)], ms(10_000));
        assert_eq!(backoff.delay(1), ms(0));
        assert_eq!(backoff.delay(2), ms(100));
        assert_eq!(backoff.delay(3), ms(2000));
        assert_eq!(backoff.delay(4), ms(10_000));
        assert_eq!(backoff.delay(10), ms(10_000));
        assert_eq!(backoff.delay(u32::MAX), ms(10_000));
    }

    #[test]
    fn empty_steps_always_fall_back() {
        let backoff = Backoff::stepped(Vec::new(), ms(150));
        assert_eq!(backoff.delay(1), ms(150));
        assert_eq!(backoff.delay(7), ms(150));
    }

    #[test]
    fn constant_backoff_returns_same_delay() {
        let backoff = Backoff::constant(Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(100), Duration::from_secs(1));
    }

    #[test]
    fn linear_backoff_increases_linearly() {
        let backoff = Backoff::linear(ms(100));
        assert_eq!(backoff.delay(1), ms(100));
        assert_eq!(backoff.delay(3), ms(300));
        assert_eq!(backoff.delay(10), ms(1000));
    }

    #[test]
    fn attempt_zero_is_treated_as_first_failure() {
        assert_eq!(Backoff::linear(ms(50)).delay(0), ms(50));
        assert_eq!(Backoff::exponential(ms(50)).delay(0), ms(50));
    }

    #[test]
    fn exponential_backoff_doubles_and_respects_max() {
        let backoff = Backoff::exponential(ms(100)).with_max(Duration::from_secs(1)).unwrap();
        assert_eq!(backoff.delay(1), ms(100));
        assert_eq!(backoff.delay(2), ms(200));
        assert_eq!(backoff.delay(4), ms(800));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(40), Duration::from_secs(1));
    }

    #[test]
    fn overflow_saturates() {
        assert_eq!(Backoff::exponential(Duration::from_secs(1)).delay(u32::MAX), MAX_BACKOFF);
        assert_eq!(Backoff::linear(Duration::from_secs(u64::MAX / 2)).delay(1_000), MAX_BACKOFF);
    }

    #[test]
    fn with_max_validation() {
        assert_eq!(
            Backoff::constant(ms(5)).with_max(ms(1)).unwrap_err(),
            BackoffError::MaxNotSupported
        );
        assert_eq!(
            Backoff::stepped([ms(1)], ms(2)).with_max(ms(10)).unwrap_err(),
            BackoffError::MaxNotSupported
        );
        assert_eq!(Backoff::linear(ms(5)).with_max(Duration::ZERO).unwrap_err(),
            BackoffError::MaxMustBePositive);
        assert!(matches!(
            Backoff::linear(ms(100)).with_max(ms(50)),
            Err(BackoffError::MaxLessThanBase { .. })
        ));
    }
}
