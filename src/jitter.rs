//! Jitter strategies for custom retry policies.
//!
//! - `None`: deterministic delays (the default policy uses this).
//! - `Full`: uniform in `[0, delay]`, spreads clients out the most.
//! - `Equal`: uniform in `[delay/2, delay]`, keeps a floor under the delay.
//!
//! Jitter only ever shortens a delay and always yields whole milliseconds, so jittered decisions
//! remain valid retry decisions.

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy applied to a backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Use the backoff delay as is.
    #[default]
    None,
    /// Random between 0 and the delay.
    Full,
    /// Random between half the delay and the delay.
    Equal,
}

impl Jitter {
    pub fn full() -> Self {
        Jitter::Full
    }

    pub fn equal() -> Self {
        Jitter::Equal
    }

    /// Apply jitter using the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Apply jitter with a caller-supplied RNG (for testing).
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Jitter::None => Duration::from_millis(millis),
            _ if millis == 0 => Duration::ZERO,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=millis)),
            Jitter::Equal => Duration::from_millis(rng.random_range(millis / 2..=millis)),
        }
    }
}
