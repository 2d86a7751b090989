//! Bounded exponential backoff for service recovery.
//!
//! For attempt index `n` (0-based) the base delay is
//! `min(base_delay * 2^n, max_delay)`. Jitter scales that base by a random
//! factor in `[1 - jitter, 1 + jitter]`. Once `n >= max_attempts` the policy
//! reports [`RetryDecision::Exhausted`] and automatic recovery stops.
//!
//! The base delay depends only on the attempt index, so jitter never feeds
//! back into later delays.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use overseer::domain::recovery::{RecoveryPolicy, RetryDecision};
//!
//! let policy = RecoveryPolicy {
//!     max_attempts: 6,
//!     base_delay: Duration::from_secs(1),
//!     max_delay: Duration::from_secs(30),
//!     jitter: 0.0,
//! };
//!
//! assert_eq!(policy.base_delay_for(3), Duration::from_secs(8));
//! assert_eq!(policy.base_delay_for(5), Duration::from_secs(30));
//! assert_eq!(policy.decide(6), RetryDecision::Exhausted);
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Outcome of consulting the policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after waiting `delay`.
    Retry { delay: Duration },
    /// The retry budget is spent.
    Exhausted,
}

impl RetryDecision {
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// Restart parameters of one service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Automatic retries allowed before the service is marked failed.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap applied to the exponential base delay.
    pub max_delay: Duration,
    /// Jitter fraction in `[0.0, 1.0]`.
    pub jitter: f64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RecoveryPolicy {
    /// Base delay for `attempt`, before jitter.
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Decide whether to retry after failed attempt `attempt`, using a random
    /// jitter sample.
    #[must_use]
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        let sample = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        self.decide_with_sample(attempt, sample)
    }

    /// Decide with an explicit jitter sample in `[-1.0, 1.0]`.
    ///
    /// A sample of `-1.0` applies the full negative jitter, `1.0` the full
    /// positive jitter and `0.0` none.
    #[must_use]
    pub fn decide_with_sample(&self, attempt: u32, sample: f64) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }

        let base = self.base_delay_for(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0) * sample.clamp(-1.0, 1.0);
        let scaled = base.as_secs_f64() * (1.0 + jitter);
        let delay = if scaled.is_finite() && scaled > 0.0 {
            Duration::from_secs_f64(scaled)
        } else {
            Duration::ZERO
        };

        RetryDecision::Retry { delay }
    }
}
