//! Retry delay computation
//!
//! Exponential backoff with a configurable ceiling and equal jitter. The
//! schedule is a plain iterator so callers drive the actual sleeping.

use crate::config::MediaConfig;
use rand::Rng;
use std::time::Duration;

/// Retry policy for media downloads
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per file, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Ceiling on any computed delay
    pub max_delay: Duration,

    /// Apply equal jitter to computed delays
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &MediaConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: true,
        }
    }

    /// Computes the delay before retry number `attempt` (1-based)
    ///
    /// The raw delay doubles per attempt and is clamped to `max_delay`.
    /// With jitter enabled the result is `d/2 + random(0..d/2)`, which
    /// stays under the ceiling.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let raw = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent));
        let capped = raw.min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let half = capped / 2;
        let spread = half.as_millis() as u64;
        if spread == 0 {
            return capped;
        }
        half + Duration::from_millis(rand::rng().random_range(0..spread))
    }

    /// Returns the delays for every retry this policy allows
    pub fn schedule(&self) -> RetrySchedule {
        RetrySchedule {
            policy: *self,
            next_attempt: 1,
        }
    }
}

/// Iterator over the retry delays of a policy
///
/// Yields `max_attempts - 1` delays: a policy of N attempts sleeps N-1
/// times.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    next_attempt: u32,
}

impl Iterator for RetrySchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next_attempt >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_for(self.next_attempt);
        self.next_attempt += 1;
        Some(delay)
    }
}
