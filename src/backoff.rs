//! Capped exponential backoff for stream reconnection.
//!
//! Attempt `k` (1-indexed) waits `min(initial * 2^(k-1), max)`. With the
//! defaults that is 1s, 2s, 4s, 8s, 16s, 30s, 30s... for at most ten
//! attempts. A successful handshake resets the counter.

use std::time::Duration;

use crate::constants;

/// Reconnection timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry; also the floor the backoff resets to.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Attempts allowed before the transport stops retrying.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: constants::RECONNECT_INITIAL_DELAY,
            max_delay: constants::RECONNECT_MAX_DELAY,
            max_attempts: constants::MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for 1-indexed `attempt`.
    ///
    /// Saturates instead of overflowing for large attempt numbers.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Attempt counter driven by a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    /// Create a counter at zero attempts.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Claim the next attempt.
    ///
    /// Increments the counter and returns `(attempt, delay)`, or `None`
    /// once the cap is reached. The counter never exceeds the cap.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.policy.delay_for_attempt(self.attempts)))
    }

    /// Back to zero attempts and the floor delay.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts claimed since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The policy this counter follows.
    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}
