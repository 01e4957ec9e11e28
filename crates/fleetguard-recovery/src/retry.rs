//! Per-node exponential backoff state. Pure calculation, no I/O.

use std::time::Duration;

use tokio::time::Instant;

use fleetguard_types::RetryPolicy;

/// Attempt counter for one node's active recovery cycle.
///
/// `Idle → Attempting(n) → { discarded on success, escalated at n == max }`.
#[derive(Debug, Clone)]
pub struct RetryManager {
    policy: RetryPolicy,
    attempt_count: u32,
    last_attempt_at: Option<Instant>,
}

impl RetryManager {
    /// Start a cycle with no attempts recorded.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt_count: 0,
            last_attempt_at: None,
        }
    }

    /// Whether the policy allows another attempt.
    pub fn should_retry(&self) -> bool {
        self.attempt_count < self.policy.max_attempts()
    }

    /// Delay before the upcoming attempt, computed before it is recorded:
    /// zero for the first attempt, then
    /// `min(initial × multiplier^(n-1), max)` after `n` attempts.
    pub fn next_delay(&self) -> Duration {
        let initial = self.policy.initial_delay();
        if self.attempt_count == 0 || initial.is_zero() {
            return Duration::ZERO;
        }

        let max = self.policy.max_delay();
        let exponent = i32::try_from(self.attempt_count - 1).unwrap_or(i32::MAX);
        let secs = initial.as_secs_f64() * self.policy.backoff_multiplier().powi(exponent);
        if !secs.is_finite() || secs >= max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Count an attempt made now.
    pub fn record_attempt(&mut self) {
        self.attempt_count += 1;
        self.last_attempt_at = Some(Instant::now());
    }

    /// Zero the counter. Used on explicit cancellation only.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.last_attempt_at = None;
    }

    /// Attempts recorded in this cycle.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// When the most recent attempt was recorded.
    pub fn last_attempt_at(&self) -> Option<Instant> {
        self.last_attempt_at
    }

    /// The policy driving this cycle.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
