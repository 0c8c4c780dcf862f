//! Reconnect backoff

use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(32);

/// Attempt counter plus next-retry deadline.
///
/// Delay after the n-th consecutive failure is `base * 2^(n-1)`, capped at
/// `max`: with the defaults 2, 4, 8, 16, 32, 32, ... seconds. Any success
/// resets the counter. There is no give-up point.
#[derive(Debug, Clone)]
pub struct RetryState {
    base: Duration,
    max: Duration,
    attempt: u32,
    next_deadline: Option<Instant>,
}

impl RetryState {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
            next_deadline: None,
        }
    }

    /// Consecutive failures since the last success
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    /// Delay that follows the given (1-based) failure count
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Record a failure at `now` and return how long to wait
    pub fn on_failure(&mut self, now: Instant) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.delay_for(self.attempt);
        self.next_deadline = Some(now + delay);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.next_deadline = None;
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX)
    }
}
