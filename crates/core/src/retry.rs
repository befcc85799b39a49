//! Explicit retry policy — backoff as a pure function of the attempt count.

use chrono::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_backoff_ms: u64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded(base_backoff_ms: u64) -> Self {
        Self {
            base_backoff_ms,
            max_attempts: None,
        }
    }

    pub fn bounded(base_backoff_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_backoff_ms,
            max_attempts: Some(max_attempts),
        }
    }

    /// Delay to wait before the given attempt (1-based), or `None` when the
    /// policy is exhausted and the work should be dropped.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt > max => None,
            _ => Some(Duration::milliseconds(self.base_backoff_ms as i64)),
        }
    }
}
