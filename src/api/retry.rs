//! Exponential backoff between retry attempts

use std::time::Duration;

/// Doubling delay schedule, capped at a maximum
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(20)));
        Duration::from_millis(exponential_delay.min(self.max_ms))
    }

    /// Delay for `attempt`, stretched to honour a server-requested wait
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.delay(attempt);
        match retry_after {
            Some(hint) => delay.max(hint.min(Duration::from_millis(self.max_ms))),
            None => delay,
        }
    }
}
