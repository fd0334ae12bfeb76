//! Client-side request spacing
//!
//! The remote service enforces a shared rate limit, so every call made by
//! the client (including retries) is spaced by a minimum interval.

use std::time::{Duration, Instant};

/// Tracks request timing against a minimum interval
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_request_time: Option<Instant>,
    request_count: u64,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request_time: None,
            request_count: 0,
        }
    }

    /// Checks if a request can be made now
    pub fn can_request(&self, now: Instant) -> bool {
        self.time_until_next_request(now).is_none()
    }

    /// Records that a request was made
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        if let Some(last) = self.last_request_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Some(self.min_interval - elapsed);
            }
        }
        None
    }

    /// Total requests recorded so far
    pub fn request_count(&self) -> u64 {
        self.request_count
    }
}
