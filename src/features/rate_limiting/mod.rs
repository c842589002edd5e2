//! # Rate Limiting Feature
//!
//! Per-sender inbound flood control. Uses a sliding window over recent
//! message timestamps with DashMap for thread-safe concurrent access, so
//! one chatty contact cannot burn the classifier quota for everyone.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.6.0
//! - **Toggleable**: false

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct RateLimiter {
    requests: DashMap<String, Vec<Instant>>,
    max_requests: usize,
    time_window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        RateLimiter {
            requests: DashMap::new(),
            max_requests,
            time_window,
        }
    }

    /// Record one inbound message from `sender` and report whether it is
    /// within the window. Denied messages are not recorded.
    pub fn check(&self, sender: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.requests.entry(sender.to_string()).or_default();

        entry.retain(|&time| now.duration_since(time) < self.time_window);

        if entry.len() >= self.max_requests {
            false
        } else {
            entry.push(now);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn test_allows_under_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));

        assert!(limiter.check("911"));
        assert!(limiter.check("911"));
        assert!(limiter.check("911"));
    }

    #[test]
    fn test_blocks_over_limit() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));

        assert!(limiter.check("911"));
        assert!(limiter.check("911"));
        assert!(!limiter.check("911"));
    }

    #[test]
    fn test_senders_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));

        assert!(limiter.check("911"));
        assert!(limiter.check("922"));
        assert!(!limiter.check("911"));
        assert!(!limiter.check("922"));
    }

    #[tokio::test]
    async fn test_resets_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));

        assert!(limiter.check("911"));
        assert!(!limiter.check("911"));

        sleep(Duration::from_millis(150)).await;
        assert!(limiter.check("911"));
    }
}
