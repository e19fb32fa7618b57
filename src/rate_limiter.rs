//! Per-host politeness scheduler. Mirrors `crawlerlib/rate.py::RateLimiter`:
//! the lock is held only to read and update `next_allowed_time`; the
//! sleep itself always happens outside the lock so different-host
//! requests never block each other.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    delay: Duration,
    next_allowed: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_allowed: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks the calling task until `host`'s next request slot arrives.
    /// A no-op when the configured delay is zero.
    pub async fn wait_turn(&self, host: &str) {
        if self.delay.is_zero() {
            return;
        }
        let sleep_for = {
            let mut map = self.next_allowed.lock().expect("rate limiter lock poisoned");
            let now = Instant::now();
            let next = map.get(host).copied().unwrap_or(now);
            let sleep_for = next.saturating_duration_since(now);
            map.insert(host.to_string(), next.max(now) + self.delay);
            sleep_for
        };
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_call_for_same_host_observes_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        limiter.wait_turn("a.com").await;
        let start = Instant::now();
        limiter.wait_turn("a.com").await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(490), "waited only {waited:?}");
        assert!(waited <= Duration::from_millis(600), "waited too long: {waited:?}");
    }

    #[tokio::test]
    async fn distinct_hosts_do_not_interfere() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        limiter.wait_turn("a.com").await;
        let start = Instant::now();
        limiter.wait_turn("b.com").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn zero_delay_is_a_no_op() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();
        limiter.wait_turn("a.com").await;
        limiter.wait_turn("a.com").await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
