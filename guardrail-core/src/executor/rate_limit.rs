//! Client-side enforcement of declared rate limits

use std::collections::{HashMap, VecDeque};
use tokio::time::{Duration, Instant};

use crate::document::RateLimit;

/// Per-operation sliding windows
///
/// Owned by a single executor, so no locking. `acquire` waits until the
/// operation has a free slot in its window and never fails.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for a slot for `op_id` under `limit`; returns the time waited
    pub async fn acquire(&mut self, op_id: &str, limit: &RateLimit) -> Duration {
        if limit.max_requests == 0 {
            return Duration::ZERO;
        }

        let window = limit.window();
        let sent = self.windows.entry(op_id.to_string()).or_default();
        let mut waited = Duration::ZERO;

        loop {
            let now = Instant::now();
            while sent.front().is_some_and(|t| now.duration_since(*t) >= window) {
                sent.pop_front();
            }

            if (sent.len() as u32) < limit.max_requests {
                sent.push_back(now);
                return waited;
            }

            let Some(oldest) = sent.front().copied() else {
                continue;
            };
            let wait = window.saturating_sub(now.duration_since(oldest));
            tracing::debug!(operation = op_id, ?wait, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_window() {
        let mut limiter = RateLimiter::new();
        let limit = RateLimit::new(2, Duration::from_secs(1));

        assert_eq!(limiter.acquire("op", &limit).await, Duration::ZERO);
        assert_eq!(limiter.acquire("op", &limit).await, Duration::ZERO);

        let start = Instant::now();
        let waited = limiter.acquire("op", &limit).await;
        assert_eq!(waited, Duration::from_secs(1));
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_are_per_operation() {
        let mut limiter = RateLimiter::new();
        let limit = RateLimit::new(1, Duration::from_secs(5));

        limiter.acquire("a", &limit).await;
        assert_eq!(limiter.acquire("b", &limit).await, Duration::ZERO);
    }
}
