//! Fixed-window rate limiting
//!
//! One counter per (scope, minute window). The increment and the returned
//! count are a single atomic store operation, so N racing callers observe N
//! distinct sequential counts; there is no check-then-increment step to go
//! stale. Old windows age out via the store TTL.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::store::AtomicKv;
use crate::types::{Result, TurnstileError};

/// Window width in seconds
pub const WINDOW_SECONDS: u64 = 60;

/// How long a window's counter is kept around. Windows older than this are
/// dead weight; the store TTL is their garbage collection.
pub const WINDOW_RETENTION: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Fixed-window hit counter over the atomic KV capability
pub struct RateLimiter {
    store: Arc<dyn AtomicKv>,
    limit_per_window: i64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn AtomicKv>, limit_per_window: i64) -> Self {
        Self {
            store,
            limit_per_window,
        }
    }

    pub fn limit_per_window(&self) -> i64 {
        self.limit_per_window
    }

    /// Truncate a unix timestamp to its minute window
    fn window_for(unix_secs: u64) -> u64 {
        unix_secs / WINDOW_SECONDS
    }

    fn current_window() -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self::window_for(now)
    }

    /// Record a hit for `scope`, returning the post-increment count for the
    /// current window.
    pub async fn hit(&self, scope: &str) -> Result<i64> {
        let key = format!("rate:{}:{}", scope, Self::current_window());
        self.store.incr_and_get(&key, WINDOW_RETENTION).await
    }

    /// Record a hit and reject once the window's count exceeds the limit.
    pub async fn check(&self, scope: &str) -> Result<()> {
        let count = self.hit(scope).await?;
        if count > self.limit_per_window {
            debug!(scope, count, limit = self.limit_per_window, "rate limited");
            return Err(TurnstileError::RateLimited(
                "rate limit exceeded, try again later".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;

    fn limiter(limit: i64) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryKv::new()), limit)
    }

    #[test]
    fn windows_truncate_to_whole_minutes() {
        assert_eq!(RateLimiter::window_for(0), 0);
        assert_eq!(RateLimiter::window_for(59), 0);
        assert_eq!(RateLimiter::window_for(60), 1);
        assert_eq!(RateLimiter::window_for(119), 1);
        assert_eq!(RateLimiter::window_for(120), 2);
    }

    #[tokio::test]
    async fn counts_are_monotonic_within_a_window() {
        let limiter = limiter(100);
        for expected in 1..=5 {
            assert_eq!(limiter.hit("img:1.2.3.4").await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn the_hit_beyond_the_limit_is_rejected() {
        let limiter = limiter(3);
        for _ in 0..3 {
            limiter.check("img:1.2.3.4").await.unwrap();
        }
        let over = limiter.check("img:1.2.3.4").await;
        assert!(matches!(over, Err(TurnstileError::RateLimited(_))));
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let limiter = limiter(1);
        limiter.check("img:1.2.3.4").await.unwrap();
        limiter.check("img:5.6.7.8").await.unwrap();
        limiter.check("challenge:1.2.3.4").await.unwrap();

        let over = limiter.check("img:1.2.3.4").await;
        assert!(matches!(over, Err(TurnstileError::RateLimited(_))));
    }

    #[tokio::test]
    async fn concurrent_hits_receive_distinct_counts() {
        let limiter = Arc::new(limiter(1000));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.hit("img:racer").await }));
        }

        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap().unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=40).collect::<Vec<i64>>());
    }
}
