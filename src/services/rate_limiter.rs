use crate::models::errors::RelayError;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed in one window
    pub max_requests: u32,
    /// Length of a fixed window
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_duration: Duration::from_secs(60),
        }
    }
}

/// Counter for one source address in the current window
#[derive(Debug, Clone)]
struct WindowCounter {
    started: Instant,
    count: u32,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            count: 0,
        }
    }

    fn is_expired(&self, now: Instant, window_duration: Duration) -> bool {
        now.duration_since(self.started) >= window_duration
    }

    fn resets_in(&self, now: Instant, window_duration: Duration) -> Duration {
        window_duration.saturating_sub(now.duration_since(self.started))
    }
}

/// Fixed-window rate limiter keyed by source address.
///
/// The window starts with the first request from an address and resets
/// entirely once it has elapsed, so a client can burst up to twice the
/// limit across a boundary.
#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<RwLock<HashMap<String, WindowCounter>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Creates a new rate limiter with default configuration
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Creates a new rate limiter with custom configuration
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Counts a request and reports whether it fits in the current window
    pub async fn allow(&self, source_address: &str) -> bool {
        let now = Instant::now();
        let mut counters = self.counters.write().await;

        let counter = counters
            .entry(source_address.to_string())
            .or_insert_with(|| WindowCounter::new(now));

        if counter.is_expired(now, self.config.window_duration) {
            *counter = WindowCounter::new(now);
        }

        if counter.count >= self.config.max_requests {
            return false;
        }

        counter.count += 1;
        true
    }

    /// Same as [`allow`](Self::allow) but reports a denial as an error
    pub async fn check_rate_limit(&self, source_address: &str) -> Result<(), RelayError> {
        if self.allow(source_address).await {
            Ok(())
        } else {
            let retry_after = self.retry_after(source_address).await;
            Err(RelayError::rate_limited(retry_after.as_secs().max(1)))
        }
    }

    /// Time until the current window for an address resets
    pub async fn retry_after(&self, source_address: &str) -> Duration {
        let now = Instant::now();
        let counters = self.counters.read().await;

        counters
            .get(source_address)
            .map(|counter| counter.resets_in(now, self.config.window_duration))
            .unwrap_or_default()
    }

    /// Gets the remaining requests for an address in its current window
    pub async fn remaining(&self, source_address: &str) -> u32 {
        let now = Instant::now();
        let counters = self.counters.read().await;

        match counters.get(source_address) {
            Some(counter) if !counter.is_expired(now, self.config.window_duration) => {
                self.config.max_requests.saturating_sub(counter.count)
            }
            _ => self.config.max_requests,
        }
    }

    /// Drops counters whose window has elapsed
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut counters = self.counters.write().await;
        let initial_count = counters.len();

        counters.retain(|_, counter| !counter.is_expired(now, self.config.window_duration));

        let removed_count = initial_count - counters.len();

        if removed_count > 0 {
            tracing::debug!("Cleaned up {} expired rate limit counters", removed_count);
        }

        removed_count
    }

    /// Number of addresses currently tracked
    pub async fn tracked_addresses(&self) -> usize {
        self.counters.read().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper function to extract identifier from IP address
pub fn identifier_from_ip(ip: IpAddr) -> String {
    ip.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixty_allowed_then_denied() {
        let limiter = RateLimiter::new();

        tokio_test::block_on(async {
            for _ in 0..60 {
                assert!(limiter.allow("203.0.113.7").await);
            }

            assert!(!limiter.allow("203.0.113.7").await);
            assert!(!limiter.allow("203.0.113.7").await);
        });
    }

    #[tokio::test]
    async fn test_addresses_have_separate_windows() {
        let config = RateLimitConfig {
            max_requests: 2,
            window_duration: Duration::from_secs(60),
        };
        let limiter = RateLimiter::with_config(config);

        assert!(limiter.allow("10.0.0.1").await);
        assert!(limiter.allow("10.0.0.1").await);
        assert!(limiter.allow("10.0.0.2").await);
        assert!(limiter.allow("10.0.0.2").await);

        assert!(!limiter.allow("10.0.0.1").await);
        assert!(!limiter.allow("10.0.0.2").await);
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let config = RateLimitConfig {
            max_requests: 2,
            window_duration: Duration::from_millis(100),
        };
        let limiter = RateLimiter::with_config(config);

        assert!(limiter.allow("10.0.0.1").await);
        assert!(limiter.allow("10.0.0.1").await);
        assert!(!limiter.allow("10.0.0.1").await);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(limiter.allow("10.0.0.1").await);
        assert_eq!(limiter.remaining("10.0.0.1").await, 1);
    }

    #[tokio::test]
    async fn test_window_is_fixed_not_sliding() {
        let config = RateLimitConfig {
            max_requests: 2,
            window_duration: Duration::from_millis(200),
        };
        let limiter = RateLimiter::with_config(config);

        assert!(limiter.allow("10.0.0.1").await);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(limiter.allow("10.0.0.1").await);

        // The window started with the first call, so it resets ~80ms later
        // even though the second call was recent.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(limiter.allow("10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_check_rate_limit_reports_retry_after() {
        let config = RateLimitConfig {
            max_requests: 1,
            window_duration: Duration::from_secs(60),
        };
        let limiter = RateLimiter::with_config(config);

        assert!(limiter.check_rate_limit("10.0.0.1").await.is_ok());

        match limiter.check_rate_limit("10.0.0.1").await {
            Err(RelayError::RateLimitExceeded {
                retry_after_seconds,
            }) => {
                assert!(retry_after_seconds >= 1 && retry_after_seconds <= 60);
            }
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remaining_counts_down() {
        let config = RateLimitConfig {
            max_requests: 5,
            window_duration: Duration::from_secs(60),
        };
        let limiter = RateLimiter::with_config(config);

        assert_eq!(limiter.remaining("user1").await, 5);
        limiter.allow("user1").await;
        assert_eq!(limiter.remaining("user1").await, 4);
        limiter.allow("user1").await;
        assert_eq!(limiter.remaining("user1").await, 3);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let config = RateLimitConfig {
            max_requests: 5,
            window_duration: Duration::from_millis(100),
        };
        let limiter = RateLimiter::with_config(config);

        limiter.allow("user1").await;
        limiter.allow("user2").await;
        limiter.allow("user3").await;
        assert_eq!(limiter.tracked_addresses().await, 3);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let removed = limiter.cleanup_expired().await;
        assert_eq!(removed, 3);
        assert_eq!(limiter.tracked_addresses().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_not_undercounted() {
        let limiter = RateLimiter::new();
        let mut handles = Vec::new();

        for _ in 0..100 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.allow("10.9.9.9").await }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 60);
    }

    #[test]
    fn test_identifier_from_ip() {
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(identifier_from_ip(ip), "192.0.2.1");
    }
}
