//! Per-client rate limiting for the edge filter.
//!
//! This module caps the number of admitted requests per client key within a
//! trailing window. All state lives in the backing store, and the
//! check-and-record is a single atomic store operation, so concurrent
//! requests for the same key can never oversubscribe the capacity.

use std::sync::Arc;
use std::time::Duration;

use crate::models::RateLimitConfig;
use crate::store::{Store, StoreError};
use crate::utils::format_store_key;

/// Result of a rate limit check for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    /// Whether the request was admitted
    pub admitted: bool,
    /// Configured capacity per window
    pub limit: u32,
    /// Admissions left in the current window
    pub remaining: u32,
    /// Time until capacity frees up again
    pub reset_after: Duration,
}

/// Sliding-window rate limiter backed by the shared store
pub struct RateLimiter {
    /// Backing store
    store: Arc<dyn Store>,
    /// Rate limit configuration
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter instance
    pub fn new(store: Arc<dyn Store>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Check whether a request should be admitted, recording it if so
    ///
    /// # Arguments
    ///
    /// * `key` - The key to rate limit (e.g., client IP address)
    ///
    /// # Returns
    ///
    /// * `Ok(outcome)` with `outcome.admitted == false` once the key is at capacity
    /// * `Err(StoreError)` if the backing store could not be reached in time
    pub async fn check(&self, key: &str) -> Result<RateLimitOutcome, StoreError> {
        let window_key = format_store_key("ratelimit", key);
        let admission = self
            .store
            .sliding_window(&window_key, self.config.capacity, self.config.window())
            .await?;

        Ok(RateLimitOutcome {
            admitted: admission.admitted,
            limit: self.config.capacity,
            remaining: admission.remaining,
            reset_after: admission.reset_after,
        })
    }

    /// Boolean form of [`RateLimiter::check`]
    pub async fn admit(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.check(key).await?.admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockStore, WindowAdmission};
    use tokio::time;

    fn limiter(store: Arc<dyn Store>) -> RateLimiter {
        RateLimiter::new(
            store,
            RateLimitConfig {
                capacity: 10,
                window_seconds: 10,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_request_in_window_is_denied() {
        let limiter = limiter(Arc::new(MemoryStore::new()));

        for i in 0..10 {
            let outcome = limiter.check("203.0.113.7").await.unwrap();
            assert!(outcome.admitted, "request {} should be admitted", i + 1);
            assert_eq!(outcome.remaining, 9 - i);
        }

        let outcome = limiter.check("203.0.113.7").await.unwrap();
        assert!(!outcome.admitted);
        assert_eq!(outcome.limit, 10);
        assert_eq!(outcome.remaining, 0);

        // Other keys are unaffected.
        assert!(limiter.admit("198.51.100.1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_frees_up_after_window() {
        let limiter = limiter(Arc::new(MemoryStore::new()));

        for _ in 0..10 {
            assert!(limiter.admit("k").await.unwrap());
        }
        assert!(!limiter.admit("k").await.unwrap());

        time::advance(Duration::from_secs(10)).await;
        assert!(limiter.admit("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_never_exceed_capacity() {
        let limiter = Arc::new(limiter(Arc::new(MemoryStore::new())));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.admit("shared").await.unwrap() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn test_store_key_and_window_are_passed_through() {
        let mut store = MockStore::new();
        store
            .expect_sliding_window()
            .withf(|key, capacity, window| {
                key == "ratelimit:10.0.0.1" && *capacity == 10 && *window == Duration::from_secs(10)
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(WindowAdmission {
                    admitted: false,
                    remaining: 0,
                    reset_after: Duration::from_secs(3),
                })
            });

        let outcome = limiter(Arc::new(store)).check("10.0.0.1").await.unwrap();
        assert!(!outcome.admitted);
        assert_eq!(outcome.reset_after, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut store = MockStore::new();
        store
            .expect_sliding_window()
            .returning(|_, _, _| Err(StoreError::Timeout(Duration::from_millis(500))));

        let result = limiter(Arc::new(store)).admit("k").await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }
}
