//! Backing store for the edge filter.
//!
//! All cross-request state (rate-limit logs, attack counters and the alert
//! deduplication flag) lives behind the [`Store`] trait. The filter process
//! itself holds nothing authoritative, so any number of instances can share
//! one store.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Errors that can occur while talking to the backing store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Unexpected store reply: {0}")]
    Unexpected(String),
}

/// Result of one atomic sliding-window admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAdmission {
    /// Whether this attempt was recorded in the window
    pub admitted: bool,
    /// Admissions still available in the current window
    pub remaining: u32,
    /// Time until the oldest admission leaves the window
    pub reset_after: Duration,
}

/// Primitive operations the filter needs from its backing store.
///
/// Every method is a single round trip and atomic on the store side.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically increment a counter, creating it at zero first if needed.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Arm an expiry on `key` only if it has none yet.
    ///
    /// Returns `true` when the expiry was set by this call.
    async fn expire_nx(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Read a counter.
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Set `key` to `value` with `ttl`, only if it does not exist.
    ///
    /// Returns `true` when this call created the key.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Prune the admission log at `key` to the trailing `window`, then record
    /// one admission if fewer than `capacity` remain. Check and record happen
    /// as one atomic step.
    async fn sliding_window(
        &self,
        key: &str,
        capacity: u32,
        window: Duration,
    ) -> Result<WindowAdmission, StoreError>;
}

/// Bound a store call by `limit`, mapping an elapsed timer to [`StoreError::Timeout`].
pub(crate) async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Whole seconds for a TTL, never zero.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_through_result() {
        let value = with_timeout(Duration::from_secs(1), async { Ok::<_, StoreError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_elapses() {
        let result = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await;

        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == Duration::from_millis(50)));
    }

    #[test]
    fn test_ttl_secs_rounds_up_to_one() {
        assert_eq!(ttl_secs(Duration::from_millis(200)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(60)), 60);
    }
}
