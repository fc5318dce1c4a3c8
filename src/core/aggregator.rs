//! Site-wide attack counters.
//!
//! Two windowed counters live in the shared store:
//!
//! * `attack:total` counts requests that passed every check in the current
//!   detection window. Despite the name it does not include denied requests;
//!   the alert threshold is therefore a threshold on admitted traffic.
//! * `attack:blocked` counts requests denied by any check in the window.
//!
//! The first increment of a window arms the TTL. Later increments leave it
//! alone, so a counter resets exactly one window after its first hit even
//! under constant traffic.

use std::sync::Arc;
use std::time::Duration;

use crate::store::{Store, StoreError};

pub const TOTAL_KEY: &str = "attack:total";
pub const BLOCKED_KEY: &str = "attack:blocked";

/// Counter values read after an increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttackSnapshot {
    pub total: u64,
    pub blocked: u64,
}

pub struct AttackAggregator {
    store: Arc<dyn Store>,
    window: Duration,
}

impl AttackAggregator {
    pub fn new(store: Arc<dyn Store>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a denied request.
    pub async fn record_blocked(&self) -> Result<(), StoreError> {
        self.bump(BLOCKED_KEY).await.map(|_| ())
    }

    /// Count a passed request and return both counters.
    ///
    /// The read is a separate round trip from the increment, so under load
    /// the snapshot can be slightly ahead of or behind this request's own
    /// increment.
    pub async fn record_passed(&self) -> Result<AttackSnapshot, StoreError> {
        self.bump(TOTAL_KEY).await?;
        self.snapshot().await
    }

    /// Read both counters without touching them.
    pub async fn snapshot(&self) -> Result<AttackSnapshot, StoreError> {
        let (total, blocked) =
            futures::try_join!(self.store.get(TOTAL_KEY), self.store.get(BLOCKED_KEY))?;

        Ok(AttackSnapshot {
            total: total.unwrap_or(0).max(0) as u64,
            blocked: blocked.unwrap_or(0).max(0) as u64,
        })
    }

    async fn bump(&self, key: &str) -> Result<i64, StoreError> {
        let count = self.store.incr(key).await?;
        self.store.expire_nx(key, self.window).await?;
        Ok(count)
    }
}
