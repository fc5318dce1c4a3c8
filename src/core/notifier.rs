//! Attack alerting.
//!
//! When the passed-request counter crosses the threshold, one alert is sent
//! per detection window. The deduplication flag is claimed with a single
//! set-if-absent-with-TTL before sending, so concurrent requests (and other
//! filter instances) crossing the threshold together produce one alert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use metrics::increment_counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::aggregator::AttackSnapshot;
use crate::store::{Store, StoreError};

pub const NOTIFIED_KEY: &str = "attack:notified";

/// Errors that can occur while delivering a notification
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound text channel for alerts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), NotifyError>;
}

/// An attack observed in one detection window
#[derive(Debug, Clone, PartialEq)]
pub struct AttackAlert {
    pub total: u64,
    pub blocked: u64,
    pub window: Duration,
    pub detected_at: DateTime<Utc>,
}

impl AttackAlert {
    pub fn new(snapshot: AttackSnapshot, window: Duration) -> Self {
        Self {
            total: snapshot.total,
            blocked: snapshot.blocked,
            window,
            detected_at: Utc::now(),
        }
    }

    /// Requests that got through. Saturates at zero because the two counters
    /// are read separately.
    pub fn passed(&self) -> u64 {
        self.total.saturating_sub(self.blocked)
    }

    /// Average requests per second over the window
    pub fn strength(&self) -> f64 {
        self.total as f64 / self.window.as_secs_f64().max(1.0)
    }

    pub fn message(&self) -> String {
        format!(
            "🚨 DDoS ATTACK DETECTED 🚨\n\
             Attack strength: {:.1} req/s\n\
             Total requests: {}\n\
             Blocked: {}\n\
             Passed: {}\n\
             Window: {}s\n\
             Detected at: {}",
            self.strength(),
            self.total,
            self.blocked,
            self.passed(),
            self.window.as_secs(),
            self.detected_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

/// What [`Notifier::maybe_notify`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    BelowThreshold,
    AlreadyNotified,
    Sent,
    /// Flag claimed but no channel is configured
    NoChannel,
    /// Flag claimed, delivery failed and was dropped
    DeliveryFailed,
}

pub struct Notifier {
    store: Arc<dyn Store>,
    channel: Option<Arc<dyn NotificationChannel>>,
    threshold: u64,
    window: Duration,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn Store>,
        channel: Option<Arc<dyn NotificationChannel>>,
        threshold: u64,
        window: Duration,
    ) -> Self {
        Self {
            store,
            channel,
            threshold,
            window,
        }
    }

    /// Send one alert per window once `total` exceeds the threshold.
    ///
    /// Only a store failure while claiming the flag is returned as an error;
    /// delivery failures are logged and reported as
    /// [`NotifyOutcome::DeliveryFailed`]. There are no retries.
    pub async fn maybe_notify(&self, snapshot: AttackSnapshot) -> Result<NotifyOutcome, StoreError> {
        if snapshot.total <= self.threshold {
            return Ok(NotifyOutcome::BelowThreshold);
        }

        let claimed = self.store.set_nx_ex(NOTIFIED_KEY, "1", self.window).await?;
        if !claimed {
            return Ok(NotifyOutcome::AlreadyNotified);
        }

        let alert = AttackAlert::new(snapshot, self.window);
        let channel = match &self.channel {
            Some(channel) => channel,
            None => {
                warn!(
                    "Attack detected ({} requests, {:.1} req/s) but no notification channel is configured",
                    alert.total,
                    alert.strength()
                );
                return Ok(NotifyOutcome::NoChannel);
            }
        };

        match channel.send_text(&alert.message()).await {
            Ok(()) => {
                info!(
                    "Attack alert sent: total={} blocked={} strength={:.1} req/s",
                    alert.total,
                    alert.blocked,
                    alert.strength()
                );
                increment_counter!("edge_filter_alerts_sent_total");
                Ok(NotifyOutcome::Sent)
            }
            Err(e) => {
                error!("Failed to send attack alert: {}", e);
                Ok(NotifyOutcome::DeliveryFailed)
            }
        }
    }
}
