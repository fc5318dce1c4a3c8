//! Core functionality for the edge filter.
//!
//! This module contains the admission pipeline and its components:
//! static classification, rate limiting, attack counters and alerting.

pub mod aggregator;
pub mod classifier;
pub mod notifier;
pub mod pipeline;
pub mod rate_limiter;
pub mod telegram;

pub use aggregator::{AttackAggregator, AttackSnapshot};
pub use classifier::Classifier;
pub use notifier::{AttackAlert, NotificationChannel, Notifier, NotifyError, NotifyOutcome};
pub use pipeline::{Pipeline, ProtectionMode, Stage, Verdict};
pub use rate_limiter::{RateLimitOutcome, RateLimiter};
pub use telegram::TelegramChannel;
