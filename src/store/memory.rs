//! In-process implementation of the backing store.
//!
//! Mirrors the Redis semantics (TTL arming, conditional set, sliding log)
//! behind a single mutex, so each primitive is atomic just like its Redis
//! counterpart. Time is read from `tokio::time::Instant`, which lets tests
//! pause and advance the clock. State is local to the process: only suitable
//! for a single filter instance.
//!
//! Expired entries are dropped when their key is next touched, and the whole
//! map is swept once every [`SWEEP_INTERVAL`] calls.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{Store, StoreError, WindowAdmission};

/// Store calls between two full sweeps of expired entries
pub const SWEEP_INTERVAL: u64 = 1024;

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Text(String),
    Log(VecDeque<Instant>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Backing store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T,
    ) -> T {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if (self.calls.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            entries.retain(|_, entry| entry.is_live(now));
        } else if entries.get(key).map_or(false, |entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        f(&mut entries, now)
    }

    #[cfg(test)]
    fn stored_keys(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.with_entries(key, |entries, _| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Int(0),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Int(n) => {
                    *n += 1;
                    Ok(*n)
                }
                _ => Err(StoreError::Unexpected(format!("{} is not a counter", key))),
            }
        })
    }

    async fn expire_nx(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.with_entries(key, |entries, now| match entries.get_mut(key) {
            Some(entry) if entry.expires_at.is_none() => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.with_entries(key, |entries, _| match entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Int(n)) => Ok(Some(*n)),
            Some(Value::Text(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| StoreError::Unexpected(format!("{} is not numeric", key))),
            Some(Value::Log(_)) => Err(StoreError::Unexpected(format!("{} is not a counter", key))),
        })
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.with_entries(key, |entries, now| {
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value.to_string()),
                    expires_at: Some(now + ttl),
                },
            );
            Ok(true)
        })
    }

    async fn sliding_window(
        &self,
        key: &str,
        capacity: u32,
        window: Duration,
    ) -> Result<WindowAdmission, StoreError> {
        self.with_entries(key, |entries, now| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Log(VecDeque::new()),
                expires_at: None,
            });
            let log = match &mut entry.value {
                Value::Log(log) => log,
                _ => return Err(StoreError::Unexpected(format!("{} is not a window log", key))),
            };

            while log.front().map_or(false, |&t| now.duration_since(t) >= window) {
                log.pop_front();
            }

            let reset_after = |log: &VecDeque<Instant>| {
                log.front()
                    .map_or(window, |&oldest| (oldest + window).saturating_duration_since(now))
            };

            let count = log.len() as u32;
            if count >= capacity {
                let denied = WindowAdmission {
                    admitted: false,
                    remaining: 0,
                    reset_after: reset_after(log),
                };
                entry.expires_at.get_or_insert(now + window);
                return Ok(denied);
            }

            log.push_back(now);
            let admission = WindowAdmission {
                admitted: true,
                remaining: capacity - count - 1,
                reset_after: reset_after(log),
            };
            entry.expires_at = Some(now + window);
            Ok(admission)
        })
    }
}
