//! Redis implementation of the backing store.
//!
//! Uses a `ConnectionManager`, which multiplexes one connection and
//! reconnects on failure. It is cloned per call, so no in-process lock is
//! held across requests. Every call is bounded by the configured timeout.
//!
//! The conditional expiry uses `EXPIRE ... NX` and therefore needs Redis 7 or
//! newer.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::{ttl_secs, with_timeout, Store, StoreError, WindowAdmission};

/// Sliding-log admission. Timestamps come from the Redis clock so that
/// instances with skewed clocks still agree on the window.
///
/// KEYS[1] = log key, ARGV[1] = capacity, ARGV[2] = window in ms,
/// ARGV[3] = unique member for this attempt.
/// Returns {admitted, remaining, reset_after_ms}.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= capacity then
  local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
  local reset = window
  if oldest[2] then reset = tonumber(oldest[2]) + window - now end
  return {0, 0, reset}
end
redis.call('ZADD', key, now, ARGV[3])
redis.call('PEXPIRE', key, window)
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
return {1, capacity - count - 1, tonumber(oldest[2]) + window - now}
"#;

/// Backing store on a shared Redis instance
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    timeout: Duration,
    window_script: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g. `redis://127.0.0.1:6379`)
    /// * `timeout` - Upper bound for the initial connection and for every later call
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection =
            with_timeout(timeout, async { Ok(ConnectionManager::new(client).await?) }).await?;

        Ok(Self {
            connection,
            timeout,
            window_script: Script::new(SLIDING_WINDOW_SCRIPT),
        })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        with_timeout(self.timeout, async {
            let value: i64 = conn.incr(key, 1).await?;
            Ok(value)
        })
        .await
    }

    async fn expire_nx(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        with_timeout(self.timeout, async {
            let armed: i64 = redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs(ttl))
                .arg("NX")
                .query_async(&mut conn)
                .await?;
            Ok(armed == 1)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.connection.clone();
        with_timeout(self.timeout, async {
            let value: Option<i64> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        with_timeout(self.timeout, async {
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn sliding_window(
        &self,
        key: &str,
        capacity: u32,
        window: Duration,
    ) -> Result<WindowAdmission, StoreError> {
        let mut conn = self.connection.clone();
        let member = Uuid::new_v4().to_string();
        let window_ms = window.as_millis().max(1) as u64;

        with_timeout(self.timeout, async {
            let reply: Vec<i64> = self
                .window_script
                .key(key)
                .arg(capacity)
                .arg(window_ms)
                .arg(&member)
                .invoke_async(&mut conn)
                .await?;

            match reply.as_slice() {
                [admitted, remaining, reset_ms] => Ok(WindowAdmission {
                    admitted: *admitted == 1,
                    remaining: (*remaining).max(0) as u32,
                    reset_after: Duration::from_millis((*reset_ms).max(0) as u64),
                }),
                other => Err(StoreError::Unexpected(format!(
                    "sliding window script returned {:?}",
                    other
                ))),
            }
        })
        .await
    }
}
