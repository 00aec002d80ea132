//! Shared sliding-window counter store backed by Redis sorted sets.
//!
//! Each key is a ZSET of hit timestamps (ms). Trim, count, and conditional insert
//! run inside one Lua script so concurrent instances see a consistent window.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::Script;
use uuid::Uuid;

use super::{CounterStore, RateLimitError, WindowDecision};

/// Returns `{1, remaining}` when the hit is recorded, `{0, retry_after_ms}` otherwise.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= limit then
  local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
  local reset = window
  if oldest[2] then
    reset = tonumber(oldest[2]) + window - now
  end
  return {0, reset}
end
redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return {1, limit - count - 1}
"#;

pub struct RedisCounterStore {
    conn: MultiplexedConnection,
    script: Script,
}

impl RedisCounterStore {
    pub async fn connect(client: &redis::Client) -> Result<Self, RateLimitError> {
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self {
            conn,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<WindowDecision, RateLimitError> {
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = i64::try_from(window.as_millis())
            .map_err(|_| RateLimitError::Protocol("window too large".to_string()))?;
        let member = format!("{now_ms}:{}", Uuid::new_v4());

        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .script
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        decode_reply(&reply)
    }
}

fn decode_reply(reply: &[i64]) -> Result<WindowDecision, RateLimitError> {
    match reply {
        [1, remaining] => Ok(WindowDecision::Allowed {
            remaining: u32::try_from(*remaining).unwrap_or(0),
        }),
        [0, retry_ms] => Ok(WindowDecision::Denied {
            retry_after: Duration::from_millis(u64::try_from(*retry_ms).unwrap_or(0)),
        }),
        other => Err(RateLimitError::Protocol(format!("{other:?}"))),
    }
}
