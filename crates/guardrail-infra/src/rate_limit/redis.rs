//! Redis rate limiter implementation using a fixed window counter.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use guardrail_core::ports::{RateLimitError, RateLimitResult, RateLimiter};

use super::RateLimitConfig;
use crate::redis_conn::RedisConfig;

/// Redis rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RedisRateLimitConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Quota applied to every key
    pub quota: RateLimitConfig,
    /// Key prefix for rate limit keys
    pub key_prefix: String,
}

impl Default for RedisRateLimitConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            quota: RateLimitConfig::default(),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

impl RedisRateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            quota: RateLimitConfig::from_env(),
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
        }
    }
}

/// Redis-backed rate limiter, shared across instances.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    config: RedisRateLimitConfig,
    /// Lua script for atomic increment with expiry
    script: Script,
}

impl RedisRateLimiter {
    pub async fn new(config: RedisRateLimitConfig) -> Result<Self, RateLimitError> {
        if config.quota.max_requests == 0 || config.quota.window.as_secs() == 0 {
            return Err(RateLimitError::Config(
                "quota needs at least 1 request and a window of at least 1s".into(),
            ));
        }
        let conn = config
            .redis
            .connect()
            .await
            .map_err(RateLimitError::Backend)?;

        // Fixed window: the first hit starts the window.
        // Returns: [current_count, ttl_remaining]
        let script = Script::new(
            r#"
            local key = KEYS[1]
            local window_secs = tonumber(ARGV[1])

            local current = redis.call('INCR', key)
            if current == 1 then
                redis.call('EXPIRE', key, window_secs)
            end

            local ttl = redis.call('TTL', key)
            return {current, ttl}
            "#,
        );

        tracing::info!(url = %config.redis.url, "Connected to Redis rate limiter");

        Ok(Self {
            conn,
            config,
            script,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, RateLimitError> {
        Self::new(RedisRateLimitConfig::from_env()).await
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let result: Vec<i64> = self
            .script
            .key(&redis_key)
            .arg(self.config.quota.window.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let max_requests = self.config.quota.max_requests;
        let current_count = u32::try_from(result.first().copied().unwrap_or(1)).unwrap_or(u32::MAX);
        let ttl_secs = result
            .get(1)
            .copied()
            .filter(|ttl| *ttl > 0)
            .map_or(self.config.quota.window.as_secs(), |ttl| ttl as u64);

        let allowed = current_count <= max_requests;
        let remaining = max_requests.saturating_sub(current_count);

        Ok(RateLimitResult {
            allowed,
            remaining,
            reset_after: Duration::from_secs(ttl_secs),
        })
    }
}
