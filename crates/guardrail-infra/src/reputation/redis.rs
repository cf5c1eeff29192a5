//! Redis reputation store - one hash per address plus an index set.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use guardrail_core::domain::{
    IpReputationRecord, ReputationFilter, ReputationSummary, RiskLevel, RiskPolicy, ViolationKind,
};
use guardrail_core::ports::{ReputationStore, StoreError};

use crate::redis_conn::RedisConfig;

/// Redis reputation store configuration.
#[derive(Debug, Clone)]
pub struct RedisReputationConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Key prefix for reputation hashes
    pub key_prefix: String,
}

impl Default for RedisReputationConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            key_prefix: "reputation".to_string(),
        }
    }
}

impl RedisReputationConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            key_prefix: std::env::var("REPUTATION_KEY_PREFIX")
                .unwrap_or_else(|_| "reputation".to_string()),
        }
    }
}

// Increments one counter and re-derives tier and block window in a single
// atomic step, so concurrent reports for an address cannot lose updates.
// Returns the full hash.
const APPLY_VIOLATION_LUA: &str = r#"
local key = KEYS[1]
local index = KEYS[2]
local field = ARGV[1]
local now = tonumber(ARGV[2])
local medium = tonumber(ARGV[3])
local high = tonumber(ARGV[4])
local critical = tonumber(ARGV[5])
local high_block = tonumber(ARGV[6])
local critical_block = tonumber(ARGV[7])
local address = ARGV[8]

redis.call('HSETNX', key, 'created_at', now)
redis.call('HINCRBY', key, field, 1)

local failed_auth = tonumber(redis.call('HGET', key, 'failed_auth_attempts') or '0')
local rate_limit = tonumber(redis.call('HGET', key, 'rate_limit_violations') or '0')
local suspicious = tonumber(redis.call('HGET', key, 'suspicious_patterns') or '0')
local total = failed_auth + rate_limit + suspicious

local level = 'low'
local block = 0
if total >= critical then
    level = 'critical'
    block = critical_block
elseif total >= high then
    level = 'high'
    block = high_block
elseif total >= medium then
    level = 'medium'
end

redis.call('HSET', key, 'risk_level', level, 'updated_at', now)
if block > 0 then
    local candidate = now + block
    local existing = tonumber(redis.call('HGET', key, 'blocked_until') or '0')
    if candidate > existing then
        redis.call('HSET', key, 'blocked_until', candidate)
    end
end
redis.call('SADD', index, address)

return redis.call('HGETALL', key)
"#;

/// Redis-backed reputation store.
///
/// Timestamps are stored as epoch milliseconds.
pub struct RedisReputationStore {
    conn: ConnectionManager,
    config: RedisReputationConfig,
    policy: RiskPolicy,
    apply_script: Script,
}

impl RedisReputationStore {
    pub async fn new(config: RedisReputationConfig, policy: RiskPolicy) -> Result<Self, StoreError> {
        let conn = config.redis.connect().await.map_err(StoreError::Connection)?;

        tracing::info!(url = %config.redis.url, "Connected to Redis reputation store");

        Ok(Self {
            conn,
            config,
            policy,
            apply_script: Script::new(APPLY_VIOLATION_LUA),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env(policy: RiskPolicy) -> Result<Self, StoreError> {
        Self::new(RedisReputationConfig::from_env(), policy).await
    }

    fn record_key(&self, address: &str) -> String {
        format!("{}:ip:{}", self.config.key_prefix, address)
    }

    fn index_key(&self) -> String {
        format!("{}:addresses", self.config.key_prefix)
    }

    async fn load_all(&self) -> Result<Vec<IpReputationRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let addresses: Vec<String> = conn
            .smembers(self.index_key())
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for address in &addresses {
            pipe.hgetall(self.record_key(address));
        }
        let hashes: Vec<HashMap<String, String>> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        let mut records = Vec::with_capacity(addresses.len());
        for (address, fields) in addresses.iter().zip(hashes) {
            if let Some(record) = record_from_hash(address, &fields)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn field_for(kind: ViolationKind) -> &'static str {
    match kind {
        ViolationKind::FailedAuth => "failed_auth_attempts",
        ViolationKind::RateLimitViolation => "rate_limit_violations",
        ViolationKind::SuspiciousPattern => "suspicious_patterns",
    }
}

fn millis_to_time(field: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| StoreError::Serialization(format!("bad timestamp in '{field}': {raw}")))
}

/// Decode a reputation hash. An empty hash means the record does not exist.
fn record_from_hash(
    address: &str,
    fields: &HashMap<String, String>,
) -> Result<Option<IpReputationRecord>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let counter = |name: &str| -> Result<u64, StoreError> {
        fields.get(name).map_or(Ok(0), |raw| {
            raw.parse()
                .map_err(|_| StoreError::Serialization(format!("bad counter in '{name}': {raw}")))
        })
    };
    let time = |name: &str| -> Result<Option<DateTime<Utc>>, StoreError> {
        fields
            .get(name)
            .map(|raw| millis_to_time(name, raw))
            .transpose()
    };

    let created_at = time("created_at")?.unwrap_or_else(Utc::now);
    Ok(Some(IpReputationRecord {
        address: address.to_string(),
        failed_auth_attempts: counter("failed_auth_attempts")?,
        rate_limit_violations: counter("rate_limit_violations")?,
        suspicious_patterns: counter("suspicious_patterns")?,
        risk_level: fields
            .get("risk_level")
            .map(|raw| raw.parse::<RiskLevel>())
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?
            .unwrap_or(RiskLevel::Low),
        blocked_until: time("blocked_until")?,
        created_at,
        updated_at: time("updated_at")?.unwrap_or(created_at),
    }))
}

#[async_trait]
impl ReputationStore for RedisReputationStore {
    async fn get(&self, address: &str) -> Result<Option<IpReputationRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.record_key(address))
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        record_from_hash(address, &fields)
    }

    async fn apply_violation(
        &self,
        address: &str,
        kind: ViolationKind,
        now: DateTime<Utc>,
    ) -> Result<IpReputationRecord, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = self
            .apply_script
            .key(self.record_key(address))
            .key(self.index_key())
            .arg(field_for(kind))
            .arg(now.timestamp_millis())
            .arg(self.policy.medium_threshold)
            .arg(self.policy.high_threshold)
            .arg(self.policy.critical_threshold)
            .arg(self.policy.high_block.num_milliseconds())
            .arg(self.policy.critical_block.num_milliseconds())
            .arg(address)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        let record = record_from_hash(address, &fields)?.ok_or_else(|| {
            StoreError::Operation(format!("record for {address} missing after update"))
        })?;
        tracing::debug!(
            address = %address,
            kind = %kind,
            risk_level = %record.risk_level,
            "Violation recorded"
        );
        Ok(record)
    }

    async fn reset(&self, address: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let (removed, _): (u32, u32) = redis::pipe()
            .atomic()
            .del(self.record_key(address))
            .srem(self.index_key(), address)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn list(
        &self,
        filter: &ReputationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<IpReputationRecord>, StoreError> {
        Ok(filter.apply(self.load_all().await?, now))
    }

    async fn summary(&self, now: DateTime<Utc>) -> Result<ReputationSummary, StoreError> {
        let records = self.load_all().await?;
        Ok(ReputationSummary::from_records(&records, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_record_from_hash() {
        let fields: HashMap<String, String> = [
            ("created_at", "1700000000000"),
            ("updated_at", "1700000005000"),
            ("failed_auth_attempts", "2"),
            ("rate_limit_violations", "3"),
            ("risk_level", "high"),
            ("blocked_until", "1700000905000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let record = record_from_hash("203.0.113.5", &fields).unwrap().unwrap();
        assert_eq!(record.total_violations(), 5);
        assert_eq!(record.suspicious_patterns, 0);
        assert_eq!(record.risk_level, RiskLevel::High);
        assert_eq!(
            record.blocked_until.unwrap().timestamp_millis(),
            1_700_000_905_000
        );

        assert_eq!(record_from_hash("x", &HashMap::new()).unwrap(), None);

        let mut corrupt = fields.clone();
        corrupt.insert("failed_auth_attempts".to_string(), "lots".to_string());
        assert!(record_from_hash("x", &corrupt).is_err());
    }

    async fn get_test_store() -> Option<RedisReputationStore> {
        let config = RedisReputationConfig {
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
                connect_timeout: Duration::from_secs(1),
                fallback_to_memory: false,
            },
            key_prefix: format!("test_reputation_{}", std::process::id()),
        };

        RedisReputationStore::new(config, RiskPolicy::default())
            .await
            .ok()
    }

    #[tokio::test]
    async fn test_redis_apply_and_reset() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => {
                tracing::warn!("Redis not available, skipping test");
                return;
            }
        };
        let address = "203.0.113.5";
        let now = Utc::now();
        store.reset(address).await.unwrap();

        for kind in [
            ViolationKind::FailedAuth,
            ViolationKind::FailedAuth,
            ViolationKind::RateLimitViolation,
            ViolationKind::RateLimitViolation,
            ViolationKind::RateLimitViolation,
        ] {
            store.apply_violation(address, kind, now).await.unwrap();
        }

        let record = store.get(address).await.unwrap().unwrap();
        assert_eq!(record.risk_level, RiskLevel::High);
        assert!(record.blocked_until.unwrap() > now);

        let summary = store.summary(now).await.unwrap();
        assert_eq!(summary.blocked_addresses, 1);

        assert!(store.reset(address).await.unwrap());
        assert_eq!(store.get(address).await.unwrap(), None);
    }
}
