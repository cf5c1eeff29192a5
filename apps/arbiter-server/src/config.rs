//! Application configuration loaded from environment variables.

use std::env;

use guardrail_core::DomainError;
use guardrail_core::domain::RiskPolicy;
use guardrail_infra::{DatabaseConfig, RateLimitConfig};

#[cfg(feature = "redis")]
use guardrail_infra::RedisConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token for administrative routes. Resets are disabled when unset.
    pub admin_token: Option<String>,
    pub policy: RiskPolicy,
    pub rate_limit: RateLimitConfig,
    pub database: Option<DatabaseConfig>,
    #[cfg(feature = "redis")]
    pub redis: Option<RedisConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, DomainError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            policy: RiskPolicy::from_env()?,
            rate_limit: RateLimitConfig::from_env(),
            database: DatabaseConfig::from_env(),
            // Redis is only tried when explicitly configured.
            #[cfg(feature = "redis")]
            redis: env::var("REDIS_URL").ok().map(|_| RedisConfig::from_env()),
        })
    }
}
