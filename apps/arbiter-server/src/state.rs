//! Application state - shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use guardrail_core::ports::{
    RateLimitArbiter, RateLimitError, RateLimiter, ReputationStore, StoreError,
};
use guardrail_infra::{InMemoryRateLimiter, InMemoryReputationStore, LocalArbiter};

use crate::config::AppConfig;

#[cfg(feature = "postgres")]
use guardrail_infra::PostgresReputationStore;
#[cfg(feature = "redis")]
use guardrail_infra::{
    RedisRateLimitConfig, RedisRateLimiter, RedisReputationConfig, RedisReputationStore,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub reputation: Arc<dyn ReputationStore>,
    pub arbiter: Arc<dyn RateLimitArbiter>,
    pub admin_token: Option<String>,
}

/// Failures that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Rate limiter setup failed: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Reputation store setup failed: {0}")]
    Store(#[from] StoreError),
}

impl AppState {
    /// Wire a local arbiter over the given limiter and reputation store.
    pub fn new(
        reputation: Arc<dyn ReputationStore>,
        limiter: Arc<dyn RateLimiter>,
        admin_token: Option<String>,
    ) -> Self {
        let arbiter = Arc::new(LocalArbiter::new(limiter, reputation.clone()));
        Self {
            reputation,
            arbiter,
            admin_token,
        }
    }

    /// Build the application state with the best available backends.
    ///
    /// Reputation storage falls back from PostgreSQL to Redis to memory.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let reputation = build_reputation_store(config).await?;
        let limiter = build_rate_limiter(config).await?;

        if config.admin_token.is_none() {
            tracing::warn!("ADMIN_TOKEN not set. Administrative resets are disabled.");
        }
        tracing::info!("Application state initialized");

        Ok(Self::new(reputation, limiter, config.admin_token.clone()))
    }
}

async fn build_reputation_store(
    config: &AppConfig,
) -> Result<Arc<dyn ReputationStore>, StartupError> {
    #[cfg(feature = "postgres")]
    {
        if let Some(db_config) = &config.database {
            match db_config.connect().await {
                Ok(conn) => {
                    tracing::info!("Using PostgreSQL reputation store");
                    return Ok(Arc::new(PostgresReputationStore::new(
                        conn,
                        config.policy.clone(),
                    )));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to connect to database, trying next backend");
                }
            }
        }
    }
    #[cfg(not(feature = "postgres"))]
    {
        if config.database.is_some() {
            tracing::warn!("DATABASE_URL is set but the postgres feature is disabled");
        }
    }

    #[cfg(feature = "redis")]
    {
        if let Some(redis) = &config.redis {
            let redis_config = RedisReputationConfig {
                redis: redis.clone(),
                ..RedisReputationConfig::from_env()
            };
            match RedisReputationStore::new(redis_config, config.policy.clone()).await {
                Ok(store) => {
                    tracing::info!("Using Redis reputation store");
                    return Ok(Arc::new(store));
                }
                Err(e) if redis.fallback_to_memory => {
                    tracing::warn!(error = %e, "Redis unavailable, using in-memory reputation store");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    tracing::warn!("Running with in-memory reputation store. Data is lost on restart.");
    Ok(Arc::new(InMemoryReputationStore::new(config.policy.clone())))
}

async fn build_rate_limiter(config: &AppConfig) -> Result<Arc<dyn RateLimiter>, StartupError> {
    #[cfg(feature = "redis")]
    {
        if let Some(redis) = &config.redis {
            let limiter_config = RedisRateLimitConfig {
                redis: redis.clone(),
                quota: config.rate_limit.clone(),
                ..RedisRateLimitConfig::from_env()
            };
            match RedisRateLimiter::new(limiter_config).await {
                Ok(limiter) => {
                    tracing::info!("Using Redis rate limiter");
                    return Ok(Arc::new(limiter));
                }
                Err(RateLimitError::Backend(e)) if redis.fallback_to_memory => {
                    tracing::warn!(error = %e, "Redis unavailable, using in-memory rate limiter");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    tracing::info!(
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window.as_secs(),
        "Using in-memory rate limiter"
    );
    let limiter = Arc::new(InMemoryRateLimiter::new(config.rate_limit.clone())?);
    spawn_bucket_pruner(limiter.clone(), config.rate_limit.window);
    Ok(limiter)
}

/// Periodically drop idle buckets so the key space does not grow without bound.
fn spawn_bucket_pruner(limiter: Arc<InMemoryRateLimiter>, every: Duration) {
    actix_rt::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            limiter.retain_recent();
            tracing::trace!("Pruned idle rate-limit buckets");
        }
    });
}
