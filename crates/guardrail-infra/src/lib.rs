//! # Guardrail Infrastructure
//!
//! Concrete implementations of the ports defined in `guardrail-core`.
//! This crate contains the reputation stores, quota limiters, arbiters and
//! address resolvers.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory reputation only
//! - `postgres` - PostgreSQL reputation store via SeaORM
//! - `rate-limit` - In-process quota limiting via governor
//! - `redis` - Redis reputation store and distributed quota limiting
//! - `http` - HTTP arbiter client and address resolver

pub mod address;
pub mod arbiter;
pub mod database;
pub mod rate_limit;
pub mod reputation;

#[cfg(feature = "redis")]
mod redis_conn;

// Re-exports - In-Memory
pub use address::FixedAddressResolver;
pub use arbiter::LocalArbiter;
pub use database::DatabaseConfig;
pub use rate_limit::RateLimitConfig;
pub use reputation::InMemoryReputationStore;

#[cfg(feature = "rate-limit")]
pub use rate_limit::InMemoryRateLimiter;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use rate_limit::{RedisRateLimitConfig, RedisRateLimiter};
#[cfg(feature = "redis")]
pub use redis_conn::RedisConfig;
#[cfg(feature = "redis")]
pub use reputation::{RedisReputationConfig, RedisReputationStore};

// Re-exports - PostgreSQL
#[cfg(feature = "postgres")]
pub use reputation::PostgresReputationStore;

// Re-exports - HTTP
#[cfg(feature = "http")]
pub use address::HttpAddressResolver;
#[cfg(feature = "http")]
pub use arbiter::{HttpArbiter, HttpArbiterConfig};
