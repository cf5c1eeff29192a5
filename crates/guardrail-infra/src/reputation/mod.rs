//! Reputation store implementations - in-memory, Redis and PostgreSQL.

mod memory;

pub use memory::InMemoryReputationStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisReputationConfig, RedisReputationStore};

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresReputationStore;
