//! Database connection management and SeaORM entities.

mod connections;

#[cfg(feature = "postgres")]
pub mod entity;

pub use connections::DatabaseConfig;
