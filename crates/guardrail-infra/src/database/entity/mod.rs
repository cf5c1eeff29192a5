//! SeaORM entities.

pub mod ip_reputation;
