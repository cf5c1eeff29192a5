//! Middleware modules.

pub mod admin;
pub mod error;
