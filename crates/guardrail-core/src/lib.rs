//! # Guardrail Core
//!
//! The domain layer of Guardrail: IP reputation records, risk tiering,
//! rate-limit decisions and the ports that infrastructure implements.
//! This crate contains pure business logic with zero infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::{DomainError, FetchError};
