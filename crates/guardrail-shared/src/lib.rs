//! # Guardrail Shared
//!
//! Wire types shared by the arbiter server and its HTTP clients.

pub mod dto;
pub mod response;

pub use response::ErrorResponse;
