//! Rate-limit arbiter implementations.

mod local;
pub use local::LocalArbiter;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::{HttpArbiter, HttpArbiterConfig};
