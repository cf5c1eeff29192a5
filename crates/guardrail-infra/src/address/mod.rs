//! Caller address resolvers.

mod fixed;
pub use fixed::FixedAddressResolver;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::HttpAddressResolver;
