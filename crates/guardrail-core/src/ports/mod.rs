//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod address;
mod arbiter;
mod rate_limit;
mod reputation;

pub use address::{AddressResolver, ResolveError, UNKNOWN_ADDRESS};
pub use arbiter::{ArbiterError, RateLimitArbiter};
pub use rate_limit::{RateLimitError, RateLimitResult, RateLimiter};
pub use reputation::{ReputationStore, StoreError};
