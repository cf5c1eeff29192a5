//! Address resolution port.

use async_trait::async_trait;

/// Address used when the caller's address cannot be determined.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Resolves the network address the current caller is seen from.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self) -> Result<String, ResolveError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Address lookup failed: {0}")]
    Lookup(String),

    #[error("Malformed address response: {0}")]
    Malformed(String),
}
