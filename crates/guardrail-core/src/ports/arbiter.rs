//! Arbiter port - the decision service consulted before sensitive operations.

use async_trait::async_trait;

use crate::domain::{ArbiterRequest, RateLimitDecision};

/// Decides whether an (endpoint, identity, address) triple may proceed.
#[async_trait]
pub trait RateLimitArbiter: Send + Sync {
    async fn decide(&self, request: &ArbiterRequest) -> Result<RateLimitDecision, ArbiterError>;
}

/// Arbiter call failures.
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    /// The transport itself reported "too many requests".
    #[error("Rate limit exceeded at transport level (retry after {retry_after:?}s)")]
    RateLimitExceeded { retry_after: Option<u64> },

    #[error("Arbiter unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid arbiter response: {0}")]
    InvalidResponse(String),
}
