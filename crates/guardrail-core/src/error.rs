//! Domain-level error types.

use std::time::Duration;

use thiserror::Error;

/// Domain errors - business logic failures.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("No reputation record for address {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single fetch attempt, or the terminal failure of an attempt cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The attempt was superseded or torn down. Never surfaced to callers.
    #[error("Attempt cancelled")]
    Cancelled,

    /// Retryable failure (network blip, 5xx-equivalent).
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The attempt did not settle within the configured per-attempt timeout.
    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The arbiter denied the request. Not retried automatically.
    #[error("Rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// Terminal: every permitted retry failed.
    #[error("Retries exhausted after {retries} retries: {last}")]
    RetriesExhausted { retries: u32, last: Box<FetchError> },
}

impl FetchError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    /// True when the failure only means "this attempt is no longer wanted".
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True when another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}
