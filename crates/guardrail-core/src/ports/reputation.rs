//! Reputation store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{IpReputationRecord, ReputationFilter, ReputationSummary, ViolationKind};

/// Keyed store of one [`IpReputationRecord`] per address.
///
/// `apply_violation` must be atomic per address: concurrent reports for the
/// same address never lose an increment.
#[async_trait]
pub trait ReputationStore: Send + Sync {
    /// Get the record for an address, if one has been created.
    async fn get(&self, address: &str) -> Result<Option<IpReputationRecord>, StoreError>;

    /// Count one violation, creating the record on first sight, and return the updated record.
    async fn apply_violation(
        &self,
        address: &str,
        kind: ViolationKind,
        now: DateTime<Utc>,
    ) -> Result<IpReputationRecord, StoreError>;

    /// Administrative reset. Returns whether a record existed.
    async fn reset(&self, address: &str) -> Result<bool, StoreError>;

    /// Records matching `filter`, worst offenders first.
    async fn list(
        &self,
        filter: &ReputationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<IpReputationRecord>, StoreError>;

    /// Dashboard aggregate evaluated at `now`.
    async fn summary(&self, now: DateTime<Utc>) -> Result<ReputationSummary, StoreError>;
}

/// Store operation errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}
