//! In-memory reputation store - used in tests and single-node deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use guardrail_core::domain::{
    IpReputationRecord, ReputationFilter, ReputationSummary, RiskPolicy, ViolationKind,
};
use guardrail_core::ports::{ReputationStore, StoreError};

/// In-memory reputation store using a HashMap behind an async RwLock.
///
/// Every violation is applied under the write lock, so updates are
/// serialized and no increment is lost.
/// Note: Data is lost on process restart.
pub struct InMemoryReputationStore {
    policy: RiskPolicy,
    records: RwLock<HashMap<String, IpReputationRecord>>,
}

impl InMemoryReputationStore {
    pub fn new(policy: RiskPolicy) -> Self {
        Self {
            policy,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }
}

impl Default for InMemoryReputationStore {
    fn default() -> Self {
        Self::new(RiskPolicy::default())
    }
}

#[async_trait]
impl ReputationStore for InMemoryReputationStore {
    async fn get(&self, address: &str) -> Result<Option<IpReputationRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(address).cloned())
    }

    async fn apply_violation(
        &self,
        address: &str,
        kind: ViolationKind,
        now: DateTime<Utc>,
    ) -> Result<IpReputationRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .entry(address.to_string())
            .or_insert_with(|| IpReputationRecord::new(address, now));

        let before = record.risk_level;
        record.apply(kind, &self.policy, now);
        if record.risk_level != before {
            tracing::info!(
                address = %address,
                from = %before,
                to = %record.risk_level,
                blocked_until = ?record.blocked_until,
                "Risk level changed"
            );
        }

        Ok(record.clone())
    }

    async fn reset(&self, address: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        Ok(records.remove(address).is_some())
    }

    async fn list(
        &self,
        filter: &ReputationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<IpReputationRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(filter.apply(records.values().cloned(), now))
    }

    async fn summary(&self, now: DateTime<Utc>) -> Result<ReputationSummary, StoreError> {
        let records = self.records.read().await;
        Ok(ReputationSummary::from_records(records.values(), now))
    }
}
