//! PostgreSQL reputation store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, DbConn, DbErr, EntityTrait, QuerySelect, TransactionTrait,
};

use guardrail_core::domain::{
    IpReputationRecord, ReputationFilter, ReputationSummary, RiskPolicy, ViolationKind,
};
use guardrail_core::ports::{ReputationStore, StoreError};

use crate::database::entity::ip_reputation::{self, Entity as IpReputation};

fn query_err(e: DbErr) -> StoreError {
    StoreError::Operation(e.to_string())
}

/// PostgreSQL-backed reputation store.
///
/// Violations are applied inside a transaction holding a row lock on the
/// address, so concurrent reports for the same address are serialized.
pub struct PostgresReputationStore {
    db: DbConn,
    policy: RiskPolicy,
}

impl PostgresReputationStore {
    pub fn new(db: DbConn, policy: RiskPolicy) -> Self {
        Self { db, policy }
    }

    async fn load_all(&self) -> Result<Vec<IpReputationRecord>, StoreError> {
        IpReputation::find()
            .all(&self.db)
            .await
            .map_err(query_err)?
            .into_iter()
            .map(IpReputationRecord::try_from)
            .collect()
    }
}

#[async_trait]
impl ReputationStore for PostgresReputationStore {
    async fn get(&self, address: &str) -> Result<Option<IpReputationRecord>, StoreError> {
        IpReputation::find_by_id(address.to_string())
            .one(&self.db)
            .await
            .map_err(query_err)?
            .map(IpReputationRecord::try_from)
            .transpose()
    }

    async fn apply_violation(
        &self,
        address: &str,
        kind: ViolationKind,
        now: DateTime<Utc>,
    ) -> Result<IpReputationRecord, StoreError> {
        let txn = self.db.begin().await.map_err(query_err)?;

        let fresh: ip_reputation::ActiveModel = IpReputationRecord::new(address, now).into();
        IpReputation::insert(fresh)
            .on_conflict(
                OnConflict::column(ip_reputation::Column::Address)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .map_err(query_err)?;

        let model = IpReputation::find_by_id(address.to_string())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(query_err)?
            .ok_or_else(|| StoreError::Operation(format!("record for {address} vanished")))?;

        let mut record = IpReputationRecord::try_from(model)?;
        let before = record.risk_level;
        record.apply(kind, &self.policy, now);

        let active: ip_reputation::ActiveModel = record.clone().into();
        active.update(&txn).await.map_err(query_err)?;
        txn.commit().await.map_err(query_err)?;

        if record.risk_level != before {
            tracing::info!(
                address = %address,
                from = %before,
                to = %record.risk_level,
                blocked_until = ?record.blocked_until,
                "Risk level changed"
            );
        }
        Ok(record)
    }

    async fn reset(&self, address: &str) -> Result<bool, StoreError> {
        let result = IpReputation::delete_by_id(address.to_string())
            .exec(&self.db)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected > 0)
    }

    async fn list(
        &self,
        filter: &ReputationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<IpReputationRecord>, StoreError> {
        Ok(filter.apply(self.load_all().await?, now))
    }

    async fn summary(&self, now: DateTime<Utc>) -> Result<ReputationSummary, StoreError> {
        let records = self.load_all().await?;
        Ok(ReputationSummary::from_records(&records, now))
    }
}
