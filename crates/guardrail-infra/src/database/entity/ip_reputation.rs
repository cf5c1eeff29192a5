//! IP reputation entity for SeaORM.

use sea_orm::Set;
use sea_orm::entity::prelude::*;

use guardrail_core::domain::{IpReputationRecord, RiskLevel};
use guardrail_core::ports::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ip_reputation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub address: String,
    pub failed_auth_attempts: i64,
    pub rate_limit_violations: i64,
    pub suspicious_patterns: i64,
    pub risk_level: String,
    pub blocked_until: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn counter(name: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative counter in '{name}': {value}")))
}

fn column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Conversion from SeaORM Model to the domain record.
impl TryFrom<Model> for IpReputationRecord {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            failed_auth_attempts: counter("failed_auth_attempts", model.failed_auth_attempts)?,
            rate_limit_violations: counter("rate_limit_violations", model.rate_limit_violations)?,
            suspicious_patterns: counter("suspicious_patterns", model.suspicious_patterns)?,
            risk_level: model
                .risk_level
                .parse::<RiskLevel>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            blocked_until: model.blocked_until.map(Into::into),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
            address: model.address,
        })
    }
}

/// Conversion from the domain record to SeaORM ActiveModel.
impl From<IpReputationRecord> for ActiveModel {
    fn from(record: IpReputationRecord) -> Self {
        Self {
            address: Set(record.address),
            failed_auth_attempts: Set(column(record.failed_auth_attempts)),
            rate_limit_violations: Set(column(record.rate_limit_violations)),
            suspicious_patterns: Set(column(record.suspicious_patterns)),
            risk_level: Set(record.risk_level.as_str().to_string()),
            blocked_until: Set(record.blocked_until.map(Into::into)),
            created_at: Set(record.created_at.into()),
            updated_at: Set(record.updated_at.into()),
        }
    }
}
