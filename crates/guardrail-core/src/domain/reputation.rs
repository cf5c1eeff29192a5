use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RiskPolicy;
use crate::error::DomainError;

/// Risk tier derived from accumulated violations. Ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Whether reaching this tier opens a block window.
    pub fn is_blocking(&self) -> bool {
        *self >= Self::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(DomainError::Validation(format!("unknown risk level '{other}'"))),
        }
    }
}

/// Kind of abuse signal reported against an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    FailedAuth,
    RateLimitViolation,
    SuspiciousPattern,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailedAuth => "failedAuth",
            Self::RateLimitViolation => "rateLimitViolation",
            Self::SuspiciousPattern => "suspiciousPattern",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "failedAuth" | "failed_auth" => Ok(Self::FailedAuth),
            "rateLimitViolation" | "rate_limit_violation" => Ok(Self::RateLimitViolation),
            "suspiciousPattern" | "suspicious_pattern" => Ok(Self::SuspiciousPattern),
            other => Err(DomainError::Validation(format!(
                "unknown violation kind '{other}'"
            ))),
        }
    }
}

/// Accumulated reputation of one network address.
///
/// `risk_level` and `blocked_until` are derived: they only change through
/// [`IpReputationRecord::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpReputationRecord {
    pub address: String,
    pub failed_auth_attempts: u64,
    pub rate_limit_violations: u64,
    pub suspicious_patterns: u64,
    pub risk_level: RiskLevel,
    pub blocked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IpReputationRecord {
    /// A fresh, all-zero record.
    pub fn new(address: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            failed_auth_attempts: 0,
            rate_limit_violations: 0,
            suspicious_patterns: 0,
            risk_level: RiskLevel::Low,
            blocked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_violations(&self) -> u64 {
        self.failed_auth_attempts
            .saturating_add(self.rate_limit_violations)
            .saturating_add(self.suspicious_patterns)
    }

    /// Whether a block window is active at `now` (strictly in the future).
    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }

    /// Count one violation and re-derive the tier and block window.
    pub fn apply(&mut self, kind: ViolationKind, policy: &RiskPolicy, now: DateTime<Utc>) {
        let counter = match kind {
            ViolationKind::FailedAuth => &mut self.failed_auth_attempts,
            ViolationKind::RateLimitViolation => &mut self.rate_limit_violations,
            ViolationKind::SuspiciousPattern => &mut self.suspicious_patterns,
        };
        *counter = counter.saturating_add(1);

        self.risk_level = policy.level_for(self.total_violations());
        if let Some(candidate) = policy.block_until(self.risk_level, now) {
            // A shorter window never shortens one that is already running.
            self.blocked_until = Some(match self.blocked_until {
                Some(existing) if existing > candidate => existing,
                _ => candidate,
            });
        }
        self.updated_at = now;
    }
}

/// Filter for listing records on operator dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReputationFilter {
    pub min_level: Option<RiskLevel>,
    pub blocked_only: bool,
    pub limit: Option<usize>,
}

impl ReputationFilter {
    pub fn matches(&self, record: &IpReputationRecord, now: DateTime<Utc>) -> bool {
        if let Some(min) = self.min_level {
            if record.risk_level < min {
                return false;
            }
        }
        !self.blocked_only || record.is_blocked_at(now)
    }

    /// Keep matching records, worst offenders first, truncated to `limit`.
    pub fn apply(
        &self,
        records: impl IntoIterator<Item = IpReputationRecord>,
        now: DateTime<Utc>,
    ) -> Vec<IpReputationRecord> {
        let mut matching: Vec<_> = records
            .into_iter()
            .filter(|record| self.matches(record, now))
            .collect();
        matching.sort_by(|a, b| {
            b.total_violations()
                .cmp(&a.total_violations())
                .then_with(|| a.address.cmp(&b.address))
        });
        if let Some(limit) = self.limit {
            matching.truncate(limit);
        }
        matching
    }
}

/// Count of tracked addresses per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
}

/// Read-side aggregate over all tracked addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationSummary {
    pub total_addresses: u64,
    /// Addresses whose `blocked_until` is strictly after the query time.
    pub blocked_addresses: u64,
    /// Addresses at `high` or `critical`.
    pub high_risk_addresses: u64,
    pub total_violations: u64,
    pub risk_distribution: RiskDistribution,
}

impl ReputationSummary {
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a IpReputationRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        records.into_iter().fold(Self::default(), |mut summary, record| {
            summary.total_addresses += 1;
            if record.is_blocked_at(now) {
                summary.blocked_addresses += 1;
            }
            if record.risk_level.is_blocking() {
                summary.high_risk_addresses += 1;
            }
            summary.total_violations = summary
                .total_violations
                .saturating_add(record.total_violations());
            match record.risk_level {
                RiskLevel::Low => summary.risk_distribution.low += 1,
                RiskLevel::Medium => summary.risk_distribution.medium += 1,
                RiskLevel::High => summary.risk_distribution.high += 1,
                RiskLevel::Critical => summary.risk_distribution.critical += 1,
            }
            summary
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_with(
        address: &str,
        failed_auth: u64,
        rate_limit: u64,
        suspicious: u64,
        now: DateTime<Utc>,
    ) -> IpReputationRecord {
        let policy = RiskPolicy::default();
        let mut record = IpReputationRecord::new(address, now);
        for _ in 0..failed_auth {
            record.apply(ViolationKind::FailedAuth, &policy, now);
        }
        for _ in 0..rate_limit {
            record.apply(ViolationKind::RateLimitViolation, &policy, now);
        }
        for _ in 0..suspicious {
            record.apply(ViolationKind::SuspiciousPattern, &policy, now);
        }
        record
    }

    #[test]
    fn test_crossing_high_threshold_blocks() {
        let now = Utc::now();
        let record = record_with("203.0.113.5", 2, 3, 0, now);

        assert_eq!(record.total_violations(), 5);
        assert_eq!(record.risk_level, RiskLevel::High);
        assert_eq!(record.blocked_until, Some(now + Duration::minutes(15)));
        assert!(record.is_blocked_at(now));
    }

    #[test]
    fn test_medium_never_blocks() {
        let now = Utc::now();
        let record = record_with("198.51.100.7", 1, 1, 2, now);

        assert_eq!(record.risk_level, RiskLevel::Medium);
        assert_eq!(record.blocked_until, None);
        assert!(!record.is_blocked_at(now));
    }

    #[test]
    fn test_block_window_extends_but_never_shrinks() {
        let policy = RiskPolicy::default();
        let start = Utc::now();
        let mut record = record_with("192.0.2.1", 0, 10, 0, start);
        assert_eq!(record.risk_level, RiskLevel::Critical);
        let critical_until = record.blocked_until.unwrap();

        // Later violation whose candidate window ends sooner than the running one.
        let later = start + Duration::minutes(1);
        let mut lenient = policy.clone();
        lenient.critical_block = Duration::seconds(1);
        record.apply(ViolationKind::FailedAuth, &lenient, later);
        assert_eq!(record.blocked_until, Some(critical_until));

        let much_later = start + Duration::hours(2);
        record.apply(ViolationKind::FailedAuth, &policy, much_later);
        assert_eq!(record.blocked_until, Some(much_later + Duration::hours(1)));
    }

    #[test]
    fn test_block_expires() {
        let now = Utc::now();
        let record = record_with("192.0.2.9", 5, 0, 0, now);
        assert!(record.is_blocked_at(now + Duration::minutes(14)));
        assert!(!record.is_blocked_at(now + Duration::minutes(15)));
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let records = vec![
            record_with("a", 0, 0, 1, now),
            record_with("b", 2, 3, 0, now),
            record_with("c", 0, 10, 0, now - Duration::hours(2)),
        ];

        let summary = ReputationSummary::from_records(&records, now);
        assert_eq!(summary.total_addresses, 3);
        // "c" hit critical two hours ago; its one-hour window is over.
        assert_eq!(summary.blocked_addresses, 1);
        assert_eq!(summary.high_risk_addresses, 2);
        assert_eq!(summary.total_violations, 16);
        assert_eq!(
            summary.risk_distribution,
            RiskDistribution {
                low: 1,
                medium: 0,
                high: 1,
                critical: 1
            }
        );
    }

    #[test]
    fn test_filter_orders_and_limits() {
        let now = Utc::now();
        let records = vec![
            record_with("low", 1, 0, 0, now),
            record_with("high", 5, 0, 0, now),
            record_with("critical", 0, 12, 0, now),
            record_with("medium", 0, 0, 3, now),
        ];

        let filter = ReputationFilter {
            min_level: Some(RiskLevel::Medium),
            blocked_only: false,
            limit: Some(2),
        };
        let listed = filter.apply(records.clone(), now);
        let addresses: Vec<_> = listed.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["critical", "high"]);

        let blocked = ReputationFilter {
            blocked_only: true,
            ..Default::default()
        };
        assert_eq!(blocked.apply(records, now).len(), 2);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&ViolationKind::RateLimitViolation).unwrap(),
            "\"rateLimitViolation\""
        );
        assert_eq!(serde_json::to_string(&RiskLevel::Critical).unwrap(), "\"critical\"");
        assert_eq!(
            "failed_auth".parse::<ViolationKind>().unwrap(),
            ViolationKind::FailedAuth
        );
        assert!("HIGH".parse::<RiskLevel>().is_ok());
        assert!("bogus".parse::<ViolationKind>().is_err());
    }
}
