use chrono::{DateTime, Duration, Utc};

use super::RiskLevel;
use crate::error::DomainError;

/// Longest block window a policy may carry.
const MAX_BLOCK_DAYS: i64 = 365;

/// Block window from a configured number of seconds.
fn block_window(name: &str, secs: u64) -> Result<Duration, DomainError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| DomainError::Validation(format!("{name} is out of range: {secs}")))
}

/// Deployment policy mapping accumulated violations to a risk tier and block window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskPolicy {
    /// Total violations at which an address becomes `medium`.
    pub medium_threshold: u64,
    /// Total violations at which an address becomes `high` and gets blocked.
    pub high_threshold: u64,
    /// Total violations at which an address becomes `critical`.
    pub critical_threshold: u64,
    /// Block window applied when reaching `high`.
    pub high_block: Duration,
    /// Block window applied when reaching `critical`.
    pub critical_block: Duration,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            medium_threshold: 3,
            high_threshold: 5,
            critical_threshold: 10,
            high_block: Duration::minutes(15),
            critical_block: Duration::hours(1),
        }
    }
}

impl RiskPolicy {
    /// Build a policy, rejecting thresholds that are zero or not strictly increasing.
    pub fn new(
        medium_threshold: u64,
        high_threshold: u64,
        critical_threshold: u64,
        high_block: Duration,
        critical_block: Duration,
    ) -> Result<Self, DomainError> {
        if medium_threshold == 0 {
            return Err(DomainError::Validation(
                "medium threshold must be at least 1".to_string(),
            ));
        }
        if !(medium_threshold < high_threshold && high_threshold < critical_threshold) {
            return Err(DomainError::Validation(format!(
                "thresholds must be strictly increasing (got {medium_threshold}/{high_threshold}/{critical_threshold})"
            )));
        }
        if high_block <= Duration::zero() || critical_block <= Duration::zero() {
            return Err(DomainError::Validation(
                "block windows must be positive".to_string(),
            ));
        }
        let longest = Duration::days(MAX_BLOCK_DAYS);
        if high_block > longest || critical_block > longest {
            return Err(DomainError::Validation(format!(
                "block windows must not exceed {MAX_BLOCK_DAYS} days"
            )));
        }

        Ok(Self {
            medium_threshold,
            high_threshold,
            critical_threshold,
            high_block,
            critical_block,
        })
    }

    /// Load the policy from `RISK_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, DomainError> {
        let defaults = Self::default();
        let read = |name: &str, default: u64| -> u64 {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Self::new(
            read("RISK_MEDIUM_THRESHOLD", defaults.medium_threshold),
            read("RISK_HIGH_THRESHOLD", defaults.high_threshold),
            read("RISK_CRITICAL_THRESHOLD", defaults.critical_threshold),
            block_window(
                "RISK_BLOCK_HIGH_SECS",
                read("RISK_BLOCK_HIGH_SECS", defaults.high_block.num_seconds().unsigned_abs()),
            )?,
            block_window(
                "RISK_BLOCK_CRITICAL_SECS",
                read(
                    "RISK_BLOCK_CRITICAL_SECS",
                    defaults.critical_block.num_seconds().unsigned_abs(),
                ),
            )?,
        )
    }

    /// Highest tier whose threshold is met by `total` violations.
    pub fn level_for(&self, total: u64) -> RiskLevel {
        if total >= self.critical_threshold {
            RiskLevel::Critical
        } else if total >= self.high_threshold {
            RiskLevel::High
        } else if total >= self.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// End of the block window for `level` starting at `now`; `None` for non-blocking tiers.
    pub fn block_until(&self, level: RiskLevel, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match level {
            RiskLevel::Critical => Some(now + self.critical_block),
            RiskLevel::High => Some(now + self.high_block),
            RiskLevel::Low | RiskLevel::Medium => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_is_monotonic() {
        let policy = RiskPolicy::default();
        let mut previous = RiskLevel::Low;
        for total in 0..50 {
            let level = policy.level_for(total);
            assert!(level >= previous, "tier dropped at total {total}");
            previous = level;
        }
        assert_eq!(policy.level_for(0), RiskLevel::Low);
        assert_eq!(policy.level_for(3), RiskLevel::Medium);
        assert_eq!(policy.level_for(5), RiskLevel::High);
        assert_eq!(policy.level_for(10), RiskLevel::Critical);
    }

    #[test]
    fn test_block_until_only_for_blocking_tiers() {
        let policy = RiskPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.block_until(RiskLevel::Low, now), None);
        assert_eq!(policy.block_until(RiskLevel::Medium, now), None);
        assert_eq!(
            policy.block_until(RiskLevel::High, now),
            Some(now + Duration::minutes(15))
        );
        assert_eq!(
            policy.block_until(RiskLevel::Critical, now),
            Some(now + Duration::hours(1))
        );
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let minutes = Duration::minutes(1);
        assert!(RiskPolicy::new(5, 5, 10, minutes, minutes).is_err());
        assert!(RiskPolicy::new(0, 5, 10, minutes, minutes).is_err());
        assert!(RiskPolicy::new(2, 4, 3, minutes, minutes).is_err());
        assert!(RiskPolicy::new(1, 2, 3, Duration::zero(), minutes).is_err());
        assert!(RiskPolicy::new(1, 2, 3, minutes, minutes).is_ok());
    }

    #[test]
    fn test_oversized_block_window_is_rejected() {
        assert_eq!(
            block_window("RISK_BLOCK_HIGH_SECS", 900).unwrap(),
            Duration::minutes(15)
        );
        assert!(matches!(
            block_window("RISK_BLOCK_HIGH_SECS", 100_000_000_000_000_000),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            block_window("RISK_BLOCK_HIGH_SECS", u64::MAX),
            Err(DomainError::Validation(_))
        ));

        // In range for chrono but far beyond any sane ban.
        let huge = block_window("RISK_BLOCK_CRITICAL_SECS", 100_000_000_000_000).unwrap();
        let minutes = Duration::minutes(1);
        assert!(matches!(
            RiskPolicy::new(1, 2, 3, minutes, huge),
            Err(DomainError::Validation(_))
        ));
    }
}
