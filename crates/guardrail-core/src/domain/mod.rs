//! Domain entities - the core business objects.

mod decision;
mod policy;
mod reputation;

pub use decision::{ArbiterRequest, DEFAULT_RETRY_AFTER_SECS, RateLimitDecision};
pub use policy::RiskPolicy;
pub use reputation::{
    IpReputationRecord, ReputationFilter, ReputationSummary, RiskDistribution, RiskLevel,
    ViolationKind,
};
