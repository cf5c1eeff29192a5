//! In-process arbiter combining the quota limiter with address reputation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use guardrail_core::domain::{ArbiterRequest, RateLimitDecision, ViolationKind};
use guardrail_core::ports::{
    ArbiterError, RateLimitArbiter, RateLimiter, ReputationStore, UNKNOWN_ADDRESS,
};

/// Arbiter that decides locally.
///
/// Blocked addresses are denied before any quota is spent. Quota overruns are
/// fed back into the reputation store as rate-limit violations, except for the
/// shared `unknown` address.
pub struct LocalArbiter {
    limiter: Arc<dyn RateLimiter>,
    reputation: Arc<dyn ReputationStore>,
}

/// Whole seconds, rounded up, never below 1.
fn ceil_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

impl LocalArbiter {
    pub fn new(limiter: Arc<dyn RateLimiter>, reputation: Arc<dyn ReputationStore>) -> Self {
        Self {
            limiter,
            reputation,
        }
    }

    pub async fn decide_at(
        &self,
        request: &ArbiterRequest,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, ArbiterError> {
        let tracked = request.address != UNKNOWN_ADDRESS;

        if tracked {
            let record = self
                .reputation
                .get(&request.address)
                .await
                .map_err(|e| ArbiterError::Unavailable(e.to_string()))?;
            if let Some(until) = record
                .and_then(|r| r.blocked_until)
                .filter(|until| *until > now)
            {
                let wait = (until - now).to_std().unwrap_or_default();
                tracing::debug!(
                    address = %request.address,
                    endpoint = %request.endpoint_id,
                    blocked_until = %until,
                    "Denied blocked address"
                );
                return Ok(RateLimitDecision::denied(ceil_secs(wait)).with_reset_time(until));
            }
        }

        let quota = self
            .limiter
            .check(&request.quota_key())
            .await
            .map_err(|e| ArbiterError::Unavailable(e.to_string()))?;
        let reset_time = now + chrono::Duration::from_std(quota.reset_after)
            .unwrap_or_else(|_| chrono::Duration::zero());

        if quota.allowed {
            return Ok(RateLimitDecision::allowed(
                Some(quota.remaining),
                Some(reset_time),
            ));
        }

        if tracked {
            // The denial stands even if the violation cannot be recorded.
            if let Err(e) = self
                .reputation
                .apply_violation(&request.address, ViolationKind::RateLimitViolation, now)
                .await
            {
                tracing::warn!(
                    address = %request.address,
                    error = %e,
                    "Failed to record rate limit violation"
                );
            }
        }

        tracing::debug!(
            key = %request.quota_key(),
            retry_after = ceil_secs(quota.reset_after),
            "Quota exceeded"
        );
        Ok(RateLimitDecision::denied(ceil_secs(quota.reset_after)).with_reset_time(reset_time))
    }
}

#[async_trait]
impl RateLimitArbiter for LocalArbiter {
    async fn decide(&self, request: &ArbiterRequest) -> Result<RateLimitDecision, ArbiterError> {
        self.decide_at(request, Utc::now()).await
    }
}
