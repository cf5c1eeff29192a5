//! In-memory keyed rate limiter using governor crate.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as GovernorRateLimiter};

use guardrail_core::ports::{RateLimitError, RateLimitResult, RateLimiter};

use super::RateLimitConfig;

type KeyedRateLimiter = GovernorRateLimiter<
    String,
    DefaultKeyedStateStore<String>,
    DefaultClock,
    StateInformationMiddleware,
>;

/// In-memory rate limiter using the GCRA algorithm, one bucket per key.
///
/// This is the fallback when Redis is not available.
/// Note: Limits are per-process, not distributed across instances.
pub struct InMemoryRateLimiter {
    limiter: KeyedRateLimiter,
    clock: DefaultClock,
    replenish: Duration,
    burst: u32,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self, RateLimitError> {
        let burst = NonZeroU32::new(config.max_requests)
            .ok_or_else(|| RateLimitError::Config("max_requests must be at least 1".into()))?;
        let replenish = config.window / burst.get();
        let quota = Quota::with_period(replenish)
            .ok_or_else(|| RateLimitError::Config("window must be positive".into()))?
            .allow_burst(burst);

        let clock = DefaultClock::default();
        let limiter = GovernorRateLimiter::keyed(quota)
            .with_middleware::<StateInformationMiddleware>();

        Ok(Self {
            limiter,
            clock,
            replenish,
            burst: burst.get(),
        })
    }

    pub fn from_env() -> Result<Self, RateLimitError> {
        Self::new(RateLimitConfig::from_env())
    }

    /// Drop buckets that have fully replenished.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        match self.limiter.check_key(&key.to_string()) {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity();
                Ok(RateLimitResult {
                    allowed: true,
                    remaining,
                    reset_after: self.replenish * (self.burst - remaining),
                })
            }
            Err(not_until) => Ok(RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_after: not_until.wait_time_from(self.clock.now()),
            }),
        }
    }
}
