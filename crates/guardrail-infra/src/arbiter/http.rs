//! Remote arbiter reached over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use guardrail_core::domain::{ArbiterRequest, RateLimitDecision};
use guardrail_core::ports::{ArbiterError, RateLimitArbiter};

/// HTTP arbiter configuration.
#[derive(Debug, Clone)]
pub struct HttpArbiterConfig {
    /// Base URL of the arbiter service (e.g., http://localhost:8080)
    pub base_url: String,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for HttpArbiterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_millis(2000),
        }
    }
}

impl HttpArbiterConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ARBITER_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            timeout: Duration::from_millis(
                std::env::var("ARBITER_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
        }
    }
}

/// Arbiter client for `POST /api/rate-limit/check`.
pub struct HttpArbiter {
    endpoint: String,
    client: reqwest::Client,
}

/// `Retry-After` as delta-seconds. HTTP-date values are not honored.
fn retry_after_header(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

impl HttpArbiter {
    pub fn new(config: HttpArbiterConfig) -> Result<Self, ArbiterError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ArbiterError::Unavailable(e.to_string()))?;

        Ok(Self {
            endpoint: format!(
                "{}/api/rate-limit/check",
                config.base_url.trim_end_matches('/')
            ),
            client,
        })
    }

    pub fn from_env() -> Result<Self, ArbiterError> {
        Self::new(HttpArbiterConfig::from_env())
    }
}

#[async_trait]
impl RateLimitArbiter for HttpArbiter {
    async fn decide(&self, request: &ArbiterRequest) -> Result<RateLimitDecision, ArbiterError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ArbiterError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<RateLimitDecision>()
                .await
                .map_err(|e| ArbiterError::InvalidResponse(e.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let header = retry_after_header(response.headers());
                let body = response
                    .json::<RateLimitDecision>()
                    .await
                    .ok()
                    .and_then(|decision| decision.retry_after);
                Err(ArbiterError::RateLimitExceeded {
                    retry_after: header.or(body),
                })
            }
            status => {
                tracing::warn!(status = %status, endpoint = %self.endpoint, "Arbiter returned unexpected status");
                Err(ArbiterError::Unavailable(format!(
                    "unexpected status {status}"
                )))
            }
        }
    }
}
