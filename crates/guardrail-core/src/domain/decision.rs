use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Retry hint used when a denial carries no explicit `retry_after`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Question put to the arbiter: may `address` (optionally acting as `caller_identity`)
/// hit `endpoint_id` right now?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterRequest {
    pub endpoint_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_identity: Option<String>,
    pub address: String,
}

impl ArbiterRequest {
    pub fn new(endpoint_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            caller_identity: None,
            address: address.into(),
        }
    }

    pub fn with_identity(mut self, identity: Option<String>) -> Self {
        self.caller_identity = identity;
        self
    }

    /// Key the quota is counted against: identity when known, address otherwise.
    pub fn quota_key(&self) -> String {
        let subject = self.caller_identity.as_deref().unwrap_or(&self.address);
        format!("{}:{}", self.endpoint_id, subject)
    }
}

/// Arbiter verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
    /// Seconds to wait before trying again. Only set on denials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Produced by the fail-open fallback rather than the arbiter.
    #[serde(default)]
    pub degraded: bool,
}

impl RateLimitDecision {
    pub fn allowed(remaining: Option<u32>, reset_time: Option<DateTime<Utc>>) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_time,
            retry_after: None,
            degraded: false,
        }
    }

    pub fn denied(retry_after: u64) -> Self {
        Self {
            allowed: false,
            remaining: Some(0),
            reset_time: None,
            retry_after: Some(retry_after),
            degraded: false,
        }
    }

    /// Permit issued without consulting the arbiter.
    pub fn fail_open() -> Self {
        Self {
            allowed: true,
            remaining: None,
            reset_time: None,
            retry_after: None,
            degraded: true,
        }
    }

    pub fn with_reset_time(mut self, reset_time: DateTime<Utc>) -> Self {
        self.reset_time = Some(reset_time);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_key_prefers_identity() {
        let anonymous = ArbiterRequest::new("login", "203.0.113.5");
        assert_eq!(anonymous.quota_key(), "login:203.0.113.5");

        let known = anonymous.with_identity(Some("user-42".to_string()));
        assert_eq!(known.quota_key(), "login:user-42");
    }

    #[test]
    fn test_decision_json_omits_absent_fields() {
        let json = serde_json::to_value(RateLimitDecision::denied(30)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"allowed": false, "remaining": 0, "retry_after": 30, "degraded": false})
        );

        let parsed: RateLimitDecision = serde_json::from_str(r#"{"allowed": true}"#).unwrap();
        assert_eq!(parsed, RateLimitDecision::allowed(None, None));
    }
}
