//! Data Transfer Objects - request/response types for the API.

use serde::{Deserialize, Serialize};

/// Request to record one violation against an address.
///
/// `kind` is one of `failedAuth`, `rateLimitViolation`, `suspiciousPattern`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportViolationRequest {
    pub address: String,
    pub kind: String,
}

/// Query parameters for listing reputation records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationListQuery {
    /// Lowest risk tier to include (`low`, `medium`, `high`, `critical`).
    pub min_level: Option<String>,
    #[serde(default)]
    pub blocked_only: bool,
    pub limit: Option<usize>,
}

/// The caller's address as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAddressResponse {
    pub address: String,
}

/// Outcome of an administrative reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub address: String,
    /// False when the address was not tracked.
    pub removed: bool,
}
