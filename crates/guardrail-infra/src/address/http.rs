//! Address lookup against an echo endpoint such as `GET /api/client-address`.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use guardrail_core::ports::{AddressResolver, ResolveError};

#[derive(Debug, Deserialize)]
struct AddressBody {
    #[serde(alias = "ip")]
    address: String,
}

/// Resolves the caller's public address by asking a remote service.
///
/// Accepts either `{"address": ".."}` or `{"ip": ".."}`.
pub struct HttpAddressResolver {
    url: String,
    client: reqwest::Client,
}

impl HttpAddressResolver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolveError::Lookup(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// `None` when `ADDRESS_RESOLVER_URL` is unset.
    pub fn from_env() -> Option<Result<Self, ResolveError>> {
        let url = std::env::var("ADDRESS_RESOLVER_URL").ok()?;
        let timeout = Duration::from_millis(
            std::env::var("ARBITER_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2000),
        );
        Some(Self::new(url, timeout))
    }
}

#[async_trait]
impl AddressResolver for HttpAddressResolver {
    async fn resolve(&self) -> Result<String, ResolveError> {
        let body: AddressBody = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ResolveError::Lookup(e.to_string()))?
            .json()
            .await
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;

        let address = body.address.trim();
        address
            .parse::<IpAddr>()
            .map_err(|_| ResolveError::Malformed(format!("not an IP address: {address}")))?;
        Ok(address.to_string())
    }
}
