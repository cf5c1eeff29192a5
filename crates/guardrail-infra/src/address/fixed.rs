use async_trait::async_trait;

use guardrail_core::ports::{AddressResolver, ResolveError};

/// Resolver that always reports the same address.
///
/// For callers that already know their address, such as a service acting on
/// behalf of an accepted connection.
#[derive(Debug, Clone)]
pub struct FixedAddressResolver {
    address: String,
}

impl FixedAddressResolver {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl AddressResolver for FixedAddressResolver {
    async fn resolve(&self) -> Result<String, ResolveError> {
        Ok(self.address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_configured_address() {
        let resolver = FixedAddressResolver::new("198.51.100.9");
        assert_eq!(resolver.resolve().await.unwrap(), "198.51.100.9");
        assert_eq!(resolver.resolve().await.unwrap(), "198.51.100.9");
    }
}
