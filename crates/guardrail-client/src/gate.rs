//! Rate-limit gate - asks the arbiter before running a guarded operation.

use std::future::Future;
use std::sync::Arc;

use guardrail_core::domain::{ArbiterRequest, DEFAULT_RETRY_AFTER_SECS, RateLimitDecision};
use guardrail_core::ports::{AddressResolver, ArbiterError, RateLimitArbiter, UNKNOWN_ADDRESS};

/// Callback receiving the decision of a denied check.
pub type RateLimitedCallback = Box<dyn FnOnce(&RateLimitDecision) + Send>;

/// Per-call overrides for [`RateLimitGate::check_and_run`].
#[derive(Default)]
pub struct GateOptions {
    address: Option<String>,
    identity: Option<String>,
    on_rate_limited: Option<RateLimitedCallback>,
}

impl GateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this address instead of asking the resolver.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Caller identity for this call, overriding the gate's own.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn on_rate_limited<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&RateLimitDecision) + Send + 'static,
    {
        self.on_rate_limited = Some(Box::new(callback));
        self
    }
}

/// Outcome of consulting the arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// The arbiter permitted the request.
    Allowed(RateLimitDecision),
    /// The arbiter, or the transport in front of it, denied the request.
    Denied(RateLimitDecision),
    /// The arbiter could not be reached; permitted with `degraded = true`.
    ArbiterUnavailable(RateLimitDecision),
}

impl GateVerdict {
    pub fn is_permitted(&self) -> bool {
        !matches!(self, Self::Denied(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::ArbiterUnavailable(_))
    }

    pub fn decision(&self) -> &RateLimitDecision {
        match self {
            Self::Allowed(decision) | Self::Denied(decision) | Self::ArbiterUnavailable(decision) => {
                decision
            }
        }
    }
}

/// Result of [`RateLimitGate::check_and_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// The operation ran. `degraded` is set when it ran on the fail-open path.
    Completed { value: T, degraded: bool },
    /// The operation was never invoked.
    Denied(RateLimitDecision),
}

impl<T> GateOutcome<T> {
    /// The operation's result, or `None` when denied.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Completed { value, .. } => Some(value),
            Self::Denied(_) => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Completed { degraded: true, .. })
    }

    pub fn denial(&self) -> Option<&RateLimitDecision> {
        match self {
            Self::Denied(decision) => Some(decision),
            Self::Completed { .. } => None,
        }
    }
}

/// Gate that permits an operation only when the arbiter agrees.
///
/// The gate never retries the wrapped operation; compose a
/// [`FetchController`](crate::FetchController) inside it for that.
#[derive(Clone)]
pub struct RateLimitGate {
    arbiter: Arc<dyn RateLimitArbiter>,
    resolver: Arc<dyn AddressResolver>,
    identity: Option<String>,
}

impl RateLimitGate {
    pub fn new(arbiter: Arc<dyn RateLimitArbiter>, resolver: Arc<dyn AddressResolver>) -> Self {
        Self {
            arbiter,
            resolver,
            identity: None,
        }
    }

    /// Bind the gate to a caller identity (e.g. the signed-in user id).
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    async fn resolve_address(&self, explicit: Option<&str>) -> String {
        if let Some(address) = explicit {
            return address.to_string();
        }
        match self.resolver.resolve().await {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(error = %e, "Address resolution failed, using '{}'", UNKNOWN_ADDRESS);
                UNKNOWN_ADDRESS.to_string()
            }
        }
    }

    /// Consult the arbiter for `endpoint_id` without running anything.
    pub async fn check(&self, endpoint_id: &str, options: &GateOptions) -> GateVerdict {
        let address = self.resolve_address(options.address.as_deref()).await;
        let identity = options.identity.clone().or_else(|| self.identity.clone());
        let request = ArbiterRequest::new(endpoint_id, address).with_identity(identity);

        match self.arbiter.decide(&request).await {
            Ok(decision) if decision.allowed => GateVerdict::Allowed(decision),
            Ok(decision) => GateVerdict::Denied(decision),
            Err(ArbiterError::RateLimitExceeded { retry_after }) => GateVerdict::Denied(
                RateLimitDecision::denied(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS)),
            ),
            Err(e) => {
                tracing::warn!(
                    endpoint = %endpoint_id,
                    address = %request.address,
                    error = %e,
                    "Arbiter unavailable, failing open"
                );
                GateVerdict::ArbiterUnavailable(RateLimitDecision::fail_open())
            }
        }
    }

    /// Run `operation` if the arbiter permits it (or cannot be reached).
    ///
    /// On denial the operation is not invoked, the `on_rate_limited` callback
    /// receives the decision and [`GateOutcome::Denied`] is returned.
    pub async fn check_and_run<F, Fut, T>(
        &self,
        endpoint_id: &str,
        operation: F,
        mut options: GateOptions,
    ) -> GateOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let verdict = self.check(endpoint_id, &options).await;

        match verdict {
            GateVerdict::Denied(decision) => {
                tracing::warn!(
                    endpoint = %endpoint_id,
                    retry_after = ?decision.retry_after,
                    "Rate limit exceeded"
                );
                if let Some(callback) = options.on_rate_limited.take() {
                    callback(&decision);
                }
                GateOutcome::Denied(decision)
            }
            verdict => {
                let degraded = verdict.is_degraded();
                let value = operation().await;
                GateOutcome::Completed { value, degraded }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FetchController;
    use async_trait::async_trait;
    use guardrail_core::FetchError;
    use guardrail_core::ports::{ReputationStore, ResolveError};
    use guardrail_infra::{
        FixedAddressResolver, InMemoryRateLimiter, InMemoryReputationStore, LocalArbiter,
        RateLimitConfig,
    };
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Arbiter returning a canned response and recording requests.
    struct ScriptedArbiter {
        response: fn() -> Result<RateLimitDecision, ArbiterError>,
        requests: Mutex<Vec<ArbiterRequest>>,
    }

    impl ScriptedArbiter {
        fn new(response: fn() -> Result<RateLimitDecision, ArbiterError>) -> Arc<Self> {
            Arc::new(Self {
                response,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ArbiterRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RateLimitArbiter for ScriptedArbiter {
        async fn decide(
            &self,
            request: &ArbiterRequest,
        ) -> Result<RateLimitDecision, ArbiterError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.response)()
        }
    }

    struct StubResolver {
        address: Option<&'static str>,
        calls: AtomicU32,
    }

    impl StubResolver {
        fn returning(address: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                address,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl AddressResolver for StubResolver {
        async fn resolve(&self) -> Result<String, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.address
                .map(str::to_string)
                .ok_or_else(|| ResolveError::Lookup("network down".to_string()))
        }
    }

    fn fixed(address: &str) -> Arc<FixedAddressResolver> {
        Arc::new(FixedAddressResolver::new(address))
    }

    fn allow() -> Result<RateLimitDecision, ArbiterError> {
        Ok(RateLimitDecision::allowed(Some(9), None))
    }

    fn deny() -> Result<RateLimitDecision, ArbiterError> {
        Ok(RateLimitDecision::denied(30))
    }

    fn unreachable_arbiter() -> Result<RateLimitDecision, ArbiterError> {
        Err(ArbiterError::Unavailable("connection refused".to_string()))
    }

    fn transport_429() -> Result<RateLimitDecision, ArbiterError> {
        Err(ArbiterError::RateLimitExceeded { retry_after: None })
    }

    #[tokio::test]
    async fn test_denied_operation_is_never_invoked() {
        let gate = RateLimitGate::new(
            ScriptedArbiter::new(deny),
            fixed("203.0.113.5"),
        );
        let invoked = Arc::new(AtomicU32::new(0));
        let observed = Arc::new(Mutex::new(None));

        let outcome = {
            let invoked = invoked.clone();
            let observed = observed.clone();
            gate.check_and_run(
                "renewal.submit",
                || async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                },
                GateOptions::new().on_rate_limited(move |decision| {
                    *observed.lock().unwrap() = Some(decision.clone());
                }),
            )
            .await
        };

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.denial().and_then(|d| d.retry_after), Some(30));
        assert_eq!(outcome.into_option(), None);
        let decision = observed.lock().unwrap().clone().unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Some(30));
    }

    #[tokio::test]
    async fn test_allowed_operation_runs() {
        let arbiter = ScriptedArbiter::new(allow);
        let gate = RateLimitGate::new(arbiter.clone(), fixed("198.51.100.1"));

        let outcome = gate
            .check_and_run("billing.checkout", || async { 42 }, GateOptions::new())
            .await;

        assert_eq!(
            outcome,
            GateOutcome::Completed {
                value: 42,
                degraded: false
            }
        );
        assert_eq!(arbiter.requests()[0].address, "198.51.100.1");
        assert_eq!(arbiter.requests()[0].endpoint_id, "billing.checkout");
    }

    #[tokio::test]
    async fn test_arbiter_failure_fails_open_with_degraded_flag() {
        let gate = RateLimitGate::new(
            ScriptedArbiter::new(unreachable_arbiter),
            fixed("198.51.100.1"),
        );

        let verdict = gate.check("login", &GateOptions::new()).await;
        assert!(verdict.is_permitted());
        assert!(verdict.is_degraded());
        assert!(verdict.decision().degraded);

        let outcome = gate
            .check_and_run("login", || async { "signed in" }, GateOptions::new())
            .await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.into_option(), Some("signed in"));
    }

    #[tokio::test]
    async fn test_transport_rate_limit_denies_with_default_retry_after() {
        let gate = RateLimitGate::new(
            ScriptedArbiter::new(transport_429),
            fixed("198.51.100.1"),
        );

        let verdict = gate.check("login", &GateOptions::new()).await;
        assert_eq!(
            verdict,
            GateVerdict::Denied(RateLimitDecision::denied(DEFAULT_RETRY_AFTER_SECS))
        );
    }

    #[tokio::test]
    async fn test_resolver_failure_uses_unknown_address() {
        let arbiter = ScriptedArbiter::new(allow);
        let gate = RateLimitGate::new(arbiter.clone(), StubResolver::returning(None));

        let verdict = gate.check("login", &GateOptions::new()).await;
        assert!(matches!(verdict, GateVerdict::Allowed(_)));
        assert_eq!(arbiter.requests()[0].address, UNKNOWN_ADDRESS);
    }

    #[tokio::test]
    async fn test_explicit_address_and_identity_override() {
        let arbiter = ScriptedArbiter::new(allow);
        let resolver = StubResolver::returning(Some("198.51.100.1"));
        let gate = RateLimitGate::new(arbiter.clone(), resolver.clone()).with_identity("user-1");

        gate.check("login", &GateOptions::new()).await;
        gate.check(
            "login",
            &GateOptions::new()
                .with_address("203.0.113.5")
                .with_identity("user-2"),
        )
        .await;

        let requests = arbiter.requests();
        assert_eq!(requests[0].caller_identity.as_deref(), Some("user-1"));
        assert_eq!(requests[0].address, "198.51.100.1");
        assert_eq!(requests[1].caller_identity.as_deref(), Some("user-2"));
        assert_eq!(requests[1].address, "203.0.113.5");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gated_fetch_retries_inside_the_gate() {
        let arbiter = ScriptedArbiter::new(allow);
        let gate = RateLimitGate::new(arbiter.clone(), fixed("198.51.100.1"));
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = {
            let calls = calls.clone();
            gate.check_and_run(
                "entities.list",
                || async move {
                    let controller = FetchController::builder(move || {
                        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        async move {
                            if call < 3 {
                                Err(FetchError::transient("503"))
                            } else {
                                Ok(vec!["Acme LLC", "Globex Inc"])
                            }
                        }
                    })
                    .base_delay(Duration::from_millis(200))
                    .start();
                    controller.settled().await
                },
                GateOptions::new(),
            )
            .await
        };

        let state = outcome.into_option().unwrap();
        assert_eq!(state.data, Some(vec!["Acme LLC", "Globex Inc"]));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // One arbiter consultation for the whole retried fetch.
        assert_eq!(arbiter.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_gate_over_local_arbiter_denies_past_quota() {
        let limiter = InMemoryRateLimiter::new(RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        })
        .unwrap();
        let reputation = Arc::new(InMemoryReputationStore::default());
        let arbiter = Arc::new(LocalArbiter::new(Arc::new(limiter), reputation.clone()));
        let gate = RateLimitGate::new(arbiter, fixed("203.0.113.5"));

        for _ in 0..2 {
            let outcome = gate
                .check_and_run("renewal.submit", || async { "submitted" }, GateOptions::new())
                .await;
            assert_eq!(outcome.into_option(), Some("submitted"));
        }

        let outcome = gate
            .check_and_run("renewal.submit", || async { "submitted" }, GateOptions::new())
            .await;
        let retry_after = outcome.denial().and_then(|d| d.retry_after).unwrap();
        assert!((1..=60).contains(&retry_after));

        let record = reputation.get("203.0.113.5").await.unwrap().unwrap();
        assert_eq!(record.rate_limit_violations, 1);
    }
}
