use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, http::StatusCode, test, web};
use async_trait::async_trait;
use serde_json::{Value, json};

use guardrail_core::domain::{ArbiterRequest, RateLimitDecision};
use guardrail_core::ports::{ArbiterError, RateLimitArbiter};
use guardrail_infra::{InMemoryRateLimiter, InMemoryReputationStore, RateLimitConfig};

use crate::observability::RequestIdMiddleware;
use crate::state::AppState;

fn state(max_requests: u32, admin_token: Option<&str>) -> AppState {
    let limiter = InMemoryRateLimiter::new(RateLimitConfig {
        max_requests,
        window: Duration::from_secs(60),
    })
    .unwrap();
    AppState::new(
        Arc::new(InMemoryReputationStore::default()),
        Arc::new(limiter),
        admin_token.map(String::from),
    )
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .wrap(RequestIdMiddleware)
                .app_data(web::Data::new($state))
                .configure(crate::configure_extractors)
                .configure(super::configure_routes),
        )
        .await
    };
}

fn report(address: &str, kind: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/violations")
        .set_json(json!({ "address": address, "kind": kind }))
}

fn check(endpoint: &str, address: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/rate-limit/check")
        .set_json(ArbiterRequest::new(endpoint, address))
}

#[actix_web::test]
async fn test_health() {
    let app = app!(state(10, None));
    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn test_request_id_is_echoed() {
    let app = app!(state(10, None));
    let req = test::TestRequest::get()
        .uri("/api/health")
        .insert_header(("X-Request-ID", "trace-abc"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "trace-abc");
}

#[actix_web::test]
async fn test_check_allows_then_denies_and_records_violation() {
    let app = app!(state(2, None));

    for expected_remaining in ["1", "0"] {
        let resp = test::call_service(&app, check("search", "192.0.2.1").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("x-ratelimit-remaining").unwrap(),
            expected_remaining
        );
        let decision: RateLimitDecision = test::read_body_json(resp).await;
        assert!(decision.allowed);
    }

    let resp = test::call_service(&app, check("search", "192.0.2.1").to_request()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));
    let decision: RateLimitDecision = test::read_body_json(resp).await;
    assert!(!decision.allowed);
    assert!(decision.retry_after.unwrap() >= 1);

    let req = test::TestRequest::get()
        .uri("/api/reputation/192.0.2.1")
        .to_request();
    let record: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(record["rate_limit_violations"], 1);
    assert_eq!(record["risk_level"], "low");
}

#[actix_web::test]
async fn test_check_rejects_missing_fields() {
    let app = app!(state(10, None));

    let resp = test::call_service(&app, check("", "192.0.2.1").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], 400);

    let req = test::TestRequest::post()
        .uri("/api/rate-limit/check")
        .set_json(json!({ "endpoint_id": "search" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_mixed_violations_block_address() {
    let app = app!(state(100, None));
    let address = "203.0.113.5";

    for kind in ["failedAuth", "failedAuth", "rateLimitViolation", "rateLimitViolation"] {
        let resp = test::call_service(&app, report(address, kind).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = test::call_service(&app, report(address, "rateLimitViolation").to_request()).await;
    let record: Value = test::read_body_json(resp).await;
    assert_eq!(record["failed_auth_attempts"], 2);
    assert_eq!(record["rate_limit_violations"], 3);
    assert_eq!(record["suspicious_patterns"], 0);
    assert_eq!(record["risk_level"], "high");
    assert!(record["blocked_until"].is_string());

    // Blocked addresses are denied outright for the block window.
    let resp = test::call_service(&app, check("login", address).to_request()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let decision: RateLimitDecision = test::read_body_json(resp).await;
    let retry_after = decision.retry_after.unwrap();
    assert!(retry_after > 890 && retry_after <= 900);

    let req = test::TestRequest::get()
        .uri("/api/reputation/summary")
        .to_request();
    let summary: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(summary["total_addresses"], 1);
    assert_eq!(summary["blocked_addresses"], 1);
    assert_eq!(summary["high_risk_addresses"], 1);
    assert_eq!(summary["total_violations"], 5);
    assert_eq!(summary["risk_distribution"]["high"], 1);
}

#[actix_web::test]
async fn test_check_canonicalizes_address() {
    let app = app!(state(100, None));
    for _ in 0..5 {
        let resp = test::call_service(&app, report("203.0.113.5", "failedAuth").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // Padding does not slip past the block.
    let resp = test::call_service(&app, check("login", " 203.0.113.5 ").to_request()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let resp = test::call_service(&app, check("login", "not-an-ip").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Gates that could not resolve their address still get an answer.
    let resp = test::call_service(&app, check("login", "unknown").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/reputation/summary")
        .to_request();
    let summary: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(summary["total_addresses"], 1);
}

#[actix_web::test]
async fn test_report_validation() {
    let app = app!(state(10, None));

    let resp = test::call_service(&app, report("192.0.2.1", "sneezing").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, report("unknown", "failedAuth").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, report("192.0.2.1", "suspicious_pattern").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_get_untracked_is_not_found() {
    let app = app!(state(10, None));
    let req = test::TestRequest::get()
        .uri("/api/reputation/198.51.100.200")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["title"], "Not Found");
}

#[actix_web::test]
async fn test_list_filters_by_level() {
    let app = app!(state(10, None));
    for _ in 0..5 {
        test::call_service(&app, report("198.51.100.1", "failedAuth").to_request()).await;
    }
    test::call_service(&app, report("198.51.100.2", "failedAuth").to_request()).await;

    let req = test::TestRequest::get().uri("/api/reputation").to_request();
    let all: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["address"], "198.51.100.1");

    let req = test::TestRequest::get()
        .uri("/api/reputation?min_level=high")
        .to_request();
    let high: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(high.len(), 1);

    let req = test::TestRequest::get()
        .uri("/api/reputation?blocked_only=true&limit=1")
        .to_request();
    let blocked: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(blocked.len(), 1);

    let req = test::TestRequest::get()
        .uri("/api/reputation?min_level=severe")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_reset_requires_admin_token() {
    let app = app!(state(10, Some("s3cret")));
    test::call_service(&app, report("192.0.2.50", "failedAuth").to_request()).await;

    let req = test::TestRequest::delete()
        .uri("/api/reputation/192.0.2.50")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["title"], "Unauthorized");
    assert_eq!(body["status"], 401);

    let req = test::TestRequest::delete()
        .uri("/api/reputation/192.0.2.50")
        .insert_header(("Authorization", "Bearer wrong"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::delete()
        .uri("/api/reputation/192.0.2.50")
        .insert_header(("Authorization", "Bearer s3cret"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["removed"], true);

    let req = test::TestRequest::get()
        .uri("/api/reputation/192.0.2.50")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_reset_disabled_without_token() {
    let app = app!(state(10, None));
    let req = test::TestRequest::delete()
        .uri("/api/reputation/192.0.2.50")
        .insert_header(("Authorization", "Bearer anything"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_client_address() {
    let app = app!(state(10, None));

    let req = test::TestRequest::get()
        .uri("/api/client-address")
        .insert_header(("X-Forwarded-For", "198.51.100.7"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["address"], "198.51.100.7");

    let req = test::TestRequest::get()
        .uri("/api/client-address")
        .peer_addr("203.0.113.9:4711".parse().unwrap())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["address"], "203.0.113.9");

    let req = test::TestRequest::get()
        .uri("/api/client-address")
        .insert_header(("X-Forwarded-For", "not-an-ip"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["address"], "unknown");
}

struct DownArbiter;

#[async_trait]
impl RateLimitArbiter for DownArbiter {
    async fn decide(&self, _request: &ArbiterRequest) -> Result<RateLimitDecision, ArbiterError> {
        Err(ArbiterError::Unavailable("connection refused".to_string()))
    }
}

#[actix_web::test]
async fn test_backend_outage_is_service_unavailable() {
    let mut state = state(10, None);
    state.arbiter = Arc::new(DownArbiter);
    let app = app!(state);

    let resp = test::call_service(&app, check("search", "192.0.2.1").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], 503);
}
