//! Rate-limit decision endpoint.

use actix_web::{HttpResponse, http::header, web};

use guardrail_core::domain::{ArbiterRequest, DEFAULT_RETRY_AFTER_SECS};

use super::address::parse_caller_address;
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

const REMAINING_HEADER: &str = "X-RateLimit-Remaining";

/// POST /api/rate-limit/check
///
/// 200 with the decision when allowed, 429 with the decision when denied.
pub async fn check(
    state: web::Data<AppState>,
    body: web::Json<ArbiterRequest>,
) -> AppResult<HttpResponse> {
    let mut request = body.into_inner();
    if request.endpoint_id.trim().is_empty() {
        return Err(AppError::BadRequest("endpoint_id is required".to_string()));
    }
    if request.address.trim().is_empty() {
        return Err(AppError::BadRequest("address is required".to_string()));
    }
    request.address = parse_caller_address(&request.address)?;

    let decision = state.arbiter.decide(&request).await?;

    if decision.allowed {
        let mut response = HttpResponse::Ok();
        if let Some(remaining) = decision.remaining {
            response.insert_header((REMAINING_HEADER, remaining.to_string()));
        }
        return Ok(response.json(decision));
    }

    let retry_after = decision.retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    tracing::warn!(
        endpoint = %request.endpoint_id,
        address = %request.address,
        retry_after,
        "Rate limit exceeded"
    );

    Ok(HttpResponse::TooManyRequests()
        .insert_header((REMAINING_HEADER, "0"))
        .insert_header((header::RETRY_AFTER, retry_after.to_string()))
        .json(decision))
}
