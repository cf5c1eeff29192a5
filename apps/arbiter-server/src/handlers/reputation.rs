//! Violation ingestion, dashboard reads and administrative reset.

use actix_web::{HttpResponse, web};
use chrono::Utc;

use guardrail_core::DomainError;
use guardrail_core::domain::{ReputationFilter, RiskLevel, ViolationKind};
use guardrail_shared::dto::{ReportViolationRequest, ReputationListQuery, ResetResponse};

use super::address::parse_address;
use crate::middleware::admin::AdminGuard;
use crate::middleware::error::AppResult;
use crate::observability::RequestId;
use crate::state::AppState;

/// Largest page a dashboard may request.
const MAX_LIST_LIMIT: usize = 1000;

/// POST /api/violations
pub async fn report_violation(
    state: web::Data<AppState>,
    body: web::Json<ReportViolationRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    let address = parse_address(&req.address)?;
    let kind: ViolationKind = req.kind.parse()?;

    let record = state
        .reputation
        .apply_violation(&address, kind, Utc::now())
        .await?;

    tracing::info!(
        address = %address,
        kind = %kind,
        risk_level = %record.risk_level,
        "Violation reported"
    );
    Ok(HttpResponse::Ok().json(record))
}

/// GET /api/reputation/summary
pub async fn summary(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let summary = state.reputation.summary(Utc::now()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// GET /api/reputation?min_level=high&blocked_only=true&limit=50
pub async fn list(
    state: web::Data<AppState>,
    query: web::Query<ReputationListQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    let filter = ReputationFilter {
        min_level: query
            .min_level
            .as_deref()
            .map(str::parse::<RiskLevel>)
            .transpose()?,
        blocked_only: query.blocked_only,
        limit: Some(query.limit.unwrap_or(100).min(MAX_LIST_LIMIT)),
    };

    let records = state.reputation.list(&filter, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// GET /api/reputation/{address}
pub async fn get_record(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let address = parse_address(&path.into_inner())?;
    let record = state
        .reputation
        .get(&address)
        .await?
        .ok_or(DomainError::NotFound(address))?;
    Ok(HttpResponse::Ok().json(record))
}

/// DELETE /api/reputation/{address} - requires the admin token
pub async fn reset_record(
    _admin: AdminGuard,
    request_id: RequestId,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let address = parse_address(&path.into_inner())?;
    let removed = state.reputation.reset(&address).await?;

    tracing::info!(
        address = %address,
        removed,
        request_id = %request_id.as_str(),
        "Reputation reset"
    );
    Ok(HttpResponse::Ok().json(ResetResponse { address, removed }))
}
