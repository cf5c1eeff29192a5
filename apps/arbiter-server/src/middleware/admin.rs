//! Administrative access extractor.

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use std::future::{Ready, ready};

use crate::middleware::error::AppError;
use crate::state::AppState;

/// Proof that the request carried the configured admin Bearer token.
///
/// Add it as a handler argument to protect a route:
/// ```ignore
/// async fn reset(_admin: AdminGuard) -> impl Responder { .. }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AdminGuard;

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

impl FromRequest for AdminGuard {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            tracing::error!("AppState not found in app data");
            return ready(Err(AppError::Internal(
                "Server configuration error".to_string(),
            )));
        };

        // No token configured: administrative routes are off.
        let Some(expected) = state.admin_token.as_deref() else {
            return ready(Err(AppError::Forbidden));
        };

        let presented = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match presented {
            Some(token) if tokens_match(token, expected) => ready(Ok(AdminGuard)),
            _ => {
                tracing::warn!(path = %req.path(), "Rejected administrative request");
                ready(Err(AppError::Unauthorized))
            }
        }
    }
}
