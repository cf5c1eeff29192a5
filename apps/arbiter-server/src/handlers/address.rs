//! Caller address parsing and echo.

use std::net::{IpAddr, SocketAddr};

use actix_web::{HttpRequest, HttpResponse};

use guardrail_core::ports::UNKNOWN_ADDRESS;
use guardrail_shared::dto::ClientAddressResponse;

use crate::middleware::error::{AppError, AppResult};

/// Canonical text form of an IP address, so every route keys records alike.
pub fn parse_address(raw: &str) -> AppResult<String> {
    raw.trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| AppError::BadRequest(format!("'{}' is not an IP address", raw)))
}

/// Like [`parse_address`], but also accepts the `unknown` sentinel sent by
/// gates whose address lookup failed.
pub fn parse_caller_address(raw: &str) -> AppResult<String> {
    if raw.trim() == UNKNOWN_ADDRESS {
        return Ok(UNKNOWN_ADDRESS.to_string());
    }
    parse_address(raw)
}

/// Real client IP, honoring `Forwarded` / `X-Forwarded-For` set by a proxy.
///
/// Anything that is not an IP (or `ip:port`) becomes `unknown`.
pub fn resolve_client_address(req: &HttpRequest) -> String {
    let info = req.connection_info();
    let Some(raw) = info.realip_remote_addr() else {
        return UNKNOWN_ADDRESS.to_string();
    };
    let raw = raw.trim();

    raw.parse::<IpAddr>()
        .or_else(|_| raw.parse::<SocketAddr>().map(|socket| socket.ip()))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| UNKNOWN_ADDRESS.to_string())
}

/// GET /api/client-address
pub async fn client_address(req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok().json(ClientAddressResponse {
        address: resolve_client_address(&req),
    })
}
