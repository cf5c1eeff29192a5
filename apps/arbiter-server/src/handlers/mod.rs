//! HTTP handlers and route configuration.

mod address;
mod arbiter;
mod health;
mod reputation;

use actix_web::web;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            .route("/client-address", web::get().to(address::client_address))
            // Arbiter
            .route("/rate-limit/check", web::post().to(arbiter::check))
            // Violation ingestion
            .route("/violations", web::post().to(reputation::report_violation))
            // Dashboard (read-only) and administration
            .service(
                web::scope("/reputation")
                    .route("", web::get().to(reputation::list))
                    .route("/summary", web::get().to(reputation::summary))
                    .route("/{address}", web::get().to(reputation::get_record))
                    .route("/{address}", web::delete().to(reputation::reset_record)),
            ),
    );
}

#[cfg(test)]
mod tests;
