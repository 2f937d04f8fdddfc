// HTTP request handlers for the passkey relying party
pub mod passkey;
pub mod types;

#[cfg(test)]
mod tests;

use actix_web::{web, HttpResponse, Result};

use types::HealthResponse;

// Re-export the main handler functions
pub use passkey::{
    complete_authentication, complete_registration, error_to_response, start_authentication,
    start_registration, SharedService,
};

/// Health check endpoint
///
/// # Errors
///
/// Returns an error if health status cannot be determined
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: "Passkey relying party is running".to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Register every route; the service must already be in app data
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg
        // Passkey endpoints
        .route(
            "/auth/passkey/register/start",
            web::post().to(start_registration),
        )
        .route(
            "/auth/passkey/register/complete",
            web::post().to(complete_registration),
        )
        .route(
            "/auth/passkey/auth/start",
            web::post().to(start_authentication),
        )
        .route(
            "/auth/passkey/auth/complete",
            web::post().to(complete_authentication),
        )
        // Health endpoint
        .route("/ping", web::get().to(health));
}
