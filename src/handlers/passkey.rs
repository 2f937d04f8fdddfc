//! Passkey request handlers
//!
//! Thin JSON layer over [`RelyingPartyService`]. The service keeps the
//! challenge for each ceremony, so clients only echo the `ceremony_id`.

use actix_web::{web, HttpResponse, Result};
use serde_json::json;

use super::types::{
    AuthenticationCompleteResponse, CompleteCeremonyRequest, RegistrationCompleteResponse,
    StartAuthenticationRequest,
};
use crate::store::CredentialStore;
use crate::utils::encoding;
use crate::webauthn::{
    AssertionResponse, AttestationResponse, CeremonyError, ErrorKind, RelyingPartyService,
};

/// Service type shared with every worker
pub type SharedService = RelyingPartyService<dyn CredentialStore>;

/// Convert `CeremonyError` to HTTP response
pub fn error_to_response(error: &CeremonyError) -> HttpResponse {
    match error.kind() {
        ErrorKind::Fatal => {
            log::error!("Ceremony failed: {error}");
            HttpResponse::InternalServerError().json(json!({
                "error": "internal_error",
                "message": "An internal error occurred"
            }))
        }
        ErrorKind::Policy => {
            log::warn!("Ceremony rejected by policy: {error}");
            HttpResponse::BadRequest().json(json!({
                "error": "policy_violation",
                "message": error.to_string()
            }))
        }
        ErrorKind::Aborted => {
            log::info!("Ceremony aborted: {error}");
            HttpResponse::RequestTimeout().json(json!({
                "error": "ceremony_aborted",
                "message": error.to_string()
            }))
        }
        ErrorKind::Integrity => match error {
            CeremonyError::ChallengeMismatch | CeremonyError::UnknownCredential(_) => {
                log::warn!("Authentication failed: {error}");
                HttpResponse::Unauthorized().json(json!({
                    "error": "authentication_failed",
                    "message": error.to_string()
                }))
            }
            _ => {
                log::warn!("Invalid ceremony response: {error}");
                HttpResponse::BadRequest().json(json!({
                    "error": "invalid_request",
                    "message": error.to_string()
                }))
            }
        },
    }
}

/// Start passkey registration
///
/// # Errors
///
/// Never fails at the actix level; ceremony errors become JSON error bodies.
pub async fn start_registration(service: web::Data<SharedService>) -> Result<HttpResponse> {
    match service.start_registration() {
        Ok(start) => Ok(HttpResponse::Ok().json(json!({
            "ceremony_id": start.ceremony_id,
            "creation_options": {
                "publicKey": start.options
            }
        }))),
        Err(e) => Ok(error_to_response(&e)),
    }
}

/// Complete passkey registration
///
/// # Errors
///
/// Never fails at the actix level; ceremony errors become JSON error bodies.
pub async fn complete_registration(
    data: web::Json<CompleteCeremonyRequest>,
    service: web::Data<SharedService>,
) -> Result<HttpResponse> {
    let CompleteCeremonyRequest {
        ceremony_id,
        credential,
    } = data.into_inner();

    let outcome = AttestationResponse::from_json(credential)
        .and_then(|response| service.finish_registration(ceremony_id, &response));

    match outcome {
        Ok(outcome) => Ok(HttpResponse::Ok().json(RegistrationCompleteResponse {
            status: "registered".to_string(),
            credential_id: outcome.record.credential_id,
            version: outcome.record.version,
        })),
        Err(e) => Ok(error_to_response(&e)),
    }
}

/// Start passkey authentication
///
/// # Errors
///
/// Never fails at the actix level; bad credential ids and ceremony errors
/// become JSON error bodies.
pub async fn start_authentication(
    data: Option<web::Json<StartAuthenticationRequest>>,
    service: web::Data<SharedService>,
) -> Result<HttpResponse> {
    let request = data.map(web::Json::into_inner).unwrap_or_default();

    let allow_credentials: Result<Vec<Vec<u8>>, _> = request
        .allow_credentials
        .iter()
        .map(|id| encoding::decode(id))
        .collect();
    let Ok(allow_credentials) = allow_credentials else {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "invalid_request",
            "message": "allow_credentials must be base64url encoded"
        })));
    };

    match service.start_authentication(&allow_credentials) {
        Ok(start) => Ok(HttpResponse::Ok().json(json!({
            "ceremony_id": start.ceremony_id,
            "request_options": {
                "publicKey": start.options
            }
        }))),
        Err(e) => Ok(error_to_response(&e)),
    }
}

/// Complete passkey authentication
///
/// An invalid signature is answered with `401` and `verified: false`.
///
/// # Errors
///
/// Never fails at the actix level; ceremony errors become JSON error bodies.
pub async fn complete_authentication(
    data: web::Json<CompleteCeremonyRequest>,
    service: web::Data<SharedService>,
) -> Result<HttpResponse> {
    let CompleteCeremonyRequest {
        ceremony_id,
        credential,
    } = data.into_inner();

    let outcome = AssertionResponse::from_json(credential)
        .and_then(|response| service.finish_authentication(ceremony_id, &response));

    match outcome {
        Ok(outcome) => {
            let body = AuthenticationCompleteResponse {
                verified: outcome.verified,
                credential_id: outcome.credential_id,
                sign_count: outcome.sign_count,
                user_verified: outcome.user_verified,
            };
            if body.verified {
                Ok(HttpResponse::Ok().json(body))
            } else {
                Ok(HttpResponse::Unauthorized().json(body))
            }
        }
        Err(e) => Ok(error_to_response(&e)),
    }
}
