// Request and response bodies shared across handlers
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::encoding::base64url;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Body of the start-authentication request; the whole body is optional
#[derive(Debug, Default, Deserialize)]
pub struct StartAuthenticationRequest {
    /// Base64url credential ids; empty asks for discoverable credentials
    #[serde(default)]
    pub allow_credentials: Vec<String>,
}

/// Body of both complete endpoints
#[derive(Debug, Deserialize)]
pub struct CompleteCeremonyRequest {
    pub ceremony_id: Uuid,
    /// `PublicKeyCredential` JSON as produced by the browser
    pub credential: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationCompleteResponse {
    pub status: String,
    #[serde(with = "base64url")]
    pub credential_id: Vec<u8>,
    pub version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticationCompleteResponse {
    pub verified: bool,
    #[serde(with = "base64url")]
    pub credential_id: Vec<u8>,
    pub sign_count: u32,
    pub user_verified: bool,
}
