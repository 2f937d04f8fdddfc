//! Collected client data
//!
//! `clientDataJSON` is produced by the user agent, not the authenticator, and
//! is covered by the assertion signature through its SHA-256 hash. The
//! relying party reads three fields from it: `type`, `challenge`, `origin`.

use serde::Deserialize;

use crate::utils::encoding;

/// `type` value for registration ceremonies
pub const TYPE_CREATE: &str = "webauthn.create";
/// `type` value for authentication ceremonies
pub const TYPE_GET: &str = "webauthn.get";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClientDataError {
    #[error("client data is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("client data challenge is not base64url")]
    InvalidChallengeEncoding,
    #[error("client data type is \"{found}\", expected \"{expected}\"")]
    UnexpectedType { expected: &'static str, found: String },
}

/// Parsed `clientDataJSON`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: bool,
}

impl CollectedClientData {
    /// Parse the raw JSON bytes
    ///
    /// # Errors
    ///
    /// Returns [`ClientDataError::InvalidJson`] if the bytes are not JSON or a
    /// required member is missing.
    pub fn parse(client_data_json: &[u8]) -> Result<Self, ClientDataError> {
        serde_json::from_slice(client_data_json)
            .map_err(|e| ClientDataError::InvalidJson(e.to_string()))
    }

    /// Decoded bytes of the challenge the authenticator signed over
    ///
    /// # Errors
    ///
    /// Returns [`ClientDataError::InvalidChallengeEncoding`] if the challenge
    /// member is not base64url.
    pub fn challenge_bytes(&self) -> Result<Vec<u8>, ClientDataError> {
        encoding::decode(&self.challenge).map_err(|_| ClientDataError::InvalidChallengeEncoding)
    }

    /// # Errors
    ///
    /// Returns [`ClientDataError::UnexpectedType`] when `type` differs.
    pub fn expect_type(&self, expected: &'static str) -> Result<(), ClientDataError> {
        if self.ceremony_type == expected {
            Ok(())
        } else {
            Err(ClientDataError::UnexpectedType {
                expected,
                found: self.ceremony_type.clone(),
            })
        }
    }
}

/// Extract the signed challenge from raw `clientDataJSON`
///
/// # Errors
///
/// Fails if the JSON cannot be parsed or the challenge is not base64url.
pub fn extract_signed_challenge(client_data_json: &[u8]) -> Result<Vec<u8>, ClientDataError> {
    CollectedClientData::parse(client_data_json)?.challenge_bytes()
}
