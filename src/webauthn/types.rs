//! `WebAuthn` JSON payload types
//!
//! These mirror the platform's public-key-credential option and response
//! structures. Field names are camelCase on the wire and every binary field is
//! base64url text. Required fields are plain, optional ones are `Option` or
//! defaulted, so an incomplete payload fails deserialization instead of being
//! half-read.

use serde::{Deserialize, Serialize};

use super::challenge::{Challenge, UserHandle};
use super::errors::CeremonyError;
use crate::utils::encoding::{self, base64url};

/// The only credential type defined by `WebAuthn`
pub const PUBLIC_KEY_CREDENTIAL_TYPE: &str = "public-key";

/// Options passed to `navigator.credentials.create()`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub challenge: Challenge,
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    pub authenticator_selection: AuthenticatorSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>, // milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>, // "none", "indirect", "direct"
}

/// Options passed to `navigator.credentials.get()`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: Challenge,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
}

/// Relying party identity shown by the authenticator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingPartyEntity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>, // Domain name (e.g., "example.com")
}

/// Account the new credential belongs to
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: UserHandle,
    pub name: String,
    pub display_name: String,
}

/// One entry of `pubKeyCredParams`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub credential_type: String,
    pub alg: i64,
}

impl PublicKeyCredentialParameters {
    #[must_use]
    pub fn public_key(alg: i64) -> Self {
        Self {
            credential_type: PUBLIC_KEY_CREDENTIAL_TYPE.to_string(),
            alg,
        }
    }
}

/// Authenticator selection criteria
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub resident_key: String, // "required" lets the user agent list accounts
    pub require_resident_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<String>,
}

impl AuthenticatorSelection {
    /// Ask for a discoverable credential
    #[must_use]
    pub fn resident_key_required(user_verification: Option<String>) -> Self {
        Self {
            resident_key: "required".to_string(),
            require_resident_key: true,
            user_verification,
        }
    }
}

/// Reference to an existing credential in `allowCredentials`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
}

impl PublicKeyCredentialDescriptor {
    #[must_use]
    pub fn public_key(id: Vec<u8>) -> Self {
        Self {
            credential_type: PUBLIC_KEY_CREDENTIAL_TYPE.to_string(),
            id,
        }
    }
}

/// Registration response returned by the authenticator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
    #[serde(default, with = "base64url::option", skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<Vec<u8>>,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub response: AuthenticatorAttestationResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_extension_results: Option<serde_json::Value>,
}

/// Attestation payload; the public key is a DER `SubjectPublicKeyInfo`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON", with = "base64url")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "base64url")]
    pub authenticator_data: Vec<u8>,
    #[serde(with = "base64url")]
    pub public_key: Vec<u8>,
    pub public_key_algorithm: i64,
    #[serde(default, with = "base64url::option", skip_serializing_if = "Option::is_none")]
    pub attestation_object: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

/// Authentication response returned by the authenticator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    #[serde(with = "base64url")]
    pub id: Vec<u8>,
    #[serde(default, with = "base64url::option", skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<Vec<u8>>,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub response: AuthenticatorAssertionResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_extension_results: Option<serde_json::Value>,
}

/// Assertion payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON", with = "base64url")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "base64url")]
    pub authenticator_data: Vec<u8>,
    #[serde(with = "base64url")]
    pub signature: Vec<u8>,
    #[serde(default, with = "base64url::option", skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<Vec<u8>>,
}

fn check_envelope(
    id: &[u8],
    raw_id: Option<&Vec<u8>>,
    credential_type: &str,
) -> Result<(), String> {
    if credential_type != PUBLIC_KEY_CREDENTIAL_TYPE {
        return Err(format!("unexpected credential type \"{credential_type}\""));
    }
    if id.is_empty() {
        return Err("empty credential id".to_string());
    }
    if raw_id.is_some_and(|raw| raw.as_slice() != id) {
        return Err("rawId does not match id".to_string());
    }
    Ok(())
}

impl AttestationResponse {
    /// Parse the JSON shape produced by the client
    ///
    /// # Errors
    ///
    /// Returns [`CeremonyError::MalformedAttestation`] when a required field is
    /// missing or a binary field is not base64url.
    pub fn from_json(value: serde_json::Value) -> Result<Self, CeremonyError> {
        serde_json::from_value(value).map_err(|e| CeremonyError::MalformedAttestation(e.to_string()))
    }

    /// Validate the credential envelope (type, id, rawId)
    ///
    /// # Errors
    ///
    /// Returns [`CeremonyError::MalformedAttestation`] on inconsistency.
    pub fn check_envelope(&self) -> Result<(), CeremonyError> {
        check_envelope(&self.id, self.raw_id.as_ref(), &self.credential_type)
            .map_err(CeremonyError::MalformedAttestation)
    }

    /// Base64url credential id, as used in logs and error messages
    #[must_use]
    pub fn encoded_id(&self) -> String {
        encoding::encode(&self.id)
    }
}

impl AssertionResponse {
    /// Parse the JSON shape produced by the client
    ///
    /// # Errors
    ///
    /// Returns [`CeremonyError::MalformedAssertion`] when a required field is
    /// missing or a binary field is not base64url.
    pub fn from_json(value: serde_json::Value) -> Result<Self, CeremonyError> {
        serde_json::from_value(value).map_err(|e| CeremonyError::MalformedAssertion(e.to_string()))
    }

    /// Validate the credential envelope (type, id, rawId)
    ///
    /// # Errors
    ///
    /// Returns [`CeremonyError::MalformedAssertion`] on inconsistency.
    pub fn check_envelope(&self) -> Result<(), CeremonyError> {
        check_envelope(&self.id, self.raw_id.as_ref(), &self.credential_type)
            .map_err(CeremonyError::MalformedAssertion)
    }

    #[must_use]
    pub fn encoded_id(&self) -> String {
        encoding::encode(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attestation_from_browser_json() {
        let value = json!({
            "id": "AQID",
            "rawId": "AQID",
            "type": "public-key",
            "authenticatorAttachment": "platform",
            "clientExtensionResults": {},
            "response": {
                "clientDataJSON": "e30",
                "authenticatorData": "AAAA",
                "publicKey": "BAUG",
                "publicKeyAlgorithm": -7,
                "transports": ["internal", "hybrid"]
            }
        });
        let response = AttestationResponse::from_json(value).unwrap();
        assert_eq!(response.id, vec![1, 2, 3]);
        assert_eq!(response.response.client_data_json, b"{}");
        assert_eq!(response.response.public_key_algorithm, -7);
        assert_eq!(response.response.transports.len(), 2);
        assert!(response.response.attestation_object.is_none());
        assert!(response.check_envelope().is_ok());
    }

    #[test]
    fn test_attestation_missing_public_key_is_malformed() {
        let value = json!({
            "id": "AQID",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "authenticatorData": "AAAA",
                "publicKeyAlgorithm": -7
            }
        });
        let error = AttestationResponse::from_json(value).unwrap_err();
        assert!(matches!(error, CeremonyError::MalformedAttestation(_)));
    }

    #[test]
    fn test_assertion_bad_base64_is_malformed() {
        let value = json!({
            "id": "AQID",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "authenticatorData": "AAAA",
                "signature": "not base64!"
            }
        });
        let error = AssertionResponse::from_json(value).unwrap_err();
        assert!(matches!(error, CeremonyError::MalformedAssertion(_)));
    }

    #[test]
    fn test_envelope_checks() {
        let value = json!({
            "id": "AQID",
            "rawId": "AQIE",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "authenticatorData": "AAAA",
                "signature": "AAAA"
            }
        });
        let response = AssertionResponse::from_json(value).unwrap();
        assert!(matches!(
            response.check_envelope(),
            Err(CeremonyError::MalformedAssertion(_))
        ));

        let mut response = response;
        response.raw_id = None;
        response.credential_type = "password".to_string();
        assert!(response.check_envelope().is_err());
    }

    #[test]
    fn test_request_options_omit_empty_fields() {
        let options = RequestOptions {
            challenge: Challenge::from_bytes(vec![1, 2, 3]),
            rp_id: None,
            timeout: None,
            user_verification: None,
            allow_credentials: Vec::new(),
        };
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value, json!({ "challenge": "AQID" }));
    }
}
