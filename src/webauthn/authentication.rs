//! Authentication ceremony
//!
//! A bad signature is an expected outcome and is reported as
//! `verified == false`. Structural problems (wrong challenge, unknown
//! credential, malformed response) are errors.

use std::fmt;
use std::sync::Arc;

use super::authenticator_data::parse_authenticator_data;
use super::challenge::{generate_challenge, Challenge};
use super::client_data::{CollectedClientData, TYPE_GET};
use super::errors::CeremonyError;
use super::relying_party::RelyingParty;
use super::types::{AssertionResponse, PublicKeyCredentialDescriptor, RequestOptions};
use crate::store::CredentialStore;

/// Result of validating an assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationOutcome {
    pub verified: bool,
    pub credential_id: Vec<u8>,
    pub sign_count: u32,
    pub user_present: bool,
    pub user_verified: bool,
}

pub struct AuthenticationCeremony<S: CredentialStore + ?Sized> {
    rp: Arc<RelyingParty>,
    store: Arc<S>,
}

impl<S: CredentialStore + ?Sized> fmt::Debug for AuthenticationCeremony<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationCeremony")
            .field("rp", &self.rp)
            .finish_non_exhaustive()
    }
}

fn malformed(reason: impl fmt::Display) -> CeremonyError {
    CeremonyError::MalformedAssertion(reason.to_string())
}

impl<S: CredentialStore + ?Sized> AuthenticationCeremony<S> {
    #[must_use]
    pub fn new(rp: Arc<RelyingParty>, store: Arc<S>) -> Self {
        Self { rp, store }
    }

    /// Request options with a fresh challenge
    ///
    /// `allow_credentials` may be empty, in which case the authenticator offers
    /// its discoverable credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CeremonyError::EntropyUnavailable`] if randomness fails.
    pub fn build_options(&self, allow_credentials: &[Vec<u8>]) -> Result<RequestOptions, CeremonyError> {
        let settings = self.rp.settings();
        Ok(RequestOptions {
            challenge: generate_challenge(settings.challenge_length)?,
            rp_id: settings.rp_id.clone(),
            timeout: Some(settings.timeout_millis()),
            user_verification: settings.user_verification.clone(),
            allow_credentials: allow_credentials
                .iter()
                .cloned()
                .map(PublicKeyCredentialDescriptor::public_key)
                .collect(),
        })
    }

    /// Validate an assertion against the challenge that was issued for it
    ///
    /// # Errors
    ///
    /// - [`CeremonyError::MalformedAssertion`] for structural problems
    /// - [`CeremonyError::ChallengeMismatch`] if the signed challenge differs,
    ///   checked before the store or any key is touched
    /// - [`CeremonyError::OriginMismatch`], [`CeremonyError::RelyingPartyMismatch`],
    ///   [`CeremonyError::UserHandleMismatch`] for binding failures
    /// - [`CeremonyError::UnknownCredential`] if the credential is not stored
    /// - [`CeremonyError::KeyImport`] if the stored key is unusable
    pub fn validate(
        &self,
        response: &AssertionResponse,
        expected_challenge: &Challenge,
    ) -> Result<AuthenticationOutcome, CeremonyError> {
        response.check_envelope()?;
        let assertion = &response.response;

        let client_data = CollectedClientData::parse(&assertion.client_data_json).map_err(malformed)?;
        let signed_challenge = client_data.challenge_bytes().map_err(malformed)?;
        if !expected_challenge.matches(&signed_challenge) {
            log::warn!("Authentication challenge mismatch for {}", response.encoded_id());
            return Err(CeremonyError::ChallengeMismatch);
        }
        client_data.expect_type(TYPE_GET).map_err(malformed)?;
        self.rp.check_origin(&client_data.origin)?;

        let Some(record) = self.store.get(&response.id)? else {
            log::warn!("Assertion for unknown credential {}", response.encoded_id());
            return Err(CeremonyError::UnknownCredential(response.encoded_id()));
        };

        let auth_data = parse_authenticator_data(&assertion.authenticator_data).map_err(malformed)?;
        self.rp.check_rp_id_hash(&auth_data)?;
        log::debug!("Parsed authenticator data: {auth_data}");

        if let (Some(stored), Some(presented)) = (&record.user_handle, &assertion.user_handle) {
            if stored != presented {
                return Err(CeremonyError::UserHandleMismatch);
            }
        }

        let crypto = self.rp.crypto();
        let key = crypto
            .import_key(record.public_key_algorithm, &record.public_key)
            .map_err(|e| {
                log::error!("Stored key for {} is unusable: {e}", record.encoded_id());
                CeremonyError::KeyImport(e.to_string())
            })?;

        let verified = crypto.verify_signature(
            &key,
            &assertion.authenticator_data,
            &assertion.client_data_json,
            &assertion.signature,
        );
        if verified {
            log::info!("Assertion verified for {}", record.encoded_id());
        } else {
            log::warn!("Assertion signature invalid for {}", record.encoded_id());
        }

        Ok(AuthenticationOutcome {
            verified,
            credential_id: record.credential_id,
            sign_count: auth_data.sign_count,
            user_present: auth_data.user_present(),
            user_verified: auth_data.user_verified(),
        })
    }
}
