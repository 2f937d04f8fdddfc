//! Registration ceremony
//!
//! `build_options` → (authenticator) → `validate_and_store`. The ceremony is
//! linear: any failure ends it and the caller starts over with fresh options.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::authenticator_data::parse_authenticator_data;
use super::challenge::{generate_challenge, generate_user_handle, Challenge, UserHandle};
use super::client_data::{CollectedClientData, TYPE_CREATE};
use super::errors::CeremonyError;
use super::policy::cose;
use super::relying_party::RelyingParty;
use super::types::{AttestationResponse, AuthenticatorSelection, CreationOptions, UserEntity};
use crate::store::{CredentialRecord, CredentialStore};

/// What to do when a credential id is registered twice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Refuse the second registration
    #[default]
    Reject,
    /// Replace the stored record
    Overwrite,
    /// Replace the stored record with one carrying the next version number
    VersionAsNewFactor,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "overwrite" => Ok(Self::Overwrite),
            "version_as_new_factor" | "version" => Ok(Self::VersionAsNewFactor),
            other => Err(format!("unknown duplicate policy \"{other}\"")),
        }
    }
}

/// Result of a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub record: CredentialRecord,
    /// The record this registration superseded, if any
    pub replaced: Option<CredentialRecord>,
}

pub struct RegistrationCeremony<S: CredentialStore + ?Sized> {
    rp: Arc<RelyingParty>,
    store: Arc<S>,
    duplicate_policy: DuplicatePolicy,
}

impl<S: CredentialStore + ?Sized> fmt::Debug for RegistrationCeremony<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationCeremony")
            .field("rp", &self.rp)
            .field("duplicate_policy", &self.duplicate_policy)
            .finish_non_exhaustive()
    }
}

fn malformed(reason: impl fmt::Display) -> CeremonyError {
    CeremonyError::MalformedAttestation(reason.to_string())
}

impl<S: CredentialStore + ?Sized> RegistrationCeremony<S> {
    /// The duplicate policy is taken from the relying party's settings
    #[must_use]
    pub fn new(rp: Arc<RelyingParty>, store: Arc<S>) -> Self {
        let duplicate_policy = rp.settings().duplicate_policy;
        Self {
            rp,
            store,
            duplicate_policy,
        }
    }

    #[must_use]
    pub fn with_duplicate_policy(mut self, duplicate_policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = duplicate_policy;
        self
    }

    #[must_use]
    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    /// Creation options with a fresh challenge and user handle
    ///
    /// # Errors
    ///
    /// Returns [`CeremonyError::EntropyUnavailable`] if randomness fails.
    pub fn build_options(&self) -> Result<CreationOptions, CeremonyError> {
        let settings = self.rp.settings();
        let challenge = generate_challenge(settings.challenge_length)?;
        let user_handle = generate_user_handle(settings.user_handle_length)?;
        let label = user_handle.label(&settings.user_label_prefix);

        log::debug!("Built creation options for {label}");

        Ok(CreationOptions {
            challenge,
            rp: self.rp.entity(),
            user: UserEntity {
                id: user_handle,
                name: label.clone(),
                display_name: label,
            },
            pub_key_cred_params: self.rp.policy().credential_parameters(),
            authenticator_selection: AuthenticatorSelection::resident_key_required(
                settings.user_verification.clone(),
            ),
            timeout: Some(settings.timeout_millis()),
            attestation: Some("none".to_string()),
        })
    }

    /// Validate an attestation against the issued challenge and store it
    ///
    /// # Errors
    ///
    /// - [`CeremonyError::UnsupportedAlgorithm`] before anything else is looked at
    /// - [`CeremonyError::MalformedAttestation`] for structural problems
    /// - [`CeremonyError::ChallengeMismatch`], [`CeremonyError::OriginMismatch`],
    ///   [`CeremonyError::RelyingPartyMismatch`] for binding failures
    /// - [`CeremonyError::DuplicateCredential`] under [`DuplicatePolicy::Reject`]
    /// - [`CeremonyError::Store`] if the record cannot be written
    pub fn validate_and_store(
        &self,
        response: &AttestationResponse,
        expected_challenge: &Challenge,
        user_handle: Option<&UserHandle>,
    ) -> Result<RegistrationOutcome, CeremonyError> {
        let algorithm = response.response.public_key_algorithm;
        if !self.rp.policy().is_supported(algorithm) {
            log::warn!(
                "Rejecting registration of {} with unsupported algorithm {algorithm}",
                response.encoded_id()
            );
            return Err(CeremonyError::UnsupportedAlgorithm(algorithm));
        }

        response.check_envelope()?;

        let client_data =
            CollectedClientData::parse(&response.response.client_data_json).map_err(malformed)?;
        let signed_challenge = client_data.challenge_bytes().map_err(malformed)?;
        if !expected_challenge.matches(&signed_challenge) {
            log::warn!("Registration challenge mismatch for {}", response.encoded_id());
            return Err(CeremonyError::ChallengeMismatch);
        }
        client_data.expect_type(TYPE_CREATE).map_err(malformed)?;
        self.rp.check_origin(&client_data.origin)?;

        let auth_data =
            parse_authenticator_data(&response.response.authenticator_data).map_err(malformed)?;
        let attested = auth_data.require_attested().map_err(malformed)?;
        if attested.credential_id != response.id {
            return Err(malformed("credential id differs from authenticator data"));
        }
        if let Some(cose_alg) = attested.cose_algorithm {
            if cose_alg != algorithm {
                return Err(malformed(format!(
                    "public key algorithm {algorithm} differs from COSE key algorithm {cose_alg}"
                )));
            }
        }
        self.rp.check_rp_id_hash(&auth_data)?;

        let key = self
            .rp
            .crypto()
            .import_key(algorithm, &response.response.public_key)
            .map_err(malformed)?;
        let cose_matches = attested
            .key_parameters
            .as_ref()
            .is_some_and(|parameters| key.matches_cose(parameters));
        if !cose_matches {
            log::warn!(
                "Public key of {} differs from its authenticator data",
                response.encoded_id()
            );
            return Err(malformed("public key differs from COSE key in authenticator data"));
        }

        log::debug!("Parsed authenticator data: {auth_data}");

        let record = CredentialRecord {
            credential_id: response.id.clone(),
            public_key_algorithm: algorithm,
            public_key: response.response.public_key.clone(),
            authenticator_data: response.response.authenticator_data.clone(),
            user_handle: user_handle.map(|handle| handle.as_bytes().to_vec()),
            registered_at: Utc::now(),
            version: 1,
        };

        let (record, replaced) = match self.duplicate_policy {
            DuplicatePolicy::Reject => {
                if !self.store.put_if_absent(record.clone())? {
                    log::warn!("Credential {} already registered", record.encoded_id());
                    return Err(CeremonyError::DuplicateCredential(record.encoded_id()));
                }
                (record, None)
            }
            DuplicatePolicy::Overwrite => {
                let replaced = self.store.put(record.clone())?;
                (record, replaced)
            }
            DuplicatePolicy::VersionAsNewFactor => self.store.put_versioned(record)?,
        };

        log::info!(
            "Registered credential {} ({}, version {})",
            record.encoded_id(),
            cose::name(algorithm),
            record.version
        );

        Ok(RegistrationOutcome { record, replaced })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;
    use crate::testing::constants::TEST_ORIGIN;
    use crate::testing::{SoftAuthenticator, TestFixtures};

    fn ceremony() -> (RegistrationCeremony<MemoryCredentialStore>, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let ceremony = RegistrationCeremony::new(TestFixtures::relying_party(), Arc::clone(&store));
        (ceremony, store)
    }

    #[test]
    fn test_build_options() {
        let (ceremony, _) = ceremony();
        let options = ceremony.build_options().unwrap();
        assert_eq!(options.challenge.len(), 16);
        assert_eq!(options.user.id.as_bytes().len(), 16);
        assert!(options.user.name.starts_with("demo-"));
        assert_eq!(options.user.name.len(), "demo-".len() + 8);
        assert_eq!(options.user.name, options.user.display_name);
        assert_eq!(options.authenticator_selection.resident_key, "required");
        let algs: Vec<i64> = options.pub_key_cred_params.iter().map(|p| p.alg).collect();
        assert_eq!(algs, vec![cose::ES256, cose::RS256]);
    }

    #[test]
    fn test_register_es256() {
        let (ceremony, store) = ceremony();
        let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
        let options = ceremony.build_options().unwrap();
        let response = authenticator.attest(&options).unwrap();

        let outcome = ceremony
            .validate_and_store(&response, &options.challenge, Some(&options.user.id))
            .unwrap();
        assert_eq!(outcome.record.version, 1);
        assert!(outcome.replaced.is_none());

        let stored = store.get(&response.id).unwrap().unwrap();
        assert_eq!(stored.public_key_algorithm, cose::ES256);
        assert_eq!(stored.public_key, response.response.public_key);
        assert_eq!(stored.user_handle.as_deref(), Some(options.user.id.as_bytes()));
    }

    #[test]
    fn test_unsupported_algorithm_never_touches_store() {
        let (ceremony, store) = ceremony();
        let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
        let options = ceremony.build_options().unwrap();
        let mut response = authenticator.attest(&options).unwrap();

        for alg in [-999, cose::EDDSA, cose::ES384, 0] {
            response.response.public_key_algorithm = alg;
            let error = ceremony
                .validate_and_store(&response, &options.challenge, None)
                .unwrap_err();
            assert!(matches!(error, CeremonyError::UnsupportedAlgorithm(a) if a == alg));
        }
        assert!(store.is_empty().unwrap());
        assert!(store.get(&response.id).unwrap().is_none());
    }

    #[test]
    fn test_challenge_mismatch() {
        let (ceremony, store) = ceremony();
        let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
        let options = ceremony.build_options().unwrap();
        let response = authenticator.attest(&options).unwrap();

        let mut other = options.challenge.as_bytes().to_vec();
        other[0] ^= 0x01;
        let error = ceremony
            .validate_and_store(&response, &Challenge::from_bytes(other), None)
            .unwrap_err();
        assert!(matches!(error, CeremonyError::ChallengeMismatch));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_wrong_origin() {
        let (ceremony, _) = ceremony();
        let authenticator = SoftAuthenticator::new("https://phishing.test");
        let options = ceremony.build_options().unwrap();
        let response = authenticator.attest(&options).unwrap();
        let error = ceremony
            .validate_and_store(&response, &options.challenge, None)
            .unwrap_err();
        assert!(matches!(error, CeremonyError::OriginMismatch(_)));
    }

    #[test]
    fn test_malformed_attestations() {
        let (ceremony, store) = ceremony();
        let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
        let options = ceremony.build_options().unwrap();
        let response = authenticator.attest(&options).unwrap();

        let mut truncated = response.clone();
        truncated.response.authenticator_data.truncate(36);
        let mut bad_key = response.clone();
        bad_key.response.public_key = vec![0x30, 0x00];
        let mut other_id = response.clone();
        other_id.id = vec![0xEE; 16];
        let mut rsa_claim = response.clone();
        rsa_claim.response.public_key_algorithm = cose::RS256;
        let mut not_json = response.clone();
        not_json.response.client_data_json = b"{".to_vec();

        for bad in [truncated, bad_key, other_id, rsa_claim, not_json] {
            let error = ceremony
                .validate_and_store(&bad, &options.challenge, None)
                .unwrap_err();
            assert!(
                matches!(error, CeremonyError::MalformedAttestation(_)),
                "unexpected {error:?}"
            );
        }
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_public_key_must_match_authenticator_data() {
        let (ceremony, store) = ceremony();
        let options = ceremony.build_options().unwrap();
        let mut response = SoftAuthenticator::new(TEST_ORIGIN).attest(&options).unwrap();
        // A well-formed key of the same algorithm, but from another authenticator
        let other = SoftAuthenticator::new(TEST_ORIGIN).attest(&options).unwrap();
        assert_ne!(other.response.public_key, response.response.public_key);
        response.response.public_key = other.response.public_key;

        let error = ceremony
            .validate_and_store(&response, &options.challenge, None)
            .unwrap_err();
        assert!(
            matches!(&error, CeremonyError::MalformedAttestation(reason) if reason.contains("COSE")),
            "unexpected {error:?}"
        );
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_duplicate_policies() {
        let (ceremony, store) = ceremony();
        let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
        let options = ceremony.build_options().unwrap();
        let response = authenticator.attest(&options).unwrap();

        ceremony
            .validate_and_store(&response, &options.challenge, None)
            .unwrap();
        let error = ceremony
            .validate_and_store(&response, &options.challenge, None)
            .unwrap_err();
        assert!(matches!(error, CeremonyError::DuplicateCredential(_)));

        let versioned = ceremony.with_duplicate_policy(DuplicatePolicy::VersionAsNewFactor);
        let outcome = versioned
            .validate_and_store(&response, &options.challenge, None)
            .unwrap();
        assert_eq!(outcome.record.version, 2);
        assert_eq!(outcome.replaced.unwrap().version, 1);

        let overwrite = versioned.with_duplicate_policy(DuplicatePolicy::Overwrite);
        let outcome = overwrite
            .validate_and_store(&response, &options.challenge, None)
            .unwrap();
        assert_eq!(outcome.record.version, 1);
        assert_eq!(outcome.replaced.unwrap().version, 2);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_policy_from_str() {
        assert_eq!("Reject".parse::<DuplicatePolicy>(), Ok(DuplicatePolicy::Reject));
        assert_eq!(
            "version_as_new_factor".parse::<DuplicatePolicy>(),
            Ok(DuplicatePolicy::VersionAsNewFactor)
        );
        assert!("sometimes".parse::<DuplicatePolicy>().is_err());
    }
}
