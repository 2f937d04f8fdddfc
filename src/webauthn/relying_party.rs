//! Relying-party identity and the checks bound to it
//!
//! Holds what both ceremonies need to know about "who we are": the display
//! name, the optional RP id (and its SHA-256), the accepted origins, the
//! algorithm policy and the cryptographic provider.

use std::fmt;
use std::sync::Arc;

use super::authenticator_data::AuthenticatorData;
use super::crypto::{self, CryptoProvider, DefaultCryptoProvider};
use super::errors::CeremonyError;
use super::policy::{cose, AlgorithmPolicy};
use super::settings::WebAuthnSettings;
use super::types::RelyingPartyEntity;

pub struct RelyingParty {
    settings: WebAuthnSettings,
    policy: AlgorithmPolicy,
    crypto: Arc<dyn CryptoProvider>,
    rp_id_hash: Option<[u8; 32]>,
}

impl fmt::Debug for RelyingParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelyingParty")
            .field("name", &self.settings.rp_name)
            .field("id", &self.settings.rp_id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RelyingParty {
    /// Build a relying party using the default cryptographic provider
    ///
    /// # Errors
    ///
    /// Returns [`CeremonyError::Configuration`] if a supported algorithm cannot
    /// be verified.
    pub fn new(settings: WebAuthnSettings) -> Result<Self, CeremonyError> {
        Self::with_crypto(settings, Arc::new(DefaultCryptoProvider))
    }

    /// # Errors
    ///
    /// Returns [`CeremonyError::Configuration`] if a supported algorithm cannot
    /// be verified by `crypto`.
    pub fn with_crypto(
        settings: WebAuthnSettings,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Result<Self, CeremonyError> {
        let policy = settings.algorithm_policy();

        if let Some(alg) = policy.supported().find(|alg| !crypto.supports(*alg)) {
            return Err(CeremonyError::Configuration(format!(
                "algorithm {alg} ({}) is accepted but cannot be verified",
                cose::name(alg)
            )));
        }
        for alg in policy.unadvertised() {
            log::warn!(
                "Algorithm {alg} ({}) is accepted but missing from the preference list",
                cose::name(alg)
            );
        }
        if settings.allowed_origins.is_empty() {
            log::warn!("No allowed origins configured; client data origin will not be checked");
        }

        let rp_id_hash = settings.rp_id.as_deref().map(|id| crypto::sha256(id.as_bytes()));

        Ok(Self {
            settings,
            policy,
            crypto,
            rp_id_hash,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &WebAuthnSettings {
        &self.settings
    }

    #[must_use]
    pub fn policy(&self) -> &AlgorithmPolicy {
        &self.policy
    }

    #[must_use]
    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    /// The `rp` member of creation options
    #[must_use]
    pub fn entity(&self) -> RelyingPartyEntity {
        RelyingPartyEntity {
            name: self.settings.rp_name.clone(),
            id: self.settings.rp_id.clone(),
        }
    }

    /// # Errors
    ///
    /// Returns [`CeremonyError::OriginMismatch`] if origins are configured and
    /// `origin` is not one of them.
    pub fn check_origin(&self, origin: &str) -> Result<(), CeremonyError> {
        if self.settings.allowed_origins.is_empty() {
            return Ok(());
        }
        let origin = origin.trim_end_matches('/');
        if self
            .settings
            .allowed_origins
            .iter()
            .any(|allowed| allowed.trim_end_matches('/') == origin)
        {
            Ok(())
        } else {
            Err(CeremonyError::OriginMismatch(origin.to_string()))
        }
    }

    /// # Errors
    ///
    /// Returns [`CeremonyError::RelyingPartyMismatch`] if an RP id is configured
    /// and the authenticator data was produced for a different one.
    pub fn check_rp_id_hash(&self, auth_data: &AuthenticatorData) -> Result<(), CeremonyError> {
        match &self.rp_id_hash {
            Some(expected) if expected != &auth_data.rp_id_hash => {
                Err(CeremonyError::RelyingPartyMismatch)
            }
            _ => Ok(()),
        }
    }
}
