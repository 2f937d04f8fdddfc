//! Test fixtures providing pre-built test objects

use std::sync::Arc;

use crate::settings::Settings;
use crate::store::{CredentialStore, MemoryCredentialStore};
use crate::webauthn::{cose, RelyingParty, RelyingPartyService, WebAuthnSettings};

use super::constants::{TEST_ORIGIN, TEST_RP_ID};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Relying-party settings bound to [`TEST_ORIGIN`] and [`TEST_RP_ID`]
    #[must_use]
    pub fn webauthn_settings() -> WebAuthnSettings {
        WebAuthnSettings {
            rp_id: Some(TEST_RP_ID.to_string()),
            allowed_origins: vec![TEST_ORIGIN.to_string()],
            ..WebAuthnSettings::default()
        }
    }

    /// Same as [`Self::webauthn_settings`] with `EdDSA` accepted as well
    #[must_use]
    pub fn webauthn_settings_with_eddsa() -> WebAuthnSettings {
        WebAuthnSettings {
            supported_algorithms: vec![cose::ES256, cose::RS256, cose::EDDSA],
            ..Self::webauthn_settings()
        }
    }

    /// Application settings wrapping [`Self::webauthn_settings`]
    #[must_use]
    pub fn settings() -> Settings {
        Settings {
            webauthn: Self::webauthn_settings(),
            ..Settings::default()
        }
    }

    /// # Panics
    ///
    /// Panics if the fixture settings are rejected.
    #[must_use]
    pub fn relying_party() -> Arc<RelyingParty> {
        Arc::new(RelyingParty::new(Self::webauthn_settings()).expect("fixture settings are valid"))
    }

    /// A service over a fresh in-memory store
    #[must_use]
    pub fn memory_service() -> (
        RelyingPartyService<MemoryCredentialStore>,
        Arc<MemoryCredentialStore>,
    ) {
        let store = Arc::new(MemoryCredentialStore::new());
        let service = RelyingPartyService::new(Self::relying_party(), Arc::clone(&store));
        (service, store)
    }

    /// A type-erased service, as the HTTP handlers hold it
    #[must_use]
    pub fn shared_service() -> (
        Arc<RelyingPartyService<dyn CredentialStore>>,
        Arc<MemoryCredentialStore>,
    ) {
        let store = Arc::new(MemoryCredentialStore::new());
        let erased: Arc<dyn CredentialStore> = store.clone();
        let service = Arc::new(RelyingPartyService::new(Self::relying_party(), erased));
        (service, store)
    }
}
