//! `WebAuthn` service implementation
//!
//! Ties the ceremonies to the challenge ledger. Clients never send a
//! challenge back: they present the ceremony id they were given at start, and
//! the service validates against the challenge it remembered for that id.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use super::authentication::{AuthenticationCeremony, AuthenticationOutcome};
use super::authenticator::{Authenticator, AuthenticatorError};
use super::errors::CeremonyError;
use super::ledger::{CeremonyKind, ChallengeLedger};
use super::registration::{RegistrationCeremony, RegistrationOutcome};
use super::relying_party::RelyingParty;
use super::settings::WebAuthnSettings;
use super::types::{AssertionResponse, AttestationResponse, CreationOptions, RequestOptions};
use crate::store::CredentialStore;

/// Options for the client plus the id it must return with its response
#[derive(Debug, Clone, Serialize)]
pub struct CeremonyStart<T> {
    pub ceremony_id: Uuid,
    pub options: T,
}

/// Core `WebAuthn` service
pub struct RelyingPartyService<S: CredentialStore + ?Sized> {
    registration: RegistrationCeremony<S>,
    authentication: AuthenticationCeremony<S>,
    ledger: ChallengeLedger,
    timeout: Duration,
}

impl<S: CredentialStore + ?Sized> fmt::Debug for RelyingPartyService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelyingPartyService")
            .field("registration", &self.registration)
            .field("pending", &self.ledger.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<S: CredentialStore + ?Sized> RelyingPartyService<S> {
    #[must_use]
    pub fn new(rp: Arc<RelyingParty>, store: Arc<S>) -> Self {
        let settings = rp.settings();
        let ledger = ChallengeLedger::new(settings.challenge_ttl_seconds);
        let timeout = Duration::from_secs(settings.timeout_seconds);
        Self {
            registration: RegistrationCeremony::new(Arc::clone(&rp), Arc::clone(&store)),
            authentication: AuthenticationCeremony::new(rp, store),
            ledger,
            timeout,
        }
    }

    /// # Errors
    ///
    /// Returns [`CeremonyError::Configuration`] if the settings name an
    /// algorithm that cannot be verified.
    pub fn from_settings(settings: WebAuthnSettings, store: Arc<S>) -> Result<Self, CeremonyError> {
        Ok(Self::new(Arc::new(RelyingParty::new(settings)?), store))
    }

    #[must_use]
    pub fn ledger(&self) -> &ChallengeLedger {
        &self.ledger
    }

    /// # Errors
    ///
    /// Returns [`CeremonyError::EntropyUnavailable`] if randomness fails.
    pub fn start_registration(&self) -> Result<CeremonyStart<CreationOptions>, CeremonyError> {
        let options = self.registration.build_options()?;
        let ceremony_id = self.ledger.issue(
            CeremonyKind::Registration,
            options.challenge.clone(),
            Some(options.user.id.clone()),
        );
        Ok(CeremonyStart {
            ceremony_id,
            options,
        })
    }

    /// Redeem a registration ceremony id and validate the attestation
    ///
    /// The ceremony id is spent even when validation fails.
    ///
    /// # Errors
    ///
    /// Ledger errors ([`CeremonyError::UnknownCeremony`],
    /// [`CeremonyError::ChallengeExpired`]) or any registration failure.
    pub fn finish_registration(
        &self,
        ceremony_id: Uuid,
        response: &AttestationResponse,
    ) -> Result<RegistrationOutcome, CeremonyError> {
        let issued = self.ledger.consume(ceremony_id, CeremonyKind::Registration)?;
        self.registration
            .validate_and_store(response, &issued.challenge, issued.user_handle.as_ref())
    }

    /// # Errors
    ///
    /// Returns [`CeremonyError::EntropyUnavailable`] if randomness fails.
    pub fn start_authentication(
        &self,
        allow_credentials: &[Vec<u8>],
    ) -> Result<CeremonyStart<RequestOptions>, CeremonyError> {
        let options = self.authentication.build_options(allow_credentials)?;
        let ceremony_id =
            self.ledger
                .issue(CeremonyKind::Authentication, options.challenge.clone(), None);
        Ok(CeremonyStart {
            ceremony_id,
            options,
        })
    }

    /// Redeem an authentication ceremony id and validate the assertion
    ///
    /// # Errors
    ///
    /// Ledger errors or any authentication failure. A bad signature is
    /// `Ok` with `verified == false`.
    pub fn finish_authentication(
        &self,
        ceremony_id: Uuid,
        response: &AssertionResponse,
    ) -> Result<AuthenticationOutcome, CeremonyError> {
        let issued = self.ledger.consume(ceremony_id, CeremonyKind::Authentication)?;
        self.authentication.validate(response, &issued.challenge)
    }

    /// Run a whole registration against `authenticator`
    ///
    /// Cancellation or timeout discards the issued challenge and writes nothing.
    ///
    /// # Errors
    ///
    /// [`CeremonyError::Cancelled`], [`CeremonyError::TimedOut`],
    /// [`CeremonyError::Authenticator`] or any registration failure.
    pub async fn run_registration<A: Authenticator + ?Sized>(
        &self,
        authenticator: &A,
    ) -> Result<RegistrationOutcome, CeremonyError> {
        let start = self.start_registration()?;
        let response = self
            .await_response(start.ceremony_id, authenticator.invoke_create(&start.options))
            .await?;
        self.finish_registration(start.ceremony_id, &response)
    }

    /// Run a whole authentication against `authenticator`
    ///
    /// # Errors
    ///
    /// [`CeremonyError::Cancelled`], [`CeremonyError::TimedOut`],
    /// [`CeremonyError::Authenticator`] or any authentication failure.
    pub async fn run_authentication<A: Authenticator + ?Sized>(
        &self,
        authenticator: &A,
        allow_credentials: &[Vec<u8>],
    ) -> Result<AuthenticationOutcome, CeremonyError> {
        let start = self.start_authentication(allow_credentials)?;
        let response = self
            .await_response(start.ceremony_id, authenticator.invoke_get(&start.options))
            .await?;
        self.finish_authentication(start.ceremony_id, &response)
    }

    async fn await_response<T, F>(&self, ceremony_id: Uuid, pending: F) -> Result<T, CeremonyError>
    where
        F: Future<Output = Result<T, AuthenticatorError>>,
    {
        let error = match tokio::time::timeout(self.timeout, pending).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(error)) => CeremonyError::from(error),
            Err(_) => CeremonyError::TimedOut(self.timeout.as_secs()),
        };
        self.ledger.discard(ceremony_id);
        log::info!("Ceremony {ceremony_id} aborted: {error}");
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;
    use crate::testing::constants::TEST_ORIGIN;
    use crate::testing::{AuthenticatorMode, SoftAuthenticator, TestFixtures};

    fn service() -> (RelyingPartyService<MemoryCredentialStore>, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let service = RelyingPartyService::new(TestFixtures::relying_party(), Arc::clone(&store));
        (service, store)
    }

    #[test]
    fn test_replayed_registration_rejected() {
        let (service, _) = service();
        let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
        let start = service.start_registration().unwrap();
        let response = authenticator.attest(&start.options).unwrap();

        service.finish_registration(start.ceremony_id, &response).unwrap();
        let error = service
            .finish_registration(start.ceremony_id, &response)
            .unwrap_err();
        assert!(matches!(error, CeremonyError::UnknownCeremony));
    }

    #[test]
    fn test_failed_validation_spends_ceremony() {
        let (service, store) = service();
        let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
        let start = service.start_registration().unwrap();
        let mut response = authenticator.attest(&start.options).unwrap();
        response.response.public_key_algorithm = -999;

        assert!(matches!(
            service.finish_registration(start.ceremony_id, &response),
            Err(CeremonyError::UnsupportedAlgorithm(-999))
        ));
        response.response.public_key_algorithm = -7;
        assert!(matches!(
            service.finish_registration(start.ceremony_id, &response),
            Err(CeremonyError::UnknownCeremony)
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_registration_id_cannot_finish_authentication() {
        let (service, _) = service();
        let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
        let registration = service.start_registration().unwrap();
        let response = authenticator.attest(&registration.options).unwrap();
        service
            .finish_registration(registration.ceremony_id, &response)
            .unwrap();

        let stray = service.start_registration().unwrap();
        let options = service.start_authentication(&[]).unwrap().options;
        let assertion = authenticator.assert(&options).unwrap();
        assert!(matches!(
            service.finish_authentication(stray.ceremony_id, &assertion),
            Err(CeremonyError::UnknownCeremony)
        ));
    }

    #[tokio::test]
    async fn test_full_round_trip() {
        let (service, _) = service();
        let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
        let registered = service.run_registration(&authenticator).await.unwrap();
        let outcome = service
            .run_authentication(&authenticator, &[registered.record.credential_id.clone()])
            .await
            .unwrap();
        assert!(outcome.verified);
        assert!(service.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_commits_nothing() {
        let (service, store) = service();
        let authenticator =
            SoftAuthenticator::new(TEST_ORIGIN).with_mode(AuthenticatorMode::Cancel);
        let error = service.run_registration(&authenticator).await.unwrap_err();
        assert!(matches!(error, CeremonyError::Cancelled));
        assert!(store.is_empty().unwrap());
        assert!(service.ledger().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_authenticator_times_out() {
        let (service, store) = service();
        let authenticator =
            SoftAuthenticator::new(TEST_ORIGIN).with_mode(AuthenticatorMode::Hang);
        let error = service.run_registration(&authenticator).await.unwrap_err();
        assert!(matches!(error, CeremonyError::TimedOut(60)));
        assert!(store.is_empty().unwrap());
        assert!(service.ledger().is_empty());
    }
}
