//! `WebAuthn` ceremony error types
//!
//! Errors are grouped by [`ErrorKind`] so callers can decide how to surface
//! them without matching every variant. A signature that fails to verify is
//! not an error: it is reported as `verified == false`.

use crate::store::StoreError;

use super::authenticator::AuthenticatorError;

/// Broad classification of a ceremony failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The relying party's policy refused the request
    Policy,
    /// The response is inconsistent with what was issued or stored
    Integrity,
    /// The ceremony was abandoned at the authenticator boundary
    Aborted,
    /// Environmental or configuration failure; the core does not retry
    Fatal,
}

/// Errors that can occur while running a registration or authentication ceremony
#[derive(Debug, thiserror::Error)]
pub enum CeremonyError {
    #[error("Unsupported key algorithm. Got \"{0}\"")]
    UnsupportedAlgorithm(i64),

    #[error("Credential already registered: {0}")]
    DuplicateCredential(String),

    #[error("Bad challenge")]
    ChallengeMismatch,

    #[error("Credential unknown: {0}")]
    UnknownCredential(String),

    #[error("Malformed attestation: {0}")]
    MalformedAttestation(String),

    #[error("Malformed assertion: {0}")]
    MalformedAssertion(String),

    #[error("Origin not allowed: {0}")]
    OriginMismatch(String),

    #[error("Authenticator data is bound to a different relying party")]
    RelyingPartyMismatch,

    #[error("Assertion user handle does not match the registered credential")]
    UserHandleMismatch,

    #[error("Unknown or already consumed ceremony")]
    UnknownCeremony,

    #[error("Challenge expired")]
    ChallengeExpired,

    #[error("Ceremony cancelled by the user")]
    Cancelled,

    #[error("Authenticator did not respond within {0} seconds")]
    TimedOut(u64),

    #[error("Authenticator error: {0}")]
    Authenticator(String),

    #[error("Secure random source unavailable")]
    EntropyUnavailable,

    #[error("Stored public key could not be imported: {0}")]
    KeyImport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential store: {0}")]
    Store(#[from] StoreError),
}

impl CeremonyError {
    /// Classify the error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedAlgorithm(_) | Self::DuplicateCredential(_) => ErrorKind::Policy,
            Self::ChallengeMismatch
            | Self::UnknownCredential(_)
            | Self::MalformedAttestation(_)
            | Self::MalformedAssertion(_)
            | Self::OriginMismatch(_)
            | Self::RelyingPartyMismatch
            | Self::UserHandleMismatch
            | Self::UnknownCeremony
            | Self::ChallengeExpired => ErrorKind::Integrity,
            Self::Cancelled | Self::TimedOut(_) | Self::Authenticator(_) => ErrorKind::Aborted,
            Self::EntropyUnavailable
            | Self::KeyImport(_)
            | Self::Configuration(_)
            | Self::Store(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the failure is environmental rather than caused by the request
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

impl From<AuthenticatorError> for CeremonyError {
    fn from(error: AuthenticatorError) -> Self {
        match error {
            AuthenticatorError::Cancelled => Self::Cancelled,
            AuthenticatorError::Timeout => Self::Authenticator("authenticator timed out".into()),
            AuthenticatorError::Failed(msg) => Self::Authenticator(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CeremonyError::UnsupportedAlgorithm(-999).kind(),
            ErrorKind::Policy
        );
        assert_eq!(CeremonyError::ChallengeMismatch.kind(), ErrorKind::Integrity);
        assert_eq!(
            CeremonyError::UnknownCredential("abc".into()).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(CeremonyError::Cancelled.kind(), ErrorKind::Aborted);
        assert!(CeremonyError::EntropyUnavailable.is_fatal());
        assert!(!CeremonyError::ChallengeMismatch.is_fatal());
    }

    #[test]
    fn test_unsupported_algorithm_message() {
        let error = CeremonyError::UnsupportedAlgorithm(-999);
        assert_eq!(error.to_string(), "Unsupported key algorithm. Got \"-999\"");
    }

    #[test]
    fn test_authenticator_cancellation_maps_to_cancelled() {
        let error: CeremonyError = AuthenticatorError::Cancelled.into();
        assert!(matches!(error, CeremonyError::Cancelled));
    }
}
