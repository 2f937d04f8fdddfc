//! Challenge and user handle generation
//!
//! Both values are drawn from the operating system's secure random source.
//! A failing source is reported as [`CeremonyError::EntropyUnavailable`].

use std::fmt;

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use super::errors::CeremonyError;
use crate::utils::encoding::{self, base64url};

/// Default challenge length in bytes
pub const DEFAULT_CHALLENGE_LENGTH: usize = 16;

/// Default user handle length in bytes
pub const DEFAULT_USER_HANDLE_LENGTH: usize = 16;

/// Single-use random value an authenticator must sign over
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Challenge(#[serde(with = "base64url")] Vec<u8>);

impl Challenge {
    /// Wrap raw bytes, e.g. a challenge recovered from client data
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compare against bytes signed by the authenticator without early exit
    #[must_use]
    pub fn matches(&self, signed: &[u8]) -> bool {
        self.0.len() == signed.len()
            && self
                .0
                .iter()
                .zip(signed)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({})", encoding::encode(&self.0))
    }
}

/// Opaque account identifier handed to the authenticator at registration
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserHandle(#[serde(with = "base64url")] Vec<u8>);

impl UserHandle {
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Display-only label: `<prefix>-<last 8 hex characters>`
    ///
    /// Carries no security meaning; it only makes the account recognizable in
    /// the platform's passkey picker.
    #[must_use]
    pub fn label(&self, prefix: &str) -> String {
        let hex = encoding::to_hex(&self.0);
        let tail = &hex[hex.len().saturating_sub(8)..];
        format!("{prefix}-{tail}")
    }
}

impl fmt::Debug for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserHandle({})", encoding::encode(&self.0))
    }
}

fn random_bytes(length: usize) -> Result<Vec<u8>, CeremonyError> {
    let mut bytes = vec![0u8; length];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CeremonyError::EntropyUnavailable)?;
    Ok(bytes)
}

/// Generate a fresh challenge of `length` bytes
///
/// # Errors
///
/// Returns [`CeremonyError::EntropyUnavailable`] if the secure random source fails.
pub fn generate_challenge(length: usize) -> Result<Challenge, CeremonyError> {
    random_bytes(length).map(Challenge)
}

/// Generate a fresh user handle of `length` bytes
///
/// # Errors
///
/// Returns [`CeremonyError::EntropyUnavailable`] if the secure random source fails.
pub fn generate_user_handle(length: usize) -> Result<UserHandle, CeremonyError> {
    random_bytes(length).map(UserHandle)
}
