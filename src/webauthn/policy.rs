//! Algorithm policy
//!
//! The relying party only advertises and accepts signature algorithms it can
//! verify itself, even though the COSE registry defines many more.

use std::collections::BTreeSet;

use super::types::PublicKeyCredentialParameters;

/// COSE algorithm identifiers used by `WebAuthn`
pub mod cose {
    /// `EdDSA` (Ed25519)
    pub const EDDSA: i64 = -8;
    /// ECDSA P-256 with SHA-256
    pub const ES256: i64 = -7;
    /// ECDSA P-384 with SHA-384
    pub const ES384: i64 = -35;
    /// ECDSA P-521 with SHA-512
    pub const ES512: i64 = -36;
    /// RSASSA-PSS with SHA-256
    pub const PS256: i64 = -37;
    /// RSASSA-PKCS1-v1_5 with SHA-256
    pub const RS256: i64 = -257;

    /// Human-readable name for logs
    #[must_use]
    pub fn name(alg: i64) -> &'static str {
        match alg {
            EDDSA => "EdDSA",
            ES256 => "ES256",
            ES384 => "ES384",
            ES512 => "ES512",
            PS256 => "PS256",
            RS256 => "RS256",
            _ => "unknown",
        }
    }
}

/// Algorithms accepted when nothing is configured.
///
/// EdDSA is left out: browsers running relying-party code still lack it.
pub const DEFAULT_SUPPORTED_ALGORITHMS: [i64; 2] = [cose::ES256, cose::RS256];

/// Preference order offered to authenticators, most preferred first
pub const DEFAULT_PREFERRED_ALGORITHMS: [i64; 3] = [cose::EDDSA, cose::ES256, cose::RS256];

/// The set of algorithms this relying party accepts, plus its preference order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmPolicy {
    supported: BTreeSet<i64>,
    preference: Vec<i64>,
}

impl AlgorithmPolicy {
    #[must_use]
    pub fn new(
        supported: impl IntoIterator<Item = i64>,
        preference: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            supported: supported.into_iter().collect(),
            preference: preference.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn is_supported(&self, algorithm: i64) -> bool {
        self.supported.contains(&algorithm)
    }

    /// Restrict `candidates` to supported entries, keeping their order
    #[must_use]
    pub fn filter_supported(&self, candidates: &[i64]) -> Vec<i64> {
        candidates
            .iter()
            .copied()
            .filter(|alg| self.is_supported(*alg))
            .collect()
    }

    /// Supported algorithms that never appear in the preference list and are
    /// therefore never advertised
    #[must_use]
    pub fn unadvertised(&self) -> Vec<i64> {
        self.supported
            .iter()
            .copied()
            .filter(|alg| !self.preference.contains(alg))
            .collect()
    }

    pub fn supported(&self) -> impl Iterator<Item = i64> + '_ {
        self.supported.iter().copied()
    }

    /// `pubKeyCredParams` for creation options
    #[must_use]
    pub fn credential_parameters(&self) -> Vec<PublicKeyCredentialParameters> {
        self.filter_supported(&self.preference)
            .into_iter()
            .map(PublicKeyCredentialParameters::public_key)
            .collect()
    }
}

impl Default for AlgorithmPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORTED_ALGORITHMS, DEFAULT_PREFERRED_ALGORITHMS)
    }
}
