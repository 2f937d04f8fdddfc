//! `WebAuthn` settings implementation
//!
//! Relying-party settings independent of the HTTP application around them.

use serde::{Deserialize, Serialize};

use super::challenge::{DEFAULT_CHALLENGE_LENGTH, DEFAULT_USER_HANDLE_LENGTH};
use super::policy::{AlgorithmPolicy, DEFAULT_PREFERRED_ALGORITHMS, DEFAULT_SUPPORTED_ALGORITHMS};
use super::registration::DuplicatePolicy;

/// Origin of the server on its default port
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// `WebAuthn` settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebAuthnSettings {
    /// Relying Party name (displayed to user)
    pub rp_name: String,
    /// Relying Party ID (usually the domain); omitted from options when unset
    pub rp_id: Option<String>,
    /// Origins accepted in client data (e.g., <https://example.com>)
    ///
    /// Settings loaded by the server must name at least one.
    pub allowed_origins: Vec<String>,
    /// Timeout in seconds for the authenticator to respond
    pub timeout_seconds: u64,
    /// User verification preference ("required", "preferred", "discouraged")
    pub user_verification: Option<String>,
    pub challenge_length: usize,
    pub user_handle_length: usize,
    /// Prefix of the generated account label, e.g. `demo-1a2b3c4d`
    pub user_label_prefix: String,
    /// COSE algorithms accepted at registration
    pub supported_algorithms: Vec<i64>,
    /// Preference order advertised to authenticators
    pub preferred_algorithms: Vec<i64>,
    pub duplicate_policy: DuplicatePolicy,
    /// How long an issued challenge stays redeemable
    pub challenge_ttl_seconds: u64,
}

impl Default for WebAuthnSettings {
    fn default() -> Self {
        Self {
            rp_name: "Demo entity".to_string(),
            rp_id: None,
            allowed_origins: vec![DEFAULT_ORIGIN.to_string()],
            timeout_seconds: 60,
            user_verification: None,
            challenge_length: DEFAULT_CHALLENGE_LENGTH,
            user_handle_length: DEFAULT_USER_HANDLE_LENGTH,
            user_label_prefix: "demo".to_string(),
            supported_algorithms: DEFAULT_SUPPORTED_ALGORITHMS.to_vec(),
            preferred_algorithms: DEFAULT_PREFERRED_ALGORITHMS.to_vec(),
            duplicate_policy: DuplicatePolicy::default(),
            challenge_ttl_seconds: 300,
        }
    }
}

impl WebAuthnSettings {
    #[must_use]
    pub fn algorithm_policy(&self) -> AlgorithmPolicy {
        AlgorithmPolicy::new(
            self.supported_algorithms.iter().copied(),
            self.preferred_algorithms.iter().copied(),
        )
    }

    /// Authenticator timeout in milliseconds, as carried in ceremony options
    #[must_use]
    pub fn timeout_millis(&self) -> u32 {
        u32::try_from(self.timeout_seconds.saturating_mul(1000)).unwrap_or(u32::MAX)
    }
}
