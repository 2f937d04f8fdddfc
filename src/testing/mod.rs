//! Testing utilities for passkey-rp
//!
//! Available to unit tests and, through the `testing` feature, to the
//! integration tests under `tests/`.
//!
//! - [`fixtures`] - Pre-built settings, relying parties and services
//! - [`mock`] - A software authenticator producing browser-shaped responses
//!
//! ## Usage
//!
//! ```rust
//! use passkey_rp::testing::{constants::TEST_ORIGIN, SoftAuthenticator, TestFixtures};
//!
//! let (service, _store) = TestFixtures::memory_service();
//! let authenticator = SoftAuthenticator::new(TEST_ORIGIN);
//! let start = service.start_registration().unwrap();
//! let response = authenticator.attest(&start.options).unwrap();
//! assert!(service.finish_registration(start.ceremony_id, &response).is_ok());
//! ```

pub mod fixtures;
pub mod mock;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use mock::{AuthenticatorMode, KeyType, SoftAuthenticator};

/// Common test constants
pub mod constants {
    /// Origin the test relying party accepts
    pub const TEST_ORIGIN: &str = "https://passkey.test";

    /// RP id matching [`TEST_ORIGIN`]
    pub const TEST_RP_ID: &str = "passkey.test";

    /// AAGUID reported by the software authenticator
    pub const TEST_AAGUID: [u8; 16] = *b"passkey-rp-soft!";
}
