#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the passkey-rp application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod settings;
pub mod store;
pub mod utils;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use handlers::{configure_services, health};
pub use settings::{Settings, StorageBackend};
pub use store::{CredentialRecord, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use webauthn::{CeremonyError, RelyingParty, RelyingPartyService, WebAuthnSettings};
