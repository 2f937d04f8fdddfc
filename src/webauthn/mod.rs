//! `WebAuthn` relying-party implementation
//!
//! Challenge issuance, algorithm policy, attestation validation and storage,
//! and assertion verification. Independent of any HTTP framework; the
//! handlers module is a thin layer on top of [`RelyingPartyService`].

pub mod authentication;
pub mod authenticator;
pub mod authenticator_data;
pub mod challenge;
pub mod client_data;
pub mod crypto;
mod errors;
pub mod ledger;
pub mod policy;
pub mod registration;
mod relying_party;
pub mod service;
mod settings;
pub mod types;

// Re-exports for public use
pub use authentication::{AuthenticationCeremony, AuthenticationOutcome};
pub use authenticator::{Authenticator, AuthenticatorError};
pub use challenge::{generate_challenge, generate_user_handle, Challenge, UserHandle};
pub use crypto::{CryptoProvider, DefaultCryptoProvider};
pub use errors::{CeremonyError, ErrorKind};
pub use ledger::{CeremonyKind, ChallengeLedger};
pub use policy::{cose, AlgorithmPolicy};
pub use registration::{DuplicatePolicy, RegistrationCeremony, RegistrationOutcome};
pub use relying_party::RelyingParty;
pub use service::{CeremonyStart, RelyingPartyService};
pub use settings::WebAuthnSettings;
pub use types::*;
