//! Authenticator invocation boundary
//!
//! The relying party never talks to an authenticator directly. Whatever
//! carries options to the platform (a browser round trip, a native passkey
//! API, a test double) implements [`Authenticator`].

use async_trait::async_trait;

use super::types::{AssertionResponse, AttestationResponse, CreationOptions, RequestOptions};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AuthenticatorError {
    /// The user dismissed the prompt
    #[error("cancelled by the user")]
    Cancelled,
    /// The authenticator gave up on its own
    #[error("authenticator timed out")]
    Timeout,
    #[error("authenticator failed: {0}")]
    Failed(String),
}

/// Platform authenticator API
///
/// Both calls may suspend for as long as the user takes to respond.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `navigator.credentials.create()`
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticatorError`] when the user cancels or the device fails.
    async fn invoke_create(
        &self,
        options: &CreationOptions,
    ) -> Result<AttestationResponse, AuthenticatorError>;

    /// `navigator.credentials.get()`
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticatorError`] when the user cancels or the device fails.
    async fn invoke_get(&self, options: &RequestOptions)
        -> Result<AssertionResponse, AuthenticatorError>;
}
