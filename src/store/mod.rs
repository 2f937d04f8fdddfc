//! Credential record storage
//!
//! Records are created and read, never updated in place. Implementations are
//! shared between ceremonies through `Arc` and must keep writes to distinct
//! credential ids independent.

mod file;
mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::encoding::{self, base64url};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Corrupt: {0}")]
    Corrupt(String),
    #[error("store lock poisoned")]
    Poisoned,
}

/// A registered public key credential
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecord {
    #[serde(with = "base64url")]
    pub credential_id: Vec<u8>,
    /// COSE algorithm identifier
    pub public_key_algorithm: i64,
    /// DER `SubjectPublicKeyInfo`
    #[serde(with = "base64url")]
    pub public_key: Vec<u8>,
    /// Authenticator data as returned at registration
    #[serde(with = "base64url")]
    pub authenticator_data: Vec<u8>,
    #[serde(default, with = "base64url::option", skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<Vec<u8>>,
    pub registered_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl CredentialRecord {
    /// Base64url credential id, for logs and API responses
    #[must_use]
    pub fn encoded_id(&self) -> String {
        encoding::encode(&self.credential_id)
    }
}

/// Durable mapping from credential id to [`CredentialRecord`]
pub trait CredentialStore: Send + Sync {
    /// Store `record` under its credential id, returning the record it replaced
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be written.
    fn put(&self, record: CredentialRecord) -> Result<Option<CredentialRecord>, StoreError>;

    /// Store `record` only if its credential id is unused; `false` if taken
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be written.
    fn put_if_absent(&self, record: CredentialRecord) -> Result<bool, StoreError>;

    /// Store `record` one version above the record it replaces
    ///
    /// The lookup and the write happen atomically, so concurrent callers get
    /// distinct versions. Returns the stored record and the one it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be written.
    fn put_versioned(
        &self,
        record: CredentialRecord,
    ) -> Result<(CredentialRecord, Option<CredentialRecord>), StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be read.
    fn get(&self, credential_id: &[u8]) -> Result<Option<CredentialRecord>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be read.
    fn len(&self) -> Result<usize, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be read.
    fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().map(|len| len == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let record = CredentialRecord {
            credential_id: vec![1, 2, 3],
            public_key_algorithm: -7,
            public_key: vec![4, 5],
            authenticator_data: vec![6],
            user_handle: None,
            registered_at: Utc::now(),
            version: 1,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["credential_id"], "AQID");
        assert_eq!(value["public_key_algorithm"], -7);
        assert!(value.get("user_handle").is_none());

        let back: CredentialRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_missing_version_defaults_to_one() {
        let json = r#"{
            "credential_id": "AQID",
            "public_key_algorithm": -257,
            "public_key": "BAU",
            "authenticator_data": "Bg",
            "registered_at": "2024-01-01T00:00:00Z"
        }"#;
        let record: CredentialRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.encoded_id(), "AQID");
    }
}
