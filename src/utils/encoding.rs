//! Base64URL helpers for `WebAuthn` JSON payloads
//!
//! Every binary field exchanged with the client (challenges, user handles,
//! credential ids, keys, signatures) travels as unpadded base64url text.
//! Decoding tolerates trailing padding because some clients still emit it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode bytes as unpadded base64url
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url text, with or without padding
///
/// # Errors
///
/// Returns an error if the input contains characters outside the base64url
/// alphabet or has an impossible length.
pub fn decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(input.trim_end_matches('='))
}

/// Lowercase hex rendering, used for display labels and file names
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Serde adapter for `Vec<u8>` fields carried as base64url strings
pub mod base64url {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as unpadded base64url
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    /// Deserialize bytes from base64url text
    ///
    /// # Errors
    ///
    /// Fails when the value is not a string or not valid base64url.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode(&text).map_err(|e| D::Error::custom(format!("invalid base64url: {e}")))
    }

    /// Same adapter for optional fields
    pub mod option {
        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serializer};

        /// # Errors
        ///
        /// Propagates serializer errors.
        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&crate::utils::encoding::encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        /// # Errors
        ///
        /// Fails when the value is present but not valid base64url.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|text| {
                    crate::utils::encoding::decode(&text)
                        .map_err(|e| D::Error::custom(format!("invalid base64url: {e}")))
                })
                .transpose()
        }
    }
}
