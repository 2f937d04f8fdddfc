//! `WebAuthn` cryptography operations
//!
//! Public keys arrive as DER `SubjectPublicKeyInfo`, the form browsers return
//! from `getPublicKey()`. Signatures cover
//! `authenticatorData || SHA-256(clientDataJSON)`.

use std::fmt;

use p256::ecdsa::signature::Verifier as _;
use p256::pkcs8::DecodePublicKey as _;
use ring::digest;
use rsa::traits::PublicKeyParts as _;
use sha2::Sha256;

use super::authenticator_data::CoseKeyParameters;
use super::policy::cose;

/// DER prefix of an Ed25519 `SubjectPublicKeyInfo`; the raw key follows
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];
const ED25519_KEY_LEN: usize = 32;

// COSE elliptic curve identifiers
const COSE_CRV_P256: i64 = 1;
const COSE_CRV_ED25519: i64 = 6;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("no verifier for COSE algorithm {0}")]
    UnsupportedAlgorithm(i64),
    #[error("invalid {algorithm} public key: {reason}")]
    InvalidKey {
        algorithm: &'static str,
        reason: String,
    },
}

impl CryptoError {
    fn invalid_key(algorithm: i64, reason: impl fmt::Display) -> Self {
        Self::InvalidKey {
            algorithm: cose::name(algorithm),
            reason: reason.to_string(),
        }
    }
}

/// An imported public key, ready for signature verification
#[derive(Clone)]
pub enum PublicKeyHandle {
    Es256(p256::ecdsa::VerifyingKey),
    Rs256(rsa::RsaPublicKey),
    Ed25519([u8; ED25519_KEY_LEN]),
}

impl PublicKeyHandle {
    /// COSE identifier of the algorithm this key verifies
    #[must_use]
    pub fn algorithm(&self) -> i64 {
        match self {
            Self::Es256(_) => cose::ES256,
            Self::Rs256(_) => cose::RS256,
            Self::Ed25519(_) => cose::EDDSA,
        }
    }

    /// Whether the COSE key parameters describe this same public key
    ///
    /// A key type or curve that does not fit the algorithm never matches.
    #[must_use]
    pub fn matches_cose(&self, parameters: &CoseKeyParameters) -> bool {
        match (self, parameters) {
            (Self::Es256(key), CoseKeyParameters::Ec2 { crv, x, y }) => {
                // Uncompressed SEC1 point: 0x04 || x || y
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                *crv == COSE_CRV_P256
                    && p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                        .is_ok_and(|cose_key| cose_key == *key)
            }
            (Self::Rs256(key), CoseKeyParameters::Rsa { n, e }) => {
                *key.n() == rsa::BigUint::from_bytes_be(n)
                    && *key.e() == rsa::BigUint::from_bytes_be(e)
            }
            (Self::Ed25519(raw), CoseKeyParameters::Okp { crv, x }) => {
                *crv == COSE_CRV_ED25519 && x.as_slice() == raw.as_slice()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for PublicKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyHandle({})", cose::name(self.algorithm()))
    }
}

/// Key import and signature verification
///
/// The relying party never implements signature math itself; it asks a
/// provider. Tests and embedders may substitute their own.
pub trait CryptoProvider: Send + Sync {
    /// Whether keys of this COSE algorithm can be imported and verified
    fn supports(&self, algorithm: i64) -> bool;

    /// Import DER `SubjectPublicKeyInfo` key material
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] for unsupported algorithms or malformed keys.
    fn import_key(&self, algorithm: i64, key_material: &[u8])
        -> Result<PublicKeyHandle, CryptoError>;

    /// Verify an assertion signature; a bad signature is `false`, never an error
    fn verify_signature(
        &self,
        key: &PublicKeyHandle,
        authenticator_data: &[u8],
        client_data_json: &[u8],
        signature: &[u8],
    ) -> bool;
}

/// Provider backed by `p256` (ES256), `rsa` (RS256) and `ring` (`EdDSA`)
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCryptoProvider;

impl CryptoProvider for DefaultCryptoProvider {
    fn supports(&self, algorithm: i64) -> bool {
        matches!(algorithm, cose::ES256 | cose::RS256 | cose::EDDSA)
    }

    fn import_key(
        &self,
        algorithm: i64,
        key_material: &[u8],
    ) -> Result<PublicKeyHandle, CryptoError> {
        match algorithm {
            cose::ES256 => p256::ecdsa::VerifyingKey::from_public_key_der(key_material)
                .map(PublicKeyHandle::Es256)
                .map_err(|e| CryptoError::invalid_key(algorithm, e)),
            cose::RS256 => rsa::RsaPublicKey::from_public_key_der(key_material)
                .map(PublicKeyHandle::Rs256)
                .map_err(|e| CryptoError::invalid_key(algorithm, e)),
            cose::EDDSA => {
                let raw = key_material
                    .strip_prefix(&ED25519_SPKI_PREFIX[..])
                    .ok_or_else(|| CryptoError::invalid_key(algorithm, "not an Ed25519 SPKI"))?;
                let raw: [u8; ED25519_KEY_LEN] = raw
                    .try_into()
                    .map_err(|_| CryptoError::invalid_key(algorithm, "wrong key length"))?;
                Ok(PublicKeyHandle::Ed25519(raw))
            }
            other => Err(CryptoError::UnsupportedAlgorithm(other)),
        }
    }

    fn verify_signature(
        &self,
        key: &PublicKeyHandle,
        authenticator_data: &[u8],
        client_data_json: &[u8],
        signature: &[u8],
    ) -> bool {
        let message = signed_message(authenticator_data, client_data_json);
        match key {
            PublicKeyHandle::Es256(key) => p256::ecdsa::Signature::from_der(signature)
                .is_ok_and(|sig| key.verify(&message, &sig).is_ok()),
            PublicKeyHandle::Rs256(key) => {
                let key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone());
                rsa::pkcs1v15::Signature::try_from(signature)
                    .is_ok_and(|sig| rsa::signature::Verifier::verify(&key, &message, &sig).is_ok())
            }
            PublicKeyHandle::Ed25519(raw) => {
                ring::signature::UnparsedPublicKey::new(&ring::signature::ED25519, raw)
                    .verify(&message, signature)
                    .is_ok()
            }
        }
    }
}

/// SHA-256 digest
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest::digest(&digest::SHA256, data).as_ref());
    out
}

/// The bytes an authenticator signs: `authenticatorData || SHA-256(clientDataJSON)`
#[must_use]
pub fn signed_message(authenticator_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(authenticator_data.len() + 32);
    message.extend_from_slice(authenticator_data);
    message.extend_from_slice(&sha256(client_data_json));
    message
}
