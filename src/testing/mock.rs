//! Software authenticator for testing
//!
//! Generates real key pairs with `ring` and produces attestation and
//! assertion responses shaped exactly like a browser's, so ceremonies can be
//! exercised end to end without a device.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use ciborium::value::Value;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{EcdsaKeyPair, Ed25519KeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde_json::json;

use crate::utils::encoding;
use crate::webauthn::authenticator_data::{FLAG_AT, FLAG_UP, FLAG_UV};
use crate::webauthn::client_data::{TYPE_CREATE, TYPE_GET};
use crate::webauthn::crypto::sha256;
use crate::webauthn::{
    cose, AssertionResponse, AttestationResponse, Authenticator, AuthenticatorAssertionResponse,
    AuthenticatorAttestationResponse, AuthenticatorError, CreationOptions, RequestOptions,
    PUBLIC_KEY_CREDENTIAL_TYPE,
};

use super::constants::{TEST_AAGUID, TEST_RP_ID};

const P256_SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// How the authenticator answers the boundary calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticatorMode {
    Normal,
    /// The user dismisses the prompt
    Cancel,
    /// Never answers
    Hang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Es256,
    Ed25519,
}

enum Signer {
    Es256(EcdsaKeyPair),
    Ed25519(Ed25519KeyPair),
}

impl Signer {
    fn generate(key_type: KeyType, rng: &SystemRandom) -> anyhow::Result<Self> {
        match key_type {
            KeyType::Es256 => {
                let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, rng)
                    .map_err(|_| anyhow!("P-256 key generation failed"))?;
                let pair =
                    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), rng)
                        .map_err(|e| anyhow!("P-256 key rejected: {e}"))?;
                Ok(Self::Es256(pair))
            }
            KeyType::Ed25519 => {
                let pkcs8 = Ed25519KeyPair::generate_pkcs8(rng)
                    .map_err(|_| anyhow!("Ed25519 key generation failed"))?;
                let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
                    .map_err(|e| anyhow!("Ed25519 key rejected: {e}"))?;
                Ok(Self::Ed25519(pair))
            }
        }
    }

    fn algorithm(&self) -> i64 {
        match self {
            Self::Es256(_) => cose::ES256,
            Self::Ed25519(_) => cose::EDDSA,
        }
    }

    /// DER `SubjectPublicKeyInfo`, as `getPublicKey()` returns it
    fn spki(&self) -> Vec<u8> {
        let (prefix, raw): (&[u8], &[u8]) = match self {
            Self::Es256(pair) => (&P256_SPKI_PREFIX[..], pair.public_key().as_ref()),
            Self::Ed25519(pair) => (&ED25519_SPKI_PREFIX[..], pair.public_key().as_ref()),
        };
        [prefix, raw].concat()
    }

    fn cose_key(&self) -> anyhow::Result<Vec<u8>> {
        let int = |v: i64| Value::Integer(v.into());
        let map = match self {
            Self::Es256(pair) => {
                // Uncompressed SEC1 point: 0x04 || x || y
                let point = pair.public_key().as_ref();
                Value::Map(vec![
                    (int(1), int(2)),
                    (int(3), int(cose::ES256)),
                    (int(-1), int(1)),
                    (int(-2), Value::Bytes(point[1..33].to_vec())),
                    (int(-3), Value::Bytes(point[33..65].to_vec())),
                ])
            }
            Self::Ed25519(pair) => Value::Map(vec![
                (int(1), int(1)),
                (int(3), int(cose::EDDSA)),
                (int(-1), int(6)),
                (int(-2), Value::Bytes(pair.public_key().as_ref().to_vec())),
            ]),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).context("encoding COSE key")?;
        Ok(buf)
    }

    fn sign(&self, message: &[u8], rng: &SystemRandom) -> anyhow::Result<Vec<u8>> {
        match self {
            Self::Es256(pair) => pair
                .sign(rng, message)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|_| anyhow!("ECDSA signing failed")),
            Self::Ed25519(pair) => Ok(pair.sign(message).as_ref().to_vec()),
        }
    }
}

struct SoftCredential {
    id: Vec<u8>,
    user_handle: Vec<u8>,
    rp_id: String,
    signer: Signer,
    sign_count: AtomicU32,
}

/// A software passkey provider holding its credentials in memory
pub struct SoftAuthenticator {
    origin: String,
    key_type: KeyType,
    mode: AuthenticatorMode,
    rng: SystemRandom,
    credentials: Mutex<Vec<Arc<SoftCredential>>>,
}

impl std::fmt::Debug for SoftAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftAuthenticator")
            .field("origin", &self.origin)
            .field("key_type", &self.key_type)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl SoftAuthenticator {
    /// ES256 authenticator reporting `origin` in its client data
    #[must_use]
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            key_type: KeyType::Es256,
            mode: AuthenticatorMode::Normal,
            rng: SystemRandom::new(),
            credentials: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: AuthenticatorMode) -> Self {
        self.mode = mode;
        self
    }

    fn credentials(&self) -> std::sync::MutexGuard<'_, Vec<Arc<SoftCredential>>> {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client_data(&self, ceremony_type: &str, challenge: &[u8]) -> Vec<u8> {
        json!({
            "type": ceremony_type,
            "challenge": encoding::encode(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes()
    }

    /// Create a credential for `options` and return the attestation
    ///
    /// # Errors
    ///
    /// Fails if key generation or encoding fails.
    pub fn attest(&self, options: &CreationOptions) -> anyhow::Result<AttestationResponse> {
        let mut id = vec![0u8; 16];
        self.rng
            .fill(&mut id)
            .map_err(|_| anyhow!("random source unavailable"))?;
        let signer = Signer::generate(self.key_type, &self.rng)?;
        let rp_id = options.rp.id.clone().unwrap_or_else(|| TEST_RP_ID.to_string());

        let cose_key = signer.cose_key()?;
        let mut authenticator_data = sha256(rp_id.as_bytes()).to_vec();
        authenticator_data.push(FLAG_UP | FLAG_UV | FLAG_AT);
        authenticator_data.extend_from_slice(&0u32.to_be_bytes());
        authenticator_data.extend_from_slice(&TEST_AAGUID);
        authenticator_data.extend_from_slice(&u16::try_from(id.len())?.to_be_bytes());
        authenticator_data.extend_from_slice(&id);
        authenticator_data.extend_from_slice(&cose_key);

        let response = AttestationResponse {
            id: id.clone(),
            raw_id: Some(id.clone()),
            credential_type: PUBLIC_KEY_CREDENTIAL_TYPE.to_string(),
            response: AuthenticatorAttestationResponse {
                client_data_json: self.client_data(TYPE_CREATE, options.challenge.as_bytes()),
                authenticator_data,
                public_key: signer.spki(),
                public_key_algorithm: signer.algorithm(),
                attestation_object: None,
                transports: vec!["internal".to_string()],
            },
            authenticator_attachment: Some("platform".to_string()),
            client_extension_results: Some(json!({})),
        };

        self.credentials().push(Arc::new(SoftCredential {
            id,
            user_handle: options.user.id.as_bytes().to_vec(),
            rp_id,
            signer,
            sign_count: AtomicU32::new(0),
        }));
        Ok(response)
    }

    /// Sign an assertion for `options`
    ///
    /// Uses the first allowed credential this authenticator holds, or the most
    /// recently created one when the list is empty.
    ///
    /// # Errors
    ///
    /// Fails if no matching credential exists or signing fails.
    pub fn assert(&self, options: &RequestOptions) -> anyhow::Result<AssertionResponse> {
        let credential = {
            let credentials = self.credentials();
            if options.allow_credentials.is_empty() {
                credentials.last().cloned()
            } else {
                credentials
                    .iter()
                    .find(|c| options.allow_credentials.iter().any(|d| d.id == c.id))
                    .cloned()
            }
        }
        .context("no matching credential")?;

        let sign_count = credential.sign_count.fetch_add(1, Ordering::SeqCst) + 1;
        let rp_id = options.rp_id.as_deref().unwrap_or(&credential.rp_id);
        let mut authenticator_data = sha256(rp_id.as_bytes()).to_vec();
        authenticator_data.push(FLAG_UP | FLAG_UV);
        authenticator_data.extend_from_slice(&sign_count.to_be_bytes());

        let client_data_json = self.client_data(TYPE_GET, options.challenge.as_bytes());
        let mut message = authenticator_data.clone();
        message.extend_from_slice(&sha256(&client_data_json));
        let signature = credential.signer.sign(&message, &self.rng)?;

        Ok(AssertionResponse {
            id: credential.id.clone(),
            raw_id: Some(credential.id.clone()),
            credential_type: PUBLIC_KEY_CREDENTIAL_TYPE.to_string(),
            response: AuthenticatorAssertionResponse {
                client_data_json,
                authenticator_data,
                signature,
                user_handle: Some(credential.user_handle.clone()),
            },
            authenticator_attachment: Some("platform".to_string()),
            client_extension_results: Some(json!({})),
        })
    }

    /// Number of credentials created so far
    #[must_use]
    pub fn credential_count(&self) -> usize {
        self.credentials().len()
    }
}

#[async_trait]
impl Authenticator for SoftAuthenticator {
    async fn invoke_create(
        &self,
        options: &CreationOptions,
    ) -> Result<AttestationResponse, AuthenticatorError> {
        match self.mode {
            AuthenticatorMode::Normal => self
                .attest(options)
                .map_err(|e| AuthenticatorError::Failed(e.to_string())),
            AuthenticatorMode::Cancel => Err(AuthenticatorError::Cancelled),
            AuthenticatorMode::Hang => std::future::pending().await,
        }
    }

    async fn invoke_get(
        &self,
        options: &RequestOptions,
    ) -> Result<AssertionResponse, AuthenticatorError> {
        match self.mode {
            AuthenticatorMode::Normal => self
                .assert(options)
                .map_err(|e| AuthenticatorError::Failed(e.to_string())),
            AuthenticatorMode::Cancel => Err(AuthenticatorError::Cancelled),
            AuthenticatorMode::Hang => std::future::pending().await,
        }
    }
}
