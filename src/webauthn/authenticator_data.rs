//! Authenticator data parsing
//!
//! Layout:
//! - 32 bytes: RP ID hash
//! - 1 byte: flags
//! - 4 bytes: signature counter (big-endian)
//! - attested credential data, present when the AT flag is set:
//!   - 16 bytes: AAGUID
//!   - 2 bytes: credential ID length (L)
//!   - L bytes: credential ID
//!   - variable: COSE public key (CBOR map)
//! - extensions (CBOR map), present when the ED flag is set

use std::fmt;

use ciborium::value::Value;

use crate::utils::encoding;

/// User present
pub const FLAG_UP: u8 = 0x01;
/// User verified
pub const FLAG_UV: u8 = 0x04;
/// Backup eligible
pub const FLAG_BE: u8 = 0x08;
/// Backed up
pub const FLAG_BS: u8 = 0x10;
/// Attested credential data included
pub const FLAG_AT: u8 = 0x40;
/// Extension data included
pub const FLAG_ED: u8 = 0x80;

const RP_ID_HASH_LEN: usize = 32;
const HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

// COSE key map labels; negative labels depend on the key type
const COSE_KEY_KTY: i128 = 1;
const COSE_KEY_ALG: i128 = 3;
const COSE_KEY_CRV: i128 = -1;
const COSE_KEY_X: i128 = -2;
const COSE_KEY_Y: i128 = -3;
const COSE_KEY_RSA_N: i128 = -1;
const COSE_KEY_RSA_E: i128 = -2;

const COSE_KTY_OKP: i128 = 1;
const COSE_KTY_EC2: i128 = 2;
const COSE_KTY_RSA: i128 = 3;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthenticatorDataError {
    #[error("authenticator data is {0} bytes, at least 37 required")]
    TooShort(usize),
    #[error("attested credential data flag not set")]
    MissingAttestedCredential,
    #[error("attested credential data truncated")]
    Truncated,
    #[error("invalid COSE public key: {0}")]
    InvalidCoseKey(String),
    #[error("invalid extension data: {0}")]
    InvalidExtensions(String),
    #[error("{0} trailing bytes after authenticator data")]
    TrailingBytes(usize),
}

/// Credential data attached at registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    /// Raw CBOR encoding of the COSE key
    pub public_key_cose: Vec<u8>,
    /// `alg` member of the COSE key, when present
    pub cose_algorithm: Option<i64>,
    /// Key parameters, `None` for key types this crate does not know
    pub key_parameters: Option<CoseKeyParameters>,
}

/// Public key parameters of a COSE key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKeyParameters {
    /// `kty` 1, e.g. Ed25519 (`crv` 6)
    Okp { crv: i64, x: Vec<u8> },
    /// `kty` 2, e.g. P-256 (`crv` 1)
    Ec2 { crv: i64, x: Vec<u8>, y: Vec<u8> },
    /// `kty` 3; big-endian modulus and exponent
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

/// Parsed authenticator data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredentialData>,
    pub has_extensions: bool,
}

impl AuthenticatorData {
    #[must_use]
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    #[must_use]
    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    #[must_use]
    pub fn backup_eligible(&self) -> bool {
        self.flags & FLAG_BE != 0
    }

    #[must_use]
    pub fn backed_up(&self) -> bool {
        self.flags & FLAG_BS != 0
    }

    /// Attested credential data, required at registration
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticatorDataError::MissingAttestedCredential`] if absent.
    pub fn require_attested(&self) -> Result<&AttestedCredentialData, AuthenticatorDataError> {
        self.attested
            .as_ref()
            .ok_or(AuthenticatorDataError::MissingAttestedCredential)
    }
}

impl fmt::Display for AuthenticatorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rpIdHash={} flags={:#04x} (UP={} UV={} BE={} BS={}) signCount={}",
            encoding::to_hex(&self.rp_id_hash),
            self.flags,
            self.user_present(),
            self.user_verified(),
            self.backup_eligible(),
            self.backed_up(),
            self.sign_count
        )?;
        if let Some(attested) = &self.attested {
            write!(
                f,
                " aaguid={} credentialId={} coseAlg={}",
                encoding::to_hex(&attested.aaguid),
                encoding::encode(&attested.credential_id),
                attested
                    .cose_algorithm
                    .map_or_else(|| "-".to_string(), |alg| alg.to_string())
            )?;
        }
        Ok(())
    }
}

/// Parse raw authenticator data
///
/// # Errors
///
/// Returns an [`AuthenticatorDataError`] when the data is shorter than the
/// fixed header, when attested credential data is truncated, or when the COSE
/// key or extensions are not valid CBOR.
pub fn parse_authenticator_data(data: &[u8]) -> Result<AuthenticatorData, AuthenticatorDataError> {
    if data.len() < HEADER_LEN {
        return Err(AuthenticatorDataError::TooShort(data.len()));
    }

    let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
    rp_id_hash.copy_from_slice(&data[..RP_ID_HASH_LEN]);
    let flags = data[32];
    let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

    let mut rest = &data[HEADER_LEN..];

    let attested = if flags & FLAG_AT == 0 {
        None
    } else {
        Some(parse_attested_credential(&mut rest)?)
    };

    let has_extensions = flags & FLAG_ED != 0;
    if has_extensions {
        let _: Value = ciborium::from_reader(&mut rest)
            .map_err(|e| AuthenticatorDataError::InvalidExtensions(e.to_string()))?;
    }

    if !rest.is_empty() {
        return Err(AuthenticatorDataError::TrailingBytes(rest.len()));
    }

    Ok(AuthenticatorData {
        rp_id_hash,
        flags,
        sign_count,
        attested,
        has_extensions,
    })
}

fn parse_attested_credential(
    rest: &mut &[u8],
) -> Result<AttestedCredentialData, AuthenticatorDataError> {
    if rest.len() < AAGUID_LEN + 2 {
        return Err(AuthenticatorDataError::Truncated);
    }
    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&rest[..AAGUID_LEN]);
    let id_len = usize::from(u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]));
    *rest = &rest[AAGUID_LEN + 2..];

    if rest.len() < id_len {
        return Err(AuthenticatorDataError::Truncated);
    }
    let credential_id = rest[..id_len].to_vec();
    *rest = &rest[id_len..];

    if rest.is_empty() {
        return Err(AuthenticatorDataError::Truncated);
    }

    // The COSE key is followed by optional extensions, so its length is only
    // known after decoding it.
    let before = *rest;
    let key: Value = ciborium::from_reader(&mut *rest)
        .map_err(|e| AuthenticatorDataError::InvalidCoseKey(e.to_string()))?;
    let consumed = before.len() - rest.len();
    let public_key_cose = before[..consumed].to_vec();

    let Value::Map(entries) = key else {
        return Err(AuthenticatorDataError::InvalidCoseKey(
            "not a CBOR map".to_string(),
        ));
    };
    let cose_algorithm = cose_integer(&entries, COSE_KEY_ALG, "alg")?;
    let key_parameters = cose_key_parameters(&entries)?;

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        public_key_cose,
        cose_algorithm,
        key_parameters,
    })
}

fn invalid_key(reason: &str) -> AuthenticatorDataError {
    AuthenticatorDataError::InvalidCoseKey(reason.to_string())
}

fn cose_member(entries: &[(Value, Value)], label: i128) -> Option<&Value> {
    entries.iter().find_map(|(key, value)| match key {
        Value::Integer(key) if i128::from(*key) == label => Some(value),
        _ => None,
    })
}

fn cose_integer(
    entries: &[(Value, Value)],
    label: i128,
    name: &str,
) -> Result<Option<i64>, AuthenticatorDataError> {
    match cose_member(entries, label) {
        None => Ok(None),
        Some(Value::Integer(value)) => i64::try_from(i128::from(*value))
            .map(Some)
            .map_err(|_| invalid_key(&format!("{name} out of range"))),
        Some(_) => Err(invalid_key(&format!("{name} is not an integer"))),
    }
}

fn cose_bytes(
    entries: &[(Value, Value)],
    label: i128,
    name: &str,
) -> Result<Vec<u8>, AuthenticatorDataError> {
    match cose_member(entries, label) {
        Some(Value::Bytes(bytes)) => Ok(bytes.clone()),
        Some(_) => Err(invalid_key(&format!("{name} is not a byte string"))),
        None => Err(invalid_key(&format!("{name} missing"))),
    }
}

fn cose_key_parameters(
    entries: &[(Value, Value)],
) -> Result<Option<CoseKeyParameters>, AuthenticatorDataError> {
    let kty = cose_integer(entries, COSE_KEY_KTY, "kty")?
        .ok_or_else(|| invalid_key("kty missing"))?;
    let curve = || {
        cose_integer(entries, COSE_KEY_CRV, "crv")?.ok_or_else(|| invalid_key("crv missing"))
    };
    let parameters = match i128::from(kty) {
        COSE_KTY_OKP => CoseKeyParameters::Okp {
            crv: curve()?,
            x: cose_bytes(entries, COSE_KEY_X, "x")?,
        },
        COSE_KTY_EC2 => CoseKeyParameters::Ec2 {
            crv: curve()?,
            x: cose_bytes(entries, COSE_KEY_X, "x")?,
            y: cose_bytes(entries, COSE_KEY_Y, "y")?,
        },
        COSE_KTY_RSA => CoseKeyParameters::Rsa {
            n: cose_bytes(entries, COSE_KEY_RSA_N, "n")?,
            e: cose_bytes(entries, COSE_KEY_RSA_E, "e")?,
        },
        _ => return Ok(None),
    };
    Ok(Some(parameters))
}
