use crate::config::SecurityLevel;
use crate::error::{CryptoError, CryptoResult};
use elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

/// Rejection-sampling bound for key generation. A uniformly random field
/// element is out of range with probability below 2^-32 on both curves.
const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// EC private key on one of the supported curves.
#[derive(Clone)]
pub enum PrivateKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
}

impl PrivateKey {
    pub fn security_level(&self) -> SecurityLevel {
        match self {
            PrivateKey::P256(_) => SecurityLevel::Level256,
            PrivateKey::P384(_) => SecurityLevel::Level384,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::P256(sk) => PublicKey::P256(sk.public_key()),
            PrivateKey::P384(sk) => PublicKey::P384(sk.public_key()),
        }
    }

    /// Parse a PKCS#8 DER private key for the given curve.
    pub fn from_pkcs8_der(level: SecurityLevel, der: &[u8]) -> CryptoResult<Self> {
        match level {
            SecurityLevel::Level256 => p256::SecretKey::from_pkcs8_der(der)
                .map(PrivateKey::P256)
                .map_err(|e| CryptoError::KeyParse(format!("invalid {} key: {}", level.curve_name(), e))),
            SecurityLevel::Level384 => p384::SecretKey::from_pkcs8_der(der)
                .map(PrivateKey::P384)
                .map_err(|e| CryptoError::KeyParse(format!("invalid {} key: {}", level.curve_name(), e))),
        }
    }

    pub fn to_pkcs8_der(&self) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let document = match self {
            PrivateKey::P256(sk) => sk.to_pkcs8_der(),
            PrivateKey::P384(sk) => sk.to_pkcs8_der(),
        }
        .map_err(|e| CryptoError::KeyParse(format!("PKCS#8 encoding failed: {}", e)))?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.security_level().curve_name())
    }
}

/// EC public key on one of the supported curves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
}

impl PublicKey {
    pub fn security_level(&self) -> SecurityLevel {
        match self {
            PublicKey::P256(_) => SecurityLevel::Level256,
            PublicKey::P384(_) => SecurityLevel::Level384,
        }
    }

    /// Parse a SEC1-encoded point (compressed or uncompressed).
    pub fn from_sec1_bytes(level: SecurityLevel, bytes: &[u8]) -> CryptoResult<Self> {
        match level {
            SecurityLevel::Level256 => p256::PublicKey::from_sec1_bytes(bytes)
                .map(PublicKey::P256)
                .map_err(|_| CryptoError::KeyParse("invalid secp256r1 point".into())),
            SecurityLevel::Level384 => p384::PublicKey::from_sec1_bytes(bytes)
                .map(PublicKey::P384)
                .map_err(|_| CryptoError::KeyParse("invalid secp384r1 point".into())),
        }
    }

    /// Uncompressed SEC1 encoding: `0x04 || X || Y`.
    pub fn to_uncompressed_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::P256(pk) => pk.to_encoded_point(false).as_bytes().to_vec(),
            PublicKey::P384(pk) => pk.to_encoded_point(false).as_bytes().to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    pub fn from_private(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        Self {
            private_key,
            public_key,
        }
    }
}

/// Generate a key pair from the OS random source.
///
/// RNG failures surface as `KeyGeneration` instead of panicking.
pub(crate) fn generate_key_pair(level: SecurityLevel) -> CryptoResult<KeyPair> {
    let mut candidate = Zeroizing::new(vec![0u8; level.field_len()]);
    for _ in 0..MAX_KEYGEN_ATTEMPTS {
        rand::rngs::OsRng
            .try_fill_bytes(&mut candidate)
            .map_err(|e| CryptoError::KeyGeneration(format!("random source failed: {}", e)))?;

        let private_key = match level {
            SecurityLevel::Level256 => p256::SecretKey::from_slice(&candidate)
                .ok()
                .map(PrivateKey::P256),
            SecurityLevel::Level384 => p384::SecretKey::from_slice(&candidate)
                .ok()
                .map(PrivateKey::P384),
        };
        if let Some(private_key) = private_key {
            return Ok(KeyPair::from_private(private_key));
        }
    }
    Err(CryptoError::KeyGeneration(format!(
        "no valid {} scalar after {} attempts",
        level.curve_name(),
        MAX_KEYGEN_ATTEMPTS
    )))
}
