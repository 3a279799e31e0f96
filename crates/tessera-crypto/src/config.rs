use crate::error::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// HashFamily: SHA-2 or SHA-3, chosen per network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashFamily {
    Sha2,
    Sha3,
}

impl FromStr for HashFamily {
    type Err = CryptoError;

    /// Case-insensitive; accepts `SHA2`/`SHA-2` and `SHA3`/`SHA-3`.
    fn from_str(s: &str) -> CryptoResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHA2" | "SHA-2" => Ok(HashFamily::Sha2),
            "SHA3" | "SHA-3" => Ok(HashFamily::Sha3),
            _ => Err(CryptoError::Configuration(format!(
                "illegal hash function family '{}': must be either SHA2 or SHA3",
                s
            ))),
        }
    }
}

impl fmt::Display for HashFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashFamily::Sha2 => write!(f, "SHA2"),
            HashFamily::Sha3 => write!(f, "SHA3"),
        }
    }
}

// ---------------------------------------------------------------------------
// SecurityLevel: selects the curve and every derived byte length
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// secp256r1 (NIST P-256)
    Level256,
    /// secp384r1 (NIST P-384)
    Level384,
}

impl TryFrom<u32> for SecurityLevel {
    type Error = CryptoError;

    fn try_from(bits: u32) -> CryptoResult<Self> {
        match bits {
            256 => Ok(SecurityLevel::Level256),
            384 => Ok(SecurityLevel::Level384),
            other => Err(CryptoError::Configuration(format!(
                "illegal security level {}: must be either 256 or 384",
                other
            ))),
        }
    }
}

impl SecurityLevel {
    pub fn bits(&self) -> usize {
        match self {
            SecurityLevel::Level256 => 256,
            SecurityLevel::Level384 => 384,
        }
    }

    pub fn curve_name(&self) -> &'static str {
        match self {
            SecurityLevel::Level256 => "secp256r1",
            SecurityLevel::Level384 => "secp384r1",
        }
    }

    /// Byte length of a scalar or coordinate on the curve.
    pub fn field_len(&self) -> usize {
        (self.bits() + 7) / 8
    }

    /// Length of an uncompressed SEC1 point: `floor((S+7)/8)*2 + 1`.
    ///
    /// The `+ 1` is the `0x04` prefix byte.
    pub fn ephemeral_key_len(&self) -> usize {
        self.field_len() * 2 + 1
    }

    /// Length of the ECIES authentication tag: `S/8`.
    pub fn mac_tag_len(&self) -> usize {
        self.bits() >> 3
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

// ---------------------------------------------------------------------------
// HashAlgorithm: concrete digest for a (family, level) pair
//
// The ECIES digest width follows the security level so that the HMAC tag
// is exactly `S/8` bytes long. Messages are always signed over the 256-bit
// digest of the family, which is what existing peers verify against.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha3_256,
    Sha3_384,
}

impl HashAlgorithm {
    pub fn select(family: HashFamily, level: SecurityLevel) -> Self {
        match (family, level) {
            (HashFamily::Sha2, SecurityLevel::Level256) => HashAlgorithm::Sha256,
            (HashFamily::Sha2, SecurityLevel::Level384) => HashAlgorithm::Sha384,
            (HashFamily::Sha3, SecurityLevel::Level256) => HashAlgorithm::Sha3_256,
            (HashFamily::Sha3, SecurityLevel::Level384) => HashAlgorithm::Sha3_384,
        }
    }

    /// Digest that ECDSA signs over, independent of the curve.
    pub fn message_digest(family: HashFamily) -> Self {
        match family {
            HashFamily::Sha2 => HashAlgorithm::Sha256,
            HashFamily::Sha3 => HashAlgorithm::Sha3_256,
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 | HashAlgorithm::Sha3_256 => 32,
            HashAlgorithm::Sha384 | HashAlgorithm::Sha3_384 => 48,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "SHA-256"),
            HashAlgorithm::Sha384 => write!(f, "SHA-384"),
            HashAlgorithm::Sha3_256 => write!(f, "SHA3-256"),
            HashAlgorithm::Sha3_384 => write!(f, "SHA3-384"),
        }
    }
}
