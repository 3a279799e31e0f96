use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

// ---------------------------------------------------------------------------
// Typed identifiers: prevent stringly-typed confusion
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(StoreKey, "Key under which a snapshot is kept in the state store.");
define_id!(ChaincodeId, "Identifier of deployed chaincode on the ledger.");

impl StoreKey {
    /// State store key for a principal: `member.<name>`.
    pub fn for_member(name: &str) -> Self {
        Self(format!("member.{}", name))
    }
}

// ---------------------------------------------------------------------------
// AttributeKey: cache partition key for a requested attribute set
// ---------------------------------------------------------------------------

/// Separator between attribute names in an [`AttributeKey`].
pub const ATTRIBUTE_SEPARATOR: &str = ",";

/// Pool partition key derived from an attribute list.
///
/// The list is joined in the order given; `["a", "b"]` and `["b", "a"]`
/// are distinct keys. An empty list has no key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKey(String);

impl AttributeKey {
    pub fn from_attributes<S: AsRef<str>>(attributes: &[S]) -> Option<Self> {
        if attributes.is_empty() {
            return None;
        }
        let joined = attributes
            .iter()
            .map(|a| a.as_ref())
            .collect::<Vec<_>>()
            .join(ATTRIBUTE_SEPARATOR);
        Some(Self(joined))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TCert: one-shot transaction certificate plus its key material
// ---------------------------------------------------------------------------

/// A transaction certificate issued in a batch by member services.
///
/// Intended for a single transaction; the pool forgets it once dispensed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TCert {
    #[serde(with = "hex_bytes")]
    pub cert: Vec<u8>,
    /// PKCS#8 DER private key bound to this certificate.
    #[serde(with = "hex_bytes")]
    pub private_key: Vec<u8>,
}

impl TCert {
    pub fn new(cert: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self { cert, private_key }
    }
}

impl fmt::Debug for TCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = &self.cert[..self.cert.len().min(8)];
        write!(f, "TCert({}..)", hex::encode(prefix))
    }
}

impl Drop for TCert {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

// ---------------------------------------------------------------------------
// Enrollment: long-lived credential obtained once per principal
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// PKCS#8 DER enrollment private key.
    #[serde(with = "hex_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub cert: Vec<u8>,
    pub chain_key: String,
}

impl fmt::Debug for Enrollment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enrollment")
            .field("cert_len", &self.cert.len())
            .field("chain_key", &self.chain_key)
            .finish_non_exhaustive()
    }
}

impl Drop for Enrollment {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

// ---------------------------------------------------------------------------
// Member services requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub enrollment_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub affiliation: String,
    /// Caller-suggested secret; registration may issue a different one.
    #[serde(default)]
    pub enrollment_secret: Option<String>,
}

impl RegistrationRequest {
    pub fn new(enrollment_id: impl Into<String>) -> Self {
        Self {
            enrollment_id: enrollment_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub enrollment_id: String,
    pub enrollment_secret: String,
}

impl fmt::Debug for EnrollmentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrollmentRequest")
            .field("enrollment_id", &self.enrollment_id)
            .field("enrollment_secret", &"<redacted>")
            .finish()
    }
}

/// The registrar on whose authority new members are registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registrar {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// One batch-fetch call against the certificate-issuing service.
#[derive(Debug, Clone)]
pub struct TCertBatchRequest {
    pub name: String,
    pub enrollment: Enrollment,
    pub num: usize,
    pub attributes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChaincodeLanguage {
    #[default]
    Golang,
    Java,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Deploy,
    Invoke,
    Query,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Deploy => write!(f, "deploy"),
            TransactionKind::Invoke => write!(f, "invoke"),
            TransactionKind::Query => write!(f, "query"),
        }
    }
}

/// Common shape of deploy, invoke and query requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Local path of the chaincode to deploy in network mode.
    #[serde(default)]
    pub chaincode_path: String,
    /// Chaincode name used in development mode.
    #[serde(default)]
    pub chaincode_name: Option<String>,
    #[serde(default)]
    pub chaincode_id: Option<ChaincodeId>,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub confidential: bool,
    /// Certificate the chaincode may use for access control.
    #[serde(default, with = "opt_hex_bytes")]
    pub user_cert: Option<Vec<u8>>,
    #[serde(default, with = "opt_hex_bytes")]
    pub metadata: Option<Vec<u8>>,
    #[serde(default)]
    pub language: ChaincodeLanguage,
}

pub type DeployRequest = TransactionRequest;
pub type InvokeRequest = TransactionRequest;
pub type QueryRequest = TransactionRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    Failure,
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCodeResponse {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Hex serde helpers
// ---------------------------------------------------------------------------

mod hex_bytes {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

mod opt_hex_bytes {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(b) => serializer.serialize_some(&hex::encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| hex::decode(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
