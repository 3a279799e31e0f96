//! Crypto engine for transaction certificates: ECIES hybrid decryption and
//! deterministic ECDSA over secp256r1 or secp384r1, with SHA-2 or SHA-3.

pub mod config;
pub mod ecies;
pub mod engine;
pub mod error;
pub mod hash;
pub mod keys;
pub mod signer;

pub use config::{HashAlgorithm, HashFamily, SecurityLevel};
pub use ecies::CiphertextLayout;
pub use engine::{ensure_curve, CryptoEngine};
pub use error::*;
pub use keys::{KeyPair, PrivateKey, PublicKey};
pub use signer::EcdsaSignature;
