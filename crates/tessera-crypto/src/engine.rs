use crate::config::{HashAlgorithm, HashFamily, SecurityLevel};
use crate::ecies::{self, CiphertextLayout};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{self, KeyPair, PrivateKey, PublicKey};
use crate::signer::{self, EcdsaSignature};

/// Curve, hash and hybrid-encryption primitives for one network
/// configuration.
///
/// Every operation reads only the immutable configuration, so a shared
/// reference can be used from any number of threads. The two setters take
/// `&mut self` and therefore cannot race with in-flight operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoEngine {
    hash_family: HashFamily,
    security_level: SecurityLevel,
    hash: HashAlgorithm,
    signing_hash: HashAlgorithm,
}

impl CryptoEngine {
    /// Build an engine from textual configuration.
    ///
    /// Fails with `Configuration` unless the family is SHA2 or SHA3 and the
    /// level is 256 or 384.
    pub fn new(hash_family: &str, security_level: u32) -> CryptoResult<Self> {
        let family: HashFamily = hash_family.parse()?;
        let level = SecurityLevel::try_from(security_level)?;
        Ok(Self::from_parts(family, level))
    }

    pub fn from_parts(hash_family: HashFamily, security_level: SecurityLevel) -> Self {
        let engine = Self {
            hash_family,
            security_level,
            hash: HashAlgorithm::select(hash_family, security_level),
            signing_hash: HashAlgorithm::message_digest(hash_family),
        };
        tracing::debug!(
            hash_family = %engine.hash_family,
            curve = engine.security_level.curve_name(),
            hash = %engine.hash,
            signing_hash = %engine.signing_hash,
            "crypto engine configured"
        );
        engine
    }

    pub fn hash_family(&self) -> HashFamily {
        self.hash_family
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// Digest used for ECIES key derivation and tags. Sized to the curve.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    /// Digest ECDSA signs over: SHA-256 or SHA3-256 on either curve.
    pub fn signing_hash_algorithm(&self) -> HashAlgorithm {
        self.signing_hash
    }

    pub fn set_security_level(&mut self, bits: u32) -> CryptoResult<()> {
        let level = SecurityLevel::try_from(bits)?;
        *self = Self::from_parts(self.hash_family, level);
        Ok(())
    }

    pub fn set_hash_family(&mut self, family: &str) -> CryptoResult<()> {
        let family: HashFamily = family.parse()?;
        *self = Self::from_parts(family, self.security_level);
        Ok(())
    }

    // -- keys --

    pub fn generate_key_pair(&self) -> CryptoResult<KeyPair> {
        keys::generate_key_pair(self.security_level)
    }

    /// Parse a PKCS#8 DER private key on the configured curve.
    pub fn import_private_key(&self, der: &[u8]) -> CryptoResult<PrivateKey> {
        PrivateKey::from_pkcs8_der(self.security_level, der)
    }

    pub fn import_public_key(&self, sec1: &[u8]) -> CryptoResult<PublicKey> {
        PublicKey::from_sec1_bytes(self.security_level, sec1)
    }

    // -- hashing --

    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        self.hash.digest(data)
    }

    // -- ECIES --

    /// Region lengths for a ciphertext blob of `blob_len` bytes.
    pub fn ciphertext_layout(&self, blob_len: usize) -> CryptoResult<CiphertextLayout> {
        CiphertextLayout::for_blob(self.security_level, blob_len)
    }

    pub fn ecies_encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        ecies::encrypt(self.hash, self.security_level, recipient, plaintext)
    }

    /// Authenticate then decrypt an ECIES blob.
    ///
    /// No plaintext is produced unless the tag verifies.
    pub fn ecies_decrypt(&self, recipient: &PrivateKey, blob: &[u8]) -> CryptoResult<Vec<u8>> {
        ecies::decrypt(self.hash, self.security_level, recipient, blob).map_err(|e| {
            tracing::debug!(error = %e, blob_len = blob.len(), "ECIES decryption rejected");
            e
        })
    }

    // -- ECDSA --

    /// Hash `message` with the family's 256-bit digest and sign it with a
    /// deterministic nonce. Components are ASCII decimal.
    pub fn ecdsa_sign(&self, key: &PrivateKey, message: &[u8]) -> CryptoResult<EcdsaSignature> {
        signer::sign(self.signing_hash, self.security_level, key, message)
    }

    pub fn ecdsa_verify(
        &self,
        key: &PublicKey,
        message: &[u8],
        signature: &EcdsaSignature,
    ) -> CryptoResult<bool> {
        signer::verify(self.signing_hash, self.security_level, key, message, signature)
    }
}

impl Default for CryptoEngine {
    fn default() -> Self {
        Self::from_parts(HashFamily::Sha3, SecurityLevel::Level256)
    }
}

/// Check that a key matches the engine before handing it to long-lived code.
pub fn ensure_curve(engine: &CryptoEngine, key: &PublicKey) -> CryptoResult<()> {
    if key.security_level() != engine.security_level() {
        return Err(CryptoError::KeyParse(format!(
            "key is on {} but engine uses {}",
            key.security_level().curve_name(),
            engine.security_level().curve_name()
        )));
    }
    Ok(())
}
