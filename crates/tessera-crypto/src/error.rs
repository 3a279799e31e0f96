use thiserror::Error;

/// Errors raised by the crypto engine.
///
/// Messages name the failing stage only; they never carry key material,
/// shared secrets or plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("message authentication failed")]
    AuthenticationFailure,

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("key generation error: {0}")]
    KeyGeneration(String),

    #[error("key parse error: {0}")]
    KeyParse(String),

    #[error("key derivation error: {0}")]
    KeyDerivation(String),
}

impl From<CryptoError> for tessera_core::TesseraError {
    fn from(e: CryptoError) -> Self {
        tessera_core::TesseraError::Crypto(e.to_string())
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
