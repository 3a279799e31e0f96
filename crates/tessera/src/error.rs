use thiserror::Error;

/// Error type for the tessera facade, aggregating the errors of every
/// member crate.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("crypto error: {0}")]
    Crypto(#[from] tessera_crypto::CryptoError),

    #[error("certificate pool error: {0}")]
    Pool(#[from] tessera_pool::PoolError),

    #[error("member error: {0}")]
    Member(#[from] tessera_member::MemberError),

    #[error(transparent)]
    Core(#[from] tessera_core::TesseraError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;
