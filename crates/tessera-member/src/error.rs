use tessera_pool::PoolError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemberError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("'{0}' is not enrolled")]
    NotEnrolled(String),

    #[error("no valid peer available on chain '{0}'")]
    NoValidPeer(String),

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("enrollment failed: {0}")]
    Enrollment(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("identity lock poisoned")]
    LockPoisoned,
}

impl From<MemberError> for tessera_core::TesseraError {
    fn from(e: MemberError) -> Self {
        use tessera_core::TesseraError;
        match e {
            MemberError::Registration(msg) => TesseraError::Registration(msg),
            MemberError::Enrollment(msg) => TesseraError::Enrollment(msg),
            MemberError::Transaction(msg) => TesseraError::Transaction(msg),
            MemberError::Snapshot(msg) => TesseraError::Serialization(msg),
            MemberError::Pool(pool) => pool.into(),
            other => TesseraError::Member(other.to_string()),
        }
    }
}

pub type MemberResult<T> = Result<T, MemberError>;
