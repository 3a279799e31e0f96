use thiserror::Error;

/// Error type for the certificate pool.
///
/// Fetch failures never reach `get_next` callers as errors; they are
/// recorded in the pool statistics and surface as a degraded outcome.
/// Only a poisoned lock is returned as `Err`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("certificate issuance failed: {0}")]
    Issuance(String),

    #[error("batch fetch timed out after {timeout_ms} ms")]
    FetchTimedOut { timeout_ms: u64 },

    #[error("invalid attribute set: {0}")]
    InvalidAttributes(String),

    #[error("fetch worker could not be started: {0}")]
    Worker(String),

    #[error("pool lock poisoned")]
    LockPoisoned,
}

impl From<PoolError> for tessera_core::TesseraError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Issuance(msg) => tessera_core::TesseraError::Issuance(msg),
            PoolError::LockPoisoned => tessera_core::TesseraError::Internal(e.to_string()),
            other => tessera_core::TesseraError::Pool(other.to_string()),
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::TesseraError;

    #[test]
    fn test_timeout_display() {
        let err = PoolError::FetchTimedOut { timeout_ms: 250 };
        assert_eq!(err.to_string(), "batch fetch timed out after 250 ms");
    }

    #[test]
    fn test_into_tessera_error() {
        let issuance: TesseraError = PoolError::Issuance("ca offline".into()).into();
        assert!(matches!(issuance, TesseraError::Issuance(ref m) if m == "ca offline"));

        let poisoned: TesseraError = PoolError::LockPoisoned.into();
        assert!(matches!(poisoned, TesseraError::Internal(_)));

        let timeout: TesseraError = PoolError::FetchTimedOut { timeout_ms: 1 }.into();
        assert!(matches!(timeout, TesseraError::Pool(_)));

        let attrs: TesseraError = PoolError::InvalidAttributes("empty".into()).into();
        assert!(matches!(attrs, TesseraError::Pool(ref m) if m.contains("invalid attribute set")));
    }
}
