use thiserror::Error;

#[derive(Debug, Error)]
pub enum TesseraError {
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("certificate pool error: {0}")]
    Pool(String),

    #[error("member error: {0}")]
    Member(String),

    #[error("certificate issuance error: {0}")]
    Issuance(String),

    #[error("registration error: {0}")]
    Registration(String),

    #[error("enrollment error: {0}")]
    Enrollment(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type TesseraResult<T> = Result<T, TesseraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TesseraError::Issuance("member services unavailable".into());
        assert_eq!(
            err.to_string(),
            "certificate issuance error: member services unavailable"
        );
    }

    #[test]
    fn test_result_alias() {
        fn fails() -> TesseraResult<()> {
            Err(TesseraError::Storage("disk full".into()))
        }
        assert!(matches!(fails(), Err(TesseraError::Storage(_))));
    }
}
