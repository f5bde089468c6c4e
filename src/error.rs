// src/error.rs
// Error types for the counter ledger

use thiserror::Error;

/// Main error type for the tally library
#[derive(Error, Debug)]
pub enum TallyError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid ledger name: {0}")]
    InvalidLedger(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("counter overflow: {0}")]
    Overflow(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Result using TallyError
pub type Result<T> = std::result::Result<T, TallyError>;

impl TallyError {
    /// True for storage errors worth retrying on the next cycle
    /// (SQLITE_BUSY / SQLITE_LOCKED and their extended codes, pool timeouts).
    pub fn is_transient(&self) -> bool {
        match self {
            TallyError::Db(sqlx::Error::PoolTimedOut) => true,
            TallyError::Db(sqlx::Error::Database(db)) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_scope_error() {
        let err = TallyError::InvalidScope("o::1".to_string());
        assert!(err.to_string().contains("invalid scope"));
        assert!(err.to_string().contains("o::1"));
    }

    #[test]
    fn test_invalid_ledger_error() {
        let err = TallyError::InvalidLedger("bad:name".to_string());
        assert!(err.to_string().contains("invalid ledger name"));
    }

    #[test]
    fn test_config_error() {
        let err = TallyError::Config("missing key".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("missing key"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TallyError = io_err.into();
        assert!(matches!(err, TallyError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: TallyError = json_err.into();
        assert!(matches!(err, TallyError::Json(_)));
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let err: TallyError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_validation_errors_are_not_transient() {
        assert!(!TallyError::InvalidScope("x".into()).is_transient());
        assert!(!TallyError::Overflow("o:1".into()).is_transient());
        assert!(!TallyError::Db(sqlx::Error::RowNotFound).is_transient());
    }
}
