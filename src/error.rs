//! Error types shared by the credential store, the ledger and the exporters.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Empty or malformed form fields, caught before touching the store
    #[error("{0}")]
    InvalidInput(String),

    #[error("username already exists: {0}")]
    DuplicateUsername(String),

    /// Unknown user and wrong password map to the same variant
    #[error("invalid username or password")]
    AuthFailure,

    #[error("expense {0} not found")]
    NotFound(i64),

    #[error("expense {0} belongs to another user")]
    Forbidden(i64),

    #[error("amount must be between 1 and 1000000000, got {0}")]
    InvalidAmount(i64),

    #[error("unknown category: {0}")]
    InvalidCategory(String),

    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("password hashing error: {0}")]
    Hash(String),

    #[error("export error: {0}")]
    Export(String),
}

impl LedgerError {
    /// Errors the user can fix by resubmitting the form.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Self::Store(_) | Self::Io(_) | Self::Pool(_) | Self::Hash(_) | Self::Export(_)
        )
    }
}

impl From<csv::Error> for LedgerError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for LedgerError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Export(err.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(LedgerError::NotFound(7).to_string(), "expense 7 not found");
        assert_eq!(
            LedgerError::AuthFailure.to_string(),
            "invalid username or password"
        );
        assert_eq!(
            LedgerError::InvalidAmount(0).to_string(),
            "amount must be between 1 and 1000000000, got 0"
        );
    }

    #[test]
    fn test_user_errors() {
        assert!(LedgerError::Forbidden(1).is_user_error());
        assert!(LedgerError::InvalidInput("x".into()).is_user_error());
        assert!(!LedgerError::Hash("boom".into()).is_user_error());
        let store: LedgerError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(store, LedgerError::Store(_)));
        assert!(!store.is_user_error());
    }
}
