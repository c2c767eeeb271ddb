//! Error type shared by the store, filters and report projection

use thiserror::Error;

/// Errors surfaced by ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A required field is missing or a value is out of range. Nothing was written.
    #[error("{0}")]
    Validation(String),

    /// A unique natural key (plate, tire code, category name) already exists
    #[error("{entity} '{key}' already exists")]
    Duplicate { entity: &'static str, key: String },

    /// An insert referenced a driver, vehicle, tire or category that does not exist
    #[error("{0} references an unknown record")]
    UnknownReference(&'static str),

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("export error: {0}")]
    Export(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    /// True when the caller sent bad input (as opposed to a store failure)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_) | LedgerError::Duplicate { .. } | LedgerError::UnknownReference(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
