//! Error types for the audit layer.

use thiserror::Error;

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink could not be reached or rejected the write.
    #[error("audit storage error: {0}")]
    Storage(String),

    /// A stored entry could not be decoded.
    #[error("corrupt audit entry: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for AuditError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
