//! Error types for the store module.

use strongbox_core::{CoreError, ErrorCode};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Storage quota exceeded.
    #[error("storage quota exceeded: {used} of {quota} bytes")]
    QuotaExceeded { used: usize, quota: usize },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Background task or lock failure.
    #[error("background task failed: {0}")]
    Background(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::QuotaExceeded { .. } => ErrorCode::StorageQuotaExceeded,
            StoreError::Serialization(_) => ErrorCode::InvalidData,
            StoreError::Database(_) | StoreError::Migration(_) | StoreError::Background(_) => {
                ErrorCode::ServerError
            }
        }
    }
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
