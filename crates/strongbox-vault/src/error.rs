//! Error types for vaults.

use strongbox_access::AccessError;
use strongbox_core::{CoreError, ErrorCode, ItemId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Item not found.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// Container or key error.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Encoding error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl VaultError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VaultError::ItemNotFound(_) => ErrorCode::NotFound,
            VaultError::Access(e) => e.code(),
            VaultError::Core(e) => e.code(),
        }
    }
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
