//! Error types for the client.

use strongbox_access::AccessError;
use strongbox_core::{ErrorCode, ItemId};
use strongbox_store::StoreError;
use strongbox_sync::{ApiError, SyncError};
use strongbox_vault::VaultError;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Remote API error.
    #[error("remote error: {0}")]
    Api(#[from] ApiError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Key, signature, or lock-state error.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Vault error.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// No local copy of the object.
    #[error("not found: {0}")]
    NotFound(String),

    /// Item not found in any unlocked vault.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// The account may not perform this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl ClientError {
    /// The boundary error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Sync(e) => e.code(),
            ClientError::Api(e) => e.code,
            ClientError::Store(e) => e.code(),
            ClientError::Access(e) => e.code(),
            ClientError::Vault(e) => e.code(),
            ClientError::NotFound(_) | ClientError::ItemNotFound(_) => ErrorCode::NotFound,
            ClientError::PermissionDenied(_) => ErrorCode::AccessDenied,
            ClientError::InvalidOperation(_) => ErrorCode::InvalidData,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
