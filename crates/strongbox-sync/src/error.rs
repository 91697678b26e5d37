//! Error types for the sync module.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strongbox_access::AccessError;
use strongbox_core::{CoreError, ErrorCode};
use strongbox_store::StoreError;
use strongbox_vault::VaultError;
use thiserror::Error;

/// An error reported by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} not found", what))
    }

    pub fn conflict(what: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::MergeConflict,
            format!("{} was changed by another client", what),
        )
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AccessDenied, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::new(e.code(), e.to_string())
    }
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote API rejected a request.
    #[error("remote error: {0}")]
    Api(#[from] ApiError),

    /// Local persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Key, signature, or lock-state failure.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Vault payload failure.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// No unlocked account is attached to the engine.
    #[error("no unlocked account")]
    Locked,

    /// The object is not known locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// Every attempt hit a merge conflict.
    #[error("gave up on {id} after {retries} conflicting retries")]
    ConflictRetriesExhausted { id: String, retries: u32 },

    /// The sync this request was waiting on was dropped before it finished.
    #[error("sync cancelled")]
    Cancelled,

    /// The outcome of a sync shared between coalesced requests.
    #[error(transparent)]
    Shared(Arc<SyncError>),
}

impl SyncError {
    /// The boundary error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::Api(e) => e.code,
            SyncError::Store(e) => e.code(),
            SyncError::Access(e) => e.code(),
            SyncError::Vault(e) => e.code(),
            SyncError::Locked => ErrorCode::Locked,
            SyncError::NotFound(_) => ErrorCode::NotFound,
            SyncError::ConflictRetriesExhausted { .. } => ErrorCode::MergeConflict,
            SyncError::Cancelled => ErrorCode::ServerError,
            SyncError::Shared(e) => e.code(),
        }
    }

    /// The underlying error, looking through shared outcomes.
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::Shared(e) => e.root(),
            other => other,
        }
    }

    pub(crate) fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Api(e) if e.code == ErrorCode::MergeConflict)
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
