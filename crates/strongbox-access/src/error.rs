//! Error types for access control.

use strongbox_core::{AccountId, CoreError, ErrorCode, GroupId, InviteId};
use thiserror::Error;

/// Errors that can occur while wrapping keys, unlocking containers, or
/// mutating an organization.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Operation needs an unlocked container or identity.
    #[error("locked: {0}")]
    Locked(String),

    /// The identity holds no key wrap for this container.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption error, including stale keys.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// The container has never been written.
    #[error("container holds no data")]
    NoData,

    /// A signed public key failed verification.
    #[error("public key mismatch: {0}")]
    PublicKeyMismatch(String),

    /// Organization is already keyed.
    #[error("organization is already initialized")]
    AlreadyInitialized,

    /// Group not found.
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    /// Member not found.
    #[error("member not found: {0}")]
    MemberNotFound(AccountId),

    /// Invite not found.
    #[error("invite not found: {0}")]
    InviteNotFound(InviteId),

    /// Invite has expired.
    #[error("invite has expired: {0}")]
    InviteExpired(InviteId),

    /// Invite has not been accepted or carries invalid data.
    #[error("invalid invite: {0}")]
    InvalidInvite(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl AccessError {
    /// The boundary error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            AccessError::Locked(_) => ErrorCode::Locked,
            AccessError::AccessDenied(_) => ErrorCode::AccessDenied,
            AccessError::Encryption(_) => ErrorCode::EncryptionFailed,
            AccessError::Decryption(_) => ErrorCode::DecryptionFailed,
            AccessError::PublicKeyMismatch(_) => ErrorCode::PublicKeyMismatch,
            AccessError::GroupNotFound(_)
            | AccessError::MemberNotFound(_)
            | AccessError::InviteNotFound(_) => ErrorCode::NotFound,
            AccessError::InviteExpired(_) => ErrorCode::InviteExpired,
            AccessError::NoData
            | AccessError::AlreadyInitialized
            | AccessError::InvalidInvite(_)
            | AccessError::Serialization(_) => ErrorCode::InvalidData,
            AccessError::Core(e) => e.code(),
        }
    }
}

/// Result type for access-control operations.
pub type Result<T> = std::result::Result<T, AccessError>;
