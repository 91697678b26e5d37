//! Error types for Strongbox Core.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes surfaced across the client/server boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    MergeConflict,
    PublicKeyMismatch,
    AccessDenied,
    Locked,
    StorageQuotaExceeded,
    EncryptionFailed,
    DecryptionFailed,
    InvalidData,
    InviteExpired,
    ServerError,
}

impl ErrorCode {
    /// The wire representation of this code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::MergeConflict => "MERGE_CONFLICT",
            Self::PublicKeyMismatch => "PUBLIC_KEY_MISMATCH",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::Locked => "LOCKED",
            Self::StorageQuotaExceeded => "STORAGE_QUOTA_EXCEEDED",
            Self::EncryptionFailed => "ENCRYPTION_FAILED",
            Self::DecryptionFailed => "DECRYPTION_FAILED",
            Self::InvalidData => "INVALID_DATA",
            Self::InviteExpired => "INVITE_EXPIRED",
            Self::ServerError => "SERVER_ERROR",
        }
    }

    /// Trust and lock-state failures abort the user action and are never retried.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PublicKeyMismatch | Self::AccessDenied | Self::Locked
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core errors from signing and encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl CoreError {
    /// The boundary error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ErrorCode::PublicKeyMismatch
            }
            CoreError::EncodingError(_) | CoreError::DecodingError(_) => ErrorCode::InvalidData,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_format() {
        let json = serde_json::to_string(&ErrorCode::MergeConflict).unwrap();
        assert_eq!(json, "\"MERGE_CONFLICT\"");

        let parsed: ErrorCode = serde_json::from_str("\"PUBLIC_KEY_MISMATCH\"").unwrap();
        assert_eq!(parsed, ErrorCode::PublicKeyMismatch);
        assert_eq!(parsed.to_string(), "PUBLIC_KEY_MISMATCH");
    }

    #[test]
    fn test_signature_errors_map_to_mismatch() {
        assert_eq!(CoreError::InvalidSignature.code(), ErrorCode::PublicKeyMismatch);
        assert_eq!(
            CoreError::DecodingError("eof".into()).code(),
            ErrorCode::InvalidData
        );
        assert!(ErrorCode::Locked.is_fatal());
        assert!(!ErrorCode::MergeConflict.is_fatal());
    }
}
