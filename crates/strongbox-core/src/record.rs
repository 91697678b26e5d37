//! Persistable record kinds.

use serde::{de::DeserializeOwned, Serialize};

/// The kind of a persisted record. Storage keys are `(kind, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    AppState,
    Account,
    Vault,
    Org,
}

impl RecordKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AppState => "app_state",
            Self::Account => "account",
            Self::Vault => "vault",
            Self::Org => "org",
        }
    }
}

/// A value that a storage backend can persist.
pub trait Storable: Serialize + DeserializeOwned + Send + Sync {
    /// Record kind used as the first half of the storage key.
    const KIND: RecordKind;

    /// Identifier used as the second half of the storage key.
    fn storage_id(&self) -> String;
}
