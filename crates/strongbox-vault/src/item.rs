//! Vault items and deletion markers.

use serde::{Deserialize, Serialize};
use strongbox_core::{now_millis, AccountId, ItemId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Username,
    Password,
    Url,
    Email,
    Note,
    Totp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind,
        }
    }
}

/// A secret record stored in a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultItem {
    pub id: ItemId,
    pub name: String,
    pub fields: Vec<Field>,
    pub tags: Vec<String>,

    /// Last write time. Assigned by the collection on every write.
    pub updated: Timestamp,
    pub updated_by: Option<AccountId>,

    /// Number of writes to this id, tombstones included.
    pub revision: u64,
}

impl VaultItem {
    pub fn new(name: impl Into<String>, fields: Vec<Field>, tags: Vec<String>) -> Self {
        Self {
            id: ItemId::generate(),
            name: name.into(),
            fields,
            tags,
            updated: now_millis(),
            updated_by: None,
            revision: 0,
        }
    }

    /// Empty username, password, and URL fields.
    pub fn default_fields() -> Vec<Field> {
        vec![
            Field::new("Username", "", FieldKind::Username),
            Field::new("Password", "", FieldKind::Password),
            Field::new("URL", "", FieldKind::Url),
        ]
    }
}

/// Marker left behind by a deleted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub id: ItemId,
    pub updated: Timestamp,
    pub updated_by: Option<AccountId>,
    pub revision: u64,
}
