//! In-memory implementation of the Storage trait.
//!
//! Primarily for testing. Same semantics as SQLite, no persistence.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use strongbox_core::RecordKind;

use crate::error::{Result, StoreError};
use crate::traits::Storage;

/// In-memory storage.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<BTreeMap<(RecordKind, String), Bytes>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject saves that would push the total stored size past `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            records: RwLock::default(),
            quota: Some(quota),
        }
    }

    /// Total size of all stored records.
    pub fn used_bytes(&self) -> Result<usize> {
        Ok(self.read()?.values().map(Bytes::len).sum())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<(RecordKind, String), Bytes>>> {
        self.records
            .read()
            .map_err(|e| StoreError::Background(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<(RecordKind, String), Bytes>>> {
        self.records
            .write()
            .map_err(|e| StoreError::Background(format!("lock poisoned: {}", e)))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Bytes>> {
        Ok(self.read()?.get(&(kind, id.to_owned())).cloned())
    }

    async fn save(&self, kind: RecordKind, id: &str, data: Bytes) -> Result<()> {
        let mut records = self.write()?;
        let key = (kind, id.to_owned());

        if let Some(quota) = self.quota {
            let current: usize = records.values().map(Bytes::len).sum();
            let replaced = records.get(&key).map_or(0, Bytes::len);
            let used = current - replaced + data.len();
            if used > quota {
                return Err(StoreError::QuotaExceeded { used, quota });
            }
        }

        records.insert(key, data);
        Ok(())
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<bool> {
        Ok(self.write()?.remove(&(kind, id.to_owned())).is_some())
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StorageExt;
    use serde::{Deserialize, Serialize};
    use strongbox_core::Storable;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
    }

    impl Storable for Note {
        const KIND: RecordKind = RecordKind::Vault;

        fn storage_id(&self) -> String {
            self.id.clone()
        }
    }

    #[tokio::test]
    async fn test_typed_roundtrip() {
        let store = MemoryStorage::new();
        let note = Note {
            id: "n1".into(),
            body: "hello".into(),
        };

        store.persist(&note).await.unwrap();
        let loaded: Note = store.load("n1").await.unwrap().unwrap();
        assert_eq!(loaded, note);

        assert!(store.remove(&note).await.unwrap());
        assert!(store.load::<Note>("n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let store = MemoryStorage::new();
        store
            .save(RecordKind::Vault, "x", Bytes::from_static(b"vault"))
            .await
            .unwrap();
        store
            .save(RecordKind::Org, "x", Bytes::from_static(b"org"))
            .await
            .unwrap();

        assert_eq!(store.list(RecordKind::Vault).await.unwrap(), vec!["x"]);
        assert_eq!(
            store.get(RecordKind::Org, "x").await.unwrap().unwrap(),
            Bytes::from_static(b"org")
        );

        store.clear().await.unwrap();
        assert!(store.list(RecordKind::Org).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quota() {
        let store = MemoryStorage::with_quota(8);
        store
            .save(RecordKind::Vault, "a", Bytes::from_static(b"12345"))
            .await
            .unwrap();
        // Replacing a record only counts the difference.
        store
            .save(RecordKind::Vault, "a", Bytes::from_static(b"1234567"))
            .await
            .unwrap();

        let err = store
            .save(RecordKind::Vault, "b", Bytes::from_static(b"123"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), strongbox_core::ErrorCode::StorageQuotaExceeded);
        assert_eq!(store.used_bytes().unwrap(), 7);
    }
}
