//! Storage trait: the abstract interface for local persistence.
//!
//! Backends store opaque bytes keyed by `(RecordKind, id)`. Typed access to
//! [`Storable`] records goes through [`StorageExt`].

use async_trait::async_trait;
use bytes::Bytes;
use strongbox_core::{from_cbor, to_cbor, RecordKind, Storable};

use crate::error::Result;

/// Async interface for local persistence.
///
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Bytes>>;

    /// Insert or replace a record.
    async fn save(&self, kind: RecordKind, id: &str, data: Bytes) -> Result<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, kind: RecordKind, id: &str) -> Result<bool>;

    /// Ids of every record of `kind`, in ascending order.
    async fn list(&self, kind: RecordKind) -> Result<Vec<String>>;

    /// Remove every record.
    async fn clear(&self) -> Result<()>;
}

/// Typed access on top of [`Storage`].
pub trait StorageExt: Storage {
    fn load<T: Storable>(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<T>>> + Send;

    fn load_all<T: Storable>(&self) -> impl std::future::Future<Output = Result<Vec<T>>> + Send;

    fn persist<T: Storable>(&self, value: &T)
        -> impl std::future::Future<Output = Result<()>> + Send;

    fn remove<T: Storable>(&self, value: &T)
        -> impl std::future::Future<Output = Result<bool>> + Send;
}

impl<S: Storage + ?Sized> StorageExt for S {
    async fn load<T: Storable>(&self, id: &str) -> Result<Option<T>> {
        match self.get(T::KIND, id).await? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_all<T: Storable>(&self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for id in self.list(T::KIND).await? {
            if let Some(record) = self.load(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn persist<T: Storable>(&self, value: &T) -> Result<()> {
        let bytes = to_cbor(value)?;
        self.save(T::KIND, &value.storage_id(), Bytes::from(bytes))
            .await
    }

    async fn remove<T: Storable>(&self, value: &T) -> Result<bool> {
        self.delete(T::KIND, &value.storage_id()).await
    }
}
