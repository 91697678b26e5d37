//! SQLite implementation of the Storage trait.
//!
//! The persistent backend. Uses rusqlite with bundled SQLite, wrapped in
//! async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use strongbox_core::{now_millis, RecordKind};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::Storage;

/// SQLite-backed storage.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open a SQLite database at the given path, creating and migrating it
    /// as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        tracing::debug!(path = %path.display(), "opened sqlite storage");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Background(format!("mutex poisoned: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Background(format!("spawn_blocking failed: {}", e)))?
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Bytes>> {
        let id = id.to_owned();
        self.run(move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT data FROM records WHERE kind = ?1 AND id = ?2",
                    params![kind.as_str(), id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data.map(Bytes::from))
        })
        .await
    }

    async fn save(&self, kind: RecordKind, id: &str, data: Bytes) -> Result<()> {
        let id = id.to_owned();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO records (kind, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(kind, id) DO UPDATE SET data = excluded.data,
                                                     updated_at = excluded.updated_at",
                params![kind.as_str(), id, data.as_ref(), now_millis() as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<bool> {
        let id = id.to_owned();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM records WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<String>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare("SELECT id FROM records WHERE kind = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map(params![kind.as_str()], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.run(|conn| {
            conn.execute("DELETE FROM records", [])?;
            Ok(())
        })
        .await
    }
}
