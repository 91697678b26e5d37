//! # Strongbox Store
//!
//! Local persistence for Strongbox. Records (app state, accounts, vaults,
//! organizations) are stored as CBOR bytes keyed by `(kind, id)`.
//!
//! ## Key Types
//!
//! - [`Storage`] - The async trait for all storage operations
//! - [`StorageExt`] - Typed load/persist for [`Storable`](strongbox_core::Storable) records
//! - [`SqliteStorage`] - SQLite-based persistent storage
//! - [`MemoryStorage`] - In-memory storage for tests
//!
//! Vaults and organizations are persisted in their sealed form. Content
//! keys and identity secrets are never written.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageExt};
