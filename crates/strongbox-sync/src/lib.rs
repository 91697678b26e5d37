//! # Strongbox Sync
//!
//! Reconciles local vaults and organizations with the server.
//!
//! ## Overview
//!
//! The server is a dumb store for sealed objects with per-object revision
//! numbers. Clients merge concurrent edits themselves:
//!
//! - **Optimistic**: every push carries the last seen revision and fails with
//!   a merge conflict when it is stale
//! - **Convergent**: vault items merge commutatively, so a retry that
//!   re-fetches and re-merges always makes progress
//! - **Bounded**: conflicts are retried a fixed number of times
//! - **Coalesced**: concurrent requests to sync the same vault collapse into
//!   at most one active and one queued attempt
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strongbox_sync::{SyncConfig, SyncEngine};
//! use strongbox_sync::memory::MemoryServer;
//! use strongbox_store::MemoryStorage;
//! use strongbox_access::Account;
//!
//! async fn example() -> strongbox_sync::Result<()> {
//!     let server = MemoryServer::new();
//!     let account = Account::generate("alice", "alice@example.com");
//!     server.register_account(&account)?;
//!
//!     let engine = SyncEngine::new(
//!         server.connect(&account.id),
//!         MemoryStorage::new(),
//!         SyncConfig::default(),
//!     );
//!     engine.unlock(account).await?;
//!
//!     let report = engine.synchronize().await?;
//!     println!("synced {} vaults", report.synced.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod engine;
pub mod error;
pub mod events;
pub mod queue;

pub use api::{memory, ApiResult, RemoteApi};
pub use engine::{
    OrgTransform, SyncConfig, SyncEngine, SyncReport, SyncStatus, VaultTransform,
    DEFAULT_MAX_CONFLICT_RETRIES,
};
pub use error::{ApiError, Result, SyncError};
pub use events::{Notifier, SyncEvent};
pub use queue::SyncQueue;
