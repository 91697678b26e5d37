//! # Strongbox
//!
//! Encrypted vaults shared through organizations and groups, synchronized
//! through an untrusted server.
//!
//! ## Overview
//!
//! - **Containers**: every vault and organization is sealed under a content
//!   key, wrapped for each accessor's public key
//! - **Organizations**: signed member and group lists; groups hold their own
//!   keypair and unlock the vaults granted to them
//! - **Vaults**: item collections that merge per item, deletions included
//! - **Sync**: optimistic pushes with bounded conflict retries, coalesced
//!   per vault
//!
//! ## Key Concepts
//!
//! - **Accessor**: anything with a public key a content key can be wrapped
//!   for (accounts, groups)
//! - **Rotation**: removing an accessor rotates the content key, so a cached
//!   key stops opening future payloads
//! - **Admins**: always granted every organization vault, so an admin can
//!   re-wrap any vault after group keys change
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strongbox::{Client, ClientConfig};
//! use strongbox::access::Account;
//! use strongbox::store::SqliteStorage;
//! use strongbox::sync::memory::MemoryServer;
//!
//! async fn example() -> strongbox::Result<()> {
//!     let server = MemoryServer::new();
//!     let account = Account::generate("alice", "alice@example.com");
//!     server.register_account(&account)?;
//!
//!     let client = Client::new(
//!         server.connect(&account.id),
//!         SqliteStorage::open("strongbox.db")?,
//!         ClientConfig::default(),
//!     );
//!     client.login(account).await?;
//!
//!     let org = client.create_org("Acme").await?;
//!     let vault = client.create_vault(&org.id, "Shared", &[]).await?;
//!     client.create_item(&vault.id, "Wifi", None, vec![]).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `strongbox::core` - ids, encoding, error codes
//! - `strongbox::access` - containers, accounts, groups, organizations
//! - `strongbox::vault` - vaults and item merge
//! - `strongbox::store` - local storage and SQLite
//! - `strongbox::sync` - remote API and sync engine

pub mod client;
pub mod config;
pub mod error;
pub mod logging;

pub use strongbox_access as access;
pub use strongbox_core as core;
pub use strongbox_store as store;
pub use strongbox_sync as sync;
pub use strongbox_vault as vault;

pub use client::Client;
pub use config::{AppState, ClientConfig, Settings, Stats};
pub use error::{ClientError, Result};

pub use strongbox_core::{AccountId, ErrorCode, GroupId, InviteId, ItemId, OrgId, VaultId};
pub use strongbox_sync::{SyncEvent, SyncReport, SyncStatus};
