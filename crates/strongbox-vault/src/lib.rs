//! # Strongbox Vault
//!
//! Vaults hold the actual secrets. A [`Vault`] is an encrypted container
//! whose payload is an [`ItemCollection`], a keyed set of [`VaultItem`]s
//! that merges deterministically across concurrent writers.
//!
//! Deletions are recorded as [`Tombstone`]s and take part in merges like any
//! other write.

pub mod collection;
pub mod error;
pub mod item;
pub mod vault;

pub use collection::{ItemCollection, ItemEntry};
pub use error::{Result, VaultError};
pub use item::{Field, FieldKind, Tombstone, VaultItem};
pub use vault::Vault;
