//! # Strongbox Core
//!
//! Pure primitives shared by every Strongbox crate: identifiers, signing
//! keys, CBOR encoding, and the error codes that cross the client/server
//! boundary.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`SigningKeypair`] / [`SigningPublicKey`] / [`Signature`] - Ed25519 identities
//! - [`Digest`] - Blake3 content digest, used for key fingerprints
//! - [`AccountId`], [`OrgId`], [`GroupId`], [`VaultId`], [`InviteId`], [`ItemId`]
//! - [`ErrorCode`] - Wire-level error codes
//! - [`Storable`] - Records that can be persisted by a storage backend

pub mod crypto;
pub mod encoding;
pub mod error;
pub mod record;
pub mod types;

pub use crypto::{Digest, Signature, SigningKeypair, SigningPublicKey};
pub use encoding::{from_cbor, to_cbor};
pub use error::{CoreError, ErrorCode, Result};
pub use record::{RecordKind, Storable};
pub use types::{
    now_millis, random_bytes, AccountId, GroupId, InviteId, ItemId, OrgId, Timestamp, VaultId,
};
