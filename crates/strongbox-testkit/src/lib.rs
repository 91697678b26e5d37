//! # Strongbox Testkit
//!
//! Testing utilities for Strongbox.
//!
//! ## Overview
//!
//! - **Fixtures**: an in-memory server with registered accounts and
//!   signed-in clients
//! - **Fault injection**: [`ConflictingApi`] wraps any [`RemoteApi`] and
//!   fails vault pushes with merge conflicts; [`RacingApi`] slips in a
//!   competing write from a second device before a push; [`CountingApi`]
//!   counts vault round trips and can hold fetches
//! - **Generators**: proptest strategies for vault items
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use strongbox_testkit::ServerFixture;
//!
//! async fn example() {
//!     let fixture = ServerFixture::new();
//!     let (alice, client) = fixture.login("alice").await;
//!     let org = client.create_org("Acme").await.unwrap();
//!     assert!(org.is_owner(&alice.id));
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use strongbox_testkit::generators::{item_from_params, ItemParams};
//!
//! proptest! {
//!     #[test]
//!     fn items_keep_their_fields(params: ItemParams) {
//!         let item = item_from_params(&params);
//!         prop_assert_eq!(item.fields, params.fields);
//!     }
//! }
//! ```
//!
//! [`RemoteApi`]: strongbox_sync::RemoteApi

pub mod fixtures;
pub mod generators;

pub use fixtures::{ConflictingApi, CountingApi, RacingApi, ServerFixture, TestClient};
pub use generators::{item_from_params, ItemParams};
