//! # Strongbox Access
//!
//! Envelope encryption and the organization trust model.
//!
//! ## Encryption Model
//!
//! Every protected object is a [`Container`]: a payload sealed with a
//! ChaCha20-Poly1305 content key, plus one [`KeyWrap`] of that key per
//! accessor. Wraps use an ephemeral X25519 exchange with the accessor's
//! public key.
//!
//! Containers nest through identities:
//!
//! 1. An [`Account`] unlocks the [`Group`]s it belongs to
//! 2. A group's secret unlocks the vaults and organizations it is an accessor of
//! 3. An [`Organization`] signs every member and group public key, and those
//!    signatures are verified before a key is trusted
//!
//! Revocation is omission from the accessor list followed by key rotation.
//!
//! ## Capabilities
//!
//! - [`Accessor`]: has a public key that content keys can be wrapped for
//! - [`KeyHolder`]: holds the matching private key and can open containers
//! - [`Signable`]: carries an organization signature over its public key

pub mod container;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod group;
pub mod identity;
pub mod invite;
pub mod keywrap;
pub mod member;
pub mod org;
pub mod secret;

pub use container::{Container, KeyParams};
pub use crypto::{BoxPublicKey, BoxSecretKey, ContentKey, EphemeralKeyPair, Nonce, SharedKey};
pub use envelope::{CipherFormat, Sealed};
pub use error::{AccessError, Result};
pub use group::{Group, GroupVault};
pub use identity::{Accessor, Account, KeyHolder, Signable};
pub use invite::{Invite, InviteConfig, InvitePurpose, Invitee, OrgRef, DEFAULT_INVITE_TTL};
pub use keywrap::KeyWrap;
pub use member::OrgMember;
pub use org::{Organization, SigningAlgorithm, SigningParams, VaultRef};
pub use secret::Transient;
