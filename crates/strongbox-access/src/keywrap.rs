//! Per-accessor key wrapping via X25519 key agreement.
//!
//! A container's content key is wrapped once for every accessor. The wrap
//! key is derived from an ephemeral ECDH exchange with the accessor's public
//! key, bound to the accessor id so wraps cannot be moved between entries.

use serde::{Deserialize, Serialize};
use strongbox_core::Digest;

use crate::crypto::{BoxPublicKey, BoxSecretKey, ContentKey, EphemeralKeyPair, Nonce};
use crate::error::{AccessError, Result};

/// A content key encrypted for one accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyWrap {
    /// Ephemeral X25519 public key (sender's side of ECDH).
    pub ephemeral_public: BoxPublicKey,

    /// The content key, encrypted with the derived wrap key.
    pub encrypted_key: Vec<u8>,

    pub nonce: Nonce,

    /// Fingerprint of the recipient public key at wrap time.
    pub fingerprint: Digest,
}

impl KeyWrap {
    /// Wrap `content_key` for the accessor `accessor_id` holding `recipient`.
    pub fn create(
        content_key: &ContentKey,
        accessor_id: &str,
        recipient: &BoxPublicKey,
    ) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let wrap_key = ephemeral
            .diffie_hellman(recipient)
            .derive_key(accessor_id.as_bytes());

        let nonce = Nonce::generate();
        let encrypted_key = wrap_key.encrypt(content_key.as_bytes(), &nonce)?;

        Ok(Self {
            ephemeral_public,
            encrypted_key,
            nonce,
            fingerprint: recipient.fingerprint(),
        })
    }

    /// Recover the content key with the accessor's secret key.
    pub fn open(&self, accessor_id: &str, secret: &BoxSecretKey) -> Result<ContentKey> {
        if !secret.public_key().fingerprint().ct_eq(&self.fingerprint) {
            return Err(AccessError::Decryption(format!(
                "key wrap for {} was made for a different key",
                accessor_id
            )));
        }

        let wrap_key = secret
            .diffie_hellman(&self.ephemeral_public)
            .derive_key(accessor_id.as_bytes());
        let key_bytes = wrap_key.decrypt(&self.encrypted_key, &self.nonce)?;

        let arr: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            AccessError::Decryption(format!(
                "invalid key length: expected 32, got {}",
                key_bytes.len()
            ))
        })?;
        Ok(ContentKey::from_bytes(arr))
    }
}
