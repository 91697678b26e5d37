//! Sealed payloads.
//!
//! A [`Sealed`] value is the ciphertext half of a container: the AEAD output
//! plus the metadata needed to open it again with the content key.

use serde::{Deserialize, Serialize};

use crate::crypto::{ContentKey, Nonce};
use crate::error::Result;

/// Symmetric cipher used for a sealed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CipherFormat {
    /// ChaCha20-Poly1305 with 256-bit key.
    #[default]
    ChaCha20Poly1305 = 1,
}

/// An encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sealed {
    pub format: CipherFormat,

    /// Unique per seal.
    pub nonce: Nonce,

    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// Encrypt plaintext under a content key with a fresh nonce.
    pub fn seal(plaintext: &[u8], key: &ContentKey) -> Result<Self> {
        let nonce = Nonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;

        Ok(Self {
            format: CipherFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    pub fn open(&self, key: &ContentKey) -> Result<Vec<u8>> {
        match self.format {
            CipherFormat::ChaCha20Poly1305 => key.decrypt(&self.ciphertext, &self.nonce),
        }
    }
}
