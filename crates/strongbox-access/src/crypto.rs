//! Cryptographic utilities for envelope encryption.
//!
//! Provides X25519 key agreement and ChaCha20-Poly1305 authenticated encryption.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use strongbox_core::{random_bytes, Digest};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{AccessError, Result};

/// An X25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxPublicKey(pub [u8; 32]);

impl BoxPublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Blake3 fingerprint, recorded next to every key wrap.
    pub fn fingerprint(&self) -> Digest {
        Digest::hash(&self.0)
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl fmt::Debug for BoxPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxPub({})", &hex::encode(self.0)[..16])
    }
}

impl From<PublicKey> for BoxPublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// An X25519 static secret key held by an account or group.
#[derive(Clone)]
pub struct BoxSecretKey(StaticSecret);

impl BoxSecretKey {
    pub fn generate() -> Self {
        Self(StaticSecret::from(random_bytes::<32>()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Raw secret bytes, only ever written into a sealed payload.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> BoxPublicKey {
        BoxPublicKey::from(PublicKey::from(&self.0))
    }

    pub fn diffie_hellman(&self, peer_public: &BoxPublicKey) -> SharedKey {
        let shared = self.0.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

impl fmt::Debug for BoxSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxSecret(pub={:?})", self.public_key())
    }
}

/// A shared secret derived from X25519 key agreement.
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a wrapping key from this shared secret, bound to `context`.
    pub fn derive_key(&self, context: &[u8]) -> ContentKey {
        let mut hasher = blake3::Hasher::new_derive_key("strongbox-access-v1 key wrap");
        hasher.update(&self.0);
        hasher.update(context);
        ContentKey(*hasher.finalize().as_bytes())
    }
}

/// A 256-bit symmetric key for ChaCha20-Poly1305.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    pub fn generate() -> Self {
        Self(random_bytes::<32>())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn encrypt(&self, plaintext: &[u8], nonce: &Nonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| AccessError::Encryption(e.to_string()))?;

        cipher
            .encrypt(chacha20poly1305::Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| AccessError::Encryption(e.to_string()))
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &Nonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| AccessError::Decryption(e.to_string()))?;

        cipher
            .decrypt(chacha20poly1305::Nonce::from_slice(&nonce.0), ciphertext)
            .map_err(|e| AccessError::Decryption(e.to_string()))
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce(pub [u8; 12]);

impl Nonce {
    pub fn generate() -> Self {
        Self(random_bytes::<12>())
    }

    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// Ephemeral key pair for one-time key agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: BoxPublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = BoxPublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    pub fn public_key(&self) -> BoxPublicKey {
        self.public
    }

    /// Consumes the ephemeral secret.
    pub fn diffie_hellman(self, peer_public: &BoxPublicKey) -> SharedKey {
        let shared = self.secret.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_key_agreement() {
        let bob_secret = BoxSecretKey::generate();
        let bob_public = bob_secret.public_key();

        let alice_ephemeral = EphemeralKeyPair::generate();
        let alice_ephemeral_public = alice_ephemeral.public_key();

        let alice_shared = alice_ephemeral.diffie_hellman(&bob_public);
        let bob_shared = bob_secret.diffie_hellman(&alice_ephemeral_public);

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_secret_bytes_roundtrip() {
        let secret = BoxSecretKey::generate();
        let restored = BoxSecretKey::from_bytes(secret.to_bytes());
        assert_eq!(secret.public_key(), restored.public_key());
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = ContentKey::generate();
        let nonce = Nonce::generate();
        let plaintext = b"hello, world!";

        let ciphertext = key.encrypt(plaintext, &nonce).unwrap();
        assert_ne!(ciphertext, plaintext);

        let decrypted = key.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let nonce = Nonce::generate();
        let ciphertext = ContentKey::generate().encrypt(b"secret", &nonce).unwrap();

        let err = ContentKey::generate().decrypt(&ciphertext, &nonce).unwrap_err();
        assert!(matches!(err, AccessError::Decryption(_)));
    }

    #[test]
    fn test_key_derivation_different_contexts() {
        let shared = SharedKey([0x42; 32]);

        let key1 = shared.derive_key(b"context-a");
        let key2 = shared.derive_key(b"context-b");

        assert_ne!(key1.as_bytes(), key2.as_bytes());
        assert_eq!(key1.as_bytes(), shared.derive_key(b"context-a").as_bytes());
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let key = ContentKey::from_bytes([0xaa; 32]);
        assert_eq!(format!("{:?}", key), "ContentKey(..)");
        let secret = BoxSecretKey::generate();
        assert!(!format!("{:?}", secret).contains(&hex::encode(secret.to_bytes())));
    }
}
