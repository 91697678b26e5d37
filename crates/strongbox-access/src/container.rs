//! Envelope containers.
//!
//! A [`Container`] is an encrypted blob plus a table of key wraps, one per
//! accessor. Every accessor can unwrap the same content key with its own
//! private key. Revoking an accessor means calling
//! [`Container::update_accessors`] without it and rotating the content key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strongbox_core::Digest;

use crate::crypto::ContentKey;
use crate::envelope::{CipherFormat, Sealed};
use crate::error::{AccessError, Result};
use crate::identity::{Accessor, KeyHolder};
use crate::keywrap::KeyWrap;
use crate::secret::Transient;

/// Symmetric parameters of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyParams {
    pub cipher: CipherFormat,
}

/// An encrypted payload with per-accessor key wraps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Container {
    pub key_params: KeyParams,

    /// Accessor id to wrapped content key.
    key_wraps: BTreeMap<String, KeyWrap>,

    /// Absent until the first write.
    sealed: Option<Sealed>,

    #[serde(skip)]
    content_key: Transient<ContentKey>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accessor_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.key_wraps.keys().map(String::as_str)
    }

    pub fn has_accessor(&self, id: &str) -> bool {
        self.key_wraps.contains_key(id)
    }

    /// Public-key fingerprint recorded for each accessor.
    pub fn accessor_fingerprints(&self) -> BTreeMap<String, Digest> {
        self.key_wraps
            .iter()
            .map(|(id, wrap)| (id.clone(), wrap.fingerprint))
            .collect()
    }

    pub fn has_data(&self) -> bool {
        self.sealed.is_some()
    }

    pub fn is_unlocked(&self) -> bool {
        self.content_key.is_set()
    }

    /// Rebuild the wrap table for exactly `accessors`.
    ///
    /// Wraps the current content key, generating one when the container has
    /// never held data. A container with data that is not unlocked has no key
    /// to wrap and fails with [`AccessError::Encryption`].
    pub fn update_accessors(&mut self, accessors: &[&dyn Accessor]) -> Result<()> {
        let key = match self.content_key.get() {
            Some(key) => key.clone(),
            None if self.sealed.is_some() => {
                return Err(AccessError::Encryption(
                    "container holds data but is not unlocked".into(),
                ))
            }
            None => ContentKey::generate(),
        };

        let mut wraps = BTreeMap::new();
        for accessor in accessors {
            let id = accessor.accessor_id();
            let public_key = accessor.public_key().ok_or_else(|| {
                AccessError::Encryption(format!("accessor {} has no public key", id))
            })?;
            wraps.insert(id.to_owned(), KeyWrap::create(&key, id, public_key)?);
        }

        self.key_wraps = wraps;
        self.content_key.set(key);
        Ok(())
    }

    /// Recover the content key with `holder`'s private key.
    pub fn unlock(&mut self, holder: &dyn KeyHolder) -> Result<()> {
        let id = holder.accessor_id();
        let wrap = self
            .key_wraps
            .get(id)
            .ok_or_else(|| AccessError::AccessDenied(format!("{} is not an accessor", id)))?;
        let secret = holder
            .secret_key()
            .ok_or_else(|| AccessError::Locked(format!("identity {} is locked", id)))?;

        let key = wrap.open(id, secret)?;
        self.content_key.set(key);
        Ok(())
    }

    pub fn lock(&mut self) {
        self.content_key.clear();
    }

    pub fn set_data(&mut self, data: &[u8]) -> Result<()> {
        let key = self.key()?;
        self.sealed = Some(Sealed::seal(data, key)?);
        Ok(())
    }

    pub fn get_data(&self) -> Result<Vec<u8>> {
        let key = self.key()?;
        let sealed = self.sealed.as_ref().ok_or(AccessError::NoData)?;
        sealed.open(key)
    }

    /// Drop the payload, the wraps, and the content key.
    ///
    /// The next [`Container::update_accessors`] starts from a fresh key.
    pub fn reset(&mut self) {
        self.sealed = None;
        self.key_wraps.clear();
        self.content_key.clear();
    }

    /// Replace the content key, re-sealing the payload and re-wrapping for
    /// `accessors`. Requires an unlocked container when data is present.
    pub fn rotate_content_key(&mut self, accessors: &[&dyn Accessor]) -> Result<()> {
        let data = match self.sealed {
            Some(_) => Some(self.get_data()?),
            None => None,
        };

        self.content_key.set(ContentKey::generate());
        self.sealed = None;
        self.update_accessors(accessors)?;
        if let Some(data) = data {
            self.set_data(&data)?;
        }
        Ok(())
    }

    fn key(&self) -> Result<&ContentKey> {
        self.content_key
            .get()
            .ok_or_else(|| AccessError::Locked("container is not unlocked".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Account;
    use proptest::prelude::*;

    fn account(name: &str) -> Account {
        Account::generate(name, format!("{}@example.com", name))
    }

    #[test]
    fn test_fresh_container_is_locked() {
        let container = Container::new();
        assert!(!container.is_unlocked());
        assert!(matches!(container.get_data(), Err(AccessError::Locked(_))));
    }

    #[test]
    fn test_set_data_requires_unlock() {
        let mut container = Container::new();
        assert!(matches!(
            container.set_data(b"x"),
            Err(AccessError::Locked(_))
        ));
    }

    #[test]
    fn test_non_accessor_is_denied() {
        let alice = account("alice");
        let mallory = account("mallory");

        let mut container = Container::new();
        container.update_accessors(&[&alice]).unwrap();
        container.set_data(b"secret").unwrap();

        let mut copy: Container =
            strongbox_core::from_cbor(&strongbox_core::to_cbor(&container).unwrap()).unwrap();
        assert!(matches!(
            copy.unlock(&mallory),
            Err(AccessError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_locked_container_with_data_cannot_rewrap() {
        let alice = account("alice");
        let mut container = Container::new();
        container.update_accessors(&[&alice]).unwrap();
        container.set_data(b"secret").unwrap();
        container.lock();

        assert!(matches!(
            container.update_accessors(&[&alice]),
            Err(AccessError::Encryption(_))
        ));
    }

    #[test]
    fn test_get_data_before_write() {
        let alice = account("alice");
        let mut container = Container::new();
        container.update_accessors(&[&alice]).unwrap();
        assert!(matches!(container.get_data(), Err(AccessError::NoData)));
    }

    #[test]
    fn test_revocation_after_rotation() {
        let alice = account("alice");
        let bob = account("bob");

        let mut container = Container::new();
        container.update_accessors(&[&alice, &bob]).unwrap();
        container.set_data(b"shared").unwrap();

        let mut bob_copy = container.clone();
        bob_copy.lock();
        bob_copy.unlock(&bob).unwrap();
        assert_eq!(bob_copy.get_data().unwrap(), b"shared");

        container.rotate_content_key(&[&alice]).unwrap();
        assert!(!container.has_accessor(bob.id.as_str()));

        let mut stale = container.clone();
        stale.lock();
        assert!(matches!(
            stale.unlock(&bob),
            Err(AccessError::AccessDenied(_))
        ));

        // Bob's cached content key no longer opens the payload.
        let sealed = container.sealed.clone().unwrap();
        let old_key = bob_copy.content_key.get().unwrap();
        assert!(sealed.open(old_key).is_err());

        stale.unlock(&alice).unwrap();
        assert_eq!(stale.get_data().unwrap(), b"shared");
    }

    #[test]
    fn test_stale_key_fails_with_decryption() {
        let alice = account("alice");
        let mut container = Container::new();
        container.update_accessors(&[&alice]).unwrap();
        container.lock();

        // Same id, different keypair.
        let mut impostor = account("alice");
        impostor.id = alice.id.clone();
        assert!(matches!(
            container.unlock(&impostor),
            Err(AccessError::Decryption(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_data_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let alice = account("alice");
            let bob = account("bob");

            let mut container = Container::new();
            container.update_accessors(&[&alice, &bob]).unwrap();
            container.set_data(&data).unwrap();

            let bytes = strongbox_core::to_cbor(&container).unwrap();
            let mut restored: Container = strongbox_core::from_cbor(&bytes).unwrap();
            prop_assert!(!restored.is_unlocked());

            restored.unlock(&bob).unwrap();
            prop_assert_eq!(restored.get_data().unwrap(), data);
        }
    }
}
