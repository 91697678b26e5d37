//! Groups.
//!
//! A group is both a container and an identity. Its members are the
//! accessors of its container, and the payload sealed inside is the group's
//! own X25519 secret. Once unlocked by a member, the group can in turn
//! unlock every vault that lists it as an accessor.

use serde::{Deserialize, Serialize};
use strongbox_core::{GroupId, Signature, VaultId};

use crate::container::Container;
use crate::crypto::{BoxPublicKey, BoxSecretKey};
use crate::error::{AccessError, Result};
use crate::identity::{Accessor, KeyHolder, Signable};
use crate::secret::Transient;

/// A vault granted to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVault {
    pub id: VaultId,
    pub readonly: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub public_key: Option<BoxPublicKey>,
    pub signed_public_key: Option<Signature>,

    /// Ordered, no duplicate ids.
    pub vaults: Vec<GroupVault>,

    container: Container,

    #[serde(skip)]
    secret: Transient<BoxSecretKey>,
}

impl Group {
    /// A group with no keys. Call [`Group::update_accessors`] and then
    /// [`Group::generate_keys`] before using it.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::generate(),
            name: name.into(),
            public_key: None,
            signed_public_key: None,
            vaults: Vec::new(),
            container: Container::new(),
            secret: Transient::empty(),
        }
    }

    pub fn accessor_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.container.accessor_ids()
    }

    pub fn has_accessor(&self, id: &str) -> bool {
        self.container.has_accessor(id)
    }

    pub fn is_unlocked(&self) -> bool {
        self.secret.is_set()
    }

    /// Wrap the group container for `accessors`.
    ///
    /// Signatures are not checked here. Callers verify members through the
    /// organization first.
    pub fn update_accessors(&mut self, accessors: &[&dyn Accessor]) -> Result<()> {
        self.container.update_accessors(accessors)
    }

    /// Generate a fresh keypair and seal the secret into the container.
    ///
    /// Clears the organization signature, which must be renewed.
    pub fn generate_keys(&mut self) -> Result<()> {
        let secret = BoxSecretKey::generate();
        self.container.set_data(&secret.to_bytes())?;
        self.public_key = Some(secret.public_key());
        self.signed_public_key = None;
        self.secret.set(secret);
        Ok(())
    }

    /// Unlock with a member's private key, recovering the group secret.
    pub fn unlock(&mut self, holder: &dyn KeyHolder) -> Result<()> {
        self.container.unlock(holder)?;
        let bytes = self.container.get_data()?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            AccessError::Decryption(format!("group {} holds a malformed secret", self.id))
        })?;

        let secret = BoxSecretKey::from_bytes(arr);
        if Some(secret.public_key()) != self.public_key {
            return Err(AccessError::PublicKeyMismatch(format!(
                "secret of group {} does not match its public key",
                self.id
            )));
        }
        self.secret.set(secret);
        Ok(())
    }

    pub fn lock(&mut self) {
        self.container.lock();
        self.secret.clear();
    }

    /// Drop the sealed secret and all wraps ahead of a key rotation.
    pub fn reset(&mut self) {
        self.container.reset();
        self.secret.clear();
    }

    pub fn vault(&self, id: &VaultId) -> Option<&GroupVault> {
        self.vaults.iter().find(|v| &v.id == id)
    }

    /// Grant or update access to a vault.
    pub fn grant_vault(&mut self, id: VaultId, readonly: bool) {
        match self.vaults.iter_mut().find(|v| v.id == id) {
            Some(existing) => existing.readonly = readonly,
            None => self.vaults.push(GroupVault { id, readonly }),
        }
    }

    pub fn revoke_vault(&mut self, id: &VaultId) {
        self.vaults.retain(|v| &v.id != id);
    }
}

impl Accessor for Group {
    fn accessor_id(&self) -> &str {
        self.id.as_str()
    }

    fn public_key(&self) -> Option<&BoxPublicKey> {
        self.public_key.as_ref()
    }
}

impl KeyHolder for Group {
    fn secret_key(&self) -> Option<&BoxSecretKey> {
        self.secret.get()
    }
}

impl Signable for Group {
    fn signed_public_key(&self) -> Option<&Signature> {
        self.signed_public_key.as_ref()
    }

    fn set_signed_public_key(&mut self, signature: Signature) {
        self.signed_public_key = Some(signature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Account;

    fn keyed_group(members: &[&dyn Accessor]) -> Group {
        let mut group = Group::new("engineering");
        group.update_accessors(members).unwrap();
        group.generate_keys().unwrap();
        group
    }

    #[test]
    fn test_fresh_group_has_no_usable_key() {
        let alice = Account::generate("alice", "alice@example.com");
        let mut group = Group::new("empty");
        assert!(group.public_key.is_none());
        assert!(matches!(
            group.generate_keys(),
            Err(AccessError::Locked(_))
        ));

        group.update_accessors(&[&alice]).unwrap();
        let mut copy = group.clone();
        copy.lock();
        assert!(matches!(copy.unlock(&alice), Err(AccessError::NoData)));
    }

    #[test]
    fn test_member_unlocks_group() {
        let alice = Account::generate("alice", "alice@example.com");
        let bob = Account::generate("bob", "bob@example.com");
        let group = keyed_group(&[&alice, &bob]);

        let mut copy = group.clone();
        copy.lock();
        assert!(!copy.is_unlocked());

        copy.unlock(&bob).unwrap();
        assert!(copy.is_unlocked());
        assert_eq!(
            copy.secret_key().unwrap().public_key(),
            group.public_key.unwrap()
        );
    }

    #[test]
    fn test_non_member_is_denied() {
        let alice = Account::generate("alice", "alice@example.com");
        let eve = Account::generate("eve", "eve@example.com");
        let mut group = keyed_group(&[&alice]);
        group.lock();

        assert!(matches!(
            group.unlock(&eve),
            Err(AccessError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_substituted_public_key_detected() {
        let alice = Account::generate("alice", "alice@example.com");
        let mut group = keyed_group(&[&alice]);
        group.lock();
        group.public_key = Some(BoxSecretKey::generate().public_key());

        assert!(matches!(
            group.unlock(&alice),
            Err(AccessError::PublicKeyMismatch(_))
        ));
    }

    #[test]
    fn test_grant_vault_updates_in_place() {
        let mut group = Group::new("ops");
        let vault = VaultId::new("v1");
        group.grant_vault(vault.clone(), true);
        group.grant_vault(vault.clone(), false);

        assert_eq!(group.vaults.len(), 1);
        assert!(!group.vault(&vault).unwrap().readonly);

        group.revoke_vault(&vault);
        assert!(group.vault(&vault).is_none());
    }
}
