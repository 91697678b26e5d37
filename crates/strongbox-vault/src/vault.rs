//! Vaults.
//!
//! A vault is a container whose payload is an [`ItemCollection`]. Personal
//! vaults are wrapped for their owning account. Organization vaults are
//! wrapped for the groups that list them.

use serde::{Deserialize, Serialize};
use strongbox_access::{
    Accessor, AccessError, Container, KeyHolder, OrgRef, Transient,
};
use strongbox_core::{from_cbor, to_cbor, AccountId, RecordKind, Storable, VaultId};

use crate::collection::ItemCollection;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub name: String,
    pub org: Option<OrgRef>,

    /// Owning account of a personal vault.
    pub owner: Option<AccountId>,

    /// Server-assigned concurrency counter.
    pub revision: u64,

    container: Container,

    #[serde(skip)]
    items: Transient<ItemCollection>,
}

impl Vault {
    /// An empty, unlocked vault. It has no content key until
    /// [`Vault::update_accessors`] runs.
    pub fn new(name: impl Into<String>, owner: Option<AccountId>, org: Option<OrgRef>) -> Self {
        let mut items = Transient::empty();
        items.set(ItemCollection::new());
        Self {
            id: VaultId::generate(),
            name: name.into(),
            org,
            owner,
            revision: 0,
            container: Container::new(),
            items,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.items.is_set()
    }

    pub fn accessor_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.container.accessor_ids()
    }

    pub fn has_accessor(&self, id: &str) -> bool {
        self.container.has_accessor(id)
    }

    /// Unlock with the owning account or a granted group.
    pub fn unlock(&mut self, holder: &dyn KeyHolder) -> Result<()> {
        self.container.unlock(holder)?;
        let items = if self.container.has_data() {
            from_cbor(&self.container.get_data()?)?
        } else {
            ItemCollection::new()
        };
        self.items.set(items);
        Ok(())
    }

    pub fn lock(&mut self) {
        self.container.lock();
        self.items.clear();
    }

    pub fn items(&self) -> Result<&ItemCollection> {
        self.items.get().ok_or_else(|| self.locked())
    }

    pub fn items_mut(&mut self) -> Result<&mut ItemCollection> {
        let id = self.id.clone();
        self.items
            .get_mut()
            .ok_or_else(|| AccessError::Locked(format!("vault {} is locked", id)).into())
    }

    /// Seal the in-memory items into the container.
    pub fn commit(&mut self) -> Result<()> {
        let data = to_cbor(self.items()?)?;
        self.container.set_data(&data)?;
        Ok(())
    }

    /// Merge another unlocked copy of this vault into this one.
    ///
    /// Items are merged per id. Name and organization come from whichever
    /// copy has the higher revision.
    pub fn merge(&mut self, other: &Vault) -> Result<()> {
        let theirs = other.items()?;
        self.items_mut()?.merge(theirs);

        if other.revision > self.revision {
            self.name = other.name.clone();
            self.org = other.org.clone();
            self.revision = other.revision;
        }
        Ok(())
    }

    /// Re-wrap the content key for exactly `accessors`.
    ///
    /// If any previous accessor is dropped or now presents a different key,
    /// the content key is rotated as well so that a cached key stops
    /// opening future payloads.
    pub fn update_accessors(&mut self, accessors: &[&dyn Accessor]) -> Result<()> {
        let previous = self.container.accessor_fingerprints();
        let revoked = previous.iter().any(|(id, fingerprint)| {
            !accessors.iter().any(|a| {
                a.accessor_id() == id.as_str()
                    && a.public_key().map(|k| k.fingerprint()).as_ref() == Some(fingerprint)
            })
        });

        if revoked && self.container.is_unlocked() {
            self.container.rotate_content_key(accessors)?;
        } else {
            self.container.update_accessors(accessors)?;
        }
        Ok(())
    }

    fn locked(&self) -> crate::VaultError {
        AccessError::Locked(format!("vault {} is locked", self.id)).into()
    }
}

impl Storable for Vault {
    const KIND: RecordKind = RecordKind::Vault;

    fn storage_id(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::VaultItem;
    use crate::VaultError;
    use strongbox_access::{Account, Group};

    fn account(name: &str) -> Account {
        Account::generate(name, format!("{}@example.com", name))
    }

    fn group(name: &str, members: &[&dyn Accessor]) -> Group {
        let mut group = Group::new(name);
        group.update_accessors(members).unwrap();
        group.generate_keys().unwrap();
        group
    }

    fn reload(vault: &Vault) -> Vault {
        from_cbor(&to_cbor(vault).unwrap()).unwrap()
    }

    #[test]
    fn test_personal_vault_roundtrip() {
        let alice = account("alice");
        let mut vault = Vault::new("Main", Some(alice.id.clone()), None);
        vault.update_accessors(&[&alice]).unwrap();
        vault
            .items_mut()
            .unwrap()
            .update(VaultItem::new("Email", VaultItem::default_fields(), vec![]), None);
        vault.commit().unwrap();

        let mut copy = reload(&vault);
        assert!(!copy.is_unlocked());
        assert!(matches!(
            copy.items(),
            Err(VaultError::Access(AccessError::Locked(_)))
        ));

        copy.unlock(&alice).unwrap();
        assert_eq!(copy.items().unwrap().len(), 1);
    }

    #[test]
    fn test_unlock_before_first_commit_is_empty() {
        let alice = account("alice");
        let mut vault = Vault::new("Main", Some(alice.id.clone()), None);
        vault.update_accessors(&[&alice]).unwrap();

        let mut copy = reload(&vault);
        copy.unlock(&alice).unwrap();
        assert!(copy.items().unwrap().is_empty());
    }

    #[test]
    fn test_group_unlocks_org_vault() {
        let bob = account("bob");
        let eng = group("eng", &[&bob]);

        let mut vault = Vault::new("Shared", None, None);
        vault.update_accessors(&[&eng]).unwrap();
        vault.commit().unwrap();

        let mut bob_group = eng.clone();
        bob_group.lock();
        bob_group.unlock(&bob).unwrap();

        let mut copy = reload(&vault);
        copy.unlock(&bob_group).unwrap();
        assert!(copy.unlock(&bob).is_err());
    }

    #[test]
    fn test_revocation_rotates_content_key() {
        let alice = account("alice");
        let bob = account("bob");
        let admins = group("admins", &[&alice]);
        let eng = group("eng", &[&bob]);

        let mut vault = Vault::new("Shared", None, None);
        vault.update_accessors(&[&admins, &eng]).unwrap();
        vault.commit().unwrap();
        let before = reload(&vault);

        vault.update_accessors(&[&admins]).unwrap();
        let after = reload(&vault);
        assert!(!after.has_accessor(eng.id.as_str()));

        // Bob's group can open the old copy but not the new one.
        let mut old = before.clone();
        old.unlock(&eng).unwrap();
        let mut new = after.clone();
        assert!(new.unlock(&eng).is_err());
        new.unlock(&admins).unwrap();
    }

    #[test]
    fn test_rekeyed_group_forces_rotation() {
        let alice = account("alice");
        let mut eng = group("eng", &[&alice]);

        let mut vault = Vault::new("Shared", None, None);
        vault.update_accessors(&[&eng]).unwrap();
        vault.commit().unwrap();
        let old_eng = eng.clone();

        eng.reset();
        eng.update_accessors(&[&alice]).unwrap();
        eng.generate_keys().unwrap();
        vault.update_accessors(&[&eng]).unwrap();

        let mut copy = reload(&vault);
        assert!(copy.clone().unlock(&old_eng).is_err());
        copy.unlock(&eng).unwrap();
    }

    #[test]
    fn test_merge_takes_metadata_from_newer_revision() {
        let alice = account("alice");
        let mut local = Vault::new("Old name", Some(alice.id.clone()), None);
        local.update_accessors(&[&alice]).unwrap();
        local
            .items_mut()
            .unwrap()
            .update(VaultItem::new("Local", vec![], vec![]), None);

        let mut remote = local.clone();
        remote.name = "New name".into();
        remote.revision = 3;
        remote
            .items_mut()
            .unwrap()
            .update(VaultItem::new("Remote", vec![], vec![]), None);

        local.merge(&remote).unwrap();
        assert_eq!(local.name, "New name");
        assert_eq!(local.revision, 3);
        assert_eq!(local.items().unwrap().len(), 2);

        let mut stale = local.clone();
        stale.revision = 1;
        stale.name = "Stale".into();
        local.merge(&stale).unwrap();
        assert_eq!(local.name, "New name");
    }
}
