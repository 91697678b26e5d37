//! Mergeable item collections.
//!
//! Each item id maps to either a live item or a tombstone. Two copies merge
//! by keeping, per id, the entry that sorts last under
//! `(updated, revision, tombstone, updated_by, content digest)`. That is a
//! total order, so merging is commutative, associative, and idempotent.
//! Tombstones are kept indefinitely, so a stale copy can never bring a
//! deleted item back.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use strongbox_core::{now_millis, to_cbor, AccountId, Digest, ItemId, Timestamp};

use crate::item::{Tombstone, VaultItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemEntry {
    Live(VaultItem),
    Deleted(Tombstone),
}

impl ItemEntry {
    pub fn id(&self) -> &ItemId {
        match self {
            ItemEntry::Live(item) => &item.id,
            ItemEntry::Deleted(tomb) => &tomb.id,
        }
    }

    pub fn updated(&self) -> Timestamp {
        match self {
            ItemEntry::Live(item) => item.updated,
            ItemEntry::Deleted(tomb) => tomb.updated,
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            ItemEntry::Live(item) => item.revision,
            ItemEntry::Deleted(tomb) => tomb.revision,
        }
    }

    pub fn updated_by(&self) -> Option<&AccountId> {
        match self {
            ItemEntry::Live(item) => item.updated_by.as_ref(),
            ItemEntry::Deleted(tomb) => tomb.updated_by.as_ref(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, ItemEntry::Deleted(_))
    }

    fn digest(&self) -> Digest {
        let bytes = to_cbor(self).expect("CBOR encoding into memory cannot fail");
        Digest::hash(&bytes)
    }

    /// Merge order. The greater entry wins.
    pub fn merge_cmp(&self, other: &Self) -> Ordering {
        self.updated()
            .cmp(&other.updated())
            .then_with(|| self.revision().cmp(&other.revision()))
            .then_with(|| self.is_deleted().cmp(&other.is_deleted()))
            .then_with(|| self.updated_by().cmp(&other.updated_by()))
            .then_with(|| self.digest().cmp(&other.digest()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCollection {
    entries: BTreeMap<ItemId, ItemEntry>,
}

impl ItemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A live item.
    pub fn get(&self, id: &ItemId) -> Option<&VaultItem> {
        match self.entries.get(id) {
            Some(ItemEntry::Live(item)) => Some(item),
            _ => None,
        }
    }

    pub fn entry(&self, id: &ItemId) -> Option<&ItemEntry> {
        self.entries.get(id)
    }

    /// Live items in id order.
    pub fn iter(&self) -> impl Iterator<Item = &VaultItem> {
        self.entries.values().filter_map(|e| match e {
            ItemEntry::Live(item) => Some(item),
            ItemEntry::Deleted(_) => None,
        })
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &Tombstone> {
        self.entries.values().filter_map(|e| match e {
            ItemEntry::Deleted(tomb) => Some(tomb),
            ItemEntry::Live(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace an item, stamping it as the newest write. Returns
    /// the stored copy.
    pub fn update(&mut self, item: VaultItem, by: Option<&AccountId>) -> VaultItem {
        self.update_at(item, by, now_millis())
    }

    /// [`ItemCollection::update`] with an explicit clock reading.
    pub fn update_at(
        &mut self,
        mut item: VaultItem,
        by: Option<&AccountId>,
        now: Timestamp,
    ) -> VaultItem {
        let (updated, revision) = self.next_stamp(&item.id, now);
        item.updated = updated;
        item.revision = revision;
        item.updated_by = by.cloned();

        self.entries
            .insert(item.id.clone(), ItemEntry::Live(item.clone()));
        item
    }

    /// Replace a live item with a tombstone. Returns `false` if there was no
    /// live item.
    pub fn remove(&mut self, id: &ItemId, by: Option<&AccountId>) -> bool {
        self.remove_at(id, by, now_millis())
    }

    pub fn remove_at(&mut self, id: &ItemId, by: Option<&AccountId>, now: Timestamp) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        let (updated, revision) = self.next_stamp(id, now);
        self.entries.insert(
            id.clone(),
            ItemEntry::Deleted(Tombstone {
                id: id.clone(),
                updated,
                updated_by: by.cloned(),
                revision,
            }),
        );
        true
    }

    /// Fold `other` into this collection.
    pub fn merge(&mut self, other: &ItemCollection) {
        for (id, theirs) in &other.entries {
            let replace = match self.entries.get(id) {
                Some(ours) => theirs.merge_cmp(ours) == Ordering::Greater,
                None => true,
            };
            if replace {
                self.entries.insert(id.clone(), theirs.clone());
            }
        }
    }

    fn next_stamp(&self, id: &ItemId, now: Timestamp) -> (Timestamp, u64) {
        match self.entries.get(id) {
            Some(prev) => (now.max(prev.updated()), prev.revision() + 1),
            None => (now, 1),
        }
    }
}
