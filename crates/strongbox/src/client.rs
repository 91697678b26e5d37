//! The client: account-level workflows on top of the sync engine.
//!
//! Every organization change goes through [`SyncEngine::update_org`], which
//! re-applies it to a fresh copy on merge conflicts. Changes that rotate
//! group keys are followed by a sync of the affected vaults, unlocked with a
//! copy of Admins taken before the rotation.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};

use strongbox_access::{
    AccessError, Accessor, Account, BoxSecretKey, Group, Invite, InvitePurpose, OrgMember,
    Organization, Signable, VaultRef,
};
use strongbox_core::{now_millis, AccountId, ErrorCode, GroupId, InviteId, ItemId, OrgId, VaultId};
use strongbox_store::{Storage, StorageExt};
use strongbox_sync::{
    Notifier, RemoteApi, SyncEngine, SyncError, SyncEvent, SyncReport, VaultTransform,
};
use strongbox_vault::{Field, Vault, VaultItem};
use tracing::{debug, info, warn};

use crate::config::{AppState, ClientConfig, Settings, Stats};
use crate::error::{ClientError, Result};

/// A signed-in device.
pub struct Client<A, S> {
    engine: SyncEngine<A, S>,
    config: ClientConfig,
    state: RwLock<AppState>,
}

impl<A: RemoteApi, S: Storage> Client<A, S> {
    /// A client with no stored state.
    pub fn new(api: A, storage: S, config: ClientConfig) -> Self {
        Self {
            engine: SyncEngine::new(api, storage, config.sync.clone()),
            config,
            state: RwLock::new(AppState::default()),
        }
    }

    /// Restore settings, stats, and the public account from storage. The
    /// account stays locked until [`Client::unlock`].
    pub async fn load(api: A, storage: S, config: ClientConfig) -> Result<Self> {
        let stored = storage.load::<AppState>(AppState::STORAGE_ID).await?;
        let client = Self::new(api, storage, config);
        if let Some(stored) = stored {
            debug!(has_account = stored.account.is_some(), "restored app state");
            *client.state_mut() = stored;
        }
        Ok(client)
    }

    pub fn engine(&self) -> &SyncEngine<A, S> {
        &self.engine
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        self.engine.notifier()
    }

    pub fn account(&self) -> Option<Account> {
        self.engine
            .account()
            .or_else(|| self.state().account.clone())
    }

    pub fn is_unlocked(&self) -> bool {
        self.engine.is_unlocked()
    }

    pub fn settings(&self) -> Settings {
        self.state().settings.clone()
    }

    pub fn stats(&self) -> Stats {
        self.state().stats.clone()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Session
    // ───────────────────────────────────────────────────────────────────────

    /// Sign in with an unlocked account and run a full synchronization.
    pub async fn login(&self, account: Account) -> Result<SyncReport> {
        info!(account = %account.id, "login");
        self.engine.unlock(account.clone()).await?;
        self.state_mut().account = Some(account);
        self.save_state().await?;
        self.synchronize().await
    }

    /// Unlock the stored account with its secret key and restore local
    /// copies. A failing synchronization afterwards is only logged.
    pub async fn unlock(&self, secret_key: BoxSecretKey) -> Result<()> {
        let mut account = self
            .state()
            .account
            .clone()
            .ok_or_else(|| ClientError::NotFound("no stored account".into()))?;
        account.unlock(secret_key)?;
        self.engine.unlock(account).await?;

        if let Err(e) = self.synchronize().await {
            warn!(error = %e, "synchronization after unlock failed");
        }
        Ok(())
    }

    pub fn lock(&self) {
        self.engine.lock();
    }

    /// Forget the account and every local copy. Settings survive.
    pub async fn logout(&self) -> Result<()> {
        self.engine.logout().await?;
        {
            let mut state = self.state_mut();
            state.account = None;
            state.stats = Stats::default();
        }
        self.save_state().await
    }

    /// Refresh the account, reload organizations, and sync every reachable
    /// vault.
    pub async fn synchronize(&self) -> Result<SyncReport> {
        let report = self.engine.synchronize().await?;
        {
            let mut state = self.state_mut();
            state.stats.last_sync = Some(now_millis());
            state.account = self.engine.account();
        }
        self.save_state().await?;
        self.notifier().emit(SyncEvent::Synchronized);
        Ok(report)
    }

    pub async fn fetch_account(&self) -> Result<Account> {
        let account = self.engine.fetch_account().await?;
        self.state_mut().account = Some(account.clone());
        self.save_state().await?;
        Ok(account)
    }

    /// Change the account's public profile.
    pub async fn update_account<F>(&self, update: F) -> Result<Account>
    where
        F: FnOnce(&mut Account),
    {
        let mut account = self.engine.session()?;
        update(&mut account);
        self.engine.api().update_account(&account).await?;
        self.fetch_account().await
    }

    pub async fn set_settings(&self, settings: Settings) -> Result<()> {
        self.state_mut().settings = settings;
        self.save_state().await
    }

    // ───────────────────────────────────────────────────────────────────────
    // Organizations
    // ───────────────────────────────────────────────────────────────────────

    pub fn org(&self, id: &OrgId) -> Option<Organization> {
        self.engine.org(id)
    }

    pub fn orgs(&self) -> Vec<Organization> {
        self.engine.orgs()
    }

    /// Create an organization owned by the signed-in account.
    pub async fn create_org(&self, name: &str) -> Result<Organization> {
        let account = self.engine.session()?;
        let mut org = Organization::new(name, account.id.clone());
        org.initialize(&account)?;
        org.revision = self.engine.api().create_org(&org).await?;
        info!(org = %org.id, "organization created");

        self.engine.fetch_account().await?;
        self.engine.load_orgs(true).await?;
        self.require_org(&org.id)
    }

    pub async fn create_group(
        &self,
        org: &OrgId,
        name: &str,
        members: &[AccountId],
    ) -> Result<Group> {
        let created = Captured::new();
        let updated = self
            .engine
            .update_org(org, &|org: &mut Organization| {
                created.set(org.create_group(name, members)?);
                Ok(())
            })
            .await?;

        let id = created.take()?;
        updated
            .group(&id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("group {}", id)))
    }

    /// Replace a group's members and, when `vaults` is given, its vault
    /// grants. Every vault the group could reach before or after is
    /// re-synced under the new keys.
    pub async fn update_group(
        &self,
        org: &OrgId,
        group: &GroupId,
        members: &[AccountId],
        vaults: Option<&[(VaultId, bool)]>,
    ) -> Result<Group> {
        let admins = self.require_org(org)?.admins.clone();
        let previous = Captured::new();

        let updated = self
            .engine
            .update_org(org, &|org: &mut Organization| {
                let current = org
                    .group(group)
                    .ok_or_else(|| AccessError::GroupNotFound(group.clone()))?;
                previous.set(granted_vaults(current));

                org.update_group(group, members, None)?;
                if let Some(vaults) = vaults {
                    set_group_vaults(org, group, vaults)?;
                }
                Ok(())
            })
            .await?;

        let updated_group = updated
            .group(group)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("group {}", group)))?;
        let mut affected = previous.take()?;
        affected.extend(granted_vaults(&updated_group));
        self.resync_vaults(&updated, affected, &admins).await?;
        Ok(updated_group)
    }

    /// Set exactly which groups a member belongs to. Everyone is left
    /// alone and the owner always stays in Admins.
    pub async fn update_member(
        &self,
        org: &OrgId,
        member: &AccountId,
        groups: &[GroupId],
    ) -> Result<OrgMember> {
        let admins = self.require_org(org)?.admins.clone();
        let affected = Captured::new();

        let updated = self
            .engine
            .update_org(org, &|org: &mut Organization| {
                if !org.is_member(member) {
                    return Err(AccessError::MemberNotFound(member.clone()).into());
                }

                let mut changes = Vec::new();
                for group in org.all_groups().filter(|g| g.id != org.everyone.id) {
                    let wanted = groups.contains(&group.id)
                        || (group.id == org.admins.id && org.is_owner(member));
                    if wanted == group.has_accessor(member.as_str()) {
                        continue;
                    }
                    let mut members: Vec<AccountId> = org
                        .members_for_group(group)
                        .into_iter()
                        .map(|m| m.id.clone())
                        .filter(|id| id != member)
                        .collect();
                    if wanted {
                        members.push(member.clone());
                    }
                    changes.push((group.id.clone(), members, granted_vaults(group)));
                }

                let mut vaults = Vec::new();
                for (group, members, granted) in changes {
                    org.update_group(&group, &members, None)?;
                    vaults.extend(granted);
                }
                affected.set(vaults);
                Ok(())
            })
            .await?;

        self.resync_vaults(&updated, affected.take()?, &admins)
            .await?;
        updated
            .member(member)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("member {}", member)))
    }

    /// Remove a member and rotate every group they were part of.
    pub async fn remove_member(&self, org: &OrgId, member: &AccountId) -> Result<()> {
        let admins = self.require_org(org)?.admins.clone();
        let affected = Captured::new();

        let updated = self
            .engine
            .update_org(org, &|org: &mut Organization| {
                let vaults = org
                    .groups_for_member(member)
                    .into_iter()
                    .flat_map(granted_vaults)
                    .collect::<Vec<_>>();
                org.remove_member(member)?;
                affected.set(vaults);
                Ok(())
            })
            .await?;

        info!(org = %org, member = %member, "member removed");
        self.resync_vaults(&updated, affected.take()?, &admins)
            .await
    }

    /// Rotate every organization key and re-wrap every vault.
    pub async fn rotate_org_keys(&self, org: &OrgId, force: bool) -> Result<Organization> {
        let admins = self.require_org(org)?.admins.clone();
        let updated = self
            .engine
            .update_org(org, &|org: &mut Organization| Ok(org.rotate_keys(force)?))
            .await?;

        let vaults = updated.vaults.iter().map(|v| v.id.clone()).collect();
        self.resync_vaults(&updated, vaults, &admins).await?;
        Ok(updated)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Vaults
    // ───────────────────────────────────────────────────────────────────────

    pub fn vault(&self, id: &VaultId) -> Option<Vault> {
        self.engine.vault(id)
    }

    pub fn vaults(&self) -> Vec<Vault> {
        self.engine.vaults()
    }

    pub fn main_vault(&self) -> Option<Vault> {
        self.engine.main_vault()
    }

    /// Create an organization vault and grant it to `groups`. Admins always
    /// get read-write access.
    pub async fn create_vault(&self, org: &OrgId, name: &str, groups: &[GroupId]) -> Result<Vault> {
        let account = self.engine.session()?;
        let current = self.require_org(org)?;
        if !current.is_admin(&account.id) {
            return Err(ClientError::PermissionDenied(format!(
                "only admins can create vaults in {}",
                org
            )));
        }

        let mut vault = Vault::new(name, None, Some(current.org_ref()));
        vault.revision = self.engine.api().create_vault(&vault).await?;

        let readonly = self.config.default_vault_groups_readonly;
        let vault_ref = VaultRef {
            id: vault.id.clone(),
            name: vault.name.clone(),
        };
        let updated = self
            .engine
            .update_org(org, &|org: &mut Organization| {
                if !org.vaults.iter().any(|v| v.id == vault_ref.id) {
                    org.vaults.push(vault_ref.clone());
                }
                let admins_id = org.admins.id.clone();
                for id in groups.iter().filter(|id| **id != admins_id) {
                    org.group_mut(id)
                        .ok_or_else(|| AccessError::GroupNotFound(id.clone()))?
                        .grant_vault(vault_ref.id.clone(), readonly);
                }
                org.admins.grant_vault(vault_ref.id.clone(), false);
                Ok(())
            })
            .await?;

        let granted = updated.groups_for_vault(&vault.id);
        updated.verify_all(&signables(&granted))?;
        vault.update_accessors(&accessors(&granted))?;
        vault.commit()?;
        vault.revision = self.engine.api().update_vault(&vault).await?;

        let id = vault.id.clone();
        self.engine.save_vault(vault.clone()).await?;
        self.notifier().emit(SyncEvent::VaultCreated { vault: id.clone() });
        info!(org = %org, vault = %id, "vault created");
        Ok(vault)
    }

    /// Rename an organization vault and replace its group grants.
    pub async fn update_vault(
        &self,
        id: &VaultId,
        name: &str,
        groups: &[(GroupId, bool)],
    ) -> Result<Vault> {
        let org = self.vault_org(id)?;
        let admins = org.admins.clone();

        self.engine
            .update_org(&org.id, &|org: &mut Organization| {
                if let Some(vault) = org.vaults.iter_mut().find(|v| &v.id == id) {
                    vault.name = name.to_owned();
                }
                let ids: Vec<GroupId> = org.all_groups().map(|g| g.id.clone()).collect();
                for group_id in ids {
                    let is_admins = group_id == org.admins.id;
                    let grant = groups.iter().find(|(g, _)| *g == group_id);
                    let Some(group) = org.group_mut(&group_id) else {
                        continue;
                    };
                    match grant {
                        _ if is_admins => group.grant_vault(id.clone(), false),
                        Some((_, readonly)) => group.grant_vault(id.clone(), *readonly),
                        None => group.revoke_vault(id),
                    }
                }
                Ok(())
            })
            .await?;

        let rename: VaultTransform<'_> = &|vault: &mut Vault| {
            vault.name = name.to_owned();
            Ok(())
        };
        self.engine.sync_vault(id, Some(&admins), Some(rename)).await?;
        self.require_vault(id)
    }

    /// Delete an organization vault on the server and drop the local copy.
    pub async fn delete_vault(&self, id: &VaultId) -> Result<()> {
        self.engine.api().delete_vault(id).await?;
        info!(vault = %id, "vault deleted");
        self.synchronize().await?;
        Ok(())
    }

    /// Personal vaults are always writable. Organization vaults are writable
    /// through any group that grants them without the read-only flag.
    pub fn has_write_permissions(&self, vault: &Vault) -> bool {
        let Some(account) = self.engine.account() else {
            return false;
        };
        match &vault.org {
            None => vault.owner.as_ref() == Some(&account.id),
            Some(org) => self
                .engine
                .org(&org.id)
                .map_or(false, |org| org.has_write_permissions(&vault.id, &account.id)),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Items
    // ───────────────────────────────────────────────────────────────────────

    /// Find an item in any unlocked vault.
    pub fn item(&self, id: &ItemId) -> Option<(VaultItem, VaultId)> {
        self.engine.vaults().into_iter().find_map(|vault| {
            let item = vault.items().ok()?.get(id)?.clone();
            Some((item, vault.id))
        })
    }

    pub async fn create_item(
        &self,
        vault: &VaultId,
        name: &str,
        fields: Option<Vec<Field>>,
        tags: Vec<String>,
    ) -> Result<VaultItem> {
        let item = VaultItem::new(name, fields.unwrap_or_else(VaultItem::default_fields), tags);
        let mut added = self.add_items(vault, vec![item]).await?;
        added
            .pop()
            .ok_or_else(|| ClientError::InvalidOperation("no item was added".into()))
    }

    pub async fn add_items(&self, vault: &VaultId, items: Vec<VaultItem>) -> Result<Vec<VaultItem>> {
        let account = self.writable(vault)?;
        let added = self
            .engine
            .edit_vault(vault, |v| {
                let collection = v.items_mut()?;
                Ok(items
                    .into_iter()
                    .map(|item| collection.update(item, Some(&account)))
                    .collect::<Vec<_>>())
            })
            .await?;

        self.notifier().emit(SyncEvent::ItemsAdded {
            vault: vault.clone(),
            items: added.iter().map(|i| i.id.clone()).collect(),
        });
        self.push(vault).await;
        Ok(added)
    }

    /// Change an item's name, fields, or tags. `None` keeps the current value.
    pub async fn update_item(
        &self,
        vault: &VaultId,
        item: &ItemId,
        name: Option<String>,
        fields: Option<Vec<Field>>,
        tags: Option<Vec<String>>,
    ) -> Result<VaultItem> {
        let account = self.writable(vault)?;
        let updated = self
            .engine
            .edit_vault(vault, |v| {
                let collection = v.items_mut()?;
                let mut current = collection
                    .get(item)
                    .cloned()
                    .ok_or_else(|| SyncError::NotFound(format!("item {}", item)))?;
                if let Some(name) = name {
                    current.name = name;
                }
                if let Some(fields) = fields {
                    current.fields = fields;
                }
                if let Some(tags) = tags {
                    current.tags = tags;
                }
                Ok(collection.update(current, Some(&account)))
            })
            .await?;

        self.notifier().emit(SyncEvent::ItemChanged {
            vault: vault.clone(),
            item: item.clone(),
        });
        self.push(vault).await;
        Ok(updated)
    }

    /// Delete items, given as `(vault, item)` pairs.
    pub async fn delete_items(&self, items: &[(VaultId, ItemId)]) -> Result<()> {
        for (vault, ids) in by_vault(items) {
            let account = self.writable(&vault)?;
            let removed = self
                .engine
                .edit_vault(&vault, |v| {
                    let collection = v.items_mut()?;
                    Ok(ids
                        .into_iter()
                        .filter(|id| collection.remove(id, Some(&account)))
                        .collect::<Vec<_>>())
                })
                .await?;

            self.notifier().emit(SyncEvent::ItemsDeleted {
                vault: vault.clone(),
                items: removed,
            });
            self.push(&vault).await;
        }
        Ok(())
    }

    /// Move items into `target`. The moved copies get new ids and the
    /// originals are deleted.
    pub async fn move_items(
        &self,
        items: &[(VaultId, ItemId)],
        target: &VaultId,
    ) -> Result<Vec<VaultItem>> {
        let mut copies = Vec::with_capacity(items.len());
        for (vault, id) in items {
            let item = self
                .engine
                .vault(vault)
                .and_then(|v| v.items().ok()?.get(id).cloned())
                .ok_or_else(|| ClientError::ItemNotFound(id.clone()))?;
            copies.push(VaultItem {
                id: ItemId::generate(),
                revision: 0,
                ..item
            });
        }

        let moved = self.add_items(target, copies).await?;
        self.delete_items(items).await?;
        Ok(moved)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Invites
    // ───────────────────────────────────────────────────────────────────────

    /// Create an invite. Returns it with the secret to send to the invitee.
    pub async fn create_invite(
        &self,
        org: &OrgId,
        email: &str,
        purpose: InvitePurpose,
    ) -> Result<(Invite, String)> {
        let account = self.engine.session()?;
        let created = Captured::new();
        self.engine
            .update_org(org, &|org: &mut Organization| {
                created.set(org.create_invite(email, purpose, &account.id, &self.config.invites)?);
                Ok(())
            })
            .await?;

        let (invite, secret) = created.take()?;
        self.notifier().emit(SyncEvent::InviteCreated {
            org: org.clone(),
            invite: invite.id.clone(),
        });
        Ok((invite, secret))
    }

    pub async fn get_invite(&self, org: &OrgId, id: &InviteId) -> Result<Option<Invite>> {
        match self.engine.api().get_invite(org, id).await {
            Ok(invite) => Ok(Some(invite)),
            Err(e) if e.code == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Accept an invite as the signed-in account. Returns `false` when the
    /// secret is wrong.
    pub async fn accept_invite(&self, invite: &mut Invite, secret: &str) -> Result<bool> {
        let account = self.engine.session()?;
        if !invite.accept(&account, secret)? {
            return Ok(false);
        }
        self.engine.api().accept_invite(invite).await?;
        info!(invite = %invite.id, org = %invite.org.id, "invite accepted");
        Ok(true)
    }

    /// Admit the invitee of an accepted invite. Everyone's vaults are
    /// re-wrapped for the new member list.
    pub async fn confirm_invite(&self, org: &OrgId, invite: &InviteId) -> Result<OrgMember> {
        let admins = self.require_org(org)?.admins.clone();
        let confirmed = Captured::new();
        let updated = self
            .engine
            .update_org(org, &|org: &mut Organization| {
                confirmed.set(org.confirm_invite(invite)?);
                Ok(())
            })
            .await?;

        let vaults = granted_vaults(&updated.everyone);
        self.resync_vaults(&updated, vaults, &admins).await?;
        confirmed.take()
    }

    pub async fn delete_invite(&self, org: &OrgId, invite: &InviteId) -> Result<()> {
        self.engine
            .update_org(org, &|org: &mut Organization| {
                org.remove_invite(invite);
                Ok(())
            })
            .await?;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Internals
    // ───────────────────────────────────────────────────────────────────────

    fn require_org(&self, id: &OrgId) -> Result<Organization> {
        self.engine
            .org(id)
            .ok_or_else(|| ClientError::NotFound(format!("organization {}", id)))
    }

    fn require_vault(&self, id: &VaultId) -> Result<Vault> {
        self.engine
            .vault(id)
            .ok_or_else(|| ClientError::NotFound(format!("vault {}", id)))
    }

    fn vault_org(&self, id: &VaultId) -> Result<Organization> {
        let vault = self.require_vault(id)?;
        let org = vault.org.ok_or_else(|| {
            ClientError::InvalidOperation(format!("vault {} is not an organization vault", id))
        })?;
        self.require_org(&org.id)
    }

    /// The signed-in account id, if it may write to `vault`.
    fn writable(&self, vault: &VaultId) -> Result<AccountId> {
        let account = self.engine.session()?;
        let vault = self.require_vault(vault)?;
        if !self.has_write_permissions(&vault) {
            return Err(ClientError::PermissionDenied(format!(
                "vault {} is read-only",
                vault.id
            )));
        }
        Ok(account.id)
    }

    /// Push local edits. A failure leaves them for the next sync.
    async fn push(&self, vault: &VaultId) {
        if let Err(e) = self.engine.sync_vault(vault, None, None).await {
            warn!(vault = %vault, error = %e, "sync after local edit failed");
        }
    }

    async fn resync_vaults(
        &self,
        org: &Organization,
        mut vaults: Vec<VaultId>,
        admins: &Group,
    ) -> Result<()> {
        vaults.sort();
        vaults.dedup();
        vaults.retain(|id| org.vaults.iter().any(|v| &v.id == id));
        for id in &vaults {
            self.engine.sync_vault(id, Some(admins), None).await?;
        }
        debug!(org = %org.id, count = vaults.len(), "re-synced vaults");
        Ok(())
    }

    async fn save_state(&self) -> Result<()> {
        let snapshot = self.state().clone();
        self.engine.storage().persist(&snapshot).await?;
        Ok(())
    }

    fn state(&self) -> std::sync::RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> std::sync::RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A value produced inside an organization transform. Transforms may run
/// more than once; the last run wins.
struct Captured<T>(Mutex<Option<T>>);

impl<T> Captured<T> {
    fn new() -> Self {
        Self(Mutex::new(None))
    }

    fn set(&self, value: T) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    fn take(&self) -> Result<T> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| ClientError::InvalidOperation("organization update produced no result".into()))
    }
}

fn granted_vaults(group: &Group) -> Vec<VaultId> {
    group.vaults.iter().map(|v| v.id.clone()).collect()
}

/// Make `vaults` the exact grant list of a group. Admins keep read-write
/// access to every vault.
fn set_group_vaults(
    org: &mut Organization,
    group: &GroupId,
    vaults: &[(VaultId, bool)],
) -> strongbox_sync::Result<()> {
    for (id, _) in vaults {
        if !org.vaults.iter().any(|v| &v.id == id) {
            return Err(SyncError::NotFound(format!("vault {}", id)));
        }
    }
    let is_admins = group == &org.admins.id;
    let all: Vec<VaultId> = org.vaults.iter().map(|v| v.id.clone()).collect();
    let target = org
        .group_mut(group)
        .ok_or_else(|| AccessError::GroupNotFound(group.clone()))?;

    for id in all {
        match vaults.iter().find(|(v, _)| *v == id) {
            Some((_, readonly)) => target.grant_vault(id, *readonly && !is_admins),
            None if is_admins => target.grant_vault(id, false),
            None => target.revoke_vault(&id),
        }
    }
    Ok(())
}

fn by_vault(items: &[(VaultId, ItemId)]) -> BTreeMap<VaultId, Vec<ItemId>> {
    let mut grouped: BTreeMap<VaultId, Vec<ItemId>> = BTreeMap::new();
    for (vault, item) in items {
        grouped.entry(vault.clone()).or_default().push(item.clone());
    }
    grouped
}

fn accessors<'a>(groups: &[&'a Group]) -> Vec<&'a dyn Accessor> {
    groups.iter().map(|g| *g as &dyn Accessor).collect()
}

fn signables<'a>(groups: &[&'a Group]) -> Vec<&'a dyn Signable> {
    groups.iter().map(|g| *g as &dyn Signable).collect()
}
