//! The sync engine.
//!
//! Holds the signed-in account with the in-memory copies of its
//! organizations and vaults, and reconciles them with the remote API.
//!
//! ## Vault sync loop
//!
//! 1. Fetch the remote vault and unlock it (account for personal vaults, a
//!    group for organization vaults). A missing vault is purged locally.
//! 2. Merge the in-memory copy's items into it.
//! 3. Re-derive accessors from the organization's current groups, after
//!    verifying their signatures.
//! 4. Apply the caller's transform, then push.
//! 5. On a merge conflict, start over, up to
//!    [`SyncConfig::max_conflict_retries`] times.
//!
//! The in-memory maps only change after the server confirmed a write.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use strongbox_access::{AccessError, Accessor, Account, Group, Organization, Signable};
use strongbox_core::{ErrorCode, OrgId, RecordKind, VaultId};
use strongbox_store::{Storage, StorageExt};
use strongbox_vault::Vault;
use tracing::{debug, info, warn};

use crate::api::RemoteApi;
use crate::error::{Result, SyncError};
use crate::events::{Notifier, SyncEvent};
use crate::queue::SyncQueue;

/// Default bound on conflict retries per sync.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Retries after a merge conflict before giving up.
    pub max_conflict_retries: u32,
    /// Buffered events per subscriber.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            event_capacity: 256,
        }
    }
}

/// Outcome of syncing one vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Pushed; the server now holds `revision`.
    Synced { revision: u64 },
    /// The vault no longer exists remotely and was purged locally.
    Deleted,
}

/// Result of syncing every reachable vault.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub synced: Vec<VaultId>,
    pub deleted: Vec<VaultId>,
    /// Local copies dropped because the account can no longer reach them.
    pub purged: Vec<VaultId>,
    pub failed: Vec<(VaultId, ErrorCode)>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Re-runnable change applied to a vault before each push attempt.
pub type VaultTransform<'a> = &'a (dyn Fn(&mut Vault) -> Result<()> + Send + Sync);

/// Re-runnable change applied to an organization before each push attempt.
pub type OrgTransform<'a> = &'a (dyn Fn(&mut Organization) -> Result<()> + Send + Sync);

#[derive(Default)]
struct EngineState {
    account: Option<Account>,
    orgs: HashMap<OrgId, Organization>,
    vaults: HashMap<VaultId, Vault>,
}

/// Reconciles local state with the server for one account.
pub struct SyncEngine<A, S> {
    api: A,
    storage: S,
    config: SyncConfig,
    notifier: Notifier,
    queue: SyncQueue<SyncStatus>,
    state: RwLock<EngineState>,
}

impl<A: RemoteApi, S: Storage> SyncEngine<A, S> {
    pub fn new(api: A, storage: S, config: SyncConfig) -> Self {
        let notifier = Notifier::new(config.event_capacity);
        Self {
            api,
            storage,
            config,
            notifier,
            queue: SyncQueue::new(),
            state: RwLock::new(EngineState::default()),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Whether any vault sync is active or queued.
    pub fn is_syncing(&self) -> bool {
        self.queue.is_syncing()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Session
    // ───────────────────────────────────────────────────────────────────────

    pub fn account(&self) -> Option<Account> {
        self.read().account.clone()
    }

    /// The unlocked account, or [`SyncError::Locked`].
    pub fn session(&self) -> Result<Account> {
        self.read()
            .account
            .clone()
            .filter(Account::is_unlocked)
            .ok_or(SyncError::Locked)
    }

    pub fn is_unlocked(&self) -> bool {
        self.read()
            .account
            .as_ref()
            .map_or(false, Account::is_unlocked)
    }

    /// Attach an unlocked account and restore its organizations and vaults
    /// from local storage.
    pub async fn unlock(&self, account: Account) -> Result<()> {
        if !account.is_unlocked() {
            return Err(SyncError::Locked);
        }
        let id = account.id.clone();
        self.storage.persist(&account).await?;
        self.write().account = Some(account);

        self.load_orgs(false).await?;
        self.load_vaults().await?;
        info!(account = %id, "unlocked");
        Ok(())
    }

    /// Drop every secret and every decrypted copy held in memory.
    pub fn lock(&self) {
        let mut state = self.write();
        if let Some(account) = state.account.as_mut() {
            account.lock();
        }
        state.orgs.clear();
        state.vaults.clear();
        debug!("locked");
    }

    /// Lock and forget all local data.
    pub async fn logout(&self) -> Result<()> {
        *self.write() = EngineState::default();
        self.storage.clear().await?;
        Ok(())
    }

    /// Refresh the account from the server.
    pub async fn fetch_account(&self) -> Result<Account> {
        let remote = self.api.get_account().await?;
        let account = {
            let mut state = self.write();
            let account = state.account.as_mut().ok_or(SyncError::Locked)?;
            account.refresh(remote);
            account.clone()
        };
        self.storage.persist(&account).await?;
        self.notifier.emit(SyncEvent::AccountChanged {
            account: account.id.clone(),
        });
        Ok(account)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Organizations
    // ───────────────────────────────────────────────────────────────────────

    pub fn org(&self, id: &OrgId) -> Option<Organization> {
        self.read().orgs.get(id).cloned()
    }

    pub fn orgs(&self) -> Vec<Organization> {
        self.read().orgs.values().cloned().collect()
    }

    /// Load every organization the account belongs to, from the server when
    /// `remote` is set and from local storage otherwise.
    ///
    /// Admins get their copy unlocked. Organizations the account has left
    /// are dropped.
    pub async fn load_orgs(&self, remote: bool) -> Result<()> {
        let account = self.session()?;
        let mut orgs = HashMap::new();

        for id in &account.orgs {
            let loaded = if remote {
                match self.api.get_org(id).await {
                    Ok(org) => Some(org),
                    Err(e) => {
                        warn!(org = %id, error = %e, "failed to fetch organization");
                        self.org(id)
                    }
                }
            } else {
                self.storage.load::<Organization>(id.as_str()).await?
            };
            let Some(mut org) = loaded else { continue };

            if org.is_admin(&account.id) && !org.is_unlocked() {
                if let Err(e) = org.unlock(&account) {
                    warn!(org = %id, error = %e, "failed to unlock organization");
                    continue;
                }
            }
            if remote {
                self.storage.persist(&org).await?;
            }
            orgs.insert(id.clone(), org);
        }

        if remote {
            for id in self.storage.list(RecordKind::Org).await? {
                if !orgs.contains_key(&OrgId::new(id.as_str())) {
                    debug!(org = %id, "dropping organization");
                    self.storage.delete(RecordKind::Org, &id).await?;
                }
            }
        }

        self.write().orgs = orgs;
        Ok(())
    }

    /// Cache and persist an organization the server has accepted.
    pub async fn save_org(&self, org: Organization) -> Result<Organization> {
        self.storage.persist(&org).await?;
        self.write().orgs.insert(org.id.clone(), org.clone());
        self.notifier.emit(SyncEvent::OrgChanged {
            org: org.id.clone(),
        });
        Ok(org)
    }

    /// Fetch the authoritative organization, apply `transform`, and push,
    /// starting over on merge conflicts.
    pub async fn update_org(&self, id: &OrgId, transform: OrgTransform<'_>) -> Result<Organization> {
        let account = self.session()?;
        let mut conflicts = 0;

        loop {
            let mut org = self.api.get_org(id).await?;
            if org.is_admin(&account.id) {
                org.unlock(&account)?;
            }
            transform(&mut org)?;

            match self.api.update_org(&org).await {
                Ok(revision) => {
                    org.revision = revision;
                    return self.save_org(org).await;
                }
                Err(e) if e.code == ErrorCode::MergeConflict => {
                    conflicts += 1;
                    self.check_conflicts(id.as_str(), conflicts)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Vaults
    // ───────────────────────────────────────────────────────────────────────

    pub fn vault(&self, id: &VaultId) -> Option<Vault> {
        self.read().vaults.get(id).cloned()
    }

    pub fn vaults(&self) -> Vec<Vault> {
        self.read().vaults.values().cloned().collect()
    }

    pub fn main_vault(&self) -> Option<Vault> {
        let state = self.read();
        let id = state.account.as_ref()?.main_vault.as_ref()?;
        state.vaults.get(id).cloned()
    }

    /// Restore vaults from local storage, unlocking each one. Vaults that
    /// cannot be unlocked are skipped.
    pub async fn load_vaults(&self) -> Result<()> {
        let account = self.session()?;
        let stored: Vec<Vault> = self.storage.load_all().await?;
        let mut vaults = HashMap::new();

        for mut vault in stored {
            if vault.owner.as_ref().map_or(false, |owner| owner != &account.id) {
                continue;
            }
            let org = match &vault.org {
                Some(org) => match self.org(&org.id) {
                    Some(org) => Some(org),
                    None => continue,
                },
                None => None,
            };
            match self.unlock_vault(&mut vault, &account, org.as_ref(), None) {
                Ok(()) => {
                    vaults.insert(vault.id.clone(), vault);
                }
                Err(e) => warn!(vault = %vault.id, error = %e, "skipping stored vault"),
            }
        }

        debug!(count = vaults.len(), "loaded vaults");
        self.write().vaults = vaults;
        Ok(())
    }

    /// Apply a local edit to the in-memory vault, then commit and persist it.
    /// The change reaches the server with the next sync.
    pub async fn edit_vault<R, F>(&self, id: &VaultId, edit: F) -> Result<R>
    where
        F: FnOnce(&mut Vault) -> Result<R>,
    {
        let (result, snapshot) = {
            let mut state = self.write();
            let vault = state
                .vaults
                .get_mut(id)
                .ok_or_else(|| SyncError::NotFound(format!("vault {}", id)))?;
            let result = edit(vault)?;
            vault.commit()?;
            (result, vault.clone())
        };
        self.storage.persist(&snapshot).await?;
        Ok(result)
    }

    /// Cache and persist a vault the server has accepted.
    pub async fn save_vault(&self, mut vault: Vault) -> Result<()> {
        vault.commit()?;
        self.storage.persist(&vault).await?;
        let id = vault.id.clone();
        self.write().vaults.insert(id.clone(), vault);
        self.notifier.emit(SyncEvent::VaultChanged { vault: id });
        Ok(())
    }

    /// Sync one vault.
    ///
    /// Plain requests are coalesced per vault. Requests that carry a
    /// `group` or a `transform` run their own attempt, serialized behind any
    /// other sync of the same vault.
    ///
    /// `group` overrides the unlocking group, e.g. a pre-rotation copy of
    /// Admins after group keys changed.
    pub async fn sync_vault(
        &self,
        id: &VaultId,
        group: Option<&Group>,
        transform: Option<VaultTransform<'_>>,
    ) -> Result<SyncStatus> {
        let attempt = move || async move {
            self.notifier.emit(SyncEvent::StartSync {
                id: id.to_string(),
            });
            let result = self.sync_vault_with_retries(id, group, transform).await;
            self.notifier.emit(SyncEvent::FinishSync {
                id: id.to_string(),
            });
            result
        };

        if group.is_some() || transform.is_some() {
            self.queue.run_exclusive(id.as_str(), attempt).await
        } else {
            self.queue.run(id.as_str(), attempt).await
        }
    }

    /// Sync the main vault and every vault reachable through organization
    /// groups. Failures are isolated per vault.
    pub async fn sync_vaults(&self) -> Result<SyncReport> {
        let account = self.session()?;
        let mut targets: Vec<VaultId> = account.main_vault.iter().cloned().collect();
        for org in self.orgs() {
            for (vault, _) in org.vaults_for_member(&account.id) {
                targets.push(vault.id.clone());
            }
        }

        let mut report = SyncReport::default();
        for id in &targets {
            match self.sync_vault(id, None, None).await {
                Ok(SyncStatus::Synced { .. }) => report.synced.push(id.clone()),
                Ok(SyncStatus::Deleted) => report.deleted.push(id.clone()),
                Err(e) => {
                    warn!(vault = %id, error = %e, "vault sync failed");
                    report.failed.push((id.clone(), e.code()));
                }
            }
        }

        let unreachable: Vec<VaultId> = self
            .read()
            .vaults
            .keys()
            .filter(|id| !targets.contains(id))
            .cloned()
            .collect();
        for id in unreachable {
            debug!(vault = %id, "purging unreachable vault");
            match self.purge_vault(&id).await {
                Ok(()) => report.purged.push(id),
                Err(e) => {
                    warn!(vault = %id, error = %e, "failed to purge vault");
                    report.failed.push((id, e.code()));
                }
            }
        }

        Ok(report)
    }

    /// Refresh the account, reload organizations from the server, and sync
    /// every reachable vault.
    pub async fn synchronize(&self) -> Result<SyncReport> {
        self.fetch_account().await?;
        self.load_orgs(true).await?;
        let report = self.sync_vaults().await?;
        info!(
            synced = report.synced.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "synchronized"
        );
        Ok(report)
    }

    async fn sync_vault_with_retries(
        &self,
        id: &VaultId,
        group: Option<&Group>,
        transform: Option<VaultTransform<'_>>,
    ) -> Result<SyncStatus> {
        let mut conflicts = 0;
        loop {
            match self.try_sync_vault(id, group, transform).await {
                Err(e) if e.is_conflict() => {
                    conflicts += 1;
                    self.check_conflicts(id.as_str(), conflicts)?;
                }
                other => return other,
            }
        }
    }

    async fn try_sync_vault(
        &self,
        id: &VaultId,
        group: Option<&Group>,
        transform: Option<VaultTransform<'_>>,
    ) -> Result<SyncStatus> {
        let account = self.session()?;

        let mut vault = match self.api.get_vault(id).await {
            Ok(vault) => vault,
            Err(e) if e.code == ErrorCode::NotFound => {
                debug!(vault = %id, "vault deleted remotely");
                self.purge_vault(id).await?;
                return Ok(SyncStatus::Deleted);
            }
            Err(e) => return Err(e.into()),
        };

        let org = match &vault.org {
            Some(org) => Some(
                self.org(&org.id)
                    .ok_or_else(|| SyncError::NotFound(format!("organization {}", org.id)))?,
            ),
            None => None,
        };
        self.unlock_vault(&mut vault, &account, org.as_ref(), group)?;

        if let Some(local) = self.vault(id) {
            if local.is_unlocked() {
                vault.merge(&local)?;
            } else {
                warn!(vault = %id, "local copy is locked, using remote only");
            }
        }

        if let Some(org) = &org {
            let groups = org.groups_for_vault(id);
            org.verify_all(&signables(&groups))?;
            vault.update_accessors(&accessors(&groups))?;
        }

        if let Some(transform) = transform {
            transform(&mut vault)?;
        }
        vault.commit()?;

        let revision = self.api.update_vault(&vault).await?;
        vault.revision = revision;

        let snapshot = {
            let mut state = self.write();
            if let Some(current) = state.vaults.get(id).filter(|v| v.is_unlocked()) {
                // Edits made while the push was in flight.
                vault.merge(current)?;
                vault.commit()?;
            }
            state.vaults.insert(id.clone(), vault.clone());
            vault
        };
        self.storage.persist(&snapshot).await?;

        debug!(vault = %id, revision, "vault synced");
        self.notifier.emit(SyncEvent::VaultChanged { vault: id.clone() });
        Ok(SyncStatus::Synced { revision })
    }

    fn unlock_vault(
        &self,
        vault: &mut Vault,
        account: &Account,
        org: Option<&Organization>,
        group: Option<&Group>,
    ) -> Result<()> {
        let Some(org) = org else {
            if vault.accessor_ids().next().is_none() && vault.owner.as_ref() == Some(&account.id) {
                debug!(vault = %vault.id, "provisioning personal vault");
                vault.update_accessors(&[account as &dyn Accessor])?;
            }
            vault.unlock(account)?;
            return Ok(());
        };

        if let Some(group) = group {
            match unlock_with_group(vault, account, group) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(vault = %vault.id, group = %group.id, error = %e, "falling back to member group")
                }
            }
        }

        let group = org
            .unlocking_group_for_vault(&vault.id, &account.id)
            .ok_or_else(|| {
                AccessError::AccessDenied(format!(
                    "{} has no group granting vault {}",
                    account.id, vault.id
                ))
            })?;
        unlock_with_group(vault, account, group)
    }

    async fn purge_vault(&self, id: &VaultId) -> Result<()> {
        self.storage.delete(RecordKind::Vault, id.as_str()).await?;
        let removed = self.write().vaults.remove(id).is_some();
        if removed {
            self.notifier.emit(SyncEvent::VaultChanged { vault: id.clone() });
        }
        Ok(())
    }

    fn check_conflicts(&self, id: &str, conflicts: u32) -> Result<()> {
        let retries = self.config.max_conflict_retries;
        if conflicts > retries {
            warn!(id, retries, "giving up after repeated merge conflicts");
            return Err(SyncError::ConflictRetriesExhausted {
                id: id.to_owned(),
                retries,
            });
        }
        debug!(id, attempt = conflicts + 1, "merge conflict, starting over");
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unlock_with_group(vault: &mut Vault, account: &Account, group: &Group) -> Result<()> {
    let mut group = group.clone();
    if !group.is_unlocked() {
        group.unlock(account)?;
    }
    vault.unlock(&group)?;
    Ok(())
}

fn accessors<'a>(groups: &[&'a Group]) -> Vec<&'a dyn Accessor> {
    groups.iter().map(|g| *g as &dyn Accessor).collect()
}

fn signables<'a>(groups: &[&'a Group]) -> Vec<&'a dyn Signable> {
    groups.iter().map(|g| *g as &dyn Signable).collect()
}
