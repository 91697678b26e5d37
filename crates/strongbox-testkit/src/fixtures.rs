//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use strongbox::{Client, ClientConfig};
use strongbox_access::{Account, Invite, Organization};
use strongbox_core::{ErrorCode, InviteId, OrgId, VaultId};
use strongbox_store::MemoryStorage;
use strongbox_sync::memory::{MemoryClient, MemoryServer};
use strongbox_sync::{ApiError, ApiResult, RemoteApi};
use strongbox_vault::{Vault, VaultItem};
use tokio::sync::watch;

/// A client talking to a [`MemoryServer`] with in-memory storage.
pub type TestClient = Client<MemoryClient, MemoryStorage>;

/// A shared in-memory server.
pub struct ServerFixture {
    pub server: Arc<MemoryServer>,
    pub config: ClientConfig,
}

impl ServerFixture {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            server: MemoryServer::new(),
            config,
        }
    }

    /// Generate and register an account. The result is unlocked and knows
    /// its main vault.
    pub fn register(&self, name: &str) -> Account {
        let mut account = Account::generate(name, format!("{}@example.com", name));
        let stored = self
            .server
            .register_account(&account)
            .expect("register account");
        account.refresh(stored);
        account
    }

    /// A fresh device for `account`, not yet signed in.
    pub fn device(&self, account: &Account) -> TestClient {
        Client::new(
            self.server.connect(&account.id),
            MemoryStorage::new(),
            self.config.clone(),
        )
    }

    /// Register `name` and sign in on a fresh device.
    pub async fn login(&self, name: &str) -> (Account, TestClient) {
        let account = self.register(name);
        let client = self.device(&account);
        client.login(account.clone()).await.expect("login");
        (account, client)
    }
}

impl Default for ServerFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a [`RemoteApi`] and rejects the next `conflicts` vault pushes with
/// a merge conflict, as if another device had written first.
pub struct ConflictingApi<A> {
    inner: A,
    remaining: AtomicU32,
    pushes: AtomicU32,
}

impl<A> ConflictingApi<A> {
    pub fn new(inner: A, conflicts: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(conflicts),
            pushes: AtomicU32::new(0),
        }
    }

    /// Vault pushes attempted so far, rejected ones included.
    pub fn pushes(&self) -> u32 {
        self.pushes.load(Ordering::SeqCst)
    }

    /// Reject the next `conflicts` pushes.
    pub fn inject(&self, conflicts: u32) {
        self.remaining.store(conflicts, Ordering::SeqCst);
    }

    fn take_conflict(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<A: RemoteApi> RemoteApi for ConflictingApi<A> {
    async fn get_account(&self) -> ApiResult<Account> {
        self.inner.get_account().await
    }

    async fn update_account(&self, account: &Account) -> ApiResult<()> {
        self.inner.update_account(account).await
    }

    async fn get_vault(&self, id: &VaultId) -> ApiResult<Vault> {
        self.inner.get_vault(id).await
    }

    async fn update_vault(&self, vault: &Vault) -> ApiResult<u64> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.take_conflict() {
            return Err(ApiError::conflict(format!("vault {}", vault.id)));
        }
        self.inner.update_vault(vault).await
    }

    async fn create_vault(&self, vault: &Vault) -> ApiResult<u64> {
        self.inner.create_vault(vault).await
    }

    async fn delete_vault(&self, id: &VaultId) -> ApiResult<()> {
        self.inner.delete_vault(id).await
    }

    async fn get_org(&self, id: &OrgId) -> ApiResult<Organization> {
        self.inner.get_org(id).await
    }

    async fn update_org(&self, org: &Organization) -> ApiResult<u64> {
        self.inner.update_org(org).await
    }

    async fn create_org(&self, org: &Organization) -> ApiResult<u64> {
        self.inner.create_org(org).await
    }

    async fn get_invite(&self, org: &OrgId, id: &InviteId) -> ApiResult<Invite> {
        self.inner.get_invite(org, id).await
    }

    async fn accept_invite(&self, invite: &Invite) -> ApiResult<()> {
        self.inner.accept_invite(invite).await
    }
}

/// Wraps a [`RemoteApi`] and lets a second device of the same account
/// write to a vault just before the next push of it, so that push hits a
/// real revision conflict.
pub struct RacingApi<A> {
    inner: A,
    rival: A,
    account: Account,
    pending: Mutex<Option<VaultItem>>,
}

impl<A: RemoteApi> RacingApi<A> {
    /// `account` must be unlocked; the rival uses it to open the vault.
    pub fn new(inner: A, rival: A, account: Account) -> Self {
        Self {
            inner,
            rival,
            account,
            pending: Mutex::new(None),
        }
    }

    /// Have the rival add `item` right before the next vault push.
    pub fn race(&self, item: VaultItem) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(item);
    }

    async fn rival_write(&self, id: &VaultId, item: VaultItem) -> ApiResult<()> {
        let failed = |e: strongbox_vault::VaultError| ApiError::new(e.code(), e.to_string());
        let mut vault = self.rival.get_vault(id).await?;
        vault.unlock(&self.account).map_err(failed)?;
        vault
            .items_mut()
            .map_err(failed)?
            .update(item, Some(&self.account.id));
        vault.commit().map_err(failed)?;
        self.rival.update_vault(&vault).await?;
        Ok(())
    }
}

#[async_trait]
impl<A: RemoteApi> RemoteApi for RacingApi<A> {
    async fn get_account(&self) -> ApiResult<Account> {
        self.inner.get_account().await
    }

    async fn update_account(&self, account: &Account) -> ApiResult<()> {
        self.inner.update_account(account).await
    }

    async fn get_vault(&self, id: &VaultId) -> ApiResult<Vault> {
        self.inner.get_vault(id).await
    }

    async fn update_vault(&self, vault: &Vault) -> ApiResult<u64> {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(item) = pending {
            self.rival_write(&vault.id, item).await?;
        }
        self.inner.update_vault(vault).await
    }

    async fn create_vault(&self, vault: &Vault) -> ApiResult<u64> {
        self.inner.create_vault(vault).await
    }

    async fn delete_vault(&self, id: &VaultId) -> ApiResult<()> {
        self.inner.delete_vault(id).await
    }

    async fn get_org(&self, id: &OrgId) -> ApiResult<Organization> {
        self.inner.get_org(id).await
    }

    async fn update_org(&self, org: &Organization) -> ApiResult<u64> {
        self.inner.update_org(org).await
    }

    async fn create_org(&self, org: &Organization) -> ApiResult<u64> {
        self.inner.create_org(org).await
    }

    async fn get_invite(&self, org: &OrgId, id: &InviteId) -> ApiResult<Invite> {
        self.inner.get_invite(org, id).await
    }

    async fn accept_invite(&self, invite: &Invite) -> ApiResult<()> {
        self.inner.accept_invite(invite).await
    }
}

/// Wraps a [`RemoteApi`] and counts vault fetches and pushes. Fetches can
/// be held until released, so concurrent syncs pile up behind the first.
pub struct CountingApi<A> {
    inner: A,
    fetches: AtomicU32,
    pushes: AtomicU32,
    held: watch::Sender<bool>,
}

impl<A> CountingApi<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            fetches: AtomicU32::new(0),
            pushes: AtomicU32::new(0),
            held: watch::Sender::new(false),
        }
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> u32 {
        self.pushes.load(Ordering::SeqCst)
    }

    /// Block vault fetches until [`CountingApi::release`].
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }
}

#[async_trait]
impl<A: RemoteApi> RemoteApi for CountingApi<A> {
    async fn get_account(&self) -> ApiResult<Account> {
        self.inner.get_account().await
    }

    async fn update_account(&self, account: &Account) -> ApiResult<()> {
        self.inner.update_account(account).await
    }

    async fn get_vault(&self, id: &VaultId) -> ApiResult<Vault> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut held = self.held.subscribe();
        if held.wait_for(|held| !*held).await.is_err() {
            return Err(ApiError::new(ErrorCode::ServerError, "api dropped"));
        }
        self.inner.get_vault(id).await
    }

    async fn update_vault(&self, vault: &Vault) -> ApiResult<u64> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_vault(vault).await
    }

    async fn create_vault(&self, vault: &Vault) -> ApiResult<u64> {
        self.inner.create_vault(vault).await
    }

    async fn delete_vault(&self, id: &VaultId) -> ApiResult<()> {
        self.inner.delete_vault(id).await
    }

    async fn get_org(&self, id: &OrgId) -> ApiResult<Organization> {
        self.inner.get_org(id).await
    }

    async fn update_org(&self, org: &Organization) -> ApiResult<u64> {
        self.inner.update_org(org).await
    }

    async fn create_org(&self, org: &Organization) -> ApiResult<u64> {
        self.inner.create_org(org).await
    }

    async fn get_invite(&self, org: &OrgId, id: &InviteId) -> ApiResult<Invite> {
        self.inner.get_invite(org, id).await
    }

    async fn accept_invite(&self, invite: &Invite) -> ApiResult<()> {
        self.inner.accept_invite(invite).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_provisions_main_vault() {
        let fixture = ServerFixture::new();
        let (alice, client) = fixture.login("alice").await;

        let main = client.main_vault().unwrap();
        assert_eq!(Some(&main.id), alice.main_vault.as_ref());
        assert!(main.has_accessor(alice.id.as_str()));
        assert!(client.is_unlocked());
    }

    #[tokio::test]
    async fn test_conflicting_api_rejects_then_delegates() {
        let fixture = ServerFixture::new();
        let alice = fixture.register("alice");
        let api = ConflictingApi::new(fixture.server.connect(&alice.id), 1);
        let main = alice.main_vault.clone().unwrap();
        let vault = api.get_vault(&main).await.unwrap();

        let err = api.update_vault(&vault).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MergeConflict);
        assert_eq!(api.update_vault(&vault).await.unwrap(), vault.revision + 1);
        assert_eq!(api.pushes(), 2);
    }
}
