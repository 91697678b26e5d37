//! Remote API abstraction.
//!
//! The server stores accounts, organizations, and vaults in their sealed
//! form and enforces optimistic concurrency through revision numbers. It
//! never sees a content key or identity secret.
//!
//! Implementations may use HTTP or any other transport.

use async_trait::async_trait;
use strongbox_access::{Account, Invite, Organization};
use strongbox_core::{InviteId, OrgId, VaultId};
use strongbox_vault::Vault;

use crate::error::ApiError;

/// Result type for remote API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// The server as seen by one signed-in account.
///
/// Writes carry the revision the client last saw. A stale revision fails
/// with [`ErrorCode::MergeConflict`](strongbox_core::ErrorCode::MergeConflict);
/// a successful write returns the new revision.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// The signed-in account.
    async fn get_account(&self) -> ApiResult<Account>;

    /// Update the public profile of the signed-in account.
    async fn update_account(&self, account: &Account) -> ApiResult<()>;

    async fn get_vault(&self, id: &VaultId) -> ApiResult<Vault>;

    async fn update_vault(&self, vault: &Vault) -> ApiResult<u64>;

    async fn create_vault(&self, vault: &Vault) -> ApiResult<u64>;

    /// Delete a vault. Organization vaults are also dropped from the
    /// organization's vault list and every group grant.
    async fn delete_vault(&self, id: &VaultId) -> ApiResult<()>;

    async fn get_org(&self, id: &OrgId) -> ApiResult<Organization>;

    async fn update_org(&self, org: &Organization) -> ApiResult<u64>;

    async fn create_org(&self, org: &Organization) -> ApiResult<u64>;

    /// Fetch an invite. Available to anyone holding its id.
    async fn get_invite(&self, org: &OrgId, id: &InviteId) -> ApiResult<Invite>;

    /// Submit an accepted invite. Only the invitee data is taken over.
    async fn accept_invite(&self, invite: &Invite) -> ApiResult<()>;
}

/// An in-memory server for tests and local development.
///
/// Every stored value passes through CBOR on the way in, so the server only
/// ever holds the sealed form of what clients send.
pub mod memory {
    use super::*;
    use serde::{de::DeserializeOwned, Serialize};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use strongbox_core::{from_cbor, to_cbor, AccountId, ErrorCode};

    fn wire<T: Serialize + DeserializeOwned>(value: &T) -> ApiResult<T> {
        Ok(from_cbor(&to_cbor(value)?)?)
    }

    #[derive(Default)]
    struct ServerState {
        accounts: HashMap<AccountId, Account>,
        orgs: HashMap<OrgId, Organization>,
        vaults: HashMap<VaultId, Vault>,
    }

    impl ServerState {
        /// Keep every account's org list in step with membership.
        fn sync_memberships(&mut self, org: &Organization) {
            for account in self.accounts.values_mut() {
                let member = org.is_member(&account.id);
                let listed = account.orgs.contains(&org.id);
                if member && !listed {
                    account.orgs.push(org.id.clone());
                } else if !member && listed {
                    account.orgs.retain(|id| id != &org.id);
                }
            }
        }
    }

    /// Shared server state. Hand out one [`MemoryClient`] per account.
    #[derive(Default)]
    pub struct MemoryServer {
        state: Mutex<ServerState>,
    }

    impl MemoryServer {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Register an account and provision its empty main vault.
        ///
        /// Returns the stored account with `main_vault` set. The vault has
        /// no accessors until its owner first syncs it.
        pub fn register_account(&self, account: &Account) -> ApiResult<Account> {
            let mut state = self.lock();
            if state.accounts.contains_key(&account.id) {
                return Err(ApiError::new(
                    ErrorCode::InvalidData,
                    format!("account {} already exists", account.id),
                ));
            }

            let vault = Vault::new("My Vault", Some(account.id.clone()), None);
            let mut stored = wire(account)?;
            stored.main_vault = Some(vault.id.clone());
            stored.orgs.clear();

            state.vaults.insert(vault.id.clone(), wire(&vault)?);
            state.accounts.insert(stored.id.clone(), stored.clone());
            Ok(stored)
        }

        /// A client session for `account`.
        pub fn connect(self: &Arc<Self>, account: &AccountId) -> MemoryClient {
            MemoryClient {
                server: Arc::clone(self),
                account: account.clone(),
            }
        }

        /// Current server revision of a vault.
        pub fn vault_revision(&self, id: &VaultId) -> Option<u64> {
            self.lock().vaults.get(id).map(|v| v.revision)
        }

        /// Current server revision of an organization.
        pub fn org_revision(&self, id: &OrgId) -> Option<u64> {
            self.lock().orgs.get(id).map(|o| o.revision)
        }

        /// Sealed server copy of a vault.
        pub fn vault(&self, id: &VaultId) -> Option<Vault> {
            self.lock().vaults.get(id).cloned()
        }

        fn lock(&self) -> MutexGuard<'_, ServerState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// An authenticated session against a [`MemoryServer`].
    #[derive(Clone)]
    pub struct MemoryClient {
        server: Arc<MemoryServer>,
        account: AccountId,
    }

    impl MemoryClient {
        pub fn server(&self) -> &Arc<MemoryServer> {
            &self.server
        }

        fn can_read_vault(&self, state: &ServerState, vault: &Vault) -> bool {
            match &vault.org {
                Some(org) => state
                    .orgs
                    .get(&org.id)
                    .map_or(false, |o| o.is_member(&self.account)),
                None => vault.owner.as_ref() == Some(&self.account),
            }
        }
    }

    #[async_trait]
    impl RemoteApi for MemoryClient {
        async fn get_account(&self) -> ApiResult<Account> {
            let state = self.server.lock();
            state
                .accounts
                .get(&self.account)
                .cloned()
                .ok_or_else(|| ApiError::not_found(format!("account {}", self.account)))
        }

        async fn update_account(&self, account: &Account) -> ApiResult<()> {
            if account.id != self.account {
                return Err(ApiError::access_denied("cannot update another account"));
            }
            let mut state = self.server.lock();
            let stored = state
                .accounts
                .get_mut(&self.account)
                .ok_or_else(|| ApiError::not_found(format!("account {}", self.account)))?;

            let incoming = wire(account)?;
            stored.name = incoming.name;
            stored.email = incoming.email;
            Ok(())
        }

        async fn get_vault(&self, id: &VaultId) -> ApiResult<Vault> {
            let state = self.server.lock();
            let vault = state
                .vaults
                .get(id)
                .ok_or_else(|| ApiError::not_found(format!("vault {}", id)))?;
            if !self.can_read_vault(&state, vault) {
                return Err(ApiError::access_denied(format!("no access to vault {}", id)));
            }
            Ok(vault.clone())
        }

        async fn update_vault(&self, vault: &Vault) -> ApiResult<u64> {
            let mut state = self.server.lock();
            let stored = state
                .vaults
                .get(&vault.id)
                .ok_or_else(|| ApiError::not_found(format!("vault {}", vault.id)))?;
            if !self.can_read_vault(&state, stored) {
                return Err(ApiError::access_denied(format!(
                    "no access to vault {}",
                    vault.id
                )));
            }
            if stored.revision != vault.revision {
                return Err(ApiError::conflict(format!("vault {}", vault.id)));
            }

            let mut incoming = wire(vault)?;
            incoming.revision = vault.revision + 1;
            let revision = incoming.revision;
            state.vaults.insert(vault.id.clone(), incoming);
            Ok(revision)
        }

        async fn create_vault(&self, vault: &Vault) -> ApiResult<u64> {
            let mut state = self.server.lock();
            if state.vaults.contains_key(&vault.id) {
                return Err(ApiError::conflict(format!("vault {}", vault.id)));
            }
            match &vault.org {
                Some(org) => {
                    let admin = state
                        .orgs
                        .get(&org.id)
                        .map_or(false, |o| o.is_admin(&self.account));
                    if !admin {
                        return Err(ApiError::access_denied(
                            "only admins can create organization vaults",
                        ));
                    }
                }
                None if vault.owner.as_ref() != Some(&self.account) => {
                    return Err(ApiError::access_denied("vault owner must be the caller"));
                }
                None => {}
            }

            let incoming = wire(vault)?;
            let revision = incoming.revision;
            state.vaults.insert(vault.id.clone(), incoming);
            Ok(revision)
        }

        async fn delete_vault(&self, id: &VaultId) -> ApiResult<()> {
            let mut state = self.server.lock();
            let vault = state
                .vaults
                .get(id)
                .ok_or_else(|| ApiError::not_found(format!("vault {}", id)))?;

            let allowed = match &vault.org {
                Some(org) => state
                    .orgs
                    .get(&org.id)
                    .map_or(false, |o| o.is_admin(&self.account)),
                None => false,
            };
            if !allowed {
                return Err(ApiError::access_denied(format!(
                    "cannot delete vault {}",
                    id
                )));
            }

            let org_id = vault.org.as_ref().map(|o| o.id.clone());
            state.vaults.remove(id);
            let org = match org_id {
                Some(org_id) => state.orgs.get_mut(&org_id),
                None => None,
            };
            if let Some(org) = org {
                org.vaults.retain(|v| &v.id != id);
                org.admins.revoke_vault(id);
                org.everyone.revoke_vault(id);
                for group in org.groups.iter_mut() {
                    group.revoke_vault(id);
                }
                org.revision += 1;
            }
            Ok(())
        }

        async fn get_org(&self, id: &OrgId) -> ApiResult<Organization> {
            let state = self.server.lock();
            let org = state
                .orgs
                .get(id)
                .ok_or_else(|| ApiError::not_found(format!("organization {}", id)))?;
            if !org.is_member(&self.account) {
                return Err(ApiError::access_denied(format!(
                    "not a member of organization {}",
                    id
                )));
            }
            Ok(org.clone())
        }

        async fn update_org(&self, org: &Organization) -> ApiResult<u64> {
            let mut state = self.server.lock();
            let stored = state
                .orgs
                .get(&org.id)
                .ok_or_else(|| ApiError::not_found(format!("organization {}", org.id)))?;
            if !stored.is_admin(&self.account) {
                return Err(ApiError::access_denied(format!(
                    "not an admin of organization {}",
                    org.id
                )));
            }
            if stored.revision != org.revision {
                return Err(ApiError::conflict(format!("organization {}", org.id)));
            }

            let mut incoming = wire(org)?;
            incoming.revision = org.revision + 1;
            let revision = incoming.revision;
            state.sync_memberships(&incoming);
            state.orgs.insert(org.id.clone(), incoming);
            Ok(revision)
        }

        async fn create_org(&self, org: &Organization) -> ApiResult<u64> {
            let mut state = self.server.lock();
            if state.orgs.contains_key(&org.id) {
                return Err(ApiError::conflict(format!("organization {}", org.id)));
            }
            if org.owner != self.account {
                return Err(ApiError::access_denied(
                    "organization owner must be the caller",
                ));
            }

            let incoming = wire(org)?;
            let revision = incoming.revision;
            state.sync_memberships(&incoming);
            state.orgs.insert(org.id.clone(), incoming);
            Ok(revision)
        }

        async fn get_invite(&self, org: &OrgId, id: &InviteId) -> ApiResult<Invite> {
            let state = self.server.lock();
            state
                .orgs
                .get(org)
                .and_then(|o| o.invite(id))
                .cloned()
                .ok_or_else(|| ApiError::not_found(format!("invite {}", id)))
        }

        async fn accept_invite(&self, invite: &Invite) -> ApiResult<()> {
            let mut state = self.server.lock();
            let org = state
                .orgs
                .get_mut(&invite.org.id)
                .ok_or_else(|| ApiError::not_found(format!("organization {}", invite.org.id)))?;
            let stored = org
                .invites
                .iter_mut()
                .find(|i| i.id == invite.id)
                .ok_or_else(|| ApiError::not_found(format!("invite {}", invite.id)))?;
            if stored.is_expired() {
                return Err(ApiError::new(
                    ErrorCode::InviteExpired,
                    format!("invite {} has expired", invite.id),
                ));
            }
            match &invite.invitee {
                Some(invitee) if invitee.id == self.account => {}
                _ => {
                    return Err(ApiError::access_denied(
                        "invite must be accepted by the caller",
                    ))
                }
            }

            stored.apply_acceptance(invite);
            org.revision += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryServer;
    use super::*;
    use strongbox_core::ErrorCode;

    fn account(name: &str) -> Account {
        Account::generate(name, format!("{}@example.com", name))
    }

    #[tokio::test]
    async fn test_register_provisions_main_vault() {
        let server = MemoryServer::new();
        let alice = account("alice");
        let stored = server.register_account(&alice).unwrap();
        let client = server.connect(&alice.id);

        let main = stored.main_vault.clone().unwrap();
        let vault = client.get_vault(&main).await.unwrap();
        assert_eq!(vault.owner.as_ref(), Some(&alice.id));
        assert_eq!(vault.accessor_ids().count(), 0);
        assert!(!vault.is_unlocked());

        let fetched = client.get_account().await.unwrap();
        assert_eq!(fetched.main_vault, Some(main));
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let server = MemoryServer::new();
        let alice = account("alice");
        let main = server.register_account(&alice).unwrap().main_vault.unwrap();
        let client = server.connect(&alice.id);

        let vault = client.get_vault(&main).await.unwrap();
        assert_eq!(client.update_vault(&vault).await.unwrap(), 1);

        let err = client.update_vault(&vault).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MergeConflict);
        assert_eq!(server.vault_revision(&main), Some(1));
    }

    #[tokio::test]
    async fn test_vaults_are_private() {
        let server = MemoryServer::new();
        let alice = account("alice");
        let bob = account("bob");
        let main = server.register_account(&alice).unwrap().main_vault.unwrap();
        server.register_account(&bob).unwrap();

        let err = server.connect(&bob.id).get_vault(&main).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AccessDenied);

        let err = server
            .connect(&bob.id)
            .get_vault(&VaultId::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_org_membership_tracks_accounts() {
        let server = MemoryServer::new();
        let alice = account("alice");
        let bob = account("bob");
        server.register_account(&alice).unwrap();
        server.register_account(&bob).unwrap();
        let client = server.connect(&alice.id);

        let mut org = Organization::new("Acme", alice.id.clone());
        org.initialize(&alice).unwrap();
        org.revision = client.create_org(&org).await.unwrap();
        assert_eq!(client.get_account().await.unwrap().orgs, vec![org.id.clone()]);

        org.add_member(bob.to_member()).unwrap();
        org.revision = client.update_org(&org).await.unwrap();
        let bob_client = server.connect(&bob.id);
        assert_eq!(bob_client.get_account().await.unwrap().orgs, vec![org.id.clone()]);
        assert!(bob_client.get_org(&org.id).await.is_ok());

        org.remove_member(&bob.id).unwrap();
        client.update_org(&org).await.unwrap();
        assert!(bob_client.get_account().await.unwrap().orgs.is_empty());
        assert_eq!(
            bob_client.get_org(&org.id).await.unwrap_err().code,
            ErrorCode::AccessDenied
        );
    }

    #[tokio::test]
    async fn test_only_admins_update_orgs() {
        let server = MemoryServer::new();
        let alice = account("alice");
        let bob = account("bob");
        server.register_account(&alice).unwrap();
        server.register_account(&bob).unwrap();

        let mut org = Organization::new("Acme", alice.id.clone());
        org.initialize(&alice).unwrap();
        org.add_member(bob.to_member()).unwrap();
        server.connect(&alice.id).create_org(&org).await.unwrap();

        let bob_client = server.connect(&bob.id);
        let fetched = bob_client.get_org(&org.id).await.unwrap();
        assert_eq!(
            bob_client.update_org(&fetched).await.unwrap_err().code,
            ErrorCode::AccessDenied
        );
    }
}
