//! Client configuration and persisted app state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strongbox_access::{Account, InviteConfig};
use strongbox_core::{RecordKind, Storable, Timestamp};
use strongbox_sync::SyncConfig;

/// Configuration for the client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Sync engine configuration.
    pub sync: SyncConfig,
    /// Invite lifetime.
    pub invites: InviteConfig,
    /// Whether groups granted a new organization vault get read-only access.
    /// Admins always get read-write access.
    pub default_vault_groups_readonly: bool,
}

/// User preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub auto_lock: bool,
    pub auto_lock_delay: Duration,
    pub sync_interval: Duration,
    pub custom_server_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_lock: true,
            auto_lock_delay: Duration::from_secs(5 * 60),
            sync_interval: Duration::from_secs(60),
            custom_server_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Completion time of the last full synchronization.
    pub last_sync: Option<Timestamp>,
}

/// Local app state. The account is stored without its secret key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppState {
    pub account: Option<Account>,
    pub settings: Settings,
    pub stats: Stats,
}

impl AppState {
    pub const STORAGE_ID: &'static str = "app-state";
}

impl Storable for AppState {
    const KIND: RecordKind = RecordKind::AppState;

    fn storage_id(&self) -> String {
        Self::STORAGE_ID.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongbox_core::{from_cbor, to_cbor};

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.sync.max_conflict_retries, 5);
        assert_eq!(config.invites.ttl, Duration::from_secs(7 * 24 * 60 * 60));
        assert!(!config.default_vault_groups_readonly);

        let settings = Settings::default();
        assert!(settings.auto_lock);
        assert!(settings.custom_server_url.is_none());
    }

    #[test]
    fn test_app_state_drops_account_secret() {
        let state = AppState {
            account: Some(Account::generate("alice", "alice@example.com")),
            ..AppState::default()
        };
        assert!(state.account.as_ref().unwrap().is_unlocked());

        let restored: AppState = from_cbor(&to_cbor(&state).unwrap()).unwrap();
        let account = restored.account.unwrap();
        assert_eq!(account.id, state.account.unwrap().id);
        assert!(!account.is_unlocked());
    }
}
