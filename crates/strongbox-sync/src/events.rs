//! Change notifications.
//!
//! The engine and client publish [`SyncEvent`]s through an injected
//! [`Notifier`]. Subscribers that fall behind lose the oldest events.

use strongbox_core::{AccountId, InviteId, ItemId, OrgId, VaultId};
use tokio::sync::broadcast;

/// Something observable changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    VaultChanged { vault: VaultId },
    VaultCreated { vault: VaultId },
    OrgChanged { org: OrgId },
    ItemChanged { vault: VaultId, item: ItemId },
    ItemsAdded { vault: VaultId, items: Vec<ItemId> },
    ItemsDeleted { vault: VaultId, items: Vec<ItemId> },
    StartSync { id: String },
    FinishSync { id: String },
    Synchronized,
    AccountChanged { account: AccountId },
    InviteCreated { org: OrgId, invite: InviteId },
}

/// Broadcast fan-out for [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<SyncEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SyncEvent) {
        tracing::trace!(?event, "emit");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.emit(SyncEvent::Synchronized);
        notifier.emit(SyncEvent::VaultChanged {
            vault: VaultId::new("v1"),
        });

        assert_eq!(rx.recv().await.unwrap(), SyncEvent::Synchronized);
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::VaultChanged {
                vault: VaultId::new("v1")
            }
        );
    }

    #[test]
    fn test_emit_without_subscribers() {
        Notifier::new(0).emit(SyncEvent::Synchronized);
    }
}
