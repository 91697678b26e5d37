//! Organization invites.
//!
//! An admin creates an invite and hands the invitee a short secret out of
//! band. The secret is derived from the organization's invites key, so any
//! admin can recompute it. The invitee proves knowledge of the secret by
//! MACing their identity with a key derived from it, and the admin checks
//! that MAC before adding them as a member.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strongbox_core::{now_millis, AccountId, Digest, InviteId, OrgId, Timestamp};

use crate::crypto::BoxPublicKey;
use crate::error::{AccessError, Result};
use crate::identity::Account;
use crate::member::OrgMember;

/// Default lifetime of an invite.
pub const DEFAULT_INVITE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Length in bytes of the secret handed to the invitee (hex-encoded).
const SECRET_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InvitePurpose {
    #[default]
    JoinOrg,
    ConfirmMembership,
}

/// Invite settings.
#[derive(Debug, Clone)]
pub struct InviteConfig {
    pub ttl: Duration,
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_INVITE_TTL,
        }
    }
}

/// Back-reference to the inviting organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRef {
    pub id: OrgId,
    pub name: String,
}

/// Identity submitted by the invitee on accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitee {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub public_key: BoxPublicKey,
}

impl Invitee {
    fn mac_message(&self, invite: &InviteId) -> Vec<u8> {
        let mut message = Vec::new();
        for part in [
            invite.as_str(),
            self.id.as_str(),
            self.name.as_str(),
            self.email.as_str(),
        ] {
            message.extend_from_slice(part.as_bytes());
            message.push(0);
        }
        message.extend_from_slice(self.public_key.as_bytes());
        message
    }

    /// Unsigned member record for this invitee.
    pub fn to_member(&self) -> OrgMember {
        OrgMember::new(
            self.id.clone(),
            self.name.clone(),
            self.email.clone(),
            self.public_key,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: InviteId,
    pub org: OrgRef,
    pub email: String,
    pub purpose: InvitePurpose,
    pub invited_by: AccountId,
    pub created: Timestamp,
    pub expires: Timestamp,
    pub invitee: Option<Invitee>,

    secret_digest: Digest,
    invitee_mac: Option<Digest>,
}

impl Invite {
    /// Create an invite and return it with the secret for the invitee.
    pub(crate) fn create(
        org: OrgRef,
        email: String,
        purpose: InvitePurpose,
        invited_by: AccountId,
        invites_key: &[u8; 32],
        ttl: Duration,
    ) -> (Self, String) {
        let id = InviteId::generate();
        let secret = derive_secret(invites_key, &id);
        let created = now_millis();

        let invite = Self {
            id,
            org,
            email,
            purpose,
            invited_by,
            created,
            expires: created.saturating_add(ttl.as_millis() as u64),
            invitee: None,
            secret_digest: Digest::hash(secret.as_bytes()),
            invitee_mac: None,
        };
        (invite, secret)
    }

    pub fn is_expired(&self) -> bool {
        now_millis() > self.expires
    }

    pub fn is_accepted(&self) -> bool {
        self.invitee.is_some()
    }

    /// Accept on behalf of `account`.
    ///
    /// Returns `Ok(false)` when the secret is wrong.
    pub fn accept(&mut self, account: &Account, secret: &str) -> Result<bool> {
        if self.is_expired() {
            return Err(AccessError::InviteExpired(self.id.clone()));
        }
        if !Digest::hash(secret.as_bytes()).ct_eq(&self.secret_digest) {
            return Ok(false);
        }

        let invitee = Invitee {
            id: account.id.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            public_key: account.public_key,
        };
        self.invitee_mac = Some(Digest::keyed(
            &mac_key(secret),
            &invitee.mac_message(&self.id),
        ));
        self.invitee = Some(invitee);
        Ok(true)
    }

    /// Check that the invitee data was submitted by someone holding
    /// `secret` and has not been altered since.
    pub fn verify_invitee(&self, secret: &str) -> Result<&Invitee> {
        let (invitee, mac) = match (&self.invitee, &self.invitee_mac) {
            (Some(invitee), Some(mac)) => (invitee, mac),
            _ => {
                return Err(AccessError::InvalidInvite(format!(
                    "invite {} has not been accepted",
                    self.id
                )))
            }
        };

        let expected = Digest::keyed(&mac_key(secret), &invitee.mac_message(&self.id));
        if !expected.ct_eq(mac) {
            return Err(AccessError::PublicKeyMismatch(format!(
                "invitee data on invite {} failed verification",
                self.id
            )));
        }
        Ok(invitee)
    }

    /// Copy the invitee submission from an accepted copy of this invite.
    pub fn apply_acceptance(&mut self, accepted: &Invite) {
        self.invitee = accepted.invitee.clone();
        self.invitee_mac = accepted.invitee_mac;
    }
}

/// The invitee secret for `id`, recomputable by any admin.
pub(crate) fn derive_secret(invites_key: &[u8; 32], id: &InviteId) -> String {
    let digest = Digest::keyed(invites_key, id.as_str().as_bytes());
    hex::encode(&digest.as_bytes()[..SECRET_LEN])
}

fn mac_key(secret: &str) -> [u8; 32] {
    blake3::derive_key("strongbox-access-v1 invite mac", secret.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(ttl: Duration) -> (Invite, String) {
        Invite::create(
            OrgRef {
                id: OrgId::new("org-1"),
                name: "Acme".into(),
            },
            "bob@example.com".into(),
            InvitePurpose::JoinOrg,
            AccountId::new("alice"),
            &[9u8; 32],
            ttl,
        )
    }

    #[test]
    fn test_secret_is_recomputable() {
        let (invite, secret) = invite(DEFAULT_INVITE_TTL);
        assert_eq!(derive_secret(&[9u8; 32], &invite.id), secret);
        assert_eq!(secret.len(), SECRET_LEN * 2);
    }

    #[test]
    fn test_accept_and_verify() {
        let (mut invite, secret) = invite(DEFAULT_INVITE_TTL);
        let bob = Account::generate("bob", "bob@example.com");

        assert!(!invite.accept(&bob, "wrong").unwrap());
        assert!(!invite.is_accepted());

        assert!(invite.accept(&bob, &secret).unwrap());
        let invitee = invite.verify_invitee(&secret).unwrap();
        assert_eq!(invitee.id, bob.id);
    }

    #[test]
    fn test_swapped_invitee_key_rejected() {
        let (mut invite, secret) = invite(DEFAULT_INVITE_TTL);
        let bob = Account::generate("bob", "bob@example.com");
        invite.accept(&bob, &secret).unwrap();

        let mallory = Account::generate("mallory", "bob@example.com");
        if let Some(invitee) = invite.invitee.as_mut() {
            invitee.public_key = mallory.public_key;
        }

        assert!(matches!(
            invite.verify_invitee(&secret),
            Err(AccessError::PublicKeyMismatch(_))
        ));
    }

    #[test]
    fn test_expired_invite() {
        let (mut invite, secret) = invite(Duration::ZERO);
        invite.expires = invite.created.saturating_sub(1);
        let bob = Account::generate("bob", "bob@example.com");

        assert!(matches!(
            invite.accept(&bob, &secret),
            Err(AccessError::InviteExpired(_))
        ));
    }

    #[test]
    fn test_unaccepted_invite_cannot_be_verified() {
        let (invite, secret) = invite(DEFAULT_INVITE_TTL);
        assert!(matches!(
            invite.verify_invitee(&secret),
            Err(AccessError::InvalidInvite(_))
        ));
    }
}
