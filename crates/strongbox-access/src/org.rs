//! Organizations.
//!
//! An organization is the trust root for a set of members and groups. It
//! signs every member's and group's public key with its Ed25519 key, and
//! those signatures are checked before any key is used to grant access.
//!
//! The organization's own container holds its signing secret and invites
//! key. Its only accessor is the Admins group, so unlocking an organization
//! means unlocking Admins with an account and then the container with
//! Admins.

use serde::{Deserialize, Serialize};
use std::iter;
use strongbox_core::{
    from_cbor, random_bytes, to_cbor, AccountId, GroupId, InviteId, OrgId, RecordKind,
    SigningKeypair, SigningPublicKey, Storable, VaultId,
};

use crate::container::Container;
use crate::error::{AccessError, Result};
use crate::group::Group;
use crate::identity::{Account, Accessor, Signable};
use crate::invite::{derive_secret, Invite, InviteConfig, InvitePurpose, OrgRef};
use crate::member::OrgMember;
use crate::secret::Transient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    #[default]
    Ed25519,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SigningParams {
    pub algorithm: SigningAlgorithm,
}

/// A vault owned by an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRef {
    pub id: VaultId,
    pub name: String,
}

#[derive(Clone)]
struct OrgSecrets {
    signing: SigningKeypair,
    invites_key: [u8; 32],
}

#[derive(Serialize, Deserialize)]
struct SealedSecrets {
    signing_seed: [u8; 32],
    invites_key: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub owner: AccountId,

    /// `None` until [`Organization::initialize`].
    pub public_key: Option<SigningPublicKey>,
    pub signing_params: SigningParams,

    pub members: Vec<OrgMember>,
    pub groups: Vec<Group>,
    pub admins: Group,
    pub everyone: Group,
    pub vaults: Vec<VaultRef>,
    pub invites: Vec<Invite>,

    /// Server-assigned concurrency counter.
    pub revision: u64,

    container: Container,

    #[serde(skip)]
    secrets: Transient<OrgSecrets>,
}

impl Organization {
    pub fn new(name: impl Into<String>, owner: AccountId) -> Self {
        Self {
            id: OrgId::generate(),
            name: name.into(),
            owner,
            public_key: None,
            signing_params: SigningParams::default(),
            members: Vec::new(),
            groups: Vec::new(),
            admins: Group::new("Admins"),
            everyone: Group::new("Everyone"),
            vaults: Vec::new(),
            invites: Vec::new(),
            revision: 0,
            container: Container::new(),
            secrets: Transient::empty(),
        }
    }

    pub fn org_ref(&self) -> OrgRef {
        OrgRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Keys and lock state
    // ───────────────────────────────────────────────────────────────────────

    /// Bootstrap the built-in groups and keys with `account` as founding
    /// owner and admin.
    pub fn initialize(&mut self, account: &Account) -> Result<()> {
        if self.public_key.is_some() {
            return Err(AccessError::AlreadyInitialized);
        }

        self.admins.update_accessors(&[account])?;
        self.admins.generate_keys()?;

        self.container.update_accessors(&[&self.admins])?;
        self.generate_keys()?;

        let mut member = account.to_member();
        self.sign(&mut member)?;
        self.upsert_member(member.clone());

        self.everyone.update_accessors(&[&self.admins, &member])?;
        self.everyone.generate_keys()?;

        let signer = self.signing_keypair()?.clone();
        sign_subject(&signer, &mut self.admins)?;
        sign_subject(&signer, &mut self.everyone)?;
        Ok(())
    }

    /// Generate a new signing keypair and invites key, sealing both into the
    /// organization container. Existing signatures stop verifying.
    pub fn generate_keys(&mut self) -> Result<()> {
        let signing = SigningKeypair::generate();
        let invites_key = random_bytes::<32>();

        let sealed = to_cbor(&SealedSecrets {
            signing_seed: signing.seed(),
            invites_key,
        })?;
        self.container.set_data(&sealed)?;

        self.public_key = Some(signing.public_key());
        self.secrets.set(OrgSecrets {
            signing,
            invites_key,
        });
        Ok(())
    }

    /// Unlock through the Admins group.
    pub fn unlock(&mut self, account: &Account) -> Result<()> {
        self.admins.unlock(account).map_err(|e| match e {
            AccessError::AccessDenied(_) => AccessError::AccessDenied(format!(
                "{} is not an admin of organization {}",
                account.id, self.id
            )),
            other => other,
        })?;
        self.container.unlock(&self.admins)?;

        let sealed: SealedSecrets = from_cbor(&self.container.get_data()?)?;
        self.secrets.set(OrgSecrets {
            signing: SigningKeypair::from_seed(&sealed.signing_seed),
            invites_key: sealed.invites_key,
        });

        if let Err(e) = self.verify_self() {
            self.secrets.clear();
            return Err(e);
        }
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.secrets.is_set()
    }

    /// Sign and verify a random challenge with the recovered key.
    pub fn verify_self(&self) -> Result<()> {
        let signer = self.signing_keypair()?;
        let public_key = self.public_key.ok_or_else(|| {
            AccessError::PublicKeyMismatch(format!("organization {} has no public key", self.id))
        })?;

        let challenge = random_bytes::<16>();
        public_key
            .verify(&challenge, &signer.sign(&challenge))
            .map_err(|_| {
                AccessError::PublicKeyMismatch(format!(
                    "signing key of organization {} does not match its public key",
                    self.id
                ))
            })
    }

    fn signing_keypair(&self) -> Result<&SigningKeypair> {
        self.secrets
            .get()
            .map(|s| &s.signing)
            .ok_or_else(|| AccessError::Locked(format!("organization {} is locked", self.id)))
    }

    fn invites_key(&self) -> Result<&[u8; 32]> {
        self.secrets
            .get()
            .map(|s| &s.invites_key)
            .ok_or_else(|| AccessError::Locked(format!("organization {} is locked", self.id)))
    }

    // ───────────────────────────────────────────────────────────────────────
    // Signatures
    // ───────────────────────────────────────────────────────────────────────

    pub fn sign(&self, subject: &mut dyn Signable) -> Result<()> {
        sign_subject(self.signing_keypair()?, subject)
    }

    /// Fails closed: a missing signature, a missing key, or a bad signature
    /// all yield [`AccessError::PublicKeyMismatch`].
    pub fn verify(&self, subject: &dyn Signable) -> Result<()> {
        let id = subject.accessor_id();
        let public_key = self.public_key.as_ref().ok_or_else(|| {
            AccessError::PublicKeyMismatch(format!("organization {} has no public key", self.id))
        })?;
        let message = subject
            .signing_message()
            .ok_or_else(|| AccessError::PublicKeyMismatch(format!("{} has no public key", id)))?;
        let signature = subject
            .signed_public_key()
            .ok_or_else(|| AccessError::PublicKeyMismatch(format!("{} is not signed", id)))?;

        public_key.verify(&message, signature).map_err(|_| {
            AccessError::PublicKeyMismatch(format!("signed public key of {} does not verify", id))
        })
    }

    pub fn verify_all(&self, subjects: &[&dyn Signable]) -> Result<()> {
        subjects.iter().try_for_each(|s| self.verify(*s))
    }

    /// Verify every group and member.
    pub fn verify_everything(&self) -> Result<()> {
        for group in self.all_groups() {
            self.verify(group)?;
        }
        for member in &self.members {
            self.verify(member)?;
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Members and groups
    // ───────────────────────────────────────────────────────────────────────

    /// Sign and add a member, replacing any existing entry with the same id.
    pub fn add_member(&mut self, mut member: OrgMember) -> Result<()> {
        self.sign(&mut member)?;
        self.upsert_member(member);
        Ok(())
    }

    pub fn create_group(&mut self, name: impl Into<String>, members: &[AccountId]) -> Result<GroupId> {
        let signer = self.signing_keypair()?.clone();
        let members = self.members_by_id(members)?;
        self.verify_all(&signables(&members))?;

        let mut group = Group::new(name);
        group.update_accessors(&accessors(&members))?;
        group.generate_keys()?;
        sign_subject(&signer, &mut group)?;

        let id = group.id.clone();
        self.groups.push(group);
        Ok(id)
    }

    /// Replace a group's members and rotate its keys.
    ///
    /// The owner is always kept in Admins. Changing Admins re-wraps the
    /// organization container for the new Admins key.
    pub fn update_group(
        &mut self,
        id: &GroupId,
        members: &[AccountId],
        name: Option<String>,
    ) -> Result<()> {
        let signer = self.signing_keypair()?.clone();
        let is_admins = id == &self.admins.id;

        let mut ids = members.to_vec();
        if is_admins && !ids.contains(&self.owner) {
            ids.push(self.owner.clone());
        }
        let members = self.members_by_id(&ids)?;
        self.verify_all(&signables(&members))?;

        let group = self
            .group_mut(id)
            .ok_or_else(|| AccessError::GroupNotFound(id.clone()))?;
        if let Some(name) = name {
            group.name = name;
        }
        group.reset();
        group.update_accessors(&accessors(&members))?;
        group.generate_keys()?;
        sign_subject(&signer, group)?;

        if is_admins {
            self.container.update_accessors(&[&self.admins])?;
        }
        Ok(())
    }

    /// Rotate every key the organization controls.
    ///
    /// Unless `force` is set, refuses to run when any signature fails to
    /// verify. Vaults wrapped for the old group keys must be re-synced with
    /// a pre-rotation copy of a group that can still unlock them.
    pub fn rotate_keys(&mut self, force: bool) -> Result<()> {
        self.signing_keypair()?;
        if !force {
            self.verify_everything()?;
        }

        let plan: Vec<(GroupId, Vec<OrgMember>)> = self
            .all_groups()
            .map(|g| {
                let members = self.members_for_group(g).into_iter().cloned().collect();
                (g.id.clone(), members)
            })
            .collect();

        for (id, members) in plan {
            let group = self
                .group_mut(&id)
                .ok_or_else(|| AccessError::GroupNotFound(id.clone()))?;
            group.reset();
            group.update_accessors(&accessors(&members))?;
            group.generate_keys()?;
        }

        self.container.reset();
        self.container.update_accessors(&[&self.admins])?;
        self.generate_keys()?;

        let signer = self.signing_keypair()?.clone();
        for group in self.all_groups_mut() {
            sign_subject(&signer, group)?;
        }
        for member in self.members.iter_mut() {
            sign_subject(&signer, member)?;
        }
        Ok(())
    }

    /// Remove a member and rotate every group they belonged to.
    pub fn remove_member(&mut self, id: &AccountId) -> Result<()> {
        if self.is_owner(id) {
            return Err(AccessError::AccessDenied(format!(
                "the owner of organization {} cannot be removed",
                self.id
            )));
        }
        if !self.is_member(id) {
            return Err(AccessError::MemberNotFound(id.clone()));
        }

        let affected: Vec<(GroupId, Vec<AccountId>)> = self
            .groups_for_member(id)
            .into_iter()
            .map(|g| {
                let remaining = self
                    .members_for_group(g)
                    .into_iter()
                    .filter(|m| &m.id != id)
                    .map(|m| m.id.clone())
                    .collect();
                (g.id.clone(), remaining)
            })
            .collect();

        self.members.retain(|m| &m.id != id);
        for (group, remaining) in affected {
            self.update_group(&group, &remaining, None)?;
        }
        Ok(())
    }

    fn upsert_member(&mut self, member: OrgMember) {
        match self.members.iter_mut().find(|m| m.id == member.id) {
            Some(existing) => *existing = member,
            None => self.members.push(member),
        }
    }

    fn members_by_id(&self, ids: &[AccountId]) -> Result<Vec<OrgMember>> {
        ids.iter()
            .map(|id| {
                self.member(id)
                    .cloned()
                    .ok_or_else(|| AccessError::MemberNotFound(id.clone()))
            })
            .collect()
    }

    /// Mutable access to any group, built-in ones included. Changing a
    /// group's vault grants does not invalidate its signature.
    pub fn group_mut(&mut self, id: &GroupId) -> Option<&mut Group> {
        self.all_groups_mut().find(|g| &g.id == id)
    }

    fn all_groups_mut(&mut self) -> impl Iterator<Item = &mut Group> {
        iter::once(&mut self.admins)
            .chain(iter::once(&mut self.everyone))
            .chain(self.groups.iter_mut())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Queries
    // ───────────────────────────────────────────────────────────────────────

    /// Admins, Everyone, then custom groups.
    pub fn all_groups(&self) -> impl Iterator<Item = &Group> {
        iter::once(&self.admins)
            .chain(iter::once(&self.everyone))
            .chain(self.groups.iter())
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.all_groups().find(|g| &g.id == id)
    }

    pub fn member(&self, id: &AccountId) -> Option<&OrgMember> {
        self.members.iter().find(|m| &m.id == id)
    }

    pub fn members_for_group(&self, group: &Group) -> Vec<&OrgMember> {
        group
            .accessor_ids()
            .filter_map(|id| self.members.iter().find(|m| m.id.as_str() == id))
            .collect()
    }

    pub fn groups_for_member(&self, id: &AccountId) -> Vec<&Group> {
        self.all_groups()
            .filter(|g| g.has_accessor(id.as_str()))
            .collect()
    }

    pub fn groups_for_vault(&self, vault: &VaultId) -> Vec<&Group> {
        self.all_groups()
            .filter(|g| g.vault(vault).is_some())
            .collect()
    }

    /// The first group `member` belongs to that grants `vault`.
    pub fn unlocking_group_for_vault(&self, vault: &VaultId, member: &AccountId) -> Option<&Group> {
        self.all_groups()
            .find(|g| g.has_accessor(member.as_str()) && g.vault(vault).is_some())
    }

    pub fn vaults_for_member(&self, member: &AccountId) -> Vec<(&VaultRef, &Group)> {
        self.vaults
            .iter()
            .filter_map(|v| {
                self.unlocking_group_for_vault(&v.id, member)
                    .map(|group| (v, group))
            })
            .collect()
    }

    /// Whether any of `member`'s groups grants `vault` read-write.
    pub fn has_write_permissions(&self, vault: &VaultId, member: &AccountId) -> bool {
        self.groups_for_member(member)
            .iter()
            .any(|g| g.vault(vault).map_or(false, |v| !v.readonly))
    }

    pub fn is_owner(&self, id: &AccountId) -> bool {
        &self.owner == id
    }

    pub fn is_admin(&self, id: &AccountId) -> bool {
        self.admins.has_accessor(id.as_str())
    }

    pub fn is_member(&self, id: &AccountId) -> bool {
        self.member(id).is_some()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Invites
    // ───────────────────────────────────────────────────────────────────────

    pub fn invite(&self, id: &InviteId) -> Option<&Invite> {
        self.invites.iter().find(|i| &i.id == id)
    }

    pub fn remove_invite(&mut self, id: &InviteId) {
        self.invites.retain(|i| &i.id != id);
    }

    /// Create an invite. Returns the stored invite and the secret to hand
    /// to the invitee.
    pub fn create_invite(
        &mut self,
        email: impl Into<String>,
        purpose: InvitePurpose,
        invited_by: &AccountId,
        config: &InviteConfig,
    ) -> Result<(Invite, String)> {
        let (invite, secret) = Invite::create(
            self.org_ref(),
            email.into(),
            purpose,
            invited_by.clone(),
            self.invites_key()?,
            config.ttl,
        );
        self.invites.push(invite.clone());
        Ok((invite, secret))
    }

    /// Recompute the secret for an invite.
    pub fn invite_secret(&self, id: &InviteId) -> Result<String> {
        Ok(derive_secret(self.invites_key()?, id))
    }

    /// Admit the invitee of an accepted, unexpired invite: add them as a
    /// member, drop the invite, and rotate Everyone to the full member list.
    pub fn confirm_invite(&mut self, id: &InviteId) -> Result<OrgMember> {
        let invite = self
            .invite(id)
            .cloned()
            .ok_or_else(|| AccessError::InviteNotFound(id.clone()))?;
        if invite.is_expired() {
            return Err(AccessError::InviteExpired(id.clone()));
        }
        let secret = self.invite_secret(id)?;
        let member = invite.verify_invitee(&secret)?.to_member();
        let member_id = member.id.clone();

        self.add_member(member)?;
        self.remove_invite(id);

        let everyone = self.everyone.id.clone();
        let all: Vec<AccountId> = self.members.iter().map(|m| m.id.clone()).collect();
        self.update_group(&everyone, &all, None)?;

        self.member(&member_id)
            .cloned()
            .ok_or(AccessError::MemberNotFound(member_id))
    }
}

impl Storable for Organization {
    const KIND: RecordKind = RecordKind::Org;

    fn storage_id(&self) -> String {
        self.id.to_string()
    }
}

fn sign_subject(signer: &SigningKeypair, subject: &mut dyn Signable) -> Result<()> {
    let message = subject.signing_message().ok_or_else(|| {
        AccessError::PublicKeyMismatch(format!(
            "{} has no public key to sign",
            subject.accessor_id()
        ))
    })?;
    subject.set_signed_public_key(signer.sign(&message));
    Ok(())
}

fn accessors(members: &[OrgMember]) -> Vec<&dyn Accessor> {
    members.iter().map(|m| m as &dyn Accessor).collect()
}

fn signables(members: &[OrgMember]) -> Vec<&dyn Signable> {
    members.iter().map(|m| m as &dyn Signable).collect()
}
