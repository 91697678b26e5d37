//! Identity capabilities and user accounts.
//!
//! Anything that can appear in a container's key-wrap table implements
//! [`Accessor`]. Identities that hold a private key and can therefore open
//! containers implement [`KeyHolder`]. Subjects whose public keys are vouched
//! for by an organization implement [`Signable`].

use serde::{Deserialize, Serialize};
use strongbox_core::{AccountId, OrgId, RecordKind, Signature, Storable, VaultId};

use crate::crypto::{BoxPublicKey, BoxSecretKey};
use crate::error::{AccessError, Result};
use crate::member::OrgMember;
use crate::secret::Transient;

/// Can unlock others: has an id and a public key to wrap content keys for.
pub trait Accessor {
    fn accessor_id(&self) -> &str;

    /// `None` until keys have been generated.
    fn public_key(&self) -> Option<&BoxPublicKey>;
}

/// An accessor whose private key is currently available.
pub trait KeyHolder: Accessor {
    /// `None` while locked.
    fn secret_key(&self) -> Option<&BoxSecretKey>;
}

/// A subject whose public key is signed by an organization.
pub trait Signable: Accessor {
    fn signed_public_key(&self) -> Option<&Signature>;

    fn set_signed_public_key(&mut self, signature: Signature);

    /// Bytes covered by the organization signature: the subject id and its
    /// public key.
    fn signing_message(&self) -> Option<Vec<u8>> {
        let public_key = self.public_key()?;
        let id = self.accessor_id().as_bytes();
        let mut message = Vec::with_capacity(24 + id.len() + 32);
        message.extend_from_slice(b"strongbox-signed-key\0");
        message.extend_from_slice(id);
        message.push(0);
        message.extend_from_slice(public_key.as_bytes());
        Some(message)
    }
}

/// A user account.
///
/// Password-based key derivation and the login handshake are handled
/// elsewhere. An account reaches this crate already holding its secret key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub public_key: BoxPublicKey,
    pub main_vault: Option<VaultId>,
    pub orgs: Vec<OrgId>,

    #[serde(skip)]
    secret: Transient<BoxSecretKey>,
}

impl Account {
    /// Create an account with a fresh keypair. The result is unlocked.
    pub fn generate(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::from_secret_key(name, email, BoxSecretKey::generate())
    }

    /// Create an unlocked account around an existing secret key.
    pub fn from_secret_key(
        name: impl Into<String>,
        email: impl Into<String>,
        secret_key: BoxSecretKey,
    ) -> Self {
        let mut secret = Transient::empty();
        let public_key = secret_key.public_key();
        secret.set(secret_key);

        Self {
            id: AccountId::generate(),
            name: name.into(),
            email: email.into(),
            public_key,
            main_vault: None,
            orgs: Vec::new(),
            secret,
        }
    }

    /// Attach the secret key recovered by the login flow.
    pub fn unlock(&mut self, secret_key: BoxSecretKey) -> Result<()> {
        if secret_key.public_key() != self.public_key {
            return Err(AccessError::Decryption(format!(
                "secret key does not belong to account {}",
                self.id
            )));
        }
        self.secret.set(secret_key);
        Ok(())
    }

    pub fn lock(&mut self) {
        self.secret.clear();
    }

    pub fn is_unlocked(&self) -> bool {
        self.secret.is_set()
    }

    /// Replace public fields with a fresher copy, keeping the secret key
    /// when the public key is unchanged.
    pub fn refresh(&mut self, remote: Account) {
        let secret = if remote.public_key == self.public_key {
            std::mem::take(&mut self.secret)
        } else {
            Transient::empty()
        };
        *self = Account { secret, ..remote };
    }

    /// An unsigned member record for this account.
    pub fn to_member(&self) -> OrgMember {
        OrgMember::new(
            self.id.clone(),
            self.name.clone(),
            self.email.clone(),
            self.public_key,
        )
    }
}

impl Accessor for Account {
    fn accessor_id(&self) -> &str {
        self.id.as_str()
    }

    fn public_key(&self) -> Option<&BoxPublicKey> {
        Some(&self.public_key)
    }
}

impl KeyHolder for Account {
    fn secret_key(&self) -> Option<&BoxSecretKey> {
        self.secret.get()
    }
}

impl Storable for Account {
    const KIND: RecordKind = RecordKind::Account;

    fn storage_id(&self) -> String {
        self.id.to_string()
    }
}
