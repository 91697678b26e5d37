//! Organization members.

use serde::{Deserialize, Serialize};
use strongbox_core::{AccountId, Signature};

use crate::crypto::BoxPublicKey;
use crate::identity::{Accessor, Signable};

/// A member of an organization.
///
/// Members can be granted access to groups but never hold a container
/// themselves. `signed_public_key` must verify against the organization's
/// current public key before the member is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMember {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub public_key: BoxPublicKey,
    pub signed_public_key: Option<Signature>,
}

impl OrgMember {
    pub fn new(id: AccountId, name: String, email: String, public_key: BoxPublicKey) -> Self {
        Self {
            id,
            name,
            email,
            public_key,
            signed_public_key: None,
        }
    }
}

impl Accessor for OrgMember {
    fn accessor_id(&self) -> &str {
        self.id.as_str()
    }

    fn public_key(&self) -> Option<&BoxPublicKey> {
        Some(&self.public_key)
    }
}

impl Signable for OrgMember {
    fn signed_public_key(&self) -> Option<&Signature> {
        self.signed_public_key.as_ref()
    }

    fn set_signed_public_key(&mut self, signature: Signature) {
        self.signed_public_key = Some(signature);
    }
}
