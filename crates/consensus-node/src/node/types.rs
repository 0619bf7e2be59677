use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use threshold_bls::{Hash, Id, PublicKey, SecretKey};

/// The member's private view of a group it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedGroupInfo {
    pub group_id: Id,
    pub group_hash: Hash,
    pub group_pk: PublicKey,
    pub sign_secret: SecretKey,
    pub member_sign_pks: BTreeMap<Id, PublicKey>,
}

impl JoinedGroupInfo {
    pub fn sign_public(&self) -> PublicKey {
        self.sign_secret.public_key()
    }

    pub fn member_sign_pk(&self, member: &Id) -> Option<PublicKey> {
        self.member_sign_pks.get(member).copied()
    }

    pub(crate) fn record(&self) -> JoinedGroupRecord {
        JoinedGroupRecord {
            group_id: self.group_id,
            group_hash: self.group_hash,
            group_pk: self.group_pk,
            member_sign_pks: self.member_sign_pks.clone(),
        }
    }
}

/// The public part of [`JoinedGroupInfo`], stored in clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct JoinedGroupRecord {
    pub group_id: Id,
    pub group_hash: Hash,
    pub group_pk: PublicKey,
    pub member_sign_pks: BTreeMap<Id, PublicKey>,
}

impl JoinedGroupRecord {
    pub fn with_secret(self, sign_secret: SecretKey) -> JoinedGroupInfo {
        JoinedGroupInfo {
            group_id: self.group_id,
            group_hash: self.group_hash,
            group_pk: self.group_pk,
            sign_secret,
            member_sign_pks: self.member_sign_pks,
        }
    }
}

/// What handling a cast led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    /// Both partial signatures were produced and sent.
    Signed,
    /// Verification waits on missing transactions.
    Waiting,
    /// Held until a missing parent block arrives.
    Deferred,
    /// Not for this node, or a repeat.
    Ignored,
}

/// What handling a verified message led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedOutcome {
    Collected,
    Committed,
    Deferred,
    Ignored,
}
