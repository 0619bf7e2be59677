use crate::chain::types::{Block, BlockHeader, Transaction};
use dkg_core::primitives::SignData;
use dkg_core::{DkgMessage, MessageBody, SignedMessage};
use serde::{Deserialize, Serialize};
use threshold_bls::hash::DataHasher;
use threshold_bls::{Hash, Id, Signature};

/// A proposed block, signed with the castor's identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastBody {
    pub header: BlockHeader,
}

impl MessageBody for CastBody {
    fn gen_hash(&self) -> Hash {
        DataHasher::with_domain(b"cast")
            .update_fixed(self.header.hash.as_bytes())
            .finalize()
    }
}

/// A verifier's two partial signatures for one candidate, signed with its
/// signing share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedBody {
    pub block_hash: Hash,
    pub group_id: Id,
    pub height: u64,
    pub pre_hash: Hash,
    /// Over the block hash.
    pub block_sign: Signature,
    /// Over the parent's random.
    pub random_sign: Signature,
}

impl MessageBody for VerifiedBody {
    fn gen_hash(&self) -> Hash {
        DataHasher::with_domain(b"verified")
            .update_fixed(self.block_hash.as_bytes())
            .update_fixed(self.group_id.as_bytes())
            .update_u64(self.height)
            .update_fixed(self.pre_hash.as_bytes())
            .update_fixed(&self.block_sign.to_bytes())
            .update_fixed(&self.random_sign.to_bytes())
            .finalize()
    }
}

/// Every message a consensus node sends or receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Dkg(DkgMessage),
    Cast(SignedMessage<CastBody>),
    Verified(SignedMessage<VerifiedBody>),
    NewBlock(Block),
    Transactions(Vec<Transaction>),
}

impl ConsensusMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ConsensusMessage::Dkg(m) => m.name(),
            ConsensusMessage::Cast(_) => "cast",
            ConsensusMessage::Verified(_) => "verified",
            ConsensusMessage::NewBlock(_) => "new_block",
            ConsensusMessage::Transactions(_) => "transactions",
        }
    }

    pub fn sign_data(&self) -> Option<&SignData> {
        match self {
            ConsensusMessage::Dkg(m) => Some(m.sign_data()),
            ConsensusMessage::Cast(m) => Some(&m.sign),
            ConsensusMessage::Verified(m) => Some(&m.sign),
            ConsensusMessage::NewBlock(_) | ConsensusMessage::Transactions(_) => None,
        }
    }

    pub fn signer(&self) -> Option<Id> {
        self.sign_data().map(|s| s.signer)
    }
}

impl From<DkgMessage> for ConsensusMessage {
    fn from(msg: DkgMessage) -> Self {
        ConsensusMessage::Dkg(msg)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use threshold_bls::SecretKey;

    #[test]
    fn test_verified_body_binds_both_signatures() {
        let sk = SecretKey::from_seed(b"share");

        let body = VerifiedBody {
            block_hash: Hash::digest(b"block"),
            group_id: Id::from_address(b"group"),
            height: 3,
            pre_hash: Hash::digest(b"pre"),
            block_sign: sk.sign(b"block"),
            random_sign: sk.sign(b"random"),
        };

        let msg = SignedMessage::new(body, &sk, Id::from_address(b"me"));

        assert!(msg.verify(&sk.public_key()));

        let mut swapped = msg.clone();
        swapped.body.random_sign = swapped.body.block_sign;

        assert!(!swapped.verify(&sk.public_key()));
        assert_eq!(
            ConsensusMessage::Verified(msg).signer(),
            Some(Id::from_address(b"me"))
        );
    }
}
