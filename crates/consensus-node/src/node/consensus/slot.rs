use crate::chain::types::BlockHeader;
use crate::node::errors::{NodeError, NodeResult};
use threshold_bls::{GroupSignGenerator, Hash, Id, PublicKey, Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotStatus {
    Initing,
    /// Verification waits on missing transactions.
    Waiting,
    /// This node sent its partial signatures.
    Signed,
    /// Both group signatures were recovered.
    Recovered,
    Verified,
    Success,
    Failed,
}

impl SlotStatus {
    pub fn can_move_to(self, to: SlotStatus) -> bool {
        use SlotStatus::*;

        match (self, to) {
            (Initing, Waiting) | (Initing, Signed) | (Initing, Recovered) => true,
            (Waiting, Signed) | (Waiting, Recovered) => true,
            (Signed, Recovered) => true,
            (Recovered, Verified) => true,
            (Verified, Success) => true,
            (Success, Failed) | (Failed, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SlotStatus::Success | SlotStatus::Failed)
    }

    /// Both group signatures are known.
    pub fn is_recovered(self) -> bool {
        matches!(
            self,
            SlotStatus::Recovered | SlotStatus::Verified | SlotStatus::Success
        )
    }
}

/// Threshold collection for one candidate block: partial signatures over the
/// block hash and over the parent's random.
pub struct SlotContext {
    header: BlockHeader,
    pre_random: Vec<u8>,
    group_pk: PublicKey,
    status: SlotStatus,
    block_sign: GroupSignGenerator,
    random_sign: GroupSignGenerator,
    missing_transactions: usize,
}

impl SlotContext {
    pub fn new(
        header: BlockHeader,
        pre_random: Vec<u8>,
        group_pk: PublicKey,
        threshold: usize,
    ) -> Self {
        SlotContext {
            header,
            pre_random,
            group_pk,
            status: SlotStatus::Initing,
            block_sign: GroupSignGenerator::new(threshold),
            random_sign: GroupSignGenerator::new(threshold),
            missing_transactions: 0,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn block_hash(&self) -> Hash {
        self.header.hash
    }

    pub fn pre_random(&self) -> &[u8] {
        &self.pre_random
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    pub fn missing_transactions(&self) -> usize {
        self.missing_transactions
    }

    pub fn witness_size(&self) -> (usize, usize) {
        (self.block_sign.witness_size(), self.random_sign.witness_size())
    }

    pub fn has_witness(&self, member: &Id) -> bool {
        self.block_sign.has_witness(member)
    }

    pub fn transition(&mut self, to: SlotStatus) -> NodeResult<()> {
        if !self.status.can_move_to(to) {
            return Err(NodeError::InvalidSlotTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;

        Ok(())
    }

    pub fn set_waiting(&mut self, missing: usize) -> NodeResult<()> {
        self.missing_transactions = missing;

        if self.status == SlotStatus::Waiting {
            return Ok(());
        }

        self.transition(SlotStatus::Waiting)
    }

    /// Checks one member's partials against its signing public key.
    pub fn verify_partials(
        &self,
        sign_pk: &PublicKey,
        block_sign: &Signature,
        random_sign: &Signature,
    ) -> bool {
        sign_pk.verify(self.header.hash.as_bytes(), block_sign)
            && sign_pk.verify(&self.pre_random, random_sign)
    }

    /// Returns `true` on the call that recovers both signatures. Partials
    /// after recovery and repeated signers are no-ops.
    pub fn add_partials(
        &mut self,
        member: Id,
        block_sign: Signature,
        random_sign: Signature,
    ) -> NodeResult<bool> {
        if self.status == SlotStatus::Failed {
            return Err(NodeError::SlotFailed);
        }

        if self.status.is_recovered() {
            return Ok(false);
        }

        self.block_sign.add_witness(member, block_sign)?;
        self.random_sign.add_witness(member, random_sign)?;

        if !(self.block_sign.is_recovered() && self.random_sign.is_recovered()) {
            return Ok(false);
        }

        self.transition(SlotStatus::Recovered)?;

        Ok(true)
    }

    /// Checks both recovered signatures against the group key and moves to
    /// `Verified`. A mismatch fails the slot.
    pub fn verify_group_sign(&mut self) -> NodeResult<(Signature, Signature)> {
        let (block_sign, random_sign) =
            match (self.block_sign.group_sign(), self.random_sign.group_sign()) {
                (Some(b), Some(r)) => (*b, *r),
                _ => {
                    return Err(NodeError::InvalidSlotTransition {
                        from: self.status,
                        to: SlotStatus::Verified,
                    })
                }
            };

        if self.status == SlotStatus::Recovered {
            let valid = self.group_pk.verify(self.header.hash.as_bytes(), &block_sign)
                && self.group_pk.verify(&self.pre_random, &random_sign);

            if !valid {
                self.transition(SlotStatus::Failed)?;

                return Err(NodeError::RecoveredSignatureInvalid);
            }

            self.transition(SlotStatus::Verified)?;
        }

        Ok((block_sign, random_sign))
    }
}
