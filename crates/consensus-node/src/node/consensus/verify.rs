use super::slot::{SlotContext, SlotStatus};
use crate::chain::types::BlockHeader;
use crate::node::messages::CastBody;
use dkg_core::primitives::GroupInfo;
use dkg_core::SignedMessage;
use threshold_bls::{Hash, Id};

/// Verification of one cast by this node: the cast itself, its deadline and
/// the threshold collection for it.
pub struct VerifyContext {
    cast: SignedMessage<CastBody>,
    deadline: u64,
    created_at: u64,
    signed: bool,
    slot: SlotContext,
}

impl VerifyContext {
    pub fn new(
        cast: SignedMessage<CastBody>,
        pre: &BlockHeader,
        group: &GroupInfo,
        deadline: u64,
        now: u64,
    ) -> Self {
        let slot = SlotContext::new(
            cast.body.header.clone(),
            pre.random.clone(),
            *group.group_pk(),
            group.threshold(),
        );

        VerifyContext {
            cast,
            deadline,
            created_at: now,
            signed: false,
            slot,
        }
    }

    pub fn cast(&self) -> &SignedMessage<CastBody> {
        &self.cast
    }

    pub fn header(&self) -> &BlockHeader {
        &self.cast.body.header
    }

    pub fn castor(&self) -> Id {
        self.cast.body.header.castor
    }

    pub fn height(&self) -> u64 {
        self.cast.body.header.height
    }

    pub fn pre_hash(&self) -> Hash {
        self.cast.body.header.pre_hash
    }

    pub fn block_hash(&self) -> Hash {
        self.cast.body.header.hash
    }

    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.deadline
    }

    /// This node already sent its partials for the block.
    pub fn has_signed(&self) -> bool {
        self.signed
    }

    pub fn mark_signed(&mut self) {
        self.signed = true;
    }

    pub fn status(&self) -> SlotStatus {
        self.slot.status()
    }

    pub fn slot(&self) -> &SlotContext {
        &self.slot
    }

    pub fn slot_mut(&mut self) -> &mut SlotContext {
        &mut self.slot
    }
}
