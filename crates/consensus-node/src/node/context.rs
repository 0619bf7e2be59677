use super::cache::{InMemoryGroupDirectory, InMemoryNodeInfoCache, NodeInfoFetcher};
use super::clock::Clock;
use super::network::NetworkService;
use super::store::JoinedGroupStore;
use crate::chain::{BlockChain, GroupChain, MinerPool};
use crate::config::ConsensusParams;
use dkg_core::primitives::GroupInfo;
use dkg_core::{MessageBody, SignedMessage};
use parking_lot::RwLock;
use std::sync::Arc;
use threshold_bls::Id;

/// Everything a node's handlers talk to. Cheap to clone.
#[derive(Clone)]
pub struct NodeContext {
    pub params: Arc<ConsensusParams>,
    pub node: Arc<InMemoryNodeInfoCache>,
    pub chain: Arc<dyn BlockChain>,
    pub group_chain: Arc<dyn GroupChain>,
    pub miners: Arc<dyn MinerPool>,
    pub network: Arc<dyn NetworkService>,
    pub store: Arc<JoinedGroupStore>,
    pub clock: Arc<dyn Clock>,
    pub directory: Arc<RwLock<InMemoryGroupDirectory>>,
}

impl NodeContext {
    pub fn my_id(&self) -> Id {
        self.node.get_id()
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Signs with the identity key.
    pub fn sign<T: MessageBody>(&self, body: T) -> SignedMessage<T> {
        SignedMessage::new(body, self.node.get_secret_key(), self.my_id())
    }

    /// Groups on the group chain in directory order.
    pub fn chain_groups(&self) -> Vec<GroupInfo> {
        let mut groups = self.group_chain.groups();

        groups.sort_by_key(|g| (g.work_height(), g.group_id()));

        groups
    }

    /// Live groups on the group chain that `member` belongs to.
    pub fn chain_groups_of(&self, member: &Id, height: u64) -> usize {
        self.group_chain
            .groups()
            .iter()
            .filter(|g| !g.is_dismissed(height) && g.is_member(member))
            .count()
    }
}
