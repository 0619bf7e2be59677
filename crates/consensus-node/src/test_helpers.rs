//! An in-process cluster for tests and the demo binary. Every node owns its
//! chain and store; messages go through one shared queue as wire bytes.
use crate::chain::memory::{InMemoryChain, InMemoryMinerPool};
use crate::chain::types::{BlockHeader, MinerInfo, Transaction};
use crate::chain::BlockChain;
use crate::config::ConsensusParams;
use crate::node::cache::{InMemoryGroupDirectory, InMemoryNodeInfoCache};
use crate::node::clock::ManualClock;
use crate::node::context::NodeContext;
use crate::node::errors::NodeResult;
use crate::node::genesis::{build_genesis, Genesis};
use crate::node::messages::ConsensusMessage;
use crate::node::network::NetworkService;
use crate::node::processor::Processor;
use crate::node::store::{FileStore, JoinedGroupStore, KeyValueStore};
use crate::node::wire;
use ecvrf::VrfSecretKey;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use threshold_bls::{Hash, Id, SecretKey};
use tracing::{debug, warn};

pub const GENESIS_TIME: u64 = 1_000_000;

/// Clock advance between two proposal rounds.
pub const ROUND_MS: u64 = 1_000;

const MAX_DELIVERIES: usize = 1_000_000;

type DropFilter = Box<dyn Fn(&Id, &Id, &ConsensusMessage) -> bool + Send + Sync>;

/// The shared wire. A drop filter returning `true` loses the message.
pub struct LocalNetwork {
    peers: Vec<Id>,
    queue: Mutex<VecDeque<(Id, Id, Vec<u8>)>>,
    drop_filter: RwLock<Option<DropFilter>>,
}

impl LocalNetwork {
    pub fn new(peers: Vec<Id>) -> Self {
        LocalNetwork {
            peers,
            queue: Mutex::new(VecDeque::new()),
            drop_filter: RwLock::new(None),
        }
    }

    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: Fn(&Id, &Id, &ConsensusMessage) -> bool + Send + Sync + 'static,
    {
        *self.drop_filter.write() = Some(Box::new(filter));
    }

    pub fn clear_drop_filter(&self) {
        *self.drop_filter.write() = None;
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    fn push(&self, from: Id, to: Id, msg: &ConsensusMessage) {
        if let Some(filter) = self.drop_filter.read().as_ref() {
            if filter(&from, &to, msg) {
                debug!(from = ?from, to = ?to, msg = msg.name(), "message dropped");

                return;
            }
        }

        self.queue.lock().push_back((from, to, wire::encode(msg)));
    }

    fn pop(&self) -> Option<(Id, Id, Vec<u8>)> {
        self.queue.lock().pop_front()
    }
}

/// One node's handle on the shared wire.
pub struct LocalEndpoint {
    id: Id,
    network: Arc<LocalNetwork>,
}

impl NetworkService for LocalEndpoint {
    fn send(&self, to: Id, msg: ConsensusMessage) {
        self.network.push(self.id, to, &msg);
    }

    fn send_to_group(&self, members: &[Id], msg: ConsensusMessage) {
        for member in members.iter().filter(|m| **m != self.id) {
            self.network.push(self.id, *member, &msg);
        }
    }

    fn broadcast(&self, msg: ConsensusMessage) {
        for peer in self.network.peers.iter().filter(|p| **p != self.id) {
            self.network.push(self.id, *peer, &msg);
        }
    }
}

pub struct TestNode {
    pub id: Id,
    pub secret_key: SecretKey,
    pub processor: Arc<Processor>,
    pub chain: Arc<InMemoryChain>,
    pub store: Arc<JoinedGroupStore>,
}

impl TestNode {
    pub fn top(&self) -> BlockHeader {
        self.chain.top_block()
    }
}

pub fn node_keys(i: usize) -> (SecretKey, VrfSecretKey) {
    let sk = SecretKey::from_seed(format!("cluster-node-{}", i).as_bytes());

    let mut vrf_seed = [0u8; 32];
    vrf_seed[..8].copy_from_slice(&(i as u64 + 1).to_be_bytes());

    (sk, VrfSecretKey::from_seed(vrf_seed))
}

pub struct Cluster {
    nodes: Vec<TestNode>,
    network: Arc<LocalNetwork>,
    clock: Arc<ManualClock>,
    genesis: Genesis,
}

impl Cluster {
    /// `n_nodes` miners with equal stake. The first `genesis_members` form
    /// the genesis group.
    pub fn new(n_nodes: usize, genesis_members: usize, params: ConsensusParams) -> NodeResult<Self> {
        Cluster::build(n_nodes, genesis_members, params, None)
    }

    /// Like `new`, with each node's joined groups kept in its own directory
    /// under `data_dir`.
    pub fn with_data_dir(
        n_nodes: usize,
        genesis_members: usize,
        params: ConsensusParams,
        data_dir: &Path,
    ) -> NodeResult<Self> {
        Cluster::build(n_nodes, genesis_members, params, Some(data_dir))
    }

    fn build(
        n_nodes: usize,
        genesis_members: usize,
        params: ConsensusParams,
        data_dir: Option<&Path>,
    ) -> NodeResult<Self> {
        let keys: Vec<(SecretKey, VrfSecretKey)> = (0..n_nodes).map(node_keys).collect();

        let ids: Vec<Id> = keys
            .iter()
            .map(|(sk, _)| Id::from_public_key(&sk.public_key()))
            .collect();

        let miners = Arc::new(InMemoryMinerPool::new());

        for (id, (sk, vrf)) in ids.iter().zip(keys.iter()) {
            miners.add_miner(MinerInfo {
                id: *id,
                public_key: sk.public_key(),
                vrf_public_key: vrf.public_key(),
                stake: 10,
                apply_height: 0,
            });
        }

        let members: Vec<(Id, SecretKey)> = ids
            .iter()
            .zip(keys.iter())
            .take(genesis_members)
            .map(|(id, (sk, _))| (*id, sk.clone()))
            .collect();

        let genesis = build_genesis(&members, &params.group, GENESIS_TIME)?;

        let network = Arc::new(LocalNetwork::new(ids.clone()));

        let clock = Arc::new(ManualClock::new(GENESIS_TIME));

        let params = Arc::new(params);

        let mut nodes = vec![];

        for (i, (id, (sk, vrf))) in ids.into_iter().zip(keys.into_iter()).enumerate() {
            let chain = Arc::new(InMemoryChain::new(
                genesis.block.clone(),
                genesis.group.clone(),
            ));

            let store = match data_dir {
                Some(dir) => {
                    let dir: PathBuf = dir.join(format!("node-{}", i));

                    Arc::new(JoinedGroupStore::new(sk.clone(), move || {
                        Ok(Arc::new(FileStore::open(dir.clone())?) as Arc<dyn KeyValueStore>)
                    }))
                }
                None => Arc::new(JoinedGroupStore::in_memory(sk.clone())),
            };

            if let Some(joined) = genesis.joined.get(&id) {
                store.save(joined.clone())?;
            }

            let ctx = NodeContext {
                params: params.clone(),
                node: Arc::new(InMemoryNodeInfoCache::new(sk.clone(), vrf)),
                chain: chain.clone(),
                group_chain: chain.clone(),
                miners: miners.clone(),
                network: Arc::new(LocalEndpoint {
                    id,
                    network: network.clone(),
                }),
                store: store.clone(),
                clock: clock.clone(),
                directory: Arc::new(RwLock::new(InMemoryGroupDirectory::new())),
            };

            nodes.push(TestNode {
                id,
                secret_key: sk,
                processor: Arc::new(Processor::new(ctx)),
                chain,
                store,
            });
        }

        Ok(Cluster {
            nodes,
            network,
            clock,
            genesis,
        })
    }

    pub fn nodes(&self) -> &[TestNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    pub fn node_by_id(&self, id: &Id) -> Option<&TestNode> {
        self.nodes.iter().find(|n| n.id == *id)
    }

    pub fn network(&self) -> &LocalNetwork {
        &self.network
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn genesis(&self) -> &Genesis {
        &self.genesis
    }

    /// Delivers queued messages until the queue is empty. Returns how many
    /// were delivered.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;

        while let Some((from, to, bytes)) = self.network.pop() {
            delivered += 1;

            if delivered > MAX_DELIVERIES {
                warn!("message storm, giving up on the queue");

                break;
            }

            let node = match self.node_by_id(&to) {
                Some(node) => node,
                None => continue,
            };

            let msg = match wire::decode(&bytes) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(from = ?from, "undecodable message: {}", e);

                    continue;
                }
            };

            let name = msg.name();

            if let Err(e) = node.processor.handle_message(msg) {
                debug!(from = ?from, to = ?to, msg = name, "message rejected: {}", e);
            }
        }

        delivered
    }

    /// Lets node `index` propose on its current top and delivers everything
    /// that follows.
    pub fn propose(&self, index: usize) -> NodeResult<Option<Hash>> {
        let proposed = self.nodes[index].processor.try_propose();

        self.pump();

        proposed
    }

    /// Advances the clock one round and lets the round's proposer cast.
    pub fn propose_round(&self) -> NodeResult<Option<Hash>> {
        self.clock.advance(ROUND_MS);

        let height = self.nodes[0].top().height + 1;

        let proposer = (height % self.nodes.len() as u64) as usize;

        self.propose(proposer)
    }

    /// Pools the transactions at node `from` and gossips them.
    pub fn submit_transactions(&self, from: usize, transactions: Vec<Transaction>) {
        let processor = &self.nodes[from].processor;

        processor.on_transactions(transactions.clone());

        processor
            .context()
            .network
            .broadcast(ConsensusMessage::Transactions(transactions));

        self.pump();
    }

    /// Returns how many rounds grew the chain.
    pub fn run_rounds(&self, rounds: u64) -> NodeResult<u64> {
        let mut grown = 0;

        for _ in 0..rounds {
            let before = self.nodes[0].top().height;

            self.propose_round()?;

            for node in self.nodes.iter() {
                node.processor.release_and_sweep()?;
            }

            self.pump();

            if self.nodes[0].top().height > before {
                grown += 1;
            }
        }

        Ok(grown)
    }

    /// The common top, when every node agrees on it.
    pub fn agreed_top(&self) -> Option<BlockHeader> {
        let top = self.nodes[0].top();

        if self.nodes.iter().all(|n| n.top().hash == top.hash) {
            Some(top)
        } else {
            None
        }
    }
}

/// Parameters under which every miner of a small cluster may always propose
/// and groups form every few heights.
pub fn cluster_params(group_size: usize, create_interval: u64) -> ConsensusParams {
    let mut params = ConsensusParams {
        proposer_multiplier: 1_000,
        ..Default::default()
    };

    params.group.member_min = group_size;
    params.group.member_max = group_size;
    params.group.create_interval = create_interval;

    params
}
