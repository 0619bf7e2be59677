use super::errors::{ChainError, ChainResult};
use super::types::{
    tx_root, AddBlockResult, Block, BlockHeader, BlockRequest, MinerInfo, Transaction,
    TxCompleteness,
};
use super::{BlockChain, GroupChain, MinerPool};
use dkg_core::primitives::GroupInfo;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use threshold_bls::{Hash, Id};

struct ChainState {
    blocks: HashMap<Hash, Block>,
    top: Hash,
    canonical: BTreeMap<u64, Hash>,
    transactions: HashMap<Hash, Transaction>,
    included: HashSet<Hash>,
    groups: Vec<GroupInfo>,
    group_index: HashMap<Id, usize>,
}

impl ChainState {
    fn header(&self, hash: &Hash) -> Option<&BlockHeader> {
        self.blocks.get(hash).map(|b| &b.header)
    }

    fn top_header(&self) -> &BlockHeader {
        // the top always points at a stored block
        &self.blocks[&self.top].header
    }

    fn rebuild_canonical(&mut self) {
        self.canonical.clear();

        let mut cursor = self.blocks.get(&self.top);

        while let Some(block) = cursor {
            self.canonical.insert(block.height(), block.hash());

            if block.height() == 0 {
                break;
            }

            cursor = self.blocks.get(&block.header.pre_hash);
        }
    }

    fn verify(&self, header: &BlockHeader, transactions: &[Transaction]) -> ChainResult<()> {
        if !header.is_hash_valid() {
            return Err(ChainError::HashMismatch);
        }

        if tx_root(&header.tx_hashes) != header.tx_root {
            return Err(ChainError::TxRootMismatch);
        }

        if transactions.len() != header.tx_hashes.len()
            || transactions
                .iter()
                .zip(header.tx_hashes.iter())
                .any(|(tx, hash)| tx.hash != *hash)
        {
            return Err(ChainError::TxListMismatch);
        }

        if let Some(bad) = transactions.iter().find(|tx| !tx.is_hash_valid()) {
            return Err(ChainError::InvalidTransaction(bad.hash));
        }

        let parent = self
            .header(&header.pre_hash)
            .ok_or(ChainError::ParentMissing(header.pre_hash))?;

        if header.height <= parent.height {
            return Err(ChainError::HeightMismatch {
                parent: parent.height,
                actual: header.height,
            });
        }

        if header.timestamp <= parent.timestamp {
            return Err(ChainError::TimeNotMonotonic {
                parent: parent.timestamp,
                actual: header.timestamp,
            });
        }

        if header.total_qn <= parent.total_qn {
            return Err(ChainError::TotalQnNotIncreasing {
                parent: parent.total_qn,
                actual: header.total_qn,
            });
        }

        Ok(())
    }
}

/// Fork-aware block store plus transaction pool and group chain. The best
/// chain is the one with the largest `(total_qn, height)`.
pub struct InMemoryChain {
    state: RwLock<ChainState>,
}

impl InMemoryChain {
    pub fn new(genesis: Block, genesis_group: GroupInfo) -> Self {
        let top = genesis.hash();

        let mut canonical = BTreeMap::new();
        canonical.insert(0, top);

        let mut blocks = HashMap::new();
        blocks.insert(top, genesis);

        let mut group_index = HashMap::new();
        group_index.insert(genesis_group.group_id(), 0);

        InMemoryChain {
            state: RwLock::new(ChainState {
                blocks,
                top,
                canonical,
                transactions: HashMap::new(),
                included: HashSet::new(),
                groups: vec![genesis_group],
                group_index,
            }),
        }
    }

    pub fn block_count(&self) -> usize {
        self.state.read().blocks.len()
    }

    pub fn pending_transactions(&self) -> usize {
        let state = self.state.read();

        state
            .transactions
            .keys()
            .filter(|h| !state.included.contains(h))
            .count()
    }
}

impl BlockChain for InMemoryChain {
    fn top_block(&self) -> BlockHeader {
        self.state.read().top_header().clone()
    }

    fn query_block_header_by_hash(&self, hash: &Hash) -> Option<BlockHeader> {
        self.state.read().header(hash).cloned()
    }

    fn query_block_header_by_height(&self, height: u64) -> Option<BlockHeader> {
        let state = self.state.read();

        state
            .canonical
            .get(&height)
            .and_then(|hash| state.header(hash))
            .cloned()
    }

    fn query_block_by_hash(&self, hash: &Hash) -> Option<Block> {
        self.state.read().blocks.get(hash).cloned()
    }

    fn has_block(&self, hash: &Hash) -> bool {
        self.state.read().blocks.contains_key(hash)
    }

    fn add_block_on_chain(&self, block: Block) -> AddBlockResult {
        let mut state = self.state.write();

        if state.blocks.contains_key(&block.hash()) {
            return AddBlockResult::AlreadyExists;
        }

        if !state.blocks.contains_key(&block.header.pre_hash) {
            return AddBlockResult::ParentMissing;
        }

        if !block.header.is_signed() {
            return AddBlockResult::Rejected(ChainError::Unsigned.to_string());
        }

        if let Err(e) = state.verify(&block.header, &block.transactions) {
            return AddBlockResult::Rejected(e.to_string());
        }

        let hash = block.hash();

        let key = (block.header.total_qn, block.height());

        for tx in block.transactions.iter() {
            state.transactions.entry(tx.hash).or_insert_with(|| tx.clone());
            state.included.insert(tx.hash);
        }

        state.blocks.insert(hash, block);

        let top_key = {
            let top = state.top_header();

            (top.total_qn, top.height)
        };

        if key > top_key {
            state.top = hash;
            state.rebuild_canonical();
        }

        AddBlockResult::Added
    }

    fn check_transactions(&self, header: &BlockHeader) -> TxCompleteness {
        let state = self.state.read();

        let missing: Vec<Hash> = header
            .tx_hashes
            .iter()
            .filter(|h| !state.transactions.contains_key(h))
            .copied()
            .collect();

        if !missing.is_empty() {
            return TxCompleteness::Missing(missing);
        }

        TxCompleteness::Complete(
            header
                .tx_hashes
                .iter()
                .filter_map(|h| state.transactions.get(h).cloned())
                .collect(),
        )
    }

    fn verify_block(&self, header: &BlockHeader, transactions: &[Transaction]) -> ChainResult<()> {
        self.state.read().verify(header, transactions)
    }

    fn generate_block(&self, request: BlockRequest) -> ChainResult<Block> {
        let state = self.state.read();

        let parent = state
            .header(&request.pre_hash)
            .ok_or(ChainError::ParentMissing(request.pre_hash))?;

        let mut pending: Vec<&Transaction> = state
            .transactions
            .values()
            .filter(|tx| !state.included.contains(&tx.hash))
            .collect();

        pending.sort_by_key(|tx| (tx.source, tx.nonce, tx.hash));

        let transactions: Vec<Transaction> = pending
            .into_iter()
            .take(request.max_transactions)
            .cloned()
            .collect();

        let tx_hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash).collect();

        let mut header = BlockHeader {
            hash: Hash::default(),
            height: request.height,
            pre_hash: request.pre_hash,
            timestamp: request.timestamp.max(parent.timestamp + 1),
            castor: request.castor,
            group_id: request.group_id,
            prove_value: request.prove_value,
            total_qn: request.total_qn,
            tx_root: tx_root(&tx_hashes),
            tx_hashes,
            signature: None,
            random: vec![],
            extra: vec![],
        };

        header.hash = header.gen_hash();

        Ok(Block {
            header,
            transactions,
        })
    }

    fn total_qn(&self) -> u64 {
        self.state.read().top_header().total_qn
    }

    fn add_transactions(&self, transactions: Vec<Transaction>) -> Vec<Hash> {
        let mut state = self.state.write();

        transactions
            .into_iter()
            .filter(|tx| tx.is_hash_valid())
            .filter_map(|tx| {
                let hash = tx.hash;

                if state.transactions.contains_key(&hash) {
                    return None;
                }

                state.transactions.insert(hash, tx);

                Some(hash)
            })
            .collect()
    }
}

impl GroupChain for InMemoryChain {
    fn get_group_by_id(&self, id: &Id) -> Option<GroupInfo> {
        let state = self.state.read();

        state
            .group_index
            .get(id)
            .and_then(|i| state.groups.get(*i))
            .cloned()
    }

    fn get_group_by_height(&self, height: u64) -> Option<GroupInfo> {
        self.state.read().groups.get(height as usize).cloned()
    }

    fn group_height(&self) -> u64 {
        self.state.read().groups.len() as u64
    }

    fn add_group(&self, group: GroupInfo) -> ChainResult<()> {
        let mut state = self.state.write();

        if state.group_index.contains_key(&group.group_id()) {
            return Err(ChainError::GroupExisted(group.group_id()));
        }

        let index = state.groups.len();

        state.group_index.insert(group.group_id(), index);
        state.groups.push(group);

        Ok(())
    }

    fn groups(&self) -> Vec<GroupInfo> {
        self.state.read().groups.clone()
    }

    fn last_group(&self) -> Option<GroupInfo> {
        self.state.read().groups.last().cloned()
    }
}

/// Stake registry shared by every node of a local cluster.
#[derive(Default)]
pub struct InMemoryMinerPool {
    miners: RwLock<BTreeMap<Id, MinerInfo>>,
}

impl InMemoryMinerPool {
    pub fn new() -> Self {
        InMemoryMinerPool::default()
    }

    pub fn add_miner(&self, miner: MinerInfo) {
        self.miners.write().insert(miner.id, miner);
    }

    pub fn set_stake(&self, id: &Id, stake: u64) -> bool {
        match self.miners.write().get_mut(id) {
            Some(miner) => {
                miner.stake = stake;
                true
            }
            None => false,
        }
    }
}

impl MinerPool for InMemoryMinerPool {
    fn get_miner(&self, id: &Id) -> Option<MinerInfo> {
        self.miners.read().get(id).cloned()
    }

    fn total_stake(&self, height: u64) -> u64 {
        self.miners
            .read()
            .values()
            .filter(|m| m.is_active(height))
            .map(|m| m.stake)
            .sum()
    }

    fn miners(&self, height: u64) -> Vec<MinerInfo> {
        self.miners
            .read()
            .values()
            .filter(|m| m.is_active(height))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use threshold_bls::{SecretKey, Signature};

    fn genesis_group() -> GroupInfo {
        let sk = SecretKey::from_seed(b"genesis");
        let members = vec![Id::from_address(b"m0")];

        let header = dkg_core::primitives::GroupHeader::new(
            "genesis".into(),
            None,
            None,
            0,
            0,
            0,
            u64::MAX,
            &members,
        );

        let info = dkg_core::primitives::GroupInitInfo {
            parent_sign: sk.sign(header.hash.as_bytes()),
            header,
            members,
        };

        GroupInfo::new(sk.public_key(), info, 1)
    }

    fn chain() -> (InMemoryChain, Block) {
        let group = genesis_group();
        let genesis = Block::genesis(group.group_id(), 1_000);

        (InMemoryChain::new(genesis.clone(), group), genesis)
    }

    fn child(chain: &InMemoryChain, parent: &BlockHeader, qn: u64, castor: &[u8]) -> Block {
        let mut block = chain
            .generate_block(BlockRequest {
                height: parent.height + 1,
                pre_hash: parent.hash,
                timestamp: parent.timestamp + 1_000,
                castor: Id::from_address(castor),
                group_id: parent.group_id,
                prove_value: vec![],
                total_qn: parent.total_qn + qn,
                max_transactions: 10,
            })
            .unwrap();

        let sig: Signature = SecretKey::from_seed(b"g").sign(block.hash().as_bytes());
        block.header.signature = Some(sig);
        block.header.random = sig.to_bytes().to_vec();

        block
    }

    #[test]
    fn test_add_block_and_fork_choice() {
        let (chain, genesis) = chain();

        let low = child(&chain, &genesis.header, 1, b"a");
        let high = child(&chain, &genesis.header, 3, b"b");

        assert_eq!(chain.add_block_on_chain(low.clone()), AddBlockResult::Added);
        assert_eq!(chain.top_block().hash, low.hash());

        assert_eq!(chain.add_block_on_chain(high.clone()), AddBlockResult::Added);
        assert_eq!(chain.top_block().hash, high.hash());
        assert_eq!(chain.total_qn(), 3);
        assert_eq!(
            chain.query_block_header_by_height(1).map(|h| h.hash),
            Some(high.hash())
        );

        assert_eq!(chain.add_block_on_chain(low), AddBlockResult::AlreadyExists);
    }

    #[test]
    fn test_orphan_and_unsigned_blocks() {
        let (chain, genesis) = chain();

        let first = child(&chain, &genesis.header, 1, b"a");

        let mut second = child(&chain, &genesis.header, 1, b"a");
        second.header.height = 2;
        second.header.pre_hash = first.hash();
        second.header.total_qn = 2;
        second.header.hash = second.header.gen_hash();

        assert_eq!(chain.add_block_on_chain(second), AddBlockResult::ParentMissing);

        let mut unsigned = first.clone();
        unsigned.header.signature = None;

        assert!(matches!(
            chain.add_block_on_chain(unsigned),
            AddBlockResult::Rejected(_)
        ));
    }

    #[test]
    fn test_transactions_flow_into_blocks() {
        let (chain, genesis) = chain();

        let tx = Transaction::new(Id::from_address(b"user"), 0, b"hello".to_vec());

        assert_eq!(chain.add_transactions(vec![tx.clone()]), vec![tx.hash]);
        assert!(chain.add_transactions(vec![tx.clone()]).is_empty());

        let block = child(&chain, &genesis.header, 1, b"a");

        assert_eq!(block.header.tx_hashes, vec![tx.hash]);
        assert_eq!(
            chain.check_transactions(&block.header),
            TxCompleteness::Complete(vec![tx.clone()])
        );

        chain.add_block_on_chain(block);

        assert_eq!(chain.pending_transactions(), 0);
    }

    #[test]
    fn test_verify_rejects_time_regression() {
        let (chain, genesis) = chain();

        let mut block = child(&chain, &genesis.header, 1, b"a");
        block.header.timestamp = genesis.header.timestamp;
        block.header.hash = block.header.gen_hash();

        assert_eq!(
            chain.verify_block(&block.header, &block.transactions),
            Err(ChainError::TimeNotMonotonic {
                parent: 1_000,
                actual: 1_000
            })
        );
    }

    #[test]
    fn test_group_chain() {
        let (chain, _) = chain();

        let group = genesis_group();

        assert_eq!(chain.group_height(), 1);
        assert_eq!(
            chain.add_group(group.clone()),
            Err(ChainError::GroupExisted(group.group_id()))
        );
        assert_eq!(chain.get_group_by_height(0), Some(group.clone()));
        assert_eq!(chain.last_group(), Some(group));
    }
}
