//! The narrow view the consensus core has of the surrounding node: block
//! storage, the group chain and the miner stake registry.

pub mod errors;

pub mod memory;

pub mod types;

use dkg_core::primitives::GroupInfo;
use errors::ChainResult;
use threshold_bls::{Hash, Id};
use types::{
    AddBlockResult, Block, BlockHeader, BlockRequest, MinerInfo, Transaction, TxCompleteness,
};

pub trait BlockChain: Send + Sync {
    fn top_block(&self) -> BlockHeader;

    fn query_block_header_by_hash(&self, hash: &Hash) -> Option<BlockHeader>;

    /// Looks up the block at `height` on the current best chain.
    fn query_block_header_by_height(&self, height: u64) -> Option<BlockHeader>;

    fn query_block_by_hash(&self, hash: &Hash) -> Option<Block>;

    fn has_block(&self, hash: &Hash) -> bool;

    fn add_block_on_chain(&self, block: Block) -> AddBlockResult;

    fn check_transactions(&self, header: &BlockHeader) -> TxCompleteness;

    /// Legality of a candidate against its parent: hash, tx root, height and
    /// time ordering, total QN growth.
    fn verify_block(&self, header: &BlockHeader, transactions: &[Transaction]) -> ChainResult<()>;

    fn generate_block(&self, request: BlockRequest) -> ChainResult<Block>;

    fn total_qn(&self) -> u64;

    /// Returns the hashes that were not known before.
    fn add_transactions(&self, transactions: Vec<Transaction>) -> Vec<Hash>;
}

pub trait GroupChain: Send + Sync {
    fn get_group_by_id(&self, id: &Id) -> Option<GroupInfo>;

    /// The group at position `height` of the group chain.
    fn get_group_by_height(&self, height: u64) -> Option<GroupInfo>;

    fn group_height(&self) -> u64;

    fn add_group(&self, group: GroupInfo) -> ChainResult<()>;

    fn groups(&self) -> Vec<GroupInfo>;

    fn last_group(&self) -> Option<GroupInfo>;
}

pub trait MinerPool: Send + Sync {
    fn get_miner(&self, id: &Id) -> Option<MinerInfo>;

    /// Stake of the miners active at `height`.
    fn total_stake(&self, height: u64) -> u64;

    fn miners(&self, height: u64) -> Vec<MinerInfo>;
}
