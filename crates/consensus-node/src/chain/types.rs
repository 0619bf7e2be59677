use serde::{Deserialize, Serialize};
use threshold_bls::hash::DataHasher;
use threshold_bls::{Hash, Id, PublicKey, Signature};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash,
    pub source: Id,
    pub nonce: u64,
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(source: Id, nonce: u64, payload: Vec<u8>) -> Self {
        let hash = DataHasher::with_domain(b"tx")
            .update_fixed(source.as_bytes())
            .update_u64(nonce)
            .update_bytes(&payload)
            .finalize();

        Transaction {
            hash,
            source,
            nonce,
            payload,
        }
    }

    pub fn is_hash_valid(&self) -> bool {
        Transaction::new(self.source, self.nonce, self.payload.clone()).hash == self.hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: Hash,
    pub height: u64,
    pub pre_hash: Hash,
    /// Milliseconds since the epoch.
    pub timestamp: u64,
    pub castor: Id,
    pub group_id: Id,
    /// The castor's VRF proof over the parent random and the height.
    pub prove_value: Vec<u8>,
    pub total_qn: u64,
    pub tx_hashes: Vec<Hash>,
    pub tx_root: Hash,
    /// Group signature over `hash`, filled in at commit.
    pub signature: Option<Signature>,
    /// Group signature over the parent's `random`, the beacon for the next
    /// height.
    pub random: Vec<u8>,
    pub extra: Vec<u8>,
}

impl BlockHeader {
    /// Covers everything but the group signatures.
    pub fn gen_hash(&self) -> Hash {
        let mut hasher = DataHasher::with_domain(b"block-header");

        hasher
            .update_u64(self.height)
            .update_fixed(self.pre_hash.as_bytes())
            .update_u64(self.timestamp)
            .update_fixed(self.castor.as_bytes())
            .update_fixed(self.group_id.as_bytes())
            .update_bytes(&self.prove_value)
            .update_u64(self.total_qn)
            .update_fixed(self.tx_root.as_bytes())
            .update_bytes(&self.extra);

        hasher.finalize()
    }

    pub fn is_hash_valid(&self) -> bool {
        self.hash == self.gen_hash()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some() && !self.random.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Height zero, signed by nobody, carrying the seed of the random beacon.
    pub fn genesis(group_id: Id, timestamp: u64) -> Self {
        let mut header = BlockHeader {
            hash: Hash::default(),
            height: 0,
            pre_hash: Hash::default(),
            timestamp,
            castor: group_id,
            group_id,
            prove_value: vec![],
            total_qn: 0,
            tx_hashes: vec![],
            tx_root: tx_root(&[]),
            signature: None,
            random: Hash::digest(b"genesis random").as_bytes().to_vec(),
            extra: vec![],
        };

        header.hash = header.gen_hash();

        Block {
            header,
            transactions: vec![],
        }
    }
}

/// Binary Merkle root over transaction hashes.
pub fn tx_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return DataHasher::with_domain(b"empty-tx-root").finalize();
    }

    let mut level = hashes.to_vec();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);

                DataHasher::new()
                    .update_fixed(pair[0].as_bytes())
                    .update_fixed(right.as_bytes())
                    .finalize()
            })
            .collect();
    }

    level[0]
}

/// A registered miner: identity key, VRF key and stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerInfo {
    pub id: Id,
    pub public_key: PublicKey,
    pub vrf_public_key: ecvrf::VrfPublicKey,
    pub stake: u64,
    /// First height at which the miner may propose or join groups.
    pub apply_height: u64,
}

impl MinerInfo {
    pub fn is_active(&self, height: u64) -> bool {
        self.stake > 0 && height >= self.apply_height
    }
}

/// Outcome of adding a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddBlockResult {
    Added,
    AlreadyExists,
    ParentMissing,
    Rejected(String),
}

/// Whether the local pool holds every transaction a header names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxCompleteness {
    Complete(Vec<Transaction>),
    Missing(Vec<Hash>),
}

/// Everything the proposer decided before the chain assembles the block.
#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub height: u64,
    pub pre_hash: Hash,
    pub timestamp: u64,
    pub castor: Id,
    pub group_id: Id,
    pub prove_value: Vec<u8>,
    pub total_qn: u64,
    pub max_transactions: usize,
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_header_hash_skips_signatures() {
        let mut block = Block::genesis(Id::from_address(b"g"), 1000);

        let hash = block.hash();

        block.header.random = vec![1, 2, 3];

        assert_eq!(block.header.gen_hash(), hash);

        block.header.total_qn = 9;

        assert!(!block.header.is_hash_valid());
    }

    #[test]
    fn test_tx_root_depends_on_order() {
        let a = Transaction::new(Id::from_address(b"a"), 0, vec![1]);
        let b = Transaction::new(Id::from_address(b"b"), 0, vec![2]);

        assert_ne!(tx_root(&[a.hash, b.hash]), tx_root(&[b.hash, a.hash]));
        assert!(a.is_hash_valid());
    }
}
