use thiserror::Error;
use threshold_bls::{Hash, Id};

pub type ChainResult<A> = Result<A, ChainError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("the block {0} is not on chain")]
    BlockNotExisted(Hash),

    #[error("the parent block {0} is not on chain")]
    ParentMissing(Hash),

    #[error("the block hash does not match its content")]
    HashMismatch,

    #[error("the transaction root does not match the transaction list")]
    TxRootMismatch,

    #[error("missing {0} transactions")]
    MissingTransactions(usize),

    #[error("block height {actual} does not follow parent height {parent}")]
    HeightMismatch { parent: u64, actual: u64 },

    #[error("block total qn {actual} does not grow from parent total qn {parent}")]
    TotalQnNotIncreasing { parent: u64, actual: u64 },

    #[error("the transaction list does not match the header")]
    TxListMismatch,

    #[error("the transaction {0} is malformed")]
    InvalidTransaction(Hash),

    #[error("block time {actual} is not after parent time {parent}")]
    TimeNotMonotonic { parent: u64, actual: u64 },

    #[error("the block is missing its group signature")]
    Unsigned,

    #[error("the group {0:?} is not exist")]
    GroupNotExisted(Id),

    #[error("the group {0:?} is already on chain")]
    GroupExisted(Id),
}
