use crate::chain::errors::ChainError;
use crate::node::consensus::SlotStatus;
use dkg_core::primitives::DKGError;
use ecvrf::VrfError;
use thiserror::Error;
use threshold_bls::{BLSError, Hash, Id};

pub type NodeResult<A> = Result<A, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    ChainError(#[from] ChainError),

    #[error(transparent)]
    DKGError(#[from] DKGError),

    #[error(transparent)]
    BLSError(#[from] BLSError),

    #[error(transparent)]
    VrfError(#[from] VrfError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    ConfigError(#[from] serde_yaml::Error),

    #[error("could not serialize: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("could not deserialize: {0}")]
    DeserializationError(#[from] bincode::Error),

    #[error("could not decode wire message: {0}")]
    WireDecodeError(#[from] prost::DecodeError),

    #[error("wire message is missing field {0}")]
    WireMissingField(&'static str),

    #[error("the slot can not move from {from:?} to {to:?}")]
    InvalidSlotTransition { from: SlotStatus, to: SlotStatus },

    #[error("the slot already failed")]
    SlotFailed,

    #[error("the block {0} is already on chain")]
    BlockExisted(Hash),

    #[error("the castor {0:?} already cast another block at this height")]
    CastorEquivocation(Id),

    #[error("the cast arrived at {now} after its deadline {deadline}")]
    DeadlineExceeded { deadline: u64, now: u64 },

    #[error("the miner {0:?} is not registered")]
    UnknownMiner(Id),

    #[error("the {0} message signature is invalid")]
    InvalidSignature(&'static str),

    #[error("the vrf proof does not verify")]
    InvalidProof,

    #[error("the castor is not eligible to propose")]
    NotEligible,

    #[error("the total qn should be {expected} but is {actual}")]
    QnMismatch { expected: u64, actual: u64 },

    #[error("the block names group {actual:?} but {expected:?} is selected")]
    WrongVerifyGroup { expected: Id, actual: Id },

    #[error("there is no effective group at height {0}")]
    NoVerifyGroup(u64),

    #[error("a block with total qn {signed} was already signed, got {actual}")]
    LowerQN { signed: u64, actual: u64 },

    #[error("the parent block {0} is missing")]
    ParentMissing(Hash),

    #[error("{0} transactions are missing")]
    MissingTransactions(usize),

    #[error("the group is not exist")]
    GroupNotExisted(Id),

    #[error("there is no sign key for group {0:?}")]
    SignKeyMissing(Id),

    #[error("the sign public key of {0:?} is unknown")]
    SignPublicKeyMissing(Id),

    #[error("create height {actual} does not match the base block height {expected}")]
    CreateHeightMismatch { expected: u64, actual: u64 },

    #[error("{0:?} is not a member of the group")]
    NotGroupMember(Id),

    #[error("the recovered group signature does not verify")]
    RecoveredSignatureInvalid,

    #[error("the block was rejected by the chain: {0}")]
    BlockRejected(String),
}

impl NodeError {
    /// Missing dependencies that may show up later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NodeError::ParentMissing(_)
                | NodeError::MissingTransactions(_)
                | NodeError::GroupNotExisted(_)
                | NodeError::SignPublicKeyMissing(_)
        )
    }
}
