use crate::session::SessionStatus;
use thiserror::Error;
use threshold_bls::{BLSError, Id};

pub type DKGResult<A> = Result<A, DKGError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DKGError {
    #[error(transparent)]
    BLSError(#[from] BLSError),

    #[error("{0:?} is not a member of the group")]
    NotMember(Id),

    #[error("illegal session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionStatus, to: SessionStatus },

    #[error("the share piece from {0:?} is not valid")]
    InvalidSharePiece(Id),

    #[error("still missing {0} share pieces")]
    MissingPieces(usize),

    #[error("not enough pongs: need {min}, got {actual}")]
    NotEnoughPongs { min: usize, actual: usize },

    #[error("the group header hash does not match its content")]
    HeaderHashMismatch,

    #[error("the member root does not match the member list")]
    MemberRootMismatch,

    #[error("the recovered signature does not verify against the group key")]
    RecoveredSignatureInvalid,

    #[error("the context is already finished")]
    AlreadyFinished,

    #[error("candidate selection failed: {0}")]
    Selection(String),

    #[error("group size {0} is out of bounds")]
    InvalidGroupSize(usize),
}
