use thiserror::Error;

pub type BLSResult<A> = Result<A, BLSError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BLSError {
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("the bytes are not a valid encoding of a {0}")]
    InvalidEncoding(&'static str),

    #[error("the secret scalar is zero")]
    ZeroScalar,

    #[error("the point is the identity element")]
    IdentityPoint,

    #[error("could not decode hex: {0}")]
    HexDecode(String),

    #[error("the operation needs at least one input")]
    EmptyInput,

    #[error("not enough shares to recover: threshold {threshold}, got {actual}")]
    NotEnoughShares { threshold: usize, actual: usize },

    #[error("the same id appears twice in the interpolation set")]
    DuplicateId,

    #[error("the id is zero")]
    ZeroId,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,
}

impl From<hex::FromHexError> for BLSError {
    fn from(e: hex::FromHexError) -> Self {
        BLSError::HexDecode(e.to_string())
    }
}
