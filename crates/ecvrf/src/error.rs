use thiserror::Error;

pub type VrfResult<A> = Result<A, VrfError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VrfError {
    #[error("invalid length: expected at most {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("the bytes do not decode to a curve point ({0})")]
    InvalidPoint(&'static str),

    #[error("the point encoding is not canonical ({0})")]
    NonCanonical(&'static str),

    #[error("the public key is a small-order point")]
    SmallOrder,

    #[error("the proof scalar is not reduced")]
    InvalidScalar,

    #[error("hash to curve did not find a point")]
    HashToCurve,

    #[error("could not decode hex: {0}")]
    HexDecode(String),

    #[error("the proof does not verify")]
    VerificationFailed,
}

impl From<hex::FromHexError> for VrfError {
    fn from(e: hex::FromHexError) -> Self {
        VrfError::HexDecode(e.to_string())
    }
}
