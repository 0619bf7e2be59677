use crate::curve::scalar_from_be_reduced;
use crate::error::{BLSError, BLSResult};
use crate::hash::{decode_hex, Hash};
use crate::keys::PublicKey;
use blstrs::Scalar;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const ID_LENGTH: usize = 32;

/// Identity of a miner or a group.
///
/// The value is a canonical scalar (big-endian), so it doubles as the Shamir
/// evaluation point of the member it names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id([u8; ID_LENGTH]);

impl Id {
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Id::from_digest(&Hash::digest(&public_key.to_bytes()))
    }

    pub fn from_address(address: &[u8]) -> Self {
        Id::from_digest(&Hash::digest(address))
    }

    /// Builds an id from a canonical big-endian scalar encoding.
    pub fn from_bytes(bytes: &[u8]) -> BLSResult<Self> {
        if bytes.len() != ID_LENGTH {
            return Err(BLSError::InvalidLength {
                expected: ID_LENGTH,
                actual: bytes.len(),
            });
        }

        let mut arr = [0u8; ID_LENGTH];

        arr.copy_from_slice(bytes);

        let scalar: Option<Scalar> = Scalar::from_bytes_be(&arr).into();

        match scalar {
            None => Err(BLSError::InvalidEncoding("id")),
            Some(_) if arr.iter().all(|b| *b == 0) => Err(BLSError::ZeroId),
            Some(_) => Ok(Id(arr)),
        }
    }

    pub fn from_hex(s: &str) -> BLSResult<Self> {
        Id::from_bytes(&decode_hex(s)?)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0.iter().any(|b| *b != 0)
    }

    pub(crate) fn to_scalar(self) -> Scalar {
        // the bytes were validated as canonical on construction
        scalar_from_be_reduced(&self.0)
    }

    fn from_digest(digest: &Hash) -> Self {
        let mut scalar = scalar_from_be_reduced(digest.as_bytes());

        if bool::from(ff::Field::is_zero(&scalar)) {
            scalar = Scalar::from(1u64);
        }

        Id(scalar.to_bytes_be())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id(0x{}..)", hex::encode(&self.0[..4]))
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;

            Id::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;

            Id::from_bytes(&bytes).map_err(serde::de::Error::custom)
        }
    }
}
