use crate::error::{BLSError, BLSResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

pub const HASH_LENGTH: usize = 32;

/// A SHA-256 digest, printed as `0x`-prefixed hex.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Hash(bytes)
    }

    pub fn digest(data: &[u8]) -> Self {
        Hash(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn from_slice(bytes: &[u8]) -> BLSResult<Self> {
        if bytes.len() != HASH_LENGTH {
            return Err(BLSError::InvalidLength {
                expected: HASH_LENGTH,
                actual: bytes.len(),
            });
        }

        let mut out = [0u8; HASH_LENGTH];

        out.copy_from_slice(bytes);

        Ok(Hash(out))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> BLSResult<Self> {
        Hash::from_slice(&decode_hex(s)?)
    }

    /// Interprets the digest as a big-endian integer and reduces it modulo `n`.
    pub fn mod_u64(&self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }

        let n = n as u128;

        self.0
            .iter()
            .fold(0u128, |acc, b| ((acc << 8) | *b as u128) % n) as u64
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}..", hex::encode(&self.0[..6]))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = serde::de::Deserialize::deserialize(deserializer)?;

        Hash::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Incremental builder for message and header digests. Variable-length fields
/// are length-prefixed so different field splits never collide.
#[derive(Default, Clone)]
pub struct DataHasher {
    inner: Sha256,
}

impl DataHasher {
    pub fn new() -> Self {
        DataHasher {
            inner: Sha256::new(),
        }
    }

    pub fn with_domain(domain: &[u8]) -> Self {
        let mut hasher = DataHasher::new();

        hasher.update_bytes(domain);

        hasher
    }

    pub fn update_u64(&mut self, v: u64) -> &mut Self {
        self.inner.update(v.to_be_bytes());
        self
    }

    pub fn update_u32(&mut self, v: u32) -> &mut Self {
        self.inner.update(v.to_be_bytes());
        self
    }

    pub fn update_fixed(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    pub fn update_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update((data.len() as u64).to_be_bytes());
        self.inner.update(data);
        self
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.update_bytes(s.as_bytes())
    }

    pub fn finalize(&self) -> Hash {
        Hash(self.inner.clone().finalize().into())
    }
}

pub(crate) fn decode_hex(s: &str) -> BLSResult<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);

    Ok(hex::decode(s)?)
}
