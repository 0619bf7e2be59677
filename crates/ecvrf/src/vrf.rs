use crate::error::{VrfError, VrfResult};
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use std::fmt;

pub const SECRET_KEY_LENGTH: usize = 32;

pub const PUBLIC_KEY_LENGTH: usize = 32;

pub const PROOF_LENGTH: usize = 80;

pub const OUTPUT_LENGTH: usize = 64;

const CHALLENGE_LENGTH: usize = 16;

const SUITE: u8 = 0x03;

const HASH_TO_CURVE_TAG: u8 = 0x01;

const CHALLENGE_TAG: u8 = 0x02;

const OUTPUT_TAG: u8 = 0x03;

/// VRF secret key. The 32-byte seed expands the same way an Ed25519 signing
/// key does: the lower half of its SHA-512 is the clamped scalar, the upper
/// half keys the nonce.
#[derive(Clone)]
pub struct VrfSecretKey {
    seed: [u8; SECRET_KEY_LENGTH],
    scalar: Scalar,
    nonce_prefix: [u8; 32],
    public: VrfPublicKey,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VrfPublicKey {
    compressed: CompressedEdwardsY,
    point: EdwardsPoint,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VrfProof {
    gamma: EdwardsPoint,
    challenge: [u8; CHALLENGE_LENGTH],
    response: Scalar,
}

/// The pseudo-random output bound to a proof.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VrfOutput([u8; OUTPUT_LENGTH]);

impl VrfSecretKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; SECRET_KEY_LENGTH];

        rng.fill_bytes(&mut seed);

        VrfSecretKey::from_seed(seed)
    }

    pub fn from_seed(seed: [u8; SECRET_KEY_LENGTH]) -> Self {
        let digest: [u8; 64] = Sha512::digest(seed).into();

        let mut lower = [0u8; 32];
        lower.copy_from_slice(&digest[..32]);

        lower[0] &= 248;
        lower[31] &= 127;
        lower[31] |= 64;

        let scalar = Scalar::from_bytes_mod_order(lower);

        let mut nonce_prefix = [0u8; 32];
        nonce_prefix.copy_from_slice(&digest[32..]);

        let point = EdwardsPoint::mul_base(&scalar);

        VrfSecretKey {
            seed,
            scalar,
            nonce_prefix,
            public: VrfPublicKey {
                compressed: point.compress(),
                point,
            },
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> VrfResult<Self> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(VrfError::InvalidLength {
                expected: SECRET_KEY_LENGTH,
                actual: bytes.len(),
            });
        }

        let mut seed = [0u8; SECRET_KEY_LENGTH];
        seed.copy_from_slice(bytes);

        Ok(VrfSecretKey::from_seed(seed))
    }

    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.seed
    }

    pub fn public_key(&self) -> VrfPublicKey {
        self.public
    }

    /// Deterministic: the same key and message always give the same proof.
    pub fn prove(&self, alpha: &[u8]) -> VrfResult<VrfProof> {
        let h = hash_to_curve(&self.public.compressed, alpha)?;
        let h_bytes = h.compress();

        let gamma = h * self.scalar;

        let nonce = {
            let mut hasher = Sha512::new();
            hasher.update(self.nonce_prefix);
            hasher.update(h_bytes.as_bytes());
            let digest: [u8; 64] = hasher.finalize().into();
            Scalar::from_bytes_mod_order_wide(&digest)
        };

        let challenge = challenge_bytes(&[
            h,
            gamma,
            EdwardsPoint::mul_base(&nonce),
            h * nonce,
        ]);

        let response = nonce + challenge_scalar(&challenge) * self.scalar;

        Ok(VrfProof {
            gamma,
            challenge,
            response,
        })
    }
}

impl fmt::Debug for VrfSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfSecretKey({:?})", self.public)
    }
}

impl VrfPublicKey {
    /// Rejects non-canonical encodings and small-order points.
    pub fn from_bytes(bytes: &[u8]) -> VrfResult<Self> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(VrfError::InvalidLength {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            });
        }

        let point = decode_point(bytes, "public key")?;

        if point.is_small_order() {
            return Err(VrfError::SmallOrder);
        }

        Ok(VrfPublicKey {
            compressed: point.compress(),
            point,
        })
    }

    pub fn from_hex(s: &str) -> VrfResult<Self> {
        VrfPublicKey::from_bytes(&hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.compressed.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn verify(&self, proof: &VrfProof, alpha: &[u8]) -> bool {
        let h = match hash_to_curve(&self.compressed, alpha) {
            Ok(h) => h,
            Err(_) => return false,
        };

        let c = challenge_scalar(&proof.challenge);

        let u = EdwardsPoint::mul_base(&proof.response) - self.point * c;
        let v = h * proof.response - proof.gamma * c;

        challenge_bytes(&[h, proof.gamma, u, v]) == proof.challenge
    }

    /// Decodes and verifies raw proof bytes, returning the output on success.
    pub fn verify_bytes(&self, proof: &[u8], alpha: &[u8]) -> VrfResult<VrfOutput> {
        let proof = VrfProof::from_bytes(proof)?;

        if !self.verify(&proof, alpha) {
            return Err(VrfError::VerificationFailed);
        }

        Ok(proof.output())
    }
}

impl fmt::Debug for VrfPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfPublicKey(0x{}..)", hex::encode(&self.to_bytes()[..6]))
    }
}

impl VrfProof {
    /// Inputs shorter than [`PROOF_LENGTH`] are left-padded with zeros.
    pub fn from_bytes(bytes: &[u8]) -> VrfResult<Self> {
        if bytes.len() > PROOF_LENGTH {
            return Err(VrfError::InvalidLength {
                expected: PROOF_LENGTH,
                actual: bytes.len(),
            });
        }

        let mut padded = [0u8; PROOF_LENGTH];
        padded[PROOF_LENGTH - bytes.len()..].copy_from_slice(bytes);

        let gamma = decode_point(&padded[..32], "gamma")?;

        let mut challenge = [0u8; CHALLENGE_LENGTH];
        challenge.copy_from_slice(&padded[32..48]);

        let mut s = [0u8; 32];
        s.copy_from_slice(&padded[48..]);

        let response: Option<Scalar> = Scalar::from_canonical_bytes(s).into();

        Ok(VrfProof {
            gamma,
            challenge,
            response: response.ok_or(VrfError::InvalidScalar)?,
        })
    }

    pub fn from_hex(s: &str) -> VrfResult<Self> {
        VrfProof::from_bytes(&hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
    }

    pub fn to_bytes(&self) -> [u8; PROOF_LENGTH] {
        let mut out = [0u8; PROOF_LENGTH];

        out[..32].copy_from_slice(self.gamma.compress().as_bytes());
        out[32..48].copy_from_slice(&self.challenge);
        out[48..].copy_from_slice(self.response.as_bytes());

        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn output(&self) -> VrfOutput {
        let mut hasher = Sha512::new();

        hasher.update([SUITE, OUTPUT_TAG]);
        hasher.update(self.gamma.mul_by_cofactor().compress().as_bytes());

        VrfOutput(hasher.finalize().into())
    }
}

impl fmt::Debug for VrfProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfProof(0x{}..)", hex::encode(&self.to_bytes()[..6]))
    }
}

impl VrfOutput {
    pub fn as_bytes(&self) -> &[u8; OUTPUT_LENGTH] {
        &self.0
    }

    /// The first eight bytes read big-endian, i.e. the output as a fraction of
    /// 2^64 at 64-bit precision.
    pub fn top_u64(&self) -> u64 {
        let mut top = [0u8; 8];

        top.copy_from_slice(&self.0[..8]);

        u64::from_be_bytes(top)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for VrfOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfOutput(0x{}..)", hex::encode(&self.0[..6]))
    }
}

fn decode_point(bytes: &[u8], what: &'static str) -> VrfResult<EdwardsPoint> {
    let compressed =
        CompressedEdwardsY::from_slice(bytes).map_err(|_| VrfError::InvalidPoint(what))?;

    let point = compressed
        .decompress()
        .ok_or(VrfError::InvalidPoint(what))?;

    // decompress reduces y mod p, so a canonical input survives the round trip
    if point.compress() != compressed {
        return Err(VrfError::NonCanonical(what));
    }

    Ok(point)
}

/// Try-and-increment: hash the public key, the message and a counter until the
/// digest decodes to a point, then clear the cofactor.
fn hash_to_curve(public: &CompressedEdwardsY, alpha: &[u8]) -> VrfResult<EdwardsPoint> {
    for ctr in 0..=u8::MAX {
        let mut hasher = Sha512::new();

        hasher.update([SUITE, HASH_TO_CURVE_TAG]);
        hasher.update(public.as_bytes());
        hasher.update(alpha);
        hasher.update([ctr]);

        let digest = hasher.finalize();

        let candidate = match CompressedEdwardsY::from_slice(&digest[..32]) {
            Ok(c) => c,
            Err(_) => continue,
        };

        if let Some(point) = candidate.decompress() {
            let point = point.mul_by_cofactor();

            if !point.is_identity() {
                return Ok(point);
            }
        }
    }

    Err(VrfError::HashToCurve)
}

fn challenge_bytes(points: &[EdwardsPoint; 4]) -> [u8; CHALLENGE_LENGTH] {
    let mut hasher = Sha512::new();

    hasher.update([SUITE, CHALLENGE_TAG]);

    for p in points.iter() {
        hasher.update(p.compress().as_bytes());
    }

    let digest = hasher.finalize();

    let mut c = [0u8; CHALLENGE_LENGTH];
    c.copy_from_slice(&digest[..CHALLENGE_LENGTH]);

    c
}

fn challenge_scalar(challenge: &[u8; CHALLENGE_LENGTH]) -> Scalar {
    let mut wide = [0u8; 32];

    wide[..CHALLENGE_LENGTH].copy_from_slice(challenge);

    Scalar::from_bytes_mod_order(wide)
}

macro_rules! impl_serde_hex {
    ($ty:ident) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    serializer.serialize_bytes(&self.to_bytes())
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;

                    $ty::from_hex(&s).map_err(serde::de::Error::custom)
                } else {
                    let bytes: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;

                    $ty::from_bytes(&bytes).map_err(serde::de::Error::custom)
                }
            }
        }
    };
}

impl_serde_hex!(VrfPublicKey);
impl_serde_hex!(VrfProof);

#[cfg(test)]
pub mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::thread_rng;

    #[test]
    fn test_prove_then_verify() {
        let sk = VrfSecretKey::generate(&mut thread_rng());
        let pk = sk.public_key();

        let proof = sk.prove(b"height-7").unwrap();

        assert!(pk.verify(&proof, b"height-7"));
        assert!(!pk.verify(&proof, b"height-8"));

        let other = VrfSecretKey::generate(&mut thread_rng()).public_key();

        assert!(!other.verify(&proof, b"height-7"));
    }

    #[test]
    fn test_proof_is_deterministic() {
        let sk = VrfSecretKey::from_seed([9u8; 32]);

        let a = sk.prove(b"m").unwrap();
        let b = sk.prove(b"m").unwrap();

        assert_eq!(a.to_bytes(), b.to_bytes());
        assert_eq!(a.output(), b.output());
        assert_ne!(a.output(), sk.prove(b"n").unwrap().output());
    }

    #[test]
    fn test_bytes_round_trip_verifies() {
        let sk = VrfSecretKey::from_seed([1u8; 32]);

        let proof = sk.prove(b"m").unwrap();

        let out = sk
            .public_key()
            .verify_bytes(&proof.to_bytes(), b"m")
            .unwrap();

        assert_eq!(out, proof.output());
    }

    #[test]
    fn test_short_proof_is_left_padded() {
        let sk = VrfSecretKey::from_seed([3u8; 32]);
        let pk = sk.public_key();

        // find a proof whose encoding starts with a zero byte
        let (alpha, proof) = (0u32..)
            .map(|i| {
                let alpha = i.to_be_bytes();
                let proof = sk.prove(&alpha).unwrap();
                (alpha, proof)
            })
            .find(|(_, p)| p.to_bytes()[0] == 0)
            .unwrap();

        let full = proof.to_bytes();

        let short = &full[1..];

        assert_eq!(
            pk.verify_bytes(short, &alpha).unwrap(),
            pk.verify_bytes(&full, &alpha).unwrap()
        );
    }

    #[test]
    fn test_too_long_proof_is_rejected() {
        assert_eq!(
            VrfProof::from_bytes(&[0u8; 81]),
            Err(VrfError::InvalidLength {
                expected: 80,
                actual: 81
            })
        );
    }

    #[test]
    fn test_non_canonical_point_is_rejected() {
        // y = p + 1 where p = 2^255 - 19: decodes to y = 1 but is not reduced
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0xee;
        bytes[31] = 0x7f;

        assert_eq!(
            VrfPublicKey::from_bytes(&bytes),
            Err(VrfError::NonCanonical("public key"))
        );
    }

    #[test]
    fn test_small_order_public_key_is_rejected() {
        // the identity, y = 1
        let mut bytes = [0u8; 32];
        bytes[0] = 1;

        assert_eq!(VrfPublicKey::from_bytes(&bytes), Err(VrfError::SmallOrder));
    }

    #[test]
    fn test_tampered_proof_fails() {
        let sk = VrfSecretKey::from_seed([5u8; 32]);

        let mut bytes = sk.prove(b"m").unwrap().to_bytes();
        bytes[40] ^= 1;

        assert!(sk.public_key().verify_bytes(&bytes, b"m").is_err());
    }

    #[test]
    fn test_serde_hex() {
        let pk = VrfSecretKey::from_seed([7u8; 32]).public_key();

        let text = pk.to_hex();

        assert_eq!(VrfPublicKey::from_hex(&text).unwrap(), pk);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_round_trip(seed in any::<[u8; 32]>(), alpha in proptest::collection::vec(any::<u8>(), 0..64)) {
            let sk = VrfSecretKey::from_seed(seed);

            let proof = sk.prove(&alpha).unwrap();

            prop_assert!(sk.public_key().verify(&proof, &alpha));
        }
    }
}
