use crate::curve::{hash_to_scalar, scalar_from_be_reduced};
use crate::error::{BLSError, BLSResult};
use crate::hash::decode_hex;
use blstrs::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use ff::Field;
use group::prime::PrimeCurveAffine;
use group::{Curve, Group};
use rand_core::{CryptoRng, RngCore};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

pub const SECRET_KEY_LENGTH: usize = 32;

pub const PUBLIC_KEY_LENGTH: usize = 96;

pub const SIGNATURE_LENGTH: usize = 48;

const SIGNATURE_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

const SEED_DOMAIN: &[u8] = b"threshold-bls-seed";

/// A scalar in the BLS12-381 scalar field. Valid keys are non-zero.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(pub(crate) Scalar);

/// A point in G2.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub(crate) G2Projective);

/// A point in G1.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub(crate) G1Projective);

impl SecretKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let scalar = Scalar::random(&mut *rng);

            if !bool::from(scalar.is_zero()) {
                return SecretKey(scalar);
            }
        }
    }

    /// Derives a key deterministically from arbitrary seed material.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut counter = 0u64;

        loop {
            let scalar = hash_to_scalar(SEED_DOMAIN, &[seed, &counter.to_be_bytes()]);

            if !bool::from(scalar.is_zero()) {
                return SecretKey(scalar);
            }

            counter += 1;
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> BLSResult<Self> {
        let arr = fixed::<SECRET_KEY_LENGTH>(bytes)?;

        let scalar: Option<Scalar> = Scalar::from_bytes_be(&arr).into();

        let scalar = scalar.ok_or(BLSError::InvalidEncoding("secret key"))?;

        if bool::from(scalar.is_zero()) {
            return Err(BLSError::ZeroScalar);
        }

        Ok(SecretKey(scalar))
    }

    /// Accepts any 32-byte big-endian integer and reduces it modulo the order.
    pub fn from_bytes_reduced(bytes: &[u8; SECRET_KEY_LENGTH]) -> BLSResult<Self> {
        let scalar = scalar_from_be_reduced(bytes);

        if bool::from(scalar.is_zero()) {
            return Err(BLSError::ZeroScalar);
        }

        Ok(SecretKey(scalar))
    }

    pub fn from_hex(s: &str) -> BLSResult<Self> {
        SecretKey::from_bytes(&decode_hex(s)?)
    }

    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.0.to_bytes_be()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn is_valid(&self) -> bool {
        !bool::from(self.0.is_zero())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(G2Projective::generator() * self.0)
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(hash_to_g1(message) * self.0)
    }

    /// Sums secret shares pointwise.
    pub fn aggregate<'a, I>(keys: I) -> BLSResult<SecretKey>
    where
        I: IntoIterator<Item = &'a SecretKey>,
    {
        let mut iter = keys.into_iter().peekable();

        if iter.peek().is_none() {
            return Err(BLSError::EmptyInput);
        }

        Ok(SecretKey(iter.map(|k| k.0).sum()))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> BLSResult<Self> {
        let arr = fixed::<PUBLIC_KEY_LENGTH>(bytes)?;

        let point: Option<G2Affine> = G2Affine::from_compressed(&arr).into();

        let point = point.ok_or(BLSError::InvalidEncoding("public key"))?;

        if bool::from(point.is_identity()) {
            return Err(BLSError::IdentityPoint);
        }

        Ok(PublicKey(point.into()))
    }

    pub fn from_hex(s: &str) -> BLSResult<Self> {
        PublicKey::from_bytes(&decode_hex(s)?)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_affine().to_compressed()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn is_valid(&self) -> bool {
        !bool::from(self.0.is_identity())
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        if !self.is_valid() || !signature.is_valid() {
            return false;
        }

        let lhs = blstrs::pairing(&signature.0.to_affine(), &G2Affine::generator());

        let rhs = blstrs::pairing(&hash_to_g1(message).to_affine(), &self.0.to_affine());

        lhs == rhs
    }

    pub fn aggregate<'a, I>(keys: I) -> BLSResult<PublicKey>
    where
        I: IntoIterator<Item = &'a PublicKey>,
    {
        let mut iter = keys.into_iter().peekable();

        if iter.peek().is_none() {
            return Err(BLSError::EmptyInput);
        }

        Ok(PublicKey(iter.map(|k| k.0).sum()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();

        write!(f, "PublicKey(0x{}..)", hex::encode(&bytes[..6]))
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> BLSResult<Self> {
        let arr = fixed::<SIGNATURE_LENGTH>(bytes)?;

        let point: Option<G1Affine> = G1Affine::from_compressed(&arr).into();

        let point = point.ok_or(BLSError::InvalidEncoding("signature"))?;

        if bool::from(point.is_identity()) {
            return Err(BLSError::IdentityPoint);
        }

        Ok(Signature(point.into()))
    }

    pub fn from_hex(s: &str) -> BLSResult<Self> {
        Signature::from_bytes(&decode_hex(s)?)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_affine().to_compressed()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn is_valid(&self) -> bool {
        !bool::from(self.0.is_identity())
    }

    pub fn aggregate<'a, I>(signatures: I) -> BLSResult<Signature>
    where
        I: IntoIterator<Item = &'a Signature>,
    {
        let mut iter = signatures.into_iter().peekable();

        if iter.peek().is_none() {
            return Err(BLSError::EmptyInput);
        }

        Ok(Signature(iter.map(|s| s.0).sum()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();

        write!(f, "Signature(0x{}..)", hex::encode(&bytes[..6]))
    }
}

impl Add for PublicKey {
    type Output = PublicKey;

    fn add(self, rhs: PublicKey) -> PublicKey {
        PublicKey(self.0 + rhs.0)
    }
}

impl Sum for PublicKey {
    fn sum<I: Iterator<Item = PublicKey>>(iter: I) -> Self {
        PublicKey(iter.map(|k| k.0).sum())
    }
}

pub(crate) fn hash_to_g1(message: &[u8]) -> G1Projective {
    G1Projective::hash_to_curve(message, SIGNATURE_DST, &[])
}

fn fixed<const N: usize>(bytes: &[u8]) -> BLSResult<[u8; N]> {
    if bytes.len() != N {
        return Err(BLSError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }

    let mut arr = [0u8; N];

    arr.copy_from_slice(bytes);

    Ok(arr)
}

macro_rules! impl_serde_bytes {
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

impl_serde_bytes!(SecretKey);
impl_serde_bytes!(PublicKey);
impl_serde_bytes!(Signature);

#[cfg(test)]
pub mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::thread_rng;
    use static_assertions::assert_impl_all;

    assert_impl_all!(PublicKey: Send, Sync, Copy);
    assert_impl_all!(Signature: Send, Sync, Copy);

    #[test]
    fn test_sign_and_verify() {
        let sk = SecretKey::generate(&mut thread_rng());

        let pk = sk.public_key();

        let sig = sk.sign(b"hello");

        assert!(pk.verify(b"hello", &sig));
        assert!(!pk.verify(b"hellp", &sig));

        let other = SecretKey::generate(&mut thread_rng()).public_key();

        assert!(!other.verify(b"hello", &sig));
    }

    #[test]
    fn test_fixed_width_encodings() {
        let sk = SecretKey::from_seed(b"seed");

        assert_eq!(sk.to_bytes().len(), SECRET_KEY_LENGTH);
        assert_eq!(sk.public_key().to_bytes().len(), PUBLIC_KEY_LENGTH);
        assert_eq!(sk.sign(b"m").to_bytes().len(), SIGNATURE_LENGTH);

        assert_eq!(SecretKey::from_hex(&sk.to_hex()).unwrap(), sk);
        assert_eq!(
            PublicKey::from_hex(&sk.public_key().to_hex()).unwrap(),
            sk.public_key()
        );
        assert_eq!(
            Signature::from_bytes(&sk.sign(b"m").to_bytes()).unwrap(),
            sk.sign(b"m")
        );
    }

    #[test]
    fn test_malformed_encodings_are_errors() {
        assert_eq!(
            SecretKey::from_bytes(&[0u8; 31]),
            Err(BLSError::InvalidLength {
                expected: 32,
                actual: 31
            })
        );

        assert_eq!(SecretKey::from_bytes(&[0u8; 32]), Err(BLSError::ZeroScalar));

        assert!(PublicKey::from_bytes(&[7u8; 96]).is_err());

        assert!(Signature::from_bytes(&[1u8; 48]).is_err());
    }

    #[test]
    fn test_identity_points_are_rejected() {
        let identity_pk = G2Projective::identity().to_affine().to_compressed();
        let identity_sig = G1Projective::identity().to_affine().to_compressed();

        assert_eq!(
            PublicKey::from_bytes(&identity_pk),
            Err(BLSError::IdentityPoint)
        );
        assert_eq!(
            Signature::from_bytes(&identity_sig),
            Err(BLSError::IdentityPoint)
        );
    }

    #[test]
    fn test_aggregate_is_linear() {
        let a = SecretKey::from_seed(b"a");
        let b = SecretKey::from_seed(b"b");

        let sum = SecretKey::aggregate(&[a.clone(), b.clone()]).unwrap();

        let pk = PublicKey::aggregate(&[a.public_key(), b.public_key()]).unwrap();

        assert_eq!(sum.public_key(), pk);

        let sig = Signature::aggregate(&[a.sign(b"m"), b.sign(b"m")]).unwrap();

        assert!(pk.verify(b"m", &sig));
    }

    #[test]
    fn test_aggregate_of_nothing_is_an_error() {
        let empty: Vec<SecretKey> = vec![];

        assert_eq!(SecretKey::aggregate(&empty), Err(BLSError::EmptyInput));
    }

    #[test]
    fn test_serde_bincode() {
        let sk = SecretKey::from_seed(b"serde");

        let bytes = bincode::serialize(&sk.public_key()).unwrap();

        let pk: PublicKey = bincode::deserialize(&bytes).unwrap();

        assert_eq!(pk, sk.public_key());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_sign_verify(seed in any::<[u8; 32]>(), message in proptest::collection::vec(any::<u8>(), 0..64)) {
            let sk = SecretKey::from_seed(&seed);

            let sig = sk.sign(&message);

            prop_assert!(sk.public_key().verify(&message, &sig));
        }
    }
}
