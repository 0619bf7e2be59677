use blstrs::Scalar;
use ff::Field;
use sha2::{Digest, Sha512};

/// Reduces a 512-bit big-endian integer modulo the scalar field order.
pub(crate) fn scalar_from_wide(bytes: &[u8; 64]) -> Scalar {
    let base = Scalar::from(u64::MAX) + Scalar::ONE;

    bytes.chunks(8).fold(Scalar::ZERO, |acc, chunk| {
        let mut limb = [0u8; 8];

        limb.copy_from_slice(chunk);

        acc * base + Scalar::from(u64::from_be_bytes(limb))
    })
}

/// Reduces a 256-bit big-endian integer modulo the scalar field order.
pub(crate) fn scalar_from_be_reduced(bytes: &[u8; 32]) -> Scalar {
    let mut wide = [0u8; 64];

    wide[32..].copy_from_slice(bytes);

    scalar_from_wide(&wide)
}

pub(crate) fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();

    hasher.update(domain);

    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }

    let digest: [u8; 64] = hasher.finalize().into();

    scalar_from_wide(&digest)
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_small_values_are_not_reduced() {
        let mut bytes = [0u8; 32];
        bytes[31] = 7;
        bytes[23] = 1;

        let expected = Scalar::from(7u64) + Scalar::from(u64::MAX) + Scalar::ONE;

        assert_eq!(scalar_from_be_reduced(&bytes), expected);
    }

    #[test]
    fn test_reduction_is_canonical() {
        let s = scalar_from_be_reduced(&[0xff; 32]);

        let round_trip = Scalar::from_bytes_be(&s.to_bytes_be());

        assert_eq!(Option::<Scalar>::from(round_trip), Some(s));
    }
}
