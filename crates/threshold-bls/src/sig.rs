use crate::error::{BLSError, BLSResult};
use crate::id::Id;
use crate::keys::{PublicKey, SecretKey, Signature};
use crate::poly::lagrange_coefficients;
use blstrs::G1Projective;
use std::collections::BTreeMap;

pub fn sign(secret_key: &SecretKey, message: &[u8]) -> Signature {
    secret_key.sign(message)
}

pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}

pub fn aggregate_signatures(signatures: &[Signature]) -> BLSResult<Signature> {
    Signature::aggregate(signatures)
}

/// Recovers the group signature from partial signatures keyed by signer id.
///
/// The interpolation set is always the `threshold` smallest ids, so every node
/// holding the same partials computes the same bytes.
pub fn recover_group_signature(
    partials: &BTreeMap<Id, Signature>,
    threshold: usize,
) -> BLSResult<Signature> {
    if threshold == 0 || partials.len() < threshold {
        return Err(BLSError::NotEnoughShares {
            threshold,
            actual: partials.len(),
        });
    }

    let (ids, sigs): (Vec<Id>, Vec<Signature>) =
        partials.iter().take(threshold).map(|(id, s)| (*id, *s)).unzip();

    let coefficients = lagrange_coefficients(&ids)?;

    let point: G1Projective = sigs
        .iter()
        .zip(coefficients.iter())
        .map(|(s, l)| s.0 * l)
        .sum();

    Ok(Signature(point))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::poly::Poly;
    use proptest::prelude::*;

    fn setup(n: usize, threshold: usize) -> (PublicKey, Vec<(Id, SecretKey)>) {
        let poly = Poly::from_secret_seed(&SecretKey::from_seed(b"group"), threshold).unwrap();

        let shares = (0..n)
            .map(|i| {
                let id = Id::from_address(format!("m{}", i).as_bytes());
                (id, poly.eval(&id))
            })
            .collect();

        (poly.public_key(), shares)
    }

    #[test]
    fn test_recovered_signature_verifies_under_group_key() {
        let (group_pk, shares) = setup(4, 3);

        let partials: BTreeMap<Id, Signature> = shares
            .iter()
            .map(|(id, sk)| (*id, sign(sk, b"block")))
            .collect();

        let sig = recover_group_signature(&partials, 3).unwrap();

        assert!(verify(&group_pk, b"block", &sig));
    }

    #[test]
    fn test_not_enough_partials() {
        let (_, shares) = setup(4, 3);

        let partials: BTreeMap<Id, Signature> = shares
            .iter()
            .take(2)
            .map(|(id, sk)| (*id, sign(sk, b"block")))
            .collect();

        assert_eq!(
            recover_group_signature(&partials, 3),
            Err(BLSError::NotEnoughShares {
                threshold: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_aggregate_of_same_message() {
        let a = SecretKey::from_seed(b"a");
        let b = SecretKey::from_seed(b"b");

        let sig = aggregate_signatures(&[sign(&a, b"m"), sign(&b, b"m")]).unwrap();

        let pk = PublicKey::aggregate(&[a.public_key(), b.public_key()]).unwrap();

        assert!(verify(&pk, b"m", &sig));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_any_subset_yields_the_same_signature(skip in 0usize..3) {
            let (_, shares) = setup(5, 3);

            let all: BTreeMap<Id, Signature> = shares
                .iter()
                .map(|(id, sk)| (*id, sign(sk, b"msg")))
                .collect();

            let subset: BTreeMap<Id, Signature> = all
                .iter()
                .skip(skip)
                .map(|(id, s)| (*id, *s))
                .collect();

            prop_assert_eq!(
                recover_group_signature(&all, 3).unwrap(),
                recover_group_signature(&subset, 3).unwrap()
            );
        }
    }
}
