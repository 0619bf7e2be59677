use crate::curve::hash_to_scalar;
use crate::error::{BLSError, BLSResult};
use crate::id::Id;
use crate::keys::{PublicKey, SecretKey};
use blstrs::{G2Projective, Scalar};
use ff::Field;
use group::Group;
use std::collections::BTreeSet;

const COEFFICIENT_DOMAIN: &[u8] = b"threshold-bls-poly";

/// A secret polynomial of degree `threshold - 1`. The constant term is the
/// dealer's secret.
#[derive(Clone)]
pub struct Poly {
    coefficients: Vec<Scalar>,
}

impl Poly {
    /// Derives every coefficient from the seed key, so a node that loses its
    /// in-memory state regenerates the same shares.
    pub fn from_secret_seed(seed: &SecretKey, threshold: usize) -> BLSResult<Self> {
        if threshold == 0 {
            return Err(BLSError::NotEnoughShares {
                threshold: 1,
                actual: 0,
            });
        }

        let mut coefficients = Vec::with_capacity(threshold);

        coefficients.push(seed.0);

        let seed_bytes = seed.to_bytes();

        for i in 1..threshold {
            let mut c = hash_to_scalar(COEFFICIENT_DOMAIN, &[&seed_bytes, &(i as u64).to_be_bytes()]);

            if bool::from(c.is_zero()) {
                c = Scalar::ONE;
            }

            coefficients.push(c);
        }

        Ok(Poly { coefficients })
    }

    pub fn threshold(&self) -> usize {
        self.coefficients.len()
    }

    pub fn secret(&self) -> SecretKey {
        SecretKey(self.coefficients[0])
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret().public_key()
    }

    /// Horner evaluation at the scalar behind `id`.
    pub fn eval(&self, id: &Id) -> SecretKey {
        let x = id.to_scalar();

        let value = self
            .coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, c| acc * x + c);

        SecretKey(value)
    }

    /// One share per id, in the order given.
    pub fn share_secret(&self, ids: &[Id]) -> Vec<SecretKey> {
        ids.iter().map(|id| self.eval(id)).collect()
    }

    /// Public commitments to each coefficient.
    pub fn commitments(&self) -> Vec<PublicKey> {
        self.coefficients
            .iter()
            .map(|c| PublicKey(G2Projective::generator() * c))
            .collect()
    }
}

/// Checks a share against the dealer's published coefficient commitments.
pub fn verify_share(commitments: &[PublicKey], id: &Id, share: &SecretKey) -> bool {
    if commitments.is_empty() {
        return false;
    }

    let x = id.to_scalar();

    let expected = commitments
        .iter()
        .rev()
        .fold(G2Projective::identity(), |acc, c| acc * x + c.0);

    expected == share.public_key().0
}

/// Lagrange basis coefficients at zero for the given evaluation points.
pub fn lagrange_coefficients(ids: &[Id]) -> BLSResult<Vec<Scalar>> {
    if ids.is_empty() {
        return Err(BLSError::EmptyInput);
    }

    let unique: BTreeSet<&Id> = ids.iter().collect();

    if unique.len() != ids.len() {
        return Err(BLSError::DuplicateId);
    }

    let xs: Vec<Scalar> = ids.iter().map(|id| id.to_scalar()).collect();

    xs.iter()
        .enumerate()
        .map(|(i, xi)| {
            let mut num = Scalar::ONE;
            let mut den = Scalar::ONE;

            for (j, xj) in xs.iter().enumerate() {
                if i == j {
                    continue;
                }

                num *= xj;
                den *= *xj - xi;
            }

            let inv: Option<Scalar> = den.invert().into();

            inv.map(|inv| num * inv).ok_or(BLSError::DuplicateId)
        })
        .collect()
}

/// Recovers the secret at zero from exactly the shares given.
pub fn recover_secret_key(shares: &[(Id, SecretKey)]) -> BLSResult<SecretKey> {
    let ids: Vec<Id> = shares.iter().map(|(id, _)| *id).collect();

    let coefficients = lagrange_coefficients(&ids)?;

    let secret = shares
        .iter()
        .zip(coefficients.iter())
        .map(|((_, share), l)| share.0 * l)
        .sum();

    Ok(SecretKey(secret))
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Id> {
        (0..n)
            .map(|i| Id::from_address(format!("member-{}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn test_poly_is_deterministic() {
        let seed = SecretKey::from_seed(b"dealer");

        let a = Poly::from_secret_seed(&seed, 3).unwrap();
        let b = Poly::from_secret_seed(&seed, 3).unwrap();

        let members = ids(4);

        assert_eq!(a.share_secret(&members), b.share_secret(&members));
        assert_eq!(a.public_key(), seed.public_key());
    }

    #[test]
    fn test_any_threshold_subset_recovers_the_secret() {
        let seed = SecretKey::from_seed(b"dealer");
        let poly = Poly::from_secret_seed(&seed, 3).unwrap();

        let members = ids(5);
        let shares = poly.share_secret(&members);

        let pairs: Vec<(Id, SecretKey)> = members.iter().cloned().zip(shares).collect();

        let first = recover_secret_key(&pairs[..3]).unwrap();
        let last = recover_secret_key(&pairs[2..]).unwrap();

        assert_eq!(first, seed);
        assert_eq!(last, seed);
    }

    #[test]
    fn test_shares_match_commitments() {
        let poly = Poly::from_secret_seed(&SecretKey::from_seed(b"dealer"), 3).unwrap();

        let commitments = poly.commitments();

        let member = ids(1)[0];

        assert!(verify_share(&commitments, &member, &poly.eval(&member)));
        assert!(!verify_share(
            &commitments,
            &member,
            &SecretKey::from_seed(b"forged")
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let members = ids(2);

        assert_eq!(
            lagrange_coefficients(&[members[0], members[1], members[0]]),
            Err(BLSError::DuplicateId)
        );
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        assert!(Poly::from_secret_seed(&SecretKey::from_seed(b"x"), 0).is_err());
    }
}
