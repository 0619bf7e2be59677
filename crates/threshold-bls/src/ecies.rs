//! Public-key encryption to a BLS public key: an ephemeral G2 Diffie-Hellman
//! followed by HKDF-SHA256 and ChaCha20-Poly1305.

use crate::error::{BLSError, BLSResult};
use crate::keys::{PublicKey, SecretKey};
use blstrs::G2Projective;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use group::{Curve, Group};
use hkdf::Hkdf;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

const KEY_DOMAIN: &[u8] = b"threshold-bls-ecies";

const NONCE_LENGTH: usize = 12;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EciesCipher {
    /// The ephemeral public key.
    pub ephemeral: PublicKey,
    pub nonce: [u8; NONCE_LENGTH],
    pub aead: Vec<u8>,
}

pub fn encrypt<R: RngCore + CryptoRng>(
    to: &PublicKey,
    message: &[u8],
    rng: &mut R,
) -> BLSResult<EciesCipher> {
    let ephemeral = SecretKey::generate(rng);

    let shared = to.0 * ephemeral.0;

    let key = derive_key(&shared)?;

    let mut nonce = [0u8; NONCE_LENGTH];
    rng.fill_bytes(&mut nonce);

    let aead = ChaCha20Poly1305::new(&key)
        .encrypt(Nonce::from_slice(&nonce), message)
        .map_err(|_| BLSError::EncryptionFailed)?;

    Ok(EciesCipher {
        ephemeral: ephemeral.public_key(),
        nonce,
        aead,
    })
}

pub fn decrypt(secret_key: &SecretKey, cipher: &EciesCipher) -> BLSResult<Vec<u8>> {
    let shared = cipher.ephemeral.0 * secret_key.0;

    let key = derive_key(&shared)?;

    ChaCha20Poly1305::new(&key)
        .decrypt(Nonce::from_slice(&cipher.nonce), cipher.aead.as_ref())
        .map_err(|_| BLSError::DecryptionFailed)
}

fn derive_key(shared: &G2Projective) -> BLSResult<Key> {
    if bool::from(shared.is_identity()) {
        return Err(BLSError::IdentityPoint);
    }

    let ikm = shared.to_affine().to_compressed();

    let hk = Hkdf::<Sha256>::new(None, &ikm);

    let mut okm = [0u8; 32];

    hk.expand(KEY_DOMAIN, &mut okm)
        .map_err(|_| BLSError::EncryptionFailed)?;

    Ok(Key::clone_from_slice(&okm))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn test_encrypt_then_decrypt() {
        let sk = SecretKey::generate(&mut thread_rng());

        let cipher = encrypt(&sk.public_key(), b"signing key share", &mut thread_rng()).unwrap();

        assert_eq!(decrypt(&sk, &cipher).unwrap(), b"signing key share".to_vec());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sk = SecretKey::generate(&mut thread_rng());
        let other = SecretKey::generate(&mut thread_rng());

        let cipher = encrypt(&sk.public_key(), b"secret", &mut thread_rng()).unwrap();

        assert_eq!(decrypt(&other, &cipher), Err(BLSError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let sk = SecretKey::generate(&mut thread_rng());

        let mut cipher = encrypt(&sk.public_key(), b"secret", &mut thread_rng()).unwrap();

        cipher.aead[0] ^= 1;

        assert!(decrypt(&sk, &cipher).is_err());
    }
}
