//! Ed25519 signing and verification, delegated to `ed25519-dalek`.
//! Key transport (PKCS#8 / SPKI / PEM) is in [`super::encoding`].

use crate::error::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};

pub const SEED_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

pub struct Ed25519KeyPair {
    signing: SigningKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ed25519PublicKey {
    verifying: VerifyingKey,
}

impl Ed25519KeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Ed25519KeyPair { signing: SigningKey::generate(rng) }
    }

    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: &[u8; SEED_LEN] = seed
            .try_into()
            .map_err(|_| Error::InvalidParameter("Ed25519 seed must be 32 bytes"))?;
        Ok(Ed25519KeyPair { signing: SigningKey::from_bytes(seed) })
    }

    pub fn seed(&self) -> [u8; SEED_LEN] {
        self.signing.to_bytes()
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey { verifying: self.signing.verifying_key() }
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing.sign(message).to_bytes()
    }
}

impl Ed25519PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidParameter("Ed25519 public key must be 32 bytes"))?;
        let verifying = VerifyingKey::from_bytes(bytes)
            .map_err(|_| Error::InvalidParameter("invalid Ed25519 point encoding"))?;
        Ok(Ed25519PublicKey { verifying })
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        self.verifying.as_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        self.verifying.verify(message, &sig).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Fortuna;
    use hex_literal::hex;

    #[test]
    fn sign_verify_round_trip() {
        let mut rng = Fortuna::from_seed(b"ed25519 tests");
        let pair = Ed25519KeyPair::generate(&mut rng);
        let sig = pair.sign(b"hello ed25519");
        assert!(pair.public_key().verify(b"hello ed25519", &sig));
        assert!(!pair.public_key().verify(b"hello ed25518", &sig));
    }

    #[test]
    fn rfc8032_test_vector_1() {
        // RFC 8032 §7.1, TEST 1 (empty message).
        let seed = hex!("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60");
        let pair = Ed25519KeyPair::from_seed(&seed).unwrap();
        assert_eq!(
            pair.public_key().as_bytes(),
            &hex!("d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a")
        );
        let sig = pair.sign(b"");
        assert_eq!(
            sig.to_vec(),
            hex!(
                "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155"
                "5fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b"
            )
            .to_vec()
        );
        assert!(pair.public_key().verify(b"", &sig));
    }

    #[test]
    fn seed_round_trip() {
        let mut rng = Fortuna::from_seed(b"seed rt");
        let pair = Ed25519KeyPair::generate(&mut rng);
        let again = Ed25519KeyPair::from_seed(&pair.seed()).unwrap();
        assert_eq!(pair.public_key(), again.public_key());
    }
}
