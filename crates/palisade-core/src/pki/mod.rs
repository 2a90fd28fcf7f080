//! Public-key cryptography: RSA (PKCS#1 v1.5, OAEP, PSS) over the bignum
//! layer, Ed25519, and DER/PEM key transport.

pub mod ed25519;
pub mod encoding;
pub mod rsa;

pub use ed25519::{Ed25519KeyPair, Ed25519PublicKey};
pub use rsa::{RsaPrivateKey, RsaPublicKey};
