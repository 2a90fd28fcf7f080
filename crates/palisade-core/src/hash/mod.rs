//! Message digest family: MD5, SHA-1, SHA-256 and the SHA-512 variants.
//!
//! All algorithms stream through `update` and finalise with `digest`, which
//! operates on a snapshot of the running state: calling `digest` twice, or
//! continuing to `update` afterwards, behaves as if finalisation never
//! happened. That property is what lets the TLS handshake keep one rolling
//! transcript hash and emit intermediate digests from it.

mod md5;
mod sha1;
mod sha256;
mod sha512;

pub use md5::Md5;
pub use sha1::Sha1;
pub use sha256::Sha256;
pub use sha512::{Sha384, Sha512, Sha512_224, Sha512_256};

use crate::error::{Error, Result};

pub trait MessageDigest: Send {
    /// Canonical lowercase algorithm name, e.g. `"sha256"`.
    fn algorithm(&self) -> &'static str;

    /// Input block size in bytes (64 for the 32-bit family, 128 for SHA-512).
    fn block_length(&self) -> usize;

    /// Output size in bytes.
    fn digest_length(&self) -> usize;

    /// Reset to the algorithm's initial vector.
    fn start(&mut self);

    fn update(&mut self, data: &[u8]);

    /// Finalise a snapshot of the current state. Idempotent.
    fn digest(&self) -> Vec<u8>;

    fn box_clone(&self) -> Box<dyn MessageDigest>;
}

impl Clone for Box<dyn MessageDigest> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Instantiate a digest by name.
pub fn create(algorithm: &str) -> Result<Box<dyn MessageDigest>> {
    match algorithm {
        "md5" => Ok(Box::new(Md5::new())),
        "sha1" => Ok(Box::new(Sha1::new())),
        "sha256" => Ok(Box::new(Sha256::new())),
        "sha384" => Ok(Box::new(Sha384::new())),
        "sha512" => Ok(Box::new(Sha512::new())),
        "sha512/224" => Ok(Box::new(Sha512_224::new())),
        "sha512/256" => Ok(Box::new(Sha512_256::new())),
        other => Err(Error::UnknownAlgorithm(other.to_string())),
    }
}

/// One-shot convenience.
pub fn digest(algorithm: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut md = create(algorithm)?;
    md.update(data);
    Ok(md.digest())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_unknown_names() {
        assert!(matches!(create("sha3"), Err(Error::UnknownAlgorithm(_))));
    }

    #[test]
    fn digest_is_idempotent_and_resumable() {
        let mut md = create("sha256").unwrap();
        md.update(b"ab");
        let d1 = md.digest();
        let d2 = md.digest();
        assert_eq!(d1, d2);
        // Continuing after digest() behaves as if it was never called.
        md.update(b"c");
        assert_eq!(md.digest(), digest("sha256", b"abc").unwrap());
    }

    #[test]
    fn start_resets_state() {
        let mut md = create("sha1").unwrap();
        md.update(b"garbage");
        md.start();
        md.update(b"abc");
        assert_eq!(md.digest(), digest("sha1", b"abc").unwrap());
    }
}
