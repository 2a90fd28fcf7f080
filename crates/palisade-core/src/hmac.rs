//! HMAC (RFC 2104) over any [`MessageDigest`].

use crate::error::Result;
use crate::hash::{self, MessageDigest};
use zeroize::Zeroize;

pub struct Hmac {
    /// Running inner hash, already fed `K' ^ ipad`.
    inner: Box<dyn MessageDigest>,
    ipad: Vec<u8>,
    opad: Vec<u8>,
}

impl Hmac {
    /// Create an HMAC keyed for `algorithm` (a [`hash::create`] name).
    pub fn new(algorithm: &str, key: &[u8]) -> Result<Self> {
        Ok(Self::with_digest(hash::create(algorithm)?, key))
    }

    pub fn with_digest(mut md: Box<dyn MessageDigest>, key: &[u8]) -> Self {
        let block_len = md.block_length();
        let mut k = if key.len() > block_len {
            md.start();
            md.update(key);
            md.digest()
        } else {
            key.to_vec()
        };
        k.resize(block_len, 0);

        let ipad: Vec<u8> = k.iter().map(|b| b ^ 0x36).collect();
        let opad: Vec<u8> = k.iter().map(|b| b ^ 0x5c).collect();
        k.zeroize();

        md.start();
        md.update(&ipad);
        Hmac { inner: md, ipad, opad }
    }

    /// Restart the running hash, keeping the derived key pads. The TLS PRF
    /// calls this between every `P_hash` iteration.
    pub fn reset(&mut self) {
        self.inner.start();
        self.inner.update(&self.ipad);
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// `H((K' ^ opad) || H((K' ^ ipad) || M))`. Snapshot-based like the
    /// digests underneath, so it can be read mid-stream.
    pub fn digest(&self) -> Vec<u8> {
        let inner_digest = self.inner.digest();
        let mut outer = self.inner.box_clone();
        outer.start();
        outer.update(&self.opad);
        outer.update(&inner_digest);
        outer.digest()
    }

    pub fn digest_length(&self) -> usize {
        self.inner.digest_length()
    }

    pub fn algorithm(&self) -> &'static str {
        self.inner.algorithm()
    }
}

impl Drop for Hmac {
    fn drop(&mut self) {
        self.ipad.zeroize();
        self.opad.zeroize();
    }
}

/// One-shot convenience.
pub fn hmac(algorithm: &str, key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let mut h = Hmac::new(algorithm, key)?;
    h.update(message);
    Ok(h.digest())
}
