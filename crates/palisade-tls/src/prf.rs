//! The TLS 1.0/1.1 pseudorandom function: `P_MD5` over the first half of
//! the secret XORed with `P_SHA1` over the second half, halves overlapping
//! by one byte when the secret length is odd.

use palisade_core::{Hmac, Result};

/// `P_hash(secret, seed)` expanded to `length` bytes (RFC 2246 §5).
pub fn p_hash(algorithm: &str, secret: &[u8], seed: &[u8], length: usize) -> Result<Vec<u8>> {
    let mut hmac = Hmac::new(algorithm, secret)?;
    let mut out = Vec::with_capacity(length);

    // A(1) = HMAC(secret, seed)
    hmac.update(seed);
    let mut a = hmac.digest();
    while out.len() < length {
        hmac.reset();
        hmac.update(&a);
        hmac.update(seed);
        let block = hmac.digest();
        let take = (length - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);

        hmac.reset();
        hmac.update(&a);
        a = hmac.digest();
    }
    Ok(out)
}

/// `PRF(secret, label, seed, length)` for TLS 1.0/1.1.
pub fn prf_tls1(secret: &[u8], label: &str, seed: &[u8], length: usize) -> Result<Vec<u8>> {
    let half = (secret.len() + 1) / 2;
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];

    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label.as_bytes());
    label_seed.extend_from_slice(seed);

    let md5 = p_hash("md5", s1, &label_seed, length)?;
    let sha1 = p_hash("sha1", s2, &label_seed, length)?;
    Ok(md5.iter().zip(&sha1).map(|(a, b)| a ^ b).collect())
}
