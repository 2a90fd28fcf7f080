//! PBKDF2 (RFC 2898 §5.2) with an HMAC PRF.

use crate::error::{Error, Result};
use crate::hmac::Hmac;

/// Derive `dk_len` bytes from `password` and `salt` over `iterations`
/// rounds of `HMAC-<algorithm>`.
pub fn pbkdf2(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    dk_len: usize,
    algorithm: &str,
) -> Result<Vec<u8>> {
    if iterations == 0 {
        return Err(Error::InvalidParameter("pbkdf2 iteration count must be nonzero"));
    }
    let mut prf = Hmac::new(algorithm, password)?;
    let h_len = prf.digest_length();
    // dkLen cap from the RFC; unreachable for any sane request but cheap to
    // state exactly.
    if dk_len as u64 > (u32::MAX as u64) * h_len as u64 {
        return Err(Error::InvalidParameter("pbkdf2 derived key too long"));
    }

    let mut dk = Vec::with_capacity(dk_len);
    let mut block_index: u32 = 1;
    while dk.len() < dk_len {
        // U_1 = PRF(P, S || INT(i))
        prf.reset();
        prf.update(salt);
        prf.update(&block_index.to_be_bytes());
        let mut u = prf.digest();
        let mut t = u.clone();
        // U_j = PRF(P, U_{j-1}); T_i = U_1 ^ ... ^ U_c
        for _ in 1..iterations {
            prf.reset();
            prf.update(&u);
            u = prf.digest();
            for (acc, b) in t.iter_mut().zip(&u) {
                *acc ^= b;
            }
        }
        let take = (dk_len - dk.len()).min(t.len());
        dk.extend_from_slice(&t[..take]);
        block_index += 1;
    }
    Ok(dk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6070_sha1_vectors() {
        let dk = pbkdf2(b"password", b"salt", 1, 20, "sha1").unwrap();
        assert_eq!(hex::encode(dk), "0c60c80f961f0e71f3a9b524af6012062fe037a6");

        let dk = pbkdf2(b"password", b"salt", 2, 20, "sha1").unwrap();
        assert_eq!(hex::encode(dk), "ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957");

        let dk = pbkdf2(b"password", b"salt", 4096, 20, "sha1").unwrap();
        assert_eq!(hex::encode(dk), "4b007901b765489abead49d926f721d065a429c1");
    }

    #[test]
    fn rfc6070_multi_block() {
        let dk = pbkdf2(
            b"passwordPASSWORDpassword",
            b"saltSALTsaltSALTsaltSALTsaltSALTsalt",
            4096,
            25,
            "sha1",
        )
        .unwrap();
        assert_eq!(
            hex::encode(dk),
            "3d2eec4fe41c849b80c8d83662c0e44a8b291a964cf2f07038"
        );
    }

    #[test]
    fn zero_iterations_rejected() {
        assert!(pbkdf2(b"p", b"s", 0, 16, "sha1").is_err());
    }
}
