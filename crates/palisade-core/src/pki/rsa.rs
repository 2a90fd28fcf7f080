//! RSA key generation and the PKCS#1 padding family (RFC 8017).
//!
//! The modular arithmetic comes from `num-bigint-dig`; everything above the
//! `modpow` line — EME-PKCS1-v1_5, EME-OAEP, EMSA-PKCS1-v1_5, EMSA-PSS —
//! is implemented here. OAEP decoding scans the whole padding region
//! without early exit and PSS/v1.5 verification compares encoded messages
//! in constant time.

use crate::asn1::{self, Asn1};
use crate::error::{Error, Result};
use crate::hash;
use crate::oids;
use num_bigint_dig::traits::ModInverse;
use num_bigint_dig::{BigUint, RandPrime};
use num_traits::{One, Zero};
use rand_core::{CryptoRng, RngCore};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};

pub const PUBLIC_EXPONENT: u64 = 65537;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    n: BigUint,
    e: BigUint,
}

#[derive(Debug, Clone)]
pub struct RsaPrivateKey {
    public: RsaPublicKey,
    d: BigUint,
    p: BigUint,
    q: BigUint,
    d_p: BigUint,
    d_q: BigUint,
    q_inv: BigUint,
}

impl RsaPublicKey {
    pub fn new(n: BigUint, e: BigUint) -> Result<Self> {
        if n.bits() < 512 {
            return Err(Error::InvalidParameter("RSA modulus below 512 bits"));
        }
        if e < BigUint::from(3u8) || e.bits() > 31 {
            return Err(Error::InvalidParameter("unreasonable RSA public exponent"));
        }
        Ok(RsaPublicKey { n, e })
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn e(&self) -> &BigUint {
        &self.e
    }

    /// Modulus size in bytes; every ciphertext and signature is this long.
    pub fn size(&self) -> usize {
        (self.n.bits() + 7) / 8
    }

    fn rsep(&self, m: &BigUint) -> BigUint {
        m.modpow(&self.e, &self.n)
    }

    // -- encryption ------------------------------------------------------

    /// RSAES-PKCS1-v1_5 (block type 2).
    pub fn encrypt_pkcs1v15<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        msg: &[u8],
    ) -> Result<Vec<u8>> {
        let k = self.size();
        if msg.len() + 11 > k {
            return Err(Error::MessageTooLong);
        }
        let mut em = vec![0u8; k];
        em[1] = 0x02;
        // Nonzero random padding octets.
        for b in em[2..k - msg.len() - 1].iter_mut() {
            let mut byte = [0u8; 1];
            loop {
                rng.fill_bytes(&mut byte);
                if byte[0] != 0 {
                    break;
                }
            }
            *b = byte[0];
        }
        em[k - msg.len()..].copy_from_slice(msg);
        Ok(i2osp(&self.rsep(&os2ip(&em)), k))
    }

    /// RSAES-OAEP with an MGF1 over the same digest.
    pub fn encrypt_oaep<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        msg: &[u8],
        label: &[u8],
        digest_algorithm: &str,
    ) -> Result<Vec<u8>> {
        let k = self.size();
        let h_len = hash::create(digest_algorithm)?.digest_length();
        if msg.len() + 2 * h_len + 2 > k {
            return Err(Error::MessageTooLong);
        }

        let l_hash = hash::digest(digest_algorithm, label)?;
        let mut db = vec![0u8; k - h_len - 1];
        db[..h_len].copy_from_slice(&l_hash);
        let msg_at = db.len() - msg.len();
        db[msg_at - 1] = 0x01;
        db[msg_at..].copy_from_slice(msg);

        let mut seed = vec![0u8; h_len];
        rng.fill_bytes(&mut seed);

        let db_mask = mgf1(&seed, db.len(), digest_algorithm)?;
        for (b, m) in db.iter_mut().zip(&db_mask) {
            *b ^= m;
        }
        let seed_mask = mgf1(&db, h_len, digest_algorithm)?;
        for (b, m) in seed.iter_mut().zip(&seed_mask) {
            *b ^= m;
        }

        let mut em = Vec::with_capacity(k);
        em.push(0);
        em.extend_from_slice(&seed);
        em.extend_from_slice(&db);
        Ok(i2osp(&self.rsep(&os2ip(&em)), k))
    }

    // -- signature verification ------------------------------------------

    /// RSASSA-PKCS1-v1_5: true iff `signature` covers `digest`.
    pub fn verify_pkcs1v15(
        &self,
        digest_algorithm: &str,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let k = self.size();
        if signature.len() != k {
            return Ok(false);
        }
        let em = i2osp(&self.rsep(&os2ip(signature)), k);
        let expected = emsa_pkcs1v15(digest_algorithm, digest, k)?;
        Ok(em.ct_eq(&expected).into())
    }

    /// RSASSA-PSS with salt length equal to the digest length.
    pub fn verify_pss(
        &self,
        digest_algorithm: &str,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let k = self.size();
        if signature.len() != k {
            return Ok(false);
        }
        let em_bits = self.n.bits() - 1;
        let em_len = (em_bits + 7) / 8;
        let m = self.rsep(&os2ip(signature));
        if m.bits() > em_bits {
            return Ok(false);
        }
        let em = i2osp(&m, em_len);

        let h_len = hash::create(digest_algorithm)?.digest_length();
        let s_len = h_len;
        if em_len < h_len + s_len + 2 || em[em_len - 1] != 0xbc {
            return Ok(false);
        }

        let (masked_db, rest) = em.split_at(em_len - h_len - 1);
        let h = &rest[..h_len];

        let top_bits = (8 * em_len - em_bits) as u32;
        if top_bits > 0 && masked_db[0] >> (8 - top_bits) != 0 {
            return Ok(false);
        }

        let db_mask = mgf1(h, masked_db.len(), digest_algorithm)?;
        let mut db: Vec<u8> = masked_db.iter().zip(&db_mask).map(|(a, b)| a ^ b).collect();
        if top_bits > 0 {
            db[0] &= 0xff >> top_bits;
        }

        let ps_len = em_len - h_len - s_len - 2;
        if db[..ps_len].iter().any(|&b| b != 0) || db[ps_len] != 0x01 {
            return Ok(false);
        }
        let salt = &db[ps_len + 1..];

        let mut md = hash::create(digest_algorithm)?;
        md.update(&[0u8; 8]);
        md.update(digest);
        md.update(salt);
        Ok(md.digest().as_slice().ct_eq(h).into())
    }
}

impl RsaPrivateKey {
    /// Generate a fresh keypair with e = 65537.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, bits: usize) -> Result<Self> {
        if bits < 512 || bits % 2 != 0 {
            return Err(Error::InvalidParameter("RSA key size must be an even number >= 512"));
        }
        let e = BigUint::from(PUBLIC_EXPONENT);
        loop {
            let p: BigUint = rng.gen_prime(bits / 2);
            let q: BigUint = rng.gen_prime(bits / 2);
            if p == q {
                continue;
            }
            let n = &p * &q;
            if n.bits() != bits {
                continue;
            }
            let phi = (&p - 1u8) * (&q - 1u8);
            // e must be invertible mod phi; retry on unlucky primes.
            let Some(d) = e.clone().mod_inverse(&phi).and_then(|d| d.to_biguint()) else {
                continue;
            };
            return Self::from_components(n, e, d, p, q);
        }
    }

    /// Assemble a key from its PKCS#1 components, recomputing the CRT
    /// exponents.
    pub fn from_components(
        n: BigUint,
        e: BigUint,
        d: BigUint,
        p: BigUint,
        q: BigUint,
    ) -> Result<Self> {
        if &p * &q != n {
            return Err(Error::InvalidParameter("RSA primes do not multiply to the modulus"));
        }
        let d_p = &d % (&p - 1u8);
        let d_q = &d % (&q - 1u8);
        let q_inv = q
            .clone()
            .mod_inverse(&p)
            .and_then(|v| v.to_biguint())
            .ok_or(Error::InvalidParameter("q has no inverse modulo p"))?;
        Ok(RsaPrivateKey {
            public: RsaPublicKey::new(n, e)?,
            d,
            p,
            q,
            d_p,
            d_q,
            q_inv,
        })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn size(&self) -> usize {
        self.public.size()
    }

    pub fn components(&self) -> (&BigUint, &BigUint, &BigUint, &BigUint, &BigUint, &BigUint, &BigUint, &BigUint) {
        (
            &self.public.n,
            &self.public.e,
            &self.d,
            &self.p,
            &self.q,
            &self.d_p,
            &self.d_q,
            &self.q_inv,
        )
    }

    /// Decryption primitive via the CRT.
    fn rsdp(&self, c: &BigUint) -> Result<BigUint> {
        if c >= &self.public.n {
            return Err(Error::InvalidParameter("ciphertext out of range"));
        }
        let m1 = c.modpow(&self.d_p, &self.p);
        let m2 = c.modpow(&self.d_q, &self.q);
        // h = qInv * (m1 - m2) mod p, kept nonnegative.
        let m2_mod_p = &m2 % &self.p;
        let diff = (&m1 + &self.p - m2_mod_p) % &self.p;
        let h = (&self.q_inv * diff) % &self.p;
        Ok(m2 + h * &self.q)
    }

    // -- decryption ------------------------------------------------------

    pub fn decrypt_pkcs1v15(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let k = self.size();
        if ciphertext.len() != k || k < 11 {
            return Err(Error::BadPadding);
        }
        let em = i2osp(&self.rsdp(&os2ip(ciphertext))?, k);

        // Scan the entire block; failure reasons are folded together.
        let mut invalid = u8::from(em[0] != 0x00) | u8::from(em[1] != 0x02);
        let mut index = 0u32;
        let mut looking = Choice::from(1u8);
        for (i, &b) in em.iter().enumerate().skip(2) {
            let is_zero = b.ct_eq(&0);
            index.conditional_assign(&(i as u32), looking & is_zero);
            looking &= !is_zero;
        }
        invalid |= looking.unwrap_u8();
        // At least eight nonzero padding octets.
        invalid |= u8::from(index < 10);
        if invalid != 0 {
            return Err(Error::BadPadding);
        }
        Ok(em[index as usize + 1..].to_vec())
    }

    pub fn decrypt_oaep(
        &self,
        ciphertext: &[u8],
        label: &[u8],
        digest_algorithm: &str,
    ) -> Result<Vec<u8>> {
        let k = self.size();
        let h_len = hash::create(digest_algorithm)?.digest_length();
        if ciphertext.len() != k || k < 2 * h_len + 2 {
            return Err(Error::BadPadding);
        }
        let em = i2osp(&self.rsdp(&os2ip(ciphertext))?, k);

        let l_hash = hash::digest(digest_algorithm, label)?;
        let (y, rest) = em.split_first().expect("k >= 2");
        let (masked_seed, masked_db) = rest.split_at(h_len);

        let seed_mask = mgf1(masked_db, h_len, digest_algorithm)?;
        let seed: Vec<u8> = masked_seed.iter().zip(&seed_mask).map(|(a, b)| a ^ b).collect();
        let db_mask = mgf1(&seed, masked_db.len(), digest_algorithm)?;
        let db: Vec<u8> = masked_db.iter().zip(&db_mask).map(|(a, b)| a ^ b).collect();

        // Constant-time: inspect every byte of the padding region whether or
        // not an earlier byte already failed.
        let mut invalid = Choice::from(u8::from(*y != 0));
        invalid |= !l_hash.ct_eq(&db[..h_len]);

        let mut looking = Choice::from(1u8);
        let mut index = 0u32;
        for (i, &b) in db.iter().enumerate().skip(h_len) {
            let is_zero = b.ct_eq(&0);
            let is_one = b.ct_eq(&1);
            index.conditional_assign(&(i as u32), looking & is_one);
            looking &= !is_one;
            invalid |= looking & !is_zero;
        }
        invalid |= looking;

        if invalid.unwrap_u8() != 0 {
            return Err(Error::BadPadding);
        }
        Ok(db[index as usize + 1..].to_vec())
    }

    // -- signing ---------------------------------------------------------

    /// RSASSA-PKCS1-v1_5 over an already-computed digest.
    pub fn sign_pkcs1v15(&self, digest_algorithm: &str, digest: &[u8]) -> Result<Vec<u8>> {
        let k = self.size();
        let em = emsa_pkcs1v15(digest_algorithm, digest, k)?;
        Ok(i2osp(&self.rsdp(&os2ip(&em))?, k))
    }

    /// Raw block-type-1 signature over caller-supplied content, used by the
    /// TLS CertificateVerify which signs a bare MD5‖SHA-1 transcript hash.
    pub fn sign_raw_pkcs1v15(&self, content: &[u8]) -> Result<Vec<u8>> {
        let k = self.size();
        if content.len() + 11 > k {
            return Err(Error::MessageTooLong);
        }
        let mut em = vec![0xffu8; k];
        em[0] = 0x00;
        em[1] = 0x01;
        em[k - content.len() - 1] = 0x00;
        em[k - content.len()..].copy_from_slice(content);
        Ok(i2osp(&self.rsdp(&os2ip(&em))?, k))
    }

    pub fn sign_pss<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        digest_algorithm: &str,
        digest: &[u8],
    ) -> Result<Vec<u8>> {
        let k = self.size();
        let em_bits = self.public.n.bits() - 1;
        let em_len = (em_bits + 7) / 8;
        let h_len = hash::create(digest_algorithm)?.digest_length();
        let s_len = h_len;
        if em_len < h_len + s_len + 2 {
            return Err(Error::MessageTooLong);
        }

        let mut salt = vec![0u8; s_len];
        rng.fill_bytes(&mut salt);

        let mut md = hash::create(digest_algorithm)?;
        md.update(&[0u8; 8]);
        md.update(digest);
        md.update(&salt);
        let h = md.digest();

        let mut db = vec![0u8; em_len - h_len - 1];
        let ps_len = db.len() - s_len - 1;
        db[ps_len] = 0x01;
        db[ps_len + 1..].copy_from_slice(&salt);

        let db_mask = mgf1(&h, db.len(), digest_algorithm)?;
        for (b, m) in db.iter_mut().zip(&db_mask) {
            *b ^= m;
        }
        let top_bits = (8 * em_len - em_bits) as u32;
        if top_bits > 0 {
            db[0] &= 0xff >> top_bits;
        }

        let mut em = db;
        em.extend_from_slice(&h);
        em.push(0xbc);
        Ok(i2osp(&self.rsdp(&os2ip(&em))?, k))
    }
}

/// Raw verification counterpart of [`RsaPrivateKey::sign_raw_pkcs1v15`]:
/// recovers the signed content from a block-type-1 signature.
pub fn recover_raw_pkcs1v15(key: &RsaPublicKey, signature: &[u8]) -> Result<Vec<u8>> {
    let k = key.size();
    if signature.len() != k {
        return Err(Error::BadPadding);
    }
    let em = i2osp(&key.rsep(&os2ip(signature)), k);
    if em[0] != 0x00 || em[1] != 0x01 {
        return Err(Error::BadPadding);
    }
    let mut i = 2;
    while i < k && em[i] == 0xff {
        i += 1;
    }
    if i < 10 || i >= k || em[i] != 0x00 {
        return Err(Error::BadPadding);
    }
    Ok(em[i + 1..].to_vec())
}

/// EMSA-PKCS1-v1_5: `00 01 FF.. 00 || DigestInfo`.
fn emsa_pkcs1v15(digest_algorithm: &str, digest: &[u8], k: usize) -> Result<Vec<u8>> {
    let t = asn1::to_der(&digest_info(digest_algorithm, digest)?);
    if t.len() + 11 > k {
        return Err(Error::MessageTooLong);
    }
    let mut em = vec![0xffu8; k];
    em[0] = 0x00;
    em[1] = 0x01;
    em[k - t.len() - 1] = 0x00;
    em[k - t.len()..].copy_from_slice(&t);
    Ok(em)
}

/// `DigestInfo ::= SEQUENCE { AlgorithmIdentifier, OCTET STRING }`.
pub fn digest_info(digest_algorithm: &str, digest: &[u8]) -> Result<Asn1> {
    let oid = oids::oid(digest_algorithm)
        .ok_or_else(|| Error::UnknownAlgorithm(digest_algorithm.to_string()))?;
    Ok(Asn1::sequence(vec![
        Asn1::sequence(vec![Asn1::oid(oid)?, Asn1::null()]),
        Asn1::octet_string(digest.to_vec()),
    ]))
}

/// MGF1 (RFC 8017 B.2.1).
pub fn mgf1(seed: &[u8], mask_len: usize, digest_algorithm: &str) -> Result<Vec<u8>> {
    let mut md = hash::create(digest_algorithm)?;
    let mut mask = Vec::with_capacity(mask_len);
    let mut counter: u32 = 0;
    while mask.len() < mask_len {
        md.start();
        md.update(seed);
        md.update(&counter.to_be_bytes());
        let block = md.digest();
        let take = (mask_len - mask.len()).min(block.len());
        mask.extend_from_slice(&block[..take]);
        counter += 1;
    }
    Ok(mask)
}

fn os2ip(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Fixed-width big-endian encoding.
fn i2osp(v: &BigUint, len: usize) -> Vec<u8> {
    let raw = v.to_bytes_be();
    debug_assert!(raw.len() <= len);
    let mut out = vec![0u8; len - raw.len().min(len)];
    out.extend_from_slice(&raw);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Fortuna;

    fn test_key() -> RsaPrivateKey {
        let mut rng = Fortuna::from_seed(b"rsa unit tests");
        RsaPrivateKey::generate(&mut rng, 1024).unwrap()
    }

    #[test]
    fn keypair_shape() {
        let key = test_key();
        assert_eq!(key.size(), 128);
        assert_eq!(key.public_key().e(), &BigUint::from(PUBLIC_EXPONENT));
        let (n, _e, d, p, q, _dp, _dq, _qinv) = key.components();
        assert_eq!(&(p * q), n);
        assert!(!d.is_zero());
        assert!(!n.is_one());
    }

    #[test]
    fn pkcs1v15_encrypt_round_trip() {
        let key = test_key();
        let mut rng = Fortuna::from_seed(b"padding rng");
        let ct = key
            .public_key()
            .encrypt_pkcs1v15(&mut rng, b"pre-master secret goes here")
            .unwrap();
        assert_eq!(ct.len(), key.size());
        assert_eq!(key.decrypt_pkcs1v15(&ct).unwrap(), b"pre-master secret goes here");
    }

    #[test]
    fn pkcs1v15_rejects_tampering() {
        let key = test_key();
        let mut rng = Fortuna::from_seed(b"padding rng");
        let mut ct = key.public_key().encrypt_pkcs1v15(&mut rng, b"msg").unwrap();
        ct[0] ^= 1;
        assert!(key.decrypt_pkcs1v15(&ct).is_err());
    }

    #[test]
    fn oaep_round_trip() {
        let key = test_key();
        let mut rng = Fortuna::from_seed(b"oaep rng");
        let ct = key
            .public_key()
            .encrypt_oaep(&mut rng, b"sealed", b"", "sha1")
            .unwrap();
        assert_eq!(key.decrypt_oaep(&ct, b"", "sha1").unwrap(), b"sealed");
    }

    #[test]
    fn oaep_label_mismatch_fails_uniformly() {
        let key = test_key();
        let mut rng = Fortuna::from_seed(b"oaep rng");
        let ct = key
            .public_key()
            .encrypt_oaep(&mut rng, b"sealed", b"label-a", "sha1")
            .unwrap();
        let err = key.decrypt_oaep(&ct, b"label-b", "sha1").unwrap_err();
        assert_eq!(err, Error::BadPadding);

        // A corrupted ciphertext fails with the very same error kind; the
        // decoder gives no structural hints.
        let mut bad = ct.clone();
        bad[key.size() - 1] ^= 0x40;
        assert_eq!(key.decrypt_oaep(&bad, b"label-a", "sha1").unwrap_err(), Error::BadPadding);
    }

    #[test]
    fn oaep_message_length_limit() {
        let key = test_key();
        let mut rng = Fortuna::from_seed(b"oaep rng");
        let too_long = vec![0u8; key.size() - 2 * 20 - 1];
        assert_eq!(
            key.public_key().encrypt_oaep(&mut rng, &too_long, b"", "sha1"),
            Err(Error::MessageTooLong)
        );
    }

    #[test]
    fn sign_and_verify_pkcs1v15() {
        let key = test_key();
        let digest = hash::digest("sha256", b"signed content").unwrap();
        let sig = key.sign_pkcs1v15("sha256", &digest).unwrap();
        assert!(key.public_key().verify_pkcs1v15("sha256", &digest, &sig).unwrap());

        let other = hash::digest("sha256", b"different content").unwrap();
        assert!(!key.public_key().verify_pkcs1v15("sha256", &other, &sig).unwrap());
    }

    #[test]
    fn raw_block_type_one_round_trip() {
        let key = test_key();
        let content = b"\x01\x02md5-and-sha1-hashes";
        let sig = key.sign_raw_pkcs1v15(content).unwrap();
        assert_eq!(recover_raw_pkcs1v15(key.public_key(), &sig).unwrap(), content);
    }

    #[test]
    fn sign_and_verify_pss() {
        let key = test_key();
        let mut rng = Fortuna::from_seed(b"pss salt");
        let digest = hash::digest("sha256", b"pss content").unwrap();
        let sig = key.sign_pss(&mut rng, "sha256", &digest).unwrap();
        assert!(key.public_key().verify_pss("sha256", &digest, &sig).unwrap());

        let other = hash::digest("sha256", b"not it").unwrap();
        assert!(!key.public_key().verify_pss("sha256", &other, &sig).unwrap());
    }

    #[test]
    fn digest_info_layout() {
        let di = digest_info("sha256", &[0u8; 32]).unwrap();
        let der = asn1::to_der(&di);
        // SEQUENCE { SEQUENCE { sha256 OID, NULL }, OCTET STRING (32) }
        assert_eq!(&der[..2], &[0x30, 0x31]);
        assert!(der.windows(9).any(|w| w == hex::decode("0609608648016503040201").unwrap()));
    }
}
