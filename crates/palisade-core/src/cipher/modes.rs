//! Chaining modes over any [`BlockAlgorithm`]: ECB, CBC, CFB, OFB, CTR.
//! GCM lives in its own module.

use super::{BlockAlgorithm, CipherMode, Direction, StartOptions};
use crate::error::{Error, Result};
use zeroize::Zeroize;

fn require_iv(opts: &StartOptions, block_size: usize) -> Result<Vec<u8>> {
    match &opts.iv {
        Some(iv) if iv.len() == block_size => Ok(iv.clone()),
        Some(_) => Err(Error::InvalidParameter("IV length must equal the block size")),
        None => Err(Error::InvalidParameter("mode requires an IV")),
    }
}

#[derive(Default)]
pub struct Ecb;

impl Ecb {
    pub fn new() -> Self {
        Ecb
    }
}

impl CipherMode for Ecb {
    fn name(&self) -> &'static str {
        "ECB"
    }

    fn start(&mut self, _: &dyn BlockAlgorithm, _: Direction, opts: &StartOptions) -> Result<()> {
        if opts.iv.is_some() {
            return Err(Error::InvalidParameter("ECB takes no IV"));
        }
        Ok(())
    }

    fn transform(
        &mut self,
        algo: &dyn BlockAlgorithm,
        dir: Direction,
        input: &[u8],
        output: &mut Vec<u8>,
    ) {
        let mut block = vec![0u8; input.len()];
        match dir {
            Direction::Encrypt => algo.encrypt_block(input, &mut block),
            Direction::Decrypt => algo.decrypt_block(input, &mut block),
        }
        output.extend_from_slice(&block);
    }

    fn accepts_partial(&self) -> bool {
        false
    }

    fn pads(&self) -> bool {
        true
    }

    fn finish(&mut self, _: &dyn BlockAlgorithm, _: Direction, _: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct Cbc {
    prev: Vec<u8>,
    raw: bool,
}

impl Cbc {
    pub fn new() -> Self {
        Cbc { prev: Vec::new(), raw: false }
    }

    /// CBC without the PKCS#7 layer, for callers that bring their own
    /// padding discipline (the TLS record layer).
    pub fn without_padding() -> Self {
        Cbc { prev: Vec::new(), raw: true }
    }
}

impl Drop for Cbc {
    fn drop(&mut self) {
        self.prev.zeroize();
    }
}

impl CipherMode for Cbc {
    fn name(&self) -> &'static str {
        "CBC"
    }

    fn start(&mut self, algo: &dyn BlockAlgorithm, _: Direction, opts: &StartOptions) -> Result<()> {
        self.prev = require_iv(opts, algo.block_size())?;
        Ok(())
    }

    fn transform(
        &mut self,
        algo: &dyn BlockAlgorithm,
        dir: Direction,
        input: &[u8],
        output: &mut Vec<u8>,
    ) {
        let bs = algo.block_size();
        debug_assert_eq!(input.len(), bs);
        match dir {
            Direction::Encrypt => {
                let mut xored: Vec<u8> =
                    input.iter().zip(&self.prev).map(|(a, b)| a ^ b).collect();
                let mut ct = vec![0u8; bs];
                algo.encrypt_block(&xored, &mut ct);
                self.prev.copy_from_slice(&ct);
                output.extend_from_slice(&ct);
                xored.zeroize();
            }
            Direction::Decrypt => {
                let mut pt = vec![0u8; bs];
                algo.decrypt_block(input, &mut pt);
                for (p, v) in pt.iter_mut().zip(&self.prev) {
                    *p ^= v;
                }
                self.prev.copy_from_slice(input);
                output.extend_from_slice(&pt);
                pt.zeroize();
            }
        }
    }

    fn accepts_partial(&self) -> bool {
        false
    }

    fn pads(&self) -> bool {
        !self.raw
    }

    fn finish(&mut self, _: &dyn BlockAlgorithm, _: Direction, _: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// Full-block-segment cipher feedback.
#[derive(Default)]
pub struct Cfb {
    register: Vec<u8>,
}

impl Cfb {
    pub fn new() -> Self {
        Cfb { register: Vec::new() }
    }
}

impl Drop for Cfb {
    fn drop(&mut self) {
        self.register.zeroize();
    }
}

impl CipherMode for Cfb {
    fn name(&self) -> &'static str {
        "CFB"
    }

    fn start(&mut self, algo: &dyn BlockAlgorithm, _: Direction, opts: &StartOptions) -> Result<()> {
        self.register = require_iv(opts, algo.block_size())?;
        Ok(())
    }

    fn transform(
        &mut self,
        algo: &dyn BlockAlgorithm,
        dir: Direction,
        input: &[u8],
        output: &mut Vec<u8>,
    ) {
        // The keystream generator always runs the encrypt primitive, in both
        // directions; only the feedback source differs.
        let mut ks = vec![0u8; algo.block_size()];
        algo.encrypt_block(&self.register, &mut ks);
        let out_start = output.len();
        output.extend(input.iter().zip(&ks).map(|(a, b)| a ^ b));
        let cipher_text: &[u8] = match dir {
            Direction::Encrypt => &output[out_start..],
            Direction::Decrypt => input,
        };
        if cipher_text.len() == self.register.len() {
            self.register.copy_from_slice(cipher_text);
        }
        ks.zeroize();
    }

    fn accepts_partial(&self) -> bool {
        true
    }

    fn pads(&self) -> bool {
        false
    }

    fn finish(&mut self, _: &dyn BlockAlgorithm, _: Direction, _: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct Ofb {
    register: Vec<u8>,
}

impl Ofb {
    pub fn new() -> Self {
        Ofb { register: Vec::new() }
    }
}

impl Drop for Ofb {
    fn drop(&mut self) {
        self.register.zeroize();
    }
}

impl CipherMode for Ofb {
    fn name(&self) -> &'static str {
        "OFB"
    }

    fn start(&mut self, algo: &dyn BlockAlgorithm, _: Direction, opts: &StartOptions) -> Result<()> {
        self.register = require_iv(opts, algo.block_size())?;
        Ok(())
    }

    fn transform(
        &mut self,
        algo: &dyn BlockAlgorithm,
        _: Direction,
        input: &[u8],
        output: &mut Vec<u8>,
    ) {
        let mut ks = vec![0u8; algo.block_size()];
        algo.encrypt_block(&self.register, &mut ks);
        self.register.copy_from_slice(&ks);
        output.extend(input.iter().zip(&ks).map(|(a, b)| a ^ b));
        ks.zeroize();
    }

    fn accepts_partial(&self) -> bool {
        true
    }

    fn pads(&self) -> bool {
        false
    }

    fn finish(&mut self, _: &dyn BlockAlgorithm, _: Direction, _: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// Counter mode. The counter is the big-endian tail of the IV block
/// (SP 800-38A layout); the whole block carries into higher bytes.
#[derive(Default)]
pub struct Ctr {
    counter: Vec<u8>,
}

impl Ctr {
    pub fn new() -> Self {
        Ctr { counter: Vec::new() }
    }
}

impl Drop for Ctr {
    fn drop(&mut self) {
        self.counter.zeroize();
    }
}

pub(crate) fn increment_be(counter: &mut [u8]) {
    for b in counter.iter_mut().rev() {
        *b = b.wrapping_add(1);
        if *b != 0 {
            break;
        }
    }
}

impl CipherMode for Ctr {
    fn name(&self) -> &'static str {
        "CTR"
    }

    fn start(&mut self, algo: &dyn BlockAlgorithm, _: Direction, opts: &StartOptions) -> Result<()> {
        self.counter = require_iv(opts, algo.block_size())?;
        Ok(())
    }

    fn transform(
        &mut self,
        algo: &dyn BlockAlgorithm,
        _: Direction,
        input: &[u8],
        output: &mut Vec<u8>,
    ) {
        let mut ks = vec![0u8; algo.block_size()];
        algo.encrypt_block(&self.counter, &mut ks);
        increment_be(&mut self.counter);
        output.extend(input.iter().zip(&ks).map(|(a, b)| a ^ b));
        ks.zeroize();
    }

    fn accepts_partial(&self) -> bool {
        true
    }

    fn pads(&self) -> bool {
        false
    }

    fn finish(&mut self, _: &dyn BlockAlgorithm, _: Direction, _: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{create, Direction, StartOptions};
    use hex_literal::hex;

    // NIST SP 800-38A, AES-128, F.1/F.2/F.3/F.4/F.5 single-block slices.
    const KEY: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");
    const PT1: [u8; 16] = hex!("6bc1bee22e409f96e93d7e117393172a");

    #[test]
    fn sp800_38a_cbc() {
        let mut c = create("AES-CBC", &KEY).unwrap();
        c.start(
            Direction::Encrypt,
            &StartOptions::new().iv(&hex!("000102030405060708090a0b0c0d0e0f")),
        )
        .unwrap();
        c.update(&PT1).unwrap();
        assert_eq!(c.output(), hex!("7649abac8119b246cee98e9b12e9197d"));
    }

    #[test]
    fn sp800_38a_cfb128() {
        let mut c = create("AES-CFB", &KEY).unwrap();
        c.start(
            Direction::Encrypt,
            &StartOptions::new().iv(&hex!("000102030405060708090a0b0c0d0e0f")),
        )
        .unwrap();
        c.update(&PT1).unwrap();
        c.finish().unwrap();
        assert_eq!(c.output(), hex!("3b3fd92eb72dad20333449f8e83cfb4a"));
    }

    #[test]
    fn sp800_38a_ofb() {
        let mut c = create("AES-OFB", &KEY).unwrap();
        c.start(
            Direction::Encrypt,
            &StartOptions::new().iv(&hex!("000102030405060708090a0b0c0d0e0f")),
        )
        .unwrap();
        c.update(&PT1).unwrap();
        c.finish().unwrap();
        assert_eq!(c.output(), hex!("3b3fd92eb72dad20333449f8e83cfb4a"));
    }

    #[test]
    fn sp800_38a_ctr() {
        let mut c = create("AES-CTR", &KEY).unwrap();
        c.start(
            Direction::Encrypt,
            &StartOptions::new().iv(&hex!("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff")),
        )
        .unwrap();
        c.update(&PT1).unwrap();
        c.update(&hex!("ae2d8a571e03ac9c9eb76fac45af8e51")).unwrap();
        c.finish().unwrap();
        assert_eq!(
            c.output(),
            hex!("874d6191b620e3261bef6864990db6ce9806f66b7970fdff8617187bb9fffdff")
        );
    }

    #[test]
    fn cbc_round_trip_with_padding() {
        let mut enc = create("AES-CBC", &KEY).unwrap();
        enc.start(Direction::Encrypt, &StartOptions::new().iv(&[7u8; 16])).unwrap();
        enc.update(b"seventeen bytes!!").unwrap();
        enc.finish().unwrap();
        let ct = enc.take_output();
        assert_eq!(ct.len(), 32);

        let mut dec = create("AES-CBC", &KEY).unwrap();
        dec.start(Direction::Decrypt, &StartOptions::new().iv(&[7u8; 16])).unwrap();
        dec.update(&ct).unwrap();
        dec.finish().unwrap();
        assert_eq!(dec.output(), b"seventeen bytes!!");
    }

    #[test]
    fn ctr_partial_final_segment() {
        let mut enc = create("AES-CTR", &KEY).unwrap();
        enc.start(Direction::Encrypt, &StartOptions::new().iv(&[0u8; 16])).unwrap();
        enc.update(b"short").unwrap();
        enc.finish().unwrap();
        let ct = enc.take_output();
        assert_eq!(ct.len(), 5);

        let mut dec = create("AES-CTR", &KEY).unwrap();
        dec.start(Direction::Decrypt, &StartOptions::new().iv(&[0u8; 16])).unwrap();
        dec.update(&ct).unwrap();
        dec.finish().unwrap();
        assert_eq!(dec.output(), b"short");
    }

    #[test]
    fn byte_at_a_time_equals_one_shot() {
        for name in ["AES-ECB", "AES-CBC", "AES-CFB", "AES-OFB", "AES-CTR"] {
            let opts = if name == "AES-ECB" {
                StartOptions::new()
            } else {
                StartOptions::new().iv(&[3u8; 16])
            };
            let data = b"The quick brown fox jumps over the lazy dog";

            let mut one = create(name, &KEY).unwrap();
            one.start(Direction::Encrypt, &opts).unwrap();
            one.update(data).unwrap();
            one.finish().unwrap();

            let mut per_byte = create(name, &KEY).unwrap();
            per_byte.start(Direction::Encrypt, &opts).unwrap();
            for b in data {
                per_byte.update(&[*b]).unwrap();
            }
            per_byte.finish().unwrap();

            assert_eq!(one.output(), per_byte.output(), "{name}");
        }
    }
}
