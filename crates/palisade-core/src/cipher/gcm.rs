//! Galois/Counter Mode (NIST SP 800-38D) over a 128-bit block cipher.
//!
//! GHASH runs over GF(2¹²⁸) with the polynomial x¹²⁸ + x⁷ + x² + x + 1,
//! bits numbered MSB-first as in the standard. The tag comparison on
//! decryption is constant-time.

use super::{BlockAlgorithm, CipherMode, Direction, StartOptions};
use crate::error::{Error, Result};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

const R: u128 = 0xe1 << 120;

/// Carry-less multiply in GF(2^128), right-shift formulation.
fn gf_mul(x: u128, y: u128) -> u128 {
    let mut z = 0u128;
    let mut v = x;
    for i in 0..128 {
        if (y >> (127 - i)) & 1 == 1 {
            z ^= v;
        }
        let lsb = v & 1;
        v >>= 1;
        if lsb == 1 {
            v ^= R;
        }
    }
    z
}

fn block_to_u128(block: &[u8]) -> u128 {
    let mut raw = [0u8; 16];
    raw[..block.len()].copy_from_slice(block);
    u128::from_be_bytes(raw)
}

/// Largest number of 128-bit data blocks one (key, IV) invocation may
/// produce: 2^32 - 2 per SP 800-38D.
const MAX_BLOCKS: u64 = (1 << 32) - 2;

#[derive(Default)]
pub struct Gcm {
    h: u128,
    j0: [u8; 16],
    counter: [u8; 16],
    ghash: u128,
    aad_len: u64,
    data_len: u64,
    blocks: u64,
    overflowed: bool,
    expected_tag: Option<Vec<u8>>,
    tag: Option<Vec<u8>>,
}

impl Gcm {
    pub fn new() -> Self {
        Gcm::default()
    }

    fn absorb(&mut self, block: &[u8]) {
        self.ghash = gf_mul(self.ghash ^ block_to_u128(block), self.h);
    }

    fn inc32(counter: &mut [u8; 16]) {
        let mut word = u32::from_be_bytes(counter[12..16].try_into().unwrap());
        word = word.wrapping_add(1);
        counter[12..16].copy_from_slice(&word.to_be_bytes());
    }
}

impl Drop for Gcm {
    fn drop(&mut self) {
        self.j0.zeroize();
        self.counter.zeroize();
    }
}

impl CipherMode for Gcm {
    fn name(&self) -> &'static str {
        "GCM"
    }

    fn start(&mut self, algo: &dyn BlockAlgorithm, dir: Direction, opts: &StartOptions) -> Result<()> {
        if algo.block_size() != 16 {
            return Err(Error::InvalidParameter("GCM requires a 128-bit block cipher"));
        }
        let iv = opts.iv.as_deref().ok_or(Error::InvalidParameter("GCM requires an IV"))?;
        if iv.is_empty() {
            return Err(Error::InvalidParameter("GCM IV must be non-empty"));
        }

        let mut h_block = [0u8; 16];
        algo.encrypt_block(&[0u8; 16], &mut h_block);
        self.h = u128::from_be_bytes(h_block);

        self.ghash = 0;
        self.aad_len = 0;
        self.data_len = 0;
        self.blocks = 0;
        self.overflowed = false;
        self.tag = None;
        self.expected_tag = None;

        // J0: the 96-bit fast path appends a one; anything else is hashed.
        if iv.len() == 12 {
            self.j0[..12].copy_from_slice(iv);
            self.j0[12..].copy_from_slice(&1u32.to_be_bytes());
        } else {
            let mut acc = 0u128;
            for chunk in iv.chunks(16) {
                acc = gf_mul(acc ^ block_to_u128(chunk), self.h);
            }
            let iv_bits = (iv.len() as u128) * 8;
            acc = gf_mul(acc ^ iv_bits, self.h);
            self.j0 = acc.to_be_bytes();
        }
        self.counter = self.j0;

        for chunk in opts.additional_data.chunks(16) {
            self.absorb(chunk);
        }
        self.aad_len = opts.additional_data.len() as u64;

        if dir == Direction::Decrypt {
            let tag = opts.tag.as_deref().ok_or(Error::InvalidParameter("GCM decryption requires the expected tag"))?;
            if tag.len() != 16 {
                return Err(Error::InvalidParameter("GCM tag must be 16 bytes"));
            }
            self.expected_tag = Some(tag.to_vec());
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
        debug_assert!(input.len() <= 16);
        self.blocks += 1;
        if self.blocks > MAX_BLOCKS {
            self.overflowed = true;
            return;
        }

        Self::inc32(&mut self.counter);
        let mut ks = [0u8; 16];
        algo.encrypt_block(&self.counter, &mut ks);

        let out_start = output.len();
        output.extend(input.iter().zip(ks.iter()).map(|(a, b)| a ^ b));
        ks.zeroize();

        // GHASH covers the ciphertext on both paths.
        let ct_owned;
        let ct: &[u8] = match dir {
            Direction::Encrypt => {
                ct_owned = output[out_start..].to_vec();
                &ct_owned
            }
            Direction::Decrypt => input,
        };
        self.absorb(ct);
        self.data_len += input.len() as u64;
    }

    fn accepts_partial(&self) -> bool {
        true
    }

    fn pads(&self) -> bool {
        false
    }

    fn finish(&mut self, algo: &dyn BlockAlgorithm, dir: Direction, _: &mut Vec<u8>) -> Result<()> {
        if self.overflowed {
            return Err(Error::internal("GCM invocation exceeded the per-IV block limit"));
        }

        let lengths = ((self.aad_len as u128 * 8) << 64) | (self.data_len as u128 * 8);
        self.ghash = gf_mul(self.ghash ^ lengths, self.h);

        let mut e_j0 = [0u8; 16];
        algo.encrypt_block(&self.j0, &mut e_j0);
        let tag = (self.ghash ^ u128::from_be_bytes(e_j0)).to_be_bytes();

        match dir {
            Direction::Encrypt => {
                self.tag = Some(tag.to_vec());
                Ok(())
            }
            Direction::Decrypt => {
                let expected = self.expected_tag.as_deref().unwrap_or(&[]);
                if tag.ct_eq(expected).into() {
                    Ok(())
                } else {
                    Err(Error::BadMac)
                }
            }
        }
    }

    fn tag(&self) -> Option<&[u8]> {
        self.tag.as_deref()
    }
}
