//! AES-128/192/256 (FIPS 197).
//!
//! The S-box and its inverse are derived from the GF(2⁸) definition behind a
//! one-shot initialiser instead of being pasted as literals; the round-key
//! schedule is expanded at construction.

use super::BlockAlgorithm;
use crate::error::{Error, Result};
use std::sync::OnceLock;
use zeroize::Zeroize;

struct Tables {
    sbox: [u8; 256],
    inv_sbox: [u8; 256],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        // Log/antilog tables over GF(2^8) with generator 3.
        let mut exp = [0u8; 256];
        let mut log = [0u8; 256];
        let mut x: u8 = 1;
        for i in 0..255 {
            exp[i] = x;
            log[x as usize] = i as u8;
            // multiply by 3 = x * 2 ^ x
            x = xtime(x) ^ x;
        }
        exp[255] = exp[0];

        let mut sbox = [0u8; 256];
        let mut inv_sbox = [0u8; 256];
        for i in 0..256 {
            let inv = if i == 0 { 0 } else { exp[255 - log[i] as usize] };
            // Affine transform: s = inv ^ rotl1 ^ rotl2 ^ rotl3 ^ rotl4 ^ 0x63
            let s = inv
                ^ inv.rotate_left(1)
                ^ inv.rotate_left(2)
                ^ inv.rotate_left(3)
                ^ inv.rotate_left(4)
                ^ 0x63;
            sbox[i] = s;
            inv_sbox[s as usize] = i as u8;
        }
        Tables { sbox, inv_sbox }
    })
}

#[inline]
fn xtime(b: u8) -> u8 {
    (b << 1) ^ (((b >> 7) & 1) * 0x1b)
}

#[inline]
fn gmul(a: u8, b: u8) -> u8 {
    let mut a = a;
    let mut b = b;
    let mut p = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            p ^= a;
        }
        a = xtime(a);
        b >>= 1;
    }
    p
}

const RCON: [u8; 10] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1b, 0x36];

pub struct Aes {
    /// Round keys, 4 bytes per word, 4 words per round key.
    round_keys: Vec<u8>,
    rounds: usize,
}

impl Aes {
    /// Key must be 16, 24 or 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        let nk = match key.len() {
            16 => 4,
            24 => 6,
            32 => 8,
            _ => return Err(Error::InvalidParameter("AES key must be 16, 24 or 32 bytes")),
        };
        let rounds = nk + 6;
        let t = tables();

        let total_words = 4 * (rounds + 1);
        let mut w = vec![0u8; 4 * total_words];
        w[..key.len()].copy_from_slice(key);
        for i in nk..total_words {
            let mut word = [
                w[4 * (i - 1)],
                w[4 * (i - 1) + 1],
                w[4 * (i - 1) + 2],
                w[4 * (i - 1) + 3],
            ];
            if i % nk == 0 {
                word.rotate_left(1);
                for b in word.iter_mut() {
                    *b = t.sbox[*b as usize];
                }
                word[0] ^= RCON[i / nk - 1];
            } else if nk > 6 && i % nk == 4 {
                for b in word.iter_mut() {
                    *b = t.sbox[*b as usize];
                }
            }
            for j in 0..4 {
                w[4 * i + j] = w[4 * (i - nk) + j] ^ word[j];
            }
        }

        Ok(Aes { round_keys: w, rounds })
    }

    fn round_key(&self, r: usize) -> &[u8] {
        &self.round_keys[16 * r..16 * (r + 1)]
    }
}

impl Drop for Aes {
    fn drop(&mut self) {
        self.round_keys.zeroize();
    }
}

fn add_round_key(state: &mut [u8; 16], rk: &[u8]) {
    for (s, k) in state.iter_mut().zip(rk) {
        *s ^= k;
    }
}

/// State is column-major: state[4*c + r] holds row r of column c.
fn shift_rows(state: &mut [u8; 16]) {
    let s = *state;
    for r in 1..4 {
        for c in 0..4 {
            state[4 * c + r] = s[4 * ((c + r) % 4) + r];
        }
    }
}

fn inv_shift_rows(state: &mut [u8; 16]) {
    let s = *state;
    for r in 1..4 {
        for c in 0..4 {
            state[4 * ((c + r) % 4) + r] = s[4 * c + r];
        }
    }
}

fn mix_columns(state: &mut [u8; 16]) {
    for c in 0..4 {
        let col = [state[4 * c], state[4 * c + 1], state[4 * c + 2], state[4 * c + 3]];
        state[4 * c] = xtime(col[0]) ^ (xtime(col[1]) ^ col[1]) ^ col[2] ^ col[3];
        state[4 * c + 1] = col[0] ^ xtime(col[1]) ^ (xtime(col[2]) ^ col[2]) ^ col[3];
        state[4 * c + 2] = col[0] ^ col[1] ^ xtime(col[2]) ^ (xtime(col[3]) ^ col[3]);
        state[4 * c + 3] = (xtime(col[0]) ^ col[0]) ^ col[1] ^ col[2] ^ xtime(col[3]);
    }
}

fn inv_mix_columns(state: &mut [u8; 16]) {
    for c in 0..4 {
        let col = [state[4 * c], state[4 * c + 1], state[4 * c + 2], state[4 * c + 3]];
        state[4 * c] = gmul(col[0], 14) ^ gmul(col[1], 11) ^ gmul(col[2], 13) ^ gmul(col[3], 9);
        state[4 * c + 1] = gmul(col[0], 9) ^ gmul(col[1], 14) ^ gmul(col[2], 11) ^ gmul(col[3], 13);
        state[4 * c + 2] = gmul(col[0], 13) ^ gmul(col[1], 9) ^ gmul(col[2], 14) ^ gmul(col[3], 11);
        state[4 * c + 3] = gmul(col[0], 11) ^ gmul(col[1], 13) ^ gmul(col[2], 9) ^ gmul(col[3], 14);
    }
}

impl BlockAlgorithm for Aes {
    fn name(&self) -> &'static str {
        "AES"
    }

    fn block_size(&self) -> usize {
        16
    }

    fn encrypt_block(&self, input: &[u8], output: &mut [u8]) {
        let t = tables();
        let mut state = [0u8; 16];
        state.copy_from_slice(input);

        add_round_key(&mut state, self.round_key(0));
        for r in 1..self.rounds {
            for b in state.iter_mut() {
                *b = t.sbox[*b as usize];
            }
            shift_rows(&mut state);
            mix_columns(&mut state);
            add_round_key(&mut state, self.round_key(r));
        }
        for b in state.iter_mut() {
            *b = t.sbox[*b as usize];
        }
        shift_rows(&mut state);
        add_round_key(&mut state, self.round_key(self.rounds));

        output[..16].copy_from_slice(&state);
    }

    fn decrypt_block(&self, input: &[u8], output: &mut [u8]) {
        let t = tables();
        let mut state = [0u8; 16];
        state.copy_from_slice(input);

        add_round_key(&mut state, self.round_key(self.rounds));
        for r in (1..self.rounds).rev() {
            inv_shift_rows(&mut state);
            for b in state.iter_mut() {
                *b = t.inv_sbox[*b as usize];
            }
            add_round_key(&mut state, self.round_key(r));
            inv_mix_columns(&mut state);
        }
        inv_shift_rows(&mut state);
        for b in state.iter_mut() {
            *b = t.inv_sbox[*b as usize];
        }
        add_round_key(&mut state, self.round_key(0));

        output[..16].copy_from_slice(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sbox_spot_checks() {
        let t = tables();
        assert_eq!(t.sbox[0x00], 0x63);
        assert_eq!(t.sbox[0x01], 0x7c);
        assert_eq!(t.sbox[0x53], 0xed);
        assert_eq!(t.sbox[0xff], 0x16);
        for i in 0..256 {
            assert_eq!(t.inv_sbox[t.sbox[i] as usize] as usize, i);
        }
    }

    #[test]
    fn fips197_aes128() {
        let key = hex!("000102030405060708090a0b0c0d0e0f");
        let pt = hex!("00112233445566778899aabbccddeeff");
        let aes = Aes::new(&key).unwrap();
        let mut ct = [0u8; 16];
        aes.encrypt_block(&pt, &mut ct);
        assert_eq!(ct, hex!("69c4e0d86a7b0430d8cdb78070b4c55a"));
        let mut back = [0u8; 16];
        aes.decrypt_block(&ct, &mut back);
        assert_eq!(back, pt);
    }

    #[test]
    fn fips197_aes192() {
        let key = hex!("000102030405060708090a0b0c0d0e0f1011121314151617");
        let pt = hex!("00112233445566778899aabbccddeeff");
        let aes = Aes::new(&key).unwrap();
        let mut ct = [0u8; 16];
        aes.encrypt_block(&pt, &mut ct);
        assert_eq!(ct, hex!("dda97ca4864cdfe06eaf70a0ec0d7191"));
    }

    #[test]
    fn fips197_aes256() {
        let key = hex!("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f");
        let pt = hex!("00112233445566778899aabbccddeeff");
        let aes = Aes::new(&key).unwrap();
        let mut ct = [0u8; 16];
        aes.encrypt_block(&pt, &mut ct);
        assert_eq!(ct, hex!("8ea2b7ca516745bfeafc49904b496089"));
        let mut back = [0u8; 16];
        aes.decrypt_block(&ct, &mut back);
        assert_eq!(back, pt);
    }

    #[test]
    fn rejects_bad_key_sizes() {
        assert!(Aes::new(&[0u8; 15]).is_err());
        assert!(Aes::new(&[0u8; 33]).is_err());
    }
}
