//! DES and 3DES-EDE (FIPS 46-3). Present for legacy TLS suites and
//! DEK-Info encrypted PEM bodies; 8-byte blocks throughout.

use super::BlockAlgorithm;
use crate::error::{Error, Result};
use zeroize::Zeroize;

// Bit-numbering in the permutation tables is the FIPS convention:
// 1 = most significant bit of the input.

const IP: [u8; 64] = [
    58, 50, 42, 34, 26, 18, 10, 2, 60, 52, 44, 36, 28, 20, 12, 4, //
    62, 54, 46, 38, 30, 22, 14, 6, 64, 56, 48, 40, 32, 24, 16, 8, //
    57, 49, 41, 33, 25, 17, 9, 1, 59, 51, 43, 35, 27, 19, 11, 3, //
    61, 53, 45, 37, 29, 21, 13, 5, 63, 55, 47, 39, 31, 23, 15, 7,
];

const FP: [u8; 64] = [
    40, 8, 48, 16, 56, 24, 64, 32, 39, 7, 47, 15, 55, 23, 63, 31, //
    38, 6, 46, 14, 54, 22, 62, 30, 37, 5, 45, 13, 53, 21, 61, 29, //
    36, 4, 44, 12, 52, 20, 60, 28, 35, 3, 43, 11, 51, 19, 59, 27, //
    34, 2, 42, 10, 50, 18, 58, 26, 33, 1, 41, 9, 49, 17, 57, 25,
];

const E: [u8; 48] = [
    32, 1, 2, 3, 4, 5, 4, 5, 6, 7, 8, 9, 8, 9, 10, 11, 12, 13, //
    12, 13, 14, 15, 16, 17, 16, 17, 18, 19, 20, 21, 20, 21, 22, 23, 24, 25, //
    24, 25, 26, 27, 28, 29, 28, 29, 30, 31, 32, 1,
];

const P: [u8; 32] = [
    16, 7, 20, 21, 29, 12, 28, 17, 1, 15, 23, 26, 5, 18, 31, 10, //
    2, 8, 24, 14, 32, 27, 3, 9, 19, 13, 30, 6, 22, 11, 4, 25,
];

const PC1: [u8; 56] = [
    57, 49, 41, 33, 25, 17, 9, 1, 58, 50, 42, 34, 26, 18, //
    10, 2, 59, 51, 43, 35, 27, 19, 11, 3, 60, 52, 44, 36, //
    63, 55, 47, 39, 31, 23, 15, 7, 62, 54, 46, 38, 30, 22, //
    14, 6, 61, 53, 45, 37, 29, 21, 13, 5, 28, 20, 12, 4,
];

const PC2: [u8; 48] = [
    14, 17, 11, 24, 1, 5, 3, 28, 15, 6, 21, 10, //
    23, 19, 12, 4, 26, 8, 16, 7, 27, 20, 13, 2, //
    41, 52, 31, 37, 47, 55, 30, 40, 51, 45, 33, 48, //
    44, 49, 39, 56, 34, 53, 46, 42, 50, 36, 29, 32,
];

const SHIFTS: [u8; 16] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];

const SBOX: [[u8; 64]; 8] = [
    [
        14, 4, 13, 1, 2, 15, 11, 8, 3, 10, 6, 12, 5, 9, 0, 7, //
        0, 15, 7, 4, 14, 2, 13, 1, 10, 6, 12, 11, 9, 5, 3, 8, //
        4, 1, 14, 8, 13, 6, 2, 11, 15, 12, 9, 7, 3, 10, 5, 0, //
        15, 12, 8, 2, 4, 9, 1, 7, 5, 11, 3, 14, 10, 0, 6, 13,
    ],
    [
        15, 1, 8, 14, 6, 11, 3, 4, 9, 7, 2, 13, 12, 0, 5, 10, //
        3, 13, 4, 7, 15, 2, 8, 14, 12, 0, 1, 10, 6, 9, 11, 5, //
        0, 14, 7, 11, 10, 4, 13, 1, 5, 8, 12, 6, 9, 3, 2, 15, //
        13, 8, 10, 1, 3, 15, 4, 2, 11, 6, 7, 12, 0, 5, 14, 9,
    ],
    [
        10, 0, 9, 14, 6, 3, 15, 5, 1, 13, 12, 7, 11, 4, 2, 8, //
        13, 7, 0, 9, 3, 4, 6, 10, 2, 8, 5, 14, 12, 11, 15, 1, //
        13, 6, 4, 9, 8, 15, 3, 0, 11, 1, 2, 12, 5, 10, 14, 7, //
        1, 10, 13, 0, 6, 9, 8, 7, 4, 15, 14, 3, 11, 5, 2, 12,
    ],
    [
        7, 13, 14, 3, 0, 6, 9, 10, 1, 2, 8, 5, 11, 12, 4, 15, //
        13, 8, 11, 5, 6, 15, 0, 3, 4, 7, 2, 12, 1, 10, 14, 9, //
        10, 6, 9, 0, 12, 11, 7, 13, 15, 1, 3, 14, 5, 2, 8, 4, //
        3, 15, 0, 6, 10, 1, 13, 8, 9, 4, 5, 11, 12, 7, 2, 14,
    ],
    [
        2, 12, 4, 1, 7, 10, 11, 6, 8, 5, 3, 15, 13, 0, 14, 9, //
        14, 11, 2, 12, 4, 7, 13, 1, 5, 0, 15, 10, 3, 9, 8, 6, //
        4, 2, 1, 11, 10, 13, 7, 8, 15, 9, 12, 5, 6, 3, 0, 14, //
        11, 8, 12, 7, 1, 14, 2, 13, 6, 15, 0, 9, 10, 4, 5, 3,
    ],
    [
        12, 1, 10, 15, 9, 2, 6, 8, 0, 13, 3, 4, 14, 7, 5, 11, //
        10, 15, 4, 2, 7, 12, 9, 5, 6, 1, 13, 14, 0, 11, 3, 8, //
        9, 14, 15, 5, 2, 8, 12, 3, 7, 0, 4, 10, 1, 13, 11, 6, //
        4, 3, 2, 12, 9, 5, 15, 10, 11, 14, 1, 7, 6, 0, 8, 13,
    ],
    [
        4, 11, 2, 14, 15, 0, 8, 13, 3, 12, 9, 7, 5, 10, 6, 1, //
        13, 0, 11, 7, 4, 9, 1, 10, 14, 3, 5, 12, 2, 15, 8, 6, //
        1, 4, 11, 13, 12, 3, 7, 14, 10, 15, 6, 8, 0, 5, 9, 2, //
        6, 11, 13, 8, 1, 4, 10, 7, 9, 5, 0, 15, 14, 2, 3, 12,
    ],
    [
        13, 2, 8, 4, 6, 15, 11, 1, 10, 9, 3, 14, 5, 0, 12, 7, //
        1, 15, 13, 8, 10, 3, 7, 4, 12, 5, 6, 11, 0, 14, 9, 2, //
        7, 11, 4, 1, 9, 12, 14, 2, 0, 6, 10, 13, 15, 3, 5, 8, //
        2, 1, 14, 7, 4, 10, 8, 13, 15, 12, 9, 0, 3, 5, 6, 11,
    ],
];

fn permute(x: u64, table: &[u8], in_bits: u32) -> u64 {
    let mut out = 0u64;
    for &p in table {
        out = (out << 1) | ((x >> (in_bits - p as u32)) & 1);
    }
    out
}

/// 16 48-bit subkeys from a 64-bit key (parity bits ignored).
fn subkeys(key: &[u8; 8]) -> [u64; 16] {
    let k = u64::from_be_bytes(*key);
    let cd = permute(k, &PC1, 64);
    let mut c = (cd >> 28) & 0x0fff_ffff;
    let mut d = cd & 0x0fff_ffff;
    let mut out = [0u64; 16];
    for (i, &s) in SHIFTS.iter().enumerate() {
        c = ((c << s) | (c >> (28 - s as u32))) & 0x0fff_ffff;
        d = ((d << s) | (d >> (28 - s as u32))) & 0x0fff_ffff;
        out[i] = permute((c << 28) | d, &PC2, 56);
    }
    out
}

fn feistel(r: u32, k: u64) -> u32 {
    let x = permute(r as u64, &E, 32) ^ k;
    let mut out = 0u32;
    for i in 0..8 {
        let six = ((x >> (42 - 6 * i)) & 0x3f) as usize;
        let row = ((six >> 4) & 0b10) | (six & 1);
        let col = (six >> 1) & 0x0f;
        out = (out << 4) | SBOX[i][(row << 4) | col] as u32;
    }
    permute(out as u64, &P, 32) as u32
}

fn des_block(block: u64, keys: &[u64; 16], decrypt: bool) -> u64 {
    let ip = permute(block, &IP, 64);
    let mut l = (ip >> 32) as u32;
    let mut r = ip as u32;
    for i in 0..16 {
        let k = if decrypt { keys[15 - i] } else { keys[i] };
        let next = l ^ feistel(r, k);
        l = r;
        r = next;
    }
    // Final swap, then FP.
    permute(((r as u64) << 32) | l as u64, &FP, 64)
}

pub struct Des {
    keys: [u64; 16],
}

impl Des {
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: &[u8; 8] = key
            .try_into()
            .map_err(|_| Error::InvalidParameter("DES key must be 8 bytes"))?;
        Ok(Des { keys: subkeys(key) })
    }
}

impl Drop for Des {
    fn drop(&mut self) {
        self.keys.zeroize();
    }
}

impl BlockAlgorithm for Des {
    fn name(&self) -> &'static str {
        "DES"
    }

    fn block_size(&self) -> usize {
        8
    }

    fn encrypt_block(&self, input: &[u8], output: &mut [u8]) {
        let block = u64::from_be_bytes(input[..8].try_into().unwrap());
        output[..8].copy_from_slice(&des_block(block, &self.keys, false).to_be_bytes());
    }

    fn decrypt_block(&self, input: &[u8], output: &mut [u8]) {
        let block = u64::from_be_bytes(input[..8].try_into().unwrap());
        output[..8].copy_from_slice(&des_block(block, &self.keys, true).to_be_bytes());
    }
}

/// EDE three-key (24-byte) or two-key (16-byte, K3 = K1) triple DES.
pub struct TripleDes {
    k1: [u64; 16],
    k2: [u64; 16],
    k3: [u64; 16],
}

impl TripleDes {
    pub fn new(key: &[u8]) -> Result<Self> {
        let (k1, k2, k3) = match key.len() {
            24 => (&key[..8], &key[8..16], &key[16..24]),
            16 => (&key[..8], &key[8..16], &key[..8]),
            _ => return Err(Error::InvalidParameter("3DES key must be 16 or 24 bytes")),
        };
        Ok(TripleDes {
            k1: subkeys(k1.try_into().unwrap()),
            k2: subkeys(k2.try_into().unwrap()),
            k3: subkeys(k3.try_into().unwrap()),
        })
    }
}

impl Drop for TripleDes {
    fn drop(&mut self) {
        self.k1.zeroize();
        self.k2.zeroize();
        self.k3.zeroize();
    }
}

impl BlockAlgorithm for TripleDes {
    fn name(&self) -> &'static str {
        "3DES"
    }

    fn block_size(&self) -> usize {
        8
    }

    fn encrypt_block(&self, input: &[u8], output: &mut [u8]) {
        let b = u64::from_be_bytes(input[..8].try_into().unwrap());
        let b = des_block(b, &self.k1, false);
        let b = des_block(b, &self.k2, true);
        let b = des_block(b, &self.k3, false);
        output[..8].copy_from_slice(&b.to_be_bytes());
    }

    fn decrypt_block(&self, input: &[u8], output: &mut [u8]) {
        let b = u64::from_be_bytes(input[..8].try_into().unwrap());
        let b = des_block(b, &self.k3, true);
        let b = des_block(b, &self.k2, false);
        let b = des_block(b, &self.k1, true);
        output[..8].copy_from_slice(&b.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn classic_des_vector() {
        let des = Des::new(&hex!("133457799bbcdff1")).unwrap();
        let mut ct = [0u8; 8];
        des.encrypt_block(&hex!("0123456789abcdef"), &mut ct);
        assert_eq!(ct, hex!("85e813540f0ab405"));
        let mut back = [0u8; 8];
        des.decrypt_block(&ct, &mut back);
        assert_eq!(back, hex!("0123456789abcdef"));
    }

    #[test]
    fn ede_with_equal_keys_is_single_des() {
        let key = hex!("0123456789abcdef");
        let des = Des::new(&key).unwrap();
        let mut tdes_key = [0u8; 24];
        tdes_key[..8].copy_from_slice(&key);
        tdes_key[8..16].copy_from_slice(&key);
        tdes_key[16..].copy_from_slice(&key);
        let tdes = TripleDes::new(&tdes_key).unwrap();

        let pt = hex!("4e6f772069732074");
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        des.encrypt_block(&pt, &mut a);
        tdes.encrypt_block(&pt, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn three_key_round_trip() {
        let tdes = TripleDes::new(&hex!(
            "0123456789abcdef23456789abcdef01456789abcdef0123"
        ))
        .unwrap();
        let pt = hex!("6bc1bee22e409f96");
        let mut ct = [0u8; 8];
        tdes.encrypt_block(&pt, &mut ct);
        assert_ne!(ct, pt);
        let mut back = [0u8; 8];
        tdes.decrypt_block(&ct, &mut back);
        assert_eq!(back, pt);
    }

    #[test]
    fn two_key_form_expands() {
        assert!(TripleDes::new(&[0u8; 16]).is_ok());
        assert!(TripleDes::new(&[0u8; 23]).is_err());
    }
}
