//! MD5 (RFC 1321). Kept for TLS 1.0/1.1 transcript hashing and the legacy
//! PEM key derivation; not for new designs.

use super::MessageDigest;
use std::sync::OnceLock;

const BLOCK_LEN: usize = 64;

/// Per-round rotate amounts.
const S: [u32; 64] = [
    7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, //
    5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, //
    4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, //
    6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
];

/// Sine-derived additive constants, built once on first use.
fn k_table() -> &'static [u32; 64] {
    static K: OnceLock<[u32; 64]> = OnceLock::new();
    K.get_or_init(|| {
        let mut k = [0u32; 64];
        for (i, slot) in k.iter_mut().enumerate() {
            *slot = (((i as f64 + 1.0).sin().abs()) * 4294967296.0) as u64 as u32;
        }
        k
    })
}

#[derive(Clone)]
pub struct Md5 {
    state: [u32; 4],
    tail: Vec<u8>,
    /// Message length in bytes.
    length: u128,
}

impl Md5 {
    pub fn new() -> Self {
        let mut md = Md5 { state: [0; 4], tail: Vec::new(), length: 0 };
        md.start();
        md
    }

    fn compress(state: &mut [u32; 4], block: &[u8]) {
        debug_assert_eq!(block.len(), BLOCK_LEN);
        let k = k_table();
        let mut m = [0u32; 16];
        for (i, w) in m.iter_mut().enumerate() {
            *w = u32::from_le_bytes([
                block[4 * i],
                block[4 * i + 1],
                block[4 * i + 2],
                block[4 * i + 3],
            ]);
        }

        let (mut a, mut b, mut c, mut d) = (state[0], state[1], state[2], state[3]);
        for i in 0..64 {
            let (f, g) = match i / 16 {
                0 => ((b & c) | (!b & d), i),
                1 => ((d & b) | (!d & c), (5 * i + 1) % 16),
                2 => (b ^ c ^ d, (3 * i + 5) % 16),
                _ => (c ^ (b | !d), (7 * i) % 16),
            };
            let tmp = d;
            d = c;
            c = b;
            b = b.wrapping_add(
                a.wrapping_add(f)
                    .wrapping_add(k[i])
                    .wrapping_add(m[g])
                    .rotate_left(S[i]),
            );
            a = tmp;
        }

        state[0] = state[0].wrapping_add(a);
        state[1] = state[1].wrapping_add(b);
        state[2] = state[2].wrapping_add(c);
        state[3] = state[3].wrapping_add(d);
    }
}

impl Default for Md5 {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDigest for Md5 {
    fn algorithm(&self) -> &'static str {
        "md5"
    }

    fn block_length(&self) -> usize {
        BLOCK_LEN
    }

    fn digest_length(&self) -> usize {
        16
    }

    fn start(&mut self) {
        self.state = [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476];
        self.tail.clear();
        self.length = 0;
    }

    fn update(&mut self, data: &[u8]) {
        self.length += data.len() as u128;
        let mut input = data;
        if !self.tail.is_empty() {
            let need = BLOCK_LEN - self.tail.len();
            let take = need.min(input.len());
            self.tail.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.tail.len() == BLOCK_LEN {
                let block = std::mem::take(&mut self.tail);
                Self::compress(&mut self.state, &block);
            }
        }
        let mut chunks = input.chunks_exact(BLOCK_LEN);
        for block in &mut chunks {
            Self::compress(&mut self.state, block);
        }
        self.tail.extend_from_slice(chunks.remainder());
    }

    fn digest(&self) -> Vec<u8> {
        let mut state = self.state;
        let mut block = self.tail.clone();
        block.push(0x80);
        while block.len() % BLOCK_LEN != 56 {
            block.push(0);
        }
        // MD5 is the one little-endian member of the family: the bit length
        // trailer is 64-bit little-endian.
        let bits = (self.length as u64).wrapping_mul(8);
        block.extend_from_slice(&bits.to_le_bytes());
        for chunk in block.chunks_exact(BLOCK_LEN) {
            Self::compress(&mut state, chunk);
        }

        let mut out = Vec::with_capacity(16);
        for w in state {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    fn box_clone(&self) -> Box<dyn MessageDigest> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md5_hex(data: &[u8]) -> String {
        let mut md = Md5::new();
        md.update(data);
        hex::encode(md.digest())
    }

    #[test]
    fn rfc1321_vectors() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"a"), "0cc175b9c0f1b6a831c399e269772661");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(md5_hex(b"message digest"), "f96b697d7cb7938d525a2f31aaf161d0");
        assert_eq!(
            md5_hex(b"abcdefghijklmnopqrstuvwxyz"),
            "c3fcd3d76192e4007dfb496cca67e13b"
        );
    }

    #[test]
    fn split_updates_match_one_shot() {
        let mut md = Md5::new();
        for b in b"message digest" {
            md.update(&[*b]);
        }
        assert_eq!(hex::encode(md.digest()), "f96b697d7cb7938d525a2f31aaf161d0");
    }

    #[test]
    fn crosses_block_boundary() {
        let data = vec![b'x'; 200];
        let mut one = Md5::new();
        one.update(&data);
        let mut two = Md5::new();
        two.update(&data[..63]);
        two.update(&data[63..130]);
        two.update(&data[130..]);
        assert_eq!(one.digest(), two.digest());
    }
}
