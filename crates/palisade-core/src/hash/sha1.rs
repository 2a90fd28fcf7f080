//! SHA-1 (FIPS 180-4). Required by the TLS 1.0/1.1 PRF, record MACs and
//! handshake transcripts.

use super::MessageDigest;

const BLOCK_LEN: usize = 64;

#[derive(Clone)]
pub struct Sha1 {
    state: [u32; 5],
    tail: Vec<u8>,
    length: u128,
}

impl Sha1 {
    pub fn new() -> Self {
        let mut md = Sha1 { state: [0; 5], tail: Vec::new(), length: 0 };
        md.start();
        md
    }

    fn compress(state: &mut [u32; 5], block: &[u8]) {
        let mut w = [0u32; 80];
        for (i, word) in w.iter_mut().take(16).enumerate() {
            *word = u32::from_be_bytes([
                block[4 * i],
                block[4 * i + 1],
                block[4 * i + 2],
                block[4 * i + 3],
            ]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }

        let (mut a, mut b, mut c, mut d, mut e) =
            (state[0], state[1], state[2], state[3], state[4]);
        for (i, &wi) in w.iter().enumerate() {
            let (f, k) = match i / 20 {
                0 => ((b & c) | (!b & d), 0x5a827999),
                1 => (b ^ c ^ d, 0x6ed9eba1),
                2 => ((b & c) | (b & d) | (c & d), 0x8f1bbcdc),
                _ => (b ^ c ^ d, 0xca62c1d6u32),
            };
            let tmp = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(k)
                .wrapping_add(wi);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = tmp;
        }

        state[0] = state[0].wrapping_add(a);
        state[1] = state[1].wrapping_add(b);
        state[2] = state[2].wrapping_add(c);
        state[3] = state[3].wrapping_add(d);
        state[4] = state[4].wrapping_add(e);
    }
}

impl Default for Sha1 {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDigest for Sha1 {
    fn algorithm(&self) -> &'static str {
        "sha1"
    }

    fn block_length(&self) -> usize {
        BLOCK_LEN
    }

    fn digest_length(&self) -> usize {
        20
    }

    fn start(&mut self) {
        self.state = [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476, 0xc3d2e1f0];
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
        let bits = (self.length as u64).wrapping_mul(8);
        block.extend_from_slice(&bits.to_be_bytes());
        for chunk in block.chunks_exact(BLOCK_LEN) {
            Self::compress(&mut state, chunk);
        }

        let mut out = Vec::with_capacity(20);
        for w in state {
            out.extend_from_slice(&w.to_be_bytes());
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

    fn sha1_hex(data: &[u8]) -> String {
        let mut md = Sha1::new();
        md.update(data);
        hex::encode(md.digest())
    }

    #[test]
    fn fips_vectors() {
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            sha1_hex(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq"),
            "84983e441c3bd26ebaae4aa1f95129e5e54670f1"
        );
    }

    #[test]
    fn million_a() {
        let mut md = Sha1::new();
        let chunk = [b'a'; 1000];
        for _ in 0..1000 {
            md.update(&chunk);
        }
        assert_eq!(
            hex::encode(md.digest()),
            "34aa973cd4c4daa4f61eeb2bdbad27316534016f"
        );
    }
}
