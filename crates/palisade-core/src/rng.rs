//! Fortuna-style PRNG built on this crate's own AES-256-CTR generator and
//! SHA-256 entropy pools, seeded from the operating system via `getrandom`.
//!
//! The generator rekeys itself after every request, so a captured key never
//! reveals earlier output. Entropy collected through [`Fortuna::collect`]
//! is spread round-robin over 32 pools; a reseed folds in pool 0 always and
//! pool *i* every 2^i-th reseed.

use crate::cipher::{Aes, BlockAlgorithm};
use crate::error::{Error, Result};
use crate::hash::{MessageDigest, Sha256};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

const NUM_POOLS: usize = 32;
/// Entropy threshold before an automatic reseed is worthwhile.
const MIN_POOL_BYTES: usize = 32;
/// Generator output per rekey, per Fortuna's 2^16-byte request cap.
const MAX_REQUEST: usize = 1 << 16;

pub struct Fortuna {
    key: [u8; 32],
    counter: u128,
    pools: Vec<Sha256>,
    pool_index: usize,
    reseed_count: u32,
    collected: usize,
}

impl Fortuna {
    /// A generator seeded from the platform entropy source.
    pub fn new() -> Result<Self> {
        let mut rng = Fortuna {
            key: [0u8; 32],
            counter: 0,
            pools: (0..NUM_POOLS).map(|_| Sha256::new()).collect(),
            pool_index: 0,
            reseed_count: 0,
            collected: 0,
        };
        let mut seed = [0u8; 48];
        getrandom::getrandom(&mut seed)
            .map_err(|e| Error::internal(format!("platform entropy unavailable: {e}")))?;
        rng.collect(&seed);
        seed.zeroize();
        rng.reseed();
        Ok(rng)
    }

    /// Deterministic instance for reproducible tests. Not for production
    /// keys.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut rng = Fortuna {
            key: [0u8; 32],
            counter: 0,
            pools: (0..NUM_POOLS).map(|_| Sha256::new()).collect(),
            pool_index: 0,
            reseed_count: 0,
            collected: 0,
        };
        rng.collect(seed);
        rng.reseed();
        rng
    }

    /// Feed entropy into the pools.
    pub fn collect(&mut self, data: &[u8]) {
        for chunk in data.chunks(4) {
            self.pools[self.pool_index].update(chunk);
            self.pool_index = (self.pool_index + 1) % NUM_POOLS;
        }
        self.collected += data.len();
    }

    fn reseed(&mut self) {
        self.reseed_count = self.reseed_count.wrapping_add(1);
        let mut md = Sha256::new();
        md.update(&self.key);
        for i in 0..NUM_POOLS {
            // Pool 0 always participates; pool i joins every 2^i reseeds.
            if i == 0 || self.reseed_count % (1u32 << i.min(31)) == 0 {
                let pool_digest = self.pools[i].digest();
                md.update(&pool_digest);
                self.pools[i].start();
            }
        }
        let digest = md.digest();
        self.key.copy_from_slice(&digest);
        self.counter += 1;
        self.collected = 0;
    }

    fn generate_into(&mut self, out: &mut [u8]) {
        let aes = Aes::new(&self.key).expect("32-byte generator key");
        let mut block = [0u8; 16];
        for chunk in out.chunks_mut(16) {
            aes.encrypt_block(&self.counter.to_be_bytes(), &mut block);
            self.counter += 1;
            chunk.copy_from_slice(&block[..chunk.len()]);
        }
        // Rekey so this request's key cannot reproduce past output.
        let mut new_key = [0u8; 32];
        aes.encrypt_block(&self.counter.to_be_bytes(), &mut block);
        new_key[..16].copy_from_slice(&block);
        self.counter += 1;
        aes.encrypt_block(&self.counter.to_be_bytes(), &mut block);
        new_key[16..].copy_from_slice(&block);
        self.counter += 1;
        self.key = new_key;
        block.zeroize();
    }

    /// Fill `out` with generator output, reseeding first when enough
    /// entropy has accumulated.
    pub fn fill(&mut self, out: &mut [u8]) {
        if self.collected >= MIN_POOL_BYTES {
            self.reseed();
        }
        for chunk in out.chunks_mut(MAX_REQUEST) {
            self.generate_into(chunk);
        }
    }

    pub fn get_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.fill(&mut out);
        out
    }
}

impl Drop for Fortuna {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl RngCore for Fortuna {
    fn next_u32(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        self.fill(&mut raw);
        u32::from_be_bytes(raw)
    }

    fn next_u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        self.fill(&mut raw);
        u64::from_be_bytes(raw)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.fill(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand_core::Error> {
        self.fill(dest);
        Ok(())
    }
}

impl CryptoRng for Fortuna {}
