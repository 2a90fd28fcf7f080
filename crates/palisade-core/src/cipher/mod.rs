//! Block-cipher framework: algorithms (AES, 3DES, RC2) behind
//! [`BlockAlgorithm`], chaining behind [`CipherMode`], and the streaming
//! [`BlockCipher`] driver that glues them together.
//!
//! The driver buffers arbitrary-sized `update` calls into whole blocks, so
//! feeding one byte at a time produces byte-identical output to a single
//! call. `finish` applies padding (block modes), flushes the final partial
//! segment (keystream modes), or emits/verifies the authentication tag
//! (GCM).

mod aes;
mod des;
mod gcm;
mod modes;
mod rc2;

pub use aes::Aes;
pub use des::{Des, TripleDes};
pub use gcm::Gcm;
pub use modes::{Cbc, Cfb, Ctr, Ecb, Ofb};
pub use rc2::Rc2;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// A keyed block primitive. The key schedule is computed at construction;
/// `encrypt_block`/`decrypt_block` transform exactly `block_size()` bytes.
pub trait BlockAlgorithm: Send {
    fn name(&self) -> &'static str;
    fn block_size(&self) -> usize;
    fn encrypt_block(&self, input: &[u8], output: &mut [u8]);
    fn decrypt_block(&self, input: &[u8], output: &mut [u8]);
}

/// Options handed to [`BlockCipher::start`].
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// IV / nonce. Required by every mode except ECB.
    pub iv: Option<Vec<u8>>,
    /// Additional authenticated data (GCM only).
    pub additional_data: Vec<u8>,
    /// Expected tag for AEAD decryption.
    pub tag: Option<Vec<u8>>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iv(mut self, iv: &[u8]) -> Self {
        self.iv = Some(iv.to_vec());
        self
    }

    pub fn additional_data(mut self, aad: &[u8]) -> Self {
        self.additional_data = aad.to_vec();
        self
    }

    pub fn tag(mut self, tag: &[u8]) -> Self {
        self.tag = Some(tag.to_vec());
        self
    }
}

/// A chaining mode. Implementations own per-mode state (previous block,
/// counter, GHASH accumulator) and are reset by `start`.
pub trait CipherMode: Send {
    fn name(&self) -> &'static str;

    fn start(
        &mut self,
        algo: &dyn BlockAlgorithm,
        dir: Direction,
        opts: &StartOptions,
    ) -> Result<()>;

    /// Transform `input` and append to `output`. `input` is exactly one
    /// block, except for the final call in keystream modes where it may be
    /// shorter.
    fn transform(
        &mut self,
        algo: &dyn BlockAlgorithm,
        dir: Direction,
        input: &[u8],
        output: &mut Vec<u8>,
    );

    /// Keystream modes accept a partial final segment; block modes do not.
    fn accepts_partial(&self) -> bool;

    /// Whether PKCS#7 padding applies (ECB/CBC).
    fn pads(&self) -> bool;

    /// Finalise the mode. For GCM this emits or checks the tag.
    fn finish(
        &mut self,
        algo: &dyn BlockAlgorithm,
        dir: Direction,
        output: &mut Vec<u8>,
    ) -> Result<()>;

    /// AEAD tag produced by encryption, available after `finish`.
    fn tag(&self) -> Option<&[u8]> {
        None
    }
}

/// PKCS#7: every pad byte equals the pad length; always applied, so a
/// whole-block input grows by one full block.
fn pkcs7_pad(buf: &mut Vec<u8>, block_size: usize) {
    let pad = block_size - (buf.len() % block_size);
    buf.extend(std::iter::repeat(pad as u8).take(pad));
}

fn pkcs7_unpad(buf: &mut Vec<u8>, block_size: usize) -> Result<()> {
    let pad = *buf.last().ok_or(Error::BadPadding)? as usize;
    if pad == 0 || pad > block_size || pad > buf.len() {
        return Err(Error::BadPadding);
    }
    if buf[buf.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(Error::BadPadding);
    }
    buf.truncate(buf.len() - pad);
    Ok(())
}

/// Streaming driver over one algorithm + one mode.
pub struct BlockCipher {
    algo: Box<dyn BlockAlgorithm>,
    mode: Box<dyn CipherMode>,
    dir: Direction,
    input: Vec<u8>,
    output: Vec<u8>,
    started: bool,
    finished: bool,
}

impl BlockCipher {
    pub fn new(algo: Box<dyn BlockAlgorithm>, mode: Box<dyn CipherMode>) -> Self {
        BlockCipher {
            algo,
            mode,
            dir: Direction::Encrypt,
            input: Vec::new(),
            output: Vec::new(),
            started: false,
            finished: false,
        }
    }

    pub fn block_size(&self) -> usize {
        self.algo.block_size()
    }

    pub fn mode_name(&self) -> &'static str {
        self.mode.name()
    }

    pub fn start(&mut self, dir: Direction, opts: &StartOptions) -> Result<()> {
        self.mode.start(self.algo.as_ref(), dir, opts)?;
        self.dir = dir;
        self.input.clear();
        self.output.clear();
        self.started = true;
        self.finished = false;
        Ok(())
    }

    /// Feed any number of bytes; whole blocks are transformed immediately.
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        if !self.started || self.finished {
            return Err(Error::InvalidParameter("cipher not started"));
        }
        self.input.extend_from_slice(data);

        let bs = self.algo.block_size();
        // When decrypting a padded mode, hold the last full block back so
        // finish() can strip padding from it.
        let hold = if self.dir == Direction::Decrypt && self.mode.pads() { bs } else { 0 };
        let mut offset = 0;
        while self.input.len() - offset > hold && self.input.len() - offset >= bs {
            self.mode.transform(
                self.algo.as_ref(),
                self.dir,
                &self.input[offset..offset + bs],
                &mut self.output,
            );
            offset += bs;
        }
        self.input.drain(..offset);
        Ok(())
    }

    /// Flush padding / the final segment / the tag.
    ///
    /// For AEAD decryption an `Err(BadMac)` means the tag did not verify;
    /// for padded modes an `Err(BadPadding)` means the padding was invalid.
    pub fn finish(&mut self) -> Result<()> {
        if !self.started || self.finished {
            return Err(Error::InvalidParameter("cipher not started"));
        }
        let bs = self.algo.block_size();

        if self.mode.pads() {
            match self.dir {
                Direction::Encrypt => {
                    pkcs7_pad(&mut self.input, bs);
                    let blocks = std::mem::take(&mut self.input);
                    for block in blocks.chunks_exact(bs) {
                        self.mode.transform(self.algo.as_ref(), self.dir, block, &mut self.output);
                    }
                }
                Direction::Decrypt => {
                    if self.input.len() != bs {
                        return Err(Error::BadPadding);
                    }
                    let block = std::mem::take(&mut self.input);
                    self.mode.transform(self.algo.as_ref(), self.dir, &block, &mut self.output);
                    pkcs7_unpad(&mut self.output, bs)?;
                }
            }
        } else {
            if !self.input.is_empty() {
                if !self.mode.accepts_partial() && self.input.len() % bs != 0 {
                    return Err(Error::InvalidParameter("input is not block-aligned"));
                }
                let rest = std::mem::take(&mut self.input);
                self.mode.transform(self.algo.as_ref(), self.dir, &rest, &mut self.output);
            }
            self.mode.finish(self.algo.as_ref(), self.dir, &mut self.output)?;
        }

        self.finished = true;
        Ok(())
    }

    /// Bytes produced so far (including, after `finish`, the final blocks;
    /// for GCM encryption the tag is available via [`Self::tag`], not here).
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// AEAD tag after an encrypting `finish`.
    pub fn tag(&self) -> Option<&[u8]> {
        self.mode.tag()
    }
}

/// Instantiate a cipher by registry name, e.g. `"AES-GCM"` or `"3DES-CBC"`.
pub fn create(name: &str, key: &[u8]) -> Result<BlockCipher> {
    let (algo_name, mode_name) = name
        .rsplit_once('-')
        .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))?;

    let algo: Box<dyn BlockAlgorithm> = match algo_name {
        "AES" => Box::new(Aes::new(key)?),
        "3DES" => Box::new(TripleDes::new(key)?),
        "DES" => Box::new(Des::new(key)?),
        "RC2" => Box::new(Rc2::new(key, key.len() * 8)?),
        _ => return Err(Error::UnknownAlgorithm(name.to_string())),
    };

    let mode: Box<dyn CipherMode> = match mode_name {
        "ECB" => Box::new(Ecb::new()),
        "CBC" => Box::new(Cbc::new()),
        "CFB" => Box::new(Cfb::new()),
        "OFB" => Box::new(Ofb::new()),
        "CTR" => Box::new(Ctr::new()),
        "GCM" if algo_name == "AES" => Box::new(Gcm::new()),
        _ => return Err(Error::UnknownAlgorithm(name.to_string())),
    };

    Ok(BlockCipher::new(algo, mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkcs7_always_pads() {
        let mut b = vec![1u8; 16];
        pkcs7_pad(&mut b, 16);
        assert_eq!(b.len(), 32);
        assert_eq!(&b[16..], &[16u8; 16]);
        pkcs7_unpad(&mut b, 16).unwrap();
        assert_eq!(b, vec![1u8; 16]);
    }

    #[test]
    fn pkcs7_rejects_bad_fill() {
        let mut b = vec![3, 3, 2];
        assert_eq!(pkcs7_unpad(&mut b, 8), Err(Error::BadPadding));
        let mut b = vec![0u8];
        assert_eq!(pkcs7_unpad(&mut b, 8), Err(Error::BadPadding));
        let mut b = vec![9u8; 4];
        assert_eq!(pkcs7_unpad(&mut b, 8), Err(Error::BadPadding));
    }

    #[test]
    fn registry_names() {
        assert!(create("AES-CBC", &[0u8; 16]).is_ok());
        assert!(create("AES-GCM", &[0u8; 32]).is_ok());
        assert!(create("3DES-CBC", &[0u8; 24]).is_ok());
        assert!(create("RC2-ECB", &[0u8; 8]).is_ok());
        assert!(matches!(
            create("AES-XTS", &[0u8; 16]),
            Err(Error::UnknownAlgorithm(_))
        ));
        // GCM is defined over a 128-bit block only.
        assert!(create("3DES-GCM", &[0u8; 24]).is_err());
    }

    #[test]
    fn update_before_start_fails() {
        let mut c = create("AES-CBC", &[0u8; 16]).unwrap();
        assert!(c.update(b"0123456789abcdef").is_err());
    }
}
