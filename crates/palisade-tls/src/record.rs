//! TLS record layer: framing, fragmentation limits, and the CBC+HMAC
//! protection applied after ChangeCipherSpec.
//!
//! TLS 1.0 chains the CBC IV across records; TLS 1.1 sends an explicit
//! per-record IV. The MAC check on receipt is constant-time and is
//! performed whether or not the padding looked valid, so both failure
//! paths cost the same.

use crate::alert::AlertDescription;
use crate::suites::CipherSuite;
use palisade_core::buffer::ByteBuffer;
use palisade_core::cipher::{Aes, BlockAlgorithm, BlockCipher, Cbc, Direction, StartOptions, TripleDes};
use palisade_core::hmac::Hmac;
use palisade_core::{Error, Result};
use rand_core::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

pub const RECORD_HEADER_LEN: usize = 5;
/// Senders fragment at 2^14 - 1024 to leave room for expansion.
pub const MAX_FRAGMENT: usize = (1 << 14) - 1024;
/// Receivers allow up to 2^14 + 2048 of compressed-and-ciphered payload.
pub const MAX_CIPHERTEXT: usize = (1 << 14) + 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Option<ContentType> {
        match v {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

/// One parsed inbound record.
#[derive(Debug, PartialEq, Eq)]
pub struct Record {
    pub content_type: ContentType,
    pub version: (u8, u8),
    pub fragment: Vec<u8>,
}

/// Pull one record off `input` if a complete one is buffered. `Ok(None)`
/// means more bytes are needed (the required count is in `needed`).
pub fn parse_record(
    input: &mut ByteBuffer,
    needed: &mut usize,
) -> std::result::Result<Option<Record>, AlertDescription> {
    if input.remaining() < RECORD_HEADER_LEN {
        *needed = RECORD_HEADER_LEN - input.remaining();
        return Ok(None);
    }
    let typ = input.peek(0).expect("checked");
    let major = input.peek(1).expect("checked");
    let minor = input.peek(2).expect("checked");
    let length =
        ((input.peek(3).expect("checked") as usize) << 8) | input.peek(4).expect("checked") as usize;

    let content_type = ContentType::from_u8(typ).ok_or(AlertDescription::UnexpectedMessage)?;
    if length > MAX_CIPHERTEXT {
        return Err(AlertDescription::RecordOverflow);
    }
    if input.remaining() < RECORD_HEADER_LEN + length {
        *needed = RECORD_HEADER_LEN + length - input.remaining();
        return Ok(None);
    }

    input.skip(RECORD_HEADER_LEN).expect("checked");
    let fragment = input.get_bytes(length).expect("checked");
    *needed = 0;
    Ok(Some(Record { content_type, version: (major, minor), fragment }))
}

pub fn encode_record(content_type: ContentType, version: (u8, u8), fragment: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_HEADER_LEN + fragment.len());
    out.push(content_type as u8);
    out.push(version.0);
    out.push(version.1);
    out.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
    out.extend_from_slice(fragment);
    out
}

fn raw_cbc(cipher: &str, key: &[u8]) -> Result<BlockCipher> {
    let algo: Box<dyn BlockAlgorithm> = match cipher {
        "AES-CBC" => Box::new(Aes::new(key)?),
        "3DES-CBC" => Box::new(TripleDes::new(key)?),
        other => return Err(Error::UnknownAlgorithm(other.to_string())),
    };
    Ok(BlockCipher::new(algo, Box::new(Cbc::without_padding())))
}

/// Per-direction protection state. Starts as the null cipher; key material
/// arrives with ChangeCipherSpec.
pub struct RecordProtection {
    pub suite: Option<CipherSuite>,
    mac_key: Vec<u8>,
    enc_key: Vec<u8>,
    /// Running IV for TLS 1.0; the initial IV otherwise.
    iv: Vec<u8>,
    pub seq: u64,
}

impl RecordProtection {
    pub fn null() -> Self {
        RecordProtection { suite: None, mac_key: Vec::new(), enc_key: Vec::new(), iv: Vec::new(), seq: 0 }
    }

    pub fn keyed(suite: CipherSuite, mac_key: Vec<u8>, enc_key: Vec<u8>, iv: Vec<u8>) -> Self {
        RecordProtection { suite: Some(suite), mac_key, enc_key, iv, seq: 0 }
    }

    fn bump_seq(&mut self) -> Result<u64> {
        let seq = self.seq;
        // The sequence number must never wrap; RFC 2246 requires renegotiation
        // long before 2^64 records.
        self.seq = seq
            .checked_add(1)
            .ok_or_else(|| Error::internal("record sequence number exhausted"))?;
        Ok(seq)
    }

    fn compute_mac(
        &self,
        seq: u64,
        content_type: ContentType,
        version: (u8, u8),
        fragment: &[u8],
    ) -> Result<Vec<u8>> {
        let suite = self.suite.as_ref().expect("mac requires a keyed state");
        let mut mac = Hmac::new(suite.mac_algorithm, &self.mac_key)?;
        mac.update(&seq.to_be_bytes());
        mac.update(&[content_type as u8, version.0, version.1]);
        mac.update(&(fragment.len() as u16).to_be_bytes());
        mac.update(fragment);
        Ok(mac.digest())
    }

    /// Apply MAC + CBC and frame a full outbound record.
    pub fn protect<R: RngCore>(
        &mut self,
        content_type: ContentType,
        version: (u8, u8),
        fragment: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let seq = self.bump_seq()?;
        let Some(suite) = self.suite else {
            return Ok(encode_record(content_type, version, fragment));
        };

        let mac = self.compute_mac(seq, content_type, version, fragment)?;
        let mut plaintext = Vec::with_capacity(fragment.len() + mac.len() + suite.block_length);
        plaintext.extend_from_slice(fragment);
        plaintext.extend_from_slice(&mac);

        // GenericBlockCipher padding: pad_len+1 bytes, each equal to pad_len.
        let block = suite.block_length;
        let pad_len = (block - (plaintext.len() + 1) % block) % block;
        plaintext.extend(std::iter::repeat(pad_len as u8).take(pad_len + 1));

        let explicit_iv = version.1 >= 2;
        let iv = if explicit_iv {
            let mut iv = vec![0u8; block];
            rng.fill_bytes(&mut iv);
            iv
        } else {
            self.iv.clone()
        };

        let mut cipher = raw_cbc(suite.cipher, &self.enc_key)?;
        cipher.start(Direction::Encrypt, &StartOptions::new().iv(&iv))?;
        cipher.update(&plaintext)?;
        cipher.finish()?;
        let ciphertext = cipher.take_output();
        plaintext.zeroize();

        if !explicit_iv {
            // Residue IV: the last ciphertext block chains into the next
            // record.
            self.iv = ciphertext[ciphertext.len() - block..].to_vec();
        }

        let mut payload = Vec::with_capacity(iv.len() + ciphertext.len());
        if explicit_iv {
            payload.extend_from_slice(&iv);
        }
        payload.extend_from_slice(&ciphertext);
        Ok(encode_record(content_type, version, &payload))
    }

    /// Reverse protection on an inbound fragment. Padding and MAC failures
    /// are indistinguishable (`BadRecordMac`), and both cost a full MAC
    /// computation.
    pub fn unprotect(
        &mut self,
        content_type: ContentType,
        version: (u8, u8),
        fragment: &[u8],
    ) -> std::result::Result<Vec<u8>, AlertDescription> {
        let seq = self.bump_seq().map_err(|_| AlertDescription::InternalError)?;
        let Some(suite) = self.suite else {
            return Ok(fragment.to_vec());
        };

        let block = suite.block_length;
        let explicit_iv = version.1 >= 2;
        let min_len = if explicit_iv { 2 * block } else { block };
        if fragment.len() < min_len || fragment.len() % block != 0 {
            return Err(AlertDescription::DecryptionFailed);
        }

        let (iv, ciphertext) = if explicit_iv {
            let (iv, rest) = fragment.split_at(block);
            (iv.to_vec(), rest)
        } else {
            (self.iv.clone(), fragment)
        };

        let mut cipher = raw_cbc(suite.cipher, &self.enc_key)
            .map_err(|_| AlertDescription::InternalError)?;
        cipher
            .start(Direction::Decrypt, &StartOptions::new().iv(&iv))
            .and_then(|_| cipher.update(ciphertext))
            .and_then(|_| cipher.finish())
            .map_err(|_| AlertDescription::DecryptionFailed)?;
        let plaintext = cipher.take_output();

        if !explicit_iv {
            self.iv = ciphertext[ciphertext.len() - block..].to_vec();
        }

        // Padding scan; failures are noted, not returned, so the MAC below
        // always runs.
        let mut pad_ok = 1u8;
        let pad_len = *plaintext.last().ok_or(AlertDescription::DecryptionFailed)? as usize;
        let total_pad = pad_len + 1;
        if total_pad + suite.mac_length > plaintext.len() {
            pad_ok = 0;
        } else {
            for &b in &plaintext[plaintext.len() - total_pad..] {
                pad_ok &= b.ct_eq(&(pad_len as u8)).unwrap_u8();
            }
        }

        let content_len = if pad_ok == 1 {
            plaintext.len() - total_pad - suite.mac_length
        } else {
            plaintext.len().saturating_sub(suite.mac_length)
        };
        let content = &plaintext[..content_len];
        let received_mac = &plaintext[content_len..content_len + suite.mac_length.min(plaintext.len() - content_len)];

        let expected = self
            .compute_mac(seq, content_type, version, content)
            .map_err(|_| AlertDescription::InternalError)?;
        let mac_ok = expected.ct_eq(received_mac).unwrap_u8();

        if pad_ok & mac_ok != 1 {
            return Err(AlertDescription::BadRecordMac);
        }
        Ok(content.to_vec())
    }
}

impl Drop for RecordProtection {
    fn drop(&mut self) {
        self.mac_key.zeroize();
        self.enc_key.zeroize();
    }
}

/// Split a logical message into record-sized fragments.
pub fn fragments(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.chunks(MAX_FRAGMENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suites::TLS_RSA_WITH_AES_128_CBC_SHA;
    use palisade_core::rng::Fortuna;

    fn keyed_pair() -> (RecordProtection, RecordProtection) {
        let suite = TLS_RSA_WITH_AES_128_CBC_SHA;
        let mac_key = vec![1u8; 20];
        let enc_key = vec![2u8; 16];
        let iv = vec![3u8; 16];
        (
            RecordProtection::keyed(suite, mac_key.clone(), enc_key.clone(), iv.clone()),
            RecordProtection::keyed(suite, mac_key, enc_key, iv),
        )
    }

    #[test]
    fn null_cipher_passes_through() {
        let mut w = RecordProtection::null();
        let mut rng = Fortuna::from_seed(b"record tests");
        let rec = w
            .protect(ContentType::Handshake, (3, 1), b"hello", &mut rng)
            .unwrap();
        assert_eq!(rec[0], 22);
        assert_eq!(&rec[5..], b"hello");

        let mut r = RecordProtection::null();
        let out = r.unprotect(ContentType::Handshake, (3, 1), &rec[5..]).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn protect_unprotect_tls10_chained_iv() {
        let (mut w, mut r) = keyed_pair();
        let mut rng = Fortuna::from_seed(b"record tests");
        for msg in [b"first record".as_slice(), b"second, longer record payload"] {
            let rec = w.protect(ContentType::ApplicationData, (3, 1), msg, &mut rng).unwrap();
            let out = r
                .unprotect(ContentType::ApplicationData, (3, 1), &rec[5..])
                .unwrap();
            assert_eq!(out, msg);
        }
    }

    #[test]
    fn protect_unprotect_tls11_explicit_iv() {
        let (mut w, mut r) = keyed_pair();
        let mut rng = Fortuna::from_seed(b"record tests");
        let rec = w.protect(ContentType::ApplicationData, (3, 2), b"explicit iv", &mut rng).unwrap();
        let out = r
            .unprotect(ContentType::ApplicationData, (3, 2), &rec[5..])
            .unwrap();
        assert_eq!(out, b"explicit iv");
    }

    #[test]
    fn tampering_gives_bad_record_mac() {
        let (mut w, mut r) = keyed_pair();
        let mut rng = Fortuna::from_seed(b"record tests");
        let mut rec = w.protect(ContentType::ApplicationData, (3, 1), b"payload", &mut rng).unwrap();
        let last = rec.len() - 1;
        rec[last] ^= 0x01;
        assert_eq!(
            r.unprotect(ContentType::ApplicationData, (3, 1), &rec[5..]),
            Err(AlertDescription::BadRecordMac)
        );
    }

    #[test]
    fn wrong_sequence_number_fails_mac() {
        let (mut w, mut r) = keyed_pair();
        let mut rng = Fortuna::from_seed(b"record tests");
        let rec = w.protect(ContentType::ApplicationData, (3, 1), b"one", &mut rng).unwrap();
        r.seq = 5;
        assert!(r.unprotect(ContentType::ApplicationData, (3, 1), &rec[5..]).is_err());
    }

    #[test]
    fn sequence_number_must_not_wrap() {
        let (mut w, _) = keyed_pair();
        let mut rng = Fortuna::from_seed(b"record tests");
        w.seq = u64::MAX;
        let err = w
            .protect(ContentType::ApplicationData, (3, 1), b"x", &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::InternalError { .. }));
    }

    #[test]
    fn record_parsing_needs_counts() {
        let mut buf = ByteBuffer::new();
        let mut needed = 0;
        assert!(parse_record(&mut buf, &mut needed).unwrap().is_none());
        assert_eq!(needed, 5);

        buf.put_bytes(&[23, 3, 1, 0, 4, 0xaa]);
        assert!(parse_record(&mut buf, &mut needed).unwrap().is_none());
        assert_eq!(needed, 3);

        buf.put_bytes(&[0xbb, 0xcc, 0xdd]);
        let rec = parse_record(&mut buf, &mut needed).unwrap().unwrap();
        assert_eq!(rec.content_type, ContentType::ApplicationData);
        assert_eq!(rec.fragment, vec![0xaa, 0xbb, 0xcc, 0xdd]);
    }

    #[test]
    fn oversized_record_is_rejected() {
        let mut buf = ByteBuffer::new();
        buf.put_bytes(&[23, 3, 1, 0x48, 0x01]); // 0x4801 > 2^14 + 2048
        let mut needed = 0;
        assert_eq!(
            parse_record(&mut buf, &mut needed),
            Err(AlertDescription::RecordOverflow)
        );
    }

    #[test]
    fn fragmentation_bound() {
        let big = vec![0u8; MAX_FRAGMENT * 2 + 10];
        let parts: Vec<&[u8]> = fragments(&big).collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() <= MAX_FRAGMENT));
    }
}
