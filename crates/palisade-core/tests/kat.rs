//! Cross-module known-answer tests over the public API.

use hex_literal::hex;
use palisade_core::asn1;
use palisade_core::cipher::{self, Direction, StartOptions};
use palisade_core::hash;
use palisade_core::hmac;
use palisade_core::pbkdf2::pbkdf2;

#[test]
fn kat_hash_family() {
    let cases: [(&str, &[u8], &str); 6] = [
        ("md5", b"abc", "900150983cd24fb0d6963f7d28e17f72"),
        ("sha1", b"abc", "a9993e364706816aba3e25717850c26c9cd0d89d"),
        (
            "sha256",
            b"abc",
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        ),
        (
            "sha384",
            b"abc",
            "cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed8086072ba1e7cc2358baeca134c825a7",
        ),
        (
            "sha512/224",
            b"abc",
            "4634270f707b6a54daae7530460842e20e37ed265ceee9a43e8924aa",
        ),
        (
            "sha512/256",
            b"abc",
            "53048e2681941ef99b2e29b76b4c7dabe4c2d0c634fc6d46e0e2f13107e7af23",
        ),
    ];
    for (algorithm, input, expected) in cases {
        let digest = hash::digest(algorithm, input).unwrap();
        assert_eq!(hex::encode(digest), expected, "{algorithm}");
    }
}

#[test]
fn kat_hmac() {
    let key = b"Jefe";
    let msg = b"what do ya want for nothing?";
    assert_eq!(
        hex::encode(hmac::hmac("md5", key, msg).unwrap()),
        "750c783e6ab0b503eaa86e310a5db738"
    );
    assert_eq!(
        hex::encode(hmac::hmac("sha1", key, msg).unwrap()),
        "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
    );
}

#[test]
fn kat_aes_ecb_fips197() {
    let mut c = cipher::create("AES-ECB", &hex!("000102030405060708090a0b0c0d0e0f")).unwrap();
    c.start(Direction::Encrypt, &StartOptions::new()).unwrap();
    c.update(&hex!("00112233445566778899aabbccddeeff")).unwrap();
    assert_eq!(&c.output()[..16], hex!("69c4e0d86a7b0430d8cdb78070b4c55a"));
}

#[test]
fn kat_aes256_gcm_empty() {
    let mut c = cipher::create("AES-GCM", &[0u8; 32]).unwrap();
    c.start(Direction::Encrypt, &StartOptions::new().iv(&[0u8; 12])).unwrap();
    c.finish().unwrap();
    assert!(c.output().is_empty());
    assert_eq!(c.tag().unwrap(), hex!("530f8afbc74536b9a963b4f1c4cb738b"));
}

/// Every mode produces identical output whether fed whole or byte-by-byte.
#[test]
fn streaming_equivalence_all_modes() {
    let data = b"Streaming equivalence across every chunking of the input.";
    let cases: [(&str, usize, bool); 8] = [
        ("AES-ECB", 16, false),
        ("AES-CBC", 16, true),
        ("AES-CFB", 16, true),
        ("AES-OFB", 16, true),
        ("AES-CTR", 16, true),
        ("AES-GCM", 32, true),
        ("3DES-CBC", 24, true),
        ("RC2-CBC", 16, true),
    ];
    for (name, key_len, wants_iv) in cases {
        let key = vec![0x42u8; key_len];
        let iv_len = if name == "AES-GCM" {
            12
        } else if name.starts_with("AES") {
            16
        } else {
            8
        };
        let opts = if wants_iv {
            StartOptions::new().iv(&vec![0x24u8; iv_len])
        } else {
            StartOptions::new()
        };

        let mut whole = cipher::create(name, &key).unwrap();
        whole.start(Direction::Encrypt, &opts).unwrap();
        whole.update(data).unwrap();
        whole.finish().unwrap();

        let mut by_byte = cipher::create(name, &key).unwrap();
        by_byte.start(Direction::Encrypt, &opts).unwrap();
        for b in data {
            by_byte.update(&[*b]).unwrap();
        }
        by_byte.finish().unwrap();

        assert_eq!(whole.output(), by_byte.output(), "{name}");
        assert_eq!(
            whole.tag().map(<[u8]>::to_vec),
            by_byte.tag().map(<[u8]>::to_vec),
            "{name} tag"
        );
    }
}

#[test]
fn decrypt_inverts_encrypt_for_all_modes() {
    let data = b"round trip payload that is not block aligned..";
    for name in ["AES-ECB", "AES-CBC", "AES-CFB", "AES-OFB", "AES-CTR", "3DES-CBC", "RC2-CBC", "DES-CBC"] {
        let key_len = match name {
            "3DES-CBC" => 24,
            "RC2-CBC" | "DES-CBC" => 8,
            _ => 16,
        };
        let iv_len = if name.starts_with("AES") { 16 } else { 8 };
        let key = vec![0x31u8; key_len];
        let opts = if name == "AES-ECB" {
            StartOptions::new()
        } else {
            StartOptions::new().iv(&vec![0x13u8; iv_len])
        };

        let mut enc = cipher::create(name, &key).unwrap();
        enc.start(Direction::Encrypt, &opts).unwrap();
        enc.update(data).unwrap();
        enc.finish().unwrap();
        let ct = enc.take_output();

        let mut dec = cipher::create(name, &key).unwrap();
        dec.start(Direction::Decrypt, &opts).unwrap();
        dec.update(&ct).unwrap();
        dec.finish().unwrap();
        assert_eq!(dec.output(), data, "{name}");
    }
}

#[test]
fn kat_asn1_examples() {
    // Minimal DER re-encodes byte-identically.
    for input in [
        hex!("020100").to_vec(),
        hex!("0300").to_vec(),
        hex!("030100").to_vec(),
        hex!("0303006e5d").to_vec(),
        hex!("030400020112").to_vec(),
        hex!("300f020101020102020103020104020105").to_vec(),
    ] {
        let node = asn1::from_der_bytes(&input).unwrap();
        assert_eq!(asn1::to_der(&node), input);
    }

    assert_eq!(hex::encode(asn1::integer_to_der(-129)), "ff7f");
    assert_eq!(asn1::der_to_integer(&hex!("0080")).unwrap(), 128);
    assert_eq!(
        asn1::der_to_oid(&asn1::oid_to_der("1.2.840.113549").unwrap()).unwrap(),
        "1.2.840.113549"
    );
}

#[test]
fn kat_pbkdf2_rfc6070() {
    assert_eq!(
        hex::encode(pbkdf2(b"password", b"salt", 4096, 20, "sha1").unwrap()),
        "4b007901b765489abead49d926f721d065a429c1"
    );
}
