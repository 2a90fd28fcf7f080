//! Runs the published known-answer vectors against palisade and prints a
//! per-group pass/fail table. Exits non-zero on any mismatch.

use anyhow::{bail, Result};
use palisade_core::asn1;
use palisade_core::cipher::{self, Direction, StartOptions};
use palisade_core::hash;
use palisade_core::hmac;
use palisade_core::pbkdf2::pbkdf2;
use palisade_tls::prf_tls1;

struct Group {
    name: &'static str,
    run: fn() -> Result<()>,
}

fn check(name: &str, got: &[u8], expected_hex: &str) -> Result<()> {
    let got = hex::encode(got);
    if got != expected_hex {
        bail!("{name}: got {got}, expected {expected_hex}");
    }
    Ok(())
}

fn hashes() -> Result<()> {
    check("sha256(empty)", &hash::digest("sha256", b"")?,
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")?;
    check("sha256(abc)", &hash::digest("sha256", b"abc")?,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")?;
    check("sha256(a*1000)", &hash::digest("sha256", &vec![b'a'; 1000])?,
        "41edece42d63e8d9bf515a9ba6932e1c20cbc9f5a5d134645adb5db1b9737ea3")?;
    check("sha1(abc)", &hash::digest("sha1", b"abc")?,
        "a9993e364706816aba3e25717850c26c9cd0d89d")?;
    check("md5(abc)", &hash::digest("md5", b"abc")?,
        "900150983cd24fb0d6963f7d28e17f72")?;
    check("sha512(abc)", &hash::digest("sha512", b"abc")?,
        "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f")?;
    Ok(())
}

fn hmacs() -> Result<()> {
    check("hmac-md5(Jefe)", &hmac::hmac("md5", b"Jefe", b"what do ya want for nothing?")?,
        "750c783e6ab0b503eaa86e310a5db738")?;
    check("hmac-sha1(Jefe)", &hmac::hmac("sha1", b"Jefe", b"what do ya want for nothing?")?,
        "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79")?;
    Ok(())
}

fn aes() -> Result<()> {
    let key: Vec<u8> = (0u8..16).collect();
    let block: Vec<u8> = (0u8..16).map(|i| (i << 4) | i).collect();
    let mut c = cipher::create("AES-ECB", &key)?;
    c.start(Direction::Encrypt, &StartOptions::new())?;
    c.update(&block)?;
    check("aes-128-ecb", &c.output()[..16], "69c4e0d86a7b0430d8cdb78070b4c55a")?;
    Ok(())
}

fn gcm() -> Result<()> {
    let mut c = cipher::create("AES-GCM", &[0u8; 32])?;
    c.start(Direction::Encrypt, &StartOptions::new().iv(&[0u8; 12]))?;
    c.finish()?;
    if !c.output().is_empty() {
        bail!("aes-256-gcm empty plaintext produced ciphertext");
    }
    check("aes-256-gcm tag", c.tag().unwrap(), "530f8afbc74536b9a963b4f1c4cb738b")?;
    Ok(())
}

fn asn1_codec() -> Result<()> {
    for input in ["020100", "0300", "030100", "0303006e5d", "030400020112"] {
        let raw = hex::decode(input)?;
        let back = asn1::to_der(&asn1::from_der_bytes(&raw)?);
        if back != raw {
            bail!("asn1 round trip {input}: got {}", hex::encode(back));
        }
    }
    let non_minimal = asn1::to_der(&asn1::from_der_bytes(&hex::decode("02020001")?)?);
    check("asn1 minimal integer", &non_minimal, "020101")?;

    check("oid rsa", &asn1::oid_to_der("1.2.840.113549")?, "2a864886f70d")?;
    check("oid sha256", &asn1::oid_to_der("2.16.840.1.101.3.4.2.1")?, "608648016503040201")?;

    if asn1::utc_time_to_date("1102231234Z")? != 1_298_464_440_000 {
        bail!("utc time vector");
    }
    if asn1::generalized_time_to_date("20110223123400.123Z")? != 1_298_464_440_123 {
        bail!("generalized time vector");
    }
    Ok(())
}

fn prf() -> Result<()> {
    let out = prf_tls1(&[0xab; 48], "PRF Testvector", &[0xcd; 64], 104)?;
    check(
        "tls1 prf",
        &out,
        "d3d4d1e349b5d515044666d51de32bab258cb521b6b053463e354832fd976754443bcf9a296519bc289abcbc1187e4ebd31e602353776c408aafb74cbc85eb01d50ebd728cc9ee89b1f57f7f8ca1be7a58eff129934d41d3e5bcec2071abfbabad60e4c936e4e8e8ddd2",
    )
}

fn kdf() -> Result<()> {
    check("pbkdf2-sha1 c=2", &pbkdf2(b"password", b"salt", 2, 20, "sha1")?,
        "ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957")?;
    Ok(())
}

fn main() {
    let groups = [
        Group { name: "hash", run: hashes },
        Group { name: "hmac", run: hmacs },
        Group { name: "aes", run: aes },
        Group { name: "gcm", run: gcm },
        Group { name: "asn1", run: asn1_codec },
        Group { name: "prf", run: prf },
        Group { name: "pbkdf2", run: kdf },
    ];

    let mut failures = 0;
    for group in &groups {
        match (group.run)() {
            Ok(()) => println!("{:<8} OK", group.name),
            Err(e) => {
                failures += 1;
                println!("{:<8} FAIL: {e}", group.name);
            }
        }
    }
    if failures > 0 {
        std::process::exit(1);
    }
    println!("all KATs OK");
}
