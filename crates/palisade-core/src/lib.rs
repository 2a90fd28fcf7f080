//! palisade-core: pure-software cryptography and PKI building blocks.
//!
//! The pieces needed to assemble a TLS stack without any platform crypto:
//! an ASN.1 BER/DER codec with a declarative validator, the MD5/SHA hash
//! family with HMAC and PBKDF2, a block-cipher framework (AES, 3DES, RC2 in
//! ECB/CBC/CFB/OFB/CTR/GCM), a Fortuna-style PRNG, PEM framing, and RSA +
//! Ed25519 with DER/PEM key transport.
//!
//! Everything is CPU-only and runs to completion in the calling context:
//! there is no I/O, no global state, and no built-in entropy source beyond
//! the pluggable RNG seeding.

pub mod asn1;
pub mod buffer;
pub mod cipher;
mod error;
pub mod hash;
pub mod hmac;
pub mod oids;
pub mod pbkdf2;
pub mod pem;
pub mod pki;
pub mod rng;

pub use buffer::ByteBuffer;
pub use error::{Error, Result};
pub use hmac::Hmac;
pub use pbkdf2::pbkdf2;
pub use rng::Fortuna;
