//! Cipher suite descriptions for the TLS 1.0/1.1 RSA key-exchange suites
//! implemented here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuite {
    pub id: [u8; 2],
    pub name: &'static str,
    /// Registry name for the record cipher.
    pub cipher: &'static str,
    pub enc_key_length: usize,
    pub block_length: usize,
    /// Fixed IV material drawn from the key block (TLS 1.0).
    pub iv_length: usize,
    pub mac_algorithm: &'static str,
    pub mac_length: usize,
}

pub const TLS_RSA_WITH_AES_128_CBC_SHA: CipherSuite = CipherSuite {
    id: [0x00, 0x2f],
    name: "TLS_RSA_WITH_AES_128_CBC_SHA",
    cipher: "AES-CBC",
    enc_key_length: 16,
    block_length: 16,
    iv_length: 16,
    mac_algorithm: "sha1",
    mac_length: 20,
};

pub const TLS_RSA_WITH_AES_256_CBC_SHA: CipherSuite = CipherSuite {
    id: [0x00, 0x35],
    name: "TLS_RSA_WITH_AES_256_CBC_SHA",
    cipher: "AES-CBC",
    enc_key_length: 32,
    block_length: 16,
    iv_length: 16,
    mac_algorithm: "sha1",
    mac_length: 20,
};

pub const TLS_RSA_WITH_3DES_EDE_CBC_SHA: CipherSuite = CipherSuite {
    id: [0x00, 0x0a],
    name: "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
    cipher: "3DES-CBC",
    enc_key_length: 24,
    block_length: 8,
    iv_length: 8,
    mac_algorithm: "sha1",
    mac_length: 20,
};

/// Suites offered by default, strongest first.
pub const DEFAULT_SUITES: &[CipherSuite] = &[
    TLS_RSA_WITH_AES_256_CBC_SHA,
    TLS_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_3DES_EDE_CBC_SHA,
];

pub fn from_id(id: [u8; 2]) -> Option<CipherSuite> {
    DEFAULT_SUITES.iter().copied().find(|s| s.id == id)
}

/// Key block octets the suite consumes: two MAC keys, two write keys and
/// two fixed IVs, in that order.
pub fn key_block_length(suite: &CipherSuite) -> usize {
    2 * suite.mac_length + 2 * suite.enc_key_length + 2 * suite.iv_length
}
