//! Handshake message structures, their binary codecs, and the key-material
//! derivation around the TLS 1.0 PRF.

use crate::prf::prf_tls1;
use crate::suites::{key_block_length, CipherSuite};
use palisade_core::buffer::ByteBuffer;
use palisade_core::{Error, Result};

pub const MASTER_SECRET_LEN: usize = 48;
pub const VERIFY_DATA_LEN: usize = 12;
/// SNI extension number.
const EXT_SERVER_NAME: u16 = 0x0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<HandshakeType> {
        use HandshakeType::*;
        Some(match v {
            0 => HelloRequest,
            1 => ClientHello,
            2 => ServerHello,
            11 => Certificate,
            12 => ServerKeyExchange,
            13 => CertificateRequest,
            14 => ServerHelloDone,
            15 => CertificateVerify,
            16 => ClientKeyExchange,
            20 => Finished,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub version: (u8, u8),
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<[u8; 2]>,
    pub compression_methods: Vec<u8>,
    /// SNI host name, when the extension was present.
    pub server_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub version: (u8, u8),
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: [u8; 2],
    pub compression_method: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    HelloRequest,
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    /// DER certificates, leaf first.
    Certificate(Vec<Vec<u8>>),
    ServerKeyExchange,
    /// Accepted certificate types and encoded acceptable CA names.
    CertificateRequest {
        certificate_types: Vec<u8>,
        authorities: Vec<Vec<u8>>,
    },
    ServerHelloDone,
    CertificateVerify(Vec<u8>),
    /// RSA-encrypted premaster secret.
    ClientKeyExchange(Vec<u8>),
    Finished(Vec<u8>),
}

impl HandshakeMessage {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            HandshakeMessage::HelloRequest => HandshakeType::HelloRequest,
            HandshakeMessage::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeMessage::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeMessage::Certificate(_) => HandshakeType::Certificate,
            HandshakeMessage::ServerKeyExchange => HandshakeType::ServerKeyExchange,
            HandshakeMessage::CertificateRequest { .. } => HandshakeType::CertificateRequest,
            HandshakeMessage::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakeMessage::CertificateVerify(_) => HandshakeType::CertificateVerify,
            HandshakeMessage::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            HandshakeMessage::Finished(_) => HandshakeType::Finished,
        }
    }

    /// Full wire form: type, 24-bit length, body.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut out = Vec::with_capacity(4 + body.len());
        out.push(self.handshake_type() as u8);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&body);
        out
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut b = ByteBuffer::new();
        match self {
            HandshakeMessage::HelloRequest
            | HandshakeMessage::ServerKeyExchange
            | HandshakeMessage::ServerHelloDone => {}

            HandshakeMessage::ClientHello(hello) => {
                b.put_byte(hello.version.0);
                b.put_byte(hello.version.1);
                b.put_bytes(&hello.random);
                b.put_byte(hello.session_id.len() as u8);
                b.put_bytes(&hello.session_id);
                b.put_u16((hello.cipher_suites.len() * 2) as u16);
                for suite in &hello.cipher_suites {
                    b.put_bytes(suite);
                }
                b.put_byte(hello.compression_methods.len() as u8);
                b.put_bytes(&hello.compression_methods);

                if let Some(name) = &hello.server_name {
                    // server_name_list with one host_name entry.
                    let name = name.as_bytes();
                    let list_len = 3 + name.len();
                    let ext_len = 2 + list_len;
                    b.put_u16((4 + ext_len) as u16);
                    b.put_u16(EXT_SERVER_NAME);
                    b.put_u16(ext_len as u16);
                    b.put_u16(list_len as u16);
                    b.put_byte(0); // host_name
                    b.put_u16(name.len() as u16);
                    b.put_bytes(name);
                }
            }

            HandshakeMessage::ServerHello(hello) => {
                b.put_byte(hello.version.0);
                b.put_byte(hello.version.1);
                b.put_bytes(&hello.random);
                b.put_byte(hello.session_id.len() as u8);
                b.put_bytes(&hello.session_id);
                b.put_bytes(&hello.cipher_suite);
                b.put_byte(hello.compression_method);
            }

            HandshakeMessage::Certificate(chain) => {
                let total: usize = chain.iter().map(|c| 3 + c.len()).sum();
                b.put_u24(total as u32);
                for cert in chain {
                    b.put_u24(cert.len() as u32);
                    b.put_bytes(cert);
                }
            }

            HandshakeMessage::CertificateRequest { certificate_types, authorities } => {
                b.put_byte(certificate_types.len() as u8);
                b.put_bytes(certificate_types);
                let total: usize = authorities.iter().map(|a| 2 + a.len()).sum();
                b.put_u16(total as u16);
                for authority in authorities {
                    b.put_u16(authority.len() as u16);
                    b.put_bytes(authority);
                }
            }

            HandshakeMessage::CertificateVerify(signature) => {
                b.put_u16(signature.len() as u16);
                b.put_bytes(signature);
            }

            HandshakeMessage::ClientKeyExchange(encrypted) => {
                b.put_u16(encrypted.len() as u16);
                b.put_bytes(encrypted);
            }

            HandshakeMessage::Finished(verify_data) => {
                b.put_bytes(verify_data);
            }
        }
        b.into_vec()
    }

    /// Decode one message body. `body` is the payload after the 4-byte
    /// header.
    pub fn decode(typ: HandshakeType, body: &[u8]) -> Result<HandshakeMessage> {
        let mut b = ByteBuffer::from_slice(body);
        let msg = match typ {
            HandshakeType::HelloRequest => HandshakeMessage::HelloRequest,
            HandshakeType::ServerKeyExchange => {
                if !b.is_empty() {
                    // Anything but the empty RSA form is unsupported here.
                    return Err(Error::UnexpectedMessage {
                        expected: HandshakeType::ServerKeyExchange as u8,
                        got: HandshakeType::ServerKeyExchange as u8,
                    });
                }
                HandshakeMessage::ServerKeyExchange
            }
            HandshakeType::ServerHelloDone => {
                if !b.is_empty() {
                    return Err(Error::internal("ServerHelloDone carries no body"));
                }
                HandshakeMessage::ServerHelloDone
            }

            HandshakeType::ClientHello => {
                let version = (b.get_byte()?, b.get_byte()?);
                let mut random = [0u8; 32];
                random.copy_from_slice(&b.get_bytes(32)?);
                let sid_len = b.get_byte()? as usize;
                let session_id = b.get_bytes(sid_len)?;
                let suites_len = b.get_u16()? as usize;
                if suites_len % 2 != 0 {
                    return Err(Error::internal("odd cipher_suites length"));
                }
                let mut cipher_suites = Vec::with_capacity(suites_len / 2);
                for _ in 0..suites_len / 2 {
                    cipher_suites.push([b.get_byte()?, b.get_byte()?]);
                }
                let comp_len = b.get_byte()? as usize;
                let compression_methods = b.get_bytes(comp_len)?;
                let server_name = parse_server_name_extension(&mut b)?;
                HandshakeMessage::ClientHello(ClientHello {
                    version,
                    random,
                    session_id,
                    cipher_suites,
                    compression_methods,
                    server_name,
                })
            }

            HandshakeType::ServerHello => {
                let version = (b.get_byte()?, b.get_byte()?);
                let mut random = [0u8; 32];
                random.copy_from_slice(&b.get_bytes(32)?);
                let sid_len = b.get_byte()? as usize;
                let session_id = b.get_bytes(sid_len)?;
                let cipher_suite = [b.get_byte()?, b.get_byte()?];
                let compression_method = b.get_byte()?;
                HandshakeMessage::ServerHello(ServerHello {
                    version,
                    random,
                    session_id,
                    cipher_suite,
                    compression_method,
                })
            }

            HandshakeType::Certificate => {
                let total = b.get_u24()? as usize;
                if total != b.remaining() {
                    return Err(Error::internal("certificate list length mismatch"));
                }
                let mut chain = Vec::new();
                while !b.is_empty() {
                    let len = b.get_u24()? as usize;
                    chain.push(b.get_bytes(len)?);
                }
                HandshakeMessage::Certificate(chain)
            }

            HandshakeType::CertificateRequest => {
                let types_len = b.get_byte()? as usize;
                let certificate_types = b.get_bytes(types_len)?;
                let total = b.get_u16()? as usize;
                if total != b.remaining() {
                    return Err(Error::internal("certificate_authorities length mismatch"));
                }
                let mut authorities = Vec::new();
                while !b.is_empty() {
                    let len = b.get_u16()? as usize;
                    authorities.push(b.get_bytes(len)?);
                }
                HandshakeMessage::CertificateRequest { certificate_types, authorities }
            }

            HandshakeType::CertificateVerify => {
                let len = b.get_u16()? as usize;
                HandshakeMessage::CertificateVerify(b.get_bytes(len)?)
            }

            HandshakeType::ClientKeyExchange => {
                let len = b.get_u16()? as usize;
                HandshakeMessage::ClientKeyExchange(b.get_bytes(len)?)
            }

            HandshakeType::Finished => HandshakeMessage::Finished(b.drain()),
        };
        Ok(msg)
    }
}

fn parse_server_name_extension(b: &mut ByteBuffer) -> Result<Option<String>> {
    if b.is_empty() {
        return Ok(None);
    }
    let ext_total = b.get_u16()? as usize;
    if ext_total != b.remaining() {
        return Err(Error::internal("extensions length mismatch"));
    }
    let mut server_name = None;
    while !b.is_empty() {
        let ext_type = b.get_u16()?;
        let ext_len = b.get_u16()? as usize;
        let data = b.get_bytes(ext_len)?;
        if ext_type == EXT_SERVER_NAME && server_name.is_none() && !data.is_empty() {
            let mut d = ByteBuffer::from_slice(&data);
            let list_len = d.get_u16()? as usize;
            if list_len != d.remaining() {
                return Err(Error::internal("server_name_list length mismatch"));
            }
            while !d.is_empty() {
                let name_type = d.get_byte()?;
                let name_len = d.get_u16()? as usize;
                let name = d.get_bytes(name_len)?;
                if name_type == 0 {
                    server_name = Some(
                        String::from_utf8(name)
                            .map_err(|_| Error::internal("SNI host name is not UTF-8"))?,
                    );
                    break;
                }
            }
        }
    }
    Ok(server_name)
}

// -- key derivation (§ RFC 2246 6.3 / 8.1) --------------------------------

pub struct KeyMaterial {
    pub client_mac_key: Vec<u8>,
    pub server_mac_key: Vec<u8>,
    pub client_key: Vec<u8>,
    pub server_key: Vec<u8>,
    pub client_iv: Vec<u8>,
    pub server_iv: Vec<u8>,
}

pub fn compute_master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<Vec<u8>> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    prf_tls1(pre_master_secret, "master secret", &seed, MASTER_SECRET_LEN)
}

/// Key block split: MAC keys, then write keys, then fixed IVs, client
/// before server throughout.
pub fn derive_key_material(
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    suite: &CipherSuite,
) -> Result<KeyMaterial> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);
    let block = prf_tls1(master_secret, "key expansion", &seed, key_block_length(suite))?;

    let mut at = 0;
    let mut take = |n: usize| {
        let part = block[at..at + n].to_vec();
        at += n;
        part
    };
    Ok(KeyMaterial {
        client_mac_key: take(suite.mac_length),
        server_mac_key: take(suite.mac_length),
        client_key: take(suite.enc_key_length),
        server_key: take(suite.enc_key_length),
        client_iv: take(suite.iv_length),
        server_iv: take(suite.iv_length),
    })
}

/// `PRF(master, label, MD5(transcript) || SHA1(transcript), 12)`.
pub fn finished_verify_data(
    master_secret: &[u8],
    label: &str,
    md5_digest: &[u8],
    sha1_digest: &[u8],
) -> Result<Vec<u8>> {
    let mut seed = Vec::with_capacity(36);
    seed.extend_from_slice(md5_digest);
    seed.extend_from_slice(sha1_digest);
    prf_tls1(master_secret, label, &seed, VERIFY_DATA_LEN)
}
