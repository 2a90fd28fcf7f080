//! In-memory loopback: a client and a server pump bytes directly into each
//! other, with freshly minted certificates and mutual authentication.

use palisade_core::pki::RsaPrivateKey;
use palisade_core::rng::Fortuna;
use palisade_tls::connection::{Connection, ConnectionConfig, Role, SignerConfig};
use palisade_tls::session::SessionCache;
use palisade_tls::x509::{create_certificate, CaStore, Certificate, CertificateParams};
use std::cell::RefCell;
use std::rc::Rc;

const YEAR_MS: i64 = 365 * 24 * 3600 * 1000;

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

struct Identity {
    key: RsaPrivateKey,
    cert: Certificate,
}

fn mint_identity(cn: &str, rng_seed: &[u8]) -> Identity {
    let mut rng = Fortuna::from_seed(rng_seed);
    let key = RsaPrivateKey::generate(&mut rng, 1024).unwrap();
    let params = CertificateParams::self_signed(cn, now_ms() - YEAR_MS, now_ms() + YEAR_MS);
    let cert = create_certificate(&params, key.public_key(), &key).unwrap();
    Identity { key, cert }
}

fn client_config(server: &Identity, client: Option<&Identity>) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(Role::Client);
    config.server_name = Some("server".to_string());
    let mut store = CaStore::new();
    store.add(server.cert.clone());
    config.ca_store = store;
    if let Some(identity) = client {
        config.certificate_chain = vec![identity.cert.clone()];
        config.private_key = Some(identity.key.clone());
        config.signer = SignerConfig::PrivateKey;
    }
    config
}

fn server_config(server: &Identity, client: Option<&Identity>) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(Role::Server);
    config.certificate_chain = vec![server.cert.clone()];
    config.private_key = Some(server.key.clone());
    if let Some(identity) = client {
        config.verify_client = true;
        let mut store = CaStore::new();
        store.add(identity.cert.clone());
        config.ca_store = store;
    }
    config
}

/// Shuttle queued bytes between the two peers until both go quiet.
fn pump(client: &mut Connection, server: &mut Connection) {
    for _ in 0..64 {
        let c2s = client.take_tls_data();
        let s2c = server.take_tls_data();
        if c2s.is_empty() && s2c.is_empty() {
            return;
        }
        if !c2s.is_empty() {
            server.process(&c2s).expect("server process");
        }
        if !s2c.is_empty() {
            client.process(&s2c).expect("client process");
        }
    }
    panic!("loopback did not settle");
}

#[test]
fn full_handshake_with_mutual_auth() {
    let server_id = mint_identity("server", b"loopback server identity");
    let client_id = mint_identity("client", b"loopback client identity");

    let mut client = Connection::new(client_config(&server_id, Some(&client_id))).unwrap();
    let mut server = Connection::new(server_config(&server_id, Some(&client_id))).unwrap();

    client.handshake().unwrap();
    pump(&mut client, &mut server);

    assert!(client.is_open(), "client handshake incomplete: {:?}", client.last_error());
    assert!(server.is_open(), "server handshake incomplete: {:?}", server.last_error());
    assert_eq!(client.negotiated_version(), (3, 2));
    assert_eq!(server.negotiated_version(), (3, 2));

    // Both peers observed the expected common names and verified chains.
    assert_eq!(
        client.peer_certificate().and_then(|c| c.subject_common_name()),
        Some("server")
    );
    assert_eq!(
        server.peer_certificate().and_then(|c| c.subject_common_name()),
        Some("client")
    );
    assert!(client.peer_verified());
    assert!(server.peer_verified());

    // The server saw the SNI hint.
    assert_eq!(server.received_server_name(), Some("server"));

    // Application data both ways.
    client.prepare(b"Hello Server").unwrap();
    pump(&mut client, &mut server);
    assert_eq!(server.take_app_data(), b"Hello Server");

    server.prepare(b"Hello Client").unwrap();
    pump(&mut client, &mut server);
    assert_eq!(client.take_app_data(), b"Hello Client");

    // Clean shutdown in both directions.
    client.close();
    pump(&mut client, &mut server);
    assert!(client.is_closed());
    assert!(server.is_closed());
    assert!(client.last_error().is_none());
    assert!(server.last_error().is_none());
}

#[test]
fn handshake_without_client_auth() {
    let server_id = mint_identity("server", b"plain server identity");

    let mut client = Connection::new(client_config(&server_id, None)).unwrap();
    let mut server = Connection::new(server_config(&server_id, None)).unwrap();

    client.handshake().unwrap();
    pump(&mut client, &mut server);

    assert!(client.is_open());
    assert!(server.is_open());
    assert!(client.peer_verified());
    // Server never asked for a certificate.
    assert!(server.peer_certificate().is_none());

    client.prepare(b"ping").unwrap();
    pump(&mut client, &mut server);
    assert_eq!(server.take_app_data(), b"ping");
}

#[test]
fn untrusted_server_is_rejected() {
    let server_id = mint_identity("server", b"real server");
    let rogue_id = mint_identity("server", b"rogue server");

    // Client trusts the real certificate but talks to the rogue.
    let mut client = Connection::new(client_config(&server_id, None)).unwrap();
    let mut server = Connection::new(server_config(&rogue_id, None)).unwrap();

    client.handshake().unwrap();

    // Pump manually; the client is expected to error out.
    let mut failed = false;
    for _ in 0..16 {
        let c2s = client.take_tls_data();
        let s2c = server.take_tls_data();
        if c2s.is_empty() && s2c.is_empty() {
            break;
        }
        if !c2s.is_empty() {
            let _ = server.process(&c2s);
        }
        if !s2c.is_empty() && client.process(&s2c).is_err() {
            failed = true;
            break;
        }
    }
    assert!(failed, "client accepted an untrusted certificate");
    assert!(!client.is_open());
    assert!(client.last_error().map(|e| e.fatal).unwrap_or(false));
}

#[test]
fn session_resumption_abbreviates_the_handshake() {
    let server_id = mint_identity("server", b"resumable server");

    let server_cache = Rc::new(RefCell::new(SessionCache::new(8)));
    let client_cache = Rc::new(RefCell::new(SessionCache::new(8)));

    // First, a full handshake to seed both caches.
    let mut config = client_config(&server_id, None);
    config.session_cache = Some(client_cache.clone());
    let mut client = Connection::new(config).unwrap();

    let mut config = server_config(&server_id, None);
    config.session_cache = Some(server_cache.clone());
    let mut server = Connection::new(config).unwrap();

    client.handshake().unwrap();
    pump(&mut client, &mut server);
    assert!(client.is_open() && server.is_open());
    let session_id = client.session_id().to_vec();
    assert!(!session_id.is_empty());
    assert_eq!(server_cache.borrow().len(), 1);

    // Second connection offers the cached session id.
    let mut config = client_config(&server_id, None);
    config.session_cache = Some(client_cache.clone());
    config.session_id = Some(session_id.clone());
    let mut client2 = Connection::new(config).unwrap();

    let mut config = server_config(&server_id, None);
    config.session_cache = Some(server_cache.clone());
    let mut server2 = Connection::new(config).unwrap();

    client2.handshake().unwrap();
    pump(&mut client2, &mut server2);

    assert!(client2.is_open(), "resumed client failed: {:?}", client2.last_error());
    assert!(server2.is_open(), "resumed server failed: {:?}", server2.last_error());
    // The abbreviated handshake sends no certificate.
    assert!(client2.peer_certificate().is_none());
    assert_eq!(client2.session_id(), session_id.as_slice());

    client2.prepare(b"resumed hello").unwrap();
    pump(&mut client2, &mut server2);
    assert_eq!(server2.take_app_data(), b"resumed hello");
}

#[test]
fn hello_request_triggers_no_renegotiation_warning() {
    let server_id = mint_identity("server", b"renegotiation server");

    let mut client = Connection::new(client_config(&server_id, None)).unwrap();
    let mut server = Connection::new(server_config(&server_id, None)).unwrap();

    client.handshake().unwrap();
    pump(&mut client, &mut server);
    assert!(client.is_open() && server.is_open());

    // A HelloRequest arrives from the server mid-connection.
    server.request_renegotiation().unwrap();
    pump(&mut client, &mut server);

    // The client ignored it and stayed open.
    assert!(client.is_open());
    assert!(client.last_error().is_none());
    assert!(server.is_open());
}

#[test]
fn external_signer_defers_certificate_verify() {
    let server_id = mint_identity("server", b"ext-sign server");
    let client_id = mint_identity("client", b"ext-sign client");

    let mut config = client_config(&server_id, Some(&client_id));
    config.signer = SignerConfig::External;
    config.private_key = None; // the key lives "outside" the connection
    let mut client = Connection::new(config).unwrap();
    let mut server = Connection::new(server_config(&server_id, Some(&client_id))).unwrap();

    client.handshake().unwrap();

    // Pump until the client parks waiting for a signature.
    let mut parked_content: Option<Vec<u8>> = None;
    for _ in 0..16 {
        let c2s = client.take_tls_data();
        if !c2s.is_empty() {
            server.process(&c2s).unwrap();
        }
        let s2c = server.take_tls_data();
        if !s2c.is_empty() {
            client.process(&s2c).unwrap();
        }
        if let Some(content) = client.pending_signature_content() {
            parked_content = Some(content.to_vec());
            break;
        }
    }
    let content = parked_content.expect("client never requested a signature");
    assert_eq!(content.len(), 36); // MD5 || SHA-1

    // Deferred completion: sign outside the connection, then resume.
    let signature = client_id.key.sign_raw_pkcs1v15(&content).unwrap();
    client.provide_signature(signature).unwrap();
    pump(&mut client, &mut server);

    assert!(client.is_open(), "client: {:?}", client.last_error());
    assert!(server.is_open(), "server: {:?}", server.last_error());
    assert!(server.peer_verified());
}

#[test]
fn compression_hooks_round_trip() {
    let server_id = mint_identity("server", b"deflate server");

    // Any reversible pair works for the plumbing; a real embedder supplies
    // DEFLATE here.
    fn shrink(data: &[u8]) -> Vec<u8> {
        let mut out = vec![0xc5];
        out.extend(data.iter().map(|b| b ^ 0x5a));
        out
    }
    fn grow(data: &[u8]) -> Option<Vec<u8>> {
        let (&tag, rest) = data.split_first()?;
        (tag == 0xc5).then(|| rest.iter().map(|b| b ^ 0x5a).collect())
    }

    let mut config = client_config(&server_id, None);
    config.deflate = Some(Box::new(shrink));
    config.inflate = Some(Box::new(grow));
    let mut client = Connection::new(config).unwrap();

    let mut config = server_config(&server_id, None);
    config.deflate = Some(Box::new(shrink));
    config.inflate = Some(Box::new(grow));
    let mut server = Connection::new(config).unwrap();

    client.handshake().unwrap();
    pump(&mut client, &mut server);
    assert!(client.is_open(), "client: {:?}", client.last_error());
    assert!(server.is_open(), "server: {:?}", server.last_error());

    client.prepare(b"compressed payload").unwrap();
    pump(&mut client, &mut server);
    assert_eq!(server.take_app_data(), b"compressed payload");
}

#[test]
fn large_application_payload_fragments_and_reassembles() {
    let server_id = mint_identity("server", b"fragmentation server");

    let mut client = Connection::new(client_config(&server_id, None)).unwrap();
    let mut server = Connection::new(server_config(&server_id, None)).unwrap();

    client.handshake().unwrap();
    pump(&mut client, &mut server);
    assert!(client.is_open() && server.is_open());

    let big: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    client.prepare(&big).unwrap();
    pump(&mut client, &mut server);
    assert_eq!(server.take_app_data(), big);
}
