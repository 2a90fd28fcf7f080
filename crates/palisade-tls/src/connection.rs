//! The TLS connection: a pair of cooperative state machines (one per role)
//! over the record layer.
//!
//! No transport is assumed. Inbound bytes are pushed with
//! [`Connection::process`]; outbound bytes accumulate until drained with
//! [`Connection::take_tls_data`]. `process` runs the machine as far as the
//! buffered bytes allow and returns how many more are needed for the next
//! step. The only asynchronous hook is external signing: with
//! [`SignerConfig::External`] the handshake parks until
//! [`Connection::provide_signature`] is called, which may happen inside the
//! `signature_needed` event or any time later.

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::handshake::{
    compute_master_secret, derive_key_material, finished_verify_data, ClientHello,
    HandshakeMessage, HandshakeType, ServerHello,
};
use crate::record::{fragments, parse_record, ContentType, RecordProtection};
use crate::session::{SessionCache, StoredSession};
use crate::suites::{self, CipherSuite};
use crate::x509::{self, CaStore, Certificate};
use palisade_core::buffer::ByteBuffer;
use palisade_core::hash::{MessageDigest, Md5, Sha1};
use palisade_core::pki::rsa::{recover_raw_pkcs1v15, RsaPrivateKey};
use palisade_core::rng::Fortuna;
use palisade_core::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;
use zeroize::Zeroize;

const ADVERTISED_VERSION: (u8, u8) = (3, 2); // TLS 1.1
const MIN_VERSION: (u8, u8) = (3, 1); // TLS 1.0
const COMPRESSION_NULL: u8 = 0;
const COMPRESSION_DEFLATE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// Error surfaced through [`ConnectionEvents::error`].
#[derive(Debug, Clone)]
pub struct TlsError {
    pub message: String,
    pub alert: Option<Alert>,
    /// Whether an outbound alert was queued for the peer.
    pub send: bool,
    pub fatal: bool,
    pub origin: Origin,
}

/// Who produces CertificateVerify signatures.
pub enum SignerConfig {
    /// Sign with `ConnectionConfig::private_key`.
    PrivateKey,
    /// Park the handshake and emit `signature_needed`; the embedder calls
    /// `provide_signature`, immediately or later.
    External,
}

type CompressFn = Box<dyn Fn(&[u8]) -> Vec<u8>>;
type DecompressFn = Box<dyn Fn(&[u8]) -> Option<Vec<u8>>>;
type VerifyFn = Box<dyn FnMut(&[Certificate], &CaStore) -> std::result::Result<(), AlertDescription>>;

pub struct ConnectionConfig {
    pub role: Role,
    /// SNI host name sent by clients.
    pub server_name: Option<String>,
    /// Server: request and require a client certificate.
    pub verify_client: bool,
    pub cipher_suites: Vec<CipherSuite>,
    pub ca_store: CaStore,
    /// Own certificate chain, leaf first.
    pub certificate_chain: Vec<Certificate>,
    pub private_key: Option<RsaPrivateKey>,
    pub signer: SignerConfig,
    /// Client: session id to offer for an abbreviated handshake.
    pub session_id: Option<Vec<u8>>,
    /// Shared across connections that may resume each other's sessions.
    pub session_cache: Option<Rc<RefCell<SessionCache>>>,
    /// Replaces the built-in chain verification when set.
    pub verify: Option<VerifyFn>,
    /// DEFLATE hooks; compression is only offered when both are present.
    pub deflate: Option<CompressFn>,
    pub inflate: Option<DecompressFn>,
}

impl ConnectionConfig {
    pub fn new(role: Role) -> Self {
        ConnectionConfig {
            role,
            server_name: None,
            verify_client: false,
            cipher_suites: suites::DEFAULT_SUITES.to_vec(),
            ca_store: CaStore::new(),
            certificate_chain: Vec::new(),
            private_key: None,
            signer: SignerConfig::PrivateKey,
            session_id: None,
            session_cache: None,
            verify: None,
            deflate: None,
            inflate: None,
        }
    }
}

/// Embedder callbacks. All default to no-ops; state is equally observable
/// through the pull accessors.
pub trait ConnectionEvents {
    fn connected(&mut self) {}
    fn tls_data_ready(&mut self) {}
    fn data_ready(&mut self) {}
    fn closed(&mut self) {}
    fn error(&mut self, _error: &TlsError) {}
    fn signature_needed(&mut self, _content: &[u8]) {}
}

/// The default, inert handler.
pub struct NullEvents;

impl ConnectionEvents for NullEvents {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpectState {
    // Client.
    ServerHello,
    ServerCertificate,
    ServerKeyExchange,
    ServerCertificateRequest,
    ServerHelloDone,
    ServerChangeCipherSpec,
    ServerFinished,
    // Server.
    ClientHello,
    ClientCertificate,
    ClientKeyExchange,
    ClientCertificateVerify,
    ClientChangeCipherSpec,
    ClientFinished,
    // Both.
    AwaitingSignature,
    AppData,
    Errored,
}

pub struct Connection {
    config: ConnectionConfig,
    events: Box<dyn ConnectionEvents>,
    rng: Fortuna,

    state: ExpectState,
    version: (u8, u8),
    client_hello_version: (u8, u8),
    open: bool,
    closed: bool,
    close_notify_sent: bool,

    session_id: Vec<u8>,
    client_random: [u8; 32],
    server_random: [u8; 32],
    suite: Option<CipherSuite>,
    compression: u8,
    master_secret: Vec<u8>,
    resuming: bool,

    read: RecordProtection,
    write: RecordProtection,
    pending_read: Option<RecordProtection>,
    pending_write: Option<RecordProtection>,
    read_compressed: bool,
    write_compressed: bool,

    input: ByteBuffer,
    handshake_buf: ByteBuffer,
    tls_data: ByteBuffer,
    app_data: ByteBuffer,
    needed: usize,

    transcript_md5: Md5,
    transcript_sha1: Sha1,

    peer_chain: Vec<Certificate>,
    peer_verified: bool,
    client_cert_requested: bool,
    received_server_name: Option<String>,
    pending_signature_content: Option<Vec<u8>>,

    last_error: Option<TlsError>,
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_events(config, Box::new(NullEvents))
    }

    pub fn with_events(config: ConnectionConfig, events: Box<dyn ConnectionEvents>) -> Result<Self> {
        let state = match config.role {
            Role::Client => ExpectState::ServerHello,
            Role::Server => ExpectState::ClientHello,
        };
        Ok(Connection {
            config,
            events,
            rng: Fortuna::new()?,
            state,
            version: ADVERTISED_VERSION,
            client_hello_version: ADVERTISED_VERSION,
            open: false,
            closed: false,
            close_notify_sent: false,
            session_id: Vec::new(),
            client_random: [0; 32],
            server_random: [0; 32],
            suite: None,
            compression: COMPRESSION_NULL,
            master_secret: Vec::new(),
            resuming: false,
            read: RecordProtection::null(),
            write: RecordProtection::null(),
            pending_read: None,
            pending_write: None,
            read_compressed: false,
            write_compressed: false,
            input: ByteBuffer::new(),
            handshake_buf: ByteBuffer::new(),
            tls_data: ByteBuffer::new(),
            app_data: ByteBuffer::new(),
            needed: 0,
            transcript_md5: Md5::new(),
            transcript_sha1: Sha1::new(),
            peer_chain: Vec::new(),
            peer_verified: false,
            client_cert_requested: false,
            received_server_name: None,
            pending_signature_content: None,
            last_error: None,
        })
    }

    // -- accessors -------------------------------------------------------

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn negotiated_version(&self) -> (u8, u8) {
        self.version
    }

    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    pub fn peer_certificate(&self) -> Option<&Certificate> {
        self.peer_chain.first()
    }

    pub fn peer_verified(&self) -> bool {
        self.peer_verified
    }

    /// SNI host name observed by a server.
    pub fn received_server_name(&self) -> Option<&str> {
        self.received_server_name.as_deref()
    }

    pub fn last_error(&self) -> Option<&TlsError> {
        self.last_error.as_ref()
    }

    /// Content awaiting an external signature, when the handshake is parked
    /// on [`SignerConfig::External`].
    pub fn pending_signature_content(&self) -> Option<&[u8]> {
        self.pending_signature_content.as_deref()
    }

    /// Drain queued outbound wire bytes.
    pub fn take_tls_data(&mut self) -> Vec<u8> {
        self.tls_data.drain()
    }

    /// Drain received application plaintext.
    pub fn take_app_data(&mut self) -> Vec<u8> {
        self.app_data.drain()
    }

    // -- driving ---------------------------------------------------------

    /// Client entry point: queue the ClientHello.
    pub fn handshake(&mut self) -> Result<()> {
        if self.config.role != Role::Client {
            return Ok(());
        }
        if self.state != ExpectState::ServerHello || self.write.seq != 0 {
            return Err(Error::internal("handshake already started"));
        }

        self.client_hello_version = ADVERTISED_VERSION;
        self.client_random = self.fresh_random();
        let offered_session = self.config.session_id.clone().unwrap_or_default();

        let mut compression_methods = Vec::new();
        if self.config.deflate.is_some() && self.config.inflate.is_some() {
            compression_methods.push(COMPRESSION_DEFLATE);
        }
        compression_methods.push(COMPRESSION_NULL);

        let hello = HandshakeMessage::ClientHello(ClientHello {
            version: self.client_hello_version,
            random: self.client_random,
            session_id: offered_session.clone(),
            cipher_suites: self.config.cipher_suites.iter().map(|s| s.id).collect(),
            compression_methods,
            server_name: self.config.server_name.clone(),
        });
        self.session_id = offered_session;
        self.version = MIN_VERSION; // record-layer version until negotiated
        self.send_handshake(&hello)
    }

    /// Push inbound wire bytes; returns how many more bytes the next step
    /// needs (0 when nothing is pending).
    pub fn process(&mut self, data: &[u8]) -> Result<usize> {
        if self.state == ExpectState::Errored {
            return Err(Error::internal("connection is in the error state"));
        }
        self.input.put_bytes(data);

        while self.state != ExpectState::Errored && !self.closed {
            // External signing parks the machine; buffered bytes keep.
            if self.state == ExpectState::AwaitingSignature {
                break;
            }
            match parse_record(&mut self.input, &mut self.needed) {
                Ok(Some(record)) => self.handle_record(record),
                Ok(None) => break,
                Err(desc) => {
                    self.fatal(desc, "malformed record");
                    break;
                }
            }
        }
        self.input.compact();

        if let Some(err) = &self.last_error {
            if err.fatal {
                return Err(Error::internal(err.message.clone()));
            }
        }
        Ok(self.needed)
    }

    /// Queue application data for the peer.
    pub fn prepare(&mut self, data: &[u8]) -> Result<()> {
        if !self.open || self.closed {
            return Err(Error::internal("connection is not open"));
        }
        self.send_record(ContentType::ApplicationData, data)
    }

    /// Graceful shutdown: queue close_notify and mark closed.
    pub fn close(&mut self) {
        if !self.close_notify_sent && !self.closed {
            let _ = self.send_alert(Alert::warning(AlertDescription::CloseNotify));
            self.close_notify_sent = true;
        }
        if !self.closed {
            self.closed = true;
            self.events.closed();
        }
    }

    /// Server-side HelloRequest. Clients here never renegotiate — the peer
    /// answers with a `no_renegotiation` warning — but the invitation
    /// itself is part of the protocol.
    pub fn request_renegotiation(&mut self) -> Result<()> {
        if self.config.role != Role::Server || !self.open || self.closed {
            return Err(Error::internal("renegotiation can only be requested on an open server connection"));
        }
        // HelloRequest stays out of the transcript.
        let wire = HandshakeMessage::HelloRequest.encode();
        self.send_record(ContentType::Handshake, &wire)
    }

    /// Complete a parked external signing operation.
    pub fn provide_signature(&mut self, signature: Vec<u8>) -> Result<()> {
        if self.state != ExpectState::AwaitingSignature {
            return Err(Error::internal("no signature was requested"));
        }
        self.pending_signature_content = None;
        self.send_handshake(&HandshakeMessage::CertificateVerify(signature))?;
        self.finish_client_flight()?;
        // Drain any records that arrived while parked.
        self.state = ExpectState::ServerChangeCipherSpec;
        self.process(&[])?;
        Ok(())
    }

    // -- internals: output ----------------------------------------------

    fn fresh_random(&mut self) -> [u8; 32] {
        // Leading 32-bit unix time, 28 random bytes.
        let mut random = [0u8; 32];
        random[..4].copy_from_slice(&((now_ms() / 1000) as u32).to_be_bytes());
        let tail = self.rng.get_bytes(28);
        random[4..].copy_from_slice(&tail);
        random
    }

    fn transcript_update(&mut self, bytes: &[u8]) {
        self.transcript_md5.update(bytes);
        self.transcript_sha1.update(bytes);
    }

    fn transcript_digests(&self) -> (Vec<u8>, Vec<u8>) {
        (self.transcript_md5.digest(), self.transcript_sha1.digest())
    }

    fn send_handshake(&mut self, msg: &HandshakeMessage) -> Result<()> {
        let wire = msg.encode();
        self.transcript_update(&wire);
        self.send_record(ContentType::Handshake, &wire)
    }

    fn send_record(&mut self, content_type: ContentType, data: &[u8]) -> Result<()> {
        for fragment in fragments(data) {
            let compressed;
            let fragment = if self.write_compressed {
                let deflate = self.config.deflate.as_ref().expect("compression negotiated");
                compressed = deflate(fragment);
                &compressed[..]
            } else {
                fragment
            };
            let record = self
                .write
                .protect(content_type, self.version, fragment, &mut self.rng)
                .map_err(|e| {
                    self.fatal(AlertDescription::InternalError, &format!("record protection: {e}"));
                    Error::internal(format!("record protection: {e}"))
                })?;
            self.tls_data.put_bytes(&record);
        }
        self.events.tls_data_ready();
        Ok(())
    }

    fn send_alert(&mut self, alert: Alert) -> Result<()> {
        let body = [alert.level as u8, alert.description as u8];
        self.send_record(ContentType::Alert, &body)
    }

    fn send_change_cipher_spec(&mut self) -> Result<()> {
        self.send_record(ContentType::ChangeCipherSpec, &[1])?;
        let pending = self
            .pending_write
            .take()
            .ok_or_else(|| Error::internal("no pending write state"))?;
        self.write = pending;
        self.write_compressed = self.compression == COMPRESSION_DEFLATE;
        Ok(())
    }

    fn fatal(&mut self, description: AlertDescription, message: &str) {
        if self.state == ExpectState::Errored {
            return;
        }
        // Enter the error state before queueing the alert so a failure
        // while sending it cannot re-enter this path.
        self.state = ExpectState::Errored;
        let sent = self.send_alert(Alert::fatal(description)).is_ok();
        let error = TlsError {
            message: message.to_string(),
            alert: Some(Alert::fatal(description)),
            send: sent,
            fatal: true,
            origin: Origin::Local,
        };
        self.events.error(&error);
        self.last_error = Some(error);
        self.closed = true;
        self.events.closed();
    }

    fn remote_fatal(&mut self, alert: Alert) {
        if self.state == ExpectState::Errored {
            return;
        }
        let error = TlsError {
            message: format!("received fatal alert: {:?}", alert.description),
            alert: Some(alert),
            send: false,
            fatal: true,
            origin: Origin::Remote,
        };
        self.events.error(&error);
        self.last_error = Some(error);
        self.state = ExpectState::Errored;
        self.closed = true;
        self.events.closed();
    }

    // -- internals: input ------------------------------------------------

    fn handle_record(&mut self, record: crate::record::Record) {
        if record.version.0 != 3 {
            self.fatal(AlertDescription::ProtocolVersion, "record version is not TLS");
            return;
        }
        let fragment = match self.read.unprotect(record.content_type, record.version, &record.fragment) {
            Ok(fragment) => fragment,
            Err(desc) => {
                self.fatal(desc, "record protection failure");
                return;
            }
        };
        let fragment = if self.read_compressed {
            let inflate = self.config.inflate.as_ref().expect("compression negotiated");
            match inflate(&fragment) {
                Some(plain) => plain,
                None => {
                    self.fatal(AlertDescription::DecompressionFailure, "inflate failed");
                    return;
                }
            }
        } else {
            fragment
        };

        if fragment.is_empty() && record.content_type != ContentType::ApplicationData {
            self.fatal(AlertDescription::UnexpectedMessage, "zero-length fragment");
            return;
        }

        match record.content_type {
            ContentType::Handshake => {
                self.handshake_buf.put_bytes(&fragment);
                self.drain_handshake_messages();
            }
            ContentType::ChangeCipherSpec => self.handle_change_cipher_spec(&fragment),
            ContentType::Alert => self.handle_alert(&fragment),
            ContentType::ApplicationData => {
                if !self.open {
                    self.fatal(AlertDescription::UnexpectedMessage, "application data before handshake completion");
                    return;
                }
                self.app_data.put_bytes(&fragment);
                self.events.data_ready();
            }
        }
    }

    fn drain_handshake_messages(&mut self) {
        loop {
            if self.handshake_buf.remaining() < 4 {
                return;
            }
            let typ = self.handshake_buf.peek(0).expect("checked");
            let len = ((self.handshake_buf.peek(1).expect("checked") as usize) << 16)
                | ((self.handshake_buf.peek(2).expect("checked") as usize) << 8)
                | self.handshake_buf.peek(3).expect("checked") as usize;
            if self.handshake_buf.remaining() < 4 + len {
                return;
            }
            let wire = self.handshake_buf.get_bytes(4 + len).expect("checked");
            self.handshake_buf.compact();

            let Some(typ) = HandshakeType::from_u8(typ) else {
                self.fatal(AlertDescription::UnexpectedMessage, "unknown handshake type");
                return;
            };
            let msg = match HandshakeMessage::decode(typ, &wire[4..]) {
                Ok(msg) => msg,
                Err(_) => {
                    self.fatal(AlertDescription::DecodeError, "malformed handshake message");
                    return;
                }
            };
            self.handle_handshake_message(msg, &wire);
            if self.state == ExpectState::Errored || self.state == ExpectState::AwaitingSignature {
                return;
            }
        }
    }

    fn handle_alert(&mut self, fragment: &[u8]) {
        if fragment.len() != 2 {
            self.fatal(AlertDescription::DecodeError, "malformed alert");
            return;
        }
        let (Some(level), Some(description)) = (
            AlertLevel::from_u8(fragment[0]),
            AlertDescription::from_u8(fragment[1]),
        ) else {
            self.fatal(AlertDescription::DecodeError, "unknown alert code");
            return;
        };
        let alert = Alert { level, description };

        if description == AlertDescription::CloseNotify {
            // Normal shutdown; answer in kind and close.
            self.close();
            return;
        }
        if alert.is_fatal() {
            self.remote_fatal(alert);
        }
        // Warnings other than close_notify are noted and ignored.
    }

    fn handle_change_cipher_spec(&mut self, fragment: &[u8]) {
        if fragment != [1] {
            self.fatal(AlertDescription::UnexpectedMessage, "malformed ChangeCipherSpec");
            return;
        }
        let expected = match self.config.role {
            Role::Client => ExpectState::ServerChangeCipherSpec,
            Role::Server => ExpectState::ClientChangeCipherSpec,
        };
        if self.state != expected {
            self.fatal(AlertDescription::UnexpectedMessage, "ChangeCipherSpec out of order");
            return;
        }
        let Some(pending) = self.pending_read.take() else {
            self.fatal(AlertDescription::UnexpectedMessage, "ChangeCipherSpec before key material");
            return;
        };
        self.read = pending;
        self.read_compressed = self.compression == COMPRESSION_DEFLATE;
        self.state = match self.config.role {
            Role::Client => ExpectState::ServerFinished,
            Role::Server => ExpectState::ClientFinished,
        };
    }

    fn handle_handshake_message(&mut self, msg: HandshakeMessage, wire: &[u8]) {
        // HelloRequest never enters the transcript; everything else does,
        // except that Finished verification needs the transcript *without*
        // the message being verified, so those two update later.
        let typ = msg.handshake_type();
        let defer_transcript =
            matches!(typ, HandshakeType::Finished | HandshakeType::CertificateVerify | HandshakeType::HelloRequest);
        if !defer_transcript {
            self.transcript_update(wire);
        }

        let outcome = match (self.config.role, self.state, msg) {
            // -- client ---------------------------------------------------
            (Role::Client, ExpectState::ServerHello, HandshakeMessage::ServerHello(hello)) => {
                self.on_server_hello(hello)
            }
            (Role::Client, ExpectState::ServerCertificate, HandshakeMessage::Certificate(chain)) => {
                self.on_server_certificate(chain)
            }
            (
                Role::Client,
                ExpectState::ServerCertificate
                | ExpectState::ServerKeyExchange,
                HandshakeMessage::ServerKeyExchange,
            ) => {
                self.state = ExpectState::ServerCertificateRequest;
                Ok(())
            }
            (
                Role::Client,
                ExpectState::ServerCertificate
                | ExpectState::ServerKeyExchange
                | ExpectState::ServerCertificateRequest,
                HandshakeMessage::CertificateRequest { .. },
            ) => {
                self.client_cert_requested = true;
                self.state = ExpectState::ServerHelloDone;
                Ok(())
            }
            (
                Role::Client,
                ExpectState::ServerCertificate
                | ExpectState::ServerKeyExchange
                | ExpectState::ServerCertificateRequest
                | ExpectState::ServerHelloDone,
                HandshakeMessage::ServerHelloDone,
            ) => self.on_server_hello_done(),
            (Role::Client, ExpectState::ServerFinished, HandshakeMessage::Finished(verify)) => {
                self.on_finished_received(verify, wire)
            }
            (Role::Client, ExpectState::AppData, HandshakeMessage::HelloRequest) => {
                // Renegotiation is refused, not performed.
                let _ = self.send_alert(Alert::warning(AlertDescription::NoRenegotiation));
                Ok(())
            }

            // -- server ---------------------------------------------------
            (Role::Server, ExpectState::ClientHello, HandshakeMessage::ClientHello(hello)) => {
                self.on_client_hello(hello)
            }
            (Role::Server, ExpectState::ClientCertificate, HandshakeMessage::Certificate(chain)) => {
                self.on_client_certificate(chain)
            }
            (
                Role::Server,
                ExpectState::ClientCertificate | ExpectState::ClientKeyExchange,
                HandshakeMessage::ClientKeyExchange(encrypted),
            ) => self.on_client_key_exchange(encrypted),
            (
                Role::Server,
                ExpectState::ClientCertificateVerify,
                HandshakeMessage::CertificateVerify(signature),
            ) => self.on_certificate_verify(signature, wire),
            (Role::Server, ExpectState::ClientFinished, HandshakeMessage::Finished(verify)) => {
                self.on_finished_received(verify, wire)
            }

            // A stray HelloRequest anywhere else is ignored (RFC 2246 §7.4.1.1).
            (_, _, HandshakeMessage::HelloRequest) => Ok(()),

            (_, _, msg) => {
                self.fatal(
                    AlertDescription::UnexpectedMessage,
                    &format!("unexpected {:?} in state {:?}", msg.handshake_type(), self.state),
                );
                return;
            }
        };

        if let Err(e) = outcome {
            if self.state != ExpectState::Errored {
                self.fatal(AlertDescription::InternalError, &format!("handshake failure: {e}"));
            }
        }
    }

    // -- client handshake steps -----------------------------------------

    fn on_server_hello(&mut self, hello: ServerHello) -> Result<()> {
        if hello.version.0 != 3 || hello.version.1 < MIN_VERSION.1 || hello.version.1 > ADVERTISED_VERSION.1 {
            self.fatal(AlertDescription::ProtocolVersion, "server chose an unsupported version");
            return Ok(());
        }
        self.version = hello.version;
        self.server_random = hello.random;

        let Some(suite) = self
            .config
            .cipher_suites
            .iter()
            .copied()
            .find(|s| s.id == hello.cipher_suite)
        else {
            self.fatal(AlertDescription::IllegalParameter, "server chose a suite we did not offer");
            return Ok(());
        };
        self.suite = Some(suite);

        if hello.compression_method == COMPRESSION_DEFLATE {
            if self.config.deflate.is_none() || self.config.inflate.is_none() {
                self.fatal(AlertDescription::IllegalParameter, "server chose unoffered compression");
                return Ok(());
            }
            self.compression = COMPRESSION_DEFLATE;
        } else if hello.compression_method != COMPRESSION_NULL {
            self.fatal(AlertDescription::IllegalParameter, "unknown compression method");
            return Ok(());
        }

        let offered = !self.session_id.is_empty() && self.session_id == hello.session_id;
        if offered {
            // Abbreviated handshake: master secret comes from the cache.
            let cached = self
                .config
                .session_cache
                .as_ref()
                .and_then(|cache| cache.borrow_mut().get_session(&hello.session_id));
            let Some(stored) = cached else {
                self.fatal(AlertDescription::HandshakeFailure, "server resumed an unknown session");
                return Ok(());
            };
            self.resuming = true;
            self.master_secret = stored.master_secret;
            self.peer_verified = stored.peer_common_name.is_some();
            self.install_key_material()?;
            self.state = ExpectState::ServerChangeCipherSpec;
        } else {
            self.session_id = hello.session_id;
            self.resuming = false;
            self.state = ExpectState::ServerCertificate;
        }
        Ok(())
    }

    fn on_server_certificate(&mut self, chain: Vec<Vec<u8>>) -> Result<()> {
        self.receive_peer_chain(chain)?;
        if self.state != ExpectState::Errored {
            self.state = ExpectState::ServerKeyExchange;
        }
        Ok(())
    }

    fn receive_peer_chain(&mut self, chain: Vec<Vec<u8>>) -> Result<()> {
        let mut parsed = Vec::with_capacity(chain.len());
        for der in &chain {
            match x509::parse_certificate(der) {
                Ok(cert) => parsed.push(cert),
                Err(_) => {
                    self.fatal(AlertDescription::BadCertificate, "unparseable peer certificate");
                    return Ok(());
                }
            }
        }
        if parsed.is_empty() {
            self.fatal(AlertDescription::HandshakeFailure, "peer sent no certificate");
            return Ok(());
        }

        let verdict = match &mut self.config.verify {
            Some(custom) => custom(&parsed, &self.config.ca_store),
            None => x509::verify_chain(&self.config.ca_store, &parsed, now_ms()),
        };
        match verdict {
            Ok(()) => {
                self.peer_verified = true;
                self.peer_chain = parsed;
                Ok(())
            }
            Err(desc) => {
                self.fatal(desc, "peer certificate verification failed");
                Ok(())
            }
        }
    }

    fn on_server_hello_done(&mut self) -> Result<()> {
        if self.peer_chain.is_empty() {
            self.fatal(AlertDescription::HandshakeFailure, "server offered no certificate for RSA key exchange");
            return Ok(());
        }

        // Optional client Certificate.
        if self.client_cert_requested {
            let chain: Vec<Vec<u8>> =
                self.config.certificate_chain.iter().map(|c| c.raw.clone()).collect();
            self.send_handshake(&HandshakeMessage::Certificate(chain))?;
        }

        // ClientKeyExchange: 48-byte premaster, leading client hello version.
        let mut pre_master = vec![0u8; 48];
        pre_master[0] = self.client_hello_version.0;
        pre_master[1] = self.client_hello_version.1;
        let tail = self.rng.get_bytes(46);
        pre_master[2..].copy_from_slice(&tail);

        let server_key = self.peer_chain[0].public_key.clone();
        let encrypted = server_key.encrypt_pkcs1v15(&mut self.rng, &pre_master)?;
        self.send_handshake(&HandshakeMessage::ClientKeyExchange(encrypted))?;

        self.master_secret =
            compute_master_secret(&pre_master, &self.client_random, &self.server_random)?;
        pre_master.zeroize();
        self.install_key_material()?;

        // Optional CertificateVerify over the transcript so far.
        if self.client_cert_requested && !self.config.certificate_chain.is_empty() {
            let (md5, sha1) = self.transcript_digests();
            let mut content = md5;
            content.extend_from_slice(&sha1);
            match self.config.signer {
                SignerConfig::PrivateKey => {
                    let key = self
                        .config
                        .private_key
                        .as_ref()
                        .ok_or_else(|| Error::internal("certificate configured without a private key"))?;
                    let signature = key.sign_raw_pkcs1v15(&content)?;
                    self.send_handshake(&HandshakeMessage::CertificateVerify(signature))?;
                }
                SignerConfig::External => {
                    self.pending_signature_content = Some(content.clone());
                    self.state = ExpectState::AwaitingSignature;
                    self.events.signature_needed(&content);
                    return Ok(());
                }
            }
        }

        self.finish_client_flight()?;
        self.state = ExpectState::ServerChangeCipherSpec;
        Ok(())
    }

    /// CCS + Finished, shared by the direct path and external-signer resume.
    fn finish_client_flight(&mut self) -> Result<()> {
        self.send_change_cipher_spec()?;
        let (md5, sha1) = self.transcript_digests();
        let verify = finished_verify_data(&self.master_secret, "client finished", &md5, &sha1)?;
        self.send_handshake(&HandshakeMessage::Finished(verify))
    }

    // -- server handshake steps -----------------------------------------

    fn on_client_hello(&mut self, hello: ClientHello) -> Result<()> {
        if hello.version.0 != 3 || hello.version.1 < MIN_VERSION.1 {
            self.fatal(AlertDescription::ProtocolVersion, "client is below TLS 1.0");
            return Ok(());
        }
        self.client_hello_version = hello.version;
        self.version = (3, hello.version.1.min(ADVERTISED_VERSION.1));
        self.client_random = hello.random;
        self.received_server_name = hello.server_name.clone();

        let Some(suite) = self
            .config
            .cipher_suites
            .iter()
            .copied()
            .find(|ours| hello.cipher_suites.iter().any(|theirs| *theirs == ours.id))
        else {
            self.fatal(AlertDescription::HandshakeFailure, "no cipher suite in common");
            return Ok(());
        };
        self.suite = Some(suite);

        let can_deflate = self.config.deflate.is_some() && self.config.inflate.is_some();
        if can_deflate && hello.compression_methods.contains(&COMPRESSION_DEFLATE) {
            self.compression = COMPRESSION_DEFLATE;
        } else if hello.compression_methods.contains(&COMPRESSION_NULL) {
            self.compression = COMPRESSION_NULL;
        } else {
            self.fatal(AlertDescription::HandshakeFailure, "no compression method in common");
            return Ok(());
        }

        // Resumption lookup; `get_session` is single-use by design.
        let stored = if hello.session_id.is_empty() {
            None
        } else {
            self.config
                .session_cache
                .as_ref()
                .and_then(|cache| cache.borrow_mut().get_session(&hello.session_id))
                .filter(|s| s.cipher_suite.id == suite.id && s.version == self.version)
        };

        if let Some(stored) = stored {
            self.resuming = true;
            self.session_id = hello.session_id;
            self.master_secret = stored.master_secret.clone();
            self.peer_verified = stored.peer_common_name.is_some();
        } else {
            self.resuming = false;
            self.session_id = self.rng.get_bytes(32);
        }

        self.server_random = self.fresh_random();
        let server_hello = HandshakeMessage::ServerHello(ServerHello {
            version: self.version,
            random: self.server_random,
            session_id: self.session_id.clone(),
            cipher_suite: suite.id,
            compression_method: self.compression,
        });
        self.send_handshake(&server_hello)?;

        if self.resuming {
            self.install_key_material()?;
            self.send_change_cipher_spec()?;
            let (md5, sha1) = self.transcript_digests();
            let verify = finished_verify_data(&self.master_secret, "server finished", &md5, &sha1)?;
            self.send_handshake(&HandshakeMessage::Finished(verify))?;
            self.state = ExpectState::ClientChangeCipherSpec;
            return Ok(());
        }

        let chain: Vec<Vec<u8>> =
            self.config.certificate_chain.iter().map(|c| c.raw.clone()).collect();
        if chain.is_empty() {
            self.fatal(AlertDescription::InternalError, "server has no certificate configured");
            return Ok(());
        }
        self.send_handshake(&HandshakeMessage::Certificate(chain))?;

        if self.config.verify_client {
            // rsa_sign only; no CA name hints.
            self.send_handshake(&HandshakeMessage::CertificateRequest {
                certificate_types: vec![1],
                authorities: Vec::new(),
            })?;
        }
        self.send_handshake(&HandshakeMessage::ServerHelloDone)?;

        self.state = if self.config.verify_client {
            ExpectState::ClientCertificate
        } else {
            ExpectState::ClientKeyExchange
        };
        Ok(())
    }

    fn on_client_certificate(&mut self, chain: Vec<Vec<u8>>) -> Result<()> {
        if chain.is_empty() {
            self.fatal(AlertDescription::HandshakeFailure, "client certificate required but not supplied");
            return Ok(());
        }
        self.receive_peer_chain(chain)?;
        if self.state != ExpectState::Errored {
            self.state = ExpectState::ClientKeyExchange;
        }
        Ok(())
    }

    fn on_client_key_exchange(&mut self, encrypted: Vec<u8>) -> Result<()> {
        let key = self
            .config
            .private_key
            .as_ref()
            .ok_or_else(|| Error::internal("server has no private key"))?;

        // Bleichenbacher countermeasure: on any padding or version defect,
        // continue with a random premaster and let Finished fail.
        let mut pre_master = match key.decrypt_pkcs1v15(&encrypted) {
            Ok(pms)
                if pms.len() == 48
                    && pms[0] == self.client_hello_version.0
                    && pms[1] == self.client_hello_version.1 =>
            {
                pms
            }
            _ => self.rng.get_bytes(48),
        };

        self.master_secret =
            compute_master_secret(&pre_master, &self.client_random, &self.server_random)?;
        pre_master.zeroize();
        self.install_key_material()?;

        self.state = if self.peer_chain.is_empty() {
            ExpectState::ClientChangeCipherSpec
        } else {
            ExpectState::ClientCertificateVerify
        };
        Ok(())
    }

    fn on_certificate_verify(&mut self, signature: Vec<u8>, wire: &[u8]) -> Result<()> {
        let (md5, sha1) = self.transcript_digests();
        let mut expected = md5;
        expected.extend_from_slice(&sha1);

        let client_key = &self.peer_chain[0].public_key;
        let recovered = recover_raw_pkcs1v15(client_key, &signature);
        if recovered.as_deref() != Ok(expected.as_slice()) {
            self.fatal(AlertDescription::DecryptError, "CertificateVerify signature check failed");
            return Ok(());
        }

        // The message joins the transcript only after it verified.
        self.transcript_update(wire);
        self.state = ExpectState::ClientChangeCipherSpec;
        Ok(())
    }

    // -- shared handshake steps -----------------------------------------

    fn install_key_material(&mut self) -> Result<()> {
        let suite = self.suite.ok_or_else(|| Error::internal("no cipher suite negotiated"))?;
        let km = derive_key_material(
            &self.master_secret,
            &self.client_random,
            &self.server_random,
            &suite,
        )?;
        let (read, write) = match self.config.role {
            Role::Client => (
                RecordProtection::keyed(suite, km.server_mac_key, km.server_key, km.server_iv),
                RecordProtection::keyed(suite, km.client_mac_key, km.client_key, km.client_iv),
            ),
            Role::Server => (
                RecordProtection::keyed(suite, km.client_mac_key, km.client_key, km.client_iv),
                RecordProtection::keyed(suite, km.server_mac_key, km.server_key, km.server_iv),
            ),
        };
        self.pending_read = Some(read);
        self.pending_write = Some(write);
        Ok(())
    }

    fn on_finished_received(&mut self, verify: Vec<u8>, wire: &[u8]) -> Result<()> {
        let label = match self.config.role {
            Role::Client => "server finished",
            Role::Server => "client finished",
        };
        let (md5, sha1) = self.transcript_digests();
        let expected = finished_verify_data(&self.master_secret, label, &md5, &sha1)?;
        if expected != verify {
            self.fatal(AlertDescription::DecryptError, "Finished verify_data mismatch");
            return Ok(());
        }
        self.transcript_update(wire);

        let must_reply = match (self.config.role, self.resuming) {
            // Normal handshake: the client spoke first, the server answers.
            (Role::Server, false) => true,
            // Abbreviated: the server spoke first, the client answers.
            (Role::Client, true) => true,
            _ => false,
        };
        if must_reply {
            self.send_change_cipher_spec()?;
            let (md5, sha1) = self.transcript_digests();
            let reply_label = match self.config.role {
                Role::Client => "client finished",
                Role::Server => "server finished",
            };
            let reply = finished_verify_data(&self.master_secret, reply_label, &md5, &sha1)?;
            self.send_handshake(&HandshakeMessage::Finished(reply))?;
        }

        self.handshake_complete();
        Ok(())
    }

    fn handshake_complete(&mut self) {
        self.open = true;
        self.state = ExpectState::AppData;

        if let Some(cache) = &self.config.session_cache {
            cache.borrow_mut().set_session(
                self.session_id.clone(),
                StoredSession {
                    version: self.version,
                    master_secret: self.master_secret.clone(),
                    cipher_suite: self.suite.expect("suite negotiated"),
                    peer_common_name: self
                        .peer_chain
                        .first()
                        .and_then(|c| c.subject_common_name())
                        .map(str::to_string),
                },
            );
        }
        self.events.connected();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.master_secret.zeroize();
    }
}
