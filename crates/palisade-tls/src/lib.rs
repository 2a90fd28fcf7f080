//! palisade-tls: a TLS 1.0/1.1 record and handshake engine over
//! `palisade-core`, plus the X.509 machinery it needs.
//!
//! The engine owns no sockets. Bytes in via [`Connection::process`], bytes
//! out via [`Connection::take_tls_data`]; everything in between — record
//! protection, the handshake state machines, session resumption, alerts —
//! runs synchronously in the calling thread.

pub mod alert;
pub mod connection;
pub mod handshake;
pub mod prf;
pub mod record;
pub mod session;
pub mod suites;
pub mod x509;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use connection::{
    Connection, ConnectionConfig, ConnectionEvents, NullEvents, Origin, Role, SignerConfig,
    TlsError,
};
pub use prf::prf_tls1;
pub use session::{SessionCache, StoredSession};
pub use suites::CipherSuite;
pub use x509::{CaStore, Certificate, CertificateParams};

/// Build a connection from a config. Client connections start the
/// handshake with [`Connection::handshake`]; servers just
/// [`Connection::process`] inbound bytes.
pub fn new_connection(config: ConnectionConfig) -> palisade_core::Result<Connection> {
    Connection::new(config)
}
