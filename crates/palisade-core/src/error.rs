use thiserror::Error;

/// Closed error set shared by the codec, cipher and PKI layers.
///
/// Parse errors carry enough structure for a caller to report byte counts
/// without re-deriving them; nothing here allocates on the happy path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("too few bytes: {available} available, {remaining} unread, {requested} requested")]
    TooFewBytes {
        available: usize,
        remaining: usize,
        requested: usize,
    },

    #[error("unparsed DER bytes remain: {byte_count} of {remaining} unread")]
    TrailingGarbage { byte_count: usize, remaining: usize },

    #[error("negative or overlong length")]
    NegativeLength,

    #[error("unsupported tag")]
    UnsupportedTag,

    #[error("malformed integer of {byte_count} bytes")]
    MalformedInteger { byte_count: usize },

    #[error("integer exceeds the 32-bit codec window")]
    IntegerTooLarge,

    #[error("invalid BIT STRING")]
    InvalidBitString,

    #[error("bad padding")]
    BadPadding,

    #[error("MAC verification failed")]
    BadMac,

    #[error("tag mismatch")]
    TagMismatch,

    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage { expected: u8, got: u8 },

    #[error("unsupported protocol version")]
    ProtocolVersion,

    #[error("handshake failure")]
    HandshakeFailure,

    #[error("bad certificate")]
    BadCertificate,

    #[error("unknown certificate authority")]
    UnknownCa,

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("message too long for the key/modulus")]
    MessageTooLong,

    #[error("internal error: {cause}")]
    InternalError { cause: String },
}

impl Error {
    /// Shorthand for [`Error::InternalError`].
    pub fn internal(cause: impl Into<String>) -> Self {
        Error::InternalError { cause: cause.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
