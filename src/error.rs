use thiserror::Error;

pub use color_eyre::eyre::eyre;

use crate::protocol::response::ErrPayload;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Server Error: {0}")]
    Server(#[from] ErrPayload),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Bad config: {0}")]
    BadConfig(String),

    /// The connection failed before any bytes of the current command were
    /// committed to the wire; a pool may transparently retry elsewhere.
    #[error("bad connection")]
    BadConnection,

    /// The connection is poisoned and must not be reused.
    #[error("invalid connection")]
    InvalidConnection,

    #[error("busy: another command is still in flight on this connection")]
    Busy,

    #[error("malformed packet")]
    MalformedPacket,

    #[error("packet ended unexpectedly")]
    UnexpectedEof,

    #[error("commands out of sync: packet sequence mismatch")]
    OutOfSync,

    #[error("commands out of sync: did you run multiple statements at once?")]
    OutOfSyncMultiStatements,

    #[error("packet larger than the protocol frame limit")]
    PacketTooLarge,

    #[error("packet larger than max_allowed_packet ({0} bytes)")]
    MaxAllowedPacketExceeded(usize),

    #[error("TLS requested but the server does not announce TLS support")]
    NoTls,

    #[error("unknown authentication plugin: {0}")]
    UnknownAuthPlugin(String),

    /// The server asked for an authentication scheme the configuration has
    /// not opted into (old password, cleartext, dialog, native disabled).
    #[error("authentication scheme {0:?} refused by configuration")]
    AuthPolicyRefused(&'static str),

    #[error(
        "Connection mismatch: transaction started on connection {expected}, but commit/rollback called on connection {actual}"
    )]
    ConnectionMismatch { expected: u32, actual: u32 },

    #[error("Cannot nest transactions - a transaction is already active")]
    NestedTransaction,

    #[error("operation canceled")]
    ContextCanceled,

    #[error("operation deadline exceeded")]
    ContextDeadlineExceeded,

    #[error("A bug in keel-mysql: {0}")]
    Bug(color_eyre::Report),
}

impl Error {
    pub fn from_debug(err: impl std::fmt::Debug) -> Self {
        Self::Bug(eyre!(format!("{:#?}", err)))
    }

    /// Errors after which the connection must not be reused.
    pub fn poisons_connection(&self) -> bool {
        match self {
            Error::Server(_)
            | Error::BadConfig(_)
            | Error::MaxAllowedPacketExceeded(_)
            | Error::PacketTooLarge
            | Error::ConnectionMismatch { .. }
            | Error::NestedTransaction
            | Error::Busy => false,
            Error::Io(_)
            | Error::Tls(_)
            | Error::BadConnection
            | Error::InvalidConnection
            | Error::MalformedPacket
            | Error::UnexpectedEof
            | Error::OutOfSync
            | Error::OutOfSyncMultiStatements
            | Error::NoTls
            | Error::UnknownAuthPlugin(_)
            | Error::AuthPolicyRefused(_)
            | Error::ContextCanceled
            | Error::ContextDeadlineExceeded
            | Error::Bug(_) => true,
        }
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}

impl<Src, Dst: ?Sized> From<zerocopy::CastError<Src, Dst>> for Error {
    fn from(err: zerocopy::CastError<Src, Dst>) -> Self {
        Self::Bug(eyre!("{:#?}", err))
    }
}
