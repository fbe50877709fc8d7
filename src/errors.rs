//! # Errors
//!
//! Error types used throughout the library. [`RespError`] covers malformed
//! wire bytes (fatal to the connection); [`CmdError`] covers recognized
//! commands that were sent wrong arguments (recoverable, connection stays
//! open). [`ConnectionError`] and [`ApplicationError`] wrap these for the
//! connection loop and the binary entry point respectively.

use thiserror::Error;

/// Errors produced while decoding RESP2 bytes from the wire.
///
/// These never name a *missing* suffix as an error: an incomplete frame is
/// represented by `Ok(None)` from [`crate::resp::Decoder::decode_one`], not
/// by a variant here. Every variant is a genuinely malformed frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RespError {
    #[error("unsupported RESP type byte: {0:#x}")]
    UnsupportedType(u8),

    #[error("malformed length or integer: not a decimal ASCII value")]
    MalformedInteger,

    #[error("length {0} out of range (must be -1 or 0..={1})")]
    LengthOutOfRange(i64, i64),

    #[error("missing CRLF terminator")]
    MissingCrlf,
}

/// Errors related to working with [`crate::command`].
///
/// The `Display` text of each variant is exactly the text that follows the
/// RESP2 `-` error marker, e.g. `CmdError::UnknownCommand` renders as
/// `ERR unknown command 'FOO'`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CmdError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR invalid expire command syntax")]
    InvalidExpireSyntax,

    #[error("ERR XX and NX options at the same time are not compatible")]
    NxXxConflict,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR Protocol error: expected array of bulk strings")]
    MalformedFrame,
}

impl CmdError {
    /// The exact text to place after the RESP2 `-` marker.
    pub fn reply_text(&self) -> String {
        self.to_string()
    }
}

/// Errors related to working with [`crate::conn`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Resp(#[from] RespError),
}

/// Errors related to running [`crate::server::Server`]'s accept loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting {0} ms for a connection permit")]
    PermitTimeout(u64),

    #[error("connection semaphore closed")]
    SemaphoreClosed(#[from] tokio::sync::AcquireError),
}

/// Errors related to reading server configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid REDIS_PORT {0:?}: {1}")]
    InvalidPort(String, std::num::ParseIntError),

    #[error("invalid listen address {0:?}: {1}")]
    InvalidAddr(String, std::net::AddrParseError),
}

/// Top-level application errors, surfaced from `main`.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
