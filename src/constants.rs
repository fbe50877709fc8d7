//! # Constants
//!
//! Constants and types used throughout the application

/// Default bind host, per `REDIS_HOST`'s default.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port, per `REDIS_PORT`'s default. Real Redis uses 6379;
/// this clone defaults elsewhere to avoid colliding with a real instance.
pub const DEFAULT_PORT: u16 = 9999;

/// Minimum listen backlog requested from the kernel.
pub const MIN_BACKLOG: i32 = 5;

/// Listen backlog used unless a larger one is otherwise warranted.
pub const DEFAULT_BACKLOG: i32 = 128;

/// Upper bound on concurrent connections the server will admit at once.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Initial capacity of each connection's read buffer.
pub const READ_BUF_INITIAL_CAP: usize = 8 * 1024;

/// Size of each individual `read()` into the connection buffer.
pub const READ_CHUNK_LEN: usize = 8 * 1024;

/// Protocol bulk-string / array length cap (512 MiB), per the RESP2 grammar.
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// How long the accept loop waits for a connection-count permit before
/// giving up on an incoming socket.
pub const CONNECTION_PERMIT_TIMEOUT_MS: u64 = 5_000;

/// Application exit codes.
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Ok = 0,
    BindError = 1,
    ConfigError = 2,
}
