//! Error taxonomy.
//!
//! Each component returns its own narrow error type. Only the supervisor
//! event loop and the dispatcher convert these into log messages and exit
//! codes; everywhere else propagates with `?`.

use std::path::PathBuf;

/// Frame-level decode/encode failures. Fatal for the offending connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame payload length {len} exceeds cap {cap}")]
    PayloadTooLarge { len: u32, cap: u32 },

    #[error("connection closed mid-frame ({have} of {need} bytes)")]
    Truncated { have: usize, need: usize },

    #[error("unknown frame tag {0} required in this position")]
    UnknownRequiredTag(u8),
}

/// Socket-level failures. Drop the client; the session continues.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer reset the connection")]
    PeerReset,
}

/// PTY master fd failures. Non-`WouldBlock` read errors and EOF shut the
/// session down.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("pty io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pty allocation failed: {0}")]
    Nix(#[from] nix::Error),

    #[error("child process exited")]
    ChildExited,
}

/// Fork+exec failures when spawning the session's command.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),

    #[error("exec failed: {0}")]
    Exec(#[source] std::io::Error),

    #[error("pty allocation failed: {0}")]
    PtyAlloc(#[from] PtyError),

    #[error("no shell found (SHELL unset and /bin/sh missing)")]
    NoShell,

    #[error("spawned child process exposed no pid")]
    NoPid,
}

/// A socket file exists but no supervisor is listening behind it.
#[derive(Debug, thiserror::Error)]
#[error("stale socket at {path}")]
pub struct StaleSocketError {
    pub path: PathBuf,
}

/// Outcome of connecting to a session socket (§4.2, §4.8): either the
/// socket is definitively stale (`ConnectionRefused`/missing file) or some
/// other transport failure occurred that says nothing about whether a
/// supervisor is listening — callers must not unlink the socket file for
/// the latter.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Stale(#[from] StaleSocketError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Configuration / filesystem setup failures. Surfaced to the user; the
/// process exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot create or access sessions directory {path}: {source}")]
    SessionsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot bind socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid session name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// Top-level error used at the `main`/dispatcher boundary only.
#[derive(Debug, thiserror::Error)]
pub enum ZmxError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    StaleSocket(#[from] StaleSocketError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no session named {0:?}")]
    NoSuchSession(String),

    #[error("{0}")]
    Other(String),
}
