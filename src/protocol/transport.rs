//! Local (Unix domain) socket transport (§4.2).
//!
//! Server sockets are non-blocking with close-on-exec and a backlog of at
//! least 128. Stale sockets (file present, `connect` refused) are
//! detected here and reported so dispatcher/probe callers can unlink them.

use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use tokio::net::{UnixListener, UnixStream};

use crate::error::{ConfigError, ConnectError, StaleSocketError, TransportError};

/// Minimum listen backlog per §4.2.
const LISTEN_BACKLOG: u32 = 128;

/// Bind a fresh listening socket at `path` as a plain std socket,
/// non-blocking and close-on-exec with the raised backlog already
/// applied. Deliberately *not* `tokio::net::UnixListener`: the dispatcher
/// binds before `fork` (§4.7), while no tokio runtime exists yet in
/// either the parent or the not-yet-forked child — only after the fork
/// does each side build its own runtime and call [`into_tokio`].
pub fn bind_std(path: &Path) -> Result<std::os::unix::net::UnixListener, ConfigError> {
    let std_listener =
        std::os::unix::net::UnixListener::bind(path).map_err(|source| ConfigError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
    std_listener
        .set_nonblocking(true)
        .map_err(|source| ConfigError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
    set_cloexec(std_listener.as_raw_fd());
    // std's UnixListener doesn't expose backlog directly; listen(2)'s
    // backlog was already applied by `bind` with the platform default,
    // which on Linux is effectively unbounded for SOCK_STREAM Unix
    // sockets unless raised — `raise_backlog` applies it explicitly via
    // the raw syscall.
    raise_backlog(std_listener.as_raw_fd());
    Ok(std_listener)
}

/// Hand a std listener bound by [`bind_std`] to the tokio reactor of the
/// runtime currently entered on this thread. `path` is only used to
/// annotate a conversion failure.
pub fn into_tokio(
    std_listener: std::os::unix::net::UnixListener,
    path: &Path,
) -> Result<UnixListener, ConfigError> {
    UnixListener::from_std(std_listener).map_err(|source| ConfigError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

/// Bind and immediately hand to the current tokio reactor. Convenience
/// for call sites already running inside a runtime (tests, and any
/// non-forking path).
pub fn bind(path: &Path) -> Result<UnixListener, ConfigError> {
    into_tokio(bind_std(path)?, path)
}

fn raise_backlog(fd: i32) {
    unsafe {
        libc::listen(fd, LISTEN_BACKLOG as i32);
    }
}

fn set_cloexec(fd: i32) {
    let _ = fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC));
}

/// Connect to an existing session socket. Distinguishes a stale socket
/// (`ConnectionRefused`/missing file — no supervisor listening, per §4.2)
/// from other transport failures, which say nothing about whether the
/// session is alive and must not be treated as a reason to unlink the
/// socket file.
pub async fn connect_or_stale(path: &Path) -> Result<UnixStream, ConnectError> {
    match UnixStream::connect(path).await {
        Ok(stream) => Ok(stream),
        Err(e)
            if e.kind() == io::ErrorKind::ConnectionRefused || e.kind() == io::ErrorKind::NotFound =>
        {
            Err(ConnectError::Stale(StaleSocketError {
                path: path.to_path_buf(),
            }))
        }
        Err(e) => Err(ConnectError::Transport(TransportError::Io(e))),
    }
}

/// Remove a stale socket file if present. Idempotent.
pub fn unlink_stale(path: &Path) {
    let _ = std::fs::remove_file(path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_missing_socket_is_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nope");
        match connect_or_stale(&path).await.unwrap_err() {
            ConnectError::Stale(e) => assert_eq!(e.path, path),
            other => panic!("expected ConnectError::Stale, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bind_then_connect_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("demo");
        let listener = bind(&path).unwrap();
        let accept_task = tokio::spawn(async move { listener.accept().await });
        let client = connect_or_stale(&path).await.unwrap();
        drop(client);
        accept_task.await.unwrap().unwrap();
    }
}
