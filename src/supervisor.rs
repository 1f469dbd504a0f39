//! Session supervisor event loop (§4.6).
//!
//! Runs inside the forked child process (see [`crate::dispatcher`]). Owns
//! the listening socket and the [`Session`]; accepts connections and
//! spawns one task per client (§9's design notes explicitly sanction an
//! async runtime with its own poller as long as byte ordering from PTY to
//! each attached client is preserved — the locked broadcast in
//! `sessions::Session` is what preserves it here).

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::UnixListener;

use crate::config::Tunables;
use crate::error::ZmxError;
use crate::sessions::{ControlSignal, Session};

pub async fn run(
    name: String,
    argv: Vec<String>,
    listener: UnixListener,
    socket_path: PathBuf,
    tunables: Tunables,
) -> Result<(), ZmxError> {
    let (session, mut shutdown) = Session::spawn(name.clone(), &argv, &tunables)
        .await
        .map_err(ZmxError::Spawn)?;

    tracing::info!(session = %name, "supervisor started");

    let next_client_id = AtomicU64::new(1);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.0.recv() => {
                tracing::info!(session = %name, "shutting down");
                break;
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let client_id = next_client_id.fetch_add(1, Ordering::SeqCst);
                        let session = std::sync::Arc::clone(&session);
                        tokio::spawn(async move {
                            crate::sessions::client::run_client(session, stream, client_id).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(session = %name, error = %e, "accept failed");
                    }
                }
            }
        }
    }

    // Give clients a moment to observe the shutdown signal, then unlink
    // the socket file regardless of child termination path (§4.5).
    let _ = session.control_tx.send(ControlSignal::Shutdown);
    drop(listener);
    let _ = std::fs::remove_file(&socket_path);

    Ok(())
}
