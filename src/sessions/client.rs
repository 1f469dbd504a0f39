//! Per-client connection handling (§3 Client, §4.6 step 5, §6.5).
//!
//! Each attached connection is driven by its own task: decode incoming
//! frames and dispatch them against the shared [`super::Session`], and
//! forward the broadcast of PTY output to the client's socket. A client
//! that cannot keep up is dropped (it falls behind on the broadcast
//! channel and receives `Lagged`), matching §4.6's failure semantics and
//! the backlog-cap Open Question resolved in DESIGN.md.
//!
//! `Init` is not a handshake gate: a probe connection (§4.8) never sends
//! one, so every connection subscribes and gets its snapshot immediately;
//! `Init` is handled like any other frame once it arrives. A connection
//! only counts towards `list`'s `clients=N` (§6.4, §8 scenario 1) once it
//! actually sends `Init` — a probe that issues `Info`/`Kill`/`DetachAll`
//! and closes is never an attached client and must not inflate the count.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::broadcast;

use crate::protocol::codec::{self, Decoder, Frame, Tag};

use super::{ControlSignal, Session};

pub async fn run_client(session: std::sync::Arc<Session>, mut stream: UnixStream, client_id: u64) {
    let (mut output_rx, snapshot) = session.attach_snapshot().await;
    if let Some(snapshot) = snapshot {
        if stream.write_all(&snapshot).await.is_err() {
            return;
        }
    }

    let mut decoder = Decoder::new();
    let mut read_buf = [0u8; 4096];
    let mut control_rx = session.control_tx.subscribe();
    let mut counted = false;

    let reason = client_loop(
        &session,
        &mut stream,
        &mut decoder,
        &mut read_buf,
        &mut output_rx,
        &mut control_rx,
        client_id,
        &mut counted,
    )
    .await;

    tracing::debug!(client_id, ?reason, "client disconnected");
    if counted {
        session.on_client_disconnected(client_id);
    }
}

#[derive(Debug)]
enum EndReason {
    PeerClosed,
    TransportError,
    ProtocolError,
    Detached,
    DetachedAll,
    SupervisorShutdown,
    Lagged,
}

#[allow(clippy::too_many_arguments)]
async fn client_loop(
    session: &std::sync::Arc<Session>,
    stream: &mut UnixStream,
    decoder: &mut Decoder,
    read_buf: &mut [u8],
    output_rx: &mut broadcast::Receiver<Bytes>,
    control_rx: &mut broadcast::Receiver<ControlSignal>,
    client_id: u64,
    counted: &mut bool,
) -> EndReason {
    loop {
        tokio::select! {
            biased;

            signal = control_rx.recv() => {
                match signal {
                    Ok(ControlSignal::DetachAll) => {
                        drain_pending_output(stream, output_rx).await;
                        return EndReason::DetachedAll;
                    }
                    Ok(ControlSignal::Shutdown) => {
                        drain_pending_output(stream, output_rx).await;
                        return EndReason::SupervisorShutdown;
                    }
                    Err(_) => {
                        drain_pending_output(stream, output_rx).await;
                        return EndReason::SupervisorShutdown;
                    }
                }
            }

            output = output_rx.recv() => {
                match output {
                    Ok(bytes) => {
                        if stream.write_all(&bytes).await.is_err() {
                            return EndReason::TransportError;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => return EndReason::Lagged,
                    Err(broadcast::error::RecvError::Closed) => return EndReason::SupervisorShutdown,
                }
            }

            n = stream.read(read_buf) => {
                let n = match n {
                    Ok(0) => return EndReason::PeerClosed,
                    Ok(n) => n,
                    Err(_) => return EndReason::TransportError,
                };
                decoder.feed(&read_buf[..n]);
                loop {
                    match decoder.decode() {
                        Ok(Some(frame)) => {
                            match dispatch(session, stream, &frame, client_id, counted).await {
                                DispatchOutcome::Continue => {}
                                DispatchOutcome::Detach => return EndReason::Detached,
                            }
                        }
                        Ok(None) => break,
                        Err(_) => return EndReason::ProtocolError,
                    }
                }
            }
        }
    }
}

/// Flush any `Output` frame already queued on the broadcast channel before
/// a `Shutdown`/`DetachAll` tears this client down, so a final chunk of PTY
/// output isn't silently dropped behind the control signal (§8 scenario 4:
/// "A's stream receives a final Output (if any was queued) then a clean
/// peer close").
async fn drain_pending_output(stream: &mut UnixStream, output_rx: &mut broadcast::Receiver<Bytes>) {
    loop {
        match output_rx.try_recv() {
            Ok(bytes) => {
                if stream.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}

enum DispatchOutcome {
    Continue,
    Detach,
}

async fn dispatch(
    session: &std::sync::Arc<Session>,
    stream: &mut UnixStream,
    frame: &Frame,
    client_id: u64,
    counted: &mut bool,
) -> DispatchOutcome {
    match frame.known_tag() {
        Some(Tag::Input) => {
            session.write_input(frame.payload.to_vec()).await;
            DispatchOutcome::Continue
        }
        Some(Tag::Resize) => {
            if let Ok((rows, cols)) = codec::decode_size(&frame.payload) {
                session.resize(rows, cols).await;
            }
            DispatchOutcome::Continue
        }
        Some(Tag::Init) => {
            if let Ok((rows, cols)) = codec::decode_size(&frame.payload) {
                session.apply_initial_size(rows, cols).await;
            }
            if !*counted {
                *counted = true;
                session.on_client_connected(client_id);
            }
            DispatchOutcome::Continue
        }
        Some(Tag::Detach) => DispatchOutcome::Detach,
        Some(Tag::DetachAll) => {
            session.detach_all();
            DispatchOutcome::Continue
        }
        Some(Tag::Kill) => {
            session.kill().await;
            DispatchOutcome::Continue
        }
        Some(Tag::Info) => {
            let (clients_len, pid) = session.info();
            let payload = codec::encode_info(clients_len, pid);
            let mut out = bytes::BytesMut::new();
            Frame::new(Tag::Info, payload).encode(&mut out);
            let _ = stream.write_all(&out).await;
            DispatchOutcome::Continue
        }
        Some(Tag::Output) | None => {
            tracing::debug!(client_id, tag = frame.tag, "ignoring frame not valid from a client");
            DispatchOutcome::Continue
        }
    }
}
