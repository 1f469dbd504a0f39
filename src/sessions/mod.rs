//! Session supervisor state (§3 Session, §4.5, §4.6).
//!
//! One [`Session`] exists per supervisor process. It owns the PTY, the
//! authoritative terminal model, and fans live output out to every
//! attached client via a broadcast channel guarded by the same mutex that
//! serializes terminal updates — that's what makes the snapshot-then-live
//! ordering in §9's Open Question race-free without an explicit mute
//! flag: a new client locks the terminal, subscribes, and (if warranted)
//! renders its snapshot all under one critical section, so it cannot miss
//! or duplicate a broadcast that the PTY-reader task sends under the same
//! lock.

pub mod client;
pub mod snapshot;
pub mod terminal;

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::unix::AsyncFd;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::config::Tunables;
use crate::error::SpawnError;
use crate::shell::pty::{self, PtyPair};

use terminal::Terminal;

/// Sent to every client task to act session-wide.
#[derive(Debug, Clone, Copy)]
pub enum ControlSignal {
    DetachAll,
    Shutdown,
}

struct SharedScreen {
    terminal: Mutex<Terminal>,
    tx: broadcast::Sender<Bytes>,
}

pub struct Session {
    pub name: String,
    screen: SharedScreen,
    had_output: AtomicBool,
    client_count: AtomicU32,
    initial_size_set: AtomicBool,
    pub control_tx: broadcast::Sender<ControlSignal>,
    input_tx: mpsc::Sender<Vec<u8>>,
    master: OwnedFd,
    child_pid: Pid,
    supervisor_pid: i32,
    shutdown_tx: mpsc::Sender<()>,
}

/// What the supervisor's main loop waits on to know the session is over.
pub struct ShutdownSignal(pub mpsc::Receiver<()>);

impl Session {
    /// Spawn the PTY child and the background I/O tasks, returning the
    /// shared session state plus a receiver that resolves once the
    /// session should shut down (child exited, or `Kill` was processed).
    pub async fn spawn(
        name: String,
        argv: &[String],
        tunables: &Tunables,
    ) -> Result<(Arc<Session>, ShutdownSignal), SpawnError> {
        let rows = tunables.default_rows;
        let cols = tunables.default_cols;

        let pty_pair = pty::allocate_pty(rows, cols)?;
        let (program, args) = pty::resolve_command(argv);
        let mut child = pty::spawn_pty_child(&pty_pair, &program, &args, &name)
            .map_err(SpawnError::Exec)?;
        let PtyPair { master, slave } = pty_pair;
        // The slave belongs to the child now; holding it open in the
        // parent would prevent the child from ever seeing EOF semantics
        // correctly on close.
        drop(slave);

        let master_read = dup_fd(&master);
        let master_write = dup_fd(&master);
        set_nonblocking(master_read.as_raw_fd());
        set_nonblocking(master_write.as_raw_fd());

        let (tx, _rx) = broadcast::channel(channel_capacity(tunables));
        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(256);
        let (control_tx, _ctrl_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let child_pid = Pid::from_raw(child.id().ok_or(SpawnError::NoPid)? as i32);

        let session = Arc::new(Session {
            name: name.clone(),
            screen: SharedScreen {
                terminal: Mutex::new(Terminal::new(rows, cols)),
                tx,
            },
            had_output: AtomicBool::new(false),
            client_count: AtomicU32::new(0),
            initial_size_set: AtomicBool::new(false),
            control_tx,
            input_tx,
            master,
            child_pid,
            supervisor_pid: std::process::id() as i32,
            shutdown_tx: shutdown_tx.clone(),
        });

        // Writer task: serializes all client Input bytes onto the PTY master.
        {
            let mut writer = file_from_fd(master_write);
            tokio::spawn(async move {
                while let Some(bytes) = input_rx.recv().await {
                    if writer.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
            });
        }

        // Reader task: pumps PTY output into the terminal model and the
        // broadcast channel under one lock (§4.6 step 4). The master fd is
        // non-blocking, so reads are driven through `AsyncFd::readable`
        // rather than a plain `tokio::fs::File` read — the same
        // register-with-the-reactor-and-await-readiness idiom as amux's
        // `Session::io_loop` (`examples/other_examples/...amux__src-daemon-session.rs`).
        // A `tokio::fs::File` read on a `WouldBlock` fd returns immediately
        // instead of suspending, turning an idle session into a busy spin.
        {
            let session = Arc::clone(&session);
            let shutdown_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                let async_master = match AsyncFd::new(master_read) {
                    Ok(fd) => fd,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to register pty master fd with the reactor");
                        let _ = shutdown_tx.send(()).await;
                        return;
                    }
                };
                let mut buf = [0u8; 4096];
                'outer: loop {
                    let mut guard = match async_master.readable().await {
                        Ok(guard) => guard,
                        Err(_) => break,
                    };
                    let result = guard.try_io(|fd| {
                        let raw = fd.as_raw_fd();
                        let n = unsafe { libc::read(raw, buf.as_mut_ptr().cast(), buf.len()) };
                        if n < 0 {
                            Err(std::io::Error::last_os_error())
                        } else {
                            Ok(n as usize)
                        }
                    });
                    match result {
                        Ok(Ok(0)) => break 'outer,
                        Ok(Ok(n)) => {
                            let chunk = Bytes::copy_from_slice(&buf[..n]);
                            {
                                let mut term = session.screen.terminal.lock().await;
                                term.process(&chunk);
                                let _ = session.screen.tx.send(chunk);
                            }
                            session.had_output.store(true, Ordering::SeqCst);
                        }
                        Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                        Ok(Err(_)) => break 'outer,
                        // `try_io`'s own WouldBlock: readiness was spurious,
                        // clear it and wait again.
                        Err(_would_block) => {}
                    }
                }
                let _ = shutdown_tx.send(()).await;
            });
        }

        // Exit watcher: reaps the child and triggers shutdown.
        {
            let shutdown_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                let _ = child.wait().await;
                let _ = shutdown_tx.send(()).await;
            });
        }

        Ok((session, ShutdownSignal(shutdown_rx)))
    }

    pub fn on_client_connected(&self, _client_id: u64) {
        self.client_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_client_disconnected(&self, _client_id: u64) {
        self.client_count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Apply the window size carried by the first `Init` frame this
    /// session ever sees (§4.5: "sets the initial window size from the
    /// first client's reported size"). A probe that never sends `Init`
    /// doesn't count; later `Init`s from re-attaching clients are no-ops.
    pub async fn apply_initial_size(&self, rows: u16, cols: u16) {
        if self
            .initial_size_set
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.resize(rows, cols).await;
        }
    }

    /// Subscribe to live output and, if this session already has output
    /// (i.e. this is a re-attach, never the first attach), render the
    /// single synthesized redraw frame (§4.4). Both happen under the
    /// terminal lock so no broadcast can be missed or duplicated.
    pub async fn attach_snapshot(&self) -> (broadcast::Receiver<Bytes>, Option<Vec<u8>>) {
        let term = self.screen.terminal.lock().await;
        let rx = self.screen.tx.subscribe();
        let snapshot = if self.had_output.load(Ordering::SeqCst) {
            Some(snapshot::render(&term))
        } else {
            None
        };
        (rx, snapshot)
    }

    pub async fn write_input(&self, bytes: Vec<u8>) {
        let _ = self.input_tx.send(bytes).await;
    }

    /// Resize the terminal model, then the PTY's OS window size (§4.5
    /// ordering requirement), in that order.
    pub async fn resize(&self, rows: u16, cols: u16) {
        if rows == 0 || cols == 0 {
            return;
        }
        {
            let mut term = self.screen.terminal.lock().await;
            term.set_size(rows, cols);
        }
        let _ = pty::resize_pty(&self.master, rows, cols);
    }

    pub fn detach_all(&self) {
        let _ = self.control_tx.send(ControlSignal::DetachAll);
    }

    /// Terminate the child and shut the supervisor down (§4.5
    /// Termination, §6.5 tag 6).
    pub async fn kill(&self) {
        let _ = signal::kill(self.child_pid, Signal::SIGTERM);
        let _ = self.shutdown_tx.send(()).await;
    }

    pub fn info(&self) -> (u32, i32) {
        (
            self.client_count.load(Ordering::SeqCst),
            self.supervisor_pid,
        )
    }

    pub fn client_count(&self) -> u32 {
        self.client_count.load(Ordering::SeqCst)
    }
}

fn channel_capacity(tunables: &Tunables) -> usize {
    (tunables.client_write_buf_cap / 4096).max(16)
}

fn dup_fd(fd: &OwnedFd) -> OwnedFd {
    let raw = nix::unistd::dup(fd.as_raw_fd()).expect("dup pty fd");
    unsafe { OwnedFd::from_raw_fd(raw) }
}

fn set_nonblocking(fd: i32) {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    if let Ok(flags) = fcntl(fd, FcntlArg::F_GETFL) {
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        let _ = fcntl(fd, FcntlArg::F_SETFL(flags));
    }
}

/// Wrap a raw PTY fd in a `tokio::fs::File` for async read/write, the
/// same dup-and-wrap-in-File idiom the teacher uses for its PTY-backed
/// sessions.
fn file_from_fd(fd: OwnedFd) -> tokio::fs::File {
    let raw = fd.as_raw_fd();
    std::mem::forget(fd);
    let std_file = unsafe { std::fs::File::from_raw_fd(raw) };
    tokio::fs::File::from_std(std_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_kill_a_session() {
        let tunables = Tunables::default();
        let (session, mut shutdown) = Session::spawn(
            "test".to_string(),
            &["/bin/sh".to_string(), "-c".to_string(), "sleep 5".to_string()],
            &tunables,
        )
        .await
        .unwrap();
        assert_eq!(session.client_count(), 0);
        session.kill().await;
        let _ = shutdown.0.recv().await;
    }
}
