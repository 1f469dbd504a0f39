//! Attach client — interactive takeover of the controlling terminal
//! (§4.9).
//!
//! Raw-mode handling follows `TerminalState::enter_raw_mode` from botty's
//! attach client: disable `ISIG` (so the quit control character reaches
//! us instead of raising a signal), `ICANON`/`ECHO` off, `VMIN=1`/
//! `VTIME=0`. Restoration happens on `Drop` so every exit path — detach,
//! peer close, error — leaves the terminal sane.

use std::os::fd::{AsFd, OwnedFd};

use nix::sys::termios::{self, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::signal::unix::{signal, SignalKind};

use crate::error::ZmxError;
use crate::protocol::codec::{self, Decoder, Tag};
use crate::protocol::transport;

struct TerminalState {
    original: termios::Termios,
    stdin_fd: OwnedFd,
}

impl TerminalState {
    fn enter_raw_mode() -> std::io::Result<Self> {
        let stdin = std::io::stdin();
        let stdin_borrowed = stdin.as_fd();
        let original = termios::tcgetattr(stdin_borrowed)?;

        let mut raw = original.clone();
        raw.input_flags.remove(
            InputFlags::IGNBRK
                | InputFlags::BRKINT
                | InputFlags::PARMRK
                | InputFlags::ISTRIP
                | InputFlags::INLCR
                | InputFlags::IGNCR
                | InputFlags::ICRNL
                | InputFlags::IXON,
        );
        raw.output_flags.remove(OutputFlags::OPOST);
        raw.local_flags.remove(
            LocalFlags::ECHO
                | LocalFlags::ECHONL
                | LocalFlags::ICANON
                | LocalFlags::ISIG
                | LocalFlags::IEXTEN,
        );
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

        termios::tcsetattr(stdin_borrowed, SetArg::TCSAFLUSH, &raw)?;
        let stdin_fd = stdin_borrowed.try_clone_to_owned()?;
        Ok(TerminalState {
            original,
            stdin_fd,
        })
    }
}

impl Drop for TerminalState {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(&self.stdin_fd, SetArg::TCSAFLUSH, &self.original);
    }
}

/// The two literal kitty-protocol-style escape sequences that also
/// trigger detach, alongside the plain quit control character (§4.9,
/// §6.5).
const DETACH_SEQUENCES: [&[u8]; 2] = [b"\x1b[92;5u", b"\x1b[92;133u"];

#[derive(Default)]
struct DetachScanner {
    pending: Vec<u8>,
}

enum Scan {
    /// Bytes that are definitely not part of a detach trigger, to be
    /// forwarded as `Input` frames.
    Forward(Vec<u8>),
    /// Still matching a candidate sequence; nothing to send yet.
    Buffering,
    /// A detach trigger completed.
    Detach,
}

impl DetachScanner {
    fn feed(&mut self, byte: u8) -> Scan {
        if self.pending.is_empty() && byte == 0x1c {
            return Scan::Detach;
        }
        if self.pending.is_empty() && byte != 0x1b {
            return Scan::Forward(vec![byte]);
        }
        self.pending.push(byte);
        if DETACH_SEQUENCES.contains(&self.pending.as_slice()) {
            self.pending.clear();
            return Scan::Detach;
        }
        if DETACH_SEQUENCES
            .iter()
            .any(|seq| seq.starts_with(self.pending.as_slice()))
        {
            return Scan::Buffering;
        }
        Scan::Forward(std::mem::take(&mut self.pending))
    }
}

fn terminal_size() -> (u16, u16) {
    use std::os::fd::AsRawFd;
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::ioctl(std::io::stdout().as_raw_fd(), libc::TIOCGWINSZ, &mut ws) };
    if ret == 0 && ws.ws_row > 0 && ws.ws_col > 0 {
        (ws.ws_row, ws.ws_col)
    } else {
        (24, 80)
    }
}

/// Connect to `socket_path` and run the interactive attach loop until
/// detach, peer close, or error. Returns the process exit code.
pub async fn run(socket_path: &std::path::Path) -> i32 {
    let mut stream = match transport::connect_or_stale(socket_path).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("zmx: {e}");
            return 1;
        }
    };

    let _terminal_state = match TerminalState::enter_raw_mode() {
        Ok(state) => state,
        Err(e) => {
            eprintln!("zmx: failed to enter raw mode: {e}");
            return 1;
        }
    };

    print!("\x1b[2J\x1b[H");
    let _ = std::io::Write::flush(&mut std::io::stdout());

    let (rows, cols) = terminal_size();
    let init = codec::encode(Tag::Init, codec::encode_size(rows, cols));
    if stream.write_all(&init).await.is_err() {
        return restore_and_exit(1);
    }

    let code = io_bridge(&mut stream).await;
    restore_and_exit(code)
}

fn restore_and_exit(code: i32) -> i32 {
    print!("\x1b[2J\x1b[H\x1b[?25h");
    let _ = std::io::Write::flush(&mut std::io::stdout());
    code
}

async fn io_bridge(stream: &mut UnixStream) -> i32 {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    let mut sigwinch = match signal(SignalKind::window_change()) {
        Ok(s) => s,
        Err(_) => return 1,
    };

    let mut scanner = DetachScanner::default();
    let mut stdin_buf = [0u8; 1024];
    let mut sock_buf = [0u8; 4096];
    let mut decoder = Decoder::new();
    let mut current_size = terminal_size();

    loop {
        tokio::select! {
            biased;

            _ = sigwinch.recv() => {
                let size = terminal_size();
                if size != current_size {
                    current_size = size;
                    let frame = codec::encode(Tag::Resize, codec::encode_size(size.0, size.1));
                    if stream.write_all(&frame).await.is_err() {
                        return 1;
                    }
                }
            }

            n = stdin.read(&mut stdin_buf) => {
                let n = match n {
                    Ok(0) | Err(_) => return 0,
                    Ok(n) => n,
                };
                for &byte in &stdin_buf[..n] {
                    match scanner.feed(byte) {
                        Scan::Forward(bytes) => {
                            for b in bytes {
                                let frame = codec::encode(Tag::Input, bytes::Bytes::from(vec![b]));
                                if stream.write_all(&frame).await.is_err() {
                                    return 1;
                                }
                            }
                        }
                        Scan::Buffering => {}
                        Scan::Detach => {
                            let frame = codec::encode(Tag::Detach, bytes::Bytes::new());
                            let _ = stream.write_all(&frame).await;
                            return 0;
                        }
                    }
                }
            }

            n = stream.read(&mut sock_buf) => {
                let n = match n {
                    Ok(0) | Err(_) => return 0,
                    Ok(n) => n,
                };
                decoder.feed(&sock_buf[..n]);
                loop {
                    match decoder.decode() {
                        Ok(Some(frame)) => {
                            if frame.known_tag() == Some(Tag::Output) {
                                if stdout.write_all(&frame.payload).await.is_err() {
                                    return 1;
                                }
                                if stdout.flush().await.is_err() {
                                    return 1;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(_) => return 1,
                    }
                }
            }
        }
    }
}

/// Probe-connect and send `DetachAll` for the session named by
/// `ZMX_SESSION` (§4.7 `detach`).
pub async fn detach_current_session(sessions_dir: &std::path::Path) -> Result<(), ZmxError> {
    let name = std::env::var("ZMX_SESSION")
        .map_err(|_| ZmxError::Other("not attached to a session (ZMX_SESSION unset)".to_string()))?;
    let socket_path = crate::paths::socket_path(sessions_dir, &name);
    crate::probe::fire_and_forget(&socket_path, Tag::DetachAll)
        .await
        .map_err(ZmxError::Connect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bytes_pass_through_immediately() {
        let mut scanner = DetachScanner::default();
        match scanner.feed(b'A') {
            Scan::Forward(bytes) => assert_eq!(bytes, vec![b'A']),
            _ => panic!("expected immediate forward"),
        }
    }

    #[test]
    fn quit_control_character_triggers_detach() {
        let mut scanner = DetachScanner::default();
        assert!(matches!(scanner.feed(0x1c), Scan::Detach));
    }

    #[test]
    fn full_escape_sequence_triggers_detach() {
        let mut scanner = DetachScanner::default();
        let mut last = Scan::Buffering;
        for &b in b"\x1b[92;5u" {
            last = scanner.feed(b);
        }
        assert!(matches!(last, Scan::Detach));
    }

    #[test]
    fn non_matching_escape_sequence_is_flushed_as_input() {
        let mut scanner = DetachScanner::default();
        assert!(matches!(scanner.feed(0x1b), Scan::Buffering));
        assert!(matches!(scanner.feed(b'['), Scan::Buffering));
        match scanner.feed(b'A') {
            Scan::Forward(bytes) => assert_eq!(bytes, vec![0x1b, b'[', b'A']),
            _ => panic!("expected the buffered prefix to flush"),
        }
    }
}
