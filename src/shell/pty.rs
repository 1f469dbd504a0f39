//! PTY allocation, shell/command spawning, and terminal resize (§4.5).
//!
//! Uses the `nix` crate for POSIX PTY APIs. The PTY master fd is kept
//! alive for the session's lifetime so I/O and resize operate on it.

use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;

use nix::pty::{openpty, OpenptyResult, Winsize};
use tokio::process::{Child, Command};

use crate::error::PtyError;

/// An allocated PTY pair (master + slave).
pub struct PtyPair {
    pub master: OwnedFd,
    pub slave: OwnedFd,
}

/// Allocate a PTY pair with the given terminal size.
pub fn allocate_pty(rows: u16, cols: u16) -> Result<PtyPair, PtyError> {
    let winsize = Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let OpenptyResult { master, slave } = openpty(&winsize, None)?;
    Ok(PtyPair { master, slave })
}

/// The command a new session spawns: either the user-supplied argv, or
/// the login shell read from `SHELL` (fallback `/bin/sh`) with no
/// arguments.
pub fn resolve_command(argv: &[String]) -> (String, Vec<String>) {
    if let Some((program, rest)) = argv.split_first() {
        return (program.clone(), rest.to_vec());
    }
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    (shell, Vec::new())
}

/// Spawn the session's command on the slave side of the PTY.
///
/// The child becomes a session leader with the PTY slave as its
/// controlling terminal; stdin/stdout/stderr are all connected to the
/// slave fd. `ZMX_SESSION` is set in the child's environment (§6.3).
pub fn spawn_pty_child(
    pty: &PtyPair,
    program: &str,
    args: &[String],
    session_name: &str,
) -> std::io::Result<Child> {
    let slave_fd = pty.slave.as_raw_fd();
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    cmd.env("ZMX_SESSION", session_name);

    // The child's stdio is handled by pre_exec (dup2 to PTY slave), so
    // tell tokio not to set up pipes.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: all syscalls used here are async-signal-safe per POSIX.
    unsafe {
        cmd.pre_exec(move || {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            if libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            libc::dup2(slave_fd, 0);
            libc::dup2(slave_fd, 1);
            libc::dup2(slave_fd, 2);
            if slave_fd > 2 {
                libc::close(slave_fd);
            }
            Ok(())
        });
    }

    cmd.spawn()
}

/// Resize a PTY's terminal window (OS-level `TIOCSWINSZ`). Per §4.5 this
/// must be called only after the in-process terminal emulator has
/// already been resized.
pub fn resize_pty(master: &OwnedFd, rows: u16, cols: u16) -> Result<(), PtyError> {
    let winsize = Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCSWINSZ is a well-defined ioctl writing a Winsize struct.
    let ret = unsafe {
        libc::ioctl(
            master.as_raw_fd(),
            libc::TIOCSWINSZ,
            std::ptr::addr_of!(winsize),
        )
    };
    if ret == -1 {
        Err(PtyError::Nix(nix::Error::last()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_command_prefers_argv_over_shell() {
        let (program, args) = resolve_command(&["/bin/echo".to_string(), "hi".to_string()]);
        assert_eq!(program, "/bin/echo");
        assert_eq!(args, vec!["hi".to_string()]);
    }

    #[test]
    fn resolve_command_falls_back_to_sh() {
        std::env::remove_var("SHELL");
        let (program, args) = resolve_command(&[]);
        assert_eq!(program, "/bin/sh");
        assert!(args.is_empty());
    }
}
