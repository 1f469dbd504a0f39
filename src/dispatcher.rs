//! Command dispatcher (§4.7): decides whether an `attach` spawns a new
//! supervisor or connects to an existing one, and drives `list`/
//! `detach`/`kill`.
//!
//! The listening socket is bound as a *plain std* socket before `fork`
//! (§4.7's own ordering: "create the listening socket, then fork") since
//! no tokio runtime exists yet to hand a `tokio::net::UnixListener` to —
//! each side of the fork builds its own runtime afterward. This mirrors
//! `studium-ignotum-ignis-term/pty-proxy`'s plain `nix::unistd::fork`
//! before any async machinery is started, generalized from pty-proxy's
//! single hardcoded session to zmx's named multi-session model.

use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::time::Duration;

use nix::unistd::ForkResult;

use crate::config::Tunables;
use crate::error::{ConnectError, ZmxError};
use crate::protocol::codec::Tag;
use crate::protocol::transport;
use crate::{attach, logging, paths, probe};

/// `attach <name> [cmd...]` (§4.7, §6.4).
pub fn attach_command(name: &str, argv: Vec<String>) -> i32 {
    if let Err(e) = paths::validate_session_name(name) {
        eprintln!("zmx: {e}");
        return 1;
    }
    let sessions_dir = match paths::sessions_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("zmx: {e}");
            return 1;
        }
    };
    let socket_path = paths::socket_path(&sessions_dir, name);
    let tunables = Tunables::load(&sessions_dir);

    if socket_path.exists() {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                eprintln!("zmx: failed to start runtime: {e}");
                return 1;
            }
        };
        let deadline = Duration::from_millis(tunables.probe_deadline_ms);
        match rt.block_on(probe::request_info(&socket_path, deadline)) {
            Ok(_) => return rt.block_on(attach::run(&socket_path)),
            Err(ConnectError::Stale(_)) => transport::unlink_stale(&socket_path),
            Err(e @ ConnectError::Transport(_)) => {
                eprintln!("zmx: {e}");
                return 1;
            }
        }
    }

    spawn_and_attach(name, argv, &sessions_dir, &socket_path, tunables)
}

/// Bind the listening socket, fork, and either become the supervisor
/// (child) or connect as the first client (parent) — §4.7.
fn spawn_and_attach(
    name: &str,
    argv: Vec<String>,
    sessions_dir: &Path,
    socket_path: &Path,
    tunables: Tunables,
) -> i32 {
    let std_listener = match transport::bind_std(socket_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("zmx: {e}");
            return 1;
        }
    };

    // SAFETY: no additional threads have been started yet in this
    // process (no tokio runtime has been built), so forking here is
    // sound — the usual multithreaded-fork hazards don't apply.
    match unsafe { nix::unistd::fork() } {
        Ok(ForkResult::Child) => {
            run_supervisor_child(name, argv, sessions_dir, socket_path, std_listener, tunables);
            unreachable!("run_supervisor_child always exits the process");
        }
        Ok(ForkResult::Parent { .. }) => {
            drop(std_listener);
            std::thread::sleep(Duration::from_millis(10));
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("zmx: failed to start runtime: {e}");
                    return 1;
                }
            };
            rt.block_on(attach::run(socket_path))
        }
        Err(e) => {
            eprintln!("zmx: fork failed: {e}");
            1
        }
    }
}

fn run_supervisor_child(
    name: &str,
    argv: Vec<String>,
    sessions_dir: &Path,
    socket_path: &Path,
    std_listener: std::os::unix::net::UnixListener,
    tunables: Tunables,
) -> ! {
    let exit_code = match paths::logs_dir(sessions_dir) {
        Ok(logs_dir) => {
            let log_path = paths::session_log_path(&logs_dir, name);
            let _ = logging::init_supervisor(&log_path);

            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => {
                    let result: Result<(), ZmxError> = rt.block_on(async {
                        let listener = transport::into_tokio(std_listener, socket_path)?;
                        crate::supervisor::run(
                            name.to_string(),
                            argv,
                            listener,
                            socket_path.to_path_buf(),
                            tunables,
                        )
                        .await
                    });
                    if let Err(e) = result {
                        tracing::error!(session = %name, error = %e, "supervisor exited with error");
                        1
                    } else {
                        0
                    }
                }
                Err(e) => {
                    tracing::error!(session = %name, error = %e, "failed to start supervisor runtime");
                    1
                }
            }
        }
        Err(e) => {
            eprintln!("zmx: {e}");
            1
        }
    };
    std::process::exit(exit_code);
}

/// `list` (§4.7, §6.4): one line per live session; stale sockets found
/// along the way are unlinked.
pub fn list_command() -> i32 {
    let sessions_dir = match paths::sessions_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("zmx: {e}");
            return 1;
        }
    };
    let tunables = Tunables::load(&sessions_dir);
    let deadline = Duration::from_millis(tunables.probe_deadline_ms);

    let entries = match std::fs::read_dir(&sessions_dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("zmx: {e}");
            return 1;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("zmx: failed to start runtime: {e}");
            return 1;
        }
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_socket() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        match rt.block_on(probe::request_info(&path, deadline)) {
            Ok((clients, pid)) => {
                println!("session_name={name} pid={pid} clients={clients}");
            }
            Err(ConnectError::Stale(_)) => {
                transport::unlink_stale(&path);
            }
            Err(e @ ConnectError::Transport(_)) => {
                eprintln!("zmx: {name}: {e}");
            }
        }
    }
    0
}

/// `detach` (§4.7, §6.4): detach all clients of `$ZMX_SESSION`.
pub fn detach_command() -> i32 {
    let sessions_dir = match paths::sessions_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("zmx: {e}");
            return 1;
        }
    };
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("zmx: failed to start runtime: {e}");
            return 1;
        }
    };
    match rt.block_on(attach::detach_current_session(&sessions_dir)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("zmx: {e}");
            1
        }
    }
}

/// `kill <name>` (§4.7, §6.4).
pub fn kill_command(name: &str) -> i32 {
    if let Err(e) = paths::validate_session_name(name) {
        eprintln!("zmx: {e}");
        return 1;
    }
    let sessions_dir = match paths::sessions_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("zmx: {e}");
            return 1;
        }
    };
    let socket_path = paths::socket_path(&sessions_dir, name);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("zmx: failed to start runtime: {e}");
            return 1;
        }
    };
    match rt.block_on(probe::fire_and_forget(&socket_path, Tag::Kill)) {
        Ok(()) => 0,
        Err(ConnectError::Stale(_)) => {
            eprintln!("zmx: no supervisor listening, cleaning up stale socket");
            transport::unlink_stale(&socket_path);
            1
        }
        Err(e @ ConnectError::Transport(_)) => {
            eprintln!("zmx: {e}");
            1
        }
    }
}
