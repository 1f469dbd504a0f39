//! `tracing` initialization for the two process roles.
//!
//! The dispatcher logs to stderr. A forked supervisor redirects its
//! subscriber to a session-scoped append-only file before the event loop
//! starts — the one process-wide singleton this crate has (§9 "Global
//! state"), constructed once in `main` rather than touched again.

use std::fs::OpenOptions;
use std::path::Path;

use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging for the dispatcher/probe/attach-client roles.
pub fn init_dispatcher() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Initialize logging for a forked supervisor, writing to
/// `{log_path}` in append mode.
pub fn init_supervisor(log_path: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(move || file.try_clone().expect("log file clone"))
        .with_ansi(false)
        .try_init();
    Ok(())
}
