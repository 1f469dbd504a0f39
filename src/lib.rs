#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]

//! zmx — persists interactive terminal sessions beyond the lifetime of
//! any attached client (see `main.rs` for the command-line surface).
//!
//! - `protocol` — framed binary IPC codec and local-socket transport
//! - `sessions` — the per-session supervisor state, terminal model, and
//!   snapshot renderer
//! - `shell` — PTY allocation and child process spawning
//! - `supervisor` — the session supervisor's event loop
//! - `dispatcher` — the `attach`/`list`/`detach`/`kill` entry points
//! - `probe` — short-lived request/response socket probes
//! - `attach` — the interactive attach client
//! - `paths`, `config`, `error`, `logging` — ambient filesystem, config,
//!   error, and logging plumbing

pub mod attach;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod paths;
pub mod probe;
pub mod protocol;
pub mod sessions;
pub mod shell;
pub mod supervisor;
