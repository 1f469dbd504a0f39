//! PTY-backed process spawning (§4.5).

pub mod pty;
