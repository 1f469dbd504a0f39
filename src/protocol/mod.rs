//! Framed IPC wire protocol and local-socket transport.

pub mod codec;
pub mod transport;

pub use codec::{Decoder, Frame, Tag};
