//! The ping/pong protocol core: per-connection buffers, connection
//! lifecycle, and the exchange engine.

pub mod buffers;
pub mod conn;
mod exchange;

pub use buffers::{BufferSet, DATA_SIZE};
pub use conn::Connection;
