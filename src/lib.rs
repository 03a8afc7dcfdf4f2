//! A minimal RDMA ping/pong built on the rdma_cm connection manager,
//! consisting of safe wrappers over the connection-manager C interfaces and
//! a fixed one-shot exchange engine.
//!
//! One exchange runs per connection:
//!
//! 1. the initiator sends the descriptor of its READ source,
//! 2. the responder RDMA-READs the ping payload and acknowledges,
//! 3. the initiator sends the descriptor of its WRITE sink,
//! 4. the responder RDMA-WRITEs the pong payload and acknowledges.
//!
//! Every post is followed by a blocking completion wait, and every
//! connection exclusively owns its queue pair and its four registered
//! regions. The same engine therefore serves both the single-connection
//! programs and the thread-per-connection responder behind
//! [`ctrl::Acceptor`].
//!
//! # Example
//!
//! ```no_run
//! use std::net::SocketAddrV4;
//!
//! use rpp::{Connection, PROTOCOL_PORT};
//!
//! fn main() -> anyhow::Result<()> {
//!     let peer = SocketAddrV4::new("10.0.0.1".parse()?, PROTOCOL_PORT);
//!     let mut conn = Connection::connect(peer)?;
//!     conn.run_initiator(b"aaa")?;
//!     Ok(())
//! }
//! ```

mod cm;
mod error;
mod pingpong;
mod utils;

/// Connection acceptance utilities.
pub mod ctrl;

pub use cm::{AddrInfo, CmEvent, CmId, EventChannel, QpCaps, RegisteredBuf, RemoteBuf};
pub use error::{Error, Verb};
pub use pingpong::{BufferSet, Connection, DATA_SIZE};

/// The well-known TCP-port-space port the responder listens on.
pub const PROTOCOL_PORT: u16 = 7999;
