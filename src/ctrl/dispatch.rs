//! Worker dispatch for accepted connections.

use std::io;
use std::thread;

use crate::cm::CmId;
use crate::error::Error;
use crate::pingpong::Connection;

/// Hands accepted connections to whatever runs their exchange.
///
/// The accept loop is generic over this seam so the dispatch strategy can
/// change (bounded pool, inline execution) without touching the protocol
/// engine.
pub trait Dispatch {
    /// Take ownership of a freshly migrated identifier and schedule its
    /// exchange. An error here is fatal to the acceptor, not just to the
    /// one connection.
    fn dispatch(&self, id: CmId) -> io::Result<()>;
}

/// One detached thread per accepted connection.
///
/// Threads are never joined: shutting the accept loop down leaves in-flight
/// exchanges running to natural completion or failure. There is no pool and
/// no backpressure on the number of concurrent connections.
pub struct ThreadPerConnection {
    pong: Vec<u8>,
}

impl ThreadPerConnection {
    /// `pong` is the payload every worker writes into its initiator's
    /// WRITE target.
    pub fn new(pong: impl Into<Vec<u8>>) -> Self {
        Self { pong: pong.into() }
    }
}

impl Dispatch for ThreadPerConnection {
    fn dispatch(&self, id: CmId) -> io::Result<()> {
        let pong = self.pong.clone();
        thread::Builder::new()
            .name("rpp-worker".into())
            .spawn(move || match serve_connection(id, &pong) {
                Ok(()) => log::info!("connection done"),
                // A connection-scoped failure must not take down the
                // other workers or the accept loop.
                Err(e) => log::error!("connection failed: {:#}", anyhow::Error::from(e)),
            })
            // Detached: the handle is dropped, never joined.
            .map(drop)
    }
}

/// Complete establishment of `id`, run the responder exchange, and tear the
/// connection down on the way out (drop-driven, on every exit path).
fn serve_connection(id: CmId, pong: &[u8]) -> Result<(), Error> {
    let mut conn = Connection::accept(id)?;
    conn.run_responder(pong)
}
