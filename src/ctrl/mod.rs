//! Connection acceptance utilities.

mod acceptor;
mod dispatch;
mod shutdown;

pub use acceptor::{serve_one, serve_one_addrinfo, Acceptor};
pub use dispatch::{Dispatch, ThreadPerConnection};
pub use shutdown::Shutdown;
