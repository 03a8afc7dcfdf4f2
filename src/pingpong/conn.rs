//! Connection lifecycle.

use std::net::SocketAddrV4;

use crate::cm::{AddrInfo, CmId, QpCaps};
use crate::error::{Error, Verb};
use crate::pingpong::buffers::BufferSet;

/// One reliable connected endpoint together with the buffer set it
/// exclusively owns.
///
/// A connection comes out of its constructor ready for the exchange: the
/// queue pair exists, all four regions are registered, the first receive is
/// posted, and the connect or accept handshake is complete. Teardown is
/// drop-driven and runs in reverse: buffer set first, then queue pair and
/// identifier.
pub struct Connection {
    // The regions must be released before the identifier they were
    // registered on: fields drop in declaration order.
    pub(super) bufs: BufferSet,
    pub(super) id: CmId,
}

impl Connection {
    /// Initiator path: resolve the peer address and a route to it (bounded
    /// waits), create the queue pair, register buffers, post the first
    /// receive, and connect.
    pub fn connect(peer: SocketAddrV4) -> Result<Self, Error> {
        let id = CmId::new().map_err(Error::EndpointCreation)?;
        id.resolve_addr(peer).map_err(Error::AddressResolution)?;
        id.resolve_route().map_err(Error::RouteResolution)?;
        id.create_qp(QpCaps::pingpong())
            .map_err(Error::EndpointCreation)?;
        let conn = Self::with_buffers(id)?;
        conn.id.connect().map_err(Error::Connect)?;
        Ok(conn)
    }

    /// Initiator path via address information: create the endpoint (which
    /// also creates the queue pair), register buffers, post the first
    /// receive, and connect.
    pub fn connect_addrinfo(node: &str, service: &str) -> Result<Self, Error> {
        let info = AddrInfo::resolve(node, service, false).map_err(Error::AddressResolution)?;
        let id = CmId::from_addrinfo(&info, QpCaps::pingpong()).map_err(Error::EndpointCreation)?;
        let conn = Self::with_buffers(id)?;
        conn.id.connect().map_err(Error::Connect)?;
        Ok(conn)
    }

    /// Responder path: complete establishment of an incoming identifier
    /// (from a listener or a connect-request event). Creates the queue pair
    /// unless the listener already did, then registers buffers, posts the
    /// first receive, and accepts.
    pub fn accept(id: CmId) -> Result<Self, Error> {
        if !id.has_qp() {
            id.create_qp(QpCaps::pingpong())
                .map_err(Error::EndpointCreation)?;
        }
        let conn = Self::with_buffers(id)?;
        conn.id.accept().map_err(Error::Accept)?;
        Ok(conn)
    }

    /// Register the buffer set and post the first receive.
    ///
    /// The receive must be outstanding before the handshake completes, or
    /// an eager peer's first message could arrive with nothing posted.
    fn with_buffers(id: CmId) -> Result<Self, Error> {
        let bufs = BufferSet::register(&id)?;
        id.post_recv(bufs.recv_desc()).map_err(|source| Error::Post {
            op: Verb::Recv,
            source,
        })?;
        Ok(Self { bufs, id })
    }
}
