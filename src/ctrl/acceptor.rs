//! Connection acceptance: single-shot responders and the event-driven
//! multi-connection acceptor.

use std::io;
use std::net::SocketAddrV4;

use rdma_sys::rdma_cm_event_type;

use crate::cm::{AddrInfo, CmId, EventChannel, QpCaps};
use crate::ctrl::dispatch::Dispatch;
use crate::ctrl::shutdown::Shutdown;
use crate::error::Error;
use crate::pingpong::Connection;

/// Listener backlog of the multi-connection acceptor.
const ACCEPT_BACKLOG: i32 = 3;

/// Handle exactly one incoming connection and run the responder exchange
/// inline.
pub fn serve_one(bind: SocketAddrV4, pong: &[u8]) -> Result<(), Error> {
    let listener = CmId::new().map_err(Error::EndpointCreation)?;
    listener.bind_addr(bind).map_err(Error::EndpointCreation)?;
    listener.listen(1).map_err(Error::EndpointCreation)?;
    let id = listener.get_request().map_err(Error::Accept)?;
    let mut conn = Connection::accept(id)?;
    conn.run_responder(pong)
}

/// As [`serve_one`], but with the listening endpoint created from address
/// information; the accepted request then arrives with its queue pair
/// already created.
pub fn serve_one_addrinfo(node: &str, service: &str, pong: &[u8]) -> Result<(), Error> {
    let info = AddrInfo::resolve(node, service, true).map_err(Error::AddressResolution)?;
    let listener =
        CmId::from_addrinfo(&info, QpCaps::pingpong()).map_err(Error::EndpointCreation)?;
    listener.listen(1).map_err(Error::EndpointCreation)?;
    let id = listener.get_request().map_err(Error::Accept)?;
    let mut conn = Connection::accept(id)?;
    conn.run_responder(pong)
}

/// Event-driven acceptor for unbounded concurrent connections.
///
/// Owns the event channel and the listener bound to it; both are released
/// when the acceptor drops, whether the loop ended cleanly or with an
/// acceptor-fatal error.
pub struct Acceptor {
    // The listener must be destroyed before the channel it reports to:
    // fields drop in declaration order. Held for ownership; the loop itself
    // only talks to the channel.
    #[allow(dead_code)]
    listener: CmId,
    channel: EventChannel,
    shutdown: Shutdown,
}

impl Acceptor {
    /// Create the event channel, bind the listener to `addr`, and start
    /// listening.
    pub fn bind(addr: SocketAddrV4, shutdown: Shutdown) -> Result<Self, Error> {
        let channel = EventChannel::new().map_err(Error::EndpointCreation)?;
        let listener = CmId::with_channel(&channel).map_err(Error::EndpointCreation)?;
        // NOTE: binding is synchronous even on a channel-attached
        // identifier; no event round-trip is involved.
        listener.bind_addr(addr).map_err(Error::EndpointCreation)?;
        listener
            .listen(ACCEPT_BACKLOG)
            .map_err(Error::EndpointCreation)?;
        Ok(Self {
            listener,
            channel,
            shutdown,
        })
    }

    /// Run the accept loop until the shutdown flag is observed.
    ///
    /// Every connect request is validated, acknowledged, migrated into
    /// synchronous mode, and handed to `dispatcher`. A malformed event or a
    /// channel failure is fatal to the whole acceptor; already-dispatched
    /// workers keep running either way.
    pub fn run(&self, dispatcher: &impl Dispatch) -> Result<(), Error> {
        while !self.shutdown.is_triggered() {
            let mut event = match self.channel.wait() {
                // A signal interrupted the wait; if it was the shutdown
                // signal, leave cleanly.
                Err(e)
                    if e.kind() == io::ErrorKind::Interrupted
                        && self.shutdown.is_triggered() =>
                {
                    break
                }
                other => other.map_err(Error::EventChannel)?,
            };

            check_connect_request(event.kind(), event.status())?;
            let id = event.take_id().ok_or_else(|| {
                Error::EventChannel(io::Error::other("connect request carried no identifier"))
            })?;
            event.ack().map_err(Error::EventChannel)?;

            // The worker drives this identifier with blocking calls from
            // here on; detach it from the shared channel first.
            id.migrate_sync().map_err(Error::Accept)?;
            dispatcher.dispatch(id).map_err(Error::Accept)?;
        }

        log::info!("acceptor shutting down");
        Ok(())
    }
}

/// Only successful connect requests may reach dispatch; anything else
/// terminates the acceptor.
fn check_connect_request(kind: rdma_cm_event_type::Type, status: i32) -> Result<(), Error> {
    if status != 0 {
        return Err(Error::EventStatus(status));
    }
    if kind != rdma_cm_event_type::RDMA_CM_EVENT_CONNECT_REQUEST {
        return Err(Error::UnexpectedEvent { got: kind as u32 });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_passes() {
        let ok = check_connect_request(rdma_cm_event_type::RDMA_CM_EVENT_CONNECT_REQUEST, 0);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_failed_status_is_fatal() {
        let err = check_connect_request(rdma_cm_event_type::RDMA_CM_EVENT_CONNECT_REQUEST, -110)
            .unwrap_err();
        assert!(matches!(err, Error::EventStatus(-110)));
    }

    #[test]
    fn test_wrong_kind_is_fatal() {
        let err = check_connect_request(rdma_cm_event_type::RDMA_CM_EVENT_DISCONNECTED, 0)
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedEvent { .. }));
    }
}
