//! Communication-manager identifier and queue-pair handling.

use std::io;
use std::net::SocketAddrV4;
use std::ptr::{self, NonNull};
use std::{fmt, mem};

use rdma_sys::*;

use super::addrinfo::AddrInfo;
use super::channel::EventChannel;
use super::mr::RegisteredBuf;
use super::remote::RemoteBuf;
use crate::utils::interop::{from_c_ret, nonnull_or_errno};

/// Bounded wait for address and route resolution, in milliseconds.
const RESOLVE_TIMEOUT_MS: i32 = 2000;

/// Queue-pair capacity profile.
///
/// The exchange never has more than two work requests outstanding per
/// direction (the current protocol operation plus the standing receive),
/// each carrying a single scatter/gather element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QpCaps {
    pub max_send_wr: u32,
    pub max_recv_wr: u32,
    pub max_send_sge: u32,
    pub max_recv_sge: u32,
}

impl QpCaps {
    /// The fixed profile used by every ping/pong connection.
    pub const fn pingpong() -> Self {
        Self {
            max_send_wr: 2,
            max_recv_wr: 2,
            max_send_sge: 1,
            max_recv_sge: 1,
        }
    }

    /// Build the init-attr for a reliable connected queue pair.
    ///
    /// NOTE: `sq_sig_all` is set so every send-side work request generates
    /// a completion; the exchange blocks on each one in turn.
    pub(crate) fn to_init_attr(self) -> ibv_qp_init_attr {
        // SAFETY: POD type.
        let mut attr = unsafe { mem::zeroed::<ibv_qp_init_attr>() };
        attr.cap.max_send_wr = self.max_send_wr;
        attr.cap.max_recv_wr = self.max_recv_wr;
        attr.cap.max_send_sge = self.max_send_sge;
        attr.cap.max_recv_sge = self.max_recv_sge;
        attr.qp_type = ibv_qp_type::IBV_QPT_RC;
        attr.sq_sig_all = 1;
        attr
    }
}

impl Default for QpCaps {
    fn default() -> Self {
        Self::pingpong()
    }
}

fn sockaddr_in_of(addr: SocketAddrV4) -> libc::sockaddr_in {
    // SAFETY: POD type.
    let mut sa = unsafe { mem::zeroed::<libc::sockaddr_in>() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_port = addr.port().to_be();
    // The octets are already in network order.
    sa.sin_addr.s_addr = u32::from_ne_bytes(addr.ip().octets());
    sa
}

/// Communication-manager identifier: one endpoint of a reliable connection,
/// or a listener, together with the queue pair created on it.
///
/// Dropping a `CmId` destroys the queue pair (when one exists) and then the
/// identifier itself. Memory regions registered against this identifier must
/// be dropped first; [`crate::Connection`] enforces that with its field
/// order.
pub struct CmId {
    id: NonNull<rdma_cm_id>,
}

// SAFETY: an id is exclusively owned and driven from one thread at a time;
// the raw pointer merely hides that from the compiler.
unsafe impl Send for CmId {}

impl fmt::Debug for CmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("CmId<{:p}>", self.as_ptr()))
    }
}

impl CmId {
    /// Create a synchronous-mode identifier in the TCP port space.
    pub fn new() -> io::Result<Self> {
        Self::create(ptr::null_mut())
    }

    /// Create an identifier whose events are reported to `channel`.
    pub fn with_channel(channel: &EventChannel) -> io::Result<Self> {
        Self::create(channel.as_ptr())
    }

    fn create(channel: *mut rdma_event_channel) -> io::Result<Self> {
        log::debug!("rdma_create_id");
        let mut id = ptr::null_mut();
        // SAFETY: FFI.
        let ret = unsafe {
            rdma_create_id(
                channel,
                &mut id,
                ptr::null_mut(),
                rdma_port_space::RDMA_PS_TCP,
            )
        };
        from_c_ret(ret)?;
        Ok(Self {
            id: nonnull_or_errno(id)?,
        })
    }

    /// Create an endpoint from resolved address information.
    ///
    /// On an active resolution the queue pair is created here from `caps`;
    /// on a passive one the queue pair is instead created for each
    /// identifier that [`CmId::get_request`] returns.
    pub fn from_addrinfo(info: &AddrInfo, caps: QpCaps) -> io::Result<Self> {
        log::debug!("rdma_create_ep");
        let mut id = ptr::null_mut();
        let mut attr = caps.to_init_attr();
        // SAFETY: FFI; `info` outlives the call.
        let ret = unsafe { rdma_create_ep(&mut id, info.as_ptr(), ptr::null_mut(), &mut attr) };
        from_c_ret(ret)?;
        Ok(Self {
            id: nonnull_or_errno(id)?,
        })
    }

    /// Wrap an identifier handed over by a connection-request event.
    pub(crate) fn from_raw(id: NonNull<rdma_cm_id>) -> Self {
        Self { id }
    }

    pub(crate) fn as_ptr(&self) -> *mut rdma_cm_id {
        self.id.as_ptr()
    }

    /// Whether a queue pair has been created on this identifier.
    pub fn has_qp(&self) -> bool {
        // SAFETY: the id is valid while `self` lives.
        unsafe { !(*self.as_ptr()).qp.is_null() }
    }

    /// Bind to a local address in preparation for listening.
    pub fn bind_addr(&self, addr: SocketAddrV4) -> io::Result<()> {
        log::debug!("rdma_bind_addr {addr}");
        let mut sa = sockaddr_in_of(addr);
        // SAFETY: FFI; `sa` lives across the call.
        let ret = unsafe { rdma_bind_addr(self.as_ptr(), &mut sa as *mut _ as *mut _) };
        from_c_ret(ret)
    }

    /// Start listening with the given backlog.
    pub fn listen(&self, backlog: i32) -> io::Result<()> {
        log::debug!("rdma_listen backlog {backlog}");
        // SAFETY: FFI.
        from_c_ret(unsafe { rdma_listen(self.as_ptr(), backlog) })
    }

    /// Block until an incoming connection request arrives on this listener
    /// and return its identifier.
    ///
    /// Listeners created from address information hand back identifiers
    /// that already carry a queue pair.
    pub fn get_request(&self) -> io::Result<CmId> {
        log::debug!("rdma_get_request");
        let mut id = ptr::null_mut();
        // SAFETY: FFI.
        let ret = unsafe { rdma_get_request(self.as_ptr(), &mut id) };
        from_c_ret(ret)?;
        Ok(CmId {
            id: nonnull_or_errno(id)?,
        })
    }

    /// Resolve the peer address, within a bounded wait.
    pub fn resolve_addr(&self, peer: SocketAddrV4) -> io::Result<()> {
        log::debug!("rdma_resolve_addr {peer}");
        let mut sa = sockaddr_in_of(peer);
        // SAFETY: FFI; `sa` lives across the call.
        let ret = unsafe {
            rdma_resolve_addr(
                self.as_ptr(),
                ptr::null_mut(),
                &mut sa as *mut _ as *mut _,
                RESOLVE_TIMEOUT_MS,
            )
        };
        from_c_ret(ret)
    }

    /// Resolve a route to the already-resolved peer, within a bounded wait.
    pub fn resolve_route(&self) -> io::Result<()> {
        log::debug!("rdma_resolve_route");
        // SAFETY: FFI.
        from_c_ret(unsafe { rdma_resolve_route(self.as_ptr(), RESOLVE_TIMEOUT_MS) })
    }

    /// Create the queue pair with the given capacity profile.
    pub fn create_qp(&self, caps: QpCaps) -> io::Result<()> {
        log::debug!("rdma_create_qp");
        let mut attr = caps.to_init_attr();
        // SAFETY: FFI.
        from_c_ret(unsafe { rdma_create_qp(self.as_ptr(), ptr::null_mut(), &mut attr) })
    }

    /// Connect to the peer (initiator side).
    pub fn connect(&self) -> io::Result<()> {
        log::debug!("rdma_connect");
        // SAFETY: FFI.
        from_c_ret(unsafe { rdma_connect(self.as_ptr(), ptr::null_mut()) })
    }

    /// Accept the pending connection request this identifier was created
    /// from (responder side).
    pub fn accept(&self) -> io::Result<()> {
        log::debug!("rdma_accept");
        // SAFETY: FFI.
        from_c_ret(unsafe { rdma_accept(self.as_ptr(), ptr::null_mut()) })
    }

    /// Detach this identifier from its event channel into synchronous mode.
    ///
    /// Workers drive their connection with blocking calls; events for the
    /// identifier must stop flowing to the shared accept-loop channel first.
    pub fn migrate_sync(&self) -> io::Result<()> {
        log::debug!("rdma_migrate_id");
        // SAFETY: FFI.
        from_c_ret(unsafe { rdma_migrate_id(self.as_ptr(), ptr::null_mut()) })
    }

    /// Post a receive for the peer's next message into `buf`.
    pub fn post_recv(&self, buf: &RegisteredBuf) -> io::Result<()> {
        log::debug!("rdma_post_recv");
        // SAFETY: FFI; `buf` stays registered until the matching completion
        // is observed (the buffer set outlives every posted operation).
        let ret = unsafe {
            rdma_post_recv(
                self.as_ptr(),
                ptr::null_mut(),
                buf.addr().cast(),
                buf.len(),
                buf.as_mr(),
            )
        };
        from_c_ret(ret)
    }

    /// Post a send of `buf`'s entire content.
    pub fn post_send(&self, buf: &RegisteredBuf) -> io::Result<()> {
        log::debug!("rdma_post_send");
        // SAFETY: as for `post_recv`.
        let ret = unsafe {
            rdma_post_send(
                self.as_ptr(),
                ptr::null_mut(),
                buf.addr().cast(),
                buf.len(),
                buf.as_mr(),
                0,
            )
        };
        from_c_ret(ret)
    }

    /// Post a one-sided READ from `remote` into `local`.
    ///
    /// The transfer length is the remote descriptor's length clamped to the
    /// local region, so the peer can never make the post run past the
    /// landing buffer.
    pub fn post_read(&self, local: &RegisteredBuf, remote: &RemoteBuf) -> io::Result<()> {
        log::debug!("rdma_post_read");
        let len = (remote.len as usize).min(local.len());
        // SAFETY: as for `post_recv`.
        let ret = unsafe {
            rdma_post_read(
                self.as_ptr(),
                ptr::null_mut(),
                local.addr().cast(),
                len,
                local.as_mr(),
                0,
                remote.addr,
                remote.rkey,
            )
        };
        from_c_ret(ret)
    }

    /// Post a one-sided WRITE of `local` to `remote`, with the same length
    /// clamping as [`CmId::post_read`].
    pub fn post_write(&self, local: &RegisteredBuf, remote: &RemoteBuf) -> io::Result<()> {
        log::debug!("rdma_post_write");
        let len = (remote.len as usize).min(local.len());
        // SAFETY: as for `post_recv`.
        let ret = unsafe {
            rdma_post_write(
                self.as_ptr(),
                ptr::null_mut(),
                local.addr().cast(),
                len,
                local.as_mr(),
                0,
                remote.addr,
                remote.rkey,
            )
        };
        from_c_ret(ret)
    }

    /// Block until one send-side completion (send, READ, or WRITE) arrives
    /// and verify it succeeded.
    pub fn get_send_comp(&self) -> io::Result<()> {
        log::debug!("rdma_get_send_comp");
        // SAFETY: POD type.
        let mut wc = unsafe { mem::zeroed::<ibv_wc>() };
        // SAFETY: FFI.
        let ret = unsafe { rdma_get_send_comp(self.as_ptr(), &mut wc) };
        check_comp(ret, &wc)
    }

    /// Block until one receive completion arrives and verify it succeeded.
    pub fn get_recv_comp(&self) -> io::Result<()> {
        log::debug!("rdma_get_recv_comp");
        // SAFETY: POD type.
        let mut wc = unsafe { mem::zeroed::<ibv_wc>() };
        // SAFETY: FFI.
        let ret = unsafe { rdma_get_recv_comp(self.as_ptr(), &mut wc) };
        check_comp(ret, &wc)
    }
}

/// A blocking completion wait must hand back exactly one successful entry;
/// anything else is fatal to the connection.
fn check_comp(ret: i32, wc: &ibv_wc) -> io::Result<()> {
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    if ret == 0 {
        return Err(io::Error::other("completion wait returned no entry"));
    }
    if wc.status != ibv_wc_status::IBV_WC_SUCCESS {
        return Err(io::Error::other(format!(
            "work completion status {}",
            wc.status
        )));
    }
    Ok(())
}

impl Drop for CmId {
    fn drop(&mut self) {
        // The queue pair goes before the identifier that owns it.
        if self.has_qp() {
            log::debug!("rdma_destroy_qp");
            // SAFETY: call only once; the id is still valid here.
            unsafe { rdma_destroy_qp(self.as_ptr()) };
        }
        log::debug!("rdma_destroy_id");
        // SAFETY: call only once, and no use afterwards since `self` is
        // being dropped. Never panic in a destructor.
        let ret = unsafe { rdma_destroy_id(self.as_ptr()) };
        if let Err(e) = from_c_ret(ret) {
            log::warn!("failed to destroy CM identifier: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pingpong_caps() {
        let caps = QpCaps::pingpong();
        assert_eq!(caps.max_send_wr, 2);
        assert_eq!(caps.max_recv_wr, 2);
        assert_eq!(caps.max_send_sge, 1);
        assert_eq!(caps.max_recv_sge, 1);
        assert_eq!(QpCaps::default(), caps);
    }

    #[test]
    fn test_init_attr_profile() {
        let attr = QpCaps::pingpong().to_init_attr();
        assert_eq!(attr.cap.max_send_wr, 2);
        assert_eq!(attr.cap.max_recv_wr, 2);
        assert_eq!(attr.cap.max_send_sge, 1);
        assert_eq!(attr.cap.max_recv_sge, 1);
        assert_eq!(attr.qp_type, ibv_qp_type::IBV_QPT_RC);
        assert_eq!(attr.sq_sig_all, 1);
        assert!(attr.srq.is_null());
    }

    #[test]
    fn test_sockaddr_conversion() {
        let sa = sockaddr_in_of("192.168.0.1:7999".parse().unwrap());
        assert_eq!(sa.sin_family, libc::AF_INET as libc::sa_family_t);
        assert_eq!(u16::from_be(sa.sin_port), 7999);
        assert_eq!(
            sa.sin_addr.s_addr.to_ne_bytes(),
            [192, 168, 0, 1],
        );
    }
}
