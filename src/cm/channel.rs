//! Connection-manager event channel and events.

use std::io;
use std::mem;
use std::ptr::{self, NonNull};

use rdma_sys::*;

use super::id::CmId;
use crate::utils::interop::{from_c_ret, nonnull_or_errno};

/// Asynchronous notification stream for connection-manager events.
///
/// The multi-connection acceptor owns exactly one channel; identifiers are
/// migrated off it before a worker takes them over, so per-connection I/O
/// never touches the channel.
pub struct EventChannel {
    ch: NonNull<rdma_event_channel>,
}

// SAFETY: the channel is exclusively owned by the accept loop; the raw
// pointer merely hides that from the compiler.
unsafe impl Send for EventChannel {}

impl EventChannel {
    /// Create an event channel.
    pub fn new() -> io::Result<Self> {
        log::debug!("rdma_create_event_channel");
        // SAFETY: FFI.
        let ch = unsafe { rdma_create_event_channel() };
        Ok(Self {
            ch: nonnull_or_errno(ch)?,
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut rdma_event_channel {
        self.ch.as_ptr()
    }

    /// Block until the next event arrives.
    ///
    /// The underlying wait is a blocking read and comes back with
    /// `ErrorKind::Interrupted` when a signal lands; that is what lets a
    /// shutdown signal break the accept loop.
    pub fn wait(&self) -> io::Result<CmEvent> {
        log::debug!("rdma_get_cm_event");
        let mut ev = ptr::null_mut();
        // SAFETY: FFI.
        let ret = unsafe { rdma_get_cm_event(self.as_ptr(), &mut ev) };
        from_c_ret(ret)?;
        Ok(CmEvent {
            ev: nonnull_or_errno(ev)?,
            id_taken: false,
        })
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        log::debug!("rdma_destroy_event_channel");
        // SAFETY: call only once; every identifier created on this channel
        // has been destroyed or migrated off it by its owner.
        unsafe { rdma_destroy_event_channel(self.as_ptr()) };
    }
}

/// One connection-manager event.
///
/// An event blocks further reporting for its identifier until it is
/// acknowledged; dropping the event acknowledges it when [`CmEvent::ack`]
/// was not called explicitly.
pub struct CmEvent {
    ev: NonNull<rdma_cm_event>,
    id_taken: bool,
}

impl CmEvent {
    /// The event kind, comparable against [`rdma_cm_event_type`] values.
    pub fn kind(&self) -> rdma_cm_event_type::Type {
        // SAFETY: the event stays valid until acknowledged.
        unsafe { (*self.ev.as_ptr()).event }
    }

    /// The event status; zero means success.
    pub fn status(&self) -> i32 {
        // SAFETY: as for `kind`.
        unsafe { (*self.ev.as_ptr()).status }
    }

    /// Take ownership of the identifier a connect-request event carries.
    ///
    /// The identifier outlives the event; acknowledging the event does not
    /// release it. Returns `None` on a second call.
    pub fn take_id(&mut self) -> Option<CmId> {
        if self.id_taken {
            return None;
        }
        // SAFETY: as for `kind`; ownership of the id transfers to the
        // caller, who must not take it twice (guarded by `id_taken`).
        let id = unsafe { (*self.ev.as_ptr()).id };
        NonNull::new(id).map(|id| {
            self.id_taken = true;
            CmId::from_raw(id)
        })
    }

    /// Acknowledge the event, handing it back to the channel.
    pub fn ack(self) -> io::Result<()> {
        log::debug!("rdma_ack_cm_event");
        let ev = self.ev;
        mem::forget(self);
        // SAFETY: FFI; the event is never touched again.
        from_c_ret(unsafe { rdma_ack_cm_event(ev.as_ptr()) })
    }
}

impl Drop for CmEvent {
    fn drop(&mut self) {
        // SAFETY: call only once (`ack` forgets `self`). Never panic in a
        // destructor.
        let ret = unsafe { rdma_ack_cm_event(self.ev.as_ptr()) };
        if ret != 0 {
            log::warn!(
                "failed to acknowledge CM event: {}",
                io::Error::last_os_error()
            );
        }
    }
}
