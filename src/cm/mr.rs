//! Owned, registered memory buffers.

use std::io;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use rdma_sys::*;

use super::id::CmId;
use super::remote::RemoteBuf;
use crate::utils::interop::nonnull_or_errno;

/// A heap buffer owned together with its memory-region registration.
///
/// The registration references the buffer, so the two live and die as one
/// value: the backing storage cannot be freed, moved, or resized while the
/// region is registered, and deregistration happens exactly once, on drop.
/// Deregistration failures are reported and swallowed; teardown is best
/// effort and must not abort the rest of a connection's cleanup.
///
/// The region belongs to the protection domain of the identifier it was
/// registered on; drop it before that identifier.
pub struct RegisteredBuf {
    // The registration is released before the backing buffer is freed:
    // fields drop in declaration order.
    mr: NonNull<ibv_mr>,
    buf: Box<[u8]>,
}

// SAFETY: each buffer is exclusively owned by one connection, which is
// driven from one thread at a time.
unsafe impl Send for RegisteredBuf {}

impl RegisteredBuf {
    /// Allocate `len` zeroed bytes and register them for message (send and
    /// receive) access.
    pub fn register_msgs(id: &CmId, len: usize) -> io::Result<Self> {
        log::debug!("rdma_reg_msgs");
        let mut buf = vec![0u8; len].into_boxed_slice();
        // SAFETY: FFI; the boxed buffer is heap-pinned and owned by the
        // returned value together with its registration.
        let mr = unsafe { rdma_reg_msgs(id.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
        Ok(Self {
            mr: nonnull_or_errno(mr)?,
            buf,
        })
    }

    /// Allocate `len` zeroed bytes and register them as the target of
    /// peer-issued RDMA READs.
    pub fn register_read(id: &CmId, len: usize) -> io::Result<Self> {
        log::debug!("rdma_reg_read");
        let mut buf = vec![0u8; len].into_boxed_slice();
        // SAFETY: as for `register_msgs`.
        let mr = unsafe { rdma_reg_read(id.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
        Ok(Self {
            mr: nonnull_or_errno(mr)?,
            buf,
        })
    }

    /// Allocate `len` zeroed bytes and register them as the target of
    /// peer-issued RDMA WRITEs.
    pub fn register_write(id: &CmId, len: usize) -> io::Result<Self> {
        log::debug!("rdma_reg_write");
        let mut buf = vec![0u8; len].into_boxed_slice();
        // SAFETY: as for `register_msgs`.
        let mr = unsafe { rdma_reg_write(id.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
        Ok(Self {
            mr: nonnull_or_errno(mr)?,
            buf,
        })
    }

    /// Start address of the registered memory.
    #[inline]
    pub fn addr(&self) -> *mut u8 {
        self.buf.as_ptr() as *mut u8
    }

    /// Length of the registered memory.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Remote access key of the region.
    #[inline]
    pub fn rkey(&self) -> u32 {
        // SAFETY: the `ibv_mr` stays valid while `self` lives.
        unsafe { (*self.mr.as_ptr()).rkey }
    }

    /// The underlying `ibv_mr`, for posting work requests.
    #[inline]
    pub(crate) fn as_mr(&self) -> *mut ibv_mr {
        self.mr.as_ptr()
    }

    /// View this region as a descriptor a peer can target with one-sided
    /// operations.
    #[inline]
    pub fn as_remote(&self) -> RemoteBuf {
        RemoteBuf {
            addr: self.addr() as u64,
            rkey: self.rkey(),
            len: self.len() as u32,
        }
    }
}

impl Deref for RegisteredBuf {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for RegisteredBuf {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for RegisteredBuf {
    fn drop(&mut self) {
        log::debug!("rdma_dereg_mr");
        // SAFETY: call only once; the backing buffer is freed right after.
        let ret = unsafe { rdma_dereg_mr(self.mr.as_ptr()) };
        if ret != 0 {
            log::warn!(
                "failed to deregister memory region: {}",
                io::Error::last_os_error()
            );
        }
    }
}
