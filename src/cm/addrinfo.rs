//! RDMA address-information resolution.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::raw::c_char;
use std::ptr::{self, NonNull};

use rdma_sys::*;

use crate::utils::interop::{from_c_ret, nonnull_or_errno};

/// Resolved RDMA address information, for endpoint creation.
///
/// The passive flavor resolves a bind address for a listener; the active
/// flavor resolves a connect destination.
pub struct AddrInfo {
    ai: NonNull<rdma_addrinfo>,
}

impl AddrInfo {
    /// Resolve `node`/`service` in the TCP port space.
    pub fn resolve(node: &str, service: &str, passive: bool) -> io::Result<Self> {
        log::debug!("rdma_getaddrinfo {node}:{service}");
        let invalid = |e| io::Error::new(io::ErrorKind::InvalidInput, e);
        let node = CString::new(node).map_err(invalid)?;
        let service = CString::new(service).map_err(invalid)?;

        // SAFETY: POD type.
        let mut hints = unsafe { mem::zeroed::<rdma_addrinfo>() };
        hints.ai_port_space = rdma_port_space::RDMA_PS_TCP as _;
        if passive {
            hints.ai_flags = RAI_PASSIVE as _;
        }

        let mut res = ptr::null_mut();
        // SAFETY: FFI; every pointer lives across the call.
        let ret = unsafe {
            rdma_getaddrinfo(
                node.as_ptr() as *mut c_char,
                service.as_ptr() as *mut c_char,
                &mut hints,
                &mut res,
            )
        };
        from_c_ret(ret)?;
        Ok(Self {
            ai: nonnull_or_errno(res)?,
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut rdma_addrinfo {
        self.ai.as_ptr()
    }
}

impl Drop for AddrInfo {
    fn drop(&mut self) {
        log::debug!("rdma_freeaddrinfo");
        // SAFETY: call only once.
        unsafe { rdma_freeaddrinfo(self.as_ptr()) };
    }
}
