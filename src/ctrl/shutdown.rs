//! Cooperative shutdown signalling.

use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::utils::interop::from_c_ret;

/// Shared flag the accept loop consults between blocking waits.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

/// Slot the signal handler reads from; a handler cannot capture state.
static SIGINT_FLAG: OnceLock<Shutdown> = OnceLock::new();

extern "C" fn handle_sigint(_: libc::c_int) {
    // Only async-signal-safe operations are allowed here; an atomic store
    // qualifies.
    if let Some(shutdown) = SIGINT_FLAG.get() {
        shutdown.flag.store(true, Ordering::SeqCst);
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Arrange for SIGINT to trigger this flag.
    ///
    /// NOTE: the handler is installed through `sigaction` without
    /// `SA_RESTART`, so a blocked system call (the event-channel wait)
    /// comes back with EINTR after the signal is caught instead of being
    /// transparently restarted.
    pub fn on_sigint(&self) -> io::Result<()> {
        SIGINT_FLAG.set(self.clone()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a SIGINT handler is already installed",
            )
        })?;

        // SAFETY: POD type.
        let mut act = unsafe { mem::zeroed::<libc::sigaction>() };
        let handler: extern "C" fn(libc::c_int) = handle_sigint;
        act.sa_sigaction = handler as libc::sighandler_t;
        act.sa_flags = 0;
        // SAFETY: FFI; `act` lives across both calls.
        unsafe { libc::sigemptyset(&mut act.sa_mask) };
        from_c_ret(unsafe { libc::sigaction(libc::SIGINT, &act, ptr::null_mut()) })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_trigger_is_visible_across_threads() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        let observer = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                while !shutdown.is_triggered() {
                    thread::yield_now();
                }
            })
        };

        shutdown.trigger();
        observer.join().unwrap();
        assert!(shutdown.is_triggered());
    }
}
