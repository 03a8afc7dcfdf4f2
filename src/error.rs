//! Crate-wide error taxonomy.
//!
//! Every failure names the protocol step it occurred in. There are no
//! retries anywhere in the crate: a connection-scoped error aborts that
//! connection, an acceptor-scoped error aborts the acceptor.

use std::fmt;
use std::io;

use thiserror::Error;

/// The data-plane operation a post or completion error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Send,
    Recv,
    Read,
    Write,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verb::Send => "send",
            Verb::Recv => "recv",
            Verb::Read => "RDMA read",
            Verb::Write => "RDMA write",
        })
    }
}

/// Errors produced by connection establishment, buffer registration, the
/// exchange engine, and the acceptor.
#[derive(Debug, Error)]
pub enum Error {
    /// Peer address resolution did not complete within its bounded wait.
    #[error("failed to resolve peer address")]
    AddressResolution(#[source] io::Error),

    /// Route resolution did not complete within its bounded wait.
    #[error("failed to resolve route to peer")]
    RouteResolution(#[source] io::Error),

    /// Creating a CM identifier, event channel, queue pair, or listening
    /// endpoint failed (includes bind and listen).
    #[error("failed to create endpoint")]
    EndpointCreation(#[source] io::Error),

    /// The connect handshake failed.
    #[error("failed to connect to peer")]
    Connect(#[source] io::Error),

    /// Accepting an incoming connection failed (request retrieval, accept,
    /// event-channel migration, or worker dispatch).
    #[error("failed to accept connection")]
    Accept(#[source] io::Error),

    /// One of the four buffer registrations failed. Regions registered
    /// earlier in the same call have already been released.
    #[error("failed to register {region} region")]
    Registration {
        region: &'static str,
        #[source]
        source: io::Error,
    },

    /// Posting a work request failed.
    #[error("failed to post {op}")]
    Post {
        op: Verb,
        #[source]
        source: io::Error,
    },

    /// Waiting for a completion failed, returned a non-positive count, or
    /// the work completion carried a failure status.
    #[error("failed while waiting for {op} completion")]
    Completion {
        op: Verb,
        #[source]
        source: io::Error,
    },

    /// The acceptor saw a connection-manager event with a failure status.
    #[error("connection-manager event carried status {0}")]
    EventStatus(i32),

    /// The acceptor saw an event other than a connect request.
    #[error("unexpected connection-manager event {got} (want connect request)")]
    UnexpectedEvent { got: u32 },

    /// The event channel itself failed.
    #[error("connection-manager event channel failed")]
    EventChannel(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_step() {
        let err = Error::Registration {
            region: "read-data",
            source: io::Error::from_raw_os_error(libc::ENOMEM),
        };
        assert_eq!(err.to_string(), "failed to register read-data region");

        let err = Error::Post {
            op: Verb::Write,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert_eq!(err.to_string(), "failed to post RDMA write");

        let err = Error::UnexpectedEvent { got: 9 };
        assert!(err.to_string().contains("connect request"));
    }

    #[test]
    fn test_source_is_preserved() {
        use std::error::Error as _;

        let err = Error::Connect(io::Error::from_raw_os_error(libc::ECONNREFUSED));
        let source = err.source().unwrap();
        assert_eq!(
            source.downcast_ref::<io::Error>().unwrap().raw_os_error(),
            Some(libc::ECONNREFUSED)
        );
    }
}
