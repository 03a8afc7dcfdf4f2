//! The exchange state machine.
//!
//! One run per connection, strictly sequential: every post is followed by a
//! blocking completion wait before the next protocol step. The initiator
//! publishes two descriptors (READ target, then WRITE target) as two
//! distinct messages; the responder performs the one-sided operations and
//! answers each phase with a bare acknowledgement send.

use std::borrow::Cow;

use crate::cm::RemoteBuf;
use crate::error::{Error, Verb};
use crate::pingpong::conn::Connection;

impl Connection {
    /// Drive the initiator side to completion.
    ///
    /// `ping` is copied into the read-data region before its descriptor is
    /// published; on success the write-data region holds whatever the peer
    /// wrote there.
    pub fn run_initiator(&mut self, ping: &[u8]) -> Result<(), Error> {
        // Stage the payload the peer will READ and publish where to find it.
        let n = ping.len().min(self.bufs.read_data().len());
        self.bufs.read_data_mut()[..n].copy_from_slice(&ping[..n]);
        let read_target = self.bufs.read_target();
        self.publish_descriptor(read_target)?;

        // Go-ahead: the peer's READ has completed.
        self.recv_signal()?;

        // Publish where the peer's WRITE should land.
        let write_target = self.bufs.write_target();
        self.publish_descriptor(write_target)?;

        // Final signal: the peer's WRITE has completed.
        self.recv_signal()?;

        log::info!("RDMA WRITE data: {}", printable(self.bufs.write_data()));
        Ok(())
    }

    /// Drive the responder side to completion.
    ///
    /// `pong` is the payload delivered into the initiator's WRITE target.
    pub fn run_responder(&mut self, pong: &[u8]) -> Result<(), Error> {
        // First descriptor: the initiator's READ source.
        let read_target = self.recv_descriptor()?;
        self.id
            .post_read(self.bufs.read_data(), &read_target)
            .map_err(|source| Error::Post {
                op: Verb::Read,
                source,
            })?;
        // One-sided operations complete on the send side.
        self.id
            .get_send_comp()
            .map_err(|source| Error::Completion {
                op: Verb::Read,
                source,
            })?;
        log::info!("RDMA READ data: {}", printable(self.bufs.read_data()));

        // Tell the initiator the READ is done.
        self.send_signal()?;

        // Second descriptor: the initiator's WRITE sink.
        let write_target = self.recv_descriptor()?;
        let n = pong.len().min(self.bufs.write_data().len());
        self.bufs.write_data_mut()[..n].copy_from_slice(&pong[..n]);
        self.id
            .post_write(self.bufs.write_data(), &write_target)
            .map_err(|source| Error::Post {
                op: Verb::Write,
                source,
            })?;
        self.id
            .get_send_comp()
            .map_err(|source| Error::Completion {
                op: Verb::Write,
                source,
            })?;

        // Tell the initiator the WRITE is done.
        self.send_signal()?;
        Ok(())
    }

    /// Wait for the standing receive to complete, decode the descriptor it
    /// delivered, and repost the receive for the next message.
    fn recv_descriptor(&mut self) -> Result<RemoteBuf, Error> {
        self.id
            .get_recv_comp()
            .map_err(|source| Error::Completion {
                op: Verb::Recv,
                source,
            })?;
        let mut wire = [0u8; RemoteBuf::WIRE_SIZE];
        wire.copy_from_slice(self.bufs.recv_desc());
        let desc = RemoteBuf::from_bytes(&wire);
        log::info!(
            "remote rkey {:x}, addr {:x}, len {}",
            desc.rkey,
            desc.addr,
            desc.len
        );
        self.repost_recv()?;
        Ok(desc)
    }

    /// Wait for a bare acknowledgement from the peer and repost the
    /// receive. The received content has no meaning.
    fn recv_signal(&mut self) -> Result<(), Error> {
        self.id
            .get_recv_comp()
            .map_err(|source| Error::Completion {
                op: Verb::Recv,
                source,
            })?;
        self.repost_recv()
    }

    fn repost_recv(&mut self) -> Result<(), Error> {
        self.id
            .post_recv(self.bufs.recv_desc())
            .map_err(|source| Error::Post {
                op: Verb::Recv,
                source,
            })
    }

    /// Serialize `desc` into the send-descriptor region, post the send, and
    /// wait for its completion.
    ///
    /// The region is a staging slot, not shared state: the blocking wait
    /// guarantees it is free again before the next message is staged.
    fn publish_descriptor(&mut self, desc: RemoteBuf) -> Result<(), Error> {
        self.bufs.send_desc_mut().copy_from_slice(&desc.to_bytes());
        self.send_and_wait()
    }

    /// Send whatever the send-descriptor region currently holds, as a bare
    /// liveness signal. The receiver ignores the content.
    fn send_signal(&mut self) -> Result<(), Error> {
        self.send_and_wait()
    }

    fn send_and_wait(&mut self) -> Result<(), Error> {
        self.id
            .post_send(self.bufs.send_desc())
            .map_err(|source| Error::Post {
                op: Verb::Send,
                source,
            })?;
        self.id.get_send_comp().map_err(|source| Error::Completion {
            op: Verb::Send,
            source,
        })
    }
}

/// Render a payload for logging the way the reference implementation's
/// `printf("%s")` did: stop at the first NUL, lossy UTF-8 for the rest.
fn printable(buf: &[u8]) -> Cow<'_, str> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_stops_at_nul() {
        let mut buf = [0u8; 16];
        buf[..3].copy_from_slice(b"aaa");
        assert_eq!(printable(&buf), "aaa");
    }

    #[test]
    fn test_printable_without_nul() {
        assert_eq!(printable(b"bbb"), "bbb");
    }

    #[test]
    fn test_printable_empty_and_leading_nul() {
        assert_eq!(printable(b""), "");
        assert_eq!(printable(b"\0aaa"), "");
    }

    #[test]
    fn test_printable_lossy() {
        assert_eq!(printable(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }
}
