//! Per-connection buffer set.

use crate::cm::{CmId, RegisteredBuf, RemoteBuf};
use crate::error::Error;

/// Size of the bulk-data regions.
pub const DATA_SIZE: usize = 4096;

/// The four registered regions one connection exchanges through.
///
/// Registration order is fixed: recv-descriptor, send-descriptor,
/// read-data, write-data. Registration is all-or-nothing: when a region
/// fails to register, the regions registered before it are released before
/// the error propagates, so a failed set never leaks a registration.
pub struct BufferSet {
    // Fields drop in declaration order: teardown deregisters in reverse
    // order of registration.
    write_data: RegisteredBuf,
    read_data: RegisteredBuf,
    send_desc: RegisteredBuf,
    recv_desc: RegisteredBuf,
}

impl BufferSet {
    /// Register all four regions on `id`.
    pub fn register(id: &CmId) -> Result<Self, Error> {
        // An early return drops whatever was registered before the failure.
        let recv_desc =
            RegisteredBuf::register_msgs(id, RemoteBuf::WIRE_SIZE).map_err(|source| {
                Error::Registration {
                    region: "recv-descriptor",
                    source,
                }
            })?;
        let send_desc =
            RegisteredBuf::register_msgs(id, RemoteBuf::WIRE_SIZE).map_err(|source| {
                Error::Registration {
                    region: "send-descriptor",
                    source,
                }
            })?;
        let read_data = RegisteredBuf::register_read(id, DATA_SIZE).map_err(|source| {
            Error::Registration {
                region: "read-data",
                source,
            }
        })?;
        let write_data = RegisteredBuf::register_write(id, DATA_SIZE).map_err(|source| {
            Error::Registration {
                region: "write-data",
                source,
            }
        })?;

        Ok(Self {
            write_data,
            read_data,
            send_desc,
            recv_desc,
        })
    }

    /// Region the standing receive lands descriptors and signals in.
    pub fn recv_desc(&self) -> &RegisteredBuf {
        &self.recv_desc
    }

    /// Region outgoing descriptors and signals are staged in.
    pub fn send_desc(&self) -> &RegisteredBuf {
        &self.send_desc
    }

    pub fn send_desc_mut(&mut self) -> &mut RegisteredBuf {
        &mut self.send_desc
    }

    /// Local landing buffer of the responder's RDMA READ; on the initiator,
    /// the region the peer reads the ping payload from.
    pub fn read_data(&self) -> &RegisteredBuf {
        &self.read_data
    }

    pub fn read_data_mut(&mut self) -> &mut RegisteredBuf {
        &mut self.read_data
    }

    /// Source buffer of the responder's RDMA WRITE; on the initiator, the
    /// region the peer writes the pong payload into.
    pub fn write_data(&self) -> &RegisteredBuf {
        &self.write_data
    }

    pub fn write_data_mut(&mut self) -> &mut RegisteredBuf {
        &mut self.write_data
    }

    /// Descriptor the initiator publishes for the peer's RDMA READ.
    pub fn read_target(&self) -> RemoteBuf {
        self.read_data.as_remote()
    }

    /// Descriptor the initiator publishes for the peer's RDMA WRITE.
    pub fn write_target(&self) -> RemoteBuf {
        self.write_data.as_remote()
    }
}
