//! Safe wrappers over the rdma_cm connection manager and the verbs calls
//! the exchange needs.
//!
//! Every resource holder owns exactly one underlying C object and releases
//! it on drop; teardown never needs conditional pointer bookkeeping in the
//! layers above.

pub mod addrinfo;
pub mod channel;
pub mod id;
pub mod mr;
pub mod remote;

pub use addrinfo::AddrInfo;
pub use channel::{CmEvent, EventChannel};
pub use id::{CmId, QpCaps};
pub use mr::RegisteredBuf;
pub use remote::RemoteBuf;
