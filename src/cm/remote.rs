//! Remote-buffer descriptors.

use std::mem;

/// Descriptor of a peer's registered memory: everything a one-sided READ or
/// WRITE needs to target it.
///
/// This is also the only wire payload of the exchange: 16 bytes, the 8-byte
/// address followed by the 4-byte access key and the 4-byte length. There is
/// no versioning, checksum, or magic number.
///
/// NOTE: fields travel in native byte order, exactly as the reference
/// protocol transmits them. Peers of differing endianness are not a
/// supported pairing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct RemoteBuf {
    pub addr: u64,
    pub rkey: u32,
    pub len: u32,
}

impl RemoteBuf {
    /// Size of the descriptor on the wire.
    pub const WIRE_SIZE: usize = mem::size_of::<Self>();

    /// Encode for transmission.
    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[..8].copy_from_slice(&self.addr.to_ne_bytes());
        out[8..12].copy_from_slice(&self.rkey.to_ne_bytes());
        out[12..].copy_from_slice(&self.len.to_ne_bytes());
        out
    }

    /// Decode a received descriptor.
    pub fn from_bytes(bytes: &[u8; Self::WIRE_SIZE]) -> Self {
        Self {
            addr: u64::from_ne_bytes(bytes[..8].try_into().unwrap()),
            rkey: u32::from_ne_bytes(bytes[8..12].try_into().unwrap()),
            len: u32::from_ne_bytes(bytes[12..].try_into().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use memoffset::offset_of;

    use super::*;

    #[test]
    fn test_wire_layout() {
        assert_eq!(RemoteBuf::WIRE_SIZE, 16);
        assert_eq!(offset_of!(RemoteBuf, addr), 0);
        assert_eq!(offset_of!(RemoteBuf, rkey), 8);
        assert_eq!(offset_of!(RemoteBuf, len), 12);
    }

    #[test]
    fn test_codec_round_trip() {
        let desc = RemoteBuf {
            addr: 0xdead_beef_0000_1000,
            rkey: 0x1234_5678,
            len: 4096,
        };
        assert_eq!(RemoteBuf::from_bytes(&desc.to_bytes()), desc);
    }

    #[test]
    fn test_encoding_matches_in_memory_layout() {
        // The wire form must be exactly the in-memory representation, since
        // the peer receives the struct's raw bytes.
        let desc = RemoteBuf {
            addr: 0x7f00_0000_0000,
            rkey: 42,
            len: 4096,
        };
        // SAFETY: `RemoteBuf` is `repr(C)` with no padding.
        let raw: [u8; 16] = unsafe { mem::transmute(desc) };
        assert_eq!(raw, desc.to_bytes());
    }
}
