//! The [`Frame`]: an immutable, cheaply-cloneable unit of transfer.

use bytes::Bytes;

use crate::header::{Header, HEADER_LEN};

/// A complete OpenFlow message: header plus body, sharing one backing
/// allocation. Frames are cheap to clone (an `Arc`-refcounted `Bytes` bump)
/// so the same frame can be handed to a sequencer callback, a sync tracker,
/// and broadcast to monitor children without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Wrap `bytes` as a frame. Does not validate; use [`Frame::try_new`] for
    /// untrusted input.
    pub fn new(bytes: Bytes) -> Self {
        debug_assert!(bytes.len() >= HEADER_LEN);
        Self { bytes }
    }

    /// Validate that `bytes` is at least a header and that its declared
    /// length matches the buffer length.
    pub fn try_new(bytes: Bytes) -> Option<Self> {
        let header = Header::try_parse(&bytes)?;
        if header.length as usize != bytes.len() {
            return None;
        }
        Some(Self { bytes })
    }

    pub fn header(&self) -> Header {
        Header::parse(&self.bytes)
    }

    pub fn version(&self) -> u8 {
        self.bytes[0]
    }

    pub fn typ(&self) -> u8 {
        self.bytes[1]
    }

    pub fn xid(&self) -> u32 {
        self.header().xid
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The message body, i.e. everything past the 8-byte header.
    pub fn body(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Build a bare 8-byte message (no body) with the given type, version and
/// xid — used for HELLO-less requests like `FEATURES_REQUEST` or
/// `BARRIER_REQUEST`.
pub fn header_only(version: u8, typ: u8, xid: u32) -> Frame {
    let header = Header::new(version, typ, HEADER_LEN as u16, xid);
    Frame::new(Bytes::copy_from_slice(&header.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only_round_trips() {
        let f = header_only(4, 20, 7);
        assert_eq!(f.version(), 4);
        assert_eq!(f.typ(), 20);
        assert_eq!(f.xid(), 7);
        assert_eq!(f.len(), HEADER_LEN);
    }

    #[test]
    fn try_new_rejects_length_mismatch() {
        let mut bytes = header_only(1, 0, 1).into_bytes().to_vec();
        bytes[2] = 0;
        bytes[3] = 9; // claims length=9 but buffer is 8 bytes
        assert!(Frame::try_new(Bytes::from(bytes)).is_none());
    }
}
