//! The 8-byte `ofp_header` every OpenFlow message begins with.

use bytes::{Buf, BufMut};

/// Length in bytes of the OpenFlow message header.
pub const HEADER_LEN: usize = 8;

/// `(version, type, length, xid)` parsed from the front of a message.
///
/// All multi-byte fields are big-endian on the wire; this struct holds them
/// in host order once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub typ: u8,
    pub length: u16,
    pub xid: u32,
}

impl Header {
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> Self {
        Self {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Parse a header from the first 8 bytes of `bytes`.
    ///
    /// Panics if `bytes` is shorter than [`HEADER_LEN`]; callers that haven't
    /// already checked the length should use [`Header::try_parse`].
    pub fn parse(bytes: &[u8]) -> Self {
        Self::try_parse(bytes).expect("at least HEADER_LEN bytes")
    }

    pub fn try_parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let mut buf = bytes;
        let version = buf.get_u8();
        let typ = buf.get_u8();
        let length = buf.get_u16();
        let xid = buf.get_u32();
        Some(Self {
            version,
            typ,
            length,
            xid,
        })
    }

    /// Encode just the 8-byte header (no body) into `out`.
    pub fn encode(&self, out: &mut impl BufMut) {
        out.put_u8(self.version);
        out.put_u8(self.typ);
        out.put_u16(self.length);
        out.put_u32(self.xid);
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let mut cursor = &mut buf[..];
        self.encode(&mut cursor);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bit_exactly() {
        let h = Header::new(4, 6, 0x00ff, 0xdead_beef);
        let bytes = h.to_bytes();
        let parsed = Header::try_parse(&bytes).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn rejects_short_input() {
        assert!(Header::try_parse(&[0u8; 7]).is_none());
    }
}
