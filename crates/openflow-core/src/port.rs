//! `ofp_port` parsing. Layout depends on the negotiated version:
//!
//! - v1.0: `H6s16s8I` (`port_no:u16`, 6-byte hw_addr, 16-byte name, then 8 u32 fields)
//! - v1.2-v1.4 (wire 2-4): `I4x6s2x16s10I` (`port_no:u32` + padding, ...)
//! - v1.5 (wire 5): `IH2x6s2x6sII` followed by variable-length properties,
//!   using an explicit per-port `length` field rather than a fixed stride.

use bytes::{Buf, Bytes};

/// A switch port, normalized across wire versions. Fields the older wire
/// formats don't carry are left at their default (zero / empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub port_no: u32,
    pub hw_addr: [u8; 6],
    pub name: String,
    pub config: u32,
    pub state: u32,
    pub curr: u32,
    pub advertised: u32,
    pub supported: u32,
    pub peer: u32,
    pub curr_speed: u32,
    pub max_speed: u32,
}

impl PortEntry {
    /// Key equality with `port_no`.
    pub fn has_port_no(&self, port_no: u32) -> bool {
        self.port_no == port_no
    }

    /// Key equality with `name`.
    pub fn has_name(&self, name: &str) -> bool {
        self.name == name
    }
}

fn trim_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Byte length of one fixed-size `ofp_port` record for `version`, or `None`
/// for v1.5's variable-length record (read its `length` field instead).
fn fixed_port_len(version: u8) -> Option<usize> {
    match version {
        1 => Some(2 + 6 + 16 + 8 * 4), // H 6s 16s 8I = 56
        2..=4 => Some(4 + 4 + 6 + 2 + 16 + 8 * 4), // I 4x 6s 2x 16s 8I = 64
        _ => None,
    }
}

/// Parse one `ofp_port` record at the front of `buf` for `version`, returning
/// the entry and the number of bytes consumed.
pub fn parse_port(version: u8, buf: &[u8]) -> Option<(PortEntry, usize)> {
    match version {
        1 => parse_port_v1(buf),
        2..=4 => parse_port_v2_v4(buf),
        _ => parse_port_v5(buf),
    }
}

fn parse_port_v1(buf: &[u8]) -> Option<(PortEntry, usize)> {
    let len = fixed_port_len(1).unwrap();
    if buf.len() < len {
        return None;
    }
    let mut cur = buf;
    let port_no = cur.get_u16() as u32;
    let mut hw_addr = [0u8; 6];
    hw_addr.copy_from_slice(&cur[..6]);
    cur.advance(6);
    let name = trim_name(&cur[..16]);
    cur.advance(16);
    let config = cur.get_u32();
    let state = cur.get_u32();
    let curr = cur.get_u32();
    let advertised = cur.get_u32();
    let supported = cur.get_u32();
    let peer = cur.get_u32();
    let curr_speed = cur.get_u32();
    let max_speed = cur.get_u32();
    Some((
        PortEntry {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
            curr_speed,
            max_speed,
        },
        len,
    ))
}

fn parse_port_v2_v4(buf: &[u8]) -> Option<(PortEntry, usize)> {
    let len = fixed_port_len(2).unwrap();
    if buf.len() < len {
        return None;
    }
    let mut cur = buf;
    let port_no = cur.get_u32();
    cur.advance(4); // pad
    let mut hw_addr = [0u8; 6];
    hw_addr.copy_from_slice(&cur[..6]);
    cur.advance(6);
    cur.advance(2); // pad
    let name = trim_name(&cur[..16]);
    cur.advance(16);
    let config = cur.get_u32();
    let state = cur.get_u32();
    let curr = cur.get_u32();
    let advertised = cur.get_u32();
    let supported = cur.get_u32();
    let peer = cur.get_u32();
    let curr_speed = cur.get_u32();
    let max_speed = cur.get_u32();
    Some((
        PortEntry {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
            curr_speed,
            max_speed,
        },
        len,
    ))
}

/// v1.5 ports are TLV-followed (`IH2x6s2x6sII` then `ofp_port_desc_prop`
/// entries) so, unlike the earlier fixed layouts, the per-port `length`
/// field - not a hardcoded stride - tells us how many bytes to skip.
fn parse_port_v5(buf: &[u8]) -> Option<(PortEntry, usize)> {
    const HEAD_LEN: usize = 4 + 2 + 2 + 6 + 2 + 6 + 4 + 4;
    if buf.len() < HEAD_LEN {
        return None;
    }
    let mut cur = buf;
    let port_no = cur.get_u32();
    let length = cur.get_u16() as usize;
    cur.advance(2); // pad
    let mut hw_addr = [0u8; 6];
    hw_addr.copy_from_slice(&cur[..6]);
    cur.advance(6);
    cur.advance(2); // pad
    let name = trim_name(&cur[..6]);
    cur.advance(6);
    let config = cur.get_u32();
    let state = cur.get_u32();

    let length = length.max(HEAD_LEN);
    if buf.len() < length {
        return None;
    }

    Some((
        PortEntry {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr: 0,
            advertised: 0,
            supported: 0,
            peer: 0,
            curr_speed: 0,
            max_speed: 0,
        },
        length,
    ))
}

/// Parse every `ofp_port` record in `body`, stopping cleanly at the end of
/// the buffer (a record that doesn't fully fit is dropped, which can only
/// happen on a malformed switch reply).
pub fn parse_ports(version: u8, body: &[u8]) -> Vec<PortEntry> {
    let mut ports = Vec::new();
    let mut offset = 0;
    while offset < body.len() {
        match parse_port(version, &body[offset..]) {
            Some((port, consumed)) if consumed > 0 => {
                ports.push(port);
                offset += consumed;
            }
            _ => break,
        }
    }
    ports
}

/// Re-encode a port's 16-byte (or 6-byte for v1.5) zero-padded name field.
pub fn encode_name(name: &str, width: usize) -> Bytes {
    let mut buf = vec![0u8; width];
    let src = name.as_bytes();
    let n = src.len().min(width);
    buf[..n].copy_from_slice(&src[..n]);
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_name(out: &mut Vec<u8>, name: &str, width: usize) {
        let mut buf = vec![0u8; width];
        let bytes = name.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        out.extend_from_slice(&buf);
    }

    #[test]
    fn parses_v1_port_and_trims_name() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&[0xaa; 6]);
        push_name(&mut buf, "eth0", 16);
        for _ in 0..8 {
            buf.extend_from_slice(&0u32.to_be_bytes());
        }
        let (port, consumed) = parse_port(1, &buf).unwrap();
        assert_eq!(consumed, 56);
        assert_eq!(port.port_no, 1);
        assert_eq!(port.name, "eth0");
        assert_eq!(port.hw_addr, [0xaa; 6]);
    }

    #[test]
    fn parses_two_v4_ports_back_to_back() {
        let mut buf = Vec::new();
        for (no, name) in [(1u32, "eth0"), (2u32, "eth1")] {
            buf.extend_from_slice(&no.to_be_bytes());
            buf.extend_from_slice(&[0u8; 4]);
            buf.extend_from_slice(&[0xbb; 6]);
            buf.extend_from_slice(&[0u8; 2]);
            push_name(&mut buf, name, 16);
            for _ in 0..8 {
                buf.extend_from_slice(&0u32.to_be_bytes());
            }
        }
        let ports = parse_ports(4, &buf);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].name, "eth0");
        assert_eq!(ports[1].name, "eth1");
        assert_eq!(ports[1].port_no, 2);
    }
}
