//! Version-keyed encode/decode for the handful of message bodies the core
//! behaviors need to understand directly: HELLO version negotiation,
//! FEATURES_REPLY's datapath id, ERROR payloads, and the multipart/stats
//! continuation flag. Every other OpenFlow structure is out of scope (see
//! crate docs) and is opaque `Frame` bytes to this crate.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::frame::Frame;
use crate::header::{Header, HEADER_LEN};
use crate::types::{error_type, hello_failed_code, msg_type};
use crate::xid::XidGenerator;

/// `OFPHET_VERSIONBITMAP` element subtype.
const VERSIONBITMAP_SUBTYPE: u16 = 1;

/// Build a HELLO frame advertising `accepted`. Versions `< 4` use the
/// 8-byte single-version form; `4` and above add a versionbitmap element,
/// per §4.2.
pub fn build_hello(accepted: &[u8], xid: u32) -> Frame {
    let max_version = *accepted.iter().max().unwrap_or(&1);
    if max_version < 4 {
        let header = Header::new(max_version, msg_type::HELLO, HEADER_LEN as u16, xid);
        return Frame::new(Bytes::copy_from_slice(&header.to_bytes()));
    }

    let word_count = max_version / 32 + 1;
    let mut words = vec![0u32; word_count as usize];
    for &v in accepted {
        words[(v / 32) as usize] |= 1 << (v % 32);
    }

    let element_len = 4 + words.len() * 4;
    // Elements are padded to a multiple of 8 bytes.
    let padded_element_len = element_len.div_ceil(8) * 8;
    let total_len = HEADER_LEN + padded_element_len;

    let mut out = BytesMut::with_capacity(total_len);
    Header::new(max_version, msg_type::HELLO, total_len as u16, xid).encode(&mut out);
    out.put_u16(VERSIONBITMAP_SUBTYPE);
    out.put_u16(element_len as u16);
    for word in &words {
        out.put_u32(*word);
    }
    out.resize(total_len, 0);

    Frame::new(out.freeze())
}

/// Parse the set of versions a HELLO advertises.
pub fn parse_hello_versions(frame: &Frame) -> Vec<u8> {
    let header = frame.header();
    if header.length as usize == HEADER_LEN {
        return vec![header.version];
    }

    let body = frame.body();
    if body.len() < 4 {
        return vec![header.version];
    }
    let mut buf = body;
    let subtype = buf.get_u16();
    let sub_length = buf.get_u16();
    if subtype != VERSIONBITMAP_SUBTYPE || sub_length < 4 {
        return vec![header.version];
    }

    let word_bytes = (sub_length as usize).saturating_sub(4);
    let mut versions = Vec::new();
    let mut offset = 0;
    while offset + 4 <= word_bytes && buf.remaining() >= 4 {
        let word = buf.get_u32();
        let word_index = (offset / 4) as u8;
        for bit in 0..32u8 {
            if word & (1 << bit) != 0 {
                versions.push(word_index * 32 + bit);
            }
        }
        offset += 4;
    }
    versions
}

/// Build the ERROR frame the handshake sends when no common version is
/// found: `type=HELLO_FAILED, code=INCOMPATIBLE`, body is a human-readable
/// description of the accepted versions.
pub fn build_hello_failed(version: u8, xid: u32, accepted: &[u8]) -> Frame {
    let text = format!(
        "no common version; accepted: {}",
        accepted
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    );
    build_error(version, xid, error_type::HELLO_FAILED, hello_failed_code::INCOMPATIBLE, text.as_bytes())
}

/// Build an `OFPT_ERROR` frame.
pub fn build_error(version: u8, xid: u32, typ: u16, code: u16, data: &[u8]) -> Frame {
    let total_len = HEADER_LEN + 4 + data.len();
    let mut out = BytesMut::with_capacity(total_len);
    Header::new(version, msg_type::ERROR, total_len as u16, xid).encode(&mut out);
    out.put_u16(typ);
    out.put_u16(code);
    out.extend_from_slice(data);
    Frame::new(out.freeze())
}

/// Parsed `OFPT_ERROR` body.
pub struct ErrorPayload {
    pub typ: u16,
    pub code: u16,
    pub data: Bytes,
}

pub fn parse_error(frame: &Frame) -> Option<ErrorPayload> {
    if frame.typ() != msg_type::ERROR {
        return None;
    }
    let body = frame.body();
    if body.len() < 4 {
        return None;
    }
    let mut buf = body;
    let typ = buf.get_u16();
    let code = buf.get_u16();
    Some(ErrorPayload {
        typ,
        code,
        data: Bytes::copy_from_slice(buf),
    })
}

/// Build an ECHO_REPLY that mirrors an ECHO_REQUEST's xid and payload.
pub fn build_echo_reply(request: &Frame) -> Frame {
    let header = request.header();
    let mut out = BytesMut::with_capacity(request.len());
    Header::new(header.version, msg_type::ECHO_REPLY, header.length, header.xid).encode(&mut out);
    out.extend_from_slice(request.body());
    Frame::new(out.freeze())
}

/// `(datapath_id, auxiliary_id)` from a FEATURES_REPLY. The auxiliary id
/// byte only exists from v1.3 (wire version 4) on; the offset is derived
/// from the version rather than hard-coded per call site.
pub fn parse_features_reply(frame: &Frame) -> Option<(u64, Option<u8>)> {
    if frame.typ() != msg_type::FEATURES_REPLY {
        return None;
    }
    let body = frame.body();
    if body.len() < 8 {
        return None;
    }
    let datapath_id = (&body[0..8]).get_u64();
    let auxiliary_id = if has_auxiliary_id(frame.version()) && body.len() >= 14 {
        Some(body[13])
    } else {
        None
    };
    Some((datapath_id, auxiliary_id))
}

/// Whether `version`'s FEATURES_REPLY carries an `auxiliary_id` byte
/// (true from OpenFlow 1.3, wire version 4, onward).
pub fn has_auxiliary_id(version: u8) -> bool {
    version >= 4
}

/// The "more fragments follow" flag, read from the fixed offset (10) shared
/// by both the v1.0 `ofp_stats_request/reply` and the v1.1+
/// `ofp_multipart_request/reply` header layouts.
pub fn multipart_more(frame: &Frame) -> bool {
    let bytes = frame.as_bytes();
    if bytes.len() < 12 {
        return false;
    }
    let flags = u16::from_be_bytes([bytes[10], bytes[11]]);
    flags & crate::types::MULTIPART_FLAG_MORE != 0
}

/// The multipart/stats `type` subfield (offset 8), e.g. `OFPMP_PORT_DESC`.
pub fn multipart_type(frame: &Frame) -> Option<u16> {
    let bytes = frame.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    Some(u16::from_be_bytes([bytes[8], bytes[9]]))
}

/// Build a bare MULTIPART_REQUEST/STATS_REQUEST header with the given
/// `mp_type` and no body (used for `OFPMP_PORT_DESC`).
pub fn build_multipart_request(version: u8, mp_type: u16, xid: u32) -> Frame {
    let total_len = HEADER_LEN + 8;
    let mut out = BytesMut::with_capacity(total_len);
    Header::new(
        version,
        crate::types::multipart_request_type(version),
        total_len as u16,
        xid,
    )
    .encode(&mut out);
    out.put_u16(mp_type);
    out.put_u16(0); // flags
    out.put_u32(0); // pad
    Frame::new(out.freeze())
}

/// Allocate a fresh xid and build a `BARRIER_REQUEST` for `version`.
pub fn build_barrier_request(version: u8, xids: &XidGenerator) -> Frame {
    let xid = xids.next_xid();
    build_barrier_request_with_xid(version, xid)
}

/// Build a `BARRIER_REQUEST` for `version` with a caller-supplied xid (used
/// when the xid must be known before the frame is built, e.g. to register a
/// sync tracker or sequencer entry ahead of the send).
pub fn build_barrier_request_with_xid(version: u8, xid: u32) -> Frame {
    crate::frame::header_only(version, crate::types::barrier_request_type(version), xid)
}

/// Byte offset (relative to [`Frame::body`]) where a `MULTIPART_REPLY`'s
/// payload begins, past its own `type:u16, flags:u16, pad:4` subheader.
pub const MULTIPART_BODY_HEADER_LEN: usize = 8;

/// Byte offset (relative to [`Frame::body`]) where the port list embedded in
/// a pre-1.3 `FEATURES_REPLY` begins: `datapath_id:8, n_buffers:4,
/// n_tables:1, pad:3, capabilities:4, actions:4`.
pub const FEATURES_REPLY_PORT_LIST_OFFSET: usize = 24;

/// Byte offset (relative to [`Frame::body`]) where the `ofp_port` record
/// embedded in a `PORT_STATUS` message begins, past `reason:1, pad:7`.
pub const PORT_STATUS_PORT_OFFSET: usize = 8;

/// The `reason` byte (offset 0) of a `PORT_STATUS` body.
pub fn port_status_reason(frame: &Frame) -> Option<u8> {
    frame.body().first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_pre_1_3_is_bare_header() {
        let frame = build_hello(&[1], 5);
        assert_eq!(frame.len(), HEADER_LEN);
        assert_eq!(parse_hello_versions(&frame), vec![1]);
    }

    #[test]
    fn hello_1_3_plus_round_trips_versionbitmap() {
        let frame = build_hello(&[1, 4, 5], 9);
        let mut versions = parse_hello_versions(&frame);
        versions.sort();
        assert_eq!(versions, vec![1, 4, 5]);
    }

    #[test]
    fn echo_reply_mirrors_xid_and_payload() {
        let header = Header::new(4, msg_type::ECHO_REQUEST, (HEADER_LEN + 3) as u16, 42);
        let mut bytes = BytesMut::new();
        header.encode(&mut bytes);
        bytes.extend_from_slice(b"abc");
        let request = Frame::new(bytes.freeze());

        let reply = build_echo_reply(&request);
        assert_eq!(reply.typ(), msg_type::ECHO_REPLY);
        assert_eq!(reply.xid(), 42);
        assert_eq!(reply.body(), b"abc");
    }

    #[test]
    fn features_reply_parses_auxiliary_only_from_v4() {
        let mut v1 = BytesMut::new();
        Header::new(1, msg_type::FEATURES_REPLY, (HEADER_LEN + 8) as u16, 1).encode(&mut v1);
        v1.put_u64(0xabcd);
        let (dpid, aux) = parse_features_reply(&Frame::new(v1.freeze())).unwrap();
        assert_eq!(dpid, 0xabcd);
        assert_eq!(aux, None);

        let mut v4 = BytesMut::new();
        Header::new(4, msg_type::FEATURES_REPLY, (HEADER_LEN + 24) as u16, 1).encode(&mut v4);
        v4.put_u64(0xabcd);
        v4.put_u32(256); // n_buffers
        v4.put_u8(4); // n_tables
        v4.put_u8(7); // auxiliary_id
        v4.put_u16(0); // pad
        v4.put_u32(0);
        v4.put_u32(0);
        let (dpid, aux) = parse_features_reply(&Frame::new(v4.freeze())).unwrap();
        assert_eq!(dpid, 0xabcd);
        assert_eq!(aux, Some(7));
    }

    #[test]
    fn multipart_more_reads_fixed_offset() {
        let mut bytes = BytesMut::new();
        Header::new(4, msg_type::MULTIPART_REPLY, (HEADER_LEN + 4) as u16, 1).encode(&mut bytes);
        bytes.put_u16(13);
        bytes.put_u16(1); // flags = MORE
        let frame = Frame::new(bytes.freeze());
        assert!(multipart_more(&frame));
        assert_eq!(multipart_type(&frame), Some(13));
    }
}
