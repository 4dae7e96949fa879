//! Scripted frame builders: encode the switch-side messages the higher-level
//! behavior tests need (`FEATURES_REPLY`, `MULTIPART_REPLY`, `PORT_STATUS`),
//! beyond the handful `openflow_core::codec` decodes directly. Mirrors the
//! hand-rolled construction in `openflow_core::codec`'s own test module,
//! since a scripted peer needs to build what the real protocol only ever
//! needs to read.

use bytes::{BufMut, Bytes, BytesMut};

use openflow_core::{codec, port, types, Frame, Header, HEADER_LEN};

/// A port to embed in a scripted `FEATURES_REPLY`, `MULTIPART_REPLY`
/// (`PORT_DESC`), or `PORT_STATUS`. Fields beyond `port_no`/`name` default to
/// zero, which is enough for every testable property the port monitor checks
/// (identity via `port_no`/`name`, not link state).
pub struct ScriptedPort {
    pub port_no: u32,
    pub hw_addr: [u8; 6],
    pub name: String,
    pub config: u32,
    pub state: u32,
}

impl ScriptedPort {
    pub fn new(port_no: u32, name: impl Into<String>) -> Self {
        Self {
            port_no,
            hw_addr: [0; 6],
            name: name.into(),
            config: 0,
            state: 0,
        }
    }
}

fn encode_port(version: u8, port: &ScriptedPort) -> Bytes {
    match version {
        1 => encode_port_v1(port),
        2..=4 => encode_port_v2_v4(port),
        _ => encode_port_v5(port),
    }
}

fn encode_port_v1(p: &ScriptedPort) -> Bytes {
    let mut out = BytesMut::with_capacity(56);
    out.put_u16(p.port_no as u16);
    out.extend_from_slice(&p.hw_addr);
    out.extend_from_slice(&port::encode_name(&p.name, 16));
    out.put_u32(p.config);
    out.put_u32(p.state);
    for _ in 0..6 {
        out.put_u32(0);
    }
    out.freeze()
}

fn encode_port_v2_v4(p: &ScriptedPort) -> Bytes {
    let mut out = BytesMut::with_capacity(64);
    out.put_u32(p.port_no);
    out.put_u32(0); // pad
    out.extend_from_slice(&p.hw_addr);
    out.put_u16(0); // pad
    out.extend_from_slice(&port::encode_name(&p.name, 16));
    out.put_u32(p.config);
    out.put_u32(p.state);
    for _ in 0..6 {
        out.put_u32(0);
    }
    out.freeze()
}

fn encode_port_v5(p: &ScriptedPort) -> Bytes {
    const HEAD_LEN: u16 = 4 + 2 + 2 + 6 + 2 + 6 + 4 + 4;
    let mut out = BytesMut::with_capacity(HEAD_LEN as usize);
    out.put_u32(p.port_no);
    out.put_u16(HEAD_LEN);
    out.put_u16(0); // pad
    out.extend_from_slice(&p.hw_addr);
    out.put_u16(0); // pad
    out.extend_from_slice(&port::encode_name(&p.name, 6));
    out.put_u32(p.config);
    out.put_u32(p.state);
    out.freeze()
}

/// Encode every port back to back, as embedded in a `FEATURES_REPLY` body or
/// a `PORT_DESC` multipart reply fragment.
pub fn encode_ports(version: u8, ports: &[ScriptedPort]) -> Bytes {
    let mut out = BytesMut::new();
    for p in ports {
        out.extend_from_slice(&encode_port(version, p));
    }
    out.freeze()
}

/// Build a `FEATURES_REPLY` with an embedded port list, for the pre-1.3
/// (`version < 4`) `fetch_via_features` path.
pub fn features_reply(
    version: u8,
    xid: u32,
    datapath_id: u64,
    auxiliary_id: Option<u8>,
    ports: &[ScriptedPort],
) -> Frame {
    let mut body = BytesMut::new();
    body.put_u64(datapath_id);
    body.put_u32(0); // n_buffers
    body.put_u8(0); // n_tables
    body.put_u8(auxiliary_id.unwrap_or(0));
    body.put_u16(0); // pad
    body.put_u32(0); // capabilities
    body.put_u32(0); // actions
    debug_assert_eq!(body.len(), codec::FEATURES_REPLY_PORT_LIST_OFFSET);
    body.extend_from_slice(&encode_ports(version, ports));

    let total_len = HEADER_LEN + body.len();
    let mut out = BytesMut::with_capacity(total_len);
    Header::new(version, types::msg_type::FEATURES_REPLY, total_len as u16, xid).encode(&mut out);
    out.extend_from_slice(&body);
    Frame::new(out.freeze())
}

/// Build one `MULTIPART_REPLY`/`STATS_REPLY` fragment with a raw body
/// (no port encoding applied) and the given `more` continuation flag.
pub fn multipart_reply(version: u8, xid: u32, mp_type: u16, more: bool, body: &[u8]) -> Frame {
    let total_len = HEADER_LEN + codec::MULTIPART_BODY_HEADER_LEN + body.len();
    let mut out = BytesMut::with_capacity(total_len);
    Header::new(version, types::multipart_reply_type(version), total_len as u16, xid).encode(&mut out);
    out.put_u16(mp_type);
    out.put_u16(if more { types::MULTIPART_FLAG_MORE } else { 0 });
    out.put_u32(0); // pad
    out.extend_from_slice(body);
    Frame::new(out.freeze())
}

/// Build a `MULTIPART_REPLY(PORT_DESC)` fragment carrying `ports`.
pub fn port_desc_reply(version: u8, xid: u32, more: bool, ports: &[ScriptedPort]) -> Frame {
    let body = encode_ports(version, ports);
    multipart_reply(version, xid, types::MULTIPART_TYPE_PORT_DESC, more, &body)
}

/// Build a `PORT_STATUS(reason, port)`.
pub fn port_status(version: u8, xid: u32, reason: u8, port: &ScriptedPort) -> Frame {
    let port_bytes = encode_port(version, port);
    let total_len = HEADER_LEN + codec::PORT_STATUS_PORT_OFFSET + port_bytes.len();
    let mut out = BytesMut::with_capacity(total_len);
    Header::new(version, types::msg_type::PORT_STATUS, total_len as u16, xid).encode(&mut out);
    out.put_u8(reason);
    out.extend_from_slice(&[0u8; 7]);
    out.extend_from_slice(&port_bytes);
    Frame::new(out.freeze())
}

/// Build an `ECHO_REQUEST` with an arbitrary payload.
pub fn echo_request(version: u8, xid: u32, payload: &[u8]) -> Frame {
    let total_len = HEADER_LEN + payload.len();
    let mut out = BytesMut::with_capacity(total_len);
    Header::new(version, types::msg_type::ECHO_REQUEST, total_len as u16, xid).encode(&mut out);
    out.extend_from_slice(payload);
    Frame::new(out.freeze())
}

/// Build a `BARRIER_REPLY` for `version`.
pub fn barrier_reply(version: u8, xid: u32) -> Frame {
    openflow_core::frame::header_only(version, types::barrier_reply_type(version), xid)
}

pub use codec::{build_error, build_hello, build_hello_failed};
