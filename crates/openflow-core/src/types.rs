//! OpenFlow type numbers and version constants referenced by the core
//! behaviors. This is intentionally not an exhaustive message catalog: the
//! full set of OpenFlow structures is defined by the OpenFlow specification
//! and is out of scope here (see crate docs).

/// Highest wire version this crate negotiates (OpenFlow 1.4-class `ofp_port`
/// layout; a distinct "v1.5" port layout is supported for forward
/// compatibility, see [`crate::port`]).
pub const MAX_VERSION: u8 = 5;

/// Message type numbers, common to v1.0 and v1.3+ unless noted.
pub mod msg_type {
    pub const HELLO: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const ECHO_REQUEST: u8 = 2;
    pub const ECHO_REPLY: u8 = 3;
    pub const FEATURES_REQUEST: u8 = 5;
    pub const FEATURES_REPLY: u8 = 6;
    pub const GET_CONFIG_REQUEST: u8 = 7;
    pub const GET_CONFIG_REPLY: u8 = 8;
    pub const PACKET_IN: u8 = 10;
    pub const FLOW_REMOVED: u8 = 11;
    pub const PORT_STATUS: u8 = 12;

    /// STATS_REQUEST in v1.0, MULTIPART_REQUEST from v1.1 on.
    pub const STATS_OR_MULTIPART_REQUEST_V1: u8 = 16;
    pub const STATS_OR_MULTIPART_REPLY_V1: u8 = 17;
    pub const MULTIPART_REQUEST: u8 = 18;
    pub const MULTIPART_REPLY: u8 = 19;

    pub const BARRIER_REQUEST_V1: u8 = 18;
    pub const BARRIER_REPLY_V1: u8 = 19;
    pub const BARRIER_REQUEST: u8 = 20;
    pub const BARRIER_REPLY: u8 = 21;
}

/// Returns the `BARRIER_REQUEST` type number for `version` (v1.0 uses 18,
/// every later version uses 20).
pub fn barrier_request_type(version: u8) -> u8 {
    if version == 1 {
        msg_type::BARRIER_REQUEST_V1
    } else {
        msg_type::BARRIER_REQUEST
    }
}

/// Returns the `BARRIER_REPLY` type number for `version`.
pub fn barrier_reply_type(version: u8) -> u8 {
    if version == 1 {
        msg_type::BARRIER_REPLY_V1
    } else {
        msg_type::BARRIER_REPLY
    }
}

/// Returns the STATS/MULTIPART request type number for `version`.
pub fn multipart_request_type(version: u8) -> u8 {
    if version == 1 {
        msg_type::STATS_OR_MULTIPART_REQUEST_V1
    } else {
        msg_type::MULTIPART_REQUEST
    }
}

/// Returns the STATS/MULTIPART reply type number for `version`.
pub fn multipart_reply_type(version: u8) -> u8 {
    if version == 1 {
        msg_type::STATS_OR_MULTIPART_REPLY_V1
    } else {
        msg_type::MULTIPART_REPLY
    }
}

/// True for the three asynchronous, unsolicited message classes that bypass
/// the barrier/callback sequencer entirely.
pub fn is_async_message(typ: u8) -> bool {
    matches!(
        typ,
        msg_type::PACKET_IN | msg_type::FLOW_REMOVED | msg_type::PORT_STATUS
    )
}

/// `ofp_error_type` / `ofp_hello_failed_code` used by the handshake layer.
pub mod error_type {
    pub const HELLO_FAILED: u16 = 0;
    pub const BAD_REQUEST: u16 = 1;
}

pub mod hello_failed_code {
    pub const INCOMPATIBLE: u16 = 0;
}

/// `ofp_bad_request_code`, used to reject a monitor child's attempted send.
pub mod bad_request_code {
    pub const EPERM: u16 = 1;
}

/// `ofp_port_reason` used by `PORT_STATUS`.
pub mod port_reason {
    pub const ADD: u8 = 0;
    pub const DELETE: u8 = 1;
    pub const MODIFY: u8 = 2;
}

/// `OFPMP_PORT_DESC` multipart type number (v1.3+).
pub const MULTIPART_TYPE_PORT_DESC: u16 = 13;

/// Bit 0 of the multipart/stats `flags` field: more replies follow.
pub const MULTIPART_FLAG_MORE: u16 = 1;
