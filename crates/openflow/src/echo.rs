//! Auto-echo layer: `ECHO_REQUEST` is answered with `ECHO_REPLY` mirroring
//! the xid and payload, entirely below the user handler.

use openflow_core::error::Result;
use openflow_core::{codec, types, Frame, Transport};

/// Returns `true` if `frame` was an `ECHO_REQUEST` and has been answered;
/// callers should not forward it to any other behavior.
pub async fn intercept(transport: &Transport, frame: &Frame) -> Result<bool> {
    if frame.typ() != types::msg_type::ECHO_REQUEST {
        return Ok(false);
    }
    let reply = codec::build_echo_reply(frame);
    transport.send(reply.as_bytes()).await?;
    Ok(true)
}
