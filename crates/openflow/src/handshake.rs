//! Handshake layer: exchange `HELLO`, intersect version bitmaps, select the
//! working version or fail with `VersionMismatch`.

use openflow_core::error::{OpenflowError, Result};
use openflow_core::{codec, types, Frame, Transport};

/// Sends this side's `HELLO` advertising `accepted_versions`. Must be the
/// first frame sent on a channel.
pub async fn send_hello(transport: &Transport, accepted_versions: &[u8], xid: u32) -> Result<()> {
    let hello = codec::build_hello(accepted_versions, xid);
    transport.send(hello.as_bytes()).await?;
    Ok(())
}

/// Given the peer's `HELLO` frame, computes the negotiated version: the
/// highest version present in both `accepted_versions` and the peer's
/// advertised set. On an empty intersection, sends `ERROR(HELLO_FAILED,
/// INCOMPATIBLE)` and returns `VersionMismatch`.
pub async fn negotiate(
    transport: &Transport,
    accepted_versions: &[u8],
    hello: &Frame,
    error_xid: u32,
) -> Result<u8> {
    if hello.typ() != types::msg_type::HELLO {
        return Err(OpenflowError::ProtocolFraming(format!(
            "expected HELLO, got type {}",
            hello.typ()
        )));
    }
    let peer_versions = codec::parse_hello_versions(hello);
    let negotiated = accepted_versions
        .iter()
        .filter(|v| peer_versions.contains(v))
        .max()
        .copied();

    match negotiated {
        Some(version) => Ok(version),
        None => {
            let failure = codec::build_hello_failed(
                *accepted_versions.iter().max().unwrap_or(&1),
                error_xid,
                accepted_versions,
            );
            transport.send(failure.as_bytes()).await.ok();
            Err(OpenflowError::VersionMismatch {
                accepted: accepted_versions.to_vec(),
                peer: peer_versions,
            })
        }
    }
}
