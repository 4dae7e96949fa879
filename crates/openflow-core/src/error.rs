//! The unified error taxonomy used across the channel behaviors.

use std::io;

/// Errors surfaced by the framer, transports, and channel behaviors.
///
/// Framing and transport errors are fatal to the affected channel only;
/// they never propagate to the server that owns it (see the server loop,
/// which logs and drops the channel task on any of these).
#[derive(Debug, thiserror::Error)]
pub enum OpenflowError {
    /// Header declared a length shorter than [`crate::HEADER_LEN`], or the
    /// stream ended in the middle of a message.
    #[error("protocol framing error: {0}")]
    ProtocolFraming(String),

    /// Handshake version-bitmap intersection was empty.
    #[error("no common OpenFlow version with peer (accepted: {accepted:?}, peer: {peer:?})")]
    VersionMismatch {
        accepted: Vec<u8>,
        peer: Vec<u8>,
    },

    /// A peer-sent ERROR message surfaced to a caller.
    #[error("peer reported OPENFLOW error type={typ} code={code}")]
    Protocol { typ: u16, code: u16, data: bytes::Bytes },

    /// Cooperative request to close the channel, raised by a handler.
    #[error("channel close requested")]
    ChannelClose,

    /// A weakly-held callback's target was already dropped.
    #[error("callback target no longer alive")]
    CallbackDead,

    /// A synchronous wait exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The transport was reset or closed by the peer.
    #[error("transport closed")]
    Closed,

    /// Any other I/O failure from the underlying socket.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<TransportError> for OpenflowError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => OpenflowError::Closed,
            TransportError::Io(e) => OpenflowError::Io(e),
        }
    }
}

/// Errors specific to the byte-transport layer, kept narrow so `Transport`
/// impls don't need to know about higher-level channel semantics.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, OpenflowError>;
