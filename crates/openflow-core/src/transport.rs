//! Transport enum and internal backend trait.
//!
//! The public API is the [`Transport`] enum; each backend lives in its own
//! module below and implements the shared [`ByteSource`]/send/close surface.
//! Unlike a message-oriented RPC transport, an OpenFlow transport only needs
//! to move raw bytes — framing (see [`crate::framer`]) lives one layer up,
//! since the wire format is a plain length-prefixed byte stream rather than
//! already-delimited messages.

use crate::error::TransportError;
use crate::framer::{ByteSource, ReadOutcome};

#[cfg(feature = "mem")]
pub mod mem;
#[cfg(feature = "dgram")]
pub mod dgram;
#[cfg(feature = "stream")]
pub mod stream;

/// One OpenFlow transport connection: something that can move raw bytes in
/// and out, and be closed from either side.
pub enum Transport {
    #[cfg(feature = "stream")]
    Stream(stream::StreamTransport),
    #[cfg(feature = "dgram")]
    Dgram(dgram::DgramTransport),
    #[cfg(feature = "mem")]
    Mem(mem::MemTransport),
}

impl Transport {
    /// Reads the next chunk of bytes. Despite conceptually belonging to a
    /// single reader (the channel's receive loop), this only needs `&self`:
    /// every backend serializes its read side behind its own async mutex, so
    /// a [`Transport`] can be shared (behind an `Arc`) between the receive
    /// loop and concurrent senders without a `Mutex` around the whole enum.
    pub async fn read(&self, max: usize) -> std::io::Result<ReadOutcome> {
        match self {
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.read(max).await,
            #[cfg(feature = "dgram")]
            Transport::Dgram(t) => t.read(max).await,
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.read(max).await,
        }
    }

    pub async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.send(bytes).await,
            #[cfg(feature = "dgram")]
            Transport::Dgram(t) => t.send(bytes).await,
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.send(bytes).await,
        }
    }

    pub fn close(&self) {
        match self {
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.close(),
            #[cfg(feature = "dgram")]
            Transport::Dgram(t) => t.close(),
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            #[cfg(feature = "stream")]
            Transport::Stream(t) => t.is_closed(),
            #[cfg(feature = "dgram")]
            Transport::Dgram(t) => t.is_closed(),
            #[cfg(feature = "mem")]
            Transport::Mem(t) => t.is_closed(),
        }
    }

    #[cfg(feature = "mem")]
    pub fn mem_pair() -> (Self, Self) {
        let (a, b) = mem::MemTransport::pair();
        (Transport::Mem(a), Transport::Mem(b))
    }

    #[cfg(feature = "stream")]
    pub fn tcp(stream: tokio::net::TcpStream) -> Self {
        Transport::Stream(stream::StreamTransport::from_tcp(stream))
    }

    #[cfg(feature = "stream")]
    pub fn unix_stream(stream: tokio::net::UnixStream) -> Self {
        Transport::Stream(stream::StreamTransport::from_unix(stream))
    }

    #[cfg(feature = "dgram")]
    pub fn dgram(inner: dgram::DgramTransport) -> Self {
        Transport::Dgram(inner)
    }
}

impl ByteSource for Transport {
    async fn read(&mut self, max: usize) -> std::io::Result<ReadOutcome> {
        Transport::read(self, max).await
    }
}

/// Adapts a shared `Arc<Transport>` to [`ByteSource`] so a [`crate::Framer`]
/// can read from the same transport instance a [`Channel`](crate) sends on.
pub struct SharedReader(pub std::sync::Arc<Transport>);

impl ByteSource for SharedReader {
    async fn read(&mut self, max: usize) -> std::io::Result<ReadOutcome> {
        self.0.read(max).await
    }
}
