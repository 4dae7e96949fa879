//! Reads length-prefixed OpenFlow messages off a byte source.

use bytes::{Bytes, BytesMut};

use crate::error::OpenflowError;
use crate::frame::Frame;
use crate::header::{Header, HEADER_LEN};

/// What a single underlying read produced.
pub enum ReadOutcome {
    /// Bytes were read.
    Data(Bytes),
    /// A transient condition (would-block, timeout, interrupt): the caller
    /// should reconsider a liveness predicate (e.g. "is the server still
    /// accepting?") and read again.
    Empty,
    /// Clean close or connection reset: no more data will ever arrive.
    Eof,
}

/// Anything the framer can pull raw bytes from. Implemented by every
/// transport backend (see [`crate::transport`]); kept separate so the framer
/// has no knowledge of sockets.
#[allow(async_fn_in_trait)]
pub trait ByteSource {
    async fn read(&mut self, max: usize) -> std::io::Result<ReadOutcome>;
}

const READ_CHUNK: usize = 8192;

/// Accumulates bytes from a [`ByteSource`] and yields whole [`Frame`]s.
pub struct Framer<S> {
    source: S,
    buf: BytesMut,
}

impl<S: ByteSource> Framer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buf: BytesMut::new(),
        }
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Read until at least `len` bytes are buffered, or a transient/eof
    /// condition occurs. Returns `Ok(Some(()))` once satisfied, `Ok(None)` on
    /// a transient read (caller should loop), or `Err` on EOF/protocol error.
    async fn fill(&mut self, len: usize) -> Result<bool, OpenflowError> {
        if self.buf.len() >= len {
            return Ok(true);
        }
        match self.source.read(READ_CHUNK).await? {
            ReadOutcome::Data(bytes) => {
                self.buf.extend_from_slice(&bytes);
                Ok(self.buf.len() >= len)
            }
            ReadOutcome::Empty => Ok(false),
            ReadOutcome::Eof => Err(OpenflowError::Closed),
        }
    }

    /// Read and return one frame. Loops internally over transient
    /// conditions; returns `Err(Closed)` on clean EOF and
    /// `Err(ProtocolFraming)` on a malformed header or truncated message.
    pub async fn recv_frame(&mut self) -> Result<Frame, OpenflowError> {
        loop {
            if self.fill(HEADER_LEN).await? {
                break;
            }
        }

        let header = Header::parse(&self.buf[..HEADER_LEN]);
        if (header.length as usize) < HEADER_LEN {
            return Err(OpenflowError::ProtocolFraming(format!(
                "declared length {} shorter than header ({HEADER_LEN})",
                header.length
            )));
        }

        let total = header.length as usize;
        loop {
            if self.fill(total).await? {
                break;
            }
        }

        let frame_bytes = self.buf.split_to(total).freeze();
        Ok(Frame::new(frame_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedSource {
        chunks: VecDeque<ReadOutcome>,
    }

    impl ByteSource for ScriptedSource {
        async fn read(&mut self, _max: usize) -> std::io::Result<ReadOutcome> {
            Ok(self.chunks.pop_front().unwrap_or(ReadOutcome::Eof))
        }
    }

    #[tokio::test]
    async fn frames_a_single_message_delivered_in_two_chunks() {
        let header = Header::new(4, 0, HEADER_LEN as u16, 1).to_bytes();
        let source = ScriptedSource {
            chunks: VecDeque::from([
                ReadOutcome::Data(Bytes::copy_from_slice(&header[..4])),
                ReadOutcome::Empty,
                ReadOutcome::Data(Bytes::copy_from_slice(&header[4..])),
            ]),
        };
        let mut framer = Framer::new(source);
        let frame = framer.recv_frame().await.unwrap();
        assert_eq!(frame.version(), 4);
        assert_eq!(frame.xid(), 1);
    }

    #[tokio::test]
    async fn rejects_too_short_declared_length() {
        let mut bad = Header::new(1, 0, 4, 1).to_bytes().to_vec();
        bad.truncate(4);
        let source = ScriptedSource {
            chunks: VecDeque::from([ReadOutcome::Data(Bytes::from(bad))]),
        };
        let mut framer = Framer::new(source);
        let err = framer.recv_frame().await.unwrap_err();
        assert!(matches!(err, OpenflowError::ProtocolFraming(_)));
    }

    #[tokio::test]
    async fn eof_mid_message_closes() {
        let header = Header::new(1, 0, 16, 1).to_bytes();
        let source = ScriptedSource {
            chunks: VecDeque::from([ReadOutcome::Data(Bytes::copy_from_slice(&header))]),
        };
        let mut framer = Framer::new(source);
        let err = framer.recv_frame().await.unwrap_err();
        assert!(matches!(err, OpenflowError::Closed));
    }
}
