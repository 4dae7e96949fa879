//! TCP / Unix-domain stream transport.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::TransportError;
use crate::framer::ReadOutcome;

type BoxRead = Pin<Box<dyn AsyncRead + Send>>;
type BoxWrite = Pin<Box<dyn AsyncWrite + Send>>;

/// A byte-stream transport (TCP or Unix-domain `SOCK_STREAM`). The two
/// halves are split so `read` and `send` can run concurrently, mirroring
/// how a real controller both drains replies and issues new requests on the
/// same connection.
pub struct StreamTransport {
    read_half: AsyncMutex<BoxRead>,
    write_half: Arc<AsyncMutex<BoxWrite>>,
    closed: Arc<AtomicBool>,
}

impl StreamTransport {
    pub fn from_tcp(stream: TcpStream) -> Self {
        stream.set_nodelay(true).ok();
        let (r, w) = tokio::io::split(stream);
        Self::from_halves(Box::pin(r), Box::pin(w))
    }

    pub fn from_unix(stream: UnixStream) -> Self {
        let (r, w) = tokio::io::split(stream);
        Self::from_halves(Box::pin(r), Box::pin(w))
    }

    fn from_halves(read_half: BoxRead, write_half: BoxWrite) -> Self {
        Self {
            read_half: AsyncMutex::new(read_half),
            write_half: Arc::new(AsyncMutex::new(write_half)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn read(&self, max: usize) -> std::io::Result<ReadOutcome> {
        if self.is_closed() {
            return Ok(ReadOutcome::Eof);
        }
        let mut buf = vec![0u8; max.max(1)];
        let mut guard = self.read_half.lock().await;
        let n = guard.read(&mut buf).await?;
        if n == 0 {
            Ok(ReadOutcome::Eof)
        } else {
            buf.truncate(n);
            Ok(ReadOutcome::Data(Bytes::from(buf)))
        }
    }

    pub async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut guard = self.write_half.lock().await;
        guard.write_all(bytes).await?;
        Ok(())
    }

    /// Mark the transport closed and shut the write half down in the
    /// background; `close` itself is synchronous so behaviors can call it
    /// from non-async cleanup paths (e.g. a `Drop` impl).
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let write_half = self.write_half.clone();
        tokio::spawn(async move {
            let mut guard = write_half.lock().await;
            let _ = guard.shutdown().await;
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
