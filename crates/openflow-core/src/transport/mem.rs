//! In-process paired transport, for tests that want deterministic behavior
//! without real sockets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::framer::ReadOutcome;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct MemTransport {
    inner: Arc<Inner>,
}

struct Inner {
    // `None` once this side has closed: further sends fail locally, and
    // dropping the Sender lets the peer's `recv` observe EOF once queued
    // data is drained, just like a half-closed socket.
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    closed: AtomicBool,
}

impl MemTransport {
    /// Create a connected pair: bytes sent on one side are read on the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);

        let a = Arc::new(Inner {
            tx: Mutex::new(Some(tx_b)),
            rx: tokio::sync::Mutex::new(rx_a),
            closed: AtomicBool::new(false),
        });
        let b = Arc::new(Inner {
            tx: Mutex::new(Some(tx_a)),
            rx: tokio::sync::Mutex::new(rx_b),
            closed: AtomicBool::new(false),
        });

        (Self { inner: a }, Self { inner: b })
    }

    pub async fn read(&self, _max: usize) -> std::io::Result<ReadOutcome> {
        if self.is_closed() {
            return Ok(ReadOutcome::Eof);
        }
        let mut rx = self.inner.rx.lock().await;
        match rx.recv().await {
            Some(bytes) => Ok(ReadOutcome::Data(bytes)),
            None => Ok(ReadOutcome::Eof),
        }
    }

    pub async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let sender = self.inner.tx.lock().clone();
        let Some(sender) = sender else {
            return Err(TransportError::Closed);
        };
        sender
            .send(Bytes::copy_from_slice(bytes))
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_bytes_in_order() {
        let (a, b) = MemTransport::pair();
        a.send(b"hello").await.unwrap();
        a.send(b"world").await.unwrap();
        let ReadOutcome::Data(first) = b.read(64).await.unwrap() else {
            panic!("expected data");
        };
        let ReadOutcome::Data(second) = b.read(64).await.unwrap() else {
            panic!("expected data");
        };
        assert_eq!(&first[..], b"hello");
        assert_eq!(&second[..], b"world");
    }

    #[tokio::test]
    async fn close_yields_eof() {
        let (a, b) = MemTransport::pair();
        a.close();
        assert!(a.is_closed());
        let outcome = b.read(64).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Eof));
    }
}
