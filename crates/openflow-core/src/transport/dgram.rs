//! UDP / Unix-domain datagram transport.
//!
//! A single UDP or Unix datagram socket is shared by a [`crate::transport]
//! and fanned out by a higher-level dispatcher (the `DgramServer`, see
//! `openflow::server`) into one virtual [`DgramTransport`] per remote
//! address. Each incoming datagram for a remote is pushed onto that
//! transport's queue "as if it were a mini-stream", per the framing model.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{UdpSocket, UnixDatagram};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::framer::ReadOutcome;

/// The underlying datagram socket, shared across every remote's virtual
/// transport.
#[derive(Clone)]
pub enum DgramSocket {
    Udp(Arc<UdpSocket>),
    Unix(Arc<UnixDatagram>),
}

/// A peer address on a datagram socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DgramAddr {
    Inet(SocketAddr),
    Unix(PathBuf),
}

/// One remote's virtual connection over a shared datagram socket.
pub struct DgramTransport {
    socket: DgramSocket,
    remote: DgramAddr,
    incoming: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    closed: Arc<AtomicBool>,
}

impl DgramTransport {
    /// Construct a virtual transport for `remote`, returning it along with
    /// the sender the owning `DgramServer` uses to push newly-received
    /// datagrams for that remote.
    pub fn new_channel(socket: DgramSocket, remote: DgramAddr) -> (Self, mpsc::Sender<Bytes>) {
        const QUEUE: usize = 64;
        let (tx, rx) = mpsc::channel(QUEUE);
        (
            Self {
                socket,
                remote,
                incoming: tokio::sync::Mutex::new(rx),
                closed: Arc::new(AtomicBool::new(false)),
            },
            tx,
        )
    }

    pub async fn read(&self, _max: usize) -> std::io::Result<ReadOutcome> {
        if self.is_closed() {
            return Ok(ReadOutcome::Eof);
        }
        let mut rx = self.incoming.lock().await;
        match rx.recv().await {
            Some(bytes) => Ok(ReadOutcome::Data(bytes)),
            None => Ok(ReadOutcome::Eof),
        }
    }

    pub async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        match (&self.socket, &self.remote) {
            (DgramSocket::Udp(sock), DgramAddr::Inet(addr)) => {
                sock.send_to(bytes, addr).await?;
            }
            (DgramSocket::Unix(sock), DgramAddr::Unix(path)) => {
                sock.send_to(bytes, path).await?;
            }
            _ => {
                return Err(TransportError::Closed);
            }
        }
        Ok(())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
