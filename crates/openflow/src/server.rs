//! Server loop: accepts connections (`StreamServer`) or demultiplexes
//! datagrams by remote address (`DgramServer`), constructing one [`Channel`]
//! per connection/remote and running it to completion.
//!
//! Grounded on the teacher's `rapace::server::run_tcp_server` accept-loop
//! shape, generalized to the datagram fan-out `openflow_core::transport::dgram`
//! documents as its intended caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use openflow_core::error::{OpenflowError, Result};
use openflow_core::Transport;
use parking_lot::Mutex;

use crate::channel::Channel;
use crate::config::{BindAddr, ServerConfig};
use crate::handler::{AsyncHandler, DefaultHandler};

#[cfg(feature = "stream")]
use tokio::net::{TcpListener, UnixListener};

#[cfg(feature = "dgram")]
use openflow_core::transport::dgram::{DgramAddr, DgramSocket, DgramTransport};
#[cfg(feature = "dgram")]
use std::collections::HashMap;
#[cfg(feature = "dgram")]
use tokio::net::UdpSocket;
#[cfg(feature = "dgram")]
use tokio::sync::mpsc;

/// Accepts TCP or Unix-stream connections, running one [`Channel`] per
/// connection until it closes or the server is stopped.
#[cfg(feature = "stream")]
pub struct StreamServer {
    stopped: Arc<AtomicBool>,
    channels: Arc<Mutex<Vec<Arc<Channel>>>>,
}

#[cfg(feature = "stream")]
impl StreamServer {
    /// Binds and serves forever (or until [`StreamServer::stop`] is called
    /// from another task holding the returned handle), constructing a fresh
    /// `default_handler`/`async_handler` pair per connection via the factory
    /// closures.
    pub async fn serve<D, A, MD, MA>(
        config: ServerConfig,
        make_default: MD,
        make_async: MA,
    ) -> Result<Arc<Self>>
    where
        D: DefaultHandler,
        A: AsyncHandler,
        MD: Fn() -> D + Send + Sync + 'static,
        MA: Fn() -> Option<A> + Send + Sync + 'static,
    {
        let server = Arc::new(Self {
            stopped: Arc::new(AtomicBool::new(false)),
            channels: Arc::new(Mutex::new(Vec::new())),
        });

        match &config.bind_addr {
            BindAddr::Tcp(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|err| OpenflowError::ProtocolFraming(format!("bind {addr}: {err}")))?;
                tracing::info!(%addr, "stream server listening");
                let server = server.clone();
                tokio::spawn(async move {
                    server
                        .accept_tcp(listener, config, make_default, make_async)
                        .await;
                });
            }
            BindAddr::UnixStream(path) => {
                if path.exists() {
                    std::fs::remove_file(path).ok();
                }
                let listener = UnixListener::bind(path)
                    .map_err(|err| OpenflowError::ProtocolFraming(format!("bind {path:?}: {err}")))?;
                tracing::info!(path = %path.display(), "stream server listening");
                let server = server.clone();
                tokio::spawn(async move {
                    server
                        .accept_unix(listener, config, make_default, make_async)
                        .await;
                });
            }
            other => {
                return Err(OpenflowError::ProtocolFraming(format!(
                    "StreamServer cannot bind {other:?}; use DgramServer for UDP/unix-dgram"
                )));
            }
        }

        Ok(server)
    }

    async fn accept_tcp<D, A, MD, MA>(
        self: Arc<Self>,
        listener: TcpListener,
        config: ServerConfig,
        make_default: MD,
        make_async: MA,
    ) where
        D: DefaultHandler,
        A: AsyncHandler,
        MD: Fn() -> D + Send + Sync + 'static,
        MA: Fn() -> Option<A> + Send + Sync + 'static,
    {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    return;
                }
            };
            tracing::info!(%peer, "accepted connection");
            self.clone()
                .spawn_channel(Transport::tcp(stream), &config, &make_default, &make_async)
                .await;
        }
    }

    async fn accept_unix<D, A, MD, MA>(
        self: Arc<Self>,
        listener: UnixListener,
        config: ServerConfig,
        make_default: MD,
        make_async: MA,
    ) where
        D: DefaultHandler,
        A: AsyncHandler,
        MD: Fn() -> D + Send + Sync + 'static,
        MA: Fn() -> Option<A> + Send + Sync + 'static,
    {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            let (stream, _addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    return;
                }
            };
            tracing::info!("accepted unix connection");
            self.clone()
                .spawn_channel(Transport::unix_stream(stream), &config, &make_default, &make_async)
                .await;
        }
    }

    async fn spawn_channel<D, A, MD, MA>(
        self: Arc<Self>,
        transport: Transport,
        config: &ServerConfig,
        make_default: &MD,
        make_async: &MA,
    ) where
        D: DefaultHandler,
        A: AsyncHandler,
        MD: Fn() -> D + Send + Sync + 'static,
        MA: Fn() -> Option<A> + Send + Sync + 'static,
    {
        let async_handler: Option<Arc<dyn AsyncHandler>> =
            make_async().map(|h| Arc::new(h) as Arc<dyn AsyncHandler>);
        let channel = Channel::new(transport, config.channel.clone(), make_default(), async_handler);
        self.channels.lock().push(channel.clone());

        let jackin = config.jackin;
        let monitor = config.monitor;
        let socket_dir = config.socket_dir.clone();
        let channels = self.channels.clone();
        tokio::spawn(async move {
            if let Err(err) = channel.start().await {
                tracing::warn!(error = %err, "failed to send HELLO");
                channels.lock().retain(|c| !Arc::ptr_eq(c, &channel));
                return;
            }
            if let Err(err) = channel.start_branches(jackin, monitor, socket_dir).await {
                tracing::warn!(error = %err, "failed to start branch listeners");
            }
            if let Err(err) = channel.run().await {
                tracing::debug!(error = %err, "channel closed");
            }
            channels.lock().retain(|c| !Arc::ptr_eq(c, &channel));
        });
    }

    /// Stops accepting and closes every live channel.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        for channel in self.channels.lock().drain(..) {
            channel.request_close();
        }
    }
}

/// Demultiplexes datagrams on one shared UDP/unix-dgram socket into one
/// virtual [`Channel`] per remote address, serialized per-remote so
/// datagrams from the same peer are processed in order.
#[cfg(feature = "dgram")]
pub struct DgramServer {
    stopped: Arc<AtomicBool>,
    remotes: Arc<Mutex<HashMap<DgramAddr, mpsc::Sender<bytes::Bytes>>>>,
}

#[cfg(feature = "dgram")]
impl DgramServer {
    pub async fn serve<D, A, MD, MA>(
        config: ServerConfig,
        make_default: MD,
        make_async: MA,
    ) -> Result<Arc<Self>>
    where
        D: DefaultHandler,
        A: AsyncHandler,
        MD: Fn() -> D + Send + Sync + 'static,
        MA: Fn() -> Option<A> + Send + Sync + 'static,
    {
        let server = Arc::new(Self {
            stopped: Arc::new(AtomicBool::new(false)),
            remotes: Arc::new(Mutex::new(HashMap::new())),
        });

        let socket = match &config.bind_addr {
            BindAddr::Udp(addr) => {
                let socket = UdpSocket::bind(addr)
                    .await
                    .map_err(|err| OpenflowError::ProtocolFraming(format!("bind {addr}: {err}")))?;
                tracing::info!(%addr, "dgram server listening");
                DgramSocket::Udp(Arc::new(socket))
            }
            BindAddr::UnixDgram(path) => {
                if path.exists() {
                    std::fs::remove_file(path).ok();
                }
                let socket = tokio::net::UnixDatagram::bind(path)
                    .map_err(|err| OpenflowError::ProtocolFraming(format!("bind {path:?}: {err}")))?;
                tracing::info!(path = %path.display(), "dgram server listening");
                DgramSocket::Unix(Arc::new(socket))
            }
            other => {
                return Err(OpenflowError::ProtocolFraming(format!(
                    "DgramServer cannot bind {other:?}; use StreamServer for TCP/unix-stream"
                )));
            }
        };

        let server_task = server.clone();
        tokio::spawn(async move {
            server_task.recv_loop(socket, config, make_default, make_async).await;
        });

        Ok(server)
    }

    async fn recv_loop<D, A, MD, MA>(
        self: Arc<Self>,
        socket: DgramSocket,
        config: ServerConfig,
        make_default: MD,
        make_async: MA,
    ) where
        D: DefaultHandler,
        A: AsyncHandler,
        MD: Fn() -> D + Send + Sync + 'static,
        MA: Fn() -> Option<A> + Send + Sync + 'static,
    {
        let mut buf = vec![0u8; 65535];
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            let (n, remote) = match &socket {
                DgramSocket::Udp(sock) => match sock.recv_from(&mut buf).await {
                    Ok((n, addr)) => (n, DgramAddr::Inet(addr)),
                    Err(err) => {
                        tracing::warn!(error = %err, "dgram recv failed");
                        return;
                    }
                },
                DgramSocket::Unix(sock) => match sock.recv_from(&mut buf).await {
                    Ok((n, addr)) => {
                        let path = addr
                            .as_pathname()
                            .map(|p| p.to_path_buf())
                            .unwrap_or_default();
                        (n, DgramAddr::Unix(path))
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "dgram recv failed");
                        return;
                    }
                },
            };
            let payload = bytes::Bytes::copy_from_slice(&buf[..n]);

            let sender = {
                let existing = self.remotes.lock().get(&remote).cloned();
                match existing {
                    Some(tx) => tx,
                    None => {
                        let (transport, tx) = DgramTransport::new_channel(socket.clone(), remote.clone());
                        self.remotes.lock().insert(remote.clone(), tx.clone());
                        self.spawn_virtual_channel(transport, &config, &make_default, &make_async);
                        tx
                    }
                }
            };
            if sender.send(payload).await.is_err() {
                self.remotes.lock().remove(&remote);
            }
        }
    }

    fn spawn_virtual_channel<D, A, MD, MA>(
        &self,
        transport: DgramTransport,
        config: &ServerConfig,
        make_default: &MD,
        make_async: &MA,
    ) where
        D: DefaultHandler,
        A: AsyncHandler,
        MD: Fn() -> D + Send + Sync + 'static,
        MA: Fn() -> Option<A> + Send + Sync + 'static,
    {
        let async_handler: Option<Arc<dyn AsyncHandler>> =
            make_async().map(|h| Arc::new(h) as Arc<dyn AsyncHandler>);
        let channel = Channel::new(
            Transport::dgram(transport),
            config.channel.clone(),
            make_default(),
            async_handler,
        );
        tokio::spawn(async move {
            if let Err(err) = channel.start().await {
                tracing::warn!(error = %err, "failed to send HELLO");
                return;
            }
            if let Err(err) = channel.run().await {
                tracing::debug!(error = %err, "virtual channel closed");
            }
        });
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}
