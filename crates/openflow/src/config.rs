//! Programmatic configuration for channels and servers. There is no
//! on-disk config file format; callers build these structs directly.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Bounds on the rate-limited pool used for async message classes
/// (`PACKET_IN`, `FLOW_REMOVED`, `PORT_STATUS`).
#[derive(Debug, Clone)]
pub struct ParallelizerConfig {
    /// Maximum number of async-message handlers running concurrently;
    /// overflow queues FIFO behind a semaphore.
    pub async_concurrency: usize,
}

impl Default for ParallelizerConfig {
    fn default() -> Self {
        Self {
            async_concurrency: 16,
        }
    }
}

/// Per-channel configuration: which versions to negotiate, how long a Sync
/// call waits, and the parallelizer's concurrency bound.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub accepted_versions: Vec<u8>,
    pub sync_timeout: Duration,
    pub parallelizer: ParallelizerConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            accepted_versions: (1..=openflow_core::types::MAX_VERSION).collect(),
            sync_timeout: Duration::from_secs(10),
            parallelizer: ParallelizerConfig::default(),
        }
    }
}

/// Where and how a server binds. `Tcp`/`UnixStream` run a `StreamServer`
/// (one `Channel` per accepted connection); `Udp`/`UnixDgram` run a
/// `DgramServer` (one virtual `Channel` per remote address, multiplexed
/// over a single socket).
#[derive(Debug, Clone)]
pub enum BindAddr {
    Tcp(SocketAddr),
    UnixStream(PathBuf),
    Udp(SocketAddr),
    UnixDgram(PathBuf),
}

/// Server-level configuration: bind address, branching toggles, and the
/// `ChannelConfig` applied to every accepted connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: BindAddr,
    /// Overrides the directory jack-in/monitor helper sockets are created
    /// in; defaults to the current working directory.
    pub socket_dir: Option<PathBuf>,
    pub jackin: bool,
    pub monitor: bool,
    pub channel: ChannelConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: BindAddr::Tcp(
                "0.0.0.0:6653".parse().expect("valid default bind address"),
            ),
            socket_dir: None,
            jackin: false,
            monitor: false,
            channel: ChannelConfig::default(),
        }
    }
}
