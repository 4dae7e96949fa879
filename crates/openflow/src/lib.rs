//! OpenFlow connection-handling behaviors built on `openflow-core`'s framing
//! and wire codec: handshake, auto-echo, the barrier/callback sequencer,
//! synchronous request/reply, port monitoring, jack-in/monitor branching,
//! the parallelizer, and the server loop.
//!
//! Recommended behavior chain for one connection (see [`channel::Channel`]):
//! Framing -> Handshake -> AutoEcho -> Sequencer/Sync/PortMonitor ->
//! Parallelizer -> user handler.

#[cfg(feature = "stream")]
pub mod branch;
pub mod channel;
pub mod config;
pub mod echo;
pub mod handler;
pub mod handshake;
pub mod parallel;
pub mod port_monitor;
pub mod sequencer;
pub mod server;
pub mod sync;

pub use channel::Channel;
pub use config::{BindAddr, ChannelConfig, ParallelizerConfig, ServerConfig};
pub use handler::{weak_callback, AsyncHandler, DefaultHandler, ReplyCallback, ReplyCallbackHandle};
#[cfg(feature = "dgram")]
pub use server::DgramServer;
#[cfg(feature = "stream")]
pub use server::StreamServer;

pub use openflow_core::error::{OpenflowError, Result, TransportError};
pub use openflow_core::{Frame, PortEntry, Transport};
