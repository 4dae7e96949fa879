//! Core framing, wire codec, and transport types for an OpenFlow (1.0-1.5)
//! connection-handling library.
//!
//! This crate is deliberately narrow: it owns the 8-byte header, frame
//! representation, the length-prefix framer, the handful of message bodies
//! the higher-level behaviors need to parse directly (HELLO negotiation,
//! FEATURES_REPLY's datapath id, ports, the multipart continuation flag),
//! and the transport backends. The barrier/callback sequencer, sync
//! tracker, port monitor, branching, server loop and parallelizer live in
//! the `openflow` crate built on top of this one.

pub mod codec;
pub mod error;
pub mod frame;
pub mod framer;
pub mod header;
pub mod port;
pub mod transport;
pub mod types;
pub mod xid;

pub use error::{OpenflowError, Result, TransportError};
pub use frame::{header_only, Frame};
pub use framer::{ByteSource, Framer, ReadOutcome};
pub use header::{Header, HEADER_LEN};
pub use port::PortEntry;
pub use transport::{SharedReader, Transport};
pub use xid::XidGenerator;
