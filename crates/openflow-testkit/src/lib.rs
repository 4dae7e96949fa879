//! Scripted fake-switch harness for testing `openflow` channel behaviors
//! (handshake, barrier ordering, sync round trips, port monitoring) without
//! real sockets, built on `openflow-core`'s `Mem` transport pair.

pub mod builders;
pub mod fake_switch;

pub use fake_switch::{FakeSwitch, Step};
