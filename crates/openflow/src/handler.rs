//! Callback and handler types shared by the sequencer, sync tracker, and
//! channel dispatch loop.

use std::sync::{Arc, Weak};

use openflow_core::error::Result;
use openflow_core::Frame;

/// A reply callback, held weakly by the sequencer so a dropped handler
/// doesn't leak its Chunk/Barrier entry forever (see [`crate::sequencer`]).
pub type ReplyCallback = dyn Fn(Result<Frame>) + Send + Sync;

/// A strong handle a caller keeps alive; the sequencer only ever sees
/// [`Weak`] references derived from it.
pub type ReplyCallbackHandle = Arc<ReplyCallback>;

pub fn weak_callback(handle: &ReplyCallbackHandle) -> Weak<ReplyCallback> {
    Arc::downgrade(handle)
}

/// Invoked for every non-reply, non-echo, non-sync message once the
/// sequencer has nowhere more specific to route it: the default per-channel
/// handler a user registers at construction time.
pub trait DefaultHandler: Send + Sync + 'static {
    fn handle(&self, frame: Result<Frame>);
}

impl<F> DefaultHandler for F
where
    F: Fn(Result<Frame>) + Send + Sync + 'static,
{
    fn handle(&self, frame: Result<Frame>) {
        self(frame)
    }
}

/// Invoked for the three asynchronous, unsolicited message classes
/// (`PACKET_IN`, `FLOW_REMOVED`, `PORT_STATUS`), dispatched through the
/// parallelizer's rate-limited pool rather than the barrier sequencer.
pub trait AsyncHandler: Send + Sync + 'static {
    fn handle(&self, frame: Frame) -> futures::future::BoxFuture<'static, Result<()>>;
}

impl<F, Fut> AsyncHandler for F
where
    F: Fn(Frame) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    fn handle(&self, frame: Frame) -> futures::future::BoxFuture<'static, Result<()>> {
        Box::pin(self(frame))
    }
}
