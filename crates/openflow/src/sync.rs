//! Sync request tracker (`SyncChannel`): turns send-then-wait-for-reply into
//! a blocking call for the caller, without blocking the channel's receive
//! loop. Handles multipart/stats accumulation via the "more" continuation
//! flag and harvests barrier-fenced `multi` batches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use openflow_core::error::{OpenflowError, Result};
use openflow_core::{codec, types, Frame, Transport};
use parking_lot::Mutex;
use tokio::sync::Notify;

struct Tracker {
    frames: Mutex<Vec<Frame>>,
    completed: AtomicBool,
    notify: Notify,
    error: Mutex<Option<(u16, u16, Bytes)>>,
}

impl Tracker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
            notify: Notify::new(),
            error: Mutex::new(None),
        })
    }

    fn complete(&self) {
        self.completed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Whether `typ` carries a multipart/stats "more" continuation flag; every
/// other reply type is inherently a single fragment.
fn may_continue(typ: u8) -> bool {
    typ == types::msg_type::STATS_OR_MULTIPART_REPLY_V1 || typ == types::msg_type::MULTIPART_REPLY
}

/// Per-channel map of in-flight sync requests, keyed by xid.
pub struct SyncTracker {
    trackers: Mutex<HashMap<u32, Arc<Tracker>>>,
    default_timeout: Duration,
}

impl SyncTracker {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            trackers: Mutex::new(HashMap::new()),
            default_timeout,
        }
    }

    pub fn next_xid(&self) -> u32 {
        openflow_core::xid::global().next_xid()
    }

    fn register(&self, xid: u32) -> Arc<Tracker> {
        let tracker = Tracker::new();
        self.trackers.lock().insert(xid, tracker.clone());
        tracker
    }

    /// Routes `frame` to its tracker if one is registered for its xid.
    /// Returns `true` if the frame was consumed.
    pub fn try_route(&self, frame: &Frame) -> bool {
        let xid = frame.xid();
        let tracker = self.trackers.lock().get(&xid).cloned();
        let Some(tracker) = tracker else {
            return false;
        };

        if frame.typ() == openflow_core::types::msg_type::ERROR {
            if let Some(err) = codec::parse_error(frame) {
                *tracker.error.lock() = Some((err.typ, err.code, err.data));
            }
            tracker.complete();
            return true;
        }

        tracker.frames.lock().push(frame.clone());
        if !may_continue(frame.typ()) || !codec::multipart_more(frame) {
            tracker.complete();
        }
        true
    }

    /// Registers `xid`, sends `frame`, and waits up to `timeout` for
    /// completion. On a peer `ERROR`, resolves to `Err`. On timeout, returns
    /// whatever fragments had accumulated so far (possibly none) rather than
    /// failing the call outright, matching a partial-result read.
    pub async fn call(
        &self,
        transport: &Transport,
        frame: Frame,
        timeout: Duration,
    ) -> Result<Vec<Frame>> {
        let xid = frame.xid();
        let tracker = self.register(xid);
        transport.send(frame.as_bytes()).await?;
        let result = self.await_completion(&tracker, xid, timeout).await;
        self.trackers.lock().remove(&xid);
        result
    }

    /// Waits for an already-registered tracker (used by `multi`, where the
    /// send happens before registration bookkeeping is convenient to box up
    /// per-message).
    async fn await_completion(
        &self,
        tracker: &Arc<Tracker>,
        xid: u32,
        timeout: Duration,
    ) -> Result<Vec<Frame>> {
        let wait = async {
            while !tracker.completed.load(Ordering::Acquire) {
                tracker.notify.notified().await;
            }
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            tracing::warn!(xid, "sync call timed out, returning partial data");
        }
        if let Some((typ, code, data)) = tracker.error.lock().take() {
            return Err(OpenflowError::Protocol { typ, code, data });
        }
        Ok(tracker.frames.lock().clone())
    }

    /// Sends every message in `messages` under fresh trackers, then a single
    /// `BARRIER_REQUEST`; once the barrier reply arrives (which the protocol
    /// guarantees happens after every preceding reply), harvests each
    /// message's accumulated frames. A message with no reply yields `None`.
    pub async fn multi(
        &self,
        transport: &Transport,
        version: u8,
        messages: Vec<Frame>,
    ) -> Result<Vec<Option<Vec<Frame>>>> {
        let mut trackers = Vec::with_capacity(messages.len());
        for message in &messages {
            let tracker = self.register(message.xid());
            trackers.push((message.xid(), tracker));
        }
        for message in &messages {
            transport.send(message.as_bytes()).await?;
        }

        let barrier_xid = openflow_core::xid::global().next_xid();
        let barrier = codec::build_barrier_request_with_xid(version, barrier_xid);
        let barrier_tracker = self.register(barrier_xid);
        transport.send(barrier.as_bytes()).await?;
        self.await_completion(&barrier_tracker, barrier_xid, self.default_timeout)
            .await?;
        self.trackers.lock().remove(&barrier_xid);

        let mut out = Vec::with_capacity(trackers.len());
        for (xid, tracker) in trackers {
            self.trackers.lock().remove(&xid);
            let frames = tracker.frames.lock().clone();
            out.push(if frames.is_empty() { None } else { Some(frames) });
        }
        Ok(out)
    }

    /// Marks every outstanding tracker complete with empty data, as if the
    /// channel had closed: callers waiting on `call`/`multi` observe a
    /// closed connection instead of hanging forever.
    pub fn close_all(&self) {
        let trackers = self.trackers.lock();
        for tracker in trackers.values() {
            tracker.frames.lock().clear();
            tracker.complete();
        }
    }
}

/// Concatenate each fragment's raw bytes (header included), matching the
/// `single`/`multi` contract: a two-fragment, 200-byte-each multipart reply
/// yields 400 bytes.
pub fn concat_frames(frames: &[Frame]) -> Bytes {
    let mut out = Vec::new();
    for frame in frames {
        out.extend_from_slice(frame.as_bytes());
    }
    Bytes::from(out)
}
