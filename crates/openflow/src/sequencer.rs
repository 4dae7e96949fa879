//! Barrier/callback sequencer (`ControllerChannel`): routes each reply to
//! the callback bound to the send that caused it, inserting `BARRIER_REQUEST`
//! fences whenever the active callback changes so that replies already in
//! flight can't be misattributed across the switch.
//!
//! Grounded on `ControllerChannel.send`/`handle_proxy` in the original
//! Python implementation: a per-channel sequence of `Chunk`/`Barrier`
//! entries, consumed front-to-back as barrier replies arrive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use openflow_core::error::{OpenflowError, Result};
use openflow_core::{codec, types, Frame, Transport};
use tokio::sync::Mutex as AsyncMutex;

use crate::handler::ReplyCallback;

enum Entry {
    Chunk(Weak<ReplyCallback>),
    Barrier { xid: u32, callback: Weak<ReplyCallback> },
}

/// Per-channel barrier/callback sequencer state.
pub struct Sequencer {
    entries: AsyncMutex<VecDeque<Entry>>,
    default_callback: Weak<ReplyCallback>,
    datapath_id: AtomicU64,
    has_datapath_id: std::sync::atomic::AtomicBool,
    auxiliary_id: std::sync::atomic::AtomicU8,
    has_auxiliary_id: std::sync::atomic::AtomicBool,
}

const NO_DATAPATH: u64 = u64::MAX;

impl Sequencer {
    pub fn new(default_callback: Weak<ReplyCallback>) -> Self {
        Self {
            entries: AsyncMutex::new(VecDeque::new()),
            default_callback,
            datapath_id: AtomicU64::new(NO_DATAPATH),
            has_datapath_id: std::sync::atomic::AtomicBool::new(false),
            auxiliary_id: std::sync::atomic::AtomicU8::new(0),
            has_auxiliary_id: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn datapath_id(&self) -> Option<u64> {
        self.has_datapath_id
            .load(Ordering::Acquire)
            .then(|| self.datapath_id.load(Ordering::Acquire))
    }

    pub fn auxiliary_id(&self) -> Option<u8> {
        self.has_auxiliary_id
            .load(Ordering::Acquire)
            .then(|| self.auxiliary_id.load(Ordering::Acquire))
    }

    /// Records `(datapath_id, auxiliary_id)` from an observed
    /// `FEATURES_REPLY`, without consuming the message — other behaviors
    /// (branching) read it back out.
    pub fn record_features(&self, datapath_id: u64, auxiliary_id: Option<u8>) {
        self.datapath_id.store(datapath_id, Ordering::Release);
        self.has_datapath_id.store(true, Ordering::Release);
        if let Some(aux) = auxiliary_id {
            self.auxiliary_id.store(aux, Ordering::Release);
            self.has_auxiliary_id.store(true, Ordering::Release);
        }
    }

    /// Send `frame` under `callback`, inserting a fencing `BARRIER_REQUEST`
    /// ahead of it whenever the active callback is changing.
    pub async fn send(
        &self,
        transport: &Transport,
        version: u8,
        frame: Frame,
        callback: Weak<ReplyCallback>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;

        if frame.typ() == types::barrier_request_type(version) {
            entries.push_back(Entry::Barrier {
                xid: frame.xid(),
                callback,
            });
            drop(entries);
            transport.send(frame.as_bytes()).await?;
            return Ok(());
        }

        let mut barrier_frame = None;
        match entries.back() {
            Some(Entry::Chunk(cb)) => {
                if !Weak::ptr_eq(cb, &callback) {
                    let bxid = openflow_core::xid::global().next_xid();
                    barrier_frame = Some(codec::build_barrier_request_with_xid(version, bxid));
                    entries.push_back(Entry::Barrier {
                        xid: bxid,
                        callback: self.default_callback.clone(),
                    });
                    entries.push_back(Entry::Chunk(callback));
                }
            }
            Some(Entry::Barrier { .. }) => {
                entries.push_back(Entry::Chunk(callback));
            }
            None => {
                if !Weak::ptr_eq(&callback, &self.default_callback) {
                    let bxid = openflow_core::xid::global().next_xid();
                    barrier_frame = Some(codec::build_barrier_request_with_xid(version, bxid));
                    entries.push_back(Entry::Barrier {
                        xid: bxid,
                        callback: self.default_callback.clone(),
                    });
                    entries.push_back(Entry::Chunk(callback));
                } else {
                    entries.push_back(Entry::Chunk(callback));
                }
            }
        }
        drop(entries);

        if let Some(barrier) = barrier_frame {
            transport.send(barrier.as_bytes()).await?;
        }
        transport.send(frame.as_bytes()).await?;
        Ok(())
    }

    /// Route an unsolicited reply (not a sync-tracked xid) to whichever
    /// callback is responsible for it.
    pub async fn route_reply(&self, frame: Frame, version: u8) {
        let is_barrier_reply = frame.typ() == types::barrier_reply_type(version);
        let mut entries = self.entries.lock().await;

        if is_barrier_reply {
            let pos = entries.iter().position(
                |e| matches!(e, Entry::Barrier { xid, .. } if *xid == frame.xid()),
            );
            let Some(pos) = pos else {
                tracing::warn!(xid = frame.xid(), "barrier reply for unknown xid");
                return;
            };
            let callback = match &entries[pos] {
                Entry::Barrier { callback, .. } => callback.clone(),
                Entry::Chunk(_) => unreachable!(),
            };
            entries.drain(0..=pos);
            drop(entries);
            Self::invoke(&callback, Ok(frame));
            return;
        }

        match entries.front() {
            Some(Entry::Chunk(cb)) => {
                let cb = cb.clone();
                drop(entries);
                if !Self::invoke(&cb, Ok(frame)) {
                    tracing::debug!("dropping reply: chunk callback no longer alive");
                    let mut entries = self.entries.lock().await;
                    if matches!(entries.front(), Some(Entry::Chunk(front)) if Weak::ptr_eq(front, &cb))
                    {
                        entries.pop_front();
                    }
                }
            }
            _ => {
                drop(entries);
                Self::invoke(&self.default_callback, Ok(frame));
            }
        }
    }

    /// Delivers [`OpenflowError::Closed`] to every pending entry's callback
    /// (channel close or transport reset) and clears the sequence.
    pub async fn fail_all(&self) {
        let mut entries = self.entries.lock().await;
        for entry in entries.drain(..) {
            let callback = match entry {
                Entry::Chunk(cb) => cb,
                Entry::Barrier { callback, .. } => callback,
            };
            Self::invoke(&callback, Err(OpenflowError::Closed));
        }
    }

    fn invoke(callback: &Weak<ReplyCallback>, frame: Result<Frame>) -> bool {
        match callback.upgrade() {
            Some(cb) => {
                cb(frame);
                true
            }
            None => false,
        }
    }
}
