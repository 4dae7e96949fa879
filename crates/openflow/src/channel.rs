//! Channel core: the per-connection entity composing handshake, auto-echo,
//! the barrier sequencer, the sync tracker and the port monitor into one
//! recommended behavior chain (Framing -> Handshake -> AutoEcho ->
//! Sequencer/Sync/PortMonitor -> Parallelizer -> user handler).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use openflow_core::error::{OpenflowError, Result};
use openflow_core::{codec, types, Frame, Framer, PortEntry, SharedReader, Transport};

#[cfg(feature = "stream")]
use crate::branch::Branches;
use crate::config::ChannelConfig;
use crate::handler::{weak_callback, AsyncHandler, DefaultHandler, ReplyCallback, ReplyCallbackHandle};
use crate::handshake;
use crate::parallel::Parallelizer;
use crate::port_monitor::PortMonitor;
use crate::sequencer::Sequencer;
use crate::sync::{self, SyncTracker};

/// A live OpenFlow connection: owns its transport and every piece of
/// per-channel behavior state. Cheap to clone (reference-counted); the
/// receive loop and any outstanding Sync callers share the same instance.
pub struct Channel {
    transport: Arc<Transport>,
    version: OnceLock<u8>,
    config: ChannelConfig,
    sequencer: Sequencer,
    sync: SyncTracker,
    port_monitor: PortMonitor,
    parallelizer: Parallelizer,
    async_handler: Option<Arc<dyn AsyncHandler>>,
    default_handler: ReplyCallbackHandle,
    #[cfg(feature = "stream")]
    branches: OnceLock<Branches>,
    closed: AtomicBool,
    span: tracing::Span,
}

impl Channel {
    /// Constructs a channel over an already-established `transport`.
    /// `default_handler` receives every reply the sequencer doesn't route
    /// more specifically; `async_handler`, if set, receives `PACKET_IN`,
    /// `FLOW_REMOVED` and `PORT_STATUS` via the parallelizer.
    pub fn new(
        transport: Transport,
        config: ChannelConfig,
        default_handler: impl DefaultHandler,
        async_handler: Option<Arc<dyn AsyncHandler>>,
    ) -> Arc<Self> {
        let default_handler: ReplyCallbackHandle = Arc::new(move |frame| default_handler.handle(frame));
        let sync_timeout = config.sync_timeout;
        let parallelizer_config = config.parallelizer.clone();

        Arc::new_cyclic(|weak: &Weak<Channel>| {
            let weak_for_close = weak.clone();
            Channel {
                transport: Arc::new(transport),
                version: OnceLock::new(),
                config,
                sequencer: Sequencer::new(weak_callback(&default_handler)),
                sync: SyncTracker::new(sync_timeout),
                port_monitor: PortMonitor::new(),
                parallelizer: Parallelizer::new(
                    &parallelizer_config,
                    Arc::new(move || {
                        if let Some(channel) = weak_for_close.upgrade() {
                            channel.request_close();
                        }
                    }),
                ),
                async_handler,
                default_handler,
                #[cfg(feature = "stream")]
                branches: OnceLock::new(),
                closed: AtomicBool::new(false),
                span: tracing::info_span!("openflow_channel"),
            }
        })
    }

    pub fn version(&self) -> Option<u8> {
        self.version.get().copied()
    }

    pub fn datapath_id(&self) -> Option<u64> {
        self.sequencer.datapath_id()
    }

    pub fn auxiliary_id(&self) -> Option<u8> {
        self.sequencer.auxiliary_id()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.transport.is_closed()
    }

    /// Sends this channel's `HELLO`. Must be called before [`Channel::run`].
    pub async fn start(&self) -> Result<()> {
        let xid = openflow_core::xid::global().next_xid();
        handshake::send_hello(&self.transport, &self.config.accepted_versions, xid).await
    }

    /// Opens the jack-in/monitor listeners for this channel, if configured.
    /// Idempotent: a second call is a no-op once listeners are running.
    #[cfg(feature = "stream")]
    pub async fn start_branches(
        self: &Arc<Self>,
        jackin: bool,
        monitor: bool,
        socket_dir: Option<PathBuf>,
    ) -> Result<()> {
        if !jackin && !monitor || self.branches.get().is_some() {
            return Ok(());
        }
        let branches = Branches::start(jackin, monitor, socket_dir, self).await?;
        self.branches.set(branches).ok();
        Ok(())
    }

    #[cfg(not(feature = "stream"))]
    pub async fn start_branches(
        self: &Arc<Self>,
        _jackin: bool,
        _monitor: bool,
        _socket_dir: Option<PathBuf>,
    ) -> Result<()> {
        Ok(())
    }

    #[cfg(feature = "stream")]
    fn stop_branches(&self) {
        if let Some(branches) = self.branches.get() {
            branches.stop();
        }
    }

    #[cfg(not(feature = "stream"))]
    fn stop_branches(&self) {}

    #[cfg(feature = "stream")]
    async fn broadcast_to_branches(&self, frame: &Frame) {
        if let Some(branches) = self.branches.get() {
            branches.broadcast(frame).await;
        }
    }

    #[cfg(not(feature = "stream"))]
    async fn broadcast_to_branches(&self, _frame: &Frame) {}

    #[cfg(feature = "stream")]
    fn rename_branches_for_datapath(&self, datapath_id: u64) {
        if let Some(branches) = self.branches.get() {
            branches.rename_for_datapath(datapath_id);
        }
    }

    #[cfg(not(feature = "stream"))]
    fn rename_branches_for_datapath(&self, _datapath_id: u64) {}

    /// Drives the receive loop until the channel closes (protocol error,
    /// handler-requested close, or peer transport close).
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let _guard = self.span.enter();
        let reader = SharedReader(self.transport.clone());
        let mut framer = Framer::new(reader);

        let result = self.receive_loop(&mut framer).await;
        self.sequencer.fail_all().await;
        self.sync.close_all();
        self.stop_branches();
        self.transport.close();
        if let Err(err) = &result {
            tracing::warn!(error = %err, "channel closed");
        } else {
            tracing::info!("channel closed");
        }
        result
    }

    async fn receive_loop(self: &Arc<Self>, framer: &mut Framer<SharedReader>) -> Result<()> {
        loop {
            if self.is_closed() {
                return Ok(());
            }
            let frame = framer.recv_frame().await?;

            if self.version.get().is_none() {
                let xid = openflow_core::xid::global().next_xid();
                let negotiated =
                    handshake::negotiate(&self.transport, &self.config.accepted_versions, &frame, xid)
                        .await?;
                self.version.set(negotiated).ok();
                tracing::info!(version = negotiated, "handshake complete");
                continue;
            }

            self.dispatch(frame).await;
        }
    }

    async fn dispatch(self: &Arc<Self>, frame: Frame) {
        let version = self.version().unwrap_or(frame.version());

        self.broadcast_to_branches(&frame).await;

        match crate::echo::intercept(&self.transport, &frame).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to answer ECHO_REQUEST");
                return;
            }
        }

        if frame.typ() == types::msg_type::FEATURES_REPLY {
            if let Some((dpid, aux)) = codec::parse_features_reply(&frame) {
                self.sequencer.record_features(dpid, aux);
                self.rename_branches_for_datapath(dpid);
            }
        }

        if frame.typ() == types::msg_type::PORT_STATUS {
            self.port_monitor.apply_status(version, &frame).await;
        }

        if self.sync.try_route(&frame) {
            return;
        }

        if types::is_async_message(frame.typ()) {
            if let Some(handler) = self.async_handler.clone() {
                self.parallelizer.dispatch_async(frame, handler);
            }
            return;
        }

        let channel = self.clone();
        self.parallelizer.dispatch_unbounded(async move {
            channel.sequencer.route_reply(frame, version).await;
        });
    }

    /// Requests the channel close itself at the next opportunity (mirrors a
    /// handler raising `ChannelClose`); idempotent.
    pub fn request_close(&self) {
        self.closed.store(true, Ordering::Release);
        self.transport.close();
    }

    /// Sends `frame` under `callback`; the sequencer inserts a fencing
    /// barrier first if the active callback is changing.
    pub async fn send(&self, frame: Frame, callback: Weak<ReplyCallback>) -> Result<()> {
        let version = self.version().ok_or(OpenflowError::Closed)?;
        self.sequencer.send(&self.transport, version, frame, callback).await
    }

    /// Sends `frame` attributed to this channel's default handler.
    pub async fn send_default(&self, frame: Frame) -> Result<()> {
        self.send(frame, weak_callback(&self.default_handler)).await
    }

    fn require_version(&self) -> Result<u8> {
        self.version().ok_or(OpenflowError::Closed)
    }

    pub async fn echo(&self, payload: &[u8]) -> Result<Bytes> {
        let version = self.require_version()?;
        let xid = self.sync.next_xid();
        let mut out = Vec::with_capacity(8 + payload.len());
        out.extend_from_slice(
            &openflow_core::Header::new(version, types::msg_type::ECHO_REQUEST, (8 + payload.len()) as u16, xid)
                .to_bytes(),
        );
        out.extend_from_slice(payload);
        let frame = Frame::new(Bytes::from(out));
        let frames = self.sync.call(&self.transport, frame, self.config.sync_timeout).await?;
        Ok(sync::concat_frames(&frames))
    }

    pub async fn feature(&self) -> Result<(u64, Option<u8>)> {
        let version = self.require_version()?;
        let xid = self.sync.next_xid();
        let request = openflow_core::frame::header_only(version, types::msg_type::FEATURES_REQUEST, xid);
        let frames = self.sync.call(&self.transport, request, self.config.sync_timeout).await?;
        let reply = frames.first().ok_or(OpenflowError::Closed)?;
        codec::parse_features_reply(reply).ok_or(OpenflowError::Closed)
    }

    pub async fn get_config(&self) -> Result<Bytes> {
        let version = self.require_version()?;
        let xid = self.sync.next_xid();
        let request = openflow_core::frame::header_only(version, types::msg_type::GET_CONFIG_REQUEST, xid);
        let frames = self.sync.call(&self.transport, request, self.config.sync_timeout).await?;
        Ok(sync::concat_frames(&frames))
    }

    pub async fn barrier(&self) -> Result<()> {
        let version = self.require_version()?;
        let xid = self.sync.next_xid();
        let request = codec::build_barrier_request_with_xid(version, xid);
        self.sync.call(&self.transport, request, self.config.sync_timeout).await?;
        Ok(())
    }

    pub async fn single(&self, frame: Frame) -> Result<Bytes> {
        let frames = self.sync.call(&self.transport, frame, self.config.sync_timeout).await?;
        Ok(sync::concat_frames(&frames))
    }

    pub async fn multi(&self, frames: Vec<Frame>) -> Result<Vec<Option<Bytes>>> {
        let version = self.require_version()?;
        let harvested = self.sync.multi(&self.transport, version, frames).await?;
        Ok(harvested
            .into_iter()
            .map(|maybe| maybe.map(|fs| sync::concat_frames(&fs)))
            .collect())
    }

    pub async fn ports(&self) -> Result<Vec<PortEntry>> {
        let version = self.require_version()?;
        self.port_monitor
            .ports(&self.transport, version, &self.sync, self.config.sync_timeout)
            .await
    }

    pub async fn wait_attach(&self, port_no: u32, timeout: std::time::Duration) -> Option<PortEntry> {
        self.port_monitor.wait_attach(port_no, timeout).await
    }

    pub async fn wait_detach(&self, port_no: u32, timeout: std::time::Duration) -> Option<()> {
        self.port_monitor.wait_detach(port_no, timeout).await
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}
