//! Branching subsystem: jack-in and monitor side channels spliced through a
//! live parent connection.
//!
//! Grounded on the parent/child reference pattern already used by
//! [`crate::channel::Channel`] (parent holds children strongly, each child
//! holds the parent weakly) and on the accept-loop idiom from the teacher's
//! `rapace::server::run_tcp_server`, adapted to Unix-domain listeners whose
//! path is renamed once the datapath id is known.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use openflow_core::error::{OpenflowError, Result};
use openflow_core::{codec, types, Frame, Framer, SharedReader, Transport};
use parking_lot::Mutex;
use tokio::net::UnixListener;
use tokio::task::AbortHandle;

use crate::channel::Channel;
use crate::handler::weak_callback;

/// One running jack-in or monitor listener owned by a parent [`Channel`].
pub struct Branch {
    kind: BranchKind,
    path: Mutex<PathBuf>,
    socket_dir: Option<PathBuf>,
    pid: u32,
    children: Mutex<Vec<Arc<BranchChild>>>,
    stopped: AtomicBool,
    accept_task: Mutex<Option<AbortHandle>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BranchKind {
    Jackin,
    Monitor,
}

impl BranchKind {
    fn suffix(self) -> &'static str {
        match self {
            BranchKind::Jackin => "jackin",
            BranchKind::Monitor => "monitor",
        }
    }
}

/// A child channel attached to a [`Branch`]: either forwarding (jack-in) or
/// passively observing (monitor).
struct BranchChild {
    transport: Arc<Transport>,
    kind: BranchKind,
    /// The parent this child forwards messages to. Weak: the child must not
    /// keep the parent alive past its own close.
    parent: Weak<Channel>,
    /// Strong handle for the `send_to_child` callback the sequencer holds
    /// weakly; kept alive for as long as the child itself so replies can
    /// still reach it.
    send_to_child: crate::handler::ReplyCallbackHandle,
    closed: AtomicBool,
}

impl Branch {
    fn new(kind: BranchKind, pid: u32, socket_dir: Option<PathBuf>) -> Arc<Self> {
        let path = socket_dir
            .clone()
            .unwrap_or_default()
            .join(format!("unknown-{pid}.{}", kind.suffix()));
        Arc::new(Self {
            kind,
            path: Mutex::new(path),
            socket_dir,
            pid,
            children: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            accept_task: Mutex::new(None),
        })
    }

    /// Binds the Unix listener at the current (`unknown-<pid>`) path and
    /// spawns the accept loop.
    async fn start(self: &Arc<Self>, parent: Weak<Channel>) -> Result<()> {
        let path = self.path.lock().clone();
        if path.exists() {
            std::fs::remove_file(&path).ok();
        }
        let listener = UnixListener::bind(&path)
            .map_err(|err| OpenflowError::ProtocolFraming(format!("bind {path:?}: {err}")))?;
        tracing::info!(path = %path.display(), kind = self.kind.suffix(), "branch listener bound");

        let branch = self.clone();
        let handle = tokio::spawn(async move {
            branch.accept_loop(listener, parent).await;
        });
        *self.accept_task.lock() = Some(handle.abort_handle());
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: UnixListener, parent: Weak<Channel>) {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            let (stream, _addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "branch accept failed");
                    return;
                }
            };
            let Some(parent_channel) = parent.upgrade() else {
                return;
            };
            let branch = self.clone();
            tokio::spawn(async move {
                branch.serve_child(stream, parent_channel).await;
            });
        }
    }

    async fn serve_child(self: Arc<Self>, stream: tokio::net::UnixStream, parent: Arc<Channel>) {
        let transport = Arc::new(Transport::unix_stream(stream));
        let send_to_child: crate::handler::ReplyCallbackHandle = {
            let transport = transport.clone();
            Arc::new(move |reply: Result<Frame>| {
                let transport = transport.clone();
                tokio::spawn(async move {
                    if let Ok(frame) = reply {
                        if let Err(err) = transport.send(frame.as_bytes()).await {
                            tracing::debug!(error = %err, "failed writing reply to jackin child");
                        }
                    }
                });
            })
        };
        let child = Arc::new(BranchChild {
            transport: transport.clone(),
            kind: self.kind,
            parent: Arc::downgrade(&parent),
            send_to_child,
            closed: AtomicBool::new(false),
        });
        self.children.lock().push(child.clone());

        if let Err(err) = child.run().await {
            tracing::debug!(error = %err, "branch child closed");
        }
        transport.close();
        self.children.lock().retain(|c| !Arc::ptr_eq(c, &child));
    }

    /// Renames the listener's socket path from `unknown-<pid>` to
    /// `<datapath-hex>-<pid>` once the parent's datapath id is known. No-op
    /// if already renamed.
    pub fn rename_for_datapath(&self, datapath_id: u64) {
        let mut path = self.path.lock();
        let new_path = self
            .socket_dir
            .clone()
            .unwrap_or_default()
            .join(format!("{datapath_id:x}-{}.{}", self.pid, self.kind.suffix()));
        if *path == new_path {
            return;
        }
        if path.exists() {
            std::fs::rename(&*path, &new_path).ok();
        }
        *path = new_path;
    }

    /// Stops accepting, removes the socket path, and closes every attached
    /// child. Aborts the accept-loop task directly rather than relying on it
    /// to notice `stopped` on its own: a task parked in `listener.accept()`
    /// never wakes up again once the socket path is unlinked out from under
    /// it, since no new connection will arrive to return control to the loop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.accept_task.lock().take() {
            handle.abort();
        }
        let path = self.path.lock().clone();
        std::fs::remove_file(&path).ok();
        for child in self.children.lock().drain(..) {
            child.close();
        }
    }
}

impl BranchChild {
    async fn run(self: &Arc<Self>) -> Result<()> {
        let Some(parent) = self.parent.upgrade() else {
            return Err(OpenflowError::Closed);
        };
        let version = parent.version().ok_or(OpenflowError::Closed)?;
        let xid = openflow_core::xid::global().next_xid();
        crate::handshake::send_hello(&self.transport, &[version], xid).await?;

        let reader = SharedReader(self.transport.clone());
        let mut framer = Framer::new(reader);
        let mut saw_hello = false;

        loop {
            let frame = framer.recv_frame().await?;
            if !saw_hello {
                if frame.typ() != types::msg_type::HELLO {
                    return Err(OpenflowError::ProtocolFraming(
                        "expected HELLO as first branch message".into(),
                    ));
                }
                saw_hello = true;
                continue;
            }

            match self.kind {
                BranchKind::Jackin => self.forward(&parent, frame).await?,
                BranchKind::Monitor => self.reject_send(frame).await?,
            }
        }
    }

    async fn forward(&self, parent: &Arc<Channel>, frame: Frame) -> Result<()> {
        let callback = weak_callback(&self.send_to_child);
        parent.send(frame, callback).await
    }

    async fn reject_send(&self, frame: Frame) -> Result<()> {
        let error = codec::build_error(
            frame.version(),
            frame.xid(),
            types::error_type::BAD_REQUEST,
            types::bad_request_code::EPERM,
            b"monitor channel is read-only",
        );
        self.transport.send(error.as_bytes()).await?;
        Err(OpenflowError::ProtocolFraming(
            "monitor child attempted a non-HELLO send".into(),
        ))
    }

    /// Writes a message the parent received to this monitor child, verbatim.
    async fn broadcast(&self, frame: &Frame) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Err(err) = self.transport.send(frame.as_bytes()).await {
            tracing::debug!(error = %err, "failed broadcasting to monitor child");
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.transport.close();
    }
}

/// Owns the optional jack-in and monitor listeners for one parent channel.
pub struct Branches {
    jackin: Option<Arc<Branch>>,
    monitor: Option<Arc<Branch>>,
}

impl Branches {
    pub fn none() -> Self {
        Self {
            jackin: None,
            monitor: None,
        }
    }

    /// Starts the configured listeners (jackin/monitor flags carried on
    /// [`crate::config::ServerConfig`]) bound under `socket_dir`, attached to
    /// `parent`.
    pub async fn start(
        jackin: bool,
        monitor: bool,
        socket_dir: Option<PathBuf>,
        parent: &Arc<Channel>,
    ) -> Result<Self> {
        let pid = std::process::id();
        let mut branches = Self::none();
        if jackin {
            let branch = Branch::new(BranchKind::Jackin, pid, socket_dir.clone());
            branch.start(Arc::downgrade(parent)).await?;
            branches.jackin = Some(branch);
        }
        if monitor {
            let branch = Branch::new(BranchKind::Monitor, pid, socket_dir.clone());
            branch.start(Arc::downgrade(parent)).await?;
            branches.monitor = Some(branch);
        }
        Ok(branches)
    }

    /// Renames both listener paths once the parent's datapath id is known.
    pub fn rename_for_datapath(&self, datapath_id: u64) {
        if let Some(branch) = &self.jackin {
            branch.rename_for_datapath(datapath_id);
        }
        if let Some(branch) = &self.monitor {
            branch.rename_for_datapath(datapath_id);
        }
    }

    /// Broadcasts a parent-received message to every monitor child, in
    /// receive order.
    pub async fn broadcast(&self, frame: &Frame) {
        let Some(branch) = &self.monitor else {
            return;
        };
        let children = branch.children.lock().clone();
        for child in children {
            child.broadcast(frame).await;
        }
    }

    pub fn stop(&self) {
        if let Some(branch) = &self.jackin {
            branch.stop();
        }
        if let Some(branch) = &self.monitor {
            branch.stop();
        }
    }
}

