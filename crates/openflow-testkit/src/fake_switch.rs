//! [`FakeSwitch`]: the switch side of an in-memory [`Channel`] pair, driven
//! by a scripted sequence of sends and expectations.

use std::sync::Arc;
use std::time::Duration;

use openflow::{AsyncHandler, Channel, ChannelConfig, DefaultHandler};
use openflow_core::error::{OpenflowError, Result};
use openflow_core::{Frame, Framer, SharedReader, Transport};

/// One step of a scripted exchange: send a frame to the controller, assert
/// the next frame received is of a given type, or wait.
pub enum Step {
    Send(Frame),
    Expect(u8),
    Sleep(Duration),
}

/// Drives the switch side of an in-process [`Channel`] under test. Wraps the
/// `Mem` transport's other half with its own [`Framer`] so scripted tests can
/// send arbitrary frames and assert on what the controller sends back,
/// without a real socket.
pub struct FakeSwitch {
    transport: Arc<Transport>,
    framer: Framer<SharedReader>,
}

impl FakeSwitch {
    /// Builds a connected in-memory pair: the returned `Channel` is the
    /// controller under test, wired to `default_handler`/`async_handler`;
    /// `FakeSwitch` is the scripted peer.
    pub fn pair(
        config: ChannelConfig,
        default_handler: impl DefaultHandler,
        async_handler: Option<Arc<dyn AsyncHandler>>,
    ) -> (Arc<Channel>, Self) {
        let (switch_side, controller_side) = Transport::mem_pair();
        let switch_side = Arc::new(switch_side);
        let framer = Framer::new(SharedReader(switch_side.clone()));
        let channel = Channel::new(controller_side, config, default_handler, async_handler);
        (
            channel,
            Self {
                transport: switch_side,
                framer,
            },
        )
    }

    /// Sends `frame` to the controller.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        tracing::debug!(typ = frame.typ(), xid = frame.xid(), "fake switch send");
        self.transport.send(frame.as_bytes()).await?;
        Ok(())
    }

    /// Receives the next frame the controller sent.
    pub async fn recv(&mut self) -> Result<Frame> {
        self.framer.recv_frame().await
    }

    /// Receives the next frame and asserts its type.
    pub async fn expect(&mut self, typ: u8) -> Result<Frame> {
        let frame = self.recv().await?;
        if frame.typ() != typ {
            return Err(OpenflowError::ProtocolFraming(format!(
                "expected message type {typ}, got {}",
                frame.typ()
            )));
        }
        Ok(frame)
    }

    /// Runs a script of [`Step`]s in order, returning every frame captured by
    /// an `Expect` step.
    pub async fn run(&mut self, steps: Vec<Step>) -> Result<Vec<Frame>> {
        let mut captured = Vec::new();
        for step in steps {
            match step {
                Step::Send(frame) => self.send(frame).await?,
                Step::Expect(typ) => captured.push(self.expect(typ).await?),
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
            }
        }
        Ok(captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders;
    use openflow_core::types;
    use std::time::Duration;

    fn config(versions: &[u8]) -> ChannelConfig {
        ChannelConfig {
            accepted_versions: versions.to_vec(),
            sync_timeout: Duration::from_secs(1),
            ..ChannelConfig::default()
        }
    }

    #[tokio::test]
    async fn handshake_happy_path() {
        let (channel, mut switch) = FakeSwitch::pair(config(&[1, 4]), |_| {}, None);
        channel.start().await.unwrap();
        switch.expect(types::msg_type::HELLO).await.unwrap();

        switch
            .send(builders::build_hello(&[4], 1))
            .await
            .unwrap();

        let runner = channel.clone();
        tokio::spawn(async move {
            let _ = runner.run().await;
        });

        // Give the receive loop a turn to process the HELLO.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(channel.version(), Some(4));
    }

    #[tokio::test]
    async fn handshake_mismatch_closes_with_error() {
        let (channel, mut switch) = FakeSwitch::pair(config(&[4]), |_| {}, None);
        channel.start().await.unwrap();
        switch.expect(types::msg_type::HELLO).await.unwrap();
        switch.send(builders::build_hello(&[1], 1)).await.unwrap();

        let result = channel.run().await;
        assert!(result.is_err());
        let error = switch.expect(types::msg_type::ERROR).await.unwrap();
        let payload = openflow_core::codec::parse_error(&error).unwrap();
        assert_eq!(payload.typ, types::error_type::HELLO_FAILED);
    }

    /// Exercises the "E1 under callback A, E2 under callback B" scenario:
    /// each callback change fences a `BARRIER_REQUEST`, and a reply is only
    /// delivered to the callback active at the time it arrives.
    #[tokio::test]
    async fn barrier_fences_distinct_callbacks() {
        let (channel, mut switch) = FakeSwitch::pair(config(&[4]), |_| {}, None);
        channel.start().await.unwrap();
        switch.expect(types::msg_type::HELLO).await.unwrap();
        switch.send(builders::build_hello(&[4], 1)).await.unwrap();

        let runner = channel.clone();
        tokio::spawn(async move {
            let _ = runner.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        use std::sync::atomic::{AtomicU32, Ordering};
        let a_seen: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let b_seen: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let (a_seen_cb, b_seen_cb) = (a_seen.clone(), b_seen.clone());

        let callback_a: Arc<openflow::ReplyCallback> = Arc::new(move |frame| {
            if let Ok(frame) = frame {
                a_seen_cb.store(frame.xid(), Ordering::SeqCst);
            }
        });
        let callback_b: Arc<openflow::ReplyCallback> = Arc::new(move |frame| {
            if let Ok(frame) = frame {
                b_seen_cb.store(frame.xid(), Ordering::SeqCst);
            }
        });

        let e1 = openflow_core::frame::header_only(4, types::msg_type::FEATURES_REQUEST, 101);
        channel
            .send(e1, openflow::weak_callback(&callback_a))
            .await
            .unwrap();

        // Callback A differs from the channel's default callback, so the
        // sequencer fences it with a barrier before E1 goes out.
        let barrier_a = switch.expect(types::msg_type::BARRIER_REQUEST).await.unwrap();
        let first = switch.recv().await.unwrap();
        assert_eq!(first.xid(), 101);

        let e2 = openflow_core::frame::header_only(4, types::msg_type::GET_CONFIG_REQUEST, 102);
        channel
            .send(e2, openflow::weak_callback(&callback_b))
            .await
            .unwrap();

        // Callback B differs from A, so the sequencer fences again.
        let barrier_b = switch.expect(types::msg_type::BARRIER_REQUEST).await.unwrap();
        let second = switch.recv().await.unwrap();
        assert_eq!(second.xid(), 102);

        switch.send(builders::barrier_reply(4, barrier_a.xid())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // ER1 reaches callback A: it's still the front Chunk.
        let er1 = openflow_core::frame::header_only(4, types::msg_type::FEATURES_REPLY, 101);
        switch.send(er1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(a_seen.load(Ordering::SeqCst), 101);
        assert_eq!(b_seen.load(Ordering::SeqCst), 0);

        switch.send(builders::barrier_reply(4, barrier_b.xid())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // ER2 reaches callback B now that A's chunk has been swept.
        let er2 = openflow_core::frame::header_only(4, types::msg_type::GET_CONFIG_REPLY, 102);
        switch.send(er2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(b_seen.load(Ordering::SeqCst), 102);
    }

    #[tokio::test]
    async fn multipart_fragments_concatenate() {
        let (channel, mut switch) = FakeSwitch::pair(config(&[4]), |_| {}, None);
        channel.start().await.unwrap();
        switch.expect(types::msg_type::HELLO).await.unwrap();
        switch.send(builders::build_hello(&[4], 1)).await.unwrap();

        let runner = channel.clone();
        tokio::spawn(async move {
            let _ = runner.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let request = openflow_core::codec::build_multipart_request(
            4,
            types::MULTIPART_TYPE_PORT_DESC,
            55,
        );
        let call = tokio::spawn({
            let channel = channel.clone();
            async move { channel.single(request).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        // 200-byte fragments: 8-byte header + 8-byte multipart subheader + body.
        let fragment_body = vec![0xAAu8; 200 - 8 - 8];
        switch
            .send(builders::multipart_reply(
                4,
                55,
                types::MULTIPART_TYPE_PORT_DESC,
                true,
                &fragment_body,
            ))
            .await
            .unwrap();
        switch
            .send(builders::multipart_reply(
                4,
                55,
                types::MULTIPART_TYPE_PORT_DESC,
                false,
                &fragment_body,
            ))
            .await
            .unwrap();

        let result = call.await.unwrap().unwrap();
        assert_eq!(result.len(), 400);
    }

    #[tokio::test]
    async fn port_monitor_initializes_then_tracks_status() {
        let (channel, mut switch) = FakeSwitch::pair(config(&[4]), |_| {}, None);
        channel.start().await.unwrap();
        switch.expect(types::msg_type::HELLO).await.unwrap();
        switch.send(builders::build_hello(&[4], 1)).await.unwrap();

        let runner = channel.clone();
        tokio::spawn(async move {
            let _ = runner.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let ports_call = tokio::spawn({
            let channel = channel.clone();
            async move { channel.ports().await }
        });

        let request = switch.expect(types::msg_type::MULTIPART_REQUEST).await.unwrap();
        let xid = request.xid();

        let first_batch = vec![
            builders::ScriptedPort::new(1, "eth0"),
            builders::ScriptedPort::new(2, "eth1"),
            builders::ScriptedPort::new(3, "eth2"),
        ];
        let second_batch = vec![
            builders::ScriptedPort::new(4, "eth3"),
            builders::ScriptedPort::new(5, "eth4"),
        ];
        switch
            .send(builders::port_desc_reply(4, xid, true, &first_batch))
            .await
            .unwrap();
        switch
            .send(builders::port_desc_reply(4, xid, false, &second_batch))
            .await
            .unwrap();

        let ports = ports_call.await.unwrap().unwrap();
        assert_eq!(ports.len(), 5);

        let wait_handle = tokio::spawn({
            let channel = channel.clone();
            async move { channel.wait_attach(99, Duration::from_secs(1)).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        switch
            .send(builders::port_status(
                4,
                0,
                types::port_reason::ADD,
                &builders::ScriptedPort::new(99, "eth99"),
            ))
            .await
            .unwrap();

        let attached = wait_handle.await.unwrap();
        assert!(attached.is_some());

        let ports_after = channel.ports().await.unwrap();
        assert_eq!(ports_after.len(), 6);
    }
}
