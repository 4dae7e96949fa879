//! Jack-in branching: a Unix client dials the `<datapath>-<pid>.jackin`
//! socket, forwards a request upstream through the live parent channel, and
//! receives the upstream reply back under its own xid.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use openflow::{Channel, ChannelConfig};
use openflow_core::{codec, types, Framer, SharedReader, Transport};
use openflow_testkit::{builders, FakeSwitch};
use tokio::net::UnixStream;

fn config() -> ChannelConfig {
    ChannelConfig {
        accepted_versions: vec![4],
        sync_timeout: Duration::from_secs(2),
        ..ChannelConfig::default()
    }
}

#[tokio::test]
async fn jackin_forwards_to_parent_and_routes_reply_back() {
    let dir = tempfile::tempdir().unwrap();
    let (channel, mut switch) = FakeSwitch::pair(config(), |_| {}, None);

    channel.start().await.unwrap();
    switch.expect(types::msg_type::HELLO).await.unwrap();
    switch.send(builders::build_hello(&[4], 1)).await.unwrap();

    let runner = channel.clone();
    tokio::spawn(async move {
        let _ = runner.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    channel
        .start_branches(true, false, Some(dir.path().to_path_buf()))
        .await
        .unwrap();

    switch
        .send(builders::features_reply(4, 2, 0xabcd, Some(0), &[]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let socket_path: PathBuf = dir.path().join(format!("abcd-{}.jackin", std::process::id()));
    assert!(
        socket_path.exists(),
        "branch socket should be renamed to the datapath id once known"
    );

    let client_stream = UnixStream::connect(&socket_path).await.unwrap();
    let client_transport = Arc::new(Transport::unix_stream(client_stream));
    let mut client_framer = Framer::new(SharedReader(client_transport.clone()));

    let parent_hello = client_framer.recv_frame().await.unwrap();
    assert_eq!(parent_hello.typ(), types::msg_type::HELLO);

    let child_hello = codec::build_hello(&[4], 100);
    client_transport.send(child_hello.as_bytes()).await.unwrap();

    let request = openflow_core::frame::header_only(4, types::msg_type::GET_CONFIG_REQUEST, 7);
    client_transport.send(request.as_bytes()).await.unwrap();

    let barrier = switch.expect(types::msg_type::BARRIER_REQUEST).await.unwrap();
    let forwarded = switch.recv().await.unwrap();
    assert_eq!(forwarded.typ(), types::msg_type::GET_CONFIG_REQUEST);
    assert_eq!(forwarded.xid(), 7);

    switch
        .send(builders::barrier_reply(4, barrier.xid()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let reply = openflow_core::frame::header_only(4, types::msg_type::GET_CONFIG_REPLY, 7);
    switch.send(reply).await.unwrap();

    let delivered = client_framer.recv_frame().await.unwrap();
    assert_eq!(delivered.typ(), types::msg_type::GET_CONFIG_REPLY);
    assert_eq!(delivered.xid(), 7);

    let _: &Arc<Channel> = &channel;
}
