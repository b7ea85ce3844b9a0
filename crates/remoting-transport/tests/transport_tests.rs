//! Signaling Channel Tests
//!
//! Loopback TCP tests for the channel:
//! - Accepting a peer and receiving messages
//! - Dropping unknown elements without ending the loop
//! - Closing on corrupt frames
//! - Client mode
//! - Rebinding a port right after close

use remoting_core::{codec, frame, Message, ProtocolVersion};
use remoting_transport::{ChannelConfig, ChannelEvent, ChannelState, SignalingChannel};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

async fn next_event(events: &mut UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("event stream ended")
}

async fn listening_channel() -> (SignalingChannel, UnboundedReceiver<ChannelEvent>, u16) {
    let (mut channel, events) = SignalingChannel::new(ChannelConfig::default());
    let addr = channel.listen(LOCALHOST, 0).await.unwrap();
    (channel, events, addr.port())
}

async fn read_message(stream: &mut TcpStream) -> Message {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let mut body = vec![0u8; frame::body_len(header)];
    stream.read_exact(&mut body).await.unwrap();
    codec::decode_body(&body).unwrap()
}

// ============================================================================
// Listen / receive
// ============================================================================

#[tokio::test]
async fn test_accept_and_receive() {
    let (channel, mut events, port) = listening_channel().await;
    assert_eq!(channel.state(), ChannelState::Listening);

    let mut peer = TcpStream::connect((LOCALHOST, port)).await.unwrap();
    assert!(matches!(next_event(&mut events).await, ChannelEvent::Connected { .. }));
    assert_eq!(channel.state(), ChannelState::Connected);

    let answer = Message::answer("v=0\r\ns=-\r\n");
    peer.write_all(&codec::encode(&answer).unwrap()).await.unwrap();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Message(answer));

    let candidate = Message::ice_candidate("0", 0, "candidate:1 1 udp 1 10.0.0.1 9 typ host");
    peer.write_all(&codec::encode(&candidate).unwrap()).await.unwrap();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Message(candidate));

    drop(peer);
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Disconnected { reason: None }
    );
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn test_send_reaches_peer_in_order() {
    let (channel, mut events, port) = listening_channel().await;
    let mut peer = TcpStream::connect((LOCALHOST, port)).await.unwrap();
    next_event(&mut events).await;

    let version = Message::version(ProtocolVersion::from_packed(65792), true);
    channel.send(&version).await.unwrap();
    for i in 0..10 {
        channel
            .enqueue(&Message::ice_candidate("0", i, format!("candidate:{}", i)))
            .unwrap();
    }

    assert_eq!(read_message(&mut peer).await, version);
    for i in 0..10 {
        assert_eq!(
            read_message(&mut peer).await,
            Message::ice_candidate("0", i, format!("candidate:{}", i))
        );
    }
}

#[tokio::test]
async fn test_unknown_element_dropped() {
    let (_channel, mut events, port) = listening_channel().await;
    let mut peer = TcpStream::connect((LOCALHOST, port)).await.unwrap();
    next_event(&mut events).await;

    peer.write_all(&frame::encode(b"<Ping Seq=\"1\"/>").unwrap()).await.unwrap();
    peer.write_all(&frame::encode(b"<Sdp>v=0</Sdp>").unwrap()).await.unwrap();
    let answer = Message::answer("v=0");
    peer.write_all(&codec::encode(&answer).unwrap()).await.unwrap();

    // Only the valid message comes through; the loop is still alive
    assert_eq!(next_event(&mut events).await, ChannelEvent::Message(answer));
}

#[tokio::test]
async fn test_corrupt_frame_closes_connection() {
    let (channel, mut events, port) = listening_channel().await;
    let mut peer = TcpStream::connect((LOCALHOST, port)).await.unwrap();
    next_event(&mut events).await;

    peer.write_all(&frame::encode(b"Sdp Type=\"Answer\">v=0</Sdp>").unwrap())
        .await
        .unwrap();

    match next_event(&mut events).await {
        ChannelEvent::Disconnected { reason } => assert!(reason.is_some()),
        other => panic!("expected Disconnected, got {:?}", other),
    }
    assert_eq!(channel.state(), ChannelState::Closed);

    // Our side closed the socket
    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), peer.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}

// ============================================================================
// Client mode
// ============================================================================

#[tokio::test]
async fn test_connect_to_listening_channel() {
    let (host, mut host_events, port) = listening_channel().await;

    let (mut client, mut client_events) = SignalingChannel::new(ChannelConfig::default());
    client.connect("127.0.0.1", port).await.unwrap();

    assert!(matches!(next_event(&mut client_events).await, ChannelEvent::Connected { .. }));
    assert!(matches!(next_event(&mut host_events).await, ChannelEvent::Connected { .. }));

    let offer = Message::offer("v=0 from host");
    host.send(&offer).await.unwrap();
    assert_eq!(next_event(&mut client_events).await, ChannelEvent::Message(offer));

    let answer = Message::answer("v=0 from client");
    client.sender().send(&answer).await.unwrap();
    assert_eq!(next_event(&mut host_events).await, ChannelEvent::Message(answer));

    client.close().await;
    assert!(matches!(
        next_event(&mut client_events).await,
        ChannelEvent::Disconnected { .. }
    ));
    assert!(matches!(
        next_event(&mut host_events).await,
        ChannelEvent::Disconnected { .. }
    ));
}

#[tokio::test]
async fn test_connect_refused() {
    // Grab a free port and release it so nothing listens there
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let (mut client, mut events) = SignalingChannel::new(ChannelConfig::default());
    assert!(client.connect("127.0.0.1", port).await.is_err());
    assert_eq!(client.state(), ChannelState::Idle);

    drop(client);
    assert!(events.recv().await.is_none());
}

// ============================================================================
// Close / rebind
// ============================================================================

#[tokio::test]
async fn test_rebind_after_close() {
    let (mut first, mut events, port) = listening_channel().await;
    first.close().await;
    assert!(matches!(next_event(&mut events).await, ChannelEvent::Disconnected { .. }));

    let (mut second, _events) = SignalingChannel::new(ChannelConfig::default());
    let addr = second.listen(LOCALHOST, port).await.unwrap();
    assert_eq!(addr.port(), port);

    let _peer = TcpStream::connect((LOCALHOST, port)).await.unwrap();
    second.close().await;
}

#[tokio::test]
async fn test_close_connected_channel() {
    let (mut channel, mut events, port) = listening_channel().await;
    let mut peer = TcpStream::connect((LOCALHOST, port)).await.unwrap();
    next_event(&mut events).await;

    channel.close().await;
    assert_eq!(
        next_event(&mut events).await,
        ChannelEvent::Disconnected {
            reason: Some("channel closed".into())
        }
    );

    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), peer.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);

    drop(channel);
    assert!(events.recv().await.is_none());
}
