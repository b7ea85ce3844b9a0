//! Frame Reader and Send Queue Tests
//!
//! Drive the reader through in-memory pipes to exercise:
//! - Partial reads down to one byte at a time
//! - The stalled-read budget
//! - Corrupt delimiters
//! - Write ordering under a slow writer

use bytes::Bytes;
use remoting_core::{codec, frame, Message};
use remoting_transport::{ChannelConfig, FrameReader, SendQueue, TransportError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, Sleep};

fn sample_answer() -> Message {
    let mut sdp = String::from("v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\n");
    for i in 0..64 {
        sdp.push_str(&format!("a=candidate:{} 1 udp 2122260223 192.168.0.{} 9 typ host\r\n", i, i));
    }
    Message::answer(sdp)
}

// ============================================================================
// Partial reads
// ============================================================================

#[tokio::test]
async fn test_one_byte_at_a_time() {
    let msg = sample_answer();
    let encoded = codec::encode(&msg).unwrap();

    // A one-byte pipe forces every read to return at most one byte
    let (mut tx, rx) = tokio::io::duplex(1);
    let writer = tokio::spawn(async move {
        for byte in encoded.iter() {
            tx.write_all(&[*byte]).await.unwrap();
        }
        tx
    });

    let mut reader = FrameReader::new(rx, &ChannelConfig::default());
    let body = reader.read_frame().await.unwrap().expect("frame");
    assert_eq!(codec::decode_body(&body).unwrap(), msg);

    drop(writer.await.unwrap());
    assert!(reader.read_frame().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_peer_within_budget() {
    // Every byte arrives after the stall timeout, but each one is progress
    let encoded = frame::encode(b"<Version>1</Version>").unwrap();
    let (mut tx, rx) = tokio::io::duplex(64);
    tokio::spawn(async move {
        for byte in encoded.iter() {
            tx.write_all(&[*byte]).await.unwrap();
            sleep(Duration::from_millis(700)).await;
        }
        tx
    });

    let mut reader = FrameReader::new(rx, &ChannelConfig::default());
    let body = reader.read_frame().await.unwrap().unwrap();
    assert_eq!(body.as_ref(), b"<Version>1</Version>");
}

#[tokio::test(start_paused = true)]
async fn test_stalled_mid_frame() {
    let (mut tx, rx) = tokio::io::duplex(64);
    let encoded = frame::encode(b"<Version>1</Version>").unwrap();
    tx.write_all(&encoded[..7]).await.unwrap();

    let config = ChannelConfig {
        read_attempts: 3,
        read_stall_timeout_ms: 100,
        ..Default::default()
    };
    let mut reader = FrameReader::new(rx, &config);
    let err = reader.read_frame().await.unwrap_err();
    assert!(matches!(err, TransportError::ReadStalled { attempts: 3 }));

    drop(tx);
}

#[tokio::test]
async fn test_eof_mid_body_is_end_of_stream() {
    let (mut tx, rx) = tokio::io::duplex(64);
    let encoded = frame::encode(b"<Version>1</Version>").unwrap();
    tx.write_all(&encoded[..10]).await.unwrap();
    drop(tx);

    let mut reader = FrameReader::new(rx, &ChannelConfig::default());
    assert!(reader.read_frame().await.unwrap().is_none());
}

// ============================================================================
// Corruption
// ============================================================================

#[tokio::test]
async fn test_bad_delimiters_are_framing_errors() {
    for body in [&b"Version>1</Version>"[..], &b"<Version>1</Version"[..]] {
        let (mut tx, rx) = tokio::io::duplex(64);
        tx.write_all(&frame::encode(body).unwrap()).await.unwrap();

        let mut reader = FrameReader::new(rx, &ChannelConfig::default());
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Framing(remoting_core::Error::CorruptFrame(_))
        ));
        assert_eq!(err.category(), remoting_core::ErrorCategory::Framing);
    }
}

// ============================================================================
// Send ordering
// ============================================================================

/// Writer that accepts at most `chunk` bytes per call and sleeps before
/// the very first write
struct SlowWriter {
    out: Arc<parking_lot::Mutex<Vec<u8>>>,
    first_delay: Option<Pin<Box<Sleep>>>,
    chunk: usize,
}

impl AsyncWrite for SlowWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if let Some(delay) = self.first_delay.as_mut() {
            if delay.as_mut().poll(cx).is_pending() {
                return Poll::Pending;
            }
            self.first_delay = None;
        }

        let n = buf.len().min(self.chunk);
        self.out.lock().extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_delayed_first_send_stays_first() {
    let out = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let writer = SlowWriter {
        out: out.clone(),
        first_delay: Some(Box::pin(sleep(Duration::from_millis(100)))),
        chunk: 7,
    };
    let (queue, _task) = SendQueue::spawn(writer);

    let a = codec::encode(&Message::offer("v=0 first")).unwrap();
    let b = codec::encode(&Message::ice_candidate("0", 0, "candidate:second")).unwrap();

    let queue_a = queue.clone();
    let queue_b = queue.clone();
    let (frame_a, frame_b) = (a.clone(), b.clone());
    let (ra, rb) = tokio::join!(
        async move { queue_a.send(frame_a).await },
        async move {
            tokio::task::yield_now().await;
            queue_b.send(frame_b).await
        }
    );
    ra.unwrap();
    rb.unwrap();

    let mut expected = a.to_vec();
    expected.extend_from_slice(&b);
    assert_eq!(*out.lock(), expected);
}

#[tokio::test]
async fn test_enqueue_order_across_tasks() {
    let out = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let writer = SlowWriter {
        out: out.clone(),
        first_delay: Some(Box::pin(sleep(Duration::from_millis(20)))),
        chunk: 3,
    };
    let (queue, _task) = SendQueue::spawn(writer);

    // Each task submits only after the previous one has
    let mut expected = Vec::new();
    for i in 0..20 {
        let frame = Bytes::from(format!("<{}>", i));
        expected.extend_from_slice(&frame);
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue(frame) })
            .await
            .unwrap()
            .unwrap();
    }

    queue.send(Bytes::from_static(b"<end>")).await.unwrap();
    expected.extend_from_slice(b"<end>");
    assert_eq!(*out.lock(), expected);
}
