//! Frame encoding tests for remoting core

use remoting_core::frame::{self, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use remoting_core::{codec, Error, ErrorCategory};

fn large_sdp(min_len: usize) -> Vec<u8> {
    let mut sdp = String::from("<Sdp Type=\"Offer\">v=0\r\n");
    let mut i = 0;
    while sdp.len() < min_len {
        sdp.push_str(&format!("a=candidate:{} 1 udp 2122260223 10.0.0.{} 5000 typ host\r\n", i, i % 255));
        i += 1;
    }
    sdp.push_str("</Sdp>");
    sdp.into_bytes()
}

#[test]
fn test_frame_identity_for_small_bodies() {
    for body in [&b""[..], &b"<"[..], &b"<x/>"[..]] {
        let encoded = frame::encode(body).expect("encode failed");
        assert_eq!(encoded.len(), HEADER_SIZE + body.len());

        let (decoded, used) = frame::decode(&encoded, DEFAULT_MAX_FRAME_SIZE)
            .expect("decode failed")
            .expect("frame incomplete");
        assert_eq!(decoded.as_ref(), body);
        assert_eq!(used, encoded.len());
    }
}

#[test]
fn test_frame_identity_large_sdp() {
    let body = large_sdp(48 * 1024);
    let encoded = frame::encode(&body).expect("encode failed");
    let (decoded, _) = frame::decode(&encoded, DEFAULT_MAX_FRAME_SIZE)
        .expect("decode failed")
        .expect("frame incomplete");

    assert_eq!(decoded.len(), body.len());
    assert_eq!(decoded.as_ref(), body.as_slice());
    assert!(codec::decode_body(&decoded).is_ok());
}

#[test]
fn test_frame_back_to_back() {
    let mut stream = frame::encode(b"<a/>").unwrap().to_vec();
    stream.extend_from_slice(&frame::encode(b"<bb/>").unwrap());

    let (first, used) = frame::decode(&stream, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap();
    assert_eq!(first.as_ref(), b"<a/>");

    let (second, _) = frame::decode(&stream[used..], DEFAULT_MAX_FRAME_SIZE)
        .unwrap()
        .unwrap();
    assert_eq!(second.as_ref(), b"<bb/>");
}

#[test]
fn test_corrupt_delimiters_rejected() {
    for body in [&b"Version>1</Version>"[..], &b"<Version>1</Version"[..], &b""[..]] {
        let err = frame::check_delimiters(body).unwrap_err();
        assert!(matches!(err, Error::CorruptFrame(_)));
        assert_eq!(err.category(), ErrorCategory::Framing);
        assert!(err.is_fatal_to_connection());
    }
}

#[test]
fn test_truncated_frame() {
    let encoded = frame::encode(b"<Version>1</Version>").unwrap();
    assert!(frame::decode(&encoded[..3], DEFAULT_MAX_FRAME_SIZE).unwrap().is_none());
    assert!(frame::decode(&encoded[..encoded.len() - 1], DEFAULT_MAX_FRAME_SIZE)
        .unwrap()
        .is_none());
}
