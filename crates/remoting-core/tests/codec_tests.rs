//! Codec tests for remoting core
//!
//! Every message kind must survive serialize -> parse unchanged, including
//! boundary values.

use remoting_core::{codec, Element, Message, ProtocolVersion, SdpKind};

fn roundtrip(msg: &Message) -> Message {
    let encoded = codec::encode(msg).expect("encode failed");
    let (decoded, used) = codec::decode(&encoded).expect("decode failed");
    assert_eq!(used, encoded.len());
    decoded
}

fn element_roundtrip(msg: &Message) -> Message {
    let element = msg.to_element();
    Message::from_element(&element).expect("parse failed")
}

#[test]
fn test_version_both_flags() {
    for depth_alpha in [false, true] {
        let msg = Message::version(ProtocolVersion::LATEST, depth_alpha);
        assert_eq!(roundtrip(&msg), msg);
        assert_eq!(element_roundtrip(&msg), msg);
    }
}

#[test]
fn test_version_extremes() {
    for packed in [0u32, 1, 65792, u32::MAX] {
        let msg = Message::version(ProtocolVersion::from_packed(packed), true);
        assert_eq!(roundtrip(&msg), msg);
    }
}

#[test]
fn test_sdp_both_roles() {
    for kind in [SdpKind::Offer, SdpKind::Answer] {
        let msg = Message::SessionDescription(remoting_core::SessionDescription {
            kind,
            sdp: "v=0\r\no=- 0 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=group:BUNDLE 0\r\n".into(),
        });
        assert_eq!(roundtrip(&msg), msg);
        assert_eq!(element_roundtrip(&msg), msg);
    }
}

#[test]
fn test_sdp_with_markup_characters() {
    let msg = Message::offer("a=fmtp:96 <x> & \"y\" 'z'\r\n");
    assert_eq!(roundtrip(&msg), msg);
}

#[test]
fn test_empty_candidate() {
    let msg = Message::ice_candidate("", 0, "");
    assert_eq!(roundtrip(&msg), msg);
    assert_eq!(element_roundtrip(&msg), msg);
}

#[test]
fn test_mline_index_extremes() {
    for index in [0, 1, i32::MAX, i32::MIN, -1] {
        let msg = Message::ice_candidate("audio", index, "candidate:1 1 udp 2122260223 10.0.0.2 5000 typ host");
        assert_eq!(roundtrip(&msg), msg);
    }
}

#[test]
fn test_unicode_content() {
    let msg = Message::ice_candidate("mïd", 2, "candidate:ü 1 udp 1 ::1 9 typ host");
    assert_eq!(roundtrip(&msg), msg);
}

#[test]
fn test_wire_text_matches_protocol() {
    let cases = [
        (
            Message::version(ProtocolVersion::from_packed(65792), true),
            r#"<Version DepthAlphaEnabled="1">65792</Version>"#,
        ),
        (
            Message::version(ProtocolVersion::from_packed(7), false),
            r#"<Version DepthAlphaEnabled="0">7</Version>"#,
        ),
        (Message::offer("v=0"), r#"<Sdp Type="Offer">v=0</Sdp>"#),
        (Message::answer("v=0"), r#"<Sdp Type="Answer">v=0</Sdp>"#),
        (
            Message::ice_candidate("0", 0, "candidate:abc"),
            r#"<IceCandidate sdp-mid="0" mline-index="0">candidate:abc</IceCandidate>"#,
        ),
    ];

    for (msg, text) in cases {
        assert_eq!(codec::encode_body(&msg), text);
        let encoded = codec::encode(&msg).unwrap();
        assert_eq!(&encoded[..4], &(text.len() as u32).to_be_bytes());
        assert_eq!(&encoded[4..], text.as_bytes());
    }
}

#[test]
fn test_parse_foreign_attribute_order() {
    // Attribute order is not significant on receipt.
    let element =
        Element::parse(r#"<IceCandidate mline-index="1" sdp-mid="video">candidate:x</IceCandidate>"#)
            .unwrap();
    assert_eq!(
        Message::from_element(&element).unwrap(),
        Message::ice_candidate("video", 1, "candidate:x")
    );
}

#[test]
fn test_parse_with_xml_declaration() {
    let body = "<?xml version=\"1.0\" encoding=\"utf-8\"?><Sdp Type=\"Answer\">v=0</Sdp>";
    let msg = codec::decode_body(body.as_bytes()).unwrap();
    assert_eq!(msg, Message::answer("v=0"));
}
