//! Message encoding and decoding
//!
//! Glues the message model to the frame layer:
//! `Message -> Element -> UTF-8 text -> length-prefixed frame` and back.

use crate::frame::{self, DEFAULT_MAX_FRAME_SIZE};
use crate::{Element, Error, Message, Result};
use bytes::Bytes;

/// Encode a message into a complete frame (header + body)
pub fn encode(message: &Message) -> Result<Bytes> {
    let body = message.to_element().to_xml();
    frame::encode(body.as_bytes())
}

/// Encode a message body without the length prefix
pub fn encode_body(message: &Message) -> String {
    message.to_element().to_xml()
}

/// Decode a frame body into a message.
///
/// Delimiter violations are framing errors; everything after that is a
/// protocol error.
pub fn decode_body(body: &[u8]) -> Result<Message> {
    frame::check_delimiters(body)?;
    let text = std::str::from_utf8(body).map_err(|_| Error::InvalidUtf8)?;
    let element = Element::parse(text)?;
    Message::from_element(&element)
}

/// Decode one message from the front of a buffer.
///
/// Returns the message and the number of bytes consumed.
pub fn decode(buf: &[u8]) -> Result<(Message, usize)> {
    match frame::decode(buf, DEFAULT_MAX_FRAME_SIZE)? {
        Some((body, used)) => Ok((decode_body(&body)?, used)),
        None => Err(Error::BufferTooSmall {
            needed: expected_len(buf),
            have: buf.len(),
        }),
    }
}

fn expected_len(buf: &[u8]) -> usize {
    if buf.len() < frame::HEADER_SIZE {
        frame::HEADER_SIZE
    } else {
        frame::HEADER_SIZE + u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize
    }
}
