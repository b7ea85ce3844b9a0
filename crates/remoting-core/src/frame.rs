//! Length-prefixed frame encoding/decoding
//!
//! Signaling frame format:
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Byte 0-3:   Body length N (uint32 big-endian)                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Byte 4..:   Body, N bytes of UTF-8 text, one element `<...>`    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This module works on in-memory buffers only. The async stream reader
//! lives in the transport crate and uses [`body_len`] and
//! [`check_delimiters`] from here.

use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header size
pub const HEADER_SIZE: usize = 4;

/// Default maximum body size (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// First byte of every valid body
pub const OPEN_DELIMITER: u8 = b'<';

/// Last byte of every valid body
pub const CLOSE_DELIMITER: u8 = b'>';

/// Prepend the 4-byte big-endian length of `body`
pub fn encode(body: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(body.len()).map_err(|_| Error::FrameTooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.put_u32(len);
    buf.extend_from_slice(body);
    Ok(buf.freeze())
}

/// Read the body length from a complete header
pub fn body_len(header: [u8; HEADER_SIZE]) -> usize {
    u32::from_be_bytes(header) as usize
}

/// Decode one frame from the front of `buf`.
///
/// Returns the body and the total number of bytes consumed, or `None` if
/// the buffer does not yet hold a complete frame.
pub fn decode(buf: &[u8], max_size: usize) -> Result<Option<(Bytes, usize)>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &buf[..HEADER_SIZE];
    let len = header.get_u32() as usize;
    if len > max_size {
        return Err(Error::FrameTooLarge {
            size: len,
            max: max_size,
        });
    }

    let total = HEADER_SIZE + len;
    if buf.len() < total {
        return Ok(None);
    }

    let body = Bytes::copy_from_slice(&buf[HEADER_SIZE..total]);
    Ok(Some((body, total)))
}

/// Verify a decoded body starts with `<` and ends with `>`
pub fn check_delimiters(body: &[u8]) -> Result<()> {
    match (body.first(), body.last()) {
        (Some(&OPEN_DELIMITER), Some(&CLOSE_DELIMITER)) if body.len() >= 2 => Ok(()),
        (None, _) => Err(Error::CorruptFrame("empty body".into())),
        (Some(first), Some(last)) => Err(Error::CorruptFrame(format!(
            "body delimited by 0x{:02x}..0x{:02x}, expected '<'..'>'",
            first, last
        ))),
        _ => Err(Error::CorruptFrame("unterminated body".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_prefixes_length() {
        let encoded = encode(b"<a/>").unwrap();
        assert_eq!(&encoded[..4], &[0, 0, 0, 4]);
        assert_eq!(&encoded[4..], b"<a/>");
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let encoded = encode(b"<Version>1</Version>").unwrap();

        assert!(decode(&encoded[..2], DEFAULT_MAX_FRAME_SIZE).unwrap().is_none());
        assert!(decode(&encoded[..10], DEFAULT_MAX_FRAME_SIZE).unwrap().is_none());

        let (body, used) = decode(&encoded, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap();
        assert_eq!(used, encoded.len());
        assert_eq!(body.as_ref(), b"<Version>1</Version>");
    }

    #[test]
    fn test_decode_rejects_oversized_header() {
        let encoded = encode(&[b'x'; 64]).unwrap();
        let err = decode(&encoded, 16).unwrap_err();
        assert_eq!(err, Error::FrameTooLarge { size: 64, max: 16 });
    }

    #[test]
    fn test_check_delimiters() {
        assert!(check_delimiters(b"<x/>").is_ok());
        assert!(check_delimiters(b"<>").is_ok());
        assert!(check_delimiters(b"").is_err());
        assert!(check_delimiters(b"<").is_err());
        assert!(check_delimiters(b"x<a/>").is_err());
        assert!(check_delimiters(b"<a/>\n").is_err());
    }
}
