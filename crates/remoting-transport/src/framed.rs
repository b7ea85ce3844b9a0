//! Async frame reader
//!
//! Reads length-prefixed frames off any [`AsyncRead`]. A read may return
//! fewer bytes than requested; the reader keeps going until the header and
//! then the body are complete. Once a frame has started, every read attempt
//! that produces nothing within the stall timeout counts against a fixed
//! budget. Progress resets the budget.

use bytes::Bytes;
use remoting_core::frame::{self, HEADER_SIZE};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::channel::ChannelConfig;
use crate::error::{Result, TransportError};

/// Reads one validated frame body at a time
pub struct FrameReader<R> {
    reader: R,
    max_frame_size: usize,
    read_attempts: u32,
    stall_timeout: Duration,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, config: &ChannelConfig) -> Self {
        Self {
            reader,
            max_frame_size: config.max_frame_size,
            read_attempts: config.read_attempts.max(1),
            stall_timeout: config.read_stall_timeout(),
        }
    }

    /// Read the next frame body.
    ///
    /// Returns `Ok(None)` when the peer closed the stream, wherever that
    /// happens. The body is checked for `<`..`>` delimiters before it is
    /// returned.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        let mut header = [0u8; HEADER_SIZE];

        // Waiting for the next frame to begin is unbounded
        let n = loop {
            match self.reader.read(&mut header).await {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Ok(None);
        }
        if !self.fill(&mut header[n..]).await? {
            return Ok(None);
        }

        let len = frame::body_len(header);
        if len > self.max_frame_size {
            return Err(remoting_core::Error::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            }
            .into());
        }

        let mut body = vec![0u8; len];
        if !self.fill(&mut body).await? {
            return Ok(None);
        }

        frame::check_delimiters(&body)?;
        trace!("read frame of {} bytes", len);
        Ok(Some(Bytes::from(body)))
    }

    /// Fill `buf` completely. Returns false on end of stream.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        let mut stalls = 0;

        while filled < buf.len() {
            let attempt = tokio::time::timeout(self.stall_timeout, self.reader.read(&mut buf[filled..]));
            match attempt.await {
                Ok(Ok(0)) => return Ok(false),
                Ok(Ok(n)) => {
                    filled += n;
                    stalls = 0;
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    stalls += 1;
                    trace!("read stalled ({}/{})", stalls, self.read_attempts);
                    if stalls >= self.read_attempts {
                        return Err(TransportError::ReadStalled {
                            attempts: self.read_attempts,
                        });
                    }
                }
            }
        }

        Ok(true)
    }
}
