//! FIFO send queue
//!
//! One writer task owns the write half of the socket. Callers hand it
//! encoded frames through an unbounded queue, so frames leave in the order
//! they were submitted and never interleave, whichever task submitted them.
//! Nothing submitted to a live queue is ever dropped.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{Result, TransportError};

struct WriteRequest {
    frame: Bytes,
    ack: Option<oneshot::Sender<Result<()>>>,
}

/// Cloneable handle for submitting frames
#[derive(Clone)]
pub struct SendQueue {
    tx: mpsc::UnboundedSender<WriteRequest>,
}

/// The writer task behind a [`SendQueue`]. Aborted on drop.
pub struct WriterTask {
    handle: JoinHandle<Result<()>>,
}

impl SendQueue {
    /// Spawn the writer task over `writer`.
    ///
    /// The task exits cleanly once every [`SendQueue`] handle is dropped,
    /// or with an error on the first failed write.
    pub fn spawn<W>(writer: W) -> (SendQueue, WriterTask)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_writer(writer, rx));
        (SendQueue { tx }, WriterTask { handle })
    }

    /// Submit a frame and wait until it is fully written
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriteRequest {
                frame,
                ack: Some(ack_tx),
            })
            .map_err(|_| TransportError::ConnectionClosed)?;

        ack_rx
            .await
            .map_err(|_| TransportError::SendFailed("writer stopped".into()))?
    }

    /// Submit a frame without waiting for it to be written
    pub fn enqueue(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(WriteRequest { frame, ack: None })
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

impl WriterTask {
    /// Wait for the writer to finish
    pub async fn finished(&mut self) -> Result<()> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) => Err(TransportError::SendFailed(e.to_string())),
        }
    }
}

impl Drop for WriterTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_writer<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<WriteRequest>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = rx.recv().await {
        let result = async {
            writer.write_all(&request.frame).await?;
            writer.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                debug!("wrote frame of {} bytes", request.frame.len());
                if let Some(ack) = request.ack {
                    let _ = ack.send(Ok(()));
                }
            }
            Err(e) => {
                error!("signaling write error: {}", e);
                if let Some(ack) = request.ack {
                    let _ = ack.send(Err(TransportError::SendFailed(e.to_string())));
                }
                return Err(e.into());
            }
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}
