//! Transport error types

use remoting_core::ErrorCategory;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("accept failed: {0}")]
    AcceptFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("channel already started")]
    AlreadyStarted,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("read stalled after {attempts} attempts")]
    ReadStalled { attempts: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Framing(#[from] remoting_core::Error),
}

impl TransportError {
    /// Classify this error. Framing and stall faults close the connection;
    /// protocol faults only drop the offending message.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransportError::Framing(e) => e.category(),
            TransportError::ReadStalled { .. } => ErrorCategory::Framing,
            _ => ErrorCategory::Transport,
        }
    }
}
