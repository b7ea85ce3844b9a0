//! Error types for the signaling protocol

use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Frame body exceeds the configured limit
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame buffer too small
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Body does not start with `<` and end with `>`
    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    /// Body is not valid UTF-8
    #[error("frame body is not valid utf-8")]
    InvalidUtf8,

    /// Element text could not be parsed
    #[error("malformed element: {0}")]
    Malformed(String),

    /// Element name is not one of Version, Sdp, IceCandidate
    #[error("unknown element: <{0}>")]
    UnknownElement(String),

    /// Required attribute is absent
    #[error("<{element}> is missing attribute {attribute}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// Attribute present but its value is not acceptable
    #[error("invalid value {value:?} for attribute {attribute}")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
    },

    /// Element content could not be interpreted
    #[error("invalid content for <{element}>: {content:?}")]
    InvalidContent {
        element: &'static str,
        content: String,
    },
}

/// Failure classes and the policy applied to each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Socket faults, resets, accept failures. Surfaced as a disconnect.
    Transport,
    /// Corrupt delimiters, oversized or stalled frames. Closes the connection.
    Framing,
    /// Unknown elements or bad attributes. The single message is dropped.
    Protocol,
    /// Non-success results from the peer engine. Logged only.
    Engine,
}

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::FrameTooLarge { .. } | Error::BufferTooSmall { .. } | Error::CorruptFrame(_) => {
                ErrorCategory::Framing
            }
            Error::InvalidUtf8
            | Error::Malformed(_)
            | Error::UnknownElement(_)
            | Error::MissingAttribute { .. }
            | Error::InvalidAttribute { .. }
            | Error::InvalidContent { .. } => ErrorCategory::Protocol,
        }
    }

    /// True if the connection this error came from must be closed
    pub fn is_fatal_to_connection(&self) -> bool {
        self.category() == ErrorCategory::Framing
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Transport => "transport",
            ErrorCategory::Framing => "framing",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Engine => "engine",
        };
        f.write_str(name)
    }
}
