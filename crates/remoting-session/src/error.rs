//! Session error types

use remoting_core::ErrorCategory;
use remoting_transport::TransportError;
use thiserror::Error;

use crate::engine::EngineError;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("controller not initialized")]
    NotInitialized,

    #[error("controller already initialized")]
    AlreadyInitialized,

    #[error("controller task has stopped")]
    ControllerStopped,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl SessionError {
    /// Classify this error; `None` for host misuse and configuration faults
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            SessionError::Transport(e) => Some(e.category()),
            SessionError::Engine(e) => Some(e.category()),
            _ => None,
        }
    }
}
