//! Peer engine collaborator
//!
//! The engine owns the negotiated peer connection. The controller drives it
//! through [`PeerEngine`] and hears back through the [`EngineEvents`] sink
//! handed over on attach.

use async_trait::async_trait;
use remoting_core::{ErrorCategory, ProtocolVersion, SdpKind};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Non-success results from the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    #[error("no peer connection")]
    NoConnection,

    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    pub fn rejected(operation: &'static str, reason: impl fmt::Display) -> Self {
        EngineError::Rejected {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Engine
    }
}

/// Peer connection state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerConnectionState {
    Disconnected,
    Connected,
    Failed,
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Notifications from the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    SdpCreated {
        kind: SdpKind,
        sdp: String,
    },
    LocalIceCandidate {
        mid: String,
        mline_index: i32,
        candidate: String,
    },
    ConnectionStateChanged(PeerConnectionState),
}

/// Thread-safe sink for engine notifications.
///
/// Cheap to clone; may be called from any thread, including the engine's
/// own worker threads. Never blocks.
#[derive(Clone)]
pub struct EngineEvents {
    sink: Arc<dyn Fn(EngineEvent) + Send + Sync>,
}

impl EngineEvents {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        (self.sink)(event);
    }

    pub fn sdp_created(&self, kind: SdpKind, sdp: impl Into<String>) {
        self.emit(EngineEvent::SdpCreated {
            kind,
            sdp: sdp.into(),
        });
    }

    pub fn local_ice_candidate(
        &self,
        mid: impl Into<String>,
        mline_index: i32,
        candidate: impl Into<String>,
    ) {
        self.emit(EngineEvent::LocalIceCandidate {
            mid: mid.into(),
            mline_index,
            candidate: candidate.into(),
        });
    }

    pub fn connection_state_changed(&self, state: PeerConnectionState) {
        self.emit(EngineEvent::ConnectionStateChanged(state));
    }
}

impl fmt::Debug for EngineEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEvents").finish_non_exhaustive()
    }
}

/// The peer-connection engine driven by the controller
#[async_trait]
pub trait PeerEngine: Send + Sync {
    /// Start delivering notifications to `events`
    fn attach(&self, events: EngineEvents);

    /// Stop delivering notifications
    fn detach(&self);

    /// Create an offer; the SDP arrives later through `sdp_created`
    async fn create_offer(&self) -> EngineResult<()>;

    async fn set_remote_answer(&self, sdp: &str) -> EngineResult<()>;

    async fn add_ice_candidate(&self, mid: &str, mline_index: i32, candidate: &str) -> EngineResult<()>;

    /// Drop the current peer connection so the next offer starts fresh
    async fn reset(&self) -> EngineResult<()> {
        Ok(())
    }

    /// Version announced in the handshake
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::LATEST
    }
}

/// Builds a fresh engine on every `Initialize`
pub type EngineFactory = Box<dyn Fn() -> EngineResult<Arc<dyn PeerEngine>> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_events_reach_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let events = EngineEvents::new(move |ev| sink.lock().push(ev));

        events.sdp_created(SdpKind::Offer, "v=0");
        events.clone().local_ice_candidate("0", 1, "candidate:x");
        events.connection_state_changed(PeerConnectionState::Connected);

        assert_eq!(
            *seen.lock(),
            vec![
                EngineEvent::SdpCreated {
                    kind: SdpKind::Offer,
                    sdp: "v=0".into()
                },
                EngineEvent::LocalIceCandidate {
                    mid: "0".into(),
                    mline_index: 1,
                    candidate: "candidate:x".into()
                },
                EngineEvent::ConnectionStateChanged(PeerConnectionState::Connected),
            ]
        );
    }

    #[test]
    fn test_engine_error_category() {
        let err = EngineError::rejected("set_remote_answer", "bad sdp");
        assert_eq!(err.to_string(), "set_remote_answer rejected: bad sdp");
        assert_eq!(err.category(), ErrorCategory::Engine);
    }
}
