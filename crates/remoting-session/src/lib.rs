//! Remoting Session
//!
//! Drives one signaling peer at a time and bridges it to a peer engine.
//!
//! # Example
//!
//! ```ignore
//! use remoting_session::LifecycleController;
//!
//! let controller = LifecycleController::builder()
//!     .port(9999)
//!     .depth_alpha(true)
//!     .engine(engine)
//!     .build()?;
//!
//! controller.initialize().await?;
//! controller.start().await?;
//!
//! // Restarts on disconnect happen on their own from here
//! tokio::signal::ctrl_c().await?;
//! controller.deinitialize().await?;
//! ```

pub mod builder;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;

#[cfg(feature = "webrtc")]
pub mod webrtc;

pub use builder::ControllerBuilder;
pub use config::{RestartPolicy, SessionConfig, SignalingConfig};
pub use controller::{ControllerSnapshot, LifecycleController, LifecycleEvent};
pub use engine::{
    EngineError, EngineEvent, EngineEvents, EngineFactory, EngineResult, PeerConnectionState,
    PeerEngine,
};
pub use error::{Result, SessionError};

#[cfg(feature = "webrtc")]
pub use webrtc::WebRtcEngine;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::ControllerBuilder;
    pub use crate::config::SessionConfig;
    pub use crate::controller::{LifecycleController, LifecycleEvent};
    pub use crate::engine::{EngineEvents, PeerConnectionState, PeerEngine};
    pub use crate::error::{Result, SessionError};
    pub use remoting_core::{Message, ProtocolVersion, SdpKind};
}
