//! Remoting Signaling Core
//!
//! Synchronous protocol primitives for the remoting signaling channel.
//!
//! This crate provides:
//! - Length-prefixed frame encoding/decoding ([`frame`])
//! - The flat element carrier every frame body holds ([`Element`])
//! - The three signaling messages ([`Message`])
//! - Packed handshake versions ([`ProtocolVersion`])
//! - Message codec gluing the above together ([`codec`])
//!
//! Nothing in here performs I/O; the async reader and writer live in
//! `remoting-transport`.

pub mod codec;
pub mod element;
pub mod error;
pub mod frame;
pub mod message;
pub mod version;

pub use codec::{decode, encode};
pub use element::Element;
pub use error::{Error, ErrorCategory, Result};
pub use message::{IceCandidate, Message, SdpKind, SessionDescription, VersionMessage};
pub use version::ProtocolVersion;

/// Default signaling TCP port
pub const DEFAULT_SIGNALING_PORT: u16 = 9999;

/// Default signaling bind address
pub const DEFAULT_SIGNALING_IP: &str = "0.0.0.0";
