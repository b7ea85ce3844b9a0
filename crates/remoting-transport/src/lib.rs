//! Remoting Signaling Transport
//!
//! The TCP side of the signaling protocol:
//! - [`FrameReader`]: async frame decoding with partial-read recovery
//! - [`SendQueue`]: single-writer FIFO so concurrent senders never interleave
//! - [`SignalingChannel`]: listen or connect, receive loop, ordered send
//!
//! A channel serves exactly one peer and is thrown away afterwards.

pub mod channel;
pub mod error;
pub mod framed;
pub mod queue;

pub use channel::{ChannelConfig, ChannelEvent, ChannelSender, ChannelState, SignalingChannel};
pub use error::{Result, TransportError};
pub use framed::FrameReader;
pub use queue::{SendQueue, WriterTask};
