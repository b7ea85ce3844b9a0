//! Session configuration

use remoting_core::{ProtocolVersion, DEFAULT_SIGNALING_IP, DEFAULT_SIGNALING_PORT};
use remoting_transport::ChannelConfig;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

use crate::error::{Result, SessionError};

/// Where the signaling socket listens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    pub ip: String,
    pub port: u16,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_SIGNALING_IP.to_string(),
            port: DEFAULT_SIGNALING_PORT,
        }
    }
}

/// Which peer-state transitions restart the listen cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RestartPolicy {
    /// Peer went `Disconnected` from any other state
    pub on_disconnected: bool,
    /// Peer went `Failed` after having been `Connected`
    pub on_failed_after_connected: bool,
    /// Signaling connection dropped before the peer connected
    pub on_signaling_lost: bool,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            on_disconnected: true,
            on_failed_after_connected: true,
            on_signaling_lost: true,
        }
    }
}

impl RestartPolicy {
    /// Never restart automatically
    pub fn never() -> Self {
        Self {
            on_disconnected: false,
            on_failed_after_connected: false,
            on_signaling_lost: false,
        }
    }
}

/// Full session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    pub signaling: SignalingConfig,
    /// Advertise depth/alpha support in the handshake
    pub depth_alpha: bool,
    /// Packed handshake version; the engine's version when unset
    pub version: Option<u32>,
    pub restart: RestartPolicy,
    pub channel: ChannelConfig,
    pub bind_attempts: u32,
    pub bind_retry_ms: u64,
    /// STUN/TURN URLs for the peer engine
    pub ice_servers: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig::default(),
            depth_alpha: false,
            version: None,
            restart: RestartPolicy::default(),
            channel: ChannelConfig::default(),
            bind_attempts: 5,
            bind_retry_ms: 200,
            ice_servers: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Reject settings that can never work
    pub fn validate(&self) -> Result<()> {
        self.bind_ip()?;
        if self.signaling.port == 0 {
            return Err(SessionError::Config("signaling port must not be 0".into()));
        }
        if self.channel.max_frame_size == 0 {
            return Err(SessionError::Config("max-frame-size must not be 0".into()));
        }
        Ok(())
    }

    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.signaling.ip.parse().map_err(|_| {
            SessionError::Config(format!("invalid signaling ip {:?}", self.signaling.ip))
        })
    }

    pub fn bind_retry_delay(&self) -> Duration {
        Duration::from_millis(self.bind_retry_ms)
    }

    /// Version announced in the handshake, given the engine's own
    pub fn handshake_version(&self, engine_version: ProtocolVersion) -> ProtocolVersion {
        self.version
            .map(ProtocolVersion::from_packed)
            .unwrap_or(engine_version)
    }
}
