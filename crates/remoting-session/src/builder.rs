//! Controller builder pattern

use remoting_core::ProtocolVersion;
use remoting_transport::ChannelConfig;
use std::sync::Arc;

use crate::config::{RestartPolicy, SessionConfig};
use crate::controller::LifecycleController;
use crate::engine::{EngineFactory, EngineResult, PeerEngine};
use crate::error::{Result, SessionError};

/// Builder for [`LifecycleController`]
pub struct ControllerBuilder {
    config: SessionConfig,
    factory: Option<EngineFactory>,
}

impl ControllerBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            factory: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the signaling bind address
    pub fn ip(mut self, ip: &str) -> Self {
        self.config.signaling.ip = ip.to_string();
        self
    }

    /// Set the signaling port
    pub fn port(mut self, port: u16) -> Self {
        self.config.signaling.port = port;
        self
    }

    /// Advertise depth/alpha support in the handshake
    pub fn depth_alpha(mut self, enabled: bool) -> Self {
        self.config.depth_alpha = enabled;
        self
    }

    /// Override the handshake version
    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.config.version = Some(version.packed());
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.config.restart = policy;
        self
    }

    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.config.channel = channel;
        self
    }

    pub fn ice_servers(mut self, servers: Vec<String>) -> Self {
        self.config.ice_servers = servers;
        self
    }

    /// Use the same engine on every `Initialize`
    pub fn engine(mut self, engine: Arc<dyn PeerEngine>) -> Self {
        self.factory = Some(Box::new(move || Ok(engine.clone())));
        self
    }

    /// Build a fresh engine on every `Initialize`
    pub fn engine_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> EngineResult<Arc<dyn PeerEngine>> + Send + Sync + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Validate and spawn the controller
    pub fn build(self) -> Result<LifecycleController> {
        self.config.validate()?;
        let factory = self
            .factory
            .ok_or_else(|| SessionError::Config("no peer engine configured".into()))?;
        Ok(LifecycleController::new(self.config, factory))
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
