//! Connection lifecycle controller
//!
//! A single actor task owns the signaling channel and the peer engine. Host
//! commands, engine notifications, channel events and self-posted restarts
//! all go through one queue, so a restart is a plain `Stop` + `Start` on the
//! actor and two of them can never overlap.
//!
//! ```text
//!   host ──Initialize/Start/Stop/Deinitialize──┐
//!   engine ──EngineEvents──────────────────────┤
//!   channel ──ChannelEvent (per generation)────┼──> actor ──> channel.enqueue / engine.*
//!   actor ──Restart────────────────────────────┘
//! ```

use parking_lot::Mutex;
use remoting_core::{Message, ProtocolVersion, SdpKind, SessionDescription};
use remoting_transport::{ChannelEvent, ChannelSender, ChannelState, SignalingChannel};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::builder::ControllerBuilder;
use crate::config::SessionConfig;
use crate::engine::{EngineEvent, EngineEvents, EngineFactory, PeerConnectionState, PeerEngine};
use crate::error::{Result, SessionError};

const EVENT_CAPACITY: usize = 256;

/// Observable lifecycle transitions
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Initialized,
    /// A new signaling channel is listening
    Started {
        generation: u64,
        local_addr: SocketAddr,
    },
    /// The signaling channel was stopped, by the host or by a restart
    Stopped { generation: u64 },
    SignalingConnected { peer: SocketAddr },
    /// The signaling connection ended on its own
    SignalingLost { reason: Option<String> },
    PeerStateChanged {
        from: PeerConnectionState,
        to: PeerConnectionState,
    },
    RestartScheduled { reason: String },
    RemoteVersion {
        version: ProtocolVersion,
        depth_alpha_enabled: bool,
    },
    /// A restart could not bring signaling back up
    StartFailed { error: String },
    Deinitialized,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub initialized: bool,
    pub running: bool,
    pub peer_state: PeerConnectionState,
    pub channel_state: Option<ChannelState>,
    pub local_addr: Option<SocketAddr>,
    pub generation: u64,
}

#[derive(Default)]
struct SharedSnapshot {
    initialized: bool,
    running: bool,
    peer_state: Option<PeerConnectionState>,
    channel: Option<ChannelSender>,
    local_addr: Option<SocketAddr>,
    generation: u64,
}

enum Command {
    Initialize(oneshot::Sender<Result<()>>),
    Start(oneshot::Sender<Result<SocketAddr>>),
    Stop(oneshot::Sender<()>),
    Deinitialize(oneshot::Sender<()>),
    Engine { epoch: u64, event: EngineEvent },
    Channel { generation: u64, event: ChannelEvent },
    Restart,
    /// Retry a restart whose `Start` could not bind
    RetryStart { generation: u64 },
    Shutdown,
}

/// Handle to the lifecycle actor
pub struct LifecycleController {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<LifecycleEvent>,
    snapshot: Arc<Mutex<SharedSnapshot>>,
}

impl LifecycleController {
    /// Spawn the controller. Must be called inside a tokio runtime.
    pub fn new(config: SessionConfig, factory: EngineFactory) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let snapshot = Arc::new(Mutex::new(SharedSnapshot::default()));

        let actor = Actor {
            config,
            factory,
            engine: None,
            engine_epoch: 0,
            channel: None,
            generation: 0,
            peer_state: PeerConnectionState::Disconnected,
            running: false,
            tearing_down: false,
            restart_pending: false,
            commands: commands.clone(),
            events: events.clone(),
            snapshot: snapshot.clone(),
        };
        tokio::spawn(actor.run(rx));

        Self {
            commands,
            events,
            snapshot,
        }
    }

    /// Controller that hands out the same engine on every `Initialize`
    pub fn with_engine(config: SessionConfig, engine: Arc<dyn PeerEngine>) -> Self {
        Self::new(config, Box::new(move || Ok(engine.clone())))
    }

    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Build the engine and subscribe to its notifications
    pub async fn initialize(&self) -> Result<()> {
        self.request(Command::Initialize).await?
    }

    /// Start listening for a signaling peer. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        self.request(Command::Start).await?
    }

    /// Dispose the active signaling channel. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    /// Stop everything and release the engine. Restarts are suppressed.
    pub async fn deinitialize(&self) -> Result<()> {
        self.request(Command::Deinitialize).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let shared = self.snapshot.lock();
        ControllerSnapshot {
            initialized: shared.initialized,
            running: shared.running,
            peer_state: shared.peer_state.unwrap_or(PeerConnectionState::Disconnected),
            channel_state: shared.channel.as_ref().map(|c| c.state()),
            local_addr: shared.local_addr,
            generation: shared.generation,
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| SessionError::ControllerStopped)?;
        rx.await.map_err(|_| SessionError::ControllerStopped)
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct ActiveChannel {
    channel: SignalingChannel,
    sender: ChannelSender,
    generation: u64,
}

struct Actor {
    config: SessionConfig,
    factory: EngineFactory,
    engine: Option<Arc<dyn PeerEngine>>,
    engine_epoch: u64,
    channel: Option<ActiveChannel>,
    generation: u64,
    peer_state: PeerConnectionState,
    running: bool,
    tearing_down: bool,
    restart_pending: bool,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<LifecycleEvent>,
    snapshot: Arc<Mutex<SharedSnapshot>>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                // Host commands publish their snapshot before replying
                Command::Initialize(reply) => {
                    let result = self.initialize();
                    self.publish_snapshot();
                    let _ = reply.send(result);
                }
                Command::Start(reply) => {
                    let result = self.start().await;
                    self.publish_snapshot();
                    let _ = reply.send(result);
                }
                Command::Stop(reply) => {
                    self.stop().await;
                    self.publish_snapshot();
                    let _ = reply.send(());
                }
                Command::Deinitialize(reply) => {
                    self.deinitialize().await;
                    self.publish_snapshot();
                    let _ = reply.send(());
                }
                Command::Engine { epoch, event } => {
                    if epoch == self.engine_epoch && self.engine.is_some() {
                        self.on_engine_event(event).await;
                    } else {
                        trace!("ignoring event from released engine: {:?}", event);
                    }
                }
                Command::Channel { generation, event } => {
                    if self.channel.as_ref().map(|c| c.generation) == Some(generation) {
                        self.on_channel_event(event).await;
                    } else {
                        trace!("ignoring event from disposed channel {}: {:?}", generation, event);
                    }
                }
                Command::Restart => self.restart().await,
                Command::RetryStart { generation } => self.retry_start(generation).await,
                Command::Shutdown => {
                    self.shutdown().await;
                    break;
                }
            }
            self.publish_snapshot();
        }
        debug!("lifecycle controller stopped");
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.events.send(event);
    }

    fn publish_snapshot(&self) {
        let mut shared = self.snapshot.lock();
        shared.initialized = self.engine.is_some();
        shared.running = self.running;
        shared.peer_state = Some(self.peer_state);
        shared.channel = self.channel.as_ref().map(|c| c.sender.clone());
        shared.local_addr = self.channel.as_ref().and_then(|c| c.channel.local_addr());
        shared.generation = self.generation;
    }

    // ------------------------------------------------------------------
    // Host commands
    // ------------------------------------------------------------------

    fn initialize(&mut self) -> Result<()> {
        if self.engine.is_some() {
            return Err(SessionError::AlreadyInitialized);
        }
        self.config.validate()?;

        let engine = (self.factory)()?;
        self.engine_epoch += 1;
        let epoch = self.engine_epoch;
        let commands = self.commands.clone();
        engine.attach(EngineEvents::new(move |event| {
            let _ = commands.send(Command::Engine { epoch, event });
        }));

        self.engine = Some(engine);
        self.peer_state = PeerConnectionState::Disconnected;
        self.tearing_down = false;
        self.restart_pending = false;
        info!("lifecycle initialized");
        self.emit(LifecycleEvent::Initialized);
        Ok(())
    }

    async fn start(&mut self) -> Result<SocketAddr> {
        if self.engine.is_none() {
            return Err(SessionError::NotInitialized);
        }
        if self.running {
            if let Some(addr) = self.channel.as_ref().and_then(|c| c.channel.local_addr()) {
                return Ok(addr);
            }
        }

        self.running = true;
        match self.start_channel().await {
            Ok(addr) => Ok(addr),
            Err(e) => {
                self.running = false;
                Err(e)
            }
        }
    }

    async fn stop(&mut self) {
        self.running = false;
        self.stop_channel().await;
    }

    async fn deinitialize(&mut self) {
        if self.engine.is_none() {
            return;
        }
        info!("lifecycle deinitializing");
        self.tearing_down = true;

        if self.peer_state == PeerConnectionState::Connected {
            self.on_peer_state(PeerConnectionState::Disconnected).await;
        }

        self.running = false;
        self.stop_channel().await;
        if let Some(engine) = self.engine.take() {
            engine.detach();
        }
        self.emit(LifecycleEvent::Deinitialized);
    }

    async fn shutdown(&mut self) {
        self.tearing_down = true;
        self.running = false;
        self.dispose_channel("controller dropped").await;
        if let Some(engine) = self.engine.take() {
            engine.detach();
        }
    }

    // ------------------------------------------------------------------
    // Channel management
    // ------------------------------------------------------------------

    async fn start_channel(&mut self) -> Result<SocketAddr> {
        let ip = self.config.bind_ip()?;
        let (mut channel, mut rx) = SignalingChannel::new(self.config.channel.clone());
        let local_addr = channel
            .listen_with_retry(
                ip,
                self.config.signaling.port,
                self.config.bind_attempts,
                self.config.bind_retry_delay(),
            )
            .await?;

        self.generation += 1;
        let generation = self.generation;
        let commands = self.commands.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if commands.send(Command::Channel { generation, event }).is_err() {
                    break;
                }
            }
        });

        let sender = channel.sender();
        self.channel = Some(ActiveChannel {
            channel,
            sender,
            generation,
        });
        info!("signaling started (generation {}) on {}", generation, local_addr);
        self.emit(LifecycleEvent::Started {
            generation,
            local_addr,
        });
        Ok(local_addr)
    }

    async fn stop_channel(&mut self) {
        self.dispose_channel("stopped").await;
        info!("signaling stopped (generation {})", self.generation);
        self.emit(LifecycleEvent::Stopped {
            generation: self.generation,
        });
    }

    async fn dispose_channel(&mut self, reason: &str) {
        if let Some(mut active) = self.channel.take() {
            debug!("disposing signaling channel {} ({})", active.generation, reason);
            active.channel.close().await;
        }
    }

    fn send(&self, message: Message) {
        match &self.channel {
            Some(active) => {
                if let Err(e) = active.sender.enqueue(&message) {
                    warn!("dropping outgoing {}: {}", message.name(), e);
                }
            }
            None => warn!("no signaling channel, dropping outgoing {}", message.name()),
        }
    }

    // ------------------------------------------------------------------
    // Restart
    // ------------------------------------------------------------------

    fn schedule_restart(&mut self, reason: &str) {
        if self.tearing_down {
            debug!("teardown in progress, not restarting ({})", reason);
            return;
        }
        if self.restart_pending {
            debug!("restart already pending ({})", reason);
            return;
        }

        info!("scheduling signaling restart: {}", reason);
        self.restart_pending = true;
        self.emit(LifecycleEvent::RestartScheduled {
            reason: reason.to_string(),
        });
        let _ = self.commands.send(Command::Restart);
    }

    async fn restart(&mut self) {
        self.restart_pending = false;
        if !self.running || self.tearing_down {
            debug!("skipping restart (running: {}, tearing down: {})", self.running, self.tearing_down);
            return;
        }

        self.stop_channel().await;

        // A close reported by the engine during reset arrives as
        // Disconnected -> Disconnected and restarts nothing
        self.set_peer_state(PeerConnectionState::Disconnected);
        if let Some(engine) = &self.engine {
            if let Err(e) = engine.reset().await {
                warn!("engine reset failed: {}", e);
            }
        }

        if let Err(e) = self.start_channel().await {
            self.start_failed(e);
        }
    }

    async fn retry_start(&mut self, generation: u64) {
        if !self.running
            || self.tearing_down
            || self.channel.is_some()
            || generation != self.generation
        {
            debug!("dropping stale start retry for generation {}", generation);
            return;
        }
        if let Err(e) = self.start_channel().await {
            self.start_failed(e);
        }
    }

    /// Report a restart that could not bind and try again after the bind delay
    fn start_failed(&self, e: SessionError) {
        error!("signaling restart failed: {}", e);
        self.emit(LifecycleEvent::StartFailed {
            error: e.to_string(),
        });

        let generation = self.generation;
        let delay = self.config.bind_retry_delay();
        let commands = self.commands.clone();
        info!("retrying signaling start in {:?}", delay);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::RetryStart { generation });
        });
    }

    // ------------------------------------------------------------------
    // Engine notifications
    // ------------------------------------------------------------------

    async fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::SdpCreated { kind, sdp } => {
                debug!("engine created {} sdp", kind);
                self.send(Message::SessionDescription(SessionDescription { kind, sdp }));
            }
            EngineEvent::LocalIceCandidate {
                mid,
                mline_index,
                candidate,
            } => {
                self.send(Message::ice_candidate(mid, mline_index, candidate));
            }
            EngineEvent::ConnectionStateChanged(state) => self.on_peer_state(state).await,
        }
    }

    /// Record the new peer state, returning the previous one
    fn set_peer_state(&mut self, state: PeerConnectionState) -> PeerConnectionState {
        let previous = self.peer_state;
        self.peer_state = state;
        if previous != state {
            info!("peer connection {} -> {}", previous, state);
            self.emit(LifecycleEvent::PeerStateChanged {
                from: previous,
                to: state,
            });
        }
        previous
    }

    async fn on_peer_state(&mut self, state: PeerConnectionState) {
        use PeerConnectionState::*;

        let previous = self.set_peer_state(state);

        match (previous, state) {
            (Disconnected, Disconnected) => {
                debug!("peer already disconnected, signaling still listening");
            }
            (_, Disconnected) => {
                if self.config.restart.on_disconnected {
                    self.schedule_restart("peer disconnected");
                }
            }
            (Connected, Failed) => {
                if self.config.restart.on_failed_after_connected {
                    self.schedule_restart("peer failed after connecting");
                }
            }
            (_, Failed) => {
                self.dispose_channel("peer failed before connecting").await;
            }
            (_, Connected) => {
                self.dispose_channel("peer connected").await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Channel events
    // ------------------------------------------------------------------

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected { peer } => {
                info!("signaling peer {} connected", peer);
                self.emit(LifecycleEvent::SignalingConnected { peer });

                let Some(engine) = self.engine.clone() else {
                    return;
                };
                let version = self.config.handshake_version(engine.version());
                self.send(Message::version(version, self.config.depth_alpha));

                if let Err(e) = engine.create_offer().await {
                    warn!("engine create_offer failed: {}", e);
                }
            }
            ChannelEvent::Message(message) => self.on_message(message).await,
            ChannelEvent::Disconnected { reason } => {
                match &reason {
                    Some(reason) => info!("signaling lost: {}", reason),
                    None => info!("signaling lost"),
                }
                self.dispose_channel("signaling lost").await;
                self.emit(LifecycleEvent::SignalingLost { reason });

                if self.peer_state != PeerConnectionState::Connected
                    && self.config.restart.on_signaling_lost
                {
                    self.schedule_restart("signaling lost");
                }
            }
        }
    }

    async fn on_message(&mut self, message: Message) {
        let Some(engine) = self.engine.clone() else {
            return;
        };

        match message {
            Message::Version(v) => {
                info!(
                    "remote protocol version {} (depth/alpha: {})",
                    v.version, v.depth_alpha_enabled
                );
                self.emit(LifecycleEvent::RemoteVersion {
                    version: v.version,
                    depth_alpha_enabled: v.depth_alpha_enabled,
                });
            }
            Message::SessionDescription(SessionDescription {
                kind: SdpKind::Answer,
                sdp,
            }) => {
                if let Err(e) = engine.set_remote_answer(&sdp).await {
                    warn!("engine set_remote_answer failed: {}", e);
                }
            }
            Message::SessionDescription(SessionDescription {
                kind: SdpKind::Offer, ..
            }) => {
                warn!("dropping remote offer, this side makes the offer");
            }
            Message::IceCandidate(c) => {
                if let Err(e) = engine
                    .add_ice_candidate(&c.mid, c.mline_index, &c.candidate)
                    .await
                {
                    warn!("engine add_ice_candidate failed: {}", e);
                }
            }
        }
    }
}
