//! Signaling channel
//!
//! One listening socket, one accepted (or connected) stream, one receive
//! loop. A channel is never reused: once it reaches [`ChannelState::Closed`]
//! the owner creates a new one for the next listen cycle.

use parking_lot::Mutex;
use remoting_core::{codec, Message};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::framed::FrameReader;
use crate::queue::{SendQueue, WriterTask};

/// Channel tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChannelConfig {
    /// Largest accepted frame body in bytes
    pub max_frame_size: usize,
    /// Stalled read attempts tolerated inside one frame
    pub read_attempts: u32,
    /// How long a single read attempt may produce nothing
    pub read_stall_timeout_ms: u64,
    /// TCP keep-alive interval in seconds (0 = disabled)
    pub keepalive_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_size: remoting_core::frame::DEFAULT_MAX_FRAME_SIZE,
            read_attempts: 10,
            read_stall_timeout_ms: 500,
            keepalive_secs: 30,
        }
    }
}

impl ChannelConfig {
    pub fn read_stall_timeout(&self) -> Duration {
        Duration::from_millis(self.read_stall_timeout_ms)
    }
}

/// Channel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Listening,
    Connected,
    Closed,
}

/// Events raised by a channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A peer connected
    Connected { peer: SocketAddr },
    /// A message was received and parsed
    Message(Message),
    /// The connection ended. Raised exactly once.
    Disconnected { reason: Option<String> },
}

struct Shared {
    state: Mutex<ChannelState>,
    queue: Mutex<Option<SendQueue>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    disconnected: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }

    fn emit(&self, event: ChannelEvent) {
        // Receiver gone means nobody cares any more
        let _ = self.events.send(event);
    }

    fn disconnect(&self, reason: Option<String>) {
        self.queue.lock().take();
        self.set_state(ChannelState::Closed);
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            self.emit(ChannelEvent::Disconnected { reason });
        }
    }

    fn queue(&self) -> Result<SendQueue> {
        if *self.state.lock() != ChannelState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.queue.lock().clone().ok_or(TransportError::NotConnected)
    }
}

/// Cloneable send handle onto a channel
#[derive(Clone)]
pub struct ChannelSender {
    shared: Arc<Shared>,
}

impl ChannelSender {
    /// Send a message and wait until it is fully written
    pub async fn send(&self, message: &Message) -> Result<()> {
        let queue = self.shared.queue()?;
        let frame = codec::encode(message)?;
        debug!("sending {}", message);
        queue.send(frame).await
    }

    /// Queue a message without waiting for the write
    pub fn enqueue(&self, message: &Message) -> Result<()> {
        let queue = self.shared.queue()?;
        let frame = codec::encode(message)?;
        debug!("queueing {}", message);
        queue.enqueue(frame)
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }
}

/// A single-use signaling channel
pub struct SignalingChannel {
    config: ChannelConfig,
    shared: Arc<Shared>,
    local_addr: Option<SocketAddr>,
    task: Option<JoinHandle<()>>,
}

impl SignalingChannel {
    /// Create an idle channel and the receiver for its events
    pub fn new(config: ChannelConfig) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(ChannelState::Idle),
            queue: Mutex::new(None),
            events,
            disconnected: AtomicBool::new(false),
        });

        let channel = Self {
            config,
            shared,
            local_addr: None,
            task: None,
        };
        (channel, rx)
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.lock()
    }

    /// Bound address while listening, or the local end once connected
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            shared: self.shared.clone(),
        }
    }

    /// Send a message and wait until it is fully written
    pub async fn send(&self, message: &Message) -> Result<()> {
        self.sender().send(message).await
    }

    /// Queue a message without waiting for the write
    pub fn enqueue(&self, message: &Message) -> Result<()> {
        self.sender().enqueue(message)
    }

    /// Bind and wait for exactly one peer.
    ///
    /// Returns once the socket is listening. Accepting and receiving run in
    /// a background task.
    pub async fn listen(&mut self, ip: IpAddr, port: u16) -> Result<SocketAddr> {
        self.ensure_idle()?;

        let addr = SocketAddr::new(ip, port);
        let listener = bind_listener(addr)?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        self.local_addr = Some(local_addr);
        self.shared.set_state(ChannelState::Listening);
        info!("signaling listening on {}", local_addr);

        let shared = self.shared.clone();
        let config = self.config.clone();
        self.task = Some(tokio::spawn(async move {
            let accepted = listener.accept().await;
            // One peer per channel; free the port as soon as it is taken
            drop(listener);

            match accepted {
                Ok((stream, peer)) => {
                    info!("signaling peer connected from {}", peer);
                    let connection = Connection::attach(&shared, stream, peer, &config);
                    connection.run(&shared).await;
                }
                Err(e) => {
                    error!("signaling accept failed: {}", e);
                    shared.disconnect(Some(TransportError::AcceptFailed(e.to_string()).to_string()));
                }
            }
        }));

        Ok(local_addr)
    }

    /// [`listen`](Self::listen), retrying bind failures.
    ///
    /// A port held by a closing socket can take a moment to come back.
    pub async fn listen_with_retry(
        &mut self,
        ip: IpAddr,
        port: u16,
        attempts: u32,
        delay: Duration,
    ) -> Result<SocketAddr> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.listen(ip, port).await {
                Err(TransportError::BindFailed(reason)) if attempt < attempts => {
                    warn!(
                        "bind to {}:{} failed ({}), retrying ({}/{})",
                        ip, port, reason, attempt, attempts
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    /// Connect to a listening peer
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<SocketAddr> {
        self.ensure_idle()?;
        info!("connecting to signaling peer {}:{}", host, port);

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let peer = stream.peer_addr()?;
        self.local_addr = stream.local_addr().ok();
        info!("signaling connected to {}", peer);

        let connection = Connection::attach(&self.shared, stream, peer, &self.config);
        let shared = self.shared.clone();
        self.task = Some(tokio::spawn(async move {
            connection.run(&shared).await;
        }));

        Ok(peer)
    }

    /// Close the channel and wait for its task to release the socket.
    ///
    /// Idempotent. Raises `Disconnected` if the channel ever left `Idle`
    /// and has not already done so.
    pub async fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }

        if self.state() == ChannelState::Idle {
            self.shared.set_state(ChannelState::Closed);
        } else {
            self.shared.disconnect(Some("channel closed".into()));
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.state() != ChannelState::Idle {
            return Err(TransportError::AlreadyStarted);
        }
        Ok(())
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if self.state() != ChannelState::Idle {
                self.shared.disconnect(Some("channel dropped".into()));
            }
        }
    }
}

fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let bind_err = |e: std::io::Error| TransportError::BindFailed(format!("{}: {}", addr, e));

    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    socket.listen(1).map_err(bind_err)
}

fn configure_stream(stream: &TcpStream, config: &ChannelConfig) {
    let _ = stream.set_nodelay(true);

    if config.keepalive_secs > 0 {
        let socket = socket2::SockRef::from(stream);
        let keepalive =
            socket2::TcpKeepalive::new().with_time(Duration::from_secs(config.keepalive_secs));
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            debug!("failed to enable keepalive: {}", e);
        }
    }
}

/// An accepted or connected stream, wired up and ready to receive
struct Connection {
    reader: FrameReader<OwnedReadHalf>,
    writer: WriterTask,
    peer: SocketAddr,
}

impl Connection {
    /// Start the writer, publish the send queue and raise `Connected`
    fn attach(shared: &Shared, stream: TcpStream, peer: SocketAddr, config: &ChannelConfig) -> Self {
        configure_stream(&stream, config);

        let (read_half, write_half) = stream.into_split();
        let (queue, writer) = SendQueue::spawn(write_half);
        *shared.queue.lock() = Some(queue);
        shared.set_state(ChannelState::Connected);
        shared.emit(ChannelEvent::Connected { peer });

        Self {
            reader: FrameReader::new(read_half, config),
            writer,
            peer,
        }
    }

    /// Receive until the connection ends, then raise `Disconnected`
    async fn run(mut self, shared: &Shared) {
        let reason = tokio::select! {
            reason = receive_loop(shared, &mut self.reader) => reason,
            result = self.writer.finished() => match result {
                Ok(()) => None,
                Err(e) => Some(e.to_string()),
            },
        };

        match &reason {
            Some(reason) => info!("signaling peer {} disconnected: {}", self.peer, reason),
            None => info!("signaling peer {} disconnected", self.peer),
        }
        shared.disconnect(reason);
    }
}

/// Read and dispatch messages until the stream ends or becomes unusable.
/// Returns the disconnect reason, `None` for a clean close.
async fn receive_loop<R>(shared: &Shared, reader: &mut FrameReader<R>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let body = match reader.read_frame().await {
            Ok(Some(body)) => body,
            Ok(None) => return None,
            Err(e) => {
                error!("signaling {} error: {}", e.category(), e);
                return Some(e.to_string());
            }
        };

        match codec::decode_body(&body) {
            Ok(message) => {
                debug!("received {}", message);
                shared.emit(ChannelEvent::Message(message));
            }
            Err(e) if e.is_fatal_to_connection() => {
                error!("signaling framing error: {}", e);
                return Some(e.to_string());
            }
            Err(e) => {
                warn!("dropping signaling message: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn test_channel_config_default() {
        let config = ChannelConfig::default();
        assert_eq!(config.max_frame_size, 1024 * 1024);
        assert_eq!(config.read_attempts, 10);
        assert_eq!(config.read_stall_timeout(), Duration::from_millis(500));
        assert_eq!(config.keepalive_secs, 30);
    }

    #[test]
    fn test_channel_config_partial_json() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{"read-attempts": 3, "keepalive-secs": 0}"#).unwrap();
        assert_eq!(config.read_attempts, 3);
        assert_eq!(config.keepalive_secs, 0);
        assert_eq!(config.max_frame_size, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (mut channel, _events) = SignalingChannel::new(ChannelConfig::default());
        assert!(matches!(
            channel.send(&Message::offer("v=0")).await,
            Err(TransportError::NotConnected)
        ));

        channel.listen(LOCALHOST, 0).await.unwrap();
        assert!(matches!(
            channel.enqueue(&Message::offer("v=0")),
            Err(TransportError::NotConnected)
        ));
        channel.close().await;
    }

    #[tokio::test]
    async fn test_listen_twice_rejected() {
        let (mut channel, _events) = SignalingChannel::new(ChannelConfig::default());
        channel.listen(LOCALHOST, 0).await.unwrap();
        assert!(matches!(
            channel.listen(LOCALHOST, 0).await,
            Err(TransportError::AlreadyStarted)
        ));
        channel.close().await;
    }

    #[tokio::test]
    async fn test_close_idle_channel_is_silent() {
        let (mut channel, mut events) = SignalingChannel::new(ChannelConfig::default());
        channel.close().await;
        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Closed);
        drop(channel);
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_listening_channel_disconnects_once() {
        let (mut channel, mut events) = SignalingChannel::new(ChannelConfig::default());
        channel.listen(LOCALHOST, 0).await.unwrap();
        assert_eq!(channel.state(), ChannelState::Listening);

        channel.close().await;
        channel.close().await;
        drop(channel);

        assert!(matches!(
            events.recv().await,
            Some(ChannelEvent::Disconnected { .. })
        ));
        assert!(events.recv().await.is_none());
    }
}
