//! Common test helpers and utilities for remoting tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - Port allocation
//! - A recording peer engine that scripts engine notifications
//! - A raw-protocol test peer speaking the framed signaling wire format
//! - A collector for lifecycle events

use async_trait::async_trait;
use remoting_core::{codec, frame, Message, SdpKind};
use remoting_session::{
    EngineError, EngineEvents, EngineResult, LifecycleEvent, PeerConnectionState, PeerEngine,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Notify};
use tokio::time::timeout;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

// ============================================================================
// Recording Engine
// ============================================================================

/// A call the controller made into the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateOffer,
    SetRemoteAnswer(String),
    AddIceCandidate {
        mid: String,
        mline_index: i32,
        candidate: String,
    },
    Reset,
}

/// Offer emitted by [`RecordingEngine::create_offer`]
pub const RECORDED_OFFER_SDP: &str = "v=0\r\ns=recording\r\n";

type ResetHook = Box<dyn Fn() + Send + Sync>;

/// Peer engine that records every call and lets the test script its
/// notifications
pub struct RecordingEngine {
    calls: parking_lot::Mutex<Vec<EngineCall>>,
    events: parking_lot::Mutex<Option<EngineEvents>>,
    failing: parking_lot::Mutex<Option<&'static str>>,
    reset_hook: parking_lot::Mutex<Option<ResetHook>>,
    disconnect_on_detach: AtomicBool,
    disconnect_on_reset: AtomicBool,
    attach_count: AtomicU32,
    notify: Notify,
}

impl RecordingEngine {
    /// Engine that answers every `create_offer` with [`RECORDED_OFFER_SDP`]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: parking_lot::Mutex::new(Vec::new()),
            events: parking_lot::Mutex::new(None),
            failing: parking_lot::Mutex::new(None),
            reset_hook: parking_lot::Mutex::new(None),
            disconnect_on_detach: AtomicBool::new(false),
            disconnect_on_reset: AtomicBool::new(false),
            attach_count: AtomicU32::new(0),
            notify: Notify::new(),
        })
    }

    /// Make the named operation fail from now on
    pub fn fail(&self, operation: &'static str) {
        *self.failing.lock() = Some(operation);
    }

    /// Report `Disconnected` while being detached, like an engine that
    /// closes its connection on release
    pub fn disconnect_on_detach(&self, enabled: bool) {
        self.disconnect_on_detach.store(enabled, Ordering::SeqCst);
    }

    /// Report `Disconnected` from `reset`, like an engine whose closed
    /// connection reports its own state change
    pub fn disconnect_on_reset(&self, enabled: bool) {
        self.disconnect_on_reset.store(enabled, Ordering::SeqCst);
    }

    /// Run `hook` inside every `reset`, between the old channel going away
    /// and the new one binding
    pub fn on_reset(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.reset_hook.lock() = Some(Box::new(hook));
    }

    pub fn is_attached(&self) -> bool {
        self.events.lock().is_some()
    }

    pub fn attach_count(&self) -> u32 {
        self.attach_count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|&c| pred(c)).count()
    }

    /// Wait until a recorded call matches
    pub async fn wait_for_call(&self, pred: impl Fn(&EngineCall) -> bool) -> bool {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let notified = self.notify.notified();
            if self.calls.lock().iter().any(&pred) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || timeout(remaining, notified).await.is_err() {
                return self.calls.lock().iter().any(&pred);
            }
        }
    }

    /// Report a connection state change to the controller
    pub fn emit_state(&self, state: PeerConnectionState) {
        if let Some(events) = self.events.lock().as_ref() {
            events.connection_state_changed(state);
        }
    }

    /// Report a locally gathered candidate to the controller
    pub fn emit_candidate(&self, mid: &str, mline_index: i32, candidate: &str) {
        if let Some(events) = self.events.lock().as_ref() {
            events.local_ice_candidate(mid, mline_index, candidate);
        }
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
        self.notify.notify_waiters();
    }

    fn check(&self, operation: &'static str) -> EngineResult<()> {
        match *self.failing.lock() {
            Some(failing) if failing == operation => {
                Err(EngineError::rejected(operation, "scripted failure"))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PeerEngine for RecordingEngine {
    fn attach(&self, events: EngineEvents) {
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        *self.events.lock() = Some(events);
    }

    fn detach(&self) {
        let events = self.events.lock().take();
        if let Some(events) = events {
            if self.disconnect_on_detach.load(Ordering::SeqCst) {
                events.connection_state_changed(PeerConnectionState::Disconnected);
            }
        }
    }

    async fn create_offer(&self) -> EngineResult<()> {
        self.record(EngineCall::CreateOffer);
        self.check("create_offer")?;

        if let Some(events) = self.events.lock().as_ref() {
            events.sdp_created(SdpKind::Offer, RECORDED_OFFER_SDP);
        }
        Ok(())
    }

    async fn set_remote_answer(&self, sdp: &str) -> EngineResult<()> {
        self.record(EngineCall::SetRemoteAnswer(sdp.to_string()));
        self.check("set_remote_answer")
    }

    async fn add_ice_candidate(&self, mid: &str, mline_index: i32, candidate: &str) -> EngineResult<()> {
        self.record(EngineCall::AddIceCandidate {
            mid: mid.to_string(),
            mline_index,
            candidate: candidate.to_string(),
        });
        self.check("add_ice_candidate")
    }

    async fn reset(&self) -> EngineResult<()> {
        self.record(EngineCall::Reset);
        if let Some(hook) = self.reset_hook.lock().as_ref() {
            hook();
        }
        if self.disconnect_on_reset.load(Ordering::SeqCst) {
            self.emit_state(PeerConnectionState::Disconnected);
        }
        self.check("reset")
    }
}

// ============================================================================
// Test Peer - raw protocol client
// ============================================================================

/// Remote side of a signaling session, speaking raw frames over TCP
pub struct TestPeer {
    stream: TcpStream,
}

impl TestPeer {
    /// Connect to a listening controller, retrying until it is up
    pub async fn connect(port: u16) -> Self {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(stream) => return Self { stream },
                Err(e) if Instant::now() < deadline => {
                    tracing::debug!("test peer connect failed, retrying: {}", e);
                    tokio::time::sleep(DEFAULT_CHECK_INTERVAL).await;
                }
                Err(e) => panic!("test peer could not connect to port {}: {}", port, e),
            }
        }
    }

    pub async fn send(&mut self, message: &Message) {
        let frame = codec::encode(message).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Send an arbitrary body inside a valid length prefix
    pub async fn send_body(&mut self, body: &[u8]) {
        let frame = frame::encode(body).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Next message, or `None` if the connection closed or timed out
    pub async fn recv(&mut self) -> Option<Message> {
        self.recv_timeout(DEFAULT_TIMEOUT).await
    }

    pub async fn recv_timeout(&mut self, max_wait: Duration) -> Option<Message> {
        timeout(max_wait, async {
            let mut header = [0u8; frame::HEADER_SIZE];
            self.stream.read_exact(&mut header).await.ok()?;
            let mut body = vec![0u8; frame::body_len(header)];
            self.stream.read_exact(&mut body).await.ok()?;
            codec::decode_body(&body).ok()
        })
        .await
        .ok()
        .flatten()
    }

    /// True once the controller side has closed the connection
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 256];
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }
}

// ============================================================================
// Lifecycle Recorder
// ============================================================================

/// Collects lifecycle events from a controller subscription
#[derive(Clone)]
pub struct LifecycleRecorder {
    events: Arc<parking_lot::Mutex<Vec<LifecycleEvent>>>,
    notify: Arc<Notify>,
    count: Arc<AtomicU32>,
}

impl LifecycleRecorder {
    /// Start recording from `receiver` in a background task
    pub fn new(mut receiver: broadcast::Receiver<LifecycleEvent>) -> Self {
        let recorder = Self {
            events: Arc::new(parking_lot::Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
            count: Arc::new(AtomicU32::new(0)),
        };

        let events = recorder.events.clone();
        let notify = recorder.notify.clone();
        let count = recorder.count.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        events.lock().push(event);
                        count.fetch_add(1, Ordering::SeqCst);
                        notify.notify_waiters();
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("lifecycle recorder lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        recorder
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&LifecycleEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|&e| pred(e)).count()
    }

    /// Wait until at least `n` recorded events match
    pub async fn wait_for(&self, pred: impl Fn(&LifecycleEvent) -> bool, n: usize) -> bool {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let notified = self.notify.notified();
            if self.count(&pred) >= n {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || timeout(remaining, notified).await.is_err() {
                return self.count(&pred) >= n;
            }
        }
    }

    /// Only the `Started`/`Stopped` events, in order
    pub fn start_stop_sequence(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    LifecycleEvent::Started { .. } | LifecycleEvent::Stopped { .. }
                )
            })
            .cloned()
            .collect()
    }
}
