//! WebRTC-backed peer engine
//!
//! Offerer side only: one reliable, ordered data channel is created so the
//! offer has something to negotiate. Candidates are exchanged as plain
//! strings plus their `mid` and m-line index.

use async_trait::async_trait;
use parking_lot::Mutex;
use remoting_core::SdpKind;
use std::sync::Arc;
use tracing::{debug, info, warn};

use webrtc_rs::{
    api::{
        interceptor_registry::register_default_interceptors, media_engine::MediaEngine, APIBuilder,
    },
    data_channel::data_channel_init::RTCDataChannelInit,
    ice_transport::{
        ice_candidate::{RTCIceCandidate, RTCIceCandidateInit},
        ice_server::RTCIceServer,
    },
    interceptor::registry::Registry,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
};

use crate::engine::{EngineError, EngineEvents, EngineResult, PeerConnectionState, PeerEngine};

/// Label of the negotiated data channel
pub const DATA_CHANNEL_LABEL: &str = "remoting";

/// Peer engine on top of the `webrtc` crate
pub struct WebRtcEngine {
    ice_servers: Vec<String>,
    connection: tokio::sync::Mutex<Option<Arc<RTCPeerConnection>>>,
    events: Arc<Mutex<Option<EngineEvents>>>,
}

impl WebRtcEngine {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self {
            ice_servers,
            connection: tokio::sync::Mutex::new(None),
            events: Arc::new(Mutex::new(None)),
        }
    }

    async fn create_peer_connection(&self) -> EngineResult<Arc<RTCPeerConnection>> {
        let mut media = MediaEngine::default();
        media
            .register_default_codecs()
            .map_err(|e| EngineError::Unavailable(format!("codec registration failed: {}", e)))?;

        let registry = register_default_interceptors(Registry::new(), &mut media).map_err(|e| {
            EngineError::Unavailable(format!("interceptor registration failed: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| EngineError::Unavailable(format!("peer connection creation failed: {}", e)))?;

        let events = self.events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!("webrtc peer connection state: {}", state);
            let mapped = match state {
                RTCPeerConnectionState::Connected => Some(PeerConnectionState::Connected),
                RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Closed => {
                    Some(PeerConnectionState::Disconnected)
                }
                RTCPeerConnectionState::Failed => Some(PeerConnectionState::Failed),
                _ => None,
            };
            if let (Some(state), Some(events)) = (mapped, events.lock().as_ref()) {
                events.connection_state_changed(state);
            }
            Box::pin(async {})
        }));

        let events = self.events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => {
                        if let Some(events) = events.lock().as_ref() {
                            events.local_ice_candidate(
                                init.sdp_mid.unwrap_or_default(),
                                init.sdp_mline_index.map(i32::from).unwrap_or(0),
                                init.candidate,
                            );
                        }
                    }
                    Err(e) => warn!("failed to convert local ice candidate: {}", e),
                }
            }
            Box::pin(async {})
        }));

        let options = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        pc.create_data_channel(DATA_CHANNEL_LABEL, Some(options))
            .await
            .map_err(|e| EngineError::rejected("create_data_channel", e))?;

        Ok(Arc::new(pc))
    }

    async fn current(&self) -> EngineResult<Arc<RTCPeerConnection>> {
        self.connection
            .lock()
            .await
            .clone()
            .ok_or(EngineError::NoConnection)
    }
}

#[async_trait]
impl PeerEngine for WebRtcEngine {
    fn attach(&self, events: EngineEvents) {
        *self.events.lock() = Some(events);
    }

    fn detach(&self) {
        self.events.lock().take();
    }

    async fn create_offer(&self) -> EngineResult<()> {
        let pc = {
            let mut connection = self.connection.lock().await;
            match connection.as_ref() {
                Some(pc) => pc.clone(),
                None => {
                    let pc = self.create_peer_connection().await?;
                    *connection = Some(pc.clone());
                    pc
                }
            }
        };

        let offer = pc
            .create_offer(None)
            .await
            .map_err(|e| EngineError::rejected("create_offer", e))?;
        pc.set_local_description(offer.clone())
            .await
            .map_err(|e| EngineError::rejected("set_local_description", e))?;

        info!("webrtc offer created");
        if let Some(events) = self.events.lock().as_ref() {
            events.sdp_created(SdpKind::Offer, offer.sdp);
        }
        Ok(())
    }

    async fn set_remote_answer(&self, sdp: &str) -> EngineResult<()> {
        let pc = self.current().await?;
        let answer = RTCSessionDescription::answer(sdp.to_string())
            .map_err(|e| EngineError::rejected("set_remote_answer", e))?;
        pc.set_remote_description(answer)
            .await
            .map_err(|e| EngineError::rejected("set_remote_answer", e))
    }

    async fn add_ice_candidate(&self, mid: &str, mline_index: i32, candidate: &str) -> EngineResult<()> {
        let pc = self.current().await?;
        let init = RTCIceCandidateInit {
            candidate: candidate.to_string(),
            sdp_mid: Some(mid.to_string()),
            sdp_mline_index: u16::try_from(mline_index).ok(),
            ..Default::default()
        };
        pc.add_ice_candidate(init)
            .await
            .map_err(|e| EngineError::rejected("add_ice_candidate", e))
    }

    async fn reset(&self) -> EngineResult<()> {
        let previous = self.connection.lock().await.take();
        if let Some(pc) = previous {
            info!("closing webrtc peer connection");
            pc.close()
                .await
                .map_err(|e| EngineError::rejected("close", e))?;
        }
        Ok(())
    }
}
