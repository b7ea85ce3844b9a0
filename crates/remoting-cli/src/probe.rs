//! `probe` command: the client side of the signaling channel

use anyhow::Result;
use colored::Colorize;
use remoting_core::{Message, SdpKind};
use remoting_session::SessionConfig;
use remoting_transport::{ChannelEvent, SignalingChannel};
use tokio::sync::mpsc;
use tracing::warn;

pub async fn run_probe(
    host: &str,
    port: u16,
    config: SessionConfig,
    answer: Option<String>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    let (mut channel, mut events) = SignalingChannel::new(config.channel.clone());
    let peer = channel.connect(host, port).await?;
    println!("{} Connected to {}", "OK".green().bold(), peer);

    // Mirror the host's handshake so it can log our version
    channel
        .send(&Message::version(
            config.handshake_version(remoting_core::ProtocolVersion::LATEST),
            config.depth_alpha,
        ))
        .await?;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ChannelEvent::Connected { .. } => {}
                    ChannelEvent::Message(message) => {
                        println!("{} {}", "RECV".cyan(), message);
                        if let Message::SessionDescription(desc) = &message {
                            if desc.kind == SdpKind::Offer {
                                match &answer {
                                    Some(sdp) => {
                                        channel.send(&Message::answer(sdp.clone())).await?;
                                        println!("{} Answer sent", "SEND".green());
                                    }
                                    None => warn!("Offer received but no --answer file given"),
                                }
                            }
                        }
                    }
                    ChannelEvent::Disconnected { reason } => {
                        println!(
                            "{} Disconnected: {}",
                            "CLOSED".yellow(),
                            reason.as_deref().unwrap_or("closed")
                        );
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    channel.close().await;
    Ok(())
}
