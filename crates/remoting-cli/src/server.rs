//! `serve` command

use anyhow::Result;
use colored::Colorize;
use remoting_session::{LifecycleController, LifecycleEvent, SessionConfig};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

pub async fn run_server(config: SessionConfig, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
    let controller = build_controller(config)?;
    let mut events = controller.subscribe();

    controller.initialize().await?;
    let addr = controller.start().await?;

    println!(
        "{} Signaling listening on {}",
        "OK".green().bold(),
        addr
    );
    println!("  Press Ctrl+C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} lifecycle events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }

    controller.deinitialize().await?;
    println!("{}", "Server stopped".yellow());
    Ok(())
}

#[cfg(feature = "webrtc")]
fn build_controller(config: SessionConfig) -> Result<LifecycleController> {
    use remoting_session::{PeerEngine, WebRtcEngine};
    use std::sync::Arc;

    let ice_servers = config.ice_servers.clone();
    let controller = LifecycleController::builder()
        .config(config)
        .engine_factory(move || {
            let engine: Arc<dyn PeerEngine> = Arc::new(WebRtcEngine::new(ice_servers.clone()));
            Ok(engine)
        })
        .build()?;
    Ok(controller)
}

#[cfg(not(feature = "webrtc"))]
fn build_controller(_config: SessionConfig) -> Result<LifecycleController> {
    anyhow::bail!("no peer engine available, rebuild with `--features webrtc`")
}

fn print_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::Started {
            generation,
            local_addr,
        } => println!(
            "{} Listening on {} (generation {})",
            "SIGNAL".cyan(),
            local_addr,
            generation
        ),
        LifecycleEvent::SignalingConnected { peer } => {
            println!("{} Client connected: {}", "SIGNAL".cyan(), peer)
        }
        LifecycleEvent::SignalingLost { reason } => println!(
            "{} Client gone: {}",
            "SIGNAL".cyan(),
            reason.as_deref().unwrap_or("closed")
        ),
        LifecycleEvent::PeerStateChanged { from, to } => {
            println!("{} {} -> {}", "PEER".magenta(), from, to)
        }
        LifecycleEvent::RestartScheduled { reason } => {
            println!("{} Restarting: {}", "PEER".magenta(), reason.yellow())
        }
        LifecycleEvent::RemoteVersion {
            version,
            depth_alpha_enabled,
        } => println!(
            "{} Remote version {} (depth/alpha: {})",
            "SIGNAL".cyan(),
            version,
            depth_alpha_enabled
        ),
        LifecycleEvent::StartFailed { error } => {
            println!("{} {}", "ERROR".red(), error)
        }
        other => println!("{} {:?}", "STATE".dimmed(), other),
    }
}
