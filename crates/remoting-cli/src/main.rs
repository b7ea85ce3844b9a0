//! Remoting signaling CLI
//!
//! Host the signaling side of a remote rendering session, or poke at one
//! from the client side.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use remoting_session::SessionConfig;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod probe;
mod server;

/// Remoting signaling host and probe
#[derive(Parser)]
#[command(name = "remoting-signal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (.toml or .json)
    #[arg(short, long, global = true, env = "REMOTING_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for a signaling client and drive the peer connection
    Serve {
        /// Bind address, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,

        /// Port number, overrides the config file
        #[arg(short = 'P', long)]
        port: Option<u16>,
    },

    /// Connect to a signaling host and print what it sends
    Probe {
        /// Signaling host
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Signaling port
        #[arg(short = 'P', long, default_value = "9999")]
        port: u16,

        /// Answer any received offer with the SDP in this file
        #[arg(short, long)]
        answer: Option<PathBuf>,
    },

    /// Show version and the default configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    // Handle Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        let _ = shutdown_tx.send(()).await;
    });

    match cli.command {
        Commands::Serve { bind, port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(bind) = bind {
                config.signaling.ip = bind;
            }
            if let Some(port) = port {
                config.signaling.port = port;
            }
            server::run_server(config, &mut shutdown_rx).await?;
        }

        Commands::Probe { host, port, answer } => {
            let config = load_config(cli.config.as_deref())?;
            let answer = match answer {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read answer SDP {}", path.display()))?,
                ),
                None => None,
            };
            println!(
                "{} Connecting to {}:{}",
                "REMOTING".cyan().bold(),
                host,
                port
            );
            probe::run_probe(&host, port, config, answer, &mut shutdown_rx).await?;
        }

        Commands::Info => {
            print_info()?;
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

/// Read a session config; `.toml` files as TOML, anything else as JSON
fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: SessionConfig = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&text).with_context(|| format!("Invalid TOML in {}", path.display()))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))?
    };

    info!("Loaded config from {}", path.display());
    Ok(config)
}

fn print_info() -> Result<()> {
    println!("{}", "Remoting signaling".cyan().bold());
    println!();
    println!("Version:    {}", env!("CARGO_PKG_VERSION"));
    println!("Protocol:   {}", remoting_core::ProtocolVersion::LATEST);
    println!("Platform:   {}", std::env::consts::OS);
    println!("Arch:       {}", std::env::consts::ARCH);
    println!(
        "WebRTC:     {}",
        if cfg!(feature = "webrtc") {
            "enabled"
        } else {
            "disabled (build with --features webrtc)"
        }
    );
    println!();
    println!("{}", "Default configuration:".green());
    print!("{}", toml::to_string_pretty(&SessionConfig::default())?);
    println!();
    println!("{}", "Examples:".green());
    println!("  remoting-signal serve --port 9999            # Host a session");
    println!("  remoting-signal probe --answer answer.sdp    # Act as the remote client");
    Ok(())
}
