//! Relay daemon - TCP broadcast relay
//!
//! Clients connect, send their display name as the first frame, and every
//! frame they send afterwards is rebroadcast to all connected clients as
//! `[name] text`.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (5555)
//! relayd
//!
//! # Listen on a specific port
//! relayd 6000
//!
//! # Cap frame size and enable debug logging
//! RELAY_MAX_FRAME_BYTES=65536 RUST_LOG=relayd=debug relayd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relayd::config::{RelayConfig, DEFAULT_PORT};
use relayd::registry::PeerRegistry;
use relayd::server::RelayServer;

/// TCP broadcast relay
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about)]
struct Args {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn main() -> Result<()> {
    let args = Args::parse();
    run(args)
}

/// Runs the relay (async entry point).
#[tokio::main]
async fn run(args: Args) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Relay starting"
    );

    let config = RelayConfig::from_env(args.port).context("Invalid configuration")?;

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = PeerRegistry::new();
    let server = RelayServer::bind(&config, registry, cancel_token)
        .await
        .context("Failed to start relay server")?;

    info!(
        addr = %server.local_addr(),
        max_frame_bytes = ?config.max_frame_length,
        write_timeout_ms = config.write_timeout.as_millis() as u64,
        "Chat relay listening"
    );

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Relay stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
