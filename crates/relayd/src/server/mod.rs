//! TCP server for the relay daemon.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  PeerRegistry   │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └─────────────────┘
//!         │
//!         │ broadcast
//!         ▼
//! ┌─────────────────┐
//! │  every peer's   │
//! │    Outbound     │
//! └─────────────────┘
//! ```
//!
//! # Shutdown
//!
//! Cancelling the token stops the accept loop, broadcasts a shutdown
//! notice, closes the registry along with every peer's channel, and then
//! waits for every handler task to finish before `run` returns.

mod connection;

pub use connection::{ConnectionHandler, ConnectionState};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use relay_protocol::{SERVER_TAG, SHUTDOWN_NOTICE};

use crate::broadcast::Broadcaster;
use crate::config::{ChannelSettings, RelayConfig};
use crate::registry::{PeerId, PeerRegistry};

/// TCP broadcast relay server.
pub struct RelayServer {
    listener: TcpListener,

    /// Address the listener is bound to
    local_addr: SocketAddr,

    registry: PeerRegistry,

    broadcaster: Broadcaster,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating peer IDs
    connection_counter: AtomicU64,

    /// Tracks spawned connection handlers
    tracker: TaskTracker,

    settings: ChannelSettings,
}

impl RelayServer {
    /// Binds the listening socket.
    ///
    /// # Arguments
    ///
    /// * `config` - Listen address and channel settings
    /// * `registry` - Registry the connections register into
    /// * `cancel_token` - Token for graceful shutdown
    pub async fn bind(
        config: &RelayConfig,
        registry: PeerRegistry,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = config.listen_addr();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;

        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr,
            error: e.to_string(),
        })?;

        Ok(Self {
            listener,
            local_addr,
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            tracker: TaskTracker::new(),
            settings: config.channel_settings(),
        })
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the registry shared with connection handlers.
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Returns a token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// shuts down gracefully. Does not return until every connection
    /// handler has finished.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, "Relay server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, addr, PeerId::new(conn_num));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Handles a new client connection by spawning a handler task.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, id: PeerId) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let handler =
            ConnectionHandler::new(id, reader, writer, self.broadcaster.clone(), self.settings);

        debug!(peer = %id, remote = %addr, "Accepted connection");

        self.tracker.spawn(async move {
            let name = handler.run().await;
            debug!(peer = %id, name = %name, "Connection handler finished");
        });
    }

    /// Notifies peers, closes every channel and waits for handlers.
    async fn shutdown(&self) {
        let report = self
            .broadcaster
            .broadcast(SERVER_TAG, SHUTDOWN_NOTICE, None)
            .await;

        let peers = self.registry.close().await;
        info!(
            notified = report.delivered,
            peers = peers.len(),
            "Closing peer connections"
        );

        for peer in peers {
            peer.outbound.close().await;
        }

        self.tracker.close();
        if !self.tracker.is_empty() {
            debug!(handlers = self.tracker.len(), "Waiting for connection handlers");
        }
        self.tracker.wait().await;

        if !self.registry.is_empty().await {
            warn!("Registry not empty after shutdown");
        }

        info!("Server shutdown complete");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },
}
