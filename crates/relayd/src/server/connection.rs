//! Connection handler for individual client connections.
//!
//! Each accepted connection gets its own `ConnectionHandler`, which walks
//! the connection through its lifecycle:
//!
//! ```text
//! Connecting ──▶ Registering ──▶ Active ──▶ Closing ──▶ Closed
//!                     │                        ▲
//!                     └── channel failure ─────┘
//! ```
//!
//! - Registering: the peer is registered as `anonymous`, then the first
//!   frame names it and a join notice goes to everyone.
//! - Active: frames are rebroadcast under the peer's name until the quit
//!   sentinel arrives or the channel breaks.
//! - Closing: the channel is closed, the peer removed, and a leave notice
//!   goes to everyone still connected.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::fmt;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use relay_protocol::{
    display_name, join_notice, leave_notice, ChannelError, FrameReader, Inbound, ANONYMOUS,
    SERVER_TAG,
};

use crate::broadcast::Broadcaster;
use crate::config::ChannelSettings;
use crate::registry::{Outbound, Peer, PeerId};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registering,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Registering => "registering",
            ConnectionState::Active => "active",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Result of one receive step.
#[derive(Debug)]
enum Received {
    Message(Inbound),
    Broken(ChannelError),
}

/// Connection handler for a single client.
pub struct ConnectionHandler<R> {
    id: PeerId,

    /// Read side of the channel (owned exclusively)
    reader: FrameReader<R>,

    /// Write side of the channel (shared with the registry)
    outbound: Outbound,

    broadcaster: Broadcaster,

    /// Current display name
    name: String,

    state: ConnectionState,
}

impl<R: AsyncRead + Unpin> ConnectionHandler<R> {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `id` - Fresh identity for this connection
    /// * `reader` - Read half of the stream
    /// * `writer` - Write half of the stream
    /// * `broadcaster` - Broadcaster over the shared registry
    /// * `settings` - Frame and timeout settings
    pub fn new<W>(
        id: PeerId,
        reader: R,
        writer: W,
        broadcaster: Broadcaster,
        settings: ChannelSettings,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            reader: FrameReader::with_max_frame_length(reader, settings.max_frame_length),
            outbound: Outbound::new(writer, settings),
            broadcaster,
            name: ANONYMOUS.to_string(),
            state: ConnectionState::Connecting,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the connection to completion.
    ///
    /// Returns the final display name of the peer.
    pub async fn run(mut self) -> String {
        debug!(peer = %self.id, "New client connected");

        self.transition(ConnectionState::Registering);
        self.broadcaster
            .registry()
            .add(Peer::new(self.id, ANONYMOUS, self.outbound.clone()))
            .await;

        match self.receive_frame().await {
            Ok(payload) => self.complete_registration(&payload).await,
            Err(e) => {
                warn!(peer = %self.id, error = %e, "Handshake failed");
                self.transition(ConnectionState::Closing);
                self.outbound.close().await;
                self.broadcaster.registry().remove(self.id).await;
                self.transition(ConnectionState::Closed);
                return self.name;
            }
        }

        self.process_messages().await;
        self.teardown().await;
        self.name
    }

    /// Names the peer and announces it.
    async fn complete_registration(&mut self, payload: &[u8]) {
        self.name = display_name(payload);
        self.broadcaster
            .registry()
            .rename(self.id, self.name.clone())
            .await;
        self.transition(ConnectionState::Active);

        info!(peer = %self.id, name = %self.name, "Client joined");

        self.broadcaster
            .broadcast(SERVER_TAG, &join_notice(&self.name), None)
            .await;
    }

    /// Main receive loop; returns when the connection should close.
    async fn process_messages(&mut self) {
        loop {
            match self.receive().await {
                Received::Message(Inbound::Quit) => {
                    debug!(peer = %self.id, name = %self.name, "Client requested disconnect");
                    break;
                }
                Received::Message(Inbound::Chat(text)) => {
                    debug!(peer = %self.id, bytes = text.len(), "Received message");
                    self.broadcaster.broadcast(&self.name, &text, None).await;
                }
                Received::Broken(e) => {
                    debug!(peer = %self.id, name = %self.name, error = %e, "Connection closed");
                    break;
                }
            }
        }
        self.transition(ConnectionState::Closing);
    }

    /// Closes the channel, deregisters the peer and announces the departure.
    async fn teardown(&mut self) {
        self.outbound.close().await;

        if let Some(peer) = self.broadcaster.registry().remove(self.id).await {
            info!(
                peer = %self.id,
                name = %self.name,
                connected_secs = peer.connected_secs(),
                "Client left"
            );
        }

        self.broadcaster
            .broadcast(SERVER_TAG, &leave_notice(&self.name), None)
            .await;

        self.transition(ConnectionState::Closed);
    }

    /// Receives one post-handshake frame and classifies it.
    async fn receive(&mut self) -> Received {
        match self.receive_frame().await {
            Ok(payload) => Received::Message(Inbound::classify(&payload)),
            Err(e) => Received::Broken(e),
        }
    }

    /// Receives a raw frame, or fails once the outbound side is closed.
    async fn receive_frame(&mut self) -> Result<Bytes, ChannelError> {
        tokio::select! {
            _ = self.outbound.closed() => Err(ChannelError::Closed),
            frame = self.reader.recv_frame() => frame,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(peer = %self.id, from = %self.state, to = %next, "Connection state change");
        self.state = next;
    }
}
