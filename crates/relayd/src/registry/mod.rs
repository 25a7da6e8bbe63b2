//! Registry of connected peers.
//!
//! A single mutex guards an insertion-ordered list of peers. Every read
//! and write takes the lock, and the lock is only held for the structural
//! operation itself: broadcasts work from a [`PeerRegistry::snapshot`] and
//! perform their I/O after the lock is released.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  add/rename/remove  ┌─────────────────┐
//! │ConnectionHandler│────────────────────▶│  PeerRegistry   │
//! └─────────────────┘                     │ Mutex<Vec<Peer>>│
//!                                         └────────┬────────┘
//! ┌─────────────────┐   snapshot/remove            │
//! │   Broadcaster   │◀─────────────────────────────┘
//! └─────────────────┘
//! ```
//!
//! The registry is an explicit handle passed to the server and handlers,
//! so tests can build one around in-memory channels.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

mod outbound;
mod peer;

pub use outbound::Outbound;
pub use peer::{Peer, PeerId};

#[derive(Default)]
struct RegistryState {
    peers: Vec<Peer>,
    closed: bool,
}

/// Handle to the shared peer registry.
///
/// Cheap to clone; all clones refer to the same set of peers.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a peer.
    ///
    /// After [`close`](Self::close) the peer is not inserted; its channel is
    /// closed instead so its handler winds down.
    pub async fn add(&self, peer: Peer) {
        let rejected = {
            let mut state = self.state.lock().await;
            if state.closed {
                Some(peer)
            } else {
                debug!(peer = %peer.id, name = %peer.name, "Peer added");
                state.peers.push(peer);
                None
            }
        };

        if let Some(peer) = rejected {
            warn!(peer = %peer.id, "Registry closed, refusing peer");
            peer.outbound.close().await;
        }
    }

    /// Removes a peer, returning its entry if it was still present.
    ///
    /// Removing an absent peer is a no-op, so concurrent removers are safe
    /// and only the first one gets `Some`.
    pub async fn remove(&self, id: PeerId) -> Option<Peer> {
        let mut state = self.state.lock().await;
        let index = state.peers.iter().position(|p| p.id == id)?;
        let peer = state.peers.remove(index);
        debug!(peer = %peer.id, name = %peer.name, "Peer removed");
        Some(peer)
    }

    /// Sets a peer's display name. Returns false if the peer is gone.
    pub async fn rename(&self, id: PeerId, name: impl Into<String>) -> bool {
        let mut state = self.state.lock().await;
        match state.peers.iter_mut().find(|p| p.id == id) {
            Some(peer) => {
                peer.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of every registered peer, in insertion order.
    pub async fn snapshot(&self) -> Vec<Peer> {
        self.state.lock().await.peers.clone()
    }

    /// Looks up a single peer.
    pub async fn get(&self, id: PeerId) -> Option<Peer> {
        self.state
            .lock()
            .await
            .peers
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Number of registered peers.
    pub async fn len(&self) -> usize {
        self.state.lock().await.peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Empties the registry and closes it permanently.
    ///
    /// Returns the peers that were registered so the caller can close
    /// their channels.
    pub async fn close(&self) -> Vec<Peer> {
        let mut state = self.state.lock().await;
        state.closed = true;
        std::mem::take(&mut state.peers)
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}
