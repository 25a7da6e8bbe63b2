//! Fan-out of one formatted line to every registered peer.
//!
//! A broadcast works from a registry snapshot, so peers that join while it
//! runs are not included and peers removed meanwhile may still be tried
//! once. A peer whose delivery fails is closed and removed; nothing is
//! retried.

use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, warn};

use relay_protocol::{format_line, ChannelError};

use crate::registry::{PeerId, PeerRegistry};

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the line was written to
    pub delivered: usize,

    /// Peers removed because delivery failed
    pub dropped: Vec<PeerId>,
}

/// Delivers lines to every peer in a registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: PeerRegistry,
}

impl Broadcaster {
    pub fn new(registry: PeerRegistry) -> Self {
        Self { registry }
    }

    /// Returns the registry this broadcaster delivers to.
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Sends `[sender_tag] message` to every registered peer except
    /// `exclude`.
    ///
    /// Per-peer writes run concurrently, so a stalled peer costs at most
    /// one write timeout.
    pub async fn broadcast(
        &self,
        sender_tag: &str,
        message: &str,
        exclude: Option<PeerId>,
    ) -> BroadcastReport {
        let line = Bytes::from(format_line(sender_tag, message));

        let targets: Vec<_> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|peer| Some(peer.id) != exclude)
            .collect();

        let results = join_all(targets.iter().map(|peer| {
            let line = line.clone();
            async move { peer.outbound.send(line).await }
        }))
        .await;

        let mut report = BroadcastReport::default();

        for (peer, result) in targets.iter().zip(results) {
            let err = match result {
                Ok(()) => {
                    report.delivered += 1;
                    continue;
                }
                Err(e) => e,
            };

            if err == ChannelError::Closed {
                debug!(peer = %peer.id, name = %peer.name, "Skipping closed peer");
            } else {
                warn!(
                    peer = %peer.id,
                    name = %peer.name,
                    error = %err,
                    "Delivery failed, dropping peer"
                );
            }

            peer.outbound.close().await;
            if self.registry.remove(peer.id).await.is_some() {
                report.dropped.push(peer.id);
            }
        }

        debug!(
            sender = %sender_tag,
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Broadcast complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelSettings;
    use crate::registry::{Outbound, Peer};
    use relay_protocol::FrameReader;
    use tokio::io::{duplex, DuplexStream};

    async fn add_peer(registry: &PeerRegistry, id: u64, name: &str) -> FrameReader<DuplexStream> {
        let (server, client) = duplex(4096);
        let outbound = Outbound::new(server, ChannelSettings::default());
        registry.add(Peer::new(PeerId::new(id), name, outbound)).await;
        FrameReader::new(client)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_peer() {
        let registry = PeerRegistry::new();
        let mut a = add_peer(&registry, 1, "alice").await;
        let mut b = add_peer(&registry, 2, "bob").await;
        let broadcaster = Broadcaster::new(registry);

        let report = broadcaster.broadcast("alice", "hi", None).await;

        assert_eq!(report.delivered, 2);
        assert!(report.dropped.is_empty());
        assert_eq!(a.recv_frame().await.unwrap().as_ref(), b"[alice] hi");
        assert_eq!(b.recv_frame().await.unwrap().as_ref(), b"[alice] hi");
    }

    #[tokio::test]
    async fn test_broadcast_skips_excluded_peer() {
        let registry = PeerRegistry::new();
        let _a = add_peer(&registry, 1, "alice").await;
        let mut b = add_peer(&registry, 2, "bob").await;
        let broadcaster = Broadcaster::new(registry);

        let report = broadcaster
            .broadcast("alice", "psst", Some(PeerId::new(1)))
            .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(b.recv_frame().await.unwrap().as_ref(), b"[alice] psst");
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_registry() {
        let broadcaster = Broadcaster::new(PeerRegistry::new());
        let report = broadcaster.broadcast("Server", "anyone?", None).await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_unreachable_peer_dropped_others_still_served() {
        let registry = PeerRegistry::new();
        let mut a = add_peer(&registry, 1, "alice").await;
        let b = add_peer(&registry, 2, "bob").await;
        let mut c = add_peer(&registry, 3, "carol").await;

        // Remote end goes away before the broadcast
        drop(b);

        let broadcaster = Broadcaster::new(registry.clone());
        let report = broadcaster.broadcast("alice", "hi", None).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, vec![PeerId::new(2)]);
        assert!(registry.get(PeerId::new(2)).await.is_none());
        assert_eq!(a.recv_frame().await.unwrap().as_ref(), b"[alice] hi");
        assert_eq!(c.recv_frame().await.unwrap().as_ref(), b"[alice] hi");

        // A later broadcast does not retry the dropped peer
        let report = broadcaster.broadcast("carol", "again", None).await;
        assert_eq!(report.delivered, 2);
        assert!(report.dropped.is_empty());
    }

    #[tokio::test]
    async fn test_already_closed_peer_is_removed() {
        let registry = PeerRegistry::new();
        let _a = add_peer(&registry, 1, "alice").await;
        let mut b = add_peer(&registry, 2, "bob").await;

        let alice = registry.get(PeerId::new(1)).await.unwrap();
        alice.outbound.close().await;

        let broadcaster = Broadcaster::new(registry.clone());
        let report = broadcaster.broadcast("bob", "still here", None).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, vec![PeerId::new(1)]);
        assert_eq!(registry.len().await, 1);
        assert_eq!(b.recv_frame().await.unwrap().as_ref(), b"[bob] still here");
    }
}
