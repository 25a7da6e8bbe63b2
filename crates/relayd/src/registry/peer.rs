//! Peer identity and registry entries.

use std::fmt;

use chrono::{DateTime, Utc};

use super::outbound::Outbound;

/// Opaque identity of one accepted connection.
///
/// Identities are never reused within a server's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// A connected client as seen by the registry.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,

    /// Display name; `"anonymous"` until the handshake completes
    pub name: String,

    /// When the connection was accepted
    pub joined_at: DateTime<Utc>,

    /// Write side of the peer's channel
    pub outbound: Outbound,
}

impl Peer {
    /// Creates a peer entry stamped with the current time.
    pub fn new(id: PeerId, name: impl Into<String>, outbound: Outbound) -> Self {
        Self {
            id,
            name: name.into(),
            joined_at: Utc::now(),
            outbound,
        }
    }

    /// Seconds since the connection was accepted.
    pub fn connected_secs(&self) -> i64 {
        (Utc::now() - self.joined_at).num_seconds()
    }
}
