//! Host-side connection handshake.
//!
//! Each joined peer is sent `VerifyConnection`; once it answers with
//! `ConfirmConnection` it counts toward quorum. The handshake resolves
//! exactly once, either on quorum or when the countdown runs out.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::net::messages::ConfirmConnectionMsg;
use crate::player::{PeerId, PlayerKey};

/// Host-side record of one joined peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnection {
    pub peer_id: PeerId,
    pub display_name: String,
    pub player_key: Option<PlayerKey>,
    pub confirmed: bool,
}

impl PeerConnection {
    fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            display_name: String::new(),
            player_key: None,
            confirmed: false,
        }
    }
}

/// How the handshake resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Quorum,
    Timeout,
}

/// Result of feeding a `ConfirmConnection` to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Sender mismatch or a peer that never joined.
    Ignored,
    /// Already confirmed; nothing changes.
    Duplicate,
    Confirmed { all_confirmed: bool },
}

#[derive(Debug, Clone)]
pub struct ConnectionHandshake {
    peers: BTreeMap<PeerId, PeerConnection>,
    timeout: Duration,
    resolution: Option<Resolution>,
}

impl ConnectionHandshake {
    pub fn new(timeout: Duration) -> Self {
        Self {
            peers: BTreeMap::new(),
            timeout,
            resolution: None,
        }
    }

    /// Register a transport-level join. Returns false if the peer was
    /// already known.
    pub fn peer_joined(&mut self, peer_id: PeerId) -> bool {
        if self.peers.contains_key(&peer_id) {
            return false;
        }
        self.peers.insert(peer_id, PeerConnection::new(peer_id));
        true
    }

    /// Mark `from` confirmed. `expected` is the current quorum size.
    pub fn confirm(
        &mut self,
        from: PeerId,
        msg: &ConfirmConnectionMsg,
        expected: usize,
    ) -> ConfirmOutcome {
        if msg.peer_id != from {
            tracing::debug!(from, claimed = msg.peer_id, "confirmation for another peer");
            return ConfirmOutcome::Ignored;
        }
        let Some(conn) = self.peers.get_mut(&from) else {
            tracing::debug!(from, "confirmation from a peer that never joined");
            return ConfirmOutcome::Ignored;
        };
        if conn.confirmed {
            return ConfirmOutcome::Duplicate;
        }
        conn.confirmed = true;
        conn.display_name = msg.display_name.clone();
        conn.player_key = Some(msg.player_key);
        ConfirmOutcome::Confirmed {
            all_confirmed: self.has_quorum(expected),
        }
    }

    /// Forget a departed peer.
    pub fn peer_left(&mut self, peer_id: PeerId) -> Option<PeerConnection> {
        self.peers.remove(&peer_id)
    }

    pub fn confirmed_count(&self) -> usize {
        self.peers.values().filter(|c| c.confirmed).count()
    }

    pub fn has_quorum(&self, expected: usize) -> bool {
        self.confirmed_count() >= expected
    }

    /// True once the countdown has run out on an unresolved handshake.
    pub fn deadline_passed(&self, elapsed: Duration) -> bool {
        self.resolution.is_none() && elapsed >= self.timeout
    }

    pub fn resolve(&mut self, resolution: Resolution) {
        if self.resolution.is_none() {
            self.resolution = Some(resolution);
        }
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn connection(&self, peer_id: PeerId) -> Option<&PeerConnection> {
        self.peers.get(&peer_id)
    }

    pub fn confirmed_peers(&self) -> impl Iterator<Item = &PeerConnection> {
        self.peers.values().filter(|c| c.confirmed)
    }
}
