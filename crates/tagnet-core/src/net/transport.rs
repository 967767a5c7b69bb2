use crate::player::PeerId;

use super::messages::{HostMessage, PeerMessage};
use super::protocol::ProtocolError;

/// Reliable, ordered channel between the host and its peers.
///
/// Implementations must deliver per-sender FIFO and must not duplicate
/// messages; the state machines built on top rely on both.
pub trait Transport: Send + Sync {
    /// Send from a peer to the host.
    fn send_to_host(&self, from: PeerId, msg: &PeerMessage) -> Result<(), TransportError>;

    /// Send from the host to a single peer.
    fn send_to_peer(&self, peer_id: PeerId, msg: &HostMessage) -> Result<(), TransportError>;

    /// Send from the host to every connected peer, the host's own peer included.
    fn broadcast(&self, msg: &HostMessage) -> Result<(), TransportError>;
}

#[derive(Debug)]
pub enum TransportError {
    /// The channel to the host is gone.
    Closed,
    UnknownPeer(PeerId),
    /// A live connection already holds this peer id.
    PeerIdInUse(PeerId),
    Protocol(ProtocolError),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::UnknownPeer(id) => write!(f, "unknown peer: {id}"),
            Self::PeerIdInUse(id) => write!(f, "peer id already connected: {id}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProtocolError> for TransportError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
