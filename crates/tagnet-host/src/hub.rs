//! In-process transport: one host inbox and one channel per connected peer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use tagnet_core::net::messages::{HostMessage, PeerMessage};
use tagnet_core::net::protocol::{encode_host_message, encode_peer_message};
use tagnet_core::net::transport::{Transport, TransportError};
use tagnet_core::player::PeerId;

/// What the host task reads from the hub.
#[derive(Debug, Clone)]
pub enum HostInbound {
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    /// Encoded `PeerMessage` frame.
    Frame { from: PeerId, data: Bytes },
}

/// What a peer task reads from the hub.
#[derive(Debug, Clone)]
pub enum PeerInbound {
    /// Encoded `HostMessage` frame.
    Frame(Bytes),
    /// The host went away without finishing the shutdown sequence.
    HostLost,
}

struct HubState {
    host_tx: Option<mpsc::UnboundedSender<HostInbound>>,
    peers: HashMap<PeerId, mpsc::UnboundedSender<PeerInbound>>,
}

impl HubState {
    fn send_to_host(&self, msg: HostInbound) -> Result<(), TransportError> {
        let tx = self.host_tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(msg).map_err(|_| TransportError::Closed)
    }
}

/// Cheap to clone; all clones share the same routing table.
#[derive(Clone)]
pub struct LocalHub {
    state: Arc<Mutex<HubState>>,
}

impl LocalHub {
    /// Create a hub and the receiving end of the host inbox.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostInbound>) {
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let hub = Self {
            state: Arc::new(Mutex::new(HubState {
                host_tx: Some(host_tx),
                peers: HashMap::new(),
            })),
        };
        (hub, host_rx)
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a peer. The host sees `PeerJoined` before any frame from it.
    ///
    /// An id stays taken until its holder disconnects; a rejoin under the
    /// same id must wait for that.
    pub fn connect(
        &self,
        peer_id: PeerId,
    ) -> Result<mpsc::UnboundedReceiver<PeerInbound>, TransportError> {
        let mut state = self.lock();
        if state.host_tx.is_none() {
            return Err(TransportError::Closed);
        }
        if state.peers.contains_key(&peer_id) {
            tracing::warn!(peer_id, "connect rejected, peer id in use");
            return Err(TransportError::PeerIdInUse(peer_id));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.peers.insert(peer_id, tx);
        state.send_to_host(HostInbound::PeerJoined(peer_id))?;
        tracing::debug!(peer_id, "peer connected to hub");
        Ok(rx)
    }

    /// Detach a peer and tell the host. Safe to call after the host is gone.
    pub fn disconnect(&self, peer_id: PeerId) {
        let mut state = self.lock();
        if state.peers.remove(&peer_id).is_none() {
            return;
        }
        let _ = state.send_to_host(HostInbound::PeerLeft(peer_id));
        tracing::debug!(peer_id, "peer disconnected from hub");
    }

    /// Drop the host side. Every connected peer receives `HostLost`.
    pub fn shutdown_host(&self) {
        let mut state = self.lock();
        if state.host_tx.take().is_none() {
            return;
        }
        for (peer_id, tx) in state.peers.drain() {
            if tx.send(PeerInbound::HostLost).is_err() {
                tracing::trace!(peer_id, "peer already gone at host shutdown");
            }
        }
        tracing::debug!("host detached from hub");
    }

    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn is_connected(&self, peer_id: PeerId) -> bool {
        self.lock().peers.contains_key(&peer_id)
    }
}

impl Transport for LocalHub {
    fn send_to_host(&self, from: PeerId, msg: &PeerMessage) -> Result<(), TransportError> {
        let data = Bytes::from(encode_peer_message(msg)?);
        let state = self.lock();
        if !state.peers.contains_key(&from) {
            return Err(TransportError::UnknownPeer(from));
        }
        state.send_to_host(HostInbound::Frame { from, data })
    }

    fn send_to_peer(&self, peer_id: PeerId, msg: &HostMessage) -> Result<(), TransportError> {
        let data = Bytes::from(encode_host_message(msg)?);
        let state = self.lock();
        let tx = state
            .peers
            .get(&peer_id)
            .ok_or(TransportError::UnknownPeer(peer_id))?;
        tx.send(PeerInbound::Frame(data))
            .map_err(|_| TransportError::UnknownPeer(peer_id))
    }

    fn broadcast(&self, msg: &HostMessage) -> Result<(), TransportError> {
        let data = Bytes::from(encode_host_message(msg)?);
        let state = self.lock();
        for (peer_id, tx) in &state.peers {
            // Bytes clone is a refcount bump.
            if tx.send(PeerInbound::Frame(data.clone())).is_err() {
                tracing::trace!(peer_id, "broadcast to closed peer channel");
            }
        }
        Ok(())
    }
}
