//! Peer-side node.
//!
//! Every participant, the host's own player included, runs a `PeerNode`. It
//! answers the handshake, mirrors the host's roster, and turns host messages
//! into presentation events. It never decides a role on its own.

use std::collections::BTreeMap;

use crate::events::{PeerEffect, PresentationEvent};
use crate::net::messages::{
    ConfirmConnectionMsg, HostMessage, PeerMessage, ReportContactMsg, RequestDespawnMsg,
    RequestRoleChangeMsg,
};
use crate::net::protocol::PROTOCOL_VERSION;
use crate::player::{PeerId, PlayerKey, PlayerRole, RosterEntry};
use crate::shutdown::GameEndLatch;
use crate::tuning::PlayerTuning;

/// Who this peer is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub peer_id: PeerId,
    pub player_key: PlayerKey,
    pub display_name: String,
}

impl LocalIdentity {
    pub fn new(peer_id: PeerId, display_name: impl Into<String>) -> Self {
        Self {
            peer_id,
            player_key: PlayerKey::new_random(),
            display_name: display_name.into(),
        }
    }

    pub fn with_key(mut self, player_key: PlayerKey) -> Self {
        self.player_key = player_key;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PeerNode {
    identity: LocalIdentity,
    /// The host's own player ends through host teardown, not `EndGame`.
    is_host: bool,
    verified: bool,
    begun: bool,
    end: GameEndLatch,
    roster: BTreeMap<PeerId, RosterEntry>,
    /// Held by the host's own player until local teardown.
    final_roster: Option<Vec<RosterEntry>>,
    tuning: PlayerTuning,
}

impl PeerNode {
    pub fn new(identity: LocalIdentity) -> Self {
        Self {
            identity,
            is_host: false,
            verified: false,
            begun: false,
            end: GameEndLatch::default(),
            roster: BTreeMap::new(),
            final_roster: None,
            tuning: PlayerTuning::default(),
        }
    }

    /// The player that lives in the host process.
    pub fn new_host_local(identity: LocalIdentity) -> Self {
        Self {
            is_host: true,
            ..Self::new(identity)
        }
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn peer_id(&self) -> PeerId {
        self.identity.peer_id
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn has_begun(&self) -> bool {
        self.begun
    }

    pub fn has_ended(&self) -> bool {
        self.end.has_fired()
    }

    /// Replicated role of any known player.
    pub fn role(&self, peer_id: PeerId) -> Option<PlayerRole> {
        self.roster.get(&peer_id).map(|e| e.role)
    }

    pub fn local_role(&self) -> Option<PlayerRole> {
        self.role(self.identity.peer_id)
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.roster.values().cloned().collect()
    }

    pub fn tuning(&self) -> &PlayerTuning {
        &self.tuning
    }

    pub fn handle(&mut self, msg: HostMessage) -> Vec<PeerEffect> {
        if self.end.has_fired() {
            tracing::trace!(peer_id = self.peer_id(), "message after game end dropped");
            return Vec::new();
        }
        match msg {
            HostMessage::VerifyConnection(m) => {
                if m.peer_id != self.identity.peer_id {
                    tracing::debug!(
                        peer_id = self.peer_id(),
                        addressed = m.peer_id,
                        "verify for another peer ignored"
                    );
                    return Vec::new();
                }
                vec![PeerEffect::Send(PeerMessage::ConfirmConnection(
                    ConfirmConnectionMsg {
                        peer_id: self.identity.peer_id,
                        player_key: self.identity.player_key,
                        display_name: self.identity.display_name.clone(),
                        protocol_version: PROTOCOL_VERSION,
                    },
                ))]
            },
            HostMessage::ConnectionResult(m) => {
                if m.peer_id != self.identity.peer_id || self.verified {
                    return Vec::new();
                }
                self.verified = true;
                tracing::info!(peer_id = self.peer_id(), "connection verified");
                vec![PeerEffect::Emit(PresentationEvent::ConnectionVerified)]
            },
            HostMessage::BeginGame(m) => {
                if self.begun {
                    return Vec::new();
                }
                self.begun = true;
                self.tuning = m.tuning;
                self.roster = m
                    .roster
                    .iter()
                    .map(|e| (e.peer_id, e.clone()))
                    .collect();
                tracing::info!(
                    peer_id = self.peer_id(),
                    all_confirmed = m.all_confirmed,
                    players = self.roster.len(),
                    "game begins"
                );
                vec![PeerEffect::Emit(PresentationEvent::GameBegin {
                    all_confirmed: m.all_confirmed,
                    roster: m.roster,
                })]
            },
            HostMessage::RoleChanged(m) => {
                let entry = self.roster.entry(m.peer_id).or_insert_with(|| RosterEntry {
                    peer_id: m.peer_id,
                    display_name: String::new(),
                    role: m.old,
                });
                entry.role = m.new;
                vec![PeerEffect::Emit(PresentationEvent::RoleChanged {
                    player_id: m.peer_id,
                    old: m.old,
                    new: m.new,
                })]
            },
            HostMessage::Teleport(m) => vec![PeerEffect::Emit(PresentationEvent::Teleport {
                player_id: m.peer_id,
                area: m.area,
            })],
            HostMessage::PlayerDespawned(m) => {
                if self.roster.remove(&m.peer_id).is_none() {
                    return Vec::new();
                }
                vec![PeerEffect::Emit(PresentationEvent::PlayerDespawned {
                    player_id: m.peer_id,
                })]
            },
            HostMessage::TuningChanged(m) => {
                self.tuning = m.tuning;
                vec![PeerEffect::Emit(PresentationEvent::TuningChanged(m.tuning))]
            },
            HostMessage::EndGame(m) => {
                if self.end.has_fired() {
                    return Vec::new();
                }
                self.final_roster = Some(m.final_roster);
                if self.is_host {
                    tracing::debug!("host player waits for local teardown");
                    return Vec::new();
                }
                self.teardown()
            },
        }
    }

    /// Host teardown finished. Only meaningful for the host's own player.
    pub fn host_game_ended(&mut self) -> Vec<PeerEffect> {
        self.teardown()
    }

    /// The transport lost the host before `EndGame` arrived.
    pub fn host_lost(&mut self) -> Vec<PeerEffect> {
        if !self.end.has_fired() {
            tracing::warn!(peer_id = self.peer_id(), "lost connection to host");
        }
        self.teardown()
    }

    fn teardown(&mut self) -> Vec<PeerEffect> {
        if !self.end.fire() {
            return Vec::new();
        }
        self.roster.clear();
        tracing::info!(peer_id = self.peer_id(), "game ended");
        let mut effects = Vec::with_capacity(2);
        if let Some(standings) = self.final_roster.take() {
            effects.push(PeerEffect::Emit(PresentationEvent::FinalStandings(standings)));
        }
        effects.push(PeerEffect::Emit(PresentationEvent::GameEnd));
        effects
    }

    pub fn request_role(&self, role: PlayerRole) -> PeerMessage {
        PeerMessage::RequestRoleChange(RequestRoleChangeMsg { role })
    }

    /// Report a locally observed contact. `None` for a self-contact.
    pub fn report_contact(&self, other: PeerId) -> Option<PeerMessage> {
        (other != self.identity.peer_id)
            .then_some(PeerMessage::ReportContact(ReportContactMsg { other }))
    }

    pub fn request_despawn(&self) -> PeerMessage {
        PeerMessage::RequestDespawn(RequestDespawnMsg {
            peer_id: self.identity.peer_id,
        })
    }
}
