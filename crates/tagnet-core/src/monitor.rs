use std::collections::BTreeMap;

use serde::Serialize;

use crate::events::PresentationEvent;
use crate::player::{PeerId, PlayerRole, RosterEntry};

/// Player cards for a session overview, driven purely by presentation
/// events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMonitor {
    cards: BTreeMap<PeerId, RosterEntry>,
    ended: bool,
}

impl SessionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &PresentationEvent) {
        match event {
            PresentationEvent::GameBegin { roster, .. } => {
                self.cards = roster.iter().map(|e| (e.peer_id, e.clone())).collect();
            },
            PresentationEvent::RoleChanged { player_id, new, .. } => {
                self.cards
                    .entry(*player_id)
                    .or_insert_with(|| RosterEntry {
                        peer_id: *player_id,
                        display_name: format!("Player {player_id}"),
                        role: *new,
                    })
                    .role = *new;
            },
            PresentationEvent::PlayerDespawned { player_id } => {
                self.cards.remove(player_id);
            },
            // The host's view wins, names of late joiners included.
            PresentationEvent::FinalStandings(roster) => {
                self.cards = roster.iter().map(|e| (e.peer_id, e.clone())).collect();
            },
            // Cards stay up as final standings.
            PresentationEvent::GameEnd => self.ended = true,
            PresentationEvent::ConnectionVerified
            | PresentationEvent::Teleport { .. }
            | PresentationEvent::TuningChanged(_) => {},
        }
    }

    pub fn cards(&self) -> impl Iterator<Item = &RosterEntry> {
        self.cards.values()
    }

    pub fn card(&self, peer_id: PeerId) -> Option<&RosterEntry> {
        self.cards.get(&peer_id)
    }

    pub fn count_by_role(&self, role: PlayerRole) -> usize {
        self.cards.values().filter(|c| c.role == role).count()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
