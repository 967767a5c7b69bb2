use serde::{Deserialize, Serialize};

use crate::net::messages::{HostMessage, PeerMessage};
use crate::player::{PeerId, PlayerRole, RosterEntry};
use crate::session::HoldingArea;
use crate::tuning::PlayerTuning;

/// Notifications for the presentation layer (UI, rendering, audio).
/// The core never reads anything back from that layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PresentationEvent {
    /// This peer's handshake round-trip completed.
    ConnectionVerified,
    GameBegin {
        all_confirmed: bool,
        roster: Vec<RosterEntry>,
    },
    RoleChanged {
        player_id: PeerId,
        old: PlayerRole,
        new: PlayerRole,
    },
    /// Move `player_id` to the holding area.
    Teleport { player_id: PeerId, area: HoldingArea },
    TuningChanged(PlayerTuning),
    PlayerDespawned { player_id: PeerId },
    /// The host's roster as the game closed. Arrives right before `GameEnd`
    /// when the host ended the game; absent when the host was lost.
    FinalStandings(Vec<RosterEntry>),
    GameEnd,
}

/// Host-local milestones that do not travel over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostEvent {
    GameBegun {
        all_confirmed: bool,
        active_players: usize,
    },
    /// Host-side teardown finished; the session is over.
    GameEnded,
}

/// An effect produced by the host state machine, in the order it must be
/// carried out.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    ToPeer { peer_id: PeerId, msg: HostMessage },
    Broadcast(HostMessage),
    Local(HostEvent),
}

/// An effect produced by a peer state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEffect {
    Send(PeerMessage),
    Emit(PresentationEvent),
}
