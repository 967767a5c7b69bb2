use serde::{Deserialize, Serialize};

use crate::player::{PeerId, PlayerKey, PlayerRole, RosterEntry};
use crate::session::HoldingArea;
use crate::tuning::PlayerTuning;

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Peer -> Host
    ConfirmConnection = 0x01,
    RequestRoleChange = 0x02,
    ReportContact = 0x03,
    RequestDespawn = 0x04,

    // Host -> Peer (handshake)
    VerifyConnection = 0x10,
    ConnectionResult = 0x11,
    BeginGame = 0x12,

    // Host -> Peer (replication)
    RoleChanged = 0x20,
    Teleport = 0x21,
    PlayerDespawned = 0x22,
    TuningChanged = 0x23,

    // Host -> Peer (shutdown)
    EndGame = 0x30,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::ConfirmConnection),
            0x02 => Some(Self::RequestRoleChange),
            0x03 => Some(Self::ReportContact),
            0x04 => Some(Self::RequestDespawn),
            0x10 => Some(Self::VerifyConnection),
            0x11 => Some(Self::ConnectionResult),
            0x12 => Some(Self::BeginGame),
            0x20 => Some(Self::RoleChanged),
            0x21 => Some(Self::Teleport),
            0x22 => Some(Self::PlayerDespawned),
            0x23 => Some(Self::TuningChanged),
            0x30 => Some(Self::EndGame),
            _ => None,
        }
    }
}

// --- Peer -> Host ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmConnectionMsg {
    pub peer_id: PeerId,
    pub player_key: PlayerKey,
    pub display_name: String,
    pub protocol_version: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRoleChangeMsg {
    pub role: PlayerRole,
}

/// A contact observed locally by the sender, between itself and `other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportContactMsg {
    pub other: PeerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDespawnMsg {
    pub peer_id: PeerId,
}

// --- Host -> Peer ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConnectionMsg {
    pub peer_id: PeerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResultMsg {
    pub peer_id: PeerId,
    pub all_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginGameMsg {
    /// False when the handshake timed out before quorum.
    pub all_confirmed: bool,
    pub roster: Vec<RosterEntry>,
    pub tuning: PlayerTuning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChangedMsg {
    pub peer_id: PeerId,
    pub old: PlayerRole,
    pub new: PlayerRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleportMsg {
    pub peer_id: PeerId,
    pub area: HoldingArea,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDespawnedMsg {
    pub peer_id: PeerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningChangedMsg {
    pub tuning: PlayerTuning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndGameMsg {
    pub final_roster: Vec<RosterEntry>,
}

/// Messages a peer sends to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    ConfirmConnection(ConfirmConnectionMsg),
    RequestRoleChange(RequestRoleChangeMsg),
    ReportContact(ReportContactMsg),
    RequestDespawn(RequestDespawnMsg),
}

impl PeerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ConfirmConnection(_) => MessageType::ConfirmConnection,
            Self::RequestRoleChange(_) => MessageType::RequestRoleChange,
            Self::ReportContact(_) => MessageType::ReportContact,
            Self::RequestDespawn(_) => MessageType::RequestDespawn,
        }
    }
}

/// Messages the host sends to one or all peers.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    VerifyConnection(VerifyConnectionMsg),
    ConnectionResult(ConnectionResultMsg),
    BeginGame(BeginGameMsg),
    RoleChanged(RoleChangedMsg),
    Teleport(TeleportMsg),
    PlayerDespawned(PlayerDespawnedMsg),
    TuningChanged(TuningChangedMsg),
    EndGame(EndGameMsg),
}

impl HostMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::VerifyConnection(_) => MessageType::VerifyConnection,
            Self::ConnectionResult(_) => MessageType::ConnectionResult,
            Self::BeginGame(_) => MessageType::BeginGame,
            Self::RoleChanged(_) => MessageType::RoleChanged,
            Self::Teleport(_) => MessageType::Teleport,
            Self::PlayerDespawned(_) => MessageType::PlayerDespawned,
            Self::TuningChanged(_) => MessageType::TuningChanged,
            Self::EndGame(_) => MessageType::EndGame,
        }
    }
}
