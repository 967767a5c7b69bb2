use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport-assigned identifier for a connected peer. Can be reused across
/// reconnects, so never key persistent data on it.
pub type PeerId = u64;

/// Stable identifier for a player, independent of the transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerKey(pub Uuid);

impl PlayerKey {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Role a player holds in the tag game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    #[default]
    None,
    Catcher,
    Runner,
    Hostage,
}

impl PlayerRole {
    pub const ALL: [PlayerRole; 4] = [
        PlayerRole::None,
        PlayerRole::Catcher,
        PlayerRole::Runner,
        PlayerRole::Hostage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Catcher => "catcher",
            Self::Runner => "runner",
            Self::Hostage => "hostage",
        }
    }
}

impl fmt::Display for PlayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One player card as shown in the session monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub peer_id: PeerId,
    pub display_name: String,
    pub role: PlayerRole,
}
