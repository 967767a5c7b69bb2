use std::collections::BTreeMap;

use crate::player::{PeerId, PlayerRole};
use crate::session::{RoleRequestMode, SessionPhase};

/// A committed role change, ready to be replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCommit {
    pub peer_id: PeerId,
    pub old: PlayerRole,
    pub new: PlayerRole,
}

/// What a contact between two players did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactResolution {
    /// A Catcher caught a Runner; the Runner is now a Hostage.
    Tagged(RoleCommit),
    /// A Runner touched a Hostage; the Hostage runs again.
    Freed(RoleCommit),
}

impl ContactResolution {
    pub fn commit(&self) -> RoleCommit {
        match self {
            Self::Tagged(c) | Self::Freed(c) => *c,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequestError {
    UnknownPlayer(PeerId),
    SessionClosed,
    NotAllowed {
        requested: PlayerRole,
        reason: &'static str,
    },
}

impl std::fmt::Display for RoleRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPlayer(id) => write!(f, "no player for peer {id}"),
            Self::SessionClosed => write!(f, "session is no longer accepting changes"),
            Self::NotAllowed { requested, reason } => {
                write!(f, "role {requested} not allowed: {reason}")
            },
        }
    }
}

impl std::error::Error for RoleRequestError {}

/// Which side of a contact changes, and to what.
fn contact_transition(a: PlayerRole, b: PlayerRole) -> Option<(bool, PlayerRole)> {
    use PlayerRole::{Catcher, Hostage, Runner};
    // (changes_a, new_role)
    match (a, b) {
        (Catcher, Runner) => Some((false, Hostage)),
        (Runner, Catcher) => Some((true, Hostage)),
        (Runner, Hostage) => Some((false, Runner)),
        (Hostage, Runner) => Some((true, Runner)),
        _ => None,
    }
}

/// Authoritative per-player roles. Only the host holds one of these.
#[derive(Debug, Clone)]
pub struct RoleStateMachine {
    roles: BTreeMap<PeerId, PlayerRole>,
    mode: RoleRequestMode,
}

impl RoleStateMachine {
    pub fn new(mode: RoleRequestMode) -> Self {
        Self {
            roles: BTreeMap::new(),
            mode,
        }
    }

    pub fn mode(&self) -> RoleRequestMode {
        self.mode
    }

    /// Add a player at `None`. No-op if already present.
    pub fn register(&mut self, peer_id: PeerId) {
        self.roles.entry(peer_id).or_default();
    }

    pub fn remove(&mut self, peer_id: PeerId) -> Option<PlayerRole> {
        self.roles.remove(&peer_id)
    }

    pub fn role(&self, peer_id: PeerId) -> Option<PlayerRole> {
        self.roles.get(&peer_id).copied()
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.roles.contains_key(&peer_id)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PeerId, PlayerRole)> + '_ {
        self.roles.iter().map(|(id, role)| (*id, *role))
    }

    /// Write `new` for a known player. Returns `None` when nothing changed.
    fn commit(&mut self, peer_id: PeerId, new: PlayerRole) -> Option<RoleCommit> {
        let slot = self.roles.get_mut(&peer_id)?;
        let old = *slot;
        if old == new {
            return None;
        }
        *slot = new;
        Some(RoleCommit { peer_id, old, new })
    }

    /// Post-handshake assignment. Without a table entry the current role
    /// stands.
    pub fn assign_initial(
        &mut self,
        peer_id: PeerId,
        table_role: Option<PlayerRole>,
    ) -> Option<RoleCommit> {
        self.register(peer_id);
        self.commit(peer_id, table_role?)
    }

    /// Apply the tag rules to a contact between `a` and `b`.
    pub fn resolve_contact(&mut self, a: PeerId, b: PeerId) -> Option<ContactResolution> {
        if a == b {
            return None;
        }
        let (changes_a, new) = contact_transition(self.role(a)?, self.role(b)?)?;
        let target = if changes_a { a } else { b };
        let commit = self.commit(target, new)?;
        Some(if new == PlayerRole::Hostage {
            ContactResolution::Tagged(commit)
        } else {
            ContactResolution::Freed(commit)
        })
    }

    /// A peer asking to change its own role.
    pub fn request_change(
        &mut self,
        peer_id: PeerId,
        requested: PlayerRole,
        phase: SessionPhase,
    ) -> Result<Option<RoleCommit>, RoleRequestError> {
        if !phase.is_open() {
            return Err(RoleRequestError::SessionClosed);
        }
        if !self.contains(peer_id) {
            return Err(RoleRequestError::UnknownPlayer(peer_id));
        }
        if self.mode == RoleRequestMode::Validated {
            if phase != SessionPhase::AwaitingConnections {
                return Err(RoleRequestError::NotAllowed {
                    requested,
                    reason: "game already started",
                });
            }
            if requested == PlayerRole::None {
                return Err(RoleRequestError::NotAllowed {
                    requested,
                    reason: "cannot clear a role",
                });
            }
        }
        Ok(self.commit(peer_id, requested))
    }
}
