use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time the host waits for every expected peer before force-starting.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Scheduling ticks the host waits after broadcasting `EndGame` before its
/// own teardown.
pub const DEFAULT_END_ACK_TICKS: u32 = 1;

/// Lifecycle phase of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    AwaitingConnections,
    Active,
    Ending,
    Ended,
}

impl SessionPhase {
    /// Phases in which peers may still change their own state.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::AwaitingConnections | Self::Active)
    }
}

/// What happens to the expected peer count when a peer leaves before the
/// handshake resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// The departed peer no longer counts toward quorum.
    #[default]
    DecrementExpected,
    /// The departed peer still counts; only the timeout can start the game.
    KeepExpected,
}

/// How the host treats a peer asking to change its own role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRequestMode {
    /// Any role, any time the session is open. Debug/manual override.
    #[default]
    Unvalidated,
    /// Only before the game begins (a lobby preference), and never `None`.
    Validated,
}

/// Location tagged players are sent to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldingArea {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Host-side knobs for one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Peers (host included) required for quorum.
    pub expected_peer_count: usize,
    pub handshake_timeout: Duration,
    pub end_ack_ticks: u32,
    pub disconnect_policy: DisconnectPolicy,
    pub role_requests: RoleRequestMode,
    pub holding_area: HoldingArea,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            expected_peer_count: 1,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            end_ack_ticks: DEFAULT_END_ACK_TICKS,
            disconnect_policy: DisconnectPolicy::default(),
            role_requests: RoleRequestMode::default(),
            holding_area: HoldingArea::default(),
        }
    }
}

/// Authoritative session record owned by the host.
#[derive(Debug, Clone)]
pub struct Session {
    expected_peer_count: usize,
    phase: SessionPhase,
    phase_elapsed: Duration,
}

impl Session {
    pub fn new(expected_peer_count: usize) -> Self {
        Self {
            expected_peer_count,
            phase: SessionPhase::AwaitingConnections,
            phase_elapsed: Duration::ZERO,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn expected_peer_count(&self) -> usize {
        self.expected_peer_count
    }

    /// Time spent in the current phase.
    pub fn phase_elapsed(&self) -> Duration {
        self.phase_elapsed
    }

    pub fn advance(&mut self, dt: Duration) {
        self.phase_elapsed += dt;
    }

    pub fn enter(&mut self, phase: SessionPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "session phase change");
        self.phase = phase;
        self.phase_elapsed = Duration::ZERO;
    }

    /// Drop one peer from the quorum requirement.
    pub fn exclude_peer(&mut self) {
        self.expected_peer_count = self.expected_peer_count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_awaits_connections() {
        let session = Session::new(3);
        assert_eq!(session.phase(), SessionPhase::AwaitingConnections);
        assert_eq!(session.expected_peer_count(), 3);
        assert_eq!(session.phase_elapsed(), Duration::ZERO);
    }

    #[test]
    fn entering_a_phase_resets_elapsed() {
        let mut session = Session::new(2);
        session.advance(Duration::from_secs(4));
        assert_eq!(session.phase_elapsed(), Duration::from_secs(4));
        session.enter(SessionPhase::Active);
        assert_eq!(session.phase_elapsed(), Duration::ZERO);
    }

    #[test]
    fn exclude_peer_saturates_at_zero() {
        let mut session = Session::new(1);
        session.exclude_peer();
        session.exclude_peer();
        assert_eq!(session.expected_peer_count(), 0);
    }

    #[test]
    fn open_phases() {
        assert!(SessionPhase::AwaitingConnections.is_open());
        assert!(SessionPhase::Active.is_open());
        assert!(!SessionPhase::Ending.is_open());
        assert!(!SessionPhase::Ended.is_open());
    }
}
