//! The authoritative host node.
//!
//! `HostNode` owns the session, handshake, role machine and shutdown
//! sequencer. It is sans-IO: every input returns the outbound effects in the
//! order they must be delivered, so state is always committed before the
//! messages describing it are sent.

use std::time::Duration;

use crate::assignment::RoleAssignmentTable;
use crate::events::{HostEvent, Outbound};
use crate::handshake::{ConfirmOutcome, ConnectionHandshake, Resolution};
use crate::net::messages::{
    BeginGameMsg, ConfirmConnectionMsg, ConnectionResultMsg, EndGameMsg, HostMessage, PeerMessage,
    PlayerDespawnedMsg, RoleChangedMsg, TeleportMsg, TuningChangedMsg, VerifyConnectionMsg,
};
use crate::net::protocol::PROTOCOL_VERSION;
use crate::player::{PeerId, PlayerKey, PlayerRole, RosterEntry};
use crate::roles::{ContactResolution, RoleCommit, RoleStateMachine};
use crate::session::{DisconnectPolicy, Session, SessionPhase, SessionSettings};
use crate::shutdown::ShutdownSequencer;
use crate::tuning::PlayerTuning;

/// Everything the host reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum HostInput {
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    Message { from: PeerId, msg: PeerMessage },
    /// Raised by the collision/proximity detector.
    Contact(PeerId, PeerId),
    /// External win condition.
    EndSignal,
    SetTuning(PlayerTuning),
    Tick(Duration),
}

pub struct HostNode {
    settings: SessionSettings,
    session: Session,
    handshake: ConnectionHandshake,
    roles: RoleStateMachine,
    table: RoleAssignmentTable,
    shutdown: ShutdownSequencer,
    tuning: PlayerTuning,
}

impl HostNode {
    pub fn new(settings: SessionSettings, table: RoleAssignmentTable) -> Self {
        Self {
            session: Session::new(settings.expected_peer_count),
            handshake: ConnectionHandshake::new(settings.handshake_timeout),
            roles: RoleStateMachine::new(settings.role_requests),
            shutdown: ShutdownSequencer::new(settings.end_ack_ticks),
            tuning: PlayerTuning::default(),
            table,
            settings,
        }
    }

    pub fn with_tuning(mut self, tuning: PlayerTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn expected_peer_count(&self) -> usize {
        self.session.expected_peer_count()
    }

    pub fn confirmed_count(&self) -> usize {
        self.handshake.confirmed_count()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.handshake.resolution()
    }

    pub fn role(&self, peer_id: PeerId) -> Option<PlayerRole> {
        self.roles.role(peer_id)
    }

    pub fn tuning(&self) -> &PlayerTuning {
        &self.tuning
    }

    /// Current players with their names and roles, ordered by peer id.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.roles
            .iter()
            .map(|(peer_id, role)| RosterEntry {
                peer_id,
                display_name: self
                    .handshake
                    .connection(peer_id)
                    .map(|c| c.display_name.clone())
                    .unwrap_or_default(),
                role,
            })
            .collect()
    }

    pub fn handle(&mut self, input: HostInput) -> Vec<Outbound> {
        let mut out = Vec::new();
        if self.session.phase() == SessionPhase::Ended {
            tracing::trace!(?input, "session ended, input dropped");
            return out;
        }
        match input {
            HostInput::PeerJoined(peer_id) => self.on_peer_joined(peer_id, &mut out),
            HostInput::PeerLeft(peer_id) => self.on_peer_left(peer_id, &mut out),
            HostInput::Message { from, msg } => self.on_message(from, msg, &mut out),
            HostInput::Contact(a, b) => self.on_contact(a, b, &mut out),
            HostInput::EndSignal => self.on_end_signal(&mut out),
            HostInput::SetTuning(tuning) => self.on_set_tuning(tuning, &mut out),
            HostInput::Tick(dt) => self.on_tick(dt, &mut out),
        }
        out
    }

    fn on_peer_joined(&mut self, peer_id: PeerId, out: &mut Vec<Outbound>) {
        if !self.session.phase().is_open() {
            tracing::debug!(peer_id, "join while shutting down, ignored");
            return;
        }
        if self.handshake.peer_joined(peer_id) {
            tracing::info!(peer_id, "peer joined, verifying connection");
        }
        out.push(Outbound::ToPeer {
            peer_id,
            msg: HostMessage::VerifyConnection(VerifyConnectionMsg { peer_id }),
        });
    }

    fn on_peer_left(&mut self, peer_id: PeerId, out: &mut Vec<Outbound>) {
        let Some(conn) = self.handshake.peer_left(peer_id) else {
            return;
        };
        tracing::info!(peer_id, name = %conn.display_name, "peer left");

        if self.roles.remove(peer_id).is_some() && self.session.phase().is_open() {
            out.push(Outbound::Broadcast(HostMessage::PlayerDespawned(
                PlayerDespawnedMsg { peer_id },
            )));
        }

        if self.session.phase() != SessionPhase::AwaitingConnections {
            return;
        }
        if self.settings.disconnect_policy == DisconnectPolicy::DecrementExpected {
            self.session.exclude_peer();
            tracing::debug!(
                expected = self.session.expected_peer_count(),
                "expected peer count lowered"
            );
        }
        let confirmed = self.handshake.confirmed_count();
        if confirmed > 0 && self.handshake.has_quorum(self.session.expected_peer_count()) {
            self.begin_game(Resolution::Quorum, out);
        }
    }

    fn on_message(&mut self, from: PeerId, msg: PeerMessage, out: &mut Vec<Outbound>) {
        match msg {
            PeerMessage::ConfirmConnection(m) => self.on_confirm(from, m, out),
            PeerMessage::RequestRoleChange(m) => self.on_role_request(from, m.role, out),
            PeerMessage::ReportContact(m) => {
                if m.other == from {
                    tracing::debug!(peer_id = from, "self-contact report ignored");
                    return;
                }
                self.on_contact(from, m.other, out);
            },
            PeerMessage::RequestDespawn(m) => {
                if m.peer_id != from {
                    tracing::debug!(from, target = m.peer_id, "despawn for another peer ignored");
                    return;
                }
                self.on_despawn(from, out);
            },
        }
    }

    fn on_confirm(&mut self, from: PeerId, msg: ConfirmConnectionMsg, out: &mut Vec<Outbound>) {
        if msg.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                peer_id = from,
                version = msg.protocol_version,
                expected = PROTOCOL_VERSION,
                "protocol version mismatch, confirmation ignored"
            );
            return;
        }
        let phase = self.session.phase();
        if !phase.is_open() {
            return;
        }
        let expected = self.session.expected_peer_count();
        let ConfirmOutcome::Confirmed { all_confirmed } =
            self.handshake.confirm(from, &msg, expected)
        else {
            return;
        };
        tracing::info!(
            peer_id = from,
            name = %msg.display_name,
            confirmed = self.handshake.confirmed_count(),
            expected,
            "connection confirmed"
        );

        self.roles.register(from);
        out.push(Outbound::Broadcast(HostMessage::ConnectionResult(
            ConnectionResultMsg {
                peer_id: from,
                all_confirmed,
            },
        )));

        match phase {
            SessionPhase::AwaitingConnections if all_confirmed => {
                self.begin_game(Resolution::Quorum, out);
            },
            SessionPhase::Active => self.admit_late_peer(from, out),
            _ => {},
        }
    }

    /// Resolve the handshake and start play. Runs once per session.
    fn begin_game(&mut self, resolution: Resolution, out: &mut Vec<Outbound>) {
        self.handshake.resolve(resolution);
        self.session.enter(SessionPhase::Active);
        let all_confirmed = resolution == Resolution::Quorum;

        out.push(Outbound::Broadcast(HostMessage::BeginGame(BeginGameMsg {
            all_confirmed,
            roster: self.roster(),
            tuning: self.tuning,
        })));

        let players: Vec<(PeerId, Option<PlayerKey>)> = self
            .handshake
            .confirmed_peers()
            .filter(|c| self.roles.contains(c.peer_id))
            .map(|c| (c.peer_id, c.player_key))
            .collect();
        for (peer_id, key) in players {
            self.assign_role(peer_id, key, out);
        }

        let active_players = self.roles.len();
        tracing::info!(all_confirmed, active_players, "game begins");
        out.push(Outbound::Local(HostEvent::GameBegun {
            all_confirmed,
            active_players,
        }));
    }

    /// A peer that confirmed after `BeginGame` went out gets its own copy.
    fn admit_late_peer(&mut self, peer_id: PeerId, out: &mut Vec<Outbound>) {
        tracing::info!(peer_id, "late peer admitted to running game");
        out.push(Outbound::ToPeer {
            peer_id,
            msg: HostMessage::BeginGame(BeginGameMsg {
                all_confirmed: self.handshake.resolution() == Some(Resolution::Quorum),
                roster: self.roster(),
                tuning: self.tuning,
            }),
        });
        let key = self
            .handshake
            .connection(peer_id)
            .and_then(|c| c.player_key);
        self.assign_role(peer_id, key, out);
    }

    fn assign_role(&mut self, peer_id: PeerId, key: Option<PlayerKey>, out: &mut Vec<Outbound>) {
        let table_role = key.and_then(|k| self.table.get(&k));
        if table_role.is_none() {
            tracing::debug!(peer_id, "no assignment table entry");
        }
        if let Some(commit) = self.roles.assign_initial(peer_id, table_role) {
            push_commit(commit, out);
        }
    }

    fn on_contact(&mut self, a: PeerId, b: PeerId, out: &mut Vec<Outbound>) {
        if self.session.phase() != SessionPhase::Active {
            tracing::debug!(a, b, "contact outside active play ignored");
            return;
        }
        let Some(resolution) = self.roles.resolve_contact(a, b) else {
            return;
        };
        let commit = resolution.commit();
        // Role goes out before the teleport so nobody sees a stale role at
        // the holding area.
        push_commit(commit, out);
        match resolution {
            ContactResolution::Tagged(_) => {
                tracing::info!(peer_id = commit.peer_id, "runner tagged");
                out.push(Outbound::Broadcast(HostMessage::Teleport(TeleportMsg {
                    peer_id: commit.peer_id,
                    area: self.settings.holding_area,
                })));
            },
            ContactResolution::Freed(_) => {
                tracing::info!(peer_id = commit.peer_id, "hostage freed");
            },
        }
    }

    fn on_role_request(&mut self, from: PeerId, role: PlayerRole, out: &mut Vec<Outbound>) {
        match self
            .roles
            .request_change(from, role, self.session.phase())
        {
            Ok(Some(commit)) => push_commit(commit, out),
            Ok(None) => {},
            Err(e) => tracing::warn!(peer_id = from, %role, error = %e, "role request rejected"),
        }
    }

    fn on_despawn(&mut self, peer_id: PeerId, out: &mut Vec<Outbound>) {
        if !self.session.phase().is_open() {
            return;
        }
        if self.roles.remove(peer_id).is_some() {
            tracing::info!(peer_id, "player despawned on request");
            out.push(Outbound::Broadcast(HostMessage::PlayerDespawned(
                PlayerDespawnedMsg { peer_id },
            )));
        }
    }

    fn on_end_signal(&mut self, out: &mut Vec<Outbound>) {
        match self.session.phase() {
            SessionPhase::AwaitingConnections => {
                tracing::warn!("end signal before game start, forcing start first");
                self.begin_game(Resolution::Timeout, out);
                self.start_shutdown(out);
            },
            SessionPhase::Active => self.start_shutdown(out),
            SessionPhase::Ending | SessionPhase::Ended => {
                tracing::debug!("end signal while already ending");
            },
        }
    }

    fn start_shutdown(&mut self, out: &mut Vec<Outbound>) {
        if !self.shutdown.begin() {
            return;
        }
        self.session.enter(SessionPhase::Ending);
        tracing::info!("game ending, notifying peers");
        out.push(Outbound::Broadcast(HostMessage::EndGame(EndGameMsg {
            final_roster: self.roster(),
        })));
    }

    fn on_set_tuning(&mut self, tuning: PlayerTuning, out: &mut Vec<Outbound>) {
        if !tuning.is_valid() {
            tracing::warn!(?tuning, "invalid tuning rejected");
            return;
        }
        if !self.session.phase().is_open() || tuning == self.tuning {
            return;
        }
        self.tuning = tuning;
        out.push(Outbound::Broadcast(HostMessage::TuningChanged(
            TuningChangedMsg { tuning },
        )));
    }

    fn on_tick(&mut self, dt: Duration, out: &mut Vec<Outbound>) {
        self.session.advance(dt);
        match self.session.phase() {
            SessionPhase::AwaitingConnections => {
                if self
                    .handshake
                    .deadline_passed(self.session.phase_elapsed())
                {
                    tracing::warn!(
                        confirmed = self.handshake.confirmed_count(),
                        expected = self.session.expected_peer_count(),
                        "handshake timed out, starting anyway"
                    );
                    self.begin_game(Resolution::Timeout, out);
                }
            },
            SessionPhase::Ending => {
                if self.shutdown.on_tick() {
                    self.session.enter(SessionPhase::Ended);
                    tracing::info!("host teardown complete");
                    out.push(Outbound::Local(HostEvent::GameEnded));
                }
            },
            SessionPhase::Active | SessionPhase::Ended => {},
        }
    }
}

fn push_commit(commit: RoleCommit, out: &mut Vec<Outbound>) {
    tracing::debug!(
        peer_id = commit.peer_id,
        old = %commit.old,
        new = %commit.new,
        "role committed"
    );
    out.push(Outbound::Broadcast(HostMessage::RoleChanged(RoleChangedMsg {
        peer_id: commit.peer_id,
        old: commit.old,
        new: commit.new,
    })));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::messages::{ReportContactMsg, RequestDespawnMsg, RequestRoleChangeMsg};
    use crate::session::{HoldingArea, RoleRequestMode};

    const SECOND: Duration = Duration::from_secs(1);

    fn settings(expected: usize) -> SessionSettings {
        SessionSettings {
            expected_peer_count: expected,
            ..SessionSettings::default()
        }
    }

    fn confirm(peer_id: PeerId, key: PlayerKey) -> HostInput {
        HostInput::Message {
            from: peer_id,
            msg: PeerMessage::ConfirmConnection(ConfirmConnectionMsg {
                peer_id,
                player_key: key,
                display_name: format!("Player{peer_id}"),
                protocol_version: PROTOCOL_VERSION,
            }),
        }
    }

    fn begin_games(out: &[Outbound]) -> Vec<&BeginGameMsg> {
        out.iter()
            .filter_map(|o| match o {
                Outbound::Broadcast(HostMessage::BeginGame(m)) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn role_changes(out: &[Outbound]) -> Vec<&RoleChangedMsg> {
        out.iter()
            .filter_map(|o| match o {
                Outbound::Broadcast(HostMessage::RoleChanged(m)) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Host with `ids` joined and confirmed, game running.
    fn running_host(roles: &[(PeerId, PlayerRole)]) -> HostNode {
        let mut table = RoleAssignmentTable::new();
        let mut keys = Vec::new();
        for &(id, role) in roles {
            let key = PlayerKey::new_random();
            table = table.with(key, role);
            keys.push((id, key));
        }
        let mut host = HostNode::new(settings(roles.len()), table);
        for &(id, _) in &keys {
            host.handle(HostInput::PeerJoined(id));
        }
        for &(id, key) in &keys {
            host.handle(confirm(id, key));
        }
        assert_eq!(host.phase(), SessionPhase::Active);
        host
    }

    #[test]
    fn join_sends_verify_to_that_peer() {
        let mut host = HostNode::new(settings(2), RoleAssignmentTable::new());
        let out = host.handle(HostInput::PeerJoined(4));
        assert_eq!(
            out,
            vec![Outbound::ToPeer {
                peer_id: 4,
                msg: HostMessage::VerifyConnection(VerifyConnectionMsg { peer_id: 4 }),
            }]
        );
    }

    #[test]
    fn two_peers_confirm_before_timeout() {
        let mut host = HostNode::new(settings(2), RoleAssignmentTable::new());
        host.handle(HostInput::PeerJoined(1));
        host.handle(HostInput::PeerJoined(2));

        host.handle(HostInput::Tick(SECOND));
        let out = host.handle(confirm(1, PlayerKey::new_random()));
        assert!(begin_games(&out).is_empty());
        assert!(out.contains(&Outbound::Broadcast(HostMessage::ConnectionResult(
            ConnectionResultMsg {
                peer_id: 1,
                all_confirmed: false,
            }
        ))));

        host.handle(HostInput::Tick(SECOND));
        let out = host.handle(confirm(2, PlayerKey::new_random()));
        assert_eq!(
            out[0],
            Outbound::Broadcast(HostMessage::ConnectionResult(ConnectionResultMsg {
                peer_id: 2,
                all_confirmed: true,
            }))
        );
        let begins = begin_games(&out);
        assert_eq!(begins.len(), 1);
        assert!(begins[0].all_confirmed);
        assert_eq!(host.phase(), SessionPhase::Active);
        assert_eq!(host.resolution(), Some(Resolution::Quorum));

        for _ in 0..20 {
            let out = host.handle(HostInput::Tick(SECOND));
            assert!(begin_games(&out).is_empty());
        }
    }

    #[test]
    fn timeout_starts_game_without_quorum() {
        let mut host = HostNode::new(settings(3), RoleAssignmentTable::new());
        for id in 1..=3 {
            host.handle(HostInput::PeerJoined(id));
        }
        host.handle(confirm(1, PlayerKey::new_random()));
        host.handle(confirm(2, PlayerKey::new_random()));

        let mut fired_at = None;
        for t in 1..=12u64 {
            let out = host.handle(HostInput::Tick(SECOND));
            let begins = begin_games(&out);
            if !begins.is_empty() {
                assert_eq!(begins.len(), 1);
                assert!(!begins[0].all_confirmed);
                assert!(fired_at.is_none(), "BeginGame broadcast twice");
                fired_at = Some(t);
                assert!(out.contains(&Outbound::Local(HostEvent::GameBegun {
                    all_confirmed: false,
                    active_players: 2,
                })));
            }
        }
        assert_eq!(fired_at, Some(10));
        assert_eq!(host.resolution(), Some(Resolution::Timeout));
    }

    #[test]
    fn duplicate_confirm_does_not_rebroadcast() {
        let mut host = HostNode::new(settings(1), RoleAssignmentTable::new());
        host.handle(HostInput::PeerJoined(1));
        let key = PlayerKey::new_random();
        let first = host.handle(confirm(1, key));
        assert_eq!(begin_games(&first).len(), 1);
        let second = host.handle(confirm(1, key));
        assert!(second.is_empty());
        assert_eq!(host.confirmed_count(), 1);
    }

    #[test]
    fn confirm_with_wrong_version_ignored() {
        let mut host = HostNode::new(settings(1), RoleAssignmentTable::new());
        host.handle(HostInput::PeerJoined(1));
        let out = host.handle(HostInput::Message {
            from: 1,
            msg: PeerMessage::ConfirmConnection(ConfirmConnectionMsg {
                peer_id: 1,
                player_key: PlayerKey::new_random(),
                display_name: "Old".to_string(),
                protocol_version: PROTOCOL_VERSION + 1,
            }),
        });
        assert!(out.is_empty());
        assert_eq!(host.confirmed_count(), 0);
    }

    #[test]
    fn assignment_follows_table_after_begin() {
        let catcher = PlayerKey::new_random();
        let runner = PlayerKey::new_random();
        let table = RoleAssignmentTable::new()
            .with(catcher, PlayerRole::Catcher)
            .with(runner, PlayerRole::Runner);
        let mut host = HostNode::new(settings(2), table);
        host.handle(HostInput::PeerJoined(1));
        host.handle(HostInput::PeerJoined(2));
        host.handle(confirm(1, runner));
        let out = host.handle(confirm(2, catcher));

        let begin_idx = out
            .iter()
            .position(|o| matches!(o, Outbound::Broadcast(HostMessage::BeginGame(_))))
            .unwrap();
        let first_role_idx = out
            .iter()
            .position(|o| matches!(o, Outbound::Broadcast(HostMessage::RoleChanged(_))))
            .unwrap();
        assert!(begin_idx < first_role_idx);

        let changes = role_changes(&out);
        assert_eq!(changes.len(), 2);
        assert_eq!(host.role(1), Some(PlayerRole::Runner));
        assert_eq!(host.role(2), Some(PlayerRole::Catcher));
    }

    #[test]
    fn tag_commits_role_before_teleport() {
        let mut host = running_host(&[(2, PlayerRole::Catcher), (5, PlayerRole::Runner)]);
        let out = host.handle(HostInput::Contact(5, 2));
        assert_eq!(
            out,
            vec![
                Outbound::Broadcast(HostMessage::RoleChanged(RoleChangedMsg {
                    peer_id: 5,
                    old: PlayerRole::Runner,
                    new: PlayerRole::Hostage,
                })),
                Outbound::Broadcast(HostMessage::Teleport(TeleportMsg {
                    peer_id: 5,
                    area: HoldingArea::default(),
                })),
            ]
        );
        assert_eq!(host.role(5), Some(PlayerRole::Hostage));
        assert!(host.handle(HostInput::Contact(2, 5)).is_empty());
    }

    #[test]
    fn freeing_hostage_has_no_teleport() {
        let mut host = running_host(&[
            (1, PlayerRole::Catcher),
            (2, PlayerRole::Runner),
            (3, PlayerRole::Runner),
        ]);
        host.handle(HostInput::Contact(1, 2));
        let out = host.handle(HostInput::Message {
            from: 3,
            msg: PeerMessage::ReportContact(ReportContactMsg { other: 2 }),
        });
        assert_eq!(out.len(), 1);
        assert_eq!(role_changes(&out)[0].new, PlayerRole::Runner);
        assert_eq!(host.role(2), Some(PlayerRole::Runner));
    }

    #[test]
    fn contacts_before_game_are_ignored() {
        let mut host = HostNode::new(settings(3), RoleAssignmentTable::new());
        host.handle(HostInput::PeerJoined(1));
        host.handle(confirm(1, PlayerKey::new_random()));
        assert!(host.handle(HostInput::Contact(1, 2)).is_empty());
    }

    #[test]
    fn unvalidated_role_request_commits() {
        let mut host = running_host(&[(1, PlayerRole::Runner), (2, PlayerRole::Catcher)]);
        let out = host.handle(HostInput::Message {
            from: 1,
            msg: PeerMessage::RequestRoleChange(RequestRoleChangeMsg {
                role: PlayerRole::Catcher,
            }),
        });
        assert_eq!(role_changes(&out).len(), 1);
        assert_eq!(host.role(1), Some(PlayerRole::Catcher));
    }

    #[test]
    fn validated_mode_takes_lobby_preference_but_table_wins() {
        let preferred = PlayerKey::new_random();
        let tabled = PlayerKey::new_random();
        let table = RoleAssignmentTable::new().with(tabled, PlayerRole::Catcher);
        let mut host = HostNode::new(
            SessionSettings {
                expected_peer_count: 2,
                role_requests: RoleRequestMode::Validated,
                ..SessionSettings::default()
            },
            table,
        );
        host.handle(HostInput::PeerJoined(1));
        host.handle(HostInput::PeerJoined(2));
        host.handle(confirm(1, preferred));
        let req = |role| HostInput::Message {
            from: 1,
            msg: PeerMessage::RequestRoleChange(RequestRoleChangeMsg { role }),
        };
        assert_eq!(role_changes(&host.handle(req(PlayerRole::Runner))).len(), 1);

        host.handle(confirm(2, tabled));
        assert_eq!(host.role(1), Some(PlayerRole::Runner));
        assert_eq!(host.role(2), Some(PlayerRole::Catcher));

        assert!(host.handle(req(PlayerRole::Catcher)).is_empty());
        assert_eq!(host.role(1), Some(PlayerRole::Runner));
    }

    #[test]
    fn disconnect_mid_handshake_lowers_quorum() {
        let mut host = HostNode::new(settings(3), RoleAssignmentTable::new());
        for id in 1..=3 {
            host.handle(HostInput::PeerJoined(id));
        }
        host.handle(confirm(1, PlayerKey::new_random()));
        host.handle(confirm(2, PlayerKey::new_random()));
        let out = host.handle(HostInput::PeerLeft(3));
        assert_eq!(host.expected_peer_count(), 2);
        let begins = begin_games(&out);
        assert_eq!(begins.len(), 1);
        assert!(begins[0].all_confirmed);
    }

    #[test]
    fn keep_expected_policy_waits_for_timeout() {
        let mut host = HostNode::new(
            SessionSettings {
                expected_peer_count: 2,
                disconnect_policy: DisconnectPolicy::KeepExpected,
                ..SessionSettings::default()
            },
            RoleAssignmentTable::new(),
        );
        host.handle(HostInput::PeerJoined(1));
        host.handle(HostInput::PeerJoined(2));
        host.handle(confirm(1, PlayerKey::new_random()));
        assert!(begin_games(&host.handle(HostInput::PeerLeft(2))).is_empty());
        assert_eq!(host.expected_peer_count(), 2);
        assert_eq!(host.phase(), SessionPhase::AwaitingConnections);
    }

    #[test]
    fn late_confirmation_gets_unicast_begin() {
        let mut host = HostNode::new(settings(2), RoleAssignmentTable::new());
        host.handle(HostInput::PeerJoined(1));
        host.handle(HostInput::PeerJoined(2));
        host.handle(confirm(1, PlayerKey::new_random()));
        for _ in 0..10 {
            host.handle(HostInput::Tick(SECOND));
        }
        assert_eq!(host.phase(), SessionPhase::Active);

        let out = host.handle(confirm(2, PlayerKey::new_random()));
        assert!(begin_games(&out).is_empty());
        assert!(out.iter().any(|o| matches!(
            o,
            Outbound::ToPeer {
                peer_id: 2,
                msg: HostMessage::BeginGame(_)
            }
        )));
        assert_eq!(host.role(2), Some(PlayerRole::None));
    }

    #[test]
    fn despawn_request_removes_player() {
        let mut host = running_host(&[(1, PlayerRole::Runner), (2, PlayerRole::Catcher)]);
        let despawn = |peer_id| HostInput::Message {
            from: 1,
            msg: PeerMessage::RequestDespawn(RequestDespawnMsg { peer_id }),
        };
        assert!(host.handle(despawn(2)).is_empty());
        let out = host.handle(despawn(1));
        assert_eq!(
            out,
            vec![Outbound::Broadcast(HostMessage::PlayerDespawned(
                PlayerDespawnedMsg { peer_id: 1 }
            ))]
        );
        assert_eq!(host.role(1), None);
        assert_eq!(host.roster().len(), 1);
    }

    #[test]
    fn shutdown_broadcasts_then_tears_down_next_tick() {
        let mut host = running_host(&[(1, PlayerRole::Runner)]);
        let out = host.handle(HostInput::EndSignal);
        assert!(matches!(
            out.as_slice(),
            [Outbound::Broadcast(HostMessage::EndGame(_))]
        ));
        assert_eq!(host.phase(), SessionPhase::Ending);
        assert!(host.handle(HostInput::EndSignal).is_empty());

        let out = host.handle(HostInput::Tick(SECOND));
        assert_eq!(out, vec![Outbound::Local(HostEvent::GameEnded)]);
        assert_eq!(host.phase(), SessionPhase::Ended);

        assert!(host.handle(HostInput::Tick(SECOND)).is_empty());
        assert!(host.handle(HostInput::PeerJoined(9)).is_empty());
    }

    #[test]
    fn end_signal_during_handshake_forces_start_first() {
        let mut host = HostNode::new(settings(2), RoleAssignmentTable::new());
        host.handle(HostInput::PeerJoined(1));
        let out = host.handle(HostInput::EndSignal);
        let begin_idx = out
            .iter()
            .position(|o| matches!(o, Outbound::Broadcast(HostMessage::BeginGame(_))))
            .unwrap();
        let end_idx = out
            .iter()
            .position(|o| matches!(o, Outbound::Broadcast(HostMessage::EndGame(_))))
            .unwrap();
        assert!(begin_idx < end_idx);
        assert_eq!(host.phase(), SessionPhase::Ending);
    }

    #[test]
    fn tuning_change_broadcasts_once() {
        let mut host = running_host(&[(1, PlayerRole::Runner)]);
        let tuning = PlayerTuning {
            running_speed: 15.0,
            ..PlayerTuning::default()
        };
        let out = host.handle(HostInput::SetTuning(tuning));
        assert_eq!(
            out,
            vec![Outbound::Broadcast(HostMessage::TuningChanged(
                TuningChangedMsg { tuning }
            ))]
        );
        assert!(host.handle(HostInput::SetTuning(tuning)).is_empty());

        let bad = PlayerTuning {
            gravity: f32::INFINITY,
            ..tuning
        };
        assert!(host.handle(HostInput::SetTuning(bad)).is_empty());
        assert_eq!(host.tuning(), &tuning);
    }

    #[test]
    fn leaving_player_is_despawned_for_others() {
        let mut host = running_host(&[(1, PlayerRole::Runner), (2, PlayerRole::Catcher)]);
        let out = host.handle(HostInput::PeerLeft(2));
        assert_eq!(
            out,
            vec![Outbound::Broadcast(HostMessage::PlayerDespawned(
                PlayerDespawnedMsg { peer_id: 2 }
            ))]
        );
        assert_eq!(host.confirmed_count(), 1);
    }
}
