use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc;

use tagnet_core::assignment::RoleAssignmentTable;
use tagnet_core::events::{HostEvent, PresentationEvent};
use tagnet_core::peer::LocalIdentity;
use tagnet_core::player::{PeerId, PlayerRole};
use tagnet_core::session::SessionSettings;
use tagnet_core::tuning::PlayerTuning;

use tagnet_host::hub::LocalHub;
use tagnet_host::runner::{
    HostCommand, HostHandle, HostSessionConfig, PeerHandle, spawn_host_session,
    spawn_peer_session,
};

pub const TICK: Duration = Duration::from_millis(5);
const WAIT: Duration = Duration::from_secs(3);

/// Settings with a handshake timeout long enough that quorum always wins.
pub fn settings(expected: usize) -> SessionSettings {
    SessionSettings {
        expected_peer_count: expected,
        handshake_timeout: Duration::from_secs(2),
        ..SessionSettings::default()
    }
}

/// Table giving `roles[i]` to `identities[i]`.
pub fn table_from(identities: &[LocalIdentity], roles: &[PlayerRole]) -> RoleAssignmentTable {
    identities
        .iter()
        .zip(roles)
        .map(|(id, role)| (id.player_key, *role))
        .collect()
}

/// A running host with its peers, all over one `LocalHub`.
pub struct TestSession {
    pub hub: LocalHub,
    pub host: HostHandle,
    pub peers: BTreeMap<PeerId, PeerHandle>,
}

impl TestSession {
    /// The first identity is the host's own player.
    pub fn start(
        identities: Vec<LocalIdentity>,
        settings: SessionSettings,
        table: RoleAssignmentTable,
    ) -> Self {
        let (hub, host_inbound) = LocalHub::new();
        let mut peers = BTreeMap::new();
        let mut local_peer = None;
        for (i, identity) in identities.into_iter().enumerate() {
            let handle = spawn_peer_session(hub.clone(), identity, i == 0).unwrap();
            if i == 0 {
                local_peer = Some(handle.commands.clone());
            }
            peers.insert(handle.peer_id, handle);
        }
        let host = spawn_host_session(
            hub.clone(),
            host_inbound,
            HostSessionConfig {
                settings,
                table,
                tuning: PlayerTuning::default(),
                tick_interval: TICK,
                local_peer,
            },
        );
        Self { hub, host, peers }
    }

    pub fn join_late(&mut self, identity: LocalIdentity) {
        let handle = spawn_peer_session(self.hub.clone(), identity, false).unwrap();
        self.peers.insert(handle.peer_id, handle);
    }

    pub fn peer(&mut self, peer_id: PeerId) -> &mut PeerHandle {
        self.peers.get_mut(&peer_id).unwrap()
    }

    pub fn host_command(&self, cmd: HostCommand) {
        self.host.commands.send(cmd).unwrap();
    }

    /// Wait until every peer has seen `GameBegin`.
    pub async fn wait_all_begun(&mut self) {
        for handle in self.peers.values_mut() {
            wait_for(&mut handle.events, |e| {
                matches!(e, PresentationEvent::GameBegin { .. })
            })
            .await;
        }
    }
}

/// Receive until `pred` matches, returning everything seen including the
/// match.
pub async fn collect_until(
    rx: &mut mpsc::UnboundedReceiver<PresentationEvent>,
    pred: impl Fn(&PresentationEvent) -> bool,
) -> Vec<PresentationEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out; saw {seen:?}"))
            .unwrap_or_else(|| panic!("event channel closed; saw {seen:?}"));
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

pub async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<PresentationEvent>,
    pred: impl Fn(&PresentationEvent) -> bool,
) -> PresentationEvent {
    collect_until(rx, pred).await.pop().unwrap()
}

pub async fn wait_host_event(
    host: &mut HostHandle,
    pred: impl Fn(&HostEvent) -> bool,
) -> HostEvent {
    loop {
        let event = tokio::time::timeout(WAIT, host.events.recv())
            .await
            .expect("timed out waiting for host event")
            .expect("host event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

/// Events still queued on `rx`, without waiting.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<PresentationEvent>) -> Vec<PresentationEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
