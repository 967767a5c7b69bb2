pub mod assignment;
pub mod events;
pub mod handshake;
pub mod host;
pub mod monitor;
pub mod net;
pub mod peer;
pub mod player;
pub mod roles;
pub mod session;
pub mod shutdown;
pub mod tuning;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::collections::{BTreeMap, BTreeSet, VecDeque};
    use std::time::Duration;

    use crate::assignment::RoleAssignmentTable;
    use crate::events::{HostEvent, Outbound, PeerEffect, PresentationEvent};
    use crate::host::{HostInput, HostNode};
    use crate::net::messages::{HostMessage, PeerMessage};
    use crate::peer::{LocalIdentity, PeerNode};
    use crate::player::{PeerId, PlayerRole};
    use crate::session::SessionSettings;

    /// Create `n` identities with sequential peer ids starting at 1. The
    /// first one belongs to the host's own player.
    pub fn make_identities(n: usize) -> Vec<LocalIdentity> {
        (0..n)
            .map(|i| LocalIdentity::new(i as PeerId + 1, format!("Player{}", i + 1)))
            .collect()
    }

    /// Session settings expecting `expected` peers, everything else default.
    pub fn settings_for(expected: usize) -> SessionSettings {
        SessionSettings {
            expected_peer_count: expected,
            ..SessionSettings::default()
        }
    }

    /// Host and peers wired together in memory, with instant delivery.
    ///
    /// Peers can be "held": their outgoing messages queue up until
    /// released, which stands in for a slow link.
    pub struct LoopbackCluster {
        host: HostNode,
        host_peer: PeerId,
        peers: BTreeMap<PeerId, PeerNode>,
        connected: BTreeSet<PeerId>,
        held: BTreeSet<PeerId>,
        held_msgs: Vec<(PeerId, PeerMessage)>,
        events: BTreeMap<PeerId, Vec<PresentationEvent>>,
        host_events: Vec<HostEvent>,
    }

    impl LoopbackCluster {
        pub fn new(
            settings: SessionSettings,
            table: RoleAssignmentTable,
            identities: Vec<LocalIdentity>,
        ) -> Self {
            let host_peer = identities.first().map(|i| i.peer_id).unwrap_or(1);
            let peers = identities
                .into_iter()
                .map(|identity| {
                    let id = identity.peer_id;
                    let node = if id == host_peer {
                        PeerNode::new_host_local(identity)
                    } else {
                        PeerNode::new(identity)
                    };
                    (id, node)
                })
                .collect();
            Self {
                host: HostNode::new(settings, table),
                host_peer,
                peers,
                connected: BTreeSet::new(),
                held: BTreeSet::new(),
                held_msgs: Vec::new(),
                events: BTreeMap::new(),
                host_events: Vec::new(),
            }
        }

        pub fn host(&self) -> &HostNode {
            &self.host
        }

        pub fn peer(&self, peer_id: PeerId) -> &PeerNode {
            &self.peers[&peer_id]
        }

        pub fn peer_ids(&self) -> Vec<PeerId> {
            self.peers.keys().copied().collect()
        }

        pub fn events(&self, peer_id: PeerId) -> &[PresentationEvent] {
            self.events.get(&peer_id).map(Vec::as_slice).unwrap_or(&[])
        }

        pub fn host_events(&self) -> &[HostEvent] {
            &self.host_events
        }

        /// How many times `peer_id` saw a `GameBegin`.
        pub fn begin_count(&self, peer_id: PeerId) -> usize {
            self.events(peer_id)
                .iter()
                .filter(|e| matches!(e, PresentationEvent::GameBegin { .. }))
                .count()
        }

        pub fn end_count(&self, peer_id: PeerId) -> usize {
            self.events(peer_id)
                .iter()
                .filter(|e| matches!(e, PresentationEvent::GameEnd))
                .count()
        }

        pub fn hold(&mut self, peer_id: PeerId) {
            self.held.insert(peer_id);
        }

        /// Deliver everything `peer_id` sent while held.
        pub fn release(&mut self, peer_id: PeerId) {
            self.held.remove(&peer_id);
            let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.held_msgs)
                .into_iter()
                .partition(|(from, _)| *from == peer_id);
            self.held_msgs = rest;
            for (from, msg) in mine {
                self.input(HostInput::Message { from, msg });
            }
        }

        pub fn join(&mut self, peer_id: PeerId) {
            self.connected.insert(peer_id);
            self.input(HostInput::PeerJoined(peer_id));
        }

        pub fn join_all(&mut self) {
            for id in self.peer_ids() {
                self.join(id);
            }
        }

        pub fn leave(&mut self, peer_id: PeerId) {
            self.connected.remove(&peer_id);
            self.input(HostInput::PeerLeft(peer_id));
        }

        pub fn send(&mut self, from: PeerId, msg: PeerMessage) {
            self.input(HostInput::Message { from, msg });
        }

        pub fn tick(&mut self, dt: Duration) {
            self.input(HostInput::Tick(dt));
        }

        /// Feed one host input and run until no messages are in flight.
        pub fn input(&mut self, input: HostInput) {
            let mut queue = VecDeque::from([input]);
            while let Some(input) = queue.pop_front() {
                for out in self.host.handle(input) {
                    match out {
                        Outbound::ToPeer { peer_id, msg } => {
                            if self.connected.contains(&peer_id) {
                                self.deliver(peer_id, msg, &mut queue);
                            }
                        },
                        Outbound::Broadcast(msg) => {
                            let targets: Vec<_> = self.connected.iter().copied().collect();
                            for peer_id in targets {
                                self.deliver(peer_id, msg.clone(), &mut queue);
                            }
                        },
                        Outbound::Local(event) => {
                            self.host_events.push(event);
                            if event == HostEvent::GameEnded {
                                let host_peer = self.host_peer;
                                if let Some(node) = self.peers.get_mut(&host_peer) {
                                    let effects = node.host_game_ended();
                                    self.apply(host_peer, effects, &mut queue);
                                }
                            }
                        },
                    }
                }
            }
        }

        fn deliver(&mut self, peer_id: PeerId, msg: HostMessage, queue: &mut VecDeque<HostInput>) {
            let Some(node) = self.peers.get_mut(&peer_id) else {
                return;
            };
            let effects = node.handle(msg);
            self.apply(peer_id, effects, queue);
        }

        fn apply(
            &mut self,
            peer_id: PeerId,
            effects: Vec<PeerEffect>,
            queue: &mut VecDeque<HostInput>,
        ) {
            for effect in effects {
                match effect {
                    PeerEffect::Send(msg) => {
                        if self.held.contains(&peer_id) {
                            self.held_msgs.push((peer_id, msg));
                        } else {
                            queue.push_back(HostInput::Message { from: peer_id, msg });
                        }
                    },
                    PeerEffect::Emit(event) => {
                        self.events.entry(peer_id).or_default().push(event);
                    },
                }
            }
        }
    }

    /// Every connected peer's replica must agree with the host's roles.
    /// Players still at `None` that joined after `BeginGame` have had
    /// nothing replicated yet, so they may be missing from a replica.
    pub fn assert_replicas_match_host(cluster: &LoopbackCluster) {
        for (peer_id, node) in &cluster.peers {
            if !cluster.connected.contains(peer_id) || !node.has_begun() || node.has_ended() {
                continue;
            }
            for entry in cluster.host.roster() {
                let replica = node.role(entry.peer_id);
                if replica.is_none() && entry.role == PlayerRole::None {
                    continue;
                }
                assert_eq!(
                    replica,
                    Some(entry.role),
                    "peer {peer_id} disagrees with host about player {}",
                    entry.peer_id
                );
            }
        }
    }
}
