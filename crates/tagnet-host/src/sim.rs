//! Whole-session simulation over the in-process hub.
//!
//! Spawns the host, its own player and the remaining peers, lets random
//! contacts play out for the configured duration, then ends the game and
//! collects what each peer saw.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use tagnet_core::assignment::RoleAssignmentTable;
use tagnet_core::events::HostEvent;
use tagnet_core::monitor::SessionMonitor;
use tagnet_core::peer::LocalIdentity;
use tagnet_core::player::{PeerId, PlayerKey, RosterEntry};

use crate::config::TagnetConfig;
use crate::error::SimError;
use crate::hub::LocalHub;
use crate::runner::{
    HostCommand, HostSessionConfig, PeerHandle, spawn_host_session, spawn_peer_session,
};

/// Slack on top of configured waits before the simulation gives up.
const GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub all_confirmed: bool,
    pub active_players: usize,
    pub contacts: usize,
    /// Peers whose `GameEnd` fired.
    pub ended_peers: usize,
    /// Player cards as the host's own player saw them at the end.
    pub final_cards: Vec<RosterEntry>,
}

pub fn sim_identities(names: &[String]) -> Vec<LocalIdentity> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| LocalIdentity::new(i as PeerId + 1, name.clone()))
        .collect()
}

pub async fn run_simulation(config: &TagnetConfig) -> Result<SimReport, SimError> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.assignment.seed.unwrap_or_else(rand::random));
    let identities = sim_identities(&config.sim.players);
    let table = if config.assignment.roles.is_empty() {
        let keys: Vec<PlayerKey> = identities.iter().map(|i| i.player_key).collect();
        RoleAssignmentTable::draw(&keys, config.assignment.catcher_count, &mut rng)
    } else {
        config.assignment.roles.clone()
    };
    let host_player = identities.first().map(|i| i.peer_id);

    let (hub, host_inbound) = LocalHub::new();
    let mut peers: Vec<PeerHandle> = Vec::with_capacity(identities.len());
    for identity in identities {
        let is_host = Some(identity.peer_id) == host_player;
        peers.push(spawn_peer_session(hub.clone(), identity, is_host)?);
    }

    let mut host = spawn_host_session(
        hub.clone(),
        host_inbound,
        HostSessionConfig {
            settings: config.session.settings(),
            table,
            tuning: config.tuning,
            tick_interval: config.session.tick_interval(),
            local_peer: peers.first().map(|p| p.commands.clone()),
        },
    );

    let start_limit = Duration::from_millis(config.session.handshake_timeout_ms) + GRACE;
    let (all_confirmed, active_players) =
        match tokio::time::timeout(start_limit, host.events.recv()).await {
            Ok(Some(HostEvent::GameBegun {
                all_confirmed,
                active_players,
            })) => (all_confirmed, active_players),
            Ok(Some(HostEvent::GameEnded) | None) => return Err(SimError::HostStopped),
            Err(_) => return Err(SimError::Timeout("game start")),
        };
    tracing::info!(all_confirmed, active_players, "simulated game running");

    let ids: Vec<PeerId> = peers.iter().map(|p| p.peer_id).collect();
    let play_until = tokio::time::Instant::now() + Duration::from_millis(config.sim.duration_ms);
    let mut every = tokio::time::interval(Duration::from_millis(config.sim.contact_interval_ms));
    every.tick().await;
    let mut contacts = 0;
    while tokio::time::Instant::now() < play_until {
        every.tick().await;
        if ids.len() < 2 {
            continue;
        }
        let a = ids[rng.random_range(0..ids.len())];
        let b = ids[rng.random_range(0..ids.len())];
        if a == b {
            continue;
        }
        tracing::debug!(a, b, "simulated contact");
        host.commands
            .send(HostCommand::Contact(a, b))
            .map_err(|_| SimError::HostStopped)?;
        contacts += 1;
    }

    host.commands
        .send(HostCommand::EndSignal)
        .map_err(|_| SimError::HostStopped)?;
    loop {
        match tokio::time::timeout(GRACE, host.events.recv()).await {
            Ok(Some(HostEvent::GameEnded)) => break,
            Ok(Some(_)) => {},
            Ok(None) => return Err(SimError::HostStopped),
            Err(_) => return Err(SimError::Timeout("host teardown")),
        }
    }

    let mut final_cards = Vec::new();
    let mut ended_peers = 0;
    for mut peer in peers {
        if tokio::time::timeout(GRACE, &mut peer.task).await.is_err() {
            tracing::warn!(peer_id = peer.peer_id, "peer task did not finish");
            peer.task.abort();
        }
        let mut monitor = SessionMonitor::new();
        while let Ok(event) = peer.events.try_recv() {
            monitor.observe(&event);
        }
        if monitor.is_ended() {
            ended_peers += 1;
        }
        if Some(peer.peer_id) == host_player {
            final_cards = monitor.cards().cloned().collect();
        }
    }

    Ok(SimReport {
        all_confirmed,
        active_players,
        contacts,
        ended_peers,
        final_cards,
    })
}
