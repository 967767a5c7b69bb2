//! Tokio tasks that drive the host and peer state machines.
//!
//! Each node is a single task selecting over its inbound queue, a command
//! queue, and (host only) a tick interval. All state lives in the sans-IO
//! nodes; the tasks only decode, dispatch and send.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tagnet_core::assignment::RoleAssignmentTable;
use tagnet_core::events::{HostEvent, Outbound, PeerEffect, PresentationEvent};
use tagnet_core::host::{HostInput, HostNode};
use tagnet_core::net::protocol::{decode_host_message, decode_peer_message};
use tagnet_core::net::transport::{Transport, TransportError};
use tagnet_core::peer::{LocalIdentity, PeerNode};
use tagnet_core::player::{PeerId, PlayerRole};
use tagnet_core::session::{SessionPhase, SessionSettings};
use tagnet_core::tuning::PlayerTuning;

use crate::hub::{HostInbound, LocalHub, PeerInbound};

/// `tokio::time::interval` rejects a zero period.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Commands from the embedding application to the host task.
#[derive(Debug)]
pub enum HostCommand {
    /// Reported by the collision/proximity detector.
    Contact(PeerId, PeerId),
    EndSignal,
    SetTuning(PlayerTuning),
    /// Abort without the shutdown sequence; peers see the host as lost.
    Stop,
}

/// Commands from the embedding application to a peer task.
#[derive(Debug)]
pub enum PeerCommand {
    RequestRole(PlayerRole),
    ReportContact(PeerId),
    RequestDespawn,
    /// Host teardown finished. Sent by the host task to its own player.
    HostGameEnded,
    Leave,
}

/// Configuration for a host session task.
pub struct HostSessionConfig {
    pub settings: SessionSettings,
    pub table: RoleAssignmentTable,
    pub tuning: PlayerTuning,
    pub tick_interval: Duration,
    /// The player living in the host process, if any.
    pub local_peer: Option<mpsc::UnboundedSender<PeerCommand>>,
}

pub struct HostHandle {
    pub commands: mpsc::UnboundedSender<HostCommand>,
    pub events: mpsc::UnboundedReceiver<HostEvent>,
    pub task: JoinHandle<()>,
}

pub struct PeerHandle {
    pub peer_id: PeerId,
    pub commands: mpsc::UnboundedSender<PeerCommand>,
    pub events: mpsc::UnboundedReceiver<PresentationEvent>,
    pub task: JoinHandle<()>,
}

/// Spawn the host tick loop as a tokio task.
pub fn spawn_host_session(
    hub: LocalHub,
    inbound: mpsc::UnboundedReceiver<HostInbound>,
    config: HostSessionConfig,
) -> HostHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        run_host_loop(hub, inbound, cmd_rx, event_tx, config).await;
    });

    HostHandle {
        commands: cmd_tx,
        events: event_rx,
        task,
    }
}

async fn run_host_loop(
    hub: LocalHub,
    mut inbound: mpsc::UnboundedReceiver<HostInbound>,
    mut cmd_rx: mpsc::UnboundedReceiver<HostCommand>,
    event_tx: mpsc::UnboundedSender<HostEvent>,
    config: HostSessionConfig,
) {
    let mut host = HostNode::new(config.settings, config.table).with_tuning(config.tuning);
    let local_peer = config.local_peer;

    let tick_interval = if config.tick_interval < MIN_TICK_INTERVAL {
        tracing::warn!(
            tick_ms = config.tick_interval.as_millis() as u64,
            "tick interval below minimum, clamped to 1 ms"
        );
        MIN_TICK_INTERVAL
    } else {
        config.tick_interval
    };
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_tick = tokio::time::Instant::now();

    tracing::info!(
        expected = host.expected_peer_count(),
        tick_ms = tick_interval.as_millis() as u64,
        "host session started"
    );

    loop {
        let input = tokio::select! {
            _ = interval.tick() => {
                let now = tokio::time::Instant::now();
                let dt = now - last_tick;
                last_tick = now;
                HostInput::Tick(dt)
            }
            msg = inbound.recv() => {
                match msg {
                    Some(HostInbound::PeerJoined(peer_id)) => HostInput::PeerJoined(peer_id),
                    Some(HostInbound::PeerLeft(peer_id)) => HostInput::PeerLeft(peer_id),
                    Some(HostInbound::Frame { from, data }) => {
                        match decode_peer_message(&data) {
                            Ok(msg) => HostInput::Message { from, msg },
                            Err(e) => {
                                tracing::warn!(from, error = %e, "undecodable frame from peer");
                                continue;
                            },
                        }
                    },
                    None => break,
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(HostCommand::Contact(a, b)) => HostInput::Contact(a, b),
                    Some(HostCommand::EndSignal) => HostInput::EndSignal,
                    Some(HostCommand::SetTuning(tuning)) => HostInput::SetTuning(tuning),
                    Some(HostCommand::Stop) | None => {
                        tracing::info!("host session stopped");
                        break;
                    },
                }
            }
        };

        for out in host.handle(input) {
            dispatch(&hub, out, &event_tx, local_peer.as_ref());
        }

        if host.phase() == SessionPhase::Ended {
            break;
        }
    }

    hub.shutdown_host();
}

fn dispatch(
    hub: &LocalHub,
    out: Outbound,
    event_tx: &mpsc::UnboundedSender<HostEvent>,
    local_peer: Option<&mpsc::UnboundedSender<PeerCommand>>,
) {
    let result = match &out {
        Outbound::ToPeer { peer_id, msg } => hub.send_to_peer(*peer_id, msg),
        Outbound::Broadcast(msg) => hub.broadcast(msg),
        Outbound::Local(event) => {
            if *event == HostEvent::GameEnded
                && let Some(tx) = local_peer
                && tx.send(PeerCommand::HostGameEnded).is_err()
            {
                tracing::debug!("host player already gone at teardown");
            }
            let _ = event_tx.send(*event);
            Ok(())
        },
    };
    match result {
        Ok(()) => {},
        // A peer that left between the decision and the send.
        Err(TransportError::UnknownPeer(peer_id)) => {
            tracing::debug!(peer_id, "send to departed peer dropped");
        },
        Err(e) => tracing::error!(error = %e, "failed to deliver host message"),
    }
}

/// Connect `identity` to the hub and spawn its peer task.
pub fn spawn_peer_session(
    hub: LocalHub,
    identity: LocalIdentity,
    is_host: bool,
) -> Result<PeerHandle, TransportError> {
    let inbound = hub.connect(identity.peer_id)?;
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let peer_id = identity.peer_id;
    let node = if is_host {
        PeerNode::new_host_local(identity)
    } else {
        PeerNode::new(identity)
    };

    let task = tokio::spawn(async move {
        run_peer_loop(hub, node, inbound, cmd_rx, event_tx).await;
    });

    Ok(PeerHandle {
        peer_id,
        commands: cmd_tx,
        events: event_rx,
        task,
    })
}

async fn run_peer_loop(
    hub: LocalHub,
    mut node: PeerNode,
    mut inbound: mpsc::UnboundedReceiver<PeerInbound>,
    mut cmd_rx: mpsc::UnboundedReceiver<PeerCommand>,
    event_tx: mpsc::UnboundedSender<PresentationEvent>,
) {
    let peer_id = node.peer_id();

    loop {
        let effects = tokio::select! {
            msg = inbound.recv() => {
                match msg {
                    Some(PeerInbound::Frame(data)) => match decode_host_message(&data) {
                        Ok(msg) => node.handle(msg),
                        Err(e) => {
                            tracing::warn!(peer_id, error = %e, "undecodable frame from host");
                            continue;
                        },
                    },
                    Some(PeerInbound::HostLost) | None => node.host_lost(),
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(PeerCommand::RequestRole(role)) => {
                        vec![PeerEffect::Send(node.request_role(role))]
                    },
                    Some(PeerCommand::ReportContact(other)) => node
                        .report_contact(other)
                        .map(PeerEffect::Send)
                        .into_iter()
                        .collect(),
                    Some(PeerCommand::RequestDespawn) => {
                        vec![PeerEffect::Send(node.request_despawn())]
                    },
                    Some(PeerCommand::HostGameEnded) => node.host_game_ended(),
                    Some(PeerCommand::Leave) | None => {
                        tracing::info!(peer_id, "peer leaving session");
                        break;
                    },
                }
            }
        };

        for effect in effects {
            match effect {
                PeerEffect::Send(msg) => {
                    if let Err(e) = hub.send_to_host(peer_id, &msg) {
                        tracing::warn!(peer_id, error = %e, "failed to send to host");
                    }
                },
                PeerEffect::Emit(event) => {
                    let _ = event_tx.send(event);
                },
            }
        }

        if node.has_ended() {
            break;
        }
    }

    hub.disconnect(peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_tick_interval_still_runs_the_session() {
        let (hub, inbound) = LocalHub::new();
        let mut host = spawn_host_session(
            hub.clone(),
            inbound,
            HostSessionConfig {
                settings: SessionSettings {
                    expected_peer_count: 1,
                    ..SessionSettings::default()
                },
                table: RoleAssignmentTable::default(),
                tuning: PlayerTuning::default(),
                tick_interval: Duration::ZERO,
                local_peer: None,
            },
        );

        host.commands.send(HostCommand::EndSignal).unwrap();
        let mut seen = Vec::new();
        while let Some(event) = tokio::time::timeout(Duration::from_secs(2), host.events.recv())
            .await
            .expect("host kept ticking")
        {
            seen.push(event);
        }
        assert_eq!(seen.last(), Some(&HostEvent::GameEnded));
        host.task.await.unwrap();
    }
}
