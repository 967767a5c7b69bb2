use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use tagnet_core::assignment::RoleAssignmentTable;
use tagnet_core::session::{
    DisconnectPolicy, HoldingArea, RoleRequestMode, SessionSettings, DEFAULT_END_ACK_TICKS,
};
use tagnet_core::tuning::PlayerTuning;

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "tagnet.toml";

/// Top-level configuration, loaded from `tagnet.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TagnetConfig {
    pub session: SessionConfig,
    pub assignment: AssignmentConfig,
    pub tuning: PlayerTuning,
    pub log: LogConfig,
    pub sim: SimConfig,
}

/// Handshake, tick and shutdown knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Peers required for quorum, host included.
    pub expected_peers: usize,
    pub handshake_timeout_ms: u64,
    pub tick_ms: u64,
    pub end_ack_ticks: u32,
    pub disconnect_policy: DisconnectPolicy,
    pub role_requests: RoleRequestMode,
    pub holding_area: HoldingArea,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expected_peers: 4,
            handshake_timeout_ms: 10_000,
            tick_ms: 50,
            end_ack_ticks: DEFAULT_END_ACK_TICKS,
            disconnect_policy: DisconnectPolicy::default(),
            role_requests: RoleRequestMode::default(),
            holding_area: HoldingArea::default(),
        }
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            expected_peer_count: self.expected_peers,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            end_ack_ticks: self.end_ack_ticks,
            disconnect_policy: self.disconnect_policy,
            role_requests: self.role_requests,
            holding_area: self.holding_area,
        }
    }
}

/// Initial role assignment. An explicit `roles` table wins; otherwise roles
/// are drawn at random with `catcher_count` Catchers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    pub catcher_count: usize,
    pub seed: Option<u64>,
    pub roles: RoleAssignmentTable,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            catcher_count: 1,
            seed: None,
            roles: RoleAssignmentTable::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Simulated session driven by the `tagnet-sim` binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Display names; the first player lives in the host process.
    pub players: Vec<String>,
    pub duration_ms: u64,
    pub contact_interval_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            players: ["Host", "Ada", "Bo", "Cy"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            duration_ms: 3_000,
            contact_interval_ms: 200,
        }
    }
}

/// A `TAGNET_*` variable that was set but could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOverride {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl SkippedOverride {
    fn new(key: &'static str, value: String, reason: impl std::fmt::Display) -> Self {
        Self {
            key,
            value,
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for SkippedOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={:?}: {}", self.key, self.value, self.reason)
    }
}

impl TagnetConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if it exists (defaults otherwise), then apply `TAGNET_*`
    /// environment overrides. Overrides that failed to parse come back
    /// alongside the config so they can be logged once tracing is up.
    pub fn load_from(path: &Path) -> Result<(Self, Vec<SkippedOverride>), ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        let skipped = config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok((config, skipped))
    }

    pub fn load() -> Result<(Self, Vec<SkippedOverride>), ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Overrides from `lookup`, which stands in for the process environment.
    /// Unparseable values leave the field untouched and are returned.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<SkippedOverride> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut skipped = Vec::new();

        if let Some(val) = var("TAGNET_EXPECTED_PEERS") {
            match val.parse::<usize>() {
                Ok(n) => self.session.expected_peers = n,
                Err(e) => skipped.push(SkippedOverride::new("TAGNET_EXPECTED_PEERS", val, e)),
            }
        }
        if let Some(val) = var("TAGNET_HANDSHAKE_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(n) => self.session.handshake_timeout_ms = n,
                Err(e) => {
                    skipped.push(SkippedOverride::new("TAGNET_HANDSHAKE_TIMEOUT_MS", val, e))
                },
            }
        }
        if let Some(val) = var("TAGNET_TICK_MS") {
            match val.parse::<u64>() {
                Ok(n) => self.session.tick_ms = n,
                Err(e) => skipped.push(SkippedOverride::new("TAGNET_TICK_MS", val, e)),
            }
        }
        if let Some(val) = var("TAGNET_ROLE_REQUESTS") {
            match val.as_str() {
                "validated" => self.session.role_requests = RoleRequestMode::Validated,
                "unvalidated" => self.session.role_requests = RoleRequestMode::Unvalidated,
                _ => skipped.push(SkippedOverride::new(
                    "TAGNET_ROLE_REQUESTS",
                    val,
                    "expected `validated` or `unvalidated`",
                )),
            }
        }
        if let Some(val) = var("TAGNET_LOG") {
            self.log.filter = val;
        }
        skipped
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if session.expected_peers == 0 {
            return Err(ConfigError::invalid(
                "session.expected_peers",
                "must be > 0",
            ));
        }
        if session.tick_ms == 0 {
            return Err(ConfigError::invalid("session.tick_ms", "must be > 0"));
        }
        if session.handshake_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "session.handshake_timeout_ms",
                "must be > 0",
            ));
        }
        if session.handshake_timeout_ms < session.tick_ms {
            return Err(ConfigError::invalid(
                "session.handshake_timeout_ms",
                format!(
                    "{} ms is shorter than one tick ({} ms)",
                    session.handshake_timeout_ms, session.tick_ms
                ),
            ));
        }
        if !self.tuning.is_valid() {
            return Err(ConfigError::invalid(
                "tuning",
                "values must be finite and non-negative",
            ));
        }
        if self.assignment.roles.is_empty()
            && self.assignment.catcher_count > session.expected_peers
        {
            return Err(ConfigError::invalid(
                "assignment.catcher_count",
                format!(
                    "{} catchers for {} expected peers",
                    self.assignment.catcher_count, session.expected_peers
                ),
            ));
        }
        if self.sim.players.is_empty() {
            return Err(ConfigError::invalid("sim.players", "need at least one player"));
        }
        if self.sim.contact_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "sim.contact_interval_ms",
                "must be > 0",
            ));
        }
        if self.sim.players.len() < session.expected_peers {
            tracing::warn!(
                players = self.sim.players.len(),
                expected = session.expected_peers,
                "fewer simulated players than expected peers; handshake will time out"
            );
        }
        Ok(())
    }
}
