use serde::{Deserialize, Serialize};

/// Host-tuned movement parameters, replicated to every peer.
///
/// The core never simulates movement; it only owns and replicates these
/// values so every client's controller reads the same numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    pub walking_speed: f32,
    pub running_speed: f32,
    pub jump_speed: f32,
    pub gravity: f32,
    /// Total stamina pool; also caps available sprint time.
    pub max_stamina: f32,
    pub sprint_drain_rate: f32,
    pub sprint_refill_rate: f32,
    /// Stamina lost per second while sprinting.
    pub stamina_penalty_rate: f32,
    pub stamina_regeneration_rate: f32,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            walking_speed: 7.5,
            running_speed: 11.5,
            jump_speed: 8.0,
            gravity: 20.0,
            max_stamina: 5.0,
            sprint_drain_rate: 1.0,
            sprint_refill_rate: 0.5,
            stamina_penalty_rate: 0.2,
            stamina_regeneration_rate: 0.1,
        }
    }
}

impl PlayerTuning {
    fn fields(&self) -> [f32; 9] {
        [
            self.walking_speed,
            self.running_speed,
            self.jump_speed,
            self.gravity,
            self.max_stamina,
            self.sprint_drain_rate,
            self.sprint_refill_rate,
            self.stamina_penalty_rate,
            self.stamina_regeneration_rate,
        ]
    }

    /// All values finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.fields().iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}
