use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::player::{PlayerKey, PlayerRole};

/// Initial roles keyed by stable player identity.
///
/// Populated before the session starts and handed to the host by value, so
/// it cannot change while a session runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleAssignmentTable {
    roles: HashMap<PlayerKey, PlayerRole>,
}

impl RoleAssignmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: PlayerKey, role: PlayerRole) -> Self {
        self.roles.insert(key, role);
        self
    }

    /// Shuffle `keys` and make the first `catcher_count` of them Catchers,
    /// everyone else a Runner.
    pub fn draw<R: Rng + ?Sized>(keys: &[PlayerKey], catcher_count: usize, rng: &mut R) -> Self {
        let mut shuffled = keys.to_vec();
        shuffled.shuffle(rng);
        let roles = shuffled
            .into_iter()
            .enumerate()
            .map(|(i, key)| {
                let role = if i < catcher_count {
                    PlayerRole::Catcher
                } else {
                    PlayerRole::Runner
                };
                (key, role)
            })
            .collect();
        Self { roles }
    }

    pub fn get(&self, key: &PlayerKey) -> Option<PlayerRole> {
        self.roles.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlayerKey, &PlayerRole)> {
        self.roles.iter()
    }
}

impl FromIterator<(PlayerKey, PlayerRole)> for RoleAssignmentTable {
    fn from_iter<I: IntoIterator<Item = (PlayerKey, PlayerRole)>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn lookup_by_stable_key() {
        let alice = PlayerKey::new_random();
        let bob = PlayerKey::new_random();
        let table = RoleAssignmentTable::new()
            .with(alice, PlayerRole::Catcher)
            .with(bob, PlayerRole::Runner);
        assert_eq!(table.get(&alice), Some(PlayerRole::Catcher));
        assert_eq!(table.get(&bob), Some(PlayerRole::Runner));
        assert_eq!(table.get(&PlayerKey::new_random()), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn draw_assigns_requested_catcher_count() {
        let keys: Vec<PlayerKey> = (0..6).map(|_| PlayerKey::new_random()).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let table = RoleAssignmentTable::draw(&keys, 2, &mut rng);

        assert_eq!(table.len(), keys.len());
        let catchers = table
            .iter()
            .filter(|(_, r)| **r == PlayerRole::Catcher)
            .count();
        let runners = table
            .iter()
            .filter(|(_, r)| **r == PlayerRole::Runner)
            .count();
        assert_eq!(catchers, 2);
        assert_eq!(runners, 4);
    }

    #[test]
    fn draw_with_more_catchers_than_players() {
        let keys: Vec<PlayerKey> = (0..2).map(|_| PlayerKey::new_random()).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let table = RoleAssignmentTable::draw(&keys, 5, &mut rng);
        assert!(table.iter().all(|(_, r)| *r == PlayerRole::Catcher));
    }

    #[test]
    fn deserializes_from_toml_table() {
        let toml_str = r#"
"6f9619ff-8b86-d011-b42d-00c04fc964ff" = "catcher"
"7c9e6679-7425-40de-944b-e07fc1f90ae7" = "runner"
"#;
        let table: RoleAssignmentTable = toml::from_str(toml_str).unwrap();
        let catcher: PlayerKey = "6f9619ff-8b86-d011-b42d-00c04fc964ff".parse().unwrap();
        assert_eq!(table.get(&catcher), Some(PlayerRole::Catcher));
        assert_eq!(table.len(), 2);
    }
}
