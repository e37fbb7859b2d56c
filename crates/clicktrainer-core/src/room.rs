use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Symbols a room code is drawn from. Excludes `0 O 1 I L`.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Fixed room code length.
pub const ROOM_CODE_LENGTH: usize = 4;

/// Generate a random room code from [`ROOM_CODE_ALPHABET`].
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Uppercase and trim user input so codes match case-insensitively.
pub fn normalize_room_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// True if `code` is exactly [`ROOM_CODE_LENGTH`] symbols from the alphabet.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}

/// Coarse phase of a room's game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scene {
    #[default]
    Lobby,
    Combat,
    Recap,
}

impl Scene {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::Combat => "combat",
            Self::Recap => "recap",
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    /// Re-entering the current scene is allowed (it only re-signals).
    pub fn can_transition_to(self, next: Scene) -> bool {
        self == next
            || matches!(
                (self, next),
                (Scene::Lobby, Scene::Combat)
                    | (Scene::Combat, Scene::Recap)
                    | (Scene::Recap, Scene::Lobby)
            )
    }
}

impl std::fmt::Display for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest round a room may be configured for.
pub const MAX_ROUND_SECS: u64 = 3600;

/// Per-game tuning injected into every room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub round_duration: Duration,
    pub initial_targets: usize,
    pub countdown_secs: u32,
    /// Delay before a killed target is replaced.
    pub respawn_delay: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_secs(60),
            initial_targets: 3,
            countdown_secs: 3,
            respawn_delay: Duration::from_millis(500),
        }
    }
}

impl GameConfig {
    /// Round length in whole seconds, as counted down by the round timer.
    pub fn round_secs(&self) -> u32 {
        u32::try_from(self.round_duration.as_secs()).unwrap_or(u32::MAX)
    }
}
