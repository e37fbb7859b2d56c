use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::player::random_color_hex;

/// Room-scoped target identifier, starting at 1.
pub type TargetId = u32;

/// Playfield width in pixels.
pub const GAME_WIDTH: i32 = 600;
/// Playfield height in pixels.
pub const GAME_HEIGHT: i32 = 400;
/// Smallest target edge length (inclusive).
pub const MIN_TARGET_SIZE: i32 = 50;
/// Largest target edge length (inclusive).
pub const MAX_TARGET_SIZE: i32 = 100;

/// A clickable target inside the playfield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub x: i32,
    pub y: i32,
    pub size: i32,
    pub color: String,
    pub alive: bool,
    /// Spawn time in Unix milliseconds, used for reaction-time stats.
    pub spawned_at_ms: u64,
}

impl Target {
    /// Spawn a target with a random size and a position that keeps its whole
    /// bounding box inside the playfield.
    pub fn spawn(id: TargetId, now_ms: u64) -> Self {
        let mut rng = rand::rng();
        let size = rng.random_range(MIN_TARGET_SIZE..=MAX_TARGET_SIZE);
        Self {
            id,
            x: rng.random_range(0..=GAME_WIDTH - size),
            y: rng.random_range(0..=GAME_HEIGHT - size),
            size,
            color: random_color_hex(),
            alive: true,
            spawned_at_ms: now_ms,
        }
    }

    /// True if the bounding box lies entirely inside the playfield.
    pub fn in_bounds(&self) -> bool {
        (MIN_TARGET_SIZE..=MAX_TARGET_SIZE).contains(&self.size)
            && self.x >= 0
            && self.y >= 0
            && self.x + self.size <= GAME_WIDTH
            && self.y + self.size <= GAME_HEIGHT
    }
}
