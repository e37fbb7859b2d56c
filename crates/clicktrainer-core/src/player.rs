use rand::Rng;
use serde::{Deserialize, Serialize};

/// Opaque per-device player identity, assigned by the caller.
pub type PlayerId = String;

/// Maximum display name length in characters.
pub const MAX_NAME_LEN: usize = 32;

/// A player registered in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// `#rrggbb` display color, drawn at creation.
    pub color: String,
    pub score: i32,
    pub ready: bool,
}

impl Player {
    /// Create a fresh player with a random color, zero score, not ready.
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: random_color_hex(),
            score: 0,
            ready: false,
        }
    }
}

/// Random lowercase `#rrggbb` color. Each component stays within `[4, 251]`
/// so colors never render as pure black or pure white.
pub fn random_color_hex() -> String {
    let mut rng = rand::rng();
    let r: u8 = rng.random_range(4..=251);
    let g: u8 = rng.random_range(4..=251);
    let b: u8 = rng.random_range(4..=251);
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Trim and validate a display name. Returns `None` when the name is empty,
/// too long, or contains control characters.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN || name.chars().any(char::is_control)
    {
        return None;
    }
    Some(name.to_string())
}
