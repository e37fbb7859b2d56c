//! Achievement catalog and the pure predicates that award it.
//!
//! Evaluation never mutates its input and has no side effects. Recording
//! that a badge was earned is the stats store's job, at most once per
//! (player, badge) pair.

use serde::{Deserialize, Serialize};

use crate::stats::{PlayerGameStats, PlayerLifetimeStats};

/// Bullseyes needed in one game for Sharpshooter.
pub const SHARPSHOOTER_BULLSEYES: u32 = 10;
/// Average reaction must be strictly below this for Speed Demon.
pub const SPEED_DEMON_MAX_REACTION_MS: f64 = 300.0;
/// Points needed in one game for Centurion.
pub const CENTURION_SCORE: i32 = 100;
/// Clicks per second needed for Trigger Happy.
pub const TRIGGER_HAPPY_CPS: f64 = 3.0;
/// Bullseye percentage needed for Perfectionist.
pub const PERFECTIONIST_RATE: f64 = 50.0;
/// Consecutive wins needed for Unstoppable.
pub const UNSTOPPABLE_STREAK: u32 = 3;
/// Games needed for Veteran.
pub const VETERAN_GAMES: u32 = 10;

/// Stable badge identifiers. The serialized names are persistence keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeId {
    Sharpshooter,
    SpeedDemon,
    Unstoppable,
    Centurion,
    TriggerHappy,
    Veteran,
    Perfectionist,
}

impl BadgeId {
    pub const ALL: [BadgeId; 7] = [
        Self::Sharpshooter,
        Self::SpeedDemon,
        Self::Unstoppable,
        Self::Centurion,
        Self::TriggerHappy,
        Self::Veteran,
        Self::Perfectionist,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sharpshooter => "sharpshooter",
            Self::SpeedDemon => "speed_demon",
            Self::Unstoppable => "unstoppable",
            Self::Centurion => "centurion",
            Self::TriggerHappy => "trigger_happy",
            Self::Veteran => "veteran",
            Self::Perfectionist => "perfectionist",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == s)
    }

    /// Catalog entry for this id.
    pub fn badge(self) -> Badge {
        let (name, description, icon) = match self {
            Self::Sharpshooter => ("Sharpshooter", "10+ bullseyes in a single game", "🎯"),
            Self::SpeedDemon => ("Speed Demon", "Average reaction time under 300ms", "⚡"),
            Self::Unstoppable => ("Unstoppable", "3-game win streak", "🔥"),
            Self::Centurion => ("Centurion", "100+ points in a single game", "💯"),
            Self::TriggerHappy => ("Trigger Happy", "3+ clicks per second average", "🖱️"),
            Self::Veteran => ("Veteran", "Played 10+ games", "🏅"),
            Self::Perfectionist => ("Perfectionist", "50%+ bullseye rate in a game", "✨"),
        };
        Badge {
            id: self,
            name,
            description,
            icon,
        }
    }
}

impl std::fmt::Display for BadgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog entry as shown to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub id: BadgeId,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

/// Badges earned from a single game's statistics.
pub fn evaluate_game_badges(stats: &PlayerGameStats) -> Vec<Badge> {
    let mut earned = Vec::new();

    if stats.bullseyes >= SHARPSHOOTER_BULLSEYES {
        earned.push(BadgeId::Sharpshooter.badge());
    }
    if stats.clicks > 0
        && stats.avg_reaction_ms > 0.0
        && stats.avg_reaction_ms < SPEED_DEMON_MAX_REACTION_MS
    {
        earned.push(BadgeId::SpeedDemon.badge());
    }
    if stats.score >= CENTURION_SCORE {
        earned.push(BadgeId::Centurion.badge());
    }
    if stats.cps >= TRIGGER_HAPPY_CPS {
        earned.push(BadgeId::TriggerHappy.badge());
    }
    if stats.clicks > 0 && stats.bullseye_rate >= PERFECTIONIST_RATE {
        earned.push(BadgeId::Perfectionist.badge());
    }

    earned
}

/// Badges earned from career statistics.
pub fn evaluate_lifetime_badges(stats: &PlayerLifetimeStats) -> Vec<Badge> {
    let mut earned = Vec::new();

    if stats.win_streak >= UNSTOPPABLE_STREAK {
        earned.push(BadgeId::Unstoppable.badge());
    }
    if stats.games_played >= VETERAN_GAMES {
        earned.push(BadgeId::Veteran.badge());
    }

    earned
}
