use serde::{Deserialize, Serialize};

use crate::badges::Badge;
use crate::player::PlayerId;
use crate::target::TargetId;
use crate::time::elapsed_ms;

/// Point value of a bullseye, the highest reward tier.
pub const BULLSEYE_POINTS: i32 = 4;

/// One successful click, captured for analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub game_id: String,
    pub player_id: PlayerId,
    pub target_id: TargetId,
    pub points: i32,
    pub target_size: i32,
    pub target_x: i32,
    pub target_y: i32,
    pub spawned_at_ms: u64,
    pub clicked_at_ms: u64,
    pub reaction_ms: u64,
}

impl ClickEvent {
    /// Reaction time is derived from the two timestamps, never negative.
    pub fn reaction_between(spawned_at_ms: u64, clicked_at_ms: u64) -> u64 {
        elapsed_ms(spawned_at_ms, clicked_at_ms)
    }
}

/// Aggregated statistics for one player in one game.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerGameStats {
    pub player_id: PlayerId,
    pub player_name: String,
    pub player_color: String,
    pub game_id: String,
    pub clicks: u32,
    pub score: i32,
    pub avg_reaction_ms: f64,
    pub best_reaction_ms: u64,
    /// Clicks per second over the game's wall-clock duration.
    pub cps: f64,
    /// Percentage (0-100) of clicks that were bullseyes.
    pub bullseye_rate: f64,
    pub bullseyes: u32,
}

impl PlayerGameStats {
    /// Fill the click-derived metrics from a player's clicks in one game.
    /// `duration_secs` of zero leaves `cps` at zero.
    pub fn apply_clicks<'a>(
        &mut self,
        clicks: impl IntoIterator<Item = &'a ClickEvent>,
        duration_secs: f64,
    ) {
        let mut count = 0u32;
        let mut total_reaction = 0u64;
        let mut best: Option<u64> = None;
        let mut bullseyes = 0u32;
        for click in clicks {
            count += 1;
            total_reaction += click.reaction_ms;
            best = Some(best.map_or(click.reaction_ms, |b| b.min(click.reaction_ms)));
            if click.points == BULLSEYE_POINTS {
                bullseyes += 1;
            }
        }

        self.clicks = count;
        self.bullseyes = bullseyes;
        self.best_reaction_ms = best.unwrap_or(0);
        self.avg_reaction_ms = if count > 0 {
            total_reaction as f64 / f64::from(count)
        } else {
            0.0
        };
        self.bullseye_rate = if count > 0 {
            f64::from(bullseyes) / f64::from(count) * 100.0
        } else {
            0.0
        };
        self.cps = if duration_secs > 0.0 {
            f64::from(count) / duration_secs
        } else {
            0.0
        };
    }
}

/// Career statistics for one player.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerLifetimeStats {
    pub player_id: PlayerId,
    pub player_name: String,
    pub player_color: String,
    pub games_played: u32,
    pub total_score: i64,
    pub best_game: i32,
    pub win_count: u32,
    /// Consecutive wins counting back from the most recent finished game.
    pub win_streak: u32,
    pub badges: Vec<Badge>,
}

/// Count leading first-place finishes in `ranks`, ordered most recent first.
pub fn current_win_streak(ranks_most_recent_first: impl IntoIterator<Item = u32>) -> u32 {
    ranks_most_recent_first
        .into_iter()
        .take_while(|&rank| rank == 1)
        .count() as u32
}

/// One row of a leaderboard. `value` is milliseconds for the reaction
/// board and clicks per second for the cps board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub player_name: String,
    pub player_color: String,
    pub value: f64,
    pub rank: u32,
}

/// Leaderboard ranking dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardCategory {
    /// Total points across all games, descending.
    Score,
    /// Fastest single reaction, ascending.
    Reaction,
    /// First-place finishes, descending.
    Wins,
    /// Lifetime bullseye count, descending.
    Bullseyes,
    /// Clicks per second over all finished games, descending.
    Cps,
}

impl LeaderboardCategory {
    pub const ALL: [LeaderboardCategory; 5] = [
        Self::Score,
        Self::Reaction,
        Self::Wins,
        Self::Bullseyes,
        Self::Cps,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Reaction => "reaction",
            Self::Wins => "wins",
            Self::Bullseyes => "bullseyes",
            Self::Cps => "cps",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Whether a smaller value ranks higher.
    pub fn ascending(self) -> bool {
        matches!(self, Self::Reaction)
    }
}

/// A badge held by a player. Lifetime badges carry no game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EarnedBadge {
    #[serde(flatten)]
    pub badge: Badge,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    pub earned_at_ms: u64,
}

/// Per-game summary listing every participant by final rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameRecap {
    pub game_id: String,
    pub room_code: String,
    pub started_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    pub players: Vec<PlayerGameStats>,
}
