pub mod badges;
pub mod net;
pub mod player;
pub mod room;
pub mod stats;
pub mod target;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::player::Player;
    use crate::stats::{PlayerGameStats, PlayerLifetimeStats};

    /// Create `n` test players with ids `p1..pn` and zero scores.
    pub fn make_players(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| Player::new(format!("p{}", i + 1), format!("Player{}", i + 1)))
            .collect()
    }

    /// Single-game stats with every metric below every badge threshold.
    pub fn quiet_game_stats() -> PlayerGameStats {
        PlayerGameStats {
            player_id: "p1".to_string(),
            clicks: 5,
            score: 10,
            avg_reaction_ms: 500.0,
            cps: 1.0,
            bullseye_rate: 10.0,
            bullseyes: 1,
            ..PlayerGameStats::default()
        }
    }

    /// Lifetime stats for a brand new player.
    pub fn fresh_lifetime_stats() -> PlayerLifetimeStats {
        PlayerLifetimeStats {
            player_id: "p1".to_string(),
            ..PlayerLifetimeStats::default()
        }
    }
}
