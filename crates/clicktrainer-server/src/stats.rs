//! Game analytics: a synchronous [`StatsStore`] plus the batching
//! [`ClickRecorder`] that feeds it off the hot path.
//!
//! Nothing here may hold up a room. Callers log failures and carry on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use clicktrainer_core::badges::{Badge, BadgeId, evaluate_game_badges, evaluate_lifetime_badges};
use clicktrainer_core::player::{Player, PlayerId};
use clicktrainer_core::stats::{
    BULLSEYE_POINTS, ClickEvent, EarnedBadge, GameRecap, LeaderboardCategory, LeaderboardEntry,
    PlayerGameStats, PlayerLifetimeStats, current_win_streak,
};
use clicktrainer_core::time::unix_millis;

/// Leaderboard size when the caller does not ask for one.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
/// Largest leaderboard a caller may request.
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    UnknownGame(String),
    UnknownPlayer(String),
    UnknownCategory(String),
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownGame(id) => write!(f, "unknown game: {id}"),
            Self::UnknownPlayer(id) => write!(f, "unknown player: {id}"),
            Self::UnknownCategory(c) => write!(f, "unknown leaderboard category: {c}"),
        }
    }
}

impl std::error::Error for StatsError {}

/// Persistence for players, games, clicks and earned badges.
pub trait StatsStore: Send + Sync {
    fn upsert_player(&self, id: &str, name: &str, color: &str) -> Result<(), StatsError>;

    /// Open a game session and return its id.
    fn create_game(&self, room_code: &str, host_id: &str, round_ms: u64)
    -> Result<String, StatsError>;

    fn end_game(&self, game_id: &str) -> Result<(), StatsError>;

    /// Record (or overwrite) a participant's final score and rank.
    fn add_game_player(
        &self,
        game_id: &str,
        player_id: &str,
        score: i32,
        rank: u32,
    ) -> Result<(), StatsError>;

    fn record_clicks(&self, batch: &[ClickEvent]) -> Result<(), StatsError>;

    /// Record a badge. Returns false when the player already had it.
    fn award_badge(
        &self,
        player_id: &str,
        badge: BadgeId,
        game_id: Option<&str>,
    ) -> Result<bool, StatsError>;

    /// Badges in the order they were earned.
    fn player_badges(&self, player_id: &str) -> Result<Vec<EarnedBadge>, StatsError>;

    fn player_game_stats(
        &self,
        player_id: &str,
        game_id: &str,
    ) -> Result<PlayerGameStats, StatsError>;

    fn player_lifetime_stats(&self, player_id: &str) -> Result<PlayerLifetimeStats, StatsError>;

    fn leaderboard(
        &self,
        category: LeaderboardCategory,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, StatsError>;

    fn game_recap(&self, game_id: &str) -> Result<GameRecap, StatsError>;
}

struct PlayerRow {
    name: String,
    color: String,
}

struct Participant {
    player_id: PlayerId,
    score: i32,
    rank: u32,
}

struct GameRow {
    room_code: String,
    round_ms: u64,
    started_at_ms: u64,
    ended_at_ms: Option<u64>,
    /// Insertion order, breaks ties between games ending in the same ms.
    seq: u64,
    participants: Vec<Participant>,
}

impl GameRow {
    fn duration_secs(&self) -> f64 {
        let ms = match self.ended_at_ms {
            Some(end) if end > self.started_at_ms => end - self.started_at_ms,
            _ => self.round_ms,
        };
        ms as f64 / 1000.0
    }
}


#[derive(Default)]
struct Inner {
    players: HashMap<PlayerId, PlayerRow>,
    games: HashMap<String, GameRow>,
    next_game_seq: u64,
    clicks: Vec<ClickEvent>,
    badges: HashMap<PlayerId, Vec<EarnedBadge>>,
}

/// Career totals for one player across finished games.
#[derive(Default)]
struct Totals {
    games: u32,
    total_score: i64,
    best_game: i32,
    wins: u32,
    clicks: u64,
    seconds: f64,
    bullseyes: u64,
    best_reaction: Option<u64>,
}

impl Inner {
    fn finished_games_of<'a>(
        &'a self,
        player_id: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a GameRow, &'a Participant)> + 'a {
        self.games.iter().filter_map(move |(id, game)| {
            game.ended_at_ms?;
            let p = game.participants.iter().find(|p| p.player_id == player_id)?;
            Some((id.as_str(), game, p))
        })
    }

    fn totals(&self, player_id: &str) -> Totals {
        let mut t = Totals::default();
        for (game_id, game, p) in self.finished_games_of(player_id) {
            t.games += 1;
            t.total_score += i64::from(p.score);
            t.best_game = t.best_game.max(p.score);
            if p.rank == 1 {
                t.wins += 1;
            }
            t.seconds += game.duration_secs();
            t.clicks += self
                .clicks
                .iter()
                .filter(|c| c.game_id == game_id && c.player_id == player_id)
                .count() as u64;
        }
        for c in self.clicks.iter().filter(|c| c.player_id == player_id) {
            if c.points == BULLSEYE_POINTS {
                t.bullseyes += 1;
            }
            t.best_reaction = Some(t.best_reaction.map_or(c.reaction_ms, |b| b.min(c.reaction_ms)));
        }
        t
    }

    fn game_stats(&self, player_id: &str, game_id: &str) -> Result<PlayerGameStats, StatsError> {
        let game = self
            .games
            .get(game_id)
            .ok_or_else(|| StatsError::UnknownGame(game_id.to_string()))?;
        let player = self
            .players
            .get(player_id)
            .ok_or_else(|| StatsError::UnknownPlayer(player_id.to_string()))?;

        let clicks: Vec<&ClickEvent> = self
            .clicks
            .iter()
            .filter(|c| c.game_id == game_id && c.player_id == player_id)
            .collect();
        let score = game
            .participants
            .iter()
            .find(|p| p.player_id == player_id)
            .map_or_else(|| clicks.iter().map(|c| c.points).sum(), |p| p.score);

        let mut stats = PlayerGameStats {
            player_id: player_id.to_string(),
            player_name: player.name.clone(),
            player_color: player.color.clone(),
            game_id: game_id.to_string(),
            score,
            ..PlayerGameStats::default()
        };
        stats.apply_clicks(clicks, game.duration_secs());
        Ok(stats)
    }
}

/// In-process [`StatsStore`]. Everything lives for the life of the process.
#[derive(Default)]
pub struct MemoryStats {
    inner: Mutex<Inner>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatsStore for MemoryStats {
    fn upsert_player(&self, id: &str, name: &str, color: &str) -> Result<(), StatsError> {
        self.lock().players.insert(
            id.to_string(),
            PlayerRow {
                name: name.to_string(),
                color: color.to_string(),
            },
        );
        Ok(())
    }

    fn create_game(
        &self,
        room_code: &str,
        _host_id: &str,
        round_ms: u64,
    ) -> Result<String, StatsError> {
        let id = Uuid::new_v4().to_string();
        let mut inner = self.lock();
        let seq = inner.next_game_seq;
        inner.next_game_seq += 1;
        inner.games.insert(
            id.clone(),
            GameRow {
                room_code: room_code.to_string(),
                round_ms,
                started_at_ms: unix_millis(),
                ended_at_ms: None,
                seq,
                participants: Vec::new(),
            },
        );
        Ok(id)
    }

    fn end_game(&self, game_id: &str) -> Result<(), StatsError> {
        let mut inner = self.lock();
        let game = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| StatsError::UnknownGame(game_id.to_string()))?;
        game.ended_at_ms = Some(unix_millis());
        Ok(())
    }

    fn add_game_player(
        &self,
        game_id: &str,
        player_id: &str,
        score: i32,
        rank: u32,
    ) -> Result<(), StatsError> {
        let mut inner = self.lock();
        if !inner.players.contains_key(player_id) {
            return Err(StatsError::UnknownPlayer(player_id.to_string()));
        }
        let game = inner
            .games
            .get_mut(game_id)
            .ok_or_else(|| StatsError::UnknownGame(game_id.to_string()))?;
        match game.participants.iter_mut().find(|p| p.player_id == player_id) {
            Some(p) => {
                p.score = score;
                p.rank = rank;
            },
            None => game.participants.push(Participant {
                player_id: player_id.to_string(),
                score,
                rank,
            }),
        }
        Ok(())
    }

    fn record_clicks(&self, batch: &[ClickEvent]) -> Result<(), StatsError> {
        let mut inner = self.lock();
        if let Some(bad) = batch.iter().find(|c| !inner.games.contains_key(&c.game_id)) {
            return Err(StatsError::UnknownGame(bad.game_id.clone()));
        }
        inner.clicks.extend_from_slice(batch);
        Ok(())
    }

    fn award_badge(
        &self,
        player_id: &str,
        badge: BadgeId,
        game_id: Option<&str>,
    ) -> Result<bool, StatsError> {
        let mut inner = self.lock();
        if !inner.players.contains_key(player_id) {
            return Err(StatsError::UnknownPlayer(player_id.to_string()));
        }
        let earned = inner.badges.entry(player_id.to_string()).or_default();
        if earned.iter().any(|b| b.badge.id == badge) {
            return Ok(false);
        }
        earned.push(EarnedBadge {
            badge: badge.badge(),
            game_id: game_id.map(str::to_string),
            earned_at_ms: unix_millis(),
        });
        Ok(true)
    }

    fn player_badges(&self, player_id: &str) -> Result<Vec<EarnedBadge>, StatsError> {
        let inner = self.lock();
        if !inner.players.contains_key(player_id) {
            return Err(StatsError::UnknownPlayer(player_id.to_string()));
        }
        Ok(inner
            .badges
            .get(player_id)
            .cloned()
            .unwrap_or_default())
    }

    fn player_game_stats(
        &self,
        player_id: &str,
        game_id: &str,
    ) -> Result<PlayerGameStats, StatsError> {
        self.lock().game_stats(player_id, game_id)
    }

    fn player_lifetime_stats(&self, player_id: &str) -> Result<PlayerLifetimeStats, StatsError> {
        let inner = self.lock();
        let player = inner
            .players
            .get(player_id)
            .ok_or_else(|| StatsError::UnknownPlayer(player_id.to_string()))?;

        let totals = inner.totals(player_id);
        let mut finished: Vec<(u64, u64, u32)> = inner
            .finished_games_of(player_id)
            .map(|(_, g, p)| (g.ended_at_ms.unwrap_or(0), g.seq, p.rank))
            .collect();
        finished.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));

        let mut stats = PlayerLifetimeStats {
            player_id: player_id.to_string(),
            player_name: player.name.clone(),
            player_color: player.color.clone(),
            games_played: totals.games,
            total_score: totals.total_score,
            best_game: totals.best_game,
            win_count: totals.wins,
            win_streak: current_win_streak(finished.into_iter().map(|(_, _, rank)| rank)),
            badges: Vec::new(),
        };
        stats.badges = evaluate_lifetime_badges(&stats);
        Ok(stats)
    }

    fn leaderboard(
        &self,
        category: LeaderboardCategory,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, StatsError> {
        let inner = self.lock();
        let mut rows: Vec<(&str, &PlayerRow, f64)> = Vec::new();
        for (id, player) in &inner.players {
            let t = inner.totals(id);
            let value = match category {
                LeaderboardCategory::Score if t.games > 0 => t.total_score as f64,
                LeaderboardCategory::Wins if t.games > 0 => f64::from(t.wins),
                LeaderboardCategory::Cps if t.seconds > 0.0 => t.clicks as f64 / t.seconds,
                LeaderboardCategory::Bullseyes if t.bullseyes > 0 => t.bullseyes as f64,
                LeaderboardCategory::Reaction => match t.best_reaction {
                    Some(ms) => ms as f64,
                    None => continue,
                },
                _ => continue,
            };
            rows.push((id.as_str(), player, value));
        }

        rows.sort_by(|a, b| {
            let by_value = if category.ascending() {
                a.2.total_cmp(&b.2)
            } else {
                b.2.total_cmp(&a.2)
            };
            by_value.then_with(|| a.0.cmp(b.0))
        });

        Ok(rows
            .into_iter()
            .take(limit.clamp(1, MAX_LEADERBOARD_LIMIT))
            .enumerate()
            .map(|(i, (id, player, value))| LeaderboardEntry {
                player_id: id.to_string(),
                player_name: player.name.clone(),
                player_color: player.color.clone(),
                value,
                rank: i as u32 + 1,
            })
            .collect())
    }

    fn game_recap(&self, game_id: &str) -> Result<GameRecap, StatsError> {
        let inner = self.lock();
        let game = inner
            .games
            .get(game_id)
            .ok_or_else(|| StatsError::UnknownGame(game_id.to_string()))?;

        let mut ranked: Vec<&Participant> = game.participants.iter().collect();
        ranked.sort_by_key(|p| p.rank);
        let players = ranked
            .into_iter()
            .map(|p| inner.game_stats(&p.player_id, game_id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GameRecap {
            game_id: game_id.to_string(),
            room_code: game.room_code.clone(),
            started_at_ms: Some(game.started_at_ms),
            ended_at_ms: game.ended_at_ms,
            players,
        })
    }
}

/// Close a game: store every participant's rank, then evaluate and award
/// game and lifetime badges. Returns the badges newly earned per player.
pub fn finalize_game(
    store: &dyn StatsStore,
    game_id: &str,
    rankings: &[Player],
) -> Result<Vec<(PlayerId, Badge)>, StatsError> {
    store.end_game(game_id)?;
    for (i, player) in rankings.iter().enumerate() {
        store.add_game_player(game_id, &player.id, player.score, i as u32 + 1)?;
    }

    let mut newly_earned = Vec::new();
    for player in rankings {
        let game_stats = store.player_game_stats(&player.id, game_id)?;
        let lifetime = store.player_lifetime_stats(&player.id)?;
        let badges = evaluate_game_badges(&game_stats)
            .into_iter()
            .map(|b| (b, Some(game_id)))
            .chain(evaluate_lifetime_badges(&lifetime).into_iter().map(|b| (b, None)));
        for (badge, from_game) in badges {
            if store.award_badge(&player.id, badge.id, from_game)? {
                tracing::info!(player_id = %player.id, badge = %badge.id, "Badge earned");
                newly_earned.push((player.id.clone(), badge));
            }
        }
    }
    Ok(newly_earned)
}

/// Batching knobs for [`ClickRecorder`].
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            buffer: 1000,
            batch_size: 50,
            flush_interval: Duration::from_millis(500),
        }
    }
}

enum RecorderMsg {
    Click(ClickEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background task that writes clicks in batches.
#[derive(Clone)]
pub struct ClickRecorder {
    tx: mpsc::Sender<RecorderMsg>,
}

impl ClickRecorder {
    pub fn spawn(
        store: Arc<dyn StatsStore>,
        settings: RecorderSettings,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.buffer.max(1));
        let handle = tokio::spawn(run_recorder(store, settings, rx, cancel));
        (Self { tx }, handle)
    }

    /// Queue a click without waiting. A full buffer drops it.
    pub fn record(&self, click: ClickEvent) -> bool {
        match self.tx.try_send(RecorderMsg::Click(click)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping click event, recorder buffer full");
                false
            },
        }
    }

    /// Write everything queued so far and wait until it is stored.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(RecorderMsg::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run_recorder(
    store: Arc<dyn StatsStore>,
    settings: RecorderSettings,
    mut rx: mpsc::Receiver<RecorderMsg>,
    cancel: CancellationToken,
) {
    let batch_size = settings.batch_size.max(1);
    let mut batch: Vec<ClickEvent> = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(settings.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                write_batch(store.as_ref(), &mut batch);
                break;
            },
            msg = rx.recv() => match msg {
                Some(RecorderMsg::Click(click)) => {
                    batch.push(click);
                    if batch.len() >= batch_size {
                        write_batch(store.as_ref(), &mut batch);
                    }
                },
                Some(RecorderMsg::Flush(ack)) => {
                    write_batch(store.as_ref(), &mut batch);
                    let _ = ack.send(());
                },
                None => {
                    write_batch(store.as_ref(), &mut batch);
                    break;
                },
            },
            _ = ticker.tick() => write_batch(store.as_ref(), &mut batch),
        }
    }
    tracing::debug!("Click recorder stopped");
}

fn write_batch(store: &dyn StatsStore, batch: &mut Vec<ClickEvent>) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = store.record_clicks(batch) {
        tracing::warn!(count = batch.len(), error = %e, "Failed to record clicks");
    }
    batch.clear();
}

/// Stats store plus its click recorder, shared by every room.
#[derive(Clone)]
pub struct StatsHandle {
    pub store: Arc<dyn StatsStore>,
    pub recorder: ClickRecorder,
}

impl StatsHandle {
    pub fn spawn(
        store: Arc<dyn StatsStore>,
        settings: RecorderSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (recorder, _handle) = ClickRecorder::spawn(Arc::clone(&store), settings, cancel);
        Self { store, recorder }
    }
}
