use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use clicktrainer_core::net::messages::{
    GameData, PlayerLeftMsg, ReadyMsg, ServerMessage, StreamEvent, TargetKilledMsg,
};
use clicktrainer_core::net::protocol::is_valid_points;
use clicktrainer_core::player::{Player, sanitize_name};
use clicktrainer_core::room::{GameConfig, Scene};
use clicktrainer_core::stats::ClickEvent;
use clicktrainer_core::target::TargetId;
use clicktrainer_core::time::unix_millis;

use crate::broadcaster::Broadcaster;
use crate::game::Game;
use crate::hub::Hub;
use crate::player_store::PlayerStore;
use crate::round;
use crate::stats::StatsHandle;
use crate::target_store::TargetStore;

/// Per-room sizing and timing, shared by every room of a registry.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub game: GameConfig,
    pub sse_queue_capacity: usize,
    pub ws_queue_capacity: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            sse_queue_capacity: crate::broadcaster::SUBSCRIBER_CAPACITY,
            ws_queue_capacity: crate::hub::CONNECTION_QUEUE_CAPACITY,
        }
    }
}

/// Result of a click request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Scored(Player),
    /// The target was already killed or never existed.
    AlreadyDead,
    /// Bad points, wrong scene, or unknown player. Nothing changed.
    Rejected,
}

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    InvalidName,
    /// The room was deleted while the request was in flight.
    RoomClosed,
}

impl std::fmt::Display for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => f.write_str("name must be 1-32 printable characters"),
            Self::RoomClosed => f.write_str("room is closed"),
        }
    }
}

impl std::error::Error for RegisterError {}

/// One isolated game session. Owns its game state and both fan-out paths.
pub struct Room {
    code: String,
    host_id: String,
    created_at: Instant,
    pub game: Game,
    pub broadcaster: Arc<Broadcaster>,
    pub hub: Arc<Hub>,
    cancel: CancellationToken,
    stats: Option<StatsHandle>,
    /// Held while joining and while closing an empty room, so a join can
    /// never land in a room that is being torn down.
    roster: Mutex<()>,
}

impl Room {
    pub fn new(
        code: String,
        host_id: String,
        settings: &RoomSettings,
        stats: Option<StatsHandle>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let game = Game::new(
            Arc::new(PlayerStore::new()),
            Arc::new(TargetStore::new()),
            settings.game.clone(),
        );
        let broadcaster =
            Broadcaster::with_event_bus(settings.sse_queue_capacity, game.events(), cancel.clone());
        Arc::new(Self {
            code,
            host_id,
            created_at: Instant::now(),
            game,
            broadcaster,
            hub: Arc::new(Hub::new(settings.ws_queue_capacity)),
            cancel,
            stats,
            roster: Mutex::new(()),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop every task tied to this room.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    fn lock_roster(&self) -> MutexGuard<'_, ()> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the room if nobody is in it. Returns true if it was closed.
    pub(crate) fn close_if_empty(&self) -> bool {
        let _roster = self.lock_roster();
        if self.player_count() > 0 {
            return false;
        }
        self.close();
        true
    }

    pub(crate) fn stats(&self) -> Option<&StatsHandle> {
        self.stats.as_ref()
    }

    pub fn player_count(&self) -> usize {
        self.game.players().count()
    }

    /// Snapshot for `player_id`, tagged with this room's code.
    pub fn snapshot_for(&self, player_id: &str) -> GameData {
        GameData {
            room_code: self.code.clone(),
            ..self.game.get(player_id)
        }
    }

    pub fn snapshot(&self) -> GameData {
        GameData {
            room_code: self.code.clone(),
            ..self.game.snapshot()
        }
    }

    pub(crate) fn broadcast<T: Serialize>(&self, event: StreamEvent, payload: &T) {
        self.broadcaster.broadcast_json(event, payload);
    }

    /// Add a player under a sanitized name.
    pub fn register(&self, player_id: &str, raw_name: &str) -> Result<Player, RegisterError> {
        let name = sanitize_name(raw_name).ok_or(RegisterError::InvalidName)?;
        let player = {
            let _roster = self.lock_roster();
            if self.is_closed() {
                return Err(RegisterError::RoomClosed);
            }
            self.game.players().add(player_id, &name)
        };

        if let Some(stats) = &self.stats
            && let Err(e) = stats.store.upsert_player(&player.id, &player.name, &player.color)
        {
            tracing::warn!(room = %self.code, player_id, error = %e, "Failed to store player");
        }

        if self.game.scene() == Scene::Lobby {
            self.broadcast(StreamEvent::NewPlayer, &player);
        } else {
            self.broadcast(StreamEvent::Scoreboard, &self.game.rankings());
        }
        tracing::info!(room = %self.code, player_id, name = %player.name, "Player registered");
        Ok(player)
    }

    /// Set a player's ready flag. When this makes everyone ready in the
    /// lobby, the round starts.
    pub fn set_ready(self: &Arc<Self>, player_id: &str, ready: bool) -> Option<Player> {
        let player = self.game.players().set_ready(player_id, ready)?;
        self.broadcast(
            StreamEvent::PlayerReady,
            &ReadyMsg {
                player_id: player.id.clone(),
                ready,
            },
        );
        if ready && self.game.try_begin_combat() {
            round::spawn_round(self);
        }
        Some(player)
    }

    /// Score a click on a live target.
    pub fn click(
        self: &Arc<Self>,
        player_id: &str,
        target_id: TargetId,
        points: i32,
    ) -> ClickOutcome {
        if !is_valid_points(points) {
            tracing::debug!(room = %self.code, player_id, points, "Ignoring click with invalid points");
            return ClickOutcome::Rejected;
        }
        if self.game.scene() != Scene::Combat || !self.game.players().validate_session(player_id) {
            return ClickOutcome::Rejected;
        }
        if !self.game.targets().kill(target_id) {
            tracing::debug!(room = %self.code, player_id, target_id, "Target already dead");
            return ClickOutcome::AlreadyDead;
        }
        let Some(player) = self.game.players().update_score(player_id, points) else {
            return ClickOutcome::Rejected;
        };

        self.record_click(player_id, target_id, points);
        self.broadcast(
            StreamEvent::TargetKilled,
            &TargetKilledMsg {
                target_id,
                player_id: player.id.clone(),
                points,
                score: player.score,
            },
        );
        self.broadcast(StreamEvent::Score, &player);
        self.schedule_respawn();

        ClickOutcome::Scored(player)
    }

    fn record_click(&self, player_id: &str, target_id: TargetId, points: i32) {
        let Some(stats) = &self.stats else {
            return;
        };
        let game_id = self.game.current_game_id();
        if game_id.is_empty() {
            return;
        }
        let Some(target) = self.game.targets().get(target_id) else {
            return;
        };
        let clicked_at_ms = unix_millis();
        stats.recorder.record(ClickEvent {
            game_id,
            player_id: player_id.to_string(),
            target_id,
            points,
            target_size: target.size,
            target_x: target.x,
            target_y: target.y,
            spawned_at_ms: target.spawned_at_ms,
            clicked_at_ms,
            reaction_ms: ClickEvent::reaction_between(target.spawned_at_ms, clicked_at_ms),
        });
    }

    fn schedule_respawn(self: &Arc<Self>) {
        let room = Arc::clone(self);
        let delay = self.game.config().respawn_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = room.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {},
            }
            if room.game.scene() != Scene::Combat {
                return;
            }
            let target = room.game.targets().add();
            room.broadcast(StreamEvent::NewTarget, &target);
        });
    }

    /// Relay a cursor position to everyone else on the realtime channel.
    pub fn relay_move(&self, player_id: &str, x: i32, y: i32) -> usize {
        let Some(player) = self.game.players().get(player_id) else {
            return 0;
        };
        self.hub.broadcast_except(
            player_id,
            &ServerMessage::Move {
                player_id: player.id,
                name: player.name,
                color: player.color,
                x,
                y,
            },
        )
    }

    /// Back to the lobby for another round. Only valid from Recap.
    pub fn play_again(&self) -> bool {
        if !self.game.try_reset_to_lobby() {
            return false;
        }
        self.broadcast(StreamEvent::Lobby, &self.snapshot());
        tracing::info!(room = %self.code, "Room reset to lobby");
        true
    }

    /// Remove a player and drop their realtime connection. Returns false if
    /// they were not registered.
    pub fn leave(&self, player_id: &str) -> bool {
        let removed = self.game.players().remove(player_id);
        self.hub.unregister(player_id);
        if removed {
            self.broadcast(
                StreamEvent::PlayerLeft,
                &PlayerLeftMsg {
                    player_id: player_id.to_string(),
                },
            );
            tracing::info!(room = %self.code, player_id, "Player left");
        }
        removed
    }
}
