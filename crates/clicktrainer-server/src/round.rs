//! Countdown, round clock and recap for one round of a room.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use clicktrainer_core::net::messages::{CountdownMsg, RecapMsg, StreamEvent, TimerMsg};
use clicktrainer_core::player::Player;

use crate::room::Room;
use crate::stats::finalize_game;

const TICK: Duration = Duration::from_secs(1);

/// Run the round for a room that has just entered Combat.
pub(crate) fn spawn_round(room: &Arc<Room>) {
    let room = Arc::clone(room);
    tokio::spawn(async move {
        if run_round(&room).await.is_none() {
            tracing::info!(room = %room.code(), "Round cancelled");
        }
    });
}

/// Sleep one step, or `None` if the room was closed meanwhile.
async fn tick(cancel: &CancellationToken, step: Duration) -> Option<()> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        _ = tokio::time::sleep(step) => Some(()),
    }
}

async fn run_round(room: &Room) -> Option<()> {
    let cancel = room.cancel_token();
    let config = room.game.config().clone();

    for count in (1..=config.countdown_secs).rev() {
        room.broadcast(StreamEvent::Countdown, &CountdownMsg { count });
        tick(&cancel, TICK).await?;
    }

    room.game.start_round();
    open_game_session(room);
    room.broadcast(StreamEvent::RoundStart, &room.snapshot());
    tracing::info!(
        room = %room.code(),
        players = room.player_count(),
        secs = config.round_secs(),
        "Round started"
    );

    for time_left in (0..=config.round_secs()).rev() {
        room.game.set_time_left(time_left);
        room.broadcast(StreamEvent::Timer, &TimerMsg { time_left });
        if time_left > 0 {
            tick(&cancel, TICK).await?;
        }
    }

    if cancel.is_cancelled() {
        return None;
    }
    let game_id = room.game.current_game_id();
    let rankings = room.game.end_round();
    room.broadcast(
        StreamEvent::Recap,
        &RecapMsg {
            rankings: rankings.clone(),
        },
    );
    room.game.finish_round();
    tracing::info!(
        room = %room.code(),
        winner = rankings.first().map(|p| p.name.as_str()).unwrap_or(""),
        "Round ended"
    );

    finalize_stats(room, &game_id, &rankings).await;
    Some(())
}

fn open_game_session(room: &Room) {
    let Some(stats) = room.stats() else {
        return;
    };
    let round_ms = room.game.config().round_duration.as_millis() as u64;
    match stats.store.create_game(room.code(), room.host_id(), round_ms) {
        Ok(game_id) => room.game.set_current_game_id(game_id),
        Err(e) => tracing::warn!(room = %room.code(), error = %e, "Failed to open game session"),
    }
}

/// Runs after the recap is out. A new round may already be under way, so
/// the closed game's id is passed in rather than read back.
async fn finalize_stats(room: &Room, game_id: &str, rankings: &[Player]) {
    let Some(stats) = room.stats() else {
        return;
    };
    if game_id.is_empty() {
        return;
    }
    stats.recorder.flush().await;
    if let Err(e) = finalize_game(stats.store.as_ref(), game_id, rankings) {
        tracing::warn!(room = %room.code(), game_id, error = %e, "Failed to finalize game stats");
    }
}
