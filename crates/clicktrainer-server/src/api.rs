use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use clicktrainer_core::net::messages::GameData;
use clicktrainer_core::player::{Player, PlayerId};
use clicktrainer_core::room::Scene;
use clicktrainer_core::stats::{
    EarnedBadge, GameRecap, LeaderboardCategory, LeaderboardEntry, PlayerLifetimeStats,
};
use clicktrainer_core::target::TargetId;

use crate::error::AppError;
use crate::room::{ClickOutcome, Room};
use crate::state::AppState;
use crate::stats::{DEFAULT_LEADERBOARD_LIMIT, StatsHandle};

/// Header carrying the caller's per-device player id.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Longest accepted player id.
pub const MAX_PLAYER_ID_LEN: usize = 128;

/// Player id from the request headers, if one was sent.
fn header_player_id(headers: &HeaderMap) -> Result<Option<PlayerId>, AppError> {
    let Some(value) = headers.get(PLAYER_ID_HEADER) else {
        return Ok(None);
    };
    let id = value
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("{PLAYER_ID_HEADER} is not valid ASCII")))?
        .trim();
    if id.len() > MAX_PLAYER_ID_LEN {
        return Err(AppError::BadRequest(format!(
            "{PLAYER_ID_HEADER} exceeds {MAX_PLAYER_ID_LEN} chars"
        )));
    }
    Ok((!id.is_empty()).then(|| id.to_string()))
}

fn require_player_id(headers: &HeaderMap) -> Result<PlayerId, AppError> {
    header_player_id(headers)?
        .ok_or_else(|| AppError::BadRequest(format!("missing {PLAYER_ID_HEADER} header")))
}

fn find_room(state: &AppState, code: &str) -> Result<Arc<Room>, AppError> {
    state
        .rooms
        .get(code)
        .ok_or_else(|| AppError::NotFound(format!("room {} not found", code.to_ascii_uppercase())))
}

fn stats_handle(state: &AppState) -> Result<&StatsHandle, AppError> {
    state
        .stats
        .as_ref()
        .ok_or_else(|| AppError::NotFound("stats are disabled".to_string()))
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub code: String,
    pub host_id: PlayerId,
}

/// POST /api/rooms — create a room hosted by the caller.
pub async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<CreateRoomResponse>), AppError> {
    let host_id = header_player_id(&headers)?.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let room = state.rooms.create(&host_id)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            code: room.code().to_string(),
            host_id,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct RoomSummary {
    pub code: String,
    pub scene: Scene,
    pub players: usize,
    pub created_secs_ago: u64,
}

/// GET /api/rooms
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    let rooms = state
        .rooms
        .list()
        .iter()
        .map(|room| RoomSummary {
            code: room.code().to_string(),
            scene: room.game.scene(),
            players: room.player_count(),
            created_secs_ago: room.age().as_secs(),
        })
        .collect();
    Json(rooms)
}

/// GET /api/rooms/{code} — snapshot as seen by the caller.
pub async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GameData>, AppError> {
    let room = find_room(&state, &code)?;
    let snapshot = match header_player_id(&headers)? {
        Some(player_id) => room.snapshot_for(&player_id),
        None => room.snapshot(),
    };
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub player_id: PlayerId,
    pub player: Player,
}

/// POST /api/rooms/{code}/players — join under a display name. A caller
/// without an id is assigned one.
pub async fn register_player(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let room = find_room(&state, &code)?;
    let player_id = header_player_id(&headers)?.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let player = room.register(&player_id, &body.name)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { player_id, player }),
    ))
}

/// DELETE /api/rooms/{code}/players/me
pub async fn leave_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let player_id = require_player_id(&headers)?;
    find_room(&state, &code)?;
    if !state.rooms.leave(&code, &player_id) {
        return Err(AppError::NotFound(format!("player {player_id} not in room")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReadyBody {
    pub ready: bool,
}

/// POST /api/rooms/{code}/ready
pub async fn set_ready(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ReadyBody>,
) -> Result<Json<Player>, AppError> {
    let player_id = require_player_id(&headers)?;
    let room = find_room(&state, &code)?;
    room.set_ready(&player_id, body.ready)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("player {player_id} not in room")))
}

#[derive(Debug, Deserialize)]
pub struct ClickBody {
    pub points: i32,
}

#[derive(Debug, Serialize)]
pub struct ClickResponse {
    /// `scored`, `already_dead` or `rejected`.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<Player>,
}

impl From<ClickOutcome> for ClickResponse {
    fn from(outcome: ClickOutcome) -> Self {
        match outcome {
            ClickOutcome::Scored(player) => Self {
                outcome: "scored",
                player: Some(player),
            },
            ClickOutcome::AlreadyDead => Self {
                outcome: "already_dead",
                player: None,
            },
            ClickOutcome::Rejected => Self {
                outcome: "rejected",
                player: None,
            },
        }
    }
}

/// POST /api/rooms/{code}/targets/{id}/click
pub async fn click_target(
    State(state): State<AppState>,
    Path((code, target_id)): Path<(String, TargetId)>,
    headers: HeaderMap,
    Json(body): Json<ClickBody>,
) -> Result<Json<ClickResponse>, AppError> {
    let player_id = require_player_id(&headers)?;
    let room = find_room(&state, &code)?;
    Ok(Json(room.click(&player_id, target_id, body.points).into()))
}

/// POST /api/rooms/{code}/play-again
pub async fn play_again(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<GameData>, AppError> {
    let room = find_room(&state, &code)?;
    if !room.play_again() {
        return Err(AppError::Conflict(format!(
            "room is in {}, not recap",
            room.game.scene()
        )));
    }
    Ok(Json(room.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

/// GET /api/stats/leaderboard/{category}?limit=
pub async fn leaderboard(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let stats = stats_handle(&state)?;
    let category = LeaderboardCategory::from_str_opt(&category)
        .ok_or_else(|| AppError::BadRequest(format!("unknown leaderboard {category:?}")))?;
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    Ok(Json(stats.store.leaderboard(category, limit)?))
}

#[derive(Debug, Serialize)]
pub struct PlayerStatsResponse {
    #[serde(flatten)]
    pub lifetime: PlayerLifetimeStats,
    /// Badges actually awarded, as opposed to those the totals qualify for.
    pub earned: Vec<EarnedBadge>,
}

/// GET /api/stats/players/{id}
pub async fn player_stats(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<Json<PlayerStatsResponse>, AppError> {
    let stats = stats_handle(&state)?;
    let lifetime = stats.store.player_lifetime_stats(&player_id)?;
    let earned = stats.store.player_badges(&player_id)?;
    Ok(Json(PlayerStatsResponse { lifetime, earned }))
}

/// GET /api/stats/games/{id}
pub async fn game_recap(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<GameRecap>, AppError> {
    let stats = stats_handle(&state)?;
    Ok(Json(stats.store.game_recap(&game_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::http::HeaderValue;

    fn headers(player_id: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(PLAYER_ID_HEADER, HeaderValue::from_str(player_id).unwrap());
        h
    }

    async fn room_with_player(state: &AppState, player_id: &str) -> String {
        let (_, Json(created)) = create_room(State(state.clone()), headers(player_id))
            .await
            .unwrap();
        register_player(
            State(state.clone()),
            Path(created.code.clone()),
            headers(player_id),
            Json(RegisterBody {
                name: "Alice".into(),
            }),
        )
        .await
        .unwrap();
        created.code
    }

    #[tokio::test]
    async fn create_room_uses_caller_id() {
        let state = AppState::new(ServerConfig::default());
        let (status, Json(resp)) = create_room(State(state.clone()), headers("host-1"))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(resp.host_id, "host-1");
        assert!(state.rooms.get(&resp.code).is_some());
    }

    #[tokio::test]
    async fn create_room_assigns_id_when_missing() {
        let state = AppState::new(ServerConfig::default());
        let (_, Json(resp)) = create_room(State(state), HeaderMap::new()).await.unwrap();
        assert_eq!(resp.host_id.len(), 36);
    }

    #[tokio::test]
    async fn oversized_player_id_rejected() {
        let state = AppState::new(ServerConfig::default());
        let result = create_room(State(state), headers(&"x".repeat(129))).await;
        assert!(matches!(result.unwrap_err(), AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let state = AppState::new(ServerConfig::default());
        let result = get_room(State(state), Path("ZZZZ".into()), HeaderMap::new()).await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn register_and_snapshot() {
        let state = AppState::new(ServerConfig::default());
        let code = room_with_player(&state, "p1").await;

        let Json(snapshot) = get_room(State(state), Path(code.to_lowercase()), headers("p1"))
            .await
            .unwrap();
        assert_eq!(snapshot.scene, Scene::Lobby);
        assert_eq!(snapshot.room_code, code);
        assert_eq!(snapshot.player.unwrap().name, "Alice");
        assert_eq!(snapshot.players.len(), 1);
    }

    #[tokio::test]
    async fn register_rejects_bad_name() {
        let state = AppState::new(ServerConfig::default());
        let (_, Json(created)) = create_room(State(state.clone()), HeaderMap::new())
            .await
            .unwrap();
        let result = register_player(
            State(state),
            Path(created.code),
            headers("p1"),
            Json(RegisterBody { name: "   ".into() }),
        )
        .await;
        assert!(matches!(result.unwrap_err(), AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn ready_requires_player_header() {
        let state = AppState::new(ServerConfig::default());
        let code = room_with_player(&state, "p1").await;
        let result = set_ready(
            State(state.clone()),
            Path(code.clone()),
            HeaderMap::new(),
            Json(ReadyBody { ready: true }),
        )
        .await;
        assert!(matches!(result.unwrap_err(), AppError::BadRequest(_)));

        let result = set_ready(
            State(state),
            Path(code),
            headers("ghost"),
            Json(ReadyBody { ready: true }),
        )
        .await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn click_in_lobby_is_rejected() {
        let state = AppState::new(ServerConfig::default());
        let code = room_with_player(&state, "p1").await;
        let Json(resp) = click_target(
            State(state),
            Path((code, 1)),
            headers("p1"),
            Json(ClickBody { points: 2 }),
        )
        .await
        .unwrap();
        assert_eq!(resp.outcome, "rejected");
        assert!(resp.player.is_none());
    }

    #[tokio::test]
    async fn play_again_outside_recap_conflicts() {
        let state = AppState::new(ServerConfig::default());
        let code = room_with_player(&state, "p1").await;
        let result = play_again(State(state), Path(code)).await;
        assert!(matches!(result.unwrap_err(), AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn last_leave_removes_room() {
        let state = AppState::new(ServerConfig::default());
        let code = room_with_player(&state, "p1").await;
        let status = leave_room(State(state.clone()), Path(code.clone()), headers("p1"))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.rooms.get(&code).is_none());
    }

    #[tokio::test]
    async fn list_rooms_reports_players() {
        let state = AppState::new(ServerConfig::default());
        let code = room_with_player(&state, "p1").await;
        let Json(rooms) = list_rooms(State(state)).await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].code, code);
        assert_eq!(rooms[0].players, 1);
        assert_eq!(rooms[0].scene, Scene::Lobby);
    }

    #[tokio::test]
    async fn unknown_leaderboard_is_bad_request() {
        let state = AppState::new(ServerConfig::default());
        let result = leaderboard(
            State(state),
            Path("accuracy".into()),
            Query(LeaderboardQuery { limit: None }),
        )
        .await;
        assert!(matches!(result.unwrap_err(), AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn stats_disabled_is_not_found() {
        let mut config = ServerConfig::default();
        config.stats.enabled = false;
        let state = AppState::new(config);
        let result = game_recap(State(state), Path("nope".into())).await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn registered_player_has_empty_stats() {
        let state = AppState::new(ServerConfig::default());
        room_with_player(&state, "p1").await;
        let Json(resp) = player_stats(State(state), Path("p1".into())).await.unwrap();
        assert_eq!(resp.lifetime.games_played, 0);
        assert_eq!(resp.lifetime.player_name, "Alice");
        assert!(resp.earned.is_empty());
    }
}
