use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub rooms: RoomInfo,
}

#[derive(Serialize)]
pub struct RoomInfo {
    pub active: usize,
    pub players: usize,
}

/// GET /health — liveness plus room and player counts.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (active, players) = state.rooms.stats();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        rooms: RoomInfo { active, players },
    })
}
