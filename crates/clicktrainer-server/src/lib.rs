pub mod api;
pub mod broadcaster;
pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod health;
pub mod hub;
pub mod player_store;
pub mod room;
pub mod room_manager;
pub mod round;
pub mod sse;
pub mod state;
pub mod stats;
pub mod target_store;
pub mod ws;

use axum::Router;
use axum::routing::{delete, get, post};
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let web_root = config.web_root.clone();
    let state = AppState::new(config);

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/rooms", get(api::list_rooms).post(api::create_room))
        .route("/api/rooms/{code}", get(api::get_room))
        .route("/api/rooms/{code}/players", post(api::register_player))
        .route("/api/rooms/{code}/players/me", delete(api::leave_room))
        .route("/api/rooms/{code}/ready", post(api::set_ready))
        .route(
            "/api/rooms/{code}/targets/{id}/click",
            post(api::click_target),
        )
        .route("/api/rooms/{code}/play-again", post(api::play_again))
        .route("/api/rooms/{code}/events", get(sse::room_events))
        .route("/api/rooms/{code}/ws", get(ws::ws_handler))
        .route(
            "/api/stats/leaderboard/{category}",
            get(api::leaderboard),
        )
        .route("/api/stats/players/{id}", get(api::player_stats))
        .route("/api/stats/games/{id}", get(api::game_recap))
        .fallback_service(ServeDir::new(&web_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

/// Start the periodic stale-room sweep. Stops when the state is shut down.
pub fn spawn_background_tasks(state: &AppState) -> JoinHandle<()> {
    state
        .rooms
        .spawn_sweeper(state.config.sweep_interval(), state.config.stale_after())
}
