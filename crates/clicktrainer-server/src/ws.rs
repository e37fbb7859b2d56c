use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use clicktrainer_core::net::messages::ClientMessage;
use clicktrainer_core::net::protocol::decode_client_message;
use clicktrainer_core::player::PlayerId;

use crate::error::AppError;
use crate::hub::{ConnectionGuard, Registration};
use crate::room::Room;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub player_id: PlayerId,
}

/// GET /api/rooms/{code}/ws?player_id= — realtime channel for a registered
/// player. Clicks and cursor moves come in; moves of other players go out.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let room = state
        .rooms
        .get(&code)
        .ok_or_else(|| {
            AppError::NotFound(format!("room {} not found", code.to_ascii_uppercase()))
        })?;
    if room.game.players().get(&query.player_id).is_none() {
        return Err(AppError::NotFound(format!(
            "player {} not in room",
            query.player_id
        )));
    }

    Ok(ws
        .max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, room, query.player_id))
        .into_response())
}

async fn handle_socket(socket: WebSocket, room: Arc<Room>, player_id: PlayerId) {
    let Registration { conn_id, rx, .. } = room.hub.register(&player_id);
    let _guard = ConnectionGuard::new(Arc::clone(&room.hub), player_id.clone(), conn_id);
    tracing::info!(room = %room.code(), player_id, conn_id, "Realtime connection opened");

    let (ws_sender, mut ws_receiver) = socket.split();
    let mut writer = spawn_writer(ws_sender, rx);
    let cancel = room.cancel_token();

    tokio::select! {
        _ = read_loop(&mut ws_receiver, &room, &player_id) => {},
        // Queue closed: replaced by a newer connection or the player left.
        _ = &mut writer => {},
        _ = cancel.cancelled() => {},
    }
    writer.abort();

    tracing::info!(room = %room.code(), player_id, conn_id, "Realtime connection closed");
}

fn spawn_writer(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Utf8Bytes>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.close().await;
    })
}

async fn read_loop(ws_receiver: &mut SplitStream<WebSocket>, room: &Arc<Room>, player_id: &str) {
    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        match decode_client_message(text.as_str()) {
            Ok(ClientMessage::Click { target_id, points }) => {
                room.click(player_id, target_id, points);
            },
            Ok(ClientMessage::Move { x, y }) => {
                room.relay_move(player_id, x, y);
            },
            Err(e) => {
                tracing::warn!(room = %room.code(), player_id, error = %e, "Rejected client message");
            },
        }
    }
}
