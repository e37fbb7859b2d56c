use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/rooms/{code}/events — the room's named event stream.
///
/// The subscription is released when the client goes away (the stream is
/// dropped) or when the room is closed.
pub async fn room_events(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    let room = state
        .rooms
        .get(&code)
        .ok_or_else(|| {
            AppError::NotFound(format!("room {} not found", code.to_ascii_uppercase()))
        })?;

    let subscription = room.broadcaster.subscribe();
    tracing::debug!(room = %room.code(), subscriber = subscription.id, "Event stream opened");

    let stream = subscription
        .into_stream()
        .map(|ev| {
            Ok(SseEvent::default()
                .event(ev.event.as_str())
                .data(ev.data))
        })
        .take_until(room.cancel_token().cancelled_owned());

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
