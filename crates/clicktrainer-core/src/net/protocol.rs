use std::ops::RangeInclusive;

use super::messages::{ClientMessage, ServerMessage};

/// Maximum accepted inbound realtime message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024;

/// Valid reward range for a single click.
pub const POINTS_RANGE: RangeInclusive<i32> = 1..=4;

/// True if `points` is an acceptable click reward.
pub fn is_valid_points(points: i32) -> bool {
    POINTS_RANGE.contains(&points)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Empty,
    TooLarge(usize),
    Malformed(String),
    Serialize(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty message"),
            Self::TooLarge(size) => {
                write!(f, "message too large: {size} bytes (max {MAX_MESSAGE_SIZE})")
            },
            Self::Malformed(e) => write!(f, "malformed message: {e}"),
            Self::Serialize(e) => write!(f, "serialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Decode one JSON text frame from a client.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    if text.trim().is_empty() {
        return Err(ProtocolError::Empty);
    }
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Encode a server message as a JSON text frame.
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

/// Decode a server message. Used by clients and tests.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
