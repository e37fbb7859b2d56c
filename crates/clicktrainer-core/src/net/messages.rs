use serde::{Deserialize, Serialize};

use crate::player::{Player, PlayerId};
use crate::room::Scene;
use crate::target::{Target, TargetId};

/// Realtime message sent by a client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum ClientMessage {
    /// The client hit a target for `points`.
    Click {
        #[serde(rename = "id")]
        target_id: TargetId,
        #[serde(rename = "p")]
        points: i32,
    },
    /// Cursor position, relayed to the other players in the room.
    Move {
        #[serde(default)]
        x: i32,
        #[serde(default)]
        y: i32,
    },
}

/// Realtime message pushed to clients over the WebSocket.
/// Only the fields belonging to a variant are serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Another player's cursor moved.
    Move {
        #[serde(rename = "id")]
        player_id: PlayerId,
        #[serde(rename = "n")]
        name: String,
        #[serde(rename = "c")]
        color: String,
        x: i32,
        y: i32,
    },
    /// A player's connection went away.
    Leave {
        #[serde(rename = "id")]
        player_id: PlayerId,
    },
}

/// Names of the events pushed over the server-sent event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEvent {
    /// A player registered while the room was in the lobby.
    NewPlayer,
    /// A player registered mid-game; payload is the full scoreboard.
    Scoreboard,
    PlayerReady,
    PlayerLeft,
    /// Scene changed; payload is the bare scene name.
    SceneChange,
    Countdown,
    RoundStart,
    Timer,
    TargetKilled,
    /// A player's score changed; payload is the player record.
    Score,
    NewTarget,
    Recap,
    Lobby,
}

impl StreamEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewPlayer => "newPlayer",
            Self::Scoreboard => "scoreboard",
            Self::PlayerReady => "playerReady",
            Self::PlayerLeft => "playerLeft",
            Self::SceneChange => "sceneChange",
            Self::Countdown => "countdown",
            Self::RoundStart => "roundStart",
            Self::Timer => "timer",
            Self::TargetKilled => "targetKilled",
            Self::Score => "score",
            Self::NewTarget => "newTarget",
            Self::Recap => "recap",
            Self::Lobby => "lobby",
        }
    }
}

impl std::fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a room as seen by one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    pub scene: Scene,
    /// The requesting player, if registered.
    pub player: Option<Player>,
    pub players: Vec<Player>,
    pub targets: Vec<Target>,
    pub time_left: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rankings: Vec<Player>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownMsg {
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerMsg {
    pub time_left: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyMsg {
    pub player_id: PlayerId,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLeftMsg {
    pub player_id: PlayerId,
}

/// A target was destroyed and the clicker's score changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetKilledMsg {
    pub target_id: TargetId,
    pub player_id: PlayerId,
    pub points: i32,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecapMsg {
    pub rankings: Vec<Player>,
}
