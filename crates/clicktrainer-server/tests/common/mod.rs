#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use clicktrainer_core::net::messages::{ClientMessage, ServerMessage};
use clicktrainer_core::net::protocol::decode_server_message;

use clicktrainer_server::build_app;
use clicktrainer_server::config::{GameSection, ServerConfig};
use clicktrainer_server::state::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    client: reqwest::Client,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Server with a one-second countdown and a two-second round.
    pub async fn new() -> Self {
        let config = ServerConfig {
            game: GameSection {
                round_duration_secs: 2,
                initial_targets: 3,
                countdown_secs: 1,
                respawn_delay_ms: 50,
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            client: reqwest::Client::new(),
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }

    pub fn ws_url(&self, code: &str, player_id: &str) -> String {
        format!("ws://{}/api/rooms/{code}/ws?player_id={player_id}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST /api/rooms as `host_id`, returning the room code.
    pub async fn create_room(&self, host_id: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/rooms"))
            .header("x-player-id", host_id)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["code"].as_str().unwrap().to_string()
    }

    /// Register `player_id` under `name`, returning the player record.
    pub async fn register(&self, code: &str, player_id: &str, name: &str) -> Value {
        let resp = self
            .client
            .post(self.url(&format!("/api/rooms/{code}/players")))
            .header("x-player-id", player_id)
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["player"].clone()
    }

    pub async fn ready(&self, code: &str, player_id: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/rooms/{code}/ready")))
            .header("x-player-id", player_id)
            .json(&json!({ "ready": true }))
            .send()
            .await
            .unwrap()
    }

    pub async fn click(&self, code: &str, player_id: &str, target_id: u64, points: i32) -> Value {
        let resp = self
            .client
            .post(self.url(&format!("/api/rooms/{code}/targets/{target_id}/click")))
            .header("x-player-id", player_id)
            .json(&json!({ "points": points }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    pub async fn snapshot(&self, code: &str, player_id: &str) -> Value {
        self.client
            .get(self.url(&format!("/api/rooms/{code}")))
            .header("x-player-id", player_id)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Open the room's event stream.
    pub async fn events(&self, code: &str) -> SseClient {
        let resp = self
            .client
            .get(self.url(&format!("/api/rooms/{code}/events")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        SseClient {
            response: resp,
            buf: String::new(),
        }
    }
}

/// Minimal server-sent event reader over a streaming response.
pub struct SseClient {
    response: reqwest::Response,
    buf: String,
}

impl SseClient {
    /// Next `(event, data)` pair, skipping keep-alive comments. `None` when
    /// the stream ends or nothing arrives within `timeout`.
    pub async fn next_event(&mut self, timeout: Duration) -> Option<(String, String)> {
        tokio::time::timeout(timeout, async {
            loop {
                if let Some(end) = self.buf.find("\n\n") {
                    let frame: String = self.buf.drain(..end + 2).collect();
                    if let Some(parsed) = parse_frame(&frame) {
                        return Some(parsed);
                    }
                    continue;
                }
                let chunk = self.response.chunk().await.ok()??;
                self.buf.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Read until an event named `name` arrives and return its data.
    pub async fn wait_for(&mut self, name: &str) -> String {
        loop {
            match self.next_event(Duration::from_secs(10)).await {
                Some((event, data)) if event == name => return data,
                Some(_) => continue,
                None => panic!("event stream ended before {name}"),
            }
        }
    }

    /// Everything up to and including the first `name` event.
    pub async fn collect_until(&mut self, name: &str) -> Vec<(String, String)> {
        let mut seen = Vec::new();
        loop {
            match self.next_event(Duration::from_secs(10)).await {
                Some((event, data)) => {
                    let done = event == name;
                    seen.push((event, data));
                    if done {
                        return seen;
                    }
                },
                None => panic!("event stream ended before {name}"),
            }
        }
    }
}

fn parse_frame(frame: &str) -> Option<(String, String)> {
    let mut event = None;
    let mut data = Vec::new();
    for line in frame.lines() {
        if let Some(v) = line.strip_prefix("event:") {
            event = Some(v.strip_prefix(' ').unwrap_or(v).to_string());
        } else if let Some(v) = line.strip_prefix("data:") {
            data.push(v.strip_prefix(' ').unwrap_or(v).to_string());
        }
    }
    event.map(|e| (e, data.join("\n")))
}

/// Connect a WebSocket client and give the server a moment to register it.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream
}

pub async fn ws_send(stream: &mut WsStream, msg: &ClientMessage) {
    let text = serde_json::to_string(msg).unwrap();
    stream.send(Message::text(text)).await.unwrap();
}

pub async fn ws_send_raw(stream: &mut WsStream, text: &str) {
    stream.send(Message::text(text.to_string())).await.unwrap();
}

/// Read the next ServerMessage from a WebSocket stream (5s timeout).
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    ws_try_read(stream, 5_000)
        .await
        .expect("Timed out waiting for WebSocket message")
}

/// Try to read a ServerMessage, returning None on timeout.
pub async fn ws_try_read(stream: &mut WsStream, timeout_ms: u64) -> Option<ServerMessage> {
    let deadline = Duration::from_millis(timeout_ms);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return decode_server_message(text.as_str()).unwrap();
                },
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .ok()
}
