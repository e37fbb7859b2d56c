use std::time::Duration;

use serde::Deserialize;

use clicktrainer_core::room::{GameConfig, MAX_ROUND_SECS};

use crate::room::RoomSettings;
use crate::stats::RecorderSettings;

/// Config file read from the working directory, if present.
pub const CONFIG_FILE: &str = "clicktrainer.toml";

/// Top-level server configuration, loaded from `clicktrainer.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub web_root: String,
    /// `pretty` or `json`.
    pub log_format: String,
    pub game: GameSection,
    pub rooms: RoomsConfig,
    pub limits: LimitsConfig,
    pub stats: StatsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            web_root: "web".to_string(),
            log_format: "pretty".to_string(),
            game: GameSection::default(),
            rooms: RoomsConfig::default(),
            limits: LimitsConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

/// Round tuning applied to every new room.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameSection {
    pub round_duration_secs: u64,
    pub initial_targets: usize,
    pub countdown_secs: u32,
    pub respawn_delay_ms: u64,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            round_duration_secs: 60,
            initial_targets: 3,
            countdown_secs: 3,
            respawn_delay_ms: 500,
        }
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub stale_after_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}

/// Queue depths and message caps.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub sse_queue_capacity: usize,
    pub ws_queue_capacity: usize,
    pub max_message_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            sse_queue_capacity: 10,
            ws_queue_capacity: 16,
            max_message_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enabled: bool,
    pub click_buffer: usize,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            click_buffer: 1000,
            batch_size: 50,
            flush_interval_ms: 500,
        }
    }
}

impl ServerConfig {
    /// Check every field, describing the first invalid one.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "listen_addr {:?} is not a valid socket address",
                self.listen_addr
            ));
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(format!(
                "log_format must be \"pretty\" or \"json\", got {:?}",
                self.log_format
            ));
        }

        let positive = [
            ("game.round_duration_secs", self.game.round_duration_secs),
            ("rooms.stale_after_secs", self.rooms.stale_after_secs),
            ("rooms.sweep_interval_secs", self.rooms.sweep_interval_secs),
            ("limits.sse_queue_capacity", self.limits.sse_queue_capacity as u64),
            ("limits.ws_queue_capacity", self.limits.ws_queue_capacity as u64),
            ("limits.max_message_size", self.limits.max_message_size as u64),
            ("stats.click_buffer", self.stats.click_buffer as u64),
            ("stats.batch_size", self.stats.batch_size as u64),
            ("stats.flush_interval_ms", self.stats.flush_interval_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(format!("{name} must be > 0"));
        }
        if self.game.round_duration_secs > MAX_ROUND_SECS {
            return Err(format!(
                "game.round_duration_secs must be <= {MAX_ROUND_SECS}, got {}",
                self.game.round_duration_secs
            ));
        }
        Ok(())
    }

    /// Load config from `clicktrainer.toml` if it exists, then apply env var
    /// overrides. A file that exists but does not parse is an error.
    pub fn load() -> Result<Self, String> {
        let mut config = match std::fs::read_to_string(CONFIG_FILE) {
            Ok(content) => toml::from_str::<ServerConfig>(&content)
                .map_err(|e| format!("failed to parse {CONFIG_FILE}: {e}"))?,
            Err(_) => ServerConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `CLICKTRAINER_*` overrides read through `var`. Empty or
    /// unparsable values are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(addr) = get("CLICKTRAINER_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(root) = get("CLICKTRAINER_WEB_ROOT") {
            self.web_root = root;
        }
        if let Some(format) = get("CLICKTRAINER_LOG_FORMAT") {
            self.log_format = format;
        }
        if let Some(n) = get("CLICKTRAINER_ROUND_DURATION").and_then(|v| v.parse().ok()) {
            self.game.round_duration_secs = n;
        }
        if let Some(n) = get("CLICKTRAINER_INITIAL_TARGETS").and_then(|v| v.parse().ok()) {
            self.game.initial_targets = n;
        }
        if let Some(n) = get("CLICKTRAINER_COUNTDOWN_SECS").and_then(|v| v.parse().ok()) {
            self.game.countdown_secs = n;
        }
        if let Some(n) = get("CLICKTRAINER_ROOM_TTL").and_then(|v| v.parse().ok()) {
            self.rooms.stale_after_secs = n;
        }
        if let Some(v) = get("CLICKTRAINER_STATS") {
            match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.stats.enabled = true,
                "0" | "false" | "off" | "no" => self.stats.enabled = false,
                _ => {},
            }
        }
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            round_duration: Duration::from_secs(self.game.round_duration_secs),
            initial_targets: self.game.initial_targets,
            countdown_secs: self.game.countdown_secs,
            respawn_delay: Duration::from_millis(self.game.respawn_delay_ms),
        }
    }

    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            game: self.game_config(),
            sse_queue_capacity: self.limits.sse_queue_capacity,
            ws_queue_capacity: self.limits.ws_queue_capacity,
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            buffer: self.stats.click_buffer,
            batch_size: self.stats.batch_size,
            flush_interval: Duration::from_millis(self.stats.flush_interval_ms),
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.rooms.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rooms.sweep_interval_secs)
    }
}
