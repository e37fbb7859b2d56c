use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::room_manager::RoomRegistry;
use crate::stats::{MemoryStats, StatsHandle, StatsStore};

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomRegistry>,
    pub stats: Option<StatsHandle>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Build the registry and, when enabled, the stats store and its click
    /// recorder. Must be called inside a tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let shutdown = CancellationToken::new();
        let stats = config.stats.enabled.then(|| {
            StatsHandle::spawn(
                Arc::new(MemoryStats::new()) as Arc<dyn StatsStore>,
                config.recorder_settings(),
                shutdown.clone(),
            )
        });
        let rooms = Arc::new(RoomRegistry::with_shutdown(
            config.room_settings(),
            stats.clone(),
            shutdown,
        ));
        Self {
            rooms,
            stats,
            config: Arc::new(config),
        }
    }

    /// Cancel every room and background task.
    pub fn shutdown(&self) {
        self.rooms.shutdown();
    }
}
