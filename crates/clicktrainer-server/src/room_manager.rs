use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use clicktrainer_core::room::{generate_room_code, normalize_room_code};

use crate::room::{Room, RoomSettings};
use crate::stats::StatsHandle;

/// Collisions tolerated before room creation gives up.
pub const MAX_CODE_ATTEMPTS: usize = 10;

/// Rooms older than this are removed by the sweep, occupied or not.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

/// How often the sweep runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    CodeExhausted { attempts: usize },
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CodeExhausted { attempts } => {
                write!(f, "could not generate a unique room code after {attempts} attempts")
            },
        }
    }
}

impl std::error::Error for RoomError {}

/// Every live room, keyed by code. The only way to reach a room.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    settings: RoomSettings,
    stats: Option<StatsHandle>,
    shutdown: CancellationToken,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings, stats: Option<StatsHandle>) -> Self {
        Self::with_shutdown(settings, stats, CancellationToken::new())
    }

    /// Registry whose rooms are all cancelled when `shutdown` fires.
    pub fn with_shutdown(
        settings: RoomSettings,
        stats: Option<StatsHandle>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            settings,
            stats,
            shutdown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Room>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Create a room with a fresh code for `host_id`.
    pub fn create(&self, host_id: &str) -> Result<Arc<Room>, RoomError> {
        self.create_with(host_id, generate_room_code)
    }

    fn create_with(
        &self,
        host_id: &str,
        mut next_code: impl FnMut() -> String,
    ) -> Result<Arc<Room>, RoomError> {
        let mut rooms = self.lock();
        let code = (0..MAX_CODE_ATTEMPTS)
            .map(|_| next_code())
            .find(|code| !rooms.contains_key(code))
            .ok_or(RoomError::CodeExhausted {
                attempts: MAX_CODE_ATTEMPTS,
            })?;

        let room = Room::new(
            code.clone(),
            host_id.to_string(),
            &self.settings,
            self.stats.clone(),
            self.shutdown.child_token(),
        );
        rooms.insert(code.clone(), Arc::clone(&room));
        drop(rooms);

        tracing::info!(room = %code, host_id, "Room created");
        Ok(room)
    }

    /// Look up a room. The code is matched case-insensitively.
    pub fn get(&self, code: &str) -> Option<Arc<Room>> {
        self.lock().get(&normalize_room_code(code)).cloned()
    }

    /// Remove a room and stop its tasks.
    pub fn delete(&self, code: &str) -> bool {
        let removed = self.lock().remove(&normalize_room_code(code));
        match removed {
            Some(room) => {
                room.close();
                tracing::info!(room = %room.code(), "Room deleted");
                true
            },
            None => false,
        }
    }

    pub fn list(&self) -> Vec<Arc<Room>> {
        let mut rooms: Vec<Arc<Room>> = self.lock().values().cloned().collect();
        rooms.sort_by(|a, b| a.code().cmp(b.code()));
        rooms
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove a player from a room, deleting the room once it is empty.
    /// Returns false if either the room or the player is unknown.
    pub fn leave(&self, code: &str, player_id: &str) -> bool {
        let Some(room) = self.get(code) else {
            return false;
        };
        let removed = room.leave(player_id);
        if removed {
            let mut rooms = self.lock();
            if room.close_if_empty() {
                if rooms.get(room.code()).is_some_and(|r| Arc::ptr_eq(r, &room)) {
                    rooms.remove(room.code());
                }
                drop(rooms);
                tracing::info!(room = %room.code(), "Room deleted");
            }
        }
        removed
    }

    /// Delete every room created more than `max_age` ago. Returns how many
    /// were removed.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let stale: Vec<Arc<Room>> = {
            let mut rooms = self.lock();
            let codes: Vec<String> = rooms
                .iter()
                .filter(|(_, room)| room.age() >= max_age)
                .map(|(code, _)| code.clone())
                .collect();
            codes.iter().filter_map(|c| rooms.remove(c)).collect()
        };
        for room in &stale {
            room.close();
            tracing::info!(room = %room.code(), age_secs = room.age().as_secs(), "Swept stale room");
        }
        stale.len()
    }

    /// Run [`sweep_stale`](Self::sweep_stale) every `interval` until
    /// shutdown.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = registry.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = registry.sweep_stale(max_age);
                        if removed > 0 {
                            tracing::info!(removed, remaining = registry.len(), "Room sweep");
                        }
                    },
                }
            }
        })
    }

    /// Cancel every room and background task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// (rooms, players) across the registry.
    pub fn stats(&self) -> (usize, usize) {
        let rooms = self.list();
        let players = rooms.iter().map(|r| r.player_count()).sum();
        (rooms.len(), players)
    }
}
