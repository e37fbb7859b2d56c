use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use clicktrainer_core::player::{Player, PlayerId};

struct Entry {
    player: Player,
    /// Registration sequence, used to list players in join order.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    players: HashMap<PlayerId, Entry>,
    next_seq: u64,
}

/// Players registered in one room. Every operation takes the store's single
/// lock, so callers never observe a partially updated record.
#[derive(Default)]
pub struct PlayerStore {
    inner: Mutex<Inner>,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a fresh player with a new color. An existing record with the
    /// same id is replaced, losing its score and ready flag.
    pub fn add(&self, id: &str, name: &str) -> Player {
        let player = Player::new(id, name);
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.players.insert(
            id.to_string(),
            Entry {
                player: player.clone(),
                seq,
            },
        );
        player
    }

    pub fn get(&self, id: &str) -> Option<Player> {
        self.lock().players.get(id).map(|e| e.player.clone())
    }

    /// Snapshot of every player in registration order.
    pub fn get_list(&self) -> Vec<Player> {
        let inner = self.lock();
        let mut entries: Vec<&Entry> = inner.players.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.player.clone()).collect()
    }

    pub fn update_score(&self, id: &str, delta: i32) -> Option<Player> {
        let mut inner = self.lock();
        let entry = inner.players.get_mut(id)?;
        entry.player.score = entry.player.score.saturating_add(delta);
        Some(entry.player.clone())
    }

    pub fn set_ready(&self, id: &str, ready: bool) -> Option<Player> {
        let mut inner = self.lock();
        let entry = inner.players.get_mut(id)?;
        entry.player.ready = ready;
        Some(entry.player.clone())
    }

    /// False for an empty store, otherwise true iff every player is ready.
    pub fn all_ready(&self) -> bool {
        let inner = self.lock();
        !inner.players.is_empty() && inner.players.values().all(|e| e.player.ready)
    }

    pub fn validate_session(&self, id: &str) -> bool {
        self.lock().players.contains_key(id)
    }

    pub fn remove(&self, id: &str) -> bool {
        self.lock().players.remove(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.lock().players.len()
    }

    /// Zero every score and clear every ready flag. Nobody is removed.
    pub fn reset_all(&self) {
        for entry in self.lock().players.values_mut() {
            entry.player.score = 0;
            entry.player.ready = false;
        }
    }
}
