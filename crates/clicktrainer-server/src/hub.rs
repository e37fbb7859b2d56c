use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;

use clicktrainer_core::net::messages::ServerMessage;
use clicktrainer_core::net::protocol::encode_server_message;
use clicktrainer_core::player::PlayerId;

/// Default outbound queue depth per connection.
pub const CONNECTION_QUEUE_CAPACITY: usize = 16;

/// Outbound half of a live connection. `Utf8Bytes` clones share one buffer,
/// so a broadcast serializes once.
pub type ConnectionSender = mpsc::Sender<Utf8Bytes>;

struct Connection {
    conn_id: u64,
    tx: ConnectionSender,
}

/// A freshly registered connection: its id and the queue its write task
/// drains.
pub struct Registration {
    pub player_id: PlayerId,
    pub conn_id: u64,
    pub rx: mpsc::Receiver<Utf8Bytes>,
}

/// Live realtime connections of one room, keyed by player id.
pub struct Hub {
    connections: Mutex<HashMap<PlayerId, Connection>>,
    next_conn_id: AtomicU64,
    capacity: usize,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PlayerId, Connection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection for `player_id`. A previous connection for the
    /// same player is replaced and its queue closed.
    pub fn register(&self, player_id: &str) -> Registration {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        let replaced = self
            .lock()
            .insert(player_id.to_string(), Connection { conn_id, tx });
        if replaced.is_some() {
            tracing::debug!(player_id, conn_id, "Replaced existing connection");
        }
        Registration {
            player_id: player_id.to_string(),
            conn_id,
            rx,
        }
    }

    /// Remove the player's connection, close its queue, and tell everyone
    /// else it left. Returns false if the player had no connection.
    pub fn unregister(&self, player_id: &str) -> bool {
        let removed = self.lock().remove(player_id);
        if removed.is_none() {
            return false;
        }
        drop(removed);
        self.announce_leave(player_id);
        true
    }

    /// Unregister only if `conn_id` is still the player's current
    /// connection, so a stale socket closing cannot evict a reconnect.
    pub fn release(&self, player_id: &str, conn_id: u64) -> bool {
        let removed = {
            let mut conns = self.lock();
            match conns.get(player_id) {
                Some(c) if c.conn_id == conn_id => conns.remove(player_id),
                _ => None,
            }
        };
        if removed.is_none() {
            return false;
        }
        drop(removed);
        self.announce_leave(player_id);
        true
    }

    fn announce_leave(&self, player_id: &str) {
        self.broadcast_except(
            player_id,
            &ServerMessage::Leave {
                player_id: player_id.to_string(),
            },
        );
    }

    /// Encode `msg` once and queue it for every connection except
    /// `sender_id`. Full queues drop the message. Returns the number of
    /// connections that accepted it.
    pub fn broadcast_except(&self, sender_id: &str, msg: &ServerMessage) -> usize {
        match encode_server_message(msg) {
            Ok(text) => self.broadcast_raw_except(sender_id, Utf8Bytes::from(text)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode realtime message");
                0
            },
        }
    }

    pub fn broadcast_raw_except(&self, sender_id: &str, data: Utf8Bytes) -> usize {
        let targets: Vec<(PlayerId, ConnectionSender)> = self
            .lock()
            .iter()
            .filter(|(id, _)| id.as_str() != sender_id)
            .map(|(id, c)| (id.clone(), c.tx.clone()))
            .collect();

        let mut delivered = 0;
        for (player_id, tx) in targets {
            match tx.try_send(data.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        player_id, error = %e,
                        "Skipping realtime message to slow connection"
                    );
                },
            }
        }
        delivered
    }

    pub fn is_connected(&self, player_id: &str) -> bool {
        self.lock().contains_key(player_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Releases a connection from its hub when dropped, on every exit path of
/// the socket task.
pub struct ConnectionGuard {
    hub: Arc<Hub>,
    player_id: PlayerId,
    conn_id: u64,
}

impl ConnectionGuard {
    pub fn new(hub: Arc<Hub>, player_id: PlayerId, conn_id: u64) -> Self {
        Self {
            hub,
            player_id,
            conn_id,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.hub.release(&self.player_id, self.conn_id);
    }
}
