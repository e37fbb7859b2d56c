//! Server-sent event fan-out for one room.
//!
//! Each subscriber owns a bounded queue. Broadcasting snapshots the current
//! senders under the lock, releases it, then `try_send`s to each one; a full
//! queue drops that message for that subscriber only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use clicktrainer_core::net::messages::StreamEvent;
use clicktrainer_core::room::Scene;

use crate::events::EventBus;

/// Default per-subscriber queue depth.
pub const SUBSCRIBER_CAPACITY: usize = 10;

/// A named message as delivered to stream subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub event: StreamEvent,
    pub data: String,
}

pub struct Broadcaster {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<OutboundEvent>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        })
    }

    /// Create a broadcaster that re-publishes every scene change on `bus` as
    /// a `sceneChange` event. The forwarding task stops when the bus is
    /// dropped, the broadcaster is dropped, or `cancel` fires.
    pub fn with_event_bus(capacity: usize, bus: &EventBus, cancel: CancellationToken) -> Arc<Self> {
        let broadcaster = Self::new(capacity);
        tokio::spawn(forward_scene_changes(
            Arc::downgrade(&broadcaster),
            bus.subscribe(),
            cancel,
        ));
        broadcaster
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, mpsc::Sender<OutboundEvent>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new bounded output queue. Dropping the returned
    /// subscription unsubscribes it.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().insert(id, tx);
        Subscription {
            id,
            rx,
            _guard: SubscriberGuard {
                id,
                broadcaster: Arc::downgrade(self),
            },
        }
    }

    /// Deregister a subscriber and close its queue. Returns false if it was
    /// already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Push `(event, data)` to every subscriber without waiting. Returns the
    /// number of subscribers that accepted it.
    pub fn broadcast_oob(&self, event: StreamEvent, data: impl Into<String>) -> usize {
        let msg = OutboundEvent {
            event,
            data: data.into(),
        };
        let senders: Vec<(u64, mpsc::Sender<OutboundEvent>)> = self
            .lock()
            .iter()
            .map(|(&id, tx)| (id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in senders {
            match tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        subscriber = id, event = %msg.event, error = %e,
                        "Skipping stream event for slow subscriber"
                    );
                },
            }
        }
        delivered
    }

    /// Serialize `payload` to JSON once and broadcast it.
    pub fn broadcast_json<T: Serialize>(&self, event: StreamEvent, payload: &T) -> usize {
        match serde_json::to_string(payload) {
            Ok(data) => self.broadcast_oob(event, data),
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Failed to encode stream event");
                0
            },
        }
    }
}

async fn forward_scene_changes(
    broadcaster: Weak<Broadcaster>,
    mut rx: broadcast::Receiver<Scene>,
    cancel: CancellationToken,
) {
    loop {
        let scene = tokio::select! {
            _ = cancel.cancelled() => break,
            res = rx.recv() => match res {
                Ok(scene) => scene,
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "Scene forwarder lagged");
                    continue;
                },
                Err(RecvError::Closed) => break,
            },
        };
        let Some(broadcaster) = broadcaster.upgrade() else {
            break;
        };
        broadcaster.broadcast_oob(StreamEvent::SceneChange, scene.as_str());
    }
}

/// Removes its subscriber from the broadcaster when dropped.
struct SubscriberGuard {
    id: u64,
    broadcaster: Weak<Broadcaster>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        if let Some(b) = self.broadcaster.upgrade() {
            b.unsubscribe(self.id);
        }
    }
}

/// One subscriber's receiving end.
pub struct Subscription {
    pub id: u64,
    rx: mpsc::Receiver<OutboundEvent>,
    _guard: SubscriberGuard,
}

impl Subscription {
    /// Next event, or `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<OutboundEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutboundEvent> {
        self.rx.try_recv().ok()
    }

    /// Turn the subscription into a stream that unsubscribes when dropped.
    pub fn into_stream(self) -> impl Stream<Item = OutboundEvent> + Send + 'static {
        let Subscription { rx, _guard, .. } = self;
        ReceiverStream::new(rx).map(move |event| {
            let _guard = &_guard;
            event
        })
    }
}
