use tokio::sync::broadcast;

use clicktrainer_core::room::Scene;

/// Scene notifications buffered per receiver. A receiver that falls further
/// behind loses the oldest notifications and sees `Lagged`. Kept a power of
/// two since the broadcast channel rounds up to one.
pub const SCENE_EVENT_CAPACITY: usize = 16;

/// Per-room scene change notifications. Publishing never blocks.
pub struct EventBus {
    tx: broadcast::Sender<Scene>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SCENE_EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish a scene change. Returns how many receivers were notified;
    /// zero receivers is not an error.
    pub fn publish(&self, scene: Scene) -> usize {
        self.tx.send(scene).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Scene> {
        self.tx.subscribe()
    }
}
