use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use clicktrainer_core::target::{Target, TargetId};
use clicktrainer_core::time::unix_millis;

struct Inner {
    targets: HashMap<TargetId, Target>,
    next_id: TargetId,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            targets: HashMap::new(),
            next_id: 1,
        }
    }
}

/// Targets spawned in one room. Killed targets stay in the map with
/// `alive = false` so their ids are not handed out again until [`clear`].
///
/// [`clear`]: TargetStore::clear
#[derive(Default)]
pub struct TargetStore {
    inner: Mutex<Inner>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a live target under the next id.
    pub fn add(&self) -> Target {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let target = Target::spawn(id, unix_millis());
        inner.targets.insert(id, target.clone());
        target
    }

    pub fn get(&self, id: TargetId) -> Option<Target> {
        self.lock().targets.get(&id).cloned()
    }

    /// Mark a live target dead. Returns false if it is unknown or already
    /// dead, so a duplicate click is a detectable no-op.
    pub fn kill(&self, id: TargetId) -> bool {
        match self.lock().targets.get_mut(&id) {
            Some(target) if target.alive => {
                target.alive = false;
                true
            },
            _ => false,
        }
    }

    /// Live targets ordered by id.
    pub fn get_list(&self) -> Vec<Target> {
        let inner = self.lock();
        let mut alive: Vec<Target> = inner.targets.values().filter(|t| t.alive).cloned().collect();
        alive.sort_by_key(|t| t.id);
        alive
    }

    /// Drop every target and restart ids at 1.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.targets.clear();
        inner.next_id = 1;
    }
}
