//! Keyed status store shared between task writers and UI readers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::observer::{StatusSubscriber, SubscriberSet};
use crate::status::{CalcStatus, ProgressOverlay, TaskOutcome};

/// Keyed store of the latest [`CalcStatus`] per task.
///
/// `update` must apply its closure atomically with respect to other writes
/// on the same key: the executor and the coordinator write concurrently,
/// and a separate get-then-set would lose one of their updates.
pub trait StatusCache: Send + Sync {
    /// Latest record for `key`.
    fn get(&self, key: &str) -> Option<CalcStatus>;

    /// Replace the record for `key` unconditionally.
    ///
    /// This is the explicit reset a fresh job performs before writing to a
    /// key that may still hold a terminal record from an earlier run.
    fn set(&self, key: &str, status: CalcStatus);

    /// Modify the record for `key` in place. `f` returns whether it changed
    /// anything; subscribers are only notified of changes. Returns `false`
    /// when the key is absent or nothing changed.
    fn update(&self, key: &str, f: &mut dyn FnMut(&mut CalcStatus) -> bool) -> bool;

    /// Overwrite progress and message, unless the record is terminal.
    fn overlay(&self, key: &str, overlay: &ProgressOverlay) -> bool {
        self.update(key, &mut |status: &mut CalcStatus| status.apply_overlay(overlay))
    }

    /// Write a terminal outcome, unless the record is already terminal.
    fn settle(&self, key: &str, outcome: TaskOutcome) -> bool {
        let mut outcome = Some(outcome);
        self.update(key, &mut |status: &mut CalcStatus| {
            outcome.take().is_some_and(|o| status.settle(o))
        })
    }
}

/// In-process [`StatusCache`] with subscriber notification.
pub struct MemoryStatusCache {
    entries: RwLock<HashMap<String, CalcStatus>>,
    subscribers: SubscriberSet,
}

impl MemoryStatusCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            subscribers: SubscriberSet::new(),
        }
    }

    /// Register a subscriber notified after every accepted write.
    pub fn subscribe(&self, subscriber: Arc<dyn StatusSubscriber>) {
        self.subscribers.register(subscriber);
    }

    /// Drop every subscriber, closing channels they hold.
    pub fn clear_subscribers(&self) {
        self.subscribers.clear();
    }

    /// Drop the record for `key`.
    pub fn remove(&self, key: &str) -> Option<CalcStatus> {
        self.entries.write().remove(key)
    }

    /// Keys currently held, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryStatusCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCache for MemoryStatusCache {
    fn get(&self, key: &str) -> Option<CalcStatus> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, status: CalcStatus) {
        self.entries.write().insert(key.to_string(), status.clone());
        self.subscribers.notify(key, &status);
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(&mut CalcStatus) -> bool) -> bool {
        let snapshot = {
            let mut entries = self.entries.write();
            let Some(status) = entries.get_mut(key) else {
                return false;
            };
            if !f(status) {
                return false;
            }
            status.clone()
        };
        // Notify outside the lock; subscribers may read the cache.
        self.subscribers.notify(key, &snapshot);
        true
    }
}
