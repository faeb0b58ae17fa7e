//! Observer pattern for status cache notifications.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::status::CalcStatus;

/// Receives every write accepted by a status cache.
pub trait StatusSubscriber: Send + Sync {
    /// Called after `key` has been written with `status`.
    fn on_status(&self, key: &str, status: &CalcStatus);
}

/// Collection of subscribers notified on each cache write.
pub struct SubscriberSet {
    subscribers: RwLock<Vec<Arc<dyn StatusSubscriber>>>,
}

impl SubscriberSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber.
    pub fn register(&self, subscriber: Arc<dyn StatusSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Unregister all subscribers.
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Notify all subscribers.
    pub fn notify(&self, key: &str, status: &CalcStatus) {
        // Snapshot so a subscriber may register others without deadlocking.
        let subscribers = self.subscribers.read().clone();
        for subscriber in &subscribers {
            subscriber.on_status(key, status);
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for SubscriberSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::observers::NoOpSubscriber;
    use crate::request::CalculationFamily;
    use crate::status::{StatusMetadata, TargetType};

    struct CountingSubscriber {
        count: AtomicUsize,
    }

    impl StatusSubscriber for CountingSubscriber {
        fn on_status(&self, _key: &str, _status: &CalcStatus) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn status() -> CalcStatus {
        CalcStatus::computing(
            StatusMetadata::now("k", CalculationFamily::Household, TargetType::Simulation, "j"),
            "",
        )
    }

    #[test]
    fn register_and_clear() {
        let set = SubscriberSet::new();
        assert_eq!(set.count(), 0);
        set.register(Arc::new(NoOpSubscriber));
        set.register(Arc::new(NoOpSubscriber));
        assert_eq!(set.count(), 2);
        set.clear();
        assert_eq!(set.count(), 0);
    }

    #[test]
    fn notify_calls_all_subscribers() {
        let set = SubscriberSet::default();
        let a = Arc::new(CountingSubscriber {
            count: AtomicUsize::new(0),
        });
        let b = Arc::new(CountingSubscriber {
            count: AtomicUsize::new(0),
        });
        set.register(a.clone());
        set.register(b.clone());

        set.notify("k", &status());
        set.notify("k", &status());

        assert_eq!(a.count.load(Ordering::Relaxed), 2);
        assert_eq!(b.count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn notify_empty_does_not_panic() {
        SubscriberSet::new().notify("k", &status());
    }
}
