//! Subscriber identity and registries.
//!
//! Every reactive node (atom, computed, effect) gets a unique `SubscriberId`
//! when created. The id is the identity key everywhere the system needs to
//! deduplicate: subscriber-set membership, pending-notification coalescing
//! inside a batch, and the once-per-flush notification guard.
//!
//! `Subscribers<T>` is the registry shared by atoms and computeds. It holds
//! callbacks keyed by id, so adding a subscriber under an id it already holds
//! replaces the entry rather than double-registering it.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::error;

use super::batch;

/// Unique identifier for a reactive node.
///
/// Uses an atomic counter to ensure uniqueness across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber callback, invoked with the cell's new value.
pub(crate) type SubscriberFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle that removes a subscription when consumed.
///
/// Dropping the handle without calling [`unsubscribe`](Self::unsubscribe)
/// leaves the subscription in place.
pub struct Subscription {
    cancel: Box<dyn FnOnce() + Send>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    /// Remove the subscription.
    pub fn unsubscribe(self) {
        (self.cancel)();
    }
}

/// Identity-keyed subscriber registry shared by atoms and computeds.
pub(crate) struct Subscribers<T> {
    entries: RwLock<IndexMap<SubscriberId, SubscriberFn<T>>>,
}

impl<T: Send + Sync + 'static> Subscribers<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Add a callback under `id`, replacing any existing entry for that id,
    /// and return a handle that removes it.
    pub(crate) fn subscribe(
        this: &Arc<Self>,
        id: SubscriberId,
        callback: SubscriberFn<T>,
    ) -> Subscription {
        this.entries.write().insert(id, callback);

        let weak: Weak<Self> = Arc::downgrade(this);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry.entries.write().shift_remove(&id);
            }
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Invoke every subscriber with `value`.
    ///
    /// The registry is snapshotted before iterating, so a callback that
    /// subscribes or unsubscribes mid-notification cannot corrupt the pass.
    /// During a batch flush each id is notified at most once; a panicking
    /// callback is logged and does not interrupt its siblings.
    pub(crate) fn notify_all(&self, value: &T) {
        let snapshot: Vec<(SubscriberId, SubscriberFn<T>)> = self
            .entries
            .read()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        for (id, callback) in snapshot {
            if !batch::should_notify(id) {
                continue;
            }

            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(value))) {
                error!(
                    subscriber = ?id,
                    "panic in subscriber: {}",
                    describe_panic(payload.as_ref()),
                );
            }
        }
    }
}

/// Best-effort rendering of a panic payload for logging.
pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
