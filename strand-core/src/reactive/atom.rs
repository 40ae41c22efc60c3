//! Atom Implementation
//!
//! An Atom is the fundamental reactive primitive and the single source of
//! truth for mutable state. It holds a value and tracks which computations
//! depend on it.
//!
//! # How Atoms Work
//!
//! 1. When an atom is read within a reactive context (computed/effect), the
//!    atom registers that context's notifier as a subscriber of itself.
//!
//! 2. When the atom's value changes, its stable notify-all notifier is handed
//!    to the batch scheduler, which runs it now or defers it to the flush.
//!
//! 3. Writing a value equal to the current one is a no-op: no notification,
//!    no subscriber invocation.
//!
//! # Thread Safety
//!
//! Atoms are `Send + Sync`. The value sits behind a `parking_lot::RwLock`
//! and the subscriber registry behind its own lock. Tracking and batching
//! remain per-thread dynamic scopes.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::batch;
use super::context;
use super::subscriber::{SubscriberId, Subscribers, Subscription};

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = atom(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
///
/// // Functional update
/// count.update(|prev| prev + 1);
/// ```
pub struct Atom<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Unique identifier, used as the batch-dedup key for this atom's
    /// notifier.
    id: SubscriberId,

    /// The current value.
    value: Arc<RwLock<T>>,

    /// Callbacks to invoke with the new value on change.
    subscribers: Arc<Subscribers<T>>,

    /// Stable notify-all closure handed to the batch scheduler. One closure
    /// per atom, shared by clones, so pending notifications coalesce.
    notify_all: context::NotifyFn,
}

/// Create a writable reactive atom.
pub fn atom<T>(initial: T) -> Atom<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Atom::new(initial)
}

impl<T> Atom<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new atom with the given initial value.
    pub fn new(initial: T) -> Self {
        let value = Arc::new(RwLock::new(initial));
        let subscribers = Arc::new(Subscribers::new());

        let notify_all: context::NotifyFn = {
            let value = Arc::clone(&value);
            let subscribers = Arc::clone(&subscribers);
            Arc::new(move || {
                let current = value.read().clone();
                subscribers.notify_all(&current);
            })
        };

        Self {
            id: SubscriberId::new(),
            value,
            subscribers,
            notify_all,
        }
    }

    /// Get the atom's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called while a computed or effect is evaluating, also registers
    /// that computation as a subscriber of this atom.
    pub fn get(&self) -> T {
        if let Some(tracker) = context::active_tracker() {
            let notify = Arc::clone(&tracker.notify);
            let handle = Subscribers::subscribe(
                &self.subscribers,
                tracker.id,
                Arc::new(move |_: &T| notify()),
            );
            tracker.register(handle);
        }

        self.value.read().clone()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// A value equal to the current one is a no-op.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.value.write();
            if *guard == value {
                return;
            }
            *guard = value;
        }

        batch::schedule_notification(self.id, Arc::clone(&self.notify_all));
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(next);
    }

    /// Register a callback invoked with the new value on every change.
    ///
    /// Returns a handle that removes the subscription when consumed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Subscribers::subscribe(&self.subscribers, SubscriberId::new(), Arc::new(callback))
    }
}

impl<T> Clone for Atom<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            subscribers: Arc::clone(&self.subscribers),
            notify_all: Arc::clone(&self.notify_all),
        }
    }
}

impl<T> Debug for Atom<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .finish()
    }
}
