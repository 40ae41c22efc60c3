//! Computed Implementation
//!
//! A Computed is a read-only derived cell that caches its result and
//! re-evaluates only when its dependencies change.
//!
//! # How Computeds Work
//!
//! 1. Creation never runs the closure. The first `get()` evaluates it and
//!    caches the result.
//!
//! 2. While evaluating, reads of other cells register this computed as a
//!    subscriber. Dependencies are torn down and rebuilt on every run, since
//!    conditional branches can change which cells are read.
//!
//! 3. When a dependency changes and nobody subscribes to this computed, it
//!    just marks itself dirty: unobserved computeds never do work.
//!
//! 4. When a dependency changes and subscribers exist, the computed eagerly
//!    re-evaluates and compares the old and new outputs; only an actual
//!    change propagates further.
//!
//! # Cycles
//!
//! A computed that reads itself, directly or through a cycle of other
//! computeds, is a usage error. The evaluation guard detects the re-entry
//! and reports [`ReactiveError::CircularDependency`]; `get()` panics with it,
//! `try_get()` returns it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::error;

use crate::error::ReactiveError;

use super::batch;
use super::context::{self, DependencySink, NotifyFn, Tracker};
use super::subscriber::{SubscriberId, Subscribers, Subscription};

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = atom(5);
/// let count2 = count.clone();
/// let doubled = computed(move || count2.get() * 2);
///
/// assert_eq!(doubled.get(), 10);
///
/// count.set(10);
/// assert_eq!(doubled.get(), 20);
/// ```
pub struct Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    /// Unique identifier, used for subscriber membership and batch dedup.
    id: SubscriberId,

    /// The computation.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value (`None` until first evaluated).
    value: RwLock<Option<T>>,

    /// Whether the cached value may be stale. Starts true; cleared only
    /// immediately after a successful evaluation.
    dirty: AtomicBool,

    /// Re-entrancy guard for the evaluation.
    computing: AtomicBool,

    /// Callbacks to invoke with the new output on change.
    subscribers: Arc<Subscribers<T>>,

    /// Unsubscribe handles for the dependencies of the latest run.
    dependencies: DependencySink,
}

/// Create a read-only computed value.
///
/// The closure is not run at creation; the first read evaluates it.
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(compute)
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new computed with the given computation.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ComputedInner {
                id: SubscriberId::new(),
                compute: Box::new(compute),
                value: RwLock::new(None),
                dirty: AtomicBool::new(true),
                computing: AtomicBool::new(false),
                subscribers: Arc::new(Subscribers::new()),
                dependencies: DependencySink::default(),
            }),
        }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Get the current value, evaluating if stale.
    ///
    /// Registers the active computed or effect as a subscriber, exactly like
    /// an atom read.
    ///
    /// # Panics
    ///
    /// Panics on a circular dependency; see [`try_get`](Self::try_get) for
    /// the non-panicking variant.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value, evaluating if stale.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.track();

        if !self.inner.dirty.load(Ordering::SeqCst) {
            if let Some(value) = self.inner.value.read().clone() {
                return Ok(value);
            }
        }

        self.recompute()
    }

    /// Whether the cached value may be stale.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Register a callback invoked with the new output on every change.
    ///
    /// The first subscriber of a still-dirty computed forces one evaluation,
    /// so it always observes a valid current value.
    ///
    /// # Panics
    ///
    /// Panics if the forced evaluation detects a circular dependency.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        if self.inner.subscribers.is_empty() && self.inner.dirty.load(Ordering::SeqCst) {
            if let Err(err) = self.recompute() {
                panic!("{err}");
            }
        }

        Subscribers::subscribe(
            &self.inner.subscribers,
            SubscriberId::new(),
            Arc::new(callback),
        )
    }

    /// Register the active tracker as a subscriber of this computed.
    ///
    /// A read performed by this computed's own evaluation registers nothing;
    /// the evaluation guard reports the cycle.
    fn track(&self) {
        let tracker = match context::active_tracker() {
            Some(tracker) if tracker.id != self.inner.id => tracker,
            _ => return,
        };

        let notify = Arc::clone(&tracker.notify);
        let handle = Subscribers::subscribe(
            &self.inner.subscribers,
            tracker.id,
            Arc::new(move |_: &T| notify()),
        );
        tracker.register(handle);
    }

    /// Run the computation, rebuilding dependencies from scratch.
    fn recompute(&self) -> Result<T, ReactiveError> {
        let inner = &self.inner;

        if inner.computing.swap(true, Ordering::SeqCst) {
            return Err(ReactiveError::CircularDependency);
        }
        let _computing = ResetOnDrop(&inner.computing);

        // Dependencies are re-derived every run; drop last run's handles.
        let previous = std::mem::take(&mut *inner.dependencies.lock());
        for handle in previous {
            handle.unsubscribe();
        }

        let tracker = Tracker::new(
            inner.id,
            self.change_notifier(),
            Arc::clone(&inner.dependencies),
        );
        let value = {
            let _scope = context::enter_computed(tracker);
            (inner.compute)()
        };

        *inner.value.write() = Some(value.clone());
        inner.dirty.store(false, Ordering::SeqCst);

        Ok(value)
    }

    /// The stable notifier subscribed to every dependency.
    fn change_notifier(&self) -> NotifyFn {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Computed { inner }.on_dependency_change();
            }
        })
    }

    /// React to a dependency change.
    ///
    /// With subscribers present, eagerly re-evaluate and propagate only if
    /// the output actually changed. With none, just mark dirty and let the
    /// next read pay for the evaluation.
    fn on_dependency_change(&self) {
        let inner = &self.inner;

        if inner.dirty.load(Ordering::SeqCst) || inner.computing.load(Ordering::SeqCst) {
            return;
        }

        if inner.subscribers.is_empty() {
            inner.dirty.store(true, Ordering::SeqCst);
            return;
        }

        let old = inner.value.read().clone();
        inner.dirty.store(true, Ordering::SeqCst);

        match self.recompute() {
            Ok(new) => {
                if old.as_ref() != Some(&new) {
                    batch::schedule_notification(inner.id, self.subscriber_notifier());
                }
            }
            Err(err) => {
                error!(computed = ?inner.id, "failed to re-evaluate computed: {err}");
            }
        }
    }

    /// Stable notify-all closure for this computed's own subscribers.
    fn subscriber_notifier(&self) -> NotifyFn {
        let weak: Weak<ComputedInner<T>> = Arc::downgrade(&self.inner);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let current = inner.value.read().clone();
                if let Some(current) = current {
                    inner.subscribers.notify_all(&current);
                }
            }
        })
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .field("value", &*self.inner.value.read())
            .finish()
    }
}
