//! Reactive Tracking Context
//!
//! The tracking context records which computation is currently evaluating.
//! This enables automatic dependency tracking: when a cell is read, it can
//! register the current computation as a subscriber of itself.
//!
//! # Implementation
//!
//! Two thread-local slots track the currently evaluating computed and the
//! currently evaluating effect. Entering a scope swaps a tracker into its
//! slot and saves the previous occupant; the scope guard restores it on drop,
//! so nested evaluations (a computed reading another computed, a computed
//! inside an effect body) unwind correctly even when the body panics.
//!
//! # Precedence
//!
//! Reads register with the active computed if one exists, otherwise with the
//! active effect. A computed evaluating inside an effect's body therefore
//! shadows the effect while it runs: the effect ends up depending on the
//! computed's output, not on the computed's internal cells. Once the computed
//! finishes, its scope guard restores the slot and the effect's tracking
//! resumes for the rest of its body.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::subscriber::{SubscriberId, Subscription};

/// Stable notifier for a tracker, invoked when a tracked dependency changes.
pub(crate) type NotifyFn = Arc<dyn Fn() + Send + Sync>;

/// Shared list of dependency subscriptions held by a computed or effect.
///
/// Registration pushes straight into the owner's list, so handles registered
/// before a panic stay held by the owner and remain active.
pub(crate) type DependencySink = Arc<Mutex<SmallVec<[Subscription; 4]>>>;

/// The currently evaluating computation, as seen by a cell being read.
#[derive(Clone)]
pub(crate) struct Tracker {
    pub(crate) id: SubscriberId,
    pub(crate) notify: NotifyFn,
    sink: DependencySink,
}

impl Tracker {
    pub(crate) fn new(id: SubscriberId, notify: NotifyFn, sink: DependencySink) -> Self {
        Self { id, notify, sink }
    }

    /// Hand the tracker the unsubscribe handle for a dependency it acquired.
    pub(crate) fn register(&self, handle: Subscription) {
        self.sink.lock().push(handle);
    }
}

thread_local! {
    static COMPUTED: RefCell<Option<Tracker>> = const { RefCell::new(None) };
    static EFFECT: RefCell<Option<Tracker>> = const { RefCell::new(None) };
}

/// The tracker a read should register with, if any.
///
/// The active computed takes precedence over the active effect.
pub(crate) fn active_tracker() -> Option<Tracker> {
    COMPUTED
        .with(|slot| slot.borrow().clone())
        .or_else(|| EFFECT.with(|slot| slot.borrow().clone()))
}

/// Guard that restores the previous computed tracker when dropped.
pub(crate) struct ComputedScope {
    prev: Option<Tracker>,
}

/// Install `tracker` as the active computed for the duration of the guard.
pub(crate) fn enter_computed(tracker: Tracker) -> ComputedScope {
    let prev = COMPUTED.with(|slot| slot.borrow_mut().replace(tracker));
    ComputedScope { prev }
}

impl Drop for ComputedScope {
    fn drop(&mut self) {
        COMPUTED.with(|slot| *slot.borrow_mut() = self.prev.take());
    }
}

/// Guard that restores the previous effect tracker when dropped.
pub(crate) struct EffectScope {
    prev: Option<Tracker>,
}

/// Install `tracker` as the active effect for the duration of the guard.
pub(crate) fn enter_effect(tracker: Tracker) -> EffectScope {
    let prev = EFFECT.with(|slot| slot.borrow_mut().replace(tracker));
    EffectScope { prev }
}

impl Drop for EffectScope {
    fn drop(&mut self) {
        EFFECT.with(|slot| *slot.borrow_mut() = self.prev.take());
    }
}
