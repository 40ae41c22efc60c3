//! Batched Update Scheduling
//!
//! A batch is a dynamic scope that defers and deduplicates notification
//! delivery until the outermost scope exits. Writes inside a batch are
//! visible immediately; only the notifications are deferred.
//!
//! # How flushing works
//!
//! Each cell hands the scheduler a stable notifier keyed by the cell's id.
//! While a batch is active the notifier is parked in a pending map, so a cell
//! written ten times in one batch notifies once. When the outermost batch
//! exits, the pending map is snapshotted and drained, and each notifier runs.
//!
//! During the flush a second layer of deduplication kicks in: notifiers
//! consult [`should_notify`] per subscriber, so an effect that depends on two
//! cells both written in the same batch reruns exactly once.

use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use indexmap::IndexMap;
use tracing::error;

use super::context::NotifyFn;
use super::subscriber::{describe_panic, SubscriberId};

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: IndexMap<SubscriberId, NotifyFn>,
    notified: HashSet<SubscriberId>,
    flushing: bool,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Execute `f` in a batch, deferring notifications until it completes.
///
/// Returns `f`'s value unchanged. Nested batches flush exactly once, at the
/// outermost exit. The flush still runs when `f` panics.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    BATCH.with(|state| state.borrow_mut().depth += 1);
    let _guard = BatchGuard;
    f()
}

/// Check whether a batch is currently active on this thread.
pub fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

/// Hand a cell's stable notifier to the scheduler.
///
/// Inside a batch the notifier is parked, deduplicated by `id`; outside a
/// batch it runs immediately.
pub(crate) fn schedule_notification(id: SubscriberId, notify: NotifyFn) {
    let deferred = BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.depth > 0 {
            state.pending.insert(id, notify.clone());
            true
        } else {
            false
        }
    });

    if !deferred {
        notify();
    }
}

/// Check whether `id` should be notified, marking it as seen.
///
/// Only meaningful during a flush: the first call per flush returns true,
/// subsequent calls return false. Outside a flush, always true.
pub(crate) fn should_notify(id: SubscriberId) -> bool {
    BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if !state.flushing {
            return true;
        }
        state.notified.insert(id)
    })
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let pending = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth -= 1;
            if state.depth > 0 {
                return None;
            }
            state.notified.clear();
            state.flushing = true;
            Some(std::mem::take(&mut state.pending))
        });

        let Some(pending) = pending else { return };

        // The thread-local borrow is released before any notifier runs;
        // notifiers schedule and dedup freely while we drain.
        for (id, notify) in pending {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| notify())) {
                error!(
                    notifier = ?id,
                    "panic in batched notification: {}",
                    describe_panic(payload.as_ref()),
                );
            }
        }

        BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.flushing = false;
            state.notified.clear();
        });
    }
}
