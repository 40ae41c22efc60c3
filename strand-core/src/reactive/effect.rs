//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its closure immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect reruns synchronously (deferred
//!    and coalesced while a batch is active).
//!
//! 3. Each run first invokes the previous run's cleanup, then tears down the
//!    old dependency subscriptions, then re-tracks during execution.
//!
//! # Cleanup
//!
//! The closure receives a [`CleanupRegistrar`]; whatever it registers runs
//! before the next rerun and on dispose. Registering twice within one run
//! replaces the earlier registration. This is useful for tearing down
//! resources like event listeners or timers.
//!
//! # Failure containment
//!
//! A panicking effect body or cleanup is caught and logged; the effect stays
//! alive and eligible to rerun. A rerun arriving while the effect is already
//! mid-run is dropped with a logged error rather than queued, which breaks
//! write-inside-own-body loops.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use super::context::{self, DependencySink, NotifyFn, Tracker};
use super::subscriber::{describe_panic, SubscriberId};

/// Cleanup callback registered by an effect run.
type CleanupFn = Box<dyn FnOnce() + Send>;

/// Registrar handed to the effect closure on every run.
///
/// Only the most recent registration per run is kept.
pub struct CleanupRegistrar {
    slot: Mutex<Option<CleanupFn>>,
}

impl CleanupRegistrar {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Register a cleanup to run before the next rerun or on dispose.
    pub fn on_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.slot.lock() = Some(Box::new(cleanup));
    }

    fn take(&self) -> Option<CleanupFn> {
        self.slot.lock().take()
    }
}

/// A side-effecting computation that reruns when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = atom(0);
///
/// let count2 = count.clone();
/// let handle = effect(move |_| {
///     println!("Count is: {}", count2.get());
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// handle.dispose();
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    /// Unique identifier, used for subscriber membership and batch dedup.
    id: SubscriberId,

    /// The effect closure.
    run: Box<dyn Fn(&CleanupRegistrar) + Send + Sync>,

    /// Unsubscribe handles for the dependencies of the latest run.
    dependencies: DependencySink,

    /// Cleanup registered by the latest run, if any.
    user_cleanup: Mutex<Option<CleanupFn>>,

    /// Whether the effect has been disposed.
    disposed: AtomicBool,

    /// Re-entrancy guard for the run.
    running: AtomicBool,

    /// Number of completed runs.
    run_count: AtomicUsize,
}

/// Create a side effect that runs immediately and on dependency changes.
pub fn effect<F>(run: F) -> Effect
where
    F: Fn(&CleanupRegistrar) + Send + Sync + 'static,
{
    Effect::new(run)
}

impl Effect {
    /// Create a new effect with the given closure.
    ///
    /// The closure runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn(&CleanupRegistrar) + Send + Sync + 'static,
    {
        let effect = Self {
            inner: Arc::new(EffectInner {
                id: SubscriberId::new(),
                run: Box::new(run),
                dependencies: DependencySink::default(),
                user_cleanup: Mutex::new(None),
                disposed: AtomicBool::new(false),
                running: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
            }),
        };

        effect.execute();
        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the effect closure, re-tracking dependencies.
    fn execute(&self) {
        let inner = &self.inner;

        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }

        if inner.running.swap(true, Ordering::SeqCst) {
            error!(effect = ?inner.id, "effect is already running; dropping rerun");
            return;
        }
        let _running = ResetOnDrop(&inner.running);

        if let Some(cleanup) = inner.user_cleanup.lock().take() {
            run_cleanup(inner.id, cleanup);
        }

        let previous = std::mem::take(&mut *inner.dependencies.lock());
        for handle in previous {
            handle.unsubscribe();
        }

        let tracker = Tracker::new(
            inner.id,
            self.rerun_notifier(),
            Arc::clone(&inner.dependencies),
        );
        let registrar = CleanupRegistrar::new();
        {
            let _scope = context::enter_effect(tracker);
            // Dependencies registered before a panic stay active.
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (inner.run)(&registrar))) {
                error!(
                    effect = ?inner.id,
                    "panic in effect: {}",
                    describe_panic(payload.as_ref()),
                );
            }
        }

        *inner.user_cleanup.lock() = registrar.take();
        inner.run_count.fetch_add(1, Ordering::Relaxed);
    }

    /// The stable notifier subscribed to every dependency.
    ///
    /// Inert once the effect is disposed.
    fn rerun_notifier(&self) -> NotifyFn {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                if inner.disposed.load(Ordering::SeqCst) {
                    return;
                }
                Effect { inner }.execute();
            }
        })
    }

    /// Dispose of the effect.
    ///
    /// Idempotent. Runs the final cleanup and detaches every dependency;
    /// afterwards reruns are permanently inert.
    pub fn dispose(&self) {
        let inner = &self.inner;

        if inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(cleanup) = inner.user_cleanup.lock().take() {
            run_cleanup(inner.id, cleanup);
        }

        let previous = std::mem::take(&mut *inner.dependencies.lock());
        for handle in previous {
            handle.unsubscribe();
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn run_cleanup(id: SubscriberId, cleanup: CleanupFn) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| cleanup())) {
        error!(
            effect = ?id,
            "panic in effect cleanup: {}",
            describe_panic(payload.as_ref()),
        );
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::atom;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let _handle = effect(move |_| {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let count = atom(0);
        let observed = Arc::new(AtomicI32::new(-1));

        let count_clone = count.clone();
        let observed_clone = observed.clone();
        let handle = effect(move |_| {
            observed_clone.store(count_clone.get(), Ordering::SeqCst);
        });

        assert_eq!(observed.load(Ordering::SeqCst), 0);

        count.set(42);
        assert_eq!(observed.load(Ordering::SeqCst), 42);
        assert_eq!(handle.run_count(), 2);
    }

    #[test]
    fn cleanup_runs_before_each_rerun() {
        let count = atom(0);
        let log = Arc::new(Mutex::new(Vec::new()));

        let count_clone = count.clone();
        let log_clone = log.clone();
        let _handle = effect(move |registrar| {
            let value = count_clone.get();
            log_clone.lock().push(format!("run {value}"));

            let log_inner = log_clone.clone();
            registrar.on_cleanup(move || {
                log_inner.lock().push(format!("cleanup {value}"));
            });
        });

        count.set(1);
        count.set(2);

        assert_eq!(
            *log.lock(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1", "run 2"],
        );
    }

    #[test]
    fn last_cleanup_registration_wins() {
        let count = atom(0);
        let log = Arc::new(Mutex::new(Vec::new()));

        let count_clone = count.clone();
        let log_clone = log.clone();
        let _handle = effect(move |registrar| {
            let _ = count_clone.get();

            let log_first = log_clone.clone();
            registrar.on_cleanup(move || log_first.lock().push("first"));
            let log_second = log_clone.clone();
            registrar.on_cleanup(move || log_second.lock().push("second"));
        });

        count.set(1);
        assert_eq!(*log.lock(), vec!["second"]);
    }

    #[test]
    fn dispose_runs_final_cleanup_and_stops_reruns() {
        let count = atom(0);
        let runs = Arc::new(AtomicI32::new(0));
        let cleanups = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let runs_clone = runs.clone();
        let cleanups_clone = cleanups.clone();
        let handle = effect(move |registrar| {
            let _ = count_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);

            let cleanups_inner = cleanups_clone.clone();
            registrar.on_cleanup(move || {
                cleanups_inner.fetch_add(1, Ordering::SeqCst);
            });
        });

        handle.dispose();
        assert!(handle.is_disposed());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        // Writes to a formerly-tracked atom never reinvoke the body.
        count.set(1);
        count.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Dispose is idempotent.
        handle.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_body_leaves_effect_alive() {
        let count = atom(0);
        let runs = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let runs_clone = runs.clone();
        let _handle = effect(move |_| {
            let value = count_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
            if value == 1 {
                panic!("boom");
            }
        });

        count.set(1); // panics inside the body, caught and logged
        count.set(2); // still tracked, still reruns
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn write_inside_own_body_does_not_loop() {
        let count = atom(0);
        let runs = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let runs_clone = runs.clone();
        let _handle = effect(move |_| {
            let value = count_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
            if value < 3 {
                // The synchronous rerun this triggers is dropped by the
                // running guard.
                count_clone.set(value + 1);
            }
        });

        // Initial run writes 1; the nested rerun attempt is dropped, so the
        // effect settles after one externally observed pass.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(count.get_untracked(), 1);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let count = atom(0);
        let runs = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let runs_clone = runs.clone();
        let _handle = effect(move |_| {
            let _ = count_clone.get_untracked();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        count.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_outside_sync_window_is_not_tracked() {
        let count = atom(0);
        let runs = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let runs_clone = runs.clone();
        let _handle = effect(move |_| {
            runs_clone.fetch_add(1, Ordering::SeqCst);

            // The tracking slot is thread-local, so a plain `get` executed
            // off the effect's own thread sees no active tracker and
            // registers nothing. Reads resumed after the synchronous body
            // returns behave the same way.
            let count_inner = count_clone.clone();
            std::thread::spawn(move || {
                let _ = count_inner.get();
            })
            .join()
            .unwrap();
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);

        count.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
