//! Reactive Primitives
//!
//! This module implements the core reactive system: atoms, computeds, and
//! effects, plus the batching scope that coalesces their notifications.
//!
//! # Concepts
//!
//! ## Atoms
//!
//! An [`Atom`] is a container for mutable state and the single source of
//! truth. When read within a tracking context (a computed or effect), the
//! atom automatically registers that context as a dependent. When the value
//! changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when a dependency changes, and only does work when somebody observes
//! it. Computeds compose: they subscribe and notify exactly like atoms.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that reruns whenever its
//! dependencies change. Effects synchronize reactive state with external
//! systems, such as updating a UI tree or logging.
//!
//! ## Batches
//!
//! [`batch`] opens a dynamic scope in which notifications are deferred and
//! deduplicated, flushing once when the outermost scope exits. Writes are
//! never deferred, only their notifications.
//!
//! # Implementation Notes
//!
//! The system uses thread-local tracking slots to detect dependencies: when
//! a cell is read, it checks for an active tracker and registers with it.
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.
//!
//! Tracking only covers the synchronous portion of a computation's body. A
//! read performed after handing control back (on another thread, or after an
//! await point in caller-managed async code) is not tracked, because the
//! tracking slot has already been restored by then. Use
//! [`Atom::get_untracked`] when a read is intentionally outside the graph.

mod atom;
mod batch;
mod computed;
mod context;
mod effect;
mod subscriber;

pub use atom::{atom, Atom};
pub use batch::{batch, is_batching};
pub use computed::{computed, Computed};
pub use effect::{effect, CleanupRegistrar, Effect};
pub use subscriber::{SubscriberId, Subscription};
