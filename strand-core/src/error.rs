//! Error types for the reactive system.
//!
//! Only one failure crosses the API boundary as an error: a computed that
//! re-enters its own evaluation. Every other failure (a panicking subscriber
//! callback, a panicking effect body or cleanup, a dropped re-entrant effect
//! rerun) is contained where it happens and surfaced via `tracing`, so one
//! failing observer never stops the rest of the reactive graph.

use thiserror::Error;

/// Errors raised by the reactive primitives.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReactiveError {
    /// A computed's evaluation read the computed itself, directly or through
    /// a cycle of other computeds.
    #[error("circular dependency detected in computed")]
    CircularDependency,
}
