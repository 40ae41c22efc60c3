//! Strand Core
//!
//! This crate provides the core reactive runtime for the Strand UI framework.
//! It implements:
//!
//! - Reactive primitives (atoms, computeds, effects)
//! - Automatic dependency tracking
//! - Batched update scheduling with notification deduplication
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: Core reactive primitives, dependency tracking, and batching
//! - `error`: The public error type
//!
//! # Example
//!
//! ```rust,ignore
//! use strand_core::reactive::{atom, computed, effect};
//!
//! // Create an atom
//! let count = atom(0);
//!
//! // Create a derived value
//! let count2 = count.clone();
//! let doubled = computed(move || count2.get() * 2);
//!
//! // Create an effect
//! let count3 = count.clone();
//! let handle = effect(move |_| {
//!     println!("Count: {}, Doubled: {}", count3.get(), doubled.get());
//! });
//!
//! // Update the atom
//! count.set(5);
//! // Effect automatically reruns, prints: "Count: 5, Doubled: 10"
//! ```

pub mod error;
pub mod reactive;
