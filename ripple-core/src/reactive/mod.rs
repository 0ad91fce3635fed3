//! Reactive Primitives
//!
//! This module implements the core reactive system: cells, derived cells,
//! and effects, together with transactions that group writes.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] is a container for mutable state. When a cell is read through
//! a [`Scope`], the evaluation that owns the scope becomes a dependent of
//! the cell. When the cell's value changes, its dependents are notified.
//!
//! ## Derived Cells
//!
//! A [`DerivedCell`] is a value computed from other cells. It is computed
//! lazily, caches its result while it is observed, and can be made writable
//! with a setter that writes back to its sources.
//!
//! ## Effects
//!
//! An effect, created with [`subscribe`], is a side-effecting computation
//! that runs whenever its dependencies change. [`Readable::subscribe`] is
//! the listener form: it calls back with each new value of one cell.
//!
//! # Implementation Notes
//!
//! Tracking is explicit. Every evaluation receives a `&Scope`, and only
//! reads made through that scope become dependencies. Reads made through
//! [`Readable::read_untracked`] are never tracked.
//!
//! Propagation is push-pull: a write pushes dirty flags through the graph,
//! and each reached effect pulls its derived dependencies up to date before
//! deciding whether it actually has to re-run.

mod batch;
mod cell;
mod compare;
mod derived;
mod effect;
mod readable;
mod runtime;
mod scope;
mod subscription;

pub use batch::batch;
pub use cell::Cell;
pub use compare::{Compare, CompareOverride};
pub use derived::{DerivedBuilder, DerivedCell};
pub use effect::subscribe;
pub use readable::Readable;
pub use runtime::{is_batching, MAX_FLUSH_PASSES};
pub use scope::Scope;
pub use subscription::{Cleanup, Unsubscribe};

pub(crate) use runtime::Runtime;
