//! Ripple Core
//!
//! This crate provides a synchronous, single-threaded reactive
//! state-propagation engine. It implements:
//!
//! - Reactive cells whose reads are tracked per evaluation
//! - Derived cells with lazy, equality-gated recomputation
//! - Effects and value listeners with precise, deduplicated notification
//! - Transactions that coalesce many writes into one notification pass
//! - A guard rail that polices graph mutation during tracked reads
//!
//! The engine exposes a small read/write/subscribe/batch contract. Hosts
//! (renderers, form libraries, bindings to other runtimes) decide when to
//! call it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Cells, derived cells, effects, and transactions
//! - `graph`: The dependency graph arena and dirty-flag propagation
//! - `guard`: Guard-rail modes and diagnostics
//! - `config`: Engine configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::prelude::*;
//!
//! // Create a cell
//! let count = Cell::new(1);
//!
//! // Create a derived value
//! let doubled = DerivedCell::new({
//!     let count = count.clone();
//!     move |scope| *count.read(scope) * 2
//! });
//!
//! // Create an effect
//! let handle = subscribe({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move |scope| println!("Count: {}, Doubled: {}", count.read(scope), doubled.read(scope))
//! });
//!
//! // Update the cell
//! count.write(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//! handle.unsubscribe();
//! ```

pub mod config;
pub mod graph;
pub mod guard;
pub mod reactive;

mod error;

pub use config::Config;
pub use error::CellError;

/// The types and functions most hosts need.
pub mod prelude {
    pub use crate::error::CellError;
    pub use crate::guard::{tracked_read, untracked};
    pub use crate::reactive::{
        batch, subscribe, Cell, Cleanup, Compare, CompareOverride, DerivedCell, Readable, Scope,
        Unsubscribe,
    };
}
