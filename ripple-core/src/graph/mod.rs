//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between cells
//! and the computations that read them.
//!
//! # Overview
//!
//! - Cell nodes represent reactive values (plain or derived cells).
//! - Emitter nodes represent computations (effects, derived-cell invalidators).
//! - An edge from cell C to emitter E means E's most recent evaluation read C.
//!
//! # Design Decisions
//!
//! 1. Cells and emitters reference each other without ownership. Both live
//!    in `slotmap` arenas and refer to each other through generational keys,
//!    so a reference is a checked handle and teardown is an explicit removal
//!    from both sides' index sets.
//!
//! 2. Edge sets are insertion-ordered (`indexmap`), which makes notification
//!    order deterministic: first subscribed, first notified.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod arena;
mod node;

pub use arena::Graph;
pub use node::{CellId, CellNode, DirtyState, EmitterId, EmitterKind, EmitterNode};
