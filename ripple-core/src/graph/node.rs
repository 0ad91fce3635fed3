//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph
//! arenas: one node per cell (a value source) and one node per emitter
//! (a computation that reads cells).

use indexmap::{IndexMap, IndexSet};
use slotmap::new_key_type;

new_key_type! {
    /// Generational handle to a cell's node in the dependency graph.
    ///
    /// A stale handle (one whose cell was dropped) never aliases a newer
    /// cell that happens to reuse the same slot.
    pub struct CellId;

    /// Generational handle to an emitter's node in the dependency graph.
    pub struct EmitterId;
}

/// The kind of emitter registered with the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterKind {
    /// An effect. Effects are leaves: they re-run eagerly when notified.
    Effect,

    /// The cache invalidator of a derived cell. It owns a cell node of its
    /// own, so it can be read like any other cell.
    Derived,
}

/// Dirty state of an emitter.
///
/// The ordering matters: propagation only ever raises the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    /// The emitter's last run is up-to-date.
    Clean,

    /// A derived cell it reads was invalidated. We have not yet verified
    /// whether that cell's value actually changed.
    MaybeDirty,

    /// A cell it reads definitely changed.
    Dirty,
}

/// A cell in the dependency graph.
#[derive(Debug)]
pub struct CellNode {
    /// Bumped on every effective change of the cell's value.
    pub(crate) version: u64,

    /// Emitters whose most recent evaluation read this cell.
    pub(crate) dependents: IndexSet<EmitterId>,

    /// For a derived cell, the emitter that recomputes it.
    pub(crate) owner: Option<EmitterId>,
}

impl CellNode {
    /// Create a plain source node.
    pub fn source() -> Self {
        Self {
            version: 0,
            dependents: IndexSet::new(),
            owner: None,
        }
    }

    /// Create the node backing a derived cell.
    pub fn owned_by(owner: EmitterId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::source()
        }
    }

    /// Get the current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<EmitterId> {
        &self.dependents
    }

    /// Get the derived cell's recompute emitter, if this is a derived cell.
    pub fn owner(&self) -> Option<EmitterId> {
        self.owner
    }
}

/// An emitter in the dependency graph.
#[derive(Debug)]
pub struct EmitterNode {
    /// What kind of emitter this is.
    pub(crate) kind: EmitterKind,

    /// Current dirty state.
    pub(crate) state: DirtyState,

    /// Whether the emitter is registered in its dependencies' dependent sets.
    ///
    /// Effects are always active. A derived cell's emitter is active only
    /// while something depends on the derived cell.
    pub(crate) active: bool,

    /// Cells read by the most recent evaluation, with the version observed.
    pub(crate) dependencies: IndexMap<CellId, u64>,

    /// For a derived emitter, the cell it recomputes.
    pub(crate) cell: Option<CellId>,
}

impl EmitterNode {
    /// Create a new effect node. Effects listen from the moment they exist.
    pub fn effect() -> Self {
        Self {
            kind: EmitterKind::Effect,
            state: DirtyState::Clean,
            active: true,
            dependencies: IndexMap::new(),
            cell: None,
        }
    }

    /// Create a new (inactive) derived node.
    pub fn derived() -> Self {
        Self {
            kind: EmitterKind::Derived,
            active: false,
            ..Self::effect()
        }
    }

    /// Get the node's kind.
    pub fn kind(&self) -> EmitterKind {
        self.kind
    }

    /// Get the current dirty state.
    pub fn dirty_state(&self) -> DirtyState {
        self.state
    }

    /// Check if the emitter is subscribed to its dependencies.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Get all dependencies with the versions seen by the last evaluation.
    pub fn dependencies(&self) -> &IndexMap<CellId, u64> {
        &self.dependencies
    }

    /// Raise the dirty state to at least `level`.
    ///
    /// Returns the state before the call.
    pub fn raise(&mut self, level: DirtyState) -> DirtyState {
        let previous = self.state;
        if level > previous {
            self.state = level;
        }
        previous
    }
}
