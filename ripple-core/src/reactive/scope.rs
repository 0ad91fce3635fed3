//! Tracking Scope
//!
//! A scope records which cells were read during one evaluation: one effect
//! run, or one derived-cell recomputation. It is passed explicitly into
//! every tracked read instead of living in ambient global state.
//!
//! # Implementation
//!
//! User code only ever receives `&Scope` inside a closure that is generic
//! over the borrow's lifetime, so a scope cannot escape the evaluation that
//! produced it. While a scope is alive it also keeps its guard-rail mode
//! pushed; dropping it (normally or while unwinding) pops the mode.

use std::cell::RefCell;

use indexmap::IndexMap;

use crate::graph::CellId;
use crate::guard::{Mode, ModeGuard};

/// The per-evaluation tracking token.
pub struct Scope {
    /// Cells read so far, with the version observed at first read.
    dependencies: RefCell<IndexMap<CellId, u64>>,

    _mode: ModeGuard,
}

impl Scope {
    /// Open a scope for one evaluation running in `mode`.
    pub(crate) fn new(mode: Mode) -> Self {
        Self {
            dependencies: RefCell::new(IndexMap::new()),
            _mode: ModeGuard::enter(mode),
        }
    }

    /// Record that `cell` was read.
    ///
    /// Re-reading a cell within one evaluation keeps the first record.
    pub(crate) fn track(&self, cell: CellId, version: u64) {
        self.dependencies
            .borrow_mut()
            .entry(cell)
            .or_insert(version);
    }

    /// Close the scope, returning the cells it recorded in first-read order.
    pub(crate) fn into_dependencies(self) -> IndexMap<CellId, u64> {
        let Self {
            dependencies,
            _mode,
        } = self;
        drop(_mode);
        dependencies.into_inner()
    }

    /// Get the number of distinct cells read so far.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.borrow().len()
    }

    /// Check if `cell` was read so far.
    pub fn has_read(&self, cell: CellId) -> bool {
        self.dependencies.borrow().contains_key(&cell)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}
