//! Cell Implementation
//!
//! A cell is the fundamental reactive primitive. It holds a value behind an
//! `Rc` and records itself as a dependency of every evaluation that reads it.
//!
//! # How Cells Work
//!
//! 1. Reading a cell through a [`Scope`] records the cell, together with its
//!    current version, in that scope.
//!
//! 2. Writing a cell runs its comparator once against the current value. An
//!    equal candidate is dropped: the cell keeps its old `Rc` and nobody is
//!    notified.
//!
//! 3. A changed cell bumps its version and is queued in the open transaction
//!    (or flushed right away when there is none).
//!
//! # Memory Layout
//!
//! Each cell consists of:
//! - A node id in the runtime's graph (8 bytes)
//! - The value, stored behind `Rc` so reads never clone `T`
//! - The comparator, shared by every handle and every fork that inherits it

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use tracing::trace;

use super::compare::Compare;
use super::readable::Readable;
use super::runtime::Runtime;
use super::scope::Scope;
use crate::graph::CellId;
use crate::guard::{self, GuardedOperation, Outcome};

/// A writable reactive cell holding a value of type `T`.
///
/// Handles are cheap to clone and all clones refer to the same cell. The
/// cell is released from the graph when its last handle is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let count = Cell::new(0);
///
/// // Read the value
/// assert_eq!(*count.read_untracked(), 0);
///
/// // Replace the value (notifies dependents)
/// count.write(5);
/// ```
pub struct Cell<T: 'static> {
    inner: Rc<CellInner<T>>,
}

struct CellInner<T: 'static> {
    /// Node in the dependency graph.
    id: CellId,

    /// The current value.
    value: RefCell<Rc<T>>,

    /// Decides whether a written candidate counts as a change.
    compare: Compare<T>,
}

impl<T: 'static> Drop for CellInner<T> {
    fn drop(&mut self) {
        let _ = Runtime::try_with(|rt| rt.release_cell(self.id));
    }
}

impl<T: 'static> Cell<T> {
    /// Create a cell compared by reference.
    ///
    /// Every write of a fresh value counts as a change, even one equal to
    /// the current value. For `PartialEq` payloads that should notify only
    /// on a different value, use
    /// `Cell::with_compare(initial, Compare::structural())`.
    pub fn new(initial: T) -> Self {
        Self::with_compare(initial, Compare::reference())
    }

    /// Create a cell gated by `compare`.
    ///
    /// The comparator is not called for the initial value.
    pub fn with_compare(initial: T, compare: Compare<T>) -> Self {
        Self::from_rc(Rc::new(initial), compare)
    }

    /// Create a cell around an existing `Rc`.
    pub fn from_rc(value: Rc<T>, compare: Compare<T>) -> Self {
        guard::check(GuardedOperation::Create);
        Self::from_parts(value, compare)
    }

    /// Create a cell without consulting the guard rail.
    pub(crate) fn from_parts(value: Rc<T>, compare: Compare<T>) -> Self {
        let id = Runtime::with(Runtime::create_cell);
        Self {
            inner: Rc::new(CellInner {
                id,
                value: RefCell::new(value),
                compare,
            }),
        }
    }

    /// Get the cell's version. It increases on every effective write.
    pub fn version(&self) -> u64 {
        Runtime::with(|rt| rt.version(self.inner.id))
    }

    /// Get the number of live emitters currently depending on this cell.
    pub fn dependent_count(&self) -> usize {
        Runtime::with(|rt| rt.dependent_count(self.inner.id))
    }

    /// Replace the value, unless the cell's comparator says it is equal.
    pub fn write(&self, value: impl Into<Rc<T>>) {
        if write_allowed() {
            self.commit(value.into(), &self.inner.compare);
        }
    }

    /// Replace the value, gated by `compare` instead of the cell's own
    /// comparator for this write only.
    pub fn write_with(&self, value: impl Into<Rc<T>>, compare: &Compare<T>) {
        if write_allowed() {
            self.commit(value.into(), compare);
        }
    }

    /// Replace the value with `f(current)`.
    ///
    /// The current value is read untracked.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        if write_allowed() {
            let next = f(&self.read_untracked());
            self.commit(Rc::new(next), &self.inner.compare);
        }
    }

    /// Replace the value with `f(current)`, gated by `compare`.
    pub fn update_with<F>(&self, f: F, compare: &Compare<T>)
    where
        F: FnOnce(&T) -> T,
    {
        if write_allowed() {
            let next = f(&self.read_untracked());
            self.commit(Rc::new(next), compare);
        }
    }

    /// Store `candidate` if it differs from the current value and notify
    /// dependents.
    fn commit(&self, candidate: Rc<T>, compare: &Compare<T>) {
        let current = self.read_untracked();

        // The same allocation is always equal to itself
        if Rc::ptr_eq(&current, &candidate) || compare.eq(&current, &candidate) {
            trace!(cell = ?self.inner.id, "write dropped by comparator");
            return;
        }

        let previous = self.inner.value.replace(candidate);
        drop(previous);
        drop(current);

        Runtime::with(|rt| rt.mark_changed(self.inner.id));
    }
}

fn write_allowed() -> bool {
    guard::check(GuardedOperation::Write) != Outcome::Discarded
}

impl<T: 'static> Readable<T> for Cell<T> {
    fn id(&self) -> CellId {
        self.inner.id
    }

    fn read(&self, scope: &Scope) -> Rc<T> {
        let version = Runtime::with(|rt| rt.version(self.inner.id));
        scope.track(self.inner.id, version);
        self.read_untracked()
    }

    fn read_untracked(&self) -> Rc<T> {
        Rc::clone(&self.inner.value.borrow())
    }

    fn comparator(&self) -> Compare<T> {
        self.inner.compare.clone()
    }
}

impl<T: 'static> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Cell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.inner.id)
            .field("value", &self.read_untracked())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
