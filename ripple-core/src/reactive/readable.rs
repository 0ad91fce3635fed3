//! The read side of the cell contract, shared by [`Cell`] and
//! [`DerivedCell`](super::DerivedCell).

use std::mem;
use std::rc::Rc;

use super::cell::Cell;
use super::compare::{Compare, CompareOverride};
use super::effect;
use super::scope::Scope;
use super::subscription::{Cleanup, Unsubscribe};
use crate::graph::CellId;
use crate::guard::{self, untracked, GuardedOperation, Outcome};

/// A reactive value that can be read, subscribed to, and forked.
pub trait Readable<T: 'static>: Clone + 'static {
    /// Get the cell's node in the dependency graph.
    fn id(&self) -> CellId;

    /// Get the current value and record the read in `scope`.
    fn read(&self, scope: &Scope) -> Rc<T>;

    /// Get the current value without recording a dependency.
    fn read_untracked(&self) -> Rc<T>;

    /// Get the comparator gating this cell's changes.
    fn comparator(&self) -> Compare<T>;

    /// Call `listener` with the new value after every change of this cell.
    ///
    /// The listener is not called for the current value, and it runs
    /// untracked: cells it reads do not become dependencies.
    fn subscribe<F, R>(&self, mut listener: F) -> Unsubscribe
    where
        F: FnMut(Rc<T>) -> R + 'static,
        R: Into<Cleanup>,
    {
        if guard::check(GuardedOperation::Subscribe) == Outcome::Replaced {
            return Unsubscribe::noop();
        }

        let source = self.clone();
        let mut primed = false;
        effect::spawn(move |scope| {
            let value = source.read(scope);
            if !mem::replace(&mut primed, true) {
                return Cleanup::none();
            }
            let cleanup: Cleanup = untracked(|| listener(value).into());
            cleanup
        })
    }

    /// Create an independent cell holding this cell's current value.
    ///
    /// The copy is shallow: the new cell shares the same `Rc`, so cells
    /// nested inside the value are shared with this one.
    fn fork(&self) -> Cell<T> {
        guard::check(GuardedOperation::Clone);
        Cell::from_parts(self.read_untracked(), self.comparator())
    }

    /// Create an independent cell seeded from `transform(value)`.
    ///
    /// Nested cells are only independent if `transform` forks them itself.
    fn fork_with<F>(&self, transform: F, compare: CompareOverride<T>) -> Cell<T>
    where
        F: FnOnce(&T) -> T,
    {
        guard::check(GuardedOperation::Clone);
        let value = transform(&self.read_untracked());
        Cell::from_parts(Rc::new(value), compare.resolve(self.comparator()))
    }
}
