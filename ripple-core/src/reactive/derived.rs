//! Derived Cell Implementation
//!
//! A derived cell is a cached value computed from other cells, optionally
//! writable through a setter that translates writes back to its sources.
//!
//! # How Derived Cells Work
//!
//! 1. The getter is not run at creation. The first read runs it inside a
//!    private [`Scope`] and caches the result.
//!
//! 2. While something depends on the derived cell, it listens to its own
//!    sources. A source change marks it dirty and its dependents "maybe
//!    dirty"; the next read recomputes, and the comparator decides whether
//!    the dependents see a change at all.
//!
//! 3. While nothing depends on it, the derived cell listens to nothing.
//!    Every read after the first then re-validates: the getter runs again
//!    and its result is gated through the comparator, so an equal result
//!    keeps the cached `Rc`.
//!
//! # Writes
//!
//! A setter receives `(candidate, previous)` and runs inside a [`batch`],
//! so its writes to several sources produce a single notification.

use std::cell::{Cell as Flag, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::batch::batch;
use super::compare::Compare;
use super::readable::Readable;
use super::runtime::{Reactive, Runtime};
use super::scope::Scope;
use crate::error::CellError;
use crate::graph::{CellId, EmitterId};
use crate::guard::{self, GuardedOperation, Mode, Outcome};

type Getter<T> = Box<dyn Fn(&Scope) -> T>;
type Setter<T> = Box<dyn Fn(Rc<T>, Rc<T>)>;

/// A computed, optionally writable, reactive cell.
///
/// # Example
///
/// ```rust,ignore
/// let first = Cell::new(String::from("Ada"));
/// let last = Cell::new(String::from("Lovelace"));
///
/// let full = DerivedCell::new({
///     let (first, last) = (first.clone(), last.clone());
///     move |scope| format!("{} {}", first.read(scope), last.read(scope))
/// });
///
/// assert_eq!(*full.read_untracked(), "Ada Lovelace");
/// ```
pub struct DerivedCell<T: 'static> {
    inner: Rc<DerivedInner<T>>,
}

struct DerivedInner<T: 'static> {
    /// The cell node dependents subscribe to.
    cell: CellId,

    /// The emitter node that subscribes to the sources.
    emitter: EmitterId,

    getter: Getter<T>,
    setter: Option<Setter<T>>,
    compare: Compare<T>,

    /// The last computed value.
    value: RefCell<Option<Rc<T>>>,

    /// Set while the getter runs.
    computing: Flag<bool>,
}

/// Clears the computing flag on every exit path.
struct Computing<'a>(&'a Flag<bool>);

impl Drop for Computing<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T: 'static> DerivedInner<T> {
    fn cached(&self) -> Option<Rc<T>> {
        self.value.borrow().clone()
    }

    /// Get an up-to-date value.
    fn current(&self) -> Rc<T> {
        if Runtime::with(|rt| rt.is_active(self.emitter)) {
            Runtime::with(|rt| rt.update_if_necessary(self.emitter));
            if let Some(value) = self.cached() {
                return value;
            }
        }
        self.recompute()
    }

    /// Run the getter and store its result unless the comparator says it
    /// equals the cached value.
    fn recompute(&self) -> Rc<T> {
        if self.computing.replace(true) {
            panic!("derived cell {:?} reads itself while computing", self.cell);
        }
        let _computing = Computing(&self.computing);

        let scope = Scope::new(Mode::MemoizedRead);
        let next = (self.getter)(&scope);
        let dependencies = scope.into_dependencies();
        Runtime::with(|rt| rt.retrack(self.emitter, dependencies));

        if let Some(previous) = self.cached() {
            if self.compare.eq(&previous, &next) {
                return previous;
            }
        }

        let next = Rc::new(next);
        let previous = self.value.replace(Some(Rc::clone(&next)));
        Runtime::with(|rt| rt.bump_version(self.cell));
        drop(previous);
        next
    }
}

impl<T: 'static> Reactive for DerivedInner<T> {
    fn run(&self) {
        self.recompute();
    }
}

impl<T: 'static> Drop for DerivedInner<T> {
    fn drop(&mut self) {
        let _ = Runtime::try_with(|rt| rt.release_cell(self.cell));
    }
}

impl<T: 'static> DerivedCell<T> {
    /// Create a read-only derived cell compared by reference.
    pub fn new<G>(getter: G) -> Self
    where
        G: Fn(&Scope) -> T + 'static,
    {
        Self::builder(getter).build()
    }

    /// Start building a derived cell around `getter`.
    pub fn builder<G>(getter: G) -> DerivedBuilder<T>
    where
        G: Fn(&Scope) -> T + 'static,
    {
        DerivedBuilder {
            getter: Box::new(getter),
            setter: None,
            compare: Compare::reference(),
            initial: None,
        }
    }

    /// Get the version of the cached value.
    pub fn version(&self) -> u64 {
        Runtime::with(|rt| rt.version(self.inner.cell))
    }

    /// Get the number of live emitters currently depending on this cell.
    pub fn dependent_count(&self) -> usize {
        Runtime::with(|rt| rt.dependent_count(self.inner.cell))
    }

    /// Check if the cell is listening to its sources, which it does only
    /// while something depends on it.
    pub fn is_observed(&self) -> bool {
        Runtime::with(|rt| rt.is_active(self.inner.emitter))
    }

    /// Check if the cell was built with a setter.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Write `value` through the setter, unless the comparator says it
    /// equals the current value.
    pub fn write(&self, value: impl Into<Rc<T>>) -> Result<(), CellError> {
        self.commit(|_| value.into(), None)
    }

    /// Like [`DerivedCell::write`], gated by `compare` instead.
    pub fn write_with(
        &self,
        value: impl Into<Rc<T>>,
        compare: &Compare<T>,
    ) -> Result<(), CellError> {
        self.commit(|_| value.into(), Some(compare))
    }

    /// Write `f(current)` through the setter.
    pub fn update<F>(&self, f: F) -> Result<(), CellError>
    where
        F: FnOnce(&T) -> T,
    {
        self.commit(|current| Rc::new(f(current)), None)
    }

    fn commit<F>(&self, candidate: F, compare: Option<&Compare<T>>) -> Result<(), CellError>
    where
        F: FnOnce(&T) -> Rc<T>,
    {
        let Some(setter) = &self.inner.setter else {
            return Err(CellError::ReadOnly {
                cell: self.inner.cell,
            });
        };

        if guard::check(GuardedOperation::Write) == Outcome::Discarded {
            return Ok(());
        }

        let previous = self.inner.current();
        let candidate = candidate(&previous);
        let compare = compare.unwrap_or(&self.inner.compare);
        if Rc::ptr_eq(&previous, &candidate) || compare.eq(&previous, &candidate) {
            return Ok(());
        }

        batch(|| setter(candidate, previous));
        Ok(())
    }
}

impl<T: 'static> Readable<T> for DerivedCell<T> {
    fn id(&self) -> CellId {
        self.inner.cell
    }

    fn read(&self, scope: &Scope) -> Rc<T> {
        let value = self.inner.current();
        let version = Runtime::with(|rt| rt.version(self.inner.cell));
        scope.track(self.inner.cell, version);
        value
    }

    fn read_untracked(&self) -> Rc<T> {
        self.inner.current()
    }

    fn comparator(&self) -> Compare<T> {
        self.inner.compare.clone()
    }
}

impl<T: 'static> Clone for DerivedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for DerivedCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedCell")
            .field("id", &self.inner.cell)
            .field("cached", &self.inner.value.borrow())
            .field("observed", &self.is_observed())
            .finish()
    }
}

/// Configures a [`DerivedCell`] before it is created.
pub struct DerivedBuilder<T: 'static> {
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    compare: Compare<T>,
    initial: Option<Rc<T>>,
}

impl<T: 'static> DerivedBuilder<T> {
    /// Make the cell writable. The setter receives `(candidate, previous)`.
    pub fn setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(Rc<T>, Rc<T>) + 'static,
    {
        self.setter = Some(Box::new(setter));
        self
    }

    /// Gate recomputation and writes through `compare`.
    pub fn compare(mut self, compare: Compare<T>) -> Self {
        self.compare = compare;
        self
    }

    /// Pre-populate the cache. The first read still runs the getter and
    /// compares its result against this value.
    pub fn initial(mut self, value: impl Into<Rc<T>>) -> Self {
        self.initial = Some(value.into());
        self
    }

    /// Create the derived cell.
    pub fn build(self) -> DerivedCell<T> {
        guard::check(GuardedOperation::Create);

        let (cell, emitter) = Runtime::with(Runtime::create_derived);
        let inner = Rc::new(DerivedInner {
            cell,
            emitter,
            getter: self.getter,
            setter: self.setter,
            compare: self.compare,
            value: RefCell::new(self.initial),
            computing: Flag::new(false),
        });

        let weak: Weak<dyn Reactive> = Rc::downgrade(&inner) as Weak<dyn Reactive>;
        Runtime::with(|rt| rt.register_derived(emitter, weak));

        DerivedCell { inner }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
