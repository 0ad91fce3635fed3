//! Equality Comparators
//!
//! A comparator decides whether a candidate value is "the same" as the one a
//! cell already holds. Equal candidates are dropped: the cell keeps its old
//! `Rc`, and nobody is notified.

use std::fmt;
use std::rc::Rc;

/// An equality predicate gating cell writes and derived recomputation.
pub struct Compare<T: ?Sized> {
    eq: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T: ?Sized + 'static> Compare<T> {
    /// Identity comparison: two values are equal only if they are the same
    /// allocation. This is the default.
    pub fn reference() -> Self {
        Self::by(|a: &T, b: &T| std::ptr::eq(a, b))
    }

    /// Structural comparison through `PartialEq`.
    pub fn structural() -> Self
    where
        T: PartialEq,
    {
        Self::by(|a: &T, b: &T| a == b)
    }

    /// Comparison through an arbitrary predicate.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let by_count = Compare::by(|a: &Counter, b: &Counter| a.count == b.count);
    /// ```
    pub fn by<F>(eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self { eq: Rc::new(eq) }
    }

    /// Check whether `current` and `candidate` are equal.
    pub fn eq(&self, current: &T, candidate: &T) -> bool {
        (self.eq)(current, candidate)
    }
}

impl<T: ?Sized + 'static> Default for Compare<T> {
    fn default() -> Self {
        Self::reference()
    }
}

impl<T: ?Sized> Clone for Compare<T> {
    fn clone(&self) -> Self {
        Self {
            eq: Rc::clone(&self.eq),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Compare<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compare").finish_non_exhaustive()
    }
}

/// How [`Readable::fork_with`](super::Readable::fork_with) picks the
/// comparator of the new cell.
pub enum CompareOverride<T: ?Sized> {
    /// Keep the source cell's comparator.
    Inherit,

    /// Go back to reference equality.
    Reset,

    /// Use this comparator.
    Use(Compare<T>),
}

impl<T: ?Sized + 'static> CompareOverride<T> {
    /// Resolve against the source cell's comparator.
    pub(crate) fn resolve(self, inherited: Compare<T>) -> Compare<T> {
        match self {
            Self::Inherit => inherited,
            Self::Reset => Compare::reference(),
            Self::Use(compare) => compare,
        }
    }
}

impl<T: ?Sized> Default for CompareOverride<T> {
    fn default() -> Self {
        Self::Inherit
    }
}

impl<T: ?Sized> From<Compare<T>> for CompareOverride<T> {
    fn from(compare: Compare<T>) -> Self {
        Self::Use(compare)
    }
}
