//! Subscription handles.
//!
//! An effect or listener may hand back a [`Cleanup`], which runs before the
//! next re-run and on disposal. Creating a subscription returns an
//! [`Unsubscribe`] handle that disposes it.

use std::fmt;
use std::rc::Rc;

use super::runtime::Reactive;
use crate::guard::untracked;

/// A teardown callback returned by an effect run.
#[derive(Default)]
pub struct Cleanup(Option<Box<dyn FnOnce()>>);

impl Cleanup {
    /// No teardown.
    pub fn none() -> Self {
        Self(None)
    }

    /// Run `f` as the teardown.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// Check if there is a teardown to run.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Run the teardown, outside of any guarded mode.
    pub(crate) fn invoke(self) {
        if let Some(f) = self.0 {
            untracked(f);
        }
    }
}

impl From<()> for Cleanup {
    fn from(_: ()) -> Self {
        Self::none()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cleanup").field(&self.0.is_some()).finish()
    }
}

/// Disposes a subscription.
///
/// Dropping the handle does not dispose anything: a subscription lives until
/// [`Unsubscribe::unsubscribe`] is called.
#[derive(Clone, Default)]
#[must_use = "an `Unsubscribe` is the only way to dispose the subscription"]
pub struct Unsubscribe {
    target: Option<Rc<dyn Reactive>>,
}

impl Unsubscribe {
    pub(crate) fn new(target: Rc<dyn Reactive>) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// A handle to nothing. Returned when the guard rail refuses a
    /// subscription.
    pub fn noop() -> Self {
        Self { target: None }
    }

    /// Dispose the subscription: run its last cleanup and stop listening to
    /// every cell it depends on. Calling this again does nothing.
    pub fn unsubscribe(&self) {
        if let Some(target) = &self.target {
            target.dispose();
        }
    }

    /// Check if the subscription is still live.
    pub fn is_active(&self) -> bool {
        self.target
            .as_ref()
            .is_some_and(|target| !target.is_disposed())
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}
