//! Effect Implementation
//!
//! An effect is a side-effecting computation that re-runs whenever a cell it
//! read during its previous run changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs once, synchronously, inside a fresh
//!    [`Scope`], to establish its initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs at the end of the
//!    enclosing transaction (immediately after the write if there is none),
//!    at most once per transaction.
//!
//! 3. Each run records its dependencies from scratch. A branch that stops
//!    reading a cell stops listening to it.
//!
//! # Cleanup
//!
//! An effect may return a [`Cleanup`]. It runs before the next re-run and on
//! disposal.

use std::cell::{Cell as Flag, RefCell};
use std::rc::Rc;

use super::batch::batch;
use super::runtime::{Reactive, Runtime};
use super::scope::Scope;
use super::subscription::{Cleanup, Unsubscribe};
use crate::graph::EmitterId;
use crate::guard::{self, GuardedOperation, Mode, Outcome};

type EffectFn = Box<dyn FnMut(&Scope) -> Cleanup>;

/// An effect registered with the runtime.
struct EffectInner {
    /// The emitter node in the dependency graph.
    emitter: EmitterId,

    /// The effect function.
    run: RefCell<EffectFn>,

    /// Cleanup returned by the last run.
    cleanup: RefCell<Cleanup>,

    /// Whether the effect has been disposed.
    disposed: Flag<bool>,
}

impl Reactive for EffectInner {
    fn run(&self) {
        if self.disposed.get() {
            return;
        }

        self.cleanup.take().invoke();

        let scope = Scope::new(Mode::Effect);
        let cleanup = match self.run.try_borrow_mut() {
            Ok(mut run) => run(&scope),
            Err(_) => {
                tracing::trace!(emitter = ?self.emitter, "effect re-entered; skipping");
                return;
            }
        };
        let dependencies = scope.into_dependencies();
        Runtime::with(|rt| rt.retrack(self.emitter, dependencies));

        // The run may have disposed its own effect
        if self.disposed.get() {
            cleanup.invoke();
        } else {
            *self.cleanup.borrow_mut() = cleanup;
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        self.cleanup.take().invoke();
        Runtime::with(|rt| rt.dispose_emitter(self.emitter));
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

/// Run `effect` now and again whenever a cell it read changes.
///
/// Returns the handle that disposes the effect. Inside a tracked read the
/// effect is never created, and a no-op handle is returned instead.
///
/// # Example
///
/// ```rust,ignore
/// let count = Cell::new(1);
///
/// let unsubscribe = subscribe({
///     let count = count.clone();
///     move |scope| println!("count is {}", count.read(scope))
/// });                  // prints "count is 1"
///
/// count.write(2);      // prints "count is 2"
/// unsubscribe.unsubscribe();
/// count.write(3);      // prints nothing
/// ```
pub fn subscribe<F, R>(effect: F) -> Unsubscribe
where
    F: FnMut(&Scope) -> R + 'static,
    R: Into<Cleanup>,
{
    if guard::check(GuardedOperation::Subscribe) == Outcome::Replaced {
        return Unsubscribe::noop();
    }
    spawn(effect)
}

/// Create an effect without consulting the guard rail.
pub(crate) fn spawn<F, R>(mut effect: F) -> Unsubscribe
where
    F: FnMut(&Scope) -> R + 'static,
    R: Into<Cleanup>,
{
    let run: EffectFn = Box::new(move |scope: &Scope| effect(scope).into());
    let emitter = Runtime::with(Runtime::create_effect);
    let inner = Rc::new(EffectInner {
        emitter,
        run: RefCell::new(run),
        cleanup: RefCell::new(Cleanup::none()),
        disposed: Flag::new(false),
    });

    Runtime::with(|rt| rt.register_effect(emitter, inner.clone()));

    // Writes made by the first run are delivered after it returns
    batch(|| inner.run());

    Unsubscribe::new(inner)
}
