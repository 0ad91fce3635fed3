//! Guard Rail
//!
//! Creating, forking, writing, or subscribing to a cell while a tracked read
//! is running would leak a fresh cell or subscription on every re-evaluation
//! and can corrupt the dependency graph. The guard rail intercepts these four
//! operations and degrades them instead of failing:
//!
//! | Operation | Outcome                                      |
//! |-----------|----------------------------------------------|
//! | create    | proceeds                                     |
//! | fork      | proceeds                                     |
//! | write     | per [`GuardPolicy`](crate::config::GuardPolicy) |
//! | subscribe | replaced with a no-op `Unsubscribe`          |
//!
//! Every intercepted operation is reported to the installed
//! [`DiagnosticSink`].
//!
//! # Modes
//!
//! The current mode is a stack slot owned by the thread's engine. Each
//! evaluation pushes its mode for exactly its own duration and pops it on
//! every exit path, unwinding included.

mod diagnostics;

pub use diagnostics::{
    set_diagnostic_sink, Diagnostic, DiagnosticSink, NoopSink, Outcome, RecordingSink,
    TracingSink,
};

use crate::reactive::Runtime;

/// The guard-rail mode of the running code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// No tracked read is running. Nothing is policed.
    Untracked,

    /// A host-marked read context, see [`tracked_read`].
    TrackedRead,

    /// A derived cell's getter is running.
    MemoizedRead,

    /// An effect body is running.
    Effect,
}

/// The operations policed by the guard rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardedOperation {
    /// Creating a new cell.
    Create,

    /// Forking a cell.
    Clone,

    /// Writing a cell.
    Write,

    /// Subscribing to a cell, or creating an effect.
    Subscribe,
}

/// Keeps a mode pushed for as long as it lives.
pub(crate) struct ModeGuard {
    mode: Mode,
}

impl ModeGuard {
    pub(crate) fn enter(mode: Mode) -> Self {
        Runtime::with(|rt| rt.push_mode(mode));
        Self { mode }
    }
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        let _ = Runtime::try_with(|rt| {
            let popped = rt.pop_mode();
            debug_assert_eq!(
                popped,
                Some(self.mode),
                "guard mode mismatch: expected {:?}, got {:?}",
                self.mode,
                popped
            );
        });
    }
}

/// Run `f` as a tracked read.
///
/// Hosts wrap their render or read paths in this so that graph mutations
/// performed there are policed like those inside an effect or getter.
pub fn tracked_read<T>(f: impl FnOnce() -> T) -> T {
    let _mode = ModeGuard::enter(Mode::TrackedRead);
    f()
}

/// Run `f` outside of any guarded mode.
///
/// Subscription listeners and cleanups run this way, so that they may write
/// cells freely even when they were triggered from inside an evaluation.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _mode = ModeGuard::enter(Mode::Untracked);
    f()
}

/// Get the mode of the running code.
pub fn current_mode() -> Mode {
    Runtime::with(|rt| rt.current_mode())
}

/// Police `operation` against the current mode.
pub(crate) fn check(operation: GuardedOperation) -> Outcome {
    Runtime::with(|rt| rt.check_guard(operation))
}
