//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, derived cells,
//! and effects. It owns the dependency graph, the open transaction, the
//! guard-rail mode stack, and the configuration.
//!
//! # How It Works
//!
//! 1. When a cell is created, it registers a node with the runtime.
//!
//! 2. When an evaluation finishes, the runtime diffs the cells it read
//!    against the previous run and updates the graph edges.
//!
//! 3. When a cell's value changes, the runtime:
//!    a. Marks its dependents dirty right away, so derived cells read
//!       later in the same transaction recompute
//!    b. Queues the effects it reached in the open transaction
//!    c. On exit of the outermost transaction, runs every queued effect
//!       exactly once, skipping those whose derived dependencies turned
//!       out not to change
//!    d. Repeats while effects keep writing cells
//!
//! # Threading
//!
//! The engine is synchronous and single-threaded. Each thread gets its own
//! runtime instance; cells never cross threads (they are `!Send`).

use std::cell::RefCell;
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use slotmap::SecondaryMap;
use smallvec::SmallVec;
use tracing::{error, trace};

use crate::config::{Config, DiagnosticsLevel, WritePolicy};
use crate::graph::{CellId, DirtyState, EmitterId, Graph};
use crate::guard::{
    Diagnostic, DiagnosticSink, GuardedOperation, Mode, NoopSink, Outcome, TracingSink,
};

/// Maximum flush passes before we consider it an infinite loop.
pub const MAX_FLUSH_PASSES: u32 = 1000;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// A computation registered with the runtime.
pub(crate) trait Reactive {
    /// Re-run the computation.
    fn run(&self);

    /// Tear the computation down.
    fn dispose(&self) {}

    /// Check if the computation was torn down.
    fn is_disposed(&self) -> bool {
        false
    }
}

/// How the runtime holds on to a registered computation.
enum Handle {
    /// Effects are owned by the runtime until disposed.
    Strong(Rc<dyn Reactive>),

    /// Derived cells are owned by their handles.
    Weak(Weak<dyn Reactive>),
}

impl Handle {
    fn upgrade(&self) -> Option<Rc<dyn Reactive>> {
        match self {
            Self::Strong(reactive) => Some(Rc::clone(reactive)),
            Self::Weak(reactive) => reactive.upgrade(),
        }
    }
}

/// State of the open transaction.
#[derive(Default)]
struct BatchState {
    depth: usize,

    /// Effects waiting for the flush, in the order they were reached.
    pending: IndexSet<EmitterId>,
}

/// The per-thread reactive runtime.
pub(crate) struct Runtime {
    graph: RefCell<Graph>,
    handles: RefCell<SecondaryMap<EmitterId, Handle>>,
    batch: RefCell<BatchState>,
    modes: RefCell<Vec<Mode>>,
    config: RefCell<Config>,
    sink: RefCell<Arc<dyn DiagnosticSink>>,
}

impl Runtime {
    fn new() -> Self {
        let config = Config::default();
        Self {
            graph: RefCell::new(Graph::new()),
            handles: RefCell::new(SecondaryMap::new()),
            batch: RefCell::new(BatchState::default()),
            modes: RefCell::new(Vec::new()),
            sink: RefCell::new(sink_for(config.diagnostics)),
            config: RefCell::new(config),
        }
    }

    /// Run `f` against the current thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but returns `None` while the thread is
    /// tearing its runtime down.
    pub(crate) fn try_with<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
        RUNTIME.try_with(f).ok()
    }

    // ------------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------------

    pub(crate) fn create_cell(&self) -> CellId {
        self.graph.borrow_mut().insert_cell()
    }

    /// Reserve the nodes of a derived cell. The cell registers itself with
    /// [`Runtime::register_derived`] once it knows its ids.
    pub(crate) fn create_derived(&self) -> (CellId, EmitterId) {
        self.graph.borrow_mut().insert_derived()
    }

    pub(crate) fn register_derived(&self, emitter: EmitterId, reactive: Weak<dyn Reactive>) {
        self.handles
            .borrow_mut()
            .insert(emitter, Handle::Weak(reactive));
        trace!(?emitter, "derived cell created");
    }

    /// Reserve an effect node. The effect registers itself with
    /// [`Runtime::register_effect`] once it knows its id.
    pub(crate) fn create_effect(&self) -> EmitterId {
        self.graph.borrow_mut().insert_effect()
    }

    pub(crate) fn register_effect(&self, emitter: EmitterId, reactive: Rc<dyn Reactive>) {
        self.handles
            .borrow_mut()
            .insert(emitter, Handle::Strong(reactive));
        trace!(?emitter, "effect created");
    }

    /// Remove a dropped cell (and, for a derived cell, its emitter).
    pub(crate) fn release_cell(&self, cell: CellId) {
        let owner = self.graph.borrow_mut().remove_cell(cell);

        // Drop the handle outside of the borrow: it may own other cells
        let handle = owner.and_then(|emitter| self.handles.borrow_mut().remove(emitter));
        drop(handle);
    }

    /// Remove a disposed effect and unsubscribe it from its dependencies.
    pub(crate) fn dispose_emitter(&self, emitter: EmitterId) {
        self.graph.borrow_mut().remove_emitter(emitter);
        self.batch.borrow_mut().pending.shift_remove(&emitter);
        let handle = self.handles.borrow_mut().remove(emitter);
        trace!(?emitter, "emitter disposed");
        drop(handle);
    }

    pub(crate) fn version(&self, cell: CellId) -> u64 {
        self.graph.borrow().version(cell).unwrap_or_default()
    }

    pub(crate) fn bump_version(&self, cell: CellId) {
        self.graph.borrow_mut().bump_version(cell);
    }

    pub(crate) fn dependent_count(&self, cell: CellId) -> usize {
        self.graph.borrow().dependent_count(cell)
    }

    pub(crate) fn is_active(&self, emitter: EmitterId) -> bool {
        self.graph.borrow().is_active(emitter)
    }

    /// Get the number of live cell and emitter nodes.
    #[cfg(test)]
    pub(crate) fn node_counts(&self) -> (usize, usize) {
        let graph = self.graph.borrow();
        (graph.cell_count(), graph.emitter_count())
    }

    /// Store the dependencies recorded by an evaluation of `emitter`.
    ///
    /// An effect whose inputs changed while it ran is queued again.
    pub(crate) fn retrack(&self, emitter: EmitterId, dependencies: IndexMap<CellId, u64>) {
        let rerun = self.graph.borrow_mut().retrack(emitter, dependencies);
        if rerun {
            self.batch.borrow_mut().pending.insert(emitter);
        }
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    pub(crate) fn is_batching(&self) -> bool {
        self.batch.borrow().depth > 0
    }

    pub(crate) fn enter_batch(&self) {
        self.batch.borrow_mut().depth += 1;
    }

    /// Close one transaction level, flushing when the outermost one closes.
    pub(crate) fn exit_batch(&self) {
        let depth = {
            let mut batch = self.batch.borrow_mut();
            batch.depth = batch.depth.saturating_sub(1);
            batch.depth
        };

        if depth == 0 {
            self.flush();
        }
    }

    /// Close one transaction level without flushing.
    ///
    /// Used while unwinding: queued effects stay queued, so they run in the
    /// next flush.
    pub(crate) fn abandon_batch(&self) {
        let mut batch = self.batch.borrow_mut();
        batch.depth = batch.depth.saturating_sub(1);
    }

    /// Record an effective change of `cell`.
    ///
    /// Dirty flags propagate immediately. The reached effects run right
    /// away outside of a transaction, or when the outermost one closes.
    pub(crate) fn mark_changed(&self, cell: CellId) {
        let effects = {
            let mut graph = self.graph.borrow_mut();
            graph.bump_version(cell);
            graph.propagate([cell])
        };

        let depth = {
            let mut batch = self.batch.borrow_mut();
            batch.pending.extend(effects);
            batch.depth
        };

        if depth == 0 {
            self.flush();
        }
    }

    /// Run every queued effect.
    fn flush(&self) {
        // Writes made by effects while flushing land in the next pass
        self.enter_batch();
        let _open = FlushGuard;

        let mut passes = 0;
        loop {
            let pass: SmallVec<[EmitterId; 8]> =
                self.batch.borrow().pending.iter().copied().collect();
            if pass.is_empty() {
                break;
            }

            passes += 1;
            if passes > MAX_FLUSH_PASSES {
                self.batch.borrow_mut().pending.clear();
                error!(passes, "effects keep invalidating each other");
                panic!(
                    "maximum flush passes exceeded ({MAX_FLUSH_PASSES}): \
                     an effect writes a cell that re-triggers it"
                );
            }
            trace!(pass = passes, effects = pass.len(), "flush pass");

            // Dequeue one at a time: if an effect panics, the rest stay queued
            for emitter in pass {
                let queued = self.batch.borrow_mut().pending.shift_remove(&emitter);
                if queued {
                    self.update_if_necessary(emitter);
                }
            }
        }
    }

    /// Bring an emitter up to date, re-running it only if needed.
    ///
    /// A `MaybeDirty` emitter first refreshes the derived cells it read; it
    /// re-runs only if one of its dependencies ended up with a different
    /// version than the one its last run saw.
    pub(crate) fn update_if_necessary(&self, emitter: EmitterId) {
        let state = self.graph.borrow().state(emitter);
        match state {
            None | Some(DirtyState::Clean) => return,
            Some(DirtyState::MaybeDirty) => {
                if !self.dependencies_changed(emitter) {
                    self.graph
                        .borrow_mut()
                        .set_state(emitter, DirtyState::Clean);
                    return;
                }
            }
            Some(DirtyState::Dirty) => {}
        }

        let reactive = self
            .handles
            .borrow()
            .get(emitter)
            .and_then(Handle::upgrade);

        match reactive {
            Some(reactive) => reactive.run(),
            None => self
                .graph
                .borrow_mut()
                .set_state(emitter, DirtyState::Clean),
        }
    }

    fn dependencies_changed(&self, emitter: EmitterId) -> bool {
        let dependencies = self.graph.borrow().dependencies(emitter);

        for (cell, seen) in dependencies {
            let owner = self.graph.borrow().owner(cell);
            if let Some(owner) = owner {
                self.update_if_necessary(owner);
            }

            if self.graph.borrow().version(cell) != Some(seen) {
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------------
    // Guard rail
    // ------------------------------------------------------------------------

    pub(crate) fn push_mode(&self, mode: Mode) {
        self.modes.borrow_mut().push(mode);
    }

    pub(crate) fn pop_mode(&self) -> Option<Mode> {
        self.modes.borrow_mut().pop()
    }

    pub(crate) fn current_mode(&self) -> Mode {
        self.modes
            .borrow()
            .last()
            .copied()
            .unwrap_or(Mode::Untracked)
    }

    pub(crate) fn check_guard(&self, operation: GuardedOperation) -> Outcome {
        let mode = self.current_mode();
        if mode == Mode::Untracked {
            return Outcome::Proceeded;
        }

        let outcome = match operation {
            GuardedOperation::Create | GuardedOperation::Clone => Outcome::Proceeded,
            GuardedOperation::Subscribe => Outcome::Replaced,
            GuardedOperation::Write => match self.config.borrow().guard.write_policy(mode) {
                WritePolicy::Allow => Outcome::Proceeded,
                WritePolicy::Discard => Outcome::Discarded,
            },
        };

        let sink = Arc::clone(&self.sink.borrow());
        sink.report(&Diagnostic {
            operation,
            mode,
            outcome,
        });
        outcome
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    pub(crate) fn config(&self) -> Config {
        self.config.borrow().clone()
    }

    pub(crate) fn install_config(&self, config: Config) {
        let sink = sink_for(config.diagnostics);
        *self.config.borrow_mut() = config;
        self.replace_sink(sink);
    }

    pub(crate) fn replace_sink(&self, sink: Arc<dyn DiagnosticSink>) -> Arc<dyn DiagnosticSink> {
        mem::replace(&mut *self.sink.borrow_mut(), sink)
    }
}

fn sink_for(level: DiagnosticsLevel) -> Arc<dyn DiagnosticSink> {
    match level {
        DiagnosticsLevel::Off => Arc::new(NoopSink),
        DiagnosticsLevel::Warn => Arc::new(TracingSink),
    }
}

/// Closes the flush's transaction level on every exit path.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = Runtime::try_with(Runtime::abandon_batch);
    }
}

/// Check if a transaction is open on the current thread.
pub fn is_batching() -> bool {
    Runtime::with(Runtime::is_batching)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct MockReactive {
        runs: Cell<usize>,
    }

    impl Reactive for MockReactive {
        fn run(&self) {
            self.runs.set(self.runs.get() + 1);
        }
    }

    fn track(rt: &Runtime, emitter: EmitterId, cells: &[CellId]) {
        let dependencies = cells
            .iter()
            .map(|cell| (*cell, rt.version(*cell)))
            .collect();
        rt.retrack(emitter, dependencies);
    }

    #[test]
    fn runtime_runs_dirty_effects_once_per_flush() {
        Runtime::with(|rt| {
            let a = rt.create_cell();
            let b = rt.create_cell();
            let mock = Rc::new(MockReactive { runs: Cell::new(0) });
            let emitter = rt.create_effect();
            rt.register_effect(emitter, mock.clone());
            track(rt, emitter, &[a, b]);

            rt.enter_batch();
            rt.mark_changed(a);
            rt.mark_changed(b);
            assert_eq!(mock.runs.get(), 0);
            rt.exit_batch();

            // The mock never retracks, so it stays dirty but ran only once
            assert_eq!(mock.runs.get(), 1);
            rt.dispose_emitter(emitter);
        });
    }

    #[test]
    fn runtime_skips_disposed_effects() {
        Runtime::with(|rt| {
            let a = rt.create_cell();
            let mock = Rc::new(MockReactive { runs: Cell::new(0) });
            let emitter = rt.create_effect();
            rt.register_effect(emitter, mock.clone());
            track(rt, emitter, &[a]);

            rt.dispose_emitter(emitter);
            rt.mark_changed(a);

            assert_eq!(mock.runs.get(), 0);
            assert_eq!(rt.dependent_count(a), 0);
        });
    }

    #[test]
    fn nested_batches_flush_once_at_the_outermost_exit() {
        Runtime::with(|rt| {
            let a = rt.create_cell();
            let mock = Rc::new(MockReactive { runs: Cell::new(0) });
            let emitter = rt.create_effect();
            rt.register_effect(emitter, mock.clone());
            track(rt, emitter, &[a]);

            rt.enter_batch();
            rt.enter_batch();
            rt.mark_changed(a);
            rt.exit_batch();
            assert!(rt.is_batching());
            assert_eq!(mock.runs.get(), 0);
            rt.exit_batch();

            assert!(!rt.is_batching());
            assert_eq!(mock.runs.get(), 1);
            rt.dispose_emitter(emitter);
        });
    }
}
