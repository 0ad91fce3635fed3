//! Dependency Graph Arena
//!
//! The arena owns every node in the graph and keeps the two directions of
//! each edge (cell -> dependents, emitter -> dependencies) consistent.
//!
//! # Algorithm
//!
//! After every evaluation the emitter's freshly recorded dependency set is
//! diffed against the previous one:
//!
//! 1. Cells that were read last time but not this time stop listening.
//! 2. Cells that are read for the first time start listening.
//! 3. Cells in both sets are left untouched.
//!
//! A derived cell only subscribes to its own sources while something depends
//! on it. Linking the first dependent activates it, unlinking the last one
//! deactivates it, and both cascade upstream.
//!
//! When cells change, [`Graph::propagate`] walks the dependents breadth-first:
//! direct dependents become `Dirty`, dependents of invalidated derived cells
//! become `MaybeDirty`, and the effects reached are returned for execution.

use std::collections::VecDeque;
use std::mem;

use indexmap::{IndexMap, IndexSet};
use slotmap::SlotMap;
use smallvec::SmallVec;
use tracing::debug;

use super::node::{CellId, CellNode, DirtyState, EmitterId, EmitterKind, EmitterNode};

type CellList = SmallVec<[CellId; 8]>;

/// The dependency graph: cells, emitters, and the edges between them.
#[derive(Debug, Default)]
pub struct Graph {
    cells: SlotMap<CellId, CellNode>,
    emitters: SlotMap<EmitterId, EmitterNode>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain source cell.
    pub fn insert_cell(&mut self) -> CellId {
        self.cells.insert(CellNode::source())
    }

    /// Add a derived cell together with the emitter that recomputes it.
    pub fn insert_derived(&mut self) -> (CellId, EmitterId) {
        let emitter = self.emitters.insert(EmitterNode::derived());
        let cell = self.cells.insert(CellNode::owned_by(emitter));
        if let Some(node) = self.emitters.get_mut(emitter) {
            node.cell = Some(cell);
        }
        (cell, emitter)
    }

    /// Add an effect emitter.
    pub fn insert_effect(&mut self) -> EmitterId {
        self.emitters.insert(EmitterNode::effect())
    }

    /// Remove a cell.
    ///
    /// The cell disappears from the dependency set of every emitter that
    /// still lists it. If it is a derived cell, its emitter is removed too
    /// and returned.
    pub fn remove_cell(&mut self, cell: CellId) -> Option<EmitterId> {
        let node = self.cells.remove(cell)?;
        for emitter in node.dependents {
            if let Some(dependent) = self.emitters.get_mut(emitter) {
                dependent.dependencies.shift_remove(&cell);
            }
        }

        let owner = node.owner?;
        self.remove_emitter(owner);
        Some(owner)
    }

    /// Remove an emitter, unsubscribing it from every cell it depends on.
    ///
    /// Returns false if the emitter was already gone.
    pub fn remove_emitter(&mut self, emitter: EmitterId) -> bool {
        let Some(node) = self.emitters.remove(emitter) else {
            return false;
        };

        if node.active {
            for cell in node.dependencies.keys() {
                self.unlink(emitter, *cell);
            }
        }
        true
    }

    /// Get a reference to a cell node.
    pub fn cell(&self, cell: CellId) -> Option<&CellNode> {
        self.cells.get(cell)
    }

    /// Get a reference to an emitter node.
    pub fn emitter(&self, emitter: EmitterId) -> Option<&EmitterNode> {
        self.emitters.get(emitter)
    }

    /// Get a cell's current version.
    pub fn version(&self, cell: CellId) -> Option<u64> {
        self.cells.get(cell).map(CellNode::version)
    }

    /// Record an effective change of a cell's value.
    pub fn bump_version(&mut self, cell: CellId) {
        if let Some(node) = self.cells.get_mut(cell) {
            node.version = node.version.wrapping_add(1);
        }
    }

    /// Get the emitter that recomputes a derived cell.
    pub fn owner(&self, cell: CellId) -> Option<EmitterId> {
        self.cells.get(cell).and_then(CellNode::owner)
    }

    /// Get the number of emitters currently listening to a cell.
    pub fn dependent_count(&self, cell: CellId) -> usize {
        self.cells.get(cell).map_or(0, |node| node.dependents.len())
    }

    /// Get an emitter's dirty state.
    pub fn state(&self, emitter: EmitterId) -> Option<DirtyState> {
        self.emitters.get(emitter).map(EmitterNode::dirty_state)
    }

    /// Overwrite an emitter's dirty state.
    pub fn set_state(&mut self, emitter: EmitterId, state: DirtyState) {
        if let Some(node) = self.emitters.get_mut(emitter) {
            node.state = state;
        }
    }

    /// Check if an emitter is subscribed to its dependencies.
    pub fn is_active(&self, emitter: EmitterId) -> bool {
        self.emitters.get(emitter).is_some_and(EmitterNode::is_active)
    }

    /// Snapshot an emitter's dependencies and the versions it saw.
    pub fn dependencies(&self, emitter: EmitterId) -> SmallVec<[(CellId, u64); 8]> {
        self.emitters
            .get(emitter)
            .map(|node| {
                node.dependencies
                    .iter()
                    .map(|(cell, version)| (*cell, *version))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the total number of cells in the graph.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Get the total number of emitters in the graph.
    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    /// Replace an emitter's dependency set with the one recorded by its
    /// latest evaluation, and settle its dirty state.
    ///
    /// The emitter ends up clean unless a cell it read changed after the
    /// read. Returns true for an effect left dirty this way, which must run
    /// again.
    ///
    /// An inactive emitter only stores the set; it starts listening when it
    /// is activated.
    pub fn retrack(&mut self, emitter: EmitterId, dependencies: IndexMap<CellId, u64>) -> bool {
        let Some(node) = self.emitters.get_mut(emitter) else {
            return false;
        };

        let previous = mem::replace(&mut node.dependencies, dependencies);
        if node.active {
            self.relink(emitter, previous);
        }

        let (state, kind) = match self.emitters.get(emitter) {
            Some(node) => (self.settled_state(node.dependencies.iter()), node.kind),
            None => return false,
        };
        self.set_state(emitter, state);
        kind == EmitterKind::Effect && state != DirtyState::Clean
    }

    /// Get the dirty state an emitter that read `dependencies` is in now.
    fn settled_state<'a, I>(&self, dependencies: I) -> DirtyState
    where
        I: IntoIterator<Item = (&'a CellId, &'a u64)>,
    {
        let mut state = DirtyState::Clean;
        for (cell, seen) in dependencies {
            let Some(node) = self.cells.get(*cell) else {
                continue;
            };
            if node.version != *seen {
                return DirtyState::Dirty;
            }

            // A derived source invalidated after it was read
            let source_dirty = node
                .owner
                .and_then(|owner| self.state(owner))
                .is_some_and(|owner_state| owner_state != DirtyState::Clean);
            if source_dirty {
                state = DirtyState::MaybeDirty;
            }
        }
        state
    }

    /// Apply the difference between the previous and the current
    /// dependency set of an active emitter.
    fn relink(&mut self, emitter: EmitterId, previous: IndexMap<CellId, u64>) {
        let Some(node) = self.emitters.get(emitter) else {
            return;
        };

        let removed: CellList = previous
            .keys()
            .filter(|cell| !node.dependencies.contains_key(*cell))
            .copied()
            .collect();
        let added: CellList = node
            .dependencies
            .keys()
            .filter(|cell| !previous.contains_key(*cell))
            .copied()
            .collect();

        for cell in removed {
            self.unlink(emitter, cell);
        }
        for cell in added {
            self.link(emitter, cell);
        }
    }

    /// Mark the given cells as changed and propagate dirty flags.
    ///
    /// Returns the effects that need to be processed, each exactly once,
    /// in the order they were reached.
    pub fn propagate<I>(&mut self, changed: I) -> IndexSet<EmitterId>
    where
        I: IntoIterator<Item = CellId>,
    {
        let mut effects = IndexSet::new();
        let mut reached = IndexSet::new();
        let mut queue: VecDeque<(CellId, DirtyState)> = changed
            .into_iter()
            .map(|cell| (cell, DirtyState::Dirty))
            .collect();

        while let Some((cell, level)) = queue.pop_front() {
            let dependents: SmallVec<[EmitterId; 8]> = match self.cells.get(cell) {
                Some(node) => node.dependents.iter().copied().collect(),
                None => continue,
            };

            for emitter in dependents {
                let Some(node) = self.emitters.get_mut(emitter) else {
                    continue;
                };

                node.raise(level);
                match node.kind {
                    EmitterKind::Effect => {
                        effects.insert(emitter);
                    }
                    // A derived cell forwards the invalidation once per pass
                    EmitterKind::Derived if reached.insert(emitter) => {
                        if let Some(own) = node.cell {
                            queue.push_back((own, DirtyState::MaybeDirty));
                        }
                    }
                    EmitterKind::Derived => {}
                }
            }
        }

        effects
    }

    fn link(&mut self, emitter: EmitterId, cell: CellId) {
        let Some(node) = self.cells.get_mut(cell) else {
            return;
        };

        let first = node.dependents.is_empty();
        node.dependents.insert(emitter);
        if first {
            if let Some(owner) = node.owner {
                self.activate(owner);
            }
        }
    }

    fn unlink(&mut self, emitter: EmitterId, cell: CellId) {
        let Some(node) = self.cells.get_mut(cell) else {
            return;
        };

        if node.dependents.shift_remove(&emitter) && node.dependents.is_empty() {
            if let Some(owner) = node.owner {
                self.deactivate(owner);
            }
        }
    }

    fn activate(&mut self, emitter: EmitterId) {
        let dependencies = match self.emitters.get_mut(emitter) {
            Some(node) if !node.active => {
                node.active = true;
                node.dependencies
                    .iter()
                    .map(|(cell, version)| (*cell, *version))
                    .collect::<SmallVec<[(CellId, u64); 8]>>()
            }
            _ => return,
        };

        debug!(?emitter, sources = dependencies.len(), "derived cell observed");
        for (cell, _) in &dependencies {
            self.link(emitter, *cell);
        }

        // The cached value was computed while nothing was listening
        let state = self.settled_state(dependencies.iter().map(|(cell, seen)| (cell, seen)));
        self.set_state(emitter, state);
    }

    fn deactivate(&mut self, emitter: EmitterId) {
        let dependencies: CellList = match self.emitters.get_mut(emitter) {
            Some(node) if node.active => {
                node.active = false;
                node.dependencies.keys().copied().collect()
            }
            _ => return,
        };

        debug!(?emitter, sources = dependencies.len(), "derived cell unobserved");
        for cell in dependencies {
            self.unlink(emitter, cell);
        }
    }
}
