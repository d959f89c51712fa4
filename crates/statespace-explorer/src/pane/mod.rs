pub mod geometry;
pub mod manager;
pub mod view;

use smallvec::SmallVec;
use statespace_core::{NodeId, PaneId};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Weak};

use crate::brush::BrushEngine;
use crate::error::{ExploreError, PaneError};
use crate::graph::{Capacity, GraphStore};

pub use geometry::Geometry;
pub use manager::{PaneManager, SpawnRequest};
pub use view::{History, InsertPolicy, ViewState};

/// Exploration lifecycle of one pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplorationState {
    #[default]
    Collapsed,
    Seeded,
    Expanding,
    Closed,
}

/// Held by whoever drives an expansion. The pane is `Expanding` only while
/// its lease is alive, so a dropped ticket or a cancelled fetch frees it.
#[derive(Debug)]
pub struct ExpansionLease(Arc<()>);

/// Visual classes re-derived from session-wide state.
#[derive(Debug, Clone, Default)]
pub struct Decorations {
    pub marked: HashSet<NodeId>,
    pub recurring: HashSet<NodeId>,
}

pub struct Pane {
    pub id: PaneId,
    pub color: String,
    pub geometry: Geometry,
    pub store: GraphStore,
    pub spawners: SmallVec<[PaneId; 1]>,
    pub spawned: BTreeSet<PaneId>,
    /// Node ids this pane was spawned to explore.
    pub spawner_nodes: Vec<NodeId>,
    pub ever_added: HashSet<NodeId>,
    pub view: ViewState,
    pub brush: BrushEngine,
    pub history: History,
    pub decorations: Decorations,
    selection: Vec<NodeId>,
    state: ExplorationState,
    lease: Weak<()>,
}

impl Pane {
    pub fn state(&self) -> ExplorationState {
        if self.state == ExplorationState::Expanding && self.lease.strong_count() == 0 {
            return self.resting_state();
        }
        self.state
    }

    pub fn capacity(&self, ceiling: usize) -> Capacity {
        Capacity {
            ceiling,
            mode: self.view.mode,
        }
    }

    /// Enters `Expanding`; a second expansion on the same pane is rejected
    /// until the returned lease is dropped or [`Pane::end_expansion`] runs.
    pub fn begin_expansion(&mut self) -> Result<ExpansionLease, ExploreError> {
        match self.state() {
            ExplorationState::Expanding | ExplorationState::Closed => Err(ExploreError::Busy(self.id.clone())),
            _ => {
                let lease = Arc::new(());
                self.lease = Arc::downgrade(&lease);
                self.state = ExplorationState::Expanding;
                Ok(ExpansionLease(lease))
            }
        }
    }

    /// Leaves `Expanding`, landing on `Seeded` once the store holds anything.
    pub fn end_expansion(&mut self) {
        if self.state == ExplorationState::Expanding {
            self.state = self.resting_state();
            self.lease = Weak::new();
        }
    }

    fn resting_state(&self) -> ExplorationState {
        if self.store.is_empty() {
            ExplorationState::Collapsed
        } else {
            ExplorationState::Seeded
        }
    }

    pub(crate) fn close(&mut self) {
        self.state = ExplorationState::Closed;
    }

    pub(crate) fn settle(&mut self) {
        if self.state() != ExplorationState::Expanding {
            self.state = self.resting_state();
        }
    }

    pub fn ensure_open(&self) -> Result<(), PaneError> {
        if self.state == ExplorationState::Closed {
            return Err(PaneError::Closed(self.id.clone()));
        }
        Ok(())
    }

    /// Graph-view selection, always a subset of the store's nodes.
    pub fn selection(&self) -> &[NodeId] {
        &self.selection
    }

    /// Replaces the selection, dropping ids the store does not hold.
    /// Returns the previous selection.
    pub fn set_selection<I>(&mut self, ids: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut seen = HashSet::new();
        let next: Vec<NodeId> = ids
            .into_iter()
            .filter(|id| self.store.has_node(id) && seen.insert(id.clone()))
            .collect();
        std::mem::replace(&mut self.selection, next)
    }

    pub fn is_marked(&self, id: &NodeId) -> bool {
        self.decorations.marked.contains(id)
    }

    pub fn is_recurring(&self, id: &NodeId) -> bool {
        self.decorations.recurring.contains(id)
    }

    /// Records newly materialized ids for recurrence detection.
    pub fn note_added<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        self.ever_added.extend(ids.into_iter().cloned());
        self.settle();
    }
}

impl std::fmt::Debug for Pane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pane")
            .field("id", &self.id)
            .field("nodes", &self.store.node_count())
            .field("edges", &self.store.edge_count())
            .field("spawners", &self.spawners)
            .field("spawned", &self.spawned)
            .field("state", &self.state())
            .finish()
    }
}
