use statespace_core::NodeId;
use std::collections::{BTreeSet, HashSet};

use crate::graph::GraphStore;

/// The session-wide set of marked node ids. Outlives every pane.
#[derive(Debug, Clone, Default)]
pub struct MarkSet {
    ids: BTreeSet<NodeId>,
}

impl MarkSet {
    /// Returns the ids that were not marked before.
    pub fn mark<I>(&mut self, ids: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        ids.into_iter()
            .filter(|id| self.ids.insert(id.clone()))
            .collect()
    }

    /// Returns the ids that were actually marked.
    pub fn unmark<I>(&mut self, ids: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        ids.into_iter().filter(|id| self.ids.remove(id)).collect()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Materialized ids of `store` that are currently marked.
    pub fn decorate(&self, store: &GraphStore) -> HashSet<NodeId> {
        store
            .node_ids()
            .filter(|id| self.ids.contains(*id))
            .cloned()
            .collect()
    }
}
