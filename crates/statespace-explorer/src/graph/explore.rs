use async_trait::async_trait;
use statespace_core::{GraphPayload, NodeId, ProjectInfo};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ExploreError;
use crate::graph::store::{Delta, GraphStore};
use crate::graph::DisplayMode;

/// The graph/attribute service the explorer pulls neighbourhoods from.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Seed graph of the project (`/initial`).
    async fn initial(&self) -> Result<GraphPayload, ExploreError>;

    /// Project info with the attribute schema (`/status`).
    async fn status(&self) -> Result<ProjectInfo, ExploreError>;

    /// Immediate successors of `ids` (`/outgoing`).
    async fn outgoing(&self, ids: &[NodeId]) -> Result<GraphPayload, ExploreError>;

    /// Refreshed attribute bags for known ids (`/reset`).
    async fn reset(&self, open: &[NodeId], closed: &[NodeId]) -> Result<GraphPayload, ExploreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub ceiling: usize,
    pub mode: DisplayMode,
}

/// A fetched neighbourhood held back because merging it would push the pane
/// past its node ceiling. Nothing has been merged yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExpansion {
    pub frontier: Vec<NodeId>,
    pub payload: GraphPayload,
    pub visible: usize,
    pub incoming: usize,
    pub ceiling: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpandOutcome {
    Merged(Delta),
    CapacityExceeded(PendingExpansion),
}

impl ExpandOutcome {
    pub fn delta(&self) -> Option<&Delta> {
        match self {
            Self::Merged(d) => Some(d),
            Self::CapacityExceeded(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityDecision {
    RedirectToNewPane,
    ProceedAnyway,
    Cancel,
}

#[derive(Clone)]
pub struct IncrementalExplorer {
    backend: Arc<dyn Backend>,
}

impl IncrementalExplorer {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Frontier ids that are materialized and still collapsed, deduplicated.
    pub fn plan(store: &GraphStore, frontier: &[NodeId]) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        frontier
            .iter()
            .filter(|id| store.has_node(id) && store.is_collapsed(id))
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect()
    }

    /// Requests the neighbourhood of already planned ids. Borrows no store.
    pub async fn fetch(&self, collapsed: &[NodeId]) -> Result<GraphPayload, ExploreError> {
        if collapsed.is_empty() {
            return Ok(GraphPayload::default());
        }
        let payload = self.backend.outgoing(collapsed).await?;
        tracing::debug!(
            requested = collapsed.len(),
            nodes = payload.nodes.len(),
            edges = payload.edges.len(),
            "outgoing fetched"
        );
        Ok(payload)
    }

    /// Returns `(visible, incoming)` when merging `payload` would exceed the ceiling.
    pub fn exceeds(
        store: &GraphStore,
        payload: &GraphPayload,
        capacity: Capacity,
    ) -> Option<(usize, usize)> {
        let visible = store.count(capacity.mode);
        let mut seen = HashSet::new();
        let incoming = payload
            .nodes
            .iter()
            .filter(|n| capacity.mode.admits(n.kind))
            .filter(|n| !store.has_node(&n.id) && seen.insert(n.id.clone()))
            .count();
        (incoming > 0 && visible + incoming > capacity.ceiling).then_some((visible, incoming))
    }

    /// Capacity check followed by a single atomic merge.
    pub fn commit(
        store: &mut GraphStore,
        frontier: Vec<NodeId>,
        payload: GraphPayload,
        capacity: Option<Capacity>,
    ) -> ExpandOutcome {
        if let Some(cap) = capacity {
            if let Some((visible, incoming)) = Self::exceeds(store, &payload, cap) {
                tracing::info!(visible, incoming, ceiling = cap.ceiling, "expansion over pane ceiling");
                return ExpandOutcome::CapacityExceeded(PendingExpansion {
                    frontier,
                    payload,
                    visible,
                    incoming,
                    ceiling: cap.ceiling,
                });
            }
        }
        let delta = store.add(payload.nodes, payload.edges);
        store.mark_expanded(&frontier);
        ExpandOutcome::Merged(delta)
    }

    /// Merges a held-back expansion regardless of the ceiling.
    pub fn apply(store: &mut GraphStore, pending: PendingExpansion) -> Delta {
        let delta = store.add(pending.payload.nodes, pending.payload.edges);
        store.mark_expanded(&pending.frontier);
        delta
    }

    pub async fn expand(
        &self,
        store: &mut GraphStore,
        frontier: &[NodeId],
        capacity: Option<Capacity>,
    ) -> Result<ExpandOutcome, ExploreError> {
        let collapsed = Self::plan(store, frontier);
        if collapsed.is_empty() {
            return Ok(ExpandOutcome::Merged(Delta::default()));
        }
        let payload = self.fetch(&collapsed).await?;
        Ok(Self::commit(store, collapsed, payload, capacity))
    }

    /// Pulls updated attribute bags for every state in `store`.
    pub async fn refresh(&self, store: &mut GraphStore) -> Result<usize, ExploreError> {
        let (open, closed) = store.open_and_closed_states();
        if open.is_empty() && closed.is_empty() {
            return Ok(0);
        }
        let payload = self.backend.reset(&open, &closed).await?;
        let updated = store.refresh_attributes(payload.nodes);
        tracing::debug!(open = open.len(), closed = closed.len(), updated, "attributes refreshed");
        Ok(updated)
    }
}
