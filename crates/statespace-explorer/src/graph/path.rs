use statespace_core::{names, NodeId, NodeKind};
use std::collections::HashSet;

use crate::error::ExploreError;
use crate::graph::explore::{Capacity, ExpandOutcome, IncrementalExplorer, PendingExpansion};
use crate::graph::store::GraphStore;

/// Successor states two layers down (state -> action -> state).
pub fn next_states(store: &GraphStore, sources: &[NodeId]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for src in sources {
        for action in store.successors(src, NodeKind::Action) {
            for state in store.successors(&action.id, NodeKind::State) {
                if seen.insert(state.id.clone()) {
                    out.push(state.id.clone());
                }
            }
        }
    }
    out
}

/// States that lead to `targets` through one action.
pub fn previous_states(store: &GraphStore, targets: &[NodeId]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for dst in targets {
        for action in store.predecessors(dst, NodeKind::Action) {
            for state in store.predecessors(&action.id, NodeKind::State) {
                if seen.insert(state.id.clone()) {
                    out.push(state.id.clone());
                }
            }
        }
    }
    out
}

/// Best successor state of `source` under `policy`.
///
/// Picks the action child with the highest weight, then the state child of
/// that action with the highest weight. Missing weights count as zero and
/// ties keep the first-seen candidate.
pub fn best_next(store: &GraphStore, source: &NodeId, policy: &str) -> Option<NodeId> {
    let action = pick_heaviest(store.successors(source, NodeKind::Action), policy)?;
    let state = pick_heaviest(store.successors(&action, NodeKind::State), policy)?;
    Some(state)
}

fn pick_heaviest<'a, I>(candidates: I, policy: &str) -> Option<NodeId>
where
    I: IntoIterator<Item = &'a statespace_core::Node>,
{
    let mut best: Option<(&statespace_core::Node, f64)> = None;
    for node in candidates {
        let w = node.weight(policy).unwrap_or(0.0);
        match best {
            Some((_, bw)) if w <= bw => {}
            _ => best = Some((node, w)),
        }
    }
    best.map(|(n, _)| n.id.clone())
}

pub fn is_terminal(store: &GraphStore, id: &NodeId) -> bool {
    store
        .node(id)
        .map(|n| n.has_proposition(names::AP_END))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    StepLimit,
    /// Every remaining source satisfied the end proposition.
    Terminal,
    EmptyFrontier,
    Capacity(PendingExpansion),
    Failed(ExploreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BestPathReport {
    pub steps: usize,
    /// Last successfully reached frontier, terminal states included.
    pub frontier: Vec<NodeId>,
    pub added: Vec<NodeId>,
    pub stop: StopReason,
}

/// What a [`BestPathRun`] needs next.
#[derive(Debug, Clone, PartialEq)]
pub enum BestPathStep {
    /// Fetch these collapsed ids, commit, then [`BestPathRun::record`].
    /// May be empty when the live frontier is already expanded.
    Fetch(Vec<NodeId>),
    Done(BestPathReport),
}

/// A best-path expansion driven one fetch at a time. The run borrows no
/// store between steps, so the caller decides where the store lives while
/// a fetch is in flight.
#[derive(Debug, Clone)]
pub struct BestPathRun {
    policy: Option<String>,
    max_steps: usize,
    steps: usize,
    frontier: Vec<NodeId>,
    live: Vec<NodeId>,
    added: Vec<NodeId>,
    stop: Option<StopReason>,
}

impl BestPathRun {
    /// Starts from the state ids of `sources` that `store` holds.
    pub fn new(store: &GraphStore, sources: &[NodeId], policy: Option<&str>, max_steps: usize) -> Self {
        let frontier = sources
            .iter()
            .filter(|id| store.node(id).is_some_and(|n| n.is_state()))
            .cloned()
            .collect();
        Self {
            policy: policy.map(str::to_string),
            max_steps,
            steps: 0,
            frontier,
            live: Vec::new(),
            added: Vec::new(),
            stop: None,
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn frontier(&self) -> &[NodeId] {
        &self.frontier
    }

    pub fn is_finished(&self) -> bool {
        self.stop.is_some()
    }

    pub fn next_step(&mut self, store: &GraphStore) -> BestPathStep {
        if self.stop.is_none() {
            self.stop = self.check_stop(store);
        }
        match &self.stop {
            None => BestPathStep::Fetch(IncrementalExplorer::plan(store, &self.live)),
            Some(stop) => {
                tracing::info!(steps = self.steps, added = self.added.len(), stop = ?stop, "best path finished");
                BestPathStep::Done(BestPathReport {
                    steps: self.steps,
                    frontier: self.frontier.clone(),
                    added: self.added.clone(),
                    stop: stop.clone(),
                })
            }
        }
    }

    fn check_stop(&mut self, store: &GraphStore) -> Option<StopReason> {
        if self.steps >= self.max_steps {
            return Some(StopReason::StepLimit);
        }
        self.live = self
            .frontier
            .iter()
            .filter(|id| !is_terminal(store, id))
            .cloned()
            .collect();
        if self.live.is_empty() {
            return Some(if self.frontier.is_empty() {
                StopReason::EmptyFrontier
            } else {
                StopReason::Terminal
            });
        }
        None
    }

    /// Folds the outcome of the last fetch into the run and moves the
    /// frontier one layer down.
    pub fn record(&mut self, store: &GraphStore, outcome: Result<ExpandOutcome, ExploreError>) {
        if self.stop.is_some() {
            return;
        }
        let delta = match outcome {
            Ok(ExpandOutcome::Merged(delta)) => delta,
            Ok(ExpandOutcome::CapacityExceeded(pending)) => {
                self.stop = Some(StopReason::Capacity(pending));
                return;
            }
            Err(e) => {
                self.stop = Some(StopReason::Failed(e));
                return;
            }
        };
        self.added.extend(delta.nodes);

        let next: Vec<NodeId> = match &self.policy {
            None => next_states(store, &self.live),
            Some(p) => {
                let mut seen = HashSet::new();
                self.live
                    .iter()
                    .filter_map(|src| best_next(store, src, p))
                    .filter(|id| seen.insert(id.clone()))
                    .collect()
            }
        };
        self.steps += 1;
        if next.is_empty() {
            self.stop = Some(StopReason::EmptyFrontier);
        } else {
            self.frontier = next;
        }
    }
}

impl IncrementalExplorer {
    /// Advances `sources` toward terminal states for at most `max_steps`
    /// iterations, following `policy` when one is selected.
    pub async fn expand_best_path(
        &self,
        store: &mut GraphStore,
        sources: &[NodeId],
        policy: Option<&str>,
        max_steps: usize,
        capacity: Option<Capacity>,
    ) -> BestPathReport {
        let mut run = BestPathRun::new(store, sources, policy, max_steps);
        loop {
            let collapsed = match run.next_step(store) {
                BestPathStep::Fetch(collapsed) => collapsed,
                BestPathStep::Done(report) => return report,
            };
            let outcome = self
                .fetch(&collapsed)
                .await
                .map(|payload| Self::commit(store, collapsed, payload, capacity));
            run.record(store, outcome);
        }
    }
}
