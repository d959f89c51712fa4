//! Session-scoped context: pane table, mark set, bus and backend, with
//! explicit `init`/`teardown`.

use serde::Serialize;
use statespace_core::{names, AttributeSchema, GraphPayload, Node, NodeId, PaneId, RegistryMsg};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::brush::{BrushEngine, Constraint, DetailSelection, Extreme, LinkedSelection};
use crate::error::{ExploreError, SessionError, SessionResult};
use crate::export::{self, PaneDocument};
use crate::graph::{
    Backend, BestPathReport, BestPathRun, BestPathStep, CapacityDecision, Delta, DisplayMode,
    ExpandOutcome, IncrementalExplorer, PendingExpansion, StopReason,
};
use crate::pane::{ExpansionLease, ExplorationState, InsertPolicy, PaneManager, SpawnRequest, ViewState};
use crate::sync::{recurrence, BusEvent, MarkSet, Recurrence, RecurrenceWatch, SyncBus};
use crate::util::EngineConfig;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub max_panes: usize,
    pub pane_node_ceiling: usize,
    pub best_path_max_steps: usize,
    pub brush_window: Duration,
    pub default_mode: DisplayMode,
    pub insert_policy: InsertPolicy,
    pub auto_sync: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SessionOptions {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            max_panes: cfg.max_panes,
            pane_node_ceiling: cfg.pane_node_ceiling,
            best_path_max_steps: cfg.best_path_max_steps,
            brush_window: cfg.brush_window(),
            default_mode: cfg.default_mode,
            insert_policy: cfg.insert_policy,
            auto_sync: cfg.auto_sync,
        }
    }
}

/// A planned expansion. Fetching borrows nothing from the session, so
/// several panes can have fetches in flight at once. The pane stays
/// `Expanding` while the ticket lives; dropping it without
/// [`Session::finish_expand`] abandons the expansion and frees the pane.
pub struct ExpansionTicket {
    pub pane: PaneId,
    pub collapsed: Vec<NodeId>,
    explorer: IncrementalExplorer,
    _lease: ExpansionLease,
}

impl ExpansionTicket {
    pub async fn fetch(&self) -> Result<GraphPayload, ExploreError> {
        self.explorer.fetch(&self.collapsed).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewPane {
    Spawned(PaneId),
    /// A live pane was already spawned from some of the requested nodes.
    AlreadyExplored(PaneId),
}

/// One turn of a stepwise best-path run.
pub enum PathStep {
    Fetch(ExpansionTicket),
    Done(BestPathReport),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Merged(Delta),
    Redirected { pane: PaneId, delta: Delta },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaneSummary {
    pub id: PaneId,
    pub color: String,
    pub state: String,
    pub nodes: usize,
    pub edges: usize,
    pub selected: usize,
    pub brushed: usize,
    pub marked: usize,
    pub recurring: usize,
    pub spawners: Vec<PaneId>,
    pub spawned: Vec<PaneId>,
}

pub struct Session {
    explorer: IncrementalExplorer,
    options: SessionOptions,
    bus: SyncBus,
    panes: PaneManager,
    marks: MarkSet,
    watch: RecurrenceWatch,
    schema: AttributeSchema,
    started: bool,
}

impl Session {
    pub fn init(backend: Arc<dyn Backend>, options: SessionOptions) -> Self {
        let bus = SyncBus::new();
        let panes = PaneManager::new(options.max_panes, options.brush_window, bus.clone());
        Self {
            explorer: IncrementalExplorer::new(backend),
            options,
            bus,
            panes,
            marks: MarkSet::default(),
            watch: RecurrenceWatch::default(),
            schema: AttributeSchema::new(),
            started: false,
        }
    }

    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    pub fn panes(&self) -> &PaneManager {
        &self.panes
    }

    pub fn marks(&self) -> &MarkSet {
        &self.marks
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Loads the schema and the initial graph into the primary pane.
    pub async fn start(&mut self) -> SessionResult<PaneId> {
        if let Some(primary) = self.panes.primary() {
            return Ok(primary.clone());
        }
        let info = self.explorer.backend().status().await?;
        self.schema = info.schema();
        let seed = self.explorer.backend().initial().await?;
        tracing::info!(
            project = ?info.id,
            categories = self.schema.len(),
            seed = seed.nodes.len(),
            "session started"
        );

        let view = self.default_view();
        let id = self.panes.spawn(SpawnRequest::seeded(seed, view))?;
        self.started = true;
        self.after_growth(&id, &[])?;
        Ok(id)
    }

    /// Closes every pane and clears session-wide state.
    pub fn teardown(&mut self) {
        let closed = self.panes.clear();
        self.marks.clear();
        self.watch.clear();
        self.bus
            .publish(BusEvent::Registry(RegistryMsg::ResetPaneNodeMarkings));
        self.bus.clear();
        self.started = false;
        tracing::info!(panes = closed.len(), "session torn down");
    }

    pub fn default_view(&self) -> ViewState {
        ViewState {
            mode: self.options.default_mode,
            policy: None,
            details: DetailSelection::initial(&self.schema),
            auto_sync: self.options.auto_sync,
            insert_policy: self.options.insert_policy,
        }
    }

    fn require_started(&self) -> SessionResult<()> {
        if self.panes.is_empty() {
            return Err(SessionError::NotStarted);
        }
        Ok(())
    }

    fn warn(&self, pane: Option<&PaneId>, message: String) {
        tracing::warn!(pane = ?pane, "{message}");
        self.bus.publish(BusEvent::warning(pane.cloned(), message));
    }

    /// Re-derives everything that depends on a pane's node set.
    fn after_growth(&mut self, pane: &PaneId, added: &[NodeId]) -> SessionResult<()> {
        let p = self.panes.get_mut(pane)?;
        p.note_added(added);
        let linked = p
            .brush
            .project(&p.store, p.view.mode, &p.view.details, &self.schema);
        p.decorations.marked = self.marks.decorate(&p.store);
        tracing::debug!(
            pane = %pane,
            added = added.len(),
            nodes = p.store.node_count(),
            "pane grew"
        );
        self.publish_selection(linked)?;
        self.recompute_watched();
        Ok(())
    }

    fn reproject(&mut self, pane: &PaneId) -> SessionResult<LinkedSelection> {
        let p = self.panes.get_mut(pane)?;
        let linked = p
            .brush
            .project(&p.store, p.view.mode, &p.view.details, &self.schema);
        self.publish_selection(linked.clone())?;
        Ok(linked)
    }

    // ---- exploration

    /// Marks the pane `Expanding` and plans which frontier ids need a fetch.
    pub fn begin_expand(&mut self, pane: &PaneId, frontier: &[NodeId]) -> SessionResult<ExpansionTicket> {
        let p = self.panes.get_mut(pane)?;
        p.ensure_open()?;
        let lease = p.begin_expansion()?;
        let collapsed = IncrementalExplorer::plan(&p.store, frontier);
        Ok(ExpansionTicket {
            pane: pane.clone(),
            collapsed,
            explorer: self.explorer.clone(),
            _lease: lease,
        })
    }

    /// Commits a fetched neighbourhood, or records the failure. Either way
    /// the pane leaves `Expanding`.
    pub fn finish_expand(
        &mut self,
        ticket: ExpansionTicket,
        fetched: Result<GraphPayload, ExploreError>,
    ) -> SessionResult<ExpandOutcome> {
        let ceiling = self.options.pane_node_ceiling;
        let p = self.panes.get_mut(&ticket.pane)?;
        let payload = match fetched {
            Ok(payload) => payload,
            Err(e) => {
                p.end_expansion();
                self.warn(Some(&ticket.pane), format!("expansion failed: {e}"));
                return Err(e.into());
            }
        };
        let capacity = p.capacity(ceiling);
        let outcome = IncrementalExplorer::commit(&mut p.store, ticket.collapsed, payload, Some(capacity));
        p.end_expansion();
        if let ExpandOutcome::Merged(delta) = &outcome {
            tracing::info!(pane = %ticket.pane, nodes = delta.nodes.len(), edges = delta.edges.len(), "expanded");
            self.after_growth(&ticket.pane, &delta.nodes)?;
        }
        Ok(outcome)
    }

    pub async fn expand(&mut self, pane: &PaneId, frontier: &[NodeId]) -> SessionResult<ExpandOutcome> {
        let ticket = self.begin_expand(pane, frontier)?;
        let fetched = ticket.fetch().await;
        self.finish_expand(ticket, fetched)
    }

    /// Settles an expansion that was held back by the pane ceiling.
    pub fn resolve_capacity(
        &mut self,
        pane: &PaneId,
        pending: PendingExpansion,
        decision: CapacityDecision,
    ) -> SessionResult<Resolution> {
        match decision {
            CapacityDecision::Cancel => {
                tracing::info!(pane = %pane, "expansion cancelled at capacity");
                Ok(Resolution::Cancelled)
            }
            CapacityDecision::ProceedAnyway => {
                let p = self.panes.get_mut(pane)?;
                let delta = IncrementalExplorer::apply(&mut p.store, pending);
                self.after_growth(pane, &delta.nodes)?;
                Ok(Resolution::Merged(delta))
            }
            CapacityDecision::RedirectToNewPane => {
                let source = self.panes.get(pane)?;
                let seeds: Vec<Node> = pending
                    .frontier
                    .iter()
                    .filter_map(|id| source.store.node(id).cloned())
                    .collect();
                let request = SpawnRequest::seeded(GraphPayload::new(seeds, Vec::new()), source.view.clone())
                    .from_pane(pane.clone(), pending.frontier.clone());
                let new = self.panes.spawn(request)?;
                let p = self.panes.get_mut(&new)?;
                let delta = IncrementalExplorer::apply(&mut p.store, pending);
                self.after_growth(&new, &delta.nodes)?;
                Ok(Resolution::Redirected { pane: new, delta })
            }
        }
    }

    /// Opens a pane from `from` for `nodes` and expands it, unless a live
    /// pane was already spawned for any of them and `force` is off.
    pub async fn explore_in_new_pane(
        &mut self,
        from: &PaneId,
        nodes: &[NodeId],
        force: bool,
    ) -> SessionResult<NewPane> {
        if !force {
            if let Some(existing) = self.panes.find_explored(nodes) {
                return Ok(NewPane::AlreadyExplored(existing.clone()));
            }
        }
        let source = self.panes.get(from)?;
        let seeds: Vec<Node> = nodes
            .iter()
            .filter_map(|id| source.store.node(id).cloned())
            .collect();
        let request = SpawnRequest::seeded(GraphPayload::new(seeds, Vec::new()), source.view.clone())
            .from_pane(from.clone(), nodes.to_vec());
        let id = self.panes.spawn(request)?;
        self.after_growth(&id, &[])?;
        if let ExpandOutcome::CapacityExceeded(pending) = self.expand(&id, nodes).await? {
            // a pane opened for these nodes takes their neighbourhood regardless
            self.resolve_capacity(&id, pending, CapacityDecision::ProceedAnyway)?;
        }
        Ok(NewPane::Spawned(id))
    }

    /// Starts a guided expansion following the pane's scheduler policy.
    /// Drive it with [`Session::best_path_step`] and
    /// [`Session::advance_best_path`]; the session is free between steps.
    pub fn begin_best_path(
        &mut self,
        pane: &PaneId,
        sources: &[NodeId],
        max_steps: Option<usize>,
    ) -> SessionResult<BestPathRun> {
        let max_steps = max_steps.unwrap_or(self.options.best_path_max_steps);
        let p = self.panes.get(pane)?;
        p.ensure_open()?;
        Ok(BestPathRun::new(&p.store, sources, p.view.policy.as_deref(), max_steps))
    }

    /// Either a ticket for the next fetch of `run`, or its final report.
    pub fn best_path_step(&mut self, pane: &PaneId, run: &mut BestPathRun) -> SessionResult<PathStep> {
        let p = self.panes.get_mut(pane)?;
        match run.next_step(&p.store) {
            BestPathStep::Done(report) => {
                if let StopReason::Failed(e) = &report.stop {
                    self.warn(Some(pane), format!("best path halted: {e}"));
                }
                Ok(PathStep::Done(report))
            }
            BestPathStep::Fetch(collapsed) => {
                p.ensure_open()?;
                let lease = p.begin_expansion()?;
                Ok(PathStep::Fetch(ExpansionTicket {
                    pane: pane.clone(),
                    collapsed,
                    explorer: self.explorer.clone(),
                    _lease: lease,
                }))
            }
        }
    }

    /// Commits one best-path fetch and moves the run a layer down.
    pub fn advance_best_path(
        &mut self,
        run: &mut BestPathRun,
        ticket: ExpansionTicket,
        fetched: Result<GraphPayload, ExploreError>,
    ) -> SessionResult<()> {
        let ceiling = self.options.pane_node_ceiling;
        let p = self.panes.get_mut(&ticket.pane)?;
        let capacity = p.capacity(ceiling);
        let outcome = fetched.map(|payload| {
            IncrementalExplorer::commit(&mut p.store, ticket.collapsed, payload, Some(capacity))
        });
        let added = match &outcome {
            Ok(ExpandOutcome::Merged(delta)) => delta.nodes.clone(),
            _ => Vec::new(),
        };
        p.end_expansion();
        run.record(&p.store, outcome);
        tracing::debug!(pane = %ticket.pane, steps = run.steps(), added = added.len(), "best path step");
        if added.is_empty() {
            return Ok(());
        }
        self.after_growth(&ticket.pane, &added)
    }

    /// Guided multi-step expansion following the pane's scheduler policy.
    pub async fn expand_best_path(
        &mut self,
        pane: &PaneId,
        sources: &[NodeId],
        max_steps: Option<usize>,
    ) -> SessionResult<BestPathReport> {
        let mut run = self.begin_best_path(pane, sources, max_steps)?;
        loop {
            let ticket = match self.best_path_step(pane, &mut run)? {
                PathStep::Fetch(ticket) => ticket,
                PathStep::Done(report) => return Ok(report),
            };
            let fetched = ticket.fetch().await;
            self.advance_best_path(&mut run, ticket, fetched)?;
        }
    }

    /// Pulls updated attribute bags for every state of the pane.
    pub async fn refresh(&mut self, pane: &PaneId) -> SessionResult<usize> {
        let explorer = self.explorer.clone();
        let p = self.panes.get_mut(pane)?;
        let updated = match explorer.refresh(&mut p.store).await {
            Ok(n) => n,
            Err(e) => {
                self.warn(Some(pane), format!("refresh failed: {e}"));
                return Err(e.into());
            }
        };
        self.reproject(pane)?;
        Ok(updated)
    }

    // ---- marks

    pub fn mark(&mut self, ids: &[NodeId]) -> Vec<NodeId> {
        let added = self.marks.mark(ids.iter().cloned());
        if !added.is_empty() {
            self.bus.publish(BusEvent::MarksChanged {
                added: added.clone(),
                removed: Vec::new(),
            });
            self.propagate();
        }
        added
    }

    pub fn unmark(&mut self, ids: &[NodeId]) -> Vec<NodeId> {
        let removed = self.marks.unmark(ids.iter().cloned());
        if !removed.is_empty() {
            self.bus.publish(BusEvent::MarksChanged {
                added: Vec::new(),
                removed: removed.clone(),
            });
            self.propagate();
        }
        removed
    }

    /// Every pane re-derives its marked decoration from the mark set.
    pub fn propagate(&mut self) {
        self.bus.publish(BusEvent::Propagate);
        let marks = &self.marks;
        for pane in self.panes.iter_mut() {
            pane.decorations.marked = marks.decorate(&pane.store);
        }
    }

    /// Marked nodes and the actions between them, across all panes.
    pub fn strategy_export(&self) -> GraphPayload {
        export::strategy(self.panes.iter(), &self.marks)
    }

    // ---- selection and brushing

    /// Replaces the graph-view selection and records the previous one.
    pub fn select(&mut self, pane: &PaneId, ids: Vec<NodeId>) -> SessionResult<Vec<NodeId>> {
        let p = self.panes.get_mut(pane)?;
        let previous = p.set_selection(ids);
        if previous.as_slice() != p.selection() {
            p.history.record(previous);
        }
        Ok(p.selection().to_vec())
    }

    pub fn undo(&mut self, pane: &PaneId) -> SessionResult<bool> {
        let p = self.panes.get_mut(pane)?;
        let current = p.selection().to_vec();
        match p.history.undo(current) {
            Some(prev) => {
                p.set_selection(prev);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn redo(&mut self, pane: &PaneId) -> SessionResult<bool> {
        let p = self.panes.get_mut(pane)?;
        let current = p.selection().to_vec();
        match p.history.redo(current) {
            Some(next) => {
                p.set_selection(next);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Selects the pane's states carrying an atomic proposition such as
    /// `init`, `deadlock` or `finished`.
    pub fn select_by_proposition(&mut self, pane: &PaneId, ap: &str) -> SessionResult<Vec<NodeId>> {
        let ids: Vec<NodeId> = self
            .panes
            .get(pane)?
            .store
            .nodes()
            .filter(|n| n.is_state() && n.has_proposition(ap))
            .map(|n| n.id.clone())
            .collect();
        self.select(pane, ids)
    }

    pub fn select_initial(&mut self, pane: &PaneId) -> SessionResult<Vec<NodeId>> {
        self.select_by_proposition(pane, names::AP_INIT)
    }

    pub fn select_deadlocks(&mut self, pane: &PaneId) -> SessionResult<Vec<NodeId>> {
        self.select_by_proposition(pane, names::AP_DEADLOCK)
    }

    pub fn select_finished(&mut self, pane: &PaneId) -> SessionResult<Vec<NodeId>> {
        self.select_by_proposition(pane, names::AP_END)
    }

    /// Broadcasts a recomputed brush selection and applies it to the source
    /// pane's graph view when that pane has auto-sync on.
    fn publish_selection(&mut self, linked: LinkedSelection) -> SessionResult<()> {
        self.bus.publish(BusEvent::LinkedSelection(linked.clone()));
        self.sync_selection(&linked)?;
        Ok(())
    }

    /// Applies an inspector selection to its own pane's graph view if that
    /// pane has auto-sync enabled. Other panes are never touched.
    pub fn sync_selection(&mut self, linked: &LinkedSelection) -> SessionResult<bool> {
        let auto_sync = self.panes.get(&linked.pane)?.view.auto_sync;
        if !auto_sync {
            return Ok(false);
        }
        self.select(&linked.pane, linked.ids())?;
        Ok(true)
    }

    pub fn brush(
        &mut self,
        pane: &PaneId,
        dimension: &str,
        constraint: Option<Constraint>,
    ) -> SessionResult<LinkedSelection> {
        let linked = self.panes.get_mut(pane)?.brush.brush(dimension, constraint);
        self.publish_selection(linked.clone())?;
        Ok(linked)
    }

    /// Brushing while dragging: recomputes at most once per window.
    pub fn brush_coalesced(
        &mut self,
        pane: &PaneId,
        dimension: &str,
        constraint: Option<Constraint>,
        now: Instant,
    ) -> SessionResult<Option<LinkedSelection>> {
        let linked = self
            .panes
            .get_mut(pane)?
            .brush
            .brush_coalesced(dimension, constraint, now);
        if let Some(linked) = &linked {
            self.publish_selection(linked.clone())?;
        }
        Ok(linked)
    }

    /// Runs pending coalesced recomputes whose window has passed.
    pub fn poll_brushes(&mut self, now: Instant) -> SessionResult<usize> {
        let ready: Vec<LinkedSelection> = self
            .panes
            .iter_mut()
            .filter_map(|p| p.brush.poll(now))
            .collect();
        let count = ready.len();
        for linked in ready {
            self.publish_selection(linked)?;
        }
        Ok(count)
    }

    pub fn select_extreme(
        &mut self,
        pane: &PaneId,
        dimension: &str,
        which: Extreme,
    ) -> SessionResult<Option<LinkedSelection>> {
        let linked = self
            .panes
            .get_mut(pane)?
            .brush
            .select_extreme(dimension, which);
        if let Some(linked) = &linked {
            self.publish_selection(linked.clone())?;
        }
        Ok(linked)
    }

    pub fn brush_engine(&mut self, pane: &PaneId) -> SessionResult<&mut BrushEngine> {
        Ok(&mut self.panes.get_mut(pane)?.brush)
    }

    // ---- view settings

    pub fn set_mode(&mut self, pane: &PaneId, mode: DisplayMode) -> SessionResult<LinkedSelection> {
        self.panes.get_mut(pane)?.view.mode = mode;
        self.reproject(pane)
    }

    pub fn set_policy(&mut self, pane: &PaneId, policy: Option<String>) -> SessionResult<()> {
        self.panes.get_mut(pane)?.view.policy = policy;
        Ok(())
    }

    pub fn set_details(&mut self, pane: &PaneId, details: DetailSelection) -> SessionResult<LinkedSelection> {
        self.panes.get_mut(pane)?.view.details = details;
        self.reproject(pane)
    }

    pub fn set_auto_sync(&mut self, pane: &PaneId, on: bool) -> SessionResult<()> {
        self.panes.get_mut(pane)?.view.auto_sync = on;
        Ok(())
    }

    // ---- recurrence

    fn apply_recurrence(&mut self, report: &Recurrence) {
        for pane in self.panes.iter_mut() {
            pane.decorations.recurring = report.for_pane(&pane.id);
        }
        self.bus.publish(BusEvent::RecurringUpdated {
            ids: report.ids(),
            panes: report.panes(),
        });
    }

    /// Full scan for ids present in more than one live pane. Found ids stay
    /// watched as panes keep growing.
    pub fn detect_recurrence(&mut self) -> Recurrence {
        let report = recurrence::detect(self.panes.iter().map(|p| (&p.id, &p.ever_added)));
        self.watch.watch(report.ids());
        self.apply_recurrence(&report);
        self.bus
            .publish(BusEvent::Registry(RegistryMsg::DuplicatePaneIds { ids: report.panes() }));
        tracing::info!(ids = report.by_id.len(), "recurrence scanned");
        report
    }

    /// Starts watching `ids` and reports their current recurrence.
    pub fn watch_recurrence(&mut self, ids: &[NodeId]) -> Recurrence {
        self.watch.watch(ids.iter().cloned());
        self.recompute_watched();
        recurrence::detect_ids(
            self.panes.iter().map(|p| (&p.id, &p.ever_added)),
            self.watch.watched(),
        )
    }

    fn recompute_watched(&mut self) {
        if self.watch.is_empty() {
            return;
        }
        let report = recurrence::detect_ids(
            self.panes.iter().map(|p| (&p.id, &p.ever_added)),
            self.watch.watched(),
        );
        self.apply_recurrence(&report);
    }

    pub fn clear_recurrence(&mut self) {
        self.watch.clear();
        for pane in self.panes.iter_mut() {
            pane.decorations.recurring.clear();
        }
        self.bus
            .publish(BusEvent::Registry(RegistryMsg::ResetPaneNodeMarkings));
    }

    // ---- pane lifecycle

    pub fn destroy(&mut self, pane: &PaneId, cascade: bool) -> SessionResult<Vec<PaneId>> {
        let removed = self.panes.destroy(pane, cascade, true)?;
        self.recompute_watched();
        Ok(removed)
    }

    pub fn merge(&mut self, panes: &[PaneId], keep: bool) -> SessionResult<PaneId> {
        let id = self.panes.merge(panes, keep)?;
        self.after_growth(&id, &[])?;
        Ok(id)
    }

    pub fn duplicate(&mut self, pane: &PaneId) -> SessionResult<PaneId> {
        let id = self.panes.duplicate(pane)?;
        self.after_growth(&id, &[])?;
        Ok(id)
    }

    pub fn duplicate_many(&mut self, panes: &[PaneId]) -> SessionResult<Vec<PaneId>> {
        let ids = self.panes.duplicate_many(panes)?;
        for id in &ids {
            self.after_growth(id, &[])?;
        }
        Ok(ids)
    }

    pub fn pane_manager(&mut self) -> &mut PaneManager {
        &mut self.panes
    }

    /// Handles messages the overview sends back.
    pub fn on_overview(&mut self, msg: RegistryMsg) -> SessionResult<()> {
        match msg {
            RegistryMsg::ActivePane { id } => self.panes.highlight(&id)?,
            other => tracing::debug!(msg = ?other, "ignoring overview message"),
        }
        Ok(())
    }

    // ---- export / import

    pub fn export_documents(&self, panes: &[PaneId], selection_only: bool) -> SessionResult<Vec<PaneDocument>> {
        panes
            .iter()
            .map(|id| -> SessionResult<PaneDocument> {
                let p = self.panes.get(id)?;
                let selection = selection_only.then(|| p.selection());
                Ok(PaneDocument::from_pane(p, selection))
            })
            .collect()
    }

    pub fn export_to(&self, path: &Path, panes: &[PaneId], selection_only: bool) -> SessionResult<()> {
        let docs = self.export_documents(panes, selection_only)?;
        export::write_file(path, &docs)?;
        Ok(())
    }

    /// Opens one pane per document. Attributes a document references but
    /// its nodes lack are logged and left empty.
    pub fn import(&mut self, docs: Vec<PaneDocument>) -> SessionResult<Vec<PaneId>> {
        let mut opened = Vec::new();
        for doc in docs {
            let mismatches = doc.schema_mismatches();
            if !mismatches.is_empty() {
                self.warn(
                    None,
                    format!("document {} references absent attributes: {}", doc.pane, mismatches.join(", ")),
                );
            }
            let payload = doc.payload();
            let request = SpawnRequest {
                spawner: None,
                seed: payload,
                spawner_nodes: doc.spawner_nodes,
                insert: InsertPolicy::AtEnd,
                view: doc.view,
            };
            let id = self.panes.spawn(request)?;
            self.panes.get_mut(&id)?.brush.replace_state(doc.brush);
            self.after_growth(&id, &[])?;
            opened.push(id);
        }
        self.started = true;
        Ok(opened)
    }

    pub fn import_from(&mut self, path: &Path) -> SessionResult<Vec<PaneId>> {
        let docs = export::read_file(path)?;
        self.import(docs)
    }

    pub fn summary(&self) -> Vec<PaneSummary> {
        self.panes
            .iter()
            .map(|p| PaneSummary {
                id: p.id.clone(),
                color: p.color.clone(),
                state: match p.state() {
                    ExplorationState::Collapsed => "collapsed",
                    ExplorationState::Seeded => "seeded",
                    ExplorationState::Expanding => "expanding",
                    ExplorationState::Closed => "closed",
                }
                .to_string(),
                nodes: p.store.node_count(),
                edges: p.store.edge_count(),
                selected: p.selection().len(),
                brushed: p.brush.selected().len(),
                marked: p.decorations.marked.len(),
                recurring: p.decorations.recurring.len(),
                spawners: p.spawners.to_vec(),
                spawned: p.spawned.iter().cloned().collect(),
            })
            .collect()
    }

    /// Requires a started session.
    pub fn primary(&self) -> SessionResult<PaneId> {
        self.require_started()?;
        self.panes.primary().cloned().ok_or(SessionError::NotStarted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaneError;
    use crate::sync::Topic;
    use crate::testing::{branching_graph, chain_graph, MemoryBackend};
    use statespace_core::{AttrValue, Edge};
    use tempfile::tempdir;

    fn session_over(graph: GraphPayload) -> (Session, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new(graph));
        let session = Session::init(
            backend.clone(),
            SessionOptions {
                brush_window: Duration::ZERO,
                ..SessionOptions::default()
            },
        );
        (session, backend)
    }

    fn ids(raw: &[&str]) -> Vec<NodeId> {
        raw.iter().map(|s| NodeId::from(*s)).collect()
    }

    fn node_ids(session: &Session, pane: &PaneId) -> Vec<String> {
        let mut out: Vec<String> = session
            .panes()
            .get(pane)
            .expect("pane")
            .store
            .node_ids()
            .map(|n| n.0.clone())
            .collect();
        out.sort();
        out
    }

    #[tokio::test]
    async fn expansion_example() {
        let (mut s, _) = session_over(GraphPayload::new(
            vec![Node::state("s0"), Node::state("s1"), Node::action("t1")],
            vec![Edge::new("s0", "go", "t1"), Edge::new("t1", "go", "s1")],
        ));
        let p0 = s.start().await.expect("start");
        assert_eq!(node_ids(&s, &p0), vec!["s0"]);

        let first = s.expand(&p0, &ids(&["s0"])).await.expect("expand");
        assert_eq!(first.delta().map(|d| d.nodes.len()), Some(2));
        assert_eq!(node_ids(&s, &p0), vec!["s0", "s1", "t1"]);
        assert_eq!(s.panes().get(&p0).expect("pane").store.edge_count(), 2);

        let again = s.expand(&p0, &ids(&["s0"])).await.expect("expand");
        assert_eq!(again.delta().map(Delta::is_empty), Some(true));
        assert_eq!(s.panes().get(&p0).expect("pane").state(), ExplorationState::Seeded);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_store_and_warns() {
        let (mut s, backend) = session_over(chain_graph(3));
        let p0 = s.start().await.expect("start");
        let warnings = s.bus().subscribe(&[Topic::Warnings]);

        backend.fail_next();
        let err = s.expand(&p0, &ids(&["0"])).await.expect_err("fails");
        assert!(matches!(err, SessionError::Explore(ExploreError::Network(_))));
        assert_eq!(node_ids(&s, &p0), vec!["0"]);
        assert_eq!(s.panes().get(&p0).expect("pane").state(), ExplorationState::Seeded);
        assert_eq!(warnings.drain().len(), 1);
    }

    #[tokio::test]
    async fn expansions_are_serialized_per_pane() {
        let (mut s, _) = session_over(chain_graph(3));
        let p0 = s.start().await.expect("start");

        let ticket = s.begin_expand(&p0, &ids(&["0"])).expect("begin");
        let second = s.begin_expand(&p0, &ids(&["0"]));
        assert!(matches!(second, Err(SessionError::Explore(ExploreError::Busy(_)))));

        let fetched = ticket.fetch().await;
        s.finish_expand(ticket, fetched).expect("finish");
        assert!(s.begin_expand(&p0, &ids(&["1"])).is_ok());
    }

    fn state_of(session: &Session, pane: &PaneId) -> ExplorationState {
        session.panes().get(pane).expect("pane").state()
    }

    #[tokio::test]
    async fn abandoned_expansions_free_the_pane() {
        let (mut s, backend) = session_over(chain_graph(3));
        let p0 = s.start().await.expect("start");

        let ticket = s.begin_expand(&p0, &ids(&["0"])).expect("begin");
        assert_eq!(state_of(&s, &p0), ExplorationState::Expanding);
        drop(ticket);
        assert_eq!(state_of(&s, &p0), ExplorationState::Seeded);

        backend.stall_next();
        let cancelled = tokio::time::timeout(Duration::from_millis(20), s.expand(&p0, &ids(&["0"]))).await;
        assert!(cancelled.is_err());
        assert_eq!(state_of(&s, &p0), ExplorationState::Seeded);
        assert_eq!(node_ids(&s, &p0), vec!["0"]);

        s.expand(&p0, &ids(&["0"])).await.expect("retry");
        assert_eq!(node_ids(&s, &p0), vec!["0", "1", "t0"]);
    }

    #[tokio::test]
    async fn auto_sync_follows_pane_growth() {
        let x = |v: f64| AttrValue::Number(v);
        let (mut s, _) = session_over(GraphPayload::new(
            vec![
                Node::state("s0").with_attr(names::VARIABLES, "x", x(1.0)),
                Node::action("t1"),
                Node::state("s1").with_attr(names::VARIABLES, "x", x(5.0)),
                Node::state("s2").with_attr(names::VARIABLES, "x", x(20.0)),
            ],
            vec![
                Edge::new("s0", "go", "t1"),
                Edge::new("t1", "go", "s1"),
                Edge::new("t1", "go", "s2"),
            ],
        ));
        let p0 = s.start().await.expect("start");
        s.set_auto_sync(&p0, true).expect("sync");
        let linked = s.brush(&p0, "x", Some(Constraint::range(2.0, 10.0))).expect("brush");
        assert!(linked.ids().is_empty());

        s.expand(&p0, &ids(&["s0"])).await.expect("expand");
        let pane = s.panes().get(&p0).expect("pane");
        assert_eq!(pane.brush.selected(), ids(&["s1"]).as_slice());
        assert_eq!(pane.selection(), pane.brush.selected());
    }

    #[tokio::test]
    async fn best_path_releases_the_session_between_fetches() {
        let (mut s, _) = session_over(chain_graph(5));
        let p0 = s.start().await.expect("start");
        s.expand(&p0, &ids(&["0"])).await.expect("expand");
        let p1 = s.duplicate(&p0).expect("duplicate");

        let mut run = s.begin_best_path(&p0, &ids(&["1"]), Some(2)).expect("begin");
        let PathStep::Fetch(ticket) = s.best_path_step(&p0, &mut run).expect("step") else {
            panic!("expected a fetch");
        };
        assert_eq!(state_of(&s, &p0), ExplorationState::Expanding);
        assert!(matches!(
            s.begin_expand(&p0, &ids(&["0"])),
            Err(SessionError::Explore(ExploreError::Busy(_)))
        ));
        // other panes stay usable while the fetch is out
        s.expand(&p1, &ids(&["1"])).await.expect("other pane");
        s.mark(&ids(&["1"]));

        let fetched = ticket.fetch().await;
        s.advance_best_path(&mut run, ticket, fetched).expect("advance");
        assert_eq!(run.frontier(), ids(&["2"]).as_slice());
        assert_eq!(state_of(&s, &p0), ExplorationState::Seeded);

        let PathStep::Fetch(ticket) = s.best_path_step(&p0, &mut run).expect("step") else {
            panic!("expected a fetch");
        };
        drop(ticket);
        assert_eq!(state_of(&s, &p0), ExplorationState::Seeded);

        let report = s.expand_best_path(&p0, &ids(&["2"]), Some(1)).await.expect("best path");
        assert_eq!(report.stop, StopReason::StepLimit);
        assert_eq!(report.frontier, ids(&["3"]));
        assert!(s.panes().get(&p0).expect("pane").ever_added.contains(&NodeId::from("3")));
    }

    #[tokio::test]
    async fn capacity_offers_redirect() {
        let (mut s, _) = session_over(chain_graph(4));
        s.options.pane_node_ceiling = 1;
        let p0 = s.start().await.expect("start");

        let outcome = s.expand(&p0, &ids(&["0"])).await.expect("expand");
        let ExpandOutcome::CapacityExceeded(pending) = outcome else {
            panic!("expected a capacity decision");
        };
        assert_eq!(node_ids(&s, &p0), vec!["0"]);

        let resolution = s
            .resolve_capacity(&p0, pending, CapacityDecision::RedirectToNewPane)
            .expect("resolve");
        let Resolution::Redirected { pane, delta } = resolution else {
            panic!("expected a redirect");
        };
        assert_eq!(delta.nodes.len(), 2);
        assert_eq!(node_ids(&s, &pane), vec!["0", "1", "t0"]);
        assert_eq!(s.panes().get(&pane).expect("pane").spawners.as_slice(), &[p0.clone()]);
        assert_eq!(node_ids(&s, &p0), vec!["0"]);
    }

    #[tokio::test]
    async fn marking_propagates_into_new_panes() {
        let (mut s, _) = session_over(chain_graph(3));
        let p0 = s.start().await.expect("start");
        s.expand(&p0, &ids(&["0"])).await.expect("expand");

        assert_eq!(s.mark(&ids(&["1"])), ids(&["1"]));
        assert!(s.panes().get(&p0).expect("pane").is_marked(&NodeId::from("1")));

        let spawned = s
            .explore_in_new_pane(&p0, &ids(&["1"]), false)
            .await
            .expect("explore");
        let NewPane::Spawned(p1) = spawned else {
            panic!("expected a new pane");
        };
        assert!(s.panes().get(&p1).expect("pane").is_marked(&NodeId::from("1")));

        s.unmark(&ids(&["1"]));
        assert!(!s.panes().get(&p1).expect("pane").is_marked(&NodeId::from("1")));

        let again = s
            .explore_in_new_pane(&p0, &ids(&["1"]), false)
            .await
            .expect("explore");
        assert_eq!(again, NewPane::AlreadyExplored(p1));
    }

    #[tokio::test]
    async fn marks_survive_pane_destruction() {
        let (mut s, _) = session_over(chain_graph(3));
        let p0 = s.start().await.expect("start");
        s.expand(&p0, &ids(&["0"])).await.expect("expand");
        let NewPane::Spawned(p1) = s
            .explore_in_new_pane(&p0, &ids(&["1"]), false)
            .await
            .expect("explore")
        else {
            panic!("expected a new pane");
        };
        s.mark(&ids(&["2"]));
        s.destroy(&p1, true).expect("destroy");
        assert!(s.marks().contains(&NodeId::from("2")));
    }

    #[tokio::test]
    async fn recurrence_tracks_growing_panes() {
        let (mut s, _) = session_over(chain_graph(4));
        let p0 = s.start().await.expect("start");
        s.expand(&p0, &ids(&["0"])).await.expect("expand");
        let NewPane::Spawned(p1) = s
            .explore_in_new_pane(&p0, &ids(&["1"]), false)
            .await
            .expect("explore")
        else {
            panic!("expected a new pane");
        };

        let report = s.detect_recurrence();
        assert_eq!(report.ids(), ids(&["1"]));
        assert!(s.panes().get(&p0).expect("pane").is_recurring(&NodeId::from("1")));
        assert!(s.panes().get(&p1).expect("pane").is_recurring(&NodeId::from("1")));

        s.watch_recurrence(&ids(&["2"]));
        assert!(!s.panes().get(&p0).expect("pane").is_recurring(&NodeId::from("2")));
        s.expand(&p0, &ids(&["1"])).await.expect("expand");
        assert!(s.panes().get(&p0).expect("pane").is_recurring(&NodeId::from("2")));
        assert!(s.panes().get(&p1).expect("pane").is_recurring(&NodeId::from("2")));

        s.clear_recurrence();
        assert!(!s.panes().get(&p1).expect("pane").is_recurring(&NodeId::from("1")));
    }

    #[tokio::test]
    async fn best_path_follows_the_pane_policy() {
        let (mut s, _) = session_over(branching_graph());
        let p0 = s.start().await.expect("start");
        s.set_policy(&p0, Some("Pmax".to_string())).expect("policy");

        let report = s
            .expand_best_path(&p0, &ids(&["0"]), Some(2))
            .await
            .expect("best path");
        assert_eq!(report.stop, StopReason::StepLimit);
        assert_eq!(report.frontier, ids(&["b1"]));
        assert!(s.panes().get(&p0).expect("pane").ever_added.contains(&NodeId::from("b1")));
    }

    fn document(pane: &str, graph: &GraphPayload) -> PaneDocument {
        PaneDocument {
            version: export::FORMAT_VERSION,
            pane: PaneId::from(pane),
            spawners: Vec::new(),
            spawner_nodes: Vec::new(),
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
            view: ViewState::default(),
            brush: Default::default(),
        }
    }

    #[tokio::test]
    async fn auto_sync_applies_brush_to_own_pane_only() {
        let graph = GraphPayload::new(
            [1.0, 3.0, 4.0, 6.0]
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    Node::state(&format!("s{i}")).with_attr(names::REWARDS, "reward", AttrValue::Number(*r))
                })
                .collect(),
            Vec::new(),
        );
        let (mut s, _) = session_over(GraphPayload::default());
        let opened = s
            .import(vec![document("left", &graph), document("right", &graph)])
            .expect("import");
        let (left, right) = (&opened[0], &opened[1]);

        s.set_auto_sync(left, true).expect("sync");
        let linked = s
            .brush(left, "reward", Some(Constraint::range(2.0, 5.0)))
            .expect("brush");
        assert_eq!(linked.ids(), ids(&["s1", "s2"]));
        assert_eq!(s.panes().get(left).expect("pane").selection(), ids(&["s1", "s2"]).as_slice());
        assert!(s.panes().get(right).expect("pane").selection().is_empty());

        assert!(s.undo(left).expect("undo"));
        assert!(s.panes().get(left).expect("pane").selection().is_empty());
        assert!(s.redo(left).expect("redo"));
        assert_eq!(s.panes().get(left).expect("pane").selection().len(), 2);
    }

    #[tokio::test]
    async fn import_reports_absent_attributes() {
        let (mut s, _) = session_over(GraphPayload::default());
        let warnings = s.bus().subscribe(&[Topic::Warnings]);
        let mut doc = document("stale", &chain_graph(2));
        doc.brush
            .constraints
            .insert("reward".to_string(), Constraint::range(0.0, 1.0));

        let opened = s.import(vec![doc]).expect("import");
        assert_eq!(opened.len(), 1);
        assert_eq!(warnings.drain().len(), 1);
        assert_eq!(s.panes().get(&opened[0]).expect("pane").store.node_count(), 3);
    }

    #[tokio::test]
    async fn merge_and_export_round_trip() {
        let (mut s, _) = session_over(chain_graph(4));
        let p0 = s.start().await.expect("start");
        s.expand(&p0, &ids(&["0"])).await.expect("expand");
        let NewPane::Spawned(a) = s.explore_in_new_pane(&p0, &ids(&["1"]), false).await.expect("a") else {
            panic!("expected a new pane");
        };
        let b = s.duplicate(&a).expect("duplicate");
        let merged = s.merge(&[a.clone(), b.clone()], false).expect("merge");
        assert_eq!(node_ids(&s, &merged), vec!["1", "2", "t1"]);
        assert!(!s.panes().contains(&a));
        assert!(!s.panes().contains(&b));

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("all.zip");
        s.export_to(&path, &[p0.clone(), merged.clone()], false).expect("export");

        s.teardown();
        assert!(matches!(s.primary(), Err(SessionError::NotStarted)));
        let opened = s.import_from(&path).expect("import");
        assert_eq!(opened.len(), 2);
        assert_eq!(node_ids(&s, &opened[1]), vec!["1", "2", "t1"]);
    }

    #[tokio::test]
    async fn primary_pane_is_protected() {
        let (mut s, _) = session_over(chain_graph(2));
        let p0 = s.start().await.expect("start");
        assert!(matches!(
            s.destroy(&p0, true),
            Err(SessionError::Pane(PaneError::Primary(_)))
        ));
    }

    #[tokio::test]
    async fn proposition_shortcuts_select_states() {
        let (mut s, _) = session_over(chain_graph(2));
        let p0 = s.start().await.expect("start");
        s.expand(&p0, &ids(&["0"])).await.expect("expand");
        assert_eq!(s.select_finished(&p0).expect("select"), ids(&["1"]));
        assert!(s.select_deadlocks(&p0).expect("select").is_empty());
    }
}
