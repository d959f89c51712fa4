//! Live pane table, spawner lineage and layout operations.

use smallvec::SmallVec;
use statespace_core::{GraphPayload, NodeId, PaneId, RegistryMsg};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Weak;
use std::time::Duration;

use super::{Decorations, ExplorationState, Geometry, History, InsertPolicy, Pane, ViewState};
use crate::brush::{BrushEngine, BrushState};
use crate::error::PaneError;
use crate::graph::GraphStore;
use crate::sync::{BusEvent, SyncBus};
use crate::util::ids::{pane_color, PaneIds};

/// Everything needed to open a pane.
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    pub spawner: Option<PaneId>,
    pub seed: GraphPayload,
    /// Node ids the pane is spawned to explore.
    pub spawner_nodes: Vec<NodeId>,
    pub insert: InsertPolicy,
    pub view: ViewState,
}

impl SpawnRequest {
    pub fn seeded(seed: GraphPayload, view: ViewState) -> Self {
        Self {
            insert: view.insert_policy,
            seed,
            view,
            ..Self::default()
        }
    }

    pub fn from_pane(mut self, spawner: PaneId, nodes: Vec<NodeId>) -> Self {
        self.spawner = Some(spawner);
        self.spawner_nodes = nodes;
        self
    }
}

pub struct PaneManager {
    panes: HashMap<PaneId, Pane>,
    /// Display order.
    order: Vec<PaneId>,
    /// Creation order, oldest first.
    created: Vec<PaneId>,
    primary: Option<PaneId>,
    active: Option<PaneId>,
    ids: PaneIds,
    max_panes: usize,
    brush_window: Duration,
    bus: SyncBus,
}

impl PaneManager {
    pub fn new(max_panes: usize, brush_window: Duration, bus: SyncBus) -> Self {
        Self {
            panes: HashMap::new(),
            order: Vec::new(),
            created: Vec::new(),
            primary: None,
            active: None,
            ids: PaneIds::default(),
            max_panes: max_panes.max(1),
            brush_window,
            bus,
        }
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    pub fn max_panes(&self) -> usize {
        self.max_panes
    }

    pub fn primary(&self) -> Option<&PaneId> {
        self.primary.as_ref()
    }

    pub fn active(&self) -> Option<&PaneId> {
        self.active.as_ref()
    }

    pub fn contains(&self, id: &PaneId) -> bool {
        self.panes.contains_key(id)
    }

    pub fn get(&self, id: &PaneId) -> Result<&Pane, PaneError> {
        self.panes
            .get(id)
            .ok_or_else(|| PaneError::NotFound(id.clone()))
    }

    pub fn get_mut(&mut self, id: &PaneId) -> Result<&mut Pane, PaneError> {
        self.panes
            .get_mut(id)
            .ok_or_else(|| PaneError::NotFound(id.clone()))
    }

    /// Pane ids in display order.
    pub fn ids(&self) -> &[PaneId] {
        &self.order
    }

    /// Panes in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Pane> {
        self.order.iter().filter_map(|id| self.panes.get(id))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pane> {
        self.panes.values_mut()
    }

    pub fn activate(&mut self, id: &PaneId) -> Result<(), PaneError> {
        self.get(id)?;
        self.set_active(Some(id.clone()));
        Ok(())
    }

    fn set_active(&mut self, id: Option<PaneId>) {
        if self.active == id {
            return;
        }
        self.active = id;
        if let Some(id) = &self.active {
            self.bus
                .publish(BusEvent::Registry(RegistryMsg::ActivePane { id: id.clone() }));
        }
    }

    /// First pane in display order already spawned to explore any of `nodes`.
    pub fn find_explored(&self, nodes: &[NodeId]) -> Option<&PaneId> {
        self.iter()
            .find(|p| p.spawner_nodes.iter().any(|n| nodes.contains(n)))
            .map(|p| &p.id)
    }

    fn build(&self, id: PaneId, view: ViewState, brush: BrushState, store: GraphStore) -> Pane {
        let mut pane = Pane {
            brush: BrushEngine::with_state(id.clone(), brush, self.brush_window),
            id,
            color: pane_color(self.panes.len()),
            geometry: Geometry::default(),
            store,
            spawners: SmallVec::new(),
            spawned: BTreeSet::new(),
            spawner_nodes: Vec::new(),
            ever_added: HashSet::new(),
            view,
            history: History::default(),
            decorations: Decorations::default(),
            selection: Vec::new(),
            state: ExplorationState::Collapsed,
            lease: Weak::new(),
        };
        pane.ever_added.extend(pane.store.node_ids().cloned());
        pane.settle();
        pane
    }

    /// Makes `base` unique among live panes.
    fn unique(&self, base: PaneId) -> PaneId {
        let mut candidate = base.clone();
        let mut n = 1;
        while self.panes.contains_key(&candidate) {
            n += 1;
            candidate = PaneId(format!("{base}-{n}"));
        }
        candidate
    }

    /// Evicts the oldest non-primary panes until one more pane fits.
    fn make_room(&mut self, protected: &[PaneId]) {
        while self.panes.len() >= self.max_panes {
            let victim = self
                .created
                .iter()
                .find(|id| Some(*id) != self.primary.as_ref() && !protected.contains(*id))
                .cloned();
            let Some(victim) = victim else {
                tracing::warn!(
                    live = self.panes.len(),
                    max = self.max_panes,
                    "pane limit reached but nothing can be evicted"
                );
                break;
            };
            tracing::info!(pane = %victim, "evicting oldest pane");
            self.remove(vec![victim], false);
        }
    }

    fn place(&mut self, id: &PaneId, after: Option<&PaneId>, insert: InsertPolicy) {
        let position = match (insert, after) {
            (InsertPolicy::AfterSpawner, Some(after)) => {
                self.order.iter().position(|p| p == after).map(|i| i + 1)
            }
            _ => None,
        };
        match position {
            Some(i) => self.order.insert(i, id.clone()),
            None => self.order.push(id.clone()),
        }
        self.created.push(id.clone());
    }

    fn link(&mut self, child: &PaneId) {
        let spawners = match self.panes.get(child) {
            Some(p) => p.spawners.clone(),
            None => return,
        };
        for spawner in &spawners {
            if let Some(parent) = self.panes.get_mut(spawner) {
                parent.spawned.insert(child.clone());
            }
        }
    }

    fn announce(&self, id: &PaneId) {
        let Some(pane) = self.panes.get(id) else {
            return;
        };
        self.bus.publish(BusEvent::Registry(RegistryMsg::PaneAdded {
            id: pane.id.clone(),
            color: pane.color.clone(),
            node_ids: pane.store.node_ids().cloned().collect(),
            spawner_ids: pane.spawners.to_vec(),
            spawner_node_ids: pane.spawner_nodes.clone(),
        }));
    }

    fn relayout(&self, id: &PaneId) {
        self.bus.publish(BusEvent::Relayout { pane: id.clone() });
    }

    /// Opens a pane. The first pane of the session becomes the primary one.
    pub fn spawn(&mut self, request: SpawnRequest) -> Result<PaneId, PaneError> {
        if let Some(spawner) = &request.spawner {
            self.get(spawner)?;
        }
        let id = if self.primary.is_none() {
            self.ids.primary()
        } else {
            let protected: Vec<PaneId> = request.spawner.iter().cloned().collect();
            self.make_room(&protected);
            let fresh = self.ids.spawned();
            self.unique(fresh)
        };

        let SpawnRequest {
            spawner,
            seed,
            spawner_nodes,
            insert,
            view,
        } = request;
        let mut store = GraphStore::new();
        store.add(seed.nodes, seed.edges);
        let mut pane = self.build(id.clone(), view, BrushState::default(), store);
        pane.spawner_nodes = spawner_nodes;
        if let Some(spawner) = &spawner {
            pane.spawners.push(spawner.clone());
        }

        tracing::info!(
            pane = %id,
            spawner = ?spawner,
            nodes = pane.store.node_count(),
            "spawned pane"
        );
        self.panes.insert(id.clone(), pane);
        self.link(&id);
        self.place(&id, spawner.as_ref(), insert);
        if self.primary.is_none() {
            self.primary = Some(id.clone());
        }
        self.announce(&id);
        self.set_active(Some(id.clone()));
        Ok(id)
    }

    /// Panes reachable from `root` through spawned links, `root` first.
    pub fn descendants(&self, root: &PaneId) -> Vec<PaneId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root.clone()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(pane) = self.panes.get(&id) {
                stack.extend(pane.spawned.iter().rev().cloned());
                out.push(id);
            }
        }
        out
    }

    /// Destroys `id`, and with `cascade` everything it spawned. Returns the
    /// removed ids.
    pub fn destroy(
        &mut self,
        id: &PaneId,
        cascade: bool,
        activate: bool,
    ) -> Result<Vec<PaneId>, PaneError> {
        self.get(id)?;
        if self.primary.as_ref() == Some(id) {
            return Err(PaneError::Primary(id.clone()));
        }
        let victims: Vec<PaneId> = if cascade {
            self.descendants(id)
                .into_iter()
                .filter(|p| Some(p) != self.primary.as_ref())
                .collect()
        } else {
            vec![id.clone()]
        };
        Ok(self.remove(victims, activate))
    }

    fn remove(&mut self, victims: Vec<PaneId>, activate: bool) -> Vec<PaneId> {
        let mut removed = Vec::new();
        for victim in victims {
            let Some(mut pane) = self.panes.remove(&victim) else {
                continue;
            };
            pane.close();
            self.order.retain(|p| p != &victim);
            self.created.retain(|p| p != &victim);
            for other in self.panes.values_mut() {
                other.spawned.remove(&victim);
                other.spawners.retain(|s| s != &victim);
            }
            tracing::info!(pane = %victim, nodes = pane.store.node_count(), "destroyed pane");
            self.bus.publish(BusEvent::Registry(RegistryMsg::PaneRemoved {
                id: victim.clone(),
            }));
            removed.push(victim);
        }

        let active_gone = self
            .active
            .as_ref()
            .map_or(true, |a| !self.panes.contains_key(a));
        if active_gone {
            if activate {
                let next = self.order.last().cloned();
                self.set_active(next);
            } else {
                self.active = None;
            }
        }
        removed
    }

    /// Opens one pane holding the union of `inputs`. Without `keep`, the
    /// inputs are destroyed (non-cascading) after the merged pane has been
    /// announced, so subscribers always have a target to move to.
    ///
    /// View and brush state, including dimension order, come from the first
    /// input.
    pub fn merge(&mut self, inputs: &[PaneId], keep: bool) -> Result<PaneId, PaneError> {
        let mut unique_inputs: Vec<PaneId> = Vec::new();
        for id in inputs {
            if !unique_inputs.contains(id) {
                unique_inputs.push(id.clone());
            }
        }
        if unique_inputs.len() < 2 {
            return Err(PaneError::NotEnoughPanes(unique_inputs.len()));
        }
        for id in &unique_inputs {
            self.get(id)?;
            if !keep && self.primary.as_ref() == Some(id) {
                return Err(PaneError::Primary(id.clone()));
            }
        }

        let mut store = GraphStore::new();
        let mut spawner_nodes: Vec<NodeId> = Vec::new();
        let mut ever_added = HashSet::new();
        let mut inherited: SmallVec<[PaneId; 1]> = SmallVec::new();
        for id in &unique_inputs {
            let pane = self.get(id)?;
            store.absorb(&pane.store);
            for node in &pane.spawner_nodes {
                if !spawner_nodes.contains(node) {
                    spawner_nodes.push(node.clone());
                }
            }
            ever_added.extend(pane.ever_added.iter().cloned());
            for spawner in &pane.spawners {
                if !unique_inputs.contains(spawner) && !inherited.contains(spawner) {
                    inherited.push(spawner.clone());
                }
            }
        }
        let first = self.get(&unique_inputs[0])?;
        let (view, brush) = (first.view.clone(), first.brush.state().clone());

        // discarded inputs free their slots right after the announcement
        if keep {
            self.make_room(&unique_inputs);
        }

        let base = self.ids.merged(&unique_inputs);
        let id = self.unique(base);
        let mut pane = self.build(id.clone(), view, brush, store);
        pane.spawner_nodes = spawner_nodes;
        pane.ever_added.extend(ever_added);
        pane.spawners = if keep {
            unique_inputs.iter().cloned().collect()
        } else {
            inherited
        };

        tracing::info!(
            pane = %id,
            inputs = ?unique_inputs,
            keep,
            nodes = pane.store.node_count(),
            "merged panes"
        );
        self.panes.insert(id.clone(), pane);
        self.link(&id);
        self.place(&id, None, InsertPolicy::AtEnd);
        self.announce(&id);
        self.set_active(Some(id.clone()));
        if !keep {
            self.remove(unique_inputs, false);
        }
        Ok(id)
    }

    fn copy_of(&mut self, source: &PaneId, protected: &[PaneId]) -> Result<PaneId, PaneError> {
        self.get(source)?;
        self.make_room(protected);
        let src = self.get(source)?;
        let (store, view, brush) = (src.store.clone(), src.view.clone(), src.brush.state().clone());
        let (spawners, spawner_nodes, ever_added) = (
            src.spawners.clone(),
            src.spawner_nodes.clone(),
            src.ever_added.clone(),
        );
        let geometry = src.geometry.clone();
        let insert = src.view.insert_policy;

        let id = self.ids.duplicate(source);
        let id = self.unique(id);
        let mut pane = self.build(id.clone(), view, brush, store);
        pane.spawners = spawners;
        pane.spawner_nodes = spawner_nodes;
        pane.ever_added.extend(ever_added);
        pane.geometry = geometry;

        self.panes.insert(id.clone(), pane);
        self.link(&id);
        self.place(&id, Some(source), insert);
        Ok(id)
    }

    /// Copies a pane into the same spawner lineage. Selection history is
    /// not carried over.
    pub fn duplicate(&mut self, source: &PaneId) -> Result<PaneId, PaneError> {
        let id = self.copy_of(source, std::slice::from_ref(source))?;
        tracing::info!(pane = %id, source = %source, "duplicated pane");
        self.announce(&id);
        self.set_active(Some(id.clone()));
        Ok(id)
    }

    /// Duplicates several panes. A duplicate whose spawner was duplicated in
    /// the same batch points at that spawner's duplicate instead.
    pub fn duplicate_many(&mut self, sources: &[PaneId]) -> Result<Vec<PaneId>, PaneError> {
        for source in sources {
            self.get(source)?;
        }
        let mut copies: Vec<(PaneId, PaneId)> = Vec::new();
        for source in sources {
            if copies.iter().any(|(s, _)| s == source) {
                continue;
            }
            let mut protected: Vec<PaneId> = sources.to_vec();
            protected.extend(copies.iter().map(|(_, c)| c.clone()));
            let copy = self.copy_of(source, &protected)?;
            copies.push((source.clone(), copy));
        }

        let remap: HashMap<PaneId, PaneId> = copies.iter().cloned().collect();
        for (_, copy) in &copies {
            let old: Vec<PaneId> = match self.panes.get(copy) {
                Some(p) => p.spawners.to_vec(),
                None => continue,
            };
            let mut spawners: SmallVec<[PaneId; 1]> = SmallVec::new();
            for spawner in old {
                match remap.get(&spawner) {
                    Some(replacement) => {
                        if let Some(parent) = self.panes.get_mut(&spawner) {
                            parent.spawned.remove(copy);
                        }
                        spawners.push(replacement.clone());
                    }
                    None => spawners.push(spawner),
                }
            }
            if let Some(pane) = self.panes.get_mut(copy) {
                pane.spawners = spawners;
            }
            self.link(copy);
        }

        let ids: Vec<PaneId> = copies.into_iter().map(|(_, c)| c).collect();
        for id in &ids {
            self.announce(id);
        }
        if let Some(last) = ids.last() {
            self.set_active(Some(last.clone()));
        }
        tracing::info!(count = ids.len(), "duplicated panes");
        Ok(ids)
    }

    fn with_geometry<F>(&mut self, id: &PaneId, f: F) -> Result<(), PaneError>
    where
        F: FnOnce(&mut Geometry),
    {
        f(&mut self.get_mut(id)?.geometry);
        self.relayout(id);
        Ok(())
    }

    pub fn resize(&mut self, id: &PaneId, share: f64) -> Result<(), PaneError> {
        self.with_geometry(id, |g| g.resize(share))
    }

    pub fn collapse(&mut self, id: &PaneId) -> Result<(), PaneError> {
        self.with_geometry(id, Geometry::collapse)
    }

    pub fn expand(&mut self, id: &PaneId) -> Result<(), PaneError> {
        self.with_geometry(id, Geometry::expand)
    }

    /// Toggles one pane; if that leaves every pane collapsed, the last other
    /// pane in display order is reopened.
    pub fn toggle(&mut self, id: &PaneId) -> Result<(), PaneError> {
        self.with_geometry(id, Geometry::toggle)?;
        if self.panes.values().all(|p| p.geometry.is_collapsed()) {
            let fallback = self.order.iter().rev().find(|p| *p != id).cloned();
            if let Some(other) = fallback {
                self.expand(&other)?;
            }
        }
        Ok(())
    }

    /// Collapses every other pane and opens `id`.
    pub fn highlight(&mut self, id: &PaneId) -> Result<(), PaneError> {
        self.get(id)?;
        let others: Vec<PaneId> = self.order.iter().filter(|p| *p != id).cloned().collect();
        for other in &others {
            self.collapse(other)?;
        }
        self.expand(id)?;
        self.set_active(Some(id.clone()));
        Ok(())
    }

    pub fn set_split(&mut self, id: &PaneId, ratio: f64, total_px: f64) -> Result<(), PaneError> {
        self.with_geometry(id, |g| g.set_split(ratio, total_px))
    }

    pub fn maximize_inspector(&mut self, id: &PaneId) -> Result<(), PaneError> {
        self.with_geometry(id, Geometry::maximize_inspector)
    }

    pub fn minimize_inspector(&mut self, id: &PaneId) -> Result<(), PaneError> {
        self.with_geometry(id, Geometry::minimize_inspector)
    }

    pub fn restore_inspector(&mut self, id: &PaneId) -> Result<(), PaneError> {
        self.with_geometry(id, Geometry::restore_inspector)
    }

    /// Closes every pane, the primary one included, and resets id allocation.
    pub fn clear(&mut self) -> Vec<PaneId> {
        let all: Vec<PaneId> = self.order.iter().rev().cloned().collect();
        let removed = self.remove(all, false);
        self.primary = None;
        self.active = None;
        self.ids = PaneIds::default();
        removed
    }
}

impl std::fmt::Debug for PaneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaneManager")
            .field("order", &self.order)
            .field("primary", &self.primary)
            .field("active", &self.active)
            .field("max_panes", &self.max_panes)
            .finish()
    }
}
