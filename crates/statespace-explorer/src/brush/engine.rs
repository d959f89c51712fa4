use serde::{Deserialize, Serialize};
use statespace_core::{AttrValue, AttributeSchema, Node, NodeId, NodeKind, PaneId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::brush::details::DetailSelection;
use crate::brush::dimension::{dimension_key, Dimension, DimensionKind, Inverted, Projected, Scale};
use crate::graph::{DisplayMode, GraphStore};
use crate::util::debounce::Debounce;

/// One dimension's constraint, always in domain units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Range {
        lo: f64,
        hi: f64,
        /// Set by [`BrushEngine::select_extreme`]; keeps a zero-width range alive.
        #[serde(default)]
        pinned: bool,
    },
    Categories {
        values: BTreeSet<String>,
    },
}

impl Constraint {
    pub fn range(lo: f64, hi: f64) -> Self {
        Self::Range {
            lo: lo.min(hi),
            hi: lo.max(hi),
            pinned: false,
        }
    }

    pub fn categories<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Categories {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn admits(&self, value: &Projected) -> bool {
        match self {
            Self::Range { lo, hi, .. } => value.ordinal().is_some_and(|v| v >= *lo && v <= *hi),
            Self::Categories { values } => values.contains(&value.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    Min,
    Max,
}

/// Clonable part of the inspector: constraints keyed by dimension key
/// (`category/name`) plus the display order of dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushState {
    pub constraints: BTreeMap<String, Constraint>,
    pub order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub id: NodeId,
    pub kind: NodeKind,
    pub values: BTreeMap<String, Projected>,
}

/// Selected-node summaries of one pane, in store order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedSelection {
    pub pane: PaneId,
    pub selection: Vec<SelectionEntry>,
}

impl LinkedSelection {
    pub fn ids(&self) -> Vec<NodeId> {
        self.selection.iter().map(|e| e.id.clone()).collect()
    }
}

#[derive(Debug, Clone)]
struct Row {
    id: NodeId,
    kind: NodeKind,
    values: BTreeMap<String, Projected>,
}

/// Multivariate brushing over the nodes of one pane.
#[derive(Debug, Clone)]
pub struct BrushEngine {
    pane: PaneId,
    state: BrushState,
    dims: Vec<Dimension>,
    rows: Vec<Row>,
    selected: Vec<NodeId>,
    axis_len: f64,
    debounce: Debounce,
}

impl BrushEngine {
    pub fn new(pane: PaneId, window: Duration) -> Self {
        Self::with_state(pane, BrushState::default(), window)
    }

    pub fn with_state(pane: PaneId, state: BrushState, window: Duration) -> Self {
        Self {
            pane,
            state,
            dims: Vec::new(),
            rows: Vec::new(),
            selected: Vec::new(),
            axis_len: 1.0,
            debounce: Debounce::new(window),
        }
    }

    pub fn pane(&self) -> &PaneId {
        &self.pane
    }

    pub fn state(&self) -> &BrushState {
        &self.state
    }

    pub fn replace_state(&mut self, state: BrushState) -> LinkedSelection {
        self.state = state;
        self.qualify_keys();
        self.sync_order();
        self.recompute()
    }

    /// Rebuilds rows and dimensions from the pane's current nodes, then
    /// recomputes the selection.
    pub fn project(
        &mut self,
        store: &GraphStore,
        mode: DisplayMode,
        details: &DetailSelection,
        schema: &AttributeSchema,
    ) -> LinkedSelection {
        let mut declared: Vec<(String, String)> = Vec::new();
        let mut seen = HashSet::new();
        self.rows = store
            .nodes()
            .filter(|n| mode.admits(n.kind))
            .map(|node| {
                let mut values = BTreeMap::new();
                for (category, attrs) in &node.attributes {
                    for (name, value) in attrs {
                        if !details.is_enabled(category, name) {
                            continue;
                        }
                        let Some(p) = Projected::from_attr(value) else {
                            continue;
                        };
                        let key = dimension_key(category, name);
                        if seen.insert(key.clone()) {
                            declared.push((name.clone(), category.clone()));
                        }
                        values.insert(key, p);
                    }
                }
                Row {
                    id: node.id.clone(),
                    kind: node.kind,
                    values,
                }
            })
            .collect();

        self.dims = declared
            .into_iter()
            .map(|(name, category)| self.declare(name, category, schema))
            .collect();
        self.qualify_keys();
        self.sync_order();

        for name in self.mismatches() {
            tracing::warn!(pane = %self.pane, dimension = %name, "brush references an attribute absent from the pane");
        }
        self.recompute()
    }

    fn declare(&self, name: String, category: String, schema: &AttributeSchema) -> Dimension {
        let meta = schema.get(&category).and_then(|attrs| attrs.get(&name));
        let key = dimension_key(&category, &name);
        let observed: Vec<&Projected> = self.rows.iter().filter_map(|r| r.values.get(&key)).collect();
        let kind = meta
            .and_then(DimensionKind::from_schema)
            .unwrap_or_else(|| DimensionKind::infer(observed.iter().copied()));

        let scale = match kind {
            DimensionKind::Numeric => {
                Scale::numeric(observed.iter().filter_map(|v| v.ordinal()), meta)
            }
            DimensionKind::Boolean => Scale::boolean(),
            DimensionKind::Nominal => {
                let mut labels = Vec::new();
                let mut seen = HashSet::new();
                for v in &observed {
                    let label = v.label();
                    if seen.insert(label.clone()) {
                        labels.push(label);
                    }
                }
                Scale::nominal(labels)
            }
        };
        Dimension {
            name,
            category,
            kind,
            scale,
        }
    }

    fn sync_order(&mut self) {
        for dim in &self.dims {
            let key = dim.key();
            if !self.state.order.contains(&key) {
                self.state.order.push(key);
            }
        }
    }

    /// Rewrites bare attribute names in stored constraints and order to the
    /// full key of the one dimension carrying that name.
    fn qualify_keys(&mut self) {
        let renames: Vec<(String, String)> = self
            .state
            .constraints
            .keys()
            .chain(&self.state.order)
            .filter_map(|k| {
                let dim = self.dimension(k)?;
                let key = dim.key();
                (key != *k).then(|| (k.clone(), key))
            })
            .collect();
        for (bare, key) in renames {
            if let Some(c) = self.state.constraints.remove(&bare) {
                self.state.constraints.entry(key.clone()).or_insert(c);
            }
            if self.state.order.contains(&key) {
                self.state.order.retain(|k| *k != bare);
            } else if let Some(slot) = self.state.order.iter_mut().find(|k| **k == bare) {
                *slot = key;
            }
        }
    }

    /// Dimensions present in the pane, in display order.
    pub fn dimensions(&self) -> Vec<&Dimension> {
        let by_key: HashMap<String, &Dimension> = self.dims.iter().map(|d| (d.key(), d)).collect();
        self.state
            .order
            .iter()
            .filter_map(|key| by_key.get(key).copied())
            .collect()
    }

    /// Looks a dimension up by its `category/name` key, or by bare attribute
    /// name when exactly one category carries it.
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        if let Some(dim) = self.dims.iter().find(|d| d.key() == name) {
            return Some(dim);
        }
        let mut by_name = self.dims.iter().filter(|d| d.name == name);
        match (by_name.next(), by_name.next()) {
            (Some(dim), None) => Some(dim),
            _ => None,
        }
    }

    fn key_for(&self, name: &str) -> String {
        self.dimension(name).map_or_else(|| name.to_string(), Dimension::key)
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.state.constraints.get(&self.key_for(name))
    }

    /// Constraint keys with no matching dimension in the pane.
    pub fn mismatches(&self) -> Vec<String> {
        self.state
            .constraints
            .keys()
            .filter(|key| self.dimension(key).is_none())
            .cloned()
            .collect()
    }

    /// Sets or clears one dimension's constraint. Empty or full constraints
    /// clear the dimension.
    pub fn brush(&mut self, name: &str, constraint: Option<Constraint>) -> LinkedSelection {
        self.store_constraint(name, constraint);
        self.recompute()
    }

    pub fn clear(&mut self, name: &str) -> LinkedSelection {
        self.brush(name, None)
    }

    pub fn clear_all(&mut self) -> LinkedSelection {
        self.state.constraints.clear();
        self.recompute()
    }

    /// Stores the constraint now; recomputes at most once per window.
    pub fn brush_coalesced(
        &mut self,
        name: &str,
        constraint: Option<Constraint>,
        now: Instant,
    ) -> Option<LinkedSelection> {
        self.store_constraint(name, constraint);
        self.debounce.hit(now).then(|| self.recompute())
    }

    /// Runs a pending recompute once its window has passed.
    pub fn poll(&mut self, now: Instant) -> Option<LinkedSelection> {
        self.debounce.due(now).then(|| self.recompute())
    }

    pub fn flush(&mut self, now: Instant) -> Option<LinkedSelection> {
        self.debounce.take(now).then(|| self.recompute())
    }

    fn store_constraint(&mut self, name: &str, constraint: Option<Constraint>) {
        let key = self.key_for(name);
        match constraint.and_then(|c| self.normalize(&key, c)) {
            Some(c) => {
                self.state.constraints.insert(key, c);
            }
            None => {
                self.state.constraints.remove(&key);
            }
        }
    }

    /// Extent of the values the pane's rows hold on `key`.
    fn observed_extent(&self, key: &str) -> Option<(f64, f64)> {
        self.rows
            .iter()
            .filter_map(|r| r.values.get(key).and_then(Projected::ordinal))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
    }

    fn normalize(&self, key: &str, constraint: Constraint) -> Option<Constraint> {
        let dim = self.dimension(key);
        match constraint {
            Constraint::Range { lo, hi, pinned } => {
                if !lo.is_finite() || !hi.is_finite() {
                    return None;
                }
                let (lo, hi) = (lo.min(hi), lo.max(hi));
                if lo == hi && !pinned {
                    return None;
                }
                // full means every value the pane holds, not the axis domain
                let full = match dim.map(|d| (&d.kind, &d.scale)) {
                    Some((_, Scale::Linear { .. })) => self
                        .observed_extent(key)
                        .is_some_and(|(dlo, dhi)| lo <= dlo && hi >= dhi),
                    Some((DimensionKind::Boolean, _)) => lo <= 0.0 && hi >= 1.0,
                    _ => false,
                };
                (!full).then_some(Constraint::Range { lo, hi, pinned })
            }
            Constraint::Categories { values } => {
                if values.is_empty() {
                    return None;
                }
                let full = match dim.map(|d| &d.scale) {
                    Some(Scale::Point { values: all }) => all.iter().all(|v| values.contains(v)),
                    _ => false,
                };
                (!full).then_some(Constraint::Categories { values })
            }
        }
    }

    fn admits_row(&self, row: &Row) -> bool {
        self.state.constraints.iter().all(|(key, c)| {
            row.values.get(key).is_some_and(|v| c.admits(v))
        })
    }

    /// The conjunctive predicate applied to a raw node.
    pub fn matches(&self, node: &Node) -> bool {
        self.state.constraints.iter().all(|(key, c)| {
            node_value(node, key)
                .and_then(Projected::from_attr)
                .is_some_and(|v| c.admits(&v))
        })
    }

    fn recompute(&mut self) -> LinkedSelection {
        self.debounce.settle();
        self.selected = self
            .rows
            .iter()
            .filter(|r| self.admits_row(r))
            .map(|r| r.id.clone())
            .collect();
        tracing::trace!(pane = %self.pane, selected = self.selected.len(), "brush selection recomputed");
        self.linked_selection()
    }

    pub fn selected(&self) -> &[NodeId] {
        &self.selected
    }

    pub fn is_selected(&self, id: &NodeId) -> bool {
        self.selected.contains(id)
    }

    pub fn linked_selection(&self) -> LinkedSelection {
        let chosen: HashSet<&NodeId> = self.selected.iter().collect();
        let selection = self
            .rows
            .iter()
            .filter(|r| chosen.contains(&r.id))
            .map(|r| SelectionEntry {
                id: r.id.clone(),
                kind: r.kind,
                values: r.values.clone(),
            })
            .collect();
        LinkedSelection {
            pane: self.pane.clone(),
            selection,
        }
    }

    /// Moves a dimension in the display order. Brushes are untouched.
    pub fn reorder_dimension(&mut self, name: &str, new_index: usize) -> bool {
        let key = self.key_for(name);
        let Some(from) = self.state.order.iter().position(|k| *k == key) else {
            return false;
        };
        let entry = self.state.order.remove(from);
        let to = new_index.min(self.state.order.len());
        self.state.order.insert(to, entry);
        true
    }

    /// Replaces the dimension's constraint with a zero-width one at the
    /// observed minimum or maximum.
    pub fn select_extreme(&mut self, name: &str, which: Extreme) -> Option<LinkedSelection> {
        let dim = self.dimension(name)?;
        let key = dim.key();
        let constraint = match &dim.scale {
            Scale::Linear { .. } => {
                let values = self
                    .rows
                    .iter()
                    .filter_map(|r| r.values.get(&key).and_then(Projected::ordinal));
                let v = match which {
                    Extreme::Min => values.fold(f64::INFINITY, f64::min),
                    Extreme::Max => values.fold(f64::NEG_INFINITY, f64::max),
                };
                if !v.is_finite() {
                    return None;
                }
                Constraint::Range {
                    lo: v,
                    hi: v,
                    pinned: true,
                }
            }
            Scale::Point { values } if dim.kind == DimensionKind::Boolean => {
                let present: Vec<f64> = values
                    .iter()
                    .enumerate()
                    .filter(|(_, label)| {
                        self.rows
                            .iter()
                            .any(|r| r.values.get(&key).is_some_and(|v| v.label() == **label))
                    })
                    .map(|(i, _)| i as f64)
                    .collect();
                let v = match which {
                    Extreme::Min => present.first().copied()?,
                    Extreme::Max => present.last().copied()?,
                };
                Constraint::Range {
                    lo: v,
                    hi: v,
                    pinned: true,
                }
            }
            Scale::Point { values } => {
                let v = match which {
                    Extreme::Min => values.first()?,
                    Extreme::Max => values.last()?,
                };
                Constraint::categories([v.clone()])
            }
        };
        self.state.constraints.insert(key, constraint);
        Some(self.recompute())
    }

    /// Axis length in pixels. Only pixel conversions depend on it.
    pub fn resize(&mut self, axis_len: f64) {
        if axis_len.is_finite() && axis_len > 0.0 {
            self.axis_len = axis_len;
        }
    }

    pub fn axis_len(&self) -> f64 {
        self.axis_len
    }

    /// Brush from a pixel interval on the dimension's axis.
    pub fn brush_pixels(&mut self, name: &str, a: f64, b: f64) -> LinkedSelection {
        let constraint = self.dimension(name).and_then(|dim| {
            if a == b {
                return None;
            }
            match dim.scale.invert(a / self.axis_len, b / self.axis_len) {
                Inverted::Range(lo, hi) => Some(Constraint::range(lo, hi)),
                Inverted::Values(values) if dim.kind == DimensionKind::Boolean => {
                    let ordinals: Vec<f64> = values
                        .iter()
                        .map(|v| if v == "true" { 1.0 } else { 0.0 })
                        .collect();
                    let lo = ordinals.iter().copied().fold(f64::INFINITY, f64::min);
                    let hi = ordinals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    // a single boolean value is a legitimate zero-width range
                    (lo <= hi).then_some(Constraint::Range {
                        lo,
                        hi,
                        pinned: lo == hi,
                    })
                }
                Inverted::Values(values) => Some(Constraint::categories(values)),
            }
        });
        self.brush(name, constraint)
    }

    /// Pixel interval of the stored constraint at the current axis length.
    pub fn constraint_pixels(&self, name: &str) -> Option<(f64, f64)> {
        let dim = self.dimension(name)?;
        let (p0, p1) = match (self.state.constraints.get(&dim.key())?, &dim.scale) {
            (Constraint::Range { lo, hi, .. }, Scale::Linear { .. }) => {
                (dim.scale.position_of(*hi)?, dim.scale.position_of(*lo)?)
            }
            (Constraint::Range { lo, hi, .. }, Scale::Point { values }) => {
                let label = |v: f64| values.get(v as usize).cloned();
                (
                    dim.scale.point_position(&label(*lo)?)?,
                    dim.scale.point_position(&label(*hi)?)?,
                )
            }
            (Constraint::Categories { values }, scale) => {
                let positions: Vec<f64> = values
                    .iter()
                    .filter_map(|v| scale.point_position(v))
                    .collect();
                let lo = positions.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = positions.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if lo > hi {
                    return None;
                }
                (lo, hi)
            }
        };
        Some((p0 * self.axis_len, p1 * self.axis_len))
    }

    /// Selected ids whose value on `name` lies within `radius` pixels of `cursor`.
    pub fn probe(&self, name: &str, cursor: f64, radius: f64) -> Vec<NodeId> {
        let Some(dim) = self.dimension(name) else {
            return Vec::new();
        };
        let key = dim.key();
        let chosen: HashSet<&NodeId> = self.selected.iter().collect();
        self.rows
            .iter()
            .filter(|r| chosen.contains(&r.id))
            .filter(|r| {
                r.values
                    .get(&key)
                    .and_then(|v| dim.scale.position(v))
                    .is_some_and(|p| (p * self.axis_len - cursor).abs() <= radius)
            })
            .map(|r| r.id.clone())
            .collect()
    }
}

/// A node's attribute under a `category/name` key, or under a bare name in
/// any category.
fn node_value<'a>(node: &'a Node, key: &str) -> Option<&'a AttrValue> {
    if let Some((category, name)) = key.split_once('/') {
        if let Some(v) = node.attribute(category, name) {
            return Some(v);
        }
    }
    node.attributes.values().find_map(|attrs| attrs.get(key))
}
