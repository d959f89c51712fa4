use statespace_core::{NodeId, PaneId};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Node ids held by more than one live pane, with the panes holding them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recurrence {
    pub by_id: BTreeMap<NodeId, Vec<PaneId>>,
}

impl Recurrence {
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.by_id.keys().cloned().collect()
    }

    /// Every pane that holds at least one recurring id.
    pub fn panes(&self) -> Vec<PaneId> {
        let panes: BTreeSet<&PaneId> = self.by_id.values().flatten().collect();
        panes.into_iter().cloned().collect()
    }

    /// Recurring ids held by `pane`.
    pub fn for_pane(&self, pane: &PaneId) -> HashSet<NodeId> {
        self.by_id
            .iter()
            .filter(|(_, panes)| panes.contains(pane))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Full scan over every pane's ever-added ids.
pub fn detect<'a, I>(panes: I) -> Recurrence
where
    I: IntoIterator<Item = (&'a PaneId, &'a HashSet<NodeId>)>,
{
    let mut seen: BTreeMap<NodeId, Vec<PaneId>> = BTreeMap::new();
    for (pane, ids) in panes {
        for id in ids {
            seen.entry(id.clone()).or_default().push(pane.clone());
        }
    }
    seen.retain(|_, panes| panes.len() > 1);
    Recurrence { by_id: seen }
}

/// Recurrence restricted to `queried` ids.
pub fn detect_ids<'a, I>(panes: I, queried: &BTreeSet<NodeId>) -> Recurrence
where
    I: IntoIterator<Item = (&'a PaneId, &'a HashSet<NodeId>)>,
{
    let mut seen: BTreeMap<NodeId, Vec<PaneId>> = BTreeMap::new();
    for (pane, ids) in panes {
        for id in queried.iter().filter(|id| ids.contains(*id)) {
            seen.entry(id.clone()).or_default().push(pane.clone());
        }
    }
    seen.retain(|_, panes| panes.len() > 1);
    Recurrence { by_id: seen }
}

/// Ids whose recurrence is kept current while panes grow.
#[derive(Debug, Clone, Default)]
pub struct RecurrenceWatch {
    watched: BTreeSet<NodeId>,
}

impl RecurrenceWatch {
    pub fn watch<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.watched.extend(ids);
    }

    pub fn watched(&self) -> &BTreeSet<NodeId> {
        &self.watched
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    pub fn clear(&mut self) {
        self.watched.clear();
    }
}
