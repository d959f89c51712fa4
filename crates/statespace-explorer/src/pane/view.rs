use serde::{Deserialize, Serialize};
use statespace_core::NodeId;

use crate::brush::DetailSelection;
use crate::graph::DisplayMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InsertPolicy {
    #[default]
    AfterSpawner,
    AtEnd,
}

impl InsertPolicy {
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "after" | "after_spawner" => Some(Self::AfterSpawner),
            "end" | "at_end" => Some(Self::AtEnd),
            _ => None,
        }
    }
}

/// View settings copied along when a pane is duplicated or exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ViewState {
    pub mode: DisplayMode,
    /// Scheduler policy guiding best-path expansion; `None` expands everything.
    pub policy: Option<String>,
    pub details: DetailSelection,
    pub auto_sync: bool,
    pub insert_policy: InsertPolicy,
}

/// Undo/redo log of graph-view selections. Never cloned into another pane.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<Vec<NodeId>>,
    redo: Vec<Vec<NodeId>>,
}

impl History {
    const DEPTH: usize = 64;

    pub fn record(&mut self, previous: Vec<NodeId>) {
        if self.undo.last() == Some(&previous) {
            return;
        }
        self.undo.push(previous);
        if self.undo.len() > Self::DEPTH {
            self.undo.remove(0);
        }
        self.redo.clear();
    }

    pub fn undo(&mut self, current: Vec<NodeId>) -> Option<Vec<NodeId>> {
        let prev = self.undo.pop()?;
        self.redo.push(current);
        Some(prev)
    }

    pub fn redo(&mut self, current: Vec<NodeId>) -> Option<Vec<NodeId>> {
        let next = self.redo.pop()?;
        self.undo.push(current);
        Some(next)
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty() && self.redo.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|s| NodeId::from(*s)).collect()
    }

    #[test]
    fn undo_and_redo_walk_the_log() {
        let mut h = History::default();
        h.record(sel(&[]));
        h.record(sel(&["a"]));
        let current = sel(&["a", "b"]);

        assert_eq!(h.undo(current.clone()), Some(sel(&["a"])));
        assert_eq!(h.redo(sel(&["a"])), Some(current));
        h.record(sel(&["x"]));
        assert_eq!(h.redo(sel(&["y"])), None);
    }

    #[test]
    fn view_state_defaults_from_empty_toml() {
        let view: ViewState = toml::from_str("").expect("empty view");
        assert_eq!(view.mode, DisplayMode::States);
        assert_eq!(view.insert_policy, InsertPolicy::AfterSpawner);
        assert!(view.policy.is_none());
    }
}
