use serde::{Deserialize, Serialize};

/// Smallest relative share a pane can shrink to; it stays in the layout.
pub const MIN_SHARE: f64 = 0.005;
/// Smallest pixel size of either side of the canvas/inspector split.
pub const MIN_SPLIT_PX: f64 = 10.0;
pub const DEFAULT_SPLIT: f64 = 0.3;

/// Screen footprint of a pane.
///
/// `share` is the pane's flex growth relative to its siblings. `split` is the
/// inspector's fraction of the pane, the graph canvas gets the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub share: f64,
    remembered_share: Option<f64>,
    pub split: f64,
    previous_split: Option<f64>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            share: 1.0,
            remembered_share: None,
            split: DEFAULT_SPLIT,
            previous_split: None,
        }
    }
}

impl Geometry {
    pub fn is_collapsed(&self) -> bool {
        self.share < 2.0 * MIN_SHARE
    }

    pub fn resize(&mut self, share: f64) {
        self.share = if share.is_finite() {
            share.max(MIN_SHARE)
        } else {
            1.0
        };
        self.remembered_share = None;
    }

    pub fn collapse(&mut self) {
        if !self.is_collapsed() {
            self.remembered_share = Some(self.share);
        }
        self.share = MIN_SHARE;
    }

    pub fn expand(&mut self) {
        self.share = self
            .remembered_share
            .take()
            .filter(|s| *s >= 2.0 * MIN_SHARE)
            .unwrap_or(1.0);
    }

    /// Collapses an open pane and reopens a collapsed one.
    pub fn toggle(&mut self) {
        if self.is_collapsed() {
            self.expand();
        } else {
            self.collapse();
        }
    }

    /// Sets the inspector fraction, keeping both sides at least
    /// [`MIN_SPLIT_PX`] wide inside `total_px`.
    pub fn set_split(&mut self, ratio: f64, total_px: f64) {
        let floor = if total_px > 2.0 * MIN_SPLIT_PX {
            MIN_SPLIT_PX / total_px
        } else {
            0.0
        };
        let ratio = if ratio.is_finite() { ratio } else { DEFAULT_SPLIT };
        self.split = ratio.clamp(floor, 1.0 - floor);
    }

    pub fn maximize_inspector(&mut self) {
        self.previous_split.get_or_insert(self.split);
        self.split = 1.0;
    }

    pub fn minimize_inspector(&mut self) {
        self.previous_split.get_or_insert(self.split);
        self.split = 0.0;
    }

    /// Undoes the last maximize/minimize.
    pub fn restore_inspector(&mut self) {
        if let Some(prev) = self.previous_split.take() {
            self.split = prev;
        }
    }
}
