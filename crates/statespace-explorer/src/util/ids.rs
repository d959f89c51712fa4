use statespace_core::PaneId;

pub const PRIMARY_PANE: &str = "pane-0";

pub const PALETTE: [&str; 10] = [
    "#888c94", "#f51d05", "#05f7eb", "#0749f0", "#734222", "#1c005c", "#f007dc", "#09db00",
    "#F8F32B", "#f79205",
];

/// Colour for the `n`-th live pane.
pub fn pane_color(live: usize) -> String {
    PALETTE[live % PALETTE.len()].to_string()
}

/// Monotonic pane id source for one session.
#[derive(Debug, Clone, Default)]
pub struct PaneIds {
    spawned: u64,
    duplicates: u64,
}

impl PaneIds {
    pub fn primary(&self) -> PaneId {
        PaneId(PRIMARY_PANE.to_string())
    }

    pub fn spawned(&mut self) -> PaneId {
        self.spawned += 1;
        PaneId(format!("pane-{}", self.spawned))
    }

    pub fn merged(&self, inputs: &[PaneId]) -> PaneId {
        let joined: Vec<&str> = inputs.iter().map(|p| p.0.as_str()).collect();
        PaneId(format!("MERGED-{}", joined.join("-")))
    }

    pub fn duplicate(&mut self, source: &PaneId) -> PaneId {
        self.duplicates += 1;
        PaneId(format!("DUPLICATE-{}-{}", source.0, self.duplicates))
    }
}
