pub mod explore;
pub mod path;
pub mod store;

use serde::{Deserialize, Serialize};
use statespace_core::NodeKind;

pub use explore::{
    Backend, CapacityDecision, Capacity, ExpandOutcome, IncrementalExplorer, PendingExpansion,
};
pub use path::{BestPathReport, BestPathRun, BestPathStep, StopReason};
pub use store::{Delta, Element, GraphStore};

/// Which node kinds a pane shows, counts and projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DisplayMode {
    #[default]
    #[serde(rename = "s")]
    States,
    #[serde(rename = "t")]
    Actions,
    #[serde(rename = "s+t")]
    Both,
}

impl DisplayMode {
    pub fn admits(self, kind: NodeKind) -> bool {
        match self {
            Self::States => kind == NodeKind::State,
            Self::Actions => kind == NodeKind::Action,
            Self::Both => true,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "s" | "states" => Some(Self::States),
            "t" | "actions" => Some(Self::Actions),
            "s+t" | "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::States => "s",
            Self::Actions => "t",
            Self::Both => "s+t",
        }
    }
}
