//! Error types for the exploration engine.
//!
//! Every failure here is pane-local: callers report it and keep the session.

use statespace_core::PaneId;
use thiserror::Error;

/// Failures while talking to the backend graph service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExploreError {
    #[error("backend request failed: {0}")]
    Network(String),

    #[error("backend answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend payload: {0}")]
    Decode(String),

    #[error("pane {0} already has an expansion in flight")]
    Busy(PaneId),
}

impl ExploreError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaneError {
    #[error("pane not found: {0}")]
    NotFound(PaneId),

    #[error("the primary pane {0} cannot be destroyed")]
    Primary(PaneId),

    #[error("merge needs at least two distinct panes, got {0}")]
    NotEnoughPanes(usize),

    #[error("pane {0} is closed")]
    Closed(PaneId),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("unsupported document version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Umbrella error for [`crate::session::Session`] operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Explore(#[from] ExploreError),

    #[error(transparent)]
    Pane(#[from] PaneError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("session not started")]
    NotStarted,
}

pub type SessionResult<T> = Result<T, SessionError>;
