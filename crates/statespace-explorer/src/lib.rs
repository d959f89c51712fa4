//! Multi-pane state-space exploration: per-pane graph stores grown on demand
//! from a backend, linked brushing, session-wide marks and recurrence.

pub mod brush;
pub mod error;
pub mod export;
pub mod graph;
pub mod net;
pub mod pane;
pub mod session;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ExploreError, PaneError, SessionError, SessionResult};
pub use session::{Session, SessionOptions};
