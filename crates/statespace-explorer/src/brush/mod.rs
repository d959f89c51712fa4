pub mod details;
pub mod dimension;
pub mod engine;

pub use details::DetailSelection;
pub use dimension::{dimension_key, Dimension, DimensionKind, Projected, Scale};
pub use engine::{BrushEngine, BrushState, Constraint, Extreme, LinkedSelection, SelectionEntry};
