//! 1-hop preview expansion.
//!
//! Revealing an entity's neighbors shows them as provisional items around
//! the entity without adding them to the workspace. Several sources can be
//! active at once; their results are merged newest-first, grouped by type
//! when large, and animated into place by a short-lived simulation that
//! treats the main graph as fixed.

mod cache;
mod engine;
mod simulation;
mod state;

pub use cache::{CachedPosition, PreviewPositionCache};
pub use engine::{PreviewAction, PreviewEngine, PreviewItemKind, PreviewItemView, PreviewPhase, RevealOutcome};
pub use simulation::{PreviewAnchor, PreviewItemSeed, PreviewSimulation};
pub use state::{PreviewGroup, PreviewNode, PreviewState, group_id, merge_neighbors};
