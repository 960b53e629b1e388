//! Viewport culling for large graphs.

mod culling;

pub use culling::{Badge, ViewportCuller, VisibilityDiff, badge_label};
