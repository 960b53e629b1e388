//! Spatial indexing.
//!
//! - `rtree`: R-tree over live node positions for viewport culling, hit
//!   testing and rectangle selection.
//! - `grid`: coarse occupancy grid used by deterministic placement.

mod grid;
mod rtree;

pub use grid::{CellKey, GOLDEN_ANGLE, OccupancyGrid};
pub use rtree::SpatialIndex;
