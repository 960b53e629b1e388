//! R-tree based spatial index using the rstar crate.
//!
//! Provides O(log n) spatial queries for:
//! - Viewport rectangle lookup (culling, rectangle select)
//! - Nearest node within a radius (hit testing)

use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::graph::EntityId;
use crate::transform::{Bounds, Point};

/// A point in the spatial index with its entity id.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePoint {
    pub id: EntityId,
    pub x: f64,
    pub y: f64,
}

impl RTreeObject for NodePoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for NodePoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// Spatial index over node positions.
///
/// Built in bulk; callers rebuild it after bulk position changes (simulation
/// settle, placement, drag end) rather than updating per frame.
pub struct SpatialIndex {
    tree: RTree<NodePoint>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Rebuild the index from `(id, position)` pairs.
    pub fn rebuild<'a, I>(&mut self, points: I)
    where
        I: IntoIterator<Item = (&'a EntityId, Point)>,
    {
        let node_points: Vec<NodePoint> = points
            .into_iter()
            .map(|(id, p)| NodePoint {
                id: id.clone(),
                x: p.x,
                y: p.y,
            })
            .collect();
        self.tree = RTree::bulk_load(node_points);
    }

    /// All nodes inside `bounds` (edges inclusive).
    pub fn in_bounds(&self, bounds: &Bounds) -> Vec<&EntityId> {
        let envelope = AABB::from_corners([bounds.min_x, bounds.min_y], [bounds.max_x, bounds.max_y]);
        self.tree
            .locate_in_envelope(&envelope)
            .map(|point| &point.id)
            .collect()
    }

    /// Nearest node within `max_distance` of a point.
    pub fn nearest_within(&self, x: f64, y: f64, max_distance: f64) -> Option<&EntityId> {
        let max_distance_sq = max_distance * max_distance;
        self.tree
            .nearest_neighbor(&[x, y])
            .filter(|point| point.distance_2(&[x, y]) <= max_distance_sq)
            .map(|point| &point.id)
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}
