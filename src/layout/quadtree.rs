//! Barnes-Hut quadtree over simulation node positions.
//!
//! Each cell stores its point count and center of mass so far-away clusters
//! can be treated as a single body by the many-body force.

use crate::transform::Point;

const LEAF_CAPACITY: usize = 8;
const MAX_DEPTH: usize = 12;

#[derive(Debug, Clone, Copy)]
pub(super) struct QuadBounds {
    pub(super) center: Point,
    pub(super) half_extent: f64,
}

impl QuadBounds {
    fn from_points(points: &[Point]) -> Option<Self> {
        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        if !min.x.is_finite() || !min.y.is_finite() || !max.x.is_finite() || !max.y.is_finite() {
            return None;
        }

        let span = (max.x - min.x).max(max.y - min.y).max(1.0);
        Some(Self {
            center: Point::new((min.x + max.x) * 0.5, (min.y + max.y) * 0.5),
            half_extent: span * 0.5 + 1.0,
        })
    }

    pub(super) fn contains(self, p: Point) -> bool {
        (p.x - self.center.x).abs() <= self.half_extent && (p.y - self.center.y).abs() <= self.half_extent
    }

    pub(super) fn side_length(self) -> f64 {
        self.half_extent * 2.0
    }

    fn child(self, quadrant: usize) -> Self {
        let quarter = self.half_extent * 0.5;
        let (dx, dy) = match quadrant {
            0 => (-quarter, -quarter),
            1 => (quarter, -quarter),
            2 => (-quarter, quarter),
            _ => (quarter, quarter),
        };
        Self {
            center: Point::new(self.center.x + dx, self.center.y + dy),
            half_extent: quarter,
        }
    }

    fn quadrant_for(self, p: Point) -> usize {
        match (p.x >= self.center.x, p.y >= self.center.y) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        }
    }
}

pub(super) struct QuadNode {
    pub(super) bounds: QuadBounds,
    pub(super) center_of_mass: Point,
    pub(super) mass: f64,
    pub(super) indices: Vec<usize>,
    pub(super) children: [Option<Box<QuadNode>>; 4],
}

impl QuadNode {
    pub(super) fn build(positions: &[Point]) -> Option<Self> {
        let bounds = QuadBounds::from_points(positions)?;
        let indices = (0..positions.len()).collect();
        Some(Self::build_node(bounds, indices, positions, 0))
    }

    fn build_node(bounds: QuadBounds, indices: Vec<usize>, positions: &[Point], depth: usize) -> Self {
        let mut com = Point::default();
        for &i in &indices {
            com.x += positions[i].x;
            com.y += positions[i].y;
        }
        let mass = indices.len() as f64;
        if mass > 0.0 {
            com.x /= mass;
            com.y /= mass;
        }

        let mut node = Self {
            bounds,
            center_of_mass: com,
            mass,
            indices,
            children: std::array::from_fn(|_| None),
        };
        if depth >= MAX_DEPTH || node.indices.len() <= LEAF_CAPACITY {
            return node;
        }

        let mut buckets: [Vec<usize>; 4] = std::array::from_fn(|_| Vec::new());
        for &i in &node.indices {
            buckets[bounds.quadrant_for(positions[i])].push(i);
        }
        for (quadrant, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            node.children[quadrant] = Some(Box::new(Self::build_node(
                bounds.child(quadrant),
                bucket,
                positions,
                depth + 1,
            )));
        }
        node.indices.clear();
        node
    }

    pub(super) fn is_leaf(&self) -> bool {
        self.children.iter().all(|c| c.is_none())
    }
}
