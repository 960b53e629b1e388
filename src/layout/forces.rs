//! Forces applied by [`super::Simulation`].
//!
//! Forces only adjust velocities (the center force adjusts positions
//! directly); integration happens in the simulation tick.

use std::collections::HashMap;

use rand::Rng;
use rand::rngs::SmallRng;

use super::quadtree::QuadNode;
use super::simulation::SimNode;
use crate::transform::Point;

/// Minimum squared distance used by the many-body force.
const DISTANCE_MIN_2: f64 = 1.0;

/// Tiny random displacement used to separate coincident nodes.
#[inline]
pub(super) fn jiggle(rng: &mut SmallRng) -> f64 {
    (rng.random::<f64>() - 0.5) * 1e-6
}

/// A link between two node slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimLink {
    pub source: usize,
    pub target: usize,
}

/// Spring force pulling linked nodes toward a target distance.
///
/// Per-link strength is `1 / min(degree(source), degree(target))` and the
/// correction is split between endpoints by relative degree, so hubs move
/// less than leaves.
#[derive(Debug, Clone)]
pub struct LinkForce {
    links: Vec<SimLink>,
    distance: f64,
    iterations: u32,
    strengths: Vec<f64>,
    biases: Vec<f64>,
}

impl LinkForce {
    pub fn new(links: Vec<SimLink>, distance: f64, node_count: usize) -> Self {
        let mut degree = vec![0u32; node_count];
        for link in &links {
            degree[link.source] += 1;
            degree[link.target] += 1;
        }
        let strengths = links
            .iter()
            .map(|l| 1.0 / degree[l.source].min(degree[l.target]).max(1) as f64)
            .collect();
        let biases = links
            .iter()
            .map(|l| {
                let s = degree[l.source] as f64;
                let t = degree[l.target] as f64;
                s / (s + t).max(1.0)
            })
            .collect();
        Self {
            links,
            distance,
            iterations: 1,
            strengths,
            biases,
        }
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn set_distance(&mut self, distance: f64) {
        self.distance = distance;
    }

    pub fn links(&self) -> &[SimLink] {
        &self.links
    }

    pub(super) fn apply(&self, nodes: &mut [SimNode], alpha: f64, rng: &mut SmallRng) {
        for _ in 0..self.iterations {
            for (k, link) in self.links.iter().enumerate() {
                let (s, t) = (nodes[link.source], nodes[link.target]);
                let mut x = t.x + t.vx - s.x - s.vx;
                let mut y = t.y + t.vy - s.y - s.vy;
                if x == 0.0 {
                    x = jiggle(rng);
                }
                if y == 0.0 {
                    y = jiggle(rng);
                }
                let mut l = (x * x + y * y).sqrt();
                l = (l - self.distance) / l * alpha * self.strengths[k];
                x *= l;
                y *= l;
                let b = self.biases[k];
                nodes[link.target].vx -= x * b;
                nodes[link.target].vy -= y * b;
                nodes[link.source].vx += x * (1.0 - b);
                nodes[link.source].vy += y * (1.0 - b);
            }
        }
    }
}

/// Barnes-Hut approximated n-body repulsion (negative strength repels).
#[derive(Debug, Clone, Copy)]
pub struct ManyBodyForce {
    pub strength: f64,
    pub theta: f64,
}

impl ManyBodyForce {
    pub fn new(strength: f64) -> Self {
        Self { strength, theta: 0.9 }
    }

    pub(super) fn apply(&self, nodes: &mut [SimNode], alpha: f64, rng: &mut SmallRng) {
        let positions: Vec<Point> = nodes.iter().map(|n| Point::new(n.x, n.y)).collect();
        let Some(tree) = QuadNode::build(&positions) else {
            return;
        };
        let theta2 = self.theta * self.theta;
        for index in 0..nodes.len() {
            let mut dv = (0.0, 0.0);
            self.accumulate(&tree, index, &positions, alpha, theta2, rng, &mut dv);
            nodes[index].vx += dv.0;
            nodes[index].vy += dv.1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn accumulate(
        &self,
        quad: &QuadNode,
        index: usize,
        positions: &[Point],
        alpha: f64,
        theta2: f64,
        rng: &mut SmallRng,
        dv: &mut (f64, f64),
    ) {
        if quad.mass <= 0.0 {
            return;
        }
        let p = positions[index];

        if quad.is_leaf() {
            for &other in &quad.indices {
                if other == index {
                    continue;
                }
                let mut x = positions[other].x - p.x;
                let mut y = positions[other].y - p.y;
                if x == 0.0 {
                    x = jiggle(rng);
                }
                if y == 0.0 {
                    y = jiggle(rng);
                }
                let mut l = x * x + y * y;
                if l < DISTANCE_MIN_2 {
                    l = (DISTANCE_MIN_2 * l).sqrt();
                }
                let w = self.strength * alpha / l;
                dv.0 += x * w;
                dv.1 += y * w;
            }
            return;
        }

        let x = quad.center_of_mass.x - p.x;
        let y = quad.center_of_mass.y - p.y;
        let mut l = x * x + y * y;
        let w = quad.bounds.side_length();
        if !quad.bounds.contains(p) && w * w / theta2 < l {
            if l < DISTANCE_MIN_2 {
                l = (DISTANCE_MIN_2 * l).sqrt();
            }
            let scaled = self.strength * quad.mass * alpha / l;
            dv.0 += x * scaled;
            dv.1 += y * scaled;
            return;
        }

        for child in quad.children.iter().flatten() {
            self.accumulate(child, index, positions, alpha, theta2, rng, dv);
        }
    }
}

/// Shifts all free nodes so their mean position sits at `center`.
#[derive(Debug, Clone, Copy)]
pub struct CenterForce {
    pub center: Point,
    pub strength: f64,
}

impl CenterForce {
    pub fn new(center: Point) -> Self {
        Self { center, strength: 1.0 }
    }

    pub(super) fn apply(&self, nodes: &mut [SimNode]) {
        if nodes.is_empty() {
            return;
        }
        let n = nodes.len() as f64;
        let (sx, sy) = nodes.iter().fold((0.0, 0.0), |(sx, sy), node| (sx + node.x, sy + node.y));
        let dx = (sx / n - self.center.x) * self.strength;
        let dy = (sy / n - self.center.y) * self.strength;
        for node in nodes.iter_mut().filter(|n| !n.is_fixed()) {
            node.x -= dx;
            node.y -= dy;
        }
    }
}

/// Pairwise overlap resolution on predicted positions.
///
/// Candidate pairs come from a uniform hash grid whose cell size is the
/// largest collision diameter, so only adjacent cells need checking.
#[derive(Debug, Clone, Copy)]
pub struct CollideForce {
    pub strength: f64,
}

impl CollideForce {
    pub fn new() -> Self {
        Self { strength: 1.0 }
    }

    pub(super) fn apply(&self, nodes: &mut [SimNode], rng: &mut SmallRng) {
        let max_radius = nodes.iter().fold(0.0_f64, |m, n| m.max(n.radius));
        if max_radius <= 0.0 || nodes.len() < 2 {
            return;
        }
        let cell = max_radius * 2.0;
        let key = |n: &SimNode| {
            (
                ((n.x + n.vx) / cell).floor() as i64,
                ((n.y + n.vy) / cell).floor() as i64,
            )
        };

        let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            buckets.entry(key(node)).or_default().push(i);
        }

        for i in 0..nodes.len() {
            let (cx, cy) = key(&nodes[i]);
            for dx in -1..=1 {
                for dy in -1..=1 {
                    let Some(bucket) = buckets.get(&(cx + dx, cy + dy)) else {
                        continue;
                    };
                    for &j in bucket {
                        if j <= i {
                            continue;
                        }
                        self.resolve(nodes, i, j, rng);
                    }
                }
            }
        }
    }

    fn resolve(&self, nodes: &mut [SimNode], i: usize, j: usize, rng: &mut SmallRng) {
        let (a, b) = (nodes[i], nodes[j]);
        let r = a.radius + b.radius;
        let mut x = (a.x + a.vx) - (b.x + b.vx);
        let mut y = (a.y + a.vy) - (b.y + b.vy);
        let mut l = x * x + y * y;
        if l >= r * r {
            return;
        }
        if x == 0.0 {
            x = jiggle(rng);
            l += x * x;
        }
        if y == 0.0 {
            y = jiggle(rng);
            l += y * y;
        }
        let dist = l.sqrt();
        let push = (r - dist) / dist * self.strength;
        x *= push;
        y *= push;

        let ra2 = a.radius * a.radius;
        let rb2 = b.radius * b.radius;
        let share = if ra2 + rb2 > 0.0 { rb2 / (ra2 + rb2) } else { 0.5 };
        // A fixed endpoint cannot absorb any of the correction.
        let (share_a, share_b) = match (a.is_fixed(), b.is_fixed()) {
            (true, false) => (0.0, 1.0),
            (false, true) => (1.0, 0.0),
            _ => (share, 1.0 - share),
        };
        nodes[i].vx += x * share_a;
        nodes[i].vy += y * share_a;
        nodes[j].vx -= x * share_b;
        nodes[j].vy -= y * share_b;
    }
}

impl Default for CollideForce {
    fn default() -> Self {
        Self::new()
    }
}
