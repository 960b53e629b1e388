//! Deterministic bulk placement.
//!
//! Positions hundreds to thousands of new nodes without running a simulation.
//! All placements go through an [`OccupancyGrid`], so no two placed nodes (and
//! no placed node and existing node) share a cell.
//!
//! # Algorithm
//!
//! 1. **Occupancy**: every existing node's cell plus a padding ring is marked
//!    occupied.
//! 2. **Partition**: new entities with at least one relationship to an
//!    existing or another new entity are *connected*; the rest are *isolated*.
//! 3. **Connected pass**: in descending connection count, each entity goes to
//!    the free cell nearest the centroid of its already-positioned neighbors,
//!    found by a golden-angle spiral. Entities with no positioned neighbor yet
//!    are deferred and retried once the pass has placed everything it can;
//!    whatever is still unanchored joins the isolated set.
//! 4. **Isolated pass**: isolated entities are grouped by type, smallest group
//!    first. Each group is packed around the free cell nearest the overall
//!    graph centroid, which clusters same-type entities visually.
//! 5. **Fallback**: the connected and isolated passes share a wall-clock
//!    budget checked every `check_interval` entities. Anything left when it
//!    runs out (or when a spiral search exhausts its probes) is placed by a
//!    row-major scan starting to the right of the graph.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, warn};
use serde::Serialize;
use web_time::Instant;

use crate::config::PlacementConfig;
use crate::graph::{Entity, EntityId};
use crate::spatial::{CellKey, OccupancyGrid};
use crate::transform::Point;

/// Counters describing one placement run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementStats {
    pub connected_placed: usize,
    pub isolated_placed: usize,
    pub fallback_placed: usize,
    pub total_placed: usize,
    pub duration_ms: f64,
}

/// Output of [`PlacementAlgorithm::place`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlacementResult {
    pub positions: BTreeMap<EntityId, Point>,
    pub stats: PlacementStats,
}

/// Grid + spiral placement for large batches.
pub struct PlacementAlgorithm<'a> {
    config: &'a PlacementConfig,
    node_radius: f64,
}

/// Mutable state threaded through the passes.
struct PlacementRun<'a> {
    grid: OccupancyGrid,
    existing: &'a HashMap<EntityId, Point>,
    placed: BTreeMap<EntityId, Point>,
    fallback: Vec<&'a Entity>,
    started: Instant,
    budget_ms: f64,
    check_interval: usize,
    processed: usize,
    out_of_time: bool,
}

impl PlacementRun<'_> {
    fn position_of(&self, id: &EntityId) -> Option<Point> {
        self.existing.get(id).or_else(|| self.placed.get(id)).copied()
    }

    /// Count an entity against the budget; true once the budget is spent.
    fn tick_budget(&mut self) -> bool {
        if !self.out_of_time && self.processed > 0 && self.processed % self.check_interval == 0 {
            let elapsed = self.started.elapsed().as_secs_f64() * 1000.0;
            if elapsed > self.budget_ms {
                warn!(
                    "placement budget of {}ms exceeded after {} entities",
                    self.budget_ms, self.processed
                );
                self.out_of_time = true;
            }
        }
        self.processed += 1;
        self.out_of_time
    }

    fn place_near(&mut self, entity: &Entity, center: Point, max_iterations: usize) -> bool {
        match self.grid.spiral_search(center, max_iterations) {
            Some(cell) => {
                self.grid.occupy(cell);
                self.placed.insert(entity.id.clone(), self.grid.cell_center(cell));
                true
            }
            None => false,
        }
    }

    fn centroid(&self) -> Point {
        let mut sum = Point::default();
        let mut n = 0usize;
        for p in self.existing.values().chain(self.placed.values()) {
            sum.x += p.x;
            sum.y += p.y;
            n += 1;
        }
        if n == 0 {
            return Point::default();
        }
        Point::new(sum.x / n as f64, sum.y / n as f64)
    }
}

impl<'a> PlacementAlgorithm<'a> {
    pub fn new(config: &'a PlacementConfig, node_radius: f64) -> Self {
        Self { config, node_radius }
    }

    pub fn cell_size(&self) -> f64 {
        self.node_radius * self.config.cell_size_multiplier
    }

    /// Assign positions to `new_entities`.
    ///
    /// `links` are undirected id pairs; pairs that touch no new entity are
    /// ignored. Entities already in `existing` or repeated in `new_entities`
    /// are skipped, so every distinct new id receives exactly one position.
    pub fn place(
        &self,
        existing: &HashMap<EntityId, Point>,
        new_entities: &[Entity],
        links: &[(EntityId, EntityId)],
    ) -> PlacementResult {
        let started = Instant::now();

        let mut seen: HashSet<&EntityId> = HashSet::new();
        let batch: Vec<&Entity> = new_entities
            .iter()
            .filter(|e| !existing.contains_key(&e.id) && seen.insert(&e.id))
            .collect();
        let batch_ids: HashSet<&EntityId> = batch.iter().map(|e| &e.id).collect();

        let mut run = PlacementRun {
            grid: OccupancyGrid::new(self.cell_size()),
            existing,
            placed: BTreeMap::new(),
            fallback: Vec::new(),
            started,
            budget_ms: self.config.time_budget_ms,
            check_interval: self.config.check_interval.max(1),
            processed: 0,
            out_of_time: false,
        };
        for p in existing.values() {
            let cell = run.grid.cell_of(*p);
            run.grid.occupy_with_padding(cell, self.config.padding_cells);
        }

        // Adjacency restricted to edges that touch the batch and whose other
        // end is either existing or in the batch.
        let mut adjacency: HashMap<&EntityId, Vec<&EntityId>> = HashMap::new();
        for (a, b) in links {
            if a == b {
                continue;
            }
            let a_new = batch_ids.contains(a);
            let b_new = batch_ids.contains(b);
            if a_new && (b_new || existing.contains_key(b)) {
                adjacency.entry(a).or_default().push(b);
            }
            if b_new && (a_new || existing.contains_key(a)) {
                adjacency.entry(b).or_default().push(a);
            }
        }

        let (mut connected, mut isolated): (Vec<&Entity>, Vec<&Entity>) =
            batch.iter().partition(|e| adjacency.contains_key(&e.id));
        connected.sort_by(|a, b| {
            adjacency[&b.id]
                .len()
                .cmp(&adjacency[&a.id].len())
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut stats = PlacementStats::default();
        let max_iterations = self.config.max_spiral_iterations;

        // Connected pass, retrying deferred entities while progress is made.
        let mut pending = connected;
        loop {
            let mut deferred = Vec::new();
            let before = stats.connected_placed;
            for entity in pending {
                if run.tick_budget() {
                    run.fallback.push(entity);
                    continue;
                }
                let anchors: Vec<Point> = adjacency[&entity.id]
                    .iter()
                    .filter_map(|n| run.position_of(n))
                    .collect();
                if anchors.is_empty() {
                    deferred.push(entity);
                    continue;
                }
                let n = anchors.len() as f64;
                let center = Point::new(
                    anchors.iter().map(|p| p.x).sum::<f64>() / n,
                    anchors.iter().map(|p| p.y).sum::<f64>() / n,
                );
                if run.place_near(entity, center, max_iterations) {
                    stats.connected_placed += 1;
                } else {
                    run.fallback.push(entity);
                }
            }
            if deferred.is_empty() || stats.connected_placed == before {
                isolated.extend(deferred);
                break;
            }
            pending = deferred;
        }

        // Isolated pass: smallest type group first.
        let mut groups: BTreeMap<&str, Vec<&Entity>> = BTreeMap::new();
        for entity in isolated {
            groups.entry(entity.entity_type.as_str()).or_default().push(entity);
        }
        let mut groups: Vec<(&str, Vec<&Entity>)> = groups.into_iter().collect();
        groups.sort_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| a.0.cmp(b.0)));

        for (_, members) in groups {
            let anchor = run
                .grid
                .spiral_search(run.centroid(), max_iterations)
                .map(|cell| run.grid.cell_center(cell));
            for entity in members {
                if run.tick_budget() {
                    run.fallback.push(entity);
                    continue;
                }
                match anchor {
                    Some(center) if run.place_near(entity, center, max_iterations) => {
                        stats.isolated_placed += 1;
                    }
                    _ => run.fallback.push(entity),
                }
            }
        }

        stats.fallback_placed = self.place_fallback(&mut run);
        stats.total_placed = stats.connected_placed + stats.isolated_placed + stats.fallback_placed;
        stats.duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        debug!(
            "placed {} entities ({} connected, {} isolated, {} fallback) in {:.1}ms",
            stats.total_placed,
            stats.connected_placed,
            stats.isolated_placed,
            stats.fallback_placed,
            stats.duration_ms
        );

        PlacementResult {
            positions: run.placed,
            stats,
        }
    }

    /// Row-major scan from an origin right of the graph. Collision-free but
    /// not spatially meaningful.
    fn place_fallback(&self, run: &mut PlacementRun<'_>) -> usize {
        let remaining = std::mem::take(&mut run.fallback);
        if remaining.is_empty() {
            return 0;
        }
        let cell_size = run.grid.cell_size();
        let points = run.existing.values().chain(run.placed.values()).copied();
        let origin = match crate::transform::Bounds::from_points(points) {
            Some(b) => run
                .grid
                .cell_of(Point::new(b.max_x + cell_size * 3.0, b.min_y)),
            None => CellKey::new(0, 0),
        };
        let columns = (remaining.len() as f64).sqrt().ceil() as i64;

        let mut slot = 0;
        for entity in &remaining {
            let (cell, next) = run.grid.scan_free(origin, columns, slot);
            slot = next;
            run.grid.occupy(cell);
            run.placed.insert(entity.id.clone(), run.grid.cell_center(cell));
        }
        remaining.len()
    }
}
