//! Short-lived simulation that unfurls preview items around their sources.
//!
//! Items start next to their source and are pulled out by a link whose
//! target length grows from `start_fraction * link_distance` to the full
//! distance over `unfurl_ticks` ticks. Collision keeps items apart and
//! pushes overflow into outer rings. Main-graph nodes, sources and already
//! settled items are fixed anchors.
//!
//! The run stops when movement and link-error change both stay under their
//! thresholds for `stable_ticks` consecutive ticks, or when the accumulated
//! frame time reaches the timeout.

use std::collections::HashMap;

use log::debug;

use crate::config::PreviewConfig;
use crate::layout::{CollideForce, CoolingParams, ForceSet, LinkForce, SimLink, SimNode, Simulation, SimulationStatus};
use crate::spatial::GOLDEN_ANGLE;
use crate::transform::Point;

/// A fixed body the preview items must avoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewAnchor {
    pub position: Point,
    pub radius: f64,
}

/// An item to animate.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewItemSeed {
    pub id: String,
    pub source: Point,
    pub radius: f64,
    /// Where the item is now, if it was mid-flight in a previous run.
    pub start: Option<Point>,
}

pub struct PreviewSimulation {
    sim: Simulation,
    item_ids: Vec<String>,
    item_sources: Vec<Point>,
    item_count: usize,
    full_distance: f64,
    start_fraction: f64,
    unfurl_ticks: u32,
    /// Unfurl ticks already spent by the run this one replaced.
    unfurl_offset: u32,
    movement_threshold: f64,
    error_threshold: f64,
    stable_required: u32,
    timeout_ms: f64,
    elapsed_ms: f64,
    stable_ticks: u32,
    last_error: Option<f64>,
    timed_out: bool,
    finished: bool,
}

impl PreviewSimulation {
    /// Build a run. Items occupy the first slots, then one fixed slot per
    /// distinct source, then the anchors.
    pub fn new(items: Vec<PreviewItemSeed>, anchors: &[PreviewAnchor], config: &PreviewConfig) -> Self {
        let mut nodes = Vec::with_capacity(items.len() + anchors.len());
        let mut item_sources = Vec::with_capacity(items.len());
        for (k, item) in items.iter().enumerate() {
            let start = item.start.unwrap_or_else(|| {
                let angle = k as f64 * GOLDEN_ANGLE;
                Point::new(item.source.x + angle.cos(), item.source.y + angle.sin())
            });
            nodes.push(SimNode::new(start, item.radius));
            item_sources.push(item.source);
        }

        let mut source_slots: HashMap<(u64, u64), usize> = HashMap::new();
        let mut links = Vec::with_capacity(items.len());
        for (k, item) in items.iter().enumerate() {
            let key = (item.source.x.to_bits(), item.source.y.to_bits());
            let slot = *source_slots.entry(key).or_insert_with(|| {
                nodes.push(SimNode::pinned(item.source, 0.0));
                nodes.len() - 1
            });
            links.push(SimLink { source: slot, target: k });
        }
        for anchor in anchors {
            nodes.push(SimNode::pinned(anchor.position, anchor.radius));
        }

        let node_count = nodes.len();
        let start_distance = config.link_distance * config.start_fraction;
        let forces = ForceSet {
            link: Some(LinkForce::new(links, start_distance, node_count)),
            collide: Some(CollideForce::new()),
            ..Default::default()
        };

        let item_count = items.len();
        Self {
            sim: Simulation::new(nodes, forces, CoolingParams::default()),
            item_ids: items.into_iter().map(|i| i.id).collect(),
            item_sources,
            item_count,
            full_distance: config.link_distance,
            start_fraction: config.start_fraction,
            unfurl_ticks: config.unfurl_ticks.max(1),
            unfurl_offset: 0,
            movement_threshold: config.movement_threshold,
            error_threshold: config.distance_error_threshold,
            stable_required: config.stable_ticks.max(1),
            timeout_ms: config.timeout_ms,
            elapsed_ms: 0.0,
            stable_ticks: 0,
            last_error: None,
            timed_out: false,
            finished: item_count == 0,
        }
    }

    /// Continue the unfurl from `ticks` instead of restarting it, for runs
    /// that replace one whose items were still mid-flight.
    pub fn with_unfurl_progress(mut self, ticks: u32) -> Self {
        self.unfurl_offset = ticks.min(self.unfurl_ticks);
        let distance = self.target_distance(self.unfurl_offset);
        if let Some(link) = self.sim.forces_mut().link.as_mut() {
            link.set_distance(distance);
        }
        self
    }

    /// Unfurl ticks elapsed, counting those carried over.
    pub fn unfurl_progress(&self) -> u32 {
        (self.sim.ticks() + self.unfurl_offset).min(self.unfurl_ticks)
    }

    /// Target link length after `ticks` ticks.
    pub fn target_distance(&self, ticks: u32) -> f64 {
        let progress = (ticks as f64 / self.unfurl_ticks as f64).min(1.0);
        self.full_distance * (self.start_fraction + (1.0 - self.start_fraction) * progress)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn ticks(&self) -> u32 {
        self.sim.ticks()
    }

    /// Current item positions.
    pub fn positions(&self) -> impl Iterator<Item = (&str, Point)> {
        self.item_ids
            .iter()
            .zip(self.sim.nodes())
            .map(|(id, node)| (id.as_str(), node.position()))
    }

    /// Source position each item is linked to.
    pub fn sources(&self) -> impl Iterator<Item = (&str, Point)> {
        self.item_ids
            .iter()
            .zip(self.item_sources.iter().copied())
            .map(|(id, p)| (id.as_str(), p))
    }

    /// Advance one frame of `dt_ms` milliseconds.
    pub fn step(&mut self, dt_ms: f64) -> SimulationStatus {
        if self.finished {
            return SimulationStatus::Settled;
        }

        let distance = self.target_distance(self.sim.ticks() + self.unfurl_offset + 1);
        if let Some(link) = self.sim.forces_mut().link.as_mut() {
            link.set_distance(distance);
        }

        let before: Vec<Point> = self.sim.nodes()[..self.item_count]
            .iter()
            .map(|n| n.position())
            .collect();
        let status = self.sim.step();

        let nodes = self.sim.nodes();
        let movement = before
            .iter()
            .zip(nodes)
            .map(|(b, n)| b.distance_to(n.position()))
            .fold(0.0_f64, f64::max);
        let error = nodes[..self.item_count]
            .iter()
            .zip(&self.item_sources)
            .map(|(n, s)| (n.position().distance_to(*s) - distance).abs())
            .sum::<f64>()
            / self.item_count as f64;
        let error_change = self.last_error.map_or(f64::INFINITY, |last| (error - last).abs());
        self.last_error = Some(error);

        let unfurled = self.unfurl_progress() >= self.unfurl_ticks;
        if unfurled && movement < self.movement_threshold && error_change < self.error_threshold {
            self.stable_ticks += 1;
        } else {
            self.stable_ticks = 0;
        }

        self.elapsed_ms += dt_ms.max(0.0);
        if self.elapsed_ms >= self.timeout_ms {
            self.timed_out = true;
            self.finished = true;
            debug!("preview simulation timed out after {} ticks", self.sim.ticks());
        } else if self.stable_ticks >= self.stable_required || status == SimulationStatus::Settled {
            self.finished = true;
            debug!("preview simulation settled after {} ticks", self.sim.ticks());
        }

        if self.finished {
            SimulationStatus::Settled
        } else {
            SimulationStatus::Running
        }
    }

    /// Step with a fixed frame time until finished. Returns the tick count.
    pub fn run(&mut self, frame_ms: f64) -> u32 {
        while self.step(frame_ms) == SimulationStatus::Running {}
        self.sim.ticks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds(n: usize, source: Point) -> Vec<PreviewItemSeed> {
        (0..n)
            .map(|i| PreviewItemSeed {
                id: format!("i{i}"),
                source,
                radius: 16.0,
                start: None,
            })
            .collect()
    }

    #[test]
    fn test_target_distance_unfurls() {
        let config = PreviewConfig::default();
        let sim = PreviewSimulation::new(seeds(1, Point::default()), &[], &config);
        assert!((sim.target_distance(0) - 42.0).abs() < 1e-9);
        assert!((sim.target_distance(15) - 91.0).abs() < 1e-9);
        assert_eq!(sim.target_distance(30), 140.0);
        assert_eq!(sim.target_distance(300), 140.0);
    }

    #[test]
    fn test_unfurl_progress_carries_over() {
        let config = PreviewConfig::default();
        let mut first = PreviewSimulation::new(seeds(1, Point::default()), &[], &config);
        for _ in 0..10 {
            first.step(16.0);
        }
        assert_eq!(first.unfurl_progress(), 10);

        let mut second = PreviewSimulation::new(seeds(2, Point::default()), &[], &config)
            .with_unfurl_progress(first.unfurl_progress());
        assert_eq!(second.unfurl_progress(), 10);
        assert!((second.sim.forces().link.as_ref().unwrap().distance() - second.target_distance(10)).abs() < 1e-9);
        second.step(16.0);
        assert_eq!(second.unfurl_progress(), 11);
        assert!((second.sim.forces().link.as_ref().unwrap().distance() - second.target_distance(11)).abs() < 1e-9);

        let done = PreviewSimulation::new(seeds(1, Point::default()), &[], &config).with_unfurl_progress(500);
        assert_eq!(done.unfurl_progress(), 30);
    }

    #[test]
    fn test_items_move_out_without_overlap() {
        let config = PreviewConfig::default();
        let source = Point::new(500.0, 500.0);
        let mut sim = PreviewSimulation::new(seeds(8, source), &[], &config);
        sim.run(16.0);
        assert!(sim.is_finished());

        let positions: Vec<Point> = sim.positions().map(|(_, p)| p).collect();
        for p in &positions {
            let d = p.distance_to(source);
            assert!(d > 70.0 && d < 210.0, "item at distance {d}");
        }
        for i in 0..positions.len() {
            for j in i + 1..positions.len() {
                assert!(positions[i].distance_to(positions[j]) > 20.0);
            }
        }
    }

    #[test]
    fn test_anchors_do_not_move_and_repel() {
        let config = PreviewConfig::default();
        let source = Point::new(0.0, 0.0);
        let anchor = PreviewAnchor {
            position: Point::new(140.0, 0.0),
            radius: 30.0,
        };
        let mut items = seeds(1, source);
        items[0].start = Some(Point::new(130.0, 1.0));
        let mut sim = PreviewSimulation::new(items, &[anchor], &config);
        sim.run(16.0);
        let (_, p) = sim.positions().next().unwrap();
        assert!(p.distance_to(anchor.position) > 30.0, "item overlaps anchor at {p:?}");
    }

    #[test]
    fn test_timeout_stops_run() {
        let config = PreviewConfig {
            timeout_ms: 100.0,
            ..PreviewConfig::default()
        };
        let mut sim = PreviewSimulation::new(seeds(20, Point::default()), &[], &config);
        let ticks = sim.run(50.0);
        assert_eq!(ticks, 2);
        assert!(sim.timed_out());
    }

    #[test]
    fn test_empty_run_is_finished() {
        let mut sim = PreviewSimulation::new(Vec::new(), &[], &PreviewConfig::default());
        assert_eq!(sim.step(16.0), SimulationStatus::Settled);
    }
}
