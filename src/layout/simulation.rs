//! Stepped force simulation.
//!
//! The simulation follows the usual alpha-cooling scheme: every tick alpha
//! moves toward `alpha_target` by `alpha_decay`, forces scale their effect by
//! alpha, and velocities decay by `velocity_decay` before integration. The
//! host calls [`Simulation::step`] once per frame; nothing here touches a
//! timer.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;

use super::forces::{CenterForce, CollideForce, LinkForce, ManyBodyForce};
use crate::transform::Point;

/// Initial radius of the phyllotaxis seed arrangement.
const INITIAL_RADIUS: f64 = 10.0;

/// Result of one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulationStatus {
    Running,
    Settled,
}

/// A node slot inside a simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimNode {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Fixed position; the node is held here regardless of forces.
    pub fixed: Option<Point>,
    /// Collision radius.
    pub radius: f64,
}

impl SimNode {
    pub fn new(position: Point, radius: f64) -> Self {
        Self {
            x: position.x,
            y: position.y,
            vx: 0.0,
            vy: 0.0,
            fixed: None,
            radius,
        }
    }

    pub fn pinned(position: Point, radius: f64) -> Self {
        Self {
            fixed: Some(position),
            ..Self::new(position, radius)
        }
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.fixed.is_some()
    }

    #[inline]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Deterministic seed position for slot `i` on a sunflower spiral.
pub fn phyllotaxis(i: usize) -> Point {
    let angle = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
    let radius = INITIAL_RADIUS * (0.5 + i as f64).sqrt();
    let a = i as f64 * angle;
    Point::new(radius * a.cos(), radius * a.sin())
}

/// Set of forces a simulation applies each tick.
#[derive(Debug, Clone, Default)]
pub struct ForceSet {
    pub link: Option<LinkForce>,
    pub many_body: Option<ManyBodyForce>,
    pub center: Option<CenterForce>,
    pub collide: Option<CollideForce>,
}

/// Cooling parameters.
#[derive(Debug, Clone, Copy)]
pub struct CoolingParams {
    pub alpha: f64,
    pub alpha_min: f64,
    pub alpha_decay: f64,
    pub alpha_target: f64,
    /// Fraction of velocity removed per tick.
    pub velocity_decay: f64,
}

impl Default for CoolingParams {
    fn default() -> Self {
        let alpha_min = 0.001;
        Self {
            alpha: 1.0,
            alpha_min,
            alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
            alpha_target: 0.0,
            velocity_decay: 0.4,
        }
    }
}

/// A force simulation over a dense slice of nodes.
pub struct Simulation {
    nodes: Vec<SimNode>,
    forces: ForceSet,
    cooling: CoolingParams,
    ticks: u32,
    rng: SmallRng,
}

impl Simulation {
    pub fn new(nodes: Vec<SimNode>, forces: ForceSet, cooling: CoolingParams) -> Self {
        Self {
            nodes,
            forces,
            cooling,
            ticks: 0,
            rng: SmallRng::seed_from_u64(0x5eed),
        }
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [SimNode] {
        &mut self.nodes
    }

    pub fn forces_mut(&mut self) -> &mut ForceSet {
        &mut self.forces
    }

    pub fn forces(&self) -> &ForceSet {
        &self.forces
    }

    pub fn alpha(&self) -> f64 {
        self.cooling.alpha
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.cooling.alpha = alpha;
    }

    /// Alpha below which [`Simulation::step`] reports `Settled`.
    pub fn set_alpha_min(&mut self, alpha_min: f64) {
        self.cooling.alpha_min = alpha_min;
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Advance by one tick.
    pub fn tick(&mut self) {
        let c = &mut self.cooling;
        c.alpha += (c.alpha_target - c.alpha) * c.alpha_decay;
        let alpha = c.alpha;

        if let Some(link) = &self.forces.link {
            link.apply(&mut self.nodes, alpha, &mut self.rng);
        }
        if let Some(many_body) = &self.forces.many_body {
            many_body.apply(&mut self.nodes, alpha, &mut self.rng);
        }
        if let Some(center) = &self.forces.center {
            center.apply(&mut self.nodes);
        }
        if let Some(collide) = &self.forces.collide {
            collide.apply(&mut self.nodes, &mut self.rng);
        }

        let keep = 1.0 - self.cooling.velocity_decay;
        for node in &mut self.nodes {
            match node.fixed {
                Some(p) => {
                    node.x = p.x;
                    node.y = p.y;
                    node.vx = 0.0;
                    node.vy = 0.0;
                }
                None => {
                    node.vx *= keep;
                    node.vy *= keep;
                    node.x += node.vx;
                    node.y += node.vy;
                }
            }
        }
        self.ticks += 1;
    }

    /// Advance one frame's worth of simulation.
    pub fn step(&mut self) -> SimulationStatus {
        if self.cooling.alpha < self.cooling.alpha_min {
            return SimulationStatus::Settled;
        }
        self.tick();
        if self.cooling.alpha < self.cooling.alpha_min {
            SimulationStatus::Settled
        } else {
            SimulationStatus::Running
        }
    }

    /// Run synchronously for up to `max_ticks` or until settled.
    pub fn run(&mut self, max_ticks: u32) -> u32 {
        let start = self.ticks;
        for _ in 0..max_ticks {
            if self.step() == SimulationStatus::Settled {
                break;
            }
        }
        self.ticks - start
    }
}
