//! Layout algorithms for the workspace graph.
//!
//! - [`Simulation`]: stepped force simulation (link, many-body, center,
//!   collision) driven by the host one tick per frame.
//! - [`PlacementAlgorithm`]: deterministic grid placement for batches too
//!   large to simulate.
//! - [`ForceLayoutEngine`]: picks between the two for initial and
//!   incremental layout.

mod engine;
mod forces;
mod placement;
mod quadtree;
mod simulation;

pub use engine::{ForceLayoutEngine, LayoutStrategy};
pub use forces::{CenterForce, CollideForce, LinkForce, ManyBodyForce, SimLink};
pub use placement::{PlacementAlgorithm, PlacementResult, PlacementStats};
pub use simulation::{CoolingParams, ForceSet, SimNode, Simulation, SimulationStatus, phyllotaxis};
