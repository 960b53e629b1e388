//! ForceLayoutEngine - initial and incremental layout of the workspace graph.
//!
//! The engine owns at most one running mini-simulation. Everything else
//! (initial layout, bulk placement, restoring saved positions) completes
//! synchronously inside the call that triggers it.

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use serde::Serialize;

use super::forces::{CenterForce, CollideForce, LinkForce, ManyBodyForce, SimLink};
use super::placement::{PlacementAlgorithm, PlacementStats};
use super::simulation::{CoolingParams, ForceSet, SimNode, Simulation, SimulationStatus, phyllotaxis};
use crate::config::{ForceConfig, PlacementConfig};
use crate::graph::{EntityId, GraphStore, ViewState};
use crate::transform::Point;

/// How a layout request was satisfied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum LayoutStrategy {
    /// Nothing to lay out.
    Noop,
    /// Saved positions applied verbatim; `placed` entities had none.
    #[serde(rename_all = "camelCase")]
    Restored { restored: usize, placed: usize },
    /// Full synchronous simulation.
    Simulated { ticks: u32 },
    /// Deterministic grid placement.
    Placement { stats: PlacementStats },
    /// Animated mini-simulation with existing nodes pinned.
    #[serde(rename_all = "camelCase")]
    MiniSimulation { moving: usize },
}

/// A mini-simulation in progress.
struct ActiveRun {
    sim: Simulation,
    ids: Vec<EntityId>,
    moving: Vec<bool>,
}

pub struct ForceLayoutEngine {
    force: ForceConfig,
    placement: PlacementConfig,
    active: Option<ActiveRun>,
}

impl ForceLayoutEngine {
    pub fn new(force: ForceConfig, placement: PlacementConfig) -> Self {
        Self {
            force,
            placement,
            active: None,
        }
    }

    pub fn config(&self) -> &ForceConfig {
        &self.force
    }

    /// True while a mini-simulation is animating new nodes.
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Drop the running mini-simulation; nodes keep their current positions.
    pub fn cancel(&mut self) {
        self.active = None;
    }

    /// Lay out a freshly loaded workspace.
    ///
    /// Saved positions for known entities are applied as-is and unknown ids
    /// are dropped. Entities without a saved position are laid out on their
    /// own around the restored ones. With no usable saved state, the whole
    /// graph is simulated for `initial_ticks`.
    pub fn initial_layout(&mut self, store: &mut GraphStore, view_state: Option<&ViewState>) -> LayoutStrategy {
        self.active = None;
        if store.is_empty() {
            return LayoutStrategy::Noop;
        }

        let mut restored = 0;
        if let Some(view) = view_state {
            for (id, p) in &view.entity_positions {
                if store.set_position(id, *p) {
                    restored += 1;
                }
            }
            let dropped = view.entity_positions.len() - restored;
            if dropped > 0 {
                debug!("dropped {dropped} saved positions for entities no longer in the workspace");
            }
        }

        if restored == 0 {
            let ticks = self.simulate_all(store);
            info!("initial layout: simulated {} nodes for {ticks} ticks", store.node_count());
            return LayoutStrategy::Simulated { ticks };
        }

        let missing: Vec<EntityId> = store
            .nodes()
            .filter(|n| n.position.is_none())
            .map(|n| n.id().clone())
            .collect();
        let placed = missing.len();
        if let LayoutStrategy::MiniSimulation { .. } = self.on_entities_added(store, &missing)
            && let Some(mut run) = self.active.take()
        {
            run.sim.run(self.force.initial_ticks);
            write_back(&run, store);
        }
        info!("initial layout: restored {restored} saved positions, laid out {placed}");
        LayoutStrategy::Restored { restored, placed }
    }

    /// Lay out entities that were just added to the store.
    ///
    /// Batches above `force_layout_threshold` go through the placement
    /// algorithm. Smaller batches start (or extend) a mini-simulation that
    /// the host advances with [`ForceLayoutEngine::step`].
    pub fn on_entities_added(&mut self, store: &mut GraphStore, ids: &[EntityId]) -> LayoutStrategy {
        let mut seen = HashSet::new();
        let new: Vec<EntityId> = ids
            .iter()
            .filter(|id| store.contains(id) && seen.insert(*id))
            .cloned()
            .collect();
        if new.is_empty() {
            return LayoutStrategy::Noop;
        }

        if new.len() > self.force.force_layout_threshold {
            let stats = self.place(store, &new);
            info!("placed {} entities without simulation", stats.total_placed);
            return LayoutStrategy::Placement { stats };
        }

        // Nodes still animating from a previous batch keep moving.
        let mut moving: HashSet<EntityId> = new.into_iter().collect();
        if let Some(run) = self.active.take() {
            for (id, m) in run.ids.into_iter().zip(run.moving) {
                if m && store.contains(&id) {
                    moving.insert(id);
                }
            }
        }

        let mut sim = self.build_simulation(store, Some(&moving));
        sim.set_alpha(self.force.incremental_alpha);
        sim.set_alpha_min(self.force.settle_alpha);
        let ids: Vec<EntityId> = store.entity_ids().cloned().collect();
        let flags: Vec<bool> = ids.iter().map(|id| moving.contains(id)).collect();
        let run = ActiveRun {
            sim,
            ids,
            moving: flags,
        };
        // Seeded positions are visible before the first tick.
        write_back(&run, store);
        debug!("mini-simulation started for {} nodes", moving.len());
        self.active = Some(run);
        LayoutStrategy::MiniSimulation { moving: moving.len() }
    }

    /// Advance the running mini-simulation by one tick.
    ///
    /// Pins set on the store (drag) override the simulation each step.
    pub fn step(&mut self, store: &mut GraphStore) -> SimulationStatus {
        let Some(run) = self.active.as_mut() else {
            return SimulationStatus::Settled;
        };

        for (i, id) in run.ids.iter().enumerate() {
            let Some(node) = store.node(id) else {
                continue;
            };
            let slot = &mut run.sim.nodes_mut()[i];
            if let Some(fixed) = node.fixed {
                slot.fixed = Some(fixed);
            } else if run.moving[i] {
                slot.fixed = None;
            } else if let Some(p) = node.position {
                slot.fixed = Some(p);
            }
        }

        let status = run.sim.step();
        write_back(run, store);
        if status == SimulationStatus::Settled {
            debug!("mini-simulation settled after {} ticks", run.sim.ticks());
            self.active = None;
        }
        status
    }

    fn place(&self, store: &mut GraphStore, new: &[EntityId]) -> PlacementStats {
        let batch: HashSet<&EntityId> = new.iter().collect();
        let existing: HashMap<EntityId, Point> = store
            .positioned()
            .filter(|(id, _)| !batch.contains(id))
            .map(|(id, p)| (id.clone(), p))
            .collect();
        let entities: Vec<_> = new
            .iter()
            .filter_map(|id| store.node(id).map(|n| n.entity.clone()))
            .collect();
        let links: Vec<(EntityId, EntityId)> = store
            .links()
            .map(|l| (l.source.clone(), l.target.clone()))
            .collect();

        let result = PlacementAlgorithm::new(&self.placement, self.force.node_radius)
            .place(&existing, &entities, &links);
        for (id, p) in &result.positions {
            store.set_position(id, *p);
        }
        result.stats
    }

    fn simulate_all(&self, store: &mut GraphStore) -> u32 {
        let mut sim = self.build_simulation(store, None);
        let ticks = sim.run(self.force.initial_ticks);
        let ids: Vec<EntityId> = store.entity_ids().cloned().collect();
        for (id, node) in ids.iter().zip(sim.nodes()) {
            store.set_position(id, node.position());
        }
        ticks
    }

    /// Build a simulation over every node in store order.
    ///
    /// With `moving = None` every node is free, seeded on a phyllotaxis
    /// spiral and pulled toward the origin. Otherwise only `moving` nodes are
    /// free; the rest are pinned at their positions and no center force runs.
    fn build_simulation(&self, store: &GraphStore, moving: Option<&HashSet<EntityId>>) -> Simulation {
        let radius = self.force.node_radius + self.force.collision_padding;
        let ids: Vec<&EntityId> = store.entity_ids().collect();
        let index: HashMap<&EntityId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let fallback_center = store.bounds().map(|b| b.center()).unwrap_or_default();
        let mut seeded = 0usize;
        let nodes: Vec<SimNode> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let current = store.position(id);
                match moving {
                    None => SimNode::new(phyllotaxis(i), radius),
                    Some(set) if set.contains(*id) => {
                        let p = current.unwrap_or_else(|| {
                            let anchor = neighbor_centroid(store, id).unwrap_or(fallback_center);
                            let offset = phyllotaxis(seeded);
                            seeded += 1;
                            Point::new(anchor.x + offset.x, anchor.y + offset.y)
                        });
                        SimNode::new(p, radius)
                    }
                    Some(_) => SimNode::pinned(current.unwrap_or(fallback_center), radius),
                }
            })
            .collect();

        let links: Vec<SimLink> = store
            .links()
            .filter_map(|l| {
                Some(SimLink {
                    source: *index.get(&l.source)?,
                    target: *index.get(&l.target)?,
                })
            })
            .collect();

        let forces = ForceSet {
            link: Some(LinkForce::new(links, self.force.link_distance, nodes.len())),
            many_body: Some(ManyBodyForce::new(self.force.charge_strength)),
            center: moving.is_none().then(|| CenterForce::new(Point::default())),
            collide: Some(CollideForce::new()),
        };
        Simulation::new(nodes, forces, CoolingParams::default())
    }
}

fn neighbor_centroid(store: &GraphStore, id: &EntityId) -> Option<Point> {
    let points: Vec<Point> = store
        .neighbors(id)
        .iter()
        .filter_map(|n| store.position(n))
        .collect();
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    Some(Point::new(
        points.iter().map(|p| p.x).sum::<f64>() / n,
        points.iter().map(|p| p.y).sum::<f64>() / n,
    ))
}

/// Copy free simulation nodes back into the store.
fn write_back(run: &ActiveRun, store: &mut GraphStore) {
    for ((id, node), moving) in run.ids.iter().zip(run.sim.nodes()).zip(&run.moving) {
        if *moving && !node.is_fixed() {
            store.set_position(id, node.position());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, Relationship};

    fn engine() -> ForceLayoutEngine {
        ForceLayoutEngine::new(ForceConfig::default(), PlacementConfig::default())
    }

    fn store_with(n: usize) -> GraphStore {
        let mut store = GraphStore::new();
        for i in 0..n {
            store.add_entity(Entity::new(format!("e{i}"), format!("E{i}"), "person"));
        }
        store
    }

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    #[test]
    fn test_initial_layout_simulates_without_view_state() {
        let mut store = store_with(3);
        store.add_relationship(&Relationship::new("r1", "knows", "e0", "e1"));
        store.add_relationship(&Relationship::new("r2", "knows", "e1", "e2"));

        let strategy = engine().initial_layout(&mut store, None);
        assert!(matches!(strategy, LayoutStrategy::Simulated { .. }));
        assert!(store.nodes().all(|n| n.position.is_some()));

        let d01 = store.position(&id("e0")).unwrap().distance_to(store.position(&id("e1")).unwrap());
        let d12 = store.position(&id("e1")).unwrap().distance_to(store.position(&id("e2")).unwrap());
        for d in [d01, d12] {
            assert!((75.0..225.0).contains(&d), "linked distance {d}");
        }
    }

    #[test]
    fn test_initial_layout_restores_verbatim() {
        let mut store = store_with(2);
        let mut view = ViewState {
            scale: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            entity_positions: Default::default(),
        };
        view.entity_positions.insert(id("e0"), Point::new(12.345, -6.789));
        view.entity_positions.insert(id("e1"), Point::new(400.0, 400.0));
        view.entity_positions.insert(id("gone"), Point::new(1.0, 1.0));

        let strategy = engine().initial_layout(&mut store, Some(&view));
        assert_eq!(strategy, LayoutStrategy::Restored { restored: 2, placed: 0 });
        assert_eq!(store.position(&id("e0")), Some(Point::new(12.345, -6.789)));
        assert!(!store.contains(&id("gone")));
    }

    #[test]
    fn test_initial_layout_fills_only_missing_positions() {
        let mut store = store_with(3);
        store.add_relationship(&Relationship::new("r1", "knows", "e0", "e2"));
        let mut view = ViewState {
            scale: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            entity_positions: Default::default(),
        };
        view.entity_positions.insert(id("e0"), Point::new(100.0, 100.0));
        view.entity_positions.insert(id("e1"), Point::new(-300.0, 50.0));

        let mut engine = engine();
        let strategy = engine.initial_layout(&mut store, Some(&view));
        assert_eq!(strategy, LayoutStrategy::Restored { restored: 2, placed: 1 });
        assert!(!engine.is_running());
        assert_eq!(store.position(&id("e0")), Some(Point::new(100.0, 100.0)));
        assert_eq!(store.position(&id("e1")), Some(Point::new(-300.0, 50.0)));
        assert!(store.position(&id("e2")).is_some());
    }

    #[test]
    fn test_small_batch_runs_mini_simulation_with_pins() {
        let mut store = store_with(5);
        let mut engine = engine();
        engine.initial_layout(&mut store, None);
        let before: Vec<Point> = (0..5).map(|i| store.position(&id(&format!("e{i}"))).unwrap()).collect();

        store.add_entity(Entity::new("n0", "N0", "person"));
        store.add_relationship(&Relationship::new("r", "knows", "e0", "n0"));
        let strategy = engine.on_entities_added(&mut store, &[id("n0")]);
        assert_eq!(strategy, LayoutStrategy::MiniSimulation { moving: 1 });
        assert!(store.position(&id("n0")).is_some());

        let mut ticks = 0;
        while engine.step(&mut store) == SimulationStatus::Running {
            ticks += 1;
            assert!(ticks < 1000, "mini-simulation never settled");
        }
        assert!(!engine.is_running());
        for (i, p) in before.iter().enumerate() {
            assert_eq!(store.position(&id(&format!("e{i}"))), Some(*p));
        }
        assert!(store.nodes().all(|n| n.fixed.is_none()));
    }

    #[test]
    fn test_large_batch_uses_placement() {
        let mut store = store_with(10);
        let mut engine = engine();
        engine.initial_layout(&mut store, None);

        let mut ids = Vec::new();
        for i in 0..600 {
            let new_id = format!("n{i}");
            store.add_entity(Entity::new(new_id.clone(), "", "org"));
            if i % 5 == 0 {
                store.add_relationship(&Relationship::new(format!("r{i}"), "", format!("e{}", i % 10), new_id.clone()));
            }
            ids.push(EntityId::new(new_id));
        }
        let strategy = engine.on_entities_added(&mut store, &ids);
        let LayoutStrategy::Placement { stats } = strategy else {
            panic!("expected placement, got {strategy:?}");
        };
        assert_eq!(stats.total_placed, 600);
        assert!(!engine.is_running());
        assert!(ids.iter().all(|id| store.position(id).is_some()));
    }

    #[test]
    fn test_added_batches_merge_into_running_simulation() {
        let mut store = store_with(3);
        let mut engine = engine();
        engine.initial_layout(&mut store, None);

        store.add_entity(Entity::new("a", "", "person"));
        engine.on_entities_added(&mut store, &[id("a")]);
        engine.step(&mut store);
        store.add_entity(Entity::new("b", "", "person"));
        let strategy = engine.on_entities_added(&mut store, &[id("b"), id("b"), id("missing")]);
        assert_eq!(strategy, LayoutStrategy::MiniSimulation { moving: 2 });
    }

    #[test]
    fn test_dragged_node_is_respected_by_step() {
        let mut store = store_with(2);
        let mut engine = engine();
        engine.initial_layout(&mut store, None);
        store.add_entity(Entity::new("a", "", "person"));
        engine.on_entities_added(&mut store, &[id("a")]);

        let node = store.node_mut(&id("a")).unwrap();
        node.position = Some(Point::new(999.0, 999.0));
        node.pin();
        engine.step(&mut store);
        assert_eq!(store.position(&id("a")), Some(Point::new(999.0, 999.0)));
    }

    #[test]
    fn test_empty_inputs_are_noop() {
        let mut store = GraphStore::new();
        let mut engine = engine();
        assert_eq!(engine.initial_layout(&mut store, None), LayoutStrategy::Noop);
        assert_eq!(engine.on_entities_added(&mut store, &[id("x")]), LayoutStrategy::Noop);
        assert_eq!(engine.step(&mut store), SimulationStatus::Settled);
    }
}
