//! PreviewEngine - source set, merged state, cache and animation.
//!
//! Idle until the first reveal. Every change to the source set or to the
//! fetched neighbor data recomputes [`PreviewState`] from scratch; the
//! position cache carries settled items across recomputations so they do
//! not replay their animation.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, info};
use serde::Serialize;

use super::cache::{CachedPosition, PreviewPositionCache};
use super::simulation::{PreviewAnchor, PreviewItemSeed, PreviewSimulation};
use super::state::{PreviewGroup, PreviewNode, PreviewState, merge_neighbors};
use crate::config::PreviewConfig;
use crate::graph::{Entity, EntityId, GraphStore, NeighborMap};
use crate::layout::SimulationStatus;
use crate::transform::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PreviewPhase {
    Idle,
    Active,
}

/// Result of a reveal (modifier-click) on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RevealOutcome {
    /// The entity became a source; its neighbors must be fetched.
    #[serde(rename_all = "camelCase")]
    FetchNeighbors { entity_id: EntityId },
    /// The entity was a source and was toggled off.
    #[serde(rename_all = "camelCase")]
    Deactivated { entity_id: EntityId },
    /// The last source was toggled off.
    Exited,
}

/// What the host should do after a click on a preview item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PreviewAction {
    /// Add the entity to the workspace at `position`.
    Materialize { entity: Entity, position: Point },
    /// The item was promoted to a source; fetch its neighbors.
    #[serde(rename_all = "camelCase")]
    FetchNeighbors { entity_id: EntityId },
    /// Show the full member list of a group.
    ShowGroup { group: PreviewGroup },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PreviewItemKind {
    Node,
    Group,
}

/// Render-ready view of one preview item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewItemView {
    pub id: String,
    pub kind: PreviewItemKind,
    pub label: String,
    pub entity_type: String,
    pub source_entity_id: EntityId,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub count: usize,
}

pub struct PreviewEngine {
    config: PreviewConfig,
    node_radius: f64,
    /// Activation order, oldest first.
    sources: Vec<EntityId>,
    promoted: BTreeMap<EntityId, PreviewNode>,
    promoted_positions: BTreeMap<EntityId, Point>,
    neighbors: HashMap<EntityId, NeighborMap>,
    state: PreviewState,
    cache: PreviewPositionCache,
    sim: Option<PreviewSimulation>,
}

impl PreviewEngine {
    pub fn new(config: PreviewConfig, node_radius: f64) -> Self {
        Self {
            config,
            node_radius,
            sources: Vec::new(),
            promoted: BTreeMap::new(),
            promoted_positions: BTreeMap::new(),
            neighbors: HashMap::new(),
            state: PreviewState::default(),
            cache: PreviewPositionCache::new(),
            sim: None,
        }
    }

    pub fn phase(&self) -> PreviewPhase {
        if self.sources.is_empty() {
            PreviewPhase::Idle
        } else {
            PreviewPhase::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase() == PreviewPhase::Active
    }

    pub fn is_source(&self, id: &EntityId) -> bool {
        self.sources.contains(id)
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn cache(&self) -> &PreviewPositionCache {
        &self.cache
    }

    /// True while provisional items are still animating.
    pub fn is_animating(&self) -> bool {
        self.sim.is_some()
    }

    /// Reveal (or toggle off) the neighbors of `id`.
    ///
    /// `id` may be a main-graph node or a preview node; a preview node is
    /// promoted to a source at its current position. Returns `None` for ids
    /// that are neither.
    pub fn reveal(&mut self, store: &GraphStore, id: &EntityId) -> Option<RevealOutcome> {
        if let Some(at) = self.sources.iter().position(|s| s == id) {
            self.sources.remove(at);
            self.neighbors.remove(id);
            self.promoted.remove(id);
            self.promoted_positions.remove(id);
            if self.sources.is_empty() {
                self.exit();
                return Some(RevealOutcome::Exited);
            }
            info!("preview source {id} toggled off, {} remain", self.sources.len());
            self.recompute(store);
            return Some(RevealOutcome::Deactivated { entity_id: id.clone() });
        }

        if !store.contains(id) {
            let node = self.state.node(id.as_str())?.clone();
            let position = self
                .item_position(id.as_str())
                .or_else(|| self.state.source_positions.get(&node.source_entity_id).copied())
                .unwrap_or_default();
            self.promoted_positions.insert(id.clone(), position);
            self.promoted.insert(id.clone(), node);
        }
        self.sources.push(id.clone());
        info!("preview source {id} activated, {} active", self.sources.len());
        self.recompute(store);
        Some(RevealOutcome::FetchNeighbors { entity_id: id.clone() })
    }

    /// Store fetched neighbors for `source`. `None` (failed or missing
    /// response) counts as zero neighbors. Responses for sources that were
    /// toggled off in the meantime are ignored; returns whether it was used.
    pub fn ingest_neighbors(&mut self, store: &GraphStore, source: &EntityId, neighbors: Option<NeighborMap>) -> bool {
        if !self.is_source(source) {
            debug!("ignoring neighbors for inactive preview source {source}");
            return false;
        }
        self.neighbors.insert(source.clone(), neighbors.unwrap_or_default());
        self.recompute(store);
        true
    }

    /// Drop main-graph sources that left the graph, then recompute.
    pub fn sync_with_graph(&mut self, store: &GraphStore) {
        if !self.is_active() {
            return;
        }
        let removed: Vec<EntityId> = self
            .sources
            .iter()
            .filter(|s| !store.contains(s) && !self.promoted.contains_key(*s))
            .cloned()
            .collect();
        for id in &removed {
            self.neighbors.remove(id);
        }
        self.sources.retain(|s| !removed.contains(s));
        if self.sources.is_empty() {
            self.exit();
        } else {
            self.recompute(store);
        }
    }

    /// Rebuild the preview state from the current sources and neighbor data.
    pub fn recompute(&mut self, store: &GraphStore) {
        let mut source_positions = BTreeMap::new();
        for source in &self.sources {
            let position = store
                .position(source)
                .or_else(|| self.promoted_positions.get(source).copied());
            if let Some(p) = position {
                source_positions.insert(source.clone(), p);
            }
        }

        let (nodes, groups) = merge_neighbors(
            &self.sources,
            &self.neighbors,
            |id| store.contains(id),
            self.config.group_threshold,
        );
        self.state = PreviewState {
            is_active: !self.sources.is_empty(),
            source_entity_ids: self.sources.clone(),
            source_positions,
            promoted: self.promoted.values().cloned().collect(),
            nodes,
            groups,
        };

        let present: HashSet<&str> = self.state.item_ids().collect();
        let pruned = self.cache.prune(&present);

        let previous = self.sim.take();
        let unfurl_progress = previous.as_ref().map_or(0, |sim| sim.unfurl_progress());
        let in_flight: HashMap<String, Point> = previous
            .map(|sim| sim.positions().map(|(id, p)| (id.to_string(), p)).collect())
            .unwrap_or_default();

        let mut seeds = Vec::new();
        let mut anchors: Vec<PreviewAnchor> = store
            .positioned()
            .map(|(_, p)| PreviewAnchor {
                position: p,
                radius: self.node_radius,
            })
            .collect();
        for p in self.promoted_positions.values() {
            anchors.push(PreviewAnchor {
                position: *p,
                radius: self.config.item_radius,
            });
        }
        let mut reattributed = Vec::new();
        let mut resumed = false;
        for (id, source, radius) in self.item_layout() {
            let Some(source_at) = self.state.source_positions.get(&source).copied() else {
                continue;
            };
            match self.cache.initialized(&id) {
                Some(cached) if cached.source_entity_id == source => anchors.push(PreviewAnchor {
                    position: cached.relative_to(source_at),
                    radius,
                }),
                // Moved to another source: glide over from where it settled.
                Some(cached) => {
                    seeds.push(PreviewItemSeed {
                        start: Some(cached.position()),
                        id: id.clone(),
                        source: source_at,
                        radius,
                    });
                    reattributed.push(id);
                }
                None => {
                    let start = in_flight.get(&id).copied();
                    resumed |= start.is_some();
                    seeds.push(PreviewItemSeed {
                        start,
                        id,
                        source: source_at,
                        radius,
                    });
                }
            }
        }
        for id in &reattributed {
            self.cache.remove(id);
        }

        debug!(
            "preview recomputed: {} sources, {} nodes, {} groups, {} animating ({} re-attributed), {} cache entries pruned",
            self.sources.len(),
            self.state.nodes.len(),
            self.state.groups.len(),
            seeds.len(),
            reattributed.len(),
            pruned
        );
        if seeds.is_empty() {
            return;
        }
        // Items that already sit at full distance must not be pulled back in.
        let progress = if !reattributed.is_empty() {
            self.config.unfurl_ticks
        } else if resumed {
            unfurl_progress
        } else {
            0
        };
        self.sim = Some(PreviewSimulation::new(seeds, &anchors, &self.config).with_unfurl_progress(progress));
    }

    /// Advance the preview animation by one frame.
    ///
    /// When the run finishes every animated item is written to the cache as
    /// initialized.
    pub fn step(&mut self, dt_ms: f64) -> SimulationStatus {
        let Some(sim) = self.sim.as_mut() else {
            return SimulationStatus::Settled;
        };
        let status = sim.step(dt_ms);
        if status != SimulationStatus::Settled {
            return status;
        }
        let Some(sim) = self.sim.take() else {
            return status;
        };
        for ((id, p), (_, source)) in sim.positions().zip(sim.sources()) {
            if let Some(source_id) = self.item_source(id) {
                self.cache.insert(id, CachedPosition::settled(p, source, source_id));
            }
        }
        if sim.timed_out() {
            info!("preview animation stopped at timeout after {} ticks", sim.ticks());
        }
        status
    }

    /// Current position of a preview item.
    pub fn item_position(&self, id: &str) -> Option<Point> {
        if let Some(sim) = &self.sim
            && let Some((_, p)) = sim.positions().find(|(item, _)| *item == id)
        {
            return Some(p);
        }
        let cached = self.cache.initialized(id)?;
        let source = self.item_source(id)?;
        match self.state.source_positions.get(&source) {
            Some(at) => Some(cached.follow(&source, *at)),
            None => Some(cached.position()),
        }
    }

    fn item_source(&self, id: &str) -> Option<EntityId> {
        if let Some(node) = self.state.node(id) {
            return Some(node.source_entity_id.clone());
        }
        self.state.group(id).map(|g| g.source_entity_id.clone())
    }

    /// (item id, source id, radius) for every rendered item.
    fn item_layout(&self) -> Vec<(String, EntityId, f64)> {
        let nodes = self
            .state
            .nodes
            .iter()
            .map(|n| (n.id().to_string(), n.source_entity_id.clone(), self.config.item_radius));
        let groups = self
            .state
            .groups
            .iter()
            .map(|g| (g.id.clone(), g.source_entity_id.clone(), self.config.group_radius));
        nodes.chain(groups).collect()
    }

    /// Render-ready items with their current positions.
    pub fn items(&self) -> Vec<PreviewItemView> {
        let mut out = Vec::with_capacity(self.state.item_count());
        for node in &self.state.nodes {
            let Some(p) = self.item_position(node.id().as_str()) else {
                continue;
            };
            out.push(PreviewItemView {
                id: node.id().to_string(),
                kind: PreviewItemKind::Node,
                label: node.entity.label_normalized.clone(),
                entity_type: node.entity.entity_type.clone(),
                source_entity_id: node.source_entity_id.clone(),
                x: p.x,
                y: p.y,
                radius: self.config.item_radius,
                count: 1,
            });
        }
        for group in &self.state.groups {
            let Some(p) = self.item_position(&group.id) else {
                continue;
            };
            out.push(PreviewItemView {
                id: group.id.clone(),
                kind: PreviewItemKind::Group,
                label: format!("{} {}", group.count, group.entity_type),
                entity_type: group.entity_type.clone(),
                source_entity_id: group.source_entity_id.clone(),
                x: p.x,
                y: p.y,
                radius: self.config.group_radius,
                count: group.count,
            });
        }
        out
    }

    /// Item under a world point, if any.
    pub fn item_at(&self, world: Point) -> Option<PreviewItemView> {
        self.items()
            .into_iter()
            .find(|item| Point::new(item.x, item.y).distance_to(world) <= item.radius)
    }

    /// Handle a click on a preview item.
    pub fn click_item(&mut self, store: &GraphStore, item_id: &str, modifier: bool) -> Option<PreviewAction> {
        if let Some(group) = self.state.group(item_id) {
            return Some(PreviewAction::ShowGroup { group: group.clone() });
        }
        let node = self.state.node(item_id)?.clone();
        if modifier {
            return match self.reveal(store, &node.entity.id)? {
                RevealOutcome::FetchNeighbors { entity_id } => Some(PreviewAction::FetchNeighbors { entity_id }),
                _ => None,
            };
        }
        let position = self
            .item_position(item_id)
            .or_else(|| self.state.source_positions.get(&node.source_entity_id).copied())
            .unwrap_or_default();
        Some(PreviewAction::Materialize {
            entity: node.entity,
            position,
        })
    }

    /// Clear all sources, state and cached positions.
    pub fn exit(&mut self) {
        if self.is_active() || !self.cache.is_empty() {
            info!("preview exited");
        }
        self.sources.clear();
        self.promoted.clear();
        self.promoted_positions.clear();
        self.neighbors.clear();
        self.state = PreviewState::default();
        self.cache.clear();
        self.sim = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    fn graph() -> GraphStore {
        let mut store = GraphStore::new();
        for (name, x) in [("a", 0.0), ("b", 400.0)] {
            store.add_entity(Entity::new(name, name, "person"));
            store.set_position(&id(name), Point::new(x, 0.0));
        }
        store
    }

    fn neighbors(entries: &[&str]) -> NeighborMap {
        let mut map = NeighborMap::new();
        map.insert(
            "person".to_string(),
            entries.iter().map(|e| Entity::new(*e, *e, "person")).collect(),
        );
        map
    }

    fn settle(engine: &mut PreviewEngine) {
        let mut frames = 0;
        while engine.step(16.0) == SimulationStatus::Running {
            frames += 1;
            assert!(frames < 1000);
        }
    }

    #[test]
    fn test_reveal_then_ingest() {
        let store = graph();
        let mut engine = PreviewEngine::new(PreviewConfig::default(), 20.0);
        assert_eq!(engine.phase(), PreviewPhase::Idle);

        let outcome = engine.reveal(&store, &id("a"));
        assert_eq!(outcome, Some(RevealOutcome::FetchNeighbors { entity_id: id("a") }));
        assert_eq!(engine.phase(), PreviewPhase::Active);
        assert!(engine.state().nodes.is_empty());

        assert!(engine.ingest_neighbors(&store, &id("a"), Some(neighbors(&["x", "y", "b"]))));
        let ids: Vec<&str> = engine.state().nodes.iter().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert!(engine.is_animating());

        settle(&mut engine);
        assert!(engine.cache().initialized("x").is_some());
        assert_eq!(engine.items().len(), 2);
    }

    #[test]
    fn test_missing_neighbors_is_empty_contribution() {
        let store = graph();
        let mut engine = PreviewEngine::new(PreviewConfig::default(), 20.0);
        engine.reveal(&store, &id("a"));
        engine.reveal(&store, &id("b"));
        engine.ingest_neighbors(&store, &id("a"), Some(neighbors(&["x"])));
        engine.ingest_neighbors(&store, &id("b"), None);
        assert_eq!(engine.state().nodes.len(), 1);
        assert_eq!(engine.state().source_entity_ids, vec![id("a"), id("b")]);
    }

    #[test]
    fn test_toggle_off_and_exit() {
        let store = graph();
        let mut engine = PreviewEngine::new(PreviewConfig::default(), 20.0);
        engine.reveal(&store, &id("a"));
        engine.ingest_neighbors(&store, &id("a"), Some(neighbors(&["x"])));
        engine.reveal(&store, &id("b"));
        engine.ingest_neighbors(&store, &id("b"), Some(neighbors(&["x", "z"])));
        assert_eq!(engine.state().node("x").unwrap().source_entity_id, id("b"));

        let outcome = engine.reveal(&store, &id("b"));
        assert_eq!(outcome, Some(RevealOutcome::Deactivated { entity_id: id("b") }));
        assert_eq!(engine.state().node("x").unwrap().source_entity_id, id("a"));
        assert!(engine.state().node("z").is_none());

        // Late response for a toggled-off source is ignored.
        assert!(!engine.ingest_neighbors(&store, &id("b"), Some(neighbors(&["late"]))));

        assert_eq!(engine.reveal(&store, &id("a")), Some(RevealOutcome::Exited));
        assert_eq!(engine.phase(), PreviewPhase::Idle);
        assert!(engine.cache().is_empty());
        assert_eq!(engine.state(), &PreviewState::default());
    }

    #[test]
    fn test_settled_items_do_not_replay() {
        let store = graph();
        let mut engine = PreviewEngine::new(PreviewConfig::default(), 20.0);
        engine.reveal(&store, &id("a"));
        engine.ingest_neighbors(&store, &id("a"), Some(neighbors(&["x", "y"])));
        settle(&mut engine);
        let x_before = engine.item_position("x").unwrap();

        engine.reveal(&store, &id("b"));
        engine.ingest_neighbors(&store, &id("b"), Some(neighbors(&["z"])));
        assert!(engine.is_animating());
        settle(&mut engine);
        assert_eq!(engine.item_position("x"), Some(x_before));
        assert!(engine.cache().initialized("z").is_some());
    }

    #[test]
    fn test_shared_neighbor_glides_to_new_source() {
        let store = graph();
        let mut engine = PreviewEngine::new(PreviewConfig::default(), 20.0);
        engine.reveal(&store, &id("a"));
        engine.ingest_neighbors(&store, &id("a"), Some(neighbors(&["x"])));
        settle(&mut engine);
        let before = engine.item_position("x").unwrap();
        assert!(before.distance_to(Point::new(0.0, 0.0)) < 200.0);

        // b is newer, so x is now attributed to b.
        engine.reveal(&store, &id("b"));
        engine.ingest_neighbors(&store, &id("b"), Some(neighbors(&["x"])));
        assert_eq!(engine.state().node("x").unwrap().source_entity_id, id("b"));
        assert_eq!(engine.item_position("x"), Some(before));
        assert!(engine.is_animating());
        assert!(engine.cache().get("x").is_none());

        settle(&mut engine);
        let after = engine.item_position("x").unwrap();
        assert!(after.distance_to(Point::new(400.0, 0.0)) < 200.0, "x settled at {after:?}");
        assert_eq!(engine.cache().initialized("x").unwrap().source_entity_id, id("b"));
    }

    #[test]
    fn test_rebuild_mid_flight_keeps_unfurl_progress() {
        let store = graph();
        let mut engine = PreviewEngine::new(PreviewConfig::default(), 20.0);
        engine.reveal(&store, &id("a"));
        engine.ingest_neighbors(&store, &id("a"), Some(neighbors(&["x"])));
        for _ in 0..10 {
            assert_eq!(engine.step(16.0), SimulationStatus::Running);
        }

        engine.reveal(&store, &id("b"));
        let progress = engine.sim.as_ref().map(|sim| sim.unfurl_progress());
        assert_eq!(progress, Some(10));
    }

    #[test]
    fn test_click_actions() {
        let store = graph();
        let mut engine = PreviewEngine::new(PreviewConfig::default(), 20.0);
        engine.reveal(&store, &id("a"));
        engine.ingest_neighbors(&store, &id("a"), Some(neighbors(&["x", "y"])));
        settle(&mut engine);

        let Some(PreviewAction::Materialize { entity, position }) = engine.click_item(&store, "x", false) else {
            panic!("expected materialize");
        };
        assert_eq!(entity.id, id("x"));
        assert_eq!(Some(position), engine.item_position("x"));

        let action = engine.click_item(&store, "y", true);
        assert_eq!(action, Some(PreviewAction::FetchNeighbors { entity_id: id("y") }));
        assert!(engine.is_source(&id("y")));
        assert!(engine.state().node("y").is_none());
        assert_eq!(engine.state().promoted.len(), 1);
        assert!(engine.state().source_positions.contains_key(&id("y")));

        assert_eq!(engine.click_item(&store, "nope", false), None);
    }

    #[test]
    fn test_group_click_shows_group() {
        let store = graph();
        let config = PreviewConfig {
            group_threshold: 2,
            ..PreviewConfig::default()
        };
        let mut engine = PreviewEngine::new(config, 20.0);
        engine.reveal(&store, &id("a"));
        engine.ingest_neighbors(&store, &id("a"), Some(neighbors(&["x", "y", "z"])));
        assert!(engine.state().nodes.is_empty());
        assert_eq!(engine.state().groups.len(), 1);

        let Some(PreviewAction::ShowGroup { group }) = engine.click_item(&store, "group:person", false) else {
            panic!("expected group");
        };
        assert_eq!(group.count, 3);
    }

    #[test]
    fn test_materialized_entity_leaves_preview() {
        let mut store = graph();
        let mut engine = PreviewEngine::new(PreviewConfig::default(), 20.0);
        engine.reveal(&store, &id("a"));
        engine.ingest_neighbors(&store, &id("a"), Some(neighbors(&["x", "y"])));
        settle(&mut engine);

        store.add_entity(Entity::new("x", "x", "person"));
        engine.recompute(&store);
        assert!(engine.state().node("x").is_none());
        assert!(engine.cache().get("x").is_none());
        assert!(engine.cache().initialized("y").is_some());
    }

    #[test]
    fn test_removed_source_is_dropped() {
        let mut store = graph();
        let mut engine = PreviewEngine::new(PreviewConfig::default(), 20.0);
        engine.reveal(&store, &id("a"));
        store.remove_entities([&id("a")]);
        engine.sync_with_graph(&store);
        assert_eq!(engine.phase(), PreviewPhase::Idle);
    }
}
