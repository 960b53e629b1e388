//! ViewportCuller - visible node/link/badge sets and their per-pass diff.
//!
//! Culling is only active above `node_threshold` nodes. Each pass queries
//! the R-tree for nodes inside the padded viewport, derives link and badge
//! visibility from that, and reports only what changed since the previous
//! pass. The index is rebuilt lazily after [`ViewportCuller::mark_dirty`];
//! during a drag it is left stale on purpose and rebuilt on drag end.

use std::collections::{HashMap, HashSet};

use log::debug;
use serde::Serialize;

use crate::config::CullingConfig;
use crate::graph::{EntityId, GraphStore};
use crate::spatial::SpatialIndex;
use crate::transform::Transform;

/// Relationship-count badge on a visible node with hidden neighbors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub entity_id: EntityId,
    pub count: usize,
    pub label: String,
}

/// Changes produced by one culling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityDiff {
    pub shown_nodes: Vec<EntityId>,
    pub hidden_nodes: Vec<EntityId>,
    pub shown_links: Vec<String>,
    pub hidden_links: Vec<String>,
    pub badges_set: Vec<Badge>,
    pub badges_cleared: Vec<EntityId>,
}

impl VisibilityDiff {
    pub fn is_empty(&self) -> bool {
        self.shown_nodes.is_empty()
            && self.hidden_nodes.is_empty()
            && self.shown_links.is_empty()
            && self.hidden_links.is_empty()
            && self.badges_set.is_empty()
            && self.badges_cleared.is_empty()
    }
}

/// Display text for a badge count, e.g. `"42"` or `"1k+"`.
pub fn badge_label(count: usize, cap: usize) -> String {
    if count < cap {
        count.to_string()
    } else if cap >= 1000 && cap % 1000 == 0 {
        format!("{}k+", cap / 1000)
    } else {
        format!("{cap}+")
    }
}

pub struct ViewportCuller {
    config: CullingConfig,
    index: SpatialIndex,
    index_dirty: bool,
    visible_nodes: HashSet<EntityId>,
    visible_links: HashSet<String>,
    badges: HashMap<EntityId, Badge>,
    passes: u64,
}

impl ViewportCuller {
    pub fn new(config: CullingConfig) -> Self {
        Self {
            config,
            index: SpatialIndex::new(),
            index_dirty: true,
            visible_nodes: HashSet::new(),
            visible_links: HashSet::new(),
            badges: HashMap::new(),
            passes: 0,
        }
    }

    pub fn is_active(&self, store: &GraphStore) -> bool {
        store.node_count() > self.config.node_threshold
    }

    /// Positions changed in bulk; rebuild the index before the next query.
    pub fn mark_dirty(&mut self) {
        self.index_dirty = true;
    }

    /// Spatial index over node positions, rebuilt first if stale.
    pub fn index(&mut self, store: &GraphStore) -> &SpatialIndex {
        if self.index_dirty {
            self.index.rebuild(store.positioned());
            self.index_dirty = false;
        }
        &self.index
    }

    /// Number of culling passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn is_visible(&self, id: &EntityId) -> bool {
        self.visible_nodes.contains(id)
    }

    pub fn badges(&self) -> impl Iterator<Item = &Badge> {
        self.badges.values()
    }

    /// Forget all visibility state, e.g. when a workspace is closed.
    pub fn reset(&mut self) {
        self.index.clear();
        self.index_dirty = true;
        self.visible_nodes.clear();
        self.visible_links.clear();
        self.badges.clear();
    }

    /// Recompute visibility for the current transform and return the diff
    /// against the previous pass. Culled flags on the store are updated for
    /// every node and link whose visibility changed.
    pub fn update(
        &mut self,
        store: &mut GraphStore,
        transform: &Transform,
        viewport_width: f64,
        viewport_height: f64,
    ) -> VisibilityDiff {
        self.passes += 1;

        let visible: HashSet<EntityId> = if self.is_active(store) {
            let bounds = transform.visible_world_bounds(viewport_width, viewport_height, self.config.viewport_padding);
            self.index(store).in_bounds(&bounds).into_iter().cloned().collect()
        } else {
            store.entity_ids().cloned().collect()
        };

        let mut visible_links = HashSet::new();
        let mut hidden_neighbors: HashMap<&EntityId, usize> = HashMap::new();
        for link in store.links() {
            match (visible.contains(&link.source), visible.contains(&link.target)) {
                (true, true) => {
                    visible_links.insert(link.relationship_id.clone());
                }
                (true, false) => *hidden_neighbors.entry(&link.source).or_default() += 1,
                (false, true) => *hidden_neighbors.entry(&link.target).or_default() += 1,
                (false, false) => {}
            }
        }

        let cap = self.config.badge_cap;
        let badges: HashMap<EntityId, Badge> = hidden_neighbors
            .into_keys()
            .map(|id| {
                let count = store.degree(id);
                let badge = Badge {
                    entity_id: id.clone(),
                    count,
                    label: badge_label(count, cap),
                };
                (id.clone(), badge)
            })
            .collect();

        let mut diff = VisibilityDiff {
            shown_nodes: visible.difference(&self.visible_nodes).cloned().collect(),
            hidden_nodes: self.visible_nodes.difference(&visible).cloned().collect(),
            shown_links: visible_links.difference(&self.visible_links).cloned().collect(),
            hidden_links: self.visible_links.difference(&visible_links).cloned().collect(),
            badges_set: badges
                .values()
                .filter(|b| self.badges.get(&b.entity_id) != Some(*b))
                .cloned()
                .collect(),
            badges_cleared: self
                .badges
                .keys()
                .filter(|id| !badges.contains_key(*id))
                .cloned()
                .collect(),
        };
        diff.shown_nodes.sort();
        diff.hidden_nodes.sort();
        diff.shown_links.sort();
        diff.hidden_links.sort();
        diff.badges_set.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        diff.badges_cleared.sort();

        for id in &diff.shown_nodes {
            if let Some(node) = store.node_mut(id) {
                node.state.set_culled(false);
            }
        }
        for id in &diff.hidden_nodes {
            if let Some(node) = store.node_mut(id) {
                node.state.set_culled(true);
            }
        }
        for link in store.links_mut() {
            link.state.set_culled(!visible_links.contains(&link.relationship_id));
        }

        if !diff.is_empty() {
            debug!(
                "culling pass {}: {} visible, +{} -{} nodes, {} badges",
                self.passes,
                visible.len(),
                diff.shown_nodes.len(),
                diff.hidden_nodes.len(),
                badges.len()
            );
        }

        self.visible_nodes = visible;
        self.visible_links = visible_links;
        self.badges = badges;
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, Relationship};
    use crate::transform::Point;

    /// `n` nodes on a row, 100 units apart, each linked to the next.
    fn row_store(n: usize) -> GraphStore {
        let mut store = GraphStore::new();
        for i in 0..n {
            let id = format!("n{i}");
            store.add_entity(Entity::new(id.clone(), "", "person"));
            store.set_position(&EntityId::new(id), Point::new(i as f64 * 100.0, 0.0));
        }
        for i in 1..n {
            store.add_relationship(&Relationship::new(format!("r{i}"), "", format!("n{}", i - 1), format!("n{i}")));
        }
        store
    }

    fn small_config() -> CullingConfig {
        CullingConfig {
            node_threshold: 10,
            viewport_padding: 0.0,
            badge_cap: 1000,
        }
    }

    #[test]
    fn test_badge_label() {
        assert_eq!(badge_label(3, 1000), "3");
        assert_eq!(badge_label(999, 1000), "999");
        assert_eq!(badge_label(1000, 1000), "1k+");
        assert_eq!(badge_label(5000, 1000), "1k+");
        assert_eq!(badge_label(50, 40), "40+");
    }

    #[test]
    fn test_below_threshold_everything_visible() {
        let mut store = row_store(5);
        let mut culler = ViewportCuller::new(small_config());
        let diff = culler.update(&mut store, &Transform::IDENTITY, 10.0, 10.0);
        assert_eq!(diff.shown_nodes.len(), 5);
        assert_eq!(diff.shown_links.len(), 4);
        assert!(diff.badges_set.is_empty());
        assert!(store.nodes().all(|n| !n.state.is_culled()));
    }

    #[test]
    fn test_culls_outside_viewport_with_badges() {
        let mut store = row_store(20);
        let mut culler = ViewportCuller::new(small_config());
        // World x in [0, 250] is visible: n0, n1, n2.
        let diff = culler.update(&mut store, &Transform::IDENTITY, 250.0, 100.0);
        assert_eq!(diff.shown_nodes, vec![EntityId::from("n0"), EntityId::from("n1"), EntityId::from("n2")]);
        assert_eq!(diff.shown_links, vec!["r1".to_string(), "r2".to_string()]);
        assert_eq!(diff.badges_set.len(), 1);
        assert_eq!(diff.badges_set[0].entity_id, EntityId::from("n2"));
        assert_eq!(diff.badges_set[0].count, 2);
        assert!(store.node(&EntityId::from("n10")).unwrap().state.is_culled());
        assert!(!store.node(&EntityId::from("n1")).unwrap().state.is_culled());
        assert!(culler.is_visible(&EntityId::from("n2")));
        assert!(!culler.is_visible(&EntityId::from("n3")));
    }

    #[test]
    fn test_pan_reports_only_changes() {
        let mut store = row_store(20);
        let mut culler = ViewportCuller::new(small_config());
        culler.update(&mut store, &Transform::IDENTITY, 250.0, 100.0);

        // Shift the view right by 100 world units: n0 leaves, n3 enters.
        let panned = Transform::IDENTITY.pan_by(-100.0, 0.0);
        let diff = culler.update(&mut store, &panned, 250.0, 100.0);
        assert_eq!(diff.shown_nodes, vec![EntityId::from("n3")]);
        assert_eq!(diff.hidden_nodes, vec![EntityId::from("n0")]);
        assert_eq!(diff.shown_links, vec!["r3".to_string()]);
        assert_eq!(diff.hidden_links, vec!["r1".to_string()]);
        assert_eq!(diff.badges_cleared, vec![EntityId::from("n2")]);
        let badged: Vec<_> = diff.badges_set.iter().map(|b| b.entity_id.as_str()).collect();
        assert_eq!(badged, vec!["n1", "n3"]);

        let again = culler.update(&mut store, &panned, 250.0, 100.0);
        assert!(again.is_empty());
        assert_eq!(culler.passes(), 3);
    }

    #[test]
    fn test_stale_index_until_marked_dirty() {
        let mut store = row_store(20);
        let mut culler = ViewportCuller::new(small_config());
        culler.update(&mut store, &Transform::IDENTITY, 250.0, 100.0);

        store.set_position(&EntityId::from("n15"), Point::new(50.0, 50.0));
        let diff = culler.update(&mut store, &Transform::IDENTITY, 250.0, 100.0);
        assert!(diff.shown_nodes.is_empty());

        culler.mark_dirty();
        let diff = culler.update(&mut store, &Transform::IDENTITY, 250.0, 100.0);
        assert_eq!(diff.shown_nodes, vec![EntityId::from("n15")]);
    }
}
