//! GraphStore - the in-memory node/link set shared by every subsystem.
//!
//! Topology lives in petgraph's StableGraph so node indices stay valid while
//! other nodes are removed. Entity ids map to indices through a side table;
//! relationship ids map to edge indices so duplicate relationships are
//! dropped on insert.

use std::collections::HashMap;

use petgraph::Undirected;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;

use super::entity::{Entity, EntityId, Relationship};
use super::link::GraphLink;
use super::node::GraphNode;
use crate::transform::{Bounds, Point};

/// The node/link set of one open workspace.
///
/// This struct manages:
/// - Graph topology via petgraph (undirected)
/// - Per-node layout state (position, pin, flags)
/// - Entity id to node index mapping
/// - Relationship id to edge index mapping
pub struct GraphStore {
    graph: StableGraph<GraphNode, GraphLink, Undirected>,
    id_to_index: HashMap<EntityId, NodeIndex>,
    relationship_to_edge: HashMap<String, EdgeIndex>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            graph: StableGraph::default(),
            id_to_index: HashMap::new(),
            relationship_to_edge: HashMap::new(),
        }
    }

    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        Self {
            graph: StableGraph::with_capacity(node_capacity, edge_capacity),
            id_to_index: HashMap::with_capacity(node_capacity),
            relationship_to_edge: HashMap::with_capacity(edge_capacity),
        }
    }

    // =========================================================================
    // Node Operations
    // =========================================================================

    /// Add an entity. Returns false if it is already present.
    pub fn add_entity(&mut self, entity: Entity) -> bool {
        if self.id_to_index.contains_key(&entity.id) {
            return false;
        }
        let id = entity.id.clone();
        let index = self.graph.add_node(GraphNode::new(entity));
        self.id_to_index.insert(id, index);
        true
    }

    /// Add entities, returning the ids that were actually new.
    pub fn add_entities<I: IntoIterator<Item = Entity>>(&mut self, entities: I) -> Vec<EntityId> {
        let mut added = Vec::new();
        for entity in entities {
            let id = entity.id.clone();
            if self.add_entity(entity) {
                added.push(id);
            }
        }
        added
    }

    /// Remove entities and, in the same update, every link touching them.
    ///
    /// Returns the number of entities removed.
    pub fn remove_entities<'a, I: IntoIterator<Item = &'a EntityId>>(&mut self, ids: I) -> usize {
        let mut removed = 0;
        for id in ids {
            let Some(index) = self.id_to_index.remove(id) else {
                continue;
            };
            let edges: Vec<EdgeIndex> = self.graph.edges(index).map(|e| e.id()).collect();
            for edge in edges {
                if let Some(link) = self.graph.remove_edge(edge) {
                    self.relationship_to_edge.remove(&link.relationship_id);
                }
            }
            self.graph.remove_node(index);
            removed += 1;
        }
        removed
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.id_to_index.contains_key(id)
    }

    pub fn node(&self, id: &EntityId) -> Option<&GraphNode> {
        self.id_to_index.get(id).and_then(|&i| self.graph.node_weight(i))
    }

    pub fn node_mut(&mut self, id: &EntityId) -> Option<&mut GraphNode> {
        let index = *self.id_to_index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_weights()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut GraphNode> {
        self.graph.node_weights_mut()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.graph.node_weights().map(|n| n.id())
    }

    pub fn position(&self, id: &EntityId) -> Option<Point> {
        self.node(id).and_then(|n| n.position)
    }

    pub fn set_position(&mut self, id: &EntityId, position: Point) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.position = Some(position);
                if node.fixed.is_some() {
                    node.fixed = Some(position);
                }
                true
            }
            None => false,
        }
    }

    /// Ids and positions of every positioned node.
    pub fn positioned(&self) -> impl Iterator<Item = (&EntityId, Point)> {
        self.graph
            .node_weights()
            .filter_map(|n| n.position.map(|p| (n.id(), p)))
    }

    pub fn positioned_points(&self) -> Vec<Point> {
        self.positioned().map(|(_, p)| p).collect()
    }

    // =========================================================================
    // Link Operations
    // =========================================================================

    /// Add a relationship as a link. Returns false when an endpoint is missing,
    /// the relationship id is already present, or it is a self-loop.
    pub fn add_relationship(&mut self, relationship: &Relationship) -> bool {
        if self.relationship_to_edge.contains_key(&relationship.relationship_id) {
            return false;
        }
        let (Some(&a), Some(&b)) = (
            self.id_to_index.get(&relationship.source_entity_id),
            self.id_to_index.get(&relationship.related_entity_id),
        ) else {
            return false;
        };
        if a == b {
            return false;
        }
        let edge = self.graph.add_edge(a, b, GraphLink::from(relationship));
        self.relationship_to_edge
            .insert(relationship.relationship_id.clone(), edge);
        true
    }

    /// Add relationships, returning how many became links.
    pub fn add_relationships<'a, I: IntoIterator<Item = &'a Relationship>>(&mut self, relationships: I) -> usize {
        relationships
            .into_iter()
            .filter(|r| self.add_relationship(r))
            .count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn links(&self) -> impl Iterator<Item = &GraphLink> {
        self.graph.edge_weights()
    }

    pub fn links_mut(&mut self) -> impl Iterator<Item = &mut GraphLink> {
        self.graph.edge_weights_mut()
    }

    /// Ids of all entities linked to `id`.
    pub fn neighbors(&self, id: &EntityId) -> Vec<EntityId> {
        self.id_to_index
            .get(id)
            .map(|&index| {
                self.graph
                    .neighbors(index)
                    .filter_map(|n| self.graph.node_weight(n).map(|node| node.id().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of links touching `id`.
    pub fn degree(&self, id: &EntityId) -> usize {
        self.id_to_index
            .get(id)
            .map(|&index| self.graph.edges(index).count())
            .unwrap_or(0)
    }

    // =========================================================================
    // Utilities
    // =========================================================================

    /// Bounding box of all positioned nodes.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(self.positioned().map(|(_, p)| p))
    }

    pub fn clear(&mut self) {
        self.graph.clear();
        self.id_to_index.clear();
        self.relationship_to_edge.clear();
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str) -> Entity {
        Entity::new(id, id, "person")
    }

    #[test]
    fn test_add_entity_dedups() {
        let mut store = GraphStore::new();
        assert!(store.add_entity(entity("a")));
        assert!(!store.add_entity(entity("a")));
        assert_eq!(store.node_count(), 1);

        let added = store.add_entities([entity("a"), entity("b"), entity("c")]);
        assert_eq!(added, vec![EntityId::from("b"), EntityId::from("c")]);
        assert_eq!(store.node_count(), 3);
    }

    #[test]
    fn test_presized_store_starts_empty() {
        let mut store = GraphStore::with_capacity(4, 2);
        assert_eq!(store.node_count(), 0);
        store.add_entities([entity("a"), entity("b"), entity("c"), entity("d"), entity("e")]);
        assert!(store.add_relationship(&Relationship::new("r1", "knows", "a", "e")));
        assert_eq!(store.node_count(), 5);
        assert_eq!(store.link_count(), 1);
    }

    #[test]
    fn test_add_relationship_requires_endpoints() {
        let mut store = GraphStore::new();
        store.add_entities([entity("a"), entity("b")]);

        assert!(store.add_relationship(&Relationship::new("r1", "knows", "a", "b")));
        assert!(!store.add_relationship(&Relationship::new("r1", "knows", "a", "b")));
        assert!(!store.add_relationship(&Relationship::new("r2", "knows", "a", "missing")));
        assert!(!store.add_relationship(&Relationship::new("r3", "knows", "a", "a")));
        assert_eq!(store.link_count(), 1);
    }

    #[test]
    fn test_remove_drops_links_in_same_update() {
        let mut store = GraphStore::new();
        store.add_entities([entity("a"), entity("b"), entity("c")]);
        store.add_relationship(&Relationship::new("r1", "knows", "a", "b"));
        store.add_relationship(&Relationship::new("r2", "knows", "b", "c"));

        assert_eq!(store.remove_entities([&EntityId::from("b")]), 1);
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.link_count(), 0);
        for link in store.links() {
            assert!(store.contains(&link.source) && store.contains(&link.target));
        }

        // The relationship id is free again once its link is gone.
        store.add_entity(entity("b"));
        assert!(store.add_relationship(&Relationship::new("r1", "knows", "a", "b")));
    }

    #[test]
    fn test_neighbors_are_undirected() {
        let mut store = GraphStore::new();
        store.add_entities([entity("a"), entity("b"), entity("c")]);
        store.add_relationship(&Relationship::new("r1", "knows", "a", "b"));
        store.add_relationship(&Relationship::new("r2", "knows", "c", "a"));

        let mut neighbors = store.neighbors(&"a".into());
        neighbors.sort();
        assert_eq!(neighbors, vec![EntityId::from("b"), EntityId::from("c")]);
        assert_eq!(store.neighbors(&"b".into()), vec![EntityId::from("a")]);
        assert_eq!(store.degree(&"a".into()), 2);
    }

    #[test]
    fn test_positions_and_bounds() {
        let mut store = GraphStore::new();
        store.add_entities([entity("a"), entity("b"), entity("c")]);
        assert!(store.bounds().is_none());

        store.set_position(&"a".into(), Point::new(-10.0, -5.0));
        store.set_position(&"b".into(), Point::new(10.0, 5.0));
        let bounds = store.bounds().unwrap();
        assert_eq!((bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y), (-10.0, -5.0, 10.0, 5.0));
        assert_eq!(store.positioned().count(), 2);
    }

    #[test]
    fn test_set_position_moves_pin() {
        let mut store = GraphStore::new();
        store.add_entity(entity("a"));
        store.set_position(&"a".into(), Point::new(1.0, 1.0));
        store.node_mut(&"a".into()).unwrap().pin();
        store.set_position(&"a".into(), Point::new(5.0, 6.0));
        assert_eq!(store.node(&"a".into()).unwrap().fixed, Some(Point::new(5.0, 6.0)));
    }

    #[test]
    fn test_clear() {
        let mut store = GraphStore::new();
        store.add_entities([entity("a"), entity("b")]);
        store.add_relationship(&Relationship::new("r1", "knows", "a", "b"));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.link_count(), 0);
        assert!(store.add_entity(entity("a")));
    }
}
