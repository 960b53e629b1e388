//! Preview state and the newest-source-first merge.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::graph::{Entity, EntityId, NeighborMap};
use crate::transform::Point;

const GROUP_PREFIX: &str = "group:";

/// Item id of the group holding entities of `entity_type`.
pub fn group_id(entity_type: &str) -> String {
    format!("{GROUP_PREFIX}{entity_type}")
}

/// A provisional neighbor attributed to the source that revealed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewNode {
    #[serde(flatten)]
    pub entity: Entity,
    pub source_entity_id: EntityId,
}

impl PreviewNode {
    #[inline]
    pub fn id(&self) -> &EntityId {
        &self.entity.id
    }
}

/// Revealed entities of one type, shown as a single bubble.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewGroup {
    pub id: String,
    pub entity_type: String,
    /// Source of the first (newest-attributed) member.
    pub source_entity_id: EntityId,
    pub entities: Vec<Entity>,
    pub count: usize,
}

/// Everything the renderer needs to draw the preview overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewState {
    pub is_active: bool,
    /// Active sources, oldest first.
    pub source_entity_ids: Vec<EntityId>,
    pub source_positions: BTreeMap<EntityId, Point>,
    /// Sources promoted from preview items; they are not in the main graph.
    pub promoted: Vec<PreviewNode>,
    pub nodes: Vec<PreviewNode>,
    pub groups: Vec<PreviewGroup>,
}

impl PreviewState {
    /// Ids of every rendered item (node ids and group ids).
    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .map(|n| n.id().as_str())
            .chain(self.groups.iter().map(|g| g.id.as_str()))
    }

    pub fn item_count(&self) -> usize {
        self.nodes.len() + self.groups.len()
    }

    pub fn node(&self, id: &str) -> Option<&PreviewNode> {
        self.nodes.iter().find(|n| n.id().as_str() == id)
    }

    pub fn group(&self, id: &str) -> Option<&PreviewGroup> {
        self.groups.iter().find(|g| g.id == id)
    }
}

/// Merge the neighbor sets of `sources` into preview nodes or groups.
///
/// `sources` is in activation order; the merge walks it newest first so an
/// entity reachable from several sources is attributed to the newest one.
/// Entities in the main graph (`in_graph`), entities that are themselves
/// sources, and entities already attributed are skipped. Sources whose
/// neighbors have not arrived contribute nothing.
///
/// Returns groups instead of nodes when more than `group_threshold`
/// entities survive the merge.
pub fn merge_neighbors<F>(
    sources: &[EntityId],
    neighbors: &HashMap<EntityId, NeighborMap>,
    in_graph: F,
    group_threshold: usize,
) -> (Vec<PreviewNode>, Vec<PreviewGroup>)
where
    F: Fn(&EntityId) -> bool,
{
    let source_set: HashSet<&EntityId> = sources.iter().collect();
    let mut seen: HashSet<&EntityId> = HashSet::new();
    let mut nodes = Vec::new();

    for source in sources.iter().rev() {
        let Some(map) = neighbors.get(source) else {
            continue;
        };
        for (map_type, entities) in map {
            for entity in entities {
                if in_graph(&entity.id) || source_set.contains(&entity.id) || !seen.insert(&entity.id) {
                    continue;
                }
                let mut entity = entity.clone();
                if entity.entity_type.is_empty() {
                    entity.entity_type = map_type.clone();
                }
                nodes.push(PreviewNode {
                    entity,
                    source_entity_id: source.clone(),
                });
            }
        }
    }

    if nodes.len() <= group_threshold {
        return (nodes, Vec::new());
    }

    let mut by_type: BTreeMap<String, PreviewGroup> = BTreeMap::new();
    for node in nodes {
        let group = by_type
            .entry(node.entity.entity_type.clone())
            .or_insert_with(|| PreviewGroup {
                id: group_id(&node.entity.entity_type),
                entity_type: node.entity.entity_type.clone(),
                source_entity_id: node.source_entity_id.clone(),
                entities: Vec::new(),
                count: 0,
            });
        group.entities.push(node.entity);
        group.count += 1;
    }
    (Vec::new(), by_type.into_values().collect())
}
