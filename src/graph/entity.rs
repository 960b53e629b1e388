//! Data shapes supplied by (and persisted through) the workspace service.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transform::Point;

/// Stable entity identifier; the join key across every structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A typed knowledge-graph entity (person, organization, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    #[serde(default)]
    pub label_normalized: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl Entity {
    pub fn new(id: impl Into<String>, label: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(id),
            label_normalized: label.into(),
            entity_type: entity_type.into(),
        }
    }
}

/// A relationship between two entities. Undirected for layout purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub relationship_id: String,
    #[serde(default)]
    pub predicate: String,
    pub source_entity_id: EntityId,
    pub related_entity_id: EntityId,
}

impl Relationship {
    pub fn new(
        relationship_id: impl Into<String>,
        predicate: impl Into<String>,
        source: impl Into<String>,
        related: impl Into<String>,
    ) -> Self {
        Self {
            relationship_id: relationship_id.into(),
            predicate: predicate.into(),
            source_entity_id: EntityId::new(source),
            related_entity_id: EntityId::new(related),
        }
    }
}

/// Persisted pan/zoom state and node positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub scale: f64,
    pub pan_x: f64,
    pub pan_y: f64,
    #[serde(default)]
    pub entity_positions: BTreeMap<EntityId, Point>,
}

/// Workspace contents as returned by fetch/add/remove.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub view_state: Option<ViewState>,
}

/// Related entities of a single entity, keyed by entity type.
pub type NeighborMap = BTreeMap<String, Vec<Entity>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_wire_shape() {
        let entity: Entity =
            serde_json::from_str(r#"{"id":"e1","labelNormalized":"acme corp","type":"organization"}"#)
                .unwrap();
        assert_eq!(entity.id.as_str(), "e1");
        assert_eq!(entity.entity_type, "organization");

        let json = serde_json::to_string(&entity).unwrap();
        assert!(json.contains(r#""type":"organization""#));
        assert!(json.contains(r#""labelNormalized":"acme corp""#));
    }

    #[test]
    fn test_view_state_wire_shape() {
        let state: ViewState = serde_json::from_str(
            r#"{"scale":0.5,"panX":10,"panY":-4,"entityPositions":{"a":{"x":1.25,"y":-3}}}"#,
        )
        .unwrap();
        assert_eq!(state.scale, 0.5);
        assert_eq!(state.entity_positions[&EntityId::from("a")], Point::new(1.25, -3.0));
    }
}
