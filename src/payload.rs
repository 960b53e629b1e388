//! Drag-drop entity payloads.
//!
//! Entities dragged in from search results arrive as JSON text, either a
//! single entity object or an array of them.

use log::warn;
use serde::Deserialize;

use crate::error::{GraphError, Result};
use crate::graph::Entity;

#[derive(Deserialize)]
#[serde(untagged)]
enum DroppedEntities {
    Many(Vec<Entity>),
    One(Entity),
}

/// Parse a dropped payload. Fails with [`GraphError::MalformedPayload`] on
/// invalid JSON, on a shape that is not an entity or entity array, and on
/// entities with an empty id.
pub fn parse_dropped_entities(json: &str) -> Result<Vec<Entity>> {
    let parsed: DroppedEntities = serde_json::from_str(json).map_err(|err| {
        warn!("rejected dropped payload: {err}");
        GraphError::from(err)
    })?;
    let entities = match parsed {
        DroppedEntities::Many(entities) => entities,
        DroppedEntities::One(entity) => vec![entity],
    };
    if let Some(bad) = entities.iter().find(|e| e.id.as_str().is_empty()) {
        warn!("rejected dropped payload with empty entity id");
        return Err(GraphError::MalformedPayload(format!(
            "entity of type '{}' has an empty id",
            bad.entity_type
        )));
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_object() {
        let entities = parse_dropped_entities(r#"{"id":"e1","labelNormalized":"Acme","type":"organization"}"#).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_type, "organization");
        assert_eq!(entities[0].label_normalized, "Acme");
    }

    #[test]
    fn test_array() {
        let entities = parse_dropped_entities(r#"[{"id":"a","type":"person"},{"id":"b","type":"person"}]"#).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[1].id.as_str(), "b");
    }

    #[test]
    fn test_malformed() {
        for bad in ["", "not json", r#"{"label":"x"}"#, "[1,2]", r#"{"id":"","type":"person"}"#] {
            let err = parse_dropped_entities(bad).unwrap_err();
            assert!(matches!(err, GraphError::MalformedPayload(_)), "{bad}: {err}");
        }
    }
}
