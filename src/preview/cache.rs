//! Settled preview positions that survive state recomputation.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::graph::EntityId;
use crate::transform::Point;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPosition {
    pub x: f64,
    pub y: f64,
    /// Source the item was attributed to when it settled.
    pub source_entity_id: EntityId,
    /// Source position when this entry was written.
    pub source_x: f64,
    pub source_y: f64,
    pub initialized: bool,
}

impl CachedPosition {
    pub fn settled(position: Point, source: Point, source_entity_id: EntityId) -> Self {
        Self {
            x: position.x,
            y: position.y,
            source_entity_id,
            source_x: source.x,
            source_y: source.y,
            initialized: true,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Cached position carried along if the source has moved since.
    pub fn relative_to(&self, source: Point) -> Point {
        Point::new(
            self.x + (source.x - self.source_x),
            self.y + (source.y - self.source_y),
        )
    }

    /// Position for an item now attributed to `source_entity_id` at `source`.
    /// Only the source it settled around drags it along; under any other
    /// source it stays where it settled.
    pub fn follow(&self, source_entity_id: &EntityId, source: Point) -> Point {
        if &self.source_entity_id == source_entity_id {
            self.relative_to(source)
        } else {
            self.position()
        }
    }
}

/// Item id to cached position. Owned by one preview engine and cleared when
/// the preview is exited.
#[derive(Debug, Clone, Default)]
pub struct PreviewPositionCache {
    entries: HashMap<String, CachedPosition>,
}

impl PreviewPositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&CachedPosition> {
        self.entries.get(id)
    }

    /// Cached entry only if it was written by a finished simulation.
    pub fn initialized(&self, id: &str) -> Option<&CachedPosition> {
        self.entries.get(id).filter(|c| c.initialized)
    }

    pub fn insert(&mut self, id: impl Into<String>, position: CachedPosition) {
        self.entries.insert(id.into(), position);
    }

    pub fn remove(&mut self, id: &str) -> Option<CachedPosition> {
        self.entries.remove(id)
    }

    /// Drop entries for items no longer present. Returns how many were dropped.
    pub fn prune(&mut self, present: &HashSet<&str>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| present.contains(id.as_str()));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
