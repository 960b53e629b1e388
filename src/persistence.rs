//! Debounced view-state persistence.
//!
//! Every mutation that should eventually be saved (drag end, zoom, pan,
//! layout settle) calls [`SaveDebouncer::touch`]. A save becomes due once
//! `debounce_ms` have passed without another touch. The host polls with its
//! frame clock; nothing here owns a timer.

use std::collections::BTreeMap;

use log::debug;

use crate::graph::{EntityId, GraphStore, ViewState};
use crate::transform::{Point, Transform};

#[derive(Debug, Clone)]
pub struct SaveDebouncer {
    debounce_ms: f64,
    due_at: Option<f64>,
}

impl SaveDebouncer {
    pub fn new(debounce_ms: f64) -> Self {
        Self {
            debounce_ms,
            due_at: None,
        }
    }

    /// Schedule a save, pushing back any save already pending.
    pub fn touch(&mut self, now_ms: f64) {
        self.due_at = Some(now_ms + self.debounce_ms);
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    /// True exactly once when the quiet period has elapsed.
    pub fn poll(&mut self, now_ms: f64) -> bool {
        match self.due_at {
            Some(due) if now_ms >= due => {
                self.due_at = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the pending save, e.g. on teardown.
    pub fn cancel(&mut self) {
        if self.due_at.take().is_some() {
            debug!("pending view-state save cancelled");
        }
    }
}

/// Snapshot the live positions and transform for persistence.
pub fn capture_view_state(store: &GraphStore, transform: &Transform) -> ViewState {
    let entity_positions: BTreeMap<EntityId, Point> = store
        .positioned()
        .map(|(id, p)| (id.clone(), p))
        .collect();
    ViewState {
        scale: transform.scale,
        pan_x: transform.translate_x,
        pan_y: transform.translate_y,
        entity_positions,
    }
}

/// Transform stored in a view state.
pub fn transform_of(view: &ViewState) -> Transform {
    Transform::new(view.pan_x, view.pan_y, view.scale)
}
