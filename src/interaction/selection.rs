//! Selection state machine.
//!
//! States follow from the selected set: none, one, or several nodes.
//! Transitions come from node clicks (plain, ctrl/cmd, shift), empty-canvas
//! clicks, and empty-canvas drags that turn into a rectangle select once
//! the pointer has travelled `min_drag_distance` pixels.
//!
//! A canvas click that is really the tail of a rectangle drag or of a
//! modifier click must not clear the selection. Both arm a short-lived
//! guard that swallows the next canvas click.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;
use crate::graph::{EntityId, GraphStore};
use crate::spatial::SpatialIndex;
use crate::transform::{Bounds, Point, Rect, Transform, screen_to_world};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SelectionPhase {
    NoSelection,
    SingleSelected,
    MultiSelected,
}

/// Keyboard modifiers held during a pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    /// Ctrl on Linux/Windows, Cmd on macOS.
    pub ctrl: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { ctrl: false, shift: false };
    pub const CTRL: Modifiers = Modifiers { ctrl: true, shift: false };
    pub const SHIFT: Modifiers = Modifiers { ctrl: false, shift: true };
}

/// What a click did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClickOutcome {
    /// Selection replaced by the clicked node.
    Selected,
    /// Clicked node added to or removed from the selection.
    Toggled,
    /// Clicked node is part of a multi-selection, which is kept for a group drag.
    Preserved,
    /// Shift-click: reveal the node's neighbors; selection unchanged.
    #[serde(rename_all = "camelCase")]
    RevealNeighbors { entity_id: EntityId },
    Cleared,
    /// Canvas click swallowed by the guard.
    Suppressed,
    /// Canvas click with nothing to clear.
    Ignored,
}

/// Rectangle spanned by two corners, independent of drag direction.
pub fn compute_selection_rect(start: Point, end: Point) -> Rect {
    Rect {
        x: start.x.min(end.x),
        y: start.y.min(end.y),
        width: (end.x - start.x).abs(),
        height: (end.y - start.y).abs(),
    }
}

#[derive(Debug, Clone, Copy)]
struct RectDrag {
    start: Point,
    current: Point,
    active: bool,
}

pub struct SelectionModel {
    config: SelectionConfig,
    selected: BTreeSet<EntityId>,
    highlighted: BTreeSet<EntityId>,
    rect: Option<RectDrag>,
    guard_until: Option<f64>,
}

impl SelectionModel {
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            selected: BTreeSet::new(),
            highlighted: BTreeSet::new(),
            rect: None,
            guard_until: None,
        }
    }

    pub fn phase(&self) -> SelectionPhase {
        match self.selected.len() {
            0 => SelectionPhase::NoSelection,
            1 => SelectionPhase::SingleSelected,
            _ => SelectionPhase::MultiSelected,
        }
    }

    pub fn is_selected(&self, id: &EntityId) -> bool {
        self.selected.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected ids in sorted order.
    pub fn selected(&self) -> impl Iterator<Item = &EntityId> {
        self.selected.iter()
    }

    /// Nodes inside the live selection rectangle.
    pub fn highlighted(&self) -> impl Iterator<Item = &EntityId> {
        self.highlighted.iter()
    }

    fn arm_guard(&mut self, now_ms: f64) {
        self.guard_until = Some(now_ms + self.config.click_guard_ms);
    }

    /// Click on a node.
    pub fn click_node(&mut self, id: &EntityId, modifiers: Modifiers, now_ms: f64) -> ClickOutcome {
        if modifiers.shift {
            self.arm_guard(now_ms);
            return ClickOutcome::RevealNeighbors { entity_id: id.clone() };
        }
        if modifiers.ctrl {
            self.arm_guard(now_ms);
            if !self.selected.remove(id) {
                self.selected.insert(id.clone());
            }
            return ClickOutcome::Toggled;
        }
        if self.selected.len() > 1 && self.selected.contains(id) {
            return ClickOutcome::Preserved;
        }
        self.selected.clear();
        self.selected.insert(id.clone());
        ClickOutcome::Selected
    }

    /// Click on empty canvas.
    pub fn click_canvas(&mut self, now_ms: f64) -> ClickOutcome {
        if let Some(until) = self.guard_until.take()
            && now_ms <= until
        {
            return ClickOutcome::Suppressed;
        }
        if self.selected.is_empty() {
            return ClickOutcome::Ignored;
        }
        self.selected.clear();
        ClickOutcome::Cleared
    }

    /// Pointer down on empty canvas, in screen coordinates.
    pub fn begin_canvas_drag(&mut self, screen: Point) {
        self.rect = Some(RectDrag {
            start: screen,
            current: screen,
            active: false,
        });
        self.highlighted.clear();
    }

    /// Pointer moved during a canvas drag. Once past the drag threshold the
    /// nodes inside the rectangle become highlighted. Returns true while a
    /// rectangle select is in progress.
    pub fn update_canvas_drag(&mut self, screen: Point, transform: &Transform, index: &SpatialIndex) -> bool {
        let Some(drag) = self.rect.as_mut() else {
            return false;
        };
        drag.current = screen;
        if !drag.active && drag.start.distance_to(screen) >= self.config.min_drag_distance {
            drag.active = true;
        }
        if !drag.active {
            return false;
        }

        let r = compute_selection_rect(drag.start, drag.current);
        let a = screen_to_world(r.x, r.y, transform);
        let b = screen_to_world(r.x + r.width, r.y + r.height, transform);
        let bounds = Bounds {
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
        };
        self.highlighted = index.in_bounds(&bounds).into_iter().cloned().collect();
        true
    }

    /// Pointer released. Commits the highlighted set when a rectangle select
    /// was in progress and returns true in that case.
    pub fn end_canvas_drag(&mut self, now_ms: f64) -> bool {
        let Some(drag) = self.rect.take() else {
            return false;
        };
        if !drag.active {
            return false;
        }
        self.selected = std::mem::take(&mut self.highlighted);
        self.arm_guard(now_ms);
        true
    }

    /// Screen rectangle of the drag in progress.
    pub fn rect(&self) -> Option<Rect> {
        self.rect
            .filter(|d| d.active)
            .map(|d| compute_selection_rect(d.start, d.current))
    }

    /// Replace the selection outright.
    pub fn set_selection<I: IntoIterator<Item = EntityId>>(&mut self, ids: I) {
        self.selected = ids.into_iter().collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.highlighted.clear();
        self.rect = None;
        self.guard_until = None;
    }

    /// Forget ids that are no longer in the graph.
    pub fn retain_existing(&mut self, store: &GraphStore) {
        self.selected.retain(|id| store.contains(id));
        self.highlighted.retain(|id| store.contains(id));
    }

    /// Write selected/highlighted flags onto every node.
    pub fn apply_to(&self, store: &mut GraphStore) {
        for node in store.nodes_mut() {
            let id = &node.entity.id;
            let selected = self.selected.contains(id);
            let highlighted = self.highlighted.contains(id);
            node.state.set_selected(selected);
            node.state.set_highlighted(highlighted);
        }
    }
}
