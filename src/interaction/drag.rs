//! Node dragging.
//!
//! Dragging an unselected node (or the only selected one) moves just that
//! node. Dragging a member of a multi-selection moves the whole selection
//! by the dragged node's delta. Dragged nodes are pinned for the duration
//! so a running simulation does not fight the pointer.

use log::debug;

use super::selection::SelectionModel;
use crate::graph::{EntityId, GraphStore};
use crate::transform::Point;

/// Summary of a finished drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DragEnd {
    pub members: Vec<EntityId>,
    /// False for a press-and-release without movement.
    pub moved: bool,
}

struct DragSession {
    anchor: EntityId,
    /// Anchor position minus pointer position at grab time.
    grab_offset: Point,
    members: Vec<EntityId>,
    was_pinned: Vec<bool>,
    moved: bool,
}

#[derive(Default)]
pub struct DragController {
    session: Option<DragSession>,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    /// Nodes moved by the drag in progress.
    pub fn members(&self) -> &[EntityId] {
        self.session.as_ref().map(|s| s.members.as_slice()).unwrap_or_default()
    }

    /// Start dragging `id` from the world-space pointer position.
    /// Returns false if the node is unknown or unpositioned.
    pub fn begin(&mut self, store: &mut GraphStore, selection: &SelectionModel, id: &EntityId, pointer: Point) -> bool {
        let Some(anchor_at) = store.position(id) else {
            return false;
        };
        let members: Vec<EntityId> = if selection.len() > 1 && selection.is_selected(id) {
            selection.selected().filter(|m| store.contains(m)).cloned().collect()
        } else {
            vec![id.clone()]
        };

        let mut was_pinned = Vec::with_capacity(members.len());
        for member in &members {
            let Some(node) = store.node_mut(member) else {
                was_pinned.push(false);
                continue;
            };
            was_pinned.push(node.fixed.is_some());
            node.pin();
        }

        debug!("drag started on {id} moving {} nodes", members.len());
        self.session = Some(DragSession {
            anchor: id.clone(),
            grab_offset: Point::new(anchor_at.x - pointer.x, anchor_at.y - pointer.y),
            members,
            was_pinned,
            moved: false,
        });
        true
    }

    /// Pointer moved to a new world position. Returns the ids that moved.
    pub fn drag_to(&mut self, store: &mut GraphStore, pointer: Point) -> &[EntityId] {
        let Some(session) = self.session.as_mut() else {
            return &[];
        };
        let Some(current) = store.position(&session.anchor) else {
            return &[];
        };
        let dx = pointer.x + session.grab_offset.x - current.x;
        let dy = pointer.y + session.grab_offset.y - current.y;
        if dx == 0.0 && dy == 0.0 {
            return &[];
        }
        for member in &session.members {
            if let Some(p) = store.position(member) {
                store.set_position(member, Point::new(p.x + dx, p.y + dy));
            }
        }
        session.moved = true;
        &session.members
    }

    /// Release the pointer. Pins taken by the drag are released.
    pub fn end(&mut self, store: &mut GraphStore) -> Option<DragEnd> {
        let session = self.session.take()?;
        session.release_pins(store);
        Some(DragEnd {
            members: session.members,
            moved: session.moved,
        })
    }

    /// Abandon the drag, e.g. because the graph changed under it. Pins taken
    /// by the drag are released the same way `end` does.
    pub fn cancel(&mut self, store: &mut GraphStore) {
        if let Some(session) = self.session.take() {
            debug!("drag on {} cancelled", session.anchor);
            session.release_pins(store);
        }
    }
}

impl DragSession {
    fn release_pins(&self, store: &mut GraphStore) {
        for (member, was_pinned) in self.members.iter().zip(&self.was_pinned) {
            if !was_pinned && let Some(node) = store.node_mut(member) {
                node.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionConfig;
    use crate::graph::Entity;
    use crate::interaction::Modifiers;

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    fn store() -> GraphStore {
        let mut store = GraphStore::new();
        for (name, x) in [("a", 0.0), ("b", 100.0), ("c", 200.0)] {
            store.add_entity(Entity::new(name, name, "person"));
            store.set_position(&id(name), Point::new(x, 0.0));
        }
        store
    }

    #[test]
    fn test_single_drag_moves_only_that_node() {
        let mut store = store();
        let selection = SelectionModel::new(SelectionConfig::default());
        let mut drag = DragController::new();

        assert!(drag.begin(&mut store, &selection, &id("a"), Point::new(5.0, 5.0)));
        assert!(drag.is_dragging());
        assert!(store.node(&id("a")).unwrap().state.is_pinned());
        let moved = drag.drag_to(&mut store, Point::new(15.0, 25.0)).to_vec();
        assert_eq!(moved, vec![id("a")]);
        assert_eq!(store.position(&id("a")), Some(Point::new(10.0, 20.0)));
        assert_eq!(store.position(&id("b")), Some(Point::new(100.0, 0.0)));

        let end = drag.end(&mut store).unwrap();
        assert!(end.moved);
        assert!(!drag.is_dragging());
        assert!(store.node(&id("a")).unwrap().fixed.is_none());
    }

    #[test]
    fn test_group_drag_moves_selection_by_same_delta() {
        let mut store = store();
        let mut selection = SelectionModel::new(SelectionConfig::default());
        selection.click_node(&id("a"), Modifiers::NONE, 0.0);
        selection.click_node(&id("c"), Modifiers::CTRL, 0.0);

        let mut drag = DragController::new();
        drag.begin(&mut store, &selection, &id("c"), Point::new(200.0, 0.0));
        drag.drag_to(&mut store, Point::new(210.0, -5.0));
        drag.drag_to(&mut store, Point::new(220.0, -10.0));
        assert_eq!(store.position(&id("a")), Some(Point::new(20.0, -10.0)));
        assert_eq!(store.position(&id("c")), Some(Point::new(220.0, -10.0)));
        assert_eq!(store.position(&id("b")), Some(Point::new(100.0, 0.0)));
        drag.end(&mut store);
    }

    #[test]
    fn test_unselected_node_drags_alone_during_multi_selection() {
        let mut store = store();
        let mut selection = SelectionModel::new(SelectionConfig::default());
        selection.set_selection([id("a"), id("c")]);
        let mut drag = DragController::new();
        drag.begin(&mut store, &selection, &id("b"), Point::new(100.0, 0.0));
        assert_eq!(drag.members(), &[id("b")]);
    }

    #[test]
    fn test_previously_pinned_node_stays_pinned() {
        let mut store = store();
        store.node_mut(&id("a")).unwrap().pin();
        let selection = SelectionModel::new(SelectionConfig::default());
        let mut drag = DragController::new();
        drag.begin(&mut store, &selection, &id("a"), Point::new(0.0, 0.0));
        let end = drag.end(&mut store).unwrap();
        assert!(!end.moved);
        assert!(store.node(&id("a")).unwrap().state.is_pinned());
    }

    #[test]
    fn test_cancel_releases_drag_pins() {
        let mut store = store();
        store.node_mut(&id("c")).unwrap().pin();
        let mut selection = SelectionModel::new(SelectionConfig::default());
        selection.set_selection([id("a"), id("c")]);
        let mut drag = DragController::new();
        drag.begin(&mut store, &selection, &id("a"), Point::new(0.0, 0.0));
        drag.drag_to(&mut store, Point::new(30.0, 0.0));

        drag.cancel(&mut store);
        assert!(!drag.is_dragging());
        assert!(store.node(&id("a")).unwrap().fixed.is_none());
        assert!(!store.node(&id("a")).unwrap().state.is_pinned());
        assert!(store.node(&id("c")).unwrap().state.is_pinned());
        // Nothing left to end.
        assert_eq!(drag.end(&mut store), None);
    }
}
