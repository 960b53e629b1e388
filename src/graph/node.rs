//! Graph node and its state flags.
//!
//! A node is the core's mutable view of an entity:
//! - the immutable entity it was derived from
//! - a position (`None` until layout or placement assigns one)
//! - an optional fixed position used to pin it during a sub-simulation
//! - packed state flags (pinned, culled, selected, highlighted)

use crate::transform::Point;

use super::entity::{Entity, EntityId};

/// Node state flags packed into a single byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeState {
    flags: u8,
}

impl NodeState {
    const PINNED: u8 = 0b0000_0001;
    const CULLED: u8 = 0b0000_0010;
    const SELECTED: u8 = 0b0000_0100;
    const HIGHLIGHTED: u8 = 0b0000_1000;

    #[inline]
    pub fn new() -> Self {
        Self { flags: 0 }
    }

    #[inline]
    fn set(&mut self, bit: u8, on: bool) {
        if on {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
    }

    /// Pinned nodes keep their position during a simulation.
    #[inline]
    pub fn is_pinned(self) -> bool {
        self.flags & Self::PINNED != 0
    }

    #[inline]
    pub fn set_pinned(&mut self, pinned: bool) {
        self.set(Self::PINNED, pinned);
    }

    /// Culled nodes are outside the padded viewport and rendered without detail.
    #[inline]
    pub fn is_culled(self) -> bool {
        self.flags & Self::CULLED != 0
    }

    #[inline]
    pub fn set_culled(&mut self, culled: bool) {
        self.set(Self::CULLED, culled);
    }

    #[inline]
    pub fn is_selected(self) -> bool {
        self.flags & Self::SELECTED != 0
    }

    #[inline]
    pub fn set_selected(&mut self, selected: bool) {
        self.set(Self::SELECTED, selected);
    }

    /// Highlighted while enclosed by an in-progress selection rectangle.
    #[inline]
    pub fn is_highlighted(self) -> bool {
        self.flags & Self::HIGHLIGHTED != 0
    }

    #[inline]
    pub fn set_highlighted(&mut self, highlighted: bool) {
        self.set(Self::HIGHLIGHTED, highlighted);
    }
}

/// Simulation-augmented view of an entity.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub entity: Entity,
    pub position: Option<Point>,
    pub fixed: Option<Point>,
    pub state: NodeState,
}

impl GraphNode {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            position: None,
            fixed: None,
            state: NodeState::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> &EntityId {
        &self.entity.id
    }

    /// Pin the node at its current position.
    pub fn pin(&mut self) {
        self.fixed = self.position;
        self.state.set_pinned(self.fixed.is_some());
    }

    pub fn release(&mut self) {
        self.fixed = None;
        self.state.set_pinned(false);
    }
}
