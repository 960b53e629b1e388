//! Link type and related structures.
//!
//! Links are stored by entity id only. Simulations resolve them to dense
//! indices for the duration of a run and never write resolved references back.

use super::entity::{EntityId, Relationship};

/// Link state flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState {
    flags: u8,
}

impl LinkState {
    const CULLED: u8 = 0b0000_0001;

    #[inline]
    pub fn new() -> Self {
        Self { flags: 0 }
    }

    /// Culled links have at least one endpoint outside the padded viewport.
    #[inline]
    pub fn is_culled(self) -> bool {
        self.flags & Self::CULLED != 0
    }

    #[inline]
    pub fn set_culled(&mut self, culled: bool) {
        if culled {
            self.flags |= Self::CULLED;
        } else {
            self.flags &= !Self::CULLED;
        }
    }
}

/// An id-pair link derived from a relationship.
#[derive(Debug, Clone)]
pub struct GraphLink {
    pub relationship_id: String,
    pub predicate: String,
    pub source: EntityId,
    pub target: EntityId,
    pub state: LinkState,
}

impl From<&Relationship> for GraphLink {
    fn from(rel: &Relationship) -> Self {
        Self {
            relationship_id: rel.relationship_id.clone(),
            predicate: rel.predicate.clone(),
            source: rel.source_entity_id.clone(),
            target: rel.related_entity_id.clone(),
            state: LinkState::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_from_relationship() {
        let link = GraphLink::from(&Relationship::new("r1", "owns", "a", "b"));
        assert_eq!(link.relationship_id, "r1");
        assert_eq!(link.source.as_str(), "a");
        assert_eq!(link.target.as_str(), "b");
        assert!(!link.state.is_culled());
    }

    #[test]
    fn test_link_state() {
        let mut state = LinkState::new();
        state.set_culled(true);
        assert!(state.is_culled());
        state.set_culled(false);
        assert!(!state.is_culled());
    }
}
