//! Graph data structures and operations.
//!
//! Entities and relationships come from the workspace service. The store keeps
//! them in petgraph's StableGraph (undirected, since layout treats both
//! endpoints symmetrically) together with the mutable per-node layout state.

mod entity;
mod link;
mod node;
mod store;

pub use entity::{Entity, EntityId, NeighborMap, Relationship, ViewState, WorkspaceSnapshot};
pub use link::{GraphLink, LinkState};
pub use node::{GraphNode, NodeState};
pub use store::GraphStore;
