//! Workspace service seam.
//!
//! The engine never talks to the backend itself. A [`WorkspaceService`]
//! implementation (the JS host in the browser, a mock in tests) answers the
//! five calls below; [`WorkspaceSession`] drives the engine through them.

use log::{info, warn};

use crate::error::Result;
use crate::graph::{Entity, EntityId, NeighborMap, ViewState, WorkspaceSnapshot};
use crate::layout::LayoutStrategy;
use crate::preview::{PreviewAction, RevealOutcome};
use crate::transform::Point;
use crate::workspace::{FrameReport, WorkspaceEngine};

pub trait WorkspaceService {
    fn fetch_workspace(&mut self, workspace_id: &str) -> Result<WorkspaceSnapshot>;

    fn fetch_entity_neighbors(&mut self, entity_id: &EntityId) -> Result<NeighborMap>;

    fn add_entities_to_workspace(&mut self, workspace_id: &str, entity_ids: &[EntityId]) -> Result<WorkspaceSnapshot>;

    fn remove_entities_from_workspace(
        &mut self,
        workspace_id: &str,
        entity_ids: &[EntityId],
    ) -> Result<WorkspaceSnapshot>;

    fn save_view_state(&mut self, workspace_id: &str, view_state: &ViewState) -> Result<()>;
}

/// An open workspace bound to its backend.
pub struct WorkspaceSession<S: WorkspaceService> {
    workspace_id: String,
    service: S,
    engine: WorkspaceEngine,
}

impl<S: WorkspaceService> WorkspaceSession<S> {
    /// Fetch the workspace and lay it out.
    pub fn open(workspace_id: impl Into<String>, mut service: S, mut engine: WorkspaceEngine) -> Result<Self> {
        let workspace_id = workspace_id.into();
        let snapshot = service.fetch_workspace(&workspace_id)?;
        let strategy = engine.load(&snapshot);
        info!("opened workspace {workspace_id}: {strategy:?}");
        Ok(Self {
            workspace_id,
            service,
            engine,
        })
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn engine(&self) -> &WorkspaceEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut WorkspaceEngine {
        &mut self.engine
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Toggle the neighbor preview for an entity, fetching when needed.
    /// A failed fetch shows zero neighbors instead of failing the call.
    pub fn reveal_neighbors(&mut self, entity_id: &EntityId) -> Option<RevealOutcome> {
        let outcome = self.engine.reveal_neighbors(entity_id)?;
        if let RevealOutcome::FetchNeighbors { entity_id } = &outcome {
            self.fetch_into_preview(entity_id);
        }
        Some(outcome)
    }

    fn fetch_into_preview(&mut self, entity_id: &EntityId) {
        let neighbors = match self.service.fetch_entity_neighbors(entity_id) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!("neighbor fetch for {entity_id} failed: {e}");
                None
            }
        };
        self.engine.ingest_neighbors(entity_id, neighbors);
    }

    /// Click on a preview item: a node is added to the workspace at its
    /// preview position, a group is expanded in place.
    pub fn click_preview_item(&mut self, item_id: &str, modifier: bool, now_ms: f64) -> Result<Option<PreviewAction>> {
        let Some(action) = self.engine.click_preview_item(item_id, modifier) else {
            return Ok(None);
        };
        match &action {
            PreviewAction::Materialize { entity, position } => {
                self.add_at(std::slice::from_ref(entity), Some(*position), now_ms)?;
            }
            PreviewAction::FetchNeighbors { entity_id } => self.fetch_into_preview(entity_id),
            PreviewAction::ShowGroup { .. } => {}
        }
        Ok(Some(action))
    }

    /// Handle a drag-drop payload. Returns the layout path taken for the
    /// new entities.
    pub fn drop_entities(&mut self, json: &str, at: Option<Point>, now_ms: f64) -> Result<LayoutStrategy> {
        let entities = self.engine.parse_drop(json)?;
        self.add_at(&entities, at, now_ms)
    }

    /// Add entities through the service and merge its answer.
    pub fn add_entities(&mut self, entities: &[Entity], now_ms: f64) -> Result<LayoutStrategy> {
        self.add_at(entities, None, now_ms)
    }

    fn add_at(&mut self, entities: &[Entity], at: Option<Point>, now_ms: f64) -> Result<LayoutStrategy> {
        let ids: Vec<EntityId> = entities
            .iter()
            .map(|e| e.id.clone())
            .filter(|id| !self.engine.store().contains(id))
            .collect();
        if ids.is_empty() {
            return Ok(LayoutStrategy::Noop);
        }
        let snapshot = self.service.add_entities_to_workspace(&self.workspace_id, &ids)?;
        Ok(self.engine.apply_snapshot(&snapshot, at, now_ms))
    }

    pub fn remove_entities(&mut self, ids: &[EntityId], now_ms: f64) -> Result<usize> {
        let before = self.engine.store().node_count();
        let snapshot = self.service.remove_entities_from_workspace(&self.workspace_id, ids)?;
        self.engine.apply_snapshot(&snapshot, None, now_ms);
        Ok(before.saturating_sub(self.engine.store().node_count()))
    }

    /// Advance one frame and flush the view state when the debounce fires.
    /// A failed save is logged; the next change schedules another.
    pub fn frame(&mut self, now_ms: f64, dt_ms: f64) -> FrameReport {
        let report = self.engine.frame(now_ms, dt_ms);
        if report.save_due {
            let view = self.engine.view_state();
            if let Err(e) = self.service.save_view_state(&self.workspace_id, &view) {
                warn!("saving view state for {} failed: {e}", self.workspace_id);
            }
        }
        report
    }

    /// Close the workspace. A pending save is dropped.
    pub fn close(mut self) -> S {
        self.engine.teardown();
        self.service
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::EngineConfig;
    use crate::error::GraphError;
    use crate::graph::Relationship;

    #[derive(Default)]
    struct MockService {
        entities: BTreeMap<EntityId, Entity>,
        relationships: Vec<Relationship>,
        neighbors: BTreeMap<EntityId, NeighborMap>,
        fail_neighbors: bool,
        saves: Vec<ViewState>,
    }

    impl MockService {
        fn with_chain(n: usize) -> Self {
            let mut mock = Self::default();
            for i in 0..n {
                let e = Entity::new(format!("e{i}"), format!("E{i}"), "person");
                mock.entities.insert(e.id.clone(), e);
            }
            for i in 1..n {
                mock.relationships
                    .push(Relationship::new(format!("r{i}"), "next", format!("e{}", i - 1), format!("e{i}")));
            }
            mock
        }

        fn snapshot(&self) -> WorkspaceSnapshot {
            WorkspaceSnapshot {
                entities: self.entities.values().cloned().collect(),
                relationships: self.relationships.clone(),
                view_state: self.saves.last().cloned(),
            }
        }
    }

    impl WorkspaceService for MockService {
        fn fetch_workspace(&mut self, _: &str) -> Result<WorkspaceSnapshot> {
            Ok(self.snapshot())
        }

        fn fetch_entity_neighbors(&mut self, entity_id: &EntityId) -> Result<NeighborMap> {
            if self.fail_neighbors {
                return Err(GraphError::Service("boom".into()));
            }
            Ok(self.neighbors.get(entity_id).cloned().unwrap_or_default())
        }

        fn add_entities_to_workspace(&mut self, _: &str, entity_ids: &[EntityId]) -> Result<WorkspaceSnapshot> {
            for id in entity_ids {
                let e = Entity::new(id.as_str(), id.as_str(), "org");
                self.entities.entry(id.clone()).or_insert(e);
            }
            Ok(self.snapshot())
        }

        fn remove_entities_from_workspace(&mut self, _: &str, entity_ids: &[EntityId]) -> Result<WorkspaceSnapshot> {
            for id in entity_ids {
                self.entities.remove(id);
            }
            self.relationships
                .retain(|r| !entity_ids.contains(&r.source_entity_id) && !entity_ids.contains(&r.related_entity_id));
            Ok(self.snapshot())
        }

        fn save_view_state(&mut self, _: &str, view_state: &ViewState) -> Result<()> {
            self.saves.push(view_state.clone());
            Ok(())
        }
    }

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    fn open(mock: MockService) -> WorkspaceSession<MockService> {
        let engine = WorkspaceEngine::new(EngineConfig::default()).unwrap();
        WorkspaceSession::open("ws", mock, engine).unwrap()
    }

    #[test]
    fn test_open_loads_graph() {
        let session = open(MockService::with_chain(4));
        assert_eq!(session.engine().store().node_count(), 4);
        assert_eq!(session.engine().store().link_count(), 3);
    }

    #[test]
    fn test_failed_neighbor_fetch_shows_nothing() {
        let mut mock = MockService::with_chain(2);
        mock.fail_neighbors = true;
        let mut session = open(mock);
        let outcome = session.reveal_neighbors(&id("e0"));
        assert_eq!(outcome, Some(RevealOutcome::FetchNeighbors { entity_id: id("e0") }));
        let state = session.engine().preview_state();
        assert!(state.is_active);
        assert_eq!(state.item_count(), 0);
    }

    #[test]
    fn test_materialize_preview_item() {
        let mut mock = MockService::with_chain(2);
        let mut map = NeighborMap::new();
        map.insert("org".into(), vec![Entity::new("acme", "Acme", "org")]);
        mock.neighbors.insert(id("e0"), map);
        let mut session = open(mock);
        session.reveal_neighbors(&id("e0"));
        assert_eq!(session.engine().preview_state().nodes.len(), 1);

        let action = session.click_preview_item("acme", false, 0.0).unwrap();
        assert!(matches!(action, Some(PreviewAction::Materialize { .. })));
        assert!(session.engine().store().contains(&id("acme")));
        assert!(session.engine().preview_state().nodes.is_empty());
    }

    #[test]
    fn test_drop_adds_and_rejects_malformed() {
        let mut session = open(MockService::with_chain(2));
        let strategy = session
            .drop_entities(r#"[{"id":"x","labelNormalized":"X","type":"org"}]"#, Some(Point::new(5.0, 5.0)), 0.0)
            .unwrap();
        assert!(matches!(strategy, LayoutStrategy::MiniSimulation { .. }));
        assert!(session.engine().store().contains(&id("x")));

        let err = session.drop_entities("not json", None, 0.0).unwrap_err();
        assert!(matches!(err, GraphError::MalformedPayload(_)));
        assert_eq!(session.engine().store().node_count(), 3);
    }

    #[test]
    fn test_remove_goes_through_service() {
        let mut session = open(MockService::with_chain(3));
        assert_eq!(session.remove_entities(&[id("e1")], 0.0).unwrap(), 1);
        assert_eq!(session.engine().store().link_count(), 0);
        assert!(!session.service().entities.contains_key(&id("e1")));
    }

    #[test]
    fn test_debounced_save_and_close() {
        let mut session = open(MockService::with_chain(2));
        session.engine_mut().pan_by(10.0, 0.0, 0.0);
        session.frame(100.0, 16.0);
        assert!(session.service().saves.is_empty());
        session.frame(600.0, 16.0);
        assert_eq!(session.service().saves.len(), 1);
        assert_eq!(session.service().saves[0].entity_positions.len(), 2);

        session.engine_mut().pan_by(10.0, 0.0, 700.0);
        let mock = session.close();
        assert_eq!(mock.saves.len(), 1);
    }
}
