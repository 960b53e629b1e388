//! WorkspaceEngine - one open workspace and every subsystem working on it.
//!
//! The engine is host-clock driven: pointer and wheel handlers only record
//! intent (a pending transform, a dirty flag), and [`WorkspaceEngine::frame`]
//! applies it once per animation frame. That caps culling at one pass per
//! frame no matter how many events arrived in between.

use std::collections::HashSet;

use log::{debug, info};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::{Entity, EntityId, GraphStore, NeighborMap, Relationship, ViewState, WorkspaceSnapshot};
use crate::interaction::{ClickOutcome, DragController, Modifiers, SelectionModel};
use crate::layout::{ForceLayoutEngine, LayoutStrategy, SimulationStatus};
use crate::minimap::{MinimapFrame, MinimapRenderer};
use crate::payload::parse_dropped_entities;
use crate::persistence::{SaveDebouncer, capture_view_state, transform_of};
use crate::preview::{PreviewAction, PreviewEngine, PreviewItemView, PreviewState, RevealOutcome};
use crate::transform::{Point, Rect, Transform, fit_transform, screen_to_world};
use crate::viewport::{Badge, ViewportCuller, VisibilityDiff};

/// Node as seen by the rendering adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNode {
    pub id: EntityId,
    pub label: String,
    pub entity_type: String,
    pub x: f64,
    pub y: f64,
    pub selected: bool,
    pub highlighted: bool,
    pub culled: bool,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneLink {
    pub id: String,
    pub predicate: String,
    pub source: EntityId,
    pub target: EntityId,
    pub culled: bool,
}

/// Retained-mode snapshot of everything drawable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub transform: Transform,
    pub nodes: Vec<SceneNode>,
    pub links: Vec<SceneLink>,
    pub badges: Vec<Badge>,
    pub preview: Vec<PreviewItemView>,
    pub selection_rect: Option<Rect>,
}

/// What happened during one [`WorkspaceEngine::frame`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    pub layout: SimulationStatus,
    pub preview: SimulationStatus,
    pub transform_changed: bool,
    /// Present when a culling pass ran this frame.
    pub visibility: Option<VisibilityDiff>,
    /// The debounced view-state save is due; fetch it with `view_state()`.
    pub save_due: bool,
}

/// Result of a pointer release.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PointerOutcome {
    None,
    Selection { outcome: ClickOutcome },
    Reveal { outcome: RevealOutcome },
    Preview { action: PreviewAction },
    DragEnded { moved: usize },
    RectSelected { count: usize },
}

#[derive(Debug, Clone)]
enum Pointer {
    Idle,
    /// Pressed on a node; becomes a drag after enough travel.
    NodePress { id: EntityId, start: Point },
    Dragging,
    PreviewPress { item: String },
    Canvas,
}

/// Hits closer than this (screen px) count as a click, not a drag.
const CLICK_SLOP_PX: f64 = 3.0;

pub struct WorkspaceEngine {
    config: EngineConfig,
    store: GraphStore,
    layout: ForceLayoutEngine,
    culler: ViewportCuller,
    preview: PreviewEngine,
    selection: SelectionModel,
    drag: DragController,
    minimap: MinimapRenderer,
    saver: SaveDebouncer,
    transform: Transform,
    pending_transform: Option<Transform>,
    viewport: (f64, f64),
    culling_dirty: bool,
    pointer: Pointer,
}

impl WorkspaceEngine {
    /// Build an engine. Fails with [`GraphError::InvalidConfig`] when the
    /// config does not validate.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: GraphStore::new(),
            layout: ForceLayoutEngine::new(config.force.clone(), config.placement.clone()),
            culler: ViewportCuller::new(config.culling.clone()),
            preview: PreviewEngine::new(config.preview.clone(), config.force.node_radius),
            selection: SelectionModel::new(config.selection.clone()),
            drag: DragController::new(),
            minimap: MinimapRenderer::new(config.minimap.clone()),
            saver: SaveDebouncer::new(config.persistence.debounce_ms),
            transform: Transform::IDENTITY,
            pending_transform: None,
            viewport: (800.0, 600.0),
            culling_dirty: true,
            pointer: Pointer::Idle,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn selection(&self) -> &SelectionModel {
        &self.selection
    }

    pub fn preview_state(&self) -> &PreviewState {
        self.preview.state()
    }

    pub fn is_layout_running(&self) -> bool {
        self.layout.is_running()
    }

    // =========================================================================
    // Workspace contents
    // =========================================================================

    /// Replace the graph with a freshly fetched workspace.
    pub fn load(&mut self, snapshot: &WorkspaceSnapshot) -> LayoutStrategy {
        self.reset();
        self.store = GraphStore::with_capacity(snapshot.entities.len(), snapshot.relationships.len());
        let added = self.store.add_entities(snapshot.entities.iter().cloned());
        let linked = self.store.add_relationships(&snapshot.relationships);
        let strategy = self.layout.initial_layout(&mut self.store, snapshot.view_state.as_ref());

        self.transform = match &snapshot.view_state {
            Some(view) => self.clamp(transform_of(view)),
            None => self.fitted_transform(),
        };
        self.culler.mark_dirty();
        self.culling_dirty = true;
        info!(
            "workspace loaded: {} entities, {} links, {:?}",
            added.len(),
            linked,
            strategy
        );
        strategy
    }

    /// Add entities (duplicates are ignored) and any relationships among
    /// them and the existing graph. With `at`, new nodes start from that
    /// world point.
    pub fn add_entities(
        &mut self,
        entities: &[Entity],
        relationships: &[Relationship],
        at: Option<Point>,
        now_ms: f64,
    ) -> LayoutStrategy {
        let added = self.store.add_entities(entities.iter().cloned());
        self.store.add_relationships(relationships);
        if added.is_empty() {
            return LayoutStrategy::Noop;
        }
        if let Some(p) = at {
            for id in &added {
                self.store.set_position(id, p);
            }
        }
        let strategy = self.layout.on_entities_added(&mut self.store, &added);
        if let LayoutStrategy::Placement { .. } = strategy {
            self.saver.touch(now_ms);
        }
        if self.preview.is_active() {
            self.preview.recompute(&self.store);
        }
        self.culler.mark_dirty();
        self.culling_dirty = true;
        strategy
    }

    /// Remove entities and every link touching them.
    pub fn remove_entities(&mut self, ids: &[EntityId], now_ms: f64) -> usize {
        let removed = self.store.remove_entities(ids);
        if removed == 0 {
            return 0;
        }
        // Dense simulation slots no longer match the store.
        self.layout.cancel();
        self.drag.cancel(&mut self.store);
        self.pointer = Pointer::Idle;
        self.selection.retain_existing(&self.store);
        self.selection.apply_to(&mut self.store);
        self.preview.sync_with_graph(&self.store);
        self.culler.mark_dirty();
        self.culling_dirty = true;
        self.saver.touch(now_ms);
        debug!("removed {removed} entities");
        removed
    }

    /// Bring the graph in line with a workspace returned by the service:
    /// missing entities are added, entities no longer listed are removed.
    pub fn apply_snapshot(&mut self, snapshot: &WorkspaceSnapshot, at: Option<Point>, now_ms: f64) -> LayoutStrategy {
        let listed: HashSet<&EntityId> = snapshot.entities.iter().map(|e| &e.id).collect();
        let gone: Vec<EntityId> = self
            .store
            .entity_ids()
            .filter(|id| !listed.contains(id))
            .cloned()
            .collect();
        self.remove_entities(&gone, now_ms);
        self.add_entities(&snapshot.entities, &snapshot.relationships, at, now_ms)
    }

    /// Parse a drag-drop payload. Nothing is mutated; the caller asks the
    /// service to add the returned entities.
    pub fn parse_drop(&self, json: &str) -> Result<Vec<Entity>> {
        parse_dropped_entities(json)
    }

    // =========================================================================
    // Transform
    // =========================================================================

    pub fn transform(&self) -> Transform {
        self.pending_transform.unwrap_or(self.transform)
    }

    /// Canvas size in screen pixels.
    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport = (width.max(1.0), height.max(1.0));
        self.culling_dirty = true;
    }

    fn clamp(&self, t: Transform) -> Transform {
        t.clamped(self.config.view.min_scale, self.config.view.max_scale)
    }

    /// Request a transform; applied on the next frame.
    pub fn set_transform(&mut self, transform: Transform, now_ms: f64) {
        self.pending_transform = Some(self.clamp(transform));
        self.saver.touch(now_ms);
    }

    /// Zoom by `factor` around a screen point.
    pub fn zoom_at(&mut self, screen: Point, factor: f64, now_ms: f64) {
        let view = &self.config.view;
        let t = self.transform().zoom_at(screen, factor, view.min_scale, view.max_scale);
        self.set_transform(t, now_ms);
    }

    /// Pan by a screen-space delta. Coalesces with any transform already
    /// pending for this frame.
    pub fn pan_by(&mut self, dx: f64, dy: f64, now_ms: f64) {
        let t = self.transform().pan_by(dx, dy);
        self.set_transform(t, now_ms);
    }

    fn fitted_transform(&self) -> Transform {
        let t = fit_transform(
            &self.store.positioned_points(),
            self.viewport.0,
            self.viewport.1,
            self.config.view.fit_padding,
            self.config.force.node_radius,
        );
        self.clamp(t)
    }

    /// Fit the whole graph into the viewport.
    pub fn fit_to_view(&mut self, now_ms: f64) -> Transform {
        let t = self.fitted_transform();
        self.set_transform(t, now_ms);
        t
    }

    // =========================================================================
    // Frame loop
    // =========================================================================

    /// Advance one animation frame.
    pub fn frame(&mut self, now_ms: f64, dt_ms: f64) -> FrameReport {
        let transform_changed = match self.pending_transform.take() {
            Some(t) if t != self.transform => {
                self.transform = t;
                self.culling_dirty = true;
                true
            }
            _ => false,
        };

        let mut layout = SimulationStatus::Settled;
        if self.layout.is_running() {
            layout = self.layout.step(&mut self.store);
            // Nodes moved this tick; hit tests must see where they are now.
            self.culler.mark_dirty();
            self.culling_dirty = true;
            if layout == SimulationStatus::Settled {
                self.saver.touch(now_ms);
            }
        }

        let preview = if self.preview.is_animating() {
            self.preview.step(dt_ms)
        } else {
            SimulationStatus::Settled
        };

        let visibility = if self.culling_dirty {
            self.culling_dirty = false;
            let (w, h) = self.viewport;
            Some(self.culler.update(&mut self.store, &self.transform, w, h))
        } else {
            None
        };

        FrameReport {
            layout,
            preview,
            transform_changed,
            visibility,
            save_due: self.saver.poll(now_ms),
        }
    }

    /// Live positions and transform for persistence.
    pub fn view_state(&self) -> ViewState {
        capture_view_state(&self.store, &self.transform())
    }

    /// Number of culling passes run so far.
    pub fn culling_passes(&self) -> u64 {
        self.culler.passes()
    }

    // =========================================================================
    // Hit testing & pointer input (screen coordinates)
    // =========================================================================

    /// Node under a screen point.
    pub fn hit_test(&mut self, screen: Point) -> Option<EntityId> {
        let world = screen_to_world(screen.x, screen.y, &self.transform());
        let radius = self.config.force.node_radius;
        self.culler
            .index(&self.store)
            .nearest_within(world.x, world.y, radius)
            .cloned()
    }

    /// Pointer pressed at `screen`.
    ///
    /// Preview items take precedence over graph nodes. A press on a node is
    /// only a click until the pointer travels `CLICK_SLOP_PX`; a press on
    /// empty canvas starts a rectangle selection.
    pub fn pointer_down(&mut self, screen: Point) {
        let world = screen_to_world(screen.x, screen.y, &self.transform());
        if let Some(item) = self.preview.item_at(world) {
            self.pointer = Pointer::PreviewPress { item: item.id };
            return;
        }
        self.pointer = match self.hit_test(screen) {
            Some(id) => Pointer::NodePress { id, start: screen },
            None => {
                self.selection.begin_canvas_drag(screen);
                Pointer::Canvas
            }
        };
    }

    /// Pointer moved to `screen`: drags nodes or grows the selection rectangle.
    pub fn pointer_move(&mut self, screen: Point) {
        let transform = self.transform();
        let world = screen_to_world(screen.x, screen.y, &transform);
        match &self.pointer {
            Pointer::NodePress { id, start } => {
                if start.distance_to(screen) < CLICK_SLOP_PX {
                    return;
                }
                let id = id.clone();
                let grab = screen_to_world(start.x, start.y, &transform);
                if self.drag.begin(&mut self.store, &self.selection, &id, grab) {
                    self.pointer = Pointer::Dragging;
                    self.drag.drag_to(&mut self.store, world);
                    self.culler.mark_dirty();
                    self.culling_dirty = true;
                }
            }
            Pointer::Dragging => {
                if !self.drag.drag_to(&mut self.store, world).is_empty() {
                    self.culler.mark_dirty();
                    self.culling_dirty = true;
                }
            }
            Pointer::Canvas => {
                let index = self.culler.index(&self.store);
                if self.selection.update_canvas_drag(screen, &transform, index) {
                    self.selection.apply_to(&mut self.store);
                }
            }
            Pointer::Idle | Pointer::PreviewPress { .. } => {}
        }
    }

    /// Pointer released. Ends the current gesture and reports what it did.
    ///
    /// # Arguments
    ///
    /// * `modifiers` - Keys held at release; shift on a node reveals its neighbors
    /// * `now_ms` - Host clock, used for save debouncing and click suppression
    pub fn pointer_up(&mut self, modifiers: Modifiers, now_ms: f64) -> PointerOutcome {
        match std::mem::replace(&mut self.pointer, Pointer::Idle) {
            Pointer::Idle => PointerOutcome::None,
            Pointer::Dragging => match self.drag.end(&mut self.store) {
                Some(end) => {
                    self.culler.mark_dirty();
                    self.culling_dirty = true;
                    if end.moved {
                        self.saver.touch(now_ms);
                    }
                    PointerOutcome::DragEnded {
                        moved: if end.moved { end.members.len() } else { 0 },
                    }
                }
                None => PointerOutcome::None,
            },
            Pointer::NodePress { id, .. } => self.click_node(&id, modifiers, now_ms),
            Pointer::PreviewPress { item } => match self.click_preview_item(&item, modifiers.shift) {
                Some(action) => PointerOutcome::Preview { action },
                None => PointerOutcome::None,
            },
            Pointer::Canvas => {
                if self.selection.end_canvas_drag(now_ms) {
                    self.selection.apply_to(&mut self.store);
                    PointerOutcome::RectSelected {
                        count: self.selection.len(),
                    }
                } else {
                    self.selection.apply_to(&mut self.store);
                    PointerOutcome::None
                }
            }
        }
    }

    /// Click on empty canvas (fired by the host after pointer up).
    pub fn click_canvas(&mut self, now_ms: f64) -> ClickOutcome {
        let outcome = self.selection.click_canvas(now_ms);
        self.selection.apply_to(&mut self.store);
        outcome
    }

    /// Click on a main-graph node. Shift reveals neighbors.
    pub fn click_node(&mut self, id: &EntityId, modifiers: Modifiers, now_ms: f64) -> PointerOutcome {
        if !self.store.contains(id) {
            return PointerOutcome::None;
        }
        let outcome = self.selection.click_node(id, modifiers, now_ms);
        self.selection.apply_to(&mut self.store);
        match outcome {
            ClickOutcome::RevealNeighbors { entity_id } => match self.reveal_neighbors(&entity_id) {
                Some(outcome) => PointerOutcome::Reveal { outcome },
                None => PointerOutcome::None,
            },
            outcome => PointerOutcome::Selection { outcome },
        }
    }

    /// Select nodes by id, e.g. from a search panel.
    pub fn select(&mut self, ids: &[EntityId]) -> Result<()> {
        if let Some(missing) = ids.iter().find(|id| !self.store.contains(id)) {
            return Err(GraphError::UnknownEntity(missing.to_string()));
        }
        self.selection.set_selection(ids.iter().cloned());
        self.selection.apply_to(&mut self.store);
        Ok(())
    }

    /// Pan so the clicked minimap pixel becomes the viewport center.
    /// Selection is untouched.
    pub fn minimap_click(&mut self, minimap_point: Point, now_ms: f64) -> Option<Transform> {
        let (w, h) = self.viewport;
        let t = self
            .minimap
            .pan_to(&self.store, minimap_point, &self.transform(), w, h)?;
        self.set_transform(t, now_ms);
        Some(t)
    }

    pub fn minimap_frame(&self) -> MinimapFrame {
        let (w, h) = self.viewport;
        self.minimap.frame(&self.store, &self.transform(), w, h)
    }

    pub fn minimap_raster(&self) -> Vec<u8> {
        self.minimap.rasterize(&self.minimap_frame())
    }

    // =========================================================================
    // Preview
    // =========================================================================

    /// Reveal or toggle off the neighbors of a graph or preview node.
    pub fn reveal_neighbors(&mut self, id: &EntityId) -> Option<RevealOutcome> {
        self.preview.reveal(&self.store, id)
    }

    /// Hand fetched neighbors to the preview. `None` means the fetch failed.
    pub fn ingest_neighbors(&mut self, source: &EntityId, neighbors: Option<NeighborMap>) -> bool {
        self.preview.ingest_neighbors(&self.store, source, neighbors)
    }

    /// Click on a preview item; `modifier` promotes a node to a source.
    pub fn click_preview_item(&mut self, item_id: &str, modifier: bool) -> Option<PreviewAction> {
        self.preview.click_item(&self.store, item_id, modifier)
    }

    /// Leave preview mode.
    pub fn exit_preview(&mut self) {
        self.preview.exit();
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Everything the renderer needs for the current frame.
    pub fn scene(&self) -> Scene {
        let nodes = self
            .store
            .nodes()
            .filter_map(|n| {
                let p = n.position?;
                Some(SceneNode {
                    id: n.id().clone(),
                    label: n.entity.label_normalized.clone(),
                    entity_type: n.entity.entity_type.clone(),
                    x: p.x,
                    y: p.y,
                    selected: n.state.is_selected(),
                    highlighted: n.state.is_highlighted(),
                    culled: n.state.is_culled(),
                    pinned: n.state.is_pinned(),
                })
            })
            .collect();
        let links = self
            .store
            .links()
            .map(|l| SceneLink {
                id: l.relationship_id.clone(),
                predicate: l.predicate.clone(),
                source: l.source.clone(),
                target: l.target.clone(),
                culled: l.state.is_culled(),
            })
            .collect();
        let mut badges: Vec<Badge> = self.culler.badges().cloned().collect();
        badges.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Scene {
            transform: self.transform,
            nodes,
            links,
            badges,
            preview: self.preview.items(),
            selection_rect: self.selection.rect(),
        }
    }

    /// Interleaved `[x0, y0, x1, y1, ...]` in [`WorkspaceEngine::node_ids`] order.
    /// Unpositioned nodes are reported as NaN.
    pub fn positions(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.store.node_count() * 2);
        for node in self.store.nodes() {
            let p = node.position.unwrap_or(Point::new(f64::NAN, f64::NAN));
            out.push(p.x);
            out.push(p.y);
        }
        out
    }

    pub fn node_ids(&self) -> Vec<EntityId> {
        self.store.entity_ids().cloned().collect()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn reset(&mut self) {
        self.drag.cancel(&mut self.store);
        self.store.clear();
        self.layout.cancel();
        self.culler.reset();
        self.preview.exit();
        self.selection.clear();
        self.saver.cancel();
        self.pending_transform = None;
        self.pointer = Pointer::Idle;
        self.culling_dirty = true;
    }

    /// Close the workspace. A pending save is cancelled, not flushed.
    pub fn teardown(&mut self) {
        self.reset();
        self.transform = Transform::IDENTITY;
        info!("workspace closed");
    }
}
