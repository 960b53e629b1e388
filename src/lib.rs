//! Workspace Graph - WASM Module
//!
//! Graph engine for a knowledge-graph workspace editor. Compiled to
//! WebAssembly and driven by a JavaScript host that owns the canvas, the
//! animation loop and the backend calls.
//!
//! # Architecture
//!
//! - `graph`: entities and relationships in petgraph's StableGraph
//! - `spatial`: R-tree index for hit testing and culling, occupancy grid for placement
//! - `layout`: d3-style force simulation and deterministic bulk placement
//! - `viewport`: viewport culling and hidden-neighbor badges
//! - `preview`: 1-hop neighbor preview with its own small simulation
//! - `interaction`: selection state machine and node dragging
//! - `minimap`: overview frame and rasterizer
//! - `workspace`: the engine tying the above together, one frame at a time
//! - `service`: backend seam and session driver

use js_sys::Float64Array;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

pub mod config;
pub mod error;
pub mod graph;
pub mod interaction;
pub mod layout;
pub mod minimap;
pub mod payload;
pub mod persistence;
pub mod preview;
pub mod service;
pub mod spatial;
pub mod transform;
pub mod viewport;
pub mod workspace;

use config::EngineConfig;
use error::GraphError;
use graph::{Entity, EntityId, NeighborMap, Relationship, WorkspaceSnapshot};
use interaction::Modifiers;
use transform::{Point, Transform};
use workspace::WorkspaceEngine;

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    // A second init (e.g. hot reload) finds the logger already installed.
    let _ = console_log::init_with_level(log::Level::Debug);
}

/// Host clock in milliseconds.
fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsError> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    Ok(value.serialize(&serializer).map_err(GraphError::from)?)
}

fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, JsError> {
    Ok(serde_wasm_bindgen::from_value(value).map_err(GraphError::from)?)
}

/// `undefined` and `null` become `None`.
fn optional_from_js<T: DeserializeOwned>(value: JsValue) -> Result<Option<T>, JsError> {
    if value.is_undefined() || value.is_null() {
        Ok(None)
    } else {
        from_js(value).map(Some)
    }
}

fn point(x: Option<f64>, y: Option<f64>) -> Option<Point> {
    Some(Point::new(x?, y?))
}

/// Main entry point for the workspace graph.
///
/// Wraps a [`WorkspaceEngine`] and exposes it to JavaScript. Structured
/// values cross the boundary as plain JS objects.
#[wasm_bindgen]
pub struct WorkspaceGraphWasm {
    engine: WorkspaceEngine,
}

#[wasm_bindgen]
impl WorkspaceGraphWasm {
    /// Create an engine. `config` may be partial or omitted.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WorkspaceGraphWasm, JsError> {
        let config: EngineConfig = optional_from_js(config)?.unwrap_or_default();
        Ok(Self {
            engine: WorkspaceEngine::new(config)?,
        })
    }

    // =========================================================================
    // Workspace contents
    // =========================================================================

    /// Load a fetched workspace. Returns the layout strategy used.
    pub fn load(&mut self, snapshot: JsValue) -> Result<JsValue, JsError> {
        let snapshot: WorkspaceSnapshot = from_js(snapshot)?;
        to_js(&self.engine.load(&snapshot))
    }

    /// Add entities and relationships, optionally starting new nodes at a
    /// world point.
    #[wasm_bindgen(js_name = addEntities)]
    pub fn add_entities(
        &mut self,
        entities: JsValue,
        relationships: JsValue,
        x: Option<f64>,
        y: Option<f64>,
    ) -> Result<JsValue, JsError> {
        let entities: Vec<Entity> = from_js(entities)?;
        let relationships: Vec<Relationship> = optional_from_js(relationships)?.unwrap_or_default();
        let strategy = self
            .engine
            .add_entities(&entities, &relationships, point(x, y), now_ms());
        to_js(&strategy)
    }

    /// Reconcile with a workspace returned by an add or remove call.
    #[wasm_bindgen(js_name = applySnapshot)]
    pub fn apply_snapshot(&mut self, snapshot: JsValue, x: Option<f64>, y: Option<f64>) -> Result<JsValue, JsError> {
        let snapshot: WorkspaceSnapshot = from_js(snapshot)?;
        to_js(&self.engine.apply_snapshot(&snapshot, point(x, y), now_ms()))
    }

    /// Remove entities by id. Returns the number removed.
    #[wasm_bindgen(js_name = removeEntities)]
    pub fn remove_entities(&mut self, ids: JsValue) -> Result<usize, JsError> {
        let ids: Vec<EntityId> = from_js(ids)?;
        Ok(self.engine.remove_entities(&ids, now_ms()))
    }

    /// Parse a drag-drop payload into entities. Throws on malformed input.
    #[wasm_bindgen(js_name = parseDrop)]
    pub fn parse_drop(&self, json: &str) -> Result<JsValue, JsError> {
        to_js(&self.engine.parse_drop(json)?)
    }

    /// Number of entities in the workspace.
    #[wasm_bindgen(js_name = nodeCount)]
    pub fn node_count(&self) -> usize {
        self.engine.store().node_count()
    }

    /// Number of drawn links.
    #[wasm_bindgen(js_name = linkCount)]
    pub fn link_count(&self) -> usize {
        self.engine.store().link_count()
    }

    // =========================================================================
    // Transform
    // =========================================================================

    /// Set the canvas size in CSS pixels. Culling and fit use it.
    #[wasm_bindgen(js_name = setViewportSize)]
    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.engine.set_viewport_size(width, height);
    }

    /// Request a new pan/zoom. Applied on the next `frame`; scale is clamped.
    ///
    /// # Arguments
    ///
    /// * `translate_x` - Screen x of the world origin
    /// * `translate_y` - Screen y of the world origin
    /// * `scale` - Zoom factor, 1.0 is one world unit per pixel
    #[wasm_bindgen(js_name = setTransform)]
    pub fn set_transform(&mut self, translate_x: f64, translate_y: f64, scale: f64) {
        self.engine
            .set_transform(Transform::new(translate_x, translate_y, scale), now_ms());
    }

    /// Zoom by `factor` keeping the screen point (`x`, `y`) fixed.
    ///
    /// # Arguments
    ///
    /// * `x`, `y` - Zoom focus in screen pixels, usually the cursor
    /// * `factor` - Multiplier on the current scale (> 1 zooms in)
    #[wasm_bindgen(js_name = zoomAt)]
    pub fn zoom_at(&mut self, x: f64, y: f64, factor: f64) {
        self.engine.zoom_at(Point::new(x, y), factor, now_ms());
    }

    /// Pan by a screen-space delta.
    #[wasm_bindgen(js_name = panBy)]
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.engine.pan_by(dx, dy, now_ms());
    }

    /// Fit all nodes into the viewport. Returns the new transform.
    #[wasm_bindgen(js_name = fitToView)]
    pub fn fit_to_view(&mut self) -> Result<JsValue, JsError> {
        to_js(&self.engine.fit_to_view(now_ms()))
    }

    /// Current applied transform.
    pub fn transform(&self) -> Result<JsValue, JsError> {
        to_js(&self.engine.transform())
    }

    // =========================================================================
    // Frame loop
    // =========================================================================

    /// Advance one animation frame. Call from `requestAnimationFrame`.
    pub fn frame(&mut self, timestamp_ms: f64, dt_ms: f64) -> Result<JsValue, JsError> {
        to_js(&self.engine.frame(timestamp_ms, dt_ms))
    }

    /// Current view state for `saveViewState`.
    #[wasm_bindgen(js_name = viewState)]
    pub fn view_state(&self) -> Result<JsValue, JsError> {
        to_js(&self.engine.view_state())
    }

    /// True while the force simulation still needs frames.
    #[wasm_bindgen(js_name = isLayoutRunning)]
    pub fn is_layout_running(&self) -> bool {
        self.engine.is_layout_running()
    }

    // =========================================================================
    // Pointer input (screen coordinates)
    // =========================================================================

    /// Entity id under a screen point, if any.
    #[wasm_bindgen(js_name = hitTest)]
    pub fn hit_test(&mut self, x: f64, y: f64) -> Option<String> {
        self.engine.hit_test(Point::new(x, y)).map(|id| id.0)
    }

    /// Pointer pressed at a screen point.
    ///
    /// Starts a node press, a preview-item press or a canvas rectangle,
    /// depending on what is under the pointer. Movement past a few pixels
    /// turns a node press into a drag.
    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.engine.pointer_down(Point::new(x, y));
    }

    /// Pointer moved to a screen point.
    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&mut self, x: f64, y: f64) {
        self.engine.pointer_move(Point::new(x, y));
    }

    /// Pointer released. Returns what the gesture amounted to: a click, a
    /// finished drag, a rectangle selection or a preview action.
    ///
    /// # Arguments
    ///
    /// * `ctrl` - Ctrl or Cmd held (toggle selection)
    /// * `shift` - Shift held (reveal neighbors)
    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&mut self, ctrl: bool, shift: bool) -> Result<JsValue, JsError> {
        to_js(&self.engine.pointer_up(Modifiers { ctrl, shift }, now_ms()))
    }

    /// Click on empty canvas. Clears the selection unless a rectangle select just ended.
    #[wasm_bindgen(js_name = clickCanvas)]
    pub fn click_canvas(&mut self) -> Result<JsValue, JsError> {
        to_js(&self.engine.click_canvas(now_ms()))
    }

    /// Click on a node by id, for hosts that hit-test themselves.
    #[wasm_bindgen(js_name = clickNode)]
    pub fn click_node(&mut self, id: &str, ctrl: bool, shift: bool) -> Result<JsValue, JsError> {
        let outcome = self
            .engine
            .click_node(&EntityId::from(id), Modifiers { ctrl, shift }, now_ms());
        to_js(&outcome)
    }

    /// Replace the selection with `ids`. Throws on unknown ids.
    pub fn select(&mut self, ids: JsValue) -> Result<(), JsError> {
        let ids: Vec<EntityId> = from_js(ids)?;
        Ok(self.engine.select(&ids)?)
    }

    // =========================================================================
    // Minimap
    // =========================================================================

    /// Minimap geometry: world bounds, scale and the viewport rectangle.
    #[wasm_bindgen(js_name = minimapFrame)]
    pub fn minimap_frame(&self) -> Result<JsValue, JsError> {
        to_js(&self.engine.minimap_frame())
    }

    /// RGBA pixels for `putImageData`.
    #[wasm_bindgen(js_name = minimapRaster)]
    pub fn minimap_raster(&self) -> Vec<u8> {
        self.engine.minimap_raster()
    }

    /// Center the main view on a minimap point. Returns the new transform.
    #[wasm_bindgen(js_name = minimapClick)]
    pub fn minimap_click(&mut self, x: f64, y: f64) -> Result<JsValue, JsError> {
        to_js(&self.engine.minimap_click(Point::new(x, y), now_ms()))
    }

    // =========================================================================
    // Preview
    // =========================================================================

    /// Toggle the neighbor preview for an entity or preview node.
    ///
    /// When the outcome is `fetchNeighbors` the host fetches and passes the
    /// result to `ingestNeighbors`.
    #[wasm_bindgen(js_name = revealNeighbors)]
    pub fn reveal_neighbors(&mut self, id: &str) -> Result<JsValue, JsError> {
        to_js(&self.engine.reveal_neighbors(&EntityId::from(id)))
    }

    /// Hand fetched neighbors to the preview. Pass `null` when the fetch failed.
    #[wasm_bindgen(js_name = ingestNeighbors)]
    pub fn ingest_neighbors(&mut self, source: &str, neighbors: JsValue) -> Result<bool, JsError> {
        let neighbors: Option<NeighborMap> = optional_from_js(neighbors)?;
        Ok(self.engine.ingest_neighbors(&EntityId::from(source), neighbors))
    }

    /// Click on a preview item. `modifier` promotes a node to a source instead of adding it.
    #[wasm_bindgen(js_name = clickPreviewItem)]
    pub fn click_preview_item(&mut self, item_id: &str, modifier: bool) -> Result<JsValue, JsError> {
        to_js(&self.engine.click_preview_item(item_id, modifier))
    }

    /// Leave preview mode and forget cached preview positions.
    #[wasm_bindgen(js_name = exitPreview)]
    pub fn exit_preview(&mut self) {
        self.engine.exit_preview();
    }

    /// Sources, nodes and groups of the current preview.
    #[wasm_bindgen(js_name = previewState)]
    pub fn preview_state(&self) -> Result<JsValue, JsError> {
        to_js(self.engine.preview_state())
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Everything drawable for the current frame.
    pub fn scene(&self) -> Result<JsValue, JsError> {
        to_js(&self.engine.scene())
    }

    /// Interleaved `[x0, y0, x1, y1, ...]` in `nodeIds()` order.
    pub fn positions(&self) -> Float64Array {
        Float64Array::from(self.engine.positions().as_slice())
    }

    /// Entity ids in the order used by `positions()`.
    #[wasm_bindgen(js_name = nodeIds)]
    pub fn node_ids(&self) -> Result<JsValue, JsError> {
        to_js(&self.engine.node_ids())
    }

    /// Close the workspace. Any pending save is dropped.
    pub fn teardown(&mut self) {
        self.engine.teardown();
    }
}
