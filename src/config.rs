//! Engine configuration.
//!
//! Every field has a default so the host may pass a partial JS object; missing
//! keys fall back to the values below.

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Top-level configuration for a [`crate::workspace::WorkspaceEngine`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub force: ForceConfig,
    pub placement: PlacementConfig,
    pub culling: CullingConfig,
    pub preview: PreviewConfig,
    pub selection: SelectionConfig,
    pub view: ViewConfig,
    pub minimap: MinimapConfig,
    pub persistence: PersistenceConfig,
}

impl EngineConfig {
    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        if !(self.force.node_radius > 0.0) {
            return Err(GraphError::InvalidConfig(format!(
                "nodeRadius must be positive, got {}",
                self.force.node_radius
            )));
        }
        if !(self.view.min_scale > 0.0) || self.view.min_scale > self.view.max_scale {
            return Err(GraphError::InvalidConfig(format!(
                "zoom extent [{}, {}] is invalid",
                self.view.min_scale, self.view.max_scale
            )));
        }
        if !(self.placement.cell_size_multiplier > 0.0) {
            return Err(GraphError::InvalidConfig(
                "cellSizeMultiplier must be positive".into(),
            ));
        }
        if self.placement.check_interval == 0 {
            return Err(GraphError::InvalidConfig("checkInterval must be >= 1".into()));
        }
        if self.force.force_layout_threshold == 0 {
            return Err(GraphError::InvalidConfig(
                "forceLayoutThreshold must be >= 1".into(),
            ));
        }
        if self.minimap.width == 0 || self.minimap.height == 0 {
            return Err(GraphError::InvalidConfig("minimap must have a size".into()));
        }
        Ok(())
    }
}

/// Main force layout parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForceConfig {
    /// Visual node radius in world units.
    pub node_radius: f64,
    /// Target link length.
    pub link_distance: f64,
    /// Many-body strength (negative repels).
    pub charge_strength: f64,
    /// Extra distance added to the node radius by the collision force.
    pub collision_padding: f64,
    /// Synchronous ticks for the initial layout.
    pub initial_ticks: u32,
    /// Starting alpha of the incremental mini-simulation.
    pub incremental_alpha: f64,
    /// Alpha below which the mini-simulation is considered settled.
    pub settle_alpha: f64,
    /// Batches larger than this use the placement algorithm.
    pub force_layout_threshold: usize,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            node_radius: 20.0,
            link_distance: 150.0,
            charge_strength: -300.0,
            collision_padding: 10.0,
            initial_ticks: 300,
            incremental_alpha: 0.3,
            settle_alpha: 0.02,
            force_layout_threshold: 500,
        }
    }
}

/// Deterministic placement parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlacementConfig {
    /// Occupancy cell size as a multiple of the node radius.
    pub cell_size_multiplier: f64,
    /// Ring of cells reserved around each existing entity.
    pub padding_cells: i64,
    /// Upper bound on spiral probes per search.
    pub max_spiral_iterations: usize,
    /// Wall-clock budget for the connected and isolated passes.
    pub time_budget_ms: f64,
    /// The budget is checked once every this many entities.
    pub check_interval: usize,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            cell_size_multiplier: 3.0,
            padding_cells: 1,
            max_spiral_iterations: 2000,
            time_budget_ms: 500.0,
            check_interval: 50,
        }
    }
}

/// Viewport culling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CullingConfig {
    /// Culling only kicks in above this many nodes.
    pub node_threshold: usize,
    /// Screen-space padding around the viewport, in pixels.
    pub viewport_padding: f64,
    /// Badge counts at or above this are shown as "1k+".
    pub badge_cap: usize,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            node_threshold: 500,
            viewport_padding: 200.0,
            badge_cap: 1000,
        }
    }
}

/// Preview (1-hop expansion) parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewConfig {
    /// Above this many revealed entities, results are grouped by type.
    pub group_threshold: usize,
    /// Full source-to-item link distance.
    pub link_distance: f64,
    /// Fraction of the link distance used on the first tick.
    pub start_fraction: f64,
    /// Ticks over which the link distance grows to its full value.
    pub unfurl_ticks: u32,
    /// Per-tick max movement considered "still".
    pub movement_threshold: f64,
    /// Per-tick change in mean link error considered "still".
    pub distance_error_threshold: f64,
    /// Consecutive still ticks required to stop early.
    pub stable_ticks: u32,
    /// Hard timeout for the preview simulation.
    pub timeout_ms: f64,
    /// Radius of a provisional item.
    pub item_radius: f64,
    /// Radius of a group bubble.
    pub group_radius: f64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            group_threshold: 50,
            link_distance: 140.0,
            start_fraction: 0.3,
            unfurl_ticks: 30,
            movement_threshold: 0.5,
            distance_error_threshold: 0.5,
            stable_ticks: 5,
            timeout_ms: 3000.0,
            item_radius: 16.0,
            group_radius: 28.0,
        }
    }
}

/// Selection and pointer interaction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionConfig {
    /// Pointer travel (screen px) before a canvas drag becomes a rectangle select.
    pub min_drag_distance: f64,
    /// Lifetime of the click-suppression guard.
    pub click_guard_ms: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_drag_distance: 5.0,
            click_guard_ms: 250.0,
        }
    }
}

/// Pan/zoom parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Padding used when fitting the graph into the viewport.
    pub fit_padding: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 4.0,
            fit_padding: 50.0,
        }
    }
}

/// Minimap raster parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MinimapConfig {
    pub width: u32,
    pub height: u32,
    pub padding: f64,
    /// Side length of a node dot in minimap pixels.
    pub dot_size: u32,
}

impl Default for MinimapConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            padding: 8.0,
            dot_size: 2,
        }
    }
}

/// Debounced view-state persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceConfig {
    pub debounce_ms: f64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { debounce_ms: 500.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"force": {"nodeRadius": 12}, "preview": {"groupThreshold": 10}}"#)
                .unwrap();
        assert_eq!(config.force.node_radius, 12.0);
        assert_eq!(config.force.link_distance, 150.0);
        assert_eq!(config.preview.group_threshold, 10);
        assert_eq!(config.culling.node_threshold, 500);
    }

    #[test]
    fn test_inverted_zoom_extent_rejected() {
        let mut config = EngineConfig::default();
        config.view.min_scale = 5.0;
        assert!(matches!(config.validate(), Err(GraphError::InvalidConfig(_))));
    }
}
