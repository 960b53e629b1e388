//! Minimap overview.
//!
//! The minimap shows every positioned node as a small dot plus the outline
//! of the main viewport, fitted to the node bounds. Frames are plain data;
//! [`MinimapRenderer::rasterize`] turns one into an RGBA buffer the host
//! can hand to `putImageData`.

use serde::Serialize;

use crate::config::MinimapConfig;
use crate::graph::GraphStore;
use crate::transform::{
    MinimapTransform, Point, Rect, Transform, center_on, minimap_to_world, minimap_transform,
    viewport_to_minimap_rect, world_to_minimap,
};

const BACKGROUND: [u8; 4] = [248, 248, 250, 255];
const NODE: [u8; 4] = [96, 110, 140, 255];
const SELECTED: [u8; 4] = [230, 120, 30, 255];
const VIEWPORT: [u8; 4] = [40, 120, 220, 255];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinimapDot {
    pub x: f64,
    pub y: f64,
    pub selected: bool,
}

/// One minimap frame in minimap pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimapFrame {
    pub width: u32,
    pub height: u32,
    pub transform: Option<MinimapTransform>,
    pub dots: Vec<MinimapDot>,
    pub viewport: Option<Rect>,
}

pub struct MinimapRenderer {
    config: MinimapConfig,
}

impl MinimapRenderer {
    pub fn new(config: MinimapConfig) -> Self {
        Self { config }
    }

    fn fit(&self, store: &GraphStore) -> Option<MinimapTransform> {
        minimap_transform(
            &store.positioned_points(),
            self.config.width as f64,
            self.config.height as f64,
            self.config.padding,
        )
    }

    pub fn frame(&self, store: &GraphStore, transform: &Transform, viewport_width: f64, viewport_height: f64) -> MinimapFrame {
        let mm = self.fit(store);
        let dots = match &mm {
            Some(mm) => store
                .nodes()
                .filter_map(|n| {
                    let p = n.position?;
                    let at = world_to_minimap(p.x, p.y, mm);
                    Some(MinimapDot {
                        x: at.x,
                        y: at.y,
                        selected: n.state.is_selected(),
                    })
                })
                .collect(),
            None => Vec::new(),
        };
        let viewport = mm
            .as_ref()
            .map(|mm| viewport_to_minimap_rect(transform, viewport_width, viewport_height, mm));
        MinimapFrame {
            width: self.config.width,
            height: self.config.height,
            transform: mm,
            dots,
            viewport,
        }
    }

    /// Transform that centers the main viewport on the world point under a
    /// minimap pixel. `None` when the graph is empty.
    pub fn pan_to(
        &self,
        store: &GraphStore,
        minimap_point: Point,
        transform: &Transform,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Option<Transform> {
        let mm = self.fit(store)?;
        let world = minimap_to_world(minimap_point.x, minimap_point.y, &mm);
        Some(center_on(world, transform, viewport_width, viewport_height))
    }

    /// Rasterize a frame into a row-major RGBA buffer.
    pub fn rasterize(&self, frame: &MinimapFrame) -> Vec<u8> {
        let (w, h) = (frame.width as i64, frame.height as i64);
        let mut pixels = Vec::with_capacity((w * h * 4) as usize);
        for _ in 0..w * h {
            pixels.extend_from_slice(&BACKGROUND);
        }
        let mut put = |x: i64, y: i64, color: [u8; 4]| {
            if x >= 0 && y >= 0 && x < w && y < h {
                let i = ((y * w + x) * 4) as usize;
                pixels[i..i + 4].copy_from_slice(&color);
            }
        };

        let size = self.config.dot_size.max(1) as i64;
        let half = size / 2;
        for dot in &frame.dots {
            let color = if dot.selected { SELECTED } else { NODE };
            let (cx, cy) = (dot.x.round() as i64, dot.y.round() as i64);
            for dy in 0..size {
                for dx in 0..size {
                    put(cx - half + dx, cy - half + dy, color);
                }
            }
        }

        if let Some(r) = frame.viewport {
            let x0 = r.x.round() as i64;
            let y0 = r.y.round() as i64;
            let x1 = (r.x + r.width).round() as i64;
            let y1 = (r.y + r.height).round() as i64;
            // Only the part of each edge inside the raster is walked.
            for x in x0.max(0)..=x1.min(w - 1) {
                put(x, y0, VIEWPORT);
                put(x, y1, VIEWPORT);
            }
            for y in y0.max(0)..=y1.min(h - 1) {
                put(x0, y, VIEWPORT);
                put(x1, y, VIEWPORT);
            }
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, EntityId};

    fn store() -> GraphStore {
        let mut store = GraphStore::new();
        for (name, x, y) in [("a", 0.0, 0.0), ("b", 1000.0, 500.0)] {
            store.add_entity(Entity::new(name, name, "person"));
            store.set_position(&EntityId::from(name), Point::new(x, y));
        }
        store
    }

    fn pixel(buf: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
    }

    #[test]
    fn test_empty_graph_frame() {
        let renderer = MinimapRenderer::new(MinimapConfig::default());
        let frame = renderer.frame(&GraphStore::new(), &Transform::IDENTITY, 800.0, 600.0);
        assert!(frame.transform.is_none());
        assert!(frame.dots.is_empty());
        assert_eq!(renderer.rasterize(&frame).len(), 160 * 120 * 4);
        assert!(renderer.pan_to(&GraphStore::new(), Point::default(), &Transform::IDENTITY, 800.0, 600.0).is_none());
    }

    #[test]
    fn test_dots_inside_raster() {
        let renderer = MinimapRenderer::new(MinimapConfig::default());
        let frame = renderer.frame(&store(), &Transform::IDENTITY, 800.0, 600.0);
        assert_eq!(frame.dots.len(), 2);
        for dot in &frame.dots {
            assert!(dot.x >= 0.0 && dot.x <= 160.0 && dot.y >= 0.0 && dot.y <= 120.0);
        }
        let buf = renderer.rasterize(&frame);
        let d = frame.dots[0];
        assert_eq!(pixel(&buf, 160, d.x.round() as u32, d.y.round() as u32), NODE);
    }

    #[test]
    fn test_viewport_outline_drawn() {
        let renderer = MinimapRenderer::new(MinimapConfig::default());
        // Visible world is x 400..600, y 200..300, well inside the graph.
        let transform = Transform::new(-400.0, -200.0, 1.0);
        let frame = renderer.frame(&store(), &transform, 200.0, 100.0);
        let r = frame.viewport.unwrap();
        let buf = renderer.rasterize(&frame);
        let x = (r.x + r.width / 2.0).round() as u32;
        assert_eq!(pixel(&buf, 160, x, r.y.round() as u32), VIEWPORT);
    }

    #[test]
    fn test_pan_to_centers_viewport() {
        let store = store();
        let renderer = MinimapRenderer::new(MinimapConfig::default());
        let frame = renderer.frame(&store, &Transform::IDENTITY, 800.0, 600.0);
        let b = frame.dots[1];
        let t = renderer
            .pan_to(&store, Point::new(b.x, b.y), &Transform::IDENTITY, 800.0, 600.0)
            .unwrap();
        let center = crate::transform::screen_to_world(400.0, 300.0, &t);
        assert!(center.distance_to(Point::new(1000.0, 500.0)) < 1e-6);
        assert_eq!(t.scale, 1.0);
    }
}
