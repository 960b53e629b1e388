//! Coordinate transforms between world, screen and minimap space.
//!
//! World coordinates are the layout's own units. Screen coordinates are
//! container pixels: `screen = world * scale + translate`. The minimap uses
//! an independent linear map fitted to the node bounds.

use serde::{Deserialize, Serialize};

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance_to(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle given by its top-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Whether a point lies inside the rectangle (edges inclusive).
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// Axis-aligned bounds given by min/max corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Bounds of a set of points, or `None` if there are none.
    pub fn from_points<I: IntoIterator<Item = Point>>(points: I) -> Option<Self> {
        let mut bounds: Option<Bounds> = None;
        for p in points {
            if !p.x.is_finite() || !p.y.is_finite() {
                continue;
            }
            bounds = Some(match bounds {
                None => Bounds {
                    min_x: p.x,
                    min_y: p.y,
                    max_x: p.x,
                    max_y: p.y,
                },
                Some(b) => Bounds {
                    min_x: b.min_x.min(p.x),
                    min_y: b.min_y.min(p.y),
                    max_x: b.max_x.max(p.x),
                    max_y: b.max_y.max(p.y),
                },
            });
        }
        bounds
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Grow the bounds by `amount` on every side.
    pub fn expand(&self, amount: f64) -> Self {
        Self {
            min_x: self.min_x - amount,
            min_y: self.min_y - amount,
            max_x: self.max_x + amount,
            max_y: self.max_y + amount,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

/// Pan/zoom state shared by the main canvas and the minimap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub translate_x: f64,
    pub translate_y: f64,
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translate_x: 0.0,
        translate_y: 0.0,
        scale: 1.0,
    };

    pub fn new(translate_x: f64, translate_y: f64, scale: f64) -> Self {
        Self {
            translate_x,
            translate_y,
            scale,
        }
    }

    /// Copy of this transform with the scale clamped to `[min, max]`.
    pub fn clamped(self, min: f64, max: f64) -> Self {
        Self {
            scale: self.scale.clamp(min, max),
            ..self
        }
    }

    /// Zoom by `factor` keeping the screen point `anchor` fixed.
    pub fn zoom_at(self, anchor: Point, factor: f64, min: f64, max: f64) -> Self {
        let world = screen_to_world(anchor.x, anchor.y, &self);
        let scale = (self.scale * factor).clamp(min, max);
        Self {
            translate_x: anchor.x - world.x * scale,
            translate_y: anchor.y - world.y * scale,
            scale,
        }
    }

    /// Pan by a screen-space delta.
    pub fn pan_by(self, dx: f64, dy: f64) -> Self {
        Self {
            translate_x: self.translate_x + dx,
            translate_y: self.translate_y + dy,
            ..self
        }
    }

    /// World-space rectangle visible in a `width x height` viewport, grown by
    /// `padding_px` screen pixels on every side.
    pub fn visible_world_bounds(&self, width: f64, height: f64, padding_px: f64) -> Bounds {
        let top_left = screen_to_world(-padding_px, -padding_px, self);
        let bottom_right = screen_to_world(width + padding_px, height + padding_px, self);
        Bounds {
            min_x: top_left.x.min(bottom_right.x),
            min_y: top_left.y.min(bottom_right.y),
            max_x: top_left.x.max(bottom_right.x),
            max_y: top_left.y.max(bottom_right.y),
        }
    }
}

/// Map a world point to screen space.
#[inline]
pub fn world_to_screen(x: f64, y: f64, transform: &Transform) -> Point {
    Point::new(
        x * transform.scale + transform.translate_x,
        y * transform.scale + transform.translate_y,
    )
}

/// Map a screen point to world space. Exact inverse of [`world_to_screen`].
#[inline]
pub fn screen_to_world(x: f64, y: f64, transform: &Transform) -> Point {
    Point::new(
        (x - transform.translate_x) / transform.scale,
        (y - transform.translate_y) / transform.scale,
    )
}

/// Transform that fits all `nodes` inside the viewport.
///
/// The node bounding box is grown by `node_radius` and fitted into the
/// viewport minus `padding` on each side. The scale never exceeds 1.0 and
/// the box is centered. An empty node set yields the identity transform.
pub fn fit_transform(
    nodes: &[Point],
    viewport_width: f64,
    viewport_height: f64,
    padding: f64,
    node_radius: f64,
) -> Transform {
    let Some(bounds) = Bounds::from_points(nodes.iter().copied()) else {
        return Transform::IDENTITY;
    };
    let bounds = bounds.expand(node_radius);

    let available_w = (viewport_width - 2.0 * padding).max(1.0);
    let available_h = (viewport_height - 2.0 * padding).max(1.0);
    let graph_w = bounds.width().max(f64::EPSILON);
    let graph_h = bounds.height().max(f64::EPSILON);

    let scale = (available_w / graph_w).min(available_h / graph_h).min(1.0);
    let center = bounds.center();

    Transform {
        translate_x: viewport_width / 2.0 - center.x * scale,
        translate_y: viewport_height / 2.0 - center.y * scale,
        scale,
    }
}

/// Linear map from world space into minimap pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimapTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Fit the node bounds into a `minimap_width x minimap_height` raster.
///
/// Returns `None` for an empty node set.
pub fn minimap_transform(
    nodes: &[Point],
    minimap_width: f64,
    minimap_height: f64,
    padding: f64,
) -> Option<MinimapTransform> {
    let bounds = Bounds::from_points(nodes.iter().copied())?;
    let available_w = (minimap_width - 2.0 * padding).max(1.0);
    let available_h = (minimap_height - 2.0 * padding).max(1.0);
    let graph_w = bounds.width().max(1.0);
    let graph_h = bounds.height().max(1.0);

    let scale = (available_w / graph_w).min(available_h / graph_h);
    let center = bounds.center();
    Some(MinimapTransform {
        scale,
        offset_x: minimap_width / 2.0 - center.x * scale,
        offset_y: minimap_height / 2.0 - center.y * scale,
    })
}

/// Map a world point into minimap pixels.
#[inline]
pub fn world_to_minimap(x: f64, y: f64, mm: &MinimapTransform) -> Point {
    Point::new(x * mm.scale + mm.offset_x, y * mm.scale + mm.offset_y)
}

/// Map a minimap pixel back into world space.
#[inline]
pub fn minimap_to_world(x: f64, y: f64, mm: &MinimapTransform) -> Point {
    Point::new((x - mm.offset_x) / mm.scale, (y - mm.offset_y) / mm.scale)
}

/// Project the main viewport onto the minimap.
pub fn viewport_to_minimap_rect(
    transform: &Transform,
    viewport_width: f64,
    viewport_height: f64,
    mm: &MinimapTransform,
) -> Rect {
    let world = transform.visible_world_bounds(viewport_width, viewport_height, 0.0);
    let top_left = world_to_minimap(world.min_x, world.min_y, mm);
    let bottom_right = world_to_minimap(world.max_x, world.max_y, mm);
    Rect {
        x: top_left.x,
        y: top_left.y,
        width: bottom_right.x - top_left.x,
        height: bottom_right.y - top_left.y,
    }
}

/// Transform that keeps the current scale but centers the viewport on `world`.
pub fn center_on(world: Point, transform: &Transform, viewport_width: f64, viewport_height: f64) -> Transform {
    Transform {
        translate_x: viewport_width / 2.0 - world.x * transform.scale,
        translate_y: viewport_height / 2.0 - world.y * transform.scale,
        scale: transform.scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs()))
    }

    #[test]
    fn test_round_trip() {
        let transforms = [
            Transform::IDENTITY,
            Transform::new(120.5, -33.25, 0.1),
            Transform::new(-4000.0, 900.0, 3.75),
            Transform::new(0.001, 0.002, 0.37),
        ];
        let points = [(0.0, 0.0), (1.5, -2.5), (-12345.678, 98765.4321), (1e-6, 1e6)];
        for t in &transforms {
            for &(x, y) in &points {
                let s = world_to_screen(x, y, t);
                let w = screen_to_world(s.x, s.y, t);
                assert!(approx(w.x, x) && approx(w.y, y), "round trip failed for ({x},{y}) under {t:?}");
            }
        }
    }

    #[test]
    fn test_fit_single_node_centered() {
        let t = fit_transform(&[Point::new(100.0, 50.0)], 800.0, 600.0, 50.0, 20.0);
        assert_eq!(t.scale, 1.0);
        let s = world_to_screen(100.0, 50.0, &t);
        assert!(approx(s.x, 400.0));
        assert!(approx(s.y, 300.0));
    }

    #[test]
    fn test_fit_large_graph_scales_down() {
        // 2000 x 200 world box (plus radius) in an 800 x 600 viewport: width binds.
        let nodes = [Point::new(0.0, 0.0), Point::new(2000.0, 200.0)];
        let t = fit_transform(&nodes, 800.0, 600.0, 0.0, 0.0);
        assert!(t.scale < 1.0);
        assert!(approx(t.scale, (800.0_f64 / 2000.0).min(600.0 / 200.0)));
    }

    #[test]
    fn test_fit_never_scales_up() {
        let nodes = [Point::new(0.0, 0.0), Point::new(10.0, 10.0)];
        let t = fit_transform(&nodes, 2000.0, 2000.0, 10.0, 1.0);
        assert_eq!(t.scale, 1.0);
    }

    #[test]
    fn test_fit_empty_is_identity() {
        assert_eq!(fit_transform(&[], 800.0, 600.0, 50.0, 20.0), Transform::IDENTITY);
    }

    #[test]
    fn test_minimap_empty_is_none() {
        assert!(minimap_transform(&[], 160.0, 120.0, 8.0).is_none());
    }

    #[test]
    fn test_minimap_round_trip_and_fit() {
        let nodes = [Point::new(-500.0, -100.0), Point::new(500.0, 100.0)];
        let mm = minimap_transform(&nodes, 160.0, 120.0, 8.0).unwrap();
        for n in &nodes {
            let p = world_to_minimap(n.x, n.y, &mm);
            assert!(p.x >= 8.0 - 1e-9 && p.x <= 152.0 + 1e-9);
            assert!(p.y >= 0.0 && p.y <= 120.0);
            let back = minimap_to_world(p.x, p.y, &mm);
            assert!(approx(back.x, n.x) && approx(back.y, n.y));
        }
    }

    #[test]
    fn test_viewport_rect_on_minimap() {
        let nodes = [Point::new(0.0, 0.0), Point::new(1000.0, 1000.0)];
        let mm = minimap_transform(&nodes, 100.0, 100.0, 0.0).unwrap();
        // Identity transform, 500x500 viewport shows world [0,500]^2.
        let rect = viewport_to_minimap_rect(&Transform::IDENTITY, 500.0, 500.0, &mm);
        assert!(approx(rect.x, 0.0));
        assert!(approx(rect.width, 50.0));
        assert!(approx(rect.height, 50.0));
    }

    #[test]
    fn test_zoom_at_keeps_anchor_fixed() {
        let t = Transform::new(10.0, 20.0, 1.0);
        let anchor = Point::new(300.0, 200.0);
        let before = screen_to_world(anchor.x, anchor.y, &t);
        let zoomed = t.zoom_at(anchor, 2.0, 0.1, 4.0);
        let after = screen_to_world(anchor.x, anchor.y, &zoomed);
        assert!(approx(before.x, after.x) && approx(before.y, after.y));
        assert_eq!(zoomed.scale, 2.0);

        let clamped = zoomed.zoom_at(anchor, 100.0, 0.1, 4.0);
        assert_eq!(clamped.scale, 4.0);
    }

    #[test]
    fn test_center_on() {
        let t = Transform::new(0.0, 0.0, 2.0);
        let centered = center_on(Point::new(50.0, 25.0), &t, 400.0, 300.0);
        let s = world_to_screen(50.0, 25.0, &centered);
        assert!(approx(s.x, 200.0) && approx(s.y, 150.0));
        assert_eq!(centered.scale, 2.0);
    }
}
