//! Coarse occupancy grid for deterministic placement.
//!
//! Space is divided into square cells of `cell_size` world units. A cell is
//! either free or occupied; placement reserves exactly one cell per node, so
//! two placed nodes can never resolve to the same cell.

use std::collections::HashSet;

use crate::transform::Point;

/// Golden angle in radians, `pi * (3 - sqrt(5))`.
pub const GOLDEN_ANGLE: f64 = 2.399963229728653;

/// Integer cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub col: i64,
    pub row: i64,
}

impl CellKey {
    #[inline]
    pub const fn new(col: i64, row: i64) -> Self {
        Self { col, row }
    }
}

/// Set of occupied cells.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    cell_size: f64,
    occupied: HashSet<CellKey>,
}

impl OccupancyGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            occupied: HashSet::new(),
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Cell containing a world point.
    #[inline]
    pub fn cell_of(&self, p: Point) -> CellKey {
        CellKey::new(
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
        )
    }

    /// World-space center of a cell.
    #[inline]
    pub fn cell_center(&self, cell: CellKey) -> Point {
        Point::new(
            (cell.col as f64 + 0.5) * self.cell_size,
            (cell.row as f64 + 0.5) * self.cell_size,
        )
    }

    #[inline]
    pub fn is_free(&self, cell: CellKey) -> bool {
        !self.occupied.contains(&cell)
    }

    /// Reserve a cell. Returns false if it was already occupied.
    #[inline]
    pub fn occupy(&mut self, cell: CellKey) -> bool {
        self.occupied.insert(cell)
    }

    /// Reserve a cell and the `ring` cells around it.
    pub fn occupy_with_padding(&mut self, cell: CellKey, ring: i64) {
        let ring = ring.max(0);
        for dc in -ring..=ring {
            for dr in -ring..=ring {
                self.occupied.insert(CellKey::new(cell.col + dc, cell.row + dr));
            }
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.len()
    }

    /// Nearest free cell to `center` along a golden-angle spiral.
    ///
    /// Probe `i` sits at radius `step * sqrt(i)` and angle `i * GOLDEN_ANGLE`,
    /// with `step` half a cell so consecutive rings overlap. Returns `None`
    /// once `max_iterations` probes have been tried.
    pub fn spiral_search(&self, center: Point, max_iterations: usize) -> Option<CellKey> {
        let step = self.cell_size * 0.5;
        for i in 0..max_iterations {
            let radius = step * (i as f64).sqrt();
            let angle = i as f64 * GOLDEN_ANGLE;
            let probe = Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin());
            let cell = self.cell_of(probe);
            if self.is_free(cell) {
                return Some(cell);
            }
        }
        None
    }

    /// First free cell scanning row-major from `origin`, `columns` cells wide.
    ///
    /// Always terminates: each row holds `columns` cells and only finitely
    /// many cells are occupied.
    pub fn scan_free(&self, origin: CellKey, columns: i64, start: i64) -> (CellKey, i64) {
        let columns = columns.max(1);
        let mut slot = start.max(0);
        loop {
            let cell = CellKey::new(origin.col + slot % columns, origin.row + slot / columns);
            slot += 1;
            if self.is_free(cell) {
                return (cell, slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_of_handles_negative_coordinates() {
        let grid = OccupancyGrid::new(10.0);
        assert_eq!(grid.cell_of(Point::new(0.0, 0.0)), CellKey::new(0, 0));
        assert_eq!(grid.cell_of(Point::new(9.99, 9.99)), CellKey::new(0, 0));
        assert_eq!(grid.cell_of(Point::new(-0.01, -10.0)), CellKey::new(-1, -1));
        assert_eq!(grid.cell_of(grid.cell_center(CellKey::new(-3, 7))), CellKey::new(-3, 7));
    }

    #[test]
    fn test_occupy_with_padding() {
        let mut grid = OccupancyGrid::new(10.0);
        grid.occupy_with_padding(CellKey::new(0, 0), 1);
        assert_eq!(grid.occupied_count(), 9);
        assert!(!grid.is_free(CellKey::new(-1, 1)));
        assert!(grid.is_free(CellKey::new(2, 0)));
        assert!(!grid.occupy(CellKey::new(1, 1)));
    }

    #[test]
    fn test_spiral_starts_at_center() {
        let grid = OccupancyGrid::new(10.0);
        let cell = grid.spiral_search(Point::new(55.0, 55.0), 10).unwrap();
        assert_eq!(cell, CellKey::new(5, 5));
    }

    #[test]
    fn test_spiral_finds_nearby_free_cell() {
        let mut grid = OccupancyGrid::new(10.0);
        grid.occupy_with_padding(CellKey::new(0, 0), 1);
        let cell = grid.spiral_search(Point::new(5.0, 5.0), 200).unwrap();
        assert!(grid.is_free(cell));
        assert!(cell.col.abs() <= 3 && cell.row.abs() <= 3, "expected a nearby cell, got {cell:?}");
    }

    #[test]
    fn test_spiral_gives_up() {
        let mut grid = OccupancyGrid::new(10.0);
        grid.occupy_with_padding(CellKey::new(0, 0), 50);
        assert!(grid.spiral_search(Point::new(5.0, 5.0), 100).is_none());
    }

    #[test]
    fn test_scan_free_skips_occupied() {
        let mut grid = OccupancyGrid::new(10.0);
        grid.occupy(CellKey::new(0, 0));
        grid.occupy(CellKey::new(1, 0));
        let (cell, next) = grid.scan_free(CellKey::new(0, 0), 3, 0);
        assert_eq!(cell, CellKey::new(2, 0));
        assert_eq!(next, 3);
        let (cell, _) = grid.scan_free(CellKey::new(0, 0), 3, next);
        assert_eq!(cell, CellKey::new(0, 1));
    }
}
