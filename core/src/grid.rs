//! Uniform-grid spatial partition for nearest-landmark queries.
//!
//! The landmark map is static for the life of the process, so it is bucketed once into a
//! uniform grid over the world's bounding rectangle. A nearest-point query starts at the
//! cell containing the query coordinate and scans outward in square rings, visiting only
//! the newly exposed ring of cells at each level so no cell is scanned twice. The search
//! halts at the end of the first level at which any point was found.
//!
//! That stop rule makes the query *approximate*: a strictly closer point lying in a ring
//! that was never scanned is not considered. This is a deliberate speed/precision
//! trade-off — the query runs once per observation per particle per telemetry step, and
//! ring expansion bounds the worst case by the configured search radius instead of the
//! map size. Callers that need the answer to be exact should keep the cell size small
//! relative to the expected landmark spacing.

use crate::{MclError, Result};

/// Read-only point capability required of anything stored in a [`SpatialGrid`].
///
/// The grid treats its elements as opaque points; only the filter cares about `id`,
/// which it records in a particle's association list after a successful query.
pub trait GridPoint {
    fn id(&self) -> i32;
    fn x(&self) -> f64;
    fn y(&self) -> f64;
}

/// Axis-aligned world bounding rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Bounds {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Bounds {
        Bounds { x0, y0, x1, y1 }
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn expanded(self, margin: f64) -> Bounds {
        Bounds {
            x0: self.x0 - margin,
            y0: self.y0 - margin,
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// Uniform grid over a bounded rectangle answering nearest-point queries by
/// expanding-ring search.
///
/// Built once from the static map before the filter loop starts and read-only
/// thereafter, so it can be shared freely across the per-particle weight update.
/// Cell buckets are allocated lazily: a cell that never received a point stays `None`,
/// distinct from a bucket that exists but is empty.
#[derive(Clone, Debug)]
pub struct SpatialGrid<T: GridPoint> {
    bounds: Bounds,
    cell_size: f64,
    dim_x: usize,
    dim_y: usize,
    search_levels: usize,
    cells: Vec<Option<Vec<T>>>,
}

impl<T: GridPoint> SpatialGrid<T> {
    /// Create an empty grid over `bounds` with square cells of side `cell_size`.
    ///
    /// The grid is `ceil(width / cell_size) × ceil(height / cell_size)` cells, and
    /// queries give up after `round(max_search_dist / cell_size)` ring levels.
    ///
    /// # Errors
    /// [`MclError::InvalidGeometry`] if the rectangle is degenerate (`x0 >= x1` or
    /// `y0 >= y1`), `cell_size` is not strictly positive, or `max_search_dist` is
    /// negative.
    pub fn new(bounds: Bounds, cell_size: f64, max_search_dist: f64) -> Result<SpatialGrid<T>> {
        if !(bounds.x0 < bounds.x1 && bounds.y0 < bounds.y1) {
            return Err(MclError::InvalidGeometry(format!(
                "degenerate bounding rectangle ({}, {}) .. ({}, {})",
                bounds.x0, bounds.y0, bounds.x1, bounds.y1
            )));
        }
        if !(cell_size > 0.0) {
            return Err(MclError::InvalidGeometry(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        if max_search_dist < 0.0 {
            return Err(MclError::InvalidGeometry(format!(
                "max search distance must be non-negative, got {max_search_dist}"
            )));
        }
        let dim_x = (bounds.width() / cell_size).ceil() as usize;
        let dim_y = (bounds.height() / cell_size).ceil() as usize;
        let search_levels = (max_search_dist / cell_size).round() as usize;
        let mut cells = Vec::with_capacity(dim_x * dim_y);
        cells.resize_with(dim_x * dim_y, || None);
        Ok(SpatialGrid {
            bounds,
            cell_size,
            dim_x,
            dim_y,
            search_levels,
            cells,
        })
    }

    fn cell_index(&self, cx: usize, cy: usize) -> usize {
        cx + cy * self.dim_x
    }

    /// Insert a point into the cell containing its coordinates.
    ///
    /// # Errors
    /// [`MclError::InvalidGeometry`] if the point lies outside the configured world
    /// rectangle. Rejecting here keeps the cell invariant (every stored point is in
    /// exactly the cell its coordinates select) instead of silently corrupting a border
    /// bucket.
    pub fn insert(&mut self, point: T) -> Result<()> {
        let cx = ((point.x() - self.bounds.x0) / self.cell_size).floor();
        let cy = ((point.y() - self.bounds.y0) / self.cell_size).floor();
        if cx < 0.0 || cy < 0.0 || cx >= self.dim_x as f64 || cy >= self.dim_y as f64 {
            return Err(MclError::InvalidGeometry(format!(
                "point {} at ({}, {}) lies outside the world rectangle",
                point.id(),
                point.x(),
                point.y()
            )));
        }
        let index = self.cell_index(cx as usize, cy as usize);
        self.cells[index].get_or_insert_with(Vec::new).push(point);
        Ok(())
    }

    /// Insert every point of an iterator, failing on the first out-of-world point.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, points: I) -> Result<()> {
        for point in points {
            self.insert(point)?;
        }
        Ok(())
    }

    /// Find the nearest stored point to `(x, y)` by expanding-ring search.
    ///
    /// Returns the point (or `None`), its Euclidean distance (−1.0 when nothing was
    /// found), and the number of stored points examined. The result is the nearest point
    /// *within the first ring level that yielded any point* — not necessarily the global
    /// nearest; see the module docs for the approximation guarantee. Gives up after the
    /// configured number of levels.
    pub fn find_nearest(&self, x: f64, y: f64) -> (Option<&T>, f64, usize) {
        let mut cx0 = ((x - self.bounds.x0) / self.cell_size).floor() as i64;
        let mut cy0 = ((y - self.bounds.y0) / self.cell_size).floor() as i64;
        let mut cx1 = cx0 + 1;
        let mut cy1 = cy0 + 1;
        let mut level = 0;
        let mut searched = 0;
        let mut found: Option<&T> = None;
        let mut min_dist_sq = f64::INFINITY;
        while found.is_none() && level < self.search_levels {
            level += 1;
            let lo_x = cx0.max(0);
            let lo_y = cy0.max(0);
            let hi_x = cx1.min(self.dim_x as i64);
            let hi_y = cy1.min(self.dim_y as i64);
            for cy in lo_y..hi_y {
                for cx in lo_x..hi_x {
                    if cx > lo_x && cy > lo_y && cx < hi_x - 1 && cy < hi_y - 1 {
                        // interior of the window, scanned at the previous level
                        continue;
                    }
                    if let Some(bucket) = &self.cells[self.cell_index(cx as usize, cy as usize)] {
                        for point in bucket {
                            searched += 1;
                            let dx = x - point.x();
                            let dy = y - point.y();
                            let dist_sq = dx * dx + dy * dy;
                            if dist_sq < min_dist_sq {
                                min_dist_sq = dist_sq;
                                found = Some(point);
                            }
                        }
                    }
                }
            }
            cx0 -= 1;
            cy0 -= 1;
            cx1 += 1;
            cy1 += 1;
        }
        match found {
            Some(point) => (Some(point), min_dist_sq.sqrt(), searched),
            None => (None, -1.0, searched),
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Grid dimensions in cells, (columns, rows).
    pub fn dims(&self) -> (usize, usize) {
        (self.dim_x, self.dim_y)
    }

    pub fn search_levels(&self) -> usize {
        self.search_levels
    }

    /// Total number of stored points.
    pub fn len(&self) -> usize {
        self.cells
            .iter()
            .map(|bucket| bucket.as_ref().map_or(0, Vec::len))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
