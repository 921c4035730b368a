//! Landmark map loading.
//!
//! The map provider hands the core an ordered list of landmarks, each with a stable
//! integer id and world-frame coordinates, loaded once before the spatial grid is built.
//! The on-disk format is the tab-separated landmark table the telemetry simulator ships:
//! one `x<TAB>y<TAB>id` row per landmark, no header.

use crate::grid::{Bounds, GridPoint};
use crate::{MclError, Result};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One mapped landmark in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: i32,
    pub x: f64,
    pub y: f64,
}

impl Landmark {
    pub fn new(id: i32, x: f64, y: f64) -> Landmark {
        Landmark { id, x, y }
    }
}

impl GridPoint for Landmark {
    fn id(&self) -> i32 {
        self.id
    }

    fn x(&self) -> f64 {
        self.x
    }

    fn y(&self) -> f64 {
        self.y
    }
}

/// The known landmark map.
#[derive(Clone, Debug, Default)]
pub struct Map {
    pub landmarks: Vec<Landmark>,
}

impl Map {
    /// Read a tab-separated `x y id` landmark table (no header).
    ///
    /// # Errors
    /// [`MclError::Map`] if the file cannot be read or a row does not parse.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Map> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())
            .map_err(|e| MclError::Map(format!("{}: {e}", path.as_ref().display())))?;
        let mut landmarks = Vec::new();
        for row in reader.deserialize() {
            let (x, y, id): (f64, f64, i32) = row?;
            landmarks.push(Landmark::new(id, x, y));
        }
        Ok(Map { landmarks })
    }

    /// Bounding rectangle of all landmarks, or `None` for an empty map.
    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.landmarks.first()?;
        let mut bounds = Bounds::new(first.x, first.y, first.x, first.y);
        for landmark in &self.landmarks[1..] {
            bounds.x0 = bounds.x0.min(landmark.x);
            bounds.y0 = bounds.y0.min(landmark.y);
            bounds.x1 = bounds.x1.max(landmark.x);
            bounds.y1 = bounds.y1.max(landmark.y);
        }
        Some(bounds)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}
