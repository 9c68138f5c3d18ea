//! Pixel grid index for clustering
//!
//! Reports are projected into world pixel space at a single zoom level and bucketed
//! into square cells of a fixed pixel size. Because the cell size is constant in
//! pixels, a cell covers a different geographic area at every zoom, so the grid is
//! rebuilt from scratch for each computation and never reused across zoom levels.

use crate::{AccessibilityReport, utils};
use geo::Point;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Integer cell coordinates: `(floor(x / cell_size), floor(y / cell_size))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: i64,
    pub y: i64,
}

impl CellKey {
    /// Cell containing a pixel position
    ///
    /// Points exactly on a boundary belong to the cell whose origin is less than or equal.
    #[inline]
    pub fn for_pixel(x: f64, y: f64, cell_size: f64) -> Self {
        Self {
            x: (x / cell_size).floor() as i64,
            y: (y / cell_size).floor() as i64,
        }
    }

    /// The 3x3 block of keys centered on this one, including itself
    pub fn neighborhood(self) -> impl Iterator<Item = CellKey> {
        (-1..=1).flat_map(move |dy| {
            (-1..=1).map(move |dx| CellKey {
                x: self.x + dx,
                y: self.y + dy,
            })
        })
    }
}

/// One occupied grid cell
#[derive(Debug, Clone)]
pub struct GridCell {
    key: CellKey,
    /// Indices into the slice the grid was built from
    members: SmallVec<[usize; 4]>,
    sum_x: f64,
    sum_y: f64,
}

impl GridCell {
    fn new(key: CellKey) -> Self {
        Self {
            key,
            members: SmallVec::new(),
            sum_x: 0.0,
            sum_y: 0.0,
        }
    }

    fn push(&mut self, index: usize, position: Point<f64>) {
        self.members.push(index);
        self.sum_x += position.x();
        self.sum_y += position.y();
    }

    #[inline]
    pub fn key(&self) -> CellKey {
        self.key
    }

    /// Input indices of the reports in this cell, in input order
    #[inline]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Mean pixel position of the members
    pub fn centroid(&self) -> Point<f64> {
        let n = self.members.len().max(1) as f64;
        Point::new(self.sum_x / n, self.sum_y / n)
    }
}

/// Grid of occupied cells at one zoom level
#[derive(Debug, Clone)]
pub struct GeoGrid {
    zoom: u8,
    cell_size: f64,
    cells: BTreeMap<CellKey, GridCell>,
    positions: Vec<Option<Point<f64>>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeoGrid {
    /// Project and bucket reports at `zoom`
    ///
    /// Reports with invalid coordinates are left out of every cell; their slot in
    /// [`GeoGrid::position`] is `None`.
    pub fn build(
        reports: &[Arc<AccessibilityReport>],
        zoom: u8,
        cell_size: f64,
        tile_size: f64,
    ) -> Self {
        let positions: Vec<Option<Point<f64>>> = reports
            .iter()
            .map(|report| {
                utils::is_valid_coordinate(report.lat, report.lon)
                    .then(|| utils::project(report.lat, report.lon, zoom, tile_size))
            })
            .collect();

        Self::from_positions(positions, zoom, cell_size)
    }

    /// Bucket already projected positions
    pub(crate) fn from_positions(
        positions: Vec<Option<Point<f64>>>,
        zoom: u8,
        cell_size: f64,
    ) -> Self {
        let mut cells: BTreeMap<CellKey, GridCell> = BTreeMap::new();

        for (index, position) in positions.iter().enumerate() {
            let Some(position) = *position else {
                continue;
            };
            let key = CellKey::for_pixel(position.x(), position.y(), cell_size);
            cells
                .entry(key)
                .or_insert_with(|| GridCell::new(key))
                .push(index, position);
        }

        Self {
            zoom,
            cell_size,
            cells,
            positions,
        }
    }

    #[inline]
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    #[inline]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    #[inline]
    pub fn cell(&self, key: CellKey) -> Option<&GridCell> {
        self.cells.get(&key)
    }

    /// Occupied cells in key order
    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.values()
    }

    /// Number of occupied cells
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Projected position of input `index`, `None` if it was skipped
    #[inline]
    pub fn position(&self, index: usize) -> Option<Point<f64>> {
        self.positions.get(index).copied().flatten()
    }

    /// Occupied cells in the 3x3 neighborhood of `key`, excluding `key` itself
    pub fn occupied_neighbors(&self, key: CellKey) -> impl Iterator<Item = &GridCell> {
        key.neighborhood()
            .filter(move |k| *k != key)
            .filter_map(|k| self.cells.get(&k))
    }
}
