//! Viewport bounds and change keys

use crate::utils;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Geographic viewport in WGS84 degrees
///
/// `west > east` means the viewport crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Viewport identity used to skip no-op recomputes
///
/// Bounds are rounded to a fixed number of decimal places (4 places is about 11 m).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportKey {
    west: i64,
    south: i64,
    east: i64,
    north: i64,
    zoom: u8,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// The whole Web Mercator world
    pub fn world() -> Self {
        Self::new(-180.0, -utils::MAX_LATITUDE, 180.0, utils::MAX_LATITUDE)
    }

    /// Smallest box containing every `(lat, lon)` position, `None` when empty
    pub fn from_positions<I>(positions: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        positions.into_iter().fold(None, |acc, (lat, lon)| {
            Some(match acc {
                None => Self::new(lon, lat, lon, lat),
                Some(b) => Self::new(
                    b.west.min(lon),
                    b.south.min(lat),
                    b.east.max(lon),
                    b.north.max(lat),
                ),
            })
        })
    }

    #[inline]
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Whether a position lies inside the box (edges included)
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let lat_ok = lat >= self.south && lat <= self.north;
        let lon_ok = if self.crosses_antimeridian() {
            lon >= self.west || lon <= self.east
        } else {
            lon >= self.west && lon <= self.east
        };
        lat_ok && lon_ok
    }

    /// Center as `(lat, lon)`
    pub fn center(&self) -> (f64, f64) {
        let lat = (self.south + self.north) / 2.0;
        let mut lon = if self.crosses_antimeridian() {
            (self.west + self.east + 360.0) / 2.0
        } else {
            (self.west + self.east) / 2.0
        };
        if lon > 180.0 {
            lon -= 360.0;
        }
        (lat, lon)
    }

    /// Rounded identity of this viewport at `zoom`
    pub fn key(&self, zoom: u8, precision: u32) -> ViewportKey {
        let scale = 10f64.powi(precision as i32);
        let round = |v: f64| (v * scale).round() as i64;
        ViewportKey {
            west: round(self.west),
            south: round(self.south),
            east: round(self.east),
            north: round(self.north),
            zoom,
        }
    }

    /// Pixel-space window of this box at `zoom`, grown by `margin_px` on every side
    pub(crate) fn pixel_window(&self, zoom: u8, tile_size: f64, margin_px: f64) -> PixelWindow {
        let north_west = utils::project(self.north, self.west, zoom, tile_size);
        let south_east = utils::project(self.south, self.east, zoom, tile_size);
        PixelWindow {
            min_x: north_west.x() - margin_px,
            max_x: south_east.x() + margin_px,
            min_y: north_west.y() - margin_px,
            max_y: south_east.y() + margin_px,
            wraps: self.crosses_antimeridian(),
        }
    }
}

impl ViewportKey {
    #[inline]
    pub fn zoom(&self) -> u8 {
        self.zoom
    }
}

/// Viewport culling window in world pixels
#[derive(Debug, Clone, Copy)]
pub(crate) struct PixelWindow {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
    wraps: bool,
}

impl PixelWindow {
    #[inline]
    pub(crate) fn contains(&self, x: f64, y: f64) -> bool {
        let x_ok = if self.wraps {
            x >= self.min_x || x <= self.max_x
        } else {
            x >= self.min_x && x <= self.max_x
        };
        x_ok && y >= self.min_y && y <= self.max_y
    }
}
