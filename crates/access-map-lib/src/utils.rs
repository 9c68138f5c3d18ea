//! Utility functions for coordinate projection and distance calculations
//!
//! Positions are projected into "world pixel" space: the Web Mercator plane scaled so
//! that the whole world is `tile_size * 2^zoom` pixels wide, with `y` growing southward.
//! This matches the tiling scheme of common map SDKs, so a distance measured here is
//! the distance a user sees on screen.

use geo::Point;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Mean Earth radius in meters, used for haversine distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Precomputed constant: 1.0 / 360.0
const LON_TO_UNIT_FACTOR: f64 = 1.0 / 360.0;

/// Precomputed constant: 1.0 / (2 * PI)
const Y_TO_UNIT_FACTOR: f64 = 1.0 / (2.0 * std::f64::consts::PI);

/// Width (and height) of the world in pixels at the given zoom level
#[inline(always)]
pub fn world_size(zoom: u8, tile_size: f64) -> f64 {
    tile_size * f64::from(1u32 << zoom.min(31))
}

/// Convert WGS84 (lat, lon) to world pixel coordinates at the given zoom
///
/// # Arguments
/// * `lat` - Latitude in degrees (clamped to the Web Mercator range)
/// * `lon` - Longitude in degrees (-180 to 180)
/// * `zoom` - Map zoom level
/// * `tile_size` - Tile edge length in pixels (usually 256)
///
/// # Returns
/// A `Point<f64>` with x growing eastward and y growing southward
#[inline(always)]
pub fn project(lat: f64, lon: f64, zoom: u8, tile_size: f64) -> Point<f64> {
    let size = world_size(zoom, tile_size);
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

    let x = (lon + 180.0) * LON_TO_UNIT_FACTOR;

    let lat_rad = lat.to_radians();
    let mercator_y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln();
    let y = 0.5 - mercator_y * Y_TO_UNIT_FACTOR;

    Point::new(x * size, y * size)
}

/// Convert world pixel coordinates at the given zoom back to WGS84
///
/// # Returns
/// A tuple of (latitude, longitude) in degrees
#[inline(always)]
pub fn unproject(x: f64, y: f64, zoom: u8, tile_size: f64) -> (f64, f64) {
    let size = world_size(zoom, tile_size);
    let lon = x / size * 360.0 - 180.0;
    let mercator_y = std::f64::consts::PI * (1.0 - 2.0 * y / size);
    let lat = (std::f64::consts::PI / 2.0 - 2.0 * (-mercator_y).exp().atan()).to_degrees();
    (lat, lon)
}

/// Check that a coordinate pair is finite and within WGS84 ranges
///
/// Latitudes beyond the Web Mercator limit are still valid; they get clamped on projection.
#[inline(always)]
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// Calculate the Haversine distance between two WGS84 positions in meters
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
