//! ReportCollection - Owned report set, configuration and cached statistics
//!
//! The collection holds the latest materialized report list from the backend behind
//! shared `Arc`s, a version counter bumped on every replacement, and the clustering
//! entry points that run against the current set.

use crate::expansion::{self, Expansion};
use crate::report::{self, location_key};
use crate::{
    AccessibilityFilter, AccessibilityReport, AccessibilityStats, BoundingBox, ClusterBuilder,
    ClusterId, ClusterOutput, MapError, ReportGroup, ReportSource, Result,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Highest accepted `max_zoom`; world pixel sizes stop doubling past zoom 31
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

/// Highest accepted rounding precision; `180 * 10^9` still fits an `i64`
pub const MAX_ROUNDING_PRECISION: u32 = 9;

/// Configuration for clustering, debouncing and marker sizing
///
/// Pixel distances are in world pixels at the zoom being clustered, matching the
/// map control's own projection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Tile edge in pixels; the world is `tile_size_px * 2^zoom` pixels wide
    /// Default: 256
    pub tile_size_px: f64,
    /// Grid cell edge in pixels
    /// Default: 60
    pub cell_size_px: f64,
    /// Maximum centroid distance for merging neighboring cells.
    /// Must not exceed `cell_size_px`, otherwise in-radius pairs could sit outside
    /// the 3x3 neighborhood that is searched.
    /// Default: 60
    pub merge_radius_px: f64,
    /// Zooms strictly below this put every report in one cluster
    pub min_zoom: u8,
    /// Zooms strictly above this disable clustering
    pub max_zoom: u8,
    /// Highest zoom the map control accepts; expansion targets are capped to it
    pub map_max_zoom: u8,
    /// Zoom increment used when a clicked cluster can no longer be resolved
    pub expansion_fallback_step: u8,
    /// Quiet period after the last viewport event, in milliseconds
    pub debounce_ms: u64,
    /// Decimal places kept when comparing viewport bounds (4 is about 11 m)
    pub bounds_precision: u32,
    /// Decimal places used to group reports at the same location (5 is about 1 m)
    pub colocation_precision: u32,
    /// Single-report marker size
    pub point_marker_px: u32,
    /// Single-report marker size in compact mode
    pub compact_point_marker_px: u32,
    pub compact_markers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tile_size_px: 256.0,
            cell_size_px: 60.0,
            merge_radius_px: 60.0,
            min_zoom: 0,
            max_zoom: 20,
            map_max_zoom: 18,
            expansion_fallback_step: 2,
            debounce_ms: 300,
            bounds_precision: 4,
            colocation_precision: 5,
            point_marker_px: 44,
            compact_point_marker_px: 32,
            compact_markers: false,
        }
    }
}

impl Config {
    /// Check the parameters against each other
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;

        if !positive(self.tile_size_px) {
            return Err(MapError::InvalidConfig(format!(
                "tile size must be positive, got {}",
                self.tile_size_px
            )));
        }
        if !positive(self.cell_size_px) {
            return Err(MapError::InvalidConfig(format!(
                "cell size must be positive, got {}",
                self.cell_size_px
            )));
        }
        if !positive(self.merge_radius_px) || self.merge_radius_px > self.cell_size_px {
            return Err(MapError::InvalidConfig(format!(
                "merge radius must be in (0, {}], got {}",
                self.cell_size_px, self.merge_radius_px
            )));
        }
        if self.min_zoom > self.max_zoom {
            return Err(MapError::InvalidConfig(format!(
                "min zoom {} is above max zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(MapError::InvalidConfig(format!(
                "max zoom must be at most {MAX_SUPPORTED_ZOOM}, got {}",
                self.max_zoom
            )));
        }
        if self.bounds_precision > MAX_ROUNDING_PRECISION
            || self.colocation_precision > MAX_ROUNDING_PRECISION
        {
            return Err(MapError::InvalidConfig(format!(
                "rounding precision must be at most {MAX_ROUNDING_PRECISION} decimal places, got {} and {}",
                self.bounds_precision, self.colocation_precision
            )));
        }
        if self.expansion_fallback_step == 0 {
            return Err(MapError::InvalidConfig(
                "expansion fallback step must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Single-report marker size honoring compact mode
    #[inline]
    pub fn point_marker_size(&self) -> u32 {
        if self.compact_markers {
            self.compact_point_marker_px
        } else {
            self.point_marker_px
        }
    }
}

/// Summary of the current report set
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollectionInfo {
    /// Number of reports loaded
    pub report_count: usize,
    /// Reports tagged as public data
    pub public_count: usize,
    /// Reports with at least one known accessibility field
    pub with_data_count: usize,
    /// Distinct rounded locations
    pub location_count: usize,
    /// Report-set version
    pub version: u64,
    /// Tally over every report
    pub stats: AccessibilityStats,
    /// Extent of the valid coordinates
    pub bounding_box: Option<BoundingBox>,
}

/// Statistics recomputed once per replacement
#[derive(Debug, Clone, Default)]
struct CachedStats {
    public_count: usize,
    with_data_count: usize,
    location_count: usize,
    stats: AccessibilityStats,
    bounding_box: Option<BoundingBox>,
}

impl CachedStats {
    fn compute(reports: &[Arc<AccessibilityReport>], colocation_precision: u32) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::compute_stats");

        let valid = || {
            reports
                .iter()
                .filter(|r| crate::utils::is_valid_coordinate(r.lat, r.lon))
        };

        let mut locations: Vec<(i64, i64)> = valid()
            .map(|r| location_key(r.lat, r.lon, colocation_precision))
            .collect();
        locations.sort_unstable();
        locations.dedup();

        Self {
            public_count: reports.iter().filter(|r| r.is_public()).count(),
            with_data_count: reports.iter().filter(|r| r.has_accessibility_data()).count(),
            location_count: locations.len(),
            stats: AccessibilityStats::aggregate(reports.iter().map(|r| &**r)),
            bounding_box: BoundingBox::from_positions(valid().map(|r| (r.lat, r.lon))),
        }
    }
}

/// Owner of the current report set
#[derive(Debug, Clone)]
pub struct ReportCollection {
    reports: Vec<Arc<AccessibilityReport>>,
    version: u64,
    config: Config,
    builder: ClusterBuilder,
    cached_stats: CachedStats,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ReportCollection {
    /// Create an empty collection; fails if `config` is inconsistent
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reports: Vec::new(),
            version: 0,
            builder: ClusterBuilder::new(&config),
            config,
            cached_stats: CachedStats::default(),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn builder(&self) -> &ClusterBuilder {
        &self.builder
    }

    /// Replace the whole report set and return the new version
    pub fn replace_reports(&mut self, reports: Vec<AccessibilityReport>) -> u64 {
        self.reports = reports.into_iter().map(Arc::new).collect();
        self.cached_stats = CachedStats::compute(&self.reports, self.config.colocation_precision);
        self.version += 1;

        tracing::info!(
            reports = self.reports.len(),
            locations = self.cached_stats.location_count,
            version = self.version,
            "Report set replaced"
        );
        self.version
    }

    /// Fetch from `source` and replace the set
    ///
    /// On failure the current set stays in place and the error is returned.
    pub fn reload<S: ReportSource + ?Sized>(&mut self, source: &mut S) -> Result<u64> {
        let reports = source.fetch_approved_reports()?;
        Ok(self.replace_reports(reports))
    }

    #[inline]
    pub fn reports(&self) -> &[Arc<AccessibilityReport>] {
        &self.reports
    }

    /// Monotonic counter bumped on every replacement
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<AccessibilityReport>> {
        self.reports.iter().find(|r| r.id == id)
    }

    pub fn get_info(&self) -> CollectionInfo {
        CollectionInfo {
            report_count: self.reports.len(),
            public_count: self.cached_stats.public_count,
            with_data_count: self.cached_stats.with_data_count,
            location_count: self.cached_stats.location_count,
            version: self.version,
            stats: self.cached_stats.stats,
            bounding_box: self.cached_stats.bounding_box,
        }
    }

    #[inline]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.cached_stats.bounding_box
    }

    /// Reports at the rounded location of `(lat, lon)`, newest first
    pub fn reports_at(&self, lat: f64, lon: f64) -> Vec<Arc<AccessibilityReport>> {
        let precision = self.config.colocation_precision;
        let key = location_key(lat, lon, precision);
        let mut found: Vec<_> = self
            .reports
            .iter()
            .filter(|r| location_key(r.lat, r.lon, precision) == key)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.cmp_recency(b));
        found
    }

    /// Every rounded location with its reports, newest first
    pub fn location_groups(&self) -> Vec<ReportGroup> {
        report::group_colocated(&self.reports, self.config.colocation_precision)
    }

    /// Cluster the current set for a viewport
    pub fn cluster(
        &self,
        bounds: &BoundingBox,
        zoom: u8,
        filter: &AccessibilityFilter,
    ) -> ClusterOutput {
        self.builder.cluster(&self.reports, bounds, zoom, filter)
    }

    /// Zoom at which cluster `id` splits, searched from `zoom`
    pub fn expansion_zoom(
        &self,
        bounds: &BoundingBox,
        zoom: u8,
        filter: &AccessibilityFilter,
        id: ClusterId,
    ) -> Expansion {
        expansion::expansion_zoom(
            &self.builder,
            &self.reports,
            bounds,
            zoom,
            filter,
            id,
            self.config.expansion_fallback_step,
        )
    }
}
