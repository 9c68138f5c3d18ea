//! Cluster Builder - Merges nearby reports into renderable features
//!
//! One call runs the whole pipeline for a viewport:
//!
//! 1. Drop reports rejected by the [`AccessibilityFilter`]
//! 2. Drop reports with malformed coordinates (counted, never an error)
//! 3. Cull to the viewport grown by one cell on every side
//! 4. Bucket the survivors into a [`GeoGrid`] at the requested zoom
//! 5. Union occupied cells whose centroids are within the merge radius,
//!    looking only at the 3x3 neighborhood of each cell
//! 6. Emit one [`ClusterFeature`] per merged group with its [`AccessibilityStats`]
//!
//! Survivors are sorted by report id before gridding, so the output does not
//! depend on input order.

use crate::viewport::PixelWindow;
use crate::{
    AccessibilityFilter, AccessibilityReport, AccessibilityStats, BoundingBox, Config,
    DominantStatus, FeatureKey, GeoGrid, utils,
};
use geo::Point;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable identifier of a cluster's member set
///
/// Derived from the sorted member report ids only, so it survives recomputation
/// and does not depend on zoom or input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(into = "String", try_from = "String")
)]
pub struct ClusterId(u64);

impl ClusterId {
    /// Hash a set of member ids (order of the input does not matter)
    pub fn from_member_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sorted: Vec<S> = ids.into_iter().collect();
        sorted.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));

        let mut hasher = Sha256::new();
        for (i, id) in sorted.iter().enumerate() {
            if i > 0 {
                hasher.update(b"\n");
            }
            hasher.update(id.as_ref().as_bytes());
        }
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(prefix))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for ClusterId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(Self)
    }
}

impl From<ClusterId> for String {
    fn from(id: ClusterId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ClusterId {
    type Error = std::num::ParseIntError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A merged group of two or more reports
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterSummary {
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub point_count: usize,
    pub cluster_id: ClusterId,
    /// Member report ids, sorted
    pub member_ids: Vec<String>,
    pub stats: AccessibilityStats,
}

/// A single report that was not merged with anything
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointFeature {
    pub lat: f64,
    pub lon: f64,
    pub report: Arc<AccessibilityReport>,
    pub stats: AccessibilityStats,
    /// Dominant status with the verified override applied
    pub status: DominantStatus,
}

/// One renderable output unit
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum ClusterFeature {
    Cluster(ClusterSummary),
    Point(PointFeature),
}

impl ClusterFeature {
    /// Marker position as `(lat, lon)`
    pub fn position(&self) -> (f64, f64) {
        match self {
            ClusterFeature::Cluster(c) => (c.centroid_lat, c.centroid_lon),
            ClusterFeature::Point(p) => (p.lat, p.lon),
        }
    }

    pub fn point_count(&self) -> usize {
        match self {
            ClusterFeature::Cluster(c) => c.point_count,
            ClusterFeature::Point(_) => 1,
        }
    }

    pub fn stats(&self) -> &AccessibilityStats {
        match self {
            ClusterFeature::Cluster(c) => &c.stats,
            ClusterFeature::Point(p) => &p.stats,
        }
    }

    pub fn status(&self) -> DominantStatus {
        match self {
            ClusterFeature::Cluster(c) => c.stats.dominant_status(),
            ClusterFeature::Point(p) => p.status,
        }
    }

    pub fn cluster_id(&self) -> Option<ClusterId> {
        match self {
            ClusterFeature::Cluster(c) => Some(c.cluster_id),
            ClusterFeature::Point(_) => None,
        }
    }

    /// Ids of every report behind this feature
    pub fn member_ids(&self) -> Vec<&str> {
        match self {
            ClusterFeature::Cluster(c) => c.member_ids.iter().map(String::as_str).collect(),
            ClusterFeature::Point(p) => vec![p.report.id.as_str()],
        }
    }

    /// Identity used by the marker registry
    pub fn key(&self) -> FeatureKey {
        match self {
            ClusterFeature::Cluster(c) => FeatureKey::Cluster(c.cluster_id),
            ClusterFeature::Point(p) => FeatureKey::Point(p.report.id.clone()),
        }
    }

    #[inline]
    pub fn is_cluster(&self) -> bool {
        matches!(self, ClusterFeature::Cluster(_))
    }
}

/// Counters describing what one clustering run dropped and produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterDiagnostics {
    /// Reports handed to the builder
    pub input: usize,
    /// Rejected by the filter
    pub filtered_out: usize,
    /// NaN or out-of-range coordinates
    pub invalid_coordinates: usize,
    /// Outside the viewport margin
    pub outside_viewport: usize,
    /// Occupied grid cells (0 when the grid was bypassed)
    pub occupied_cells: usize,
    /// Emitted features
    pub features: usize,
}

impl ClusterDiagnostics {
    /// Reports that made it into a feature
    pub fn clustered(&self) -> usize {
        self.input - self.filtered_out - self.invalid_coordinates - self.outside_viewport
    }
}

/// Result of one clustering run
#[derive(Debug, Clone, Default)]
pub struct ClusterOutput {
    pub features: Vec<ClusterFeature>,
    pub diagnostics: ClusterDiagnostics,
}

impl ClusterOutput {
    /// Find an emitted cluster by id
    pub fn find_cluster(&self, id: ClusterId) -> Option<&ClusterSummary> {
        self.features.iter().find_map(|f| match f {
            ClusterFeature::Cluster(c) if c.cluster_id == id => Some(c),
            _ => None,
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.features.iter().filter(|f| f.is_cluster()).count()
    }

    pub fn point_count(&self) -> usize {
        self.features.len() - self.cluster_count()
    }
}

/// Grid-based marker clustering at a single zoom level
#[derive(Debug, Clone)]
pub struct ClusterBuilder {
    tile_size: f64,
    cell_size: f64,
    merge_radius: f64,
    min_zoom: u8,
    max_zoom: u8,
}

/// Report that survived filtering and culling, with its pixel position
struct Candidate {
    report: Arc<AccessibilityReport>,
    position: Point<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ClusterBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            tile_size: config.tile_size_px,
            cell_size: config.cell_size_px,
            merge_radius: config.merge_radius_px,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
        }
    }

    /// Lowest zoom at which clustering is disabled
    #[inline]
    pub fn clustering_ceiling(&self) -> u8 {
        self.max_zoom.saturating_add(1)
    }

    #[inline]
    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Cluster the reports visible in `bounds` at `zoom`
    pub fn cluster(
        &self,
        reports: &[Arc<AccessibilityReport>],
        bounds: &BoundingBox,
        zoom: u8,
        filter: &AccessibilityFilter,
    ) -> ClusterOutput {
        let window = bounds.pixel_window(zoom, self.tile_size, self.cell_size);
        self.run(reports, Some(window), zoom, filter)
    }

    /// Cluster every report regardless of viewport
    pub fn cluster_unbounded(
        &self,
        reports: &[Arc<AccessibilityReport>],
        zoom: u8,
        filter: &AccessibilityFilter,
    ) -> ClusterOutput {
        self.run(reports, None, zoom, filter)
    }

    fn run(
        &self,
        reports: &[Arc<AccessibilityReport>],
        window: Option<PixelWindow>,
        zoom: u8,
        filter: &AccessibilityFilter,
    ) -> ClusterOutput {
        let started = instant::Instant::now();
        let mut diagnostics = ClusterDiagnostics {
            input: reports.len(),
            ..Default::default()
        };

        let mut candidates = Vec::with_capacity(reports.len());
        for report in reports {
            if !filter.matches(report) {
                diagnostics.filtered_out += 1;
                continue;
            }
            if !utils::is_valid_coordinate(report.lat, report.lon) {
                diagnostics.invalid_coordinates += 1;
                continue;
            }
            let position = utils::project(report.lat, report.lon, zoom, self.tile_size);
            if let Some(window) = &window
                && !window.contains(position.x(), position.y())
            {
                diagnostics.outside_viewport += 1;
                continue;
            }
            candidates.push(Candidate {
                report: Arc::clone(report),
                position,
            });
        }

        if diagnostics.invalid_coordinates > 0 {
            tracing::warn!(
                dropped = diagnostics.invalid_coordinates,
                "Dropped reports with invalid coordinates"
            );
        }

        candidates.sort_by(|a, b| {
            a.report
                .id
                .cmp(&b.report.id)
                .then(a.report.lat.total_cmp(&b.report.lat))
                .then(a.report.lon.total_cmp(&b.report.lon))
        });

        let groups = if candidates.is_empty() {
            Vec::new()
        } else if zoom > self.max_zoom {
            (0..candidates.len()).map(|i| vec![i]).collect()
        } else if zoom < self.min_zoom {
            vec![(0..candidates.len()).collect()]
        } else {
            let grid = GeoGrid::from_positions(
                candidates.iter().map(|c| Some(c.position)).collect(),
                zoom,
                self.cell_size,
            );
            diagnostics.occupied_cells = grid.len();
            self.merge_cells(&grid)
        };

        let features: Vec<ClusterFeature> = groups
            .iter()
            .map(|members| self.emit(&candidates, members, zoom))
            .collect();
        diagnostics.features = features.len();

        tracing::debug!(
            zoom,
            input = diagnostics.input,
            features = diagnostics.features,
            cells = diagnostics.occupied_cells,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Clustered reports"
        );

        ClusterOutput {
            features,
            diagnostics,
        }
    }

    /// Union occupied cells within the merge radius; returns member index groups
    ///
    /// Groups are ordered by their smallest member index, and members within a group
    /// are ascending, so the result follows the id order of the candidates.
    fn merge_cells(&self, grid: &GeoGrid) -> Vec<Vec<usize>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("cluster::merge_cells");

        let cells: Vec<_> = grid.cells().collect();
        let slot: BTreeMap<_, usize> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| (cell.key(), i))
            .collect();

        let mut sets = DisjointSet::new(cells.len());
        for (i, cell) in cells.iter().enumerate() {
            let centroid = cell.centroid();
            for neighbor in grid.occupied_neighbors(cell.key()) {
                // Each unordered pair once
                if neighbor.key() < cell.key() {
                    continue;
                }
                let distance = centroid_distance(centroid, neighbor.centroid());
                if distance <= self.merge_radius
                    && let Some(&j) = slot.get(&neighbor.key())
                {
                    sets.union(i, j);
                }
            }
        }

        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, cell) in cells.iter().enumerate() {
            by_root
                .entry(sets.find(i))
                .or_default()
                .extend_from_slice(cell.members());
        }

        let mut groups: Vec<Vec<usize>> = by_root
            .into_values()
            .map(|mut members| {
                members.sort_unstable();
                members
            })
            .collect();
        groups.sort_by_key(|members| members[0]);
        groups
    }

    fn emit(&self, candidates: &[Candidate], members: &[usize], zoom: u8) -> ClusterFeature {
        if let [only] = members {
            let report = Arc::clone(&candidates[*only].report);
            let stats = AccessibilityStats::from_report(&report);
            return ClusterFeature::Point(PointFeature {
                lat: report.lat,
                lon: report.lon,
                status: DominantStatus::for_point(&report, &stats),
                stats,
                report,
            });
        }

        let (sum_x, sum_y) = members.iter().fold((0.0, 0.0), |(x, y), &i| {
            let p = candidates[i].position;
            (x + p.x(), y + p.y())
        });
        let n = members.len() as f64;
        let (centroid_lat, centroid_lon) =
            utils::unproject(sum_x / n, sum_y / n, zoom, self.tile_size);

        let member_ids: Vec<String> = members
            .iter()
            .map(|&i| candidates[i].report.id.clone())
            .collect();
        let stats = AccessibilityStats::aggregate(members.iter().map(|&i| &*candidates[i].report));

        ClusterFeature::Cluster(ClusterSummary {
            centroid_lat,
            centroid_lon,
            point_count: members.len(),
            cluster_id: ClusterId::from_member_ids(&member_ids),
            member_ids,
            stats,
        })
    }
}

#[inline]
fn centroid_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    (a.x() - b.x()).hypot(a.y() - b.y())
}

/// Union-find with path halving and union by size
struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}
