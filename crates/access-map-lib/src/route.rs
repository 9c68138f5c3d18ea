//! Route barrier summary and path coloring
//!
//! Read-only consumers of the report set for a path computed elsewhere. Paths are
//! `LineString`s with `x = lon` and `y = lat`. Only the ramp and elevator fields
//! matter here, since those decide whether a wheelchair can pass.

use crate::{AccessibilityField, AccessibilityReport, AccessibilityStats, utils};
use geo::{Coord, LineString};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default distance for a report to count as "on" the route, in meters
pub const NEARBY_RADIUS_M: f64 = 50.0;

/// Default distance for a report to color a path vertex, in meters
pub const SEGMENT_RADIUS_M: f64 = 20.0;

/// Fields tallied for route feasibility
pub const ROUTE_FIELDS: [AccessibilityField; 2] =
    [AccessibilityField::Ramp, AccessibilityField::Elevator];

/// Accessibility tally of the reports along a path
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteBarrierSummary {
    /// Ids of the reports near the path, in input order
    pub nearby_ids: Vec<String>,
    /// Ramp and elevator signals of the nearby reports
    pub stats: AccessibilityStats,
    /// Share of positive signals; 100 without data
    pub safe_percentage: f64,
    /// Share of negative signals; 0 without data
    pub danger_percentage: f64,
    /// Path length in meters
    pub length_m: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteBarrierSummary {
    /// Summarize the reports near `path`
    ///
    /// # Arguments
    /// * `path` - Route vertices (`x = lon`, `y = lat`)
    /// * `reports` - Candidate reports; invalid coordinates are ignored
    /// * `radius_m` - A report is nearby when strictly closer than this to any vertex
    pub fn compute(
        path: &LineString<f64>,
        reports: &[Arc<AccessibilityReport>],
        radius_m: f64,
    ) -> Self {
        let nearby: Vec<&AccessibilityReport> = reports
            .iter()
            .map(|r| &**r)
            .filter(|r| utils::is_valid_coordinate(r.lat, r.lon))
            .filter(|r| path.coords().any(|c| vertex_distance(c, r) < radius_m))
            .collect();

        let stats = AccessibilityStats::aggregate_fields(nearby.iter().copied(), &ROUTE_FIELDS);
        let (safe_percentage, danger_percentage) = match stats.total_responses {
            0 => (100.0, 0.0),
            total => (
                f64::from(stats.yes_count) / f64::from(total) * 100.0,
                f64::from(stats.no_count) / f64::from(total) * 100.0,
            ),
        };

        Self {
            nearby_ids: nearby.iter().map(|r| r.id.clone()).collect(),
            stats,
            safe_percentage,
            danger_percentage,
            length_m: path_length(path),
        }
    }
}

/// Coloring class of a path run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RunLevel {
    Normal,
    /// A nearby report lacks a ramp or an elevator
    Warning,
}

/// Maximal run of consecutive path vertices with the same level
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathRun {
    pub level: RunLevel,
    pub coords: Vec<Coord<f64>>,
}

/// Split `path` into runs of equally colored vertices
///
/// A vertex is [`RunLevel::Warning`] when the first report strictly within `radius_m`
/// has `has_ramp == Some(false)` or `has_elevator == Some(false)`. A new run starts
/// at the first vertex of the new level, so runs never share vertices.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn segment_path(
    path: &LineString<f64>,
    reports: &[Arc<AccessibilityReport>],
    radius_m: f64,
) -> Vec<PathRun> {
    let mut runs: Vec<PathRun> = Vec::new();

    for coord in path.coords() {
        let level = match reports
            .iter()
            .find(|r| utils::is_valid_coordinate(r.lat, r.lon) && vertex_distance(coord, r) < radius_m)
        {
            Some(r) if r.has_ramp == Some(false) || r.has_elevator == Some(false) => {
                RunLevel::Warning
            }
            _ => RunLevel::Normal,
        };

        match runs.last_mut() {
            Some(run) if run.level == level => run.coords.push(*coord),
            _ => runs.push(PathRun {
                level,
                coords: vec![*coord],
            }),
        }
    }

    runs
}

#[inline]
fn vertex_distance(coord: &Coord<f64>, report: &AccessibilityReport) -> f64 {
    utils::haversine_distance(coord.y, coord.x, report.lat, report.lon)
}

fn path_length(path: &LineString<f64>) -> f64 {
    path.lines()
        .map(|line| utils::haversine_distance(line.start.y, line.start.x, line.end.y, line.end.x))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// East-west path along 37.5N, vertices roughly 88 m apart
    fn path() -> LineString<f64> {
        LineString::from(vec![
            (127.000, 37.5),
            (127.001, 37.5),
            (127.002, 37.5),
            (127.003, 37.5),
            (127.004, 37.5),
        ])
    }

    fn report(id: &str, lat: f64, lon: f64) -> AccessibilityReport {
        AccessibilityReport::new(id, lat, lon)
    }

    #[test]
    fn test_summary_counts_ramp_and_elevator_only() {
        let reports = vec![
            Arc::new(
                report("on-path", 37.5001, 127.001)
                    .with_field(AccessibilityField::Ramp, Some(true))
                    .with_field(AccessibilityField::Elevator, Some(false))
                    .with_field(AccessibilityField::WideDoor, Some(true)),
            ),
            Arc::new(
                report("also-near", 37.5, 127.0035)
                    .with_field(AccessibilityField::Ramp, Some(true)),
            ),
            Arc::new(report("far", 37.51, 127.002).with_field(AccessibilityField::Ramp, Some(false))),
        ];

        let summary = RouteBarrierSummary::compute(&path(), &reports, NEARBY_RADIUS_M);
        assert_eq!(summary.nearby_ids, vec!["on-path", "also-near"]);
        assert_eq!(summary.stats.yes_count, 2);
        assert_eq!(summary.stats.no_count, 1);
        assert!((summary.safe_percentage - 200.0 / 3.0).abs() < 1e-9);
        assert!((summary.danger_percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_without_data() {
        let reports = vec![Arc::new(report("no-fields", 37.5, 127.002))];
        let summary = RouteBarrierSummary::compute(&path(), &reports, NEARBY_RADIUS_M);
        assert_eq!(summary.nearby_ids.len(), 1);
        assert_eq!(summary.safe_percentage, 100.0);
        assert_eq!(summary.danger_percentage, 0.0);

        let empty = RouteBarrierSummary::compute(&path(), &[], NEARBY_RADIUS_M);
        assert!(empty.nearby_ids.is_empty());
        assert_eq!(empty.safe_percentage, 100.0);
    }

    #[test]
    fn test_path_length() {
        let summary = RouteBarrierSummary::compute(&path(), &[], NEARBY_RADIUS_M);
        // 0.004 degrees of longitude at 37.5N
        assert!((summary.length_m - 352.8).abs() < 1.0);
    }

    #[test]
    fn test_segment_path_runs() {
        let reports = vec![Arc::new(
            report("blocked", 37.5, 127.002).with_field(AccessibilityField::Elevator, Some(false)),
        )];
        let runs = segment_path(&path(), &reports, SEGMENT_RADIUS_M);

        let levels: Vec<RunLevel> = runs.iter().map(|r| r.level).collect();
        assert_eq!(
            levels,
            vec![RunLevel::Normal, RunLevel::Warning, RunLevel::Normal]
        );
        let lengths: Vec<usize> = runs.iter().map(|r| r.coords.len()).collect();
        assert_eq!(lengths, vec![2, 1, 2]);
        assert_eq!(runs[1].coords[0], Coord { x: 127.002, y: 37.5 });
    }

    #[test]
    fn test_segment_uses_first_nearby_report() {
        // The first match decides, even if a later one is negative
        let reports = vec![
            Arc::new(report("fine", 37.5, 127.0).with_field(AccessibilityField::Ramp, Some(true))),
            Arc::new(report("blocked", 37.5, 127.0).with_field(AccessibilityField::Ramp, Some(false))),
        ];
        let runs = segment_path(&path(), &reports, SEGMENT_RADIUS_M);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].level, RunLevel::Normal);
        assert_eq!(runs[0].coords.len(), 5);
    }

    #[test]
    fn test_segment_warning_at_start() {
        let reports = vec![Arc::new(
            report("stairs", 37.5, 127.0).with_field(AccessibilityField::Ramp, Some(false)),
        )];
        let runs = segment_path(&path(), &reports, SEGMENT_RADIUS_M);
        assert_eq!(runs[0].level, RunLevel::Warning);
        assert_eq!(runs[0].coords.len(), 1);
        assert_eq!(runs[1].level, RunLevel::Normal);
    }

    #[test]
    fn test_segment_empty_path() {
        let runs = segment_path(&LineString::new(Vec::new()), &[], SEGMENT_RADIUS_M);
        assert!(runs.is_empty());
    }
}
