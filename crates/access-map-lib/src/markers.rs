//! Marker presentation and registry diffing
//!
//! The rendering SDK is reached only through [`RenderSink`]. The registry owns the
//! live marker handles keyed by [`FeatureKey`] and, on every recompute, removes
//! handles whose feature vanished, places new ones and leaves the rest untouched.

use crate::{BoundingBox, ClusterFeature, ClusterId, Config, DominantStatus};
use std::collections::{BTreeMap, HashSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Z-index of cluster markers, drawn above points
pub const CLUSTER_Z_INDEX: i32 = 150;
/// Z-index of single-report markers
pub const POINT_Z_INDEX: i32 = 100;

/// Positions closer than this (in degrees) count as unchanged
const POSITION_EPSILON: f64 = 1e-9;

/// Identity of a rendered feature across recomputes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "id", rename_all = "snake_case"))]
pub enum FeatureKey {
    Cluster(ClusterId),
    Point(String),
}

/// Key for the external icon renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IconRequest {
    pub status: DominantStatus,
    pub yes_count: u32,
    pub no_count: u32,
    pub point_count: usize,
    pub size_px: u32,
}

/// Everything the sink needs to place one marker
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarkerSpec {
    pub key: FeatureKey,
    /// `(lat, lon)`
    pub position: (f64, f64),
    pub icon: IconRequest,
    pub size_px: u32,
    pub z_index: i32,
    pub title: String,
}

/// Marker diameter for a cluster of `count` reports
pub fn cluster_marker_size(count: usize) -> u32 {
    match count {
        100.. => 64,
        30.. => 56,
        10.. => 52,
        _ => 48,
    }
}

impl MarkerSpec {
    pub fn for_feature(feature: &ClusterFeature, config: &Config) -> Self {
        let stats = feature.stats();
        let (size_px, z_index, title) = match feature {
            ClusterFeature::Cluster(c) => (
                cluster_marker_size(c.point_count),
                CLUSTER_Z_INDEX,
                format!("{} reports", c.point_count),
            ),
            ClusterFeature::Point(p) => (
                config.point_marker_size(),
                POINT_Z_INDEX,
                p.report.location_name.clone(),
            ),
        };

        Self {
            key: feature.key(),
            position: feature.position(),
            icon: IconRequest {
                status: feature.status(),
                yes_count: stats.yes_count,
                no_count: stats.no_count,
                point_count: feature.point_count(),
                size_px,
            },
            size_px,
            z_index,
            title,
        }
    }

    /// Whether `other` would render identically
    fn same_appearance(&self, other: &Self) -> bool {
        self.icon == other.icon
            && self.size_px == other.size_px
            && self.z_index == other.z_index
            && self.title == other.title
            && (self.position.0 - other.position.0).abs() < POSITION_EPSILON
            && (self.position.1 - other.position.1).abs() < POSITION_EPSILON
    }
}

/// Marker primitives of the rendering SDK
pub trait RenderSink {
    type Handle;

    fn place_marker(&mut self, spec: &MarkerSpec) -> Self::Handle;

    fn remove_marker(&mut self, handle: Self::Handle);
}

/// Read access to the map control's current camera
pub trait MapView {
    fn viewport_bounds(&self) -> BoundingBox;

    fn zoom(&self) -> u8;
}

/// Counts of one registry sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegistryDiff {
    pub added: usize,
    pub removed: usize,
    /// Same key and same appearance, handle untouched
    pub kept: usize,
    /// Same key but a different appearance, marker replaced
    pub updated: usize,
}

impl RegistryDiff {
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.updated == 0
    }
}

struct LiveMarker<H> {
    handle: H,
    spec: MarkerSpec,
}

/// Owned map from feature key to live marker handle
pub struct MarkerRegistry<H> {
    markers: BTreeMap<FeatureKey, LiveMarker<H>>,
}

impl<H> Default for MarkerRegistry<H> {
    fn default() -> Self {
        Self {
            markers: BTreeMap::new(),
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<H> MarkerRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn handle(&self, key: &FeatureKey) -> Option<&H> {
        self.markers.get(key).map(|m| &m.handle)
    }

    pub fn spec(&self, key: &FeatureKey) -> Option<&MarkerSpec> {
        self.markers.get(key).map(|m| &m.spec)
    }

    /// Bring the sink in line with `features`
    pub fn sync<S>(&mut self, features: &[ClusterFeature], sink: &mut S, config: &Config) -> RegistryDiff
    where
        S: RenderSink<Handle = H>,
    {
        let mut diff = RegistryDiff::default();
        let specs: Vec<MarkerSpec> = features
            .iter()
            .map(|f| MarkerSpec::for_feature(f, config))
            .collect();
        let wanted: HashSet<&FeatureKey> = specs.iter().map(|s| &s.key).collect();

        let stale: Vec<FeatureKey> = self
            .markers
            .keys()
            .filter(|key| !wanted.contains(key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(marker) = self.markers.remove(&key) {
                sink.remove_marker(marker.handle);
                diff.removed += 1;
            }
        }

        for spec in specs {
            match self.markers.remove(&spec.key) {
                Some(live) if live.spec.same_appearance(&spec) => {
                    self.markers.insert(spec.key.clone(), live);
                    diff.kept += 1;
                }
                Some(live) => {
                    sink.remove_marker(live.handle);
                    let handle = sink.place_marker(&spec);
                    self.markers.insert(spec.key.clone(), LiveMarker { handle, spec });
                    diff.updated += 1;
                }
                None => {
                    let handle = sink.place_marker(&spec);
                    self.markers.insert(spec.key.clone(), LiveMarker { handle, spec });
                    diff.added += 1;
                }
            }
        }

        diff
    }

    /// Remove every marker from the sink
    pub fn clear<S>(&mut self, sink: &mut S) -> usize
    where
        S: RenderSink<Handle = H>,
    {
        let removed = self.markers.len();
        for (_, marker) in std::mem::take(&mut self.markers) {
            sink.remove_marker(marker.handle);
        }
        removed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{AccessibilityField, AccessibilityFilter, AccessibilityReport, ClusterBuilder};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    /// Sink that records live markers and call counts
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        next: u32,
        pub live: BTreeMap<u32, MarkerSpec>,
        pub placed: usize,
        pub removed: usize,
    }

    impl RenderSink for RecordingSink {
        type Handle = u32;

        fn place_marker(&mut self, spec: &MarkerSpec) -> u32 {
            self.next += 1;
            self.placed += 1;
            self.live.insert(self.next, spec.clone());
            self.next
        }

        fn remove_marker(&mut self, handle: u32) {
            self.removed += 1;
            self.live.remove(&handle);
        }
    }

    fn features(points: &[(&str, f64, f64)], zoom: u8) -> Vec<ClusterFeature> {
        let reports: Vec<_> = points
            .iter()
            .map(|(id, lat, lon)| {
                Arc::new(
                    AccessibilityReport::new(*id, *lat, *lon).with_location_name(format!("Place {id}")),
                )
            })
            .collect();
        ClusterBuilder::new(&Config::default())
            .cluster_unbounded(&reports, zoom, &AccessibilityFilter::default())
            .features
    }

    #[test]
    fn test_cluster_marker_sizes() {
        assert_eq!(cluster_marker_size(2), 48);
        assert_eq!(cluster_marker_size(9), 48);
        assert_eq!(cluster_marker_size(10), 52);
        assert_eq!(cluster_marker_size(30), 56);
        assert_eq!(cluster_marker_size(99), 56);
        assert_eq!(cluster_marker_size(100), 64);
    }

    #[test]
    fn test_point_spec() {
        let features = features(&[("a", 37.5, 127.0)], 16);
        let spec = MarkerSpec::for_feature(&features[0], &Config::default());
        assert_eq!(spec.key, FeatureKey::Point("a".to_string()));
        assert_eq!(spec.size_px, 44);
        assert_eq!(spec.z_index, POINT_Z_INDEX);
        assert_eq!(spec.title, "Place a");
        assert_eq!(spec.icon.status, DominantStatus::Neutral);

        let compact = Config {
            compact_markers: true,
            ..Config::default()
        };
        assert_eq!(MarkerSpec::for_feature(&features[0], &compact).size_px, 32);
    }

    #[test]
    fn test_cluster_spec() {
        let reports: Vec<_> = (0..12)
            .map(|i| {
                Arc::new(
                    AccessibilityReport::new(format!("r{i:02}"), 37.5, 127.0)
                        .with_field(AccessibilityField::Elevator, Some(i % 2 == 0)),
                )
            })
            .collect();
        let output = ClusterBuilder::new(&Config::default()).cluster_unbounded(
            &reports,
            14,
            &AccessibilityFilter::default(),
        );
        let spec = MarkerSpec::for_feature(&output.features[0], &Config::default());

        assert_eq!(spec.title, "12 reports");
        assert_eq!(spec.size_px, 52);
        assert_eq!(spec.z_index, CLUSTER_Z_INDEX);
        assert_eq!(spec.icon.point_count, 12);
        assert_eq!(spec.icon.yes_count, 6);
        assert_eq!(spec.icon.no_count, 6);
        assert_eq!(spec.icon.status, DominantStatus::Mixed);
    }

    #[test]
    fn test_sync_diff() {
        let config = Config::default();
        let mut sink = RecordingSink::default();
        let mut registry = MarkerRegistry::new();

        let first = features(&[("a", 37.5, 127.0), ("b", 37.6, 127.1), ("c", 37.7, 127.2)], 16);
        let diff = registry.sync(&first, &mut sink, &config);
        assert_eq!(diff, RegistryDiff { added: 3, ..Default::default() });
        assert_eq!(sink.live.len(), 3);

        let handle_b = *registry.handle(&FeatureKey::Point("b".to_string())).unwrap();

        let second = features(&[("b", 37.6, 127.1), ("c", 37.7, 127.2), ("d", 37.8, 127.3)], 16);
        let diff = registry.sync(&second, &mut sink, &config);
        assert_eq!(
            diff,
            RegistryDiff {
                added: 1,
                removed: 1,
                kept: 2,
                updated: 0
            }
        );
        assert_eq!(registry.len(), 3);
        assert_eq!(sink.live.len(), 3);
        // Unchanged features keep their handle
        assert_eq!(registry.handle(&FeatureKey::Point("b".to_string())), Some(&handle_b));
        assert!(registry.handle(&FeatureKey::Point("a".to_string())).is_none());

        let diff = registry.sync(&second, &mut sink, &config);
        assert!(diff.is_noop());
        assert_eq!(diff.kept, 3);
    }

    #[test]
    fn test_sync_replaces_changed_appearance() {
        let config = Config::default();
        let mut sink = RecordingSink::default();
        let mut registry = MarkerRegistry::new();

        registry.sync(&features(&[("a", 37.5, 127.0)], 16), &mut sink, &config);
        let diff = registry.sync(&features(&[("a", 37.5001, 127.0)], 16), &mut sink, &config);
        assert_eq!(diff.updated, 1);
        assert_eq!(sink.live.len(), 1);
        assert_eq!(sink.placed, 2);
        assert_eq!(sink.removed, 1);
    }

    #[test]
    fn test_clear() {
        let config = Config::default();
        let mut sink = RecordingSink::default();
        let mut registry = MarkerRegistry::new();
        registry.sync(&features(&[("a", 37.5, 127.0), ("b", 10.0, 10.0)], 16), &mut sink, &config);

        assert_eq!(registry.clear(&mut sink), 2);
        assert!(registry.is_empty());
        assert!(sink.live.is_empty());
    }

    #[test]
    fn test_feature_key_order() {
        let keys: BTreeSet<FeatureKey> = [
            FeatureKey::Point("b".to_string()),
            FeatureKey::Cluster(ClusterId::from_member_ids(["x", "y"])),
            FeatureKey::Point("a".to_string()),
        ]
        .into_iter()
        .collect();
        assert!(matches!(keys.iter().next(), Some(FeatureKey::Cluster(_))));
    }
}
