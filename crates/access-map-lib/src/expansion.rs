//! Expansion Navigator - "zoom to expand" for a clicked cluster
//!
//! The clicked cluster is resolved by id against a fresh clustering of the current
//! view. Only its members are then re-clustered at increasing zoom levels until
//! they fall apart into at least two features. Because clustering is disabled one
//! level above the configured maximum, the search always terminates there.

use crate::{AccessibilityFilter, AccessibilityReport, BoundingBox, ClusterBuilder, ClusterId};
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outcome of an expansion search
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Expansion {
    /// The cluster splits at `zoom`; `center` is its centroid as `(lat, lon)`
    Split { zoom: u8, center: (f64, f64) },
    /// The search hit the ceiling without a split
    Ceiling { zoom: u8, center: (f64, f64) },
    /// The id did not resolve (the report set changed since the click)
    Fallback { zoom: u8 },
}

impl Expansion {
    #[inline]
    pub fn zoom(&self) -> u8 {
        match *self {
            Expansion::Split { zoom, .. }
            | Expansion::Ceiling { zoom, .. }
            | Expansion::Fallback { zoom } => zoom,
        }
    }

    /// Cluster centroid, `None` for a fallback
    #[inline]
    pub fn center(&self) -> Option<(f64, f64)> {
        match *self {
            Expansion::Split { center, .. } | Expansion::Ceiling { center, .. } => Some(center),
            Expansion::Fallback { .. } => None,
        }
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Expansion::Fallback { .. })
    }
}

/// Find the zoom at which cluster `id`, as seen at `zoom` inside `bounds`, splits
///
/// `fallback_step` is added to `zoom` when `id` cannot be resolved.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn expansion_zoom(
    builder: &ClusterBuilder,
    reports: &[Arc<AccessibilityReport>],
    bounds: &BoundingBox,
    zoom: u8,
    filter: &AccessibilityFilter,
    id: ClusterId,
    fallback_step: u8,
) -> Expansion {
    let current = builder.cluster(reports, bounds, zoom, filter);
    let Some(cluster) = current.find_cluster(id) else {
        tracing::debug!(%id, zoom, "Cluster id not resolved, falling back");
        return Expansion::Fallback {
            zoom: zoom.saturating_add(fallback_step),
        };
    };

    let center = (cluster.centroid_lat, cluster.centroid_lon);
    let wanted: HashSet<&str> = cluster.member_ids.iter().map(String::as_str).collect();
    let members: Vec<Arc<AccessibilityReport>> = reports
        .iter()
        .filter(|r| wanted.contains(r.id.as_str()))
        .cloned()
        .collect();

    // Members already passed the filter at the current zoom
    let pass_all = AccessibilityFilter::default();
    let ceiling = builder.clustering_ceiling();
    for candidate in zoom.saturating_add(1)..=ceiling {
        let output = builder.cluster_unbounded(&members, candidate, &pass_all);
        if output.features.len() >= 2 {
            tracing::debug!(%id, from = zoom, to = candidate, "Cluster splits");
            return Expansion::Split {
                zoom: candidate,
                center,
            };
        }
    }

    Expansion::Ceiling {
        zoom: ceiling.max(zoom),
        center,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClusterFeature, Config};

    fn reports(points: &[(&str, f64, f64)]) -> Vec<Arc<AccessibilityReport>> {
        points
            .iter()
            .map(|(id, lat, lon)| Arc::new(AccessibilityReport::new(*id, *lat, *lon)))
            .collect()
    }

    fn first_cluster_id(
        builder: &ClusterBuilder,
        reports: &[Arc<AccessibilityReport>],
        zoom: u8,
    ) -> ClusterId {
        builder
            .cluster(reports, &BoundingBox::world(), zoom, &AccessibilityFilter::default())
            .features
            .iter()
            .find_map(ClusterFeature::cluster_id)
            .unwrap()
    }

    #[test]
    fn test_split_zoom_is_minimal() {
        let builder = ClusterBuilder::new(&Config::default());
        // ~0.001 deg apart: merged at zoom 12, far apart by zoom 16
        let input = reports(&[("a", 37.5, 127.0), ("b", 37.5, 127.001)]);
        let id = first_cluster_id(&builder, &input, 10);

        let expansion = expansion_zoom(
            &builder,
            &input,
            &BoundingBox::world(),
            10,
            &AccessibilityFilter::default(),
            id,
            2,
        );
        let Expansion::Split { zoom, center } = expansion else {
            panic!("expected a split, got {expansion:?}");
        };
        assert!(zoom > 10);

        // One level earlier the members still form a single feature
        let before = builder.cluster_unbounded(&input, zoom - 1, &AccessibilityFilter::default());
        assert_eq!(before.features.len(), 1);
        let after = builder.cluster_unbounded(&input, zoom, &AccessibilityFilter::default());
        assert!(after.features.len() >= 2);

        assert!((center.0 - 37.5).abs() < 1e-6);
        assert!((center.1 - 127.0005).abs() < 1e-6);
    }

    #[test]
    fn test_identical_positions_split_at_ceiling() {
        let builder = ClusterBuilder::new(&Config::default());
        let input = reports(&[("a", 37.5, 127.0), ("b", 37.5, 127.0)]);
        let id = first_cluster_id(&builder, &input, 15);

        let expansion = expansion_zoom(
            &builder,
            &input,
            &BoundingBox::world(),
            15,
            &AccessibilityFilter::default(),
            id,
            2,
        );
        assert_eq!(expansion.zoom(), builder.clustering_ceiling());
        assert!(matches!(expansion, Expansion::Split { .. }));
    }

    #[test]
    fn test_unknown_id_falls_back() {
        let builder = ClusterBuilder::new(&Config::default());
        let input = reports(&[("a", 37.5, 127.0), ("b", 37.5, 127.0001)]);

        let expansion = expansion_zoom(
            &builder,
            &input,
            &BoundingBox::world(),
            12,
            &AccessibilityFilter::default(),
            ClusterId::from_member_ids(["gone", "stale"]),
            2,
        );
        assert_eq!(expansion, Expansion::Fallback { zoom: 14 });
        assert!(expansion.is_fallback());
        assert_eq!(expansion.center(), None);
    }

    #[test]
    fn test_other_reports_do_not_affect_split() {
        let builder = ClusterBuilder::new(&Config::default());
        let pair = [("a", 37.5, 127.0), ("b", 37.5, 127.001)];
        let alone = reports(&pair);

        let mut crowded_points = pair.to_vec();
        crowded_points.push(("far", 10.0, 10.0));
        let crowded = reports(&crowded_points);

        let id = first_cluster_id(&builder, &alone, 10);
        let filter = AccessibilityFilter::default();
        let world = BoundingBox::world();
        assert_eq!(
            expansion_zoom(&builder, &alone, &world, 10, &filter, id, 2),
            expansion_zoom(&builder, &crowded, &world, 10, &filter, id, 2)
        );
    }

    #[test]
    fn test_fallback_saturates() {
        let builder = ClusterBuilder::new(&Config::default());
        let expansion = expansion_zoom(
            &builder,
            &[],
            &BoundingBox::world(),
            u8::MAX - 1,
            &AccessibilityFilter::default(),
            ClusterId::from_member_ids(["x"]),
            2,
        );
        assert_eq!(expansion.zoom(), u8::MAX);
    }
}
