//! Access Map Library - Viewport Clustering for Accessibility Reports
//!
//! This library turns a set of crowdsourced accessibility reports (ramps, elevators,
//! accessible restrooms, thresholds, wide doors) into the list of markers a map view
//! should draw for its current viewport. Nearby reports are merged into clusters on a
//! pixel grid that is rebuilt per zoom level, and every marker carries a yes/no tally
//! of the accessibility signals of the reports behind it.
//!
//! # Architecture
//!
//! - **[`GeoGrid`]**: Quantizes projected reports into fixed-size pixel cells
//! - **[`ClusterBuilder`]**: Filters, culls, grids and merges reports into [`ClusterFeature`]s
//! - **[`AccessibilityStats`]**: Yes/no aggregation with threshold polarity inversion
//! - **[`ViewportReactor`]**: Debounces viewport events and skips no-op recomputes
//! - **[`expansion`]**: Finds the zoom at which a clicked cluster splits
//! - **[`MapController`]**: Single-threaded tick wiring everything to a [`RenderSink`]
//!
//! # Performance Characteristics
//!
//! - **Clustering**: O(N log N) for the id sort, O(C) for the merge over C occupied cells
//! - **Aggregation**: O(N) integer counting, no floating point accumulation
//! - **Marker updates**: diffed by feature key, unchanged markers are never touched

pub mod cluster;
mod collection;
mod controller;
pub mod expansion;
mod filter;
mod grid;
pub mod markers;
mod reactor;
mod report;
pub mod route;
pub mod source;
mod stats;
pub mod utils;
mod viewport;

// Public API exports
pub use cluster::{
    ClusterBuilder, ClusterDiagnostics, ClusterFeature, ClusterId, ClusterOutput, ClusterSummary,
    PointFeature,
};
pub use collection::{
    CollectionInfo, Config, MAX_ROUNDING_PRECISION, MAX_SUPPORTED_ZOOM, ReportCollection,
};
pub use controller::{ExpansionTarget, MapController, TickOutcome};
pub use expansion::Expansion;
pub use filter::AccessibilityFilter;
pub use grid::{CellKey, GeoGrid, GridCell};
pub use markers::{
    FeatureKey, IconRequest, MapView, MarkerRegistry, MarkerSpec, RegistryDiff, RenderSink,
};
pub use reactor::{RecomputeReason, RecomputeRequest, ViewportReactor};
pub use report::{
    AccessLevel, AccessibilityField, AccessibilityReport, ReportGroup, group_colocated,
};
pub use source::{MemoryReportSource, ReportSource, StaleFlag, Subscription};
pub use stats::{AccessibilityStats, DominantStatus};
pub use viewport::{BoundingBox, ViewportKey};

/// Error types for the map core
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Report source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MapError>;
