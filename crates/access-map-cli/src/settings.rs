use access_map_lib::{AccessibilityField, AccessibilityFilter, BoundingBox, ClusterId, Config};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::error::{CliError, Result};

#[derive(Parser, Debug, Clone)]
#[clap(name = "access-map", author, version, about, long_about = None)]
/// Access Map - cluster crowdsourced accessibility reports for a map viewport
pub struct Settings {
    /// JSON file with the approved reports (an array of report objects)
    #[clap(short, long, value_name = "FILE")]
    pub reports: PathBuf,

    /// JSON file with engine configuration; flags below override its values
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[clap(flatten)]
    pub overrides: ConfigOverrides,

    /// Pretty-print JSON output
    #[clap(long, default_value = "false")]
    pub pretty: bool,

    #[clap(subcommand)]
    pub command: Command,
}

/// Per-field overrides of the engine configuration
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Grid cell size in pixels
    #[clap(long)]
    pub cell_size: Option<f64>,

    /// Merge radius in pixels (must not exceed the cell size)
    #[clap(long)]
    pub merge_radius: Option<f64>,

    /// Tile size in pixels
    #[clap(long)]
    pub tile_size: Option<f64>,

    /// Zooms below this cluster everything into one marker
    #[clap(long)]
    pub min_zoom: Option<u8>,

    /// Zooms above this disable clustering
    #[clap(long)]
    pub max_zoom: Option<u8>,

    /// Highest zoom the map accepts, caps expansion targets
    #[clap(long)]
    pub map_max_zoom: Option<u8>,

    /// Zoom step used when a clicked cluster no longer exists
    #[clap(long)]
    pub fallback_step: Option<u8>,

    /// Viewport debounce in milliseconds
    #[clap(long)]
    pub debounce_ms: Option<u64>,

    /// Use the compact single-report marker size
    #[clap(long)]
    pub compact_markers: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Cluster the reports for one viewport and print the features
    Cluster {
        #[clap(flatten)]
        view: ViewArgs,

        #[clap(flatten)]
        filter: FilterArgs,

        /// Print marker descriptors instead of raw features
        #[clap(long, default_value = "false")]
        markers: bool,
    },

    /// Find the zoom at which a cluster splits
    Expand {
        /// Cluster id as printed by `cluster` (16 hex digits)
        #[clap(long, value_name = "ID")]
        cluster: String,

        #[clap(flatten)]
        view: ViewArgs,

        #[clap(flatten)]
        filter: FilterArgs,
    },

    /// Replay a recorded sequence of viewport, filter and report events
    Replay {
        /// JSON file with the event list
        #[clap(short, long, value_name = "FILE")]
        events: PathBuf,
    },

    /// Summarize the reports along a path
    Route {
        /// JSON file with the path as `[[lon, lat], ...]`
        #[clap(short, long, value_name = "FILE")]
        path: PathBuf,

        /// Distance in meters for a report to count as on the route
        #[clap(long, default_value = "50.0")]
        radius: f64,

        /// Distance in meters for a report to color a path vertex
        #[clap(long, default_value = "20.0")]
        segment_radius: f64,
    },

    /// Print statistics about the report set
    Info,
}

/// Viewport selection
#[derive(Args, Debug, Clone)]
pub struct ViewArgs {
    /// Zoom level
    #[clap(short, long)]
    pub zoom: u8,

    /// Viewport as `west,south,east,north`; defaults to the extent of the reports
    #[clap(long, value_name = "W,S,E,N", value_delimiter = ',', allow_negative_numbers = true)]
    pub bbox: Option<Vec<f64>>,
}

impl ViewArgs {
    pub fn bounds(&self, fallback: Option<BoundingBox>) -> Result<BoundingBox> {
        match self.bbox.as_deref() {
            Some([west, south, east, north]) => Ok(BoundingBox::new(*west, *south, *east, *north)),
            Some(other) => Err(CliError::InvalidArgument(format!(
                "bbox needs 4 values, got {}",
                other.len()
            ))),
            None => Ok(fallback.unwrap_or_else(BoundingBox::world)),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldArg {
    Ramp,
    Elevator,
    Restroom,
    LowThreshold,
    WideDoor,
}

impl From<FieldArg> for AccessibilityField {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Ramp => AccessibilityField::Ramp,
            FieldArg::Elevator => AccessibilityField::Elevator,
            FieldArg::Restroom => AccessibilityField::AccessibleRestroom,
            FieldArg::LowThreshold => AccessibilityField::LowThreshold,
            FieldArg::WideDoor => AccessibilityField::WideDoor,
        }
    }
}

/// Accessibility filter toggles
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only keep reports where this field is known to be true (repeatable)
    #[clap(long, value_enum, value_name = "FIELD")]
    pub require: Vec<FieldArg>,

    /// Only keep public-data reports
    #[clap(long, default_value = "false")]
    pub public_data: bool,
}

impl FilterArgs {
    pub fn to_filter(&self) -> AccessibilityFilter {
        self.require
            .iter()
            .fold(AccessibilityFilter::default(), |filter, field| {
                filter.with_field((*field).into(), true)
            })
            .with_public_data(self.public_data)
    }
}

impl ConfigOverrides {
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(v) = self.cell_size {
            config.cell_size_px = v;
        }
        if let Some(v) = self.merge_radius {
            config.merge_radius_px = v;
        }
        if let Some(v) = self.tile_size {
            config.tile_size_px = v;
        }
        if let Some(v) = self.min_zoom {
            config.min_zoom = v;
        }
        if let Some(v) = self.max_zoom {
            config.max_zoom = v;
        }
        if let Some(v) = self.map_max_zoom {
            config.map_max_zoom = v;
        }
        if let Some(v) = self.fallback_step {
            config.expansion_fallback_step = v;
        }
        if let Some(v) = self.debounce_ms {
            config.debounce_ms = v;
        }
        if self.compact_markers {
            config.compact_markers = true;
        }
        config
    }
}

pub fn parse_cluster_id(text: &str) -> Result<ClusterId> {
    text.parse()
        .map_err(|e| CliError::InvalidArgument(format!("cluster id {text:?}: {e}")))
}
