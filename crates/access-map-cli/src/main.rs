//! `access-map` - headless front-end for the clustering engine
//!
//! Reads reports from a JSON file in place of the backend fetch, runs the engine and
//! prints JSON to stdout. Logs go to stderr.

mod error;
mod logging;
mod replay;
mod settings;

use access_map_lib::route::{self, RouteBarrierSummary};
use access_map_lib::{AccessibilityReport, Config, MarkerSpec, ReportCollection};
use clap::Parser;
use error::{CliError, Result};
use geo::LineString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use settings::{Command, Settings};
use std::path::Path;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::setup_logging();

    let settings = Settings::parse();
    if let Err(e) = run(settings).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> Result<()> {
    let config = match &settings.config {
        Some(path) => load_json::<Config>(path).await?,
        None => Config::default(),
    };
    let config = settings.overrides.apply(config);
    let reports: Vec<AccessibilityReport> = load_json(&settings.reports).await?;
    tracing::info!(
        reports = reports.len(),
        path = %settings.reports.display(),
        "Loaded reports"
    );

    match &settings.command {
        Command::Cluster {
            view,
            filter,
            markers,
        } => {
            let collection = load_collection(config, reports)?;
            let bounds = view.bounds(collection.bounding_box())?;
            let output = collection.cluster(&bounds, view.zoom, &filter.to_filter());
            tracing::info!(
                features = output.features.len(),
                clusters = output.cluster_count(),
                filtered_out = output.diagnostics.filtered_out,
                invalid = output.diagnostics.invalid_coordinates,
                "Clustered"
            );

            if *markers {
                let specs: Vec<MarkerSpec> = output
                    .features
                    .iter()
                    .map(|f| MarkerSpec::for_feature(f, collection.config()))
                    .collect();
                print_json(&specs, settings.pretty)
            } else {
                print_json(&output.features, settings.pretty)
            }
        }
        Command::Expand {
            cluster,
            view,
            filter,
        } => {
            let id = settings::parse_cluster_id(cluster)?;
            let collection = load_collection(config, reports)?;
            let bounds = view.bounds(collection.bounding_box())?;
            let expansion = collection.expansion_zoom(&bounds, view.zoom, &filter.to_filter(), id);
            let capped = expansion.zoom().min(collection.config().map_max_zoom);

            #[derive(Serialize)]
            struct ExpandOutput {
                zoom: u8,
                expansion: access_map_lib::Expansion,
            }
            print_json(
                &ExpandOutput {
                    zoom: capped,
                    expansion,
                },
                settings.pretty,
            )
        }
        Command::Replay { events } => {
            let events: Vec<replay::ReplayEvent> = load_json(events).await?;
            let log = replay::run(config, reports, events)?;
            print_json(&log, settings.pretty)
        }
        Command::Route {
            path,
            radius,
            segment_radius,
        } => {
            let coords: Vec<(f64, f64)> = load_json(path).await?;
            if coords.len() < 2 {
                return Err(CliError::InvalidArgument(format!(
                    "path needs at least 2 points, got {}",
                    coords.len()
                )));
            }
            let line = LineString::from(coords);
            let collection = load_collection(config, reports)?;

            #[derive(Serialize)]
            struct RouteOutput {
                summary: RouteBarrierSummary,
                runs: Vec<route::PathRun>,
            }
            print_json(
                &RouteOutput {
                    summary: RouteBarrierSummary::compute(&line, collection.reports(), *radius),
                    runs: route::segment_path(&line, collection.reports(), *segment_radius),
                },
                settings.pretty,
            )
        }
        Command::Info => {
            let collection = load_collection(config, reports)?;
            print_json(&collection.get_info(), settings.pretty)
        }
    }
}

fn load_collection(config: Config, reports: Vec<AccessibilityReport>) -> Result<ReportCollection> {
    let mut collection = ReportCollection::new(config)?;
    collection.replace_reports(reports);
    Ok(collection)
}

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}
