//! Offline replay of recorded map interaction
//!
//! A replay file is a JSON array of timestamped events. Viewport events go through
//! the controller's debounce exactly as live ones would; report events go through
//! an in-memory source, so the change subscription drives the refetch.

use access_map_lib::{
    AccessibilityFilter, AccessibilityReport, BoundingBox, ClusterId, Config, MapController,
    MarkerSpec, MemoryReportSource, RecomputeReason, RegistryDiff, RenderSink, TickOutcome,
};
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// One recorded interaction
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Viewport {
        at_ms: u64,
        bounds: BoundingBox,
        zoom: u8,
    },
    Filter {
        at_ms: u64,
        filter: AccessibilityFilter,
    },
    /// Replace the backend's report set
    Reports {
        at_ms: u64,
        reports: Vec<AccessibilityReport>,
    },
    /// Click on a cluster
    Expand {
        at_ms: u64,
        cluster: ClusterId,
    },
}

impl ReplayEvent {
    fn at_ms(&self) -> u64 {
        match self {
            ReplayEvent::Viewport { at_ms, .. }
            | ReplayEvent::Filter { at_ms, .. }
            | ReplayEvent::Reports { at_ms, .. }
            | ReplayEvent::Expand { at_ms, .. } => *at_ms,
        }
    }
}

/// Printed line of the replay log
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayRecord {
    Recompute {
        at_ms: u64,
        reason: &'static str,
        zoom: u8,
        features: usize,
        diff: RegistryDiff,
    },
    Expansion {
        at_ms: u64,
        cluster: ClusterId,
        zoom: Option<u8>,
        center: Option<(f64, f64)>,
        fallback: bool,
    },
}

/// Sink that only counts live markers
#[derive(Debug, Default)]
pub struct CountingSink {
    next: u64,
    live: usize,
}

impl CountingSink {
    pub fn live(&self) -> usize {
        self.live
    }
}

impl RenderSink for CountingSink {
    type Handle = u64;

    fn place_marker(&mut self, spec: &MarkerSpec) -> u64 {
        self.next += 1;
        self.live += 1;
        tracing::trace!(handle = self.next, title = %spec.title, "place marker");
        self.next
    }

    fn remove_marker(&mut self, handle: u64) {
        self.live = self.live.saturating_sub(1);
        tracing::trace!(handle, "remove marker");
    }
}

fn reason_name(reason: RecomputeReason) -> &'static str {
    match reason {
        RecomputeReason::Viewport => "viewport",
        RecomputeReason::Filter => "filter",
        RecomputeReason::Reports => "reports",
    }
}

/// Run `events` against `initial` reports and return the log
pub fn run(
    config: Config,
    initial: Vec<AccessibilityReport>,
    mut events: Vec<ReplayEvent>,
) -> Result<Vec<ReplayRecord>> {
    events.sort_by_key(ReplayEvent::at_ms);

    let mut source = MemoryReportSource::new(initial);
    let mut sink = CountingSink::default();
    let mut controller = MapController::new(config)?;
    controller.connect(&mut source)?;

    let start = Instant::now();
    let at = |ms: u64| start + Duration::from_millis(ms);
    let mut log = Vec::new();

    for event in events {
        let at_ms = event.at_ms();

        // Let due debounces fire before this event arrives
        while let Some(deadline) = controller.next_deadline() {
            if deadline > at(at_ms) {
                break;
            }
            let elapsed = deadline.duration_since(start).as_millis() as u64;
            let outcome = tick(&mut controller, deadline, &mut source, &mut sink)?;
            record(&mut log, elapsed, &controller, outcome);
        }

        match event {
            ReplayEvent::Viewport { bounds, zoom, .. } => {
                controller.on_viewport_changed(bounds, zoom, at(at_ms));
            }
            ReplayEvent::Filter { filter, .. } => {
                controller.set_filter(filter);
            }
            ReplayEvent::Reports { reports, .. } => {
                source.set_reports(reports);
            }
            ReplayEvent::Expand { cluster, .. } => {
                let target = controller.expand_cluster(cluster);
                log.push(ReplayRecord::Expansion {
                    at_ms,
                    cluster,
                    zoom: target.map(|t| t.zoom),
                    center: target.map(|t| t.center),
                    fallback: target.is_some_and(|t| t.expansion.is_fallback()),
                });
                continue;
            }
        }

        let outcome = tick(&mut controller, at(at_ms), &mut source, &mut sink)?;
        record(&mut log, at_ms, &controller, outcome);
    }

    // Flush the trailing debounce
    if let Some(deadline) = controller.next_deadline() {
        let elapsed = deadline.duration_since(start).as_millis() as u64;
        let outcome = tick(&mut controller, deadline, &mut source, &mut sink)?;
        record(&mut log, elapsed, &controller, outcome);
    }

    tracing::info!(
        records = log.len(),
        live_markers = sink.live(),
        "Replay finished"
    );
    Ok(log)
}

fn tick(
    controller: &mut MapController<u64>,
    now: Instant,
    source: &mut MemoryReportSource,
    sink: &mut CountingSink,
) -> Result<TickOutcome> {
    Ok(controller.tick(now, source, sink)?)
}

fn record(
    log: &mut Vec<ReplayRecord>,
    at_ms: u64,
    controller: &MapController<u64>,
    outcome: TickOutcome,
) {
    if let TickOutcome::Recomputed { reason, diff, .. } = outcome {
        log.push(ReplayRecord::Recompute {
            at_ms,
            reason: reason_name(reason),
            zoom: controller.last_recompute().map_or(0, |r| r.zoom),
            features: controller.features().len(),
            diff,
        });
    }
}
