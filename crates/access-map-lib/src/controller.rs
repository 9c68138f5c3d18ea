//! MapController - single-threaded tick driving the whole pipeline
//!
//! The host forwards viewport events, filter toggles and the current time; on each
//! [`MapController::tick`] the controller refetches if the change subscription fired,
//! asks the [`ViewportReactor`] whether a recompute is due, clusters the current set
//! and diffs the result into the [`RenderSink`].

use crate::{
    AccessibilityField, AccessibilityFilter, BoundingBox, ClusterDiagnostics, ClusterFeature,
    ClusterId, Config, Expansion, MapView, MarkerRegistry, RecomputeReason, RecomputeRequest,
    RegistryDiff, RenderSink, ReportCollection, ReportSource, Result, StaleFlag, Subscription,
    ViewportReactor,
};
use instant::Instant;

/// Where the map should move after a cluster click
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpansionTarget {
    /// Split zoom capped to the map's maximum
    pub zoom: u8,
    /// `(lat, lon)` to center on
    pub center: (f64, f64),
    pub expansion: Expansion,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing due
    Idle,
    Recomputed {
        reason: RecomputeReason,
        diff: RegistryDiff,
        diagnostics: ClusterDiagnostics,
    },
}

/// Owner of the report set, reactor and live markers for one map view
pub struct MapController<H> {
    collection: ReportCollection,
    reactor: ViewportReactor,
    registry: MarkerRegistry<H>,
    features: Vec<ClusterFeature>,
    computed: Option<RecomputeRequest>,
    stale: StaleFlag,
    subscription: Option<Subscription>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<H> MapController<H> {
    pub fn new(config: Config) -> Result<Self> {
        let reactor = ViewportReactor::new(config.debounce(), config.bounds_precision);
        Ok(Self {
            collection: ReportCollection::new(config)?,
            reactor,
            registry: MarkerRegistry::new(),
            features: Vec::new(),
            computed: None,
            stale: StaleFlag::new(),
            subscription: None,
        })
    }

    #[inline]
    pub fn collection(&self) -> &ReportCollection {
        &self.collection
    }

    #[inline]
    pub fn config(&self) -> &Config {
        self.collection.config()
    }

    /// Features of the last recompute
    #[inline]
    pub fn features(&self) -> &[ClusterFeature] {
        &self.features
    }

    #[inline]
    pub fn registry(&self) -> &MarkerRegistry<H> {
        &self.registry
    }

    #[inline]
    pub fn filter(&self) -> AccessibilityFilter {
        self.reactor.filter()
    }

    /// Inputs of the last recompute
    #[inline]
    pub fn last_recompute(&self) -> Option<&RecomputeRequest> {
        self.computed.as_ref()
    }

    /// Subscribe to `source` and load its reports
    pub fn connect<S: ReportSource + ?Sized>(&mut self, source: &mut S) -> Result<u64> {
        self.subscription = Some(source.subscribe(self.stale.listener()));
        self.refresh(source)
    }

    /// Drop the change subscription
    pub fn disconnect(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    /// Refetch from `source`; the recompute happens on the next tick
    pub fn refresh<S: ReportSource + ?Sized>(&mut self, source: &mut S) -> Result<u64> {
        let version = self.collection.reload(source)?;
        self.reactor.reports_changed(version);
        Ok(version)
    }

    /// Replace the report set directly, bypassing any source
    pub fn replace_reports(&mut self, reports: Vec<crate::AccessibilityReport>) -> u64 {
        let version = self.collection.replace_reports(reports);
        self.reactor.reports_changed(version);
        version
    }

    pub fn on_viewport_changed(&mut self, bounds: BoundingBox, zoom: u8, now: Instant) {
        self.reactor.on_viewport_event(bounds, zoom, now);
    }

    /// Read bounds and zoom from the map control
    pub fn sync_from_view<V: MapView + ?Sized>(&mut self, view: &V, now: Instant) {
        self.on_viewport_changed(view.viewport_bounds(), view.zoom(), now);
    }

    pub fn set_filter(&mut self, filter: AccessibilityFilter) -> bool {
        self.reactor.set_filter(filter)
    }

    pub fn toggle_filter(&mut self, field: AccessibilityField) -> AccessibilityFilter {
        let filter = self.reactor.filter().toggled(field);
        self.reactor.set_filter(filter);
        filter
    }

    /// When the host should tick next, if a viewport event is pending
    pub fn next_deadline(&self) -> Option<Instant> {
        self.reactor.next_deadline()
    }

    /// Run everything that is due at `now`
    ///
    /// A refetch failure is returned; the stale mark is consumed either way, the
    /// next change notification triggers a new attempt.
    pub fn tick<S, K>(&mut self, now: Instant, source: &mut S, sink: &mut K) -> Result<TickOutcome>
    where
        S: ReportSource + ?Sized,
        K: RenderSink<Handle = H>,
    {
        if self.stale.take() {
            tracing::debug!("Change notification received, refetching");
            self.refresh(source)?;
        }
        Ok(self.recompute_if_due(now, sink))
    }

    /// Like [`MapController::tick`] without a source to refetch from
    pub fn recompute_if_due<K>(&mut self, now: Instant, sink: &mut K) -> TickOutcome
    where
        K: RenderSink<Handle = H>,
    {
        let Some(request) = self.reactor.poll(now) else {
            return TickOutcome::Idle;
        };

        let output = self
            .collection
            .cluster(&request.bounds, request.zoom, &request.filter);
        let diff = self
            .registry
            .sync(&output.features, sink, self.collection.config());

        tracing::debug!(
            reason = ?request.reason,
            zoom = request.zoom,
            features = output.features.len(),
            added = diff.added,
            removed = diff.removed,
            kept = diff.kept,
            "Recomputed markers"
        );

        self.features = output.features;
        self.computed = Some(request);
        TickOutcome::Recomputed {
            reason: request.reason,
            diff,
            diagnostics: output.diagnostics,
        }
    }

    /// Where to move the map when cluster `id` is clicked
    ///
    /// Resolved against the last computed viewport; `None` before the first recompute.
    pub fn expand_cluster(&self, id: ClusterId) -> Option<ExpansionTarget> {
        let request = self.computed?;
        let expansion =
            self.collection
                .expansion_zoom(&request.bounds, request.zoom, &request.filter, id);

        Some(ExpansionTarget {
            zoom: expansion.zoom().min(self.config().map_max_zoom),
            center: expansion.center().unwrap_or_else(|| request.bounds.center()),
            expansion,
        })
    }

    /// Remove every marker and drop the subscription
    pub fn shutdown<K>(&mut self, sink: &mut K) -> usize
    where
        K: RenderSink<Handle = H>,
    {
        self.disconnect();
        self.features.clear();
        self.registry.clear(sink)
    }
}
