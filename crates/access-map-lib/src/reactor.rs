//! Viewport Reactor - debounce and recompute-if-changed
//!
//! Viewport events arrive at arbitrary frequency during a drag or pinch. The reactor
//! remembers only the latest one and reports a recompute once no new event has come
//! in for the debounce period (trailing debounce). Filter and report-set changes skip
//! the debounce and are due on the next poll.
//!
//! Every recompute is keyed by the rounded bounds, zoom, filter and report-set
//! version; a key equal to the last computed one is swallowed.
//!
//! Time is always passed in by the caller, which keeps the reactor deterministic.

use crate::{AccessibilityFilter, BoundingBox, ViewportKey};
use instant::Instant;
use std::time::Duration;

/// Why a recompute was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeReason {
    /// Debounced pan or zoom
    Viewport,
    /// Filter toggled
    Filter,
    /// Report set replaced
    Reports,
}

/// Inputs of one due recompute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecomputeRequest {
    pub bounds: BoundingBox,
    pub zoom: u8,
    pub filter: AccessibilityFilter,
    pub version: u64,
    pub reason: RecomputeReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecomputeKey {
    viewport: ViewportKey,
    filter: AccessibilityFilter,
    version: u64,
}

/// Debouncing state machine between the map control and the cluster builder
#[derive(Debug, Clone)]
pub struct ViewportReactor {
    debounce: Duration,
    precision: u32,
    filter: AccessibilityFilter,
    version: u64,
    /// Latest viewport seen, computed against or not
    latest: Option<(BoundingBox, u8)>,
    /// Time of the latest viewport event not yet acted on
    pending_since: Option<Instant>,
    /// Immediate recompute owed to a filter or report change
    forced: Option<RecomputeReason>,
    last_key: Option<RecomputeKey>,
}

impl ViewportReactor {
    /// Create a reactor with the given quiet period and bounds rounding precision
    pub fn new(debounce: Duration, precision: u32) -> Self {
        Self {
            debounce,
            precision,
            filter: AccessibilityFilter::default(),
            version: 0,
            latest: None,
            pending_since: None,
            forced: None,
            last_key: None,
        }
    }

    /// Record a viewport change; restarts the quiet period
    pub fn on_viewport_event(&mut self, bounds: BoundingBox, zoom: u8, now: Instant) {
        self.latest = Some((bounds, zoom));
        self.pending_since = Some(now);
    }

    /// Replace the active filter; returns whether it changed
    pub fn set_filter(&mut self, filter: AccessibilityFilter) -> bool {
        if filter == self.filter {
            return false;
        }
        self.filter = filter;
        self.forced = Some(RecomputeReason::Filter);
        true
    }

    #[inline]
    pub fn filter(&self) -> AccessibilityFilter {
        self.filter
    }

    /// Note a new report-set version; returns whether it changed
    pub fn reports_changed(&mut self, version: u64) -> bool {
        if version == self.version {
            return false;
        }
        self.version = version;
        self.forced = Some(RecomputeReason::Reports);
        true
    }

    /// Latest viewport seen as `(bounds, zoom)`
    #[inline]
    pub fn viewport(&self) -> Option<(BoundingBox, u8)> {
        self.latest
    }

    /// When the pending viewport event becomes due, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_since.map(|since| since + self.debounce)
    }

    /// Whether [`ViewportReactor::poll`] at `now` would consider a recompute
    pub fn is_due(&self, now: Instant) -> bool {
        self.latest.is_some()
            && (self.forced.is_some() || self.next_deadline().is_some_and(|deadline| now >= deadline))
    }

    /// Forget the last computed key so the next due poll always recomputes
    pub fn invalidate(&mut self) {
        self.last_key = None;
    }

    /// Return the recompute that is due at `now`, if any
    ///
    /// Returns `None` while the quiet period is running, before any viewport is
    /// known, or when the inputs round to the last computed key.
    pub fn poll(&mut self, now: Instant) -> Option<RecomputeRequest> {
        if !self.is_due(now) {
            return None;
        }
        let (bounds, zoom) = self.latest?;

        let reason = self.forced.take().unwrap_or(RecomputeReason::Viewport);
        // The latest viewport is folded into this recompute
        self.pending_since = None;

        let key = RecomputeKey {
            viewport: bounds.key(zoom, self.precision),
            filter: self.filter,
            version: self.version,
        };
        if self.last_key == Some(key) {
            tracing::trace!(zoom, "Viewport unchanged, skipping recompute");
            return None;
        }
        self.last_key = Some(key);

        Some(RecomputeRequest {
            bounds,
            zoom,
            filter: self.filter,
            version: self.version,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccessibilityField;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn reactor() -> ViewportReactor {
        ViewportReactor::new(DEBOUNCE, 4)
    }

    fn bounds(offset: f64) -> BoundingBox {
        BoundingBox::new(126.9 + offset, 37.4 + offset, 127.1 + offset, 37.6 + offset)
    }

    #[test]
    fn test_burst_collapses_to_one_recompute() {
        let mut reactor = reactor();
        let start = Instant::now();
        let mut recomputes = Vec::new();

        for i in 0..50u32 {
            let now = start + Duration::from_millis(u64::from(i) * 5);
            reactor.on_viewport_event(bounds(f64::from(i) * 0.001), 14 + (i % 2) as u8, now);
            recomputes.extend(reactor.poll(now));
        }
        assert!(recomputes.is_empty());

        let last_event = start + Duration::from_millis(49 * 5);
        assert!(reactor.poll(last_event + Duration::from_millis(299)).is_none());
        recomputes.extend(reactor.poll(last_event + DEBOUNCE));
        recomputes.extend(reactor.poll(last_event + DEBOUNCE * 2));

        assert_eq!(recomputes.len(), 1);
        let request = recomputes[0];
        assert_eq!(request.bounds, bounds(49.0 * 0.001));
        assert_eq!(request.zoom, 15);
        assert_eq!(request.reason, RecomputeReason::Viewport);
    }

    #[test]
    fn test_noop_viewport_event_is_skipped() {
        let mut reactor = reactor();
        let t0 = Instant::now();
        reactor.on_viewport_event(bounds(0.0), 14, t0);
        assert!(reactor.poll(t0 + DEBOUNCE).is_some());

        // Sub-precision jitter rounds to the same key
        let t1 = t0 + Duration::from_secs(1);
        reactor.on_viewport_event(bounds(0.00001), 14, t1);
        assert!(reactor.poll(t1 + DEBOUNCE).is_none());
        assert!(reactor.next_deadline().is_none());

        // A zoom change is a real change
        let t2 = t1 + Duration::from_secs(1);
        reactor.on_viewport_event(bounds(0.00001), 15, t2);
        assert!(reactor.poll(t2 + DEBOUNCE).is_some());
    }

    #[test]
    fn test_filter_change_bypasses_debounce() {
        let mut reactor = reactor();
        let t0 = Instant::now();
        reactor.on_viewport_event(bounds(0.0), 14, t0);
        assert!(reactor.poll(t0 + DEBOUNCE).is_some());

        let filter = AccessibilityFilter::default().with_field(AccessibilityField::Ramp, true);
        assert!(reactor.set_filter(filter));
        assert!(!reactor.set_filter(filter));

        let request = reactor.poll(t0 + DEBOUNCE).unwrap();
        assert_eq!(request.reason, RecomputeReason::Filter);
        assert_eq!(request.filter, filter);
    }

    #[test]
    fn test_report_change_bypasses_debounce() {
        let mut reactor = reactor();
        let t0 = Instant::now();
        reactor.on_viewport_event(bounds(0.0), 14, t0);

        // Still inside the quiet period, but new reports are due immediately
        assert!(reactor.reports_changed(1));
        let request = reactor.poll(t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(request.reason, RecomputeReason::Reports);
        assert_eq!(request.version, 1);

        // The pending viewport was folded into that recompute
        assert!(reactor.poll(t0 + DEBOUNCE).is_none());
        assert!(!reactor.reports_changed(1));
    }

    #[test]
    fn test_nothing_before_first_viewport() {
        let mut reactor = reactor();
        reactor.reports_changed(3);
        let now = Instant::now();
        assert!(!reactor.is_due(now));
        assert!(reactor.poll(now).is_none());

        // The owed recompute happens once a viewport is known
        reactor.on_viewport_event(bounds(0.0), 10, now);
        let request = reactor.poll(now).unwrap();
        assert_eq!(request.reason, RecomputeReason::Reports);
    }

    #[test]
    fn test_finest_precision_still_sees_pans() {
        let mut reactor = ViewportReactor::new(DEBOUNCE, crate::MAX_ROUNDING_PRECISION);
        let t0 = Instant::now();
        reactor.on_viewport_event(bounds(0.0), 14, t0);
        assert!(reactor.poll(t0 + DEBOUNCE).is_some());

        let t1 = t0 + Duration::from_secs(1);
        reactor.on_viewport_event(
            BoundingBox::new(100.0, 10.0, 100.2, 10.2),
            14,
            t1,
        );
        assert!(reactor.poll(t1 + DEBOUNCE).is_some());
    }

    #[test]
    fn test_invalidate_forces_same_key() {
        let mut reactor = reactor();
        let t0 = Instant::now();
        reactor.on_viewport_event(bounds(0.0), 12, t0);
        assert!(reactor.poll(t0 + DEBOUNCE).is_some());

        reactor.invalidate();
        reactor.on_viewport_event(bounds(0.0), 12, t0 + DEBOUNCE);
        assert!(reactor.poll(t0 + DEBOUNCE * 2).is_some());
    }

    #[test]
    fn test_next_deadline_tracks_last_event() {
        let mut reactor = reactor();
        assert!(reactor.next_deadline().is_none());

        let t0 = Instant::now();
        reactor.on_viewport_event(bounds(0.0), 12, t0);
        reactor.on_viewport_event(bounds(0.1), 12, t0 + Duration::from_millis(100));
        assert_eq!(
            reactor.next_deadline(),
            Some(t0 + Duration::from_millis(100) + DEBOUNCE)
        );
    }
}
