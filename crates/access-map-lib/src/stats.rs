//! Accessibility aggregation
//!
//! Reduces the five boolean fields of one or many reports to a yes/no tally. Each
//! known field contributes exactly one signal; the low-threshold field is inverted
//! first because `true` there means a barrier exists. Everything is integer counting.

use crate::{AccessibilityField, AccessibilityReport};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Yes/no tally over a set of reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccessibilityStats {
    pub yes_count: u32,
    pub no_count: u32,
    pub total_responses: u32,
}

/// Marker coloring class derived from a tally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DominantStatus {
    /// No signal at all (gray)
    Neutral,
    /// Every signal is positive
    Safe,
    /// Every signal is negative
    Danger,
    /// Both kinds present; rendered as a ratio donut
    Mixed,
    /// Public-data singleton without any field set; rendered as a check mark
    Verified,
}

impl AccessibilityStats {
    /// Aggregate every field of every report
    pub fn aggregate<'a, I>(reports: I) -> Self
    where
        I: IntoIterator<Item = &'a AccessibilityReport>,
    {
        Self::aggregate_fields(reports, &AccessibilityField::ALL)
    }

    /// Aggregate only the given fields of every report
    pub fn aggregate_fields<'a, I>(reports: I, fields: &[AccessibilityField]) -> Self
    where
        I: IntoIterator<Item = &'a AccessibilityReport>,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("stats::aggregate");

        let mut stats = Self::default();
        for report in reports {
            stats.add_report_fields(report, fields);
        }
        stats
    }

    /// Tally of a single report
    #[inline]
    pub fn from_report(report: &AccessibilityReport) -> Self {
        Self::aggregate(std::iter::once(report))
    }

    fn add_report_fields(&mut self, report: &AccessibilityReport, fields: &[AccessibilityField]) {
        for field in fields {
            match field.signal(report.field(*field)) {
                Some(true) => self.yes_count += 1,
                Some(false) => self.no_count += 1,
                None => continue,
            }
            self.total_responses += 1;
        }
    }

    /// Combine two tallies
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            yes_count: self.yes_count + other.yes_count,
            no_count: self.no_count + other.no_count,
            total_responses: self.total_responses + other.total_responses,
        }
    }

    /// Share of positive signals, `None` when there are no responses
    ///
    /// Only meant for rendering; the tally itself stays integral.
    pub fn yes_ratio(&self) -> Option<f64> {
        (self.total_responses > 0)
            .then(|| f64::from(self.yes_count) / f64::from(self.total_responses))
    }

    /// Classify the tally using the fixed thresholds
    pub fn dominant_status(&self) -> DominantStatus {
        if self.total_responses == 0 {
            DominantStatus::Neutral
        } else if self.yes_count == self.total_responses {
            DominantStatus::Safe
        } else if self.no_count == self.total_responses {
            DominantStatus::Danger
        } else {
            DominantStatus::Mixed
        }
    }
}

impl DominantStatus {
    /// Status of an unclustered report, applying the verified override
    pub fn for_point(report: &AccessibilityReport, stats: &AccessibilityStats) -> Self {
        if report.is_public() && !report.has_accessibility_data() {
            DominantStatus::Verified
        } else {
            stats.dominant_status()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccessLevel;

    fn report() -> AccessibilityReport {
        AccessibilityReport::new("r", 37.5, 127.0)
    }

    #[test]
    fn test_low_threshold_true_is_negative() {
        let stats = AccessibilityStats::from_report(
            &report().with_field(AccessibilityField::LowThreshold, Some(true)),
        );
        assert_eq!(
            stats,
            AccessibilityStats {
                yes_count: 0,
                no_count: 1,
                total_responses: 1
            }
        );
    }

    #[test]
    fn test_low_threshold_false_is_positive() {
        let stats = AccessibilityStats::from_report(
            &report().with_field(AccessibilityField::LowThreshold, Some(false)),
        );
        assert_eq!(
            stats,
            AccessibilityStats {
                yes_count: 1,
                no_count: 0,
                total_responses: 1
            }
        );
    }

    #[test]
    fn test_all_fields_unknown_contributes_nothing() {
        let stats = AccessibilityStats::from_report(&report());
        assert_eq!(stats, AccessibilityStats::default());
        assert_eq!(stats.dominant_status(), DominantStatus::Neutral);
        assert_eq!(stats.yes_ratio(), None);
    }

    #[test]
    fn test_full_report_contributes_five_signals() {
        let full = report()
            .with_field(AccessibilityField::Ramp, Some(true))
            .with_field(AccessibilityField::Elevator, Some(false))
            .with_field(AccessibilityField::AccessibleRestroom, Some(true))
            .with_field(AccessibilityField::LowThreshold, Some(true))
            .with_field(AccessibilityField::WideDoor, Some(true));

        let stats = AccessibilityStats::from_report(&full);
        assert_eq!(stats.yes_count, 3);
        assert_eq!(stats.no_count, 2);
        assert_eq!(stats.total_responses, 5);
        assert_eq!(stats.dominant_status(), DominantStatus::Mixed);
        assert_eq!(stats.yes_ratio(), Some(0.6));
    }

    #[test]
    fn test_aggregate_many_and_merge() {
        let a = report().with_field(AccessibilityField::Ramp, Some(true));
        let b = report().with_field(AccessibilityField::Ramp, Some(false));
        let combined = AccessibilityStats::aggregate([&a, &b]);
        assert_eq!(combined.total_responses, 2);

        let merged = AccessibilityStats::from_report(&a).merge(AccessibilityStats::from_report(&b));
        assert_eq!(combined, merged);
    }

    #[test]
    fn test_aggregate_fields_subset() {
        let r = report()
            .with_field(AccessibilityField::Ramp, Some(false))
            .with_field(AccessibilityField::WideDoor, Some(true));
        let stats = AccessibilityStats::aggregate_fields(
            [&r],
            &[AccessibilityField::Ramp, AccessibilityField::Elevator],
        );
        assert_eq!(stats.no_count, 1);
        assert_eq!(stats.total_responses, 1);
    }

    #[test]
    fn test_dominant_status_thresholds() {
        let safe = AccessibilityStats {
            yes_count: 4,
            no_count: 0,
            total_responses: 4,
        };
        let danger = AccessibilityStats {
            yes_count: 0,
            no_count: 2,
            total_responses: 2,
        };
        assert_eq!(safe.dominant_status(), DominantStatus::Safe);
        assert_eq!(danger.dominant_status(), DominantStatus::Danger);
    }

    #[test]
    fn test_verified_override() {
        let public = report().with_access_level(AccessLevel::Public);
        let stats = AccessibilityStats::from_report(&public);
        assert_eq!(DominantStatus::for_point(&public, &stats), DominantStatus::Verified);

        // Public data with a known field renders as a regular ratio
        let public_with_data = public.with_field(AccessibilityField::Ramp, Some(true));
        let stats = AccessibilityStats::from_report(&public_with_data);
        assert_eq!(DominantStatus::for_point(&public_with_data, &stats), DominantStatus::Safe);

        // User data without fields stays neutral
        let user = report();
        let stats = AccessibilityStats::from_report(&user);
        assert_eq!(DominantStatus::for_point(&user, &stats), DominantStatus::Neutral);
    }
}
