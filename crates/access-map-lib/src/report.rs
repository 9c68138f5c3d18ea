//! Accessibility report storage module
//!
//! This module provides the `AccessibilityReport` struct, one crowdsourced or
//! public-data observation at a point, along with the five accessibility fields
//! it can carry and helpers to group reports filed at the same location.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Provenance of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AccessLevel {
    /// Official or public-sourced data
    #[cfg_attr(feature = "serde", serde(rename = "public"))]
    Public,
    /// Submitted by a user
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "notpublic"))]
    NotPublic,
}

/// The five accessibility attributes a report can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessibilityField {
    Ramp,
    Elevator,
    AccessibleRestroom,
    /// A step or threshold is present; `true` here is a barrier
    LowThreshold,
    WideDoor,
}

impl AccessibilityField {
    /// All fields, in display order
    pub const ALL: [AccessibilityField; 5] = [
        AccessibilityField::Ramp,
        AccessibilityField::Elevator,
        AccessibilityField::AccessibleRestroom,
        AccessibilityField::LowThreshold,
        AccessibilityField::WideDoor,
    ];

    /// Whether `true` on this field means the place is *less* accessible
    #[inline]
    pub fn is_inverted(self) -> bool {
        matches!(self, AccessibilityField::LowThreshold)
    }

    /// Convert a raw field value into an accessibility signal
    ///
    /// Returns `Some(true)` for a positive signal, `Some(false)` for a negative one,
    /// and `None` when the field is unknown.
    #[inline]
    pub fn signal(self, value: Option<bool>) -> Option<bool> {
        value.map(|v| if self.is_inverted() { !v } else { v })
    }

    /// Column name used by the report store
    pub fn name(self) -> &'static str {
        match self {
            AccessibilityField::Ramp => "has_ramp",
            AccessibilityField::Elevator => "has_elevator",
            AccessibilityField::AccessibleRestroom => "has_accessible_restroom",
            AccessibilityField::LowThreshold => "has_low_threshold",
            AccessibilityField::WideDoor => "has_wide_door",
        }
    }
}

/// A single accessibility observation at a point
///
/// Reports are immutable once created; the clustering core only ever reads them
/// through shared `Arc` references.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccessibilityReport {
    /// Opaque unique identifier
    pub id: String,
    /// Latitude in WGS84 degrees
    #[cfg_attr(feature = "serde", serde(alias = "latitude"))]
    pub lat: f64,
    /// Longitude in WGS84 degrees
    #[cfg_attr(feature = "serde", serde(alias = "longitude"))]
    pub lon: f64,
    /// Display label
    #[cfg_attr(feature = "serde", serde(default))]
    pub location_name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub has_ramp: Option<bool>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub has_elevator: Option<bool>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub has_accessible_restroom: Option<bool>,
    /// `true` means a step or threshold exists
    #[cfg_attr(feature = "serde", serde(default))]
    pub has_low_threshold: Option<bool>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub has_wide_door: Option<bool>,
    /// Free text
    #[cfg_attr(feature = "serde", serde(default))]
    pub details: Option<String>,
    /// Ordered image references
    #[cfg_attr(feature = "serde", serde(default))]
    pub photo_urls: Vec<String>,
    /// Creation time, used for recency ordering
    #[cfg_attr(feature = "serde", serde(default))]
    pub created_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub accessibility_level: AccessLevel,
}

impl AccessibilityReport {
    /// Create a report with all accessibility fields unknown
    pub fn new(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            location_name: String::new(),
            has_ramp: None,
            has_elevator: None,
            has_accessible_restroom: None,
            has_low_threshold: None,
            has_wide_door: None,
            details: None,
            photo_urls: Vec::new(),
            created_at: None,
            accessibility_level: AccessLevel::NotPublic,
        }
    }

    /// Set one accessibility field
    pub fn with_field(mut self, field: AccessibilityField, value: Option<bool>) -> Self {
        *self.field_mut(field) = value;
        self
    }

    pub fn with_location_name(mut self, name: impl Into<String>) -> Self {
        self.location_name = name.into();
        self
    }

    pub fn with_access_level(mut self, level: AccessLevel) -> Self {
        self.accessibility_level = level;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Read one accessibility field
    #[inline]
    pub fn field(&self, field: AccessibilityField) -> Option<bool> {
        match field {
            AccessibilityField::Ramp => self.has_ramp,
            AccessibilityField::Elevator => self.has_elevator,
            AccessibilityField::AccessibleRestroom => self.has_accessible_restroom,
            AccessibilityField::LowThreshold => self.has_low_threshold,
            AccessibilityField::WideDoor => self.has_wide_door,
        }
    }

    fn field_mut(&mut self, field: AccessibilityField) -> &mut Option<bool> {
        match field {
            AccessibilityField::Ramp => &mut self.has_ramp,
            AccessibilityField::Elevator => &mut self.has_elevator,
            AccessibilityField::AccessibleRestroom => &mut self.has_accessible_restroom,
            AccessibilityField::LowThreshold => &mut self.has_low_threshold,
            AccessibilityField::WideDoor => &mut self.has_wide_door,
        }
    }

    /// Whether the report comes from official/public data
    #[inline]
    pub fn is_public(&self) -> bool {
        self.accessibility_level == AccessLevel::Public
    }

    /// Whether any of the five accessibility fields is known
    #[inline]
    pub fn has_accessibility_data(&self) -> bool {
        AccessibilityField::ALL
            .iter()
            .any(|field| self.field(*field).is_some())
    }

    /// Newest-first ordering, unknown creation times last, ties broken by id
    pub fn cmp_recency(&self, other: &Self) -> Ordering {
        match (self.created_at, other.created_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| self.id.cmp(&other.id))
    }
}

/// Reports filed at the same (rounded) location, newest first
#[derive(Debug, Clone)]
pub struct ReportGroup {
    reports: Vec<Arc<AccessibilityReport>>,
}

impl ReportGroup {
    /// The newest report of the group
    #[inline]
    pub fn representative(&self) -> &Arc<AccessibilityReport> {
        // Groups are only built from at least one report
        &self.reports[0]
    }

    #[inline]
    pub fn reports(&self) -> &[Arc<AccessibilityReport>] {
        &self.reports
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

/// Location key of a report rounded to `precision` decimal places
pub(crate) fn location_key(lat: f64, lon: f64, precision: u32) -> (i64, i64) {
    let scale = 10f64.powi(precision as i32);
    ((lat * scale).round() as i64, (lon * scale).round() as i64)
}

/// Group reports whose coordinates match when rounded to `precision` decimal places
///
/// Groups come back ordered by location key, each sorted newest first.
pub fn group_colocated(
    reports: &[Arc<AccessibilityReport>],
    precision: u32,
) -> Vec<ReportGroup> {
    let mut by_location: BTreeMap<(i64, i64), Vec<Arc<AccessibilityReport>>> = BTreeMap::new();

    for report in reports {
        by_location
            .entry(location_key(report.lat, report.lon, precision))
            .or_default()
            .push(report.clone());
    }

    by_location
        .into_values()
        .map(|mut reports| {
            reports.sort_by(|a, b| a.cmp_recency(b));
            ReportGroup { reports }
        })
        .collect()
}
