//! Accessibility filter
//!
//! A filter is a set of independent "required" toggles combined with logical AND.
//! It is an immutable value: toggling produces a new filter, and two filters compare
//! equal exactly when the same toggles are set.

use crate::{AccessibilityField, AccessibilityReport};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Boolean toggles restricting which reports are clustered
///
/// Every toggle is "required if true, ignored if false". The default filter has
/// every toggle off and passes every report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AccessibilityFilter {
    has_ramp: bool,
    has_elevator: bool,
    has_accessible_restroom: bool,
    has_low_threshold: bool,
    has_wide_door: bool,
    public_data: bool,
}

impl AccessibilityFilter {
    /// Return a copy with the requirement for `field` set to `required`
    #[must_use]
    pub fn with_field(mut self, field: AccessibilityField, required: bool) -> Self {
        match field {
            AccessibilityField::Ramp => self.has_ramp = required,
            AccessibilityField::Elevator => self.has_elevator = required,
            AccessibilityField::AccessibleRestroom => self.has_accessible_restroom = required,
            AccessibilityField::LowThreshold => self.has_low_threshold = required,
            AccessibilityField::WideDoor => self.has_wide_door = required,
        }
        self
    }

    /// Return a copy with the public-data requirement set to `required`
    #[must_use]
    pub fn with_public_data(mut self, required: bool) -> Self {
        self.public_data = required;
        self
    }

    /// Return a copy with the requirement for `field` flipped
    #[must_use]
    pub fn toggled(self, field: AccessibilityField) -> Self {
        let current = self.requires(field);
        self.with_field(field, !current)
    }

    /// Whether `field` must be strictly `true` on a passing report
    #[inline]
    pub fn requires(&self, field: AccessibilityField) -> bool {
        match field {
            AccessibilityField::Ramp => self.has_ramp,
            AccessibilityField::Elevator => self.has_elevator,
            AccessibilityField::AccessibleRestroom => self.has_accessible_restroom,
            AccessibilityField::LowThreshold => self.has_low_threshold,
            AccessibilityField::WideDoor => self.has_wide_door,
        }
    }

    #[inline]
    pub fn requires_public_data(&self) -> bool {
        self.public_data
    }

    /// Whether no toggle is set
    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Number of active toggles
    pub fn active_count(&self) -> usize {
        AccessibilityField::ALL
            .iter()
            .filter(|field| self.requires(**field))
            .count()
            + usize::from(self.public_data)
    }

    /// Check a report against every active toggle
    ///
    /// `None` never satisfies a requirement: unknown is not `true`.
    pub fn matches(&self, report: &AccessibilityReport) -> bool {
        let fields_ok = AccessibilityField::ALL
            .iter()
            .all(|field| !self.requires(*field) || report.field(*field) == Some(true));

        fields_ok && (!self.public_data || report.is_public())
    }
}
