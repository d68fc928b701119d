//! # Configuration Source
//!
//! Every fact in the schema graph records who stated it. Sources are totally
//! ordered: `Convention < DataAnnotation < Explicit`. A write is accepted
//! when it does not change the stored value (the source is ratcheted up) or
//! when its source overrides the stored one.
//!
//! All facet writes in the crate go through [`ConfigurationSource::can_set`]
//! so the rule is applied uniformly.

use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority tag attached to every stored fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationSource {
    Convention,
    DataAnnotation,
    Explicit,
}

impl ConfigurationSource {
    /// `self >= other`; an absent source is always overridden.
    #[must_use]
    pub fn overrides(self, other: Option<Self>) -> bool {
        other.is_none_or(|other| self >= other)
    }

    /// `self > other`; an absent source is always overridden.
    #[must_use]
    pub fn overrides_strictly(self, other: Option<Self>) -> bool {
        other.is_none_or(|other| self > other)
    }

    /// The higher of the two sources.
    #[must_use]
    pub fn max(self, other: Option<Self>) -> Self {
        match other {
            Some(other) if other > self => other,
            _ => self,
        }
    }

    /// The single write gate: unchanged values always pass, changed values
    /// need an overriding source.
    #[must_use]
    pub fn can_set(self, existing: Option<Self>, unchanged: bool) -> bool {
        unchanged || self.overrides(existing)
    }

    /// Whether failures at this source are surfaced as errors.
    #[must_use]
    pub const fn is_explicit(self) -> bool {
        matches!(self, Self::Explicit)
    }

    /// Report a rejected change: `Explicit` raises the error, lower sources
    /// return `Ok(None)`.
    pub fn reject<T>(self, error: impl FnOnce() -> ModelError) -> Result<Option<T>, ModelError> {
        if self.is_explicit() {
            Err(error())
        } else {
            tracing::trace!(source = %self, "rejected non-explicit configuration");
            Ok(None)
        }
    }

    /// `reject` for boolean-returning mutators.
    pub fn refuse(self, error: impl FnOnce() -> ModelError) -> Result<bool, ModelError> {
        self.reject::<()>(error).map(|_| false)
    }
}

impl fmt::Display for ConfigurationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Convention => f.write_str("Convention"),
            Self::DataAnnotation => f.write_str("DataAnnotation"),
            Self::Explicit => f.write_str("Explicit"),
        }
    }
}

/// `max` over two optional sources, absent being the lowest.
#[must_use]
pub fn max_source(
    left: Option<ConfigurationSource>,
    right: Option<ConfigurationSource>,
) -> Option<ConfigurationSource> {
    match (left, right) {
        (Some(left), right) => Some(left.max(right)),
        (None, right) => right,
    }
}

// =============================================================================
// SOURCED FACET
// =============================================================================

/// A settable facet together with the source of its last accepted write.
///
/// Resetting the value to `None` also clears the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sourced<T> {
    value: Option<T>,
    source: Option<ConfigurationSource>,
}

impl<T> Default for Sourced<T> {
    fn default() -> Self {
        Self {
            value: None,
            source: None,
        }
    }
}

impl<T: Clone + PartialEq> Sourced<T> {
    /// A facet initialized with a value at a source.
    #[must_use]
    pub fn new(value: T, source: ConfigurationSource) -> Self {
        Self {
            value: Some(value),
            source: Some(source),
        }
    }

    /// The configured value.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// The configured value, copied.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.value.clone()
    }

    /// The source of the configured value.
    #[must_use]
    pub fn source(&self) -> Option<ConfigurationSource> {
        self.source
    }

    /// Whether `value` may be written at `source`.
    #[must_use]
    pub fn can_set(&self, value: Option<&T>, source: ConfigurationSource) -> bool {
        source.can_set(self.source, self.value.as_ref() == value)
    }

    /// Write `value` at `source`, returning whether the write was accepted.
    pub fn set(&mut self, value: Option<T>, source: ConfigurationSource) -> bool {
        if !self.can_set(value.as_ref(), source) {
            return false;
        }
        self.source = if value.is_some() {
            Some(source.max(self.source))
        } else {
            None
        };
        self.value = value;
        true
    }

    /// Ratchet the source without touching the value.
    pub fn update_source(&mut self, source: ConfigurationSource) {
        if self.value.is_some() {
            self.source = Some(source.max(self.source));
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::ConfigurationSource::{Convention, DataAnnotation, Explicit};
    use super::*;

    #[test]
    fn ordering_is_total() {
        assert!(Convention < DataAnnotation);
        assert!(DataAnnotation < Explicit);
    }

    #[test]
    fn overrides_is_greater_or_equal() {
        assert!(Convention.overrides(None));
        assert!(Convention.overrides(Some(Convention)));
        assert!(!Convention.overrides(Some(DataAnnotation)));
        assert!(Explicit.overrides(Some(Explicit)));
    }

    #[test]
    fn overrides_strictly_excludes_equal() {
        assert!(Convention.overrides_strictly(None));
        assert!(!Convention.overrides_strictly(Some(Convention)));
        assert!(DataAnnotation.overrides_strictly(Some(Convention)));
        assert!(!Explicit.overrides_strictly(Some(Explicit)));
    }

    #[test]
    fn max_treats_absent_as_lowest() {
        assert_eq!(Convention.max(None), Convention);
        assert_eq!(Convention.max(Some(Explicit)), Explicit);
        assert_eq!(max_source(None, None), None);
        assert_eq!(max_source(None, Some(DataAnnotation)), Some(DataAnnotation));
    }

    #[test]
    fn sourced_rejects_lower_writes() {
        let mut facet = Sourced::new(10usize, DataAnnotation);
        assert!(!facet.set(Some(20), Convention));
        assert_eq!(facet.value(), Some(10));
        assert_eq!(facet.source(), Some(DataAnnotation));
    }

    #[test]
    fn sourced_equal_value_ratchets_source() {
        let mut facet = Sourced::new(true, Convention);
        assert!(facet.set(Some(true), Convention));
        assert!(facet.set(Some(true), Explicit));
        assert_eq!(facet.source(), Some(Explicit));
        // Lower equal writes still succeed and never lower the source.
        assert!(facet.set(Some(true), Convention));
        assert_eq!(facet.source(), Some(Explicit));
    }

    #[test]
    fn sourced_reset_clears_source() {
        let mut facet = Sourced::new(4usize, Convention);
        assert!(facet.set(None, DataAnnotation));
        assert_eq!(facet.value(), None);
        assert_eq!(facet.source(), None);
    }

    #[test]
    fn reject_is_silent_below_explicit() {
        let result: Result<Option<()>, ModelError> =
            Convention.reject(|| ModelError::ReadOnlyModel);
        assert_eq!(result, Ok(None));
        let result: Result<Option<()>, ModelError> =
            Explicit.reject(|| ModelError::ReadOnlyModel);
        assert_eq!(result, Err(ModelError::ReadOnlyModel));
    }
}
