//! # Annotations
//!
//! The annotatable bag every model element carries: an ordered mapping from
//! annotation name to `(value, source)`.

use crate::source::ConfigurationSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation values are arbitrary JSON.
pub type AnnotationValue = serde_json::Value;

/// A single annotation value and the source that set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub value: AnnotationValue,
    pub source: ConfigurationSource,
}

/// Name-ordered annotation storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    entries: BTreeMap<String, Annotation>,
}

impl Annotations {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an annotation.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Annotation> {
        self.entries.get(name)
    }

    /// Look up an annotation value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&AnnotationValue> {
        self.entries.get(name).map(|annotation| &annotation.value)
    }

    /// Whether `value` may be written under `name` at `source`.
    #[must_use]
    pub fn can_set(
        &self,
        name: &str,
        value: &AnnotationValue,
        source: ConfigurationSource,
    ) -> bool {
        match self.entries.get(name) {
            None => true,
            Some(existing) => source.can_set(Some(existing.source), existing.value == *value),
        }
    }

    /// Add or update an annotation, returning whether the write was accepted.
    pub fn set(&mut self, name: &str, value: AnnotationValue, source: ConfigurationSource) -> bool {
        if !self.can_set(name, &value, source) {
            return false;
        }
        let source = source.max(self.entries.get(name).map(|existing| existing.source));
        self.entries
            .insert(name.to_string(), Annotation { value, source });
        true
    }

    /// Whether the annotation may be removed at `source`.
    #[must_use]
    pub fn can_remove(&self, name: &str, source: ConfigurationSource) -> bool {
        self.entries
            .get(name)
            .is_none_or(|existing| source.overrides(Some(existing.source)))
    }

    /// Remove an annotation, returning the removed entry when allowed.
    pub fn remove(&mut self, name: &str, source: ConfigurationSource) -> Option<Annotation> {
        if !self.can_remove(name, source) {
            return None;
        }
        self.entries.remove(name)
    }

    /// Iterate annotations in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Annotation)> {
        self.entries.iter().map(|(name, a)| (name.as_str(), a))
    }

    /// Number of annotations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replay every annotation of `other` through the precedence gate.
    pub fn merge_from(&mut self, other: &Self) {
        for (name, annotation) in &other.entries {
            self.set(name, annotation.value.clone(), annotation.source);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
