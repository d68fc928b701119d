//! # Property-Based Tests
//!
//! Precedence monotonicity, idempotent redeclaration and edit-order
//! independence of the canonical export.

use proptest::collection::vec;
use proptest::prelude::*;
use proptest::sample::select;
use schemagraph_core::{
    ClrType, ConfigurationSource, ModelBuilder, Sourced, TypeIdentity, export_json,
};
use std::collections::BTreeSet;

fn source() -> impl Strategy<Value = ConfigurationSource> {
    select(vec![
        ConfigurationSource::Convention,
        ConfigurationSource::DataAnnotation,
        ConfigurationSource::Explicit,
    ])
}

/// Entity names with a property each; declared in the given order.
fn build(names: &[String]) -> ModelBuilder {
    let mut mb = ModelBuilder::new();
    for name in names {
        let id = mb
            .entity(TypeIdentity::named(name.as_str()), ConfigurationSource::Explicit, None)
            .expect("entity")
            .expect("created");
        let mut builder = mb.type_builder(id).expect("builder");
        let key = builder
            .property("Id", Some(ClrType::Int64), ConfigurationSource::Convention)
            .expect("property")
            .expect("created");
        builder
            .primary_key(&[key], ConfigurationSource::Convention)
            .expect("pk");
    }
    mb
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// `overrides` agrees with the total order of sources.
    #[test]
    fn overrides_matches_order(a in source(), b in source()) {
        prop_assert_eq!(a.overrides(Some(b)), a >= b);
        prop_assert_eq!(a.overrides_strictly(Some(b)), a > b);
        prop_assert_eq!(a.max(Some(b)), std::cmp::max(a, b));
    }

    /// The stored source of a facet never decreases while it holds a value.
    #[test]
    fn facet_source_is_monotonic(writes in vec((0u8..4, source()), 1..40)) {
        let mut facet: Sourced<u8> = Sourced::default();
        let mut previous = None;
        for (value, source) in writes {
            facet.set(Some(value), source);
            let current = facet.source();
            prop_assert!(current >= previous);
            previous = current;
        }
    }

    /// The surviving value is the last one written at the strongest source.
    #[test]
    fn strongest_last_write_wins(writes in vec((0usize..100, source()), 1..40)) {
        let mut mb = ModelBuilder::new();
        let tag = mb
            .entity(TypeIdentity::named("Tag"), ConfigurationSource::Explicit, None)
            .expect("entity")
            .expect("created");
        let label = mb
            .type_builder(tag)
            .expect("builder")
            .property("Label", Some(ClrType::String), ConfigurationSource::Explicit)
            .expect("property")
            .expect("created");
        let mut builder = mb.property_builder(label).expect("builder");
        for (value, source) in &writes {
            builder.has_max_length(Some(*value), *source).expect("never explicit-fails");
        }
        let strongest = writes.iter().map(|(_, s)| *s).max().expect("non-empty");
        let expected = writes
            .iter()
            .rev()
            .find(|(_, s)| *s == strongest)
            .map(|(v, _)| *v);
        prop_assert_eq!(mb.model()[label].max_length(), expected);
        prop_assert_eq!(mb.model()[label].max_length_source(), Some(strongest));
    }

    /// Declaring everything twice changes nothing.
    #[test]
    fn redeclaration_is_idempotent(names in vec("[A-Z][a-z]{1,6}", 1..8)) {
        let unique: Vec<String> = names.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let once = build(&unique);
        let mut twice = unique.clone();
        twice.extend(unique.iter().cloned());
        let again = build(&twice);
        prop_assert_eq!(
            export_json(once.model()).expect("export"),
            export_json(again.model()).expect("export")
        );
        prop_assert_eq!(again.model().entity_type_count(), unique.len());
    }

    /// Declaration order does not leak into the export.
    #[test]
    fn export_ignores_declaration_order(names in vec("[A-Z][a-z]{1,6}", 1..8)) {
        let unique: Vec<String> = names.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut reversed = unique.clone();
        reversed.reverse();
        prop_assert_eq!(
            export_json(build(&unique).model()).expect("export"),
            export_json(build(&reversed).model()).expect("export")
        );
    }
}
