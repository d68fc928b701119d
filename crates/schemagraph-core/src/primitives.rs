//! # Innate Primitives
//!
//! Hardcoded constants for the schema graph engine.
//!
//! Limits here are defaults; `BuilderConfig` can tighten or relax the
//! traversal bounds per model.

/// Maximum number of foreign keys followed in a single principal or
/// ownership chain walk.
///
/// Chains in real models are short; this only stops runaway traversal of
/// pathological (cyclic or generated) models.
pub const MAX_FOREIGN_KEY_CHAIN: usize = 10_000;

/// Maximum number of numeric suffixes tried when synthesizing a unique
/// property name.
pub const MAX_UNIQUIFY_ATTEMPTS: usize = 1_000;

/// Annotation recording the base name a uniquified shadow property was
/// generated from.
pub const PRE_UNIQUIFICATION_NAME_ANNOTATION: &str = "schemagraph:PreUniquificationName";

/// Name used for the synthesized shadow key of a keyless principal.
pub const TEMPORARY_KEY_NAME: &str = "TempId";

/// Separator between declaring type, property and CLR type in complex type names.
pub const COMPLEX_TYPE_SEPARATOR: char = '#';

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_guard_is_ten_thousand() {
        assert_eq!(MAX_FOREIGN_KEY_CHAIN, 10_000);
    }

    #[test]
    fn annotation_name_is_namespaced() {
        assert!(PRE_UNIQUIFICATION_NAME_ANNOTATION.starts_with("schemagraph:"));
    }
}
