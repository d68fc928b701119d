//! # Builder Configuration
//!
//! Tunables for a `ModelBuilder`, loadable from TOML:
//!
//! ```toml
//! max_foreign_key_chain = 10000
//! max_uniquify_attempts = 1000
//! temporary_key_name = "TempId"
//! default_key_type = "int"
//! standard_conventions = true
//! ```

use crate::primitives::{MAX_FOREIGN_KEY_CHAIN, MAX_UNIQUIFY_ATTEMPTS, TEMPORARY_KEY_NAME};
use crate::{ClrType, ModelError};
use serde::{Deserialize, Serialize};

/// Configuration applied to a model under construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    /// Bound on foreign key chain walks.
    pub max_foreign_key_chain: usize,
    /// Bound on numeric suffixes tried by property uniquification.
    pub max_uniquify_attempts: usize,
    /// Base name of the shadow key synthesized on keyless principals.
    pub temporary_key_name: String,
    /// CLR type of that shadow key when nothing else determines it.
    pub default_key_type: String,
    /// Register the standard key-discovery and FK-index conventions.
    pub standard_conventions: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_foreign_key_chain: MAX_FOREIGN_KEY_CHAIN,
            max_uniquify_attempts: MAX_UNIQUIFY_ATTEMPTS,
            temporary_key_name: TEMPORARY_KEY_NAME.to_string(),
            default_key_type: "int".to_string(),
            standard_conventions: false,
        }
    }
}

impl BuilderConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ModelError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ModelError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check limits and names.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.max_foreign_key_chain == 0 {
            return Err(ModelError::InvalidConfig(
                "max_foreign_key_chain must be greater than zero".to_string(),
            ));
        }
        if self.max_uniquify_attempts == 0 {
            return Err(ModelError::InvalidConfig(
                "max_uniquify_attempts must be greater than zero".to_string(),
            ));
        }
        if self.temporary_key_name.trim().is_empty() {
            return Err(ModelError::InvalidConfig(
                "temporary_key_name must not be empty".to_string(),
            ));
        }
        let key_type = self.key_type()?;
        if key_type.is_collection() || key_type.is_nullable() {
            return Err(ModelError::InvalidConfig(format!(
                "default_key_type '{}' must be a non-nullable scalar",
                self.default_key_type
            )));
        }
        Ok(())
    }

    /// The parsed default key type.
    pub fn key_type(&self) -> Result<ClrType, ModelError> {
        self.default_key_type.parse()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BuilderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.key_type().expect("key type"), ClrType::Int32);
    }

    #[test]
    fn parses_partial_toml() {
        let config = BuilderConfig::from_toml_str(
            "max_foreign_key_chain = 32\nstandard_conventions = true\n",
        )
        .expect("parse");
        assert_eq!(config.max_foreign_key_chain, 32);
        assert!(config.standard_conventions);
        assert_eq!(config.temporary_key_name, "TempId");
    }

    #[test]
    fn rejects_zero_limits() {
        let result = BuilderConfig::from_toml_str("max_uniquify_attempts = 0");
        assert!(matches!(result, Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_nullable_key_type() {
        let result = BuilderConfig::from_toml_str("default_key_type = \"string\"");
        assert!(matches!(result, Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(BuilderConfig::from_toml_str("verbose = true").is_err());
    }
}
