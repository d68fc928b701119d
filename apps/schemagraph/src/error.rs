//! # CLI Errors
//!
//! Everything the binary can fail with. Model errors pass through unchanged.

use schemagraph_core::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Cannot parse '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("Unsupported declaration format '{0}' (expected toml or json)")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}
