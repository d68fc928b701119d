//! # schemagraph
//!
//! Library half of the schemagraph binary: the declaration loader and the
//! CLI commands, exposed so integration tests can drive them directly.

pub mod cli;
pub mod declaration;
pub mod error;

pub use declaration::Declaration;
pub use error::CliError;
