//! # schemagraph CLI Module
//!
//! This module implements the CLI interface for schemagraph.
//!
//! ## Available Commands
//!
//! - `check` - Build a model from a declaration and print a summary
//! - `export` - Build a model and write its canonical JSON export
//! - `verify` - Validate a canonical JSON export

mod commands;

use crate::error::CliError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// schemagraph - schema graph builder
///
/// Builds an entity model from a declaration file, honoring the
/// configuration source of every element.
#[derive(Parser, Debug)]
#[command(name = "schemagraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Builder configuration (TOML)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the declared model and print a summary
    Check {
        /// Declaration file (.toml or .json)
        file: PathBuf,
    },

    /// Build the declared model and write its canonical JSON export
    Export {
        /// Declaration file (.toml or .json)
        file: PathBuf,

        /// Output file path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Freeze the model before exporting
        #[arg(long)]
        freeze: bool,
    },

    /// Validate a canonical JSON export
    Verify {
        /// Export file path
        file: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), CliError> {
    let json_mode = cli.json_mode;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Check { file } => cmd_check(&file, config, json_mode),
        Commands::Export {
            file,
            output,
            freeze,
        } => cmd_export(&file, config, output.as_deref(), freeze),
        Commands::Verify { file } => cmd_verify(&file, json_mode),
    }
}
