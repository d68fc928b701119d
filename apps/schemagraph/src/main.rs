//! # schemagraph
//!
//! The main binary for the schemagraph model builder.
//!
//! This application provides:
//! - Declaration loading (TOML or JSON)
//! - CLI interface for checking and exporting models
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │            apps/schemagraph (THE BINARY)          │
//! │                                                   │
//! │  ┌─────────────┐         ┌────────────────────┐   │
//! │  │   CLI       │ ──────▶ │ Declaration Loader │   │
//! │  │  (clap)     │         │ (serde, toml)      │   │
//! │  └─────────────┘         └─────────┬──────────┘   │
//! │                                    ▼              │
//! │                        ┌──────────────────────┐   │
//! │                        │   schemagraph-core   │   │
//! │                        │     (THE LOGIC)      │   │
//! │                        └──────────────────────┘   │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! schemagraph check blog.toml
//! schemagraph export blog.toml -o blog.json --freeze
//! schemagraph verify blog.json
//! ```

use clap::Parser;
use schemagraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // SCHEMAGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("SCHEMAGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose {
        "schemagraph=debug,schemagraph_core=debug"
    } else {
        "schemagraph=info,schemagraph_core=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr so exports on stdout stay clean.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner to stderr.
fn print_banner() {
    eprintln!(
        r#"
  schemagraph v{}

  Sourced • Deterministic
"#,
        env!("CARGO_PKG_VERSION")
    );
}
