//! # CLI Command Implementations
//!
//! Each command loads a declaration, builds the model with the configured
//! builder and reports on it. Nothing here mutates the model beyond what the
//! declaration states.

use crate::declaration::Declaration;
use crate::error::CliError;
use schemagraph_core::{
    BuilderConfig, Model, ModelBuilder, ModelError, TypeKind, export_json, import_json,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum declaration file size (16 MB).
const MAX_DECLARATION_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Maximum canonical export size accepted by `verify` (64 MB).
const MAX_EXPORT_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Maximum builder configuration size (64 KB).
const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CliError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CliError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(CliError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve `path` to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, CliError> {
    let canonical = path.canonicalize().map_err(|e| {
        CliError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(CliError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve the parent directory of an output path, which must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, CliError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        CliError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(CliError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| CliError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// MODEL LOADING
// =============================================================================

/// Read the builder configuration, or the defaults without a path.
pub fn load_config(path: Option<&Path>) -> Result<BuilderConfig, CliError> {
    let Some(path) = path else {
        return Ok(BuilderConfig::default());
    };
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_CONFIG_FILE_SIZE)?;
    let text = std::fs::read_to_string(&validated)?;
    let config = BuilderConfig::from_toml_str(&text)?;
    tracing::debug!(path = %validated.display(), "builder configuration loaded");
    Ok(config)
}

/// Build the model a declaration file describes.
pub fn build_model(file: &Path, config: Option<&Path>) -> Result<ModelBuilder, CliError> {
    let validated = validate_file_path(file)?;
    validate_file_size(&validated, MAX_DECLARATION_FILE_SIZE)?;

    let declaration = Declaration::load(&validated)?;
    let mut mb = ModelBuilder::with_config(load_config(config)?)?;
    declaration.apply(&mut mb)?;

    tracing::info!(
        file = %validated.display(),
        entity_types = mb.model().entity_type_count(),
        "declaration applied"
    );
    Ok(mb)
}

/// Element counts printed by `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ModelSummary {
    pub entity_types: usize,
    pub complex_types: usize,
    pub owned_types: usize,
    pub keys: usize,
    pub indexes: usize,
    pub foreign_keys: usize,
    pub skip_navigations: usize,
}

impl ModelSummary {
    pub fn of(model: &Model) -> Self {
        Self {
            entity_types: model.entity_type_count(),
            complex_types: model
                .types()
                .filter(|t| t.kind() == TypeKind::Complex)
                .count(),
            owned_types: model.entity_types().filter(|t| t.is_owned()).count(),
            keys: model.keys().count(),
            indexes: model.indexes().count(),
            foreign_keys: model.foreign_keys().count(),
            skip_navigations: model.skip_navigations().count(),
        }
    }
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Build the declared model and print its summary.
pub fn cmd_check(file: &Path, config: Option<&Path>, json_mode: bool) -> Result<(), CliError> {
    let mb = build_model(file, config)?;
    let model = mb.model();
    let summary = ModelSummary::of(model);

    if json_mode {
        let output = serde_json::json!({
            "file": file.to_string_lossy(),
            "summary": summary,
            "entity_types": model.entity_types().map(|t| t.name()).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("schemagraph Model Summary");
    println!("=========================");
    println!("Declaration: {:?}", file);
    println!();
    println!("Entity types:     {}", summary.entity_types);
    println!("Complex types:    {}", summary.complex_types);
    println!("Owned types:      {}", summary.owned_types);
    println!("Keys:             {}", summary.keys);
    println!("Indexes:          {}", summary.indexes);
    println!("Foreign keys:     {}", summary.foreign_keys);
    println!("Skip navigations: {}", summary.skip_navigations);
    println!();
    for ty in model.entity_types() {
        println!("  {} ({})", ty.name(), ty.source());
    }

    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Build the declared model and write its canonical JSON export.
pub fn cmd_export(
    file: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
    freeze: bool,
) -> Result<(), CliError> {
    let validated_output = output.map(validate_output_path).transpose()?;

    let mut mb = build_model(file, config)?;
    let model = if freeze { mb.freeze()? } else { mb.model() };
    let json = export_json(model)?;

    match validated_output {
        Some(path) => {
            std::fs::write(&path, &json)
                .map_err(|e| CliError::Io(format!("Write file: {}", e)))?;
            println!("Exported {} bytes to {:?}", json.len(), path);
        }
        None => println!("{}", json),
    }

    Ok(())
}

// =============================================================================
// VERIFY COMMAND
// =============================================================================

/// Parse a canonical export and check its header against its contents.
pub fn cmd_verify(file: &Path, json_mode: bool) -> Result<(), CliError> {
    let validated = validate_file_path(file)?;
    validate_file_size(&validated, MAX_EXPORT_FILE_SIZE)?;
    let text = std::fs::read_to_string(&validated)?;
    let canonical = import_json(&text).map_err(|error| match error {
        ModelError::Serialization(message) => CliError::Parse {
            path: validated.display().to_string(),
            message,
        },
        other => CliError::Model(other),
    })?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&canonical.header).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "Valid {} v{} export: {} entity types, {} foreign keys{}",
        canonical.header.format,
        canonical.header.version,
        canonical.header.entity_type_count,
        canonical.header.foreign_key_count,
        if canonical.header.read_only {
            " (read-only)"
        } else {
            ""
        }
    );
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
