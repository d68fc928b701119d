//! Integration tests for declaration loading and the CLI commands.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use schemagraph::cli::{ModelSummary, build_model, cmd_check, cmd_export, cmd_verify};
use schemagraph::{CliError, Declaration};
use schemagraph_core::{ConfigurationSource, ModelBuilder, ModelError, import_json};
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

const SHOP: &str = r#"
[[shapes]]
name = "Post"
members = { Id = "int", Title = "string", Tags = "List<Tag>" }

[[shapes]]
name = "Tag"
members = { Id = "int", Label = "string", Posts = "List<Post>" }

[[shapes]]
name = "Animal"
members = { Id = "long", Name = "string" }

[[shapes]]
name = "Dog"
base = "Animal"
members = { Breed = "string" }

[[entities]]
name = "Post"
key = ["Id"]
properties = [{ name = "Id" }, { name = "Title", max_length = 120 }]
indexes = [{ properties = ["Title"], unique = true }]

[[entities]]
name = "Tag"
key = ["Id"]
properties = [{ name = "Id" }, { name = "Label", nullable = false }]

[[entities]]
name = "Animal"
key = ["Id"]
properties = [{ name = "Id" }, { name = "Name" }]

[[entities]]
name = "Dog"
base = "Animal"
properties = [{ name = "Breed" }]

[[many_to_many]]
left = "Post"
left_navigation = "Tags"
right = "Tag"
right_navigation = "Posts"
"#;

fn write_declaration(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// =============================================================================
// DECLARATION TESTS
// =============================================================================

#[test]
fn test_build_model_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = write_declaration(&dir, "shop.toml", SHOP);

    let mb = build_model(&path, None).unwrap();
    let model = mb.model();
    let summary = ModelSummary::of(model);

    // Post, Tag, the PostTag join type, Animal and Dog
    assert_eq!(summary.entity_types, 5);
    assert_eq!(summary.skip_navigations, 2);
    assert_eq!(summary.foreign_keys, 2);

    let dog = model.find_entity_type("Dog").unwrap();
    let animal = model.find_entity_type("Animal").unwrap();
    assert_eq!(model[dog].base_type(), Some(animal));
}

#[test]
fn test_unsupported_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_declaration(&dir, "shop.yaml", SHOP);

    let result = Declaration::load(&path);
    assert!(matches!(result, Err(CliError::UnsupportedFormat(ext)) if ext == "yaml"));
}

#[test]
fn test_parse_error_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = write_declaration(&dir, "broken.json", "{ \"entities\": [ }");

    match Declaration::load(&path) {
        Err(CliError::Parse { path: reported, .. }) => assert!(reported.ends_with("broken.json")),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn test_explicit_conflict_aborts() {
    let declaration = Declaration::from_toml_str(
        r#"
[[entities]]
name = "Blog"
kind = "named"
properties = [{ name = "Id", type = "int" }]
key = ["Id"]

[[entities]]
name = "Post"
kind = "named"
properties = [{ name = "BlogId", type = "string" }]

[[relationships]]
dependent = "Post"
principal = "Blog"
properties = ["BlogId"]
"#,
    )
    .unwrap();

    let result = declaration.build(ModelBuilder::new());
    assert!(matches!(result, Err(ModelError::ForeignKeyTypeMismatch { .. })));
}

#[test]
fn test_convention_conflict_is_skipped() {
    let declaration = Declaration::from_toml_str(
        r#"
[[entities]]
name = "Blog"
kind = "named"
properties = [{ name = "Id", type = "int" }]
key = ["Id"]

[[entities]]
name = "Post"
kind = "named"
properties = [{ name = "BlogId", type = "string" }]

[[relationships]]
dependent = "Post"
principal = "Blog"
properties = ["BlogId"]
source = "convention"
"#,
    )
    .unwrap();

    let mb = declaration.build(ModelBuilder::new()).unwrap();
    assert_eq!(mb.model().foreign_keys().count(), 0);
}

#[test]
fn test_explicit_entity_overrides_convention_entity() {
    let declaration = Declaration::from_toml_str(
        r#"
[[entities]]
name = "Order"
kind = "named"
source = "convention"

[[entities]]
name = "Order"
kind = "named"
"#,
    )
    .unwrap();

    let mb = declaration.build(ModelBuilder::new()).unwrap();
    let order = mb.model().find_entity_type("Order").unwrap();
    assert_eq!(mb.model()[order].source(), ConfigurationSource::Explicit);
    assert_eq!(mb.model().entity_type_count(), 1);
}

// =============================================================================
// COMMAND TESTS
// =============================================================================

#[test]
fn test_export_writes_canonical_json() {
    let dir = TempDir::new().unwrap();
    let path = write_declaration(&dir, "shop.toml", SHOP);
    let output = dir.path().join("shop.json");

    cmd_export(&path, None, Some(&output), true).unwrap();

    let json = std::fs::read_to_string(&output).unwrap();
    let canonical = import_json(&json).unwrap();
    assert!(canonical.header.read_only);
    assert_eq!(canonical.header.entity_type_count, 5);

    cmd_verify(&output, false).unwrap();
}

#[test]
fn test_export_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let path = write_declaration(&dir, "shop.toml", SHOP);
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");

    cmd_export(&path, None, Some(&first), false).unwrap();
    cmd_export(&path, None, Some(&second), false).unwrap();

    assert_eq!(
        std::fs::read_to_string(first).unwrap(),
        std::fs::read_to_string(second).unwrap()
    );
}

#[test]
fn test_export_to_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_declaration(&dir, "shop.toml", SHOP);
    let output = dir.path().join("missing").join("shop.json");

    assert!(matches!(
        cmd_export(&path, None, Some(&output), false),
        Err(CliError::Io(_))
    ));
}

#[test]
fn test_check_with_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write_declaration(&dir, "shop.toml", SHOP);
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "max_foreign_key_chain = 64").unwrap();

    cmd_check(&path, Some(config.path()), true).unwrap();
}

#[test]
fn test_check_rejects_unknown_config_key() {
    let dir = TempDir::new().unwrap();
    let path = write_declaration(&dir, "shop.toml", SHOP);
    let config = write_declaration(&dir, "builder.toml", "max_depth = 3\n");

    assert!(matches!(
        cmd_check(&path, Some(&config), false),
        Err(CliError::Model(ModelError::InvalidConfig(_)))
    ));
}

#[test]
fn test_verify_rejects_foreign_format() {
    let dir = TempDir::new().unwrap();
    let path = write_declaration(
        &dir,
        "other.json",
        r#"{"header":{"format":"other","version":1,"entity_type_count":0,"foreign_key_count":0,"read_only":false},"entity_types":[],"foreign_keys":[]}"#,
    );

    assert!(matches!(cmd_verify(&path, false), Err(CliError::Parse { .. })));
}
