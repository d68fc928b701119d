//! # Model Declarations
//!
//! A declaration file describes a model the way user code would configure
//! it: CLR shapes, entity types with their members, relationships and
//! many-to-many pairs. Each element states the `ConfigurationSource` it is
//! applied at (`explicit` when omitted), so a declaration can reproduce
//! convention-level discovery as well as explicit overrides.
//!
//! ```toml
//! [[shapes]]
//! name = "Blog"
//! members = { Id = "int", Title = "string" }
//!
//! [[entities]]
//! name = "Blog"
//! key = ["Id"]
//! properties = [{ name = "Id" }, { name = "Title", max_length = 200 }]
//! ```
//!
//! Declarations are applied in one convention batch: shapes, then every
//! entity type, then base types, members, keys and indexes, then
//! relationships. A non-explicit element the builder refuses is logged and
//! skipped; an explicit one aborts with the builder's error.

use crate::error::CliError;
use schemagraph_core::{
    AccessMode, ClrShape, ClrType, ConfigurationSource, DeleteBehavior, ForeignKeyId, KeyId,
    ModelBuilder, ModelError, PropertyId, TypeId, TypeIdentity, ValueGenerated,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// DECLARATION TYPES
// =============================================================================

/// A whole model declaration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    #[serde(default)]
    pub shapes: Vec<ShapeDeclaration>,
    #[serde(default)]
    pub entities: Vec<EntityDeclaration>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDeclaration>,
    #[serde(default)]
    pub many_to_many: Vec<ManyToManyDeclaration>,
    /// Entity type names excluded from the model.
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// A CLR type shape; member types use the `ClrType` text form.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeDeclaration {
    pub name: String,
    #[serde(default)]
    pub value_type: bool,
    pub base: Option<String>,
    #[serde(default)]
    pub members: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Backed by the CLR class of the same name.
    #[default]
    Class,
    /// A name with no CLR type.
    Named,
    /// A shared-type entity backed by the property bag.
    Shared,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDeclaration {
    pub name: String,
    #[serde(default)]
    pub kind: IdentityKind,
    pub source: Option<ConfigurationSource>,
    pub base: Option<String>,
    pub keyless: Option<bool>,
    pub owned: Option<bool>,
    /// Primary key property names.
    pub key: Option<Vec<String>>,
    #[serde(default)]
    pub alternate_keys: Vec<Vec<String>>,
    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,
    #[serde(default)]
    pub complex_properties: Vec<ComplexPropertyDeclaration>,
    #[serde(default)]
    pub indexes: Vec<IndexDeclaration>,
    /// Member names excluded from this type.
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyDeclaration {
    pub name: String,
    /// Omitted for CLR-backed members.
    #[serde(rename = "type")]
    pub clr_type: Option<String>,
    pub source: Option<ConfigurationSource>,
    pub nullable: Option<bool>,
    pub max_length: Option<usize>,
    pub concurrency_token: Option<bool>,
    pub value_generated: Option<ValueGenerated>,
    pub field: Option<String>,
    pub access_mode: Option<AccessMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplexPropertyDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub clr_type: Option<String>,
    pub collection: Option<bool>,
    pub nullable: Option<bool>,
    pub source: Option<ConfigurationSource>,
    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,
    #[serde(default)]
    pub complex_properties: Vec<ComplexPropertyDeclaration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDeclaration {
    pub properties: Vec<String>,
    pub name: Option<String>,
    pub unique: Option<bool>,
    pub source: Option<ConfigurationSource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipDeclaration {
    pub dependent: String,
    pub principal: String,
    /// Dependent property names; synthesized when omitted.
    pub properties: Option<Vec<String>>,
    /// Principal key property names; the primary key when omitted.
    pub principal_key: Option<Vec<String>>,
    pub to_principal: Option<String>,
    pub to_dependent: Option<String>,
    pub unique: Option<bool>,
    pub required: Option<bool>,
    /// One of the `DeleteBehavior` names, e.g. `Cascade`.
    pub delete_behavior: Option<String>,
    pub ownership: Option<bool>,
    pub source: Option<ConfigurationSource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManyToManyDeclaration {
    pub left: String,
    pub left_navigation: String,
    pub right: String,
    pub right_navigation: String,
    pub source: Option<ConfigurationSource>,
}

fn source_or_explicit(source: Option<ConfigurationSource>) -> ConfigurationSource {
    source.unwrap_or(ConfigurationSource::Explicit)
}

// =============================================================================
// LOADING
// =============================================================================

impl Declaration {
    /// Parse a declaration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, CliError> {
        toml::from_str(text).map_err(|e| CliError::Parse {
            path: "<toml>".to_string(),
            message: e.to_string(),
        })
    }

    /// Parse a declaration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, CliError> {
        serde_json::from_str(text).map_err(|e| CliError::Parse {
            path: "<json>".to_string(),
            message: e.to_string(),
        })
    }

    /// Read a declaration; the format follows the file extension.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed = match extension.as_str() {
            "toml" => Self::from_toml_str(&text),
            "json" => Self::from_json_str(&text),
            other => return Err(CliError::UnsupportedFormat(other.to_string())),
        };
        parsed.map_err(|error| match error {
            CliError::Parse { message, .. } => CliError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    // =========================================================================
    // APPLYING
    // =========================================================================

    /// Apply every element to `mb` inside one convention batch.
    pub fn apply(&self, mb: &mut ModelBuilder) -> Result<(), ModelError> {
        mb.batch(|mb| {
            for shape in &self.shapes {
                mb.register_shape(shape.to_shape()?)?;
            }
            for name in &self.ignore {
                mb.ignore(name, ConfigurationSource::Explicit)?;
            }

            let mut declared = Vec::with_capacity(self.entities.len());
            for entity in &self.entities {
                if let Some(id) = entity.declare(mb)? {
                    declared.push((id, entity));
                }
            }
            for (id, entity) in &declared {
                entity.apply_base(mb, *id)?;
            }
            for (id, entity) in &declared {
                entity.apply_members(mb, *id)?;
            }

            for relationship in &self.relationships {
                relationship.apply(mb)?;
            }
            for pair in &self.many_to_many {
                pair.apply(mb)?;
            }
            Ok(())
        })
    }

    /// Apply onto a fresh builder and return it.
    pub fn build(&self, mb: ModelBuilder) -> Result<ModelBuilder, ModelError> {
        let mut mb = mb;
        self.apply(&mut mb)?;
        Ok(mb)
    }
}

impl ShapeDeclaration {
    fn to_shape(&self) -> Result<ClrShape, ModelError> {
        let mut shape = if self.value_type {
            ClrShape::structure(&self.name)
        } else {
            ClrShape::class(&self.name)
        };
        if let Some(base) = &self.base {
            shape = shape.with_base(base);
        }
        for (name, clr_type) in &self.members {
            shape = shape.with_property(name, clr_type.parse()?);
        }
        for (name, clr_type) in &self.fields {
            shape = shape.with_field(name, clr_type.parse()?);
        }
        Ok(shape)
    }
}

fn resolve_type(mb: &ModelBuilder, name: &str) -> Result<TypeId, ModelError> {
    mb.model()
        .find_entity_type(name)
        .ok_or_else(|| ModelError::ElementNotFound(format!("entity type '{name}'")))
}

fn resolve_properties(
    mb: &ModelBuilder,
    type_id: TypeId,
    names: &[String],
) -> Result<Vec<PropertyId>, ModelError> {
    names
        .iter()
        .map(|name| {
            mb.model().find_property(type_id, name).ok_or_else(|| {
                ModelError::ElementNotFound(format!(
                    "property '{}' on '{}'",
                    name,
                    mb.model()[type_id].name()
                ))
            })
        })
        .collect()
}

fn parse_type(clr_type: Option<&String>) -> Result<Option<ClrType>, ModelError> {
    clr_type.map(|t| t.parse()).transpose()
}

fn skipped(element: &str, name: &str, source: ConfigurationSource) {
    tracing::warn!(element, name, %source, "declaration element refused, skipping");
}

impl EntityDeclaration {
    fn identity(&self) -> TypeIdentity {
        match self.kind {
            IdentityKind::Class => TypeIdentity::class(&self.name),
            IdentityKind::Named => TypeIdentity::named(&self.name),
            IdentityKind::Shared => TypeIdentity::shared(&self.name),
        }
    }

    fn declare(&self, mb: &mut ModelBuilder) -> Result<Option<TypeId>, ModelError> {
        let source = source_or_explicit(self.source);
        let id = mb.entity(self.identity(), source, self.owned)?;
        if id.is_none() {
            skipped("entity type", &self.name, source);
        }
        Ok(id)
    }

    fn apply_base(&self, mb: &mut ModelBuilder, id: TypeId) -> Result<(), ModelError> {
        let Some(base) = &self.base else {
            return Ok(());
        };
        let source = source_or_explicit(self.source);
        let base = resolve_type(mb, base)?;
        if !mb.type_builder(id)?.has_base_type(Some(base), source)? {
            skipped("base type", &self.name, source);
        }
        Ok(())
    }

    fn apply_members(&self, mb: &mut ModelBuilder, id: TypeId) -> Result<(), ModelError> {
        let source = source_or_explicit(self.source);
        for name in &self.ignore {
            mb.type_builder(id)?.ignore(name, source)?;
        }
        for property in &self.properties {
            property.apply(mb, id)?;
        }
        for complex in &self.complex_properties {
            complex.apply(mb, id)?;
        }

        if let Some(keyless) = self.keyless {
            mb.type_builder(id)?.is_keyless(Some(keyless), source)?;
        }
        if let Some(key) = &self.key {
            let properties = resolve_properties(mb, id, key)?;
            if mb.type_builder(id)?.primary_key(&properties, source)?.is_none() {
                skipped("primary key", &self.name, source);
            }
        }
        for key in &self.alternate_keys {
            let properties = resolve_properties(mb, id, key)?;
            if mb.type_builder(id)?.has_key(&properties, source)?.is_none() {
                skipped("key", &self.name, source);
            }
        }
        for index in &self.indexes {
            index.apply(mb, id)?;
        }
        Ok(())
    }
}

impl PropertyDeclaration {
    fn apply(&self, mb: &mut ModelBuilder, type_id: TypeId) -> Result<(), ModelError> {
        let source = source_or_explicit(self.source);
        let clr_type = parse_type(self.clr_type.as_ref())?;
        let created = mb.type_builder(type_id)?.property(&self.name, clr_type, source)?;
        let Some(id) = created else {
            skipped("property", &self.name, source);
            return Ok(());
        };

        let mut property = mb.property_builder(id)?;
        if self.nullable.is_some() {
            property.is_nullable(self.nullable, source)?;
        }
        if self.max_length.is_some() {
            property.has_max_length(self.max_length, source)?;
        }
        if self.concurrency_token.is_some() {
            property.is_concurrency_token(self.concurrency_token, source)?;
        }
        if self.value_generated.is_some() {
            property.value_generated(self.value_generated, source)?;
        }
        if let Some(field) = &self.field {
            property.has_field(Some(field.as_str()), source)?;
        }
        if self.access_mode.is_some() {
            property.use_access_mode(self.access_mode, source)?;
        }
        Ok(())
    }
}

impl ComplexPropertyDeclaration {
    fn apply(&self, mb: &mut ModelBuilder, type_id: TypeId) -> Result<(), ModelError> {
        let source = source_or_explicit(self.source);
        let clr_type = parse_type(self.clr_type.as_ref())?;
        let created = mb.type_builder(type_id)?.complex_property(
            &self.name,
            clr_type,
            self.collection,
            source,
        )?;
        let Some(id) = created else {
            skipped("complex property", &self.name, source);
            return Ok(());
        };

        if self.nullable.is_some() {
            mb.complex_property_builder(id)?
                .is_nullable(self.nullable, source)?;
        }
        let complex_type = mb.model()[id].complex_type();
        for property in &self.properties {
            property.apply(mb, complex_type)?;
        }
        for nested in &self.complex_properties {
            nested.apply(mb, complex_type)?;
        }
        Ok(())
    }
}

impl IndexDeclaration {
    fn apply(&self, mb: &mut ModelBuilder, type_id: TypeId) -> Result<(), ModelError> {
        let source = source_or_explicit(self.source);
        let properties = resolve_properties(mb, type_id, &self.properties)?;
        let index = mb
            .type_builder(type_id)?
            .has_index(&properties, self.name.as_deref(), source)?;
        match index {
            Some(index) if self.unique.is_some() => {
                mb.index_builder(index)?.is_unique(self.unique, source)?;
            }
            Some(_) => {}
            None => skipped("index", &self.properties.join(","), source),
        }
        Ok(())
    }
}

impl RelationshipDeclaration {
    fn principal_key(
        &self,
        mb: &ModelBuilder,
        principal: TypeId,
    ) -> Result<Option<KeyId>, ModelError> {
        let Some(names) = &self.principal_key else {
            return Ok(None);
        };
        let properties = resolve_properties(mb, principal, names)?;
        mb.model()
            .find_key(principal, &properties)
            .map(Some)
            .ok_or_else(|| {
                ModelError::ElementNotFound(format!(
                    "key {{{}}} on '{}'",
                    names.join(", "),
                    self.principal
                ))
            })
    }

    fn apply(&self, mb: &mut ModelBuilder) -> Result<Option<ForeignKeyId>, ModelError> {
        let source = source_or_explicit(self.source);
        let dependent = resolve_type(mb, &self.dependent)?;
        let principal = resolve_type(mb, &self.principal)?;
        let properties = self
            .properties
            .as_ref()
            .map(|names| resolve_properties(mb, dependent, names))
            .transpose()?;
        let principal_key = self.principal_key(mb, principal)?;
        let delete_behavior = self
            .delete_behavior
            .as_deref()
            .map(str::parse::<DeleteBehavior>)
            .transpose()?;

        let fk = mb.type_builder(dependent)?.has_relationship(
            principal,
            properties.as_deref(),
            principal_key,
            source,
        )?;
        let Some(fk) = fk else {
            skipped("relationship", &format!("{} -> {}", self.dependent, self.principal), source);
            return Ok(None);
        };

        let mut builder = mb.foreign_key_builder(fk)?;
        if self.ownership.is_some() {
            builder.is_ownership(self.ownership, source)?;
        }
        if self.unique.is_some() {
            builder.is_unique(self.unique, source)?;
        }
        if self.required.is_some() {
            builder.is_required(self.required, source)?;
        }
        if delete_behavior.is_some() {
            builder.on_delete(delete_behavior, source)?;
        }
        if let Some(name) = &self.to_principal {
            builder.has_navigation(Some(name.as_str()), true, source)?;
        }
        if let Some(name) = &self.to_dependent {
            builder.has_navigation(Some(name.as_str()), false, source)?;
        }
        Ok(Some(fk))
    }
}

impl ManyToManyDeclaration {
    fn apply(&self, mb: &mut ModelBuilder) -> Result<(), ModelError> {
        let source = source_or_explicit(self.source);
        let left = resolve_type(mb, &self.left)?;
        let right = resolve_type(mb, &self.right)?;
        let pair = mb.has_many_to_many(
            left,
            &self.left_navigation,
            right,
            &self.right_navigation,
            source,
        )?;
        if pair.is_none() {
            skipped("many-to-many", &format!("{} <-> {}", self.left, self.right), source);
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const BLOG: &str = r#"
[[shapes]]
name = "Blog"
members = { Id = "int", Title = "string" }

[[shapes]]
name = "Post"
members = { Id = "int", BlogId = "int", Blog = "Blog" }

[[entities]]
name = "Blog"
key = ["Id"]
properties = [{ name = "Id" }, { name = "Title", max_length = 200 }]

[[entities]]
name = "Post"
key = ["Id"]
properties = [{ name = "Id" }, { name = "BlogId" }]

[[relationships]]
dependent = "Post"
principal = "Blog"
properties = ["BlogId"]
to_principal = "Blog"
delete_behavior = "Cascade"
"#;

    #[test]
    fn toml_declaration_builds_model() {
        let declaration = Declaration::from_toml_str(BLOG).expect("parse");
        let mb = declaration.build(ModelBuilder::new()).expect("apply");
        let model = mb.model();

        assert_eq!(model.entity_type_count(), 2);
        let blog = model.find_entity_type("Blog").expect("Blog");
        let title = model.find_property(blog, "Title").expect("Title");
        assert_eq!(model[title].max_length(), Some(200));

        let fk = model.foreign_keys().next().expect("fk");
        assert_eq!(fk.principal_type(), blog);
        assert_eq!(fk.configured_delete_behavior(), Some(DeleteBehavior::Cascade));
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let result = Declaration::from_toml_str("[[entities]]\nname = \"A\"\ncolour = 1\n");
        assert!(matches!(result, Err(CliError::Parse { .. })));
    }

    #[test]
    fn missing_property_fails_explicit_key() {
        let declaration =
            Declaration::from_toml_str("[[entities]]\nname = \"A\"\nkind = \"named\"\nkey = [\"Id\"]\n")
                .expect("parse");
        let result = declaration.build(ModelBuilder::new());
        assert!(matches!(result, Err(ModelError::ElementNotFound(_))));
    }

    #[test]
    fn json_declaration_with_convention_source() {
        let json = r#"{
            "entities": [
                { "name": "Tag", "kind": "named", "source": "convention",
                  "properties": [{ "name": "Id", "type": "long", "source": "convention" }],
                  "key": ["Id"] }
            ]
        }"#;
        let declaration = Declaration::from_json_str(json).expect("parse");
        let mb = declaration.build(ModelBuilder::new()).expect("apply");
        let tag = mb.model().find_entity_type("Tag").expect("Tag");
        assert!(mb.model().find_primary_key(tag).is_some());
        assert_eq!(
            mb.model()[tag].source(),
            ConfigurationSource::Convention
        );
    }

    #[test]
    fn ignored_entity_type_is_not_declared_by_convention() {
        let declaration = Declaration::from_toml_str(
            "ignore = [\"Audit\"]\n[[entities]]\nname = \"Audit\"\nkind = \"named\"\nsource = \"convention\"\n",
        )
        .expect("parse");
        let mb = declaration.build(ModelBuilder::new()).expect("apply");
        assert_eq!(mb.model().entity_type_count(), 0);
    }
}
