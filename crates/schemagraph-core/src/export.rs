//! # Canonical Export
//!
//! A sorted, id-free read model of a schema graph, serialized as JSON.
//!
//! Arena ids depend on the order of edits, so the export names every
//! element by its type and member names instead. Two models built through
//! different edit sequences that end in the same configuration export to
//! identical bytes.

use crate::annotations::Annotations;
use crate::model::Model;
use crate::model::elements::{ComplexProperty, Property, PropertyBase, TypeBase};
use crate::source::ConfigurationSource;
use crate::{AccessMode, DeleteBehavior, ModelError, ValueGenerated};
use serde::{Deserialize, Serialize};

// =============================================================================
// FORMAT
// =============================================================================

/// Format tag written into every export.
pub const CANONICAL_FORMAT: &str = "schemagraph";

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Identifies the format and summarizes the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    pub format: String,
    pub version: u8,
    pub entity_type_count: usize,
    pub foreign_key_count: usize,
    /// Whether the model was frozen when exported.
    pub read_only: bool,
}

impl CanonicalHeader {
    /// Reject payloads written by something else or by a newer version.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.format != CANONICAL_FORMAT {
            return Err(ModelError::Serialization("Invalid file format".to_string()));
        }
        if self.version != CANONICAL_VERSION {
            return Err(ModelError::Serialization(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL ELEMENTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalProperty {
    pub name: String,
    pub clr_type: String,
    pub source: ConfigurationSource,
    pub is_shadow: bool,
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    pub is_concurrency_token: bool,
    pub value_generated: ValueGenerated,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<AccessMode>,
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl From<&Property> for CanonicalProperty {
    fn from(p: &Property) -> Self {
        Self {
            name: p.name.clone(),
            clr_type: p.clr_type.to_string(),
            source: p.source,
            is_shadow: p.is_shadow(),
            is_nullable: p.is_nullable(),
            max_length: p.max_length(),
            is_concurrency_token: p.is_concurrency_token(),
            value_generated: p.value_generated(),
            field: p.facets.field().map(str::to_string),
            access_mode: p.facets.access_mode(),
            annotations: p.annotations.clone(),
        }
    }
}

/// A complex property together with the members of its complex type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalComplexProperty {
    pub name: String,
    pub clr_type: String,
    pub source: ConfigurationSource,
    pub is_collection: bool,
    pub is_nullable: bool,
    pub properties: Vec<CanonicalProperty>,
    pub complex_properties: Vec<CanonicalComplexProperty>,
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl CanonicalComplexProperty {
    fn from_model(model: &Model, cp: &ComplexProperty) -> Self {
        let complex_type = &model[cp.complex_type];
        Self {
            name: cp.name.clone(),
            clr_type: cp.clr_type.to_string(),
            source: cp.source,
            is_collection: cp.is_collection,
            is_nullable: cp.is_nullable(),
            properties: declared_properties(model, complex_type),
            complex_properties: declared_complex_properties(model, complex_type),
            annotations: cp.annotations.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalServiceProperty {
    pub name: String,
    pub clr_type: String,
    pub source: ConfigurationSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalIndex {
    pub properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalNavigation {
    pub name: String,
    pub target: String,
    pub is_collection: bool,
    pub on_dependent: bool,
    pub is_eager_loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalSkipNavigation {
    pub name: String,
    pub target: String,
    pub is_collection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

/// An entity type with everything it declares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalEntityType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clr_type: Option<String>,
    pub is_shared: bool,
    pub source: ConfigurationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
    pub is_keyless: bool,
    pub is_owned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
    /// Alternate keys, sorted.
    pub keys: Vec<Vec<String>>,
    pub indexes: Vec<CanonicalIndex>,
    pub properties: Vec<CanonicalProperty>,
    pub complex_properties: Vec<CanonicalComplexProperty>,
    pub service_properties: Vec<CanonicalServiceProperty>,
    pub navigations: Vec<CanonicalNavigation>,
    pub skip_navigations: Vec<CanonicalSkipNavigation>,
    pub ignored: Vec<String>,
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalForeignKey {
    pub dependent: String,
    pub properties: Vec<String>,
    pub principal: String,
    pub principal_key: Vec<String>,
    pub source: ConfigurationSource,
    pub is_unique: bool,
    pub is_required: bool,
    pub is_required_dependent: bool,
    pub delete_behavior: DeleteBehavior,
    pub is_ownership: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_principal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_dependent: Option<String>,
}

// =============================================================================
// CANONICAL MODEL
// =============================================================================

/// The whole graph in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalModel {
    pub header: CanonicalHeader,
    /// Sorted by name.
    pub entity_types: Vec<CanonicalEntityType>,
    /// Sorted by (dependent, properties, principal, principal key).
    pub foreign_keys: Vec<CanonicalForeignKey>,
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

fn declared_properties(model: &Model, ty: &TypeBase) -> Vec<CanonicalProperty> {
    ty.properties
        .values()
        .map(|p| CanonicalProperty::from(&model[*p]))
        .collect()
}

fn declared_complex_properties(model: &Model, ty: &TypeBase) -> Vec<CanonicalComplexProperty> {
    ty.complex_properties
        .values()
        .map(|cp| CanonicalComplexProperty::from_model(model, &model[*cp]))
        .collect()
}

fn entity_type(model: &Model, ty: &TypeBase) -> CanonicalEntityType {
    let primary_key = ty.primary_key();
    let mut keys: Vec<Vec<String>> = ty
        .keys
        .iter()
        .filter(|k| Some(**k) != primary_key)
        .map(|k| model.property_names(&model[*k].properties))
        .collect();
    keys.sort();
    let mut indexes: Vec<CanonicalIndex> = ty
        .indexes
        .iter()
        .map(|i| {
            let index = &model[*i];
            CanonicalIndex {
                properties: model.property_names(&index.properties),
                name: index.name.clone(),
                is_unique: index.is_unique(),
            }
        })
        .collect();
    indexes.sort();

    CanonicalEntityType {
        name: ty.name.clone(),
        clr_type: ty.clr_type.as_ref().map(ToString::to_string),
        is_shared: ty.shared,
        source: ty.source,
        base_type: ty.base_type.map(|b| model[b].name.clone()),
        is_keyless: ty.is_keyless(),
        is_owned: ty.is_owned(),
        primary_key: primary_key.map(|k| model.property_names(&model[k].properties)),
        keys,
        indexes,
        properties: declared_properties(model, ty),
        complex_properties: declared_complex_properties(model, ty),
        service_properties: ty
            .service_properties
            .values()
            .map(|sp| {
                let service = &model[*sp];
                CanonicalServiceProperty {
                    name: service.name.clone(),
                    clr_type: service.clr_type.to_string(),
                    source: service.source,
                }
            })
            .collect(),
        navigations: ty
            .navigations
            .values()
            .map(|n| CanonicalNavigation {
                name: model[*n].name.clone(),
                target: model[model.navigation_target(*n)].name.clone(),
                is_collection: model.is_collection(*n),
                on_dependent: model.is_on_dependent(*n),
                is_eager_loaded: model[*n].is_eager_loaded(),
            })
            .collect(),
        skip_navigations: ty
            .skip_navigations
            .values()
            .map(|s| {
                let skip = &model[*s];
                CanonicalSkipNavigation {
                    name: skip.name.clone(),
                    target: model[skip.target_type].name.clone(),
                    is_collection: skip.is_collection,
                    join_type: model.join_entity_type(*s).map(|j| model[j].name.clone()),
                    inverse: skip.inverse.map(|i| model[i].name.clone()),
                }
            })
            .collect(),
        ignored: ty.ignored.keys().cloned().collect(),
        annotations: ty.annotations.clone(),
    }
}

/// Build the canonical form of `model`.
#[must_use]
pub fn canonical_model(model: &Model) -> CanonicalModel {
    // type_names is keyed by name, so entity types come out sorted
    let entity_types: Vec<CanonicalEntityType> = model
        .type_names
        .values()
        .map(|t| entity_type(model, &model[*t]))
        .collect();

    let mut foreign_keys: Vec<CanonicalForeignKey> = model
        .foreign_keys
        .values()
        .map(|fk| CanonicalForeignKey {
            dependent: model[fk.declaring_type].name.clone(),
            properties: model.property_names(&fk.properties),
            principal: model[fk.principal_type].name.clone(),
            principal_key: model.property_names(&model[fk.principal_key].properties),
            source: fk.source,
            is_unique: fk.is_unique(),
            is_required: model.is_required(fk.id),
            is_required_dependent: fk.is_required_dependent(),
            delete_behavior: model.delete_behavior(fk.id),
            is_ownership: fk.is_ownership(),
            to_principal: fk.dependent_to_principal.map(|n| model[n].name.clone()),
            to_dependent: fk.principal_to_dependent.map(|n| model[n].name.clone()),
        })
        .collect();
    foreign_keys.sort_by(|a, b| {
        (&a.dependent, &a.properties, &a.principal, &a.principal_key).cmp(&(
            &b.dependent,
            &b.properties,
            &b.principal,
            &b.principal_key,
        ))
    });

    CanonicalModel {
        header: CanonicalHeader {
            format: CANONICAL_FORMAT.to_string(),
            version: CANONICAL_VERSION,
            entity_type_count: entity_types.len(),
            foreign_key_count: foreign_keys.len(),
            read_only: model.is_read_only(),
        },
        entity_types,
        foreign_keys,
        annotations: model.annotations.clone(),
    }
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Serialize the canonical form of `model` as pretty-printed JSON.
///
/// # Errors
///
/// Returns `ModelError::Serialization` if serialization fails.
pub fn export_json(model: &Model) -> Result<String, ModelError> {
    let canonical = canonical_model(model);
    serde_json::to_string_pretty(&canonical)
        .map_err(|e| ModelError::Serialization(format!("Model: {e}")))
}

/// Parse and validate a previously exported canonical model.
///
/// # Errors
///
/// Returns `ModelError::Serialization` for malformed JSON, a foreign format
/// tag, an unsupported version or counts that disagree with the payload.
pub fn import_json(json: &str) -> Result<CanonicalModel, ModelError> {
    let canonical: CanonicalModel =
        serde_json::from_str(json).map_err(|e| ModelError::Serialization(format!("Model: {e}")))?;
    canonical.header.validate()?;
    if canonical.header.entity_type_count != canonical.entity_types.len()
        || canonical.header.foreign_key_count != canonical.foreign_keys.len()
    {
        return Err(ModelError::Serialization(
            "Header counts do not match payload".to_string(),
        ));
    }
    Ok(canonical)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;
    use crate::source::ConfigurationSource::{Convention, Explicit};
    use crate::{ClrShape, ClrType, TypeIdentity};

    fn blogging(declare_post_first: bool) -> ModelBuilder {
        let mut mb = ModelBuilder::new();
        mb.register_shape(
            ClrShape::class("Blog")
                .with_property("Id", ClrType::Int32)
                .with_property("Title", ClrType::String),
        )
        .expect("shape");
        mb.register_shape(
            ClrShape::class("Post")
                .with_property("Id", ClrType::Int32)
                .with_property("BlogId", ClrType::Int32)
                .with_property("Blog", ClrType::class("Blog")),
        )
        .expect("shape");
        let order = if declare_post_first {
            ["Post", "Blog"]
        } else {
            ["Blog", "Post"]
        };
        for name in order {
            let id = mb
                .entity(TypeIdentity::class(name), Explicit, None)
                .expect("entity")
                .expect("created");
            let mut builder = mb.type_builder(id).expect("builder");
            let key = builder
                .property("Id", None, Convention)
                .expect("property")
                .expect("created");
            builder.primary_key(&[key], Convention).expect("pk");
        }
        let blog = mb.model().find_entity_type("Blog").expect("blog");
        let post = mb.model().find_entity_type("Post").expect("post");
        let mut builder = mb.type_builder(post).expect("builder");
        let blog_id = builder
            .property("BlogId", None, Explicit)
            .expect("property")
            .expect("created");
        let fk = builder
            .has_relationship(blog, Some(&[blog_id]), None, Explicit)
            .expect("relationship")
            .expect("created");
        mb.foreign_key_builder(fk)
            .expect("builder")
            .has_navigation(Some("Blog"), true, Explicit)
            .expect("navigation");
        mb
    }

    #[test]
    fn export_is_independent_of_edit_order() {
        let left = export_json(blogging(false).model()).expect("export");
        let right = export_json(blogging(true).model()).expect("export");
        assert_eq!(left, right);
    }

    #[test]
    fn canonical_model_names_elements() {
        let mb = blogging(false);
        let canonical = canonical_model(mb.model());
        assert_eq!(canonical.header.entity_type_count, 2);
        assert_eq!(canonical.entity_types[0].name, "Blog");
        assert_eq!(canonical.entity_types[0].primary_key, Some(vec!["Id".to_string()]));
        let fk = &canonical.foreign_keys[0];
        assert_eq!(fk.dependent, "Post");
        assert_eq!(fk.properties, vec!["BlogId"]);
        assert_eq!(fk.to_principal.as_deref(), Some("Blog"));
        assert_eq!(fk.to_dependent, None);
    }

    #[test]
    fn import_round_trips_and_validates() {
        let json = export_json(blogging(false).model()).expect("export");
        let imported = import_json(&json).expect("import");
        assert_eq!(imported, canonical_model(blogging(false).model()));

        let tampered = json.replace("\"schemagraph\"", "\"other\"");
        assert!(matches!(
            import_json(&tampered),
            Err(ModelError::Serialization(_))
        ));
        assert!(matches!(
            import_json("not json"),
            Err(ModelError::Serialization(_))
        ));
    }

    #[test]
    fn frozen_model_is_flagged() {
        let mut mb = blogging(false);
        mb.freeze().expect("freeze");
        assert!(canonical_model(mb.model()).header.read_only);
    }
}
