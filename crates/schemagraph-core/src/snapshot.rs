//! # Snapshots
//!
//! Detached copies of configuration that outlive the elements they were
//! taken from.
//!
//! Structural edits that have to rebuild part of the graph (retyping a
//! property, replacing an entity type, reparenting, inverting a
//! relationship) detach the affected configuration first and reattach it
//! afterwards. Snapshots remember members by name and types by id plus
//! name, so they survive their elements being removed and recreated.
//!
//! `attach` replays through the regular builders at the recorded sources.
//! Whatever no longer fits is dropped with a warning instead of failing the
//! surrounding operation; only a frozen model aborts it.

use crate::annotations::Annotations;
use crate::builder::{
    ComplexPropertyBuilder, ForeignKeyBuilder, IndexBuilder, ModelBuilder, NavigationBuilder,
    PropertyBuilder, SkipNavigationBuilder, TypeBuilder, validate_foreign_key,
};
use crate::model::Model;
use crate::model::elements::MemberFacets;
use crate::source::{ConfigurationSource, Sourced, max_source};
use crate::{
    ClrType, ComplexPropertyId, DeleteBehavior, ForeignKeyId, IndexId, KeyId, ModelError,
    NavigationId, PropertyId, ServicePropertyId, SkipNavigationId, TypeId, ValueGenerated,
};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// HELPERS
// =============================================================================

/// Downgrade a failed reattachment to a warning.
pub(crate) fn absorb<T>(result: Result<Option<T>, ModelError>) -> Result<Option<T>, ModelError> {
    match result {
        Err(ModelError::ReadOnlyModel) => Err(ModelError::ReadOnlyModel),
        Err(error) => {
            tracing::warn!(%error, "configuration dropped while reattaching");
            Ok(None)
        }
        ok => ok,
    }
}

fn replay(result: Result<bool, ModelError>) -> Result<(), ModelError> {
    absorb(result.map(Some)).map(|_| ())
}

fn recorded<T: Clone + PartialEq>(facet: &Sourced<T>) -> Option<(T, ConfigurationSource)> {
    facet.value().zip(facet.source())
}

/// A type remembered by id and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    id: TypeId,
    name: String,
}

impl TypeRef {
    pub(crate) fn of(model: &Model, id: TypeId) -> Self {
        Self {
            id,
            name: model[id].name.clone(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The recorded id while it still names the same type, otherwise the
    /// entity type now registered under the name.
    #[must_use]
    pub fn resolve(&self, model: &Model) -> Option<TypeId> {
        match model.get_type(self.id) {
            Some(ty) if ty.name == self.name => Some(self.id),
            _ => model.find_entity_type(&self.name),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// =============================================================================
// SCALAR MEMBERS
// =============================================================================

/// A scalar property and its facets.
#[derive(Debug, Clone)]
pub struct PropertySnapshot {
    declaring: TypeRef,
    name: String,
    clr_type: ClrType,
    type_source: Option<ConfigurationSource>,
    source: ConfigurationSource,
    is_nullable: Sourced<bool>,
    max_length: Sourced<usize>,
    is_concurrency_token: Sourced<bool>,
    value_generated: Sourced<ValueGenerated>,
    facets: MemberFacets,
    annotations: Annotations,
}

impl PropertySnapshot {
    fn record(model: &Model, id: PropertyId) -> Self {
        let p = &model[id];
        Self {
            declaring: TypeRef::of(model, p.declaring_type),
            name: p.name.clone(),
            clr_type: p.clr_type.clone(),
            type_source: p.type_source,
            source: p.source,
            is_nullable: p.is_nullable.clone(),
            max_length: p.max_length.clone(),
            is_concurrency_token: p.is_concurrency_token.clone(),
            value_generated: p.value_generated.clone(),
            facets: p.facets.clone(),
            annotations: p.annotations.clone(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reattach onto the recorded declaring type.
    pub fn attach(&self, mb: &mut ModelBuilder) -> Result<Option<PropertyId>, ModelError> {
        let Some(type_id) = self.declaring.resolve(&mb.model) else {
            tracing::warn!(
                entity_type = %self.declaring,
                property = %self.name,
                "declaring type is gone"
            );
            return Ok(None);
        };
        self.attach_to(mb, type_id)
    }

    /// Reattach onto `type_id`. A visible property of the same name absorbs
    /// the recorded facets instead of a new one being created.
    pub(crate) fn attach_to(
        &self,
        mb: &mut ModelBuilder,
        type_id: TypeId,
    ) -> Result<Option<PropertyId>, ModelError> {
        mb.model.ensure_mutable()?;
        let id = match mb.model.find_property(type_id, &self.name) {
            Some(existing) => {
                let property = &mut mb.model[existing];
                property.source = self.source.max(Some(property.source));
                existing
            }
            None => {
                let created = TypeBuilder::new(&mut *mb, type_id).property(
                    &self.name,
                    Some(self.clr_type.clone()),
                    self.source,
                )?;
                let Some(created) = created else {
                    return Ok(None);
                };
                mb.model[created].type_source = self.type_source;
                created
            }
        };

        let mut builder = PropertyBuilder::new(&mut *mb, id);
        if let Some((nullable, source)) = recorded(&self.is_nullable) {
            replay(builder.is_nullable(Some(nullable), source))?;
        }
        if let Some((max_length, source)) = recorded(&self.max_length) {
            replay(builder.has_max_length(Some(max_length), source))?;
        }
        if let Some((token, source)) = recorded(&self.is_concurrency_token) {
            replay(builder.is_concurrency_token(Some(token), source))?;
        }
        if let Some((generated, source)) = recorded(&self.value_generated) {
            replay(builder.value_generated(Some(generated), source))?;
        }
        if let Some((field, source)) = recorded(&self.facets.field) {
            replay(builder.has_field(Some(&field), source))?;
        }
        if let Some((mode, source)) = recorded(&self.facets.access_mode) {
            replay(builder.use_access_mode(Some(mode), source))?;
        }
        mb.model[id].annotations.merge_from(&self.annotations);
        Ok(Some(id))
    }
}

/// A service property.
#[derive(Debug, Clone)]
pub struct ServicePropertySnapshot {
    name: String,
    clr_type: ClrType,
    source: ConfigurationSource,
    facets: MemberFacets,
    annotations: Annotations,
}

impl ServicePropertySnapshot {
    fn record(model: &Model, id: ServicePropertyId) -> Self {
        let service = &model[id];
        Self {
            name: service.name.clone(),
            clr_type: service.clr_type.clone(),
            source: service.source,
            facets: service.facets.clone(),
            annotations: service.annotations.clone(),
        }
    }

    fn attach_to(
        &self,
        mb: &mut ModelBuilder,
        type_id: TypeId,
    ) -> Result<Option<ServicePropertyId>, ModelError> {
        let id = TypeBuilder::new(&mut *mb, type_id).has_service_property(
            &self.name,
            self.clr_type.clone(),
            self.source,
        )?;
        if let Some(id) = id {
            let service = &mut mb.model[id];
            if let Some((mode, source)) = recorded(&self.facets.access_mode) {
                service.facets.access_mode.set(Some(mode), source);
            }
            if let Some((field, source)) = recorded(&self.facets.field) {
                service.facets.field.set(Some(field), source);
            }
            service.annotations.merge_from(&self.annotations);
        }
        Ok(id)
    }
}

/// A complex property, its facets and everything declared on its complex
/// type.
#[derive(Debug, Clone)]
pub struct ComplexPropertySnapshot {
    name: String,
    clr_type: ClrType,
    is_collection: bool,
    source: ConfigurationSource,
    is_nullable: Sourced<bool>,
    facets: MemberFacets,
    annotations: Annotations,
    members: MembersSnapshot,
}

impl ComplexPropertySnapshot {
    fn record(model: &Model, id: ComplexPropertyId) -> Self {
        let cp = &model[id];
        Self {
            name: cp.name.clone(),
            clr_type: cp.clr_type.clone(),
            is_collection: cp.is_collection,
            source: cp.source,
            is_nullable: cp.is_nullable.clone(),
            facets: cp.facets.clone(),
            annotations: cp.annotations.clone(),
            members: MembersSnapshot::record(model, cp.complex_type),
        }
    }

    /// Record the complex property, then remove it with its complex type.
    pub(crate) fn detach(mb: &mut ModelBuilder, id: ComplexPropertyId) -> Self {
        let snapshot = Self::record(&mb.model, id);
        mb.remove_complex_property_raw(id);
        snapshot
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recreate the complex property on `type_id` and reattach its members.
    pub fn attach(
        &self,
        mb: &mut ModelBuilder,
        type_id: TypeId,
    ) -> Result<Option<ComplexPropertyId>, ModelError> {
        let created = TypeBuilder::new(&mut *mb, type_id).complex_property(
            &self.name,
            Some(self.clr_type.clone()),
            Some(self.is_collection),
            self.source,
        )?;
        let Some(id) = created else {
            return Ok(None);
        };
        let mut builder = ComplexPropertyBuilder::new(&mut *mb, id);
        if let Some((nullable, source)) = recorded(&self.is_nullable) {
            replay(builder.is_nullable(Some(nullable), source))?;
        }
        if let Some((field, source)) = recorded(&self.facets.field) {
            replay(builder.has_field(Some(&field), source))?;
        }
        if let Some((mode, source)) = recorded(&self.facets.access_mode) {
            replay(builder.use_access_mode(Some(mode), source))?;
        }
        mb.model[id].annotations.merge_from(&self.annotations);
        let complex_type = mb.model[id].complex_type;
        self.attach_members(mb, complex_type)?;
        Ok(Some(id))
    }

    /// Reattach only the recorded members onto an existing complex type.
    pub fn attach_members(
        &self,
        mb: &mut ModelBuilder,
        complex_type: TypeId,
    ) -> Result<(), ModelError> {
        self.members.attach(mb, complex_type)
    }
}

/// The members a type declares that do not involve other types.
#[derive(Debug, Clone, Default)]
pub struct MembersSnapshot {
    properties: Vec<PropertySnapshot>,
    complex_properties: Vec<ComplexPropertySnapshot>,
    service_properties: Vec<ServicePropertySnapshot>,
    ignored: Vec<(String, ConfigurationSource)>,
}

impl MembersSnapshot {
    fn record(model: &Model, type_id: TypeId) -> Self {
        let ty = &model[type_id];
        Self {
            properties: ty
                .properties
                .values()
                .map(|p| PropertySnapshot::record(model, *p))
                .collect(),
            complex_properties: ty
                .complex_properties
                .values()
                .map(|cp| ComplexPropertySnapshot::record(model, *cp))
                .collect(),
            service_properties: ty
                .service_properties
                .values()
                .map(|sp| ServicePropertySnapshot::record(model, *sp))
                .collect(),
            ignored: ty
                .ignored
                .iter()
                .map(|(name, source)| (name.clone(), *source))
                .collect(),
        }
    }

    /// Number of recorded members, ignored names excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len() + self.complex_properties.len() + self.service_properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn attach(&self, mb: &mut ModelBuilder, type_id: TypeId) -> Result<(), ModelError> {
        for (name, source) in &self.ignored {
            replay(TypeBuilder::new(&mut *mb, type_id).ignore(name, *source))?;
        }
        for property in &self.properties {
            absorb(property.attach_to(mb, type_id))?;
        }
        for complex in &self.complex_properties {
            absorb(complex.attach(mb, type_id))?;
        }
        for service in &self.service_properties {
            absorb(service.attach_to(mb, type_id))?;
        }
        Ok(())
    }
}

// =============================================================================
// KEYS & INDEXES
// =============================================================================

/// A key, remembered by its property names.
#[derive(Debug, Clone)]
pub struct KeySnapshot {
    declaring: TypeRef,
    properties: Vec<String>,
    source: ConfigurationSource,
    primary: Option<ConfigurationSource>,
    annotations: Annotations,
}

impl KeySnapshot {
    fn record(model: &Model, id: KeyId) -> Self {
        let key = &model[id];
        let ty = &model[key.declaring_type];
        Self {
            declaring: TypeRef::of(model, key.declaring_type),
            properties: model.property_names(&key.properties),
            source: key.source,
            primary: ty
                .primary_key
                .source()
                .filter(|_| ty.primary_key.value() == Some(id)),
            annotations: key.annotations.clone(),
        }
    }

    pub fn attach(&self, mb: &mut ModelBuilder) -> Result<Option<KeyId>, ModelError> {
        let Some(type_id) = self.declaring.resolve(&mb.model) else {
            return Ok(None);
        };
        let Some(properties) = mb.model.resolve_properties(type_id, &self.properties) else {
            tracing::warn!(
                entity_type = %self.declaring,
                properties = ?self.properties,
                "key properties are gone"
            );
            return Ok(None);
        };
        let mut builder = TypeBuilder::new(&mut *mb, type_id);
        let Some(key) = builder.has_key(&properties, self.source)? else {
            return Ok(None);
        };
        if let Some(source) = self.primary {
            builder.primary_key(&properties, source)?;
        }
        mb.model[key].annotations.merge_from(&self.annotations);
        Ok(Some(key))
    }
}

/// An index, remembered by its property names.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    declaring: TypeRef,
    properties: Vec<String>,
    name: Option<String>,
    source: ConfigurationSource,
    is_unique: Sourced<bool>,
    annotations: Annotations,
}

impl IndexSnapshot {
    fn record(model: &Model, id: IndexId) -> Self {
        let index = &model[id];
        Self {
            declaring: TypeRef::of(model, index.declaring_type),
            properties: model.property_names(&index.properties),
            name: index.name.clone(),
            source: index.source,
            is_unique: index.is_unique.clone(),
            annotations: index.annotations.clone(),
        }
    }

    pub(crate) fn detach(mb: &mut ModelBuilder, id: IndexId) -> Self {
        let snapshot = Self::record(&mb.model, id);
        mb.remove_index_raw(id);
        snapshot
    }

    pub fn attach(&self, mb: &mut ModelBuilder) -> Result<Option<IndexId>, ModelError> {
        let Some(type_id) = self.declaring.resolve(&mb.model) else {
            return Ok(None);
        };
        let Some(properties) = mb.model.resolve_properties(type_id, &self.properties) else {
            tracing::warn!(
                entity_type = %self.declaring,
                properties = ?self.properties,
                "index properties are gone"
            );
            return Ok(None);
        };
        let created = TypeBuilder::new(&mut *mb, type_id).has_index(
            &properties,
            self.name.as_deref(),
            self.source,
        )?;
        let Some(index) = created else {
            return Ok(None);
        };
        if let Some((unique, source)) = recorded(&self.is_unique) {
            replay(IndexBuilder::new(&mut *mb, index).is_unique(Some(unique), source))?;
        }
        mb.model[index].annotations.merge_from(&self.annotations);
        Ok(Some(index))
    }
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct NavigationSnapshot {
    name: String,
    is_eager_loaded: Sourced<bool>,
    lazy_loading_enabled: Sourced<bool>,
    facets: MemberFacets,
    annotations: Annotations,
}

impl NavigationSnapshot {
    fn record(model: &Model, id: NavigationId) -> Self {
        let navigation = &model[id];
        Self {
            name: navigation.name.clone(),
            is_eager_loaded: navigation.is_eager_loaded.clone(),
            lazy_loading_enabled: navigation.lazy_loading_enabled.clone(),
            facets: navigation.facets.clone(),
            annotations: navigation.annotations.clone(),
        }
    }

    fn apply(&self, mb: &mut ModelBuilder, id: NavigationId) -> Result<(), ModelError> {
        let mut builder = NavigationBuilder::new(&mut *mb, id);
        if let Some((eager, source)) = recorded(&self.is_eager_loaded) {
            replay(builder.auto_include(Some(eager), source))?;
        }
        if let Some((lazy, source)) = recorded(&self.lazy_loading_enabled) {
            replay(builder.enable_lazy_loading(Some(lazy), source))?;
        }
        if let Some((field, source)) = recorded(&self.facets.field) {
            replay(builder.has_field(Some(&field), source))?;
        }
        if let Some((mode, source)) = recorded(&self.facets.access_mode) {
            replay(builder.use_access_mode(Some(mode), source))?;
        }
        mb.model[id].annotations.merge_from(&self.annotations);
        Ok(())
    }
}

/// A foreign key with its navigations, facets and the skip navigations
/// that used it as their join FK.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipSnapshot {
    pub(crate) dependent_type: TypeRef,
    pub(crate) principal_type: TypeRef,
    properties: Vec<String>,
    principal_key: Vec<String>,
    source: ConfigurationSource,
    properties_source: Option<ConfigurationSource>,
    principal_key_source: Option<ConfigurationSource>,
    principal_end_source: Option<ConfigurationSource>,
    is_unique: Sourced<bool>,
    is_required: Sourced<bool>,
    is_required_dependent: Sourced<bool>,
    delete_behavior: Sourced<DeleteBehavior>,
    is_ownership: Sourced<bool>,
    to_principal: Option<NavigationSnapshot>,
    to_principal_source: Option<ConfigurationSource>,
    to_dependent: Option<NavigationSnapshot>,
    to_dependent_source: Option<ConfigurationSource>,
    skip_navigations: Vec<(TypeRef, String, Option<ConfigurationSource>)>,
    annotations: Annotations,
}

impl RelationshipSnapshot {
    fn record(model: &Model, id: ForeignKeyId) -> Self {
        let fk = &model[id];
        Self {
            dependent_type: TypeRef::of(model, fk.declaring_type),
            principal_type: TypeRef::of(model, fk.principal_type),
            properties: model.property_names(&fk.properties),
            principal_key: model.property_names(&model[fk.principal_key].properties),
            source: fk.source,
            properties_source: fk.properties_source,
            principal_key_source: fk.principal_key_source,
            principal_end_source: fk.principal_end_source,
            is_unique: fk.is_unique.clone(),
            is_required: fk.is_required.clone(),
            is_required_dependent: fk.is_required_dependent.clone(),
            delete_behavior: fk.delete_behavior.clone(),
            is_ownership: fk.is_ownership.clone(),
            to_principal: fk
                .dependent_to_principal
                .map(|n| NavigationSnapshot::record(model, n)),
            to_principal_source: fk.dependent_to_principal_source,
            to_dependent: fk
                .principal_to_dependent
                .map(|n| NavigationSnapshot::record(model, n)),
            to_dependent_source: fk.principal_to_dependent_source,
            skip_navigations: fk
                .referencing_skip_navigations
                .iter()
                .map(|s| {
                    let skip = &model[*s];
                    (
                        TypeRef::of(model, skip.declaring_type),
                        skip.name.clone(),
                        skip.foreign_key_source,
                    )
                })
                .collect(),
            annotations: fk.annotations.clone(),
        }
    }

    /// Record the relationship, then remove the FK and its navigations.
    pub(crate) fn detach(mb: &mut ModelBuilder, id: ForeignKeyId) -> Self {
        let snapshot = Self::record(&mb.model, id);
        mb.remove_foreign_key_raw(id);
        snapshot
    }

    /// Name of the dependent type.
    #[must_use]
    pub fn dependent_type(&self) -> &str {
        self.dependent_type.name()
    }

    /// Name of the principal type.
    #[must_use]
    pub fn principal_type(&self) -> &str {
        self.principal_type.name()
    }

    /// Names of the dependent properties at detach time.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// The same relationship seen from the other end: properties and
    /// principal key are re-derived, navigations swap sides and facets tied
    /// to the dependent are dropped.
    #[must_use]
    pub fn inverted(&self, source: ConfigurationSource) -> Self {
        Self {
            dependent_type: self.principal_type.clone(),
            principal_type: self.dependent_type.clone(),
            properties: Vec::new(),
            principal_key: Vec::new(),
            source: self.source,
            properties_source: None,
            principal_key_source: None,
            principal_end_source: Some(source),
            is_unique: self.is_unique.clone(),
            is_required: Sourced::default(),
            is_required_dependent: Sourced::default(),
            delete_behavior: Sourced::default(),
            is_ownership: Sourced::default(),
            to_principal: self.to_dependent.clone(),
            to_principal_source: self.to_dependent_source,
            to_dependent: self.to_principal.clone(),
            to_dependent_source: self.to_principal_source,
            skip_navigations: Vec::new(),
            annotations: self.annotations.clone(),
        }
    }

    /// Recreate the relationship, or merge into an equivalent one that
    /// already exists.
    ///
    /// Recorded properties and principal key are reused when they still
    /// resolve and fit; otherwise the principal's primary key and
    /// synthesized properties take their place.
    pub fn attach(&self, mb: &mut ModelBuilder) -> Result<Option<ForeignKeyId>, ModelError> {
        mb.model.ensure_mutable()?;
        let model = &mb.model;
        let (Some(dependent), Some(principal)) = (
            self.dependent_type.resolve(model),
            self.principal_type.resolve(model),
        ) else {
            tracing::warn!(
                dependent = %self.dependent_type,
                principal = %self.principal_type,
                "relationship end is gone"
            );
            return Ok(None);
        };

        let key = self
            .principal_key_source
            .and_then(|_| model.resolve_properties(principal, &self.principal_key))
            .and_then(|properties| model.find_key(principal, &properties));
        let target_key = key.or_else(|| model.find_primary_key(principal));
        let properties = model
            .resolve_properties(dependent, &self.properties)
            .filter(|properties| {
                !properties.is_empty()
                    && target_key.is_none_or(|k| {
                        validate_foreign_key(model, dependent, properties, principal, k).is_ok()
                    })
            });
        let existing = match (&properties, target_key) {
            (Some(properties), Some(k)) => model
                .find_foreign_keys_in_hierarchy(dependent, properties, k)
                .into_iter()
                .find(|fk| model[*fk].principal_type == principal),
            _ => None,
        };

        let fk = match existing {
            Some(fk) => {
                let foreign_key = &mut mb.model[fk];
                foreign_key.source = self.source.max(Some(foreign_key.source));
                fk
            }
            None => {
                let created = TypeBuilder::new(&mut *mb, dependent).has_relationship(
                    principal,
                    properties.as_deref(),
                    key,
                    self.source,
                )?;
                let Some(fk) = created else {
                    return Ok(None);
                };
                let foreign_key = &mut mb.model[fk];
                foreign_key.properties_source = None;
                foreign_key.principal_key_source = None;
                foreign_key.principal_end_source = None;
                fk
            }
        };

        let foreign_key = &mut mb.model[fk];
        if properties.is_some() {
            foreign_key.properties_source =
                max_source(foreign_key.properties_source, self.properties_source);
        }
        if key.is_some() {
            foreign_key.principal_key_source =
                max_source(foreign_key.principal_key_source, self.principal_key_source);
        }
        foreign_key.principal_end_source =
            max_source(foreign_key.principal_end_source, self.principal_end_source);
        foreign_key.annotations.merge_from(&self.annotations);

        let mut builder = ForeignKeyBuilder::new(&mut *mb, fk);
        if let Some((unique, source)) = recorded(&self.is_unique) {
            replay(builder.is_unique(Some(unique), source))?;
        }
        if let Some((required, source)) = recorded(&self.is_required) {
            replay(builder.is_required(Some(required), source))?;
        }
        if let Some((required, source)) = recorded(&self.is_required_dependent) {
            replay(builder.is_required_dependent(Some(required), source))?;
        }
        if let Some((behavior, source)) = recorded(&self.delete_behavior) {
            replay(builder.on_delete(Some(behavior), source))?;
        }
        if let Some((ownership, source)) = recorded(&self.is_ownership) {
            replay(builder.is_ownership(Some(ownership), source))?;
        }

        self.attach_navigation(mb, fk, true)?;
        self.attach_navigation(mb, fk, false)?;

        for (declaring, name, source) in &self.skip_navigations {
            let Some(skip) = declaring
                .resolve(&mb.model)
                .and_then(|t| mb.model.find_skip_navigation(t, name))
            else {
                continue;
            };
            let source = source.unwrap_or(self.source);
            replay(SkipNavigationBuilder::new(&mut *mb, skip).has_foreign_key(Some(fk), source))?;
        }

        tracing::debug!(
            dependent = %self.dependent_type,
            principal = %self.principal_type,
            "relationship reattached"
        );
        Ok(Some(fk))
    }

    fn attach_navigation(
        &self,
        mb: &mut ModelBuilder,
        fk: ForeignKeyId,
        pointing_to_principal: bool,
    ) -> Result<(), ModelError> {
        let (navigation, slot_source) = if pointing_to_principal {
            (&self.to_principal, self.to_principal_source)
        } else {
            (&self.to_dependent, self.to_dependent_source)
        };
        let Some(slot_source) = slot_source else {
            return Ok(());
        };
        let Some(navigation) = navigation else {
            // An explicitly removed navigation keeps blocking weaker sources
            let foreign_key = &mut mb.model[fk];
            let slot = if pointing_to_principal {
                &mut foreign_key.dependent_to_principal_source
            } else {
                &mut foreign_key.principal_to_dependent_source
            };
            *slot = Some(slot_source.max(*slot));
            return Ok(());
        };

        let applied = absorb(
            ForeignKeyBuilder::new(&mut *mb, fk)
                .has_navigation(Some(&navigation.name), pointing_to_principal, slot_source)
                .map(Some),
        )?;
        if applied != Some(true) {
            return Ok(());
        }
        let foreign_key = &mb.model[fk];
        let id = if pointing_to_principal {
            foreign_key.dependent_to_principal
        } else {
            foreign_key.principal_to_dependent
        };
        if let Some(id) = id {
            navigation.apply(mb, id)?;
        }
        Ok(())
    }
}

/// The join FK of a skip navigation.
#[derive(Debug, Clone)]
struct JoinForeignKey {
    join: TypeRef,
    principal: TypeRef,
    properties: Vec<String>,
}

impl JoinForeignKey {
    fn resolve(&self, model: &Model) -> Option<ForeignKeyId> {
        let join = self.join.resolve(model)?;
        let principal = self.principal.resolve(model)?;
        model[join].foreign_keys.iter().copied().find(|fk| {
            let foreign_key = &model[*fk];
            foreign_key.principal_type == principal
                && model.property_names(&foreign_key.properties) == self.properties
        })
    }
}

/// A skip navigation with its join FK and inverse.
#[derive(Debug, Clone)]
pub struct SkipNavigationSnapshot {
    declaring: TypeRef,
    name: String,
    target: TypeRef,
    is_collection: bool,
    source: ConfigurationSource,
    foreign_key: Option<JoinForeignKey>,
    foreign_key_source: Option<ConfigurationSource>,
    inverse: Option<(TypeRef, String)>,
    inverse_source: Option<ConfigurationSource>,
    facets: MemberFacets,
    annotations: Annotations,
}

impl SkipNavigationSnapshot {
    fn record(model: &Model, id: SkipNavigationId) -> Self {
        let skip = &model[id];
        Self {
            declaring: TypeRef::of(model, skip.declaring_type),
            name: skip.name.clone(),
            target: TypeRef::of(model, skip.target_type),
            is_collection: skip.is_collection,
            source: skip.source,
            foreign_key: skip.foreign_key.map(|fk| {
                let foreign_key = &model[fk];
                JoinForeignKey {
                    join: TypeRef::of(model, foreign_key.declaring_type),
                    principal: TypeRef::of(model, foreign_key.principal_type),
                    properties: model.property_names(&foreign_key.properties),
                }
            }),
            foreign_key_source: skip.foreign_key_source,
            inverse: skip.inverse.map(|inverse| {
                let inverse = &model[inverse];
                (TypeRef::of(model, inverse.declaring_type), inverse.name.clone())
            }),
            inverse_source: skip.inverse_source,
            facets: skip.facets.clone(),
            annotations: skip.annotations.clone(),
        }
    }

    pub(crate) fn detach(mb: &mut ModelBuilder, id: SkipNavigationId) -> Self {
        let snapshot = Self::record(&mb.model, id);
        mb.remove_skip_navigation_raw(id);
        snapshot
    }

    /// Recreate the skip navigation; the join FK and the inverse are
    /// rebound when they exist again.
    pub fn attach(&self, mb: &mut ModelBuilder) -> Result<Option<SkipNavigationId>, ModelError> {
        let model = &mb.model;
        let (Some(declaring), Some(target)) =
            (self.declaring.resolve(model), self.target.resolve(model))
        else {
            return Ok(None);
        };
        let created = TypeBuilder::new(&mut *mb, declaring).has_skip_navigation(
            &self.name,
            target,
            Some(self.is_collection),
            self.source,
        )?;
        let Some(id) = created else {
            return Ok(None);
        };

        let fk = self.foreign_key.as_ref().and_then(|fk| fk.resolve(&mb.model));
        let inverse = self.inverse.as_ref().and_then(|(t, name)| {
            t.resolve(&mb.model)
                .and_then(|t| mb.model.find_skip_navigation(t, name))
        });
        let mut builder = SkipNavigationBuilder::new(&mut *mb, id);
        if let Some(fk) = fk {
            let source = self.foreign_key_source.unwrap_or(self.source);
            replay(builder.has_foreign_key(Some(fk), source))?;
        }
        if let Some(inverse) = inverse {
            let source = self.inverse_source.unwrap_or(self.source);
            replay(builder.has_inverse(Some(inverse), source))?;
        }
        if let Some((field, source)) = recorded(&self.facets.field) {
            replay(builder.has_field(Some(&field), source))?;
        }
        if let Some((mode, source)) = recorded(&self.facets.access_mode) {
            replay(builder.use_access_mode(Some(mode), source))?;
        }
        mb.model[id].annotations.merge_from(&self.annotations);
        Ok(Some(id))
    }
}

// =============================================================================
// AGGREGATES
// =============================================================================

/// A set of properties with every key, index and relationship using them.
#[derive(Debug, Clone, Default)]
pub struct PropertiesSnapshot {
    properties: Vec<PropertySnapshot>,
    keys: Vec<KeySnapshot>,
    indexes: Vec<IndexSnapshot>,
    relationships: Vec<RelationshipSnapshot>,
}

impl PropertiesSnapshot {
    /// Record and remove `properties` together with their dependents.
    pub(crate) fn detach(mb: &mut ModelBuilder, properties: &[PropertyId]) -> Self {
        let model = &mb.model;
        let mut keys = BTreeSet::new();
        let mut indexes = BTreeSet::new();
        let mut fks = BTreeSet::new();
        for property in properties {
            let p = &model[*property];
            fks.extend(p.foreign_keys.iter().copied());
            indexes.extend(p.indexes.iter().copied());
            for key in &p.keys {
                keys.insert(*key);
                fks.extend(model[*key].referencing_foreign_keys.iter().copied());
            }
        }
        let mut snapshot = Self {
            properties: properties
                .iter()
                .map(|p| PropertySnapshot::record(model, *p))
                .collect(),
            keys: keys.iter().map(|k| KeySnapshot::record(model, *k)).collect(),
            indexes: indexes
                .iter()
                .map(|i| IndexSnapshot::record(model, *i))
                .collect(),
            relationships: Vec::new(),
        };

        for fk in fks {
            if mb.model.get_foreign_key(fk).is_some() {
                snapshot.relationships.push(RelationshipSnapshot::detach(mb, fk));
            }
        }
        for key in keys {
            mb.remove_key_raw(key);
        }
        for index in indexes {
            mb.remove_index_raw(index);
        }
        for property in properties {
            mb.remove_property_raw(*property);
        }
        snapshot
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Reattach properties first, then keys, indexes and relationships.
    pub fn attach(&self, mb: &mut ModelBuilder) -> Result<(), ModelError> {
        for property in &self.properties {
            absorb(property.attach(mb))?;
        }
        for key in &self.keys {
            absorb(key.attach(mb))?;
        }
        for index in &self.indexes {
            absorb(index.attach(mb))?;
        }
        for relationship in &self.relationships {
            absorb(relationship.attach(mb))?;
        }
        Ok(())
    }
}

/// Everything configured on and around an entity type that is about to be
/// replaced.
#[derive(Debug, Clone)]
pub struct TypeSnapshot {
    name: String,
    is_keyless: Sourced<bool>,
    is_owned: Sourced<bool>,
    base_type: Option<(TypeRef, ConfigurationSource)>,
    derived_types: Vec<(TypeRef, Option<ConfigurationSource>)>,
    members: MembersSnapshot,
    keys: Vec<KeySnapshot>,
    indexes: Vec<IndexSnapshot>,
    relationships: Vec<RelationshipSnapshot>,
    skip_navigations: Vec<SkipNavigationSnapshot>,
    annotations: Annotations,
}

impl TypeSnapshot {
    /// Record the type, detach everything referencing it and remove it.
    pub(crate) fn detach(mb: &mut ModelBuilder, type_id: TypeId) -> Self {
        let model = &mb.model;
        let ty = &model[type_id];
        let mut snapshot = Self {
            name: ty.name.clone(),
            is_keyless: ty.is_keyless.clone(),
            is_owned: ty.is_owned.clone(),
            base_type: ty
                .base_type
                .map(|b| (TypeRef::of(model, b), ty.base_type_source.unwrap_or(ty.source))),
            derived_types: ty
                .derived_types
                .iter()
                .map(|d| (TypeRef::of(model, *d), model[*d].base_type_source))
                .collect(),
            members: MembersSnapshot::record(model, type_id),
            keys: ty.keys.iter().map(|k| KeySnapshot::record(model, *k)).collect(),
            indexes: ty
                .indexes
                .iter()
                .map(|i| IndexSnapshot::record(model, *i))
                .collect(),
            relationships: Vec::new(),
            skip_navigations: Vec::new(),
            annotations: ty.annotations.clone(),
        };

        let skip_navigations: Vec<SkipNavigationId> = model
            .skip_navigations
            .values()
            .filter(|s| s.declaring_type == type_id || s.target_type == type_id)
            .map(|s| s.id)
            .collect();
        let fks: BTreeSet<ForeignKeyId> = ty
            .foreign_keys
            .iter()
            .chain(&ty.referencing_foreign_keys)
            .copied()
            .collect();

        for skip in skip_navigations {
            if mb.model.get_skip_navigation(skip).is_some() {
                snapshot
                    .skip_navigations
                    .push(SkipNavigationSnapshot::detach(mb, skip));
            }
        }
        for fk in fks {
            if mb.model.get_foreign_key(fk).is_some() {
                snapshot.relationships.push(RelationshipSnapshot::detach(mb, fk));
            }
        }
        match mb.remove_type_cascade(type_id) {
            Ok(rest) => snapshot.relationships.extend(rest),
            Err(error) => {
                tracing::warn!(entity_type = %snapshot.name, %error, "type removal was incomplete");
            }
        }
        snapshot
    }

    /// Name of the recorded type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replay the recorded configuration onto the entity type now
    /// registered under the same name.
    pub fn attach(&self, mb: &mut ModelBuilder) -> Result<(), ModelError> {
        mb.model.ensure_mutable()?;
        let Some(type_id) = mb.model.find_entity_type(&self.name) else {
            tracing::warn!(entity_type = %self.name, "replacement type is missing");
            return Ok(());
        };
        {
            let ty = &mut mb.model[type_id];
            if let Some((owned, source)) = recorded(&self.is_owned) {
                ty.is_owned.set(Some(owned), source);
            }
            ty.annotations.merge_from(&self.annotations);
        }
        let mut builder = TypeBuilder::new(&mut *mb, type_id);
        if let Some((keyless, source)) = recorded(&self.is_keyless) {
            replay(builder.is_keyless(Some(keyless), source))?;
        }
        if let Some((base, source)) = &self.base_type
            && let Some(base) = base.resolve(builder.model())
        {
            replay(builder.has_base_type(Some(base), *source))?;
        }

        self.members.attach(mb, type_id)?;
        for key in &self.keys {
            absorb(key.attach(mb))?;
        }
        for index in &self.indexes {
            absorb(index.attach(mb))?;
        }
        for relationship in &self.relationships {
            absorb(relationship.attach(mb))?;
        }
        for skip in &self.skip_navigations {
            absorb(skip.attach(mb))?;
        }
        for (derived, source) in &self.derived_types {
            if let Some(derived) = derived.resolve(&mb.model) {
                let source = source.unwrap_or(ConfigurationSource::Convention);
                replay(TypeBuilder::new(&mut *mb, derived).has_base_type(Some(type_id), source))?;
            }
        }
        tracing::debug!(entity_type = %self.name, "entity type configuration reattached");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ConfigurationSource::{Convention, DataAnnotation, Explicit};
    use crate::{ClrShape, TypeIdentity};

    fn blog_and_post(mb: &mut ModelBuilder) -> (TypeId, TypeId, ForeignKeyId) {
        mb.register_shape(
            ClrShape::class("Blog")
                .with_property("Id", ClrType::Int32)
                .with_property("Posts", ClrType::collection_of(ClrType::class("Post"))),
        )
        .expect("shape");
        mb.register_shape(
            ClrShape::class("Post")
                .with_property("Id", ClrType::Int32)
                .with_property("BlogId", ClrType::Int32)
                .with_property("Blog", ClrType::class("Blog")),
        )
        .expect("shape");
        let blog = mb
            .entity(TypeIdentity::class("Blog"), Explicit, None)
            .expect("entity")
            .expect("created");
        let post = mb
            .entity(TypeIdentity::class("Post"), Explicit, None)
            .expect("entity")
            .expect("created");
        for type_id in [blog, post] {
            let mut builder = mb.type_builder(type_id).expect("builder");
            let id = builder
                .property("Id", None, Explicit)
                .expect("property")
                .expect("created");
            builder.primary_key(&[id], Explicit).expect("pk");
        }
        let blog_id = mb
            .type_builder(post)
            .expect("builder")
            .property("BlogId", None, Explicit)
            .expect("property")
            .expect("created");
        let fk = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, Some(&[blog_id]), None, Explicit)
            .expect("relationship")
            .expect("created");
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        builder.has_navigation(Some("Blog"), true, Explicit).expect("nav");
        builder.has_navigation(Some("Posts"), false, Convention).expect("nav");
        builder.on_delete(Some(DeleteBehavior::Restrict), DataAnnotation).expect("delete");
        (blog, post, fk)
    }

    #[test]
    fn relationship_round_trips_through_detach() {
        let mut mb = ModelBuilder::new();
        let (blog, post, fk) = blog_and_post(&mut mb);
        let snapshot = mb.batch(|mb| Ok(RelationshipSnapshot::detach(mb, fk))).expect("detach");
        assert!(mb.model().get_foreign_key(fk).is_none());
        assert!(mb.model().find_navigation(post, "Blog").is_none());
        assert_eq!(snapshot.dependent_type(), "Post");
        assert_eq!(snapshot.principal_type(), "Blog");

        let restored = mb
            .batch(|mb| snapshot.attach(mb))
            .expect("attach")
            .expect("restored");
        let model = mb.model();
        let foreign_key = &model[restored];
        assert_eq!(foreign_key.declaring_type(), post);
        assert_eq!(foreign_key.principal_type(), blog);
        assert_eq!(model.property_names(foreign_key.properties()), vec!["BlogId"]);
        assert_eq!(foreign_key.properties_source(), Some(Explicit));
        assert_eq!(foreign_key.configured_delete_behavior(), Some(DeleteBehavior::Restrict));
        assert!(model.find_navigation(post, "Blog").is_some());
        assert!(model.find_navigation(blog, "Posts").is_some());
    }

    #[test]
    fn attach_merges_into_equivalent_relationship() {
        let mut mb = ModelBuilder::new();
        let (_, post, fk) = blog_and_post(&mut mb);
        let snapshot = RelationshipSnapshot::record(mb.model(), fk);
        let merged = snapshot.attach(&mut mb).expect("attach");
        assert_eq!(merged, Some(fk));
        assert_eq!(mb.model()[post].foreign_keys().count(), 1);
    }

    #[test]
    fn attach_without_principal_is_dropped() {
        let mut mb = ModelBuilder::new();
        let (blog, _, fk) = blog_and_post(&mut mb);
        let snapshot = mb.batch(|mb| Ok(RelationshipSnapshot::detach(mb, fk))).expect("detach");
        mb.has_no_entity_type(blog, Explicit).expect("removed");
        assert_eq!(snapshot.attach(&mut mb).expect("absorbed"), None);
    }

    #[test]
    fn retyped_key_regenerates_dependent_properties() {
        let mut mb = ModelBuilder::new();
        let blog = mb
            .entity(TypeIdentity::named("Blog"), Explicit, None)
            .expect("entity")
            .expect("created");
        let post = mb
            .entity(TypeIdentity::named("Post"), Explicit, None)
            .expect("entity")
            .expect("created");
        let mut builder = mb.type_builder(blog).expect("builder");
        let id = builder
            .property("Id", Some(ClrType::Int32), Explicit)
            .expect("property")
            .expect("created");
        builder.primary_key(&[id], Explicit).expect("pk");
        mb.type_builder(post)
            .expect("builder")
            .has_relationship(blog, None, None, Convention)
            .expect("relationship")
            .expect("created");

        mb.type_builder(blog)
            .expect("builder")
            .property("Id", Some(ClrType::Guid), Explicit)
            .expect("retyped")
            .expect("created");

        let model = mb.model();
        let pk = model.find_primary_key(blog).expect("pk survives");
        assert_eq!(model.property_names(model[pk].properties()), vec!["Id"]);
        let fk = model
            .foreign_keys()
            .find(|fk| fk.declaring_type() == post)
            .expect("relationship survives");
        let property = &model[fk.properties()[0]];
        assert_eq!(property.clr_type().unwrap_nullable(), &ClrType::Guid);
    }

    #[test]
    fn absorb_keeps_read_only_failures() {
        assert_eq!(
            absorb::<()>(Err(ModelError::ReadOnlyModel)),
            Err(ModelError::ReadOnlyModel)
        );
        assert_eq!(
            absorb::<()>(Err(ModelError::InvalidName(String::new()))),
            Ok(None)
        );
    }

    #[test]
    fn type_ref_follows_replacement_by_name() {
        let mut mb = ModelBuilder::new();
        let blog = mb
            .entity(TypeIdentity::named("Blog"), Convention, None)
            .expect("entity")
            .expect("created");
        let reference = TypeRef::of(mb.model(), blog);
        let replacement = mb
            .entity(TypeIdentity::class("Blog"), Explicit, None)
            .expect("entity")
            .expect("replaced");
        assert_ne!(blog, replacement);
        assert_eq!(reference.resolve(mb.model()), Some(replacement));
    }
}
