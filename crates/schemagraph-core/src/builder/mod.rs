//! # Builders
//!
//! The only mutation surface of the schema graph.
//!
//! `ModelBuilder` owns the model, the registered conventions and the
//! delay-conventions counter. Per-element builders (`TypeBuilder`,
//! `PropertyBuilder`, `ForeignKeyBuilder`, ...) borrow it mutably for the
//! duration of a call chain and address their element by id.
//!
//! Every mutator `x(.., source)` has a side-effect-free `can_x(.., source)`
//! twin. Mutators return:
//! - `Ok(Some(id))` / `Ok(true)` when the change was applied
//! - `Ok(None)` / `Ok(false)` when a `Convention` or `DataAnnotation` change
//!   loses to existing configuration
//! - `Err(ModelError)` when an `Explicit` change conflicts

// =============================================================================
// SHARED BUILDER SURFACE
// =============================================================================

/// Annotation methods for a builder that exposes `annotations_mut`.
macro_rules! annotatable_builder {
    ($builder:ident) => {
        impl $builder<'_> {
            /// Set an annotation; lower sources cannot replace a different value.
            pub fn has_annotation(
                &mut self,
                name: &str,
                value: $crate::annotations::AnnotationValue,
                source: $crate::source::ConfigurationSource,
            ) -> Result<bool, $crate::ModelError> {
                self.mb.model.ensure_mutable()?;
                Ok(self.annotations_mut().set(name, value, source))
            }

            /// Remove an annotation if `source` overrides it.
            pub fn has_no_annotation(
                &mut self,
                name: &str,
                source: $crate::source::ConfigurationSource,
            ) -> Result<bool, $crate::ModelError> {
                self.mb.model.ensure_mutable()?;
                Ok(self.annotations_mut().remove(name, source).is_some())
            }
        }
    };
}

pub(crate) use annotatable_builder;

/// Backing field and access mode methods for a builder that exposes
/// `facets`, `facets_mut` and `facet_target`.
macro_rules! member_facets {
    ($builder:ident) => {
        impl $builder<'_> {
            /// Set or clear the backing field. The field must exist on the
            /// declaring CLR type with a compatible type.
            pub fn has_field(
                &mut self,
                field: Option<&str>,
                source: $crate::source::ConfigurationSource,
            ) -> Result<bool, $crate::ModelError> {
                self.mb.model.ensure_mutable()?;
                if let Some(field) = field {
                    let (type_id, member, clr_type) = self.facet_target();
                    if let Err(error) = $crate::builder::type_base::validate_backing_field(
                        &self.mb.model,
                        type_id,
                        &member,
                        clr_type.as_ref(),
                        field,
                    ) {
                        return source.refuse(|| error);
                    }
                }
                Ok(self
                    .facets_mut()
                    .field
                    .set(field.map(str::to_string), source))
            }

            #[must_use]
            pub fn can_set_field(
                &self,
                field: Option<&str>,
                source: $crate::source::ConfigurationSource,
            ) -> bool {
                if self.mb.model.is_read_only() {
                    return false;
                }
                let valid = field.is_none_or(|field| {
                    let (type_id, member, clr_type) = self.facet_target();
                    $crate::builder::type_base::validate_backing_field(
                        &self.mb.model,
                        type_id,
                        &member,
                        clr_type.as_ref(),
                        field,
                    )
                    .is_ok()
                });
                valid
                    && self
                        .facets()
                        .field
                        .can_set(field.map(str::to_string).as_ref(), source)
            }

            /// Set or clear the access mode.
            pub fn use_access_mode(
                &mut self,
                mode: Option<$crate::AccessMode>,
                source: $crate::source::ConfigurationSource,
            ) -> Result<bool, $crate::ModelError> {
                self.mb.model.ensure_mutable()?;
                Ok(self.facets_mut().access_mode.set(mode, source))
            }
        }
    };
}

pub(crate) use member_facets;

mod complex;
mod foreign_key;
mod hierarchy;
mod key;
mod navigation;
mod property;
mod type_base;

pub use complex::ComplexPropertyBuilder;
pub use foreign_key::ForeignKeyBuilder;
pub(crate) use foreign_key::validate_foreign_key;
pub use key::{IndexBuilder, KeyBuilder};
pub use navigation::{NavigationBuilder, SkipNavigationBuilder};
pub use property::PropertyBuilder;
pub use type_base::TypeBuilder;

use crate::annotations::{AnnotationValue, Annotations};
use crate::config::BuilderConfig;
use crate::conventions::{
    Convention, ConventionDispatcher, ForeignKeyIndexConvention, KeyDiscoveryConvention, ModelEvent,
};
use crate::model::Model;
use crate::model::elements::TypeKind;
use crate::model::members::MemberRef;
use crate::snapshot::{RelationshipSnapshot, TypeSnapshot};
use crate::source::ConfigurationSource;
use crate::{
    ClrShape, ClrType, ComplexPropertyId, ForeignKeyId, IndexId, KeyId, ModelError, NavigationId,
    PropertyId, ServicePropertyId, SkipNavigationId, TypeId, TypeIdentity,
};
use std::collections::BTreeSet;

// =============================================================================
// MODEL BUILDER
// =============================================================================

/// Outcome of resolving an `entity` request against the current model.
#[derive(Debug)]
enum EntityPlan {
    Reuse(TypeId),
    Create,
    Replace(TypeId),
    Reject(ModelError),
}

/// Builder over a whole model.
pub struct ModelBuilder {
    pub(crate) model: Model,
    dispatcher: ConventionDispatcher,
    conventions: Vec<Box<dyn Convention>>,
    config: BuilderConfig,
}

impl std::fmt::Debug for ModelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBuilder")
            .field("entity_types", &self.model.entity_type_count())
            .field("conventions", &self.conventions.len())
            .field("depth", &self.dispatcher.depth())
            .finish()
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    /// Create a builder over an empty model with default configuration and
    /// no conventions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: Model::new(),
            dispatcher: ConventionDispatcher::new(),
            conventions: Vec::new(),
            config: BuilderConfig::default(),
        }
    }

    /// Create a builder with a validated configuration.
    ///
    /// `standard_conventions` registers key discovery and FK indexing.
    pub fn with_config(config: BuilderConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let mut builder = Self::new();
        builder.model.max_chain = config.max_foreign_key_chain;
        if config.standard_conventions {
            builder.add_convention(Box::new(KeyDiscoveryConvention));
            builder.add_convention(Box::new(ForeignKeyIndexConvention));
        }
        builder.config = config;
        Ok(builder)
    }

    /// The model under construction.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Consume the builder, keeping the model.
    #[must_use]
    pub fn into_model(self) -> Model {
        self.model
    }

    #[must_use]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Register a convention. Conventions run in registration order.
    pub fn add_convention(&mut self, convention: Box<dyn Convention>) {
        tracing::debug!(convention = convention.name(), "convention registered");
        self.conventions.push(convention);
    }

    /// Register the CLR shape of a user type.
    pub fn register_shape(&mut self, shape: ClrShape) -> Result<(), ModelError> {
        self.model.ensure_mutable()?;
        self.model.shapes.insert(shape.name.clone(), shape);
        Ok(())
    }

    /// Mark the model read-only. Every later mutator fails with
    /// `ModelError::ReadOnlyModel`.
    pub fn freeze(&mut self) -> Result<&Model, ModelError> {
        if self.dispatcher.is_delayed() {
            return Err(ModelError::InvalidConfig(
                "the model cannot be frozen inside a batch".to_string(),
            ));
        }
        self.model.read_only = true;
        tracing::debug!(
            entity_types = self.model.entity_type_count(),
            elements = self.model.element_count(),
            "model frozen"
        );
        Ok(&self.model)
    }

    // =========================================================================
    // DELAY CONVENTIONS
    // =========================================================================

    /// Run `f` inside a delay-conventions scope.
    ///
    /// Scopes nest; queued events are delivered to the conventions only when
    /// the outermost scope closes.
    pub fn batch<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ModelError>,
    ) -> Result<T, ModelError> {
        self.delay_conventions();
        let result = f(self);
        self.resume_conventions(result)
    }

    /// Whether a delay-conventions scope is open.
    #[must_use]
    pub fn is_delayed(&self) -> bool {
        self.dispatcher.is_delayed()
    }

    pub(crate) fn delay_conventions(&mut self) {
        self.dispatcher.delay();
    }

    pub(crate) fn resume_conventions<T>(
        &mut self,
        result: Result<T, ModelError>,
    ) -> Result<T, ModelError> {
        if !self.dispatcher.resume() {
            return result;
        }
        let flushed = self.flush();
        let value = result?;
        flushed?;
        Ok(value)
    }

    pub(crate) fn notify(&mut self, event: ModelEvent) {
        tracing::trace!(?event, "queued");
        self.dispatcher.queue(event);
    }

    fn flush(&mut self) -> Result<(), ModelError> {
        if self.conventions.is_empty() {
            self.dispatcher.clear();
            return Ok(());
        }
        let mut conventions = std::mem::take(&mut self.conventions);
        // Edits made by conventions queue behind the current event
        self.dispatcher.delay();
        let result = self.dispatch_pending(&mut conventions);
        self.dispatcher.resume();
        conventions.append(&mut self.conventions);
        self.conventions = conventions;
        if result.is_err() {
            self.dispatcher.clear();
        }
        result
    }

    fn dispatch_pending(
        &mut self,
        conventions: &mut [Box<dyn Convention>],
    ) -> Result<(), ModelError> {
        while let Some(event) = self.dispatcher.next_event() {
            for convention in conventions.iter_mut() {
                if !event.is_live(&self.model) {
                    tracing::trace!(?event, "dropping stale event");
                    break;
                }
                tracing::debug!(convention = convention.name(), ?event, "dispatching");
                convention.apply(self, &event)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // ELEMENT ACCESS
    // =========================================================================

    /// Builder for an entity type or complex type.
    pub fn type_builder(&mut self, id: TypeId) -> Result<TypeBuilder<'_>, ModelError> {
        self.check_type(id)?;
        Ok(TypeBuilder::new(self, id))
    }

    /// Builder for the entity type named `name`.
    pub fn entity_builder(&mut self, name: &str) -> Result<TypeBuilder<'_>, ModelError> {
        let id = self
            .model
            .find_entity_type(name)
            .ok_or_else(|| ModelError::ElementNotFound(name.to_string()))?;
        Ok(TypeBuilder::new(self, id))
    }

    pub fn property_builder(&mut self, id: PropertyId) -> Result<PropertyBuilder<'_>, ModelError> {
        self.check_property(id)?;
        Ok(PropertyBuilder::new(self, id))
    }

    pub fn complex_property_builder(
        &mut self,
        id: ComplexPropertyId,
    ) -> Result<ComplexPropertyBuilder<'_>, ModelError> {
        if self.model.get_complex_property(id).is_none() {
            return Err(ModelError::ElementNotFound(id.to_string()));
        }
        Ok(ComplexPropertyBuilder::new(self, id))
    }

    pub fn key_builder(&mut self, id: KeyId) -> Result<KeyBuilder<'_>, ModelError> {
        self.check_key(id)?;
        Ok(KeyBuilder::new(self, id))
    }

    pub fn index_builder(&mut self, id: IndexId) -> Result<IndexBuilder<'_>, ModelError> {
        if self.model.get_index(id).is_none() {
            return Err(ModelError::ElementNotFound(id.to_string()));
        }
        Ok(IndexBuilder::new(self, id))
    }

    pub fn foreign_key_builder(
        &mut self,
        id: ForeignKeyId,
    ) -> Result<ForeignKeyBuilder<'_>, ModelError> {
        self.check_foreign_key(id)?;
        Ok(ForeignKeyBuilder::new(self, id))
    }

    pub fn navigation_builder(
        &mut self,
        id: NavigationId,
    ) -> Result<NavigationBuilder<'_>, ModelError> {
        if self.model.get_navigation(id).is_none() {
            return Err(ModelError::ElementNotFound(id.to_string()));
        }
        Ok(NavigationBuilder::new(self, id))
    }

    pub fn skip_navigation_builder(
        &mut self,
        id: SkipNavigationId,
    ) -> Result<SkipNavigationBuilder<'_>, ModelError> {
        self.check_skip_navigation(id)?;
        Ok(SkipNavigationBuilder::new(self, id))
    }

    pub(crate) fn check_type(&self, id: TypeId) -> Result<(), ModelError> {
        match self.model.get_type(id) {
            Some(_) => Ok(()),
            None => Err(ModelError::ElementNotFound(id.to_string())),
        }
    }

    pub(crate) fn check_entity_type(&self, id: TypeId) -> Result<(), ModelError> {
        match self.model.get_type(id) {
            Some(ty) if ty.is_entity_type() => Ok(()),
            Some(ty) => Err(ModelError::NotAnEntityType(ty.name.clone())),
            None => Err(ModelError::ElementNotFound(id.to_string())),
        }
    }

    pub(crate) fn check_property(&self, id: PropertyId) -> Result<(), ModelError> {
        match self.model.get_property(id) {
            Some(_) => Ok(()),
            None => Err(ModelError::ElementNotFound(id.to_string())),
        }
    }

    pub(crate) fn check_key(&self, id: KeyId) -> Result<(), ModelError> {
        match self.model.get_key(id) {
            Some(_) => Ok(()),
            None => Err(ModelError::ElementNotFound(id.to_string())),
        }
    }

    pub(crate) fn check_foreign_key(&self, id: ForeignKeyId) -> Result<(), ModelError> {
        match self.model.get_foreign_key(id) {
            Some(_) => Ok(()),
            None => Err(ModelError::ElementNotFound(id.to_string())),
        }
    }

    pub(crate) fn check_skip_navigation(&self, id: SkipNavigationId) -> Result<(), ModelError> {
        match self.model.get_skip_navigation(id) {
            Some(_) => Ok(()),
            None => Err(ModelError::ElementNotFound(id.to_string())),
        }
    }

    // =========================================================================
    // MODEL ANNOTATIONS
    // =========================================================================

    /// Set a model-level annotation.
    pub fn has_annotation(
        &mut self,
        name: &str,
        value: AnnotationValue,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.model.ensure_mutable()?;
        Ok(self.model.annotations.set(name, value, source))
    }

    /// Remove a model-level annotation.
    pub fn has_no_annotation(
        &mut self,
        name: &str,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.model.ensure_mutable()?;
        Ok(self.model.annotations.remove(name, source).is_some())
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.model.annotations
    }

    // =========================================================================
    // ENTITY TYPES
    // =========================================================================

    /// Find or create an entity type.
    ///
    /// Re-declaring a compatible type returns the same id and ratchets its
    /// source. A clashing type is replaced only when `source` strictly
    /// overrides it; its members and relationships are detached and
    /// reattached onto the replacement.
    pub fn entity(
        &mut self,
        identity: TypeIdentity,
        source: ConfigurationSource,
        should_be_owned: Option<bool>,
    ) -> Result<Option<TypeId>, ModelError> {
        self.model.ensure_mutable()?;
        match self.plan_entity(&identity, source, should_be_owned) {
            EntityPlan::Reject(error) => source.reject(|| error),
            EntityPlan::Reuse(id) => {
                let ty = &mut self.model[id];
                ty.source = source.max(Some(ty.source));
                if let Some(owned) = should_be_owned {
                    ty.is_owned.set(Some(owned), source);
                }
                if source.is_explicit() {
                    self.model.ignored_types.remove(&identity.name());
                }
                Ok(Some(id))
            }
            EntityPlan::Create => self.batch(|mb| {
                mb.create_entity(&identity, source, should_be_owned)
                    .map(Some)
            }),
            EntityPlan::Replace(existing) => self.batch(|mb| {
                tracing::debug!(
                    entity_type = %mb.model[existing].name,
                    %source,
                    "replacing clashing entity type"
                );
                let snapshot = TypeSnapshot::detach(mb, existing);
                let id = mb.create_entity(&identity, source, should_be_owned)?;
                snapshot.attach(mb)?;
                Ok(Some(id))
            }),
        }
    }

    /// Whether `entity` would succeed.
    #[must_use]
    pub fn can_add_entity(
        &self,
        identity: &TypeIdentity,
        source: ConfigurationSource,
        should_be_owned: Option<bool>,
    ) -> bool {
        !self.model.is_read_only()
            && !matches!(
                self.plan_entity(identity, source, should_be_owned),
                EntityPlan::Reject(_)
            )
    }

    fn plan_entity(
        &self,
        identity: &TypeIdentity,
        source: ConfigurationSource,
        should_be_owned: Option<bool>,
    ) -> EntityPlan {
        let name = identity.name();
        if name.trim().is_empty() {
            return EntityPlan::Reject(ModelError::InvalidName(name));
        }
        if let Some(clr_type) = identity.clr_type()
            && clr_type.shape_name().is_none()
            && *clr_type != ClrType::PropertyBag
        {
            return EntityPlan::Reject(ModelError::InvalidClrType(clr_type.to_string()));
        }

        // Ignored names need an explicit or strictly stronger source
        if let Some(ignored) = self.model.ignored_type_source(&name)
            && !source.is_explicit()
            && !source.overrides_strictly(Some(ignored))
        {
            return EntityPlan::Reject(ModelError::Ignored {
                name,
                owner: "the model".to_string(),
            });
        }

        if let Some(shape) = identity.clr_type().and_then(ClrType::shape_name)
            && let Some(registered) = self.model.complex_registration_source(shape)
            && !source.overrides_strictly(Some(registered))
        {
            return EntityPlan::Reject(ModelError::ClashingComplexType(name));
        }

        let Some(existing) = self.model.find_entity_type(&name) else {
            return EntityPlan::Create;
        };
        let ty = &self.model[existing];
        let same_identity =
            ty.shared == identity.is_shared() && ty.clr_type.as_ref() == identity.clr_type();
        let owned_compatible = should_be_owned.is_none_or(|owned| {
            owned == ty.is_owned() || source.overrides(ty.is_owned.source())
        });
        if same_identity && owned_compatible {
            return EntityPlan::Reuse(existing);
        }
        if source.overrides_strictly(Some(ty.source)) {
            return EntityPlan::Replace(existing);
        }
        if same_identity {
            EntityPlan::Reject(ModelError::ClashingOwnedEntityType(name))
        } else {
            EntityPlan::Reject(ModelError::ClashingSharedType(name))
        }
    }

    fn create_entity(
        &mut self,
        identity: &TypeIdentity,
        source: ConfigurationSource,
        should_be_owned: Option<bool>,
    ) -> Result<TypeId, ModelError> {
        let name = identity.name();
        self.model.ignored_types.remove(&name);

        // A complex type registration for the same CLR type loses
        if let Some(shape) = identity.clr_type().and_then(ClrType::shape_name)
            && self.model.complex_registrations.remove(shape).is_some()
        {
            let users: Vec<ComplexPropertyId> = self
                .model
                .complex_properties
                .values()
                .filter(|cp| {
                    let element = cp.clr_type.element_type().unwrap_or(&cp.clr_type);
                    element.shape_name() == Some(shape)
                })
                .map(|cp| cp.id)
                .collect();
            for cp in users {
                self.remove_complex_property_raw(cp);
            }
        }

        let id = self.model.add_type(
            name,
            identity.clr_type().cloned(),
            identity.is_shared(),
            TypeKind::Entity,
            source,
        );
        if let Some(owned) = should_be_owned {
            self.model[id].is_owned.set(Some(owned), source);
        }
        tracing::debug!(entity_type = %self.model[id].name, %source, "entity type added");
        self.notify(ModelEvent::EntityTypeAdded(id));
        Ok(id)
    }

    /// Ignore an entity type name, removing the type if it exists and
    /// `source` allows it.
    pub fn ignore(&mut self, name: &str, source: ConfigurationSource) -> Result<bool, ModelError> {
        self.model.ensure_mutable()?;
        if let Some(existing) = self.model.find_entity_type(name) {
            if !source.overrides(Some(self.model[existing].source)) {
                return source.refuse(|| ModelError::CannotRemove {
                    element: name.to_string(),
                });
            }
            self.batch(|mb| mb.remove_type_cascade(existing))?;
        }
        let ignored = source.max(self.model.ignored_types.get(name).copied());
        self.model.ignored_types.insert(name.to_string(), ignored);
        tracing::debug!(entity_type = name, %source, "entity type ignored");
        Ok(true)
    }

    /// Whether `name` is ignored at any source.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.model.ignored_types.contains_key(name)
    }

    /// Lift an ignore entry when `source` overrides it.
    pub fn has_no_ignore(
        &mut self,
        name: &str,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.model.ensure_mutable()?;
        match self.model.ignored_types.get(name) {
            None => Ok(true),
            Some(existing) if source.overrides(Some(*existing)) => {
                self.model.ignored_types.remove(name);
                Ok(true)
            }
            Some(_) => source.refuse(|| ModelError::CannotRemove {
                element: name.to_string(),
            }),
        }
    }

    /// Remove an entity type.
    ///
    /// Derived types are rehomed onto its base type. Types it owns are
    /// removed with it. Relationships where it is a non-owning principal are
    /// detached and returned so the caller can reattach them later.
    pub fn has_no_entity_type(
        &mut self,
        type_id: TypeId,
        source: ConfigurationSource,
    ) -> Result<Option<Vec<RelationshipSnapshot>>, ModelError> {
        self.model.ensure_mutable()?;
        self.check_entity_type(type_id)?;
        let ty = &self.model[type_id];
        if !source.overrides(Some(ty.source)) {
            let element = ty.name.clone();
            return source.reject(|| ModelError::CannotRemove { element });
        }
        self.batch(|mb| mb.remove_type_cascade(type_id)).map(Some)
    }

    /// Whether `has_no_entity_type` would succeed.
    #[must_use]
    pub fn can_remove_entity_type(&self, type_id: TypeId, source: ConfigurationSource) -> bool {
        !self.model.is_read_only()
            && self
                .model
                .get_type(type_id)
                .is_some_and(|ty| ty.is_entity_type() && source.overrides(Some(ty.source)))
    }

    // =========================================================================
    // CASCADING REMOVAL
    // =========================================================================

    pub(crate) fn remove_type_cascade(
        &mut self,
        type_id: TypeId,
    ) -> Result<Vec<RelationshipSnapshot>, ModelError> {
        let name = self.model[type_id].name.clone();
        let mut detached = Vec::new();

        let skip_navigations: Vec<SkipNavigationId> = self
            .model
            .skip_navigations
            .values()
            .filter(|s| s.declaring_type == type_id || s.target_type == type_id)
            .map(|s| s.id)
            .collect();
        for skip_navigation in skip_navigations {
            self.remove_skip_navigation_raw(skip_navigation);
        }

        let declared: Vec<ForeignKeyId> =
            self.model[type_id].foreign_keys.iter().copied().collect();
        for fk in declared {
            self.remove_foreign_key_raw(fk);
        }

        // Owned dependents go with their owner, other dependents are detached
        let referencing: Vec<ForeignKeyId> = self.model[type_id]
            .referencing_foreign_keys
            .iter()
            .copied()
            .collect();
        for fk in referencing {
            let Some(foreign_key) = self.model.get_foreign_key(fk) else {
                continue;
            };
            let dependent = foreign_key.declaring_type;
            if foreign_key.is_ownership() && dependent != type_id {
                if self.model.get_type(dependent).is_some() {
                    tracing::debug!(
                        owned_type = %self.model[dependent].name,
                        "removing owned type"
                    );
                    detached.extend(self.remove_type_cascade(dependent)?);
                }
            } else {
                detached.push(RelationshipSnapshot::detach(self, fk));
            }
        }

        // Keys of this type referenced through derived principals
        let keys: Vec<KeyId> = self.model[type_id].keys.iter().copied().collect();
        for key in keys {
            let fks: Vec<ForeignKeyId> = self.model[key]
                .referencing_foreign_keys
                .iter()
                .copied()
                .collect();
            for fk in fks {
                if self.model.get_foreign_key(fk).is_some() {
                    detached.push(RelationshipSnapshot::detach(self, fk));
                }
            }
        }

        // Rehome derived types; drop whatever used this type's properties
        let declared_properties: BTreeSet<PropertyId> =
            self.model[type_id].properties.values().copied().collect();
        let base = self.model[type_id].base_type;
        let base_source = self.model[type_id].base_type_source;
        let derived: Vec<TypeId> = self.model[type_id].derived_types.iter().copied().collect();
        for derived_type in derived {
            for t in self.model.derived_types_inclusive(derived_type) {
                let fks: Vec<ForeignKeyId> = self.model[t]
                    .foreign_keys
                    .iter()
                    .copied()
                    .filter(|fk| {
                        self.model[*fk]
                            .properties
                            .iter()
                            .any(|p| declared_properties.contains(p))
                    })
                    .collect();
                for fk in fks {
                    self.remove_foreign_key_raw(fk);
                }
                let indexes: Vec<IndexId> = self.model[t]
                    .indexes
                    .iter()
                    .copied()
                    .filter(|index| {
                        self.model[*index]
                            .properties
                            .iter()
                            .any(|p| declared_properties.contains(p))
                    })
                    .collect();
                for index in indexes {
                    self.remove_index_raw(index);
                }
            }
            self.model
                .set_base_type(derived_type, base, base.and(base_source));
            self.notify(ModelEvent::BaseTypeChanged(derived_type));
        }

        self.remove_declared_members_raw(type_id);
        self.model.remove_type(type_id);
        tracing::debug!(entity_type = %name, detached = detached.len(), "entity type removed");
        self.notify(ModelEvent::EntityTypeRemoved { name });
        Ok(detached)
    }

    pub(crate) fn remove_declared_members_raw(&mut self, type_id: TypeId) {
        let ty = &self.model[type_id];
        let keys: Vec<KeyId> = ty.keys.iter().copied().collect();
        let indexes: Vec<IndexId> = ty.indexes.iter().copied().collect();
        let navigations: Vec<NavigationId> = ty.navigations.values().copied().collect();
        let skip_navigations: Vec<SkipNavigationId> =
            ty.skip_navigations.values().copied().collect();
        let complex_properties: Vec<ComplexPropertyId> =
            ty.complex_properties.values().copied().collect();
        let service_properties: Vec<ServicePropertyId> =
            ty.service_properties.values().copied().collect();
        let properties: Vec<PropertyId> = ty.properties.values().copied().collect();

        for key in keys {
            self.remove_key_raw(key);
        }
        for index in indexes {
            self.remove_index_raw(index);
        }
        for navigation in navigations {
            self.remove_navigation_raw(navigation);
        }
        for skip_navigation in skip_navigations {
            self.remove_skip_navigation_raw(skip_navigation);
        }
        for cp in complex_properties {
            self.remove_complex_property_raw(cp);
        }
        for sp in service_properties {
            self.remove_service_property_raw(sp);
        }
        for property in properties {
            self.remove_property_raw(property);
        }
    }

    /// Remove a member of any kind together with everything depending on it.
    pub(crate) fn remove_member_raw(&mut self, member: MemberRef) {
        match member {
            MemberRef::Property(id) => self.remove_property_raw(id),
            MemberRef::ComplexProperty(id) => self.remove_complex_property_raw(id),
            MemberRef::ServiceProperty(id) => self.remove_service_property_raw(id),
            MemberRef::Navigation(id) => self.remove_navigation_raw(id),
            MemberRef::SkipNavigation(id) => self.remove_skip_navigation_raw(id),
        }
    }

    pub(crate) fn remove_property_raw(&mut self, property: PropertyId) {
        let Some(p) = self.model.get_property(property) else {
            return;
        };
        let fks: Vec<ForeignKeyId> = p.foreign_keys.iter().copied().collect();
        let keys: Vec<KeyId> = p.keys.iter().copied().collect();
        let indexes: Vec<IndexId> = p.indexes.iter().copied().collect();
        for fk in fks {
            self.remove_foreign_key_raw(fk);
        }
        for key in keys {
            self.remove_key_raw(key);
        }
        for index in indexes {
            self.remove_index_raw(index);
        }
        if let Some(removed) = self.model.remove_property(property) {
            tracing::debug!(property = %removed.name, "property removed");
            self.notify(ModelEvent::PropertyRemoved {
                type_id: removed.declaring_type,
                name: removed.name,
            });
        }
    }

    pub(crate) fn remove_complex_property_raw(&mut self, complex_property: ComplexPropertyId) {
        let Some(cp) = self.model.get_complex_property(complex_property) else {
            return;
        };
        let complex_type = cp.complex_type;
        self.remove_declared_members_raw(complex_type);
        let derived: Vec<TypeId> = self.model[complex_type].derived_types.iter().copied().collect();
        for derived_type in derived {
            self.model.set_base_type(derived_type, None, None);
        }
        if let Some(removed) = self.model.remove_complex_property(complex_property) {
            tracing::debug!(complex_property = %removed.name, "complex property removed");
            self.notify(ModelEvent::ComplexPropertyRemoved {
                type_id: removed.declaring_type,
                name: removed.name,
            });
        }
    }

    pub(crate) fn remove_service_property_raw(&mut self, service_property: ServicePropertyId) {
        self.model.remove_service_property(service_property);
    }

    pub(crate) fn remove_key_raw(&mut self, key: KeyId) {
        let Some(k) = self.model.get_key(key) else {
            return;
        };
        let fks: Vec<ForeignKeyId> = k.referencing_foreign_keys.iter().copied().collect();
        for fk in fks {
            self.remove_foreign_key_raw(fk);
        }
        let declaring = self.model[key].declaring_type;
        let properties = self.model.property_names(&self.model[key].properties);
        let was_primary = self.model[declaring].primary_key.value() == Some(key);
        self.model.remove_key(key);
        self.notify(ModelEvent::KeyRemoved {
            type_id: declaring,
            properties,
        });
        if was_primary {
            self.notify(ModelEvent::PrimaryKeyChanged(declaring));
        }
    }

    pub(crate) fn remove_index_raw(&mut self, index: IndexId) {
        let Some(i) = self.model.get_index(index) else {
            return;
        };
        let declaring = i.declaring_type;
        let properties = self.model.property_names(&i.properties);
        self.model.remove_index(index);
        self.notify(ModelEvent::IndexRemoved {
            type_id: declaring,
            properties,
        });
    }

    pub(crate) fn remove_foreign_key_raw(&mut self, fk: ForeignKeyId) {
        let Some(foreign_key) = self.model.get_foreign_key(fk) else {
            return;
        };
        let navigations: Vec<(TypeId, String)> = foreign_key
            .dependent_to_principal
            .into_iter()
            .chain(foreign_key.principal_to_dependent)
            .map(|n| (self.model[n].declaring_type, self.model[n].name.clone()))
            .collect();
        let (dependent, principal) = (foreign_key.declaring_type, foreign_key.principal_type);
        self.model.remove_foreign_key(fk);
        for (type_id, name) in navigations {
            self.notify(ModelEvent::NavigationRemoved { type_id, name });
        }
        tracing::debug!(foreign_key = %fk, "foreign key removed");
        self.notify(ModelEvent::ForeignKeyRemoved {
            dependent,
            principal,
        });
    }

    pub(crate) fn remove_navigation_raw(&mut self, navigation: NavigationId) {
        if let Some(removed) = self.model.remove_navigation(navigation) {
            self.notify(ModelEvent::NavigationRemoved {
                type_id: removed.declaring_type,
                name: removed.name,
            });
        }
    }

    pub(crate) fn remove_skip_navigation_raw(&mut self, skip_navigation: SkipNavigationId) {
        if let Some(removed) = self.model.remove_skip_navigation(skip_navigation) {
            self.notify(ModelEvent::SkipNavigationRemoved {
                type_id: removed.declaring_type,
                name: removed.name,
            });
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ConfigurationSource::{Convention, DataAnnotation, Explicit};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder(Rc<RefCell<Vec<ModelEvent>>>);

    impl crate::Convention for Recorder {
        fn name(&self) -> &str {
            "Recorder"
        }

        fn apply(&mut self, _: &mut ModelBuilder, event: &ModelEvent) -> Result<(), ModelError> {
            self.0.borrow_mut().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn entity_is_idempotent() {
        let mut mb = ModelBuilder::new();
        let first = mb
            .entity(TypeIdentity::class("Blog"), Convention, None)
            .expect("entity");
        let second = mb
            .entity(TypeIdentity::class("Blog"), DataAnnotation, None)
            .expect("entity");
        assert_eq!(first, second);
        let id = first.expect("created");
        assert_eq!(mb.model()[id].source(), DataAnnotation);
        assert_eq!(mb.model().entity_type_count(), 1);
    }

    #[test]
    fn ignored_type_needs_stronger_source() {
        let mut mb = ModelBuilder::new();
        assert!(mb.ignore("Blog", DataAnnotation).expect("ignore"));
        assert_eq!(
            mb.entity(TypeIdentity::class("Blog"), Convention, None)
                .expect("silent"),
            None
        );
        assert!(!mb.can_add_entity(&TypeIdentity::class("Blog"), DataAnnotation, None));
        assert!(mb
            .entity(TypeIdentity::class("Blog"), Explicit, None)
            .expect("explicit")
            .is_some());
        assert!(!mb.is_ignored("Blog"));
    }

    #[test]
    fn clashing_shared_type_is_an_explicit_error() {
        let mut mb = ModelBuilder::new();
        mb.entity(TypeIdentity::shared("BlogTag"), Explicit, None)
            .expect("shared");
        let result = mb.entity(TypeIdentity::class("BlogTag"), Explicit, None);
        assert!(matches!(result, Err(ModelError::ClashingSharedType(_))));
    }

    #[test]
    fn stronger_source_replaces_clashing_type() {
        let mut mb = ModelBuilder::new();
        let old = mb
            .entity(TypeIdentity::shared("Audit"), Convention, None)
            .expect("shared")
            .expect("created");
        mb.type_builder(old)
            .expect("builder")
            .property("When", Some(ClrType::DateTime), Convention)
            .expect("property");
        let new = mb
            .entity(TypeIdentity::class("Audit"), Explicit, None)
            .expect("replace")
            .expect("created");
        assert_ne!(old, new);
        assert!(!mb.model()[new].is_shared());
        assert!(mb.model().find_property(new, "When").is_some());
    }

    #[test]
    fn batch_defers_conventions_until_outermost_scope() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut mb = ModelBuilder::new();
        mb.add_convention(Box::new(Recorder(Rc::clone(&events))));
        mb.batch(|mb| {
            mb.entity(TypeIdentity::class("Blog"), Explicit, None)?;
            mb.batch(|mb| mb.entity(TypeIdentity::class("Post"), Explicit, None))?;
            assert!(events.borrow().is_empty());
            Ok(())
        })
        .expect("batch");
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn frozen_model_rejects_mutation() {
        let mut mb = ModelBuilder::new();
        mb.freeze().expect("freeze");
        assert_eq!(
            mb.entity(TypeIdentity::class("Blog"), Explicit, None),
            Err(ModelError::ReadOnlyModel)
        );
    }

    #[test]
    fn standard_conventions_from_config() {
        let config = BuilderConfig {
            standard_conventions: true,
            ..BuilderConfig::default()
        };
        let mut mb = ModelBuilder::with_config(config).expect("config");
        let blog = mb
            .entity(TypeIdentity::class("Blog"), Explicit, None)
            .expect("entity")
            .expect("created");
        mb.type_builder(blog)
            .expect("builder")
            .property("Id", Some(ClrType::Int32), Explicit)
            .expect("property");
        let key = mb.model()[blog].primary_key().expect("discovered key");
        assert_eq!(mb.model()[key].source(), Convention);
    }
}
