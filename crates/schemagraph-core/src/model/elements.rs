//! # Element Types
//!
//! The records stored in the model arena. Elements reference each other only
//! through ids; ownership is a tree (model -> types -> members, keys,
//! indexes, foreign keys) and every other link is a plain id lookup.
//!
//! Fields are crate-visible so the builders can mutate them; everything else
//! reads through the accessors.

use crate::annotations::Annotations;
use crate::model::members::MemberKind;
use crate::source::{ConfigurationSource, Sourced};
use crate::{
    AccessMode, ClrType, ComplexPropertyId, DeleteBehavior, ForeignKeyId, IndexId, KeyId,
    MemberIdentity, NavigationId, PropertyId, ServicePropertyId, SkipNavigationId, TypeId,
    ValueGenerated,
};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// PROPERTY BASE
// =============================================================================

/// Facets shared by every property-like member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFacets {
    pub(crate) field: Sourced<String>,
    pub(crate) access_mode: Sourced<AccessMode>,
}

impl MemberFacets {
    /// The configured backing field.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.get().map(String::as_str)
    }

    /// Source of the backing field.
    #[must_use]
    pub fn field_source(&self) -> Option<ConfigurationSource> {
        self.field.source()
    }

    /// The configured access mode.
    #[must_use]
    pub fn access_mode(&self) -> Option<AccessMode> {
        self.access_mode.value()
    }

    /// Source of the access mode.
    #[must_use]
    pub fn access_mode_source(&self) -> Option<ConfigurationSource> {
        self.access_mode.source()
    }
}

/// Common read surface of properties, complex properties, navigations,
/// skip navigations and service properties.
pub trait PropertyBase {
    /// Member name, unique in the declaring hierarchy.
    fn name(&self) -> &str;
    /// The type that exclusively owns this member.
    fn declaring_type(&self) -> TypeId;
    /// The CLR member backing this member.
    fn member(&self) -> &MemberIdentity;
    /// Backing field and access mode.
    fn facets(&self) -> &MemberFacets;
    /// Annotations.
    fn annotations(&self) -> &Annotations;
    /// Which kind of member this is.
    fn kind(&self) -> MemberKind;

    /// Whether the member has no CLR member.
    fn is_shadow(&self) -> bool {
        self.member().is_shadow()
    }
}

macro_rules! property_base {
    ($ty:ty, $kind:expr) => {
        impl PropertyBase for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn declaring_type(&self) -> TypeId {
                self.declaring_type
            }

            fn member(&self) -> &MemberIdentity {
                &self.member
            }

            fn facets(&self) -> &MemberFacets {
                &self.facets
            }

            fn annotations(&self) -> &Annotations {
                &self.annotations
            }

            fn kind(&self) -> MemberKind {
                $kind
            }
        }
    };
}

// =============================================================================
// TYPE BASE
// =============================================================================

/// Whether a structural type is an entity type or a complex type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKind {
    Entity,
    Complex,
}

/// Common representation of entity types and complex types.
#[derive(Debug, Clone)]
pub struct TypeBase {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) clr_type: Option<ClrType>,
    pub(crate) shared: bool,
    pub(crate) kind: TypeKind,
    pub(crate) source: ConfigurationSource,
    pub(crate) base_type: Option<TypeId>,
    pub(crate) base_type_source: Option<ConfigurationSource>,
    pub(crate) derived_types: BTreeSet<TypeId>,
    pub(crate) properties: BTreeMap<String, PropertyId>,
    pub(crate) complex_properties: BTreeMap<String, ComplexPropertyId>,
    pub(crate) service_properties: BTreeMap<String, ServicePropertyId>,
    pub(crate) navigations: BTreeMap<String, NavigationId>,
    pub(crate) skip_navigations: BTreeMap<String, SkipNavigationId>,
    pub(crate) keys: BTreeSet<KeyId>,
    pub(crate) primary_key: Sourced<KeyId>,
    pub(crate) indexes: BTreeSet<IndexId>,
    pub(crate) foreign_keys: BTreeSet<ForeignKeyId>,
    pub(crate) referencing_foreign_keys: BTreeSet<ForeignKeyId>,
    pub(crate) ignored: BTreeMap<String, ConfigurationSource>,
    pub(crate) is_keyless: Sourced<bool>,
    pub(crate) is_owned: Sourced<bool>,
    pub(crate) defining_property: Option<ComplexPropertyId>,
    pub(crate) annotations: Annotations,
}

impl TypeBase {
    pub(crate) fn new(
        id: TypeId,
        name: String,
        clr_type: Option<ClrType>,
        shared: bool,
        kind: TypeKind,
        source: ConfigurationSource,
    ) -> Self {
        Self {
            id,
            name,
            clr_type,
            shared,
            kind,
            source,
            base_type: None,
            base_type_source: None,
            derived_types: BTreeSet::new(),
            properties: BTreeMap::new(),
            complex_properties: BTreeMap::new(),
            service_properties: BTreeMap::new(),
            navigations: BTreeMap::new(),
            skip_navigations: BTreeMap::new(),
            keys: BTreeSet::new(),
            primary_key: Sourced::default(),
            indexes: BTreeSet::new(),
            foreign_keys: BTreeSet::new(),
            referencing_foreign_keys: BTreeSet::new(),
            ignored: BTreeMap::new(),
            is_keyless: Sourced::default(),
            is_owned: Sourced::default(),
            defining_property: None,
            annotations: Annotations::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The CLR representation, `None` for name-only types.
    #[must_use]
    pub fn clr_type(&self) -> Option<&ClrType> {
        self.clr_type.as_ref()
    }

    /// Whether this is a shared-type entity type.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    #[must_use]
    pub fn is_entity_type(&self) -> bool {
        self.kind == TypeKind::Entity
    }

    /// Source of the type's existence.
    #[must_use]
    pub fn source(&self) -> ConfigurationSource {
        self.source
    }

    #[must_use]
    pub fn base_type(&self) -> Option<TypeId> {
        self.base_type
    }

    #[must_use]
    pub fn base_type_source(&self) -> Option<ConfigurationSource> {
        self.base_type_source
    }

    /// Directly derived types.
    pub fn derived_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.derived_types.iter().copied()
    }

    /// Declared properties in name order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, PropertyId)> + '_ {
        self.properties.iter().map(|(n, id)| (n.as_str(), *id))
    }

    /// Declared complex properties in name order.
    pub fn complex_properties(&self) -> impl Iterator<Item = (&str, ComplexPropertyId)> + '_ {
        self.complex_properties.iter().map(|(n, id)| (n.as_str(), *id))
    }

    /// Declared service properties in name order.
    pub fn service_properties(&self) -> impl Iterator<Item = (&str, ServicePropertyId)> + '_ {
        self.service_properties.iter().map(|(n, id)| (n.as_str(), *id))
    }

    /// Declared navigations in name order.
    pub fn navigations(&self) -> impl Iterator<Item = (&str, NavigationId)> + '_ {
        self.navigations.iter().map(|(n, id)| (n.as_str(), *id))
    }

    /// Declared skip navigations in name order.
    pub fn skip_navigations(&self) -> impl Iterator<Item = (&str, SkipNavigationId)> + '_ {
        self.skip_navigations.iter().map(|(n, id)| (n.as_str(), *id))
    }

    /// Declared keys.
    pub fn keys(&self) -> impl Iterator<Item = KeyId> + '_ {
        self.keys.iter().copied()
    }

    /// The declared primary key.
    #[must_use]
    pub fn primary_key(&self) -> Option<KeyId> {
        self.primary_key.value()
    }

    #[must_use]
    pub fn primary_key_source(&self) -> Option<ConfigurationSource> {
        self.primary_key.source()
    }

    /// Declared indexes.
    pub fn indexes(&self) -> impl Iterator<Item = IndexId> + '_ {
        self.indexes.iter().copied()
    }

    /// Foreign keys declared on this type (this type is the dependent).
    pub fn foreign_keys(&self) -> impl Iterator<Item = ForeignKeyId> + '_ {
        self.foreign_keys.iter().copied()
    }

    /// Foreign keys whose principal type is this type.
    pub fn referencing_foreign_keys(&self) -> impl Iterator<Item = ForeignKeyId> + '_ {
        self.referencing_foreign_keys.iter().copied()
    }

    /// Ignored member names with their sources.
    pub fn ignored_members(&self) -> impl Iterator<Item = (&str, ConfigurationSource)> + '_ {
        self.ignored.iter().map(|(n, s)| (n.as_str(), *s))
    }

    /// Source of the ignore entry for `name`.
    #[must_use]
    pub fn ignored_source(&self, name: &str) -> Option<ConfigurationSource> {
        self.ignored.get(name).copied()
    }

    #[must_use]
    pub fn is_keyless(&self) -> bool {
        self.is_keyless.value().unwrap_or(false)
    }

    #[must_use]
    pub fn is_keyless_source(&self) -> Option<ConfigurationSource> {
        self.is_keyless.source()
    }

    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.is_owned.value().unwrap_or(false)
    }

    #[must_use]
    pub fn is_owned_source(&self) -> Option<ConfigurationSource> {
        self.is_owned.source()
    }

    /// For complex types, the complex property that defines them.
    #[must_use]
    pub fn defining_property(&self) -> Option<ComplexPropertyId> {
        self.defining_property
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
}

// =============================================================================
// PROPERTY
// =============================================================================

/// A scalar property.
#[derive(Debug, Clone)]
pub struct Property {
    pub(crate) id: PropertyId,
    pub(crate) name: String,
    pub(crate) declaring_type: TypeId,
    pub(crate) clr_type: ClrType,
    pub(crate) type_source: Option<ConfigurationSource>,
    pub(crate) member: MemberIdentity,
    pub(crate) source: ConfigurationSource,
    pub(crate) is_nullable: Sourced<bool>,
    pub(crate) max_length: Sourced<usize>,
    pub(crate) is_concurrency_token: Sourced<bool>,
    pub(crate) value_generated: Sourced<ValueGenerated>,
    pub(crate) facets: MemberFacets,
    pub(crate) keys: BTreeSet<KeyId>,
    pub(crate) foreign_keys: BTreeSet<ForeignKeyId>,
    pub(crate) indexes: BTreeSet<IndexId>,
    pub(crate) annotations: Annotations,
}

property_base!(Property, MemberKind::Property);

impl Property {
    pub(crate) fn new(
        id: PropertyId,
        name: String,
        declaring_type: TypeId,
        clr_type: ClrType,
        member: MemberIdentity,
        source: ConfigurationSource,
        type_source: Option<ConfigurationSource>,
    ) -> Self {
        Self {
            id,
            name,
            declaring_type,
            clr_type,
            type_source,
            member,
            source,
            is_nullable: Sourced::default(),
            max_length: Sourced::default(),
            is_concurrency_token: Sourced::default(),
            value_generated: Sourced::default(),
            facets: MemberFacets::default(),
            keys: BTreeSet::new(),
            foreign_keys: BTreeSet::new(),
            indexes: BTreeSet::new(),
            annotations: Annotations::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> PropertyId {
        self.id
    }

    #[must_use]
    pub fn clr_type(&self) -> &ClrType {
        &self.clr_type
    }

    /// Source of the CLR type, `None` when it was inferred.
    #[must_use]
    pub fn type_source(&self) -> Option<ConfigurationSource> {
        self.type_source
    }

    /// Source of the property's existence.
    #[must_use]
    pub fn source(&self) -> ConfigurationSource {
        self.source
    }

    /// Effective nullability: key properties are never nullable, otherwise
    /// the configured value or the CLR type's nullability.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.keys.is_empty()
            && self
                .is_nullable
                .value()
                .unwrap_or_else(|| self.clr_type.is_nullable())
    }

    #[must_use]
    pub fn is_nullable_source(&self) -> Option<ConfigurationSource> {
        self.is_nullable.source()
    }

    #[must_use]
    pub fn max_length(&self) -> Option<usize> {
        self.max_length.value()
    }

    #[must_use]
    pub fn max_length_source(&self) -> Option<ConfigurationSource> {
        self.max_length.source()
    }

    #[must_use]
    pub fn is_concurrency_token(&self) -> bool {
        self.is_concurrency_token.value().unwrap_or(false)
    }

    #[must_use]
    pub fn value_generated(&self) -> ValueGenerated {
        self.value_generated.value().unwrap_or(ValueGenerated::Never)
    }

    /// Keys containing this property.
    pub fn containing_keys(&self) -> impl Iterator<Item = KeyId> + '_ {
        self.keys.iter().copied()
    }

    /// Foreign keys containing this property.
    pub fn containing_foreign_keys(&self) -> impl Iterator<Item = ForeignKeyId> + '_ {
        self.foreign_keys.iter().copied()
    }

    /// Indexes containing this property.
    pub fn containing_indexes(&self) -> impl Iterator<Item = IndexId> + '_ {
        self.indexes.iter().copied()
    }

    /// Whether any key, index or foreign key uses this property.
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        !self.keys.is_empty() || !self.foreign_keys.is_empty() || !self.indexes.is_empty()
    }
}

// =============================================================================
// COMPLEX PROPERTY
// =============================================================================

/// A property whose value is a nested value object (or a collection of them).
#[derive(Debug, Clone)]
pub struct ComplexProperty {
    pub(crate) id: ComplexPropertyId,
    pub(crate) name: String,
    pub(crate) declaring_type: TypeId,
    pub(crate) complex_type: TypeId,
    pub(crate) clr_type: ClrType,
    pub(crate) is_collection: bool,
    pub(crate) member: MemberIdentity,
    pub(crate) source: ConfigurationSource,
    pub(crate) is_nullable: Sourced<bool>,
    pub(crate) facets: MemberFacets,
    pub(crate) annotations: Annotations,
}

property_base!(ComplexProperty, MemberKind::ComplexProperty);

impl ComplexProperty {
    #[must_use]
    pub fn id(&self) -> ComplexPropertyId {
        self.id
    }

    /// The complex type owned by this property.
    #[must_use]
    pub fn complex_type(&self) -> TypeId {
        self.complex_type
    }

    /// Declared CLR type (the collection type for collections).
    #[must_use]
    pub fn clr_type(&self) -> &ClrType {
        &self.clr_type
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    #[must_use]
    pub fn source(&self) -> ConfigurationSource {
        self.source
    }

    /// Complex properties are required unless configured otherwise.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.is_nullable.value().unwrap_or(false)
    }

    #[must_use]
    pub fn is_nullable_source(&self) -> Option<ConfigurationSource> {
        self.is_nullable.source()
    }
}

// =============================================================================
// SERVICE PROPERTY
// =============================================================================

/// A member populated with a runtime service rather than stored data.
#[derive(Debug, Clone)]
pub struct ServiceProperty {
    pub(crate) id: ServicePropertyId,
    pub(crate) name: String,
    pub(crate) declaring_type: TypeId,
    pub(crate) clr_type: ClrType,
    pub(crate) member: MemberIdentity,
    pub(crate) source: ConfigurationSource,
    pub(crate) facets: MemberFacets,
    pub(crate) annotations: Annotations,
}

property_base!(ServiceProperty, MemberKind::ServiceProperty);

impl ServiceProperty {
    #[must_use]
    pub fn id(&self) -> ServicePropertyId {
        self.id
    }

    #[must_use]
    pub fn clr_type(&self) -> &ClrType {
        &self.clr_type
    }

    #[must_use]
    pub fn source(&self) -> ConfigurationSource {
        self.source
    }
}

// =============================================================================
// KEY & INDEX
// =============================================================================

/// A primary or alternate key.
#[derive(Debug, Clone)]
pub struct Key {
    pub(crate) id: KeyId,
    pub(crate) declaring_type: TypeId,
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) source: ConfigurationSource,
    pub(crate) referencing_foreign_keys: BTreeSet<ForeignKeyId>,
    pub(crate) annotations: Annotations,
}

impl Key {
    #[must_use]
    pub fn id(&self) -> KeyId {
        self.id
    }

    #[must_use]
    pub fn declaring_type(&self) -> TypeId {
        self.declaring_type
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }

    #[must_use]
    pub fn source(&self) -> ConfigurationSource {
        self.source
    }

    /// Foreign keys targeting this key.
    pub fn referencing_foreign_keys(&self) -> impl Iterator<Item = ForeignKeyId> + '_ {
        self.referencing_foreign_keys.iter().copied()
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
}

/// A (possibly unique, possibly named) index.
#[derive(Debug, Clone)]
pub struct Index {
    pub(crate) id: IndexId,
    pub(crate) declaring_type: TypeId,
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) name: Option<String>,
    pub(crate) is_unique: Sourced<bool>,
    pub(crate) source: ConfigurationSource,
    pub(crate) annotations: Annotations,
}

impl Index {
    #[must_use]
    pub fn id(&self) -> IndexId {
        self.id
    }

    #[must_use]
    pub fn declaring_type(&self) -> TypeId {
        self.declaring_type
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.is_unique.value().unwrap_or(false)
    }

    #[must_use]
    pub fn is_unique_source(&self) -> Option<ConfigurationSource> {
        self.is_unique.source()
    }

    #[must_use]
    pub fn source(&self) -> ConfigurationSource {
        self.source
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
}

// =============================================================================
// FOREIGN KEY
// =============================================================================

/// A relationship edge from a dependent property set to a principal key.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub(crate) id: ForeignKeyId,
    pub(crate) declaring_type: TypeId,
    pub(crate) principal_type: TypeId,
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) principal_key: KeyId,
    pub(crate) dependent_to_principal: Option<NavigationId>,
    pub(crate) principal_to_dependent: Option<NavigationId>,
    pub(crate) dependent_to_principal_source: Option<ConfigurationSource>,
    pub(crate) principal_to_dependent_source: Option<ConfigurationSource>,
    pub(crate) source: ConfigurationSource,
    pub(crate) properties_source: Option<ConfigurationSource>,
    pub(crate) principal_key_source: Option<ConfigurationSource>,
    pub(crate) principal_end_source: Option<ConfigurationSource>,
    pub(crate) is_unique: Sourced<bool>,
    pub(crate) is_required: Sourced<bool>,
    pub(crate) is_required_dependent: Sourced<bool>,
    pub(crate) delete_behavior: Sourced<DeleteBehavior>,
    pub(crate) is_ownership: Sourced<bool>,
    pub(crate) referencing_skip_navigations: BTreeSet<SkipNavigationId>,
    pub(crate) annotations: Annotations,
}

impl ForeignKey {
    #[must_use]
    pub fn id(&self) -> ForeignKeyId {
        self.id
    }

    /// The dependent entity type.
    #[must_use]
    pub fn declaring_type(&self) -> TypeId {
        self.declaring_type
    }

    #[must_use]
    pub fn principal_type(&self) -> TypeId {
        self.principal_type
    }

    /// Dependent properties in key order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }

    #[must_use]
    pub fn principal_key(&self) -> KeyId {
        self.principal_key
    }

    #[must_use]
    pub fn dependent_to_principal(&self) -> Option<NavigationId> {
        self.dependent_to_principal
    }

    #[must_use]
    pub fn principal_to_dependent(&self) -> Option<NavigationId> {
        self.principal_to_dependent
    }

    #[must_use]
    pub fn dependent_to_principal_source(&self) -> Option<ConfigurationSource> {
        self.dependent_to_principal_source
    }

    #[must_use]
    pub fn principal_to_dependent_source(&self) -> Option<ConfigurationSource> {
        self.principal_to_dependent_source
    }

    /// Source of the relationship's existence.
    #[must_use]
    pub fn source(&self) -> ConfigurationSource {
        self.source
    }

    #[must_use]
    pub fn properties_source(&self) -> Option<ConfigurationSource> {
        self.properties_source
    }

    #[must_use]
    pub fn principal_key_source(&self) -> Option<ConfigurationSource> {
        self.principal_key_source
    }

    #[must_use]
    pub fn principal_end_source(&self) -> Option<ConfigurationSource> {
        self.principal_end_source
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.is_unique.value().unwrap_or(false)
    }

    #[must_use]
    pub fn is_unique_source(&self) -> Option<ConfigurationSource> {
        self.is_unique.source()
    }

    /// Configured requiredness, `None` when derived from property nullability.
    #[must_use]
    pub fn configured_is_required(&self) -> Option<bool> {
        self.is_required.value()
    }

    #[must_use]
    pub fn is_required_source(&self) -> Option<ConfigurationSource> {
        self.is_required.source()
    }

    #[must_use]
    pub fn is_required_dependent(&self) -> bool {
        self.is_required_dependent.value().unwrap_or(false)
    }

    #[must_use]
    pub fn is_required_dependent_source(&self) -> Option<ConfigurationSource> {
        self.is_required_dependent.source()
    }

    /// Configured delete behavior, `None` when derived from requiredness.
    #[must_use]
    pub fn configured_delete_behavior(&self) -> Option<DeleteBehavior> {
        self.delete_behavior.value()
    }

    #[must_use]
    pub fn delete_behavior_source(&self) -> Option<ConfigurationSource> {
        self.delete_behavior.source()
    }

    #[must_use]
    pub fn is_ownership(&self) -> bool {
        self.is_ownership.value().unwrap_or(false)
    }

    #[must_use]
    pub fn is_ownership_source(&self) -> Option<ConfigurationSource> {
        self.is_ownership.source()
    }

    /// Skip navigations using this FK as their join FK.
    pub fn referencing_skip_navigations(&self) -> impl Iterator<Item = SkipNavigationId> + '_ {
        self.referencing_skip_navigations.iter().copied()
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// Whether `type_id` is the declaring or principal type.
    #[must_use]
    pub fn involves(&self, type_id: TypeId) -> bool {
        self.declaring_type == type_id || self.principal_type == type_id
    }
}

// =============================================================================
// NAVIGATIONS
// =============================================================================

/// One direction of a foreign key, exposed as a named member.
///
/// Its configuration source lives on the foreign key.
#[derive(Debug, Clone)]
pub struct Navigation {
    pub(crate) id: NavigationId,
    pub(crate) name: String,
    pub(crate) declaring_type: TypeId,
    pub(crate) foreign_key: ForeignKeyId,
    pub(crate) member: MemberIdentity,
    pub(crate) clr_type: Option<ClrType>,
    pub(crate) is_eager_loaded: Sourced<bool>,
    pub(crate) lazy_loading_enabled: Sourced<bool>,
    pub(crate) facets: MemberFacets,
    pub(crate) annotations: Annotations,
}

property_base!(Navigation, MemberKind::Navigation);

impl Navigation {
    #[must_use]
    pub fn id(&self) -> NavigationId {
        self.id
    }

    #[must_use]
    pub fn foreign_key(&self) -> ForeignKeyId {
        self.foreign_key
    }

    /// CLR type of the backing member, if there is one.
    #[must_use]
    pub fn clr_type(&self) -> Option<&ClrType> {
        self.clr_type.as_ref()
    }

    #[must_use]
    pub fn is_eager_loaded(&self) -> bool {
        self.is_eager_loaded.value().unwrap_or(false)
    }

    #[must_use]
    pub fn lazy_loading_enabled(&self) -> bool {
        self.lazy_loading_enabled.value().unwrap_or(true)
    }
}

/// A many-to-many navigation that skips over a join entity type.
#[derive(Debug, Clone)]
pub struct SkipNavigation {
    pub(crate) id: SkipNavigationId,
    pub(crate) name: String,
    pub(crate) declaring_type: TypeId,
    pub(crate) target_type: TypeId,
    pub(crate) is_collection: bool,
    pub(crate) member: MemberIdentity,
    pub(crate) clr_type: Option<ClrType>,
    pub(crate) source: ConfigurationSource,
    pub(crate) foreign_key: Option<ForeignKeyId>,
    pub(crate) foreign_key_source: Option<ConfigurationSource>,
    pub(crate) inverse: Option<SkipNavigationId>,
    pub(crate) inverse_source: Option<ConfigurationSource>,
    pub(crate) facets: MemberFacets,
    pub(crate) annotations: Annotations,
}

property_base!(SkipNavigation, MemberKind::SkipNavigation);

impl SkipNavigation {
    #[must_use]
    pub fn id(&self) -> SkipNavigationId {
        self.id
    }

    #[must_use]
    pub fn target_type(&self) -> TypeId {
        self.target_type
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    #[must_use]
    pub fn clr_type(&self) -> Option<&ClrType> {
        self.clr_type.as_ref()
    }

    #[must_use]
    pub fn source(&self) -> ConfigurationSource {
        self.source
    }

    /// The join FK, from the join type to this navigation's declaring type.
    #[must_use]
    pub fn foreign_key(&self) -> Option<ForeignKeyId> {
        self.foreign_key
    }

    #[must_use]
    pub fn foreign_key_source(&self) -> Option<ConfigurationSource> {
        self.foreign_key_source
    }

    #[must_use]
    pub fn inverse(&self) -> Option<SkipNavigationId> {
        self.inverse
    }

    #[must_use]
    pub fn inverse_source(&self) -> Option<ConfigurationSource> {
        self.inverse_source
    }
}
