//! # Model Arena
//!
//! The root container of the schema graph. Every element lives in a
//! `BTreeMap` keyed by its id; neighbors are referenced by id only.
//!
//! The `pub(crate)` primitives here perform raw structural edits and keep
//! back-references consistent. They do not check configuration sources or
//! notify conventions; that is the builders' job.
//!
//! ## Indexing
//!
//! `model[id]` behaves like slice indexing: it panics on an id that is not
//! live. Builder entry points validate caller-supplied ids first, so inside
//! the crate indexing only sees ids reached through live back-references.

pub mod elements;
pub mod members;

use crate::annotations::Annotations;
use crate::source::ConfigurationSource;
use crate::{
    ClrMember, ClrShape, ClrType, ComplexPropertyId, DeleteBehavior, ForeignKeyId, IndexId,
    KeyId, MemberIdentity, ModelError, NavigationId, PropertyId, ServicePropertyId,
    SkipNavigationId, TypeId,
};
use elements::{
    ComplexProperty, ForeignKey, Index, Key, MemberFacets, Navigation, Property, ServiceProperty,
    SkipNavigation, TypeBase, TypeKind,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// MODEL
// =============================================================================

/// The schema graph.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) types: BTreeMap<TypeId, TypeBase>,
    /// Entity type name -> id. Complex types are reachable only through
    /// their defining complex property.
    pub(crate) type_names: BTreeMap<String, TypeId>,
    pub(crate) properties: BTreeMap<PropertyId, Property>,
    pub(crate) complex_properties: BTreeMap<ComplexPropertyId, ComplexProperty>,
    pub(crate) service_properties: BTreeMap<ServicePropertyId, ServiceProperty>,
    pub(crate) keys: BTreeMap<KeyId, Key>,
    pub(crate) indexes: BTreeMap<IndexId, Index>,
    pub(crate) foreign_keys: BTreeMap<ForeignKeyId, ForeignKey>,
    pub(crate) navigations: BTreeMap<NavigationId, Navigation>,
    pub(crate) skip_navigations: BTreeMap<SkipNavigationId, SkipNavigation>,
    pub(crate) shapes: BTreeMap<String, ClrShape>,
    /// CLR type names registered as complex types.
    pub(crate) complex_registrations: BTreeMap<String, ConfigurationSource>,
    pub(crate) ignored_types: BTreeMap<String, ConfigurationSource>,
    pub(crate) annotations: Annotations,
    pub(crate) read_only: bool,
    pub(crate) max_chain: usize,
    next_id: u64,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            types: BTreeMap::new(),
            type_names: BTreeMap::new(),
            properties: BTreeMap::new(),
            complex_properties: BTreeMap::new(),
            service_properties: BTreeMap::new(),
            keys: BTreeMap::new(),
            indexes: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
            navigations: BTreeMap::new(),
            skip_navigations: BTreeMap::new(),
            shapes: BTreeMap::new(),
            complex_registrations: BTreeMap::new(),
            ignored_types: BTreeMap::new(),
            annotations: Annotations::new(),
            read_only: false,
            max_chain: crate::primitives::MAX_FOREIGN_KEY_CHAIN,
            next_id: 1,
        }
    }
}

macro_rules! arena_index {
    ($id:ty, $element:ty, $field:ident, $getter:ident) => {
        impl std::ops::Index<$id> for Model {
            type Output = $element;

            fn index(&self, id: $id) -> &$element {
                &self.$field[&id]
            }
        }

        impl std::ops::IndexMut<$id> for Model {
            fn index_mut(&mut self, id: $id) -> &mut $element {
                self.$field
                    .get_mut(&id)
                    .expect("element id is not live in this model")
            }
        }

        impl Model {
            /// Look up a live element.
            #[must_use]
            pub fn $getter(&self, id: $id) -> Option<&$element> {
                self.$field.get(&id)
            }
        }
    };
}

arena_index!(TypeId, TypeBase, types, get_type);
arena_index!(PropertyId, Property, properties, get_property);
arena_index!(
    ComplexPropertyId,
    ComplexProperty,
    complex_properties,
    get_complex_property
);
arena_index!(
    ServicePropertyId,
    ServiceProperty,
    service_properties,
    get_service_property
);
arena_index!(KeyId, Key, keys, get_key);
arena_index!(IndexId, Index, indexes, get_index);
arena_index!(ForeignKeyId, ForeignKey, foreign_keys, get_foreign_key);
arena_index!(NavigationId, Navigation, navigations, get_navigation);
arena_index!(
    SkipNavigationId,
    SkipNavigation,
    skip_navigations,
    get_skip_navigation
);

impl Model {
    /// Create an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the model has been frozen.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Fail fast once the model is frozen.
    pub fn ensure_mutable(&self) -> Result<(), ModelError> {
        if self.read_only {
            Err(ModelError::ReadOnlyModel)
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    // =========================================================================
    // ENUMERATION
    // =========================================================================

    /// Entity types in name order.
    pub fn entity_types(&self) -> impl Iterator<Item = &TypeBase> {
        self.type_names.values().map(|id| &self.types[id])
    }

    /// Every structural type, complex types included, in id order.
    pub fn types(&self) -> impl Iterator<Item = &TypeBase> {
        self.types.values()
    }

    /// All foreign keys in id order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys.values()
    }

    /// All keys in id order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.values()
    }

    /// All indexes in id order.
    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.indexes.values()
    }

    /// All skip navigations in id order.
    pub fn skip_navigations(&self) -> impl Iterator<Item = &SkipNavigation> {
        self.skip_navigations.values()
    }

    /// Number of entity types.
    #[must_use]
    pub fn entity_type_count(&self) -> usize {
        self.type_names.len()
    }

    /// Number of elements of every kind, for diagnostics.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.types.len()
            + self.properties.len()
            + self.complex_properties.len()
            + self.service_properties.len()
            + self.keys.len()
            + self.indexes.len()
            + self.foreign_keys.len()
            + self.navigations.len()
            + self.skip_navigations.len()
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Find an entity type by name.
    #[must_use]
    pub fn find_entity_type(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    /// Source of an ignored entity type name.
    #[must_use]
    pub fn ignored_type_source(&self, name: &str) -> Option<ConfigurationSource> {
        self.ignored_types.get(name).copied()
    }

    /// Source of a complex type registration for a CLR type name.
    #[must_use]
    pub fn complex_registration_source(&self, clr_name: &str) -> Option<ConfigurationSource> {
        self.complex_registrations.get(clr_name).copied()
    }

    /// A registered CLR shape.
    #[must_use]
    pub fn shape(&self, name: &str) -> Option<&ClrShape> {
        self.shapes.get(name)
    }

    /// The CLR member `name` of the type's CLR representation, searching CLR
    /// base shapes as well.
    #[must_use]
    pub fn clr_member(&self, type_id: TypeId, name: &str) -> Option<&ClrMember> {
        let shape_name = self[type_id].clr_type.as_ref()?.shape_name()?.to_string();
        self.clr_member_of_shape(&shape_name, name)
    }

    /// The member `name` of a registered shape or its CLR bases.
    #[must_use]
    pub fn clr_member_of_shape(&self, shape_name: &str, name: &str) -> Option<&ClrMember> {
        let mut current = Some(shape_name);
        let mut steps = 0usize;
        while let Some(shape_name) = current {
            let shape = self.shapes.get(shape_name)?;
            if let Some(member) = shape.member(name) {
                return Some(member);
            }
            steps = steps.saturating_add(1);
            if steps > self.max_chain {
                return None;
            }
            current = shape.base.as_deref();
        }
        None
    }

    /// The identity a new member named `name` on `type_id` would bind to.
    #[must_use]
    pub fn member_identity(&self, type_id: TypeId, name: &str) -> MemberIdentity {
        let ty = &self[type_id];
        if self.clr_member(type_id, name).is_some() {
            MemberIdentity::Clr(name.to_string())
        } else if ty.clr_type == Some(ClrType::PropertyBag) {
            MemberIdentity::Indexer
        } else {
            MemberIdentity::Shadow
        }
    }

    /// `'A', 'B'` style list of property names.
    #[must_use]
    pub fn display_properties(&self, properties: &[PropertyId]) -> String {
        let names: Vec<String> = properties
            .iter()
            .map(|id| {
                self.properties
                    .get(id)
                    .map_or_else(|| id.to_string(), |p| format!("'{}'", p.name))
            })
            .collect();
        format!("{{{}}}", names.join(", "))
    }

    /// Property names in order.
    #[must_use]
    pub fn property_names(&self, properties: &[PropertyId]) -> Vec<String> {
        properties
            .iter()
            .map(|id| self[*id].name.clone())
            .collect()
    }

    // =========================================================================
    // HIERARCHY
    // =========================================================================

    /// Base types of `type_id`, nearest first, excluding itself.
    #[must_use]
    pub fn base_types(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut chain = Vec::new();
        let mut current = self[type_id].base_type;
        while let Some(base) = current {
            if chain.contains(&base) || base == type_id {
                break;
            }
            chain.push(base);
            current = self[base].base_type;
        }
        chain
    }

    /// `type_id` followed by its base types.
    #[must_use]
    pub fn base_types_inclusive(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut chain = vec![type_id];
        chain.extend(self.base_types(type_id));
        chain
    }

    /// The root of the inheritance chain.
    #[must_use]
    pub fn root_type(&self, type_id: TypeId) -> TypeId {
        self.base_types(type_id).last().copied().unwrap_or(type_id)
    }

    /// `type_id` and every transitively derived type, breadth first.
    #[must_use]
    pub fn derived_types_inclusive(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut result = Vec::new();
        let mut queue = VecDeque::from([type_id]);
        let mut visited = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current);
            queue.extend(self[current].derived_types.iter().copied());
        }
        result
    }

    /// Whether `candidate` is `base` or derives from it.
    #[must_use]
    pub fn is_same_or_derived(&self, base: TypeId, candidate: TypeId) -> bool {
        candidate == base || self.base_types(candidate).contains(&base)
    }

    /// Whether the two types share an inheritance hierarchy.
    #[must_use]
    pub fn in_same_hierarchy(&self, left: TypeId, right: TypeId) -> bool {
        self.is_same_or_derived(left, right) || self.is_same_or_derived(right, left)
    }

    // =========================================================================
    // MEMBER LOOKUP
    // =========================================================================

    /// Property visible on `type_id`, declared or inherited.
    #[must_use]
    pub fn find_property(&self, type_id: TypeId, name: &str) -> Option<PropertyId> {
        self.base_types_inclusive(type_id)
            .into_iter()
            .find_map(|t| self[t].properties.get(name).copied())
    }

    /// Properties named `name` declared on types derived from `type_id`.
    #[must_use]
    pub fn find_derived_properties(&self, type_id: TypeId, name: &str) -> Vec<PropertyId> {
        self.derived_types_inclusive(type_id)
            .into_iter()
            .skip(1)
            .filter_map(|t| self[t].properties.get(name).copied())
            .collect()
    }

    /// Resolve property names on `type_id`; `None` if any is missing.
    #[must_use]
    pub fn resolve_properties(&self, type_id: TypeId, names: &[String]) -> Option<Vec<PropertyId>> {
        names
            .iter()
            .map(|name| self.find_property(type_id, name))
            .collect()
    }

    /// Complex property visible on `type_id`, declared or inherited.
    #[must_use]
    pub fn find_complex_property(&self, type_id: TypeId, name: &str) -> Option<ComplexPropertyId> {
        self.base_types_inclusive(type_id)
            .into_iter()
            .find_map(|t| self[t].complex_properties.get(name).copied())
    }

    /// Navigation visible on `type_id`, declared or inherited.
    #[must_use]
    pub fn find_navigation(&self, type_id: TypeId, name: &str) -> Option<NavigationId> {
        self.base_types_inclusive(type_id)
            .into_iter()
            .find_map(|t| self[t].navigations.get(name).copied())
    }

    /// Skip navigation visible on `type_id`, declared or inherited.
    #[must_use]
    pub fn find_skip_navigation(&self, type_id: TypeId, name: &str) -> Option<SkipNavigationId> {
        self.base_types_inclusive(type_id)
            .into_iter()
            .find_map(|t| self[t].skip_navigations.get(name).copied())
    }

    /// Ignore entry for `name` on `type_id` or any of its base types.
    #[must_use]
    pub fn find_ignored_source(&self, type_id: TypeId, name: &str) -> Option<ConfigurationSource> {
        self.base_types_inclusive(type_id)
            .into_iter()
            .find_map(|t| self[t].ignored.get(name).copied())
    }

    /// Whether `name` is ignored on `type_id` in a way `source` cannot lift.
    #[must_use]
    pub fn is_member_ignored(
        &self,
        type_id: TypeId,
        name: &str,
        source: ConfigurationSource,
    ) -> bool {
        match self.find_ignored_source(type_id, name) {
            None => false,
            Some(ignored) => !source.is_explicit() && !source.overrides_strictly(Some(ignored)),
        }
    }

    // =========================================================================
    // KEYS
    // =========================================================================

    /// The primary key of the hierarchy `type_id` belongs to.
    #[must_use]
    pub fn find_primary_key(&self, type_id: TypeId) -> Option<KeyId> {
        self[self.root_type(type_id)].primary_key.value()
    }

    /// The key over exactly `properties` in the hierarchy of `type_id`.
    #[must_use]
    pub fn find_key(&self, type_id: TypeId, properties: &[PropertyId]) -> Option<KeyId> {
        let root = self.root_type(type_id);
        self[root]
            .keys
            .iter()
            .copied()
            .find(|key| self[*key].properties == properties)
    }

    /// Whether `key` is visible on `type_id`.
    #[must_use]
    pub fn key_belongs_to(&self, key: KeyId, type_id: TypeId) -> bool {
        self.keys
            .get(&key)
            .is_some_and(|k| self.is_same_or_derived(k.declaring_type, type_id))
    }

    /// Index over exactly `properties` declared on `type_id` or a base type.
    #[must_use]
    pub fn find_index(&self, type_id: TypeId, properties: &[PropertyId]) -> Option<IndexId> {
        self.base_types_inclusive(type_id).into_iter().find_map(|t| {
            self[t]
                .indexes
                .iter()
                .copied()
                .find(|index| self[*index].properties == properties)
        })
    }

    // =========================================================================
    // FOREIGN KEYS
    // =========================================================================

    /// Foreign keys declared anywhere in the hierarchy of `type_id` over
    /// exactly `properties` and targeting `principal_key`.
    #[must_use]
    pub fn find_foreign_keys_in_hierarchy(
        &self,
        type_id: TypeId,
        properties: &[PropertyId],
        principal_key: KeyId,
    ) -> Vec<ForeignKeyId> {
        let mut hierarchy = self.base_types(type_id);
        hierarchy.extend(self.derived_types_inclusive(type_id));
        hierarchy
            .into_iter()
            .flat_map(|t| self[t].foreign_keys.iter().copied())
            .filter(|fk| {
                let fk = &self[*fk];
                fk.principal_key == principal_key && fk.properties == properties
            })
            .collect()
    }

    /// Foreign keys declared on `type_id` or its base types.
    #[must_use]
    pub fn visible_foreign_keys(&self, type_id: TypeId) -> Vec<ForeignKeyId> {
        self.base_types_inclusive(type_id)
            .into_iter()
            .flat_map(|t| self[t].foreign_keys.iter().copied())
            .collect()
    }

    /// Effective requiredness: configured, or all dependent properties
    /// non-nullable.
    #[must_use]
    pub fn is_required(&self, fk: ForeignKeyId) -> bool {
        let foreign_key = &self[fk];
        foreign_key.is_required.value().unwrap_or_else(|| {
            !foreign_key.properties.is_empty()
                && foreign_key
                    .properties
                    .iter()
                    .all(|p| !self[*p].is_nullable())
        })
    }

    /// Effective delete behavior: configured, or cascade for required and
    /// client-set-null for optional relationships.
    #[must_use]
    pub fn delete_behavior(&self, fk: ForeignKeyId) -> DeleteBehavior {
        self[fk].delete_behavior.value().unwrap_or_else(|| {
            if self.is_required(fk) {
                DeleteBehavior::Cascade
            } else {
                DeleteBehavior::ClientSetNull
            }
        })
    }

    /// The ownership FK of `type_id` (declared on it or a base type).
    #[must_use]
    pub fn find_ownership(&self, type_id: TypeId) -> Option<ForeignKeyId> {
        self.visible_foreign_keys(type_id)
            .into_iter()
            .find(|fk| self[*fk].is_ownership())
    }

    /// Owner chain of `type_id`, nearest owner first.
    pub fn ownership_path(&self, type_id: TypeId) -> Result<Vec<TypeId>, ModelError> {
        let mut path = Vec::new();
        let mut current = type_id;
        while let Some(fk) = self.find_ownership(current) {
            let owner = self[fk].principal_type;
            if path.len() >= self.max_chain || path.contains(&owner) || owner == type_id {
                return Err(ModelError::ForeignKeyChainTooLong(
                    self[type_id].name.clone(),
                ));
            }
            path.push(owner);
            current = owner;
        }
        Ok(path)
    }

    /// Follow `property` through the foreign keys it belongs to until a
    /// property that is not itself a dependent property is reached.
    pub fn find_first_principal(&self, property: PropertyId) -> Result<PropertyId, ModelError> {
        let mut current = property;
        let mut visited = BTreeSet::from([property]);
        for _ in 0..self.max_chain {
            let next = self[current].foreign_keys.iter().find_map(|fk| {
                let fk = &self[*fk];
                let position = fk.properties.iter().position(|p| *p == current)?;
                self[fk.principal_key].properties.get(position).copied()
            });
            match next {
                None => return Ok(current),
                Some(next) if !visited.insert(next) => return Ok(current),
                Some(next) => current = next,
            }
        }
        Err(ModelError::ForeignKeyChainTooLong(format!(
            "{}.{}",
            self[self[property].declaring_type].name,
            self[property].name
        )))
    }

    // =========================================================================
    // NAVIGATIONS
    // =========================================================================

    /// Whether the navigation sits on the dependent end of its FK.
    #[must_use]
    pub fn is_on_dependent(&self, navigation: NavigationId) -> bool {
        let fk = &self[self[navigation].foreign_key];
        fk.dependent_to_principal == Some(navigation)
    }

    /// The entity type a navigation points to.
    #[must_use]
    pub fn navigation_target(&self, navigation: NavigationId) -> TypeId {
        let fk = &self[self[navigation].foreign_key];
        if self.is_on_dependent(navigation) {
            fk.principal_type
        } else {
            fk.declaring_type
        }
    }

    /// Whether a navigation yields many entities.
    #[must_use]
    pub fn is_collection(&self, navigation: NavigationId) -> bool {
        !self.is_on_dependent(navigation) && !self[self[navigation].foreign_key].is_unique()
    }

    /// The navigation on the other end of the same FK.
    #[must_use]
    pub fn inverse_navigation(&self, navigation: NavigationId) -> Option<NavigationId> {
        let fk = &self[self[navigation].foreign_key];
        if self.is_on_dependent(navigation) {
            fk.principal_to_dependent
        } else {
            fk.dependent_to_principal
        }
    }

    /// Source of a navigation, taken from its FK direction.
    #[must_use]
    pub fn navigation_source(&self, navigation: NavigationId) -> Option<ConfigurationSource> {
        let fk = &self[self[navigation].foreign_key];
        if self.is_on_dependent(navigation) {
            fk.dependent_to_principal_source
        } else {
            fk.principal_to_dependent_source
        }
    }

    /// The join entity type of a skip navigation, once its FK is known.
    #[must_use]
    pub fn join_entity_type(&self, skip_navigation: SkipNavigationId) -> Option<TypeId> {
        self[skip_navigation]
            .foreign_key
            .map(|fk| self[fk].declaring_type)
    }

    // =========================================================================
    // PRIMITIVES: TYPES
    // =========================================================================

    pub(crate) fn add_type(
        &mut self,
        name: String,
        clr_type: Option<ClrType>,
        shared: bool,
        kind: TypeKind,
        source: ConfigurationSource,
    ) -> TypeId {
        let id = TypeId(self.next_id());
        if kind == TypeKind::Entity {
            self.type_names.insert(name.clone(), id);
        }
        self.types
            .insert(id, TypeBase::new(id, name, clr_type, shared, kind, source));
        id
    }

    /// Remove a type whose members have already been removed.
    pub(crate) fn remove_type(&mut self, type_id: TypeId) -> Option<TypeBase> {
        let removed = self.types.remove(&type_id)?;
        if removed.kind == TypeKind::Entity && self.type_names.get(&removed.name) == Some(&type_id)
        {
            self.type_names.remove(&removed.name);
        }
        if let Some(base) = removed.base_type
            && let Some(base) = self.types.get_mut(&base)
        {
            base.derived_types.remove(&type_id);
        }
        for derived in &removed.derived_types {
            if let Some(derived) = self.types.get_mut(derived) {
                derived.base_type = None;
                derived.base_type_source = None;
            }
        }
        Some(removed)
    }

    pub(crate) fn set_base_type(
        &mut self,
        type_id: TypeId,
        base: Option<TypeId>,
        source: Option<ConfigurationSource>,
    ) {
        if let Some(old) = self[type_id].base_type {
            self[old].derived_types.remove(&type_id);
        }
        if let Some(base) = base {
            self[base].derived_types.insert(type_id);
        }
        let ty = &mut self[type_id];
        ty.base_type = base;
        ty.base_type_source = source;
    }

    // =========================================================================
    // PRIMITIVES: MEMBERS
    // =========================================================================

    pub(crate) fn add_property(
        &mut self,
        type_id: TypeId,
        name: &str,
        clr_type: ClrType,
        source: ConfigurationSource,
        type_source: Option<ConfigurationSource>,
    ) -> PropertyId {
        let id = PropertyId(self.next_id());
        let member = self.member_identity(type_id, name);
        self.properties.insert(
            id,
            Property::new(
                id,
                name.to_string(),
                type_id,
                clr_type,
                member,
                source,
                type_source,
            ),
        );
        self[type_id].properties.insert(name.to_string(), id);
        id
    }

    /// Remove a property no key, index or FK uses any more.
    pub(crate) fn remove_property(&mut self, property: PropertyId) -> Option<Property> {
        let removed = self.properties.remove(&property)?;
        if let Some(ty) = self.types.get_mut(&removed.declaring_type) {
            ty.properties.remove(&removed.name);
        }
        Some(removed)
    }

    pub(crate) fn add_complex_property(
        &mut self,
        type_id: TypeId,
        name: &str,
        clr_type: ClrType,
        is_collection: bool,
        source: ConfigurationSource,
    ) -> (ComplexPropertyId, TypeId) {
        let id = ComplexPropertyId(self.next_id());
        let element_type = if is_collection {
            clr_type.element_type().cloned().unwrap_or_else(|| clr_type.clone())
        } else {
            clr_type.unwrap_nullable().clone()
        };
        let complex_name = format!(
            "{}.{}{}{}",
            self[type_id].name,
            name,
            crate::primitives::COMPLEX_TYPE_SEPARATOR,
            element_type
        );
        let complex_type = TypeId(self.next_id());
        let mut ty = TypeBase::new(
            complex_type,
            complex_name,
            Some(element_type),
            false,
            TypeKind::Complex,
            source,
        );
        ty.defining_property = Some(id);
        self.types.insert(complex_type, ty);
        let member = self.member_identity(type_id, name);
        self.complex_properties.insert(
            id,
            ComplexProperty {
                id,
                name: name.to_string(),
                declaring_type: type_id,
                complex_type,
                clr_type,
                is_collection,
                member,
                source,
                is_nullable: crate::source::Sourced::default(),
                facets: MemberFacets::default(),
                annotations: Annotations::new(),
            },
        );
        self[type_id].complex_properties.insert(name.to_string(), id);
        (id, complex_type)
    }

    /// Remove a complex property together with its (emptied) complex type.
    pub(crate) fn remove_complex_property(
        &mut self,
        complex_property: ComplexPropertyId,
    ) -> Option<ComplexProperty> {
        let removed = self.complex_properties.remove(&complex_property)?;
        if let Some(ty) = self.types.get_mut(&removed.declaring_type) {
            ty.complex_properties.remove(&removed.name);
        }
        self.remove_type(removed.complex_type);
        Some(removed)
    }

    pub(crate) fn add_service_property(
        &mut self,
        type_id: TypeId,
        name: &str,
        clr_type: ClrType,
        source: ConfigurationSource,
    ) -> ServicePropertyId {
        let id = ServicePropertyId(self.next_id());
        let member = self.member_identity(type_id, name);
        self.service_properties.insert(
            id,
            ServiceProperty {
                id,
                name: name.to_string(),
                declaring_type: type_id,
                clr_type,
                member,
                source,
                facets: MemberFacets::default(),
                annotations: Annotations::new(),
            },
        );
        self[type_id]
            .service_properties
            .insert(name.to_string(), id);
        id
    }

    pub(crate) fn remove_service_property(
        &mut self,
        service_property: ServicePropertyId,
    ) -> Option<ServiceProperty> {
        let removed = self.service_properties.remove(&service_property)?;
        if let Some(ty) = self.types.get_mut(&removed.declaring_type) {
            ty.service_properties.remove(&removed.name);
        }
        Some(removed)
    }

    // =========================================================================
    // PRIMITIVES: KEYS & INDEXES
    // =========================================================================

    pub(crate) fn add_key(
        &mut self,
        type_id: TypeId,
        properties: Vec<PropertyId>,
        source: ConfigurationSource,
    ) -> KeyId {
        let id = KeyId(self.next_id());
        for property in &properties {
            self[*property].keys.insert(id);
        }
        self.keys.insert(
            id,
            Key {
                id,
                declaring_type: type_id,
                properties,
                source,
                referencing_foreign_keys: BTreeSet::new(),
                annotations: Annotations::new(),
            },
        );
        self[type_id].keys.insert(id);
        id
    }

    /// Remove a key no FK references any more.
    pub(crate) fn remove_key(&mut self, key: KeyId) -> Option<Key> {
        let removed = self.keys.remove(&key)?;
        for property in &removed.properties {
            if let Some(p) = self.properties.get_mut(property) {
                p.keys.remove(&key);
            }
        }
        if let Some(ty) = self.types.get_mut(&removed.declaring_type) {
            ty.keys.remove(&key);
            if ty.primary_key.value() == Some(key) {
                ty.primary_key = crate::source::Sourced::default();
            }
        }
        Some(removed)
    }

    pub(crate) fn add_index(
        &mut self,
        type_id: TypeId,
        properties: Vec<PropertyId>,
        name: Option<String>,
        source: ConfigurationSource,
    ) -> IndexId {
        let id = IndexId(self.next_id());
        for property in &properties {
            self[*property].indexes.insert(id);
        }
        self.indexes.insert(
            id,
            Index {
                id,
                declaring_type: type_id,
                properties,
                name,
                is_unique: crate::source::Sourced::default(),
                source,
                annotations: Annotations::new(),
            },
        );
        self[type_id].indexes.insert(id);
        id
    }

    pub(crate) fn remove_index(&mut self, index: IndexId) -> Option<Index> {
        let removed = self.indexes.remove(&index)?;
        for property in &removed.properties {
            if let Some(p) = self.properties.get_mut(property) {
                p.indexes.remove(&index);
            }
        }
        if let Some(ty) = self.types.get_mut(&removed.declaring_type) {
            ty.indexes.remove(&index);
        }
        Some(removed)
    }

    // =========================================================================
    // PRIMITIVES: FOREIGN KEYS
    // =========================================================================

    pub(crate) fn add_foreign_key(
        &mut self,
        dependent: TypeId,
        properties: Vec<PropertyId>,
        principal: TypeId,
        principal_key: KeyId,
        source: ConfigurationSource,
    ) -> ForeignKeyId {
        let id = ForeignKeyId(self.next_id());
        for property in &properties {
            self[*property].foreign_keys.insert(id);
        }
        self[principal_key].referencing_foreign_keys.insert(id);
        self[dependent].foreign_keys.insert(id);
        self[principal].referencing_foreign_keys.insert(id);
        self.foreign_keys.insert(
            id,
            ForeignKey {
                id,
                declaring_type: dependent,
                principal_type: principal,
                properties,
                principal_key,
                dependent_to_principal: None,
                principal_to_dependent: None,
                dependent_to_principal_source: None,
                principal_to_dependent_source: None,
                source,
                properties_source: None,
                principal_key_source: None,
                principal_end_source: None,
                is_unique: crate::source::Sourced::default(),
                is_required: crate::source::Sourced::default(),
                is_required_dependent: crate::source::Sourced::default(),
                delete_behavior: crate::source::Sourced::default(),
                is_ownership: crate::source::Sourced::default(),
                referencing_skip_navigations: BTreeSet::new(),
                annotations: Annotations::new(),
            },
        );
        id
    }

    /// Remove a FK together with its navigations; skip navigations using it
    /// lose their FK link.
    pub(crate) fn remove_foreign_key(&mut self, fk: ForeignKeyId) -> Option<ForeignKey> {
        let navigations: Vec<NavigationId> = {
            let foreign_key = self.foreign_keys.get(&fk)?;
            foreign_key
                .dependent_to_principal
                .into_iter()
                .chain(foreign_key.principal_to_dependent)
                .collect()
        };
        for navigation in navigations {
            self.remove_navigation(navigation);
        }
        let removed = self.foreign_keys.remove(&fk)?;
        for property in &removed.properties {
            if let Some(p) = self.properties.get_mut(property) {
                p.foreign_keys.remove(&fk);
            }
        }
        if let Some(key) = self.keys.get_mut(&removed.principal_key) {
            key.referencing_foreign_keys.remove(&fk);
        }
        if let Some(ty) = self.types.get_mut(&removed.declaring_type) {
            ty.foreign_keys.remove(&fk);
        }
        if let Some(ty) = self.types.get_mut(&removed.principal_type) {
            ty.referencing_foreign_keys.remove(&fk);
        }
        for skip in &removed.referencing_skip_navigations {
            if let Some(skip) = self.skip_navigations.get_mut(skip) {
                skip.foreign_key = None;
                skip.foreign_key_source = None;
            }
        }
        Some(removed)
    }

    pub(crate) fn set_foreign_key_properties(
        &mut self,
        fk: ForeignKeyId,
        properties: Vec<PropertyId>,
    ) {
        let old = std::mem::take(&mut self[fk].properties);
        for property in &old {
            if let Some(p) = self.properties.get_mut(property) {
                p.foreign_keys.remove(&fk);
            }
        }
        for property in &properties {
            self[*property].foreign_keys.insert(fk);
        }
        self[fk].properties = properties;
    }

    pub(crate) fn set_principal_key(&mut self, fk: ForeignKeyId, key: KeyId) {
        let old = self[fk].principal_key;
        if let Some(old) = self.keys.get_mut(&old) {
            old.referencing_foreign_keys.remove(&fk);
        }
        self[key].referencing_foreign_keys.insert(fk);
        self[fk].principal_key = key;
    }

    /// Move the FK to new ends; navigations must have been removed.
    pub(crate) fn set_foreign_key_ends(
        &mut self,
        fk: ForeignKeyId,
        dependent: TypeId,
        principal: TypeId,
    ) {
        let (old_dependent, old_principal) = {
            let foreign_key = &self[fk];
            (foreign_key.declaring_type, foreign_key.principal_type)
        };
        self[old_dependent].foreign_keys.remove(&fk);
        self[old_principal].referencing_foreign_keys.remove(&fk);
        self[dependent].foreign_keys.insert(fk);
        self[principal].referencing_foreign_keys.insert(fk);
        let foreign_key = &mut self[fk];
        foreign_key.declaring_type = dependent;
        foreign_key.principal_type = principal;
    }

    // =========================================================================
    // PRIMITIVES: NAVIGATIONS
    // =========================================================================

    pub(crate) fn add_navigation(
        &mut self,
        fk: ForeignKeyId,
        name: &str,
        on_dependent: bool,
        source: ConfigurationSource,
    ) -> NavigationId {
        let id = NavigationId(self.next_id());
        let declaring_type = if on_dependent {
            self[fk].declaring_type
        } else {
            self[fk].principal_type
        };
        let member = self.member_identity(declaring_type, name);
        let clr_type = self
            .clr_member(declaring_type, name)
            .map(|m| m.clr_type.clone());
        self.navigations.insert(
            id,
            Navigation {
                id,
                name: name.to_string(),
                declaring_type,
                foreign_key: fk,
                member,
                clr_type,
                is_eager_loaded: crate::source::Sourced::default(),
                lazy_loading_enabled: crate::source::Sourced::default(),
                facets: MemberFacets::default(),
                annotations: Annotations::new(),
            },
        );
        self[declaring_type]
            .navigations
            .insert(name.to_string(), id);
        let foreign_key = &mut self[fk];
        if on_dependent {
            foreign_key.dependent_to_principal = Some(id);
            foreign_key.dependent_to_principal_source =
                Some(source.max(foreign_key.dependent_to_principal_source));
        } else {
            foreign_key.principal_to_dependent = Some(id);
            foreign_key.principal_to_dependent_source =
                Some(source.max(foreign_key.principal_to_dependent_source));
        }
        id
    }

    /// Remove a navigation and clear its FK slot (the slot's source is kept).
    pub(crate) fn remove_navigation(&mut self, navigation: NavigationId) -> Option<Navigation> {
        let removed = self.navigations.remove(&navigation)?;
        if let Some(ty) = self.types.get_mut(&removed.declaring_type) {
            ty.navigations.remove(&removed.name);
        }
        if let Some(fk) = self.foreign_keys.get_mut(&removed.foreign_key) {
            if fk.dependent_to_principal == Some(navigation) {
                fk.dependent_to_principal = None;
            }
            if fk.principal_to_dependent == Some(navigation) {
                fk.principal_to_dependent = None;
            }
        }
        Some(removed)
    }

    pub(crate) fn add_skip_navigation(
        &mut self,
        type_id: TypeId,
        name: &str,
        target: TypeId,
        is_collection: bool,
        source: ConfigurationSource,
    ) -> SkipNavigationId {
        let id = SkipNavigationId(self.next_id());
        let member = self.member_identity(type_id, name);
        let clr_type = self.clr_member(type_id, name).map(|m| m.clr_type.clone());
        self.skip_navigations.insert(
            id,
            SkipNavigation {
                id,
                name: name.to_string(),
                declaring_type: type_id,
                target_type: target,
                is_collection,
                member,
                clr_type,
                source,
                foreign_key: None,
                foreign_key_source: None,
                inverse: None,
                inverse_source: None,
                facets: MemberFacets::default(),
                annotations: Annotations::new(),
            },
        );
        self[type_id].skip_navigations.insert(name.to_string(), id);
        id
    }

    /// Remove a skip navigation, unlinking its inverse and its join FK.
    pub(crate) fn remove_skip_navigation(
        &mut self,
        skip_navigation: SkipNavigationId,
    ) -> Option<SkipNavigation> {
        let removed = self.skip_navigations.remove(&skip_navigation)?;
        if let Some(ty) = self.types.get_mut(&removed.declaring_type) {
            ty.skip_navigations.remove(&removed.name);
        }
        if let Some(inverse) = removed.inverse
            && let Some(inverse) = self.skip_navigations.get_mut(&inverse)
            && inverse.inverse == Some(skip_navigation)
        {
            inverse.inverse = None;
            inverse.inverse_source = None;
        }
        if let Some(fk) = removed.foreign_key
            && let Some(fk) = self.foreign_keys.get_mut(&fk)
        {
            fk.referencing_skip_navigations.remove(&skip_navigation);
        }
        Some(removed)
    }

    pub(crate) fn set_skip_navigation_foreign_key(
        &mut self,
        skip_navigation: SkipNavigationId,
        fk: Option<ForeignKeyId>,
        source: Option<ConfigurationSource>,
    ) {
        if let Some(old) = self[skip_navigation].foreign_key
            && let Some(old) = self.foreign_keys.get_mut(&old)
        {
            old.referencing_skip_navigations.remove(&skip_navigation);
        }
        if let Some(fk) = fk {
            self[fk].referencing_skip_navigations.insert(skip_navigation);
        }
        let skip = &mut self[skip_navigation];
        skip.foreign_key = fk;
        skip.foreign_key_source = source;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ConfigurationSource::Explicit;

    fn model_with_blog() -> (Model, TypeId, PropertyId) {
        let mut model = Model::new();
        let blog = model.add_type(
            "Blog".to_string(),
            Some(ClrType::class("Blog")),
            false,
            TypeKind::Entity,
            Explicit,
        );
        let id = model.add_property(blog, "Id", ClrType::Int32, Explicit, Some(Explicit));
        (model, blog, id)
    }

    #[test]
    fn add_type_registers_name() {
        let (model, blog, _) = model_with_blog();
        assert_eq!(model.find_entity_type("Blog"), Some(blog));
        assert_eq!(model.entity_type_count(), 1);
    }

    #[test]
    fn key_links_are_bidirectional() {
        let (mut model, blog, id) = model_with_blog();
        let key = model.add_key(blog, vec![id], Explicit);
        assert!(model[id].containing_keys().any(|k| k == key));
        assert!(!model[id].is_nullable());

        model.remove_key(key);
        assert!(model[id].containing_keys().next().is_none());
        assert!(model[blog].keys().next().is_none());
    }

    #[test]
    fn hierarchy_walks() {
        let (mut model, blog, _) = model_with_blog();
        let special = model.add_type(
            "SpecialBlog".to_string(),
            Some(ClrType::class("SpecialBlog")),
            false,
            TypeKind::Entity,
            Explicit,
        );
        model.set_base_type(special, Some(blog), Some(Explicit));
        assert_eq!(model.base_types(special), vec![blog]);
        assert_eq!(model.root_type(special), blog);
        assert_eq!(model.derived_types_inclusive(blog), vec![blog, special]);
        assert!(model.find_property(special, "Id").is_some());
        assert!(model.is_same_or_derived(blog, special));
        assert!(!model.is_same_or_derived(special, blog));
    }

    #[test]
    fn complex_property_owns_complex_type() {
        let (mut model, blog, _) = model_with_blog();
        let (cp, complex_type) = model.add_complex_property(
            blog,
            "Address",
            ClrType::structure("Address"),
            false,
            Explicit,
        );
        assert_eq!(model[complex_type].name(), "Blog.Address#Address");
        assert_eq!(model[complex_type].defining_property(), Some(cp));
        assert!(model.find_entity_type("Blog.Address#Address").is_none());

        model.remove_complex_property(cp);
        assert!(model.get_type(complex_type).is_none());
    }

    #[test]
    fn member_identity_uses_shapes() {
        let (mut model, blog, _) = model_with_blog();
        model.shapes.insert(
            "Blog".to_string(),
            ClrShape::class("Blog").with_property("Title", ClrType::String),
        );
        assert_eq!(
            model.member_identity(blog, "Title"),
            MemberIdentity::Clr("Title".to_string())
        );
        assert_eq!(model.member_identity(blog, "Secret"), MemberIdentity::Shadow);
    }

    #[test]
    fn read_only_model_rejects_mutation_checks() {
        let mut model = Model::new();
        assert!(model.ensure_mutable().is_ok());
        model.read_only = true;
        assert_eq!(model.ensure_mutable(), Err(ModelError::ReadOnlyModel));
    }
}
