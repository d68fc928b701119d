//! # Relationships
//!
//! Foreign key creation and validation, the per-relationship facets and the
//! navigation slots on both ends.
//!
//! ## Invariants
//!
//! - Dependent properties are declared on the dependent hierarchy and appear
//!   at most once.
//! - The principal key is a key of the principal hierarchy with the same
//!   number of properties, pairwise equal once `Nullable<T>` is stripped.
//! - At most one foreign key per (dependent hierarchy, properties, principal
//!   key).

use super::type_base::clear_ignored;
use super::{ModelBuilder, TypeBuilder, annotatable_builder};
use crate::annotations::Annotations;
use crate::conventions::ModelEvent;
use crate::model::Model;
use crate::model::elements::ForeignKey;
use crate::model::members::{MemberKind, MemberRef};
use crate::snapshot::RelationshipSnapshot;
use crate::source::ConfigurationSource;
use crate::{
    ClrType, DeleteBehavior, ForeignKeyId, KeyId, ModelError, NavigationId, PropertyId, TypeId,
};

// =============================================================================
// VALIDATION
// =============================================================================

/// Check a dependent property list against a principal key.
pub(crate) fn validate_foreign_key(
    model: &Model,
    dependent: TypeId,
    properties: &[PropertyId],
    principal: TypeId,
    key: KeyId,
) -> Result<(), ModelError> {
    check_dependent_properties(model, dependent, properties)?;
    if !model.key_belongs_to(key, principal) {
        return Err(ModelError::ForeignKeyReferencedKeyMismatch {
            key: model
                .get_key(key)
                .map_or_else(|| key.to_string(), |k| model.display_properties(&k.properties)),
            principal_type: model[principal].name.clone(),
        });
    }
    let principal_properties = &model[key].properties;
    let mismatch = || {
        (
            model.display_properties(properties),
            model[dependent].name.clone(),
            model.display_properties(principal_properties),
            model[principal].name.clone(),
        )
    };
    if principal_properties.len() != properties.len() {
        let (dependent_properties, dependent_type, principal_properties, principal_type) =
            mismatch();
        return Err(ModelError::ForeignKeyCountMismatch {
            dependent_properties,
            dependent_type,
            principal_properties,
            principal_type,
        });
    }
    let types_match = properties
        .iter()
        .zip(principal_properties)
        .all(|(d, p)| model[*d].clr_type.matches_unwrapped(&model[*p].clr_type));
    if !types_match {
        let (dependent_properties, dependent_type, principal_properties, principal_type) =
            mismatch();
        return Err(ModelError::ForeignKeyTypeMismatch {
            dependent_properties,
            dependent_type,
            principal_properties,
            principal_type,
        });
    }
    Ok(())
}

fn check_dependent_properties(
    model: &Model,
    dependent: TypeId,
    properties: &[PropertyId],
) -> Result<(), ModelError> {
    let chain = model.base_types_inclusive(dependent);
    for (position, property) in properties.iter().enumerate() {
        let declared = model
            .get_property(*property)
            .is_some_and(|p| chain.contains(&p.declaring_type));
        if !declared {
            return Err(ModelError::ForeignKeyPropertiesWrongType {
                properties: model.display_properties(properties),
                dependent_type: model[dependent].name.clone(),
            });
        }
        if properties[..position].contains(property) {
            return Err(ModelError::DuplicatePropertyInList {
                property: model[*property].name.clone(),
                context: "the foreign key".to_string(),
                type_name: model[dependent].name.clone(),
            });
        }
    }
    Ok(())
}

/// An existing foreign key equivalent to (dependent, properties, key).
fn duplicate_of(
    model: &Model,
    dependent: TypeId,
    properties: &[PropertyId],
    key: KeyId,
    principal: TypeId,
    except: Option<ForeignKeyId>,
) -> Option<ModelError> {
    let duplicate = model
        .find_foreign_keys_in_hierarchy(dependent, properties, key)
        .into_iter()
        .find(|fk| Some(*fk) != except)?;
    Some(ModelError::DuplicateForeignKey {
        properties: model.display_properties(properties),
        dependent_type: model[dependent].name.clone(),
        key: model.display_properties(&model[key].properties),
        principal_type: model[principal].name.clone(),
        duplicate_type: model[model[duplicate].declaring_type].name.clone(),
    })
}

// =============================================================================
// CREATION
// =============================================================================

fn plan_relationship(
    model: &Model,
    dependent: TypeId,
    principal: TypeId,
    properties: Option<&[PropertyId]>,
    key: Option<KeyId>,
) -> Result<(), ModelError> {
    for t in [dependent, principal] {
        if !model[t].is_entity_type() {
            return Err(ModelError::NotAnEntityType(model[t].name.clone()));
        }
    }
    if model[principal].is_keyless() {
        return Err(ModelError::PrincipalKeyless(model[principal].name.clone()));
    }
    let key = key.or_else(|| model.find_primary_key(principal));
    match (properties, key) {
        (Some(properties), Some(key)) => {
            validate_foreign_key(model, dependent, properties, principal, key)?;
            match duplicate_of(model, dependent, properties, key, principal, None) {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
        (Some(properties), None) => check_dependent_properties(model, dependent, properties),
        (None, Some(key)) if !model.key_belongs_to(key, principal) => {
            Err(ModelError::ForeignKeyReferencedKeyMismatch {
                key: model.display_properties(&model[key].properties),
                principal_type: model[principal].name.clone(),
            })
        }
        (None, _) => Ok(()),
    }
}

impl TypeBuilder<'_> {
    /// Create a relationship with this type as the dependent.
    ///
    /// Without `principal_key` the principal's primary key is used; a
    /// principal without one gets a temporary shadow key. Without
    /// `properties` nullable shadow properties named after the principal
    /// and its key are synthesized.
    pub fn has_relationship(
        &mut self,
        principal: TypeId,
        properties: Option<&[PropertyId]>,
        principal_key: Option<KeyId>,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        self.mb.check_type(principal)?;
        if let Some(key) = principal_key {
            self.mb.check_key(key)?;
        }
        let dependent = self.id;
        if let Err(error) =
            plan_relationship(&self.mb.model, dependent, principal, properties, principal_key)
        {
            return source.reject(|| error);
        }

        self.mb.batch(|mb| {
            let key = match principal_key.or_else(|| mb.model.find_primary_key(principal)) {
                Some(key) => key,
                None => temporary_key(mb, principal, properties)?,
            };
            let resolved = match properties {
                Some(properties) => properties.to_vec(),
                None => synthesize_properties(mb, dependent, principal, key)?,
            };
            validate_foreign_key(&mb.model, dependent, &resolved, principal, key)?;
            if let Some(error) = duplicate_of(&mb.model, dependent, &resolved, key, principal, None)
            {
                return Err(error);
            }

            let fk = mb
                .model
                .add_foreign_key(dependent, resolved, principal, key, source);
            let foreign_key = &mut mb.model[fk];
            if properties.is_some() {
                foreign_key.properties_source = Some(source);
                foreign_key.principal_end_source = Some(source);
            }
            if principal_key.is_some() {
                foreign_key.principal_key_source = Some(source);
                foreign_key.principal_end_source = Some(source);
            }
            tracing::debug!(
                dependent = %mb.model[dependent].name,
                principal = %mb.model[principal].name,
                properties = %mb.model.display_properties(&mb.model[fk].properties),
                %source,
                "relationship added"
            );
            mb.notify(ModelEvent::ForeignKeyAdded(fk));
            Ok(Some(fk))
        })
    }

    #[must_use]
    pub fn can_add_relationship(
        &self,
        principal: TypeId,
        properties: Option<&[PropertyId]>,
        principal_key: Option<KeyId>,
    ) -> bool {
        let model = &self.mb.model;
        !model.is_read_only()
            && model.get_type(principal).is_some()
            && principal_key.is_none_or(|k| model.get_key(k).is_some())
            && plan_relationship(model, self.id, principal, properties, principal_key).is_ok()
    }

    /// Remove a relationship declared on this type, together with the
    /// convention shadow properties and temporary key it no longer needs.
    pub fn has_no_relationship(
        &mut self,
        fk: ForeignKeyId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        self.mb.check_foreign_key(fk)?;
        let foreign_key = &self.mb.model[fk];
        if !source.overrides(Some(foreign_key.source)) {
            let element = describe(&self.mb.model, fk);
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        let properties = foreign_key.properties.clone();
        let key = foreign_key.principal_key;
        self.mb.batch(|mb| {
            mb.remove_foreign_key_raw(fk);
            prune_shadow_properties(mb, &properties);
            prune_temporary_key(mb, key);
            Ok(true)
        })
    }
}

/// Shadow key on the principal root for a principal with no primary key.
fn temporary_key(
    mb: &mut ModelBuilder,
    principal: TypeId,
    properties: Option<&[PropertyId]>,
) -> Result<KeyId, ModelError> {
    let root = mb.model.root_type(principal);
    let base = mb.config().temporary_key_name.clone();
    let types: Vec<ClrType> = match properties {
        Some(properties) => properties
            .iter()
            .map(|p| mb.model[*p].clr_type.unwrap_nullable().clone())
            .collect(),
        None => vec![mb.config().key_type()?],
    };
    let bases: Vec<(String, ClrType)> = types.into_iter().map(|t| (base.clone(), t)).collect();
    let mut builder = TypeBuilder::new(mb, root);
    let key_properties =
        builder.create_unique_properties(&bases, ConfigurationSource::Convention)?;
    builder
        .primary_key(&key_properties, ConfigurationSource::Convention)?
        .ok_or_else(|| ModelError::PrincipalKeyless(builder.metadata().name.clone()))
}

/// Nullable shadow properties `<Principal><KeyProperty>` on the dependent.
fn synthesize_properties(
    mb: &mut ModelBuilder,
    dependent: TypeId,
    principal: TypeId,
    key: KeyId,
) -> Result<Vec<PropertyId>, ModelError> {
    let principal_name = &mb.model[principal].name;
    let prefix = principal_name
        .rsplit('.')
        .next()
        .unwrap_or(principal_name)
        .to_string();
    let bases: Vec<(String, ClrType)> = mb.model[key]
        .properties
        .iter()
        .map(|p| {
            let property = &mb.model[*p];
            let name = if property.name.starts_with(&prefix) {
                property.name.clone()
            } else {
                format!("{}{}", prefix, property.name)
            };
            (name, property.clr_type.clone().make_nullable())
        })
        .collect();
    TypeBuilder::new(mb, dependent)
        .create_unique_properties(&bases, ConfigurationSource::Convention)
}

/// Remove `Convention` shadow properties nothing uses any more.
pub(crate) fn prune_shadow_properties(mb: &mut ModelBuilder, properties: &[PropertyId]) {
    for property in properties {
        let unused = mb.model.get_property(*property).is_some_and(|p| {
            p.source == ConfigurationSource::Convention && p.member.is_shadow() && !p.is_in_use()
        });
        if unused {
            mb.remove_property_raw(*property);
        }
    }
}

/// Remove a synthesized temporary key once nothing references it.
fn prune_temporary_key(mb: &mut ModelBuilder, key: KeyId) {
    let temporary = mb.config().temporary_key_name.clone();
    let Some(k) = mb.model.get_key(key) else {
        return;
    };
    let is_temporary = k.source == ConfigurationSource::Convention
        && k.referencing_foreign_keys.is_empty()
        && k.properties.iter().all(|p| {
            let p = &mb.model[*p];
            p.member.is_shadow() && p.name.starts_with(temporary.as_str())
        });
    let properties = k.properties.clone();
    if is_temporary {
        tracing::debug!(key = %key, "temporary key removed");
        mb.remove_key_raw(key);
        prune_shadow_properties(mb, &properties);
    }
}

fn describe(model: &Model, fk: ForeignKeyId) -> String {
    let foreign_key = &model[fk];
    format!(
        "the foreign key {} from '{}' to '{}'",
        model.display_properties(&foreign_key.properties),
        model[foreign_key.declaring_type].name,
        model[foreign_key.principal_type].name
    )
}

// =============================================================================
// NAVIGATION PLANNING
// =============================================================================

#[derive(Debug)]
enum NavigationPlan {
    Unchanged,
    Remove(NavigationId),
    Set {
        old: Option<NavigationId>,
        conflicts: Vec<MemberRef>,
        unique: Option<bool>,
    },
    Reject(ModelError),
}

fn plan_navigation(
    model: &Model,
    fk: ForeignKeyId,
    name: Option<&str>,
    pointing_to_principal: bool,
    source: ConfigurationSource,
) -> NavigationPlan {
    let foreign_key = &model[fk];
    let (declaring, target, old, slot_source) = if pointing_to_principal {
        (
            foreign_key.declaring_type,
            foreign_key.principal_type,
            foreign_key.dependent_to_principal,
            foreign_key.dependent_to_principal_source,
        )
    } else {
        (
            foreign_key.principal_type,
            foreign_key.declaring_type,
            foreign_key.principal_to_dependent,
            foreign_key.principal_to_dependent_source,
        )
    };
    let old_name = old.map(|n| model[n].name.as_str());
    if old_name == name {
        return NavigationPlan::Unchanged;
    }
    if !source.can_set(slot_source, false) {
        return NavigationPlan::Reject(ModelError::CannotRemove {
            element: format!(
                "the navigation {} on '{}'",
                old_name.unwrap_or("slot"),
                model[declaring].name
            ),
        });
    }

    let Some(name) = name else {
        return match old {
            Some(old) if foreign_key.is_ownership() && !pointing_to_principal => {
                NavigationPlan::Reject(ModelError::OwnershipNavigationRemoval {
                    navigation: model[old].name.clone(),
                    type_name: model[declaring].name.clone(),
                    owned_type: model[target].name.clone(),
                })
            }
            Some(old) => NavigationPlan::Remove(old),
            None => NavigationPlan::Unchanged,
        };
    };

    if name.trim().is_empty() {
        return NavigationPlan::Reject(ModelError::InvalidName(name.to_string()));
    }
    if model[target].is_keyless() {
        return NavigationPlan::Reject(ModelError::NavigationToKeylessType {
            navigation: name.to_string(),
            type_name: model[declaring].name.clone(),
            target: model[target].name.clone(),
        });
    }
    if model.is_member_ignored(declaring, name, source) {
        return NavigationPlan::Reject(ModelError::Ignored {
            name: name.to_string(),
            owner: model[declaring].name.clone(),
        });
    }

    let mut conflicts = Vec::new();
    for member in model.find_members_in_hierarchy(declaring, name) {
        if Some(member) == old.map(MemberRef::Navigation) {
            continue;
        }
        let member_source = model.member_source(member);
        if member_source == Some(ConfigurationSource::Explicit) || !source.overrides(member_source)
        {
            let conflicting_type = model[model.member(member).declaring_type()].name.clone();
            return NavigationPlan::Reject(ModelError::ConflictingMember {
                member: name.to_string(),
                kind: MemberKind::Navigation.to_string(),
                type_name: model[declaring].name.clone(),
                conflicting_kind: member.kind().to_string(),
                conflicting_type,
            });
        }
        conflicts.push(member);
    }

    let mut unique = None;
    if let Some(member) = model.clr_member(declaring, name) {
        let is_collection = member.clr_type.is_collection();
        let element = member.clr_type.element_type().unwrap_or(&member.clr_type);
        if let Some(target_shape) = model[target].clr_type.as_ref().and_then(ClrType::shape_name)
            && element.shape_name() != Some(target_shape)
        {
            return NavigationPlan::Reject(ModelError::NavigationTargetMismatch {
                navigation: name.to_string(),
                type_name: model[declaring].name.clone(),
                clr_type: member.clr_type.to_string(),
                target: model[target].name.clone(),
            });
        }
        let shape_error = |expected: &str| {
            NavigationPlan::Reject(ModelError::NavigationShapeMismatch {
                navigation: name.to_string(),
                type_name: model[declaring].name.clone(),
                expected: expected.to_string(),
            })
        };
        if pointing_to_principal {
            if is_collection {
                return shape_error("a reference");
            }
        } else if is_collection == foreign_key.is_unique() {
            let wanted = !is_collection;
            if !foreign_key.is_unique.can_set(Some(&wanted), source) {
                return shape_error(if wanted { "a collection" } else { "a reference" });
            }
            unique = Some(wanted);
        }
    }

    NavigationPlan::Set {
        old,
        conflicts,
        unique,
    }
}

// =============================================================================
// FOREIGN KEY BUILDER
// =============================================================================

/// Builder over one relationship.
pub struct ForeignKeyBuilder<'m> {
    pub(crate) mb: &'m mut ModelBuilder,
    pub(crate) id: ForeignKeyId,
}

impl<'m> ForeignKeyBuilder<'m> {
    pub(crate) fn new(mb: &'m mut ModelBuilder, id: ForeignKeyId) -> Self {
        Self { mb, id }
    }

    #[must_use]
    pub fn id(&self) -> ForeignKeyId {
        self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &ForeignKey {
        &self.mb.model[self.id]
    }

    fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.mb.model[self.id].annotations
    }

    // =========================================================================
    // PROPERTIES & PRINCIPAL KEY
    // =========================================================================

    /// Replace the dependent properties. `None` hands them back to
    /// convention without changing them.
    pub fn has_foreign_key_properties(
        &mut self,
        properties: Option<&[PropertyId]>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let fk = self.id;
        let model = &self.mb.model;
        let foreign_key = &model[fk];
        let unchanged = properties.is_none_or(|p| p == foreign_key.properties.as_slice());
        if !source.can_set(foreign_key.properties_source, unchanged) {
            let element = describe(model, fk);
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        let Some(properties) = properties else {
            if source.overrides(foreign_key.properties_source) {
                self.mb.model[fk].properties_source = None;
            }
            return Ok(true);
        };
        if unchanged {
            let foreign_key = &mut self.mb.model[fk];
            foreign_key.properties_source = Some(source.max(foreign_key.properties_source));
            return Ok(true);
        }
        let (dependent, principal, key) = (
            foreign_key.declaring_type,
            foreign_key.principal_type,
            foreign_key.principal_key,
        );
        let check = validate_foreign_key(model, dependent, properties, principal, key).and_then(
            |()| match duplicate_of(model, dependent, properties, key, principal, Some(fk)) {
                Some(error) => Err(error),
                None => Ok(()),
            },
        );
        if let Err(error) = check {
            return source.refuse(|| error);
        }

        self.mb.batch(|mb| {
            let old = mb.model[fk].properties.clone();
            mb.model.set_foreign_key_properties(fk, properties.to_vec());
            let foreign_key = &mut mb.model[fk];
            foreign_key.properties_source = Some(source.max(foreign_key.properties_source));
            mb.notify(ModelEvent::ForeignKeyPropertiesChanged(fk));
            prune_shadow_properties(mb, &old);
            Ok(true)
        })
    }

    /// Point the relationship at another key of the principal. Convention
    /// dependent properties are re-synthesized when they no longer fit.
    /// `None` goes back to the principal's primary key.
    pub fn has_principal_key(
        &mut self,
        key: Option<KeyId>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let fk = self.id;
        let model = &self.mb.model;
        let foreign_key = &model[fk];
        let principal = foreign_key.principal_type;
        let target = match key {
            Some(key) => key,
            None => match model.find_primary_key(principal) {
                Some(pk) => pk,
                None => {
                    let name = model[principal].name.clone();
                    return source.refuse(|| ModelError::PrincipalKeyless(name));
                }
            },
        };
        let unchanged = target == foreign_key.principal_key;
        if !source.can_set(foreign_key.principal_key_source, unchanged) {
            let element = describe(model, fk);
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        if unchanged {
            let ratcheted = key.map(|_| source.max(foreign_key.principal_key_source));
            self.mb.model[fk].principal_key_source = ratcheted;
            return Ok(true);
        }
        let dependent = foreign_key.declaring_type;
        let fits =
            validate_foreign_key(model, dependent, &foreign_key.properties, principal, target);
        let resynthesize = match fits {
            Ok(()) => false,
            Err(_) if source.overrides(foreign_key.properties_source) => true,
            Err(error) => return source.refuse(|| error),
        };
        if !model.key_belongs_to(target, principal) {
            let error = ModelError::ForeignKeyReferencedKeyMismatch {
                key: model.display_properties(&model[target].properties),
                principal_type: model[principal].name.clone(),
            };
            return source.refuse(|| error);
        }
        if !resynthesize
            && let Some(error) =
                duplicate_of(model, dependent, &foreign_key.properties, target, principal, Some(fk))
        {
            return source.refuse(|| error);
        }

        self.mb.batch(|mb| {
            let old = mb.model[fk].properties.clone();
            if resynthesize {
                let properties = synthesize_properties(mb, dependent, principal, target)?;
                mb.model.set_foreign_key_properties(fk, properties);
                mb.model[fk].properties_source = None;
            }
            mb.model.set_principal_key(fk, target);
            mb.model[fk].principal_key_source = key.map(|_| source);
            mb.notify(ModelEvent::ForeignKeyPropertiesChanged(fk));
            prune_shadow_properties(mb, &old);
            Ok(true)
        })
    }

    /// Swap the principal and dependent ends. Properties and principal key
    /// are re-derived; navigations move with their ends.
    pub fn invert(
        &mut self,
        source: ConfigurationSource,
    ) -> Result<Option<ForeignKeyId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        let fk = self.id;
        let model = &self.mb.model;
        let foreign_key = &model[fk];
        let allowed = source.can_set(foreign_key.principal_end_source, false)
            && source.overrides(foreign_key.properties_source)
            && source.overrides(foreign_key.principal_key_source);
        if !allowed {
            let element = describe(model, fk);
            return source.reject(|| ModelError::CannotRemove { element });
        }
        if model[foreign_key.declaring_type].is_keyless() {
            let name = model[foreign_key.declaring_type].name.clone();
            return source.reject(|| ModelError::PrincipalKeyless(name));
        }
        let properties = foreign_key.properties.clone();
        self.mb.batch(|mb| {
            let snapshot = RelationshipSnapshot::detach(mb, fk);
            prune_shadow_properties(mb, &properties);
            let inverted = snapshot.inverted(source);
            tracing::debug!(
                dependent = %inverted.dependent_type,
                principal = %inverted.principal_type,
                "relationship inverted"
            );
            inverted.attach(mb)
        })
    }

    // =========================================================================
    // FACETS
    // =========================================================================

    /// Set or reset uniqueness.
    pub fn is_unique(
        &mut self,
        unique: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let fk = self.id;
        if let Some(error) = self.uniqueness_error(unique) {
            return source.refuse(|| error);
        }
        let before = self.mb.model[fk].is_unique();
        if !self.mb.model[fk].is_unique.set(unique, source) {
            return Ok(false);
        }
        if before != self.mb.model[fk].is_unique() {
            self.mb.batch(|mb| {
                mb.notify(ModelEvent::ForeignKeyUniquenessChanged(fk));
                Ok(())
            })?;
        }
        Ok(true)
    }

    #[must_use]
    pub fn can_set_is_unique(&self, unique: Option<bool>, source: ConfigurationSource) -> bool {
        !self.mb.model.is_read_only()
            && self.uniqueness_error(unique).is_none()
            && self.mb.model[self.id]
                .is_unique
                .can_set(unique.as_ref(), source)
    }

    fn uniqueness_error(&self, unique: Option<bool>) -> Option<ModelError> {
        let model = &self.mb.model;
        let foreign_key = &model[self.id];
        let unique = unique.unwrap_or(false);
        if !unique
            && foreign_key.is_required_dependent()
            && foreign_key.is_required_dependent_source() == Some(ConfigurationSource::Explicit)
        {
            return Some(ModelError::RequiredDependentNotUnique {
                dependent_type: model[foreign_key.declaring_type].name.clone(),
                principal_type: model[foreign_key.principal_type].name.clone(),
            });
        }
        let navigation = foreign_key.principal_to_dependent?;
        let is_collection = model[navigation].clr_type.as_ref()?.is_collection();
        (is_collection == unique).then(|| ModelError::NavigationShapeMismatch {
            navigation: model[navigation].name.clone(),
            type_name: model[foreign_key.principal_type].name.clone(),
            expected: if unique { "a reference" } else { "a collection" }.to_string(),
        })
    }

    /// Set or reset requiredness.
    ///
    /// Making the relationship optional turns non-nullable convention
    /// shadow properties nullable; other non-nullable properties block it.
    pub fn is_required(
        &mut self,
        required: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let fk = self.id;
        let model = &self.mb.model;
        let foreign_key = &model[fk];
        if !foreign_key.is_required.can_set(required.as_ref(), source) {
            return Ok(false);
        }
        let mut retype = Vec::new();
        let mut relax = Vec::new();
        if required == Some(false) {
            for property in &foreign_key.properties {
                let p = &model[*property];
                if p.is_nullable() {
                    continue;
                }
                let shadow_by_convention = p.source == ConfigurationSource::Convention
                    && p.member.is_shadow()
                    && p.type_source.is_none_or(|s| s == ConfigurationSource::Convention);
                if p.keys.is_empty() && !p.clr_type.is_nullable() && shadow_by_convention {
                    retype.push(*property);
                } else if p.keys.is_empty()
                    && p.clr_type.is_nullable()
                    && source.overrides(p.is_nullable.source())
                {
                    relax.push(*property);
                } else {
                    let error = ModelError::ForeignKeyCannotBeOptional {
                        properties: model.display_properties(&foreign_key.properties),
                        dependent_type: model[foreign_key.declaring_type].name.clone(),
                    };
                    return source.refuse(|| error);
                }
            }
        }
        self.mb.batch(|mb| {
            for property in retype {
                let p = &mut mb.model[property];
                p.clr_type = p.clr_type.clone().make_nullable();
                mb.notify(ModelEvent::PropertyNullabilityChanged(property));
            }
            for property in relax {
                mb.model[property].is_nullable.set(None, source);
                mb.notify(ModelEvent::PropertyNullabilityChanged(property));
            }
            Ok(mb.model[fk].is_required.set(required, source))
        })
    }

    /// Require a dependent for every principal; forces uniqueness.
    pub fn is_required_dependent(
        &mut self,
        required: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let fk = self.id;
        let foreign_key = &self.mb.model[fk];
        if !foreign_key
            .is_required_dependent
            .can_set(required.as_ref(), source)
        {
            return Ok(false);
        }
        if required == Some(true) && !foreign_key.is_unique() {
            if !self.can_set_is_unique(Some(true), source) {
                let model = &self.mb.model;
                let foreign_key = &model[fk];
                let error = ModelError::RequiredDependentNotUnique {
                    dependent_type: model[foreign_key.declaring_type].name.clone(),
                    principal_type: model[foreign_key.principal_type].name.clone(),
                };
                return source.refuse(|| error);
            }
            self.is_unique(Some(true), source)?;
        }
        Ok(self.mb.model[fk].is_required_dependent.set(required, source))
    }

    pub fn on_delete(
        &mut self,
        behavior: Option<DeleteBehavior>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        Ok(self.mb.model[self.id].delete_behavior.set(behavior, source))
    }

    /// Mark the relationship as an ownership; the dependent becomes owned.
    pub fn is_ownership(
        &mut self,
        ownership: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let fk = self.id;
        let model = &self.mb.model;
        let foreign_key = &model[fk];
        if !foreign_key.is_ownership.can_set(ownership.as_ref(), source) {
            return Ok(false);
        }
        let (dependent, principal) = (foreign_key.declaring_type, foreign_key.principal_type);
        if ownership == Some(true) {
            let cycle = match model.ownership_path(principal) {
                Ok(path) => principal == dependent || path.contains(&dependent),
                Err(error) => return source.refuse(|| error),
            };
            if cycle {
                let error = ModelError::OwnershipCycle {
                    owned_type: model[dependent].name.clone(),
                    owner: model[principal].name.clone(),
                };
                return source.refuse(|| error);
            }
        }
        let before = foreign_key.is_ownership();
        self.mb.batch(|mb| {
            let accepted = mb.model[fk].is_ownership.set(ownership, source);
            let owned = mb.model[fk].is_ownership();
            if accepted && before != owned {
                mb.model[dependent].is_owned.set(Some(owned), source);
                tracing::debug!(
                    owned_type = %mb.model[dependent].name,
                    owner = %mb.model[principal].name,
                    owned,
                    "ownership changed"
                );
                mb.notify(ModelEvent::ForeignKeyOwnershipChanged(fk));
            }
            Ok(accepted)
        })
    }

    // =========================================================================
    // NAVIGATIONS
    // =========================================================================

    /// Set, rename or remove the navigation on one end.
    ///
    /// `pointing_to_principal` selects the navigation declared on the
    /// dependent. The old navigation's removal is queued before the new one
    /// is added.
    pub fn has_navigation(
        &mut self,
        name: Option<&str>,
        pointing_to_principal: bool,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let fk = self.id;
        match plan_navigation(&self.mb.model, fk, name, pointing_to_principal, source) {
            NavigationPlan::Reject(error) => source.refuse(|| error),
            NavigationPlan::Unchanged => {
                let foreign_key = &mut self.mb.model[fk];
                let slot = if pointing_to_principal {
                    &mut foreign_key.dependent_to_principal_source
                } else {
                    &mut foreign_key.principal_to_dependent_source
                };
                if name.is_some() || slot.is_some() {
                    *slot = Some(source.max(*slot));
                }
                Ok(true)
            }
            NavigationPlan::Remove(old) => self.mb.batch(|mb| {
                tracing::debug!(navigation = %mb.model[old].name, %source, "navigation removed");
                mb.remove_navigation_raw(old);
                let foreign_key = &mut mb.model[fk];
                let slot = if pointing_to_principal {
                    &mut foreign_key.dependent_to_principal_source
                } else {
                    &mut foreign_key.principal_to_dependent_source
                };
                *slot = Some(source.max(*slot));
                Ok(true)
            }),
            NavigationPlan::Set {
                old,
                conflicts,
                unique,
            } => {
                let name = name.unwrap_or_default();
                self.mb.batch(|mb| {
                    for member in conflicts {
                        mb.remove_member_raw(member);
                    }
                    if let Some(old) = old {
                        mb.remove_navigation_raw(old);
                    }
                    if let Some(unique) = unique {
                        mb.model[fk].is_unique.set(Some(unique), source);
                        mb.notify(ModelEvent::ForeignKeyUniquenessChanged(fk));
                    }
                    let declaring = if pointing_to_principal {
                        mb.model[fk].declaring_type
                    } else {
                        mb.model[fk].principal_type
                    };
                    clear_ignored(&mut mb.model, declaring, name);
                    let navigation =
                        mb.model
                            .add_navigation(fk, name, pointing_to_principal, source);
                    tracing::debug!(
                        entity_type = %mb.model[declaring].name,
                        navigation = name,
                        %source,
                        "navigation added"
                    );
                    mb.notify(ModelEvent::NavigationAdded(navigation));
                    Ok(true)
                })
            }
        }
    }

    #[must_use]
    pub fn can_set_navigation(
        &self,
        name: Option<&str>,
        pointing_to_principal: bool,
        source: ConfigurationSource,
    ) -> bool {
        !self.mb.model.is_read_only()
            && !matches!(
                plan_navigation(&self.mb.model, self.id, name, pointing_to_principal, source),
                NavigationPlan::Reject(_)
            )
    }
}

annotatable_builder!(ForeignKeyBuilder);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropertyBase;
    use crate::source::ConfigurationSource::{Convention, DataAnnotation, Explicit};
    use crate::{ClrShape, TypeIdentity};

    /// Blog(Id) <- Post(Id, BlogId)
    fn blog_and_post() -> (ModelBuilder, TypeId, TypeId, PropertyId) {
        let mut mb = ModelBuilder::new();
        mb.register_shape(
            ClrShape::class("Blog")
                .with_property("Id", ClrType::Int32)
                .with_property("Posts", ClrType::collection_of(ClrType::class("Post")))
                .with_property("Featured", ClrType::class("Post"))
                .with_property("Archive", ClrType::class("Blog")),
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
            .expect("blog")
            .expect("created");
        let post = mb
            .entity(TypeIdentity::class("Post"), Explicit, None)
            .expect("post")
            .expect("created");
        for (t, name) in [(blog, "Id"), (post, "Id")] {
            let mut builder = mb.type_builder(t).expect("builder");
            let id = builder
                .property(name, None, Explicit)
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
        (mb, blog, post, blog_id)
    }

    #[test]
    fn duplicate_foreign_key_is_rejected() {
        let (mut mb, blog, post, blog_id) = blog_and_post();
        let mut builder = mb.type_builder(post).expect("builder");
        builder
            .has_relationship(blog, Some(&[blog_id]), None, Explicit)
            .expect("first")
            .expect("created");
        assert_eq!(
            builder
                .has_relationship(blog, Some(&[blog_id]), None, Convention)
                .expect("silent"),
            None
        );
        assert!(matches!(
            builder.has_relationship(blog, Some(&[blog_id]), None, Explicit),
            Err(ModelError::DuplicateForeignKey { .. })
        ));
    }

    #[test]
    fn count_and_type_mismatch_are_rejected() {
        let (mut mb, blog, post, blog_id) = blog_and_post();
        let title = mb
            .type_builder(post)
            .expect("builder")
            .property("Title", Some(ClrType::String), Explicit)
            .expect("property")
            .expect("created");
        let mut builder = mb.type_builder(post).expect("builder");
        assert!(matches!(
            builder.has_relationship(blog, Some(&[blog_id, title]), None, Explicit),
            Err(ModelError::ForeignKeyCountMismatch { .. })
        ));
        assert!(matches!(
            builder.has_relationship(blog, Some(&[title]), None, Explicit),
            Err(ModelError::ForeignKeyTypeMismatch { .. })
        ));
        assert!(!builder.can_add_relationship(blog, Some(&[title]), None));
    }

    #[test]
    fn shadow_properties_are_synthesized() {
        let (mut mb, blog, post, _) = blog_and_post();
        let fk = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, None, None, Convention)
            .expect("relationship")
            .expect("created");
        let model = mb.model();
        let property = &model[model[fk].properties()[0]];
        assert_eq!(property.name(), "BlogId1");
        assert_eq!(property.clr_type(), &ClrType::Int32.make_nullable());
        assert!(!model.is_required(fk));
        assert_eq!(model[fk].properties_source(), None);
    }

    #[test]
    fn keyless_principal_is_rejected() {
        let (mut mb, blog, post, _) = blog_and_post();
        let view = mb
            .entity(TypeIdentity::named("View"), Explicit, None)
            .expect("view")
            .expect("created");
        mb.type_builder(view)
            .expect("builder")
            .is_keyless(Some(true), Explicit)
            .expect("keyless");
        let result = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(view, None, None, Explicit);
        assert!(matches!(result, Err(ModelError::PrincipalKeyless(_))));
        assert!(mb.model()[blog].is_entity_type());
    }

    #[test]
    fn keyless_principal_without_pk_gets_temporary_key() {
        let mut mb = ModelBuilder::new();
        let tag = mb
            .entity(TypeIdentity::named("Tag"), Explicit, None)
            .expect("tag")
            .expect("created");
        let post = mb
            .entity(TypeIdentity::named("Post"), Explicit, None)
            .expect("post")
            .expect("created");
        let fk = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(tag, None, None, Convention)
            .expect("relationship")
            .expect("created");
        let key = mb.model()[fk].principal_key();
        let key_property = mb.model()[key].properties()[0];
        assert_eq!(mb.model()[key_property].name(), "TempId");

        mb.type_builder(post)
            .expect("builder")
            .has_no_relationship(fk, Convention)
            .expect("remove");
        assert!(mb.model().get_key(key).is_none());
        assert!(mb.model().find_property(tag, "TempId").is_none());
    }

    #[test]
    fn explicit_null_navigation_removes_convention_navigation() {
        let (mut mb, blog, post, blog_id) = blog_and_post();
        let fk = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, Some(&[blog_id]), None, Explicit)
            .expect("relationship")
            .expect("created");
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        assert!(builder.has_navigation(Some("Posts"), false, Convention).expect("nav"));
        assert!(builder.has_navigation(Some("Blog"), true, Convention).expect("nav"));
        assert!(builder.has_navigation(None, false, Explicit).expect("remove"));

        let model = mb.model();
        assert!(model.find_navigation(blog, "Posts").is_none());
        assert_eq!(model[fk].principal_to_dependent(), None);
        assert_eq!(model[fk].principal_to_dependent_source(), Some(Explicit));
        let inverse = model[fk].dependent_to_principal().expect("inverse kept");
        assert_eq!(model.inverse_navigation(inverse), None);

        // A later convention cannot bring it back
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        assert!(!builder.has_navigation(Some("Posts"), false, Convention).expect("silent"));
    }

    #[test]
    fn navigation_shape_drives_uniqueness() {
        let (mut mb, blog, post, blog_id) = blog_and_post();
        let fk = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, Some(&[blog_id]), None, Explicit)
            .expect("relationship")
            .expect("created");
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        builder
            .has_navigation(Some("Featured"), false, DataAnnotation)
            .expect("nav");
        assert!(mb.model()[fk].is_unique());
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        assert!(matches!(
            builder.is_unique(Some(false), Explicit),
            Err(ModelError::NavigationShapeMismatch { .. })
        ));
        assert!(matches!(
            builder.has_navigation(Some("Archive"), false, Explicit),
            Err(ModelError::NavigationTargetMismatch { .. })
        ));
    }

    #[test]
    fn required_dependent_forces_uniqueness() {
        let (mut mb, blog, post, blog_id) = blog_and_post();
        let fk = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, Some(&[blog_id]), None, Explicit)
            .expect("relationship")
            .expect("created");
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        assert!(builder.is_required_dependent(Some(true), Explicit).expect("required"));
        assert!(mb.model()[fk].is_unique());
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        assert!(matches!(
            builder.is_unique(Some(false), Explicit),
            Err(ModelError::RequiredDependentNotUnique { .. })
        ));
    }

    #[test]
    fn optional_relationship_needs_nullable_properties() {
        let (mut mb, blog, post, blog_id) = blog_and_post();
        let fk = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, Some(&[blog_id]), None, Explicit)
            .expect("relationship")
            .expect("created");
        assert!(mb.model().is_required(fk));
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        assert!(matches!(
            builder.is_required(Some(false), Explicit),
            Err(ModelError::ForeignKeyCannotBeOptional { .. })
        ));
    }

    #[test]
    fn ownership_cycles_are_rejected() {
        let (mut mb, blog, post, _) = blog_and_post();
        let owned = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, None, None, Explicit)
            .expect("relationship")
            .expect("created");
        mb.foreign_key_builder(owned)
            .expect("builder")
            .is_ownership(Some(true), Explicit)
            .expect("ownership");
        assert!(mb.model()[post].is_owned());

        let back = mb
            .type_builder(blog)
            .expect("builder")
            .has_relationship(post, None, None, Explicit)
            .expect("relationship")
            .expect("created");
        let result = mb
            .foreign_key_builder(back)
            .expect("builder")
            .is_ownership(Some(true), Explicit);
        assert!(matches!(result, Err(ModelError::OwnershipCycle { .. })));
    }

    #[test]
    fn invert_swaps_ends() {
        let (mut mb, blog, post, _) = blog_and_post();
        let fk = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, None, None, Convention)
            .expect("relationship")
            .expect("created");
        let inverted = mb
            .foreign_key_builder(fk)
            .expect("builder")
            .invert(DataAnnotation)
            .expect("invert")
            .expect("created");
        let model = mb.model();
        assert_eq!(model[inverted].declaring_type(), blog);
        assert_eq!(model[inverted].principal_type(), post);
        assert_eq!(model[inverted].principal_end_source(), Some(DataAnnotation));
        assert!(model.find_property(post, "BlogId1").is_none());
    }
}
