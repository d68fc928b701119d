//! # Type Builder
//!
//! Member management shared by entity types and complex types: scalar
//! properties, service properties, ignored names and shadow property
//! synthesis. Keys, relationships, complex properties, skip navigations and
//! base types are added to `TypeBuilder` by the sibling modules.

use super::{ModelBuilder, annotatable_builder};
use crate::annotations::Annotations;
use crate::conventions::ModelEvent;
use crate::model::Model;
use crate::model::elements::TypeBase;
use crate::model::members::{MemberKind, MemberRef};
use crate::primitives::PRE_UNIQUIFICATION_NAME_ANNOTATION;
use crate::snapshot::{PropertiesSnapshot, RelationshipSnapshot, absorb};
use crate::source::ConfigurationSource;
use crate::{ClrType, ForeignKeyId, ModelError, PropertyId, ServicePropertyId, TypeId};
use std::collections::BTreeSet;

// =============================================================================
// PLANS
// =============================================================================

/// Outcome of resolving a `property` request.
#[derive(Debug)]
enum PropertyPlan {
    /// A compatible property is already visible.
    Reuse(PropertyId),
    /// An incompatible property is declared on a base type.
    Delegate(TypeId),
    /// An incompatible property on this type loses to the request.
    Replace { existing: PropertyId, clr_type: ClrType },
    Create {
        clr_type: ClrType,
        conflicts: Vec<MemberRef>,
        lifted: Vec<PropertyId>,
    },
    Reject(ModelError),
}

fn plan_property(
    model: &Model,
    type_id: TypeId,
    name: &str,
    clr_type: Option<&ClrType>,
    source: ConfigurationSource,
) -> PropertyPlan {
    let type_name = &model[type_id].name;
    if name.trim().is_empty() {
        return PropertyPlan::Reject(ModelError::InvalidName(name.to_string()));
    }
    if model.is_member_ignored(type_id, name, source) {
        return PropertyPlan::Reject(ModelError::Ignored {
            name: name.to_string(),
            owner: type_name.clone(),
        });
    }

    if let Some(existing) = model.find_property(type_id, name) {
        let property = &model[existing];
        let Some(requested) = clr_type.filter(|t| **t != property.clr_type) else {
            return PropertyPlan::Reuse(existing);
        };
        if property.declaring_type != type_id {
            return PropertyPlan::Delegate(property.declaring_type);
        }
        if let Some(member) = model.clr_member(type_id, name)
            && member.clr_type != *requested
        {
            return PropertyPlan::Reject(ModelError::PropertyTypeMismatch {
                property: name.to_string(),
                type_name: type_name.clone(),
                existing: member.clr_type.to_string(),
                requested: requested.to_string(),
            });
        }
        let replaceable = source.is_explicit()
            || (source.overrides_strictly(property.type_source)
                && source.overrides_strictly(Some(property.source)));
        if replaceable {
            return PropertyPlan::Replace {
                existing,
                clr_type: requested.clone(),
            };
        }
        return PropertyPlan::Reject(ModelError::PropertyTypeMismatch {
            property: name.to_string(),
            type_name: type_name.clone(),
            existing: property.clr_type.to_string(),
            requested: requested.to_string(),
        });
    }

    let member_type = model.clr_member(type_id, name).map(|m| &m.clr_type);
    let resolved = match (clr_type, member_type) {
        (Some(requested), Some(member)) if requested != member => {
            return PropertyPlan::Reject(ModelError::PropertyTypeMismatch {
                property: name.to_string(),
                type_name: type_name.clone(),
                existing: member.to_string(),
                requested: requested.to_string(),
            });
        }
        (Some(requested), _) => requested.clone(),
        (None, Some(member)) => member.clone(),
        (None, None) => {
            return PropertyPlan::Reject(ModelError::NoPropertyType {
                property: name.to_string(),
                type_name: type_name.clone(),
            });
        }
    };

    let conflicts = match conflicting_members(model, type_id, name, MemberKind::Property, source)
    {
        Ok(conflicts) => conflicts,
        Err(error) => return PropertyPlan::Reject(error),
    };

    // Same-name properties on derived types move up to this type
    let lifted = model.find_derived_properties(type_id, name);
    for derived in &lifted {
        let property = &model[*derived];
        if property.clr_type != resolved && !source.overrides_strictly(property.type_source) {
            return PropertyPlan::Reject(ModelError::PropertyTypeMismatch {
                property: name.to_string(),
                type_name: model[property.declaring_type].name.clone(),
                existing: property.clr_type.to_string(),
                requested: resolved.to_string(),
            });
        }
    }

    PropertyPlan::Create {
        clr_type: resolved,
        conflicts,
        lifted,
    }
}

/// Members of other kinds named `name` in the hierarchy of `type_id` that a
/// new member of `kind` at `source` has to remove.
///
/// An `Explicit` conflicting member is never removed.
pub(crate) fn conflicting_members(
    model: &Model,
    type_id: TypeId,
    name: &str,
    kind: MemberKind,
    source: ConfigurationSource,
) -> Result<Vec<MemberRef>, ModelError> {
    let mut conflicts = Vec::new();
    for member in model.find_members_in_hierarchy(type_id, name) {
        if member.kind() == kind {
            continue;
        }
        let member_source = model.member_source(member);
        if member_source == Some(ConfigurationSource::Explicit)
            || !source.overrides(member_source)
        {
            let declaring = model.member(member).declaring_type();
            return Err(ModelError::ConflictingMember {
                member: name.to_string(),
                kind: kind.to_string(),
                type_name: model[type_id].name.clone(),
                conflicting_kind: member.kind().to_string(),
                conflicting_type: model[declaring].name.clone(),
            });
        }
        conflicts.push(member);
    }
    Ok(conflicts)
}

/// Check that `field` exists on the CLR type declaring `member` and can hold
/// its value.
pub(crate) fn validate_backing_field(
    model: &Model,
    type_id: TypeId,
    member: &str,
    member_type: Option<&ClrType>,
    field: &str,
) -> Result<(), ModelError> {
    let invalid = |reason: String| ModelError::InvalidBackingField {
        field: field.to_string(),
        member: member.to_string(),
        type_name: model[type_id].name.clone(),
        reason,
    };
    let Some(clr_member) = model.clr_member(type_id, field) else {
        return Err(invalid("no such member on the CLR type".to_string()));
    };
    if let Some(member_type) = member_type
        && !clr_member.clr_type.matches_unwrapped(member_type)
    {
        return Err(invalid(format!(
            "its type '{}' is not compatible with '{}'",
            clr_member.clr_type, member_type
        )));
    }
    Ok(())
}

// =============================================================================
// TYPE BUILDER
// =============================================================================

/// Builder over one entity type or complex type.
pub struct TypeBuilder<'m> {
    pub(crate) mb: &'m mut ModelBuilder,
    pub(crate) id: TypeId,
}

impl<'m> TypeBuilder<'m> {
    pub(crate) fn new(mb: &'m mut ModelBuilder, id: TypeId) -> Self {
        Self { mb, id }
    }

    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.mb.model
    }

    /// The type being configured.
    #[must_use]
    pub fn metadata(&self) -> &TypeBase {
        &self.mb.model[self.id]
    }

    fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.mb.model[self.id].annotations
    }

    fn type_name(&self) -> String {
        self.mb.model[self.id].name.clone()
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    /// Find or create the scalar property `name`.
    ///
    /// Without `clr_type` the type comes from the CLR member. A property on a
    /// base type with a different type is handled by the base type's builder.
    pub fn property(
        &mut self,
        name: &str,
        clr_type: Option<ClrType>,
        source: ConfigurationSource,
    ) -> Result<Option<PropertyId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        match plan_property(&self.mb.model, type_id, name, clr_type.as_ref(), source) {
            PropertyPlan::Reject(error) => source.reject(|| error),
            PropertyPlan::Reuse(id) => {
                let property = &mut self.mb.model[id];
                property.source = source.max(Some(property.source));
                if clr_type.is_some() {
                    property.type_source = Some(source.max(property.type_source));
                }
                Ok(Some(id))
            }
            PropertyPlan::Delegate(base) => {
                TypeBuilder::new(&mut *self.mb, base).property(name, clr_type, source)
            }
            PropertyPlan::Replace { existing, clr_type } => self.mb.batch(|mb| {
                tracing::debug!(
                    property = name,
                    clr_type = %clr_type,
                    %source,
                    "retyping property"
                );
                let snapshot = PropertiesSnapshot::detach(mb, &[existing]);
                let id = mb
                    .model
                    .add_property(type_id, name, clr_type, source, Some(source));
                mb.notify(ModelEvent::PropertyAdded(id));
                snapshot.attach(mb)?;
                Ok(Some(id))
            }),
            PropertyPlan::Create {
                clr_type: resolved,
                conflicts,
                lifted,
            } => self.mb.batch(|mb| {
                for member in conflicts {
                    mb.remove_member_raw(member);
                }
                let lifted = (!lifted.is_empty()).then(|| PropertiesSnapshot::detach(mb, &lifted));
                clear_ignored(&mut mb.model, type_id, name);
                let type_source = clr_type.is_some().then_some(source);
                let id = mb
                    .model
                    .add_property(type_id, name, resolved, source, type_source);
                tracing::debug!(
                    entity_type = %mb.model[type_id].name,
                    property = name,
                    %source,
                    "property added"
                );
                mb.notify(ModelEvent::PropertyAdded(id));
                if let Some(lifted) = lifted {
                    lifted.attach(mb)?;
                }
                Ok(Some(id))
            }),
        }
    }

    /// Whether `property` would succeed.
    #[must_use]
    pub fn can_add_property(
        &self,
        name: &str,
        clr_type: Option<&ClrType>,
        source: ConfigurationSource,
    ) -> bool {
        let model = &self.mb.model;
        let mut type_id = self.id;
        if model.is_read_only() {
            return false;
        }
        loop {
            match plan_property(model, type_id, name, clr_type, source) {
                PropertyPlan::Reject(_) => return false,
                PropertyPlan::Delegate(base) if base != type_id => type_id = base,
                _ => return true,
            }
        }
    }

    /// Remove a property declared on this type.
    ///
    /// Keys and indexes over it are removed. Foreign keys using it, or
    /// targeting a key over it, are detached and reattached so their
    /// dependent properties get re-synthesized.
    pub fn has_no_property(
        &mut self,
        property: PropertyId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        self.mb.check_property(property)?;
        let model = &self.mb.model;
        let p = &model[property];
        let element = format!("{}.{}", model[p.declaring_type].name, p.name);
        if !model.is_same_or_derived(p.declaring_type, self.id) {
            return Err(ModelError::ElementNotFound(element));
        }
        if !source.overrides(Some(p.source)) {
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        if let Some(usage) = blocking_usage(model, property, source) {
            return source.refuse(|| ModelError::PropertyInUse {
                property: p.name.clone(),
                type_name: model[p.declaring_type].name.clone(),
                usage,
            });
        }

        self.mb.batch(|mb| {
            let mut affected: BTreeSet<ForeignKeyId> =
                mb.model[property].foreign_keys.iter().copied().collect();
            for key in mb.model[property].keys.iter() {
                affected.extend(mb.model[*key].referencing_foreign_keys.iter().copied());
            }
            let relationships: Vec<RelationshipSnapshot> = affected
                .into_iter()
                .map(|fk| RelationshipSnapshot::detach(mb, fk))
                .collect();
            mb.remove_property_raw(property);
            for relationship in &relationships {
                absorb(relationship.attach(mb))?;
            }
            Ok(true)
        })
    }

    /// Synthesize shadow properties named after `bases`.
    ///
    /// A free `Convention` shadow property generated from the same base name
    /// is reused. Otherwise `base`, `base1`, `base2`, ... are probed against
    /// the hierarchy, the ignored names and the CLR members.
    pub fn create_unique_properties(
        &mut self,
        bases: &[(String, ClrType)],
        source: ConfigurationSource,
    ) -> Result<Vec<PropertyId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        let max_attempts = self.mb.config().max_uniquify_attempts;
        self.mb.batch(|mb| {
            let mut created = Vec::with_capacity(bases.len());
            for (base, clr_type) in bases {
                if let Some(reused) =
                    find_reusable_shadow(&mb.model, type_id, base, clr_type, &created)
                {
                    mb.model[reused].source = source.max(Some(mb.model[reused].source));
                    created.push(reused);
                    continue;
                }
                let name = unique_name(&mb.model, type_id, base, max_attempts).ok_or_else(|| {
                    ModelError::UniquificationExhausted {
                        base_name: base.clone(),
                        type_name: mb.model[type_id].name.clone(),
                    }
                })?;
                let id = mb
                    .model
                    .add_property(type_id, &name, clr_type.clone(), source, None);
                if name != *base {
                    mb.model[id].annotations.set(
                        PRE_UNIQUIFICATION_NAME_ANNOTATION,
                        serde_json::json!(base),
                        ConfigurationSource::Convention,
                    );
                }
                tracing::debug!(property = %name, base = %base, "shadow property synthesized");
                mb.notify(ModelEvent::PropertyAdded(id));
                created.push(id);
            }
            Ok(created)
        })
    }

    // =========================================================================
    // SERVICE PROPERTIES
    // =========================================================================

    /// Find or create the service property `name`.
    pub fn has_service_property(
        &mut self,
        name: &str,
        clr_type: ClrType,
        source: ConfigurationSource,
    ) -> Result<Option<ServicePropertyId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        let model = &self.mb.model;
        if name.trim().is_empty() {
            return source.reject(|| ModelError::InvalidName(name.to_string()));
        }
        if model.is_member_ignored(type_id, name, source) {
            let owner = self.type_name();
            return source.reject(|| ModelError::Ignored {
                name: name.to_string(),
                owner,
            });
        }

        let existing = model.base_types_inclusive(type_id).into_iter().find_map(|t| {
            model[t].service_properties.get(name).copied()
        });
        let mut replaced = None;
        if let Some(existing) = existing {
            let service = &model[existing];
            if service.clr_type == clr_type {
                let service = &mut self.mb.model[existing];
                service.source = source.max(Some(service.source));
                return Ok(Some(existing));
            }
            if service.declaring_type != type_id || !source.overrides(Some(service.source)) {
                return source.reject(|| ModelError::PropertyTypeMismatch {
                    property: name.to_string(),
                    type_name: model[service.declaring_type].name.clone(),
                    existing: service.clr_type.to_string(),
                    requested: clr_type.to_string(),
                });
            }
            replaced = Some(existing);
        }

        let conflicts =
            match conflicting_members(model, type_id, name, MemberKind::ServiceProperty, source) {
                Ok(conflicts) => conflicts,
                Err(error) => return source.reject(|| error),
            };

        self.mb.batch(|mb| {
            if let Some(replaced) = replaced {
                mb.remove_service_property_raw(replaced);
            }
            for member in conflicts {
                mb.remove_member_raw(member);
            }
            clear_ignored(&mut mb.model, type_id, name);
            let id = mb.model.add_service_property(type_id, name, clr_type, source);
            tracing::debug!(service_property = name, %source, "service property added");
            Ok(Some(id))
        })
    }

    /// Remove a service property declared on this type.
    pub fn has_no_service_property(
        &mut self,
        service_property: ServicePropertyId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let Some(service) = self.mb.model.get_service_property(service_property) else {
            return Err(ModelError::ElementNotFound(service_property.to_string()));
        };
        if !source.overrides(Some(service.source)) {
            let element = format!("{}.{}", self.type_name(), service.name);
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        self.mb.remove_service_property_raw(service_property);
        Ok(true)
    }

    // =========================================================================
    // IGNORED MEMBERS
    // =========================================================================

    /// Ignore the member name `name` on this type.
    ///
    /// A member declared here is removed when `source` overrides it; the
    /// same name is dropped from derived types where allowed. Inherited
    /// members cannot be ignored.
    pub fn ignore(&mut self, name: &str, source: ConfigurationSource) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        let model = &self.mb.model;
        let mut removed = Vec::new();
        if let Some(member) = model.find_member(type_id, name) {
            let declaring = model.member(member).declaring_type();
            if declaring != type_id {
                return source.refuse(|| ModelError::InheritedMemberCannotBeIgnored {
                    member: name.to_string(),
                    type_name: model[type_id].name.clone(),
                    base_type: model[declaring].name.clone(),
                });
            }
            if !source.overrides(model.member_source(member)) {
                return source.refuse(|| ModelError::CannotRemove {
                    element: model.member_display(member),
                });
            }
            removed.push(member);
        }
        for derived in model.derived_types_inclusive(type_id).into_iter().skip(1) {
            if let Some(member) = model.find_declared_member(derived, name)
                && source.overrides(model.member_source(member))
            {
                removed.push(member);
            }
        }

        self.mb.batch(|mb| {
            for member in removed {
                if mb.model.contains_member(member) {
                    mb.remove_member_raw(member);
                }
            }
            let ty = &mut mb.model[type_id];
            let ignored = source.max(ty.ignored.get(name).copied());
            ty.ignored.insert(name.to_string(), ignored);
            tracing::debug!(entity_type = %ty.name, member = name, %source, "member ignored");
            Ok(true)
        })
    }

    /// Whether `name` is ignored on this type or a base type.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.mb.model.find_ignored_source(self.id, name).is_some()
    }

    /// Lift the ignore entry for `name` on this type.
    pub fn has_no_ignore(
        &mut self,
        name: &str,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let ty = &mut self.mb.model[self.id];
        match ty.ignored.get(name) {
            None => Ok(true),
            Some(existing) if source.overrides(Some(*existing)) => {
                ty.ignored.remove(name);
                Ok(true)
            }
            Some(_) => {
                let element = format!("{}.{}", ty.name, name);
                source.refuse(|| ModelError::CannotRemove { element })
            }
        }
    }
}

annotatable_builder!(TypeBuilder);

// =============================================================================
// HELPERS
// =============================================================================

/// Drop ignore entries for `name` along the base chain of `type_id`.
pub(crate) fn clear_ignored(model: &mut Model, type_id: TypeId, name: &str) {
    for t in model.base_types_inclusive(type_id) {
        model[t].ignored.remove(name);
    }
}

/// Describe the first key, index or FK over `property` that `source` cannot
/// override.
fn blocking_usage(
    model: &Model,
    property: PropertyId,
    source: ConfigurationSource,
) -> Option<String> {
    let p = &model[property];
    if let Some(key) = p.keys.iter().find(|k| !source.overrides(Some(model[**k].source))) {
        return Some(format!(
            "the key {}",
            model.display_properties(&model[*key].properties)
        ));
    }
    if let Some(index) = p
        .indexes
        .iter()
        .find(|i| !source.overrides(Some(model[**i].source)))
    {
        return Some(format!(
            "the index {}",
            model.display_properties(&model[*index].properties)
        ));
    }
    p.foreign_keys
        .iter()
        .find(|fk| !source.overrides(model[**fk].properties_source))
        .map(|fk| {
            format!(
                "the foreign key {}",
                model.display_properties(&model[*fk].properties)
            )
        })
}

/// A `Convention` shadow property generated from `base` that no FK uses.
fn find_reusable_shadow(
    model: &Model,
    type_id: TypeId,
    base: &str,
    clr_type: &ClrType,
    taken: &[PropertyId],
) -> Option<PropertyId> {
    model
        .base_types_inclusive(type_id)
        .into_iter()
        .flat_map(|t| model[t].properties.values().copied())
        .find(|id| {
            let p = &model[*id];
            let generated_from = p
                .annotations
                .value(PRE_UNIQUIFICATION_NAME_ANNOTATION)
                .and_then(|v| v.as_str());
            (p.name == base || generated_from == Some(base))
                && p.source == ConfigurationSource::Convention
                && p.member.is_shadow()
                && p.foreign_keys.is_empty()
                && p.clr_type == *clr_type
                && !taken.contains(id)
        })
}

/// First free name among `base`, `base1`, `base2`, ...
fn unique_name(model: &Model, type_id: TypeId, base: &str, max_attempts: usize) -> Option<String> {
    let is_free = |name: &str| {
        model.find_members_in_hierarchy(type_id, name).is_empty()
            && model.find_ignored_source(type_id, name).is_none()
            && model.clr_member(type_id, name).is_none()
    };
    if is_free(base) {
        return Some(base.to_string());
    }
    (1..=max_attempts)
        .map(|suffix| format!("{}{}", base, suffix))
        .find(|name| is_free(name))
}

// =============================================================================
// TESTS
// =============================================================================
