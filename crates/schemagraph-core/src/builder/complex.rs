//! Complex properties and the complex types they own.

use super::type_base::{clear_ignored, conflicting_members};
use super::{ModelBuilder, TypeBuilder, annotatable_builder, member_facets};
use crate::annotations::Annotations;
use crate::conventions::ModelEvent;
use crate::model::Model;
use crate::model::elements::{ComplexProperty, MemberFacets};
use crate::model::members::{MemberKind, MemberRef};
use crate::snapshot::{ComplexPropertySnapshot, absorb};
use crate::source::ConfigurationSource;
use crate::{ClrType, ComplexPropertyId, ModelError, TypeId};

#[derive(Debug)]
enum ComplexPlan {
    Reuse(ComplexPropertyId),
    Delegate(TypeId),
    Replace {
        existing: ComplexPropertyId,
        clr_type: ClrType,
        is_collection: bool,
        shape: String,
        clashing_entity: Option<TypeId>,
    },
    Create {
        clr_type: ClrType,
        is_collection: bool,
        shape: String,
        clashing_entity: Option<TypeId>,
        conflicts: Vec<MemberRef>,
        lifted: Vec<ComplexPropertyId>,
    },
    Reject(ModelError),
}

fn plan_complex_property(
    model: &Model,
    type_id: TypeId,
    name: &str,
    clr_type: Option<&ClrType>,
    is_collection: Option<bool>,
    source: ConfigurationSource,
) -> ComplexPlan {
    let type_name = &model[type_id].name;
    if name.trim().is_empty() {
        return ComplexPlan::Reject(ModelError::InvalidName(name.to_string()));
    }
    if model.is_member_ignored(type_id, name, source) {
        return ComplexPlan::Reject(ModelError::Ignored {
            name: name.to_string(),
            owner: type_name.clone(),
        });
    }

    let resolved = match clr_type
        .cloned()
        .or_else(|| model.clr_member(type_id, name).map(|m| m.clr_type.clone()))
    {
        Some(resolved) => resolved,
        None => {
            return ComplexPlan::Reject(ModelError::NoPropertyType {
                property: name.to_string(),
                type_name: type_name.clone(),
            });
        }
    };
    let is_collection = is_collection.unwrap_or_else(|| resolved.is_collection());
    let element = if is_collection {
        resolved.element_type().unwrap_or(&resolved)
    } else {
        &resolved
    };
    let Some(shape) = element
        .shape_name()
        .filter(|shape| model.shape(shape).is_some())
    else {
        return ComplexPlan::Reject(ModelError::InvalidClrType(element.to_string()));
    };

    let clashing_entity = model
        .entity_types()
        .find(|t| !t.shared && t.clr_type.as_ref().and_then(ClrType::shape_name) == Some(shape))
        .map(|t| (t.id, t.source));
    if let Some((_, entity_source)) = clashing_entity
        && !source.overrides_strictly(Some(entity_source))
    {
        return ComplexPlan::Reject(ModelError::ClashingEntityType(shape.to_string()));
    }

    if let Some(existing) = model.find_complex_property(type_id, name) {
        let cp = &model[existing];
        if cp.clr_type == resolved && cp.is_collection == is_collection {
            return ComplexPlan::Reuse(existing);
        }
        if cp.declaring_type != type_id {
            return ComplexPlan::Delegate(cp.declaring_type);
        }
        if !source.is_explicit() && !source.overrides_strictly(Some(cp.source)) {
            return ComplexPlan::Reject(ModelError::PropertyTypeMismatch {
                property: name.to_string(),
                type_name: type_name.clone(),
                existing: cp.clr_type.to_string(),
                requested: resolved.to_string(),
            });
        }
        return ComplexPlan::Replace {
            existing,
            shape: shape.to_string(),
            clr_type: resolved,
            is_collection,
            clashing_entity: clashing_entity.map(|(id, _)| id),
        };
    }

    let conflicts =
        match conflicting_members(model, type_id, name, MemberKind::ComplexProperty, source) {
            Ok(conflicts) => conflicts,
            Err(error) => return ComplexPlan::Reject(error),
        };

    let lifted: Vec<ComplexPropertyId> = model
        .derived_types_inclusive(type_id)
        .into_iter()
        .skip(1)
        .filter_map(|t| model[t].complex_properties.get(name).copied())
        .collect();
    if let Some(blocked) = lifted
        .iter()
        .find(|cp| !source.overrides(Some(model[**cp].source)))
    {
        let blocked = &model[*blocked];
        return ComplexPlan::Reject(ModelError::ConflictingMember {
            member: name.to_string(),
            kind: MemberKind::ComplexProperty.to_string(),
            type_name: type_name.clone(),
            conflicting_kind: MemberKind::ComplexProperty.to_string(),
            conflicting_type: model[blocked.declaring_type].name.clone(),
        });
    }

    ComplexPlan::Create {
        shape: shape.to_string(),
        clr_type: resolved,
        is_collection,
        clashing_entity: clashing_entity.map(|(id, _)| id),
        conflicts,
        lifted,
    }
}

impl TypeBuilder<'_> {
    /// Find or create the complex property `name`.
    ///
    /// `is_collection` defaults to whether the CLR type is a collection. The
    /// element type must have a registered shape; an entity type with the
    /// same CLR type is removed when `source` strictly overrides it.
    pub fn complex_property(
        &mut self,
        name: &str,
        clr_type: Option<ClrType>,
        is_collection: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<Option<ComplexPropertyId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        let plan = plan_complex_property(
            &self.mb.model,
            type_id,
            name,
            clr_type.as_ref(),
            is_collection,
            source,
        );
        match plan {
            ComplexPlan::Reject(error) => source.reject(|| error),
            ComplexPlan::Reuse(id) => {
                let cp = &mut self.mb.model[id];
                cp.source = source.max(Some(cp.source));
                Ok(Some(id))
            }
            ComplexPlan::Delegate(base) => TypeBuilder::new(&mut *self.mb, base).complex_property(
                name,
                clr_type,
                is_collection,
                source,
            ),
            ComplexPlan::Replace {
                existing,
                clr_type,
                is_collection,
                shape,
                clashing_entity,
            } => self.mb.batch(|mb| {
                if let Some(entity) = clashing_entity
                    && mb.model.get_type(entity).is_some()
                {
                    tracing::debug!(
                        entity_type = %mb.model[entity].name,
                        "entity type replaced by complex type"
                    );
                    mb.remove_type_cascade(entity)?;
                }
                let previous = element_shape(&mb.model[existing].clr_type);
                let snapshot = ComplexPropertySnapshot::detach(mb, existing);
                if let Some(previous) = previous {
                    release_registration(mb, &previous);
                }
                let registered = source.max(mb.model.complex_registrations.get(&shape).copied());
                mb.model.complex_registrations.insert(shape, registered);
                let (id, complex_type) =
                    mb.model
                        .add_complex_property(type_id, name, clr_type, is_collection, source);
                mb.notify(ModelEvent::ComplexPropertyAdded(id));
                snapshot.attach_members(mb, complex_type)?;
                Ok(Some(id))
            }),
            ComplexPlan::Create {
                clr_type,
                is_collection,
                shape,
                clashing_entity,
                conflicts,
                lifted,
            } => self.mb.batch(|mb| {
                if let Some(entity) = clashing_entity
                    && mb.model.get_type(entity).is_some()
                {
                    tracing::debug!(
                        entity_type = %mb.model[entity].name,
                        "entity type replaced by complex type"
                    );
                    mb.remove_type_cascade(entity)?;
                }
                for member in conflicts {
                    mb.remove_member_raw(member);
                }
                let lifted: Vec<(TypeId, ComplexPropertySnapshot)> = lifted
                    .into_iter()
                    .map(|cp| {
                        let declaring = mb.model[cp].declaring_type;
                        (declaring, ComplexPropertySnapshot::detach(mb, cp))
                    })
                    .collect();
                clear_ignored(&mut mb.model, type_id, name);
                let registered = source.max(mb.model.complex_registrations.get(&shape).copied());
                mb.model.complex_registrations.insert(shape, registered);
                let (id, _) =
                    mb.model
                        .add_complex_property(type_id, name, clr_type, is_collection, source);
                tracing::debug!(
                    entity_type = %mb.model[type_id].name,
                    complex_property = name,
                    %source,
                    "complex property added"
                );
                mb.notify(ModelEvent::ComplexPropertyAdded(id));
                for (declaring, snapshot) in &lifted {
                    absorb(snapshot.attach(mb, *declaring))?;
                }
                Ok(Some(id))
            }),
        }
    }

    #[must_use]
    pub fn can_add_complex_property(
        &self,
        name: &str,
        clr_type: Option<&ClrType>,
        is_collection: Option<bool>,
        source: ConfigurationSource,
    ) -> bool {
        let model = &self.mb.model;
        let mut type_id = self.id;
        if model.is_read_only() {
            return false;
        }
        loop {
            match plan_complex_property(model, type_id, name, clr_type, is_collection, source) {
                ComplexPlan::Reject(_) => return false,
                ComplexPlan::Delegate(base) if base != type_id => type_id = base,
                _ => return true,
            }
        }
    }

    /// Remove a complex property and its complex type.
    pub fn has_no_complex_property(
        &mut self,
        complex_property: ComplexPropertyId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let Some(cp) = self.mb.model.get_complex_property(complex_property) else {
            return Err(ModelError::ElementNotFound(complex_property.to_string()));
        };
        if !source.overrides(Some(cp.source)) {
            let element = self
                .mb
                .model
                .member_display(MemberRef::ComplexProperty(complex_property));
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        let shape = element_shape(&cp.clr_type);
        self.mb.batch(|mb| {
            mb.remove_complex_property_raw(complex_property);
            if let Some(shape) = shape {
                release_registration(mb, &shape);
            }
            Ok(true)
        })
    }
}

fn element_shape(clr_type: &ClrType) -> Option<String> {
    clr_type
        .element_type()
        .unwrap_or(clr_type)
        .shape_name()
        .map(str::to_string)
}

/// Drop the registration once nothing uses the CLR type any more.
fn release_registration(mb: &mut ModelBuilder, shape: &str) {
    let used = mb
        .model
        .complex_properties
        .values()
        .any(|cp| element_shape(&cp.clr_type).as_deref() == Some(shape));
    if !used {
        mb.model.complex_registrations.remove(shape);
    }
}

// =============================================================================
// COMPLEX PROPERTY BUILDER
// =============================================================================

/// Builder over one complex property.
pub struct ComplexPropertyBuilder<'m> {
    pub(crate) mb: &'m mut ModelBuilder,
    pub(crate) id: ComplexPropertyId,
}

impl<'m> ComplexPropertyBuilder<'m> {
    pub(crate) fn new(mb: &'m mut ModelBuilder, id: ComplexPropertyId) -> Self {
        Self { mb, id }
    }

    #[must_use]
    pub fn id(&self) -> ComplexPropertyId {
        self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &ComplexProperty {
        &self.mb.model[self.id]
    }

    /// Builder over the owned complex type.
    pub fn complex_type(&mut self) -> TypeBuilder<'_> {
        let complex_type = self.mb.model[self.id].complex_type;
        TypeBuilder::new(&mut *self.mb, complex_type)
    }

    fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.mb.model[self.id].annotations
    }

    fn facets(&self) -> &MemberFacets {
        &self.mb.model[self.id].facets
    }

    fn facets_mut(&mut self) -> &mut MemberFacets {
        &mut self.mb.model[self.id].facets
    }

    fn facet_target(&self) -> (TypeId, String, Option<ClrType>) {
        let cp = &self.mb.model[self.id];
        (cp.declaring_type, cp.name.clone(), Some(cp.clr_type.clone()))
    }

    fn nullability_error(&self, nullable: Option<bool>) -> Option<ModelError> {
        let cp = &self.mb.model[self.id];
        (nullable == Some(true) && !cp.clr_type.is_nullable()).then(|| {
            ModelError::ComplexPropertyNotNullable {
                property: cp.name.clone(),
                type_name: self.mb.model[cp.declaring_type].name.clone(),
                clr_type: cp.clr_type.to_string(),
            }
        })
    }

    /// Set or reset nullability; needs a nullable CLR type.
    pub fn is_nullable(
        &mut self,
        nullable: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        if let Some(error) = self.nullability_error(nullable) {
            return source.refuse(|| error);
        }
        Ok(self.mb.model[self.id].is_nullable.set(nullable, source))
    }

    #[must_use]
    pub fn can_set_is_nullable(&self, nullable: Option<bool>, source: ConfigurationSource) -> bool {
        !self.mb.model.is_read_only()
            && self.nullability_error(nullable).is_none()
            && self.mb.model[self.id]
                .is_nullable
                .can_set(nullable.as_ref(), source)
    }
}

annotatable_builder!(ComplexPropertyBuilder);
member_facets!(ComplexPropertyBuilder);

// =============================================================================
// TESTS
// =============================================================================
