//! Scalar property facets.

use super::{ModelBuilder, annotatable_builder, member_facets};
use crate::annotations::Annotations;
use crate::conventions::ModelEvent;
use crate::model::elements::{MemberFacets, Property};
use crate::source::ConfigurationSource;
use crate::{ClrType, ModelError, PropertyId, TypeId, ValueGenerated};

/// Builder over one scalar property.
pub struct PropertyBuilder<'m> {
    pub(crate) mb: &'m mut ModelBuilder,
    pub(crate) id: PropertyId,
}

impl<'m> PropertyBuilder<'m> {
    pub(crate) fn new(mb: &'m mut ModelBuilder, id: PropertyId) -> Self {
        Self { mb, id }
    }

    #[must_use]
    pub fn id(&self) -> PropertyId {
        self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &Property {
        &self.mb.model[self.id]
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
        let property = &self.mb.model[self.id];
        (
            property.declaring_type,
            property.name.clone(),
            Some(property.clr_type.clone()),
        )
    }

    fn nullability_error(&self, nullable: Option<bool>) -> Option<ModelError> {
        let property = &self.mb.model[self.id];
        let type_name = self.mb.model[property.declaring_type].name.clone();
        if nullable != Some(true) {
            return None;
        }
        if !property.clr_type.is_nullable() {
            return Some(ModelError::CannotBeNullable {
                property: property.name.clone(),
                type_name,
                clr_type: property.clr_type.to_string(),
            });
        }
        if !property.keys.is_empty() {
            return Some(ModelError::NullableKeyProperty {
                property: property.name.clone(),
                type_name,
            });
        }
        None
    }

    /// Set or reset nullability.
    ///
    /// Value types and key properties cannot become nullable.
    pub fn is_nullable(
        &mut self,
        nullable: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        if let Some(error) = self.nullability_error(nullable) {
            return source.refuse(|| error);
        }
        let before = self.mb.model[self.id].is_nullable();
        let accepted = self.mb.model[self.id].is_nullable.set(nullable, source);
        if accepted && before != self.mb.model[self.id].is_nullable() {
            let id = self.id;
            self.mb.batch(|mb| {
                mb.notify(ModelEvent::PropertyNullabilityChanged(id));
                Ok(())
            })?;
        }
        Ok(accepted)
    }

    #[must_use]
    pub fn can_set_is_nullable(&self, nullable: Option<bool>, source: ConfigurationSource) -> bool {
        !self.mb.model.is_read_only()
            && self.nullability_error(nullable).is_none()
            && self.mb.model[self.id]
                .is_nullable
                .can_set(nullable.as_ref(), source)
    }

    pub fn has_max_length(
        &mut self,
        max_length: Option<usize>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        Ok(self.mb.model[self.id].max_length.set(max_length, source))
    }

    pub fn is_concurrency_token(
        &mut self,
        concurrency_token: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        Ok(self.mb.model[self.id]
            .is_concurrency_token
            .set(concurrency_token, source))
    }

    pub fn value_generated(
        &mut self,
        value_generated: Option<ValueGenerated>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        Ok(self.mb.model[self.id]
            .value_generated
            .set(value_generated, source))
    }
}

annotatable_builder!(PropertyBuilder);
member_facets!(PropertyBuilder);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ConfigurationSource::{Convention, DataAnnotation, Explicit};
    use crate::TypeIdentity;

    fn property(mb: &mut ModelBuilder, clr_type: ClrType) -> PropertyId {
        let blog = mb
            .entity(TypeIdentity::named("Blog"), Explicit, None)
            .expect("entity")
            .expect("created");
        mb.type_builder(blog)
            .expect("builder")
            .property("Value", Some(clr_type), Explicit)
            .expect("property")
            .expect("created")
    }

    #[test]
    fn value_type_cannot_be_nullable() {
        let mut mb = ModelBuilder::new();
        let id = property(&mut mb, ClrType::Int32);
        let mut builder = mb.property_builder(id).expect("builder");
        assert!(!builder.is_nullable(Some(true), Convention).expect("silent"));
        assert!(matches!(
            builder.is_nullable(Some(true), Explicit),
            Err(ModelError::CannotBeNullable { .. })
        ));
        assert!(builder.is_nullable(Some(false), Convention).expect("required"));
    }

    #[test]
    fn nullable_string_can_be_required() {
        let mut mb = ModelBuilder::new();
        let id = property(&mut mb, ClrType::String);
        assert!(mb.model()[id].is_nullable());
        let mut builder = mb.property_builder(id).expect("builder");
        assert!(builder.is_nullable(Some(false), DataAnnotation).expect("required"));
        assert!(!builder.can_set_is_nullable(Some(true), Convention));
        assert!(!mb.model()[id].is_nullable());
    }

    #[test]
    fn facets_follow_precedence() {
        let mut mb = ModelBuilder::new();
        let id = property(&mut mb, ClrType::String);
        let mut builder = mb.property_builder(id).expect("builder");
        assert!(builder.has_max_length(Some(256), DataAnnotation).expect("max"));
        assert!(!builder.has_max_length(Some(64), Convention).expect("silent"));
        assert!(builder.value_generated(Some(ValueGenerated::OnAdd), Convention).expect("gen"));
        assert_eq!(mb.model()[id].max_length(), Some(256));
        assert_eq!(mb.model()[id].value_generated(), ValueGenerated::OnAdd);
    }
}
