//! Keys, primary keys, the keyless flag and indexes.

use super::{ModelBuilder, TypeBuilder, annotatable_builder};
use crate::annotations::Annotations;
use crate::conventions::ModelEvent;
use crate::model::Model;
use crate::model::elements::{Index, Key};
use crate::snapshot::{RelationshipSnapshot, absorb};
use crate::source::ConfigurationSource;
use crate::{ForeignKeyId, IndexId, KeyId, ModelError, PropertyId, TypeId};

#[derive(Debug)]
enum KeyPlan {
    Reuse(KeyId),
    Create { clear_keyless: bool },
    Reject(ModelError),
}

/// Shared validation of key and index property lists.
fn check_property_list(
    model: &Model,
    type_id: TypeId,
    properties: &[PropertyId],
    context: &str,
) -> Result<(), ModelError> {
    let type_name = &model[type_id].name;
    if properties.is_empty() {
        return Err(ModelError::InvalidConfig(format!(
            "{} on '{}' must contain at least one property",
            context, type_name
        )));
    }
    let chain = model.base_types_inclusive(type_id);
    for (position, property) in properties.iter().enumerate() {
        let Some(p) = model.get_property(*property) else {
            return Err(ModelError::ElementNotFound(property.to_string()));
        };
        if !chain.contains(&p.declaring_type) {
            return Err(ModelError::InvalidConfig(format!(
                "the property '{}' used in {} is not declared on '{}'",
                p.name, context, type_name
            )));
        }
        if properties[..position].contains(property) {
            return Err(ModelError::DuplicatePropertyInList {
                property: p.name.clone(),
                context: context.to_string(),
                type_name: type_name.clone(),
            });
        }
    }
    Ok(())
}

fn plan_key(
    model: &Model,
    type_id: TypeId,
    properties: &[PropertyId],
    source: ConfigurationSource,
) -> KeyPlan {
    let ty = &model[type_id];
    if !ty.is_entity_type() {
        return KeyPlan::Reject(ModelError::NotAnEntityType(ty.name.clone()));
    }
    if let Err(error) = check_property_list(model, type_id, properties, "the key") {
        return KeyPlan::Reject(error);
    }
    if ty.base_type.is_some() {
        return KeyPlan::Reject(ModelError::DerivedTypeKey {
            type_name: ty.name.clone(),
            root_type: model[model.root_type(type_id)].name.clone(),
        });
    }
    if let Some(existing) = model.find_key(type_id, properties) {
        return KeyPlan::Reuse(existing);
    }
    let clear_keyless = ty.is_keyless();
    if clear_keyless && !source.overrides(ty.is_keyless.source()) {
        return KeyPlan::Reject(ModelError::KeylessTypeWithKey(ty.name.clone()));
    }
    if let Some(nullable) = properties.iter().find(|p| {
        let p = &model[**p];
        p.is_nullable.value() == Some(true)
            && p.is_nullable.source() == Some(ConfigurationSource::Explicit)
    }) {
        return KeyPlan::Reject(ModelError::NullableKeyProperty {
            property: model[*nullable].name.clone(),
            type_name: ty.name.clone(),
        });
    }
    KeyPlan::Create { clear_keyless }
}

impl TypeBuilder<'_> {
    // =========================================================================
    // KEYS
    // =========================================================================

    /// Find or create a key over `properties`.
    pub fn has_key(
        &mut self,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> Result<Option<KeyId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        match plan_key(&self.mb.model, type_id, properties, source) {
            KeyPlan::Reject(error) => source.reject(|| error),
            KeyPlan::Reuse(key) => {
                let k = &mut self.mb.model[key];
                k.source = source.max(Some(k.source));
                Ok(Some(key))
            }
            KeyPlan::Create { clear_keyless } => self.mb.batch(|mb| {
                if clear_keyless {
                    mb.model[type_id].is_keyless.set(None, source);
                }
                let key = mb.model.add_key(type_id, properties.to_vec(), source);
                tracing::debug!(
                    entity_type = %mb.model[type_id].name,
                    properties = %mb.model.display_properties(properties),
                    %source,
                    "key added"
                );
                mb.notify(ModelEvent::KeyAdded(key));
                Ok(Some(key))
            }),
        }
    }

    #[must_use]
    pub fn can_add_key(&self, properties: &[PropertyId], source: ConfigurationSource) -> bool {
        !self.mb.model.is_read_only()
            && !matches!(
                plan_key(&self.mb.model, self.id, properties, source),
                KeyPlan::Reject(_)
            )
    }

    /// Make the key over `properties` the primary key, creating it if
    /// needed.
    ///
    /// Foreign keys that reference the old primary key without a configured
    /// principal key follow the change. An unused `Convention` key that
    /// stops being primary is removed.
    pub fn primary_key(
        &mut self,
        properties: &[PropertyId],
        source: ConfigurationSource,
    ) -> Result<Option<KeyId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        let model = &self.mb.model;
        if let KeyPlan::Reject(error) = plan_key(model, type_id, properties, source) {
            return source.reject(|| error);
        }
        let ty = &model[type_id];
        let old = ty.primary_key.value();
        let unchanged = old.is_some() && old == model.find_key(type_id, properties);
        if !source.can_set(ty.primary_key.source(), unchanged) {
            let element = format!("the primary key of '{}'", ty.name);
            return source.reject(|| ModelError::CannotRemove { element });
        }

        self.mb.batch(|mb| {
            let Some(key) = TypeBuilder::new(mb, type_id).has_key(properties, source)? else {
                return Ok(None);
            };
            mb.model[type_id].primary_key.set(Some(key), source);
            if old == Some(key) {
                return Ok(Some(key));
            }
            tracing::debug!(
                entity_type = %mb.model[type_id].name,
                properties = %mb.model.display_properties(properties),
                %source,
                "primary key changed"
            );
            mb.notify(ModelEvent::PrimaryKeyChanged(type_id));
            if let Some(old) = old {
                retarget_and_prune(mb, old)?;
            }
            Ok(Some(key))
        })
    }

    /// Clear the primary key. The key itself is kept unless it was created
    /// by convention and nothing references it.
    pub fn has_no_primary_key(&mut self, source: ConfigurationSource) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        let ty = &self.mb.model[type_id];
        let Some(old) = ty.primary_key.value() else {
            return Ok(true);
        };
        if !source.overrides(ty.primary_key.source()) {
            let element = format!("the primary key of '{}'", ty.name);
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        self.mb.batch(|mb| {
            mb.model[type_id].primary_key.set(None, source);
            mb.notify(ModelEvent::PrimaryKeyChanged(type_id));
            retarget_and_prune(mb, old)?;
            Ok(true)
        })
    }

    /// Remove a key. Foreign keys that picked it by default are reattached
    /// to whatever key the principal has afterwards; foreign keys configured
    /// to use it are removed.
    pub fn has_no_key(
        &mut self,
        key: KeyId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        self.mb.check_key(key)?;
        let model = &self.mb.model;
        let k = &model[key];
        let element = format!(
            "the key {} on '{}'",
            model.display_properties(&k.properties),
            model[k.declaring_type].name
        );
        if !source.overrides(Some(k.source)) {
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        if k.referencing_foreign_keys
            .iter()
            .any(|fk| !source.overrides(model[*fk].principal_key_source))
        {
            return source.refuse(|| ModelError::CannotRemove { element });
        }

        self.mb.batch(|mb| {
            let defaulted: Vec<ForeignKeyId> = mb.model[key]
                .referencing_foreign_keys
                .iter()
                .copied()
                .filter(|fk| mb.model[*fk].principal_key_source.is_none())
                .collect();
            let snapshots: Vec<RelationshipSnapshot> = defaulted
                .into_iter()
                .map(|fk| RelationshipSnapshot::detach(mb, fk))
                .collect();
            mb.remove_key_raw(key);
            for snapshot in &snapshots {
                absorb(snapshot.attach(mb))?;
            }
            Ok(true)
        })
    }

    /// Mark the entity type keyless or keyed.
    ///
    /// Becoming keyless removes the existing keys, which needs a source that
    /// overrides every key and no foreign key targeting the type.
    pub fn is_keyless(
        &mut self,
        keyless: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        let model = &self.mb.model;
        let ty = &model[type_id];
        if !ty.is_keyless.can_set(keyless.as_ref(), source) {
            return Ok(false);
        }
        let keys: Vec<KeyId> = ty.keys.iter().copied().collect();
        if keyless == Some(true) && !keys.is_empty() {
            let blocked = !ty.referencing_foreign_keys.is_empty()
                || keys.iter().any(|k| !source.overrides(Some(model[*k].source)));
            if blocked {
                let name = ty.name.clone();
                return source.refuse(|| ModelError::KeyInUse(name));
            }
        }
        self.mb.batch(|mb| {
            if keyless == Some(true) {
                for key in keys {
                    mb.remove_key_raw(key);
                }
            }
            Ok(mb.model[type_id].is_keyless.set(keyless, source))
        })
    }

    // =========================================================================
    // INDEXES
    // =========================================================================

    /// Find or create an index over `properties`.
    pub fn has_index(
        &mut self,
        properties: &[PropertyId],
        name: Option<&str>,
        source: ConfigurationSource,
    ) -> Result<Option<IndexId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        let type_id = self.id;
        if let Err(error) = check_property_list(&self.mb.model, type_id, properties, "the index") {
            return source.reject(|| error);
        }
        if let Some(existing) = self.mb.model.find_index(type_id, properties) {
            let index = &mut self.mb.model[existing];
            index.source = source.max(Some(index.source));
            if index.name.is_none() {
                index.name = name.map(str::to_string);
            }
            return Ok(Some(existing));
        }
        self.mb.batch(|mb| {
            let index = mb.model.add_index(
                type_id,
                properties.to_vec(),
                name.map(str::to_string),
                source,
            );
            tracing::debug!(
                entity_type = %mb.model[type_id].name,
                properties = %mb.model.display_properties(properties),
                %source,
                "index added"
            );
            mb.notify(ModelEvent::IndexAdded(index));
            Ok(Some(index))
        })
    }

    /// Remove an index.
    pub fn has_no_index(
        &mut self,
        index: IndexId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        let Some(i) = self.mb.model.get_index(index) else {
            return Err(ModelError::ElementNotFound(index.to_string()));
        };
        if !source.overrides(Some(i.source)) {
            let element = format!("the index {}", self.mb.model.display_properties(&i.properties));
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        self.mb.batch(|mb| {
            mb.remove_index_raw(index);
            Ok(true)
        })
    }
}

/// After `old` stopped being primary: move defaulted foreign keys to the
/// current primary key, then drop `old` if it is an unused convention key.
fn retarget_and_prune(mb: &mut ModelBuilder, old: KeyId) -> Result<(), ModelError> {
    if mb.model.get_key(old).is_none() {
        return Ok(());
    }
    let defaulted: Vec<ForeignKeyId> = mb.model[old]
        .referencing_foreign_keys
        .iter()
        .copied()
        .filter(|fk| mb.model[*fk].principal_key_source.is_none())
        .collect();
    let snapshots: Vec<RelationshipSnapshot> = defaulted
        .into_iter()
        .map(|fk| RelationshipSnapshot::detach(mb, fk))
        .collect();
    let key = &mb.model[old];
    if key.source == ConfigurationSource::Convention && key.referencing_foreign_keys.is_empty() {
        mb.remove_key_raw(old);
    }
    for snapshot in &snapshots {
        absorb(snapshot.attach(mb))?;
    }
    Ok(())
}

// =============================================================================
// KEY & INDEX BUILDERS
// =============================================================================

/// Builder over one key.
pub struct KeyBuilder<'m> {
    pub(crate) mb: &'m mut ModelBuilder,
    pub(crate) id: KeyId,
}

impl<'m> KeyBuilder<'m> {
    pub(crate) fn new(mb: &'m mut ModelBuilder, id: KeyId) -> Self {
        Self { mb, id }
    }

    #[must_use]
    pub fn id(&self) -> KeyId {
        self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &Key {
        &self.mb.model[self.id]
    }

    fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.mb.model[self.id].annotations
    }
}

annotatable_builder!(KeyBuilder);

/// Builder over one index.
pub struct IndexBuilder<'m> {
    pub(crate) mb: &'m mut ModelBuilder,
    pub(crate) id: IndexId,
}

impl<'m> IndexBuilder<'m> {
    pub(crate) fn new(mb: &'m mut ModelBuilder, id: IndexId) -> Self {
        Self { mb, id }
    }

    #[must_use]
    pub fn id(&self) -> IndexId {
        self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &Index {
        &self.mb.model[self.id]
    }

    fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.mb.model[self.id].annotations
    }

    /// Set or reset uniqueness.
    pub fn is_unique(
        &mut self,
        unique: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        Ok(self.mb.model[self.id].is_unique.set(unique, source))
    }

    #[must_use]
    pub fn can_set_is_unique(&self, unique: Option<bool>, source: ConfigurationSource) -> bool {
        !self.mb.model.is_read_only()
            && self.mb.model[self.id]
                .is_unique
                .can_set(unique.as_ref(), source)
    }
}

annotatable_builder!(IndexBuilder);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ConfigurationSource::{Convention, DataAnnotation, Explicit};
    use crate::{ClrType, TypeIdentity};

    fn entity_with(
        mb: &mut ModelBuilder,
        name: &str,
        properties: &[&str],
    ) -> (TypeId, Vec<PropertyId>) {
        let id = mb
            .entity(TypeIdentity::named(name), Explicit, None)
            .expect("entity")
            .expect("created");
        let mut builder = mb.type_builder(id).expect("builder");
        let props = properties
            .iter()
            .map(|p| {
                builder
                    .property(p, Some(ClrType::Int32), Explicit)
                    .expect("property")
                    .expect("created")
            })
            .collect();
        (id, props)
    }

    #[test]
    fn primary_key_makes_properties_required() {
        let mut mb = ModelBuilder::new();
        let (blog, props) = entity_with(&mut mb, "Blog", &["Id"]);
        let key = mb
            .type_builder(blog)
            .expect("builder")
            .primary_key(&props, Explicit)
            .expect("pk")
            .expect("created");
        assert_eq!(mb.model().find_primary_key(blog), Some(key));
        assert!(!mb.model()[props[0]].is_nullable());
    }

    #[test]
    fn duplicate_key_property_is_rejected() {
        let mut mb = ModelBuilder::new();
        let (blog, props) = entity_with(&mut mb, "Blog", &["Id"]);
        let result = mb
            .type_builder(blog)
            .expect("builder")
            .has_key(&[props[0], props[0]], Explicit);
        assert!(matches!(
            result,
            Err(ModelError::DuplicatePropertyInList { .. })
        ));
    }

    #[test]
    fn derived_type_cannot_declare_key() {
        let mut mb = ModelBuilder::new();
        let (blog, _) = entity_with(&mut mb, "Blog", &["Id"]);
        let (special, props) = entity_with(&mut mb, "SpecialBlog", &["Extra"]);
        mb.type_builder(special)
            .expect("builder")
            .has_base_type(Some(blog), Explicit)
            .expect("base");
        let result = mb
            .type_builder(special)
            .expect("builder")
            .has_key(&props, Explicit);
        assert!(matches!(result, Err(ModelError::DerivedTypeKey { .. })));
    }

    #[test]
    fn keyless_type_rejects_lower_keys() {
        let mut mb = ModelBuilder::new();
        let (view, props) = entity_with(&mut mb, "View", &["Id"]);
        let mut builder = mb.type_builder(view).expect("builder");
        assert!(builder.is_keyless(Some(true), DataAnnotation).expect("keyless"));
        assert_eq!(builder.has_key(&props, Convention).expect("silent"), None);
        assert!(builder.has_key(&props, Explicit).expect("key").is_some());
        assert!(!mb.model()[view].is_keyless());
    }

    #[test]
    fn replacing_primary_key_prunes_convention_key() {
        let mut mb = ModelBuilder::new();
        let (blog, props) = entity_with(&mut mb, "Blog", &["Id", "Code"]);
        let mut builder = mb.type_builder(blog).expect("builder");
        let old = builder
            .primary_key(&props[..1], Convention)
            .expect("pk")
            .expect("created");
        let new = builder
            .primary_key(&props[1..], Explicit)
            .expect("pk")
            .expect("created");
        assert_ne!(old, new);
        assert!(mb.model().get_key(old).is_none());
        assert_eq!(mb.model().find_primary_key(blog), Some(new));
    }

    #[test]
    fn index_uniqueness_respects_source() {
        let mut mb = ModelBuilder::new();
        let (blog, props) = entity_with(&mut mb, "Blog", &["Url"]);
        let index = mb
            .type_builder(blog)
            .expect("builder")
            .has_index(&props, Some("IX_Url"), Convention)
            .expect("index")
            .expect("created");
        let mut builder = mb.index_builder(index).expect("builder");
        assert!(builder.is_unique(Some(true), DataAnnotation).expect("unique"));
        assert!(!builder.is_unique(Some(false), Convention).expect("silent"));
        assert!(mb.model()[index].is_unique());
        assert_eq!(mb.model()[index].name(), Some("IX_Url"));
    }
}
