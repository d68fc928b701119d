//! # Inheritance
//!
//! Reparenting a structural type.
//!
//! Keys declared on the reparented type give way to the new root's key.
//! Members that collide with an inherited member of the same name either
//! merge into it (same kind, same CLR type) or are removed when the source
//! allows it. Relationships touching the subtree bind to properties and keys
//! of the old chain, so they are detached first and reattached afterwards.

use super::type_base::TypeBuilder;
use crate::conventions::ModelEvent;
use crate::model::Model;
use crate::model::members::MemberRef;
use crate::snapshot::{
    ComplexPropertySnapshot, IndexSnapshot, PropertiesSnapshot, RelationshipSnapshot, absorb,
};
use crate::source::ConfigurationSource;
use crate::{ForeignKeyId, IndexId, KeyId, ModelError, PropertyId, TypeId};
use std::collections::BTreeSet;

#[derive(Debug)]
enum BaseTypePlan {
    Unchanged,
    Set {
        keys: Vec<KeyId>,
        merged: Vec<MemberRef>,
        removed: Vec<MemberRef>,
    },
    Reject(ModelError),
}

/// Whether the CLR shape `derived` has `base` among its CLR ancestors.
/// Unregistered shapes are taken on trust.
fn clr_derives(model: &Model, derived: &str, base: &str) -> bool {
    let mut current = derived.to_string();
    for _ in 0..=model.max_chain {
        if current == base {
            return true;
        }
        let Some(shape) = model.shape(&current) else {
            return true;
        };
        match &shape.base {
            Some(next) => current = next.clone(),
            None => return false,
        }
    }
    false
}

fn plan_base_type(
    model: &Model,
    type_id: TypeId,
    base: Option<TypeId>,
    source: ConfigurationSource,
) -> BaseTypePlan {
    let ty = &model[type_id];
    if ty.base_type == base {
        return BaseTypePlan::Unchanged;
    }
    if !source.can_set(ty.base_type_source, false) {
        return BaseTypePlan::Reject(ModelError::CannotRemove {
            element: format!("the base type of '{}'", ty.name),
        });
    }
    let Some(base) = base else {
        return BaseTypePlan::Set {
            keys: Vec::new(),
            merged: Vec::new(),
            removed: Vec::new(),
        };
    };
    let Some(base_ty) = model.get_type(base) else {
        return BaseTypePlan::Reject(ModelError::ElementNotFound(base.to_string()));
    };
    let invalid = |reason: String| ModelError::InvalidBaseType {
        type_name: ty.name.clone(),
        base_type: base_ty.name.clone(),
        reason,
    };

    if base_ty.kind != ty.kind {
        return BaseTypePlan::Reject(invalid(
            "entity types and complex types cannot derive from each other".to_string(),
        ));
    }
    if model.is_same_or_derived(type_id, base) {
        return BaseTypePlan::Reject(ModelError::CircularInheritance {
            type_name: ty.name.clone(),
            base_type: base_ty.name.clone(),
        });
    }
    if let Some(derived_shape) = ty.clr_type.as_ref().and_then(|t| t.shape_name())
        && let Some(base_shape) = base_ty.clr_type.as_ref().and_then(|t| t.shape_name())
        && !clr_derives(model, derived_shape, base_shape)
    {
        return BaseTypePlan::Reject(invalid(format!(
            "the CLR type '{derived_shape}' does not derive from '{base_shape}'"
        )));
    }

    let keys: Vec<KeyId> = ty.keys.iter().copied().collect();
    let keys_blocked = !source.overrides(ty.primary_key.source())
        || keys.iter().any(|k| !source.overrides(Some(model[*k].source)));
    if !keys.is_empty() && keys_blocked {
        return BaseTypePlan::Reject(ModelError::DerivedTypeKey {
            type_name: ty.name.clone(),
            root_type: model[model.root_type(base)].name.clone(),
        });
    }

    let inherited = model.base_types_inclusive(base);
    let mut merged = Vec::new();
    let mut removed: Vec<MemberRef> = Vec::new();
    for t in model.derived_types_inclusive(type_id) {
        for member in model.declared_members(t) {
            let name = model.member(member).name();
            let Some(existing) = inherited
                .iter()
                .find_map(|b| model.find_declared_member(*b, name))
            else {
                continue;
            };
            let mergeable = matches!(
                member,
                MemberRef::Property(_) | MemberRef::ComplexProperty(_)
            );
            if mergeable && model.members_compatible(member, existing) {
                merged.push(member);
                continue;
            }
            let removable = |m: MemberRef| {
                let member_source = model.member_source(m);
                member_source != Some(ConfigurationSource::Explicit)
                    && source.overrides(member_source)
            };
            if removable(member) {
                removed.push(member);
            } else if removable(existing) {
                if !removed.contains(&existing) {
                    removed.push(existing);
                }
            } else {
                return BaseTypePlan::Reject(ModelError::ConflictingBaseMember {
                    member: name.to_string(),
                    type_name: model[t].name.clone(),
                    base_type: model[model.member(existing).declaring_type()].name.clone(),
                });
            }
        }
    }

    BaseTypePlan::Set {
        keys,
        merged,
        removed,
    }
}

impl TypeBuilder<'_> {
    /// Set or clear the base type.
    ///
    /// Keys declared on this type are dropped in favour of the new root's
    /// key when `source` overrides them. Same-name members of the subtree
    /// merge with compatible inherited members; incompatible ones are
    /// removed on whichever side `source` can override.
    pub fn has_base_type(
        &mut self,
        base: Option<TypeId>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        if let Some(base) = base {
            self.mb.check_type(base)?;
        }
        let type_id = self.id;
        match plan_base_type(&self.mb.model, type_id, base, source) {
            BaseTypePlan::Reject(error) => source.refuse(|| error),
            BaseTypePlan::Unchanged => {
                let ty = &mut self.mb.model[type_id];
                if ty.base_type.is_some() {
                    ty.base_type_source = Some(source.max(ty.base_type_source));
                }
                Ok(true)
            }
            BaseTypePlan::Set {
                keys,
                merged,
                removed,
            } => self.mb.batch(|mb| {
                let subtree = mb.model.derived_types_inclusive(type_id);

                let touching: BTreeSet<ForeignKeyId> = subtree
                    .iter()
                    .flat_map(|t| {
                        let ty = &mb.model[*t];
                        ty.foreign_keys
                            .iter()
                            .chain(&ty.referencing_foreign_keys)
                            .copied()
                            .collect::<Vec<_>>()
                    })
                    .collect();
                let mut relationships: Vec<RelationshipSnapshot> = Vec::new();
                for fk in touching {
                    if mb.model.get_foreign_key(fk).is_some() {
                        relationships.push(RelationshipSnapshot::detach(mb, fk));
                    }
                }

                // Indexes over properties inherited from the old chain
                let stale: Vec<IndexId> = subtree
                    .iter()
                    .flat_map(|t| mb.model[*t].indexes.iter().copied())
                    .filter(|index| {
                        mb.model[*index]
                            .properties
                            .iter()
                            .any(|p| !subtree.contains(&mb.model[*p].declaring_type))
                    })
                    .collect();
                let indexes: Vec<IndexSnapshot> = stale
                    .into_iter()
                    .map(|index| IndexSnapshot::detach(mb, index))
                    .collect();

                for key in keys {
                    mb.remove_key_raw(key);
                }
                for member in removed {
                    if mb.model.contains_member(member) {
                        mb.remove_member_raw(member);
                    }
                }

                let mut properties: Vec<PropertyId> = Vec::new();
                let mut complex = Vec::new();
                for member in merged {
                    match member {
                        MemberRef::Property(id) if mb.model.get_property(id).is_some() => {
                            properties.push(id);
                        }
                        MemberRef::ComplexProperty(id) => {
                            if let Some(cp) = mb.model.get_complex_property(id) {
                                let declaring = cp.declaring_type;
                                complex.push((declaring, ComplexPropertySnapshot::detach(mb, id)));
                            }
                        }
                        _ => {}
                    }
                }
                let properties = PropertiesSnapshot::detach(mb, &properties);

                mb.model.set_base_type(type_id, base, Some(source));
                let base_name =
                    base.map_or_else(|| "none".to_string(), |b| mb.model[b].name.clone());
                tracing::debug!(
                    entity_type = %mb.model[type_id].name,
                    base_type = %base_name,
                    %source,
                    "base type changed"
                );
                mb.notify(ModelEvent::BaseTypeChanged(type_id));

                properties.attach(mb)?;
                for (declaring, snapshot) in &complex {
                    absorb(snapshot.attach(mb, *declaring))?;
                }
                for snapshot in &indexes {
                    absorb(snapshot.attach(mb))?;
                }
                for snapshot in &relationships {
                    absorb(snapshot.attach(mb))?;
                }
                Ok(true)
            }),
        }
    }

    /// Whether `has_base_type` would succeed.
    #[must_use]
    pub fn can_set_base_type(&self, base: Option<TypeId>, source: ConfigurationSource) -> bool {
        let model = &self.mb.model;
        !model.is_read_only()
            && base.is_none_or(|b| model.get_type(b).is_some())
            && !matches!(
                plan_base_type(model, self.id, base, source),
                BaseTypePlan::Reject(_)
            )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::builder::ModelBuilder;
    use crate::source::ConfigurationSource::{Convention, DataAnnotation, Explicit};
    use crate::{ClrType, ModelError, PropertyId, TypeId, TypeIdentity};

    fn entity(mb: &mut ModelBuilder, name: &str) -> TypeId {
        mb.entity(TypeIdentity::named(name), Explicit, None)
            .expect("entity")
            .expect("created")
    }

    fn property(
        mb: &mut ModelBuilder,
        type_id: TypeId,
        name: &str,
        clr_type: ClrType,
        source: crate::source::ConfigurationSource,
    ) -> PropertyId {
        mb.type_builder(type_id)
            .expect("builder")
            .property(name, Some(clr_type), source)
            .expect("property")
            .expect("created")
    }

    fn keyed(mb: &mut ModelBuilder, name: &str) -> (TypeId, PropertyId) {
        let id = entity(mb, name);
        let key = property(mb, id, "Id", ClrType::Int32, Explicit);
        mb.type_builder(id)
            .expect("builder")
            .primary_key(&[key], Explicit)
            .expect("pk")
            .expect("created");
        (id, key)
    }

    #[test]
    fn reparenting_merges_keys_into_root() {
        let mut mb = ModelBuilder::new();
        let (blog, blog_id) = keyed(&mut mb, "Blog");
        let (special, _) = keyed(&mut mb, "SpecialBlog");

        assert!(mb
            .type_builder(special)
            .expect("builder")
            .has_base_type(Some(blog), Explicit)
            .expect("base"));

        let model = mb.model();
        assert_eq!(model[special].base_type(), Some(blog));
        assert_eq!(model[special].keys().count(), 0);
        assert_eq!(model.find_property(special, "Id"), Some(blog_id));
        assert_eq!(model.find_primary_key(special), model.find_primary_key(blog));
    }

    #[test]
    fn circular_inheritance_is_rejected() {
        let mut mb = ModelBuilder::new();
        let animal = entity(&mut mb, "Animal");
        let dog = entity(&mut mb, "Dog");
        mb.type_builder(dog)
            .expect("builder")
            .has_base_type(Some(animal), Explicit)
            .expect("base");

        let mut builder = mb.type_builder(animal).expect("builder");
        assert!(!builder.can_set_base_type(Some(dog), Explicit));
        assert!(!builder.has_base_type(Some(dog), Convention).expect("silent"));
        assert!(matches!(
            builder.has_base_type(Some(dog), Explicit),
            Err(ModelError::CircularInheritance { .. })
        ));
    }

    #[test]
    fn lower_source_keeps_configured_base() {
        let mut mb = ModelBuilder::new();
        let animal = entity(&mut mb, "Animal");
        let dog = entity(&mut mb, "Dog");
        let mut builder = mb.type_builder(dog).expect("builder");
        assert!(builder.has_base_type(Some(animal), DataAnnotation).expect("base"));
        assert!(!builder.has_base_type(None, Convention).expect("silent"));
        assert_eq!(mb.model()[dog].base_type(), Some(animal));
        assert_eq!(mb.model()[dog].base_type_source(), Some(DataAnnotation));

        let mut builder = mb.type_builder(dog).expect("builder");
        assert!(builder.has_base_type(None, Explicit).expect("cleared"));
        assert_eq!(mb.model()[dog].base_type(), None);
        assert_eq!(mb.model()[animal].derived_types().count(), 0);
    }

    #[test]
    fn explicit_members_of_different_types_conflict() {
        let mut mb = ModelBuilder::new();
        let blog = entity(&mut mb, "Blog");
        let special = entity(&mut mb, "SpecialBlog");
        property(&mut mb, blog, "Title", ClrType::String, Explicit);
        property(&mut mb, special, "Title", ClrType::Int32, Explicit);

        let result = mb
            .type_builder(special)
            .expect("builder")
            .has_base_type(Some(blog), Explicit);
        assert!(matches!(
            result,
            Err(ModelError::ConflictingBaseMember { .. })
        ));
        assert_eq!(mb.model()[special].base_type(), None);
    }

    #[test]
    fn convention_member_yields_to_inherited_member() {
        let mut mb = ModelBuilder::new();
        let blog = entity(&mut mb, "Blog");
        let special = entity(&mut mb, "SpecialBlog");
        let title = property(&mut mb, blog, "Title", ClrType::String, Explicit);
        property(&mut mb, special, "Title", ClrType::Int32, Convention);

        mb.type_builder(special)
            .expect("builder")
            .has_base_type(Some(blog), Explicit)
            .expect("base");
        assert_eq!(mb.model().find_property(special, "Title"), Some(title));
        assert_eq!(mb.model()[special].properties().count(), 0);
    }

    #[test]
    fn relationships_follow_the_new_root_key() {
        let mut mb = ModelBuilder::new();
        let (blog, _) = keyed(&mut mb, "Blog");
        let (special, _) = keyed(&mut mb, "SpecialBlog");
        let post = entity(&mut mb, "Post");
        let blog_id = property(&mut mb, post, "BlogId", ClrType::Int32, Explicit);
        mb.type_builder(post)
            .expect("builder")
            .has_relationship(special, Some(&[blog_id]), None, Explicit)
            .expect("relationship")
            .expect("created");

        mb.type_builder(special)
            .expect("builder")
            .has_base_type(Some(blog), Explicit)
            .expect("base");

        let model = mb.model();
        let fk = model
            .foreign_keys()
            .find(|fk| fk.declaring_type() == post)
            .expect("reattached");
        assert_eq!(fk.principal_type(), special);
        assert_eq!(Some(fk.principal_key()), model.find_primary_key(blog));
        assert_eq!(fk.properties(), &[blog_id]);
    }

    #[test]
    fn complex_and_entity_types_do_not_mix() {
        let mut mb = ModelBuilder::new();
        mb.register_shape(
            crate::ClrShape::structure("Address").with_property("City", ClrType::String),
        )
        .expect("shape");
        let blog = entity(&mut mb, "Blog");
        let cp = mb
            .type_builder(blog)
            .expect("builder")
            .complex_property("Address", Some(ClrType::structure("Address")), None, Explicit)
            .expect("complex")
            .expect("created");
        let complex_type = mb.model()[cp].complex_type();
        let builder = mb.type_builder(complex_type).expect("builder");
        assert!(!builder.can_set_base_type(Some(blog), Explicit));
    }
}
