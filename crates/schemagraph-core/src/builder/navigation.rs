//! # Navigations
//!
//! Facets of FK navigations, skip navigations and the many-to-many wiring
//! that binds a pair of skip navigations to a shared join entity type.

use super::foreign_key::ForeignKeyBuilder;
use super::type_base::{clear_ignored, conflicting_members};
use super::{ModelBuilder, TypeBuilder, annotatable_builder, member_facets};
use crate::annotations::Annotations;
use crate::conventions::ModelEvent;
use crate::model::Model;
use crate::model::elements::{MemberFacets, Navigation, SkipNavigation};
use crate::model::members::{MemberKind, MemberRef};
use crate::source::ConfigurationSource;
use crate::{
    ClrType, ForeignKeyId, ModelError, NavigationId, PropertyId, SkipNavigationId, TypeId,
    TypeIdentity,
};

// =============================================================================
// NAVIGATION BUILDER
// =============================================================================

/// Builder over one FK navigation.
pub struct NavigationBuilder<'m> {
    pub(crate) mb: &'m mut ModelBuilder,
    pub(crate) id: NavigationId,
}

impl<'m> NavigationBuilder<'m> {
    pub(crate) fn new(mb: &'m mut ModelBuilder, id: NavigationId) -> Self {
        Self { mb, id }
    }

    #[must_use]
    pub fn id(&self) -> NavigationId {
        self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &Navigation {
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
        let navigation = &self.mb.model[self.id];
        (
            navigation.declaring_type,
            navigation.name.clone(),
            navigation.clr_type.clone(),
        )
    }

    /// Load the target together with the declaring entity.
    pub fn auto_include(
        &mut self,
        auto_include: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        Ok(self.mb.model[self.id]
            .is_eager_loaded
            .set(auto_include, source))
    }

    pub fn enable_lazy_loading(
        &mut self,
        enabled: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        Ok(self.mb.model[self.id]
            .lazy_loading_enabled
            .set(enabled, source))
    }
}

annotatable_builder!(NavigationBuilder);
member_facets!(NavigationBuilder);

// =============================================================================
// SKIP NAVIGATIONS ON TYPES
// =============================================================================

#[derive(Debug)]
enum SkipPlan {
    Reuse(SkipNavigationId),
    Create {
        replaced: Option<SkipNavigationId>,
        conflicts: Vec<MemberRef>,
        is_collection: bool,
    },
    Reject(ModelError),
}

fn plan_skip_navigation(
    model: &Model,
    type_id: TypeId,
    name: &str,
    target: TypeId,
    collection: Option<bool>,
    source: ConfigurationSource,
) -> SkipPlan {
    let type_name = &model[type_id].name;
    for t in [type_id, target] {
        if !model[t].is_entity_type() {
            return SkipPlan::Reject(ModelError::NotAnEntityType(model[t].name.clone()));
        }
    }
    if name.trim().is_empty() {
        return SkipPlan::Reject(ModelError::InvalidName(name.to_string()));
    }
    if model[target].is_keyless() {
        return SkipPlan::Reject(ModelError::NavigationToKeylessType {
            navigation: name.to_string(),
            type_name: type_name.clone(),
            target: model[target].name.clone(),
        });
    }
    if model.is_member_ignored(type_id, name, source) {
        return SkipPlan::Reject(ModelError::Ignored {
            name: name.to_string(),
            owner: type_name.clone(),
        });
    }

    let mut is_collection = collection.unwrap_or(true);
    if let Some(member) = model.clr_member(type_id, name) {
        let element = member.clr_type.element_type().unwrap_or(&member.clr_type);
        if let Some(target_shape) = model[target].clr_type.as_ref().and_then(ClrType::shape_name)
            && element.shape_name() != Some(target_shape)
        {
            return SkipPlan::Reject(ModelError::NavigationTargetMismatch {
                navigation: name.to_string(),
                type_name: type_name.clone(),
                clr_type: member.clr_type.to_string(),
                target: model[target].name.clone(),
            });
        }
        if collection.is_some_and(|c| c != member.clr_type.is_collection()) {
            return SkipPlan::Reject(ModelError::NavigationShapeMismatch {
                navigation: name.to_string(),
                type_name: type_name.clone(),
                expected: if member.clr_type.is_collection() {
                    "a collection"
                } else {
                    "a reference"
                }
                .to_string(),
            });
        }
        is_collection = member.clr_type.is_collection();
    }

    let mut replaced = None;
    if let Some(existing) = model.find_skip_navigation(type_id, name) {
        let skip = &model[existing];
        if skip.target_type == target && skip.is_collection == is_collection {
            return SkipPlan::Reuse(existing);
        }
        if skip.declaring_type != type_id
            || skip.source == ConfigurationSource::Explicit
            || !source.overrides(Some(skip.source))
        {
            return SkipPlan::Reject(ModelError::ConflictingMember {
                member: name.to_string(),
                kind: MemberKind::SkipNavigation.to_string(),
                type_name: type_name.clone(),
                conflicting_kind: MemberKind::SkipNavigation.to_string(),
                conflicting_type: model[skip.declaring_type].name.clone(),
            });
        }
        replaced = Some(existing);
    }

    match conflicting_members(model, type_id, name, MemberKind::SkipNavigation, source) {
        Ok(conflicts) => SkipPlan::Create {
            replaced,
            conflicts,
            is_collection,
        },
        Err(error) => SkipPlan::Reject(error),
    }
}

impl TypeBuilder<'_> {
    /// Find or create the skip navigation `name` pointing to `target`.
    ///
    /// Collection-ness follows the CLR member when there is one, otherwise
    /// `collection` (default `true`).
    pub fn has_skip_navigation(
        &mut self,
        name: &str,
        target: TypeId,
        collection: Option<bool>,
        source: ConfigurationSource,
    ) -> Result<Option<SkipNavigationId>, ModelError> {
        self.mb.model.ensure_mutable()?;
        self.mb.check_type(target)?;
        let type_id = self.id;
        match plan_skip_navigation(&self.mb.model, type_id, name, target, collection, source) {
            SkipPlan::Reject(error) => source.reject(|| error),
            SkipPlan::Reuse(existing) => {
                let skip = &mut self.mb.model[existing];
                skip.source = source.max(Some(skip.source));
                Ok(Some(existing))
            }
            SkipPlan::Create {
                replaced,
                conflicts,
                is_collection,
            } => self.mb.batch(|mb| {
                if let Some(replaced) = replaced {
                    mb.remove_skip_navigation_raw(replaced);
                }
                for member in conflicts {
                    mb.remove_member_raw(member);
                }
                clear_ignored(&mut mb.model, type_id, name);
                let id = mb
                    .model
                    .add_skip_navigation(type_id, name, target, is_collection, source);
                tracing::debug!(
                    entity_type = %mb.model[type_id].name,
                    skip_navigation = name,
                    target = %mb.model[target].name,
                    %source,
                    "skip navigation added"
                );
                mb.notify(ModelEvent::SkipNavigationAdded(id));
                Ok(Some(id))
            }),
        }
    }

    #[must_use]
    pub fn can_add_skip_navigation(
        &self,
        name: &str,
        target: TypeId,
        collection: Option<bool>,
        source: ConfigurationSource,
    ) -> bool {
        let model = &self.mb.model;
        !model.is_read_only()
            && model.get_type(target).is_some()
            && !matches!(
                plan_skip_navigation(model, self.id, name, target, collection, source),
                SkipPlan::Reject(_)
            )
    }

    /// Remove a skip navigation declared on this type. Its inverse loses the
    /// link; the join FK stays.
    pub fn has_no_skip_navigation(
        &mut self,
        skip_navigation: SkipNavigationId,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        self.mb.check_skip_navigation(skip_navigation)?;
        let skip = &self.mb.model[skip_navigation];
        if !source.overrides(Some(skip.source)) {
            let element = self
                .mb
                .model
                .member_display(MemberRef::SkipNavigation(skip_navigation));
            return source.refuse(|| ModelError::CannotRemove { element });
        }
        self.mb.batch(|mb| {
            mb.remove_skip_navigation_raw(skip_navigation);
            Ok(true)
        })
    }
}

// =============================================================================
// SKIP NAVIGATION BUILDER
// =============================================================================

/// Builder over one skip navigation.
pub struct SkipNavigationBuilder<'m> {
    pub(crate) mb: &'m mut ModelBuilder,
    pub(crate) id: SkipNavigationId,
}

impl<'m> SkipNavigationBuilder<'m> {
    pub(crate) fn new(mb: &'m mut ModelBuilder, id: SkipNavigationId) -> Self {
        Self { mb, id }
    }

    #[must_use]
    pub fn id(&self) -> SkipNavigationId {
        self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &SkipNavigation {
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
        let skip = &self.mb.model[self.id];
        (skip.declaring_type, skip.name.clone(), skip.clr_type.clone())
    }

    fn foreign_key_error(&self, fk: ForeignKeyId) -> Option<ModelError> {
        let model = &self.mb.model;
        let skip = &model[self.id];
        let foreign_key = &model[fk];
        let mismatch = |reason: &str| ModelError::SkipNavigationForeignKeyMismatch {
            foreign_key: model.display_properties(&foreign_key.properties),
            navigation: skip.name.clone(),
            type_name: model[skip.declaring_type].name.clone(),
            reason: reason.to_string(),
        };
        if !model.is_same_or_derived(foreign_key.principal_type, skip.declaring_type) {
            return Some(mismatch("its principal type is not the declaring type"));
        }
        let inverse_join = skip
            .inverse
            .and_then(|inverse| model.join_entity_type(inverse));
        if inverse_join.is_some_and(|join| join != foreign_key.declaring_type) {
            return Some(mismatch("the inverse uses a different join entity type"));
        }
        None
    }

    /// Bind the join FK, declared on the join type and pointing to this
    /// navigation's declaring type.
    pub fn has_foreign_key(
        &mut self,
        fk: Option<ForeignKeyId>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        if let Some(fk) = fk {
            self.mb.check_foreign_key(fk)?;
        }
        let skip = &self.mb.model[self.id];
        let unchanged = skip.foreign_key == fk;
        if !source.can_set(skip.foreign_key_source, unchanged) {
            return Ok(false);
        }
        if let Some(error) = fk.and_then(|fk| self.foreign_key_error(fk)) {
            return source.refuse(|| error);
        }
        let ratcheted = fk.map(|_| source.max(skip.foreign_key_source));
        self.mb
            .model
            .set_skip_navigation_foreign_key(self.id, fk, ratcheted);
        Ok(true)
    }

    #[must_use]
    pub fn can_set_foreign_key(
        &self,
        fk: Option<ForeignKeyId>,
        source: ConfigurationSource,
    ) -> bool {
        let model = &self.mb.model;
        let skip = &model[self.id];
        !model.is_read_only()
            && source.can_set(skip.foreign_key_source, skip.foreign_key == fk)
            && fk.is_none_or(|fk| {
                model.get_foreign_key(fk).is_some() && self.foreign_key_error(fk).is_none()
            })
    }

    fn inverse_error(&self, inverse: SkipNavigationId) -> Option<ModelError> {
        let model = &self.mb.model;
        let skip = &model[self.id];
        let other = &model[inverse];
        let mismatch = |reason: &str| ModelError::SkipNavigationInverseMismatch {
            navigation: skip.name.clone(),
            type_name: model[skip.declaring_type].name.clone(),
            inverse: other.name.clone(),
            reason: reason.to_string(),
        };
        if !model.is_same_or_derived(skip.target_type, other.declaring_type)
            || !model.is_same_or_derived(other.target_type, skip.declaring_type)
        {
            return Some(mismatch("the navigations do not point at each other's types"));
        }
        match (model.join_entity_type(self.id), model.join_entity_type(inverse)) {
            (Some(left), Some(right)) if left != right => {
                Some(mismatch("they use different join entity types"))
            }
            _ => None,
        }
    }

    /// Link the inverse skip navigation on the target type; both ends are
    /// updated. `None` unlinks.
    pub fn has_inverse(
        &mut self,
        inverse: Option<SkipNavigationId>,
        source: ConfigurationSource,
    ) -> Result<bool, ModelError> {
        self.mb.model.ensure_mutable()?;
        if let Some(inverse) = inverse {
            self.mb.check_skip_navigation(inverse)?;
        }
        let id = self.id;
        let skip = &self.mb.model[id];
        let old = skip.inverse;
        if !source.can_set(skip.inverse_source, old == inverse) {
            return Ok(false);
        }
        if let Some(inverse) = inverse {
            let other = &self.mb.model[inverse];
            if !source.can_set(other.inverse_source, other.inverse == Some(id)) {
                return Ok(false);
            }
            if let Some(error) = self.inverse_error(inverse) {
                return source.refuse(|| error);
            }
        }

        let model = &mut self.mb.model;
        if let Some(old) = old.filter(|old| Some(*old) != inverse)
            && let Some(old) = model.skip_navigations.get_mut(&old)
        {
            old.inverse = None;
            old.inverse_source = None;
        }
        // The new inverse drops its previous partner
        if let Some(inverse) = inverse
            && let Some(partner) = model[inverse].inverse.filter(|p| *p != id)
            && let Some(partner) = model.skip_navigations.get_mut(&partner)
            && partner.inverse == Some(inverse)
        {
            partner.inverse = None;
            partner.inverse_source = None;
        }
        let skip = &mut model[id];
        skip.inverse = inverse;
        skip.inverse_source = inverse.map(|_| source.max(skip.inverse_source));
        if let Some(inverse) = inverse {
            let other = &mut model[inverse];
            other.inverse = Some(id);
            other.inverse_source = Some(source.max(other.inverse_source));
        }
        Ok(true)
    }
}

annotatable_builder!(SkipNavigationBuilder);
member_facets!(SkipNavigationBuilder);

// =============================================================================
// MANY-TO-MANY
// =============================================================================

fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

impl ModelBuilder {
    /// Wire a many-to-many relationship between `left` and `right`.
    ///
    /// Creates the skip navigations `left_navigation` on `left` and
    /// `right_navigation` on `right`, a shared join entity type named
    /// `<Left><Right>` with one required FK to each side and a composite
    /// primary key over the FK properties. The join type and its members are
    /// created at `Convention`; the skip navigations at `source`.
    pub fn has_many_to_many(
        &mut self,
        left: TypeId,
        left_navigation: &str,
        right: TypeId,
        right_navigation: &str,
        source: ConfigurationSource,
    ) -> Result<Option<(SkipNavigationId, SkipNavigationId)>, ModelError> {
        self.model.ensure_mutable()?;
        self.check_entity_type(left)?;
        self.check_entity_type(right)?;
        if left == right && left_navigation == right_navigation {
            return source.reject(|| ModelError::SkipNavigationInverseMismatch {
                navigation: left_navigation.to_string(),
                type_name: self.model[left].name.clone(),
                inverse: right_navigation.to_string(),
                reason: "a skip navigation cannot be its own inverse".to_string(),
            });
        }
        for t in [left, right] {
            if self.model.find_primary_key(t).is_none() {
                let name = self.model[t].name.clone();
                return source.reject(|| ModelError::PrincipalKeyless(name));
            }
        }

        let join_name = format!(
            "{}{}",
            short_name(&self.model[left].name),
            short_name(&self.model[right].name)
        );
        let existing_left = self.model.find_skip_navigation(left, left_navigation);
        let existing_right = self.model.find_skip_navigation(right, right_navigation);
        let existing_join = self.model.find_entity_type(&join_name);

        self.batch(|mb| {
            let ends = ManyToMany {
                left,
                left_navigation,
                right,
                right_navigation,
                join_name: &join_name,
            };
            let error = match ends.wire(mb, source) {
                Ok(pair) => return Ok(Some(pair)),
                Err(error) => error,
            };

            // Undo whatever part of the wiring this call created
            if existing_join.is_none()
                && let Some(join) = mb.model.find_entity_type(&join_name)
            {
                mb.remove_type_cascade(join)?;
            }
            for (existing, declaring, name) in [
                (existing_left, left, left_navigation),
                (existing_right, right, right_navigation),
            ] {
                if existing.is_none()
                    && let Some(skip) = mb.model.find_skip_navigation(declaring, name)
                {
                    mb.remove_skip_navigation_raw(skip);
                }
            }
            tracing::debug!(
                left = %mb.model[left].name,
                right = %mb.model[right].name,
                %error,
                "many-to-many abandoned"
            );
            if matches!(error, ModelError::JoinTypeNotConfigured { .. }) {
                source.reject(|| error)
            } else {
                Err(error)
            }
        })
    }
}

struct ManyToMany<'a> {
    left: TypeId,
    left_navigation: &'a str,
    right: TypeId,
    right_navigation: &'a str,
    join_name: &'a str,
}

impl ManyToMany<'_> {
    fn refused(&self, mb: &ModelBuilder, reason: &str) -> ModelError {
        ModelError::JoinTypeNotConfigured {
            left: mb.model[self.left].name.clone(),
            right: mb.model[self.right].name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Every step must succeed; a refusal at any step comes back as
    /// `JoinTypeNotConfigured`.
    fn wire(
        &self,
        mb: &mut ModelBuilder,
        source: ConfigurationSource,
    ) -> Result<(SkipNavigationId, SkipNavigationId), ModelError> {
        let (left, right) = (self.left, self.right);
        let Some(left_skip) = TypeBuilder::new(mb, left).has_skip_navigation(
            self.left_navigation,
            right,
            Some(true),
            source,
        )?
        else {
            return Err(self.refused(mb, "the left skip navigation was refused"));
        };
        let Some(right_skip) = TypeBuilder::new(mb, right).has_skip_navigation(
            self.right_navigation,
            left,
            Some(true),
            source,
        )?
        else {
            return Err(self.refused(mb, "the right skip navigation was refused"));
        };
        let bound = mb.model[left_skip].foreign_key.is_some()
            && mb.model[right_skip].foreign_key.is_some()
            && mb.model[left_skip].inverse == Some(right_skip);
        if bound {
            return Ok((left_skip, right_skip));
        }

        let convention = ConfigurationSource::Convention;
        let Some(join) = mb.entity(TypeIdentity::shared(self.join_name), convention, None)? else {
            return Err(self.refused(mb, "the join entity type was refused"));
        };

        let mut key_properties = Vec::new();
        for (principal, skip) in [(left, left_skip), (right, right_skip)] {
            let Some((fk, properties)) = join_foreign_key(mb, join, principal)? else {
                return Err(self.refused(mb, "a join foreign key was refused"));
            };
            key_properties.extend(properties);
            if !SkipNavigationBuilder::new(mb, skip).has_foreign_key(Some(fk), source)? {
                return Err(self.refused(mb, "a skip navigation kept its foreign key"));
            }
        }
        if TypeBuilder::new(mb, join)
            .primary_key(&key_properties, convention)?
            .is_none()
        {
            return Err(self.refused(mb, "the join primary key was refused"));
        }
        if !SkipNavigationBuilder::new(mb, left_skip).has_inverse(Some(right_skip), source)? {
            return Err(self.refused(mb, "the skip navigations kept other inverses"));
        }

        tracing::debug!(
            join_type = %mb.model[join].name,
            left = %mb.model[left].name,
            right = %mb.model[right].name,
            "many-to-many configured"
        );
        Ok((left_skip, right_skip))
    }
}

/// Required FK from `join` to `principal` over fresh non-nullable
/// properties mirroring the principal's primary key.
fn join_foreign_key(
    mb: &mut ModelBuilder,
    join: TypeId,
    principal: TypeId,
) -> Result<Option<(ForeignKeyId, Vec<PropertyId>)>, ModelError> {
    let convention = ConfigurationSource::Convention;
    let Some(key) = mb.model.find_primary_key(principal) else {
        return Ok(None);
    };
    let prefix = short_name(&mb.model[principal].name).to_string();
    let bases: Vec<(String, ClrType)> = mb.model[key]
        .properties
        .iter()
        .map(|p| {
            let property = &mb.model[*p];
            (
                format!("{}{}", prefix, property.name),
                property.clr_type.unwrap_nullable().clone(),
            )
        })
        .collect();
    let properties = TypeBuilder::new(mb, join).create_unique_properties(&bases, convention)?;
    let Some(fk) = TypeBuilder::new(mb, join).has_relationship(
        principal,
        Some(&properties),
        Some(key),
        convention,
    )?
    else {
        return Ok(None);
    };
    ForeignKeyBuilder::new(mb, fk).is_required(Some(true), convention)?;
    Ok(Some((fk, properties)))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropertyBase;
    use crate::source::ConfigurationSource::{Convention, DataAnnotation, Explicit};
    use crate::{ClrShape, ClrType};

    /// Post(Id, Tags: List<Tag>) and Tag(Id, Posts: List<Post>)
    fn posts_and_tags() -> (ModelBuilder, TypeId, TypeId) {
        let mut mb = ModelBuilder::new();
        mb.register_shape(
            ClrShape::class("Post")
                .with_property("Id", ClrType::Int32)
                .with_property("Tags", ClrType::collection_of(ClrType::class("Tag")))
                .with_field("_tags", ClrType::collection_of(ClrType::class("Tag"))),
        )
        .expect("shape");
        mb.register_shape(
            ClrShape::class("Tag")
                .with_property("Id", ClrType::Guid)
                .with_property("Posts", ClrType::collection_of(ClrType::class("Post"))),
        )
        .expect("shape");
        let mut ids = Vec::new();
        for name in ["Post", "Tag"] {
            let id = mb
                .entity(TypeIdentity::class(name), Explicit, None)
                .expect("entity")
                .expect("created");
            let mut builder = mb.type_builder(id).expect("builder");
            let key = builder
                .property("Id", None, Explicit)
                .expect("property")
                .expect("created");
            builder.primary_key(&[key], Explicit).expect("pk");
            ids.push(id);
        }
        (mb, ids[0], ids[1])
    }

    #[test]
    fn many_to_many_creates_join_type() {
        let (mut mb, post, tag) = posts_and_tags();
        let (tags, posts) = mb
            .has_many_to_many(post, "Tags", tag, "Posts", Explicit)
            .expect("many-to-many")
            .expect("created");
        let model = mb.model();
        let join = model.find_entity_type("PostTag").expect("join type");
        assert!(model[join].is_shared());
        assert_eq!(model.join_entity_type(tags), Some(join));
        assert_eq!(model.join_entity_type(posts), Some(join));
        assert_eq!(model[tags].inverse(), Some(posts));
        assert_eq!(model[posts].inverse(), Some(tags));

        let pk = model.find_primary_key(join).expect("composite key");
        let names = model.property_names(model[pk].properties());
        assert_eq!(names, vec!["PostId".to_string(), "TagId".to_string()]);
        for fk in model[join].foreign_keys() {
            assert!(model.is_required(fk));
        }
        let tag_id = model.find_property(join, "TagId").expect("tag id");
        assert_eq!(model[tag_id].clr_type(), &ClrType::Guid);
    }

    #[test]
    fn many_to_many_is_idempotent() {
        let (mut mb, post, tag) = posts_and_tags();
        let first = mb
            .has_many_to_many(post, "Tags", tag, "Posts", Explicit)
            .expect("first");
        let second = mb
            .has_many_to_many(post, "Tags", tag, "Posts", Convention)
            .expect("second");
        assert_eq!(first, second);
        assert_eq!(mb.model().entity_type_count(), 3);
    }

    #[test]
    fn skip_navigation_target_must_match_clr_member() {
        let (mut mb, post, _) = posts_and_tags();
        let mut builder = mb.type_builder(post).expect("builder");
        assert!(matches!(
            builder.has_skip_navigation("Tags", post, None, Explicit),
            Err(ModelError::NavigationTargetMismatch { .. })
        ));
        assert!(!builder.can_add_skip_navigation("Tags", post, None, Convention));
    }

    #[test]
    fn inverse_must_point_back() {
        let (mut mb, post, tag) = posts_and_tags();
        let tags = mb
            .type_builder(post)
            .expect("builder")
            .has_skip_navigation("Tags", tag, None, Explicit)
            .expect("skip")
            .expect("created");
        let related = mb
            .type_builder(post)
            .expect("builder")
            .has_skip_navigation("Related", post, None, Explicit)
            .expect("skip")
            .expect("created");
        let result = mb
            .skip_navigation_builder(tags)
            .expect("builder")
            .has_inverse(Some(related), Explicit);
        assert!(matches!(
            result,
            Err(ModelError::SkipNavigationInverseMismatch { .. })
        ));
    }

    #[test]
    fn removing_skip_navigation_unlinks_inverse() {
        let (mut mb, post, tag) = posts_and_tags();
        let (tags, posts) = mb
            .has_many_to_many(post, "Tags", tag, "Posts", DataAnnotation)
            .expect("many-to-many")
            .expect("created");
        let mut builder = mb.type_builder(post).expect("builder");
        assert!(!builder.has_no_skip_navigation(tags, Convention).expect("silent"));
        assert!(builder.has_no_skip_navigation(tags, Explicit).expect("removed"));
        assert_eq!(mb.model()[posts].inverse(), None);
        assert!(mb.model().find_entity_type("PostTag").is_some());
    }

    #[test]
    fn navigation_facets_follow_precedence() {
        let (mut mb, post, tag) = posts_and_tags();
        let (tags, _) = mb
            .has_many_to_many(post, "Tags", tag, "Posts", Explicit)
            .expect("many-to-many")
            .expect("created");
        let mut builder = mb.skip_navigation_builder(tags).expect("builder");
        assert!(builder.has_field(Some("_tags"), DataAnnotation).expect("field"));
        assert!(!builder.has_field(None, Convention).expect("silent"));
        assert!(matches!(
            builder.has_field(Some("_missing"), Explicit),
            Err(ModelError::InvalidBackingField { .. })
        ));
        assert_eq!(mb.model()[tags].facets().field(), Some("_tags"));
    }

    #[test]
    fn auto_include_and_lazy_loading() {
        let mut mb = ModelBuilder::new();
        let blog = mb
            .entity(TypeIdentity::named("Blog"), Explicit, None)
            .expect("blog")
            .expect("created");
        let post = mb
            .entity(TypeIdentity::named("Post"), Explicit, None)
            .expect("post")
            .expect("created");
        let fk = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, None, None, Explicit)
            .expect("relationship")
            .expect("created");
        mb.foreign_key_builder(fk)
            .expect("builder")
            .has_navigation(Some("Blog"), true, Explicit)
            .expect("navigation");
        let navigation = mb.model()[fk].dependent_to_principal().expect("navigation");
        let mut builder = mb.navigation_builder(navigation).expect("builder");
        assert!(builder.auto_include(Some(true), DataAnnotation).expect("eager"));
        assert!(!builder.auto_include(Some(false), Convention).expect("silent"));
        assert!(builder.enable_lazy_loading(Some(false), Explicit).expect("lazy"));
        let navigation = &mb.model()[navigation];
        assert!(navigation.is_eager_loaded());
        assert!(!navigation.lazy_loading_enabled());
    }
}
