//! # Builder Tier Tests (T0-T4)
//!
//! End-to-end checks through the public builder API only.
//!
//! ## Tiers
//! - T0: Configuration-Source Gate
//! - T1: Idempotent Redeclaration
//! - T2: Relationship Validation
//! - T3: Structural Cascades & Detach/Attach
//! - T4: Frozen Model & Export

use schemagraph_core::{
    ClrShape, ClrType, ConfigurationSource, DeleteBehavior, ForeignKeyId, ModelBuilder,
    ModelError, PropertyId, SkipNavigationId, TypeId, TypeIdentity,
};
use ConfigurationSource::{Convention, DataAnnotation, Explicit};

/// Blog(Id, Posts) <- Post(Id, BlogId, Blog), plus an owned Address.
fn blogging() -> (ModelBuilder, TypeId, TypeId) {
    let mut mb = ModelBuilder::new();
    mb.register_shape(
        ClrShape::class("Blog")
            .with_property("Id", ClrType::Int32)
            .with_property("Name", ClrType::String)
            .with_property("Posts", ClrType::collection_of(ClrType::class("Post"))),
    )
    .expect("shape");
    mb.register_shape(
        ClrShape::class("Post")
            .with_property("Id", ClrType::Int32)
            .with_property("BlogId", ClrType::Int32)
            .with_property("Title", ClrType::String)
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
    for t in [blog, post] {
        let mut builder = mb.type_builder(t).expect("builder");
        let id = builder
            .property("Id", None, Explicit)
            .expect("property")
            .expect("created");
        builder.primary_key(&[id], Explicit).expect("pk");
    }
    (mb, blog, post)
}

fn blog_id(mb: &mut ModelBuilder, post: TypeId) -> PropertyId {
    mb.type_builder(post)
        .expect("builder")
        .property("BlogId", None, Explicit)
        .expect("property")
        .expect("created")
}

fn relate(mb: &mut ModelBuilder, blog: TypeId, post: TypeId) -> ForeignKeyId {
    let property = blog_id(mb, post);
    mb.type_builder(post)
        .expect("builder")
        .has_relationship(blog, Some(&[property]), None, Explicit)
        .expect("relationship")
        .expect("created")
}

fn skip(mb: &mut ModelBuilder, declaring: TypeId, name: &str, target: TypeId) -> SkipNavigationId {
    mb.type_builder(declaring)
        .expect("builder")
        .has_skip_navigation(name, target, Some(true), Explicit)
        .expect("skip")
        .expect("created")
}

// =============================================================================
// TIER T0: CONFIGURATION-SOURCE GATE
// =============================================================================

mod t0_source_gate {
    use super::*;

    /// T0.1: Sources are totally ordered.
    #[test]
    fn sources_are_ordered() {
        assert!(Convention < DataAnnotation);
        assert!(DataAnnotation < Explicit);
        assert!(Explicit.overrides(Some(Explicit)));
        assert!(!Explicit.overrides_strictly(Some(Explicit)));
        assert!(Convention.overrides(None));
    }

    /// T0.2: A weaker source cannot overwrite a facet.
    #[test]
    fn weaker_source_cannot_overwrite_facet() {
        let (mut mb, _, post) = blogging();
        let title = mb
            .type_builder(post)
            .expect("builder")
            .property("Title", None, Explicit)
            .expect("property")
            .expect("created");
        let mut builder = mb.property_builder(title).expect("builder");
        assert!(builder.has_max_length(Some(200), DataAnnotation).expect("set"));
        assert!(!builder.has_max_length(Some(50), Convention).expect("silent"));
        assert!(builder.has_max_length(Some(100), Explicit).expect("override"));
        let property = &mb.model()[title];
        assert_eq!(property.max_length(), Some(100));
        assert_eq!(property.max_length_source(), Some(Explicit));
    }

    /// T0.3: Re-stating the same value ratchets the source up.
    #[test]
    fn same_value_ratchets_source() {
        let (mut mb, _, post) = blogging();
        let title = mb
            .type_builder(post)
            .expect("builder")
            .property("Title", None, Convention)
            .expect("property")
            .expect("created");
        let mut builder = mb.property_builder(title).expect("builder");
        assert!(builder.is_nullable(Some(false), Explicit).expect("set"));
        assert!(builder.is_nullable(Some(false), Convention).expect("unchanged"));
        assert_eq!(mb.model()[title].is_nullable_source(), Some(Explicit));
    }
}

// =============================================================================
// TIER T1: IDEMPOTENT REDECLARATION
// =============================================================================

mod t1_redeclaration {
    use super::*;

    /// T1.1: Declaring the same entity type twice yields the same id.
    #[test]
    fn entity_redeclaration_is_idempotent() {
        let (mut mb, blog, _) = blogging();
        let again = mb
            .entity(TypeIdentity::class("Blog"), Convention, None)
            .expect("entity");
        assert_eq!(again, Some(blog));
        assert_eq!(mb.model().entity_type_count(), 2);
    }

    /// T1.2: A convention cannot retype a property a convention created.
    #[test]
    fn convention_cannot_retype_convention_property() {
        let mut mb = ModelBuilder::new();
        let tag = mb
            .entity(TypeIdentity::named("Tag"), Explicit, None)
            .expect("entity")
            .expect("created");
        let mut builder = mb.type_builder(tag).expect("builder");
        let label = builder
            .property("Label", Some(ClrType::String), Convention)
            .expect("property")
            .expect("created");
        assert_eq!(
            builder
                .property("Label", Some(ClrType::Int32), Convention)
                .expect("silent"),
            None
        );
        assert_eq!(mb.model()[label].clr_type(), &ClrType::String);
    }

    /// T1.3: Explicit retyping replaces the property and keeps its key.
    #[test]
    fn explicit_retype_keeps_key() {
        let mut mb = ModelBuilder::new();
        let tag = mb
            .entity(TypeIdentity::named("Tag"), Explicit, None)
            .expect("entity")
            .expect("created");
        let mut builder = mb.type_builder(tag).expect("builder");
        let id = builder
            .property("Id", Some(ClrType::Int32), Explicit)
            .expect("property")
            .expect("created");
        builder.primary_key(&[id], Explicit).expect("pk");
        let retyped = builder
            .property("Id", Some(ClrType::Guid), Explicit)
            .expect("retyped")
            .expect("created");
        let model = mb.model();
        assert_eq!(model[retyped].clr_type(), &ClrType::Guid);
        let pk = model.find_primary_key(tag).expect("pk");
        assert_eq!(model[pk].properties(), &[retyped]);
    }

    /// T1.4: Ignoring a member removes it unless a stronger source added it.
    #[test]
    fn ignore_respects_member_source() {
        let (mut mb, _, post) = blogging();
        let mut builder = mb.type_builder(post).expect("builder");
        builder
            .property("Title", None, DataAnnotation)
            .expect("property")
            .expect("created");
        assert!(!builder.ignore("Title", Convention).expect("silent"));
        assert!(builder.ignore("Title", Explicit).expect("ignored"));
        assert!(builder.is_ignored("Title"));
        assert_eq!(mb.model().find_property(post, "Title"), None);
    }

    /// T1.5: A property backed by a CLR member keeps the member's type,
    /// whatever the source asking for another one.
    #[test]
    fn clr_backed_property_cannot_be_retyped() {
        let (mut mb, _, post) = blogging();
        let mut builder = mb.type_builder(post).expect("builder");
        let title = builder
            .property("Title", None, Explicit)
            .expect("property")
            .expect("created");
        assert_eq!(
            builder
                .property("Title", Some(ClrType::Int32), Convention)
                .expect("silent"),
            None
        );
        assert!(matches!(
            builder.property("Title", Some(ClrType::Int32), Explicit),
            Err(ModelError::PropertyTypeMismatch { .. })
        ));
        let model = mb.model();
        assert_eq!(model.find_property(post, "Title"), Some(title));
        assert_eq!(model[title].clr_type(), &ClrType::String);
        assert_eq!(model[title].source(), Explicit);
    }

    /// T1.6: Retyping a complex property needs a stronger source and moves
    /// the complex type registration along with it.
    #[test]
    fn complex_retype_moves_registration() {
        let mut mb = ModelBuilder::new();
        for shape in ["Address", "Geo"] {
            mb.register_shape(ClrShape::structure(shape).with_property("Line", ClrType::String))
                .expect("shape");
        }
        let customer = mb
            .entity(TypeIdentity::named("Customer"), Explicit, None)
            .expect("entity")
            .expect("created");
        let mut builder = mb.type_builder(customer).expect("builder");
        builder
            .complex_property("Home", Some(ClrType::structure("Address")), None, Convention)
            .expect("complex")
            .expect("created");
        let geo = Some(ClrType::structure("Geo"));
        assert_eq!(
            builder
                .complex_property("Home", geo.clone(), None, Convention)
                .expect("silent"),
            None
        );
        assert_eq!(mb.model().complex_registration_source("Address"), Some(Convention));
        assert_eq!(mb.model().complex_registration_source("Geo"), None);

        mb.type_builder(customer)
            .expect("builder")
            .complex_property("Home", geo, None, DataAnnotation)
            .expect("complex")
            .expect("replaced");
        assert_eq!(mb.model().complex_registration_source("Address"), None);
        assert_eq!(mb.model().complex_registration_source("Geo"), Some(DataAnnotation));
        let clashing = mb
            .entity(TypeIdentity::Clr(ClrType::structure("Geo")), Convention, None)
            .expect("silent");
        assert_eq!(clashing, None);
    }
}

// =============================================================================
// TIER T2: RELATIONSHIP VALIDATION
// =============================================================================

mod t2_relationships {
    use super::*;

    /// T2.1: An explicit duplicate foreign key is an error.
    #[test]
    fn duplicate_foreign_key_fails() {
        let (mut mb, blog, post) = blogging();
        relate(&mut mb, blog, post);
        let property = mb.model().find_property(post, "BlogId").expect("BlogId");
        let result = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, Some(&[property]), None, Explicit);
        assert!(matches!(result, Err(ModelError::DuplicateForeignKey { .. })));
    }

    /// T2.2: Explicit navigation removal leaves no dangling inverse and
    /// blocks conventions from bringing it back.
    #[test]
    fn explicit_navigation_removal_leaves_no_dangling_inverse() {
        let (mut mb, blog, post) = blogging();
        let fk = relate(&mut mb, blog, post);
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        assert!(builder.has_navigation(Some("Blog"), true, Convention).expect("to principal"));
        assert!(builder.has_navigation(Some("Posts"), false, Convention).expect("to dependent"));
        assert!(builder.has_navigation(None, true, Explicit).expect("removed"));
        assert!(!builder.has_navigation(Some("Blog"), true, Convention).expect("blocked"));

        let model = mb.model();
        assert_eq!(model.find_navigation(post, "Blog"), None);
        let posts = model.find_navigation(blog, "Posts").expect("Posts survives");
        assert_eq!(model.inverse_navigation(posts), None);
        assert_eq!(model[fk].dependent_to_principal_source(), Some(Explicit));
    }

    /// T2.3: Delete behavior and requiredness follow precedence.
    #[test]
    fn relationship_facets_follow_precedence() {
        let (mut mb, blog, post) = blogging();
        let fk = relate(&mut mb, blog, post);
        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        assert!(builder.on_delete(Some(DeleteBehavior::Restrict), Explicit).expect("set"));
        assert!(!builder.on_delete(Some(DeleteBehavior::Cascade), Convention).expect("silent"));
        assert_eq!(mb.model().delete_behavior(fk), DeleteBehavior::Restrict);
    }

    /// T2.4: Following a dependent property reaches the principal key.
    #[test]
    fn first_principal_follows_foreign_key() {
        let (mut mb, blog, post) = blogging();
        let fk = relate(&mut mb, blog, post);
        let model = mb.model();
        let dependent = model[fk].properties()[0];
        let principal = model.find_first_principal(dependent).expect("principal");
        assert_eq!(model.find_property(blog, "Id"), Some(principal));
    }

    /// T2.5: Many-to-many wires a join type with two foreign keys.
    #[test]
    fn many_to_many_creates_join_type() {
        let (mut mb, blog, post) = blogging();
        let (left, right) = mb
            .has_many_to_many(blog, "Featured", post, "FeaturedIn", Explicit)
            .expect("many-to-many")
            .expect("created");
        let model = mb.model();
        let join = model.join_entity_type(left).expect("join type");
        assert_eq!(model.join_entity_type(right), Some(join));
        assert_eq!(model[join].foreign_keys().count(), 2);
        assert_eq!(model[left].inverse(), Some(right));
    }

    /// T2.6: Retargeting a foreign key onto a key an equivalent foreign key
    /// already uses is refused.
    #[test]
    fn principal_key_retarget_cannot_duplicate() {
        let (mut mb, blog, post) = blogging();
        let primary = relate(&mut mb, blog, post);
        let pk = mb.model()[primary].principal_key();
        let mut builder = mb.type_builder(blog).expect("builder");
        let code = builder
            .property("Code", Some(ClrType::Int32), Explicit)
            .expect("property")
            .expect("created");
        let alternate = builder.has_key(&[code], Explicit).expect("key").expect("created");
        let property = mb.model().find_property(post, "BlogId").expect("BlogId");
        let secondary = mb
            .type_builder(post)
            .expect("builder")
            .has_relationship(blog, Some(&[property]), Some(alternate), Explicit)
            .expect("relationship")
            .expect("created");

        let mut builder = mb.foreign_key_builder(secondary).expect("builder");
        assert!(!builder.has_principal_key(Some(pk), Convention).expect("silent"));
        assert!(matches!(
            builder.has_principal_key(Some(pk), Explicit),
            Err(ModelError::DuplicateForeignKey { .. })
        ));
        assert_eq!(mb.model()[secondary].principal_key(), alternate);
        assert_eq!(mb.model()[post].foreign_keys().count(), 2);
    }

    /// T2.7: Falling back to the primary key needs the principal to have one.
    #[test]
    fn principal_key_fallback_needs_primary_key() {
        let mut mb = ModelBuilder::new();
        let account = mb
            .entity(TypeIdentity::named("Account"), Explicit, None)
            .expect("entity")
            .expect("created");
        let session = mb
            .entity(TypeIdentity::named("Session"), Explicit, None)
            .expect("entity")
            .expect("created");
        let mut builder = mb.type_builder(account).expect("builder");
        let code = builder
            .property("Code", Some(ClrType::Int32), Explicit)
            .expect("property")
            .expect("created");
        let key = builder.has_key(&[code], Explicit).expect("key").expect("created");
        let fk = mb
            .type_builder(session)
            .expect("builder")
            .has_relationship(account, None, Some(key), Explicit)
            .expect("relationship")
            .expect("created");

        let mut builder = mb.foreign_key_builder(fk).expect("builder");
        assert!(!builder.has_principal_key(None, Convention).expect("silent"));
        assert!(matches!(
            builder.has_principal_key(None, Explicit),
            Err(ModelError::PrincipalKeyless(name)) if name == "Account"
        ));
        assert_eq!(mb.model()[fk].principal_key(), key);
    }

    /// T2.8: Relinking a skip navigation unlinks the inverse's old partner.
    #[test]
    fn skip_navigation_relink_clears_old_partner() {
        let (mut mb, blog, post) = blogging();
        let tags = skip(&mut mb, blog, "Tags", post);
        let blogs = skip(&mut mb, post, "Blogs", blog);
        let featured = skip(&mut mb, post, "FeaturedIn", blog);
        assert!(mb
            .skip_navigation_builder(tags)
            .expect("builder")
            .has_inverse(Some(blogs), Convention)
            .expect("linked"));
        assert!(mb
            .skip_navigation_builder(featured)
            .expect("builder")
            .has_inverse(Some(tags), Explicit)
            .expect("relinked"));

        let model = mb.model();
        assert_eq!(model[tags].inverse(), Some(featured));
        assert_eq!(model[featured].inverse(), Some(tags));
        assert_eq!(model[blogs].inverse(), None);
    }

    /// T2.9: A many-to-many that cannot finish leaves no join type behind.
    #[test]
    fn refused_many_to_many_is_undone() {
        let (mut mb, blog, post) = blogging();
        let tags = skip(&mut mb, blog, "Tags", post);
        skip(&mut mb, post, "Blogs", blog);
        let featured = skip(&mut mb, post, "FeaturedIn", blog);
        mb.skip_navigation_builder(tags)
            .expect("builder")
            .has_inverse(Some(featured), Explicit)
            .expect("linked");

        let result = mb
            .has_many_to_many(blog, "Tags", post, "Blogs", Convention)
            .expect("silent");
        assert_eq!(result, None);
        let model = mb.model();
        assert_eq!(model.find_entity_type("BlogPost"), None);
        assert_eq!(model.entity_type_count(), 2);
        assert_eq!(model.join_entity_type(tags), None);
        assert_eq!(model[tags].inverse(), Some(featured));
    }
}

// =============================================================================
// TIER T3: STRUCTURAL CASCADES & DETACH/ATTACH
// =============================================================================

mod t3_cascades {
    use super::*;

    /// T3.1: Removing a principal detaches its relationships and returns
    /// them for reattachment.
    #[test]
    fn removing_principal_returns_detached_relationships() {
        let (mut mb, blog, post) = blogging();
        relate(&mut mb, blog, post);
        let detached = mb
            .has_no_entity_type(blog, Explicit)
            .expect("removed")
            .expect("allowed");
        assert_eq!(detached.len(), 1);
        assert_eq!(detached[0].dependent_type(), "Post");
        assert_eq!(mb.model().find_entity_type("Blog"), None);
        assert_eq!(mb.model()[post].foreign_keys().count(), 0);

        // The relationship comes back once the principal does
        let blog = mb
            .entity(TypeIdentity::class("Blog"), Explicit, None)
            .expect("entity")
            .expect("created");
        let id = mb
            .type_builder(blog)
            .expect("builder")
            .property("Id", None, Explicit)
            .expect("property")
            .expect("created");
        mb.type_builder(blog)
            .expect("builder")
            .primary_key(&[id], Explicit)
            .expect("pk");
        let restored = detached[0].attach(&mut mb).expect("attach").expect("restored");
        assert_eq!(mb.model()[restored].principal_type(), blog);
    }

    /// T3.2: Owned dependents are removed with their owner.
    #[test]
    fn owned_dependents_cascade() {
        let (mut mb, blog, _) = blogging();
        let address = mb
            .entity(TypeIdentity::named("Address"), Explicit, Some(true))
            .expect("entity")
            .expect("created");
        let fk = mb
            .type_builder(address)
            .expect("builder")
            .has_relationship(blog, None, None, Explicit)
            .expect("relationship")
            .expect("created");
        mb.foreign_key_builder(fk)
            .expect("builder")
            .is_ownership(Some(true), Explicit)
            .expect("ownership");
        assert_eq!(mb.model().ownership_path(address), Ok(vec![blog]));

        mb.has_no_entity_type(blog, Explicit).expect("removed");
        assert_eq!(mb.model().find_entity_type("Address"), None);
    }

    /// T3.3: A weaker source cannot remove an entity type.
    #[test]
    fn weaker_source_cannot_remove_entity_type() {
        let (mut mb, blog, _) = blogging();
        assert_eq!(mb.has_no_entity_type(blog, Convention).expect("silent"), None);
        assert!(matches!(
            mb.has_no_entity_type(blog, DataAnnotation),
            Ok(None)
        ));
        assert!(mb.model().get_type(blog).is_some());
    }

    /// T3.4: Replacing a clashing type carries its configuration over.
    #[test]
    fn replaced_type_keeps_configuration() {
        let mut mb = ModelBuilder::new();
        let tag = mb
            .entity(TypeIdentity::named("Tag"), Convention, None)
            .expect("entity")
            .expect("created");
        let mut builder = mb.type_builder(tag).expect("builder");
        let label = builder
            .property("Label", Some(ClrType::String), Explicit)
            .expect("property")
            .expect("created");
        builder.primary_key(&[label], Explicit).expect("pk");

        let replacement = mb
            .entity(TypeIdentity::shared("Tag"), Explicit, None)
            .expect("entity")
            .expect("replaced");
        assert_ne!(tag, replacement);
        let model = mb.model();
        let label = model.find_property(replacement, "Label").expect("label kept");
        let pk = model.find_primary_key(replacement).expect("pk kept");
        assert_eq!(model[pk].properties(), &[label]);
    }

    /// T3.5: Reparenting merges the derived key into the root.
    #[test]
    fn reparenting_moves_members_to_base() {
        let (mut mb, blog, _) = blogging();
        let featured = mb
            .entity(TypeIdentity::named("FeaturedBlog"), Explicit, None)
            .expect("entity")
            .expect("created");
        let mut builder = mb.type_builder(featured).expect("builder");
        builder
            .property("Id", Some(ClrType::Int32), Convention)
            .expect("property")
            .expect("created");
        assert!(builder.has_base_type(Some(blog), Explicit).expect("reparented"));

        let model = mb.model();
        assert_eq!(model[featured].base_type(), Some(blog));
        assert_eq!(model.root_type(featured), blog);
        assert_eq!(model.find_primary_key(featured), model.find_primary_key(blog));
        assert_eq!(
            model.find_property(featured, "Id"),
            model.find_property(blog, "Id")
        );
    }
}

// =============================================================================
// TIER T4: FROZEN MODEL & EXPORT
// =============================================================================

mod t4_frozen {
    use super::*;
    use schemagraph_core::{export_json, import_json};

    /// T4.1: A frozen model rejects every mutator.
    #[test]
    fn frozen_model_rejects_mutation() {
        let (mut mb, blog, post) = blogging();
        mb.freeze().expect("freeze");
        assert!(matches!(
            mb.entity(TypeIdentity::named("Tag"), Explicit, None),
            Err(ModelError::ReadOnlyModel)
        ));
        assert!(matches!(
            mb.type_builder(post)
                .expect("builder")
                .has_relationship(blog, None, None, Convention),
            Err(ModelError::ReadOnlyModel)
        ));
    }

    /// T4.2: Export of a frozen model round-trips through JSON.
    #[test]
    fn frozen_model_exports() {
        let (mut mb, blog, post) = blogging();
        relate(&mut mb, blog, post);
        let model = mb.freeze().expect("freeze");
        let json = export_json(model).expect("export");
        let canonical = import_json(&json).expect("import");
        assert!(canonical.header.read_only);
        assert_eq!(canonical.foreign_keys.len(), 1);
        assert_eq!(canonical.foreign_keys[0].principal, "Blog");
    }
}
