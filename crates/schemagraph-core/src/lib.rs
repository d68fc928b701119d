//! # schemagraph-core
//!
//! The incremental schema graph builder - THE LOGIC.
//!
//! This crate builds an in-memory graph of entity types, complex types,
//! properties, keys, indexes, foreign keys, navigations and skip
//! navigations. Every fact carries the `ConfigurationSource` that stated it,
//! and a weaker source can never undo what a stronger one configured.
//!
//! ## Layout
//!
//! - `model` → the arena and its read-side queries
//! - `builder` → the only mutation surface, one builder per element kind
//! - `snapshot` → detach/attach of configuration across structural edits
//! - `conventions` → batching scope and event dispatch
//! - `access` → member access paths through complex properties
//! - `export` → canonical, id-free JSON export
//!
//! ## Architectural Constraints
//!
//! - Single-threaded, synchronous, no I/O
//! - Deterministic: `BTreeMap` ordering everywhere, ids allocated in order
//! - Non-explicit rejections are silent (`Ok(None)` / `false`); explicit
//!   ones are `Err(ModelError)`
//! - Once frozen, every mutator fails with `ModelError::ReadOnlyModel`

// =============================================================================
// MODULES
// =============================================================================

pub mod access;
pub mod annotations;
pub mod builder;
pub mod config;
pub mod conventions;
pub mod export;
pub mod model;
pub mod primitives;
pub mod snapshot;
pub mod source;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AccessMode, ClrMember, ClrMemberKind, ClrShape, ClrType, ComplexPropertyId, DeleteBehavior,
    ForeignKeyId, IndexId, KeyId, MemberIdentity, ModelError, NavigationId, PropertyId,
    ServicePropertyId, SkipNavigationId, TypeId, TypeIdentity, ValueGenerated,
};

// =============================================================================
// RE-EXPORTS: Model & Builders
// =============================================================================

pub use annotations::{Annotation, AnnotationValue, Annotations};
pub use builder::{
    ComplexPropertyBuilder, ForeignKeyBuilder, IndexBuilder, KeyBuilder, ModelBuilder,
    NavigationBuilder, PropertyBuilder, SkipNavigationBuilder, TypeBuilder,
};
pub use config::BuilderConfig;
pub use model::Model;
pub use model::elements::{
    ComplexProperty, ForeignKey, Index, Key, MemberFacets, Navigation, Property, PropertyBase,
    ServiceProperty, SkipNavigation, TypeBase, TypeKind,
};
pub use model::members::{MemberKind, MemberRef};
pub use source::{ConfigurationSource, Sourced};

// =============================================================================
// RE-EXPORTS: Conventions, Snapshots, Read Models
// =============================================================================

pub use access::{AccessMember, AccessPath, ChainLink};
pub use conventions::{
    Convention, ConventionDispatcher, ForeignKeyIndexConvention, KeyDiscoveryConvention,
    ModelEvent,
};
pub use export::{
    CanonicalHeader, CanonicalModel, canonical_model, export_json, import_json,
};
pub use snapshot::{
    ComplexPropertySnapshot, IndexSnapshot, KeySnapshot, PropertiesSnapshot,
    PropertySnapshot, RelationshipSnapshot, SkipNavigationSnapshot, TypeRef, TypeSnapshot,
};
