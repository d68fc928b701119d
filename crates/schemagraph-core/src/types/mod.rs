//! # Core Type Definitions
//!
//! This module contains the value types shared by every part of the schema graph:
//! - Element identifiers (`TypeId`, `PropertyId`, `ForeignKeyId`, ...)
//! - CLR representations (`ClrType`, `ClrShape`, `ClrMember`)
//! - Type and member identities (`TypeIdentity`, `MemberIdentity`)
//! - Facet enums (`DeleteBehavior`, `AccessMode`, `ValueGenerated`)
//! - Error types (`ModelError`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! collections; iteration order over the model never depends on hashing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// ELEMENT IDENTIFIERS
// =============================================================================

macro_rules! element_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

element_id!(
    /// Identifier of an entity type or a complex type in the model arena.
    TypeId
);
element_id!(
    /// Identifier of a scalar property.
    PropertyId
);
element_id!(
    /// Identifier of a complex property.
    ComplexPropertyId
);
element_id!(
    /// Identifier of a service property.
    ServicePropertyId
);
element_id!(
    /// Identifier of a key (primary or alternate).
    KeyId
);
element_id!(
    /// Identifier of an index.
    IndexId
);
element_id!(
    /// Identifier of a foreign key.
    ForeignKeyId
);
element_id!(
    /// Identifier of a navigation.
    NavigationId
);
element_id!(
    /// Identifier of a skip navigation.
    SkipNavigationId
);

// =============================================================================
// CLR TYPES
// =============================================================================

/// The runtime representation of a property, navigation or structural type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClrType {
    Bool,
    Int16,
    Int32,
    Int64,
    Decimal,
    Double,
    Guid,
    DateTime,
    String,
    Bytes,
    /// `Nullable<T>` over a value type.
    Nullable(Box<ClrType>),
    /// A user-defined value type.
    Struct(String),
    /// A user-defined reference type.
    Class(String),
    /// An enumerable of the element type.
    Collection(Box<ClrType>),
    /// The name-keyed property bag backing shared-type entities.
    PropertyBag,
}

impl ClrType {
    /// Shorthand for a user-defined reference type.
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    /// Shorthand for a user-defined value type.
    #[must_use]
    pub fn structure(name: impl Into<String>) -> Self {
        Self::Struct(name.into())
    }

    /// Shorthand for a collection of `element`.
    #[must_use]
    pub fn collection_of(element: Self) -> Self {
        Self::Collection(Box::new(element))
    }

    /// Whether values of this type are copied by value.
    #[must_use]
    pub const fn is_value_type(&self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Decimal
                | Self::Double
                | Self::Guid
                | Self::DateTime
                | Self::Struct(_)
        )
    }

    /// Whether a value of this type can be null.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        !self.is_value_type()
    }

    /// Strip one `Nullable<T>` wrapper.
    #[must_use]
    pub fn unwrap_nullable(&self) -> &Self {
        match self {
            Self::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Wrap value types in `Nullable<T>`; reference types are returned unchanged.
    #[must_use]
    pub fn make_nullable(self) -> Self {
        if self.is_value_type() {
            Self::Nullable(Box::new(self))
        } else {
            self
        }
    }

    /// Whether this is a collection type.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    /// The element type of a collection.
    #[must_use]
    pub fn element_type(&self) -> Option<&Self> {
        match self {
            Self::Collection(element) => Some(element),
            _ => None,
        }
    }

    /// The user-defined type name, looking through `Nullable<T>`.
    #[must_use]
    pub fn shape_name(&self) -> Option<&str> {
        match self.unwrap_nullable() {
            Self::Struct(name) | Self::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Whether two types are equal once `Nullable<T>` is stripped from both.
    #[must_use]
    pub fn matches_unwrapped(&self, other: &Self) -> bool {
        self.unwrap_nullable() == other.unwrap_nullable()
    }
}

impl fmt::Display for ClrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int16 => f.write_str("short"),
            Self::Int32 => f.write_str("int"),
            Self::Int64 => f.write_str("long"),
            Self::Decimal => f.write_str("decimal"),
            Self::Double => f.write_str("double"),
            Self::Guid => f.write_str("Guid"),
            Self::DateTime => f.write_str("DateTime"),
            Self::String => f.write_str("string"),
            Self::Bytes => f.write_str("byte[]"),
            Self::Nullable(inner) => write!(f, "{}?", inner),
            Self::Struct(name) | Self::Class(name) => f.write_str(name),
            Self::Collection(element) => write!(f, "List<{}>", element),
            Self::PropertyBag => f.write_str("Dictionary<string, object>"),
        }
    }
}

impl FromStr for ClrType {
    type Err = ModelError;

    /// Parse the display form back into a type.
    ///
    /// Unknown identifiers are treated as reference types; prefix a name with
    /// `struct ` to declare a value type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ModelError::InvalidClrType(s.to_string()));
        }
        if let Some(inner) = s.strip_suffix('?') {
            let inner: Self = inner.parse()?;
            return if inner.is_value_type() {
                Ok(Self::Nullable(Box::new(inner)))
            } else {
                Ok(inner)
            };
        }
        if let Some(element) = s.strip_prefix("List<").and_then(|r| r.strip_suffix('>')) {
            return Ok(Self::collection_of(element.parse()?));
        }
        if let Some(name) = s.strip_prefix("struct ") {
            return Ok(Self::structure(name.trim()));
        }
        let parsed = match s {
            "bool" => Self::Bool,
            "short" => Self::Int16,
            "int" => Self::Int32,
            "long" => Self::Int64,
            "decimal" => Self::Decimal,
            "double" => Self::Double,
            "Guid" | "guid" => Self::Guid,
            "DateTime" | "datetime" => Self::DateTime,
            "string" => Self::String,
            "byte[]" | "bytes" => Self::Bytes,
            "Dictionary<string, object>" | "bag" => Self::PropertyBag,
            other if other.chars().all(|c| c.is_alphanumeric() || c == '_') => {
                Self::class(other)
            }
            other => return Err(ModelError::InvalidClrType(other.to_string())),
        };
        Ok(parsed)
    }
}

// =============================================================================
// CLR SHAPES
// =============================================================================

/// Whether a CLR member is a property or a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClrMemberKind {
    Property,
    Field,
}

/// A member declared by a user-defined CLR type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClrMember {
    pub name: String,
    pub clr_type: ClrType,
    pub kind: ClrMemberKind,
}

/// The members of a user-defined CLR type.
///
/// Shapes tell the builders which member names are backed by real members
/// (non-shadow), whether a navigation is a reference or a collection, and
/// which names must be avoided when synthesizing shadow properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClrShape {
    pub name: String,
    pub is_value_type: bool,
    pub base: Option<String>,
    pub members: BTreeMap<String, ClrMember>,
}

impl ClrShape {
    /// A reference type shape.
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_value_type: false,
            base: None,
            members: BTreeMap::new(),
        }
    }

    /// A value type shape.
    #[must_use]
    pub fn structure(name: impl Into<String>) -> Self {
        Self {
            is_value_type: true,
            ..Self::class(name)
        }
    }

    /// Set the CLR base type.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Add a property member.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, clr_type: ClrType) -> Self {
        let name = name.into();
        self.members.insert(
            name.clone(),
            ClrMember {
                name,
                clr_type,
                kind: ClrMemberKind::Property,
            },
        );
        self
    }

    /// Add a field member.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, clr_type: ClrType) -> Self {
        let name = name.into();
        self.members.insert(
            name.clone(),
            ClrMember {
                name,
                clr_type,
                kind: ClrMemberKind::Field,
            },
        );
        self
    }

    /// The `ClrType` this shape describes.
    #[must_use]
    pub fn clr_type(&self) -> ClrType {
        if self.is_value_type {
            ClrType::structure(self.name.clone())
        } else {
            ClrType::class(self.name.clone())
        }
    }

    /// Look up a declared member.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&ClrMember> {
        self.members.get(name)
    }
}

// =============================================================================
// IDENTITIES
// =============================================================================

/// How a structural type is identified in the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeIdentity {
    /// Identified by its CLR type; the name is the CLR display name.
    Clr(ClrType),
    /// A name-only type with no CLR representation.
    Named(String),
    /// One of possibly several logical types sharing a CLR representation.
    Shared { name: String, clr_type: ClrType },
}

impl TypeIdentity {
    /// Identity of a user-defined reference type.
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self::Clr(ClrType::class(name))
    }

    /// Name-only identity.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Shared identity backed by the property bag.
    #[must_use]
    pub fn shared(name: impl Into<String>) -> Self {
        Self::Shared {
            name: name.into(),
            clr_type: ClrType::PropertyBag,
        }
    }

    /// The model-wide name of the type.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Clr(clr_type) => clr_type.to_string(),
            Self::Named(name) | Self::Shared { name, .. } => name.clone(),
        }
    }

    /// The CLR representation, if any.
    #[must_use]
    pub fn clr_type(&self) -> Option<&ClrType> {
        match self {
            Self::Clr(clr_type) | Self::Shared { clr_type, .. } => Some(clr_type),
            Self::Named(_) => None,
        }
    }

    /// Whether the identity is a shared-type identity.
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        matches!(self, Self::Shared { .. })
    }
}

/// The CLR member a property-like element is bound to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemberIdentity {
    /// A real property or field on the declaring CLR type.
    Clr(String),
    /// The indexer of a property-bag type.
    Indexer,
    /// No CLR member; the value lives only in the state manager.
    Shadow,
}

impl MemberIdentity {
    /// Whether the member is a shadow member.
    #[must_use]
    pub const fn is_shadow(&self) -> bool {
        matches!(self, Self::Shadow)
    }
}

// =============================================================================
// FACET ENUMS
// =============================================================================

/// What happens to dependents when the principal is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteBehavior {
    Cascade,
    ClientSetNull,
    SetNull,
    Restrict,
    NoAction,
    ClientCascade,
    ClientNoAction,
}

impl FromStr for DeleteBehavior {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "").as_str() {
            "cascade" => Ok(Self::Cascade),
            "clientsetnull" => Ok(Self::ClientSetNull),
            "setnull" => Ok(Self::SetNull),
            "restrict" => Ok(Self::Restrict),
            "noaction" => Ok(Self::NoAction),
            "clientcascade" => Ok(Self::ClientCascade),
            "clientnoaction" => Ok(Self::ClientNoAction),
            _ => Err(ModelError::InvalidConfig(format!(
                "unknown delete behavior '{}'",
                s
            ))),
        }
    }
}

/// How the runtime reads and writes a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Field,
    FieldDuringConstruction,
    Property,
    PreferField,
    PreferFieldDuringConstruction,
    PreferProperty,
}

/// When a property value is generated by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueGenerated {
    Never,
    OnAdd,
    OnUpdate,
    OnAddOrUpdate,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the schema graph.
///
/// Only `Explicit` configuration produces errors; lower sources report
/// rejection through `Ok(None)` / `false` instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The model has been frozen.
    #[error("The model is read-only and cannot be modified")]
    ReadOnlyModel,

    /// An element id does not refer to a live element of this model.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// A CLR type string could not be parsed.
    #[error("Invalid CLR type '{0}'")]
    InvalidClrType(String),

    /// A member or type name is empty or otherwise unusable.
    #[error("Invalid name '{0}'")]
    InvalidName(String),

    /// Builder configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A shared type clashes with a non-shared type of the same name.
    #[error(
        "The entity type '{0}' cannot be added because a type with the same name already exists with a different shared-type classification or CLR type"
    )]
    ClashingSharedType(String),

    /// An owned type clashes with a non-owned type of the same name.
    #[error(
        "The entity type '{0}' cannot be configured with the requested ownership because it is already configured differently"
    )]
    ClashingOwnedEntityType(String),

    /// An entity type clashes with a complex type registration.
    #[error(
        "The type '{0}' cannot be configured as an entity type because it is configured as a complex type"
    )]
    ClashingComplexType(String),

    /// An entity type was used where a complex type was requested.
    #[error(
        "The type '{0}' cannot be configured as a complex type because it is configured as an entity type"
    )]
    ClashingEntityType(String),

    /// A type or member was ignored at a higher source.
    #[error("'{name}' cannot be configured because it has been ignored on '{owner}'")]
    Ignored { name: String, owner: String },

    /// The operation requires an entity type.
    #[error("'{0}' is not an entity type")]
    NotAnEntityType(String),

    /// A member name is already used by a member of a different kind.
    #[error(
        "'{member}' cannot be used as a {kind} on '{type_name}' because it is configured as a {conflicting_kind} on '{conflicting_type}'"
    )]
    ConflictingMember {
        member: String,
        kind: String,
        type_name: String,
        conflicting_kind: String,
        conflicting_type: String,
    },

    /// An inherited member cannot be ignored on a derived type.
    #[error(
        "The member '{member}' cannot be ignored on '{type_name}' because it is declared on the base type '{base_type}'"
    )]
    InheritedMemberCannotBeIgnored {
        member: String,
        type_name: String,
        base_type: String,
    },

    /// A property was configured with a CLR type different from its existing one.
    #[error(
        "The property '{type_name}.{property}' is of type '{existing}' and cannot be configured as '{requested}'"
    )]
    PropertyTypeMismatch {
        property: String,
        type_name: String,
        existing: String,
        requested: String,
    },

    /// A property has no CLR member and no CLR type was supplied.
    #[error("No CLR type was specified for the shadow property '{type_name}.{property}'")]
    NoPropertyType { property: String, type_name: String },

    /// A member is still used by a key, index or foreign key.
    #[error("The property '{type_name}.{property}' is in use by {usage}")]
    PropertyInUse {
        property: String,
        type_name: String,
        usage: String,
    },

    /// A property list contains duplicates.
    #[error("The property '{property}' appears more than once in {context} on '{type_name}'")]
    DuplicatePropertyInList {
        property: String,
        context: String,
        type_name: String,
    },

    /// A key was configured on a derived type.
    #[error(
        "A key cannot be configured on '{type_name}' because it is a derived type; keys must be configured on the root type '{root_type}'"
    )]
    DerivedTypeKey { type_name: String, root_type: String },

    /// A key was configured on a keyless type.
    #[error("The keyless entity type '{0}' cannot have a key")]
    KeylessTypeWithKey(String),

    /// A keyless type was configured while keys exist.
    #[error("The entity type '{0}' cannot be marked keyless because it has keys or is a principal")]
    KeyInUse(String),

    /// A nullable property cannot be part of a key.
    #[error("The property '{type_name}.{property}' cannot be nullable because it is part of a key")]
    NullableKeyProperty { property: String, type_name: String },

    /// A non-nullable CLR type cannot become nullable.
    #[error(
        "The property '{type_name}.{property}' cannot be marked as nullable because its type '{clr_type}' is not nullable"
    )]
    CannotBeNullable {
        property: String,
        type_name: String,
        clr_type: String,
    },

    /// FK and principal key have a different number of properties.
    #[error(
        "The foreign key {dependent_properties} on '{dependent_type}' has a different number of properties than the principal key {principal_properties} on '{principal_type}'"
    )]
    ForeignKeyCountMismatch {
        dependent_properties: String,
        dependent_type: String,
        principal_properties: String,
        principal_type: String,
    },

    /// FK and principal key properties have incompatible CLR types.
    #[error(
        "The types of the foreign key {dependent_properties} on '{dependent_type}' do not match the types of the principal key {principal_properties} on '{principal_type}'"
    )]
    ForeignKeyTypeMismatch {
        dependent_properties: String,
        dependent_type: String,
        principal_properties: String,
        principal_type: String,
    },

    /// FK properties are not declared on the dependent hierarchy.
    #[error("The foreign key properties {properties} are not declared on '{dependent_type}'")]
    ForeignKeyPropertiesWrongType {
        properties: String,
        dependent_type: String,
    },

    /// The principal key does not belong to the principal type.
    #[error("The key {key} is not declared on the principal type '{principal_type}'")]
    ForeignKeyReferencedKeyMismatch { key: String, principal_type: String },

    /// The principal type has no key to reference.
    #[error("The principal type '{0}' has no key that a foreign key can reference")]
    PrincipalKeyless(String),

    /// An equivalent foreign key already exists in the hierarchy.
    #[error(
        "The foreign key {properties} on '{dependent_type}' targeting key {key} on '{principal_type}' duplicates a foreign key declared on '{duplicate_type}'"
    )]
    DuplicateForeignKey {
        properties: String,
        dependent_type: String,
        key: String,
        principal_type: String,
        duplicate_type: String,
    },

    /// A navigation targets a keyless entity type.
    #[error(
        "The navigation '{navigation}' cannot be added to '{type_name}' because it targets the keyless entity type '{target}'"
    )]
    NavigationToKeylessType {
        navigation: String,
        type_name: String,
        target: String,
    },

    /// The defining navigation of an ownership was removed without a replacement.
    #[error(
        "The navigation '{navigation}' on '{type_name}' defines the ownership of '{owned_type}' and cannot be removed"
    )]
    OwnershipNavigationRemoval {
        navigation: String,
        type_name: String,
        owned_type: String,
    },

    /// A navigation's CLR shape contradicts the relationship's cardinality.
    #[error("The navigation '{type_name}.{navigation}' must be {expected} for this relationship")]
    NavigationShapeMismatch {
        navigation: String,
        type_name: String,
        expected: String,
    },

    /// A navigation's CLR member type does not target the other end.
    #[error(
        "The navigation '{type_name}.{navigation}' of type '{clr_type}' cannot target '{target}'"
    )]
    NavigationTargetMismatch {
        navigation: String,
        type_name: String,
        clr_type: String,
        target: String,
    },

    /// A required dependent needs a unique relationship.
    #[error(
        "The relationship from '{dependent_type}' to '{principal_type}' must be unique because the dependent is explicitly required"
    )]
    RequiredDependentNotUnique {
        dependent_type: String,
        principal_type: String,
    },

    /// An optional FK cannot use non-nullable properties.
    #[error(
        "The foreign key {properties} on '{dependent_type}' cannot be optional because its properties are not nullable"
    )]
    ForeignKeyCannotBeOptional {
        properties: String,
        dependent_type: String,
    },

    /// An ownership would create a cycle.
    #[error("'{owned_type}' cannot be owned by '{owner}' because it is already in its ownership path")]
    OwnershipCycle { owned_type: String, owner: String },

    /// A type cannot derive from itself, directly or indirectly.
    #[error("'{base_type}' cannot be the base type of '{type_name}' because it derives from it")]
    CircularInheritance { type_name: String, base_type: String },

    /// Base type and derived type are of different kinds.
    #[error("'{base_type}' cannot be the base type of '{type_name}': {reason}")]
    InvalidBaseType {
        type_name: String,
        base_type: String,
        reason: String,
    },

    /// Two explicit members collide during reparenting.
    #[error(
        "The member '{member}' on '{type_name}' conflicts with the member of the same name on the base type '{base_type}'"
    )]
    ConflictingBaseMember {
        member: String,
        type_name: String,
        base_type: String,
    },

    /// A complex property cannot be nullable.
    #[error(
        "The complex property '{type_name}.{property}' cannot be nullable because its type '{clr_type}' is not nullable"
    )]
    ComplexPropertyNotNullable {
        property: String,
        type_name: String,
        clr_type: String,
    },

    /// A backing field is unusable.
    #[error("The field '{field}' cannot back '{type_name}.{member}': {reason}")]
    InvalidBackingField {
        field: String,
        member: String,
        type_name: String,
        reason: String,
    },

    /// A skip navigation's FK targets the wrong type.
    #[error(
        "The foreign key {foreign_key} cannot be used by the skip navigation '{type_name}.{navigation}': {reason}"
    )]
    SkipNavigationForeignKeyMismatch {
        foreign_key: String,
        navigation: String,
        type_name: String,
        reason: String,
    },

    /// Inverse skip navigations disagree.
    #[error(
        "The skip navigation '{type_name}.{navigation}' cannot use '{inverse}' as its inverse: {reason}"
    )]
    SkipNavigationInverseMismatch {
        navigation: String,
        type_name: String,
        inverse: String,
        reason: String,
    },

    /// A many-to-many relationship could not be wired through a join type.
    #[error("The many-to-many relationship between '{left}' and '{right}' failed: {reason}")]
    JoinTypeNotConfigured {
        left: String,
        right: String,
        reason: String,
    },

    /// A foreign key chain exceeded the configured bound.
    #[error("Foreign key chain starting at '{0}' exceeds the maximum supported length")]
    ForeignKeyChainTooLong(String),

    /// A complex property nests deeper than the configured bound.
    #[error("Complex property chain ending at '{0}' exceeds the maximum supported length")]
    ComplexChainTooLong(String),

    /// No free name could be generated.
    #[error("Could not generate a unique property name from '{base_name}' on '{type_name}'")]
    UniquificationExhausted { base_name: String, type_name: String },

    /// The canonical export could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A removal was requested at a source lower than the element's.
    #[error("'{element}' was configured at a higher source and cannot be removed")]
    CannotRemove { element: String },
}

// =============================================================================
// TESTS
// =============================================================================
