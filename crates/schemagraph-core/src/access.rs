//! # Access Paths
//!
//! Read-side view of how a member is reached from the entity that contains
//! it. Consumers that compile accessors walk an `AccessPath` instead of the
//! raw declaring-type links: the chain lists every complex property between
//! the entity and the member, and each collection link costs one position in
//! the index path.
//!
//! Walks are bounded by the model's chain limit.

use crate::model::Model;
use crate::{ComplexPropertyId, ModelError, PropertyId, TypeId};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// TYPES
// =============================================================================

/// One complex property on the way from an entity type to a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub complex_property: ComplexPropertyId,
    pub name: String,
    /// Crossing this link needs a position in the index path.
    pub is_collection: bool,
}

/// The member at the end of an access path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMember {
    Property(PropertyId),
    ComplexProperty(ComplexPropertyId),
}

/// How to reach a member from its containing entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPath {
    /// The entity type owning the outermost link.
    pub root_entity_type: TypeId,
    /// The type that declares the member.
    pub declaring_type: TypeId,
    /// Links from the root entity down to `declaring_type`, outermost first.
    pub chain: Vec<ChainLink>,
    pub member: AccessMember,
    pub member_name: String,
    /// Number of collection links in `chain`.
    pub index_depth: usize,
}

impl AccessPath {
    /// Whether the member is declared directly on the entity type.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.chain.is_empty()
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for link in &self.chain {
            f.write_str(&link.name)?;
            if link.is_collection {
                f.write_str("[]")?;
            }
            f.write_str(".")?;
        }
        f.write_str(&self.member_name)
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

impl Model {
    /// The complex properties from the containing entity type down to and
    /// including `complex_property`, outermost first.
    pub fn complex_property_chain(
        &self,
        complex_property: ComplexPropertyId,
    ) -> Result<Vec<ChainLink>, ModelError> {
        let Some(cp) = self.get_complex_property(complex_property) else {
            return Err(ModelError::ElementNotFound(complex_property.to_string()));
        };
        let mut chain = self.chain_to(cp.declaring_type)?;
        chain.push(ChainLink {
            complex_property,
            name: cp.name.clone(),
            is_collection: cp.is_collection,
        });
        Ok(chain)
    }

    /// The entity type that ultimately contains `type_id`. An entity type
    /// contains itself.
    pub fn containing_entity_type(&self, type_id: TypeId) -> Result<TypeId, ModelError> {
        let mut current = type_id;
        for _ in 0..=self.max_chain {
            let Some(ty) = self.get_type(current) else {
                return Err(ModelError::ElementNotFound(current.to_string()));
            };
            match ty.defining_property {
                Some(cp) => current = self[cp].declaring_type,
                None => return Ok(current),
            }
        }
        Err(ModelError::ComplexChainTooLong(self[type_id].name.clone()))
    }

    /// Access path of any property-like member.
    pub fn access_path(&self, member: AccessMember) -> Result<AccessPath, ModelError> {
        let (declaring_type, member_name) = match member {
            AccessMember::Property(id) => self
                .get_property(id)
                .map(|p| (p.declaring_type, p.name.clone()))
                .ok_or_else(|| ModelError::ElementNotFound(id.to_string()))?,
            AccessMember::ComplexProperty(id) => self
                .get_complex_property(id)
                .map(|cp| (cp.declaring_type, cp.name.clone()))
                .ok_or_else(|| ModelError::ElementNotFound(id.to_string()))?,
        };
        let chain = self.chain_to(declaring_type)?;
        let root_entity_type = match chain.first() {
            Some(link) => self[link.complex_property].declaring_type,
            None => declaring_type,
        };
        let index_depth = chain.iter().filter(|link| link.is_collection).count();
        Ok(AccessPath {
            root_entity_type,
            declaring_type,
            chain,
            member,
            member_name,
            index_depth,
        })
    }

    /// Shorthand for `access_path(AccessMember::Property(property))`.
    pub fn property_access_path(&self, property: PropertyId) -> Result<AccessPath, ModelError> {
        self.access_path(AccessMember::Property(property))
    }

    /// Links needed to reach an instance of `type_id`; empty for entity types.
    fn chain_to(&self, type_id: TypeId) -> Result<Vec<ChainLink>, ModelError> {
        let mut chain = Vec::new();
        let mut current = type_id;
        loop {
            let Some(ty) = self.get_type(current) else {
                return Err(ModelError::ElementNotFound(current.to_string()));
            };
            let Some(defining) = ty.defining_property else {
                break;
            };
            if chain.len() >= self.max_chain {
                return Err(ModelError::ComplexChainTooLong(self[type_id].name.clone()));
            }
            let cp = &self[defining];
            chain.push(ChainLink {
                complex_property: defining,
                name: cp.name.clone(),
                is_collection: cp.is_collection,
            });
            current = cp.declaring_type;
        }
        chain.reverse();
        Ok(chain)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;
    use crate::source::ConfigurationSource::Explicit;
    use crate::{ClrShape, ClrType, TypeIdentity};

    struct Fixture {
        mb: ModelBuilder,
        customer: TypeId,
        addresses: ComplexPropertyId,
        geo: ComplexPropertyId,
        latitude: PropertyId,
    }

    fn fixture() -> Fixture {
        let mut mb = ModelBuilder::new();
        mb.register_shape(ClrShape::structure("Geo").with_property("Latitude", ClrType::Decimal))
            .expect("shape");
        mb.register_shape(
            ClrShape::structure("Address")
                .with_property("Street", ClrType::String)
                .with_property("Geo", ClrType::structure("Geo")),
        )
        .expect("shape");
        mb.register_shape(
            ClrShape::class("Customer")
                .with_property("Id", ClrType::Int32)
                .with_property(
                    "Addresses",
                    ClrType::collection_of(ClrType::structure("Address")),
                ),
        )
        .expect("shape");
        let customer = mb
            .entity(TypeIdentity::class("Customer"), Explicit, None)
            .expect("entity")
            .expect("created");
        let addresses = mb
            .type_builder(customer)
            .expect("builder")
            .complex_property("Addresses", None, None, Explicit)
            .expect("complex")
            .expect("created");
        let geo = mb
            .complex_property_builder(addresses)
            .expect("builder")
            .complex_type()
            .complex_property("Geo", None, None, Explicit)
            .expect("complex")
            .expect("created");
        let latitude = mb
            .complex_property_builder(geo)
            .expect("builder")
            .complex_type()
            .property("Latitude", None, Explicit)
            .expect("property")
            .expect("created");
        Fixture {
            mb,
            customer,
            addresses,
            geo,
            latitude,
        }
    }

    #[test]
    fn nested_property_reaches_root_entity() {
        let f = fixture();
        let model = f.mb.model();
        let path = model.property_access_path(f.latitude).expect("path");
        assert_eq!(path.root_entity_type, f.customer);
        assert_eq!(path.declaring_type, model[f.geo].complex_type());
        assert_eq!(
            path.chain.iter().map(|l| l.name.as_str()).collect::<Vec<_>>(),
            vec!["Addresses", "Geo"]
        );
        assert_eq!(path.index_depth, 1);
        assert_eq!(path.to_string(), "Addresses[].Geo.Latitude");
    }

    #[test]
    fn chain_includes_the_complex_property_itself() {
        let f = fixture();
        let chain = f.mb.model().complex_property_chain(f.geo).expect("chain");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].complex_property, f.addresses);
        assert!(chain[0].is_collection);
        assert!(!chain[1].is_collection);
    }

    #[test]
    fn entity_property_has_direct_path() {
        let mut f = fixture();
        let id = f
            .mb
            .type_builder(f.customer)
            .expect("builder")
            .property("Id", None, Explicit)
            .expect("property")
            .expect("created");
        let path = f.mb.model().property_access_path(id).expect("path");
        assert!(path.is_direct());
        assert_eq!(path.index_depth, 0);
        assert_eq!(path.to_string(), "Id");
    }

    #[test]
    fn containing_entity_type_of_nested_complex_type() {
        let f = fixture();
        let model = f.mb.model();
        let nested = model[f.geo].complex_type();
        assert_eq!(model.containing_entity_type(nested), Ok(f.customer));
        assert_eq!(model.containing_entity_type(f.customer), Ok(f.customer));
    }

    #[test]
    fn removed_member_is_not_found() {
        let mut f = fixture();
        f.mb.remove_complex_property_raw(f.addresses);
        assert!(matches!(
            f.mb.model().property_access_path(f.latitude),
            Err(ModelError::ElementNotFound(_))
        ));
    }

    #[test]
    fn bounded_by_chain_limit() {
        let mut f = fixture();
        f.mb.model.max_chain = 1;
        assert!(matches!(
            f.mb.model().property_access_path(f.latitude),
            Err(ModelError::ComplexChainTooLong(_))
        ));
    }
}
