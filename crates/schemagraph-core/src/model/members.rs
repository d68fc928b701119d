//! # Member Kinds
//!
//! A closed sum type over the property-like members a structural type can
//! declare, plus the hierarchy-aware member lookups built on it.

use crate::model::Model;
use crate::model::elements::PropertyBase;
use crate::source::ConfigurationSource;
use crate::{
    ComplexPropertyId, NavigationId, PropertyId, ServicePropertyId, SkipNavigationId, TypeId,
};
use std::fmt;

/// The kind of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberKind {
    Property,
    ComplexProperty,
    ServiceProperty,
    Navigation,
    SkipNavigation,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Property => "property",
            Self::ComplexProperty => "complex property",
            Self::ServiceProperty => "service property",
            Self::Navigation => "navigation",
            Self::SkipNavigation => "skip navigation",
        })
    }
}

/// A reference to a member of any kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberRef {
    Property(PropertyId),
    ComplexProperty(ComplexPropertyId),
    ServiceProperty(ServicePropertyId),
    Navigation(NavigationId),
    SkipNavigation(SkipNavigationId),
}

impl MemberRef {
    /// The kind of the referenced member.
    #[must_use]
    pub const fn kind(self) -> MemberKind {
        match self {
            Self::Property(_) => MemberKind::Property,
            Self::ComplexProperty(_) => MemberKind::ComplexProperty,
            Self::ServiceProperty(_) => MemberKind::ServiceProperty,
            Self::Navigation(_) => MemberKind::Navigation,
            Self::SkipNavigation(_) => MemberKind::SkipNavigation,
        }
    }
}

impl Model {
    /// Whether the referenced member is still in the model.
    #[must_use]
    pub fn contains_member(&self, member: MemberRef) -> bool {
        match member {
            MemberRef::Property(id) => self.properties.contains_key(&id),
            MemberRef::ComplexProperty(id) => self.complex_properties.contains_key(&id),
            MemberRef::ServiceProperty(id) => self.service_properties.contains_key(&id),
            MemberRef::Navigation(id) => self.navigations.contains_key(&id),
            MemberRef::SkipNavigation(id) => self.skip_navigations.contains_key(&id),
        }
    }

    /// The common view of a live member.
    #[must_use]
    pub fn member(&self, member: MemberRef) -> &dyn PropertyBase {
        match member {
            MemberRef::Property(id) => &self[id],
            MemberRef::ComplexProperty(id) => &self[id],
            MemberRef::ServiceProperty(id) => &self[id],
            MemberRef::Navigation(id) => &self[id],
            MemberRef::SkipNavigation(id) => &self[id],
        }
    }

    /// The source of the member's existence. Navigations report the source
    /// of their foreign key direction.
    #[must_use]
    pub fn member_source(&self, member: MemberRef) -> Option<ConfigurationSource> {
        match member {
            MemberRef::Property(id) => Some(self[id].source),
            MemberRef::ComplexProperty(id) => Some(self[id].source),
            MemberRef::ServiceProperty(id) => Some(self[id].source),
            MemberRef::Navigation(id) => self.navigation_source(id),
            MemberRef::SkipNavigation(id) => Some(self[id].source),
        }
    }

    /// Members declared directly on `type_id` under `name`.
    #[must_use]
    pub fn find_declared_member(&self, type_id: TypeId, name: &str) -> Option<MemberRef> {
        let ty = &self[type_id];
        if let Some(id) = ty.properties.get(name) {
            return Some(MemberRef::Property(*id));
        }
        if let Some(id) = ty.complex_properties.get(name) {
            return Some(MemberRef::ComplexProperty(*id));
        }
        if let Some(id) = ty.service_properties.get(name) {
            return Some(MemberRef::ServiceProperty(*id));
        }
        if let Some(id) = ty.navigations.get(name) {
            return Some(MemberRef::Navigation(*id));
        }
        ty.skip_navigations
            .get(name)
            .map(|id| MemberRef::SkipNavigation(*id))
    }

    /// Member visible on `type_id` under `name`, declared on it or inherited.
    #[must_use]
    pub fn find_member(&self, type_id: TypeId, name: &str) -> Option<MemberRef> {
        self.base_types_inclusive(type_id)
            .into_iter()
            .find_map(|t| self.find_declared_member(t, name))
    }

    /// Members named `name` anywhere in the hierarchy of `type_id`: its base
    /// chain, itself and every derived type.
    #[must_use]
    pub fn find_members_in_hierarchy(&self, type_id: TypeId, name: &str) -> Vec<MemberRef> {
        let mut found = Vec::new();
        for t in self.base_types(type_id) {
            found.extend(self.find_declared_member(t, name));
        }
        for t in self.derived_types_inclusive(type_id) {
            found.extend(self.find_declared_member(t, name));
        }
        found
    }

    /// All members declared on `type_id`, properties first.
    #[must_use]
    pub fn declared_members(&self, type_id: TypeId) -> Vec<MemberRef> {
        let ty = &self[type_id];
        let mut members: Vec<MemberRef> = Vec::new();
        members.extend(ty.properties.values().map(|id| MemberRef::Property(*id)));
        members.extend(
            ty.complex_properties
                .values()
                .map(|id| MemberRef::ComplexProperty(*id)),
        );
        members.extend(
            ty.service_properties
                .values()
                .map(|id| MemberRef::ServiceProperty(*id)),
        );
        members.extend(ty.navigations.values().map(|id| MemberRef::Navigation(*id)));
        members.extend(
            ty.skip_navigations
                .values()
                .map(|id| MemberRef::SkipNavigation(*id)),
        );
        members
    }

    /// Whether two members could be merged: same kind and the same CLR
    /// type or navigation target.
    #[must_use]
    pub fn members_compatible(&self, left: MemberRef, right: MemberRef) -> bool {
        match (left, right) {
            (MemberRef::Property(l), MemberRef::Property(r)) => {
                self[l].clr_type == self[r].clr_type
            }
            (MemberRef::ComplexProperty(l), MemberRef::ComplexProperty(r)) => {
                self[l].clr_type == self[r].clr_type
                    && self[l].is_collection == self[r].is_collection
            }
            (MemberRef::ServiceProperty(l), MemberRef::ServiceProperty(r)) => {
                self[l].clr_type == self[r].clr_type
            }
            (MemberRef::Navigation(l), MemberRef::Navigation(r)) => {
                self.navigation_target(l) == self.navigation_target(r)
            }
            (MemberRef::SkipNavigation(l), MemberRef::SkipNavigation(r)) => {
                self[l].target_type == self[r].target_type
            }
            _ => false,
        }
    }

    /// Human-readable `Type.Member`.
    #[must_use]
    pub fn member_display(&self, member: MemberRef) -> String {
        let m = self.member(member);
        format!("{}.{}", self[m.declaring_type()].name, m.name())
    }
}
