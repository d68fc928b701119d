//! # Convention Dispatch
//!
//! Structural edits raise [`ModelEvent`]s. Events are queued while a
//! delay-conventions scope is open and delivered to every registered
//! [`Convention`] when the outermost scope closes.
//!
//! The dispatcher itself only counts scopes and holds the queue; the flush
//! loop lives on `ModelBuilder` because conventions need the builder to
//! react.

use crate::builder::ModelBuilder;
use crate::model::Model;
use crate::source::ConfigurationSource;
use crate::{ForeignKeyId, IndexId, KeyId, ModelError, NavigationId, PropertyId, TypeId};
use crate::{ComplexPropertyId, SkipNavigationId};
use std::collections::VecDeque;

// =============================================================================
// EVENTS
// =============================================================================

/// A structural change to the model.
///
/// Removal events carry names because the removed element's id is dead by
/// the time the event is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    EntityTypeAdded(TypeId),
    EntityTypeRemoved { name: String },
    BaseTypeChanged(TypeId),
    PropertyAdded(PropertyId),
    PropertyRemoved { type_id: TypeId, name: String },
    PropertyNullabilityChanged(PropertyId),
    ComplexPropertyAdded(ComplexPropertyId),
    ComplexPropertyRemoved { type_id: TypeId, name: String },
    KeyAdded(KeyId),
    KeyRemoved { type_id: TypeId, properties: Vec<String> },
    PrimaryKeyChanged(TypeId),
    IndexAdded(IndexId),
    IndexRemoved { type_id: TypeId, properties: Vec<String> },
    ForeignKeyAdded(ForeignKeyId),
    ForeignKeyRemoved { dependent: TypeId, principal: TypeId },
    ForeignKeyPropertiesChanged(ForeignKeyId),
    ForeignKeyUniquenessChanged(ForeignKeyId),
    ForeignKeyOwnershipChanged(ForeignKeyId),
    NavigationAdded(NavigationId),
    NavigationRemoved { type_id: TypeId, name: String },
    SkipNavigationAdded(SkipNavigationId),
    SkipNavigationRemoved { type_id: TypeId, name: String },
}

impl ModelEvent {
    /// Whether the element the event refers to still exists.
    ///
    /// Events queued during a batch can outlive their subject; stale events
    /// are dropped during the flush.
    #[must_use]
    pub fn is_live(&self, model: &Model) -> bool {
        match self {
            Self::EntityTypeAdded(id) | Self::BaseTypeChanged(id) | Self::PrimaryKeyChanged(id) => {
                model.get_type(*id).is_some()
            }
            Self::PropertyAdded(id) | Self::PropertyNullabilityChanged(id) => {
                model.get_property(*id).is_some()
            }
            Self::ComplexPropertyAdded(id) => model.get_complex_property(*id).is_some(),
            Self::KeyAdded(id) => model.get_key(*id).is_some(),
            Self::IndexAdded(id) => model.get_index(*id).is_some(),
            Self::ForeignKeyAdded(id)
            | Self::ForeignKeyPropertiesChanged(id)
            | Self::ForeignKeyUniquenessChanged(id)
            | Self::ForeignKeyOwnershipChanged(id) => model.get_foreign_key(*id).is_some(),
            Self::NavigationAdded(id) => model.get_navigation(*id).is_some(),
            Self::SkipNavigationAdded(id) => model.get_skip_navigation(*id).is_some(),
            Self::PropertyRemoved { type_id, .. }
            | Self::ComplexPropertyRemoved { type_id, .. }
            | Self::KeyRemoved { type_id, .. }
            | Self::IndexRemoved { type_id, .. }
            | Self::NavigationRemoved { type_id, .. }
            | Self::SkipNavigationRemoved { type_id, .. } => model.get_type(*type_id).is_some(),
            Self::EntityTypeRemoved { .. } | Self::ForeignKeyRemoved { .. } => true,
        }
    }
}

// =============================================================================
// CONVENTIONS
// =============================================================================

/// An automated rule reacting to structural changes.
///
/// Conventions mutate the model through the same builder API as any other
/// caller, normally at `Convention` source.
pub trait Convention {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// React to one event.
    fn apply(&mut self, builder: &mut ModelBuilder, event: &ModelEvent) -> Result<(), ModelError>;
}

/// Scope counter and pending-event queue.
#[derive(Debug, Default)]
pub struct ConventionDispatcher {
    depth: usize,
    pending: VecDeque<ModelEvent>,
    dispatched: u64,
}

impl ConventionDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope.
    pub fn delay(&mut self) {
        self.depth = self.depth.saturating_add(1);
    }

    /// Close a scope, returning `true` when it was the outermost one.
    pub fn resume(&mut self) -> bool {
        self.depth = self.depth.saturating_sub(1);
        self.depth == 0
    }

    /// Whether a scope is open.
    #[must_use]
    pub fn is_delayed(&self) -> bool {
        self.depth > 0
    }

    /// Current nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Queue an event.
    pub fn queue(&mut self, event: ModelEvent) {
        self.pending.push_back(event);
    }

    /// Next queued event.
    pub fn next_event(&mut self) -> Option<ModelEvent> {
        let event = self.pending.pop_front()?;
        self.dispatched = self.dispatched.saturating_add(1);
        Some(event)
    }

    /// Drop every queued event.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Number of queued events.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Events handed out since creation.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

// =============================================================================
// STANDARD CONVENTIONS
// =============================================================================

/// Makes `Id` or `<Type>Id` the primary key of a root entity type.
#[derive(Debug, Default)]
pub struct KeyDiscoveryConvention;

impl KeyDiscoveryConvention {
    fn candidate(model: &Model, type_id: TypeId) -> Option<PropertyId> {
        let ty = &model[type_id];
        if !ty.is_entity_type()
            || ty.base_type().is_some()
            || ty.is_keyless()
            || ty.primary_key().is_some()
        {
            return None;
        }
        let short_name = ty.name().rsplit('.').next().unwrap_or(ty.name());
        ["Id".to_string(), format!("{}Id", short_name)]
            .iter()
            .find_map(|name| ty.properties.get(name).copied())
    }
}

impl Convention for KeyDiscoveryConvention {
    fn name(&self) -> &str {
        "KeyDiscovery"
    }

    fn apply(&mut self, builder: &mut ModelBuilder, event: &ModelEvent) -> Result<(), ModelError> {
        let type_id = match event {
            ModelEvent::EntityTypeAdded(id) | ModelEvent::BaseTypeChanged(id) => *id,
            ModelEvent::PropertyAdded(id) => builder.model()[*id].declaring_type,
            _ => return Ok(()),
        };
        if let Some(property) = Self::candidate(builder.model(), type_id) {
            builder
                .type_builder(type_id)?
                .primary_key(&[property], ConfigurationSource::Convention)?;
        }
        Ok(())
    }
}

/// Indexes the dependent properties of every foreign key.
#[derive(Debug, Default)]
pub struct ForeignKeyIndexConvention;

impl Convention for ForeignKeyIndexConvention {
    fn name(&self) -> &str {
        "ForeignKeyIndex"
    }

    fn apply(&mut self, builder: &mut ModelBuilder, event: &ModelEvent) -> Result<(), ModelError> {
        let fk = match event {
            ModelEvent::ForeignKeyAdded(id) | ModelEvent::ForeignKeyPropertiesChanged(id) => *id,
            _ => return Ok(()),
        };
        let model = builder.model();
        let foreign_key = &model[fk];
        let dependent = foreign_key.declaring_type;
        let properties = foreign_key.properties.clone();
        let covered = model.find_index(dependent, &properties).is_some()
            || model.find_key(dependent, &properties).is_some();
        if !covered && !model[dependent].is_keyless() {
            builder.type_builder(dependent)?.has_index(
                &properties,
                None,
                ConfigurationSource::Convention,
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_outermost_resume_reports_zero() {
        let mut dispatcher = ConventionDispatcher::new();
        dispatcher.delay();
        dispatcher.delay();
        assert!(!dispatcher.resume());
        assert!(dispatcher.is_delayed());
        assert!(dispatcher.resume());
        assert!(!dispatcher.is_delayed());
    }

    #[test]
    fn queue_is_fifo() {
        let mut dispatcher = ConventionDispatcher::new();
        dispatcher.queue(ModelEvent::EntityTypeRemoved {
            name: "A".to_string(),
        });
        dispatcher.queue(ModelEvent::EntityTypeRemoved {
            name: "B".to_string(),
        });
        assert_eq!(dispatcher.pending_len(), 2);
        assert_eq!(
            dispatcher.next_event(),
            Some(ModelEvent::EntityTypeRemoved {
                name: "A".to_string()
            })
        );
        assert_eq!(dispatcher.dispatched(), 1);
    }

    #[test]
    fn removal_events_of_dead_types_are_stale() {
        let model = Model::new();
        let event = ModelEvent::PropertyRemoved {
            type_id: TypeId(42),
            name: "Name".to_string(),
        };
        assert!(!event.is_live(&model));
        assert!(ModelEvent::EntityTypeRemoved {
            name: "Gone".to_string()
        }
        .is_live(&model));
    }
}
