//! Event payloads delivered to subscribers.
//!
//! One payload is built per aggregated change record. The five built-in
//! payload shapes mirror the five record kinds; [`Event::Custom`] carries
//! payloads produced by application-registered factories, and
//! [`Event::PreAutoDispatch`] announces an automatic dispatch pass.
//!
//! Shared accessors (entity, property name) are provided through the
//! [`PropertyEvent`] trait rather than by nesting one payload in another.

use crate::{
    CollectionChangeSet, EntityRef, Error, Identifier, PropertyChangeSet, Result, Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default event names, used when a configuration entry does not override them.
pub mod event_names {
    pub const CREATED: &str = "created";
    pub const DELETED: &str = "deleted";
    pub const UPDATED: &str = "updated";
    pub const PROPERTY_CHANGED: &str = "property_changed";
    pub const COLLECTION_CHANGED: &str = "collection_changed";
    pub const PRE_AUTO_DISPATCH: &str = "pre_auto_dispatch";
}

/// Identifiers of the built-in payload types.
pub mod payload_types {
    pub const ENTITY_CREATED: &str = "EntityCreated";
    pub const ENTITY_DELETED: &str = "EntityDeleted";
    pub const ENTITY_UPDATED: &str = "EntityUpdated";
    pub const PROPERTY_CHANGED: &str = "PropertyChanged";
    pub const COLLECTION_CHANGED: &str = "CollectionChanged";
}

/// The five kinds of aggregated change, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Creation,
    Deletion,
    Update,
    PropertyChange,
    CollectionChange,
}

impl EventKind {
    /// Every kind, in the order a dispatch pass processes them.
    pub const DISPATCH_ORDER: [EventKind; 5] = [
        Self::Creation,
        Self::Deletion,
        Self::Update,
        Self::PropertyChange,
        Self::CollectionChange,
    ];

    pub fn default_event_name(self) -> &'static str {
        match self {
            Self::Creation => event_names::CREATED,
            Self::Deletion => event_names::DELETED,
            Self::Update => event_names::UPDATED,
            Self::PropertyChange => event_names::PROPERTY_CHANGED,
            Self::CollectionChange => event_names::COLLECTION_CHANGED,
        }
    }

    pub fn default_payload_type(self) -> &'static str {
        match self {
            Self::Creation => payload_types::ENTITY_CREATED,
            Self::Deletion => payload_types::ENTITY_DELETED,
            Self::Update => payload_types::ENTITY_UPDATED,
            Self::PropertyChange => payload_types::PROPERTY_CHANGED,
            Self::CollectionChange => payload_types::COLLECTION_CHANGED,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Creation => "creation",
            Self::Deletion => "deletion",
            Self::Update => "update",
            Self::PropertyChange => "property change",
            Self::CollectionChange => "collection change",
        };
        f.write_str(name)
    }
}

/// Accessors shared by payloads that describe a single field of an entity.
pub trait PropertyEvent {
    fn entity(&self) -> &EntityRef;
    fn property(&self) -> &str;
}

/// Payload of a creation: just the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEvent {
    pub entity: EntityRef,
}

/// Payload of a deletion: the entity and its identifier fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedEvent {
    pub entity: EntityRef,
    pub identifier: Identifier,
}

impl DeletedEvent {
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }
}

/// Payload of an update: every scalar and collection change of one entity
/// in one flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedEvent {
    pub entity: EntityRef,
    pub properties: PropertyChangeSet,
    pub collections: CollectionChangeSet,
}

impl UpdatedEvent {
    /// Names of the changed scalar fields, in arrival order.
    pub fn changed_properties(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Names of the changed collection fields, in arrival order.
    pub fn changed_collections(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Scalar field names followed by collection field names.
    pub fn changed_fields(&self) -> Vec<&str> {
        self.changed_properties()
            .chain(self.changed_collections())
            .collect()
    }

    pub fn has_changed_field(&self, field: &str) -> bool {
        self.properties.contains_key(field) || self.collections.contains_key(field)
    }

    /// Value of `field` before the flush.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidField`] if `field` is not in the property change-set.
    pub fn old_value(&self, field: &str) -> Result<&Value> {
        self.properties
            .get(field)
            .map(|change| &change.old)
            .ok_or_else(|| Error::InvalidField(field.to_string()))
    }

    /// Value of `field` after the flush.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidField`] if `field` is not in the property change-set.
    pub fn new_value(&self, field: &str) -> Result<&Value> {
        self.properties
            .get(field)
            .map(|change| &change.new)
            .ok_or_else(|| Error::InvalidField(field.to_string()))
    }

    /// Elements removed from collection `field`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidField`] if `field` is not in the collection change-set.
    pub fn deleted_elements(&self, field: &str) -> Result<&[Value]> {
        self.collections
            .get(field)
            .map(|delta| delta.deleted.as_slice())
            .ok_or_else(|| Error::InvalidField(field.to_string()))
    }

    /// Elements added to collection `field`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidField`] if `field` is not in the collection change-set.
    pub fn inserted_elements(&self, field: &str) -> Result<&[Value]> {
        self.collections
            .get(field)
            .map(|delta| delta.inserted.as_slice())
            .ok_or_else(|| Error::InvalidField(field.to_string()))
    }
}

/// Payload of a single scalar field change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChangedEvent {
    pub entity: EntityRef,
    pub property: String,
    pub old_value: Value,
    pub new_value: Value,
}

impl PropertyEvent for PropertyChangedEvent {
    fn entity(&self) -> &EntityRef {
        &self.entity
    }

    fn property(&self) -> &str {
        &self.property
    }
}

/// Payload of a collection field change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionChangedEvent {
    pub entity: EntityRef,
    pub property: String,
    pub deleted_elements: Vec<Value>,
    pub inserted_elements: Vec<Value>,
}

impl PropertyEvent for CollectionChangedEvent {
    fn entity(&self) -> &EntityRef {
        &self.entity
    }

    fn property(&self) -> &str {
        &self.property
    }
}

/// Number of records waiting in each buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingCounts {
    pub creations: usize,
    pub deletions: usize,
    pub updates: usize,
    pub property_changes: usize,
    pub collection_changes: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.creations
            + self.deletions
            + self.updates
            + self.property_changes
            + self.collection_changes
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Announces an automatic dispatch pass, with what is about to be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreAutoDispatchEvent {
    pub pending: PendingCounts,
}

/// Payload built by an application-registered payload factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    pub payload_type: String,
    pub entity: EntityRef,
    pub data: serde_json::Value,
}

/// A payload delivered through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Event {
    Created(EntityEvent),
    Deleted(DeletedEvent),
    Updated(UpdatedEvent),
    PropertyChanged(PropertyChangedEvent),
    CollectionChanged(CollectionChangedEvent),
    PreAutoDispatch(PreAutoDispatchEvent),
    Custom(CustomEvent),
}

impl Event {
    /// The entity this payload is about, if any.
    pub fn entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Created(e) => Some(&e.entity),
            Self::Deleted(e) => Some(&e.entity),
            Self::Updated(e) => Some(&e.entity),
            Self::PropertyChanged(e) => Some(&e.entity),
            Self::CollectionChanged(e) => Some(&e.entity),
            Self::Custom(e) => Some(&e.entity),
            Self::PreAutoDispatch(_) => None,
        }
    }

    pub fn as_updated(&self) -> Option<&UpdatedEvent> {
        match self {
            Self::Updated(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_deleted(&self) -> Option<&DeletedEvent> {
        match self {
            Self::Deleted(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_property_changed(&self) -> Option<&PropertyChangedEvent> {
        match self {
            Self::PropertyChanged(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_collection_changed(&self) -> Option<&CollectionChangedEvent> {
        match self {
            Self::CollectionChanged(e) => Some(e),
            _ => None,
        }
    }

    /// Field-level view of property and collection change payloads.
    pub fn as_property_event(&self) -> Option<&dyn PropertyEvent> {
        match self {
            Self::PropertyChanged(e) => Some(e),
            Self::CollectionChanged(e) => Some(e),
            _ => None,
        }
    }
}
