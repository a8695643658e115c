//! Aggregated change records awaiting dispatch.

use changeset_model::EventConfig;
use changeset_types::{
    CollectionChangeSet, CollectionChangedEvent, CollectionDelta, DeletedEvent, EntityEvent,
    EntityRef, Event, EventKind, Identifier, PropertyChangeSet, PropertyChangedEvent,
    UpdatedEvent, Value,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CreationRecord {
    pub config: EventConfig,
    pub entity: EntityRef,
    /// Whatever the host passed along with the creation callback.
    pub raw_args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletionRecord {
    pub config: EventConfig,
    pub entity: EntityRef,
    pub identifier: Identifier,
}

/// All class-level update changes of one entity in the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecord {
    pub config: EventConfig,
    pub entity: EntityRef,
    pub properties: PropertyChangeSet,
    pub collections: CollectionChangeSet,
}

impl UpdateRecord {
    /// Folds another update of the same entity into this one.
    ///
    /// Property keys are unioned and a repeated key takes the newer
    /// `(old, new)` pair. Collection keys are unioned and a repeated key
    /// concatenates its deleted and inserted elements in arrival order.
    pub fn merge(&mut self, properties: PropertyChangeSet, collections: CollectionChangeSet) {
        for (field, change) in properties {
            self.properties.insert(field, change);
        }
        for (field, delta) in collections {
            self.collections.entry(field).or_default().merge(delta);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChangeRecord {
    pub config: EventConfig,
    pub entity: EntityRef,
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Every change of one collection field of one entity in the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChangeRecord {
    pub config: EventConfig,
    pub entity: EntityRef,
    pub field: String,
    pub delta: CollectionDelta,
}

/// One aggregated observation, of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRecord {
    Creation(CreationRecord),
    Deletion(DeletionRecord),
    Update(UpdateRecord),
    PropertyChange(PropertyChangeRecord),
    CollectionChange(CollectionChangeRecord),
}

impl ChangeRecord {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Creation(_) => EventKind::Creation,
            Self::Deletion(_) => EventKind::Deletion,
            Self::Update(_) => EventKind::Update,
            Self::PropertyChange(_) => EventKind::PropertyChange,
            Self::CollectionChange(_) => EventKind::CollectionChange,
        }
    }

    pub fn config(&self) -> &EventConfig {
        match self {
            Self::Creation(r) => &r.config,
            Self::Deletion(r) => &r.config,
            Self::Update(r) => &r.config,
            Self::PropertyChange(r) => &r.config,
            Self::CollectionChange(r) => &r.config,
        }
    }

    pub fn entity(&self) -> &EntityRef {
        match self {
            Self::Creation(r) => &r.entity,
            Self::Deletion(r) => &r.entity,
            Self::Update(r) => &r.entity,
            Self::PropertyChange(r) => &r.entity,
            Self::CollectionChange(r) => &r.entity,
        }
    }

    /// Name the payload is published under.
    pub fn event_name(&self) -> &str {
        self.config().event_name_for(self.kind())
    }

    /// Payload type id used to pick a factory.
    pub fn payload_type(&self) -> &str {
        self.config().payload_type_for(self.kind())
    }

    /// Builds the built-in payload for this record's kind.
    pub fn into_event(self) -> Event {
        match self {
            Self::Creation(r) => Event::Created(EntityEvent { entity: r.entity }),
            Self::Deletion(r) => Event::Deleted(DeletedEvent {
                entity: r.entity,
                identifier: r.identifier,
            }),
            Self::Update(r) => Event::Updated(UpdatedEvent {
                entity: r.entity,
                properties: r.properties,
                collections: r.collections,
            }),
            Self::PropertyChange(r) => Event::PropertyChanged(PropertyChangedEvent {
                entity: r.entity,
                property: r.field,
                old_value: r.old_value,
                new_value: r.new_value,
            }),
            Self::CollectionChange(r) => Event::CollectionChanged(CollectionChangedEvent {
                entity: r.entity,
                property: r.field,
                deleted_elements: r.delta.deleted,
                inserted_elements: r.delta.inserted,
            }),
        }
    }
}
