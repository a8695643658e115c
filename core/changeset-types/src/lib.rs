//! Core type definitions for the change-tracking layer.
//!
//! This crate defines the vocabulary shared by every other crate:
//! - Entity identity ([`EntityId`], [`ClassId`], [`EntityRef`])
//! - Field values ([`Value`])
//! - Change-sets ([`FieldChange`], [`CollectionDelta`] and the ordered maps
//!   built from them)
//! - The payloads handed to event subscribers ([`Event`])
//!
//! Nothing here knows how changes are collected or delivered; that lives in
//! `changeset-engine`.

mod changes;
mod event;
mod ids;
mod value;

pub use changes::{
    CollectionChangeSet, CollectionDelta, FieldChange, Identifier, PropertyChangeSet,
};
pub use event::{
    CollectionChangedEvent, CustomEvent, DeletedEvent, EntityEvent, Event, EventKind,
    PendingCounts, PreAutoDispatchEvent, PropertyChangedEvent, PropertyEvent, UpdatedEvent,
    event_names, payload_types,
};
pub use ids::{ClassId, EntityId, EntityRef};
pub use value::Value;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A change-set was queried for a field it does not contain.
    #[error("field not present in change-set: {0}")]
    InvalidField(String),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
