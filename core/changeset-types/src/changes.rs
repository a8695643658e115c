//! Change-set types: what changed on one entity during a flush.

use crate::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered `field -> (old, new)` map of scalar changes.
pub type PropertyChangeSet = IndexMap<String, FieldChange>;

/// Ordered `field -> {deleted, inserted}` map of collection changes.
pub type CollectionChangeSet = IndexMap<String, CollectionDelta>;

/// Identifier fields of a deleted entity, in mapping declaration order.
pub type Identifier = IndexMap<String, Value>;

/// One scalar field transition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

impl FieldChange {
    pub fn new(old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Elements removed from and added to a collection field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CollectionDelta {
    #[serde(default)]
    pub deleted: Vec<Value>,
    #[serde(default)]
    pub inserted: Vec<Value>,
}

impl CollectionDelta {
    pub fn new(deleted: Vec<Value>, inserted: Vec<Value>) -> Self {
        Self { deleted, inserted }
    }

    /// A delta with a single inserted element.
    pub fn inserted(element: impl Into<Value>) -> Self {
        Self {
            deleted: Vec::new(),
            inserted: vec![element.into()],
        }
    }

    /// A delta with a single deleted element.
    pub fn deleted(element: impl Into<Value>) -> Self {
        Self {
            deleted: vec![element.into()],
            inserted: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.inserted.is_empty()
    }

    /// Appends `other`'s elements after ours, keeping arrival order.
    pub fn merge(&mut self, other: CollectionDelta) {
        self.deleted.extend(other.deleted);
        self.inserted.extend(other.inserted);
    }
}
