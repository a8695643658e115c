//! Host-side snapshots handed to the listener.

use changeset_types::{CollectionDelta, EntityRef, FieldChange, PropertyChangeSet, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field values of one entity at the time of a lifecycle callback.
///
/// Scalar and to-one association fields live in `fields`; to-many
/// associations live in `collections`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    #[serde(default)]
    pub fields: IndexMap<String, Value>,
    #[serde(default)]
    pub collections: IndexMap<String, Vec<Value>>,
}

impl EntityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn collection<I, V>(mut self, name: impl Into<String>, elements: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.collections
            .insert(name.into(), elements.into_iter().map(Into::into).collect());
        self
    }

    /// Value of a scalar field; missing fields read as `Null`.
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }

    /// Elements of a to-many field; missing fields read as empty.
    pub fn elements(&self, name: &str) -> &[Value] {
        self.collections
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Diff of one collection field, as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionUpdate {
    pub owner: EntityRef,
    pub field: String,
    pub delta: CollectionDelta,
}

/// Everything one flush of the host persistence layer touched.
///
/// [`ChangeListener::flush`](crate::ChangeListener::flush) replays it in host
/// order: insertions, scalar updates, collection updates, deletions.
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    insertions: Vec<(EntityRef, EntityState)>,
    updates: Vec<(EntityRef, PropertyChangeSet)>,
    collection_updates: Vec<CollectionUpdate>,
    deletions: Vec<(EntityRef, EntityState)>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, entity: EntityRef, state: EntityState) -> Self {
        self.insertions.push((entity, state));
        self
    }

    /// Queues a scalar change-set. Repeated updates of the same entity are
    /// kept as separate callbacks.
    pub fn update(mut self, entity: EntityRef, changes: PropertyChangeSet) -> Self {
        self.updates.push((entity, changes));
        self
    }

    /// Shorthand for a single-field update.
    pub fn set(
        self,
        entity: EntityRef,
        field: impl Into<String>,
        old: impl Into<Value>,
        new: impl Into<Value>,
    ) -> Self {
        let mut changes = PropertyChangeSet::new();
        changes.insert(field.into(), FieldChange::new(old, new));
        self.update(entity, changes)
    }

    pub fn update_collection(
        mut self,
        owner: EntityRef,
        field: impl Into<String>,
        delta: CollectionDelta,
    ) -> Self {
        self.collection_updates.push(CollectionUpdate {
            owner,
            field: field.into(),
            delta,
        });
        self
    }

    pub fn delete(mut self, entity: EntityRef, state: EntityState) -> Self {
        self.deletions.push((entity, state));
        self
    }

    pub fn insertions(&self) -> &[(EntityRef, EntityState)] {
        &self.insertions
    }

    pub fn updates(&self) -> &[(EntityRef, PropertyChangeSet)] {
        &self.updates
    }

    pub fn collection_updates(&self) -> &[CollectionUpdate] {
        &self.collection_updates
    }

    pub fn deletions(&self) -> &[(EntityRef, EntityState)] {
        &self.deletions
    }

    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty()
            && self.updates.is_empty()
            && self.collection_updates.is_empty()
            && self.deletions.is_empty()
    }
}
