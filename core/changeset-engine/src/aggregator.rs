//! The per-cycle record buffers.
//!
//! Merge rules:
//! - at most one [`UpdateRecord`] per entity identity
//! - at most one [`CollectionChangeRecord`] per (entity identity, field)
//! - creations, deletions and property changes are appended as they come

use crate::record::{
    ChangeRecord, CollectionChangeRecord, CreationRecord, DeletionRecord, PropertyChangeRecord,
    UpdateRecord,
};
use changeset_model::EventConfig;
use changeset_types::{
    CollectionChangeSet, CollectionDelta, EntityId, EntityRef, EventKind, Identifier,
    PendingCounts, PropertyChangeSet, Value,
};
use std::collections::HashMap;
use std::mem;
use tracing::debug;

/// Accumulates change records for one unit-of-work.
#[derive(Debug, Default)]
pub struct Aggregator {
    creations: Vec<CreationRecord>,
    deletions: Vec<DeletionRecord>,
    updates: Vec<UpdateRecord>,
    update_index: HashMap<EntityId, usize>,
    property_changes: Vec<PropertyChangeRecord>,
    collection_changes: Vec<CollectionChangeRecord>,
    collection_index: HashMap<(EntityId, String), usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Recording ────────────────────────────────────────────────

    pub fn record_creation(&mut self, config: EventConfig, entity: EntityRef) {
        self.record_creation_with_args(config, entity, serde_json::Value::Null);
    }

    /// Queues a creation along with the host's raw callback arguments.
    /// Creations are never merged.
    pub fn record_creation_with_args(
        &mut self,
        config: EventConfig,
        entity: EntityRef,
        raw_args: serde_json::Value,
    ) {
        debug!("Recording creation of {}", entity);
        self.creations.push(CreationRecord {
            config,
            entity,
            raw_args,
        });
    }

    /// Queues a deletion. Deletions are never merged.
    pub fn record_deletion(&mut self, config: EventConfig, entity: EntityRef, identifier: Identifier) {
        debug!("Recording deletion of {}", entity);
        self.deletions.push(DeletionRecord {
            config,
            entity,
            identifier,
        });
    }

    /// Inserts an update for `entity`, or merges into the one already queued
    /// this cycle (see [`UpdateRecord::merge`]).
    pub fn record_update(
        &mut self,
        config: EventConfig,
        entity: EntityRef,
        properties: PropertyChangeSet,
        collections: CollectionChangeSet,
    ) {
        if let Some(&index) = self.update_index.get(&entity.id) {
            debug!("Merging update into existing record for {}", entity);
            self.updates[index].merge(properties, collections);
            return;
        }

        debug!("Recording update of {}", entity);
        self.update_index.insert(entity.id, self.updates.len());
        self.updates.push(UpdateRecord {
            config,
            entity,
            properties,
            collections,
        });
    }

    /// Queues a single field transition. Never merged: several transitions
    /// of the same field in one cycle each produce their own payload.
    pub fn record_property_change(
        &mut self,
        config: EventConfig,
        entity: EntityRef,
        field: impl Into<String>,
        old_value: impl Into<Value>,
        new_value: impl Into<Value>,
    ) {
        let field = field.into();
        debug!("Recording property change {}.{}", entity, field);
        self.property_changes.push(PropertyChangeRecord {
            config,
            entity,
            field,
            old_value: old_value.into(),
            new_value: new_value.into(),
        });
    }

    /// Inserts a collection change, or appends `delta` to the one already
    /// queued for the same entity and field.
    pub fn record_collection_change(
        &mut self,
        config: EventConfig,
        entity: EntityRef,
        field: impl Into<String>,
        delta: CollectionDelta,
    ) {
        let field = field.into();
        let key = (entity.id, field);
        if let Some(&index) = self.collection_index.get(&key) {
            debug!("Merging collection change into {}.{}", entity, key.1);
            self.collection_changes[index].delta.merge(delta);
            return;
        }

        debug!("Recording collection change {}.{}", entity, key.1);
        self.collection_index.insert(key.clone(), self.collection_changes.len());
        self.collection_changes.push(CollectionChangeRecord {
            config,
            entity,
            field: key.1,
            delta,
        });
    }

    // ── Queries ──────────────────────────────────────────────────

    /// The queued update for `entity` and its position in the buffer.
    pub fn find_update(&self, entity: &EntityRef) -> Option<(usize, &UpdateRecord)> {
        self.update_index
            .get(&entity.id)
            .map(|&index| (index, &self.updates[index]))
    }

    /// The queued collection change for `entity.field` and its position.
    pub fn find_collection_change(
        &self,
        entity: &EntityRef,
        field: &str,
    ) -> Option<(usize, &CollectionChangeRecord)> {
        self.collection_index
            .get(&(entity.id, field.to_string()))
            .map(|&index| (index, &self.collection_changes[index]))
    }

    pub fn creations(&self) -> &[CreationRecord] {
        &self.creations
    }

    pub fn deletions(&self) -> &[DeletionRecord] {
        &self.deletions
    }

    pub fn updates(&self) -> &[UpdateRecord] {
        &self.updates
    }

    pub fn property_changes(&self) -> &[PropertyChangeRecord] {
        &self.property_changes
    }

    pub fn collection_changes(&self) -> &[CollectionChangeRecord] {
        &self.collection_changes
    }

    pub fn pending(&self) -> PendingCounts {
        PendingCounts {
            creations: self.creations.len(),
            deletions: self.deletions.len(),
            updates: self.updates.len(),
            property_changes: self.property_changes.len(),
            collection_changes: self.collection_changes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    // ── Draining ─────────────────────────────────────────────────

    /// Removes and returns every record of `kind`, in insertion order.
    /// The buffer is empty afterwards, so later records start a new cycle.
    pub fn take(&mut self, kind: EventKind) -> Vec<ChangeRecord> {
        match kind {
            EventKind::Creation => mem::take(&mut self.creations)
                .into_iter()
                .map(ChangeRecord::Creation)
                .collect(),
            EventKind::Deletion => mem::take(&mut self.deletions)
                .into_iter()
                .map(ChangeRecord::Deletion)
                .collect(),
            EventKind::Update => {
                self.update_index.clear();
                mem::take(&mut self.updates)
                    .into_iter()
                    .map(ChangeRecord::Update)
                    .collect()
            }
            EventKind::PropertyChange => mem::take(&mut self.property_changes)
                .into_iter()
                .map(ChangeRecord::PropertyChange)
                .collect(),
            EventKind::CollectionChange => {
                self.collection_index.clear();
                mem::take(&mut self.collection_changes)
                    .into_iter()
                    .map(ChangeRecord::CollectionChange)
                    .collect()
            }
        }
    }

    /// Drops every queued record without dispatching.
    pub fn clear(&mut self) -> PendingCounts {
        let dropped = self.pending();
        *self = Self::default();
        dropped
    }
}
