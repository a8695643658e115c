//! Mirroring owning-side association changes onto the inverse side.
//!
//! Only owning-side notifications drive propagation. The mirrored change is
//! shaped by the inverse field's cardinality:
//! - to-one inverse: a property change `(null, owner)` or `(owner, null)` and
//!   the same pair in the target's update
//! - to-many inverse: a collection change with the owner inserted or deleted,
//!   and the same delta in the target's update when it monitors collections
//!
//! The host may report one edge twice in a flush: once in the state of a
//! created (or deleted) entity and again as a collection diff. Edges mirrored
//! from entity state are remembered in [`MirroredEdges`] until the flush
//! completes, and the matching diff element is then not mirrored again.
//! Every other diff element is mirrored, including repeats.

use crate::error::ListenerResult;
use crate::listener::ChangeListener;
use changeset_model::{AssociationMapping, FieldConfig};
use changeset_types::{
    CollectionChangeSet, CollectionDelta, EntityId, EntityRef, FieldChange, PropertyChangeSet,
    Value,
};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Direction of an edge change seen from the owning side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Link {
    Linked,
    Unlinked,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Edge {
    owner: EntityId,
    field: String,
    target: EntityId,
    link: Link,
}

impl Edge {
    fn new(owner: &EntityRef, field: &str, target: &EntityRef, link: Link) -> Self {
        Self {
            owner: owner.id,
            field: field.to_string(),
            target: target.id,
            link,
        }
    }
}

/// To-many edges mirrored from entity state during the current flush.
#[derive(Debug, Default)]
pub(crate) struct MirroredEdges {
    edges: Mutex<HashSet<Edge>>,
}

impl MirroredEdges {
    pub(crate) fn remember(&self, owner: &EntityRef, field: &str, target: &EntityRef, link: Link) {
        self.lock().insert(Edge::new(owner, field, target, link));
    }

    /// Forgets the edge and returns true if it was mirrored already.
    pub(crate) fn consume(
        &self,
        owner: &EntityRef,
        field: &str,
        target: &EntityRef,
        link: Link,
    ) -> bool {
        self.lock().remove(&Edge::new(owner, field, target, link))
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Edge>> {
        self.edges.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChangeListener {
    /// Records the mirror of `owner -> target` on `target`'s inverse field.
    pub(crate) fn propagate(
        &self,
        owner: &EntityRef,
        mapping: &AssociationMapping,
        target: &EntityRef,
        link: Link,
    ) -> ListenerResult<()> {
        let Some(inverse_field) = mapping.inverse_field() else {
            return Ok(());
        };
        let Some(target_metadata) = self.config.class_metadata(&target.class) else {
            debug!("No mapping for {}, not mirroring {:?}", target, link);
            return Ok(());
        };

        let field_config = self
            .config
            .resolve_field_config(&target.class, inverse_field)?;
        let change = field_config.and_then(|f| f.change.clone());
        let ignored = field_config.is_some_and(|f: &FieldConfig| f.ignore_class_updates);
        let update = self
            .config
            .resolve_class_config(&target.class)
            .and_then(|c| c.update.clone());
        let to_many = target_metadata
            .association_for(inverse_field)
            .is_some_and(AssociationMapping::is_collection);

        debug!(
            "Mirroring {:?} {} onto {}.{}",
            link, owner, target, inverse_field
        );

        if to_many {
            let delta = match link {
                Link::Linked => CollectionDelta::inserted(owner),
                Link::Unlinked => CollectionDelta::deleted(owner),
            };
            let update = update.filter(|u| u.monitor_collections && !ignored);

            if let Some(config) = change {
                self.dispatcher.record_collection_change(
                    config,
                    target.clone(),
                    inverse_field,
                    delta.clone(),
                );
            }
            if let Some(update) = update {
                let mut collections = CollectionChangeSet::new();
                collections.insert(inverse_field.to_string(), delta);
                self.dispatcher.record_update(
                    update.event,
                    target.clone(),
                    PropertyChangeSet::new(),
                    collections,
                );
            }
        } else {
            let (old, new) = match link {
                Link::Linked => (Value::Null, Value::from(owner)),
                Link::Unlinked => (Value::from(owner), Value::Null),
            };
            if let Some(config) = change {
                self.dispatcher.record_property_change(
                    config,
                    target.clone(),
                    inverse_field,
                    old.clone(),
                    new.clone(),
                );
            }
            if let Some(update) = update.filter(|_| !ignored) {
                let mut properties = PropertyChangeSet::new();
                properties.insert(inverse_field.to_string(), FieldChange::new(old, new));
                self.dispatcher.record_update(
                    update.event,
                    target.clone(),
                    properties,
                    CollectionChangeSet::new(),
                );
            }
        }
        Ok(())
    }
}
