//! Lifecycle entry points called by the host framework.

use crate::error::ListenerResult;
use crate::inverse::{Link, MirroredEdges};
use crate::state::{EntityState, UnitOfWork};
use changeset_engine::Dispatcher;
use changeset_model::{ConfigResolver, FieldConfig};
use changeset_types::{
    CollectionChangeSet, CollectionDelta, EntityRef, Identifier, PendingCounts, PropertyChangeSet,
    Value,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Normalizes host callbacks into change records.
///
/// The records live in the [`Dispatcher`], the declarations in the
/// [`ConfigResolver`]. The listener itself only remembers which edges it
/// mirrored from entity state during the current flush. Clones share all
/// three.
#[derive(Clone)]
pub struct ChangeListener {
    pub(crate) config: Arc<dyn ConfigResolver>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) mirrored: Arc<MirroredEdges>,
}

impl ChangeListener {
    pub fn new(config: Arc<dyn ConfigResolver>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            mirrored: Arc::default(),
        }
    }

    pub fn config(&self) -> &Arc<dyn ConfigResolver> {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    // ── Entry points ─────────────────────────────────────────────

    /// An entity was persisted for the first time.
    ///
    /// Records a creation if the class declares one, then links the entity
    /// into the inverse side of every bidirectional association it holds.
    pub fn on_create(&self, entity: &EntityRef, state: &EntityState) -> ListenerResult<()> {
        let Some(metadata) = self.config.class_metadata(&entity.class) else {
            debug!("Ignoring creation of unmapped {}", entity);
            return Ok(());
        };

        if let Some(create) = self
            .config
            .resolve_class_config(&entity.class)
            .and_then(|c| c.create.clone())
        {
            let raw_args = serde_json::to_value(state)?;
            self.dispatcher
                .record_creation_with_args(create, entity.clone(), raw_args);
        }

        for (field, mapping) in &metadata.associations {
            if mapping.inverse_field().is_none() {
                continue;
            }
            for target in association_targets(state, field, mapping.is_collection()) {
                self.propagate(entity, mapping, target, Link::Linked)?;
                if mapping.is_collection() {
                    self.mirrored.remember(entity, field, target, Link::Linked);
                }
            }
        }
        Ok(())
    }

    /// An entity is about to be removed.
    ///
    /// The deletion record carries the identifier fields in declaration
    /// order, read from `state` while they are still populated. Missing
    /// identifier values are reported as `Null`.
    pub fn on_delete(&self, entity: &EntityRef, state: &EntityState) -> ListenerResult<()> {
        let Some(metadata) = self.config.class_metadata(&entity.class) else {
            debug!("Ignoring deletion of unmapped {}", entity);
            return Ok(());
        };

        if let Some(delete) = self
            .config
            .resolve_class_config(&entity.class)
            .and_then(|c| c.delete.clone())
        {
            let identifier: Identifier = metadata
                .identifier
                .iter()
                .map(|field| (field.clone(), state.get(field).clone()))
                .collect();
            self.dispatcher
                .record_deletion(delete, entity.clone(), identifier);
        }

        for (field, mapping) in &metadata.associations {
            if mapping.inverse_field().is_none() {
                continue;
            }
            for target in association_targets(state, field, mapping.is_collection()) {
                self.propagate(entity, mapping, target, Link::Unlinked)?;
                if mapping.is_collection() {
                    self.mirrored.remember(entity, field, target, Link::Unlinked);
                }
            }
        }
        Ok(())
    }

    /// Scalar (and to-one association) fields of an entity changed.
    ///
    /// Each changed field may produce its own property change. Fields not
    /// excluded with `ignore_class_updates` are gathered into one update for
    /// the entity when the class tracks updates.
    ///
    /// # Errors
    ///
    /// [`ListenerError::Config`](crate::ListenerError::Config) when a changed
    /// field does not exist on the class.
    pub fn on_pre_update(
        &self,
        entity: &EntityRef,
        changes: &PropertyChangeSet,
    ) -> ListenerResult<()> {
        let Some(metadata) = self.config.class_metadata(&entity.class) else {
            debug!("Ignoring update of unmapped {}", entity);
            return Ok(());
        };
        let update = self
            .config
            .resolve_class_config(&entity.class)
            .and_then(|c| c.update.clone());

        let mut properties = PropertyChangeSet::new();
        for (field, change) in changes {
            let field_config = self.config.resolve_field_config(&entity.class, field)?;

            if let Some(config) = field_config.and_then(|f| f.change.clone()) {
                self.dispatcher.record_property_change(
                    config,
                    entity.clone(),
                    field.as_str(),
                    change.old.clone(),
                    change.new.clone(),
                );
            }
            if update.is_some() && !ignores_class_updates(field_config) {
                properties.insert(field.clone(), change.clone());
            }

            if let Some(mapping) = metadata.association_for(field) {
                if mapping.inverse_field().is_some() && !mapping.is_collection() {
                    if let Some(previous) = change.old.as_entity() {
                        self.propagate(entity, mapping, previous, Link::Unlinked)?;
                    }
                    if let Some(next) = change.new.as_entity() {
                        self.propagate(entity, mapping, next, Link::Linked)?;
                    }
                }
            }
        }

        if let Some(update) = update {
            if !properties.is_empty() {
                self.dispatcher.record_update(
                    update.event,
                    entity.clone(),
                    properties,
                    CollectionChangeSet::new(),
                );
            }
        }
        Ok(())
    }

    /// A collection field of `owner` changed.
    ///
    /// Only the owning side of an association is observed; the inverse side
    /// is derived from it, so notifications for inverse fields are skipped.
    pub fn on_collection_update(
        &self,
        owner: &EntityRef,
        field: &str,
        delta: &CollectionDelta,
    ) -> ListenerResult<()> {
        let Some(metadata) = self.config.class_metadata(&owner.class) else {
            debug!("Ignoring collection update of unmapped {}", owner);
            return Ok(());
        };
        let field_config = self.config.resolve_field_config(&owner.class, field)?;
        let mapping = metadata.association_for(field);

        if mapping.is_some_and(|m| !m.is_owning()) {
            warn!(
                "Skipping collection update on inverse side {}.{}",
                owner, field
            );
            return Ok(());
        }
        if delta.is_empty() {
            return Ok(());
        }

        if let Some(config) = field_config.and_then(|f| f.change.clone()) {
            self.dispatcher
                .record_collection_change(config, owner.clone(), field, delta.clone());
        }

        if let Some(update) = self
            .config
            .resolve_class_config(&owner.class)
            .and_then(|c| c.update.clone())
        {
            if update.monitor_collections && !ignores_class_updates(field_config) {
                let mut collections = CollectionChangeSet::new();
                collections.insert(field.to_string(), delta.clone());
                self.dispatcher.record_update(
                    update.event,
                    owner.clone(),
                    PropertyChangeSet::new(),
                    collections,
                );
            }
        }

        if let Some(mapping) = mapping.filter(|m| m.inverse_field().is_some()) {
            let edges = delta
                .inserted
                .iter()
                .map(|v| (v, Link::Linked))
                .chain(delta.deleted.iter().map(|v| (v, Link::Unlinked)));
            for (target, link) in edges {
                let Some(target) = target.as_entity() else {
                    continue;
                };
                if self.mirrored.consume(owner, field, target, link) {
                    debug!("{} -> {} already mirrored from entity state", owner, target);
                    continue;
                }
                self.propagate(owner, mapping, target, link)?;
            }
        }
        Ok(())
    }

    /// The flush committed. Runs a dispatch pass when auto-dispatch is on.
    pub fn on_post_flush(&self) -> ListenerResult<usize> {
        self.mirrored.clear();
        Ok(self.dispatcher.post_flush()?)
    }

    /// Replays a whole unit-of-work in host order, then calls
    /// [`ChangeListener::on_post_flush`].
    ///
    /// Returns the number of events delivered by the post-flush pass.
    pub fn flush(&self, work: &UnitOfWork) -> ListenerResult<usize> {
        self.record(work)?;
        self.on_post_flush()
    }

    /// Runs the entry points for `work` without completing the flush.
    pub fn record(&self, work: &UnitOfWork) -> ListenerResult<()> {
        for (entity, state) in work.insertions() {
            self.on_create(entity, state)?;
        }
        for (entity, changes) in work.updates() {
            self.on_pre_update(entity, changes)?;
        }
        for update in work.collection_updates() {
            self.on_collection_update(&update.owner, &update.field, &update.delta)?;
        }
        for (entity, state) in work.deletions() {
            self.on_delete(entity, state)?;
        }
        Ok(())
    }

    /// The unit-of-work was rolled back: nothing recorded so far is delivered.
    pub fn rollback(&self) -> PendingCounts {
        self.mirrored.clear();
        self.dispatcher.discard()
    }
}

fn ignores_class_updates(field_config: Option<&FieldConfig>) -> bool {
    field_config.is_some_and(|f| f.ignore_class_updates)
}

/// Entities currently held by an association field of `state`.
fn association_targets<'a>(
    state: &'a EntityState,
    field: &str,
    to_many: bool,
) -> Vec<&'a EntityRef> {
    if to_many {
        state
            .elements(field)
            .iter()
            .filter_map(Value::as_entity)
            .collect()
    } else {
        state.get(field).as_entity().into_iter().collect()
    }
}
