//! Dispatch passes over the aggregated records.

use crate::aggregator::Aggregator;
use crate::bus::EventBus;
use crate::error::DispatchResult;
use crate::payload::PayloadRegistry;
use crate::record::{ChangeRecord, CollectionChangeRecord, UpdateRecord};
use changeset_model::EventConfig;
use changeset_types::{
    CollectionChangeSet, CollectionDelta, EntityRef, Event, EventKind, Identifier, PendingCounts,
    PreAutoDispatchEvent, PropertyChangeSet, Value, event_names,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info};

/// Runtime settings for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Run a dispatch pass automatically when a flush completes.
    pub auto_dispatch: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            auto_dispatch: true,
        }
    }
}

/// Called once before each top-level automatic dispatch pass.
pub type PreDispatchHook = Arc<dyn Fn(&Dispatcher) + Send + Sync>;

/// Owns the aggregator and delivers its records through an [`EventBus`].
///
/// All recording and draining goes through one lock guarding the five
/// buffers together. The lock is never held while a payload is delivered,
/// so subscribers may record changes and start nested passes.
pub struct Dispatcher {
    changes: Mutex<Aggregator>,
    bus: Arc<dyn EventBus>,
    payloads: PayloadRegistry,
    auto_dispatch: AtomicBool,
    /// Number of dispatch passes currently on the stack.
    depth: AtomicUsize,
    pre_dispatch_hook: RwLock<Option<PreDispatchHook>>,
}

impl Dispatcher {
    /// Creates a dispatcher with the built-in payload types.
    pub fn new(bus: Arc<dyn EventBus>, config: DispatcherConfig) -> Self {
        Self::with_payloads(bus, config, PayloadRegistry::new())
    }

    pub fn with_payloads(
        bus: Arc<dyn EventBus>,
        config: DispatcherConfig,
        payloads: PayloadRegistry,
    ) -> Self {
        Self {
            changes: Mutex::new(Aggregator::new()),
            bus,
            payloads,
            auto_dispatch: AtomicBool::new(config.auto_dispatch),
            depth: AtomicUsize::new(0),
            pre_dispatch_hook: RwLock::new(None),
        }
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn payloads(&self) -> &PayloadRegistry {
        &self.payloads
    }

    // ── Settings ─────────────────────────────────────────────────

    pub fn auto_dispatch(&self) -> bool {
        self.auto_dispatch.load(Ordering::SeqCst)
    }

    pub fn set_auto_dispatch(&self, enabled: bool) {
        debug!("Auto-dispatch {}", if enabled { "enabled" } else { "disabled" });
        self.auto_dispatch.store(enabled, Ordering::SeqCst);
    }

    pub fn set_pre_dispatch_hook<F>(&self, hook: F)
    where
        F: Fn(&Dispatcher) + Send + Sync + 'static,
    {
        *self
            .pre_dispatch_hook
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    pub fn clear_pre_dispatch_hook(&self) {
        *self
            .pre_dispatch_hook
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    // ── Recording ────────────────────────────────────────────────

    /// Runs `f` with exclusive access to the buffers.
    ///
    /// Use this when a lookup and a record must happen atomically, e.g.
    /// checking [`Aggregator::find_collection_change`] before adding to it.
    /// `f` must not call back into the dispatcher.
    pub fn with_changes<R>(&self, f: impl FnOnce(&mut Aggregator) -> R) -> R {
        f(&mut self.changes())
    }

    pub fn record_creation(&self, config: EventConfig, entity: EntityRef) {
        self.changes().record_creation(config, entity);
    }

    pub fn record_creation_with_args(
        &self,
        config: EventConfig,
        entity: EntityRef,
        raw_args: serde_json::Value,
    ) {
        self.changes()
            .record_creation_with_args(config, entity, raw_args);
    }

    pub fn record_deletion(&self, config: EventConfig, entity: EntityRef, identifier: Identifier) {
        self.changes().record_deletion(config, entity, identifier);
    }

    pub fn record_update(
        &self,
        config: EventConfig,
        entity: EntityRef,
        properties: PropertyChangeSet,
        collections: CollectionChangeSet,
    ) {
        self.changes()
            .record_update(config, entity, properties, collections);
    }

    pub fn record_property_change(
        &self,
        config: EventConfig,
        entity: EntityRef,
        field: impl Into<String>,
        old_value: impl Into<Value>,
        new_value: impl Into<Value>,
    ) {
        self.changes()
            .record_property_change(config, entity, field, old_value, new_value);
    }

    pub fn record_collection_change(
        &self,
        config: EventConfig,
        entity: EntityRef,
        field: impl Into<String>,
        delta: CollectionDelta,
    ) {
        self.changes()
            .record_collection_change(config, entity, field, delta);
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Copy of the queued update for `entity`, with its buffer position.
    pub fn find_update(&self, entity: &EntityRef) -> Option<(usize, UpdateRecord)> {
        self.changes()
            .find_update(entity)
            .map(|(index, record)| (index, record.clone()))
    }

    /// Copy of the queued collection change for `entity.field`, with its
    /// buffer position.
    pub fn find_collection_change(
        &self,
        entity: &EntityRef,
        field: &str,
    ) -> Option<(usize, CollectionChangeRecord)> {
        self.changes()
            .find_collection_change(entity, field)
            .map(|(index, record)| (index, record.clone()))
    }

    pub fn pending(&self) -> PendingCounts {
        self.changes().pending()
    }

    /// Drops the current cycle without delivering anything.
    pub fn discard(&self) -> PendingCounts {
        let dropped = self.changes().clear();
        if !dropped.is_empty() {
            info!("Discarded {} pending change record(s)", dropped.total());
        }
        dropped
    }

    /// True while a dispatch pass is running on this dispatcher.
    pub fn is_dispatching(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    // ── Dispatch ─────────────────────────────────────────────────

    /// Delivers every queued record, kind by kind in
    /// [`EventKind::DISPATCH_ORDER`], and returns how many payloads went out.
    ///
    /// Each kind's buffer is taken (snapshot and clear together) right before
    /// its records are delivered. Records added meanwhile belong to the next
    /// pass, or to a nested pass started by a subscriber.
    ///
    /// # Errors
    ///
    /// The first payload or subscriber failure is returned as is. Records of
    /// the current snapshot after the failing one are not delivered.
    pub fn dispatch_all(&self) -> DispatchResult<usize> {
        let _pass = PassGuard::enter(&self.depth);
        let mut delivered = 0;

        for kind in EventKind::DISPATCH_ORDER {
            let snapshot = self.changes().take(kind);
            if snapshot.is_empty() {
                continue;
            }
            debug!("Dispatching {} {} record(s)", snapshot.len(), kind);
            for record in snapshot {
                self.deliver(record)?;
                delivered += 1;
            }
        }

        if delivered > 0 {
            info!("Dispatch pass delivered {} event(s)", delivered);
        }
        Ok(delivered)
    }

    /// Flush-completed entry point.
    ///
    /// Does nothing when auto-dispatch is off. Otherwise, for a top-level
    /// pass, runs the pre-dispatch hook and publishes `pre_auto_dispatch`
    /// before calling [`Dispatcher::dispatch_all`]. Nested passes skip both.
    ///
    /// The pass counts as running from the hook onwards, so a flush started
    /// by the hook or by a `pre_auto_dispatch` subscriber is nested.
    pub fn post_flush(&self) -> DispatchResult<usize> {
        if !self.auto_dispatch() {
            debug!("Auto-dispatch disabled, keeping {} record(s)", self.pending().total());
            return Ok(0);
        }

        let top_level = !self.is_dispatching();
        let _pass = PassGuard::enter(&self.depth);
        if top_level {
            if let Some(hook) = self.hook() {
                hook(self);
            }
            let pending = self.pending();
            self.bus.dispatch(
                event_names::PRE_AUTO_DISPATCH,
                Event::PreAutoDispatch(PreAutoDispatchEvent { pending }),
            )?;
        }

        self.dispatch_all()
    }

    fn deliver(&self, record: ChangeRecord) -> DispatchResult<()> {
        let event_name = record.event_name().to_string();
        debug!("Delivering {} for {}", event_name, record.entity());
        let event = self.payloads.build(record)?;
        self.bus.dispatch(&event_name, event)
    }

    fn hook(&self) -> Option<PreDispatchHook> {
        self.pre_dispatch_hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn changes(&self) -> MutexGuard<'_, Aggregator> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks pass nesting; decremented even when a pass fails.
struct PassGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> PassGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self { depth }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
