//! Synchronous event delivery.
//!
//! The dispatcher only needs [`EventBus::dispatch`]. [`SyncEventBus`] is an
//! ordered multi-subscriber implementation; [`EventLog`] simply records
//! everything it is handed.

use crate::error::{BoxError, DispatchError, DispatchResult};
use changeset_types::Event;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

/// Delivers a payload to whoever listens for `event_name`.
///
/// Implementations must be re-entrant: a subscriber may publish further
/// events, or run a nested dispatch pass, while being called.
pub trait EventBus: Send + Sync {
    fn dispatch(&self, event_name: &str, event: Event) -> DispatchResult<()>;
}

type Handler = Arc<dyn Fn(&Event) -> Result<(), BoxError> + Send + Sync>;
type AnyHandler = Arc<dyn Fn(&str, &Event) -> Result<(), BoxError> + Send + Sync>;

/// Handle returned by subscription calls, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    priority: i32,
    handler: Handler,
}

#[derive(Default)]
struct Subscribers {
    named: HashMap<String, Vec<Subscription>>,
    any: Vec<(SubscriptionId, AnyHandler)>,
}

/// Ordered, synchronous, multi-subscriber event bus.
///
/// Subscribers of an event run by descending priority, then in registration
/// order. Catch-all subscribers run after the named ones. The first failing
/// subscriber stops delivery of that event and its error is returned.
#[derive(Default)]
pub struct SyncEventBus {
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
}

impl SyncEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event_name: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe_with_priority(event_name, 0, handler)
    }

    pub fn subscribe_with_priority<F>(
        &self,
        event_name: impl Into<String>,
        priority: i32,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        let mut subscribers = self.write();
        let list = subscribers.named.entry(event_name.into()).or_default();
        // Stable: equal priorities keep registration order.
        let position = list
            .iter()
            .position(|s| s.priority < priority)
            .unwrap_or(list.len());
        list.insert(
            position,
            Subscription {
                id,
                priority,
                handler: Arc::new(handler),
            },
        );
        id
    }

    /// Subscribes to every event, whatever its name.
    pub fn subscribe_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &Event) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.write().any.push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.write();
        let any_before = subscribers.any.len();
        subscribers.any.retain(|(sid, _)| *sid != id);
        if subscribers.any.len() != any_before {
            return true;
        }
        for list in subscribers.named.values_mut() {
            if let Some(position) = list.iter().position(|s| s.id == id) {
                list.remove(position);
                return true;
            }
        }
        false
    }

    pub fn has_subscribers(&self, event_name: &str) -> bool {
        self.subscriber_count(event_name) > 0
    }

    /// Named plus catch-all subscribers that would receive `event_name`.
    pub fn subscriber_count(&self, event_name: &str) -> usize {
        let subscribers = self.read();
        subscribers.named.get(event_name).map_or(0, Vec::len) + subscribers.any.len()
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Subscribers> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Subscribers> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBus for SyncEventBus {
    fn dispatch(&self, event_name: &str, event: Event) -> DispatchResult<()> {
        // Copy the handler list so subscribers may (un)subscribe or publish
        // while we iterate.
        let (named, any): (Vec<Handler>, Vec<AnyHandler>) = {
            let subscribers = self.read();
            (
                subscribers
                    .named
                    .get(event_name)
                    .map(|list| list.iter().map(|s| s.handler.clone()).collect())
                    .unwrap_or_default(),
                subscribers.any.iter().map(|(_, h)| h.clone()).collect(),
            )
        };

        debug!(
            "Publishing {} to {} subscriber(s)",
            event_name,
            named.len() + any.len()
        );

        let fail = |source: BoxError| DispatchError::Subscriber {
            event_name: event_name.to_string(),
            source,
        };
        for handler in named {
            handler(&event).map_err(fail)?;
        }
        for handler in any {
            handler(event_name, &event).map_err(fail)?;
        }
        Ok(())
    }
}

/// Bus that keeps every published `(event_name, event)` pair, in order.
/// Handy for tests and for replaying what a flush produced.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<(String, Event)>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, Event)> {
        self.lock().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Events published under `event_name`.
    pub fn named(&self, event_name: &str) -> Vec<Event> {
        self.lock()
            .iter()
            .filter(|(n, _)| n == event_name)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns and forgets everything logged so far.
    pub fn drain(&self) -> Vec<(String, Event)> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Event)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBus for EventLog {
    fn dispatch(&self, event_name: &str, event: Event) -> DispatchResult<()> {
        self.lock().push((event_name.to_string(), event));
        Ok(())
    }
}
