//! Payload construction: record + configured payload type -> [`Event`].

use crate::error::{BoxError, DispatchError, DispatchResult};
use crate::record::ChangeRecord;
use changeset_types::{Event, EventKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds the payload for a record whose configuration names this factory's
/// payload type.
pub trait PayloadFactory: Send + Sync {
    fn build(&self, record: ChangeRecord) -> Result<Event, BoxError>;
}

impl<F> PayloadFactory for F
where
    F: Fn(ChangeRecord) -> Result<Event, BoxError> + Send + Sync,
{
    fn build(&self, record: ChangeRecord) -> Result<Event, BoxError> {
        self(record)
    }
}

/// The built-in payloads: each record becomes its kind's default event.
struct BuiltinPayload;

impl PayloadFactory for BuiltinPayload {
    fn build(&self, record: ChangeRecord) -> Result<Event, BoxError> {
        Ok(record.into_event())
    }
}

/// Payload type id -> factory table.
///
/// The five built-in ids are always registered; applications add their own
/// with [`PayloadRegistry::register`].
#[derive(Clone)]
pub struct PayloadRegistry {
    factories: HashMap<String, Arc<dyn PayloadFactory>>,
}

impl Default for PayloadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PayloadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.factories.keys().collect();
        ids.sort();
        f.debug_struct("PayloadRegistry").field("payload_types", &ids).finish()
    }
}

impl PayloadRegistry {
    pub fn new() -> Self {
        let builtin: Arc<dyn PayloadFactory> = Arc::new(BuiltinPayload);
        let factories = EventKind::DISPATCH_ORDER
            .iter()
            .map(|kind| (kind.default_payload_type().to_string(), builtin.clone()))
            .collect();
        Self { factories }
    }

    /// Registers `factory` under `payload_type`, returning the factory it replaces.
    pub fn register(
        &mut self,
        payload_type: impl Into<String>,
        factory: impl PayloadFactory + 'static,
    ) -> Option<Arc<dyn PayloadFactory>> {
        self.factories.insert(payload_type.into(), Arc::new(factory))
    }

    pub fn contains(&self, payload_type: &str) -> bool {
        self.factories.contains_key(payload_type)
    }

    /// Builds the payload for `record`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownPayloadType`] when the record's payload type is
    /// not registered, [`DispatchError::Payload`] when its factory fails.
    pub fn build(&self, record: ChangeRecord) -> DispatchResult<Event> {
        let payload_type = record.payload_type().to_string();
        let factory = self
            .factories
            .get(&payload_type)
            .ok_or_else(|| DispatchError::UnknownPayloadType(payload_type.clone()))?;
        factory
            .build(record)
            .map_err(|source| DispatchError::Payload {
                payload_type,
                source,
            })
    }
}
