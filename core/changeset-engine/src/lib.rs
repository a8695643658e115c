//! Change aggregation and dispatch.
//!
//! Collects raw change notifications during a unit-of-work, merges repeated
//! notifications for the same entity, and delivers one consolidated payload
//! per record through an [`EventBus`] once the flush completes.
//!
//! # Architecture
//!
//! - **[`Aggregator`]**: the five record buffers (creations, deletions,
//!   updates, property changes, collection changes) and their merge rules
//! - **[`PayloadRegistry`]**: turns a record into the [`Event`] its
//!   configuration asks for
//! - **[`Dispatcher`]**: owns the aggregator behind a single lock and runs
//!   dispatch passes
//! - **[`EventBus`]**: synchronous, ordered, re-entrant delivery to
//!   subscribers ([`SyncEventBus`], [`EventLog`])
//!
//! ## Dispatch pass
//!
//! For each kind in [`EventKind::DISPATCH_ORDER`] the dispatcher takes the
//! buffer (snapshot and clear in one step) and only then delivers the
//! snapshot. Anything recorded while delivering, including from a nested
//! pass started by a subscriber, lands in a fresh buffer, so no record is
//! delivered twice and none is dropped.
//!
//! # Example
//!
//! ```
//! use changeset_engine::{Dispatcher, DispatcherConfig, EventLog};
//! use changeset_model::EventConfig;
//! use changeset_types::EntityRef;
//! use std::sync::Arc;
//!
//! let log = Arc::new(EventLog::new());
//! let dispatcher = Dispatcher::new(log.clone(), DispatcherConfig::default());
//!
//! let user = EntityRef::new("User");
//! dispatcher.record_creation(EventConfig::default(), user.clone());
//! assert_eq!(dispatcher.dispatch_all().unwrap(), 1);
//! assert_eq!(log.names(), vec!["created"]);
//! ```
//!
//! [`Event`]: changeset_types::Event
//! [`EventKind::DISPATCH_ORDER`]: changeset_types::EventKind::DISPATCH_ORDER

mod aggregator;
mod bus;
mod dispatcher;
mod error;
mod payload;
mod record;

pub use aggregator::Aggregator;
pub use bus::{EventBus, EventLog, SubscriptionId, SyncEventBus};
pub use dispatcher::{Dispatcher, DispatcherConfig, PreDispatchHook};
pub use error::{BoxError, DispatchError, DispatchResult};
pub use payload::{PayloadFactory, PayloadRegistry};
pub use record::{
    ChangeRecord, CollectionChangeRecord, CreationRecord, DeletionRecord, PropertyChangeRecord,
    UpdateRecord,
};
