//! Host framework adapter.
//!
//! The host persistence layer calls [`ChangeListener`] at fixed lifecycle
//! points of a unit-of-work:
//!
//! - [`ChangeListener::on_create`] after an entity is first persisted
//! - [`ChangeListener::on_pre_update`] with the scalar change-set of an entity
//! - [`ChangeListener::on_collection_update`] with the diff of one collection
//! - [`ChangeListener::on_delete`] before an entity is removed
//! - [`ChangeListener::on_post_flush`] once the flush is committed
//!
//! Each call checks the tracking configuration, turns the host data into
//! change records for the [`Dispatcher`](changeset_engine::Dispatcher), and
//! mirrors association changes onto the inverse side of the relation.
//! Classes without mapping metadata are ignored.

mod error;
mod inverse;
mod listener;
mod state;

pub use error::{ListenerError, ListenerResult};
pub use listener::ChangeListener;
pub use state::{CollectionUpdate, EntityState, UnitOfWork};
