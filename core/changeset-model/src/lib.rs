//! Tracking configuration for the change-tracking layer.
//!
//! Answers one question for the rest of the system: does this class (or this
//! field of this class) participate in change tracking, and if so under which
//! event name and payload type?
//!
//! - [`ClassConfig`] / [`FieldConfig`]: the declared participation records
//! - [`ClassMetadata`] / [`AssociationMapping`]: the mapping facts the host
//!   ORM knows (fields, identifier, association sides)
//! - [`ConfigRegistry`]: the init-time table holding both, built through
//!   [`RegistryBuilder`] or loaded from a JSON document
//! - [`ConfigResolver`]: the lookup seam the listener depends on
//!
//! A missing declaration is the normal case and is never an error. Only a
//! field-level lookup for a field the class does not have fails.

mod config;
mod error;
mod metadata;
mod registry;
mod resolver;

pub use config::{ClassConfig, EventConfig, FieldConfig, UpdateConfig};
pub use error::{ConfigError, ConfigResult};
pub use metadata::{AssociationMapping, AssociationSide, Cardinality, ClassMetadata};
pub use registry::{ClassDocument, ConfigRegistry, RegistryBuilder, RegistryDocument};
pub use resolver::ConfigResolver;
