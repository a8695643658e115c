//! Error types for configuration lookups and registry loading.

use changeset_types::ClassId;
use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while resolving or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field-level lookup named a field the class does not have.
    #[error("class {class} has no field named {field}")]
    UnknownField { class: ClassId, field: String },

    /// The class has no mapping metadata, so its fields cannot be inspected.
    #[error("unknown class: {0}")]
    UnknownClass(ClassId),

    /// Association mappings are inconsistent (wrong target, missing inverse).
    #[error("invalid mapping: {0}")]
    InvalidMapping(String),

    /// Registry document could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Registry document could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
