//! Error types for the listener adapter.

use changeset_engine::DispatchError;
use changeset_model::ConfigError;
use thiserror::Error;

/// Result type for listener operations.
pub type ListenerResult<T> = Result<T, ListenerError>;

/// Errors surfaced to the host framework.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// A field lookup named a field the class does not have.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A subscriber or payload factory failed during post-flush dispatch.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Entity state could not be captured for the creation record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
