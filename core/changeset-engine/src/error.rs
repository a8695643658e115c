//! Error types for the dispatch layer.

use thiserror::Error;

/// Boxed error returned by subscribers and payload factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while building or delivering payloads.
///
/// None of these are caught by the dispatcher: the remaining records of the
/// snapshot being delivered are not retried.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A subscriber failed while handling an event.
    #[error("subscriber for {event_name} failed: {source}")]
    Subscriber {
        event_name: String,
        #[source]
        source: BoxError,
    },

    /// A record names a payload type nobody registered.
    #[error("unknown payload type: {0}")]
    UnknownPayloadType(String),

    /// A payload factory failed.
    #[error("payload {payload_type} could not be built: {source}")]
    Payload {
        payload_type: String,
        #[source]
        source: BoxError,
    },
}
