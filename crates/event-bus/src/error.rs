use thiserror::Error;

/// Errors surfaced by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker could not be reached or the connection was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publishing a message failed.
    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Registering a subscription failed.
    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// A payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A subscriber failed while handling a delivered event.
    #[error("Handler for '{topic}' failed: {reason}")]
    Handler { topic: String, reason: String },
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
