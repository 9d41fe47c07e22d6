//! Error types for the sync core
//!
//! Every network- or protocol-level condition here is recoverable and is
//! routed to the user's optional error callbacks rather than raised. The
//! one exception is [`DispatchError::MissingHandler`]: an event type
//! nobody registered for is a registration-contract defect, not a
//! transient condition, and fails fast.

use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced to a channel's error callback
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The server rejected the join request
    #[error("join rejected for topic '{topic}': {reason}")]
    JoinRejected {
        topic: String,
        /// Reason document from the server
        reason: Value,
    },

    /// The server pushed an explicit protocol error on the topic
    #[error("server error on topic '{topic}': {detail}")]
    Server {
        topic: String,
        /// Implementation-defined error document
        detail: Value,
    },

    /// The transport failed while acting on this channel
    #[error("transport error on topic '{topic}': {source}")]
    Transport {
        topic: String,
        #[source]
        source: TransportError,
    },
}

/// Contract defect raised by the event dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No handler registered for the delivered event type
    #[error("no handler registered for event type `{0}`")]
    MissingHandler(String),
}
