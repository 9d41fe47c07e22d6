//! Transport seam
//!
//! The core does no I/O. A [`Transport`] implementation owns the socket:
//! it opens and closes the connection, joins and leaves named topics, and
//! delivers named messages back into the core. Signals are delivered by
//! the implementation's event loop one at a time; the core is never
//! reentered.
//!
//! Contract every implementation must honor:
//!
//! - at-least-once delivery of a join acknowledgment (ok or error) for
//!   every accepted join request, and of a close notification for every
//!   topic that stops being joined (network loss included);
//! - registering a message callback for a `(topic, message)` pair that
//!   already has one replaces the previous registration;
//! - callbacks are invoked sequentially, never concurrently.

use serde_json::Value;
use thiserror::Error;

/// Server reply to a join request
#[derive(Debug, Clone)]
pub enum JoinReply {
    /// Join acknowledged; the server's acknowledgment document
    Ok(Value),
    /// Join rejected; the server's reason document
    Error(Value),
}

/// Transport-level failure
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport holds no live connection
    #[error("transport is not connected")]
    NotConnected,

    /// Anything else the implementation wants to report
    #[error("transport failure: {0}")]
    Failure(String),
}

/// Connection-wide signal callback (open, close)
pub type SignalCallback = Box<dyn Fn()>;
/// Connection-wide error callback
pub type ErrorCallback = Box<dyn Fn(&TransportError)>;
/// Topic-scoped named-message callback
pub type MessageCallback = Box<dyn Fn(Value)>;
/// Join acknowledgment callback
pub type ReplyCallback = Box<dyn Fn(JoinReply)>;

/// A persistent connection carrying topic-scoped named messages
pub trait Transport {
    /// Open the underlying connection.
    fn connect(&self) -> Result<(), TransportError>;

    /// Release the underlying connection.
    fn disconnect(&self) -> Result<(), TransportError>;

    /// Whether the transport itself currently holds a live connection,
    /// independent of any app-level bookkeeping.
    fn is_connected(&self) -> bool;

    /// Request to join a topic. `reply` receives the acknowledgment.
    fn join(&self, topic: &str, params: Value, reply: ReplyCallback)
        -> Result<(), TransportError>;

    /// Request to leave a topic; completion arrives as the topic's close
    /// notification.
    fn leave(&self, topic: &str) -> Result<(), TransportError>;

    /// Send a named message on a topic.
    fn send(&self, topic: &str, message: &str, payload: Value) -> Result<(), TransportError>;

    /// Connection opened.
    fn on_open(&self, callback: SignalCallback);

    /// Connection closed.
    fn on_close(&self, callback: SignalCallback);

    /// Connection-level fault. Reporting one does not imply a close.
    fn on_error(&self, callback: ErrorCallback);

    /// Named message delivered on a topic.
    fn on_message(&self, topic: &str, message: &str, callback: MessageCallback);

    /// Topic stopped being joined (acknowledged leave or network loss).
    fn on_topic_close(&self, topic: &str, callback: SignalCallback);
}
