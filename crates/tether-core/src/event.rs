//! Application event dispatch
//!
//! Routes typed events to the handlers registered on a channel. A locally
//! dispatched event and one pushed by the server go through this same
//! path; a handler cannot tell the origin apart.
//!
//! An event type nobody registered for is a contract defect between the
//! two ends (or between the caller and its own registrations), not a
//! transient condition - it is reported as a hard error and never
//! swallowed.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::channel::Channel;
use crate::error::DispatchError;
use crate::message::EventEnvelope;

/// Handler for one event type.
///
/// Receives the event payload and the current channel snapshot, returns
/// the new snapshot.
pub type EventHandler<A> = Rc<dyn Fn(&Value, Channel<A>) -> Channel<A>>;

/// Event-type to handler registry
///
/// Keys are unique; registering a type that already has a handler keeps
/// only the last one.
pub struct EventHandlers<A> {
    handlers: HashMap<String, EventHandler<A>>,
}

impl<A> EventHandlers<A> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an event type. Last registration wins.
    pub fn insert(
        &mut self,
        kind: impl Into<String>,
        handler: impl Fn(&Value, Channel<A>) -> Channel<A> + 'static,
    ) {
        self.handlers.insert(kind.into(), Rc::new(handler));
    }

    /// The handler for `kind`, if one is registered.
    pub fn get(&self, kind: &str) -> Option<EventHandler<A>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<A> Default for EventHandlers<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for EventHandlers<A> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<A> fmt::Debug for EventHandlers<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Deliver an event through the channel's handler registry.
///
/// Returns the handler's new snapshot; the caller routes it through the
/// update hook. An unregistered event type is a hard
/// [`DispatchError::MissingHandler`].
pub fn deliver<A>(channel: Channel<A>, event: &EventEnvelope) -> Result<Channel<A>, DispatchError> {
    let handler = channel
        .callbacks()
        .event_handlers
        .get(&event.kind)
        .ok_or_else(|| DispatchError::MissingHandler(event.kind.clone()))?;
    Ok(handler(&event.payload, channel))
}
