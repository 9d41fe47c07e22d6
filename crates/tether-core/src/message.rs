//! Wire message types
//!
//! Topic-scoped protocol messages exchanged with the server, all namespaced
//! under the `tether:` prefix so they cannot collide with ordinary
//! application traffic on the same topic.
//!
//! | direction | name            | payload                                  |
//! |-----------|-----------------|------------------------------------------|
//! | inbound   | `tether:change` | full-state replacement                   |
//! | inbound   | `tether:patch`  | version-gated JSON Patch                 |
//! | inbound   | `tether:event`  | application event envelope               |
//! | inbound   | `tether:error`  | implementation-defined error document    |
//! | outbound  | `tether:event`  | application event envelope               |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::{StateData, StatePatch};

/// Protocol namespace; every protocol message name starts with this.
pub const PROTOCOL_PREFIX: &str = "tether";

/// Full-state replacement push
pub const MSG_CHANGE: &str = "tether:change";
/// Version-gated incremental patch push
pub const MSG_PATCH: &str = "tether:patch";
/// Application event; inbound pushes and outbound sends share the name
pub const MSG_EVENT: &str = "tether:event";
/// Server-side protocol error push
pub const MSG_ERROR: &str = "tether:error";

/// Application event envelope
///
/// Identical shape whether the server pushed it or the client sends it; a
/// handler cannot tell the origin apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event type, the handler-registry key
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque event payload
    #[serde(default)]
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Messages the server pushes on a joined topic
#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// Full-state replacement (`tether:change`)
    Change(StateData),
    /// Incremental patch (`tether:patch`)
    Patch(StatePatch),
    /// Application event (`tether:event`)
    Event(EventEnvelope),
    /// Server error document (`tether:error`)
    Error(Value),
}

/// Failure decoding an inbound protocol message
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown protocol message '{0}'")]
    UnknownMessage(String),

    #[error("malformed '{name}' payload: {source}")]
    Malformed {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ServerMessage {
    /// Decode a named protocol message from its JSON payload.
    pub fn decode(name: &str, payload: Value) -> Result<Self, DecodeError> {
        match name {
            MSG_CHANGE => serde_json::from_value(payload)
                .map(ServerMessage::Change)
                .map_err(|source| DecodeError::Malformed {
                    name: MSG_CHANGE,
                    source,
                }),
            MSG_PATCH => serde_json::from_value(payload)
                .map(ServerMessage::Patch)
                .map_err(|source| DecodeError::Malformed {
                    name: MSG_PATCH,
                    source,
                }),
            MSG_EVENT => serde_json::from_value(payload)
                .map(ServerMessage::Event)
                .map_err(|source| DecodeError::Malformed {
                    name: MSG_EVENT,
                    source,
                }),
            MSG_ERROR => Ok(ServerMessage::Error(payload)),
            other => Err(DecodeError::UnknownMessage(other.to_string())),
        }
    }
}
