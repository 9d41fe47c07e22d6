//! Tether Core Library
//!
//! This crate provides the core functionality for Tether: a continuously
//! synchronized client view of server-held state, plus typed application
//! events, over a persistent topic-scoped connection.
//!
//! # Architecture
//!
//! - **Snapshots**: connections, channels and tracked state are immutable
//!   values; every transition produces a new one, and external holders
//!   stay current through the update hook.
//! - **Version gate**: incremental patches apply only at exactly the next
//!   version (or 0, a forced resync); anything else is dropped and a
//!   later corrective message wins.
//! - **Transport seam**: all I/O lives behind the [`Transport`] trait;
//!   the core itself is single-threaded, callback-driven and does no I/O.
//!
//! # Quick Start
//!
//! ```text
//! let connection = Store::new(Connection::new(endpoint, transport, options));
//! connection.connect()?;
//!
//! let channel = Store::new(connection.snapshot().attach("room:lobby", channel_options));
//! channel.join()?;
//!
//! // Server pushes keep channel.snapshot().state() current;
//! // exchange events with the other end:
//! channel.push("increment", json!({ "amount": 1 }))?;
//! channel.dispatch("increment", json!({ "amount": 1 }))?;
//! ```
//!
//! # Modules
//!
//! - `connection`: transport-level connection lifecycle
//! - `channel`: topic join/leave lifecycle and callback composition
//! - `state`: version-gated state reconciliation
//! - `event`: application event dispatch
//! - `message`: wire message names and envelopes
//! - `transport`: the transport seam
//! - `store`: owned current-snapshot holder
//! - `error`: error taxonomy

pub mod channel;
pub mod connection;
pub mod error;
pub mod event;
pub mod message;
pub mod state;
pub mod store;
pub mod transport;

pub use channel::{Channel, ChannelCallbacks, ChannelOptions};
pub use connection::{Connection, ConnectionCallbacks, ConnectionOptions, ConnectionStatus};
pub use error::{ChannelError, DispatchError};
pub use event::{EventHandler, EventHandlers};
pub use message::{EventEnvelope, ServerMessage};
pub use state::{apply_full_state, apply_patch, PatchOutcome, RejectReason, StateData, StatePatch};
pub use store::Store;
pub use transport::{JoinReply, Transport, TransportError};
